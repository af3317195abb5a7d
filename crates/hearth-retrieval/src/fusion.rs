//! Result fusion: fold per-provider lists into one ranked list.
//!
//! Steps, in order: fold near-duplicate titles within one source,
//! boost titles confirmed by multiple sources, weight by intent and
//! provider, stable-sort by weighted confidence, truncate.

use hearth_core::types::{Intent, RetrievalResult};

/// Similarity threshold above which two titles are the same item.
const DUPLICATE_SIMILARITY: f64 = 0.92;

/// Per-source boost for each additional confirming source, and its cap.
const CROSS_SOURCE_BOOST: f64 = 0.1;
const CROSS_SOURCE_BOOST_CAP: f64 = 0.2;

/// Fuse per-provider result lists into one ranked list of at most
/// `top_k` items. Deterministic for identical inputs: the sort is
/// stable and ties keep their original concatenation order.
pub fn fuse(lists: Vec<Vec<RetrievalResult>>, intent: Intent, top_k: usize) -> Vec<RetrievalResult> {
    let merged: Vec<RetrievalResult> = lists.into_iter().flatten().collect();

    // 1. Fold near-duplicates within one source, keeping the higher
    //    confidence in the earlier slot.
    let mut kept: Vec<RetrievalResult> = Vec::with_capacity(merged.len());
    for candidate in merged {
        let norm = normalise_title(&candidate.title);
        let duplicate_of = kept.iter().position(|existing| {
            existing.source == candidate.source
                && title_similarity_normalised(&normalise_title(&existing.title), &norm)
                    >= DUPLICATE_SIMILARITY
        });
        match duplicate_of {
            Some(i) => {
                if candidate.confidence > kept[i].confidence {
                    kept[i] = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }

    // 2. Cross-source confirmation: group by similar titles across
    //    sources, boost each member by the number of other sources
    //    that returned the same item.
    let norms: Vec<String> = kept.iter().map(|r| normalise_title(&r.title)).collect();
    let mut group_of: Vec<usize> = vec![0; kept.len()];
    let mut representatives: Vec<String> = Vec::new();
    for (i, norm) in norms.iter().enumerate() {
        let group = representatives
            .iter()
            .position(|rep| title_similarity_normalised(rep, norm) >= DUPLICATE_SIMILARITY);
        match group {
            Some(g) => group_of[i] = g,
            None => {
                representatives.push(norm.clone());
                group_of[i] = representatives.len() - 1;
            }
        }
    }
    let mut sources_per_group: Vec<Vec<String>> = vec![Vec::new(); representatives.len()];
    for (i, result) in kept.iter().enumerate() {
        let sources = &mut sources_per_group[group_of[i]];
        if !sources.contains(&result.source) {
            sources.push(result.source.clone());
        }
    }

    // 3. Weight by intent × provider, then 4. stable sort descending.
    let mut scored: Vec<(f64, RetrievalResult)> = kept
        .into_iter()
        .enumerate()
        .map(|(i, result)| {
            let confirmations = sources_per_group[group_of[i]].len().saturating_sub(1);
            let boost = (CROSS_SOURCE_BOOST * confirmations as f64).min(CROSS_SOURCE_BOOST_CAP);
            let weighted = (result.confidence + boost) * weight_for(intent, &result.source);
            (weighted, result)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    // 5. Truncate.
    scored
        .into_iter()
        .take(top_k)
        .map(|(_, result)| result)
        .collect()
}

/// Per-intent, per-provider weight. Dedicated providers dominate their
/// own intent; event APIs contribute nothing outside event search.
pub fn weight_for(intent: Intent, source: &str) -> f64 {
    let is_event_api = matches!(source, "ticketmaster" | "seatgeek");
    let is_web = matches!(source, "brave" | "searxng");
    match intent {
        Intent::EventSearch => {
            if is_event_api {
                1.0
            } else if is_web {
                0.7
            } else {
                0.5
            }
        }
        Intent::News | Intent::LocalBusiness | Intent::General => {
            if is_web {
                1.0
            } else if is_event_api {
                0.0
            } else {
                0.5
            }
        }
        Intent::Weather => weight_dedicated(source, "weather"),
        Intent::Sports => weight_dedicated(source, "sports"),
        Intent::Airports => weight_dedicated(source, "airports"),
        Intent::Control | Intent::Greeting | Intent::Unknown => 0.0,
    }
}

fn weight_dedicated(source: &str, wanted: &str) -> f64 {
    if source == wanted {
        1.0
    } else {
        0.3
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalise_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_was_space = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Dice coefficient over character bigrams of two already-normalised
/// titles. 1.0 for identical strings, 0.0 for disjoint.
pub fn title_similarity_normalised(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }
    let bigrams = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let a_grams = bigrams(a);
    let mut b_grams = bigrams(b);
    let mut matches = 0usize;
    for gram in &a_grams {
        if let Some(pos) = b_grams.iter().position(|g| g == gram) {
            b_grams.swap_remove(pos);
            matches += 1;
        }
    }
    (2.0 * matches as f64) / (a_grams.len() + b_grams.len() + matches) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn result(source: &str, title: &str, confidence: f64) -> RetrievalResult {
        RetrievalResult {
            source: source.to_string(),
            title: title.to_string(),
            snippet: format!("snippet for {title}"),
            url: None,
            confidence,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_titles_have_similarity_one() {
        assert!((title_similarity_normalised("the national", "the national") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrelated_titles_have_low_similarity() {
        let a = normalise_title("Baltimore Orioles vs Yankees");
        let b = normalise_title("Weather forecast for Denver");
        assert!(title_similarity_normalised(&a, &b) < 0.3);
    }

    #[test]
    fn punctuation_variants_normalise_equal() {
        assert_eq!(
            normalise_title("The National, Live!"),
            normalise_title("the national live")
        );
    }

    #[test]
    fn same_source_duplicates_fold_to_higher_confidence() {
        let fused = fuse(
            vec![vec![
                result("ticketmaster", "The National Live", 0.6),
                result("ticketmaster", "The National Live", 0.9),
            ]],
            Intent::EventSearch,
            5,
        );
        assert_eq!(fused.len(), 1);
        assert!((fused[0].confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn cross_source_items_stay_separate_but_boosted() {
        let fused = fuse(
            vec![
                vec![result("ticketmaster", "The National Live", 0.5)],
                vec![result("seatgeek", "The National Live", 0.5)],
                vec![result("ticketmaster", "Unconfirmed Act", 0.55)],
            ],
            Intent::EventSearch,
            5,
        );
        assert_eq!(fused.len(), 3);
        // Both confirmed items (0.5 + 0.1 boost) outrank the unconfirmed 0.55.
        assert_eq!(fused[0].title, "The National Live");
        assert_eq!(fused[1].title, "The National Live");
        assert_eq!(fused[2].title, "Unconfirmed Act");
    }

    #[test]
    fn cross_source_boost_is_capped() {
        let sources = ["ticketmaster", "seatgeek", "brave", "searxng"];
        let lists: Vec<Vec<RetrievalResult>> = sources
            .iter()
            .map(|s| vec![result(s, "Big Show", 0.5)])
            .collect();
        let fused = fuse(lists, Intent::EventSearch, 10);
        // 3 confirmations would be +0.3 uncapped; the cap keeps the
        // event-API copies at (0.5 + 0.2) * 1.0 = 0.7, ahead of a
        // hypothetical uncapped web copy.
        assert_eq!(fused.len(), 4);
        assert!(matches!(fused[0].source.as_str(), "ticketmaster" | "seatgeek"));
    }

    #[test]
    fn event_api_results_are_zeroed_for_general_intent() {
        let fused = fuse(
            vec![
                vec![result("ticketmaster", "Concert listing", 0.9)],
                vec![result("brave", "Encyclopedia entry", 0.4)],
            ],
            Intent::General,
            5,
        );
        assert_eq!(fused[0].source, "brave");
    }

    #[test]
    fn fusion_is_monotone_in_input_size() {
        let a = vec![
            result("brave", "One", 0.9),
            result("brave", "Two", 0.8),
        ];
        let b = vec![result("searxng", "Three", 0.7)];
        let fused = fuse(vec![a.clone(), b.clone()], Intent::General, 10);
        assert!(fused.len() <= a.len() + b.len());
        for item in &fused {
            assert!(matches!(item.source.as_str(), "brave" | "searxng"));
        }
    }

    #[test]
    fn ties_keep_original_order() {
        let fused = fuse(
            vec![
                vec![result("brave", "Alpha", 0.5)],
                vec![result("searxng", "Beta", 0.5)],
            ],
            Intent::General,
            5,
        );
        assert_eq!(fused[0].title, "Alpha");
        assert_eq!(fused[1].title, "Beta");
    }

    #[test]
    fn truncates_to_top_k() {
        let list: Vec<RetrievalResult> = (0..10)
            .map(|i| result("brave", &format!("Item number {i}"), 1.0 - i as f64 * 0.05))
            .collect();
        let fused = fuse(vec![list], Intent::General, 5);
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn empty_input_fuses_to_empty() {
        assert!(fuse(vec![], Intent::General, 5).is_empty());
        assert!(fuse(vec![vec![], vec![]], Intent::General, 5).is_empty());
    }
}
