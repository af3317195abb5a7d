//! Intent → provider routing. A built-in table, overridable per intent
//! through admin feature flags (`route_<intent>` holding a JSON array
//! of provider names).

use std::collections::HashMap;

use hearth_core::types::{FeatureFlag, Intent};

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<Intent, Vec<String>>,
}

impl RouteTable {
    /// The static default routing.
    pub fn builtin() -> Self {
        let mut routes = HashMap::new();
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        routes.insert(
            Intent::EventSearch,
            names(&["ticketmaster", "seatgeek", "brave", "searxng"]),
        );
        routes.insert(Intent::News, names(&["brave", "searxng"]));
        routes.insert(Intent::LocalBusiness, names(&["brave", "searxng"]));
        routes.insert(Intent::General, names(&["brave", "searxng"]));
        routes.insert(Intent::Weather, names(&["weather"]));
        routes.insert(Intent::Sports, names(&["sports"]));
        routes.insert(Intent::Airports, names(&["airports"]));
        routes.insert(Intent::Control, Vec::new());
        routes.insert(Intent::Greeting, Vec::new());
        routes.insert(Intent::Unknown, Vec::new());

        Self { routes }
    }

    /// Provider names for an intent, in dispatch order.
    pub fn providers_for(&self, intent: Intent) -> &[String] {
        self.routes.get(&intent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Apply admin overrides. A flag `route_event_search` with value
    /// `["ticketmaster"]` replaces that intent's route; malformed
    /// values are ignored.
    pub fn apply_overrides(&mut self, flags: &HashMap<String, FeatureFlag>) {
        for (key, flag) in flags {
            let Some(intent_name) = key.strip_prefix("route_") else {
                continue;
            };
            let Ok(intent) = intent_name.parse::<Intent>() else {
                continue;
            };
            if let Ok(providers) = serde_json::from_value::<Vec<String>>(flag.value.clone()) {
                self.routes.insert(intent, providers);
            }
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_search_fans_out_to_four_providers() {
        let table = RouteTable::builtin();
        assert_eq!(
            table.providers_for(Intent::EventSearch),
            &["ticketmaster", "seatgeek", "brave", "searxng"]
        );
    }

    #[test]
    fn dedicated_intents_use_one_provider() {
        let table = RouteTable::builtin();
        assert_eq!(table.providers_for(Intent::Weather), &["weather"]);
        assert_eq!(table.providers_for(Intent::Sports), &["sports"]);
        assert_eq!(table.providers_for(Intent::Airports), &["airports"]);
    }

    #[test]
    fn short_circuit_intents_route_nowhere() {
        let table = RouteTable::builtin();
        assert!(table.providers_for(Intent::Control).is_empty());
        assert!(table.providers_for(Intent::Greeting).is_empty());
    }

    #[test]
    fn admin_flag_overrides_one_route() {
        let mut table = RouteTable::builtin();
        let mut flags = HashMap::new();
        flags.insert(
            "route_news".to_string(),
            FeatureFlag {
                key: "route_news".to_string(),
                value: serde_json::json!(["searxng"]),
            },
        );
        table.apply_overrides(&flags);
        assert_eq!(table.providers_for(Intent::News), &["searxng"]);
        // Untouched routes survive.
        assert_eq!(table.providers_for(Intent::Weather), &["weather"]);
    }

    #[test]
    fn malformed_override_is_ignored() {
        let mut table = RouteTable::builtin();
        let mut flags = HashMap::new();
        flags.insert(
            "route_news".to_string(),
            FeatureFlag {
                key: "route_news".to_string(),
                value: serde_json::json!("not-a-list"),
            },
        );
        table.apply_overrides(&flags);
        assert_eq!(table.providers_for(Intent::News), &["brave", "searxng"]);
    }
}
