//! Minimal iCalendar reader for booking feeds.
//!
//! Understands exactly the subset rental calendars emit: folded lines,
//! `VEVENT` blocks, `DTSTART`/`DTEND` in UTC, floating, `TZID=`, or
//! `VALUE=DATE` forms, plus `UID` and `SUMMARY`. Everything else is
//! skipped. All times are normalised to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{ModeError, Result};

/// One parsed `VEVENT`, times in UTC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Parse an iCal document into its valid events.
///
/// Malformed events (missing or unparseable times, `DTEND` before
/// `DTSTART`) are dropped with a warning; only a document that contains
/// no `BEGIN:VCALENDAR` at all is an error.
pub fn parse_events(body: &str) -> Result<Vec<CalendarEvent>> {
    if !body.contains("BEGIN:VCALENDAR") {
        return Err(ModeError::Parse("not an iCalendar document".to_string()));
    }

    let lines = unfold_lines(body);
    let mut events = Vec::new();
    let mut current: Option<RawEvent> = None;

    for line in &lines {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some(RawEvent::default());
            continue;
        }
        if line.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(raw) = current.take() {
                match raw.finish() {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(err = %e, "skipping malformed calendar event"),
                }
            }
            continue;
        }
        if let Some(raw) = current.as_mut() {
            raw.absorb(line);
        }
    }

    Ok(events)
}

/// Stable hash over the parsed event set, for change detection.
pub fn events_hash(events: &[CalendarEvent]) -> String {
    let mut sorted: Vec<&CalendarEvent> = events.iter().collect();
    sorted.sort_by(|a, b| (a.start, &a.uid).cmp(&(b.start, &b.uid)));

    let mut hasher = Sha256::new();
    for event in sorted {
        hasher.update(event.uid.as_bytes());
        hasher.update(event.start.to_rfc3339().as_bytes());
        hasher.update(event.end.to_rfc3339().as_bytes());
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Undo RFC 5545 line folding: a line starting with a space or tab
/// continues the previous line.
fn unfold_lines(body: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = out.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        out.push(line.to_string());
    }
    out
}

#[derive(Default)]
struct RawEvent {
    uid: Option<String>,
    summary: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl RawEvent {
    fn absorb(&mut self, line: &str) {
        let Some((name_params, value)) = line.split_once(':') else {
            return;
        };
        let mut parts = name_params.split(';');
        let name = parts.next().unwrap_or_default().to_ascii_uppercase();
        let params: Vec<&str> = parts.collect();

        match name.as_str() {
            "UID" => self.uid = Some(value.to_string()),
            "SUMMARY" => self.summary = Some(value.to_string()),
            "DTSTART" => self.start = parse_datetime(value, &params),
            "DTEND" => self.end = parse_datetime(value, &params),
            _ => {}
        }
    }

    fn finish(self) -> Result<CalendarEvent> {
        let uid = self
            .uid
            .ok_or_else(|| ModeError::Parse("event without UID".to_string()))?;
        let start = self
            .start
            .ok_or_else(|| ModeError::Parse(format!("event {uid} missing DTSTART")))?;
        let end = self
            .end
            .ok_or_else(|| ModeError::Parse(format!("event {uid} missing DTEND")))?;
        if end < start {
            return Err(ModeError::Parse(format!(
                "event {uid} ends before it starts"
            )));
        }
        Ok(CalendarEvent {
            uid,
            summary: self.summary,
            start,
            end,
        })
    }
}

/// Parse a DTSTART/DTEND value into UTC.
///
/// Accepted forms: `20260801T140000Z` (UTC), `20260801T140000` with an
/// optional `TZID=` parameter (floating times are read as UTC), and
/// `20260801` with `VALUE=DATE` (midnight UTC).
fn parse_datetime(value: &str, params: &[&str]) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if params.iter().any(|p| p.eq_ignore_ascii_case("VALUE=DATE")) || value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
        return Some(Utc.from_utc_datetime(&naive));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;

    let tzid = params
        .iter()
        .find_map(|p| p.strip_prefix("TZID=").or_else(|| p.strip_prefix("tzid=")));
    if let Some(tzid) = tzid {
        if let Ok(tz) = tzid.parse::<Tz>() {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
        warn!(tzid, "unknown TZID, reading time as UTC");
    }

    Some(Utc.from_utc_datetime(&naive))
}
