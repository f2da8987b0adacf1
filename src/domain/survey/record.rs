//! Answer records: the draft being filled in and the saved results.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

use super::Section;

/// One answer set owned by a single participant.
///
/// A record starts as an anonymous draft; `finalize` freezes it. Once saved,
/// the engine never mutates `data` again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Opaque identifier, assigned at save time. Empty while a draft.
    pub id: String,
    /// Answers keyed by storage key. Keys starting with `_` belong to
    /// strategy-private state and never survive into rendered output.
    pub data: HashMap<String, String>,
    pub saved: bool,
    /// Set at save time. `None` while a draft.
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates an empty draft.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the record holds a non-empty answer for `key`.
    pub fn has_answer(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Returns true when any question of `section` has a non-empty answer.
    pub fn section_has_data(&self, section: &Section) -> bool {
        section.questions.iter().any(|q| self.has_answer(&q.store_key))
    }

    /// Freezes the draft as a saved record.
    ///
    /// The identifier is `<participant-id>-<nanosecond timestamp>`. The
    /// timestamp is bumped above `floor_nanos` so two saves by the same
    /// participant can never collide; the caller keeps the returned value as
    /// the floor for the next save.
    pub fn finalize(&mut self, participant_id: i64, floor_nanos: i64) -> i64 {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(floor_nanos + 1);
        let nanos = now.max(floor_nanos + 1);

        self.saved = true;
        self.created_at = Some(Utc.timestamp_nanos(nanos));
        self.id = format!("{participant_id}-{nanos}");
        nanos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::survey::Question;

    fn section_with_keys(keys: &[&str]) -> Section {
        Section {
            title: "S".to_string(),
            questions: keys
                .iter()
                .map(|key| Question {
                    id: format!("q_{key}"),
                    prompt: "P".to_string(),
                    kind: "text".to_string(),
                    store_key: key.to_string(),
                    options: Vec::new(),
                    rating_min: None,
                    rating_max: None,
                    next_button_label: None,
                    finish_button_label: None,
                })
                .collect(),
        }
    }

    #[test]
    fn new_record_is_an_unsaved_draft() {
        let record = Record::new();
        assert!(!record.saved);
        assert!(record.id.is_empty());
        assert!(record.created_at.is_none());
        assert!(record.data.is_empty());
    }

    #[test]
    fn empty_answer_does_not_count() {
        let mut record = Record::new();
        record.data.insert("name".to_string(), String::new());
        assert!(!record.has_answer("name"));

        record.data.insert("name".to_string(), "Alice".to_string());
        assert!(record.has_answer("name"));
    }

    #[test]
    fn section_has_data_ignores_other_sections_keys() {
        let section = section_with_keys(&["name", "city"]);
        let mut record = Record::new();
        record.data.insert("unrelated".to_string(), "x".to_string());
        assert!(!record.section_has_data(&section));

        record.data.insert("city".to_string(), "tb".to_string());
        assert!(record.section_has_data(&section));
    }

    #[test]
    fn finalize_freezes_identifier_and_timestamp() {
        let mut record = Record::new();
        let nanos = record.finalize(42, 0);

        assert!(record.saved);
        assert_eq!(record.id, format!("42-{nanos}"));
        let created = record.created_at.unwrap();
        assert_eq!(created.timestamp_nanos_opt().unwrap(), nanos);
    }

    #[test]
    fn finalize_never_reuses_the_floor() {
        let mut first = Record::new();
        let floor = first.finalize(7, 0);

        let mut second = Record::new();
        let next = second.finalize(7, floor);
        assert!(next > floor);
        assert_ne!(first.id, second.id);
    }
}
