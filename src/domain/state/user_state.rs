//! Per-participant conversation state.

use crate::domain::fsm::{MainMenuFsm, RecordFsm};
use crate::domain::survey::Record;
use crate::ports::ChatMessage;

/// Everything the engine remembers about one participant.
///
/// Owned by the [`super::StateStore`] behind a per-entry mutex; every
/// state-mutating dispatch holds that mutex for its full duration.
#[derive(Debug)]
pub struct UserState {
    pub user_id: i64,
    pub user_name: String,
    /// Completed records, oldest first.
    pub records: Vec<Record>,
    /// The draft under edit, if any. Its `saved` flag stays false until the
    /// record is finalized and moved into `records`.
    pub current_record: Option<Record>,
    /// Selected section id; empty outside a section.
    pub current_section: String,
    /// 0-based question index within the selected section.
    pub current_question: usize,
    /// Message id of the last prompt, 0 when unknown.
    pub last_message_id: i64,
    /// Handle of the last outbound prompt; drives edit-vs-send.
    pub last_prompt: ChatMessage,
    /// Pagination offset of the saved-record list view.
    pub list_offset: usize,
    /// Floor for save timestamps, so record ids stay unique per participant.
    pub last_save_nanos: i64,
    pub main_menu_fsm: MainMenuFsm,
    pub record_fsm: RecordFsm,
}

impl UserState {
    pub fn new(
        user_id: i64,
        user_name: impl Into<String>,
        main_menu_fsm: MainMenuFsm,
        record_fsm: RecordFsm,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            records: Vec::new(),
            current_record: None,
            current_section: String::new(),
            current_question: 0,
            last_message_id: 0,
            last_prompt: ChatMessage::default(),
            list_offset: 0,
            last_save_nanos: 0,
            main_menu_fsm,
            record_fsm,
        }
    }

    /// Zeroes the in-section position and the last prompt message id.
    pub fn reset_position(&mut self) {
        self.current_section.clear();
        self.current_question = 0;
        self.last_message_id = 0;
    }

    /// Forgets the last prompt handle entirely.
    pub fn clear_prompt(&mut self) {
        self.last_prompt = ChatMessage::default();
    }

    /// Records the handle of the prompt most recently shown to the user.
    pub fn remember_prompt(&mut self, handle: ChatMessage) {
        self.last_message_id = handle.message_id;
        self.last_prompt = handle;
    }

    /// Index of the most recent saved record, if any.
    pub fn latest_saved_index(&self) -> Option<usize> {
        self.records.iter().rposition(|r| r.saved)
    }

    /// Returns the current draft, creating an empty one when absent.
    pub fn draft_mut(&mut self) -> &mut Record {
        self.current_record.get_or_insert_with(Record::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> UserState {
        UserState::new(1, "Tester", MainMenuFsm::new(), RecordFsm::new())
    }

    #[test]
    fn fresh_state_is_empty_and_idle() {
        let state = state();
        assert!(state.records.is_empty());
        assert!(state.current_record.is_none());
        assert_eq!(state.current_question, 0);
        assert!(state.current_section.is_empty());
        assert!(state.record_fsm.is_idle());
    }

    #[test]
    fn reset_position_keeps_the_draft() {
        let mut state = state();
        state.draft_mut().data.insert("k".into(), "v".into());
        state.current_section = "sec".into();
        state.current_question = 2;
        state.last_message_id = 10;

        state.reset_position();

        assert!(state.current_section.is_empty());
        assert_eq!(state.current_question, 0);
        assert_eq!(state.last_message_id, 0);
        assert!(state.current_record.is_some());
    }

    #[test]
    fn latest_saved_index_skips_unsaved_records() {
        let mut state = state();
        let mut saved = Record::new();
        saved.finalize(1, 0);
        state.records.push(saved);
        state.records.push(Record::new());

        assert_eq!(state.latest_saved_index(), Some(0));
    }

    #[test]
    fn latest_saved_index_prefers_most_recent() {
        let mut state = state();
        let mut first = Record::new();
        let floor = first.finalize(1, 0);
        let mut second = Record::new();
        second.finalize(1, floor);
        state.records.push(first);
        state.records.push(second.clone());

        assert_eq!(state.latest_saved_index(), Some(1));
        assert_eq!(state.records[1].id, second.id);
    }

    #[test]
    fn draft_mut_creates_once() {
        let mut state = state();
        state.draft_mut().data.insert("a".into(), "1".into());
        state.draft_mut().data.insert("b".into(), "2".into());

        let draft = state.current_record.as_ref().unwrap();
        assert_eq!(draft.data.len(), 2);
        assert!(!draft.saved);
    }
}
