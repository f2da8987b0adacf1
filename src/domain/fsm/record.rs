//! The per-record machine: idle → section selection → question answering.

use super::TransitionError;

/// States of a survey-filling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordState {
    /// No active session; the participant sees the main menu.
    #[default]
    Idle,
    /// The section keyboard is shown.
    SelectingSection,
    /// A question prompt is shown and answers are being collected.
    AnsweringQuestion,
}

impl RecordState {
    pub fn name(&self) -> &'static str {
        match self {
            RecordState::Idle => "record_idle",
            RecordState::SelectingSection => "selecting_section",
            RecordState::AnsweringQuestion => "answering_question",
        }
    }
}

/// Events accepted by the record machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEvent {
    StartRecord,
    SelectSection,
    /// Self-loop on `AnsweringQuestion`; always refused as no-transition.
    AnswerQuestion,
    SectionComplete,
    CancelSection,
    SaveRecord,
    ExitToMenu,
    /// Safety hatch from any non-idle state back to idle.
    ForceExit,
}

impl RecordEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RecordEvent::StartRecord => "start_record",
            RecordEvent::SelectSection => "select_section",
            RecordEvent::AnswerQuestion => "answer_question",
            RecordEvent::SectionComplete => "section_complete",
            RecordEvent::CancelSection => "cancel_section",
            RecordEvent::SaveRecord => "save_record",
            RecordEvent::ExitToMenu => "exit_to_menu",
            RecordEvent::ForceExit => "force_exit",
        }
    }
}

/// Record machine instance. One per participant, owned by the user state.
#[derive(Debug, Clone, Default)]
pub struct RecordFsm {
    state: RecordState,
}

impl RecordFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RecordState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RecordState::Idle
    }

    /// Fires an event against the transition table.
    ///
    /// On success the machine has moved and the new state is returned. On
    /// failure the machine is untouched; see [`TransitionError`] for the
    /// no-transition vs. rejected distinction.
    pub fn fire(&mut self, event: RecordEvent) -> Result<RecordState, TransitionError> {
        use RecordEvent::*;
        use RecordState::*;

        let target = match (self.state, event) {
            (Idle, StartRecord) => SelectingSection,
            (SelectingSection, SelectSection) => AnsweringQuestion,
            (AnsweringQuestion, AnswerQuestion) => AnsweringQuestion,
            (AnsweringQuestion, SectionComplete) => SelectingSection,
            (AnsweringQuestion, CancelSection) => SelectingSection,
            (SelectingSection, SaveRecord) => Idle,
            (SelectingSection, ExitToMenu) => Idle,
            (SelectingSection, ForceExit) | (AnsweringQuestion, ForceExit) => Idle,
            _ => {
                return Err(TransitionError::Rejected {
                    state: self.state.name(),
                    event: event.name(),
                })
            }
        };

        if target == self.state {
            return Err(TransitionError::NoTransition {
                state: self.state.name(),
                event: event.name(),
            });
        }

        self.state = target;
        Ok(target)
    }

    /// Forces the machine into a state without consulting the table.
    ///
    /// Last-resort recovery when a fired event failed unexpectedly.
    pub fn force(&mut self, state: RecordState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let fsm = RecordFsm::new();
        assert_eq!(fsm.current(), RecordState::Idle);
        assert!(fsm.is_idle());
    }

    #[test]
    fn happy_path_through_the_table() {
        let mut fsm = RecordFsm::new();
        assert_eq!(fsm.fire(RecordEvent::StartRecord), Ok(RecordState::SelectingSection));
        assert_eq!(fsm.fire(RecordEvent::SelectSection), Ok(RecordState::AnsweringQuestion));
        assert_eq!(fsm.fire(RecordEvent::SectionComplete), Ok(RecordState::SelectingSection));
        assert_eq!(fsm.fire(RecordEvent::SaveRecord), Ok(RecordState::Idle));
    }

    #[test]
    fn answer_question_self_loop_is_refused_but_state_survives() {
        let mut fsm = RecordFsm::new();
        fsm.fire(RecordEvent::StartRecord).unwrap();
        fsm.fire(RecordEvent::SelectSection).unwrap();

        let err = fsm.fire(RecordEvent::AnswerQuestion).unwrap_err();
        assert!(err.is_no_transition());
        assert_eq!(fsm.current(), RecordState::AnsweringQuestion);
    }

    #[test]
    fn cancel_section_returns_to_selection() {
        let mut fsm = RecordFsm::new();
        fsm.fire(RecordEvent::StartRecord).unwrap();
        fsm.fire(RecordEvent::SelectSection).unwrap();
        assert_eq!(fsm.fire(RecordEvent::CancelSection), Ok(RecordState::SelectingSection));
    }

    #[test]
    fn exit_to_menu_only_from_selection() {
        let mut fsm = RecordFsm::new();
        fsm.fire(RecordEvent::StartRecord).unwrap();
        assert_eq!(fsm.fire(RecordEvent::ExitToMenu), Ok(RecordState::Idle));

        let mut answering = RecordFsm::new();
        answering.fire(RecordEvent::StartRecord).unwrap();
        answering.fire(RecordEvent::SelectSection).unwrap();
        let err = answering.fire(RecordEvent::ExitToMenu).unwrap_err();
        assert!(!err.is_no_transition());
        assert_eq!(answering.current(), RecordState::AnsweringQuestion);
    }

    #[test]
    fn force_exit_works_from_any_non_idle_state() {
        let mut selecting = RecordFsm::new();
        selecting.fire(RecordEvent::StartRecord).unwrap();
        assert_eq!(selecting.fire(RecordEvent::ForceExit), Ok(RecordState::Idle));

        let mut answering = RecordFsm::new();
        answering.fire(RecordEvent::StartRecord).unwrap();
        answering.fire(RecordEvent::SelectSection).unwrap();
        assert_eq!(answering.fire(RecordEvent::ForceExit), Ok(RecordState::Idle));
    }

    #[test]
    fn force_exit_from_idle_is_rejected() {
        let mut fsm = RecordFsm::new();
        let err = fsm.fire(RecordEvent::ForceExit).unwrap_err();
        assert!(matches!(err, TransitionError::Rejected { .. }));
        assert!(fsm.is_idle());
    }

    #[test]
    fn save_record_requires_selection_state() {
        let mut fsm = RecordFsm::new();
        assert!(fsm.fire(RecordEvent::SaveRecord).is_err());

        fsm.fire(RecordEvent::StartRecord).unwrap();
        fsm.fire(RecordEvent::SelectSection).unwrap();
        assert!(fsm.fire(RecordEvent::SaveRecord).is_err());
        assert_eq!(fsm.current(), RecordState::AnsweringQuestion);
    }

    #[test]
    fn force_overrides_the_table() {
        let mut fsm = RecordFsm::new();
        fsm.fire(RecordEvent::StartRecord).unwrap();
        fsm.force(RecordState::Idle);
        assert!(fsm.is_idle());
    }
}
