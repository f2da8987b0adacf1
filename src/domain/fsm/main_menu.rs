//! The main-menu machine: idle vs. browsing the saved-record list.

use super::TransitionError;

/// Top-level navigation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MainMenuState {
    #[default]
    Idle,
    ViewingList,
}

impl MainMenuState {
    pub fn name(&self) -> &'static str {
        match self {
            MainMenuState::Idle => "idle",
            MainMenuState::ViewingList => "viewing_list",
        }
    }
}

/// Events accepted by the main-menu machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainMenuEvent {
    ViewList,
    /// Pagination self-loops; always refused as no-transition.
    ListNext,
    ListBack,
    BackToIdle,
}

impl MainMenuEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MainMenuEvent::ViewList => "view_list",
            MainMenuEvent::ListNext => "list_next",
            MainMenuEvent::ListBack => "list_back",
            MainMenuEvent::BackToIdle => "back_to_idle",
        }
    }
}

/// Main-menu machine instance. One per participant.
#[derive(Debug, Clone, Default)]
pub struct MainMenuFsm {
    state: MainMenuState,
}

impl MainMenuFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> MainMenuState {
        self.state
    }

    /// Fires an event against the transition table; same contract as the
    /// record machine.
    pub fn fire(&mut self, event: MainMenuEvent) -> Result<MainMenuState, TransitionError> {
        use MainMenuEvent::*;
        use MainMenuState::*;

        let target = match (self.state, event) {
            (Idle, ViewList) => ViewingList,
            (ViewingList, ListNext) | (ViewingList, ListBack) => ViewingList,
            (ViewingList, BackToIdle) => Idle,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_list_enters_and_back_leaves() {
        let mut fsm = MainMenuFsm::new();
        assert_eq!(fsm.fire(MainMenuEvent::ViewList), Ok(MainMenuState::ViewingList));
        assert_eq!(fsm.fire(MainMenuEvent::BackToIdle), Ok(MainMenuState::Idle));
    }

    #[test]
    fn pagination_is_a_refused_self_loop() {
        let mut fsm = MainMenuFsm::new();
        fsm.fire(MainMenuEvent::ViewList).unwrap();

        assert!(fsm.fire(MainMenuEvent::ListNext).unwrap_err().is_no_transition());
        assert!(fsm.fire(MainMenuEvent::ListBack).unwrap_err().is_no_transition());
        assert_eq!(fsm.current(), MainMenuState::ViewingList);
    }

    #[test]
    fn list_events_rejected_while_idle() {
        let mut fsm = MainMenuFsm::new();
        assert!(matches!(
            fsm.fire(MainMenuEvent::ListNext),
            Err(TransitionError::Rejected { .. })
        ));
        assert!(matches!(
            fsm.fire(MainMenuEvent::BackToIdle),
            Err(TransitionError::Rejected { .. })
        ));
        assert_eq!(fsm.current(), MainMenuState::Idle);
    }
}
