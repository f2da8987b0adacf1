//! The conversation engine: dispatching, the record flow, menus, and the
//! forward pipeline.
//!
//! One [`Engine`] instance serves every participant. It owns shared handles
//! to the port, schema, strategy registry, and state store; all per-user data
//! lives in the store behind per-entry mutexes.

mod dispatcher;
mod forward;
mod menu;
mod record_flow;
mod update;

use std::sync::Arc;

use crate::domain::questions::StrategyRegistry;
use crate::domain::state::StateStore;
use crate::domain::survey::Survey;
use crate::ports::ChatPort;

pub use update::{CallbackQuery, IncomingMessage, Sender, Update};

/// Callback payload prefixes (the grammar's `prefix ":"`).
pub const CALLBACK_ANSWER_PREFIX: &str = "answer:";
pub const CALLBACK_SECTION_PREFIX: &str = "section:";
pub const CALLBACK_ACTION_PREFIX: &str = "action:";
pub const CALLBACK_LIST_NAV_PREFIX: &str = "list_nav:";

/// `action:` payload values.
pub const ACTION_SAVE_RECORD: &str = "save_record";
pub const ACTION_NEW_RECORD: &str = "new_record";
pub const ACTION_EXIT_MENU: &str = "exit_menu";
pub const ACTION_CANCEL_SECTION: &str = "cancel_section";
pub const ACTION_SHARE_LAST: &str = "share_last";

/// `list_nav:` payload values.
pub const LIST_NAV_NEXT: &str = "next";
pub const LIST_NAV_BACK: &str = "back";
pub const LIST_NAV_TO_MENU: &str = "tomenu";

/// Reply-keyboard labels of the main menu. Participants tap or type these
/// exact strings.
pub const BUTTON_FILL_RECORD: &str = "Fill record";
pub const BUTTON_SHOW_RECORD: &str = "Show record";
pub const BUTTON_SEND_SELF: &str = "Send to self";
pub const BUTTON_SEND_REVIEWER: &str = "Send to reviewer";
pub const BUTTON_MY_RECORDS: &str = "My records";

/// Page size of the saved-record list view.
pub const LIST_PAGE_SIZE: usize = 5;

/// Settings the engine reads once at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSettings {
    /// Delete participants' free-text answer messages after processing.
    pub delete_user_messages: bool,
}

/// The conversation engine. Cheap to clone via `Arc` per spawned dispatch.
pub struct Engine {
    port: Arc<dyn ChatPort>,
    survey: Arc<Survey>,
    registry: Arc<StrategyRegistry>,
    store: Arc<StateStore>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        port: Arc<dyn ChatPort>,
        survey: Arc<Survey>,
        registry: Arc<StrategyRegistry>,
        store: Arc<StateStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            port,
            survey,
            registry,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}
