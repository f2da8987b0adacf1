//! Main menu and the saved-record views.

use tokio_util::sync::CancellationToken;

use crate::domain::fsm::{MainMenuEvent, MainMenuState};
use crate::domain::state::UserState;
use crate::domain::survey::Record;
use crate::ports::{InlineButton, InlineKeyboard, Markup, ReplyKeyboard};

use super::{
    Engine, ACTION_SHARE_LAST, BUTTON_FILL_RECORD, BUTTON_MY_RECORDS, BUTTON_SEND_REVIEWER,
    BUTTON_SEND_SELF, BUTTON_SHOW_RECORD, CALLBACK_ACTION_PREFIX, CALLBACK_LIST_NAV_PREFIX,
    LIST_NAV_BACK, LIST_NAV_NEXT, LIST_NAV_TO_MENU, LIST_PAGE_SIZE,
};

/// Reserved storage keys previewed in the list view.
const PREVIEW_FIELDS: [(&str, &str); 2] = [("name", "Name"), ("city", "City")];

const PREVIEW_VALUE_WIDTH: usize = 25;

impl Engine {
    /// Shows the participant header and the reply-keyboard main menu.
    pub(crate) async fn send_main_menu(&self, cancel: &CancellationToken, state: &UserState) {
        let stats = format!(
            "👤 Name: {}\n🆔 ID: {}\n📊 Saved records: {}",
            state.user_name,
            state.user_id,
            state.records.len()
        );
        let keyboard = ReplyKeyboard::new(vec![
            vec![BUTTON_SHOW_RECORD.to_string(), BUTTON_FILL_RECORD.to_string()],
            vec![BUTTON_SEND_SELF.to_string(), BUTTON_SEND_REVIEWER.to_string()],
            vec![BUTTON_MY_RECORDS.to_string()],
        ]);

        let text = format!("{stats}\n\nChoose an action:");
        if let Err(err) = self
            .port
            .send(cancel, state.user_id, &text, Markup::Reply(keyboard))
            .await
        {
            tracing::error!(user_id = state.user_id, code = err.code(), %err, "failed to send main menu");
        }
    }

    /// Sends a short notice that also removes the reply keyboard.
    pub(crate) async fn hide_keyboard(&self, cancel: &CancellationToken, chat_id: i64, text: &str) {
        if let Err(err) = self.port.send(cancel, chat_id, text, Markup::RemoveReply).await {
            tracing::warn!(chat_id, code = err.code(), %err, "failed to remove reply keyboard");
        }
    }

    /// Shows the latest saved record with a share button.
    pub(crate) async fn view_last_record(
        &self,
        cancel: &CancellationToken,
        state: &UserState,
        chat_id: i64,
    ) {
        let Some(index) = state.latest_saved_index() else {
            let _ = self
                .port
                .send(cancel, chat_id, "You have no saved records yet.", Markup::None)
                .await;
            return;
        };

        let preview = self.format_record_preview(&state.records[index]);
        let keyboard = InlineKeyboard::new().with_row(vec![InlineButton::new(
            "✉️ Share",
            format!("{CALLBACK_ACTION_PREFIX}{ACTION_SHARE_LAST}"),
        )]);

        let text = format!("📄 Latest record (status: saved):\n\n{preview}");
        if let Err(err) = self
            .port
            .send(cancel, chat_id, &text, Markup::Inline(keyboard))
            .await
        {
            tracing::error!(chat_id, code = err.code(), %err, "failed to send latest record");
        }
    }

    /// Enters the list view from the main menu.
    pub(crate) async fn enter_list_view(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
    ) {
        state.list_offset = 0;
        if let Err(err) = state.main_menu_fsm.fire(MainMenuEvent::ViewList) {
            tracing::warn!(user_id = state.user_id, %err, "cannot enter list view");
            return;
        }
        self.view_record_list(cancel, state, chat_id, 0).await;
    }

    /// Renders one page of the saved-record list, newest first.
    ///
    /// `message_id != 0` edits the existing list message in place.
    pub(crate) async fn view_record_list(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id: i64,
    ) {
        let saved: Vec<&Record> = state.records.iter().filter(|r| r.saved).collect();
        let total = saved.len();

        if total == 0 {
            let text = "You have no saved records yet.";
            if message_id != 0 {
                let edited = self
                    .port
                    .edit(cancel, chat_id, message_id, text, Markup::Inline(InlineKeyboard::new()))
                    .await;
                if let Err(err) = edited {
                    if !err.is_not_modified() {
                        tracing::error!(chat_id, code = err.code(), %err, "failed to edit empty list view");
                    }
                }
            } else {
                let _ = self.port.send(cancel, chat_id, text, Markup::None).await;
            }

            if state.main_menu_fsm.current() == MainMenuState::ViewingList {
                if let Err(err) = state.main_menu_fsm.fire(MainMenuEvent::BackToIdle) {
                    tracing::error!(user_id = state.user_id, %err, "failed to leave empty list view");
                }
            }
            return;
        }

        // Clamp the offset onto the last page when records were cleared
        // underneath an open list view.
        let mut start = state.list_offset;
        if start >= total {
            start = (total - 1) / LIST_PAGE_SIZE * LIST_PAGE_SIZE;
            state.list_offset = start;
        }
        let end = (start + LIST_PAGE_SIZE).min(total);

        let mut text = format!("🗂️ Records ({} - {} of {}):\n\n", start + 1, end, total);
        for record in saved.iter().rev().skip(start).take(end - start) {
            let id_suffix = last_n_chars(&record.id, 6);
            let created = record
                .created_at
                .map(|ts| ts.with_timezone(&chrono::Local).format("%d.%m.%y %H:%M").to_string())
                .unwrap_or_default();
            text.push_str(&format!("📌 ID: ...{id_suffix} ({created})\n"));
            for (key, label) in PREVIEW_FIELDS {
                if let Some(value) = record.data.get(key) {
                    if !value.is_empty() {
                        text.push_str(&format!(
                            "   {label}: {}\n",
                            truncate(value, PREVIEW_VALUE_WIDTH)
                        ));
                    }
                }
            }
            text.push_str("---\n");
        }

        let has_prev = start > 0;
        let has_next = end < total;
        let keyboard = list_navigation_keyboard(has_prev, has_next);

        if message_id != 0 {
            let edited = self
                .port
                .edit(cancel, chat_id, message_id, &text, Markup::Inline(keyboard))
                .await;
            if let Err(err) = edited {
                if !err.is_not_modified() {
                    tracing::error!(chat_id, code = err.code(), %err, "failed to edit record list");
                }
            }
        } else if let Err(err) = self
            .port
            .send(cancel, chat_id, &text, Markup::Inline(keyboard))
            .await
        {
            tracing::error!(chat_id, code = err.code(), %err, "failed to send record list");
        }
    }

    /// Leaves the list view: strips the list keyboard and restores the main
    /// menu.
    pub(crate) async fn leave_list_view(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id: i64,
    ) {
        if let Err(err) = state.main_menu_fsm.fire(MainMenuEvent::BackToIdle) {
            tracing::error!(user_id = state.user_id, %err, "failed to leave list view");
        }

        if message_id != 0 {
            let edited = self
                .port
                .edit(
                    cancel,
                    chat_id,
                    message_id,
                    "Records list closed.",
                    Markup::Inline(InlineKeyboard::new()),
                )
                .await;
            if let Err(err) = edited {
                if !err.is_not_modified() {
                    tracing::warn!(chat_id, code = err.code(), %err, "failed to strip list keyboard");
                }
            }
        }

        self.send_main_menu(cancel, state).await;
    }

    /// One line per answered question, in schema order.
    pub(crate) fn format_record_preview(&self, record: &Record) -> String {
        let mut out = String::new();
        for section in self.survey.sections.values() {
            for question in &section.questions {
                if let Some(value) = record.data.get(&question.store_key) {
                    if !value.is_empty() {
                        out.push_str(&format!("{}: {}\n", question.prompt, value));
                    }
                }
            }
        }
        if out.is_empty() {
            return "No data filled in yet.".to_string();
        }
        out
    }
}

fn list_navigation_keyboard(has_prev: bool, has_next: bool) -> InlineKeyboard {
    let mut nav_row = Vec::new();
    if has_prev {
        nav_row.push(InlineButton::new(
            "⬅️ Back",
            format!("{CALLBACK_LIST_NAV_PREFIX}{LIST_NAV_BACK}"),
        ));
    }
    if has_next {
        nav_row.push(InlineButton::new(
            "Forward ➡️",
            format!("{CALLBACK_LIST_NAV_PREFIX}{LIST_NAV_NEXT}"),
        ));
    }

    let menu_row = vec![InlineButton::new(
        "⬆️ Main menu",
        format!("{CALLBACK_LIST_NAV_PREFIX}{LIST_NAV_TO_MENU}"),
    )];

    let mut keyboard = InlineKeyboard::new();
    if !nav_row.is_empty() {
        keyboard.push_row(nav_row);
    }
    keyboard.push_row(menu_row);
    keyboard
}

fn truncate(value: &str, limit: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= limit {
        return value.to_string();
    }
    let mut out: String = chars[..limit].iter().collect();
    out.push_str("...");
    out
}

fn last_n_chars(value: &str, n: usize) -> &str {
    let len = value.chars().count();
    if len <= n {
        return value;
    }
    let skip = len - n;
    match value.char_indices().nth(skip) {
        Some((index, _)) => &value[index..],
        None => value,
    }
}
