//! Update dispatching: one inbound event in, one locked per-user dispatch
//! out.
//!
//! The dispatcher resolves the participant, takes the per-user mutex for the
//! whole call, classifies the event (command, text, callback grammar) and
//! routes it to the machines, the strategies, or the forward pipeline.
//! Callbacks are acknowledged before any strategy work so UI spinners clear
//! promptly.

use tokio_util::sync::CancellationToken;

use crate::domain::fsm::{MainMenuState, RecordEvent, RecordState};
use crate::domain::questions::{AnswerContext, AnswerInput, AnswerResult, TYPE_TEXT};
use crate::domain::state::UserState;
use crate::domain::survey::Record;
use crate::ports::Markup;

use super::update::{CallbackQuery, IncomingMessage, Update};
use super::{
    Engine, ACTION_CANCEL_SECTION, ACTION_EXIT_MENU, ACTION_NEW_RECORD, ACTION_SAVE_RECORD,
    ACTION_SHARE_LAST, BUTTON_FILL_RECORD, BUTTON_MY_RECORDS, BUTTON_SEND_REVIEWER,
    BUTTON_SEND_SELF, BUTTON_SHOW_RECORD, CALLBACK_ANSWER_PREFIX, LIST_NAV_BACK, LIST_NAV_NEXT,
    LIST_NAV_TO_MENU, LIST_PAGE_SIZE,
};

const GENERIC_USE_BUTTONS: &str =
    "Please use the buttons below or finish the current action.";

impl Engine {
    /// Entry point for one inbound event.
    pub async fn handle_update(&self, cancel: &CancellationToken, update: Update) {
        let Some(sender) = update.sender().cloned() else {
            tracing::warn!("ignoring update without a sender");
            return;
        };

        let entry = self.store().get_or_create(sender.id, &sender.display_name).await;
        let mut state = entry.lock().await;

        match update {
            Update::Message(message) => self.handle_message(cancel, &mut state, message).await,
            Update::Callback(query) => self.handle_callback(cancel, &mut state, query).await,
        }
    }

    async fn handle_message(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        message: IncomingMessage,
    ) {
        let chat_id = message.chat_id;

        if let Some(rest) = message.text.strip_prefix('/') {
            let command = rest.split_whitespace().next().unwrap_or_default();
            self.handle_command(cancel, state, chat_id, command).await;
            return;
        }

        if state.record_fsm.current() == RecordState::AnsweringQuestion {
            self.handle_text_answer(cancel, state, &message).await;
            return;
        }

        if state.main_menu_fsm.current() == MainMenuState::Idle && state.record_fsm.is_idle() {
            match message.text.as_str() {
                BUTTON_FILL_RECORD => {
                    tracing::info!(user_id = state.user_id, "participant starts record entry");
                    self.start_or_resume_record(cancel, state, chat_id).await;
                    self.hide_keyboard(cancel, chat_id, "Starting record entry...").await;
                }
                BUTTON_SHOW_RECORD => {
                    self.view_last_record(cancel, state, chat_id).await;
                }
                BUTTON_MY_RECORDS => {
                    self.enter_list_view(cancel, state, chat_id).await;
                }
                BUTTON_SEND_SELF => {
                    self.forward_to_self(cancel, state, chat_id).await;
                }
                BUTTON_SEND_REVIEWER => {
                    self.forward_to_reviewer(cancel, state, chat_id).await;
                }
                other => {
                    tracing::debug!(user_id = state.user_id, text = other, "unmapped menu text");
                    let _ = self
                        .port
                        .send(cancel, chat_id, GENERIC_USE_BUTTONS, Markup::None)
                        .await;
                }
            }
            return;
        }

        let _ = self
            .port
            .send(cancel, chat_id, GENERIC_USE_BUTTONS, Markup::None)
            .await;
    }

    async fn handle_command(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        command: &str,
    ) {
        match command {
            "start" => {
                if !state.record_fsm.is_idle() {
                    tracing::info!(
                        user_id = state.user_id,
                        from = state.record_fsm.current().name(),
                        "/start resets the record session"
                    );
                    let last = state.last_message_id;
                    self.force_exit(cancel, state, chat_id, last, "command /start used").await;
                } else {
                    self.send_main_menu(cancel, state).await;
                }
            }
            other => {
                tracing::debug!(user_id = state.user_id, command = other, "unknown command");
                let _ = self
                    .port
                    .send(cancel, chat_id, "Unknown command.", Markup::None)
                    .await;
            }
        }
    }

    /// Free-text input while a question is active.
    async fn handle_text_answer(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        message: &IncomingMessage,
    ) {
        let chat_id = message.chat_id;
        let Some((section_id, section, question)) = self.resolve_current_question(state) else {
            let last = state.last_message_id;
            self.force_exit(cancel, state, chat_id, last, "invalid state for text answer").await;
            return;
        };
        let Some(strategy) = self.registry.get(&question.kind) else {
            tracing::error!(kind = %question.kind, "no strategy registered for question type");
            let last = state.last_message_id;
            self.force_exit(cancel, state, chat_id, last, "missing question strategy").await;
            return;
        };

        let prompt_message_id = state.last_message_id;
        let outcome = {
            let UserState {
                ref mut current_record,
                ref last_prompt,
                ..
            } = *state;
            let record = current_record.get_or_insert_with(Record::new);
            let mut ctx = AnswerContext {
                chat_id,
                message_id: prompt_message_id,
                last_prompt,
                record,
                section_id: &section_id,
                section,
                question,
                callback_prefix: CALLBACK_ANSWER_PREFIX,
                callback_id: "",
            };
            strategy.handle_answer(&mut ctx, AnswerInput::Text(&message.text))
        };

        match outcome {
            Ok(result) => {
                self.delete_answered_message(cancel, chat_id, message.message_id, &question.kind)
                    .await;
                self.apply_answer_result(cancel, state, chat_id, result, prompt_message_id)
                    .await;
            }
            Err(err) => {
                tracing::error!(user_id = state.user_id, %err, "strategy failed while handling text answer");
                self.force_exit(
                    cancel,
                    state,
                    chat_id,
                    prompt_message_id,
                    "strategy failed while handling answer",
                )
                .await;
            }
        }
    }

    async fn handle_callback(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        query: CallbackQuery,
    ) {
        let chat_id = query.chat_id;
        let message_id = query.message_id;

        // Acknowledge before any strategy work so the client spinner clears.
        if let Err(err) = self.port.answer_callback(cancel, &query.id, "").await {
            tracing::warn!(user_id = state.user_id, code = err.code(), %err, "failed to answer callback");
        }

        let Some((prefix, value)) = query.data.split_once(':') else {
            tracing::warn!(user_id = state.user_id, data = %query.data, "callback without a prefix");
            return;
        };

        tracing::debug!(
            user_id = state.user_id,
            prefix,
            value,
            main_state = state.main_menu_fsm.current().name(),
            record_state = state.record_fsm.current().name(),
            "callback received"
        );

        match prefix {
            "answer" => self.handle_answer_callback(cancel, state, &query, value).await,

            "section" => {
                if state.record_fsm.current() != RecordState::SelectingSection {
                    tracing::warn!(
                        user_id = state.user_id,
                        state = state.record_fsm.current().name(),
                        "section callback outside of section selection"
                    );
                    return;
                }
                if self.survey.section(value).is_none() {
                    tracing::warn!(user_id = state.user_id, section = value, "unknown section id");
                    let _ = self
                        .port
                        .answer_callback(cancel, &query.id, "That section is no longer available.")
                        .await;
                    return;
                }

                tracing::info!(user_id = state.user_id, section = value, "section selected");
                state.current_section = value.to_string();
                state.current_question = 0;
                if let Err(err) = self
                    .fire_record_event(cancel, state, chat_id, RecordEvent::SelectSection, message_id)
                    .await
                {
                    tracing::error!(user_id = state.user_id, %err, "failed to enter section");
                    self.force_exit(cancel, state, chat_id, message_id, "failed to select section")
                        .await;
                }
            }

            "action" => {
                self.handle_action_callback(cancel, state, chat_id, message_id, value).await;
            }

            "list_nav" => {
                if state.main_menu_fsm.current() != MainMenuState::ViewingList {
                    tracing::warn!(
                        user_id = state.user_id,
                        state = state.main_menu_fsm.current().name(),
                        "list navigation outside of the list view"
                    );
                    let _ = self
                        .port
                        .answer_callback(cancel, &query.id, "Action unavailable.")
                        .await;
                    return;
                }
                match value {
                    LIST_NAV_NEXT => {
                        state.list_offset += LIST_PAGE_SIZE;
                        self.view_record_list(cancel, state, chat_id, message_id).await;
                    }
                    LIST_NAV_BACK => {
                        state.list_offset = state.list_offset.saturating_sub(LIST_PAGE_SIZE);
                        self.view_record_list(cancel, state, chat_id, message_id).await;
                    }
                    LIST_NAV_TO_MENU => {
                        self.leave_list_view(cancel, state, chat_id, message_id).await;
                    }
                    other => {
                        tracing::warn!(user_id = state.user_id, value = other, "unknown list navigation");
                    }
                }
            }

            other => {
                tracing::warn!(user_id = state.user_id, prefix = other, "unknown callback prefix");
            }
        }
    }

    /// `answer:` callbacks: verify the question is still current, then hand
    /// the decoded value to the strategy.
    async fn handle_answer_callback(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        query: &CallbackQuery,
        value: &str,
    ) {
        let chat_id = query.chat_id;
        if state.record_fsm.current() != RecordState::AnsweringQuestion {
            tracing::warn!(
                user_id = state.user_id,
                state = state.record_fsm.current().name(),
                "answer callback outside of answering state"
            );
            return;
        }

        let Some((question_id, option_value)) = value.split_once(':') else {
            tracing::warn!(user_id = state.user_id, value, "malformed answer callback");
            return;
        };

        let Some((section_id, section, question)) = self.resolve_current_question(state) else {
            let last = state.last_message_id;
            self.force_exit(cancel, state, chat_id, last, "invalid question position").await;
            return;
        };

        if question.id != question_id {
            tracing::warn!(
                user_id = state.user_id,
                received = question_id,
                current = %question.id,
                "stale answer callback ignored"
            );
            let _ = self
                .port
                .answer_callback(cancel, &query.id, "⚠️ Answer to a previous question?")
                .await;
            return;
        }

        let Some(strategy) = self.registry.get(&question.kind) else {
            tracing::error!(kind = %question.kind, "no strategy registered for question type");
            let last = state.last_message_id;
            self.force_exit(cancel, state, chat_id, last, "missing question strategy").await;
            return;
        };

        let outcome = {
            let UserState {
                ref mut current_record,
                ref last_prompt,
                ..
            } = *state;
            let record = current_record.get_or_insert_with(Record::new);
            let mut ctx = AnswerContext {
                chat_id,
                message_id: query.message_id,
                last_prompt,
                record,
                section_id: &section_id,
                section,
                question,
                callback_prefix: CALLBACK_ANSWER_PREFIX,
                callback_id: &query.id,
            };
            strategy.handle_answer(&mut ctx, AnswerInput::Callback(option_value))
        };

        match outcome {
            Ok(result) => {
                self.apply_answer_result(cancel, state, chat_id, result, query.message_id)
                    .await;
            }
            Err(err) => {
                tracing::error!(user_id = state.user_id, %err, "strategy failed while handling callback");
                self.force_exit(
                    cancel,
                    state,
                    chat_id,
                    query.message_id,
                    "strategy failed while handling callback",
                )
                .await;
            }
        }
    }

    async fn handle_action_callback(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id: i64,
        action: &str,
    ) {
        let record_state = state.record_fsm.current();
        match action {
            ACTION_CANCEL_SECTION if record_state == RecordState::AnsweringQuestion => {
                tracing::info!(user_id = state.user_id, "section input cancelled");
                if let Err(err) = self
                    .fire_record_event(cancel, state, chat_id, RecordEvent::CancelSection, message_id)
                    .await
                {
                    tracing::error!(user_id = state.user_id, %err, "failed to cancel section");
                }
            }
            ACTION_SAVE_RECORD if record_state == RecordState::SelectingSection => {
                tracing::info!(user_id = state.user_id, "record save requested");
                if let Err(err) = self
                    .fire_record_event(cancel, state, chat_id, RecordEvent::SaveRecord, message_id)
                    .await
                {
                    tracing::error!(user_id = state.user_id, %err, "failed to save record");
                }
            }
            ACTION_NEW_RECORD if record_state == RecordState::SelectingSection => {
                tracing::info!(user_id = state.user_id, "draft reset requested");
                self.reset_current_record(cancel, state, chat_id, message_id).await;
            }
            ACTION_EXIT_MENU if record_state == RecordState::SelectingSection => {
                tracing::info!(user_id = state.user_id, "exit to menu requested");
                if let Err(err) = self
                    .fire_record_event(cancel, state, chat_id, RecordEvent::ExitToMenu, message_id)
                    .await
                {
                    tracing::error!(user_id = state.user_id, %err, "failed to exit to menu");
                }
            }
            ACTION_SHARE_LAST => {
                tracing::info!(user_id = state.user_id, "share of last record requested");
                self.share_last_record(cancel, state, chat_id).await;
            }
            other => {
                tracing::debug!(
                    user_id = state.user_id,
                    action = other,
                    state = record_state.name(),
                    "action callback ignored in this state"
                );
            }
        }
    }

    /// Applies a strategy verdict: feedback, re-render, or progression.
    async fn apply_answer_result(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        result: AnswerResult,
        message_id: i64,
    ) {
        if let Some(feedback) = &result.feedback {
            let _ = self.port.send(cancel, chat_id, feedback, Markup::None).await;
        }

        if result.repeat && !result.advance {
            self.ask_current_question(cancel, state, chat_id, message_id).await;
            return;
        }

        if result.advance {
            self.advance_after_answer(cancel, state, chat_id, message_id).await;
        }
    }

    /// Progression: next question within the section, or section complete.
    ///
    /// The answer-question self-loop is refused by the machine; the refusal
    /// is the signal to re-enter the answering state by hand.
    async fn advance_after_answer(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id: i64,
    ) {
        let Some(section) = self.survey.section(&state.current_section) else {
            let last = state.last_message_id;
            self.force_exit(cancel, state, chat_id, last, "invalid state while advancing").await;
            return;
        };

        let next_index = state.current_question + 1;
        let event = if next_index < section.questions.len() {
            state.current_question = next_index;
            tracing::debug!(user_id = state.user_id, index = next_index, "advancing to next question");
            RecordEvent::AnswerQuestion
        } else {
            state.current_question = 0;
            state.current_section.clear();
            tracing::debug!(user_id = state.user_id, "section complete");
            RecordEvent::SectionComplete
        };

        match self.fire_record_event(cancel, state, chat_id, event, message_id).await {
            Ok(()) => {}
            Err(err) if err.is_no_transition() => {
                self.ask_current_question(cancel, state, chat_id, message_id).await;
            }
            Err(err) => {
                tracing::error!(user_id = state.user_id, %err, "progression event failed");
                let _ = self
                    .port
                    .send(cancel, chat_id, "An internal error occurred.", Markup::None)
                    .await;
            }
        }
    }

    /// Deletes the participant's own free-text answer message when enabled.
    async fn delete_answered_message(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        message_id: i64,
        question_kind: &str,
    ) {
        if message_id == 0 || !self.settings.delete_user_messages {
            return;
        }
        if !question_kind.trim().eq_ignore_ascii_case(TYPE_TEXT) {
            return;
        }
        if let Err(err) = self.port.delete(cancel, chat_id, message_id).await {
            tracing::warn!(chat_id, message_id, code = err.code(), %err, "failed to delete answer message");
        }
    }
}
