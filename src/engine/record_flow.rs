//! Record-session flow: section selection, question prompts, and the ways a
//! session ends.
//!
//! These are the on-entry procedures of the record machine. The dispatcher
//! fires events through [`Engine::fire_record_event`]; a successful
//! transition runs the procedure matching the new state. Per-user state is
//! mutated only while the dispatcher holds the entry mutex.

use tokio_util::sync::CancellationToken;

use crate::domain::fsm::{RecordEvent, RecordState, TransitionError};
use crate::domain::questions::RenderContext;
use crate::domain::state::UserState;
use crate::domain::survey::{Question, Record, Section};
use crate::ports::{ChatError, InlineButton, InlineKeyboard, Markup};

use super::{
    Engine, ACTION_CANCEL_SECTION, ACTION_EXIT_MENU, ACTION_SAVE_RECORD, CALLBACK_ACTION_PREFIX,
    CALLBACK_ANSWER_PREFIX, CALLBACK_SECTION_PREFIX,
};

impl Engine {
    /// Fires an event on the record machine and runs the on-entry procedure
    /// of the new state.
    ///
    /// Refused transitions are returned to the caller untouched; the
    /// dispatcher decides whether a no-transition refusal means "re-enter by
    /// hand".
    pub(crate) async fn fire_record_event(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        event: RecordEvent,
        message_id: i64,
    ) -> Result<(), TransitionError> {
        let target = state.record_fsm.fire(event)?;
        match target {
            RecordState::SelectingSection => {
                self.enter_selecting_section(cancel, state, chat_id, message_id).await;
            }
            RecordState::AnsweringQuestion => {
                self.ask_current_question(cancel, state, chat_id, message_id).await;
            }
            RecordState::Idle => {
                self.enter_record_idle(cancel, state, chat_id, event, message_id, None).await;
            }
        }
        Ok(())
    }

    /// Universal safety transition: back to record-idle, keeping the draft
    /// and surfacing `reason` to the participant.
    pub(crate) async fn force_exit(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id: i64,
        reason: &str,
    ) {
        tracing::warn!(user_id = state.user_id, reason, "force-exiting record session");
        if state.record_fsm.fire(RecordEvent::ForceExit).is_err() {
            // Not in a state the table covers; put the machine down by hand.
            state.record_fsm.force(RecordState::Idle);
        }
        self.enter_record_idle(
            cancel,
            state,
            chat_id,
            RecordEvent::ForceExit,
            message_id,
            Some(reason),
        )
        .await;
    }

    /// Starts a new record session, or resumes the existing draft.
    pub(crate) async fn start_or_resume_record(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
    ) {
        if state.current_record.is_none() {
            tracing::info!(user_id = state.user_id, "starting a new record");
            state.current_record = Some(Record::new());
        } else {
            tracing::info!(user_id = state.user_id, "resuming existing draft");
        }
        state.current_section.clear();
        state.current_question = 0;

        if let Err(err) = self
            .fire_record_event(cancel, state, chat_id, RecordEvent::StartRecord, 0)
            .await
        {
            tracing::error!(user_id = state.user_id, %err, "could not start record session");
            let _ = self
                .port
                .send(
                    cancel,
                    chat_id,
                    "Could not start record entry. Please try again later.",
                    Markup::None,
                )
                .await;
            if !state.record_fsm.is_idle() {
                state.record_fsm.force(RecordState::Idle);
            }
        }
    }

    /// Replaces the draft with a fresh record and re-renders the section menu.
    pub(crate) async fn reset_current_record(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id: i64,
    ) {
        state.current_record = Some(Record::new());
        state.current_section.clear();
        state.current_question = 0;
        self.enter_selecting_section(cancel, state, chat_id, message_id).await;
    }

    /// Shows the section-selection keyboard: one button per section in sorted
    /// order, answered sections check-marked, then the save/exit action row.
    pub(crate) async fn enter_selecting_section(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id: i64,
    ) {
        let prompt = "Choose a section to fill in or edit, or pick an action:";

        let draft = state.draft_mut();
        let mut keyboard = InlineKeyboard::new();
        for (section_id, section) in &self.survey.sections {
            let mut label = section.title.clone();
            if draft.section_has_data(section) {
                label.push_str(" ✅");
            }
            keyboard.push_row(vec![InlineButton::new(
                label,
                format!("{CALLBACK_SECTION_PREFIX}{section_id}"),
            )]);
        }
        keyboard.push_row(vec![
            InlineButton::new(
                "💾 Save record",
                format!("{CALLBACK_ACTION_PREFIX}{ACTION_SAVE_RECORD}"),
            ),
            InlineButton::new(
                "⬆️ Exit to menu",
                format!("{CALLBACK_ACTION_PREFIX}{ACTION_EXIT_MENU}"),
            ),
        ]);

        let effective = if message_id != 0 {
            message_id
        } else {
            state.last_message_id
        };

        let sent = if effective != 0 {
            self.port
                .edit(cancel, chat_id, effective, prompt, Markup::Inline(keyboard))
                .await
        } else {
            self.port
                .send(cancel, chat_id, prompt, Markup::Inline(keyboard))
                .await
        };

        match sent {
            Ok(handle) => {
                tracing::debug!(
                    user_id = state.user_id,
                    message_id = handle.message_id,
                    "section menu shown"
                );
                state.remember_prompt(handle.with_payload(prompt));
            }
            Err(err) if err.is_not_modified() => {
                state.last_message_id = effective;
                state.last_prompt.chat_id = chat_id;
                state.last_prompt.message_id = effective;
            }
            Err(ChatError::RateLimited { retry_after }) => {
                tracing::warn!(
                    user_id = state.user_id,
                    ?retry_after,
                    "rate limited while showing section menu; abandoning"
                );
            }
            Err(err) => {
                tracing::error!(user_id = state.user_id, code = err.code(), %err, "failed to show section menu");
                self.force_exit(cancel, state, chat_id, 0, "error displaying section menu").await;
            }
        }
    }

    /// Renders the current question via its strategy and shows it, appending
    /// the trailing cancel row to whatever markup the strategy produced.
    pub(crate) async fn ask_current_question(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        message_id_to_edit: i64,
    ) {
        let Some((section_id, section, question)) = self.resolve_current_question(state) else {
            tracing::error!(
                user_id = state.user_id,
                section = %state.current_section,
                index = state.current_question,
                "question position does not resolve against the schema"
            );
            let last = state.last_message_id;
            self.force_exit(cancel, state, chat_id, last, "invalid question position").await;
            return;
        };
        let Some(strategy) = self.registry.get(&question.kind) else {
            tracing::error!(kind = %question.kind, "no strategy registered for question type");
            let last = state.last_message_id;
            self.force_exit(cancel, state, chat_id, last, "missing question strategy").await;
            return;
        };

        let last_message_id = state.last_message_id;
        let rendered = {
            let UserState {
                ref mut current_record,
                ref last_prompt,
                ..
            } = *state;
            let record: &Record = current_record.get_or_insert_with(Record::new);
            let ctx = RenderContext {
                chat_id,
                message_id: message_id_to_edit,
                last_prompt,
                record,
                section_id: &section_id,
                section,
                question,
                callback_prefix: CALLBACK_ANSWER_PREFIX,
            };
            strategy.render(&ctx)
        };
        let prompt = match rendered {
            Ok(prompt) => prompt,
            Err(err) => {
                tracing::error!(question = %question.id, %err, "strategy failed to render");
                self.force_exit(cancel, state, chat_id, last_message_id, "failed to prepare question")
                    .await;
                return;
            }
        };

        let mut keyboard = prompt.keyboard.unwrap_or_default();
        keyboard.push_row(vec![InlineButton::new(
            "⬅️ Back to section list",
            format!("{CALLBACK_ACTION_PREFIX}{ACTION_CANCEL_SECTION}"),
        )]);

        let mut effective = message_id_to_edit;
        if effective == 0 && last_message_id != 0 && !prompt.force_new {
            effective = last_message_id;
        }
        let is_edit = effective != 0 && !prompt.force_new;

        let sent = if is_edit {
            self.port
                .edit(cancel, chat_id, effective, &prompt.text, Markup::Inline(keyboard))
                .await
        } else {
            self.port
                .send(cancel, chat_id, &prompt.text, Markup::Inline(keyboard))
                .await
        };

        match sent {
            Ok(handle) => {
                tracing::debug!(
                    user_id = state.user_id,
                    question = %question.id,
                    message_id = handle.message_id,
                    "question prompt shown"
                );
                state.remember_prompt(handle.with_payload(prompt.text));
            }
            Err(err) if is_edit && err.is_not_modified() => {
                state.last_message_id = effective;
                state.last_prompt.chat_id = chat_id;
                state.last_prompt.message_id = effective;
            }
            Err(ChatError::RateLimited { retry_after }) => {
                tracing::warn!(
                    user_id = state.user_id,
                    ?retry_after,
                    "rate limited while showing question; abandoning"
                );
            }
            Err(err) => {
                tracing::error!(
                    user_id = state.user_id,
                    question = %question.id,
                    code = err.code(),
                    %err,
                    "failed to show question prompt"
                );
                self.force_exit(cancel, state, chat_id, 0, "failed to show question").await;
            }
        }
    }

    /// Finishes a record session. The triggering event decides the final
    /// message and whether the draft survives.
    pub(crate) async fn enter_record_idle(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        event: RecordEvent,
        message_id: i64,
        failure_reason: Option<&str>,
    ) {
        tracing::debug!(
            user_id = state.user_id,
            event = event.name(),
            message_id,
            "entering record idle"
        );

        let final_text: String;
        let mut clear_draft = false;

        match event {
            RecordEvent::SaveRecord => {
                clear_draft = true;
                if let Some(mut draft) = state.current_record.take() {
                    let nanos = draft.finalize(state.user_id, state.last_save_nanos);
                    state.last_save_nanos = nanos;
                    tracing::info!(
                        user_id = state.user_id,
                        record_id = %draft.id,
                        total = state.records.len() + 1,
                        "record saved"
                    );
                    state.records.push(draft);
                    final_text = "✅ Record saved!".to_string();
                } else {
                    tracing::error!(user_id = state.user_id, "no draft present at save time");
                    final_text = "⚠️ No draft found to save.".to_string();
                }
            }
            RecordEvent::ExitToMenu => {
                final_text = "Left record entry. The draft is kept for later.".to_string();
            }
            RecordEvent::ForceExit => {
                let reason = failure_reason.unwrap_or("internal error");
                final_text =
                    format!("⚠️ An error occurred ({reason}). Input interrupted. Draft saved.");
            }
            other => {
                tracing::warn!(
                    user_id = state.user_id,
                    event = other.name(),
                    "record idle entered via unexpected event"
                );
                clear_draft = true;
                final_text = "Operation complete.".to_string();
            }
        }

        state.reset_position();
        if clear_draft {
            state.current_record = None;
        }

        if message_id != 0 {
            let edited = self
                .port
                .edit(
                    cancel,
                    chat_id,
                    message_id,
                    &final_text,
                    Markup::Inline(InlineKeyboard::new()),
                )
                .await;
            match edited {
                Ok(_) => {}
                Err(err) if err.is_not_modified() => {}
                Err(err) => {
                    tracing::error!(user_id = state.user_id, code = err.code(), %err, "failed to edit final status, sending fresh");
                    let _ = self.port.send(cancel, chat_id, &final_text, Markup::None).await;
                }
            }
        } else {
            let _ = self.port.send(cancel, chat_id, &final_text, Markup::None).await;
        }

        self.send_main_menu(cancel, state).await;
    }

    /// Resolves the schema entities the participant is currently on.
    ///
    /// Returns a cloned section id so callers can keep mutating `state`.
    pub(crate) fn resolve_current_question(
        &self,
        state: &UserState,
    ) -> Option<(String, &Section, &Question)> {
        let (section, question) = self
            .survey
            .question_at(&state.current_section, state.current_question)?;
        Some((state.current_section.clone(), section, question))
    }
}
