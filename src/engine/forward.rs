//! The forward pipeline: aggregate the latest record, render it as text,
//! send it, and conditionally clear state.
//!
//! A failed forward must leave state byte-identical; every mutation in this
//! module happens strictly after the outbound send succeeded.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::target;
use crate::domain::state::UserState;
use crate::domain::survey::{Record, Survey};
use crate::ports::Markup;

use super::Engine;

/// Literal substituted for missing or empty answers.
const NO_ANSWER_PLACEHOLDER: &str = "no_answer";

/// Which record the pipeline picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardSource {
    /// Index into the saved records list.
    Saved(usize),
    /// The current draft.
    Draft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ForwardQuestion {
    prompt: String,
    answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ForwardSection {
    title: String,
    questions: Vec<ForwardQuestion>,
}

/// Aggregated answers ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ForwardPayload {
    user_id: i64,
    user_name: String,
    created_at: String,
    sections: Vec<ForwardSection>,
}

impl Engine {
    /// Forwards the latest record to the configured reviewer; clears the
    /// forwarded record on success.
    pub(crate) async fn forward_to_reviewer(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
    ) {
        let target_id = target::get();
        self.forward_with_target(
            cancel,
            state,
            chat_id,
            target_id,
            true,
            true,
            format!("Answers sent to ID {target_id}."),
        )
        .await;
    }

    /// Forwards the latest record back to the requester. Never clears state.
    pub(crate) async fn forward_to_self(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
    ) {
        self.forward_with_target(
            cancel,
            state,
            chat_id,
            chat_id,
            false,
            false,
            "Answers sent to you in this chat.".to_string(),
        )
        .await;
    }

    async fn forward_with_target(
        &self,
        cancel: &CancellationToken,
        state: &mut UserState,
        chat_id: i64,
        target_id: i64,
        clear_on_success: bool,
        require_configured: bool,
        success_text: String,
    ) {
        let Some((source, record_id, text)) = self.prepare_forward(state) else {
            let _ = self
                .port
                .send(cancel, chat_id, "No answers to send.", Markup::None)
                .await;
            return;
        };

        if require_configured && target_id == 0 {
            tracing::warn!("reviewer target id is not configured");
            let _ = self
                .port
                .send(
                    cancel,
                    chat_id,
                    "TARGET_USER_ID is not configured; sending is unavailable.",
                    Markup::None,
                )
                .await;
            return;
        }

        if text.is_empty() {
            tracing::warn!(user_id = state.user_id, "rendered forward text is empty");
            let _ = self
                .port
                .send(cancel, chat_id, "No data to send.", Markup::None)
                .await;
            return;
        }

        tracing::info!(
            user_id = state.user_id,
            record_id = %record_id,
            target_id,
            clear = clear_on_success,
            "forwarding record"
        );
        if let Err(err) = self.port.send(cancel, target_id, &text, Markup::None).await {
            tracing::error!(
                user_id = state.user_id,
                target_id,
                code = err.code(),
                %err,
                "forward send failed"
            );
            let _ = self
                .port
                .send(
                    cancel,
                    chat_id,
                    "Could not send the answers, please try again later.",
                    Markup::None,
                )
                .await;
            return;
        }

        if clear_on_success {
            if target_id == chat_id {
                tracing::warn!(
                    target_id,
                    chat_id,
                    "reviewer target equals the requester chat; check configuration if a different recipient was expected"
                );
            }
            clear_forwarded(state, source);
        }

        let _ = self.port.send(cancel, chat_id, &success_text, Markup::None).await;
    }

    /// Re-renders the latest saved record so the participant can copy it.
    pub(crate) async fn share_last_record(
        &self,
        cancel: &CancellationToken,
        state: &UserState,
        chat_id: i64,
    ) {
        let Some(index) = state.latest_saved_index() else {
            let _ = self
                .port
                .send(cancel, chat_id, "No saved records to share.", Markup::None)
                .await;
            return;
        };

        let payload = build_forward_payload(
            &self.survey,
            &state.records[index],
            state.user_id,
            &state.user_name,
        );
        let text = render_forward_message(&payload);
        let _ = self
            .port
            .send(
                cancel,
                chat_id,
                &format!("To share, copy the text below:\n\n---\n{text}\n---"),
                Markup::None,
            )
            .await;
    }

    /// Selects the record to forward and renders it, without mutating state.
    fn prepare_forward(&self, state: &UserState) -> Option<(ForwardSource, String, String)> {
        let (source, record) = select_record_for_forward(state)?;
        let payload =
            build_forward_payload(&self.survey, record, state.user_id, &state.user_name);
        Some((source, record.id.clone(), render_forward_message(&payload)))
    }
}

/// The most recent saved record wins; the current draft is the fallback.
fn select_record_for_forward(state: &UserState) -> Option<(ForwardSource, &Record)> {
    if let Some(index) = state.latest_saved_index() {
        return Some((ForwardSource::Saved(index), &state.records[index]));
    }
    state
        .current_record
        .as_ref()
        .map(|record| (ForwardSource::Draft, record))
}

/// Drops exactly the forwarded record and zeroes the in-section position.
fn clear_forwarded(state: &mut UserState, source: ForwardSource) {
    match source {
        ForwardSource::Saved(index) => {
            state.records.remove(index);
        }
        ForwardSource::Draft => {
            state.current_record = None;
        }
    }
    state.reset_position();
    state.clear_prompt();
}

/// Walks the schema in deterministic order and collects every answer,
/// substituting [`NO_ANSWER_PLACEHOLDER`] for missing or empty values.
pub(crate) fn build_forward_payload(
    survey: &Survey,
    record: &Record,
    user_id: i64,
    user_name: &str,
) -> ForwardPayload {
    let sections = survey
        .sections
        .iter()
        .map(|(_, section)| ForwardSection {
            title: section.title.clone(),
            questions: section
                .questions
                .iter()
                .map(|question| {
                    let answer = record
                        .data
                        .get(&question.store_key)
                        .filter(|value| !value.is_empty())
                        .cloned()
                        .unwrap_or_else(|| NO_ANSWER_PLACEHOLDER.to_string());
                    ForwardQuestion {
                        prompt: question.prompt.clone(),
                        answer,
                    }
                })
                .collect(),
        })
        .collect();

    let created = record.created_at.unwrap_or_else(Utc::now);

    ForwardPayload {
        user_id,
        user_name: user_name.to_string(),
        created_at: created.format("%d.%m.%Y %H:%M").to_string(),
        sections,
    }
}

/// Renders the fixed forward template.
pub(crate) fn render_forward_message(payload: &ForwardPayload) -> String {
    let mut out = format!(
        "Survey answers from {} (ID: {})\nRecorded at: {}\n",
        payload.user_name, payload.user_id, payload.created_at
    );
    for section in &payload.sections {
        out.push_str(&format!("## {}\n", section.title));
        for question in &section.questions {
            out.push_str(&format!("- {}:\n  {}\n", question.prompt, question.answer));
        }
        out.push('\n');
    }
    out
}
