//! Question strategies: the rendering and answer-handling contract per
//! question type.
//!
//! A strategy owns everything type-specific about a question: validating its
//! slice of the schema, describing the prompt (text plus structured markup),
//! and folding one answer input into the draft record. Strategies never
//! perform I/O; the engine sends whatever they describe and applies the
//! returned [`AnswerResult`].

mod buttons;
mod registry;
mod text;
mod text_rating;

use thiserror::Error;

use crate::domain::survey::{Question, Record, SchemaError, Section};
use crate::ports::{ChatMessage, InlineKeyboard};

pub use buttons::ButtonsStrategy;
pub use registry::StrategyRegistry;
pub use text::TextStrategy;
pub use text_rating::TextRatingStrategy;

/// Built-in type tags.
pub const TYPE_TEXT: &str = "text";
pub const TYPE_BUTTONS: &str = "buttons";
pub const TYPE_TEXT_RATING: &str = "text_rating";

/// Capability set registered per question type.
pub trait QuestionStrategy: Send + Sync {
    /// Registry key; matched case-insensitively against the schema type tag.
    fn name(&self) -> &'static str;

    /// Checks the type-specific subset of a question definition.
    fn validate(&self, section_id: &str, question: &Question) -> Result<(), SchemaError>;

    /// Describes the prompt for the current question (and, for multi-step
    /// strategies, the current step stored in the draft).
    fn render(&self, ctx: &RenderContext<'_>) -> Result<PromptSpec, StrategyError>;

    /// Folds one answer input into the draft and tells the engine how to
    /// proceed.
    fn handle_answer(
        &self,
        ctx: &mut AnswerContext<'_>,
        input: AnswerInput<'_>,
    ) -> Result<AnswerResult, StrategyError>;
}

/// Read-only context for prompt rendering.
#[derive(Debug)]
pub struct RenderContext<'a> {
    pub chat_id: i64,
    /// Message id of the prompt to edit; 0 when there is none.
    pub message_id: i64,
    /// Handle of the last outbound prompt (edit-vs-send is the caller's
    /// decision; strategies only read this).
    pub last_prompt: &'a ChatMessage,
    pub record: &'a Record,
    pub section_id: &'a str,
    pub section: &'a Section,
    pub question: &'a Question,
    /// Prefix for button callback payloads, e.g. `"answer:"`.
    pub callback_prefix: &'a str,
}

/// Context for answer handling: the render fields plus a mutable draft
/// borrow and the callback id (empty for free-text input).
#[derive(Debug)]
pub struct AnswerContext<'a> {
    pub chat_id: i64,
    pub message_id: i64,
    pub last_prompt: &'a ChatMessage,
    pub record: &'a mut Record,
    pub section_id: &'a str,
    pub section: &'a Section,
    pub question: &'a Question,
    pub callback_prefix: &'a str,
    pub callback_id: &'a str,
}

/// What to show for a question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSpec {
    pub text: String,
    /// Inline markup; the caller appends its own cancel row either way.
    pub keyboard: Option<InlineKeyboard>,
    /// When true the caller sends a fresh message instead of editing.
    pub force_new: bool,
}

/// One inbound answer, already classified by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerInput<'a> {
    /// Free-text message body.
    Text(&'a str),
    /// Decoded callback payload (the part after `answer:<question-id>:`).
    Callback(&'a str),
}

/// Verdict returned by [`QuestionStrategy::handle_answer`].
///
/// - `advance` - run the progression procedure (next question or
///   section-complete)
/// - `repeat` without `advance` - re-render the same question, sending
///   `feedback` as a separate short message first when present
/// - neither - the strategy handled progression internally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerResult {
    pub advance: bool,
    pub repeat: bool,
    pub feedback: Option<String>,
}

impl AnswerResult {
    /// Answer accepted; move on.
    pub fn advance() -> Self {
        Self {
            advance: true,
            ..Self::default()
        }
    }

    /// Re-render the same question.
    pub fn repeat() -> Self {
        Self {
            repeat: true,
            ..Self::default()
        }
    }

    /// Re-render the same question after showing a short notice.
    pub fn repeat_with(feedback: impl Into<String>) -> Self {
        Self {
            repeat: true,
            feedback: Some(feedback.into()),
            ..Self::default()
        }
    }
}

/// Strategy failure, distinct from an ordinary [`AnswerResult`]. The engine
/// reacts with a force-exit, never by showing the error to the participant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("question '{question}' is in unknown step '{step}'")]
    UnknownStep { question: String, step: String },
}
