//! Chat Port - Interface between the conversation engine and chat transports.
//!
//! The engine renders prompts and menus in terms of this port; adapters
//! (Telegram, the recording fake) translate the calls into a concrete wire
//! protocol. Markup is structured data here and is serialized by the adapter,
//! never by the engine.
//!
//! # Design
//!
//! - Four operations: send, edit, acknowledge a callback, delete
//! - Every operation takes a cancellation token and returns a typed error
//!   without touching the wire when the token is already cancelled
//! - Successful send/edit returns a [`ChatMessage`] handle with a non-zero
//!   message id; the engine uses it to choose edit-vs-send on the next prompt

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Port for outbound chat operations.
///
/// Implementations connect to a chat service and translate between its API
/// and the engine's transport-agnostic types.
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Send a new message to a chat.
    async fn send(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        text: &str,
        markup: Markup,
    ) -> Result<ChatMessage, ChatError>;

    /// Edit the text and markup of an existing message.
    ///
    /// Calling this with `message_id == 0` is undefined; the engine never
    /// does so.
    async fn edit(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Markup,
    ) -> Result<ChatMessage, ChatError>;

    /// Acknowledge a callback query, optionally with a short notice.
    async fn answer_callback(
        &self,
        cancel: &CancellationToken,
        callback_id: &str,
        text: &str,
    ) -> Result<(), ChatError>;

    /// Delete a previously sent message.
    async fn delete(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), ChatError>;
}

/// Handle for a message the port has sent or edited.
///
/// Adapter-agnostic: the engine stores the most recent handle per participant
/// and only ever reads `chat_id`/`message_id` from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub chat_id: i64,
    pub message_id: i64,
    /// Transport tag, e.g. `"telegram"` or `"fake"`.
    pub transport: String,
    /// The rendered text as the adapter shipped it.
    pub payload: String,
    /// Opaque adapter metadata.
    pub meta: HashMap<String, String>,
}

impl ChatMessage {
    /// Creates a handle for a message on the given transport.
    pub fn new(chat_id: i64, message_id: i64, transport: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            transport: transport.into(),
            payload: String::new(),
            meta: HashMap::new(),
        }
    }

    /// Attaches the rendered payload.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Attaches one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Returns true when this handle refers to no message.
    pub fn is_empty(&self) -> bool {
        self.message_id == 0
    }
}

/// Structured markup attached to an outbound message.
///
/// Transport-opaque from the engine's perspective: adapters decide how (and
/// whether) each variant serializes. An adapter that cannot express the
/// requested variant for an operation returns [`ChatError::BadPayload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Markup {
    /// No markup at all.
    #[default]
    None,
    /// Inline keyboard attached to the message.
    Inline(InlineKeyboard),
    /// Persistent reply keyboard shown under the input field.
    Reply(ReplyKeyboard),
    /// Remove any persistent reply keyboard.
    RemoveReply,
}

/// Inline keyboard: rows of callback buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// Creates an empty keyboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one row of buttons.
    pub fn push_row(&mut self, row: Vec<InlineButton>) {
        self.rows.push(row);
    }

    /// Builder form of [`InlineKeyboard::push_row`].
    pub fn with_row(mut self, row: Vec<InlineButton>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A single inline button carrying a callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Reply keyboard: rows of plain text buttons the participant taps or types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
    pub resize: bool,
}

impl ReplyKeyboard {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows, resize: true }
    }
}

/// Normalized transport failure.
///
/// Adapters fold provider-specific failures into this fixed taxonomy so the
/// engine can react uniformly (see the propagation rules in the engine).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// The edit would not change the message. Success-equivalent for the
    /// engine: the prior message id stays valid.
    #[error("message not modified")]
    MessageNotModified,

    /// The transport is throttling us; retry no earlier than `retry_after`.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The transport rejected the request as malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The adapter does not recognize the markup for this operation.
    #[error("unsupported markup: {0}")]
    BadPayload(String),

    /// The cancellation token was triggered before or during the call.
    #[error("operation canceled")]
    Canceled,

    /// The operation deadline elapsed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The transport refused the operation for this chat.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Anything the adapter could not classify.
    #[error("transport failure: {0}")]
    Unknown(String),
}

impl ChatError {
    /// Creates a rate-limited error with the given retry hint in seconds.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        ChatError::RateLimited {
            retry_after: Duration::from_secs(retry_after_secs),
        }
    }

    /// Returns true for the not-modified pseudo-failure.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, ChatError::MessageNotModified)
    }

    /// Stable snake_case code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::MessageNotModified => "message_not_modified",
            ChatError::RateLimited { .. } => "rate_limited",
            ChatError::BadRequest(_) => "bad_request",
            ChatError::BadPayload(_) => "bad_payload",
            ChatError::Canceled => "context_canceled",
            ChatError::DeadlineExceeded => "context_deadline",
            ChatError::Forbidden(_) => "forbidden",
            ChatError::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_handle_has_zero_message_id() {
        let handle = ChatMessage::default();
        assert!(handle.is_empty());
        assert_eq!(handle.message_id, 0);
    }

    #[test]
    fn handle_builder_populates_fields() {
        let handle = ChatMessage::new(7, 42, "fake")
            .with_payload("hello")
            .with_meta("markup_type", "inline");

        assert_eq!(handle.chat_id, 7);
        assert_eq!(handle.message_id, 42);
        assert_eq!(handle.transport, "fake");
        assert_eq!(handle.payload, "hello");
        assert_eq!(handle.meta.get("markup_type").map(String::as_str), Some("inline"));
        assert!(!handle.is_empty());
    }

    #[test]
    fn inline_keyboard_rows_accumulate_in_order() {
        let mut keyboard = InlineKeyboard::new();
        assert!(keyboard.is_empty());

        keyboard.push_row(vec![InlineButton::new("A", "a")]);
        keyboard.push_row(vec![InlineButton::new("B", "b"), InlineButton::new("C", "c")]);

        assert_eq!(keyboard.rows.len(), 2);
        assert_eq!(keyboard.rows[0][0].callback_data, "a");
        assert_eq!(keyboard.rows[1][1].text, "C");
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ChatError::MessageNotModified.code(), "message_not_modified");
        assert_eq!(ChatError::rate_limited(3).code(), "rate_limited");
        assert_eq!(ChatError::Canceled.code(), "context_canceled");
        assert_eq!(ChatError::DeadlineExceeded.code(), "context_deadline");
    }

    #[test]
    fn rate_limited_carries_retry_hint() {
        let err = ChatError::rate_limited(17);
        match err {
            ChatError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(17));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn is_not_modified_only_matches_the_pseudo_failure() {
        assert!(ChatError::MessageNotModified.is_not_modified());
        assert!(!ChatError::BadRequest("x".into()).is_not_modified());
    }
}
