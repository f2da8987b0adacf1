//! Recording fake chat port for headless tests.
//!
//! Captures every operation, hands out a synthetic message-id sequence, and
//! can be scripted to fail the next call of a given operation. This is the
//! harness behind all engine scenario tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ports::{ChatError, ChatMessage, ChatPort, Markup};

/// One captured port operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub op: &'static str,
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub markup: Markup,
    pub callback_id: String,
}

#[derive(Debug, Default)]
struct FakeInner {
    calls: Vec<RecordedCall>,
    next_message_id: i64,
    fail_next: HashMap<String, ChatError>,
}

/// In-memory [`ChatPort`] implementation.
#[derive(Debug, Default)]
pub struct FakeChatPort {
    inner: Mutex<FakeInner>,
}

impl FakeChatPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next call of `op` (`"send"`, `"edit"`,
    /// `"answer_callback"`, `"delete"`) to fail with `err`.
    pub fn fail_next(&self, op: &str, err: ChatError) {
        self.inner
            .lock()
            .expect("fake port lock")
            .fail_next
            .insert(op.to_string(), err);
    }

    /// All captured calls, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().expect("fake port lock").calls.clone()
    }

    /// Captured calls of one operation.
    pub fn calls_for(&self, op: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// The most recent call of one operation.
    pub fn last_call(&self, op: &str) -> Option<RecordedCall> {
        self.calls().into_iter().rev().find(|c| c.op == op)
    }

    fn check(&self, cancel: &CancellationToken, op: &'static str) -> Result<(), ChatError> {
        if cancel.is_cancelled() {
            return Err(ChatError::Canceled);
        }
        let mut inner = self.inner.lock().expect("fake port lock");
        if let Some(err) = inner.fail_next.remove(op) {
            return Err(err);
        }
        Ok(())
    }

    fn record(&self, call: RecordedCall) {
        self.inner.lock().expect("fake port lock").calls.push(call);
    }

    fn next_message_id(&self) -> i64 {
        let mut inner = self.inner.lock().expect("fake port lock");
        inner.next_message_id += 1;
        inner.next_message_id
    }
}

#[async_trait]
impl ChatPort for FakeChatPort {
    async fn send(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        text: &str,
        markup: Markup,
    ) -> Result<ChatMessage, ChatError> {
        self.check(cancel, "send")?;
        let message_id = self.next_message_id();
        self.record(RecordedCall {
            op: "send",
            chat_id,
            message_id,
            text: text.to_string(),
            markup,
            callback_id: String::new(),
        });
        Ok(ChatMessage::new(chat_id, message_id, "fake").with_payload(text))
    }

    async fn edit(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Markup,
    ) -> Result<ChatMessage, ChatError> {
        self.check(cancel, "edit")?;
        self.record(RecordedCall {
            op: "edit",
            chat_id,
            message_id,
            text: text.to_string(),
            markup,
            callback_id: String::new(),
        });
        Ok(ChatMessage::new(chat_id, message_id, "fake").with_payload(text))
    }

    async fn answer_callback(
        &self,
        cancel: &CancellationToken,
        callback_id: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        self.check(cancel, "answer_callback")?;
        self.record(RecordedCall {
            op: "answer_callback",
            chat_id: 0,
            message_id: 0,
            text: text.to_string(),
            markup: Markup::None,
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), ChatError> {
        self.check(cancel, "delete")?;
        self.record(RecordedCall {
            op: "delete",
            chat_id,
            message_id,
            text: String::new(),
            markup: Markup::None,
            callback_id: String::new(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_assigns_increasing_message_ids() {
        let port = FakeChatPort::new();
        let cancel = CancellationToken::new();

        let first = port.send(&cancel, 1, "a", Markup::None).await.unwrap();
        let second = port.send(&cancel, 1, "b", Markup::None).await.unwrap();

        assert_eq!(first.message_id, 1);
        assert_eq!(second.message_id, 2);
        assert_eq!(first.transport, "fake");
        assert_eq!(port.calls_for("send").len(), 2);
    }

    #[tokio::test]
    async fn edit_keeps_the_given_message_id() {
        let port = FakeChatPort::new();
        let cancel = CancellationToken::new();

        let handle = port.edit(&cancel, 1, 42, "edited", Markup::None).await.unwrap();
        assert_eq!(handle.message_id, 42);
        assert_eq!(port.last_call("edit").unwrap().text, "edited");
    }

    #[tokio::test]
    async fn scripted_failure_fires_once() {
        let port = FakeChatPort::new();
        let cancel = CancellationToken::new();
        port.fail_next("send", ChatError::rate_limited(5));

        let first = port.send(&cancel, 1, "a", Markup::None).await;
        assert!(matches!(first, Err(ChatError::RateLimited { .. })));

        let second = port.send(&cancel, 1, "b", Markup::None).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_without_recording() {
        let port = FakeChatPort::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = port.send(&cancel, 1, "a", Markup::None).await;
        assert_eq!(result.unwrap_err(), ChatError::Canceled);
        assert!(port.calls().is_empty());
    }

    #[tokio::test]
    async fn answer_callback_records_the_callback_id() {
        let port = FakeChatPort::new();
        let cancel = CancellationToken::new();

        port.answer_callback(&cancel, "cb-1", "notice").await.unwrap();
        let call = port.last_call("answer_callback").unwrap();
        assert_eq!(call.callback_id, "cb-1");
        assert_eq!(call.text, "notice");
    }
}
