//! Telegram Bot API adapter.
//!
//! Implements the chat port over HTTPS and long-polls `getUpdates`,
//! converting wire updates into the engine's transport-agnostic model. API
//! failures are folded into the fixed [`ChatError`] taxonomy; the quirky
//! "message is not modified" response becomes
//! [`ChatError::MessageNotModified`] so the engine can treat it as an
//! idempotent success.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::engine::{CallbackQuery, IncomingMessage, Sender, Update};
use crate::ports::{ChatError, ChatMessage, ChatPort, Markup};

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra slack on top of the long-poll timeout before the HTTP client gives
/// up.
const POLL_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Telegram implementation of the chat port.
pub struct TelegramChatPort {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramChatPort {
    /// Creates an adapter for the given bot token.
    pub fn new(token: &str) -> Result<Self, ChatError> {
        Self::with_base_url(token, API_BASE)
    }

    /// Creates an adapter against a custom API host (tests).
    pub fn with_base_url(token: &str, base: &str) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ChatError::Unknown(err.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("{base}/bot{token}"),
        })
    }

    /// Verifies the credential and returns the bot's username.
    pub async fn get_me(&self, cancel: &CancellationToken) -> Result<String, ChatError> {
        let me: WireUser = self.call(cancel, "getMe", json!({}), None).await?;
        Ok(me.username.unwrap_or_else(|| me.first_name.clone()))
    }

    /// Long-polls for updates. Returns `(update_id, update)` pairs;
    /// unsupported update kinds are skipped.
    pub async fn poll_updates(
        &self,
        cancel: &CancellationToken,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<(i64, Update)>, ChatError> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let timeout = Duration::from_secs(timeout_secs) + POLL_TIMEOUT_SLACK;
        let wire: Vec<WireUpdate> = self
            .call(cancel, "getUpdates", payload, Some(timeout))
            .await?;

        Ok(wire
            .into_iter()
            .filter_map(|update| {
                let id = update.update_id;
                convert_update(update).map(|converted| (id, converted))
            })
            .collect())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        method: &str,
        payload: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, ChatError> {
        if cancel.is_cancelled() {
            return Err(ChatError::Canceled);
        }

        let mut request = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(&payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Canceled),
            result = request.send() => result.map_err(map_reqwest_error)?,
        };

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|err| ChatError::Unknown(format!("malformed API response: {err}")))?;

        if envelope.ok {
            envelope
                .result
                .ok_or_else(|| ChatError::Unknown("ok response without a result".to_string()))
        } else {
            Err(map_api_error(
                envelope.error_code.unwrap_or_default(),
                envelope.description.unwrap_or_default(),
                envelope.parameters,
            ))
        }
    }
}

#[async_trait]
impl ChatPort for TelegramChatPort {
    async fn send(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        text: &str,
        markup: Markup,
    ) -> Result<ChatMessage, ChatError> {
        let mut payload = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup_json) = serialize_markup(&markup) {
            payload["reply_markup"] = markup_json;
        }

        let message: WireMessage = self.call(cancel, "sendMessage", payload, None).await?;
        Ok(to_handle(message, text, &markup))
    }

    async fn edit(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Markup,
    ) -> Result<ChatMessage, ChatError> {
        // editMessageText only accepts inline keyboards.
        match markup {
            Markup::None | Markup::Inline(_) => {}
            ref other => {
                return Err(ChatError::BadPayload(format!(
                    "cannot edit a message with {} markup",
                    markup_kind(other)
                )));
            }
        }

        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(markup_json) = serialize_markup(&markup) {
            payload["reply_markup"] = markup_json;
        }

        let message: WireMessage = self.call(cancel, "editMessageText", payload, None).await?;
        Ok(to_handle(message, text, &markup))
    }

    async fn answer_callback(
        &self,
        cancel: &CancellationToken,
        callback_id: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if !text.is_empty() {
            payload["text"] = json!(text);
        }
        let _: bool = self.call(cancel, "answerCallbackQuery", payload, None).await?;
        Ok(())
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), ChatError> {
        let payload = json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self.call(cancel, "deleteMessage", payload, None).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    message: Option<WireMessage>,
    callback_query: Option<WireCallback>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: i64,
    chat: WireChat,
    from: Option<WireUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCallback {
    id: String,
    from: WireUser,
    message: Option<WireMessage>,
    data: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn display_name(user: &WireUser) -> String {
    match &user.last_name {
        Some(last) if !last.is_empty() => format!("{} {last}", user.first_name),
        _ => user.first_name.clone(),
    }
}

fn to_sender(user: &WireUser) -> Sender {
    Sender {
        id: user.id,
        display_name: display_name(user),
    }
}

/// Narrows a wire update to the engine model. Callback queries without an
/// attached message carry no chat id and are dropped.
fn convert_update(update: WireUpdate) -> Option<Update> {
    if let Some(message) = update.message {
        return Some(Update::Message(IncomingMessage {
            sender: message.from.as_ref().map(to_sender),
            chat_id: message.chat.id,
            message_id: message.message_id,
            text: message.text.unwrap_or_default(),
        }));
    }

    if let Some(callback) = update.callback_query {
        let message = callback.message?;
        return Some(Update::Callback(CallbackQuery {
            id: callback.id,
            sender: Some(to_sender(&callback.from)),
            chat_id: message.chat.id,
            message_id: message.message_id,
            data: callback.data.unwrap_or_default(),
        }));
    }

    None
}

fn markup_kind(markup: &Markup) -> &'static str {
    match markup {
        Markup::None => "no",
        Markup::Inline(_) => "inline-keyboard",
        Markup::Reply(_) => "reply-keyboard",
        Markup::RemoveReply => "remove-keyboard",
    }
}

fn serialize_markup(markup: &Markup) -> Option<serde_json::Value> {
    match markup {
        Markup::None => None,
        Markup::Inline(keyboard) => {
            let rows: Vec<Vec<serde_json::Value>> = keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| {
                            json!({ "text": button.text, "callback_data": button.callback_data })
                        })
                        .collect()
                })
                .collect();
            Some(json!({ "inline_keyboard": rows }))
        }
        Markup::Reply(keyboard) => {
            let rows: Vec<Vec<serde_json::Value>> = keyboard
                .rows
                .iter()
                .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
                .collect();
            Some(json!({ "keyboard": rows, "resize_keyboard": keyboard.resize }))
        }
        Markup::RemoveReply => Some(json!({ "remove_keyboard": true })),
    }
}

fn to_handle(message: WireMessage, text: &str, markup: &Markup) -> ChatMessage {
    ChatMessage::new(message.chat.id, message.message_id, "telegram")
        .with_payload(text)
        .with_meta("markup_type", markup_kind(markup))
}

fn map_reqwest_error(err: reqwest::Error) -> ChatError {
    if err.is_timeout() {
        ChatError::DeadlineExceeded
    } else {
        ChatError::Unknown(err.to_string())
    }
}

fn map_api_error(code: i64, description: String, parameters: Option<ResponseParameters>) -> ChatError {
    if description.contains("message is not modified") {
        return ChatError::MessageNotModified;
    }
    match code {
        429 => {
            let retry_after = parameters.and_then(|p| p.retry_after).unwrap_or(0);
            ChatError::rate_limited(retry_after)
        }
        403 => ChatError::Forbidden(description),
        400 => ChatError::BadRequest(description),
        _ => ChatError::Unknown(format!("API error {code}: {description}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InlineButton, InlineKeyboard, ReplyKeyboard};

    #[test]
    fn not_modified_description_maps_to_the_pseudo_failure() {
        let err = map_api_error(
            400,
            "Bad Request: message is not modified".to_string(),
            None,
        );
        assert_eq!(err, ChatError::MessageNotModified);
    }

    #[test]
    fn rate_limit_carries_the_retry_hint() {
        let err = map_api_error(
            429,
            "Too Many Requests".to_string(),
            Some(ResponseParameters { retry_after: Some(17) }),
        );
        assert_eq!(err, ChatError::rate_limited(17));
    }

    #[test]
    fn forbidden_and_bad_request_map_by_status() {
        assert!(matches!(
            map_api_error(403, "bot was blocked".into(), None),
            ChatError::Forbidden(_)
        ));
        assert!(matches!(
            map_api_error(400, "chat not found".into(), None),
            ChatError::BadRequest(_)
        ));
        assert!(matches!(
            map_api_error(500, "boom".into(), None),
            ChatError::Unknown(_)
        ));
    }

    #[test]
    fn inline_markup_serializes_rows_and_payloads() {
        let keyboard = InlineKeyboard::new()
            .with_row(vec![InlineButton::new("A", "answer:q1:a")])
            .with_row(vec![InlineButton::new("B", "answer:q1:b")]);

        let value = serialize_markup(&Markup::Inline(keyboard)).unwrap();
        assert_eq!(value["inline_keyboard"][0][0]["text"], "A");
        assert_eq!(value["inline_keyboard"][1][0]["callback_data"], "answer:q1:b");
    }

    #[test]
    fn reply_markup_serializes_labels() {
        let keyboard = ReplyKeyboard::new(vec![vec!["Fill record".to_string()]]);
        let value = serialize_markup(&Markup::Reply(keyboard)).unwrap();
        assert_eq!(value["keyboard"][0][0]["text"], "Fill record");
        assert_eq!(value["resize_keyboard"], true);
    }

    #[test]
    fn remove_reply_serializes_to_remove_keyboard() {
        let value = serialize_markup(&Markup::RemoveReply).unwrap();
        assert_eq!(value["remove_keyboard"], true);
        assert!(serialize_markup(&Markup::None).is_none());
    }

    #[test]
    fn message_update_converts_with_sender() {
        let wire = WireUpdate {
            update_id: 7,
            message: Some(WireMessage {
                message_id: 10,
                chat: WireChat { id: 5 },
                from: Some(WireUser {
                    id: 5,
                    first_name: "Alice".into(),
                    last_name: Some("Smith".into()),
                    username: None,
                }),
                text: Some("Fill record".into()),
            }),
            callback_query: None,
        };

        let Some(Update::Message(message)) = convert_update(wire) else {
            panic!("expected a message update");
        };
        assert_eq!(message.chat_id, 5);
        assert_eq!(message.text, "Fill record");
        assert_eq!(message.sender.unwrap().display_name, "Alice Smith");
    }

    #[test]
    fn callback_update_without_message_is_dropped() {
        let wire = WireUpdate {
            update_id: 8,
            message: None,
            callback_query: Some(WireCallback {
                id: "cb".into(),
                from: WireUser {
                    id: 5,
                    first_name: "Alice".into(),
                    last_name: None,
                    username: None,
                },
                message: None,
                data: Some("action:save_record".into()),
            }),
        };
        assert!(convert_update(wire).is_none());
    }

    #[test]
    fn callback_update_converts_chat_and_payload() {
        let wire = WireUpdate {
            update_id: 9,
            message: None,
            callback_query: Some(WireCallback {
                id: "cb-9".into(),
                from: WireUser {
                    id: 5,
                    first_name: "Alice".into(),
                    last_name: None,
                    username: None,
                },
                message: Some(WireMessage {
                    message_id: 33,
                    chat: WireChat { id: 5 },
                    from: None,
                    text: None,
                }),
                data: Some("section:personal".into()),
            }),
        };

        let Some(Update::Callback(query)) = convert_update(wire) else {
            panic!("expected a callback update");
        };
        assert_eq!(query.id, "cb-9");
        assert_eq!(query.chat_id, 5);
        assert_eq!(query.message_id, 33);
        assert_eq!(query.data, "section:personal");
    }
}
