//! Transport-agnostic inbound events.
//!
//! Adapters narrow their wire updates down to these shapes; the dispatcher
//! never sees transport types.

/// Who produced an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub display_name: String,
}

/// A plain text message from a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub sender: Option<Sender>,
    pub chat_id: i64,
    /// Id of the participant's own message (used for optional deletion).
    pub message_id: i64,
    pub text: String,
}

/// A tap on an inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    /// Transport callback id, acknowledged via the port.
    pub id: String,
    pub sender: Option<Sender>,
    pub chat_id: i64,
    /// Id of the message carrying the tapped keyboard.
    pub message_id: i64,
    /// Raw callback payload, `<prefix>:<value>`.
    pub data: String,
}

/// One inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Message(IncomingMessage),
    Callback(CallbackQuery),
}

impl Update {
    pub fn sender(&self) -> Option<&Sender> {
        match self {
            Update::Message(msg) => msg.sender.as_ref(),
            Update::Callback(query) => query.sender.as_ref(),
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            Update::Message(msg) => msg.chat_id,
            Update::Callback(query) => query.chat_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_is_taken_from_the_inner_event() {
        let update = Update::Message(IncomingMessage {
            sender: Some(Sender {
                id: 5,
                display_name: "Alice".into(),
            }),
            chat_id: 5,
            message_id: 1,
            text: "hi".into(),
        });
        assert_eq!(update.sender().map(|s| s.id), Some(5));
        assert_eq!(update.chat_id(), 5);
    }

    #[test]
    fn callback_without_sender_reports_none() {
        let update = Update::Callback(CallbackQuery {
            id: "cb".into(),
            sender: None,
            chat_id: 9,
            message_id: 3,
            data: "action:save_record".into(),
        });
        assert!(update.sender().is_none());
    }
}
