//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between the
//! conversation engine and the outside world. Adapters implement these ports.
//!
//! ## Chat Port
//!
//! - `ChatPort` - Outbound messaging operations (send/edit/ack/delete)
//! - `ChatMessage` - Normalized handle for a previously sent message
//! - `ChatError` - Fixed transport error taxonomy
//! - `Markup` and the keyboard types - Structured, transport-opaque markup

mod chat;

pub use chat::{
    ChatError, ChatMessage, ChatPort, InlineButton, InlineKeyboard, Markup, ReplyKeyboard,
};
