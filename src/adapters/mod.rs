//! Adapters - Concrete implementations of the ports.
//!
//! - `telegram` - Telegram Bot API over HTTPS, plus update long-polling
//! - `fake` - recording in-memory port for tests

mod fake;
mod telegram;

pub use fake::{FakeChatPort, RecordedCall};
pub use telegram::TelegramChatPort;
