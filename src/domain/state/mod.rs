//! In-memory participant state: the store and the per-user entry.

mod store;
mod user_state;

pub use store::{DefaultFsmFactory, FsmFactory, StateStore};
pub use user_state::UserState;
