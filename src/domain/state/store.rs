//! Process-wide store of per-participant state.
//!
//! The store's own lock guards only the map; each entry carries its own
//! mutex, held by the dispatcher for the whole of a dispatch. Entries are
//! never evicted during the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::domain::fsm::{MainMenuFsm, RecordFsm};

use super::UserState;

/// Factory for the per-user machine instances.
///
/// Injected so tests can seed machines in non-initial states.
pub trait FsmFactory: Send + Sync {
    fn main_menu(&self) -> MainMenuFsm;
    fn record(&self) -> RecordFsm;
}

/// Factory producing machines in their initial states.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFsmFactory;

impl FsmFactory for DefaultFsmFactory {
    fn main_menu(&self) -> MainMenuFsm {
        MainMenuFsm::new()
    }

    fn record(&self) -> RecordFsm {
        RecordFsm::new()
    }
}

/// Concurrent map from participant id to state entry.
pub struct StateStore {
    users: RwLock<HashMap<i64, Arc<Mutex<UserState>>>>,
    factory: Box<dyn FsmFactory>,
}

impl StateStore {
    pub fn new(factory: impl FsmFactory + 'static) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Returns the entry for `user_id`, constructing it on first contact.
    ///
    /// An existing entry whose display name differs from `user_name` gets the
    /// name refreshed; nothing else is touched.
    pub async fn get_or_create(&self, user_id: i64, user_name: &str) -> Arc<Mutex<UserState>> {
        if let Some(existing) = self.users.read().await.get(&user_id).cloned() {
            self.refresh_name(&existing, user_id, user_name).await;
            return existing;
        }

        let mut users = self.users.write().await;
        // Racing dispatches may both miss the read; re-check under the write lock.
        if let Some(existing) = users.get(&user_id).cloned() {
            drop(users);
            self.refresh_name(&existing, user_id, user_name).await;
            return existing;
        }

        tracing::info!(user_id, user_name, "creating state for new participant");
        let state = UserState::new(
            user_id,
            user_name,
            self.factory.main_menu(),
            self.factory.record(),
        );
        let entry = Arc::new(Mutex::new(state));
        users.insert(user_id, entry.clone());
        entry
    }

    async fn refresh_name(&self, entry: &Arc<Mutex<UserState>>, user_id: i64, user_name: &str) {
        let mut state = entry.lock().await;
        if state.user_name != user_name {
            tracing::info!(
                user_id,
                old = %state.user_name,
                new = %user_name,
                "updating participant display name"
            );
            state.user_name = user_name.to_string();
        }
    }

    /// Number of known participants.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_constructs_once() {
        let store = StateStore::new(DefaultFsmFactory);

        let first = store.get_or_create(1, "Alice").await;
        let second = store.get_or_create(1, "Alice").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn distinct_participants_get_distinct_entries() {
        let store = StateStore::new(DefaultFsmFactory);

        let a = store.get_or_create(1, "Alice").await;
        let b = store.get_or_create(2, "Bob").await;

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn changed_display_name_is_refreshed_in_place() {
        let store = StateStore::new(DefaultFsmFactory);

        let entry = store.get_or_create(1, "Alice").await;
        entry.lock().await.records.push(crate::domain::survey::Record::new());

        let entry = store.get_or_create(1, "Alice Smith").await;
        let state = entry.lock().await;
        assert_eq!(state.user_name, "Alice Smith");
        // Everything else untouched.
        assert_eq!(state.records.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_contact_yields_one_entry() {
        let store = Arc::new(StateStore::new(DefaultFsmFactory));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.get_or_create(99, "Racer").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 1);
    }
}
