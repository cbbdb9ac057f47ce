use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    domain::{
        chat::{ChatKind, ChatSummary},
        events::MessageEvent,
    },
    store::persistence::{PersistedChatState, StateStorage},
};

const CHAT_STATE_LOAD_FAILED: &str = "CHAT_STATE_LOAD_FAILED";
const CHAT_STATE_PERSIST_FAILED: &str = "CHAT_STATE_PERSIST_FAILED";
const CHAT_LIST_ACCOUNT_ACTIVATED: &str = "CHAT_LIST_ACCOUNT_ACTIVATED";
const CHAT_LIST_ACCOUNT_DEACTIVATED: &str = "CHAT_LIST_ACCOUNT_DEACTIVATED";

/// Canonical ordered list of conversation summaries plus the sync cursor,
/// scoped to the active account.
///
/// Every mutation runs under one internal lock with no suspension point
/// inside the read-modify-write, so sweep folds and live-event folds can
/// never interleave mid-computation. Without an active account all
/// operations are silent no-ops: the UI may legitimately call them before
/// login completes.
pub struct ChatListStore {
    storage: Arc<dyn StateStorage>,
    inner: Mutex<Option<ActiveAccount>>,
}

#[derive(Debug)]
struct ActiveAccount {
    account_id: String,
    summaries: Vec<ChatSummary>,
    sync_cursor_ms: i64,
}

impl ChatListStore {
    /// Creates a store with no active account.
    pub fn new(storage: Arc<dyn StateStorage>) -> Self {
        Self {
            storage,
            inner: Mutex::new(None),
        }
    }

    /// Switches the store to the given account, restoring its persisted
    /// snapshot. A load failure starts the account from an empty list; the
    /// next full sweep rebuilds it.
    pub fn activate(&self, account_id: &str) {
        let persisted = match self.storage.load(account_id) {
            Ok(state) => state.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(
                    code = CHAT_STATE_LOAD_FAILED,
                    account_id,
                    error = ?error,
                    "persisted chat state unreadable; starting from empty list"
                );
                PersistedChatState::default()
            }
        };

        let mut inner = self.lock();
        *inner = Some(ActiveAccount {
            account_id: account_id.to_owned(),
            summaries: persisted.summaries,
            sync_cursor_ms: persisted.sync_cursor_ms,
        });

        tracing::info!(
            code = CHAT_LIST_ACCOUNT_ACTIVATED,
            account_id,
            "chat list store activated"
        );
    }

    /// Detaches the store from the current account. Persisted state is kept.
    pub fn deactivate(&self) {
        let mut inner = self.lock();
        if let Some(account) = inner.take() {
            tracing::info!(
                code = CHAT_LIST_ACCOUNT_DEACTIVATED,
                account_id = account.account_id,
                "chat list store deactivated"
            );
        }
    }

    pub fn active_account(&self) -> Option<String> {
        self.lock()
            .as_ref()
            .map(|account| account.account_id.clone())
    }

    /// Returns the summaries in descending `last_activity_ms` order, or an
    /// empty list when no account is active.
    pub fn summaries(&self) -> Vec<ChatSummary> {
        self.lock()
            .as_ref()
            .map(|account| account.summaries.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self, chat_id: &str) -> Option<ChatSummary> {
        self.lock().as_ref().and_then(|account| {
            account
                .summaries
                .iter()
                .find(|summary| summary.chat_id == chat_id)
                .cloned()
        })
    }

    pub fn sync_cursor_ms(&self) -> Option<i64> {
        self.lock().as_ref().map(|account| account.sync_cursor_ms)
    }

    /// Folds one normalized message event into the list: updates the matching
    /// summary or inserts a new one, recomputes `unread`, and re-sorts.
    ///
    /// The fold is idempotent and monotonic: refolding the same message id is
    /// a no-op, and an event older than the summary's current last message
    /// never regresses it. Returns whether the list changed.
    pub fn upsert_on_new_message(&self, event: &MessageEvent) -> bool {
        let mut inner = self.lock();
        let Some(account) = inner.as_mut() else {
            tracing::debug!(chat_id = event.chat_id, "fold skipped: no active account");
            return false;
        };

        let unread = event.message.sender_id != account.account_id;
        let position = account
            .summaries
            .iter()
            .position(|summary| summary.chat_id == event.chat_id);

        match position {
            Some(index) => {
                let summary = &mut account.summaries[index];
                if let Some(current) = &summary.last_message {
                    if current.id == event.message.id {
                        return false;
                    }
                    if event.message.created_at_ms < current.created_at_ms {
                        tracing::debug!(
                            chat_id = event.chat_id,
                            message_id = event.message.id,
                            "fold skipped: older than tracked last message"
                        );
                        return false;
                    }
                }

                summary.last_activity_ms = event.message.created_at_ms;
                summary.unread = unread;
                summary.last_message = Some(event.message.clone());
            }
            None => {
                account.summaries.push(ChatSummary {
                    chat_id: event.chat_id.clone(),
                    chat_kind: event.chat_kind,
                    display_name: None,
                    last_message: Some(event.message.clone()),
                    last_activity_ms: event.message.created_at_ms,
                    unread,
                });
            }
        }

        sort_by_recency(&mut account.summaries);
        persist(self.storage.as_ref(), account);
        true
    }

    /// Adds an empty summary for an explicitly opened conversation. Explicit
    /// open never marks the chat unread. No-op when already tracked.
    pub fn insert_if_absent(&self, chat_id: &str, chat_kind: ChatKind) {
        let mut inner = self.lock();
        let Some(account) = inner.as_mut() else {
            return;
        };

        if account
            .summaries
            .iter()
            .any(|summary| summary.chat_id == chat_id)
        {
            return;
        }

        account.summaries.push(ChatSummary {
            chat_id: chat_id.to_owned(),
            chat_kind,
            display_name: None,
            last_message: None,
            last_activity_ms: now_ms(),
            unread: false,
        });

        sort_by_recency(&mut account.summaries);
        persist(self.storage.as_ref(), account);
    }

    /// Marks the conversation as read. No-op when untracked.
    pub fn mark_read(&self, chat_id: &str) {
        let mut inner = self.lock();
        let Some(account) = inner.as_mut() else {
            return;
        };

        let Some(summary) = account
            .summaries
            .iter_mut()
            .find(|summary| summary.chat_id == chat_id)
        else {
            return;
        };

        if summary.unread {
            summary.unread = false;
            persist(self.storage.as_ref(), account);
        }
    }

    /// Deliberately removes a conversation from the list. Messages older than
    /// the sync cursor will not resurrect it on the next sweep.
    pub fn remove(&self, chat_id: &str) {
        let mut inner = self.lock();
        let Some(account) = inner.as_mut() else {
            return;
        };

        let before = account.summaries.len();
        account.summaries.retain(|summary| summary.chat_id != chat_id);

        if account.summaries.len() != before {
            persist(self.storage.as_ref(), account);
        }
    }

    /// Advances the sync cursor, never backwards.
    pub fn advance_cursor(&self, timestamp_ms: i64) {
        let mut inner = self.lock();
        let Some(account) = inner.as_mut() else {
            return;
        };

        if timestamp_ms > account.sync_cursor_ms {
            account.sync_cursor_ms = timestamp_ms;
            persist(self.storage.as_ref(), account);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveAccount>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sort_by_recency(summaries: &mut [ChatSummary]) {
    summaries.sort_by(|a, b| b.last_activity_ms.cmp(&a.last_activity_ms));
}

fn persist(storage: &dyn StateStorage, account: &ActiveAccount) {
    let state = PersistedChatState {
        summaries: account.summaries.clone(),
        sync_cursor_ms: account.sync_cursor_ms,
    };

    if let Err(error) = storage.save(&account.account_id, &state) {
        tracing::warn!(
            code = CHAT_STATE_PERSIST_FAILED,
            account_id = account.account_id,
            error = ?error,
            "chat state persist failed; in-memory list stays authoritative"
        );
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::chat::{LastMessage, MessageKind},
        test_support::MemoryStateStorage,
    };

    const ME: &str = "me";

    fn store_with_account() -> (ChatListStore, Arc<MemoryStateStorage>) {
        let storage = Arc::new(MemoryStateStorage::default());
        let store = ChatListStore::new(storage.clone());
        store.activate(ME);
        (store, storage)
    }

    fn message(id: &str, sender: &str, created_at_ms: i64) -> LastMessage {
        LastMessage {
            id: id.to_owned(),
            sender_id: sender.to_owned(),
            body: format!("body of {id}"),
            kind: MessageKind::Text,
            created_at_ms,
        }
    }

    fn direct_event(chat_id: &str, id: &str, sender: &str, created_at_ms: i64) -> MessageEvent {
        MessageEvent::new(chat_id, ChatKind::Direct, message(id, sender, created_at_ms))
    }

    #[test]
    fn operations_are_noops_without_active_account() {
        let store = ChatListStore::new(Arc::new(MemoryStateStorage::default()));

        assert!(!store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000)));
        store.insert_if_absent("u1", ChatKind::Direct);
        store.mark_read("u1");
        store.remove("u1");
        store.advance_cursor(10);

        assert!(store.summaries().is_empty());
        assert_eq!(store.sync_cursor_ms(), None);
    }

    #[test]
    fn fold_inserts_untracked_chat_as_unread() {
        let (store, _) = store_with_account();

        assert!(store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000)));

        let summaries = store.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].chat_id, "u1");
        assert_eq!(summaries[0].chat_kind, ChatKind::Direct);
        assert_eq!(summaries[0].last_activity_ms, 1_000);
        assert!(summaries[0].unread);
    }

    #[test]
    fn fold_of_own_message_is_not_unread() {
        let (store, _) = store_with_account();

        store.upsert_on_new_message(&direct_event("u1", "m1", ME, 1_000));

        assert!(!store.summaries()[0].unread);
    }

    #[test]
    fn refolding_same_message_id_changes_nothing() {
        let (store, _) = store_with_account();
        let event = direct_event("u1", "m1", "u1", 1_000);

        assert!(store.upsert_on_new_message(&event));
        let after_first = store.summaries();

        assert!(!store.upsert_on_new_message(&event));
        assert_eq!(store.summaries(), after_first);
    }

    #[test]
    fn stale_event_does_not_regress_last_message() {
        let (store, _) = store_with_account();

        store.upsert_on_new_message(&direct_event("u1", "m2", "u1", 2_000));
        assert!(!store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000)));

        let summary = store.summary("u1").expect("chat should be tracked");
        assert_eq!(summary.last_message.expect("message").id, "m2");
        assert_eq!(summary.last_activity_ms, 2_000);
    }

    #[test]
    fn newer_event_replaces_last_message_and_resorts() {
        let (store, _) = store_with_account();

        store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000));
        store.upsert_on_new_message(&direct_event("u2", "m2", "u2", 2_000));
        store.upsert_on_new_message(&direct_event("u1", "m3", "u1", 3_000));

        let ids: Vec<_> = store
            .summaries()
            .iter()
            .map(|summary| summary.chat_id.clone())
            .collect();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert_eq!(
            store.summary("u1").and_then(|s| s.last_message).map(|m| m.id),
            Some("m3".to_owned())
        );
    }

    #[test]
    fn list_stays_sorted_descending_after_any_mutation_sequence() {
        let (store, _) = store_with_account();

        store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 500));
        store.upsert_on_new_message(&MessageEvent::new(
            "g1",
            ChatKind::Group,
            message("m2", "u9", 1_500),
        ));
        store.insert_if_absent("u3", ChatKind::Direct);
        store.remove("u3");
        store.mark_read("g1");

        let timestamps: Vec<_> = store
            .summaries()
            .iter()
            .map(|summary| summary.last_activity_ms)
            .collect();
        let mut sorted = timestamps.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(timestamps, sorted);
        assert_eq!(
            store.summaries()[0].chat_id,
            "g1",
            "most recent chat should lead the list"
        );
    }

    #[test]
    fn insert_if_absent_adds_read_chat_without_message() {
        let (store, _) = store_with_account();

        store.insert_if_absent("u1", ChatKind::Direct);

        let summary = store.summary("u1").expect("chat should be tracked");
        assert_eq!(summary.last_message, None);
        assert!(!summary.unread);
        assert!(summary.last_activity_ms > 0);
    }

    #[test]
    fn insert_if_absent_keeps_existing_summary() {
        let (store, _) = store_with_account();
        store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000));

        store.insert_if_absent("u1", ChatKind::Direct);

        let summary = store.summary("u1").expect("chat should be tracked");
        assert_eq!(summary.last_message.map(|m| m.id), Some("m1".to_owned()));
        assert!(summary.unread);
    }

    #[test]
    fn mark_read_clears_unread_flag() {
        let (store, _) = store_with_account();
        store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000));

        store.mark_read("u1");

        assert!(!store.summary("u1").expect("chat should be tracked").unread);
    }

    #[test]
    fn mark_read_is_noop_for_untracked_chat() {
        let (store, storage) = store_with_account();
        let saves_before = storage.save_count();

        store.mark_read("ghost");

        assert_eq!(storage.save_count(), saves_before);
    }

    #[test]
    fn remove_deletes_summary() {
        let (store, _) = store_with_account();
        store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000));

        store.remove("u1");

        assert!(store.summary("u1").is_none());
        assert!(store.summaries().is_empty());
    }

    #[test]
    fn cursor_is_monotonic() {
        let (store, _) = store_with_account();

        store.advance_cursor(100);
        store.advance_cursor(50);
        store.advance_cursor(100);

        assert_eq!(store.sync_cursor_ms(), Some(100));

        store.advance_cursor(200);
        assert_eq!(store.sync_cursor_ms(), Some(200));
    }

    #[test]
    fn mutations_persist_and_survive_reactivation() {
        let storage = Arc::new(MemoryStateStorage::default());
        let store = ChatListStore::new(storage.clone());
        store.activate(ME);

        store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000));
        store.advance_cursor(5_000);
        store.deactivate();

        assert!(store.summaries().is_empty());

        store.activate(ME);
        assert_eq!(store.summaries().len(), 1);
        assert_eq!(store.sync_cursor_ms(), Some(5_000));
    }

    #[test]
    fn accounts_are_namespaced() {
        let storage = Arc::new(MemoryStateStorage::default());
        let store = ChatListStore::new(storage.clone());

        store.activate("acc-1");
        store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000));

        store.activate("acc-2");
        assert!(store.summaries().is_empty());

        store.upsert_on_new_message(&direct_event("u2", "m2", "u2", 2_000));
        store.activate("acc-1");

        let ids: Vec<_> = store
            .summaries()
            .iter()
            .map(|summary| summary.chat_id.clone())
            .collect();
        assert_eq!(ids, vec!["u1"]);
    }

    #[test]
    fn persist_failure_keeps_in_memory_state() {
        let storage = Arc::new(MemoryStateStorage::default());
        let store = ChatListStore::new(storage.clone());
        store.activate(ME);
        storage.fail_saves(true);

        assert!(store.upsert_on_new_message(&direct_event("u1", "m1", "u1", 1_000)));

        assert_eq!(store.summaries().len(), 1);
    }
}
