use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{bail, Result};

use crate::store::persistence::{PersistedChatState, StateStorage};

static ENV_LOCK: Mutex<()> = Mutex::new(());

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().expect("env lock should not be poisoned")
}

/// In-memory `StateStorage` for store and reconciler tests.
#[derive(Default)]
pub struct MemoryStateStorage {
    slots: Mutex<HashMap<String, PersistedChatState>>,
    saves: Mutex<usize>,
    fail_saves: Mutex<bool>,
}

impl MemoryStateStorage {
    pub fn save_count(&self) -> usize {
        *self.saves.lock().expect("saves lock")
    }

    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().expect("fail_saves lock") = fail;
    }
}

impl StateStorage for MemoryStateStorage {
    fn load(&self, account_id: &str) -> Result<Option<PersistedChatState>> {
        Ok(self.slots.lock().expect("slots lock").get(account_id).cloned())
    }

    fn save(&self, account_id: &str, state: &PersistedChatState) -> Result<()> {
        *self.saves.lock().expect("saves lock") += 1;
        if *self.fail_saves.lock().expect("fail_saves lock") {
            bail!("storage unavailable (test switch)");
        }

        self.slots
            .lock()
            .expect("slots lock")
            .insert(account_id.to_owned(), state.clone());
        Ok(())
    }
}
