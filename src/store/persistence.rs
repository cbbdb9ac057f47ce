use std::{fs, io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::{
    domain::chat::ChatSummary,
    infra::{config::StorageConfig, error::AppError, storage_layout::StorageLayout},
};

/// One persisted slot per account: the full summary list plus the sync cursor.
/// Slots survive logout; re-login restores them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedChatState {
    pub summaries: Vec<ChatSummary>,
    pub sync_cursor_ms: i64,
}

/// Durable per-account key-value slot for chat-list state.
pub trait StateStorage: Send + Sync {
    fn load(&self, account_id: &str) -> Result<Option<PersistedChatState>>;
    fn save(&self, account_id: &str, state: &PersistedChatState) -> Result<()>;
}

/// File-backed storage: one JSON snapshot file per account under the app's
/// state directory.
#[derive(Debug)]
pub struct FileStateStorage {
    state_dir: PathBuf,
}

impl FileStateStorage {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    /// Builds storage from config, falling back to the XDG-resolved layout
    /// when no explicit state directory is configured.
    pub fn resolve(config: &StorageConfig) -> Result<Self, AppError> {
        let state_dir = match &config.state_dir {
            Some(dir) => dir.clone(),
            None => {
                let layout = StorageLayout::resolve()?;
                layout.ensure_dirs()?;
                layout.state_dir
            }
        };

        Ok(Self::new(state_dir))
    }

    fn slot_path(&self, account_id: &str) -> PathBuf {
        // Account ids are opaque and may contain path separators; encode them
        // so every id maps to one flat file inside the state directory.
        let encoded = URL_SAFE_NO_PAD.encode(account_id.as_bytes());
        self.state_dir.join(format!("{encoded}.json"))
    }
}

impl StateStorage for FileStateStorage {
    fn load(&self, account_id: &str) -> Result<Option<PersistedChatState>> {
        let path = self.slot_path(account_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read chat state at {}", path.display()))
            }
        };

        let state = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse chat state at {}", path.display()))?;
        Ok(Some(state))
    }

    fn save(&self, account_id: &str, state: &PersistedChatState) -> Result<()> {
        fs::create_dir_all(&self.state_dir).with_context(|| {
            format!(
                "failed to create state directory {}",
                self.state_dir.display()
            )
        })?;

        let path = self.slot_path(account_id);
        let raw = serde_json::to_vec(state).context("failed to serialize chat state")?;
        fs::write(&path, raw)
            .with_context(|| format!("failed to write chat state at {}", path.display()))
    }
}
