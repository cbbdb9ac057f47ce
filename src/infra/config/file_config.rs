use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, LogConfig, StorageConfig, SyncConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub sync: Option<FileSyncConfig>,
    pub storage: Option<FileStorageConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(sync) = self.sync {
            sync.merge_into(&mut config.sync);
        }

        if let Some(storage) = self.storage {
            storage.merge_into(&mut config.storage);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSyncConfig {
    pub page_size: Option<usize>,
}

impl FileSyncConfig {
    fn merge_into(self, config: &mut SyncConfig) {
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileStorageConfig {
    pub state_dir: Option<PathBuf>,
}

impl FileStorageConfig {
    fn merge_into(self, config: &mut StorageConfig) {
        if let Some(state_dir) = self.state_dir {
            config.state_dir = Some(state_dir);
        }
    }
}
