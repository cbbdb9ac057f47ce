//! Infrastructure layer: adapters for config, storage paths, and logging.

pub mod config;
pub mod error;
pub mod logging;
pub mod storage_layout;
