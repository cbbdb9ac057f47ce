//! Chat List Store: canonical per-account conversation list and sync cursor.

pub mod chat_list;
pub mod persistence;
