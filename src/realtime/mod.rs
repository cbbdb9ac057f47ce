//! Event Ingest Adapter: realtime push events folded into the chat list.

pub mod ingest;
