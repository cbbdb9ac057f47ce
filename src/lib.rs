//! Chat-list synchronization core for a messaging client.
//!
//! The crate owns the per-account ordered list of conversation summaries and
//! keeps it consistent across sessions: a login-time sweep reconciles the list
//! against two paginated snapshot feeds, and a realtime adapter folds incoming
//! push events into the same store. Transport, rendering, and auth live in the
//! host application and are consumed here through traits only.

pub mod domain;
pub mod infra;
pub mod realtime;
pub mod store;
pub mod sync;
#[cfg(test)]
mod test_support;
