//! Reconciler: login-time full sync of the chat list against snapshot feeds.

pub mod reconciler;
