//! Domain layer: core entities and business rules.

pub mod chat;
pub mod events;
