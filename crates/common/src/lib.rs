//! Shared types for the ticket booking system.
//!
//! Identifier newtypes and the `Money` value object used across the
//! lock, inventory, events and saga crates.

mod types;

pub use types::{EventKey, Money, SagaId, TicketId, UserId};
