//! Saga coordination engine for ticket bookings.
//!
//! A booking runs as a saga: a fixed sequence of steps (seat
//! reservation, payment initiation, user notification) where each
//! transactional step has a compensating action. When a step fails,
//! completed steps are rolled back in reverse order; the saga settles
//! in `Compensated`, or terminal `Failed` if a rollback itself failed.
//!
//! The coordinator consumes booking and payment events from the bus,
//! keeps the authoritative saga record in a [`SagaStore`], and mutates
//! seat counts only through the lock-guarded inventory ledger.

pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod instance;
pub mod services;
pub mod state;
pub mod step;
pub mod store;

pub use compensation::CompensationHandler;
pub use config::SagaConfig;
pub use coordinator::{CONSUMER_GROUP, SagaCoordinator};
pub use error::{Result, SagaError};
pub use instance::SagaInstance;
pub use services::{
    GatewayFault, InMemoryNotifier, InMemoryPaymentGateway, Notifier, NotifierFault,
    PaymentGateway, PaymentOutcome,
};
pub use state::SagaStatus;
pub use step::{SagaStep, StepKind, StepStatus};
pub use store::{InMemorySagaStore, SagaStore};
