//! Domain events and the event bus abstraction.
//!
//! Every consumed and produced event has a fixed schema decoded into a
//! [`BookingEvent`] variant; payloads that fail decoding are rejected
//! as validation failures, never handed to consumers. Delivery is
//! at-least-once, ordered only within a partition key (the aggregate
//! id), so consumers must tolerate redelivery of the same event id.

pub mod booking;
pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;

pub use booking::{
    BookingEvent, PaymentCompletedData, PaymentFailedData, PaymentInitiatedData,
    PaymentRefundedData, TicketCancelledData, TicketConfirmedData, TicketCreatedData,
    UserCreatedData, topics,
};
pub use bus::{EventBus, EventHandler};
pub use envelope::{EventEnvelope, EventId};
pub use error::BusError;
pub use memory::InMemoryEventBus;
