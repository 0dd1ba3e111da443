//! Step executor ports for remote collaborators.

pub mod notification;
pub mod payment;

pub use notification::{InMemoryNotifier, Notifier, NotifierFault};
pub use payment::{GatewayFault, InMemoryPaymentGateway, PaymentGateway, PaymentOutcome};
