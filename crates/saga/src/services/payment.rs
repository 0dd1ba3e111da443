//! Payment gateway port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, TicketId, UserId};
use thiserror::Error;
use uuid::Uuid;

/// Technical faults from the payment gateway.
///
/// These are retried a bounded number of times at the step-executor
/// boundary; a declined charge is not a fault but a
/// [`PaymentOutcome::Declined`] value.
#[derive(Debug, Error)]
pub enum GatewayFault {
    /// The gateway could not be reached or timed out.
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// The business outcome of a payment initiation.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// The charge was accepted.
    Approved {
        payment_id: String,
        transaction_id: String,
    },

    /// The charge was rejected by the processor.
    Declined { reason: String },
}

/// Port for payment processing.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiates a charge for a booking.
    async fn initiate(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
        amount: Money,
    ) -> Result<PaymentOutcome, GatewayFault>;

    /// Refunds a previously approved payment.
    ///
    /// Idempotent: refunding an unknown or already-refunded payment
    /// succeeds, since compensation may be re-entered during recovery.
    async fn refund(&self, payment_id: &str) -> Result<(), GatewayFault>;
}

#[derive(Debug, Default)]
struct GatewayState {
    payments: HashMap<String, (TicketId, UserId, Money)>,
    refunded: Vec<String>,
    next_id: u32,
    decline_on_initiate: bool,
    /// Number of upcoming calls that fail with a technical fault.
    faults_remaining: u32,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline charges.
    pub fn set_decline_on_initiate(&self, decline: bool) {
        self.state.write().unwrap().decline_on_initiate = decline;
    }

    /// Makes the next `count` calls fail with a technical fault.
    pub fn set_unavailable_for(&self, count: u32) {
        self.state.write().unwrap().faults_remaining = count;
    }

    /// Returns the number of payments that are charged and not refunded.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns true if a payment exists with the given ID.
    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.state.read().unwrap().payments.contains_key(payment_id)
    }

    /// Returns the number of refunds executed.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunded.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn initiate(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
        amount: Money,
    ) -> Result<PaymentOutcome, GatewayFault> {
        let mut state = self.state.write().unwrap();

        if state.faults_remaining > 0 {
            state.faults_remaining -= 1;
            return Err(GatewayFault::Unavailable("connection refused".to_string()));
        }

        if state.decline_on_initiate {
            return Ok(PaymentOutcome::Declined {
                reason: "card declined".to_string(),
            });
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        let transaction_id = Uuid::new_v4().to_string();
        state
            .payments
            .insert(payment_id.clone(), (ticket_id, user_id, amount));

        Ok(PaymentOutcome::Approved {
            payment_id,
            transaction_id,
        })
    }

    async fn refund(&self, payment_id: &str) -> Result<(), GatewayFault> {
        let mut state = self.state.write().unwrap();

        if state.faults_remaining > 0 {
            state.faults_remaining -= 1;
            return Err(GatewayFault::Unavailable("connection refused".to_string()));
        }

        if state.payments.remove(payment_id).is_some() {
            state.refunded.push(payment_id.to_string());
        }
        Ok(())
    }
}
