//! Compensating actions for completed saga steps.

use inventory::InventoryLedger;
use lock::LockManager;

use crate::error::{Result, SagaError};
use crate::instance::SagaInstance;
use crate::services::payment::PaymentGateway;
use crate::step::StepKind;

/// Undoes completed saga steps in LIFO order.
///
/// Every reverse action is idempotent, so the handler can be
/// re-entered during crash recovery. A failed action marks the saga
/// for operator attention but the remaining actions in the batch still
/// run: partial compensation beats none.
pub struct CompensationHandler<L, P>
where
    L: LockManager + Clone,
    P: PaymentGateway,
{
    ledger: InventoryLedger<L>,
    gateway: P,
}

impl<L, P> CompensationHandler<L, P>
where
    L: LockManager + Clone,
    P: PaymentGateway,
{
    /// Creates a handler over the ledger and payment gateway.
    pub fn new(ledger: InventoryLedger<L>, gateway: P) -> Self {
        Self { ledger, gateway }
    }

    /// Runs the reverse action of every completed step, newest first.
    ///
    /// Marks each successfully reversed step `Compensated` on the
    /// instance. Returns `CompensationFailed` carrying the first
    /// failure if any action could not be executed.
    #[tracing::instrument(skip(self, saga), fields(saga_id = %saga.saga_id))]
    pub async fn compensate(&self, saga: &mut SagaInstance) -> Result<()> {
        let mut first_failure: Option<String> = None;

        let completed = saga.completed_steps();
        for kind in completed.into_iter().rev() {
            let result = match kind {
                StepKind::InventoryReservation => self.release_reservation(saga).await,
                StepKind::PaymentInitiation => self.refund_payment(saga).await,
                // Notifications have no reverse action.
                StepKind::NotificationSending => Ok(()),
            };

            match result {
                Ok(()) => {
                    metrics::counter!("saga_compensation_steps_total").increment(1);
                    tracing::info!(step = %kind, "compensation step executed");
                    saga.step_compensated(kind);
                }
                Err(reason) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(step = %kind, reason, "compensation step failed");
                    if first_failure.is_none() {
                        first_failure = Some(format!("{kind}: {reason}"));
                    }
                }
            }
        }

        match first_failure {
            None => Ok(()),
            Some(reason) => Err(SagaError::CompensationFailed {
                saga_id: saga.saga_id,
                reason,
            }),
        }
    }

    async fn release_reservation(&self, saga: &SagaInstance) -> std::result::Result<(), String> {
        match self.ledger.release(&saga.event_key, saga.quantity).await {
            // false means the seats were already back (duplicate
            // compensation); the goal state holds, so this succeeds.
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn refund_payment(&self, saga: &SagaInstance) -> std::result::Result<(), String> {
        let Some(payment_id) = saga.payment_id.as_deref() else {
            // Step completed but no payment was recorded; nothing to
            // refund.
            return Ok(());
        };
        self.gateway
            .refund(payment_id)
            .await
            .map_err(|e| e.to_string())
    }
}
