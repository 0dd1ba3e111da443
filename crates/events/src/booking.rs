//! Typed booking domain events.

use common::{EventKey, Money, TicketId, UserId};
use serde::{Deserialize, Serialize};

/// Topic names for the booking event streams.
pub mod topics {
    pub const TICKET_CREATED: &str = "ticket-created";
    pub const TICKET_CONFIRMED: &str = "ticket-confirmed";
    pub const TICKET_CANCELLED: &str = "ticket-cancelled";
    pub const PAYMENT_INITIATED: &str = "payment-initiated";
    pub const PAYMENT_COMPLETED: &str = "payment-completed";
    pub const PAYMENT_FAILED: &str = "payment-failed";
    pub const PAYMENT_REFUNDED: &str = "payment-refunded";
    pub const USER_CREATED: &str = "user-created";
}

/// Events exchanged between the booking services.
///
/// One variant per event type; the serialized form carries the variant
/// tag so consumers decode into exactly one known schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BookingEvent {
    /// A ticket booking request was accepted and recorded.
    TicketCreated(TicketCreatedData),

    /// The booking completed and the ticket is confirmed.
    TicketConfirmed(TicketConfirmedData),

    /// The booking was rolled back and the ticket cancelled.
    TicketCancelled(TicketCancelledData),

    /// Payment was requested for a booking.
    PaymentInitiated(PaymentInitiatedData),

    /// The payment service confirmed a successful charge.
    PaymentCompleted(PaymentCompletedData),

    /// The payment service reported a failed charge.
    PaymentFailed(PaymentFailedData),

    /// A previously completed payment was refunded.
    PaymentRefunded(PaymentRefundedData),

    /// A user account was created.
    UserCreated(UserCreatedData),
}

impl BookingEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::TicketCreated(_) => "TicketCreated",
            BookingEvent::TicketConfirmed(_) => "TicketConfirmed",
            BookingEvent::TicketCancelled(_) => "TicketCancelled",
            BookingEvent::PaymentInitiated(_) => "PaymentInitiated",
            BookingEvent::PaymentCompleted(_) => "PaymentCompleted",
            BookingEvent::PaymentFailed(_) => "PaymentFailed",
            BookingEvent::PaymentRefunded(_) => "PaymentRefunded",
            BookingEvent::UserCreated(_) => "UserCreated",
        }
    }

    /// Returns the topic this event type is published to.
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::TicketCreated(_) => topics::TICKET_CREATED,
            BookingEvent::TicketConfirmed(_) => topics::TICKET_CONFIRMED,
            BookingEvent::TicketCancelled(_) => topics::TICKET_CANCELLED,
            BookingEvent::PaymentInitiated(_) => topics::PAYMENT_INITIATED,
            BookingEvent::PaymentCompleted(_) => topics::PAYMENT_COMPLETED,
            BookingEvent::PaymentFailed(_) => topics::PAYMENT_FAILED,
            BookingEvent::PaymentRefunded(_) => topics::PAYMENT_REFUNDED,
            BookingEvent::UserCreated(_) => topics::USER_CREATED,
        }
    }
}

/// Payload of `TicketCreated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCreatedData {
    pub ticket_id: TicketId,
    pub user_id: UserId,
    /// The bookable event the seats belong to.
    pub event_key: EventKey,
    pub quantity: u32,
    pub price_per_ticket: Money,
    pub total_amount: Money,
}

/// Payload of `TicketConfirmed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketConfirmedData {
    pub ticket_id: TicketId,
    pub user_id: UserId,
}

/// Payload of `TicketCancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCancelledData {
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub reason: String,
}

/// Payload of `PaymentInitiated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub amount: Money,
}

/// Payload of `PaymentCompleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub payment_id: String,
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub amount: Money,
    pub transaction_id: String,
}

/// Payload of `PaymentFailed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub amount: Money,
    pub failure_reason: String,
}

/// Payload of `PaymentRefunded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub payment_id: String,
    pub ticket_id: TicketId,
}

/// Payload of `UserCreated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreatedData {
    pub user_id: UserId,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_created() -> BookingEvent {
        BookingEvent::TicketCreated(TicketCreatedData {
            ticket_id: TicketId::new(),
            user_id: UserId::new(),
            event_key: EventKey::new("concert"),
            quantity: 2,
            price_per_ticket: Money::from_cents(2500),
            total_amount: Money::from_cents(5000),
        })
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(ticket_created().event_type(), "TicketCreated");
        assert_eq!(
            BookingEvent::PaymentFailed(PaymentFailedData {
                ticket_id: TicketId::new(),
                user_id: UserId::new(),
                amount: Money::from_cents(100),
                failure_reason: "declined".into(),
            })
            .event_type(),
            "PaymentFailed"
        );
    }

    #[test]
    fn test_topic_mapping() {
        assert_eq!(ticket_created().topic(), topics::TICKET_CREATED);
        assert_eq!(
            BookingEvent::PaymentRefunded(PaymentRefundedData {
                payment_id: "PAY-1".into(),
                ticket_id: TicketId::new(),
            })
            .topic(),
            topics::PAYMENT_REFUNDED
        );
    }

    #[test]
    fn test_serialization_roundtrip() {
        let event = ticket_created();
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: BookingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.event_type(), deserialized.event_type());

        if let BookingEvent::TicketCreated(data) = deserialized {
            assert_eq!(data.quantity, 2);
            assert_eq!(data.total_amount, Money::from_cents(5000));
        } else {
            panic!("expected TicketCreated");
        }
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let json = r#"{"type":"SeatMoved","data":{}}"#;
        let result: Result<BookingEvent, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
