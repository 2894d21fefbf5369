//! Read model views.

pub mod customer_orders;
pub mod vendor_ledger;
pub mod vendor_orders;

pub use customer_orders::{CustomerOrderSummary, CustomerOrdersView};
pub use vendor_ledger::{VendorLedgerSummary, VendorLedgerView};
pub use vendor_orders::{VendorLine, VendorOrderEntry, VendorOrdersView};

use domain::{OrderEvent, OrderStatus, PaymentStatus};
use event_store::EventEnvelope;
use serde::Serialize;

use crate::error::{ProjectionError, Result};

/// Decodes an order event, or `None` for events of other aggregates.
pub(crate) fn order_event(envelope: &EventEnvelope) -> Result<Option<OrderEvent>> {
    if envelope.aggregate_type != "Order" {
        return Ok(None);
    }
    envelope
        .decode()
        .map(Some)
        .map_err(|err| ProjectionError::decode(&envelope.event_type, err))
}

/// Order and payment status as seen from the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl Progress {
    /// Folds the status-bearing part of an event. Returns false for events
    /// that change neither status.
    pub(crate) fn apply(&mut self, event: &OrderEvent) -> bool {
        match event {
            OrderEvent::PaymentProofUploaded(_) => {
                self.payment_status = PaymentStatus::AwaitingConfirmation;
            }
            OrderEvent::PaymentConfirmed(_) => self.payment_status = PaymentStatus::Paid,
            OrderEvent::PaymentRejected(_) | OrderEvent::GatewayPaymentFailed(_) => {
                self.payment_status = PaymentStatus::Failed;
            }
            OrderEvent::PaymentRefunded(_) => {
                self.payment_status = PaymentStatus::Refunded;
                if self.status.closes_on_refund() {
                    self.status = OrderStatus::Refunded;
                }
            }
            OrderEvent::StatusChanged(change) => self.status = change.to,
            OrderEvent::OrderCancelled(_) => self.status = OrderStatus::Cancelled,
            OrderEvent::OrderPlaced(_)
            | OrderEvent::LineStatusChanged(_)
            | OrderEvent::ShipmentDetailsSet(_)
            | OrderEvent::LocationRecorded(_) => return false,
        }
        true
    }
}
