//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod fulfillment;
mod payment;
mod status;
mod value_objects;

#[cfg(test)]
mod test_support;

pub use aggregate::Order;
pub use commands::{GatewayOutcome, PlaceOrder};
pub use events::{
    GatewayPaymentFailedData, LineStatusChangedData, LocationRecordedData, OrderCancelledData,
    OrderEvent, OrderPlacedData, PaymentConfirmedData, PaymentProofUploadedData,
    PaymentRefundedData, PaymentRejectedData, Settlement, ShipmentDetailsSetData,
    StatusChangedData,
};
pub use status::{FulfillmentMethod, OrderStatus, PaymentMethod, PaymentStatus};
pub use value_objects::{
    Address, CollectionPoint, GeoPoint, LineItem, OrderTotals, PaymentProof, TrackingEntry,
    Whereabouts,
};

use common::ProductId;
use thiserror::Error;

/// Reasons an order rejects a command. The order is left unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// A required field is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command is not allowed from the current status.
    #[error("cannot {action} while {subject} is {current}")]
    InvalidStateTransition {
        action: &'static str,
        subject: &'static str,
        current: String,
    },

    /// Someone already captured the payment this command would capture.
    #[error("payment has already been confirmed")]
    AlreadyConfirmed,

    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: &'static str },

    #[error("order does not exist")]
    NotFound,

    #[error("order has already been placed")]
    AlreadyPlaced,

    #[error("order has no line item for product {product_id}")]
    LineItemNotFound { product_id: ProductId },
}

impl OrderError {
    pub(crate) fn status(action: &'static str, current: OrderStatus) -> Self {
        OrderError::InvalidStateTransition {
            action,
            subject: "order status",
            current: current.to_string(),
        }
    }

    pub(crate) fn payment(action: &'static str, current: PaymentStatus) -> Self {
        OrderError::InvalidStateTransition {
            action,
            subject: "payment status",
            current: current.to_string(),
        }
    }

    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation_error",
            OrderError::InvalidStateTransition { .. } => "invalid_state_transition",
            OrderError::AlreadyConfirmed => "already_confirmed",
            OrderError::Unauthorized { .. } => "authorization_error",
            OrderError::NotFound | OrderError::LineItemNotFound { .. } => "not_found",
            OrderError::AlreadyPlaced => "conflict",
        }
    }
}
