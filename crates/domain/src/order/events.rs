//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money, ProductId, VendorId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::ids::OrderNumber;

use super::{
    Address, CollectionPoint, FulfillmentMethod, GeoPoint, LineItem, OrderStatus, OrderTotals,
    PaymentMethod, PaymentProof,
};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderPlaced(OrderPlacedData),

    /// Customer attached evidence of a manual transfer.
    PaymentProofUploaded(PaymentProofUploadedData),

    /// Money was captured: by the gateway, by a vendor/admin verifying a
    /// transfer, or by cash collection.
    PaymentConfirmed(PaymentConfirmedData),

    /// A vendor or admin rejected the uploaded proof.
    PaymentRejected(PaymentRejectedData),

    /// The gateway reported a failed charge.
    GatewayPaymentFailed(GatewayPaymentFailedData),

    PaymentRefunded(PaymentRefundedData),

    StatusChanged(StatusChangedData),

    LineStatusChanged(LineStatusChangedData),

    ShipmentDetailsSet(ShipmentDetailsSetData),

    LocationRecorded(LocationRecordedData),

    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::PaymentProofUploaded(_) => "PaymentProofUploaded",
            OrderEvent::PaymentConfirmed(_) => "PaymentConfirmed",
            OrderEvent::PaymentRejected(_) => "PaymentRejected",
            OrderEvent::GatewayPaymentFailed(_) => "GatewayPaymentFailed",
            OrderEvent::PaymentRefunded(_) => "PaymentRefunded",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::LineStatusChanged(_) => "LineStatusChanged",
            OrderEvent::ShipmentDetailsSet(_) => "ShipmentDetailsSet",
            OrderEvent::LocationRecorded(_) => "LocationRecorded",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub items: Vec<LineItem>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    pub fulfillment_method: FulfillmentMethod,
    pub collection_point: Option<CollectionPoint>,
    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
    pub placed_at: DateTime<Utc>,
}

/// Data for PaymentProofUploaded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProofUploadedData {
    pub proof: PaymentProof,
    pub uploaded_by: String,
}

/// How a confirmed payment was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    Gateway,
    ManualTransfer,
    CashOnDelivery,
}

/// Data for PaymentConfirmed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmedData {
    pub settlement: Settlement,
    pub amount: Money,
    /// Gateway charge id, or the proof reference for manual transfers.
    pub reference: Option<String>,
    pub confirmed_by: String,
    /// Set when a vendor (rather than an admin or the gateway) confirmed.
    pub confirming_vendor: Option<VendorId>,
    pub confirmed_at: DateTime<Utc>,
}

/// Data for PaymentRejected event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRejectedData {
    pub reason: String,
    pub rejected_by: String,
    pub rejected_at: DateTime<Utc>,
}

/// Data for GatewayPaymentFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPaymentFailedData {
    pub reference: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Data for PaymentRefunded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub amount: Money,
    pub reason: Option<String>,
    pub refunded_by: String,
    pub refunded_at: DateTime<Utc>,
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub description: String,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Data for LineStatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineStatusChangedData {
    pub product_id: ProductId,
    pub vendor_id: VendorId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Data for ShipmentDetailsSet event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentDetailsSetData {
    pub tracking_number: String,
    pub carrier: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub set_by: String,
    pub set_at: DateTime<Utc>,
}

/// Data for LocationRecorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecordedData {
    pub location: GeoPoint,
    pub description: String,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub previous_status: OrderStatus,
    pub cancelled_by: String,
    pub cancelled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_with_type_tag() {
        let event = OrderEvent::PaymentRejected(PaymentRejectedData {
            reason: "amount does not match".into(),
            rejected_by: "vendor-1".into(),
            rejected_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PaymentRejected");
        assert_eq!(json["data"]["reason"], "amount does not match");
        assert_eq!(event.event_type(), "PaymentRejected");

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, OrderEvent::PaymentRejected(_)));
    }
}
