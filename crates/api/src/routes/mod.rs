//! HTTP handlers and the state they share.

pub mod health;
pub mod ledger;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod views;

use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money, VendorId};
use domain::{
    Address, Aggregate, CollectionPoint, FulfillmentMethod, LineItem, Order, OrderNumber,
    OrderStatus, OrderTotals, PaymentMethod, PaymentProof, PaymentStatus, TrackingEntry,
    Whereabouts,
};
use event_store::EventStore;
use marketplace::Marketplace;
use projections::{CustomerOrdersView, ProjectionProcessor, VendorLedgerView, VendorOrdersView};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub market: Marketplace<S>,
    pub processor: ProjectionProcessor<S>,
    pub customer_orders: CustomerOrdersView,
    pub vendor_orders: VendorOrdersView,
    pub vendor_ledger: VendorLedgerView,
}

impl<S: EventStore> AppState<S> {
    /// Brings the read models up to date before a query.
    pub async fn catch_up(&self) -> Result<(), ApiError> {
        self.processor.run_catch_up().await?;
        Ok(())
    }
}

/// Full order as returned by every order endpoint.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Option<AggregateId>,
    pub version: i64,
    pub order_number: Option<OrderNumber>,
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub payment_proof: Option<PaymentProof>,
    pub payment_rejection_reason: Option<String>,
    pub fulfillment_method: Option<FulfillmentMethod>,
    pub collection_point: Option<CollectionPoint>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub items: Vec<LineItem>,
    pub vendors: Vec<VendorId>,
    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub tracking_history: Vec<TrackingEntry>,
    pub whereabouts: Whereabouts,
    pub placed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub refund_amount: Option<Money>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            version: order.version().as_i64(),
            order_number: order.order_number().cloned(),
            customer_id: order.customer_id(),
            status: order.status(),
            payment_status: order.payment_status(),
            payment_method: order.payment_method(),
            payment_reference: order.payment_reference().map(String::from),
            payment_proof: order.payment_proof().cloned(),
            payment_rejection_reason: order.payment_rejection_reason().map(String::from),
            fulfillment_method: order.fulfillment_method(),
            collection_point: order.collection_point().cloned(),
            shipping_address: order.shipping_address().cloned(),
            billing_address: order.billing_address().cloned(),
            items: order.items().to_vec(),
            vendors: order.vendors(),
            totals: order.totals(),
            coupon_code: order.coupon_code().map(String::from),
            tracking_number: order.tracking_number().map(String::from),
            carrier: order.carrier().map(String::from),
            estimated_delivery: order.estimated_delivery(),
            tracking_history: order.tracking_history().to_vec(),
            whereabouts: order.whereabouts(),
            placed_at: order.placed_at(),
            cancelled_at: order.cancelled_at(),
            cancellation_reason: order.cancellation_reason().map(String::from),
            refund_amount: order.refund_amount(),
            refunded_at: order.refunded_at(),
        }
    }
}

pub(crate) fn parse_uuid(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    parse_uuid(id).map(AggregateId::from_uuid)
}
