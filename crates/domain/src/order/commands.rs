//! Command inputs that carry more than a couple of fields.

use common::{AggregateId, CustomerId};

use crate::ids::OrderNumber;

use super::{Address, CollectionPoint, FulfillmentMethod, LineItem, OrderTotals, PaymentMethod};

/// A fully priced checkout, ready to become an order.
///
/// Prices, vendors and totals are resolved by the caller before the order is
/// written; the aggregate only validates them.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub items: Vec<LineItem>,
    pub shipping_address: Address,
    /// Defaults to the shipping address.
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub fulfillment_method: FulfillmentMethod,
    pub collection_point: Option<CollectionPoint>,
    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
}

/// What the payment gateway reported for a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Succeeded,
    Failed { reason: String },
}
