//! Order aggregate implementation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money, ProductId, VendorId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::auth::{Access, Principal};
use crate::ids::OrderNumber;

use super::{
    Address, CollectionPoint, FulfillmentMethod, GeoPoint, LineItem, OrderError, OrderEvent,
    OrderStatus, OrderTotals, PaymentMethod, PaymentProof, PaymentStatus, PlaceOrder,
    TrackingEntry, Whereabouts,
    events::{OrderCancelledData, OrderPlacedData},
};

/// Order aggregate root.
///
/// One order spans every vendor in a checkout. Payment and fulfillment
/// decisions live in sibling modules but mutate this same state, so every
/// write is conditional on the version the decision was made against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    pub(super) order_number: Option<OrderNumber>,
    pub(super) customer_id: Option<CustomerId>,
    pub(super) shipping_address: Option<Address>,
    pub(super) billing_address: Option<Address>,
    pub(super) items: Vec<LineItem>,
    pub(super) totals: OrderTotals,
    pub(super) coupon_code: Option<String>,

    pub(super) payment_method: Option<PaymentMethod>,
    pub(super) payment_status: PaymentStatus,
    pub(super) payment_reference: Option<String>,
    pub(super) payment_proof: Option<PaymentProof>,
    pub(super) payment_confirmed_by: Option<String>,
    pub(super) payment_confirmed_at: Option<DateTime<Utc>>,
    pub(super) payment_rejection_reason: Option<String>,

    pub(super) status: OrderStatus,
    pub(super) fulfillment_method: Option<FulfillmentMethod>,
    pub(super) collection_point: Option<CollectionPoint>,
    pub(super) tracking_number: Option<String>,
    pub(super) carrier: Option<String>,
    pub(super) estimated_delivery: Option<DateTime<Utc>>,
    pub(super) tracking_history: Vec<TrackingEntry>,
    pub(super) current_location: Option<GeoPoint>,

    pub(super) placed_at: Option<DateTime<Utc>>,
    pub(super) confirmed_at: Option<DateTime<Utc>>,
    pub(super) shipped_at: Option<DateTime<Utc>>,
    pub(super) delivered_at: Option<DateTime<Utc>>,
    pub(super) cancelled_at: Option<DateTime<Utc>>,
    pub(super) cancellation_reason: Option<String>,
    pub(super) refund_amount: Option<Money>,
    pub(super) refunded_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::PaymentProofUploaded(data) => {
                self.payment_status = PaymentStatus::AwaitingConfirmation;
                self.payment_reference = Some(data.proof.storage_ref.clone());
                self.payment_proof = Some(data.proof);
                self.payment_rejection_reason = None;
            }
            OrderEvent::PaymentConfirmed(data) => {
                self.payment_status = PaymentStatus::Paid;
                if data.reference.is_some() {
                    self.payment_reference = data.reference;
                }
                self.payment_confirmed_by = Some(data.confirmed_by);
                self.payment_confirmed_at = Some(data.confirmed_at);
                self.payment_rejection_reason = None;
            }
            OrderEvent::PaymentRejected(data) => {
                self.payment_status = PaymentStatus::Failed;
                self.payment_rejection_reason = Some(data.reason);
            }
            OrderEvent::GatewayPaymentFailed(data) => {
                self.payment_status = PaymentStatus::Failed;
                self.payment_reference = Some(data.reference);
                self.payment_rejection_reason = Some(data.reason);
            }
            OrderEvent::PaymentRefunded(data) => {
                self.payment_status = PaymentStatus::Refunded;
                self.refund_amount = Some(data.amount);
                self.refunded_at = Some(data.refunded_at);
                if self.status.closes_on_refund() {
                    self.status = OrderStatus::Refunded;
                    self.push_tracking(TrackingEntry {
                        status: OrderStatus::Refunded,
                        location: None,
                        timestamp: data.refunded_at,
                        description: format!("Order refunded ({})", data.amount),
                    });
                }
            }
            OrderEvent::StatusChanged(data) => {
                self.status = data.to;
                match data.to {
                    OrderStatus::Confirmed => self.confirmed_at = Some(data.changed_at),
                    OrderStatus::Shipped => self.shipped_at = Some(data.changed_at),
                    OrderStatus::Delivered => self.delivered_at = Some(data.changed_at),
                    _ => {}
                }
                self.push_tracking(TrackingEntry {
                    status: data.to,
                    location: None,
                    timestamp: data.changed_at,
                    description: data.description,
                });
            }
            OrderEvent::LineStatusChanged(data) => {
                if let Some(line) = self
                    .items
                    .iter_mut()
                    .find(|line| line.product_id == data.product_id)
                {
                    line.line_status = data.to;
                }
            }
            OrderEvent::ShipmentDetailsSet(data) => {
                self.tracking_number = Some(data.tracking_number);
                self.carrier = Some(data.carrier);
                self.estimated_delivery = data.estimated_delivery;
            }
            OrderEvent::LocationRecorded(data) => {
                self.push_tracking(TrackingEntry {
                    status: self.status,
                    location: Some(data.location),
                    timestamp: data.recorded_at,
                    description: data.description,
                });
            }
            OrderEvent::OrderCancelled(data) => self.apply_cancelled(data),
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    /// Returns the order number.
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    /// Returns the customer ID.
    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    /// Returns the shipping address.
    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    /// Returns the billing address.
    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    /// Returns all line items.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Returns a line item by product ID.
    pub fn item(&self, product_id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|line| &line.product_id == product_id)
    }

    /// Returns the order totals.
    pub fn totals(&self) -> OrderTotals {
        self.totals
    }

    /// Returns the grand total.
    pub fn total(&self) -> Money {
        self.totals.total
    }

    /// Returns the applied coupon code.
    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    /// Distinct vendors in line order.
    pub fn vendors(&self) -> Vec<VendorId> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .map(|line| line.vendor_id)
            .filter(|vendor| seen.insert(*vendor))
            .collect()
    }

    /// Returns true if any line belongs to the vendor.
    pub fn has_vendor(&self, vendor_id: VendorId) -> bool {
        self.items.iter().any(|line| line.vendor_id == vendor_id)
    }

    /// Merchandise value of one vendor's lines.
    pub fn vendor_subtotal(&self, vendor_id: VendorId) -> Money {
        self.items
            .iter()
            .filter(|line| line.vendor_id == vendor_id)
            .map(|line| line.subtotal)
            .sum()
    }

    /// Vendor with the largest merchandise share; the earliest line wins ties.
    pub fn principal_vendor(&self) -> Option<VendorId> {
        let mut best: Option<(VendorId, Money)> = None;
        for vendor in self.vendors() {
            let share = self.vendor_subtotal(vendor);
            if best.is_none_or(|(_, top)| share > top) {
                best = Some((vendor, share));
            }
        }
        best.map(|(vendor, _)| vendor)
    }

    /// Returns the payment method.
    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    /// Returns the payment status.
    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// Returns the gateway payment reference.
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    /// Returns the uploaded proof of payment.
    pub fn payment_proof(&self) -> Option<&PaymentProof> {
        self.payment_proof.as_ref()
    }

    /// Returns who confirmed the payment.
    pub fn payment_confirmed_by(&self) -> Option<&str> {
        self.payment_confirmed_by.as_deref()
    }

    /// Returns when the payment was confirmed.
    pub fn payment_confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.payment_confirmed_at
    }

    /// Returns why the payment was rejected.
    pub fn payment_rejection_reason(&self) -> Option<&str> {
        self.payment_rejection_reason.as_deref()
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the fulfillment method.
    pub fn fulfillment_method(&self) -> Option<FulfillmentMethod> {
        self.fulfillment_method
    }

    /// Returns the collection point.
    pub fn collection_point(&self) -> Option<&CollectionPoint> {
        self.collection_point.as_ref()
    }

    /// Returns the tracking number.
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    /// Returns the carrier.
    pub fn carrier(&self) -> Option<&str> {
        self.carrier.as_deref()
    }

    /// Returns the estimated delivery time.
    pub fn estimated_delivery(&self) -> Option<DateTime<Utc>> {
        self.estimated_delivery
    }

    /// Returns the tracking log, oldest first.
    pub fn tracking_history(&self) -> &[TrackingEntry] {
        &self.tracking_history
    }

    /// Returns the last recorded location.
    pub fn current_location(&self) -> Option<&GeoPoint> {
        self.current_location.as_ref()
    }

    /// Returns when the order was placed.
    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    /// Returns when the order was confirmed.
    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    /// Returns when the order shipped.
    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    /// Returns when the order was delivered.
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Returns when the order was cancelled.
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Returns the cancellation reason.
    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Returns the refunded amount.
    pub fn refund_amount(&self) -> Option<Money> {
        self.refund_amount
    }

    /// Returns when the order was refunded.
    pub fn refunded_at(&self) -> Option<DateTime<Utc>> {
        self.refunded_at
    }

    /// Where the goods can currently be found.
    pub fn whereabouts(&self) -> Whereabouts {
        match (self.fulfillment_method, &self.collection_point) {
            (Some(FulfillmentMethod::Collection), Some(point))
                if matches!(self.status, OrderStatus::Shipped | OrderStatus::Delivered) =>
            {
                Whereabouts::CollectionPoint {
                    point: point.clone(),
                }
            }
            (Some(FulfillmentMethod::Delivery), _) => match &self.current_location {
                Some(location) => Whereabouts::InTransit {
                    location: location.clone(),
                },
                None => Whereabouts::Unknown,
            },
            _ => Whereabouts::Unknown,
        }
    }

    /// Checks an access rule against this order's parties.
    pub fn authorize(
        &self,
        principal: &Principal,
        access: Access,
        action: &'static str,
    ) -> Result<(), OrderError> {
        if principal.is_admin() {
            return Ok(());
        }

        let is_customer = principal
            .customer_id()
            .is_some_and(|customer| self.customer_id == Some(customer));
        let is_vendor = principal
            .vendor_id()
            .is_some_and(|vendor| self.has_vendor(vendor));

        let allowed = match access {
            Access::OwningCustomer => is_customer,
            Access::OrderVendor => is_vendor,
            Access::Participant => is_customer || is_vendor,
            Access::AdminOnly => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(OrderError::Unauthorized {
                actor: principal.to_string(),
                action,
            })
        }
    }

    pub(super) fn require_placed(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotFound);
        }
        Ok(())
    }

    /// `now`, moved forward if needed so the tracking log never goes back in time.
    pub(super) fn tracking_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.tracking_history.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order from a priced checkout.
    pub fn place(
        &self,
        command: PlaceOrder,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }

        if !actor.is_admin() && actor.customer_id() != Some(command.customer_id) {
            return Err(OrderError::Unauthorized {
                actor: actor.to_string(),
                action: "place an order for another customer",
            });
        }

        Self::validate_lines(&command.items)?;

        let subtotal: Money = command.items.iter().map(|line| line.subtotal).sum();
        if command.totals.subtotal != subtotal || !command.totals.is_consistent() {
            return Err(OrderError::Validation(
                "order totals do not add up".to_string(),
            ));
        }
        if command.totals.total.is_negative() {
            return Err(OrderError::Validation(
                "order total cannot be negative".to_string(),
            ));
        }

        command.shipping_address.validate("shipping address")?;
        let billing_address = command
            .billing_address
            .unwrap_or_else(|| command.shipping_address.clone());
        billing_address.validate("billing address")?;

        let collection_point = match command.fulfillment_method {
            FulfillmentMethod::Collection => Some(command.collection_point.ok_or_else(|| {
                OrderError::Validation("collection orders need a collection point".to_string())
            })?),
            FulfillmentMethod::Delivery => None,
        };

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: command.order_id,
            order_number: command.order_number,
            customer_id: command.customer_id,
            items: command.items,
            shipping_address: command.shipping_address,
            billing_address,
            payment_method: command.payment_method,
            fulfillment_method: command.fulfillment_method,
            collection_point,
            totals: command.totals,
            coupon_code: command.coupon_code,
            placed_at: now,
        })])
    }

    /// Cancels the order. Stock is restored by the caller once this is persisted.
    pub fn cancel(
        &self,
        actor: &Principal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::Participant, "cancel this order")?;

        if !self.status.can_cancel() {
            return Err(OrderError::status("cancel the order", self.status));
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::Validation(
                "a cancellation reason is required".to_string(),
            ));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.to_string(),
            previous_status: self.status,
            cancelled_by: actor.actor_id.clone(),
            cancelled_at: self.tracking_time(now),
        })])
    }

    fn validate_lines(items: &[LineItem]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::Validation(
                "an order needs at least one item".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for line in items {
            if !seen.insert(&line.product_id) {
                return Err(OrderError::Validation(format!(
                    "product {} appears more than once",
                    line.product_id
                )));
            }
            if line.quantity == 0 {
                return Err(OrderError::Validation(format!(
                    "quantity for {} must be greater than 0",
                    line.product_id
                )));
            }
            if !line.unit_price.is_positive() {
                return Err(OrderError::Validation(format!(
                    "unit price for {} must be greater than 0",
                    line.product_id
                )));
            }
            if line.subtotal != line.unit_price.multiply(line.quantity) {
                return Err(OrderError::Validation(format!(
                    "subtotal for {} does not match price and quantity",
                    line.product_id
                )));
            }
        }
        Ok(())
    }
}

// Apply event helpers
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.customer_id = Some(data.customer_id);
        self.items = data.items;
        self.shipping_address = Some(data.shipping_address);
        self.billing_address = Some(data.billing_address);
        self.payment_method = Some(data.payment_method);
        self.fulfillment_method = Some(data.fulfillment_method);
        self.collection_point = data.collection_point;
        self.totals = data.totals;
        self.coupon_code = data.coupon_code;
        self.status = OrderStatus::Pending;
        self.payment_status = PaymentStatus::Pending;
        self.tracking_history.clear();
        self.current_location = None;
        self.placed_at = Some(data.placed_at);
    }

    fn apply_cancelled(&mut self, data: OrderCancelledData) {
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(data.cancelled_at);
        self.push_tracking(TrackingEntry {
            status: OrderStatus::Cancelled,
            location: None,
            timestamp: data.cancelled_at,
            description: format!("Order cancelled: {}", data.reason),
        });
        self.cancellation_reason = Some(data.reason);
    }

    /// Appends to the tracking log and refreshes the cached location.
    fn push_tracking(&mut self, entry: TrackingEntry) {
        self.tracking_history.push(entry);
        self.current_location = self
            .tracking_history
            .iter()
            .rev()
            .find_map(|entry| entry.location.clone());
    }
}
