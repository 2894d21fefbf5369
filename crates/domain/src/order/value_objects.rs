//! Value objects carried by the order aggregate.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, VendorId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus};

/// Postal address with every field the courier and invoice need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub postal_code: String,
}

impl Address {
    /// Fails with the list of blank fields, prefixed by `label`.
    pub fn validate(&self, label: &str) -> Result<(), OrderError> {
        let missing: Vec<&str> = [
            ("full_name", &self.full_name),
            ("phone", &self.phone),
            ("street", &self.street),
            ("city", &self.city),
            ("province", &self.province),
            ("country", &self.country),
            ("postal_code", &self.postal_code),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrderError::Validation(format!(
                "{label} is missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// One product from one vendor, priced when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub vendor_id: VendorId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
    pub line_status: OrderStatus,
}

impl LineItem {
    /// Creates a line with its subtotal computed.
    pub fn new(
        product_id: ProductId,
        vendor_id: VendorId,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            vendor_id,
            name: name.into(),
            unit_price,
            quantity,
            subtotal: unit_price.multiply(quantity),
            line_status: OrderStatus::Pending,
        }
    }
}

/// The monetary breakdown of an order.
///
/// `total == subtotal + shipping_cost + tax - discount` holds exactly, in
/// minor units, for every value built through [`OrderTotals::compute`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Builds the breakdown, capping the discount so the total never goes negative.
    pub fn compute(subtotal: Money, shipping_cost: Money, tax: Money, discount: Money) -> Self {
        let gross = subtotal + shipping_cost + tax;
        let discount = if discount.is_negative() {
            Money::zero()
        } else if discount > gross {
            gross
        } else {
            discount
        };

        Self {
            subtotal,
            shipping_cost,
            tax,
            discount,
            total: gross - discount,
        }
    }

    /// Returns true if the total matches its parts.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.shipping_cost + self.tax - self.discount
    }
}

/// Where a collection order is picked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPoint {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub instructions: Option<String>,
}

/// A coordinate with an optional street address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub address: Option<String>,
}

impl GeoPoint {
    /// Validates the coordinate ranges.
    pub fn new(lat: f64, lon: f64, address: Option<String>) -> Result<Self, OrderError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(OrderError::Validation(format!(
                "latitude {lat} is outside [-90, 90]"
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(OrderError::Validation(format!(
                "longitude {lon} is outside [-180, 180]"
            )));
        }
        Ok(Self { lat, lon, address })
    }
}

/// One entry of the append-only tracking log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub status: OrderStatus,
    pub location: Option<GeoPoint>,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Reference to an uploaded proof of payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub storage_ref: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Where the customer should look for their goods.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Whereabouts {
    /// Nothing to report yet.
    Unknown,
    /// Last reported courier position.
    InTransit { location: GeoPoint },
    /// Ready at, or already collected from, the collection point.
    CollectionPoint { point: CollectionPoint },
}
