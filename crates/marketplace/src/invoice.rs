//! On-demand invoice view of an order, grouped by vendor.

use std::sync::Arc;

use common::{AggregateId, CustomerId, Money, VendorId};
use domain::{
    Address, Aggregate, CollectionPoint, FulfillmentMethod, LineItem, Order, OrderNumber,
    OrderTotals, PaymentMethod, PaymentStatus,
};
use serde::Serialize;

use crate::collaborators::{BankingDetails, VendorDirectory};
use crate::error::{MarketplaceError, Result};

/// The lines of one vendor on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorGroup {
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    /// Present only for manual-transfer orders, where the customer pays the
    /// vendor directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banking: Option<BankingDetails>,
}

/// Invoice of an order grouped by vendor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub fulfillment_method: FulfillmentMethod,
    pub collection_point: Option<CollectionPoint>,
    pub totals: OrderTotals,
    pub vendor_groups: Vec<VendorGroup>,
}

/// Builds invoices from the current order and vendor directory. Nothing is
/// stored and the order is never modified.
#[derive(Clone)]
pub struct InvoiceProjection {
    vendors: Arc<dyn VendorDirectory>,
}

impl InvoiceProjection {
    /// Creates a projection backed by the vendor directory.
    pub fn new(vendors: Arc<dyn VendorDirectory>) -> Self {
        Self { vendors }
    }

    /// Builds the invoice of a placed order.
    pub async fn project(&self, order: &Order) -> Result<Invoice> {
        let missing = || MarketplaceError::NotFound("order".to_string());
        let order_id = order.id().ok_or_else(missing)?;
        let with_banking = order.payment_method().is_some_and(|method| method.is_manual());

        let mut vendor_groups: Vec<VendorGroup> = Vec::new();
        for item in order.items() {
            match vendor_groups
                .iter_mut()
                .find(|group| group.vendor_id == item.vendor_id)
            {
                Some(group) => {
                    group.subtotal += item.subtotal;
                    group.items.push(item.clone());
                }
                None => vendor_groups.push(VendorGroup {
                    vendor_id: item.vendor_id,
                    vendor_name: item.vendor_id.to_string(),
                    items: vec![item.clone()],
                    subtotal: item.subtotal,
                    banking: None,
                }),
            }
        }

        for group in &mut vendor_groups {
            let Some(profile) = self.vendors.vendor(group.vendor_id).await? else {
                tracing::warn!(%order_id, vendor_id = %group.vendor_id, "vendor missing from directory");
                continue;
            };
            group.vendor_name = profile.display_name;
            if with_banking {
                group.banking = profile.banking;
            }
        }

        Ok(Invoice {
            order_id,
            order_number: order.order_number().cloned().ok_or_else(missing)?,
            customer_id: order.customer_id().ok_or_else(missing)?,
            billing_address: order.billing_address().cloned().ok_or_else(missing)?,
            shipping_address: order.shipping_address().cloned().ok_or_else(missing)?,
            payment_method: order.payment_method().ok_or_else(missing)?,
            payment_status: order.payment_status(),
            fulfillment_method: order.fulfillment_method().ok_or_else(missing)?,
            collection_point: order.collection_point().cloned(),
            totals: order.totals(),
            vendor_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use common::ProductId;
    use domain::{OrderEvent, order::OrderPlacedData};

    use super::*;
    use crate::collaborators::{InMemoryVendorDirectory, VendorProfile};

    fn address() -> Address {
        Address {
            full_name: "Thandi Nkosi".into(),
            phone: "+27 82 555 0101".into(),
            street: "3 Church St".into(),
            city: "Durban".into(),
            province: "KwaZulu-Natal".into(),
            country: "ZA".into(),
            postal_code: "4001".into(),
        }
    }

    fn placed(method: PaymentMethod, items: Vec<LineItem>) -> Order {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        let subtotal: Money = items.iter().map(|line| line.subtotal).sum();
        let mut order = Order::default();
        order.apply(OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: AggregateId::new(),
            order_number: OrderNumber::compose(now, 1),
            customer_id: CustomerId::new(),
            items,
            shipping_address: address(),
            billing_address: address(),
            payment_method: method,
            fulfillment_method: FulfillmentMethod::Delivery,
            collection_point: None,
            totals: OrderTotals::compute(subtotal, Money::zero(), Money::zero(), Money::zero()),
            coupon_code: None,
            placed_at: now,
        }));
        order
    }

    fn directory(vendors: &[(VendorId, &str)]) -> Arc<InMemoryVendorDirectory> {
        let directory = InMemoryVendorDirectory::new();
        for (vendor_id, name) in vendors {
            directory.register(VendorProfile {
                vendor_id: *vendor_id,
                display_name: (*name).to_string(),
                banking: Some(BankingDetails {
                    account_name: (*name).to_string(),
                    bank_name: "First Bank".into(),
                    account_number: "6200112233".into(),
                    branch_code: "250655".into(),
                }),
            });
        }
        Arc::new(directory)
    }

    #[tokio::test]
    async fn lines_are_grouped_by_vendor_in_order_of_appearance() {
        let (a, b) = (VendorId::new(), VendorId::new());
        let order = placed(
            PaymentMethod::ManualTransfer,
            vec![
                LineItem::new(ProductId::new("bowl"), a, "Bowl", Money::from_major(80), 2),
                LineItem::new(ProductId::new("soap"), b, "Soap", Money::from_minor(2599), 1),
                LineItem::new(ProductId::new("vase"), a, "Vase", Money::from_major(150), 1),
            ],
        );
        let projection = InvoiceProjection::new(directory(&[(a, "Clay Works"), (b, "Suds")]));

        let invoice = projection.project(&order).await.unwrap();

        assert_eq!(invoice.vendor_groups.len(), 2);
        let first = &invoice.vendor_groups[0];
        assert_eq!(first.vendor_name, "Clay Works");
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.subtotal, Money::from_major(310));
        assert!(first.banking.is_some());
        assert_eq!(invoice.vendor_groups[1].subtotal, Money::from_minor(2599));
    }

    #[tokio::test]
    async fn gateway_invoices_never_carry_bank_details() {
        let vendor = VendorId::new();
        let order = placed(
            PaymentMethod::Gateway,
            vec![LineItem::new(ProductId::new("bowl"), vendor, "Bowl", Money::from_major(80), 1)],
        );
        let projection = InvoiceProjection::new(directory(&[(vendor, "Clay Works")]));

        let invoice = projection.project(&order).await.unwrap();

        assert!(invoice.vendor_groups.iter().all(|group| group.banking.is_none()));
        let json = serde_json::to_value(&invoice).unwrap();
        assert!(json["vendor_groups"][0].get("banking").is_none());
    }

    #[tokio::test]
    async fn unknown_vendors_fall_back_to_their_id() {
        let vendor = VendorId::new();
        let order = placed(
            PaymentMethod::ManualTransfer,
            vec![LineItem::new(ProductId::new("bowl"), vendor, "Bowl", Money::from_major(80), 1)],
        );
        let projection = InvoiceProjection::new(directory(&[]));

        let invoice = projection.project(&order).await.unwrap();

        assert_eq!(invoice.vendor_groups[0].vendor_name, vendor.to_string());
        assert!(invoice.vendor_groups[0].banking.is_none());
    }

    #[tokio::test]
    async fn unplaced_orders_have_no_invoice() {
        let projection = InvoiceProjection::new(directory(&[]));
        let err = projection.project(&Order::default()).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
