use chrono::{DateTime, TimeZone, Utc};
use common::{AggregateId, CustomerId, Money, ProductId, Rate, VendorId};

use crate::aggregate::Aggregate;
use crate::auth::Principal;
use crate::ids::OrderNumber;

use super::*;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
}

pub struct Parties {
    pub customer_id: CustomerId,
    pub vendor_a: VendorId,
    pub vendor_b: VendorId,
}

impl Parties {
    pub fn new() -> Self {
        Self {
            customer_id: CustomerId::new(),
            vendor_a: VendorId::new(),
            vendor_b: VendorId::new(),
        }
    }

    pub fn customer(&self) -> Principal {
        Principal::customer(self.customer_id)
    }

    pub fn vendor(&self, vendor_id: VendorId) -> Principal {
        Principal::vendor(vendor_id)
    }

    pub fn admin(&self) -> Principal {
        Principal::admin("admin-1")
    }
}

pub fn address() -> Address {
    Address {
        full_name: "Thandi Nkosi".into(),
        phone: "+27 82 555 0199".into(),
        street: "4 Bree St".into(),
        city: "Johannesburg".into(),
        province: "Gauteng".into(),
        country: "ZA".into(),
        postal_code: "2001".into(),
    }
}

/// Two vendors: A sells 1 x 200.00, B sells 2 x 150.00.
/// Shipping 50.00, tax 15%, no discount: total 625.00.
pub fn place_command(
    parties: &Parties,
    payment_method: PaymentMethod,
    fulfillment_method: FulfillmentMethod,
) -> PlaceOrder {
    let items = vec![
        LineItem::new(
            ProductId::new("sku-a"),
            parties.vendor_a,
            "Ceramic bowl",
            Money::from_major(200),
            1,
        ),
        LineItem::new(
            ProductId::new("sku-b"),
            parties.vendor_b,
            "Linen towel",
            Money::from_major(150),
            2,
        ),
    ];
    let subtotal: Money = items.iter().map(|line| line.subtotal).sum();
    let totals = OrderTotals::compute(
        subtotal,
        Money::from_major(50),
        subtotal.apply_rate(Rate::from_percent(15)),
        Money::zero(),
    );

    PlaceOrder {
        order_id: AggregateId::new(),
        order_number: OrderNumber::compose(now(), 1),
        customer_id: parties.customer_id,
        items,
        shipping_address: address(),
        billing_address: None,
        payment_method,
        fulfillment_method,
        collection_point: Some(CollectionPoint {
            name: "Rosebank depot".into(),
            address: "15 Cradock Ave, Rosebank".into(),
            phone: "+27 11 555 0123".into(),
            instructions: Some("Bring your order number".into()),
        }),
        totals,
        coupon_code: None,
    }
}

pub fn placed(
    parties: &Parties,
    payment_method: PaymentMethod,
    fulfillment_method: FulfillmentMethod,
) -> Order {
    let mut order = Order::default();
    let events = order.place(
        place_command(parties, payment_method, fulfillment_method),
        &parties.customer(),
        now(),
    );
    apply(&mut order, events);
    order
}

/// Applies decided events the way the command handler would.
pub fn apply(order: &mut Order, events: Result<Vec<OrderEvent>, OrderError>) {
    let events = events.unwrap();
    let mut version = order.version();
    for event in events {
        order.apply(event);
        version = version.next();
    }
    order.set_version(version);
}
