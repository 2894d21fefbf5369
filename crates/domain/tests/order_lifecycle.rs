//! Order lifecycle through the command handler and the in-memory store.
//!
//! Covers persistence, reconstruction (with and without snapshots) and the
//! behaviour of concurrent writers on the same order.

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{AggregateId, CustomerId, Money, ProductId, Rate, VendorId};
use domain::{
    Address, Aggregate, CommandHandler, CommandOptions, DomainError, FulfillmentMethod, LineItem,
    Order, OrderError, OrderNumber, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus,
    PlaceOrder, Principal,
};
use event_store::{EventQuery, EventStore, InMemoryEventStore, UniqueClaim, Version};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
}

struct Fixture {
    handler: CommandHandler<InMemoryEventStore, Order>,
    store: InMemoryEventStore,
    customer: CustomerId,
    vendor_a: VendorId,
    vendor_b: VendorId,
}

impl Fixture {
    fn new() -> Self {
        let store = InMemoryEventStore::new();
        Self {
            handler: CommandHandler::new(store.clone()),
            store,
            customer: CustomerId::new(),
            vendor_a: VendorId::new(),
            vendor_b: VendorId::new(),
        }
    }

    fn place_command(&self, payment_method: PaymentMethod) -> PlaceOrder {
        let items = vec![
            LineItem::new(ProductId::new("mug"), self.vendor_a, "Mug", Money::from_major(120), 1),
            LineItem::new(ProductId::new("tea"), self.vendor_b, "Tea", Money::from_minor(4550), 2),
        ];
        let subtotal: Money = items.iter().map(|line| line.subtotal).sum();
        PlaceOrder {
            order_id: AggregateId::new(),
            order_number: OrderNumber::compose(now(), 77),
            customer_id: self.customer,
            items,
            shipping_address: Address {
                full_name: "Sipho Dlamini".into(),
                phone: "+27 83 000 1111".into(),
                street: "12 Long St".into(),
                city: "Cape Town".into(),
                province: "Western Cape".into(),
                country: "ZA".into(),
                postal_code: "8001".into(),
            },
            billing_address: None,
            payment_method,
            fulfillment_method: FulfillmentMethod::Delivery,
            collection_point: None,
            totals: OrderTotals::compute(
                subtotal,
                Money::from_major(50),
                subtotal.apply_rate(Rate::from_percent(15)),
                Money::zero(),
            ),
            coupon_code: None,
        }
    }

    async fn place(&self, payment_method: PaymentMethod) -> AggregateId {
        let command = self.place_command(payment_method);
        let order_id = command.order_id;
        let claim = UniqueClaim::new("order-number", &command.order_number);
        let customer = Principal::customer(self.customer);

        self.handler
            .execute_with(order_id, CommandOptions::new().claim(claim), |order| {
                order.place(command.clone(), &customer, now())
            })
            .await
            .unwrap();
        order_id
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn manual_transfer_order_from_checkout_to_delivery() {
        let fx = Fixture::new();
        let order_id = fx.place(PaymentMethod::ManualTransfer).await;
        let customer = Principal::customer(fx.customer);
        let vendor = Principal::vendor(fx.vendor_a);

        fx.handler
            .execute(order_id, |o| o.upload_payment_proof(&customer, "proofs/77.pdf", now()))
            .await
            .unwrap();
        let result = fx
            .handler
            .execute(order_id, |o| o.confirm_payment(&vendor, now()))
            .await
            .unwrap();
        assert_eq!(result.aggregate.payment_status(), PaymentStatus::Paid);

        for (minutes, status) in [
            (10, OrderStatus::Confirmed),
            (20, OrderStatus::Shipped),
            (90, OrderStatus::Delivered),
        ] {
            fx.handler
                .execute(order_id, |o| {
                    o.update_status(&vendor, status, now() + Duration::minutes(minutes))
                })
                .await
                .unwrap();
        }

        let order = fx.handler.load_required(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.version(), Version::new(6));
        assert!(order.totals().is_consistent());
        assert_eq!(order.tracking_history().len(), 3);
        assert_eq!(order.delivered_at(), Some(now() + Duration::minutes(90)));
    }

    #[tokio::test]
    async fn reloaded_order_matches_the_one_returned_by_the_command() {
        let fx = Fixture::new();
        let order_id = fx.place(PaymentMethod::Gateway).await;
        let vendor = Principal::vendor(fx.vendor_b);

        let mut last = None;
        for i in 0..3 {
            let result = fx
                .handler
                .execute(order_id, |o| {
                    o.append_location(
                        &vendor,
                        -33.9 + f64::from(i) * 0.01,
                        18.4,
                        None,
                        "courier update",
                        now() + Duration::minutes(i64::from(i)),
                    )
                })
                .await
                .unwrap();
            last = Some(result.aggregate);
        }

        let returned = last.unwrap();
        let reloaded = fx.handler.load_required(order_id).await.unwrap();
        assert_eq!(reloaded.tracking_history(), returned.tracking_history());
        assert_eq!(reloaded.current_location(), returned.current_location());
        assert_eq!(reloaded.version(), returned.version());
    }

    #[tokio::test]
    async fn order_number_claim_resolves_to_the_order() {
        let fx = Fixture::new();
        let order_id = fx.place(PaymentMethod::Gateway).await;
        let order = fx.handler.load_required(order_id).await.unwrap();

        let key = UniqueClaim::new("order-number", order.order_number().unwrap()).key;
        assert_eq!(fx.store.resolve_claim(&key).await.unwrap(), Some(order_id));
    }

    #[tokio::test]
    async fn a_second_order_cannot_reuse_an_order_number() {
        let fx = Fixture::new();
        let first = fx.place(PaymentMethod::Gateway).await;

        let command = fx.place_command(PaymentMethod::Gateway);
        let second = command.order_id;
        let claim = UniqueClaim::new("order-number", &command.order_number);
        let customer = Principal::customer(fx.customer);
        let err = fx
            .handler
            .execute_with(second, CommandOptions::new().claim(claim), |order| {
                order.place(command.clone(), &customer, now())
            })
            .await
            .unwrap_err();

        assert_eq!(err.unique_violation().map(|(_, owner)| owner), Some(first));
        assert!(fx.handler.load_existing(second).await.unwrap().is_none());
    }
}

mod snapshots {
    use super::*;

    #[tokio::test]
    async fn long_tracking_histories_are_snapshotted() {
        let fx = Fixture::new();
        let order_id = fx.place(PaymentMethod::Gateway).await;
        let vendor = Principal::vendor(fx.vendor_a);

        for i in 0..60 {
            fx.handler
                .execute_with_snapshot(order_id, CommandOptions::new(), |o| {
                    o.append_location(
                        &vendor,
                        -26.0,
                        28.0 + f64::from(i) * 0.001,
                        None,
                        "ping",
                        now() + Duration::seconds(i64::from(i)),
                    )
                })
                .await
                .unwrap();
        }

        let snapshot = fx.store.get_snapshot(order_id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(50));

        let order = fx.handler.load_required(order_id).await.unwrap();
        assert_eq!(order.version(), Version::new(61));
        assert_eq!(order.tracking_history().len(), 60);
        assert_eq!(
            order.current_location().map(|point| point.lon),
            order.tracking_history()[59].location.as_ref().map(|point| point.lon)
        );
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_confirmations_produce_one_payment() {
        let fx = Fixture::new();
        let order_id = fx.place(PaymentMethod::ManualTransfer).await;
        let customer = Principal::customer(fx.customer);
        fx.handler
            .execute(order_id, |o| o.upload_payment_proof(&customer, "proofs/1.png", now()))
            .await
            .unwrap();

        let confirmers = [Principal::vendor(fx.vendor_a), Principal::vendor(fx.vendor_b)];
        let mut tasks = Vec::new();
        for confirmer in confirmers {
            let handler = fx.handler.clone();
            tasks.push(tokio::spawn(async move {
                handler
                    .execute(order_id, |o| o.confirm_payment(&confirmer, now()))
                    .await
            }));
        }

        let mut confirmed = 0;
        let mut already = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(result) if !result.is_noop() => confirmed += 1,
                Err(DomainError::Order(OrderError::AlreadyConfirmed)) => already += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!((confirmed, already), (1, 1));

        let confirmations = fx
            .store
            .query_events(
                EventQuery::for_aggregate_type("Order").event_type("PaymentConfirmed"),
            )
            .await
            .unwrap();
        assert_eq!(confirmations.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_status_updates_never_move_backward() {
        let fx = Fixture::new();
        let order_id = fx.place(PaymentMethod::Gateway).await;

        let mut tasks = Vec::new();
        for (vendor, status) in [
            (fx.vendor_a, OrderStatus::Shipped),
            (fx.vendor_b, OrderStatus::Processing),
        ] {
            let handler = fx.handler.clone();
            tasks.push(tokio::spawn(async move {
                let actor = Principal::vendor(vendor);
                handler
                    .execute(order_id, |o| o.update_status(&actor, status, now()))
                    .await
            }));
        }
        for task in tasks {
            // Processing may legitimately lose to Shipped.
            let _ = task.await.unwrap();
        }

        let order = fx.handler.load_required(order_id).await.unwrap();
        let ranks: Vec<_> = order
            .tracking_history()
            .iter()
            .filter_map(|entry| entry.status.rank())
            .collect();
        assert!(ranks.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(order.status(), OrderStatus::Shipped);
    }
}
