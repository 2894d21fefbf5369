//! Fulfillment decisions: status progression, shipment details and the
//! tracking log.

use chrono::{DateTime, Utc};
use common::ProductId;

use crate::auth::{Access, Principal};

use super::{
    FulfillmentMethod, GeoPoint, Order, OrderError, OrderEvent, OrderStatus,
    events::{LineStatusChangedData, LocationRecordedData, ShipmentDetailsSetData, StatusChangedData},
};

impl Order {
    fn require_delivery(&self, action: &'static str) -> Result<(), OrderError> {
        match self.fulfillment_method {
            Some(FulfillmentMethod::Delivery) => Ok(()),
            Some(FulfillmentMethod::Collection) => Err(OrderError::Validation(format!(
                "cannot {action} for a collection order"
            ))),
            None => Err(OrderError::NotFound),
        }
    }

    fn describe(&self, status: OrderStatus) -> String {
        let collection = self
            .collection_point
            .as_ref()
            .filter(|_| self.fulfillment_method == Some(FulfillmentMethod::Collection));

        match (status, collection) {
            (OrderStatus::Confirmed, _) => "Order confirmed".to_string(),
            (OrderStatus::Processing, _) => "Order is being prepared".to_string(),
            (OrderStatus::Shipped, Some(point)) => {
                format!("Ready for collection at {}", point.name)
            }
            (OrderStatus::Shipped, None) => match &self.carrier {
                Some(carrier) => format!("Order shipped with {carrier}"),
                None => "Order shipped".to_string(),
            },
            (OrderStatus::Delivered, Some(point)) => format!("Collected from {}", point.name),
            (OrderStatus::Delivered, None) => "Order delivered".to_string(),
            (other, _) => format!("Order {other}"),
        }
    }

    /// Moves the order-level status forward. Skipping stages is allowed,
    /// going back is not.
    pub fn update_status(
        &self,
        actor: &Principal,
        new_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::OrderVendor, "update the order status")?;

        if !self.status.can_advance_to(new_status) {
            return Err(OrderError::status(
                match new_status {
                    OrderStatus::Confirmed => "mark the order confirmed",
                    OrderStatus::Processing => "mark the order processing",
                    OrderStatus::Shipped => "mark the order shipped",
                    OrderStatus::Delivered => "mark the order delivered",
                    OrderStatus::Pending => "move the order back to pending",
                    OrderStatus::Cancelled | OrderStatus::Refunded => {
                        "set that status directly; use cancel or refund"
                    }
                },
                self.status,
            ));
        }

        Ok(vec![OrderEvent::StatusChanged(StatusChangedData {
            from: self.status,
            to: new_status,
            description: self.describe(new_status),
            changed_by: actor.actor_id.clone(),
            changed_at: self.tracking_time(now),
        })])
    }

    /// Advances one vendor's line item. The order-level status is untouched.
    pub fn update_line_status(
        &self,
        actor: &Principal,
        product_id: &ProductId,
        new_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;

        let line = self
            .item(product_id)
            .ok_or_else(|| OrderError::LineItemNotFound {
                product_id: product_id.clone(),
            })?;

        if !actor.is_admin() && actor.vendor_id() != Some(line.vendor_id) {
            return Err(OrderError::Unauthorized {
                actor: actor.to_string(),
                action: "update another vendor's line item",
            });
        }

        if self.status.is_closed() {
            return Err(OrderError::status("update a line item", self.status));
        }
        if !line.line_status.can_advance_to(new_status) {
            return Err(OrderError::InvalidStateTransition {
                action: "move the line item to that status",
                subject: "line status",
                current: line.line_status.to_string(),
            });
        }

        Ok(vec![OrderEvent::LineStatusChanged(LineStatusChangedData {
            product_id: line.product_id.clone(),
            vendor_id: line.vendor_id,
            from: line.line_status,
            to: new_status,
            changed_by: actor.actor_id.clone(),
            changed_at: now,
        })])
    }

    /// Records the tracking number, carrier and estimated delivery.
    pub fn set_shipment_details(
        &self,
        actor: &Principal,
        tracking_number: &str,
        carrier: &str,
        estimated_delivery: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::OrderVendor, "set shipment details")?;
        self.require_delivery("set shipment details")?;

        if matches!(
            self.status,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        ) {
            return Err(OrderError::status("set shipment details", self.status));
        }

        let (tracking_number, carrier) = (tracking_number.trim(), carrier.trim());
        if tracking_number.is_empty() || carrier.is_empty() {
            return Err(OrderError::Validation(
                "tracking number and carrier are required".to_string(),
            ));
        }

        Ok(vec![OrderEvent::ShipmentDetailsSet(ShipmentDetailsSetData {
            tracking_number: tracking_number.to_string(),
            carrier: carrier.to_string(),
            estimated_delivery,
            set_by: actor.actor_id.clone(),
            set_at: now,
        })])
    }

    /// Records a courier position on a delivery order.
    pub fn append_location(
        &self,
        actor: &Principal,
        lat: f64,
        lon: f64,
        address: Option<String>,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::OrderVendor, "record a tracking location")?;
        self.require_delivery("record a tracking location")?;

        if self.status.is_closed() {
            return Err(OrderError::status("record a tracking location", self.status));
        }

        let location = GeoPoint::new(lat, lon, address)?;
        let description = match description.trim() {
            "" => "Location update".to_string(),
            text => text.to_string(),
        };

        Ok(vec![OrderEvent::LocationRecorded(LocationRecordedData {
            location,
            description,
            recorded_by: actor.actor_id.clone(),
            recorded_at: self.tracking_time(now),
        })])
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::VendorId;

    use super::*;
    use crate::order::test_support::*;
    use crate::order::{PaymentMethod, Whereabouts};

    fn delivery_order(parties: &Parties) -> Order {
        placed(parties, PaymentMethod::Gateway, FulfillmentMethod::Delivery)
    }

    #[test]
    fn status_moves_forward_and_stamps_milestones() {
        let parties = Parties::new();
        let mut order = delivery_order(&parties);
        let vendor = parties.vendor(parties.vendor_a);

        let pending = order.update_status(&vendor, OrderStatus::Confirmed, now());
        apply(&mut order, pending);
        let pending = order.update_status(&vendor, OrderStatus::Shipped, now() + Duration::hours(1));
        apply(&mut order, pending);

        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.confirmed_at(), Some(now()));
        assert_eq!(order.shipped_at(), Some(now() + Duration::hours(1)));
        let statuses: Vec<_> = order.tracking_history().iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Confirmed, OrderStatus::Shipped]);
    }

    #[test]
    fn status_never_moves_backward() {
        let parties = Parties::new();
        let mut order = delivery_order(&parties);
        let pending = order.update_status(&parties.admin(), OrderStatus::Processing, now());
        apply(&mut order, pending);

        for target in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Cancelled,
        ] {
            let err = order
                .update_status(&parties.admin(), target, now())
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_state_transition", "{target}");
        }
    }

    #[test]
    fn customers_cannot_move_status() {
        let parties = Parties::new();
        let order = delivery_order(&parties);
        let err = order
            .update_status(&parties.customer(), OrderStatus::Confirmed, now())
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");
    }

    #[test]
    fn tracking_timestamps_never_decrease() {
        let parties = Parties::new();
        let mut order = delivery_order(&parties);
        let vendor = parties.vendor(parties.vendor_a);

        let pending = order.update_status(&vendor, OrderStatus::Shipped, now() + Duration::minutes(10));
        apply(&mut order, pending);
        // A courier device with a lagging clock.
        let pending = order.append_location(&vendor, -26.2, 28.0, None, "depot", now());
        apply(&mut order, pending);

        let times: Vec<_> = order.tracking_history().iter().map(|e| e.timestamp).collect();
        assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn three_locations_keep_order_and_cache_the_last() {
        let parties = Parties::new();
        let mut order = delivery_order(&parties);
        let vendor = parties.vendor(parties.vendor_b);
        let stops = [(-26.20, 28.04), (-26.10, 28.05), (-26.05, 28.06)];

        for (i, (lat, lon)) in stops.into_iter().enumerate() {
            let pending = order.append_location(
                    &vendor,
                    lat,
                    lon,
                    Some(format!("stop {i}")),
                    "on the way",
                    now() + Duration::minutes(i as i64),
                );
            apply(&mut order, pending);
        }

        let history = order.tracking_history();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
        assert_eq!(order.current_location(), history[2].location.as_ref());
        assert_eq!(order.current_location().unwrap().lat, -26.05);
        assert!(matches!(order.whereabouts(), Whereabouts::InTransit { .. }));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn location_updates_are_delivery_only_and_validated() {
        let parties = Parties::new();
        let collection = placed(&parties, PaymentMethod::Gateway, FulfillmentMethod::Collection);
        let vendor = parties.vendor(parties.vendor_a);

        assert!(matches!(
            collection.append_location(&vendor, 0.0, 0.0, None, "", now()),
            Err(OrderError::Validation(_))
        ));

        let delivery = delivery_order(&parties);
        assert!(delivery
            .append_location(&vendor, 120.0, 0.0, None, "", now())
            .is_err());
    }

    #[test]
    fn cancelled_orders_reject_location_updates() {
        let parties = Parties::new();
        let mut order = delivery_order(&parties);
        let pending = order.cancel(&parties.customer(), "duplicate", now());
        apply(&mut order, pending);

        let err = order
            .append_location(&parties.admin(), 1.0, 1.0, None, "", now())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state_transition");
    }

    #[test]
    fn collection_point_surfaces_once_ready() {
        let parties = Parties::new();
        let mut order = placed(&parties, PaymentMethod::Gateway, FulfillmentMethod::Collection);
        assert_eq!(order.whereabouts(), Whereabouts::Unknown);

        let events = order
            .update_status(&parties.admin(), OrderStatus::Shipped, now())
            .unwrap();
        match &events[0] {
            OrderEvent::StatusChanged(data) => {
                assert_eq!(data.description, "Ready for collection at Rosebank depot");
            }
            other => panic!("unexpected event {other:?}"),
        }
        apply(&mut order, Ok(events));

        match order.whereabouts() {
            Whereabouts::CollectionPoint { point } => assert_eq!(point.name, "Rosebank depot"),
            other => panic!("unexpected whereabouts {other:?}"),
        }
    }

    #[test]
    fn line_status_is_vendor_scoped_and_independent() {
        let parties = Parties::new();
        let mut order = delivery_order(&parties);
        let sku_a = ProductId::new("sku-a");

        let err = order
            .update_line_status(
                &parties.vendor(parties.vendor_b),
                &sku_a,
                OrderStatus::Shipped,
                now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");

        let pending = order.update_line_status(
                &parties.vendor(parties.vendor_a),
                &sku_a,
                OrderStatus::Shipped,
                now(),
            );
        apply(&mut order, pending);

        assert_eq!(order.item(&sku_a).unwrap().line_status, OrderStatus::Shipped);
        assert_eq!(
            order.item(&ProductId::new("sku-b")).unwrap().line_status,
            OrderStatus::Pending
        );
        assert_eq!(order.status(), OrderStatus::Pending);

        let unknown = order
            .update_line_status(&parties.admin(), &ProductId::new("nope"), OrderStatus::Shipped, now())
            .unwrap_err();
        assert_eq!(unknown.kind(), "not_found");
    }

    #[test]
    fn shipment_details_rules() {
        let parties = Parties::new();
        let mut order = delivery_order(&parties);
        let vendor = parties.vendor(parties.vendor_a);

        let pending = order.set_shipment_details(&vendor, "TRK-1", "Courier Guy", Some(now()), now());
        apply(&mut order, pending);
        assert_eq!(order.tracking_number(), Some("TRK-1"));
        assert_eq!(order.carrier(), Some("Courier Guy"));

        assert!(order
            .set_shipment_details(&vendor, "", "Courier Guy", None, now())
            .is_err());
        assert!(order
            .set_shipment_details(&Principal::vendor(VendorId::new()), "T", "C", None, now())
            .is_err());

        let pending = order.update_status(&vendor, OrderStatus::Delivered, now());
        apply(&mut order, pending);
        let err = order
            .set_shipment_details(&vendor, "TRK-2", "Courier Guy", None, now())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state_transition");
    }
}
