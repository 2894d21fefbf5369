//! Shipment progress and the tracking log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId};
use domain::{Clock, Order, OrderEvent, OrderStatus, Principal};
use event_store::EventStore;

use crate::collaborators::{Notification, NotificationDispatcher};
use crate::error::Result;
use crate::orders::OrderRepository;

/// A position report from a courier or vendor.
#[derive(Debug, Clone)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lon: f64,
    pub address: Option<String>,
    pub description: String,
}

/// Moves orders and their lines through fulfillment.
pub struct FulfillmentTracker<S: EventStore> {
    orders: OrderRepository<S>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl<S: EventStore + Clone> Clone for FulfillmentTracker<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: EventStore> FulfillmentTracker<S> {
    /// Creates a tracker over the order repository.
    pub fn new(
        orders: OrderRepository<S>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            notifier,
            clock,
        }
    }

    /// Changes the order status and notifies the customer.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn update_status(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        new_status: OrderStatus,
    ) -> Result<Order> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| order.update_status(actor, new_status, now))
            .await?;

        for event in &result.events {
            if let OrderEvent::StatusChanged(change) = event {
                tracing::info!(%order_id, from = %change.from, to = %change.to, "order status changed");
                self.notifier.dispatch(Notification::StatusChanged {
                    order_id,
                    from: change.from,
                    to: change.to,
                });
            }
        }
        Ok(result.aggregate)
    }

    /// Moves one vendor's line forward without touching the order status.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor, product_id = %product_id))]
    pub async fn update_line_status(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        product_id: &ProductId,
        new_status: OrderStatus,
    ) -> Result<Order> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| {
                order.update_line_status(actor, product_id, new_status, now)
            })
            .await?;

        tracing::info!(%order_id, %new_status, "line status changed");
        Ok(result.aggregate)
    }

    /// Records tracking details for a shipped order.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn set_shipment_details(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        tracking_number: &str,
        carrier: &str,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Result<Order> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| {
                order.set_shipment_details(actor, tracking_number, carrier, estimated_delivery, now)
            })
            .await?;

        tracing::info!(%order_id, carrier, "shipment details set");
        Ok(result.aggregate)
    }

    /// Appends a location to the tracking log. Long logs are snapshotted by
    /// the repository.
    #[tracing::instrument(skip(self, actor, update), fields(actor = %actor))]
    pub async fn append_location(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        update: LocationUpdate,
    ) -> Result<Order> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| {
                order.append_location(
                    actor,
                    update.lat,
                    update.lon,
                    update.address.clone(),
                    &update.description,
                    now,
                )
            })
            .await?;

        tracing::debug!(%order_id, lat = update.lat, lon = update.lon, "location recorded");
        Ok(result.aggregate)
    }
}
