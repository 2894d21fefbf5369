//! Customer order history: one summary row per order, grouped by customer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money};
use domain::{OrderEvent, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use super::{Progress, order_event};
use crate::Result;
use crate::error::ProjectionError;
use crate::projection::{Projection, ProjectionPosition, ReadModel};

const VIEW: &str = "CustomerOrdersView";

/// One row of a customer's order history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerOrderSummary {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub total: Money,
    pub item_count: u32,
    pub vendor_count: usize,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    orders: HashMap<AggregateId, (CustomerId, CustomerOrderSummary)>,
    position: ProjectionPosition,
}

/// Per-customer order history, newest first.
#[derive(Clone, Default)]
pub struct CustomerOrdersView {
    state: Arc<RwLock<State>>,
}

impl CustomerOrdersView {
    /// Creates an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a customer's orders, newest first.
    pub async fn orders_for(&self, customer_id: CustomerId) -> Vec<CustomerOrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<CustomerOrderSummary> = state
            .orders
            .values()
            .filter(|(owner, _)| *owner == customer_id)
            .map(|(_, summary)| summary.clone())
            .collect();
        orders.sort_by(|a, b| {
            b.placed_at
                .cmp(&a.placed_at)
                .then_with(|| b.order_number.as_str().cmp(a.order_number.as_str()))
        });
        orders
    }

    /// Returns the summary of one order.
    pub async fn get(&self, order_id: AggregateId) -> Option<CustomerOrderSummary> {
        self.state
            .read()
            .await
            .orders
            .get(&order_id)
            .map(|(_, summary)| summary.clone())
    }
}

#[async_trait]
impl Projection for CustomerOrdersView {
    fn name(&self) -> &'static str {
        VIEW
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let event = order_event(envelope)?;
        let mut state = self.state.write().await;

        match event {
            Some(OrderEvent::OrderPlaced(data)) => {
                let mut vendors: Vec<_> = data.items.iter().map(|line| line.vendor_id).collect();
                vendors.sort();
                vendors.dedup();

                let summary = CustomerOrderSummary {
                    order_id: data.order_id,
                    order_number: data.order_number,
                    status: OrderStatus::Pending,
                    payment_status: PaymentStatus::Pending,
                    payment_method: data.payment_method,
                    total: data.totals.total,
                    item_count: data.items.iter().map(|line| line.quantity).sum(),
                    vendor_count: vendors.len(),
                    placed_at: data.placed_at,
                    updated_at: envelope.timestamp,
                };
                state
                    .orders
                    .insert(envelope.aggregate_id, (data.customer_id, summary));
            }
            Some(event) => {
                let Some((_, summary)) = state.orders.get_mut(&envelope.aggregate_id) else {
                    return Err(ProjectionError::UnknownOrder {
                        view: VIEW,
                        order_id: envelope.aggregate_id,
                    });
                };
                let mut progress = Progress {
                    status: summary.status,
                    payment_status: summary.payment_status,
                };
                if progress.apply(&event) {
                    summary.status = progress.status;
                    summary.payment_status = progress.payment_status;
                    summary.updated_at = envelope.timestamp;
                }
            }
            None => {}
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for CustomerOrdersView {
    fn name(&self) -> &'static str {
        VIEW
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}
