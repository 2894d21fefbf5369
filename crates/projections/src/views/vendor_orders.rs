//! Vendor inbox: the orders that contain a vendor's lines.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, Money, ProductId, VendorId};
use domain::{FulfillmentMethod, OrderEvent, OrderNumber, OrderStatus, PaymentStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use super::{Progress, order_event};
use crate::Result;
use crate::error::ProjectionError;
use crate::projection::{Projection, ProjectionPosition, ReadModel};

const VIEW: &str = "VendorOrdersView";

/// A line of an order as its vendor sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub subtotal: Money,
    pub line_status: OrderStatus,
}

/// One order as seen by one vendor: only that vendor's lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorOrderEntry {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub vendor_id: VendorId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_method: FulfillmentMethod,
    pub lines: Vec<VendorLine>,
    pub vendor_subtotal: Money,
    pub tracking_number: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    entries: HashMap<(VendorId, AggregateId), VendorOrderEntry>,
    orders: HashSet<AggregateId>,
    position: ProjectionPosition,
}

impl State {
    fn entries_of(&mut self, order_id: AggregateId) -> Result<Vec<&mut VendorOrderEntry>> {
        if !self.orders.contains(&order_id) {
            return Err(ProjectionError::UnknownOrder {
                view: VIEW,
                order_id,
            });
        }
        Ok(self
            .entries
            .iter_mut()
            .filter(|((_, order), _)| *order == order_id)
            .map(|(_, entry)| entry)
            .collect())
    }
}

/// Orders split by vendor, showing only each vendor's lines.
#[derive(Clone, Default)]
pub struct VendorOrdersView {
    state: Arc<RwLock<State>>,
}

impl VendorOrdersView {
    /// Creates an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// The vendor's inbox, newest first.
    pub async fn inbox(&self, vendor_id: VendorId) -> Vec<VendorOrderEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<VendorOrderEntry> = state
            .entries
            .values()
            .filter(|entry| entry.vendor_id == vendor_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.placed_at
                .cmp(&a.placed_at)
                .then_with(|| b.order_number.as_str().cmp(a.order_number.as_str()))
        });
        entries
    }

    /// Returns one vendor's slice of an order.
    pub async fn get(&self, vendor_id: VendorId, order_id: AggregateId) -> Option<VendorOrderEntry> {
        self.state
            .read()
            .await
            .entries
            .get(&(vendor_id, order_id))
            .cloned()
    }
}

#[async_trait]
impl Projection for VendorOrdersView {
    fn name(&self) -> &'static str {
        VIEW
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let event = order_event(envelope)?;
        let order_id = envelope.aggregate_id;
        let mut state = self.state.write().await;

        match event {
            Some(OrderEvent::OrderPlaced(data)) => {
                for line in &data.items {
                    let entry = state
                        .entries
                        .entry((line.vendor_id, order_id))
                        .or_insert_with(|| VendorOrderEntry {
                            order_id,
                            order_number: data.order_number.clone(),
                            vendor_id: line.vendor_id,
                            status: OrderStatus::Pending,
                            payment_status: PaymentStatus::Pending,
                            fulfillment_method: data.fulfillment_method,
                            lines: Vec::new(),
                            vendor_subtotal: Money::zero(),
                            tracking_number: None,
                            placed_at: data.placed_at,
                        });
                    entry.lines.push(VendorLine {
                        product_id: line.product_id.clone(),
                        name: line.name.clone(),
                        quantity: line.quantity,
                        subtotal: line.subtotal,
                        line_status: line.line_status,
                    });
                    entry.vendor_subtotal += line.subtotal;
                }
                state.orders.insert(order_id);
            }
            Some(OrderEvent::LineStatusChanged(change)) => {
                let line = state
                    .entries
                    .get_mut(&(change.vendor_id, order_id))
                    .and_then(|entry| {
                        entry
                            .lines
                            .iter_mut()
                            .find(|line| line.product_id == change.product_id)
                    });
                match line {
                    Some(line) => line.line_status = change.to,
                    None => {
                        return Err(ProjectionError::UnknownOrder {
                            view: VIEW,
                            order_id,
                        });
                    }
                }
            }
            Some(OrderEvent::ShipmentDetailsSet(details)) => {
                for entry in state.entries_of(order_id)? {
                    entry.tracking_number = Some(details.tracking_number.clone());
                }
            }
            Some(event) => {
                for entry in state.entries_of(order_id)? {
                    let mut progress = Progress {
                        status: entry.status,
                        payment_status: entry.payment_status,
                    };
                    if progress.apply(&event) {
                        entry.status = progress.status;
                        entry.payment_status = progress.payment_status;
                    }
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
        state.entries.clear();
        state.orders.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for VendorOrdersView {
    fn name(&self) -> &'static str {
        VIEW
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.entries.len()).unwrap_or(0)
    }
}
