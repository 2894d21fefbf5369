//! Fire-and-forget notifications.
//!
//! Dispatch never blocks and never fails the operation that triggered it.
//! The API drains the channel in a background task; tests record instead.

use std::sync::{Arc, Mutex, PoisonError};

use common::{AggregateId, CustomerId, VendorId};
use domain::{OrderNumber, OrderStatus};
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages sent to customers and vendors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    OrderCreated {
        order_id: AggregateId,
        order_number: OrderNumber,
        customer_id: CustomerId,
        vendors: Vec<VendorId>,
    },
    PaymentConfirmed {
        order_id: AggregateId,
        confirmed_by: String,
    },
    PaymentRejected {
        order_id: AggregateId,
        reason: String,
    },
    StatusChanged {
        order_id: AggregateId,
        from: OrderStatus,
        to: OrderStatus,
    },
}

impl Notification {
    /// Returns the notification name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::OrderCreated { .. } => "order_created",
            Notification::PaymentConfirmed { .. } => "payment_confirmed",
            Notification::PaymentRejected { .. } => "payment_rejected",
            Notification::StatusChanged { .. } => "status_changed",
        }
    }
}

/// Delivers notifications without blocking the caller.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

/// Pushes notifications onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelDispatcher {
    /// Creates a dispatcher and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn dispatch(&self, notification: Notification) {
        let name = notification.name();
        if self.sender.send(notification).is_err() {
            tracing::warn!(notification = name, "notification channel closed, dropping");
        }
    }
}

/// Logs every notification until all senders are gone.
pub async fn drain(mut receiver: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = receiver.recv().await {
        match serde_json::to_string(&notification) {
            Ok(body) => tracing::info!(notification = notification.name(), %body, "notification sent"),
            Err(err) => tracing::warn!(error = %err, "could not encode notification"),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingDispatcher {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything dispatched so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, notification: Notification) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
