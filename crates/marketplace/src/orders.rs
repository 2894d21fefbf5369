//! Loading and writing orders.

use common::AggregateId;
use domain::{
    CommandHandler, CommandOptions, CommandResult, Order, OrderError, OrderEvent, OrderNumber,
    RetryPolicy,
};
use event_store::{EventStore, UniqueClaim};

use crate::error::{MarketplaceError, Result};

/// Claim namespace mapping order numbers to order ids.
pub const ORDER_NUMBER_CLAIM: &str = "order-number";

/// Order access shared by the services. Every write is a conditional append
/// that snapshots long streams.
pub struct OrderRepository<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore + Clone> Clone for OrderRepository<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<S: EventStore> OrderRepository<S> {
    /// Creates a repository over `store`.
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            handler: CommandHandler::with_retry_policy(store, retry),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        self.handler.store()
    }

    /// Loads an order, failing if it does not exist.
    pub async fn load(&self, order_id: AggregateId) -> Result<Order> {
        self.handler
            .load_existing(order_id)
            .await?
            .ok_or_else(|| MarketplaceError::NotFound(format!("order {order_id}")))
    }

    /// Resolves an order number to its order.
    pub async fn find_by_number(&self, order_number: &str) -> Result<Order> {
        let number = OrderNumber::parse(order_number.trim()).ok_or_else(|| {
            MarketplaceError::Validation(format!("{order_number} is not a valid order number"))
        })?;
        let key = UniqueClaim::new(ORDER_NUMBER_CLAIM, &number).key;
        let order_id = self
            .store()
            .resolve_claim(&key)
            .await?
            .ok_or_else(|| MarketplaceError::NotFound(format!("order {number}")))?;
        self.load(order_id).await
    }

    /// Runs a decision against the order's latest state.
    pub async fn execute<F>(&self, order_id: AggregateId, decide: F) -> Result<CommandResult<Order>>
    where
        F: Fn(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError>,
    {
        self.execute_with(order_id, CommandOptions::new(), decide)
            .await
    }

    /// Runs a decision with extra append options.
    pub async fn execute_with<F>(
        &self,
        order_id: AggregateId,
        options: CommandOptions,
        decide: F,
    ) -> Result<CommandResult<Order>>
    where
        F: Fn(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError>,
    {
        Ok(self
            .handler
            .execute_with_snapshot(order_id, options, decide)
            .await?)
    }
}
