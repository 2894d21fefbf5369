//! Checkout and cancellation: the two operations that move stock.
//!
//! Checkout prices every line from the catalog, takes stock line by line and
//! puts back whatever it took if a later line (or the order write itself)
//! fails. The order number is claimed in the same append as the order.

use std::sync::Arc;

use common::{AggregateId, CustomerId, Money, ProductId, VendorId};
use domain::{
    Address, Clock, CollectionPoint, CommandOptions, FulfillmentMethod, IdGenerator,
    LineItem, Order, OrderError, OrderTotals, PaymentMethod, PlaceOrder, Principal,
};
use event_store::{EventStore, UniqueClaim};
use serde::Deserialize;

use crate::collaborators::{
    Catalog, Inventory, Notification, NotificationDispatcher, PricingRules, StockOutcome,
};
use crate::error::{MarketplaceError, Result};
use crate::orders::{ORDER_NUMBER_CLAIM, OrderRepository};

/// Order number draws per checkout: the first plus one retry.
const ORDER_NUMBER_ATTEMPTS: u32 = 2;

/// Most units of one product a single order may ask for.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// One requested product.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Optional guard: the vendor the customer saw the product under.
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
}

/// Everything a customer submits at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: CustomerId,
    pub items: Vec<CheckoutItem>,
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub fulfillment_method: FulfillmentMethod,
    #[serde(default)]
    pub collection_point: Option<CollectionPoint>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Creates and cancels orders, keeping stock in step with them.
pub struct CheckoutService<S: EventStore> {
    orders: OrderRepository<S>,
    catalog: Arc<dyn Catalog>,
    inventory: Arc<dyn Inventory>,
    pricing: Arc<dyn PricingRules>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S: EventStore + Clone> Clone for CheckoutService<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            catalog: self.catalog.clone(),
            inventory: self.inventory.clone(),
            pricing: self.pricing.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl<S: EventStore> CheckoutService<S> {
    /// Wires the service to its collaborators.
    pub fn new(
        orders: OrderRepository<S>,
        catalog: Arc<dyn Catalog>,
        inventory: Arc<dyn Inventory>,
        pricing: Arc<dyn PricingRules>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            orders,
            catalog,
            inventory,
            pricing,
            notifier,
            clock,
            ids,
        }
    }

    /// Creates an order, or fails leaving stock exactly as it was.
    #[tracing::instrument(skip(self, actor, request), fields(actor = %actor, customer_id = %request.customer_id))]
    pub async fn create(&self, actor: &Principal, request: CheckoutRequest) -> Result<Order> {
        if !actor.is_admin() && actor.customer_id() != Some(request.customer_id) {
            return Err(OrderError::Unauthorized {
                actor: actor.to_string(),
                action: "place an order for another customer",
            }
            .into());
        }

        let requested = merge_items(&request.items)?;
        request.shipping_address.validate("shipping address")?;
        if let Some(billing) = &request.billing_address {
            billing.validate("billing address")?;
        }
        if request.fulfillment_method == FulfillmentMethod::Collection
            && request.collection_point.is_none()
        {
            return Err(MarketplaceError::Validation(
                "collection orders need a collection point".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(requested.len());
        for item in &requested {
            let entry = self
                .catalog
                .reserve_price(&item.product_id, item.vendor_id)
                .await?;
            if entry.price.checked_multiply(item.quantity).is_none() {
                return Err(amount_too_large());
            }
            lines.push(LineItem::new(
                entry.product_id,
                entry.vendor_id,
                entry.name,
                entry.price,
                item.quantity,
            ));
        }

        let subtotal = lines
            .iter()
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line.subtotal))
            .ok_or_else(amount_too_large)?;
        let quote = self.pricing.quote(
            subtotal,
            request.fulfillment_method,
            request.coupon_code.as_deref(),
        )?;
        subtotal
            .checked_add(quote.shipping_cost)
            .and_then(|gross| gross.checked_add(quote.tax))
            .ok_or_else(amount_too_large)?;
        let totals = OrderTotals::compute(subtotal, quote.shipping_cost, quote.tax, quote.discount);

        self.take_stock(&lines).await?;

        match self.place(actor, &request, lines.clone(), totals).await {
            Ok(order) => Ok(order),
            Err(err) => {
                self.compensate(&lines).await;
                Err(err)
            }
        }
    }

    /// Cancels an order and puts its stock back. Either every line is
    /// restored and the cancellation recorded, or stock and order are left
    /// as they were and the error is returned.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn cancel(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<Order> {
        let now = self.clock.now();
        let current = self.orders.load(order_id).await?;
        current.cancel(actor, reason, now)?;
        let lines = current.items().to_vec();

        self.restore_all(order_id, &lines).await?;

        match self
            .orders
            .execute(order_id, |order| order.cancel(actor, reason, now))
            .await
        {
            Ok(result) => {
                metrics::counter!("orders_cancelled_total").increment(1);
                tracing::info!(%order_id, reason, "order cancelled");
                Ok(result.aggregate)
            }
            Err(err) => {
                tracing::warn!(%order_id, error = %err, "cancellation not recorded, taking stock back");
                self.take_back(&lines).await;
                Err(err)
            }
        }
    }

    async fn place(
        &self,
        actor: &Principal,
        request: &CheckoutRequest,
        items: Vec<LineItem>,
        totals: OrderTotals,
    ) -> Result<Order> {
        let order_id = AggregateId::new();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let now = self.clock.now();
            let command = PlaceOrder {
                order_id,
                order_number: self.ids.order_number(now),
                customer_id: request.customer_id,
                items: items.clone(),
                shipping_address: request.shipping_address.clone(),
                billing_address: request.billing_address.clone(),
                payment_method: request.payment_method,
                fulfillment_method: request.fulfillment_method,
                collection_point: request.collection_point.clone(),
                totals,
                coupon_code: request
                    .coupon_code
                    .as_deref()
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .map(str::to_ascii_uppercase),
            };
            let number = command.order_number.clone();
            let options = CommandOptions::new().claim(UniqueClaim::new(ORDER_NUMBER_CLAIM, &number));

            let err = match self
                .orders
                .execute_with(order_id, options, |order| {
                    order.place(command.clone(), actor, now)
                })
                .await
            {
                Ok(result) => {
                    let order = result.aggregate;
                    metrics::counter!("orders_created_total").increment(1);
                    tracing::info!(
                        %order_id,
                        order_number = %number,
                        total = %order.total(),
                        lines = order.items().len(),
                        "order created"
                    );
                    self.notifier.dispatch(Notification::OrderCreated {
                        order_id,
                        order_number: number,
                        customer_id: request.customer_id,
                        vendors: order.vendors(),
                    });
                    return Ok(order);
                }
                Err(err) => err,
            };

            let collided = matches!(
                &err,
                MarketplaceError::Domain(inner)
                    if inner.unique_violation().is_some_and(|(key, _)| key.starts_with(ORDER_NUMBER_CLAIM))
            );
            if !collided {
                return Err(err);
            }

            metrics::counter!("order_number_collisions_total").increment(1);
            tracing::warn!(%order_id, order_number = %number, attempts, "order number already taken");
            if attempts >= ORDER_NUMBER_ATTEMPTS {
                return Err(MarketplaceError::OrderNumberCollision { attempts });
            }
        }
    }

    /// Decrements stock for every line, undoing earlier lines on failure.
    async fn take_stock(&self, lines: &[LineItem]) -> Result<()> {
        for (taken, line) in lines.iter().enumerate() {
            let outcome = self
                .inventory
                .decrement_stock(&line.product_id, line.quantity)
                .await;

            let failure = match outcome {
                Ok(StockOutcome::Decremented) => continue,
                Ok(StockOutcome::Insufficient { available }) => {
                    MarketplaceError::InsufficientStock {
                        product_id: line.product_id.clone(),
                        requested: line.quantity,
                        available,
                    }
                }
                Err(err) => err,
            };

            tracing::warn!(product_id = %line.product_id, error = %failure, "stock reservation failed");
            self.compensate(&lines[..taken]).await;
            return Err(failure);
        }
        Ok(())
    }

    async fn compensate(&self, lines: &[LineItem]) {
        if lines.is_empty() {
            return;
        }
        metrics::counter!("stock_compensations_total").increment(1);
        for line in lines {
            if let Err(err) = self
                .inventory
                .restore_stock(&line.product_id, line.quantity)
                .await
            {
                tracing::error!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %err,
                    "stock compensation failed"
                );
            }
        }
    }

    /// Restores stock for every line, taking back earlier lines on failure.
    async fn restore_all(&self, order_id: AggregateId, lines: &[LineItem]) -> Result<()> {
        for (restored, line) in lines.iter().enumerate() {
            if let Err(err) = self
                .inventory
                .restore_stock(&line.product_id, line.quantity)
                .await
            {
                tracing::warn!(%order_id, product_id = %line.product_id, error = %err, "stock restore failed");
                self.take_back(&lines[..restored]).await;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undoes restores for an order that stays open.
    async fn take_back(&self, lines: &[LineItem]) {
        if lines.is_empty() {
            return;
        }
        metrics::counter!("stock_compensations_total").increment(1);
        for line in lines {
            let failure = match self
                .inventory
                .decrement_stock(&line.product_id, line.quantity)
                .await
            {
                Ok(StockOutcome::Decremented) => continue,
                Ok(StockOutcome::Insufficient { available }) => {
                    format!("only {available} units left")
                }
                Err(err) => err.to_string(),
            };
            tracing::error!(
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %failure,
                "could not take back restored stock"
            );
        }
    }
}

/// Folds repeated products into one line. The first occurrence keeps its
/// position.
fn merge_items(items: &[CheckoutItem]) -> Result<Vec<CheckoutItem>> {
    if items.is_empty() {
        return Err(MarketplaceError::Validation(
            "an order needs at least one item".to_string(),
        ));
    }

    let mut merged: Vec<CheckoutItem> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(MarketplaceError::Validation(format!(
                "quantity for {} must be at least 1",
                item.product_id
            )));
        }
        match merged
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                if let (Some(wanted), Some(seen)) = (item.vendor_id, existing.vendor_id)
                    && wanted != seen
                {
                    return Err(MarketplaceError::Validation(format!(
                        "{} was requested from two different vendors",
                        item.product_id
                    )));
                }
                existing.quantity = existing
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or_else(|| quantity_too_large(&item.product_id))?;
                existing.vendor_id = existing.vendor_id.or(item.vendor_id);
            }
            None => merged.push(item.clone()),
        }
    }

    if let Some(item) = merged.iter().find(|item| item.quantity > MAX_LINE_QUANTITY) {
        return Err(quantity_too_large(&item.product_id));
    }
    Ok(merged)
}

fn quantity_too_large(product_id: &ProductId) -> MarketplaceError {
    MarketplaceError::Validation(format!(
        "at most {MAX_LINE_QUANTITY} units of {product_id} may be ordered"
    ))
}

fn amount_too_large() -> MarketplaceError {
    MarketplaceError::Validation("order amount is too large".to_string())
}
