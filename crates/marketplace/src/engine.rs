//! The `Marketplace` facade wiring every service to one store.

use common::AggregateId;
use domain::{Access, Order, Principal, RetryPolicy, TransactionRecordedData};
use event_store::EventStore;

use crate::checkout::CheckoutService;
use crate::collaborators::Collaborators;
use crate::error::Result;
use crate::fulfillment::FulfillmentTracker;
use crate::invoice::{Invoice, InvoiceProjection};
use crate::ledger::TransactionLedger;
use crate::orders::OrderRepository;
use crate::payments::PaymentReconciler;

/// All marketplace services wired to one event store.
pub struct Marketplace<S: EventStore> {
    pub checkout: CheckoutService<S>,
    pub payments: PaymentReconciler<S>,
    pub fulfillment: FulfillmentTracker<S>,
    pub ledger: TransactionLedger<S>,
    pub invoices: InvoiceProjection,
    orders: OrderRepository<S>,
}

impl<S: EventStore + Clone> Clone for Marketplace<S> {
    fn clone(&self) -> Self {
        Self {
            checkout: self.checkout.clone(),
            payments: self.payments.clone(),
            fulfillment: self.fulfillment.clone(),
            ledger: self.ledger.clone(),
            invoices: self.invoices.clone(),
            orders: self.orders.clone(),
        }
    }
}

impl<S: EventStore + Clone> Marketplace<S> {
    /// Wires every service to `store` and the given collaborators.
    pub fn new(store: S, collaborators: Collaborators, retry: RetryPolicy) -> Self {
        let orders = OrderRepository::new(store.clone(), retry);
        let ledger = TransactionLedger::new(
            store,
            retry,
            collaborators.fees.clone(),
            collaborators.clock.clone(),
            collaborators.ids.clone(),
        );

        Self {
            checkout: CheckoutService::new(
                orders.clone(),
                collaborators.catalog.clone(),
                collaborators.inventory.clone(),
                collaborators.pricing.clone(),
                collaborators.notifier.clone(),
                collaborators.clock.clone(),
                collaborators.ids.clone(),
            ),
            payments: PaymentReconciler::new(
                orders.clone(),
                ledger.clone(),
                collaborators.notifier.clone(),
                collaborators.clock.clone(),
            ),
            fulfillment: FulfillmentTracker::new(
                orders.clone(),
                collaborators.notifier.clone(),
                collaborators.clock.clone(),
            ),
            ledger,
            invoices: InvoiceProjection::new(collaborators.vendors.clone()),
            orders,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        self.orders.store()
    }

    /// Reads an order visible to `actor`.
    pub async fn order(&self, actor: &Principal, order_id: AggregateId) -> Result<Order> {
        let order = self.orders.load(order_id).await?;
        order.authorize(actor, Access::Participant, "view this order")?;
        Ok(order)
    }

    /// Reads an order visible to `actor` by its order number.
    pub async fn order_by_number(&self, actor: &Principal, order_number: &str) -> Result<Order> {
        let order = self.orders.find_by_number(order_number).await?;
        order.authorize(actor, Access::Participant, "view this order")?;
        Ok(order)
    }

    /// Builds the invoice of an order visible to `actor`.
    pub async fn invoice(&self, actor: &Principal, order_id: AggregateId) -> Result<Invoice> {
        let order = self.order(actor, order_id).await?;
        self.invoices.project(&order).await
    }

    /// Lists the ledger rows of an order visible to `actor`.
    pub async fn transactions(
        &self,
        actor: &Principal,
        order_id: AggregateId,
    ) -> Result<Vec<TransactionRecordedData>> {
        self.order(actor, order_id).await?;
        self.ledger.transactions_for_order(order_id).await
    }
}
