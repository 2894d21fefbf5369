//! Payment reconciliation: proofs, confirmations, gateway callbacks, refunds.

use std::sync::Arc;

use common::{AggregateId, Money};
use domain::{
    Aggregate, Clock, CommandResult, GatewayOutcome, Order, OrderEvent, PaymentStatus, Principal,
    TransactionRecordedData,
};
use event_store::EventStore;

use crate::collaborators::{Notification, NotificationDispatcher};
use crate::error::Result;
use crate::ledger::TransactionLedger;
use crate::orders::OrderRepository;

/// A payment transition together with the ledger row it produced, if any.
#[derive(Debug)]
pub struct PaymentOutcome {
    pub order: Order,
    pub transaction: Option<TransactionRecordedData>,
}

/// Confirms, rejects and refunds order payments.
pub struct PaymentReconciler<S: EventStore> {
    orders: OrderRepository<S>,
    ledger: TransactionLedger<S>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl<S: EventStore + Clone> Clone for PaymentReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            ledger: self.ledger.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: EventStore + Clone> PaymentReconciler<S> {
    /// Creates a reconciler over the order repository and ledger.
    pub fn new(
        orders: OrderRepository<S>,
        ledger: TransactionLedger<S>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            ledger,
            notifier,
            clock,
        }
    }

    /// Attaches the customer's proof of a manual transfer.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn upload_proof(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        storage_ref: &str,
    ) -> Result<Order> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| {
                order.upload_payment_proof(actor, storage_ref, now)
            })
            .await?;

        tracing::info!(%order_id, "payment proof uploaded");
        Ok(result.aggregate)
    }

    /// Confirms a manual transfer or cash collection and records the payment
    /// row. A caller that lost the race to another confirmer gets
    /// `AlreadyConfirmed` and no second row is written.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn confirm_payment(
        &self,
        actor: &Principal,
        order_id: AggregateId,
    ) -> Result<PaymentOutcome> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| order.confirm_payment(actor, now))
            .await
            .inspect_err(|err| {
                if err.is_already_confirmed() {
                    metrics::counter!("payment_confirm_races_total").increment(1);
                    tracing::warn!(%order_id, "payment was already confirmed by someone else");
                }
            })?;

        self.settle(result).await
    }

    /// Rejects a manual payment and records the reason.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn reject_payment(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<Order> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| order.reject_payment(actor, reason, now))
            .await?;

        metrics::counter!("payments_rejected_total").increment(1);
        tracing::info!(%order_id, "payment proof rejected");

        let order = result.aggregate;
        self.notifier.dispatch(Notification::PaymentRejected {
            order_id,
            reason: order
                .payment_rejection_reason()
                .unwrap_or(reason)
                .to_string(),
        });
        Ok(order)
    }

    /// Applies a gateway callback. A repeated success for the stored
    /// reference reports `AlreadyConfirmed`; a repeated failure changes
    /// nothing.
    #[tracing::instrument(skip(self, outcome))]
    pub async fn record_gateway_result(
        &self,
        order_id: AggregateId,
        reference: &str,
        outcome: GatewayOutcome,
    ) -> Result<PaymentOutcome> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| {
                order.record_gateway_result(reference, outcome.clone(), now)
            })
            .await
            .inspect_err(|err| {
                if err.is_already_confirmed() {
                    tracing::warn!(%order_id, reference, "duplicate gateway callback");
                }
            })?;

        if result.aggregate.payment_status() == PaymentStatus::Failed {
            if !result.is_noop() {
                tracing::info!(%order_id, reference, "gateway reported a failed charge");
            }
            return Ok(PaymentOutcome {
                order: result.aggregate,
                transaction: None,
            });
        }

        self.settle(result).await
    }

    /// Refunds a captured payment and records the refund row.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn refund(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        amount: Money,
        reason: Option<String>,
    ) -> Result<PaymentOutcome> {
        let now = self.clock.now();
        let result = self
            .orders
            .execute(order_id, |order| order.refund(actor, amount, reason.clone(), now))
            .await?;

        let mut transaction = None;
        for (event, envelope) in result.events.iter().zip(&result.envelopes) {
            if let OrderEvent::PaymentRefunded(data) = event {
                let recorded = self
                    .ledger
                    .record_refund(&result.aggregate, data, envelope.event_id)
                    .await?;
                transaction = Some(recorded.into_entry());
            }
        }

        tracing::info!(%order_id, %amount, "payment refunded");
        Ok(PaymentOutcome {
            order: result.aggregate,
            transaction,
        })
    }

    /// Writes the payment row for a fresh confirmation and tells the parties.
    async fn settle(&self, result: CommandResult<Order>) -> Result<PaymentOutcome> {
        let confirmation = result.events.iter().find_map(|event| match event {
            OrderEvent::PaymentConfirmed(data) => Some(data),
            _ => None,
        });
        let Some(confirmation) = confirmation else {
            return Ok(PaymentOutcome {
                order: result.aggregate,
                transaction: None,
            });
        };

        let number = result
            .aggregate
            .order_number()
            .map(ToString::to_string)
            .unwrap_or_default();
        metrics::counter!("payments_confirmed_total").increment(1);
        tracing::info!(
            order = %number,
            confirmed_by = %confirmation.confirmed_by,
            amount = %confirmation.amount,
            "payment confirmed"
        );

        let recorded = self
            .ledger
            .record_payment(&result.aggregate, confirmation)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    order = %number,
                    error = %err,
                    "payment confirmed but the ledger row was not written"
                );
            })?;

        if let Some(order_id) = result.aggregate.id() {
            self.notifier.dispatch(Notification::PaymentConfirmed {
                order_id,
                confirmed_by: confirmation.confirmed_by.clone(),
            });
        }

        Ok(PaymentOutcome {
            order: result.aggregate,
            transaction: Some(recorded.into_entry()),
        })
    }
}

impl<S: EventStore> PaymentReconciler<S> {
    /// Returns the ledger used for payment rows.
    pub fn ledger(&self) -> &TransactionLedger<S> {
        &self.ledger
    }
}
