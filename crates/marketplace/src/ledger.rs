//! Transaction ledger: immutable payment, refund, payout and adjustment rows.
//!
//! Rows are separate `Transaction` streams correlated with their order.
//! Idempotency comes from unique claims written with the row: one payment
//! row per order, one row per triggering order event, one payout per vendor
//! and order. Replaying the same order history never duplicates a row.

use std::sync::Arc;

use common::{AggregateId, Money, VendorId};
use domain::{
    Access, Aggregate, Clock, CommandHandler, CommandOptions, FeeBreakdown, IdGenerator, Order, OrderEvent,
    PaymentStatus, Principal, RecordTransaction, RetryPolicy, Transaction, TransactionEvent,
    TransactionId, TransactionRecordedData, TransactionType,
    order::{PaymentConfirmedData, PaymentRefundedData},
};
use event_store::{EventId, EventQuery, EventStore, UniqueClaim};
use futures_util::StreamExt;

use crate::collaborators::FeeSchedule;
use crate::error::{MarketplaceError, Result};
use crate::orders::OrderRepository;

/// Claim namespace for transaction ids.
pub const TRANSACTION_ID_CLAIM: &str = "transaction-id";
/// Claim namespace for the one payment row of an order.
pub const LEDGER_PAYMENT_CLAIM: &str = "ledger-payment";
/// Claim namespace for rows derived from a source row.
pub const LEDGER_SOURCE_CLAIM: &str = "ledger-source";
/// Claim namespace for the one payout row per order and vendor.
pub const LEDGER_PAYOUT_CLAIM: &str = "ledger-payout";

/// Attempts at drawing a transaction id that nobody holds yet.
const TRANSACTION_ID_ATTEMPTS: u32 = 2;

/// Outcome of a ledger write.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    New(TransactionRecordedData),
    /// The row already existed; nothing was written.
    Existing(TransactionRecordedData),
}

impl Recorded {
    /// Returns true if this call wrote the row.
    pub fn is_new(&self) -> bool {
        matches!(self, Recorded::New(_))
    }

    /// Returns the row.
    pub fn entry(&self) -> &TransactionRecordedData {
        match self {
            Recorded::New(entry) | Recorded::Existing(entry) => entry,
        }
    }

    /// Consumes the outcome and returns the row.
    pub fn into_entry(self) -> TransactionRecordedData {
        match self {
            Recorded::New(entry) | Recorded::Existing(entry) => entry,
        }
    }
}

struct Draft {
    kind: TransactionType,
    vendor_id: VendorId,
    amount: Money,
    fees: FeeBreakdown,
    references: Option<TransactionId>,
    description: String,
    idempotency: Option<UniqueClaim>,
}

/// Records payments, refunds, payouts and adjustments.
pub struct TransactionLedger<S: EventStore> {
    transactions: CommandHandler<S, Transaction>,
    orders: OrderRepository<S>,
    fees: Arc<dyn FeeSchedule>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S: EventStore + Clone> Clone for TransactionLedger<S> {
    fn clone(&self) -> Self {
        Self {
            transactions: self.transactions.clone(),
            orders: self.orders.clone(),
            fees: self.fees.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl<S: EventStore + Clone> TransactionLedger<S> {
    /// Creates a ledger over `store`.
    pub fn new(
        store: S,
        retry: RetryPolicy,
        fees: Arc<dyn FeeSchedule>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            transactions: CommandHandler::with_retry_policy(store.clone(), retry),
            orders: OrderRepository::new(store, retry),
            fees,
            clock,
            ids,
        }
    }

    /// Records a payment or payout row with fees from the schedule:
    /// commission on every type, the processing fee on payments only.
    ///
    /// Each row carries the same idempotency claim the dedicated operations
    /// use, so an order never gets a second payment row and a vendor never
    /// gets a second payout for one order. Refunds and adjustments need the
    /// event or row they answer to and are rejected here.
    pub async fn record(
        &self,
        kind: TransactionType,
        order: &Order,
        vendor_id: VendorId,
        amount: Money,
    ) -> Result<Recorded> {
        let draft = self.guarded_draft(kind, order, vendor_id, amount)?;
        self.append(order, draft).await
    }

    /// The single payment row of an order. Attributed to the confirming
    /// vendor, or to the vendor with the largest share when the gateway or an
    /// admin confirmed.
    #[tracing::instrument(skip(self, order, confirmation), fields(order_id = ?order.id()))]
    pub async fn record_payment(
        &self,
        order: &Order,
        confirmation: &PaymentConfirmedData,
    ) -> Result<Recorded> {
        let vendor_id = confirmation
            .confirming_vendor
            .filter(|vendor| order.has_vendor(*vendor))
            .or_else(|| order.principal_vendor())
            .ok_or_else(|| MarketplaceError::Validation("order has no vendors".to_string()))?;

        let mut draft =
            self.guarded_draft(TransactionType::Payment, order, vendor_id, confirmation.amount)?;
        if let Some(reference) = &confirmation.reference {
            draft.description = format!("{} ({reference})", draft.description);
        }
        self.append(order, draft).await
    }

    /// A refund row, keyed by the order event that issued the refund.
    pub async fn record_refund(
        &self,
        order: &Order,
        refund: &PaymentRefundedData,
        source: EventId,
    ) -> Result<Recorded> {
        let vendor_id = order
            .principal_vendor()
            .ok_or_else(|| MarketplaceError::Validation("order has no vendors".to_string()))?;

        let mut draft = self.draft(
            TransactionType::Refund,
            order,
            vendor_id,
            refund.amount,
            Some(UniqueClaim::new(LEDGER_SOURCE_CLAIM, source)),
        );
        if let Some(reason) = &refund.reason {
            draft.description = format!("{}: {reason}", draft.description);
        }
        self.append(order, draft).await
    }

    /// Corrects an earlier row with a new signed amount. The original is
    /// never touched.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn record_adjustment(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        original: &TransactionId,
        amount: Money,
        reason: &str,
    ) -> Result<TransactionRecordedData> {
        let order = self.orders.load(order_id).await?;
        order.authorize(actor, Access::OrderVendor, "adjust the ledger")?;

        let original_entry = self
            .find(original)
            .await?
            .filter(|entry| entry.order_id == order_id)
            .ok_or_else(|| MarketplaceError::NotFound(format!("transaction {original}")))?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(MarketplaceError::Validation(
                "an adjustment needs a reason".to_string(),
            ));
        }

        let draft = Draft {
            kind: TransactionType::Adjustment,
            vendor_id: original_entry.vendor_id,
            amount,
            fees: FeeBreakdown::none(amount),
            references: Some(original.clone()),
            description: format!("Adjustment to {original}: {reason}"),
            idempotency: None,
        };
        Ok(self.append(&order, draft).await?.into_entry())
    }

    /// Pays a vendor their share of a paid order, once.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn record_payout(
        &self,
        actor: &Principal,
        order_id: AggregateId,
        vendor_id: VendorId,
    ) -> Result<Recorded> {
        let order = self.orders.load(order_id).await?;
        order.authorize(actor, Access::AdminOnly, "pay out a vendor")?;

        if order.payment_status() != PaymentStatus::Paid {
            return Err(domain::OrderError::InvalidStateTransition {
                action: "pay out a vendor",
                subject: "payment status",
                current: order.payment_status().to_string(),
            }
            .into());
        }
        let draft = self.guarded_draft(
            TransactionType::Payout,
            &order,
            vendor_id,
            order.vendor_subtotal(vendor_id),
        )?;
        self.append(&order, draft).await
    }

    /// Rows of one order in the order they were recorded.
    pub async fn transactions_for_order(
        &self,
        order_id: AggregateId,
    ) -> Result<Vec<TransactionRecordedData>> {
        let envelopes = self
            .transactions
            .store()
            .query_events(
                EventQuery::correlated_with(order_id).aggregate_type(Transaction::aggregate_type()),
            )
            .await?;

        envelopes
            .iter()
            .map(|envelope| {
                let TransactionEvent::TransactionRecorded(data) = envelope.decode()?;
                Ok(data)
            })
            .collect()
    }

    /// Finds a row by its transaction id.
    pub async fn find(&self, transaction_id: &TransactionId) -> Result<Option<TransactionRecordedData>> {
        let key = UniqueClaim::new(TRANSACTION_ID_CLAIM, transaction_id).key;
        let Some(id) = self.transactions.store().resolve_claim(&key).await? else {
            return Ok(None);
        };
        Ok(self
            .transactions
            .load_existing(id)
            .await?
            .and_then(Transaction::into_entry))
    }

    /// Replays captured payments and refunds from the order streams and
    /// records any row that is missing. Returns how many rows were written.
    #[tracing::instrument(skip(self))]
    pub async fn catch_up(&self) -> Result<usize> {
        let mut stream = self.transactions.store().stream_all_events().await?;
        let mut written = 0;

        while let Some(envelope) = stream.next().await {
            let envelope = envelope?;
            if envelope.aggregate_type != "Order"
                || !matches!(envelope.event_type.as_str(), "PaymentConfirmed" | "PaymentRefunded")
            {
                continue;
            }

            let order = self.orders.load(envelope.aggregate_id).await?;
            let recorded = match envelope.decode::<OrderEvent>()? {
                OrderEvent::PaymentConfirmed(data) => self.record_payment(&order, &data).await?,
                OrderEvent::PaymentRefunded(data) => {
                    self.record_refund(&order, &data, envelope.event_id).await?
                }
                _ => continue,
            };
            if recorded.is_new() {
                written += 1;
            }
        }

        if written > 0 {
            tracing::info!(written, "ledger caught up with order history");
        }
        Ok(written)
    }

    fn order_id(order: &Order) -> Result<AggregateId> {
        order
            .id()
            .ok_or_else(|| MarketplaceError::NotFound("order".to_string()))
    }

    /// A payment or payout draft with its once-only claim.
    fn guarded_draft(
        &self,
        kind: TransactionType,
        order: &Order,
        vendor_id: VendorId,
        amount: Money,
    ) -> Result<Draft> {
        let order_id = Self::order_id(order)?;
        if !order.has_vendor(vendor_id) {
            return Err(MarketplaceError::Validation(format!(
                "vendor {vendor_id} has no lines on this order"
            )));
        }
        let claim = match kind {
            TransactionType::Payment => UniqueClaim::new(LEDGER_PAYMENT_CLAIM, order_id),
            TransactionType::Payout => {
                UniqueClaim::new(LEDGER_PAYOUT_CLAIM, format!("{order_id}:{vendor_id}"))
            }
            TransactionType::Refund => {
                return Err(MarketplaceError::Validation(
                    "refund rows are recorded from the refund itself".to_string(),
                ));
            }
            TransactionType::Adjustment => {
                return Err(MarketplaceError::Validation(
                    "adjustments must reference the row they correct".to_string(),
                ));
            }
        };
        Ok(self.draft(kind, order, vendor_id, amount, Some(claim)))
    }

    fn draft(
        &self,
        kind: TransactionType,
        order: &Order,
        vendor_id: VendorId,
        amount: Money,
        idempotency: Option<UniqueClaim>,
    ) -> Draft {
        let payment_fee = match (kind, order.payment_method()) {
            (TransactionType::Payment, Some(method)) => self.fees.payment_fee_for(method),
            _ => common::Rate::zero(),
        };
        let number = order
            .order_number()
            .map(ToString::to_string)
            .unwrap_or_default();

        Draft {
            kind,
            vendor_id,
            amount,
            fees: FeeBreakdown::compute(amount, self.fees.commission_for(vendor_id), payment_fee),
            references: None,
            description: format!("{} for order {number}", capitalized(kind)),
            idempotency,
        }
    }

    async fn append(&self, order: &Order, draft: Draft) -> Result<Recorded> {
        let order_id = Self::order_id(order)?;
        let customer_id = order
            .customer_id()
            .ok_or_else(|| MarketplaceError::NotFound(format!("order {order_id}")))?;
        let idempotency_key = draft.idempotency.as_ref().map(|claim| claim.key.clone());

        let mut attempts = 0;
        loop {
            attempts += 1;
            let now = self.clock.now();
            let command = RecordTransaction {
                id: AggregateId::new(),
                transaction_id: self.ids.transaction_id(now),
                order_id,
                vendor_id: draft.vendor_id,
                customer_id,
                kind: draft.kind,
                amount: draft.amount,
                fees: draft.fees,
                payment_status: order.payment_status(),
                references: draft.references.clone(),
                description: draft.description.clone(),
            };

            let mut options = CommandOptions::new()
                .correlate(order_id)
                .claim(UniqueClaim::new(TRANSACTION_ID_CLAIM, &command.transaction_id));
            if let Some(claim) = &draft.idempotency {
                options = options.claim(claim.clone());
            }

            let stream_id = command.id;
            let outcome = self
                .transactions
                .execute_with(stream_id, options, |transaction| {
                    transaction.record(command.clone(), now)
                })
                .await;

            let err = match outcome {
                Ok(result) => {
                    let entry = result
                        .aggregate
                        .into_entry()
                        .ok_or_else(|| MarketplaceError::NotFound(format!("transaction {stream_id}")))?;
                    metrics::counter!("ledger_transactions_total", "type" => entry.kind.as_str())
                        .increment(1);
                    tracing::info!(
                        %order_id,
                        transaction_id = %entry.transaction_id,
                        kind = %entry.kind,
                        amount = %entry.amount,
                        "ledger row recorded"
                    );
                    return Ok(Recorded::New(entry));
                }
                Err(err) => err,
            };

            let violation = err
                .unique_violation()
                .map(|(key, owner)| (key.to_string(), owner));
            match violation {
                Some((key, owner)) if Some(&key) == idempotency_key.as_ref() => {
                    let existing = self
                        .transactions
                        .load_existing(owner)
                        .await?
                        .and_then(Transaction::into_entry)
                        .ok_or_else(|| MarketplaceError::NotFound(format!("transaction {owner}")))?;
                    tracing::debug!(%order_id, %key, "ledger row already recorded");
                    return Ok(Recorded::Existing(existing));
                }
                Some((key, _))
                    if key.starts_with(TRANSACTION_ID_CLAIM)
                        && attempts < TRANSACTION_ID_ATTEMPTS =>
                {
                    tracing::warn!(%order_id, %key, "transaction id collision, drawing a new one");
                }
                _ => return Err(err.into()),
            }
        }
    }
}

fn capitalized(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Payment => "Payment",
        TransactionType::Refund => "Refund",
        TransactionType::Payout => "Payout",
        TransactionType::Adjustment => "Adjustment",
    }
}
