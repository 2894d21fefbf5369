//! Vendor ledger summary built from recorded transactions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, VendorId};
use domain::{Aggregate, Transaction, TransactionEvent, TransactionRecordedData, TransactionType};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ProjectionError;
use crate::projection::{Projection, ProjectionPosition, ReadModel};

/// Running totals for one vendor.
///
/// `net` is what the vendor has earned after fees, refunds and adjustments;
/// `outstanding` is the part of it not yet paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VendorLedgerSummary {
    pub vendor_id: VendorId,
    pub gross: Money,
    pub refunds: Money,
    pub adjustments: Money,
    pub platform_fees: Money,
    pub payment_fees: Money,
    pub net: Money,
    pub paid_out: Money,
    pub outstanding: Money,
    pub transactions: u64,
}

impl VendorLedgerSummary {
    fn empty(vendor_id: VendorId) -> Self {
        Self {
            vendor_id,
            gross: Money::zero(),
            refunds: Money::zero(),
            adjustments: Money::zero(),
            platform_fees: Money::zero(),
            payment_fees: Money::zero(),
            net: Money::zero(),
            paid_out: Money::zero(),
            outstanding: Money::zero(),
            transactions: 0,
        }
    }

    fn record(&mut self, row: &TransactionRecordedData) {
        match row.kind {
            TransactionType::Payment => {
                self.gross += row.amount;
                self.platform_fees += row.platform_fee;
                self.payment_fees += row.payment_fee;
                self.net += row.vendor_amount;
            }
            TransactionType::Refund => {
                self.refunds += row.amount;
                self.platform_fees -= row.platform_fee;
                self.net -= row.vendor_amount;
            }
            TransactionType::Adjustment => {
                self.adjustments += row.amount;
                self.net += row.vendor_amount;
            }
            TransactionType::Payout => self.paid_out += row.vendor_amount,
        }
        self.outstanding = self.net - self.paid_out;
        self.transactions += 1;
    }
}

#[derive(Default)]
struct State {
    vendors: HashMap<VendorId, VendorLedgerSummary>,
    position: ProjectionPosition,
}

/// Per-vendor balances built from ledger rows.
#[derive(Clone, Default)]
pub struct VendorLedgerView {
    state: Arc<RwLock<State>>,
}

impl VendorLedgerView {
    /// Creates an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals for a vendor; all zero when it has no transactions yet.
    pub async fn summary(&self, vendor_id: VendorId) -> VendorLedgerSummary {
        self.state
            .read()
            .await
            .vendors
            .get(&vendor_id)
            .copied()
            .unwrap_or_else(|| VendorLedgerSummary::empty(vendor_id))
    }
}

#[async_trait]
impl Projection for VendorLedgerView {
    fn name(&self) -> &'static str {
        "VendorLedgerView"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let row = if envelope.aggregate_type == Transaction::aggregate_type() {
            let TransactionEvent::TransactionRecorded(row) = envelope
                .decode()
                .map_err(|err| ProjectionError::decode(&envelope.event_type, err))?;
            Some(row)
        } else {
            None
        };

        let mut state = self.state.write().await;
        if let Some(row) = row {
            state
                .vendors
                .entry(row.vendor_id)
                .or_insert_with(|| VendorLedgerSummary::empty(row.vendor_id))
                .record(&row);
        }
        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.vendors.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for VendorLedgerView {
    fn name(&self) -> &'static str {
        "VendorLedgerView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.vendors.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use common::{AggregateId, CustomerId};
    use domain::{PaymentStatus, PayoutStatus, TransactionId, TransactionStatus};

    use super::*;
    use crate::views::fixtures::{at, envelope};

    fn row(
        vendor_id: VendorId,
        kind: TransactionType,
        amount: i64,
        platform_fee: i64,
        payment_fee: i64,
    ) -> TransactionEvent {
        let amount = Money::from_minor(amount);
        let platform_fee = Money::from_minor(platform_fee);
        let payment_fee = Money::from_minor(payment_fee);
        TransactionEvent::TransactionRecorded(TransactionRecordedData {
            id: AggregateId::new(),
            transaction_id: TransactionId::compose(at(), 1),
            order_id: AggregateId::new(),
            vendor_id,
            customer_id: CustomerId::new(),
            kind,
            amount,
            platform_fee,
            payment_fee,
            vendor_amount: amount - platform_fee - payment_fee,
            payment_status: PaymentStatus::Paid,
            payout_status: PayoutStatus::Pending,
            status: TransactionStatus::Completed,
            references: None,
            description: String::new(),
            failure_reason: None,
            completed_at: Some(at()),
        })
    }

    async fn feed(view: &VendorLedgerView, rows: &[TransactionEvent]) {
        for event in rows {
            view.handle(&envelope("Transaction", AggregateId::new(), 1, event))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn net_accounts_for_fees_refunds_and_payouts() {
        let view = VendorLedgerView::new();
        let vendor = VendorId::new();

        feed(
            &view,
            &[
                row(vendor, TransactionType::Payment, 29265, 2927, 849),
                row(vendor, TransactionType::Refund, 10000, 1000, 0),
                row(vendor, TransactionType::Adjustment, -500, 0, 0),
                row(vendor, TransactionType::Payout, 9100, 910, 0),
            ],
        )
        .await;

        let summary = view.summary(vendor).await;
        assert_eq!(summary.gross, Money::from_minor(29265));
        assert_eq!(summary.refunds, Money::from_minor(10000));
        assert_eq!(summary.platform_fees, Money::from_minor(1927));
        assert_eq!(summary.payment_fees, Money::from_minor(849));
        // 25489 - 9000 - 500
        assert_eq!(summary.net, Money::from_minor(15989));
        assert_eq!(summary.paid_out, Money::from_minor(8190));
        assert_eq!(summary.outstanding, Money::from_minor(7799));
        assert_eq!(summary.transactions, 4);
    }

    #[tokio::test]
    async fn vendors_are_kept_apart() {
        let view = VendorLedgerView::new();
        let (a, b) = (VendorId::new(), VendorId::new());

        feed(
            &view,
            &[
                row(a, TransactionType::Payment, 1000, 100, 0),
                row(b, TransactionType::Payment, 5000, 500, 0),
            ],
        )
        .await;

        assert_eq!(view.summary(a).await.net, Money::from_minor(900));
        assert_eq!(view.summary(b).await.net, Money::from_minor(4500));
        assert_eq!(ReadModel::count(&view), 2);
    }

    #[tokio::test]
    async fn order_events_only_advance_the_position() {
        let view = VendorLedgerView::new();
        let order_id = AggregateId::new();
        let event = crate::views::fixtures::placed(
            order_id,
            CustomerId::new(),
            &[(VendorId::new(), "mug", 100, 1)],
        );

        view.handle(&envelope("Order", order_id, 1, &event))
            .await
            .unwrap();

        assert_eq!(view.position().await.events_seen, 1);
        assert_eq!(ReadModel::count(&view), 0);
        let empty = view.summary(VendorId::new()).await;
        assert_eq!(empty.net, Money::zero());
    }
}
