use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money, VendorId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::ids::TransactionId;
use crate::order::PaymentStatus;

use super::{FeeBreakdown, LedgerError, PayoutStatus, TransactionStatus, TransactionType};

/// Input for recording a ledger row.
#[derive(Debug, Clone)]
pub struct RecordTransaction {
    pub id: AggregateId,
    pub transaction_id: TransactionId,
    pub order_id: AggregateId,
    pub vendor_id: VendorId,
    pub customer_id: CustomerId,
    pub kind: TransactionType,
    pub amount: Money,
    pub fees: FeeBreakdown,
    /// The order's payment status at the moment the row was recorded.
    pub payment_status: PaymentStatus,
    /// Original transaction an adjustment corrects.
    pub references: Option<TransactionId>,
    pub description: String,
}

/// Data for TransactionRecorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecordedData {
    pub id: AggregateId,
    pub transaction_id: TransactionId,
    pub order_id: AggregateId,
    pub vendor_id: VendorId,
    pub customer_id: CustomerId,
    pub kind: TransactionType,
    pub amount: Money,
    pub platform_fee: Money,
    pub payment_fee: Money,
    pub vendor_amount: Money,
    pub payment_status: PaymentStatus,
    pub payout_status: PayoutStatus,
    pub status: TransactionStatus,
    pub references: Option<TransactionId>,
    pub description: String,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Events of a ledger row stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TransactionEvent {
    TransactionRecorded(TransactionRecordedData),
}

impl DomainEvent for TransactionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransactionEvent::TransactionRecorded(_) => "TransactionRecorded",
        }
    }
}

/// A single immutable ledger row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    version: Version,
    entry: Option<TransactionRecordedData>,
}

impl Aggregate for Transaction {
    type Event = TransactionEvent;
    type Error = LedgerError;

    fn aggregate_type() -> &'static str {
        "Transaction"
    }

    fn id(&self) -> Option<AggregateId> {
        self.entry.as_ref().map(|entry| entry.id)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            TransactionEvent::TransactionRecorded(data) => {
                if self.entry.is_none() {
                    self.entry = Some(data);
                }
            }
        }
    }
}

impl Transaction {
    /// Returns the recorded row, if any.
    pub fn entry(&self) -> Option<&TransactionRecordedData> {
        self.entry.as_ref()
    }

    /// Consumes the aggregate and returns its row.
    pub fn into_entry(self) -> Option<TransactionRecordedData> {
        self.entry
    }

    /// Records the row once; a second attempt is rejected.
    pub fn record(
        &self,
        command: RecordTransaction,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransactionEvent>, LedgerError> {
        if self.entry.is_some() {
            return Err(LedgerError::AlreadyRecorded);
        }

        match command.kind {
            TransactionType::Adjustment => {
                if command.amount.is_zero() {
                    return Err(LedgerError::Validation(
                        "adjustment amount cannot be zero".to_string(),
                    ));
                }
                if command.references.is_none() {
                    return Err(LedgerError::Validation(
                        "an adjustment must reference the transaction it corrects".to_string(),
                    ));
                }
            }
            kind if !command.amount.is_positive() => {
                return Err(LedgerError::Validation(format!(
                    "{kind} amount must be greater than 0"
                )));
            }
            _ => {}
        }

        if !command.fees.balances(command.amount) {
            return Err(LedgerError::Validation(
                "vendor amount must equal amount minus fees".to_string(),
            ));
        }

        let payout_status = match command.kind {
            TransactionType::Payment => PayoutStatus::Pending,
            TransactionType::Payout => PayoutStatus::Paid,
            TransactionType::Refund | TransactionType::Adjustment => PayoutStatus::NotApplicable,
        };

        Ok(vec![TransactionEvent::TransactionRecorded(
            TransactionRecordedData {
                id: command.id,
                transaction_id: command.transaction_id,
                order_id: command.order_id,
                vendor_id: command.vendor_id,
                customer_id: command.customer_id,
                kind: command.kind,
                amount: command.amount,
                platform_fee: command.fees.platform_fee,
                payment_fee: command.fees.payment_fee,
                vendor_amount: command.fees.vendor_amount,
                payment_status: command.payment_status,
                payout_status,
                status: TransactionStatus::Completed,
                references: command.references,
                description: command.description,
                failure_reason: None,
                completed_at: Some(now),
            },
        )])
    }
}
