//! Immutable financial ledger entries.
//!
//! Every [`Transaction`] stream holds exactly one `TransactionRecorded`
//! event. Corrections are new adjustment transactions that reference the
//! original id; nothing is ever edited in place.

mod transaction;

pub use transaction::{RecordTransaction, Transaction, TransactionEvent, TransactionRecordedData};

use std::fmt;

use common::{Money, Rate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    Refund,
    Payout,
    Adjustment,
}

impl TransactionType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "payment",
            TransactionType::Refund => "refund",
            TransactionType::Payout => "payout",
            TransactionType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Whether the vendor's share of a row has been paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    #[default]
    NotApplicable,
    Pending,
    Paid,
}

/// Split of an amount between the platform, the payment provider and the
/// vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub platform_fee: Money,
    pub payment_fee: Money,
    pub vendor_amount: Money,
}

impl FeeBreakdown {
    /// Splits `amount` by the commission and payment fee rates.
    pub fn compute(amount: Money, commission: Rate, payment_fee_rate: Rate) -> Self {
        let platform_fee = amount.apply_rate(commission);
        let payment_fee = amount.apply_rate(payment_fee_rate);
        Self {
            platform_fee,
            payment_fee,
            vendor_amount: amount - platform_fee - payment_fee,
        }
    }

    /// No fees: the vendor gets the whole amount.
    pub fn none(amount: Money) -> Self {
        Self {
            platform_fee: Money::zero(),
            payment_fee: Money::zero(),
            vendor_amount: amount,
        }
    }

    /// Returns true if the parts add back up to `amount`.
    pub fn balances(&self, amount: Money) -> bool {
        self.vendor_amount == amount - self.platform_fee - self.payment_fee
    }
}

/// Errors raised while recording ledger rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transaction has already been recorded")]
    AlreadyRecorded,
}

impl LedgerError {
    /// Stable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::AlreadyRecorded => "conflict",
        }
    }
}
