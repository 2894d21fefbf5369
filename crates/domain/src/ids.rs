//! Human-readable identifiers for orders and ledger rows.
//!
//! Both formats are a fixed prefix, a truncated timestamp and a short random
//! suffix. Generation is behind [`IdGenerator`] so tests can script the
//! suffixes (and force collisions) while production draws them from uuid v4
//! entropy. Uniqueness itself is enforced by the event store's claims.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ORDER_PREFIX: &str = "ORD";
const TRANSACTION_PREFIX: &str = "TXN";

/// `ORD` + yyMMdd + 5 trailing microsecond digits + 4 random digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Digits after the prefix.
    pub const DIGITS: usize = 15;

    /// Builds an order number from a timestamp and a 4-digit suffix.
    pub fn compose(now: DateTime<Utc>, suffix: u32) -> Self {
        let micros = now.timestamp_micros().rem_euclid(100_000);
        Self(format!(
            "{ORDER_PREFIX}{}{micros:05}{:04}",
            now.format("%y%m%d"),
            suffix % 10_000
        ))
    }

    /// Accepts only well-formed order numbers.
    pub fn parse(value: &str) -> Option<Self> {
        is_well_formed(value, ORDER_PREFIX, Self::DIGITS).then(|| Self(value.to_string()))
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `TXN` + 8 trailing millisecond digits + 3 random digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Digits after the prefix.
    pub const DIGITS: usize = 11;

    /// Builds a transaction id from a timestamp and a 3-digit suffix.
    pub fn compose(now: DateTime<Utc>, suffix: u32) -> Self {
        let millis = now.timestamp_millis().rem_euclid(100_000_000);
        Self(format!("{TRANSACTION_PREFIX}{millis:08}{:03}", suffix % 1_000))
    }

    /// Parses a transaction id, rejecting malformed values.
    pub fn parse(value: &str) -> Option<Self> {
        is_well_formed(value, TRANSACTION_PREFIX, Self::DIGITS).then(|| Self(value.to_string()))
    }

    /// Returns the transaction id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_well_formed(value: &str, prefix: &str, digits: usize) -> bool {
    value
        .strip_prefix(prefix)
        .is_some_and(|tail| tail.len() == digits && tail.bytes().all(|b| b.is_ascii_digit()))
}

/// Source of human-readable identifiers.
pub trait IdGenerator: Send + Sync {
    fn order_number(&self, now: DateTime<Utc>) -> OrderNumber;

    fn transaction_id(&self, now: DateTime<Utc>) -> TransactionId;
}

/// Suffixes drawn from uuid v4 randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    fn entropy(modulus: u128) -> u32 {
        (Uuid::new_v4().as_u128() % modulus) as u32
    }
}

impl IdGenerator for RandomIdGenerator {
    fn order_number(&self, now: DateTime<Utc>) -> OrderNumber {
        OrderNumber::compose(now, Self::entropy(10_000))
    }

    fn transaction_id(&self, now: DateTime<Utc>) -> TransactionId {
        TransactionId::compose(now, Self::entropy(1_000))
    }
}

/// Hands out pre-arranged suffixes, then counts upward.
///
/// Order numbers and transaction ids draw from the same script.
#[derive(Debug, Default)]
pub struct ScriptedIdGenerator {
    script: Mutex<VecDeque<u32>>,
    counter: AtomicU32,
}

impl ScriptedIdGenerator {
    /// Creates a generator that hands out `suffixes` first.
    pub fn new(suffixes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            script: Mutex::new(suffixes.into_iter().collect()),
            counter: AtomicU32::new(0),
        }
    }

    fn next_suffix(&self) -> u32 {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl IdGenerator for ScriptedIdGenerator {
    fn order_number(&self, now: DateTime<Utc>) -> OrderNumber {
        OrderNumber::compose(now, self.next_suffix())
    }

    fn transaction_id(&self, now: DateTime<Utc>) -> TransactionId {
        TransactionId::compose(now, self.next_suffix())
    }
}
