//! Domain layer of the marketplace order engine.
//!
//! - [`Aggregate`]/[`DomainEvent`] traits and the [`CommandHandler`] that
//!   executes decisions with conditional appends and bounded retries
//! - The [`Order`] aggregate: placement, payment reconciliation, fulfillment
//!   and tracking decisions
//! - The [`Transaction`] ledger entry
//! - [`Principal`] authorization, injectable [`Clock`] and [`IdGenerator`]

pub mod aggregate;
pub mod auth;
pub mod clock;
pub mod command;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use auth::{Access, Principal, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{CommandHandler, CommandOptions, CommandResult, RetryPolicy};
pub use error::DomainError;
pub use ids::{IdGenerator, OrderNumber, RandomIdGenerator, ScriptedIdGenerator, TransactionId};
pub use ledger::{
    FeeBreakdown, LedgerError, PayoutStatus, RecordTransaction, Transaction, TransactionEvent,
    TransactionRecordedData, TransactionStatus, TransactionType,
};
pub use order::{
    Address, CollectionPoint, FulfillmentMethod, GatewayOutcome, GeoPoint, LineItem, Order,
    OrderError, OrderEvent, OrderStatus, OrderTotals, PaymentMethod, PaymentProof, PaymentStatus,
    PlaceOrder, Settlement, TrackingEntry, Whereabouts,
};
