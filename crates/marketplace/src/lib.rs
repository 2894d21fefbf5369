//! Application services of the marketplace order engine.
//!
//! Each service drives the [`domain::Order`] aggregate through the event
//! store and talks to the external collaborators:
//!
//! - [`CheckoutService`]: order creation with all-or-nothing stock, and cancellation
//! - [`PaymentReconciler`]: proofs, confirmations, gateway callbacks, refunds
//! - [`FulfillmentTracker`]: status progression and the tracking log
//! - [`TransactionLedger`]: immutable payment, refund, payout and adjustment rows
//! - [`InvoiceProjection`]: per-vendor invoice view

pub mod checkout;
pub mod collaborators;
pub mod engine;
pub mod error;
pub mod fulfillment;
pub mod invoice;
pub mod ledger;
pub mod orders;
pub mod payments;

pub use checkout::{CheckoutItem, CheckoutRequest, CheckoutService, MAX_LINE_QUANTITY};
pub use collaborators::{Collaborators, InMemoryCollaborators};
pub use engine::Marketplace;
pub use error::{MarketplaceError, Result};
pub use fulfillment::{FulfillmentTracker, LocationUpdate};
pub use invoice::{Invoice, InvoiceProjection, VendorGroup};
pub use ledger::{Recorded, TransactionLedger};
pub use orders::{ORDER_NUMBER_CLAIM, OrderRepository};
pub use payments::{PaymentOutcome, PaymentReconciler};
