//! Event-driven read models for the marketplace.
//!
//! - [`Projection`] folds the global event log into a view
//! - [`ProjectionProcessor`] delivers events incrementally and rebuilds views
//! - Views: [`CustomerOrdersView`] (order history), [`VendorOrdersView`]
//!   (vendor inbox with line statuses) and [`VendorLedgerView`] (earnings)

pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition, ReadModel};
pub use views::{
    CustomerOrderSummary, CustomerOrdersView, Progress, VendorLedgerSummary, VendorLedgerView,
    VendorLine, VendorOrderEntry, VendorOrdersView,
};
