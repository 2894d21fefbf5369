//! Shared types used across the marketplace workspace.
//!
//! - Typed identifiers for aggregates, customers, vendors and products
//! - [`Money`] in minor currency units and [`Rate`] in basis points

pub mod money;
pub mod types;

pub use money::{Money, Rate};
pub use types::{AggregateId, CustomerId, ProductId, VendorId};
