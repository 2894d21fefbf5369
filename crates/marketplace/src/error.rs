//! Marketplace service errors.

use common::ProductId;
use domain::{DomainError, LedgerError, OrderError};
use event_store::EventStoreError;
use thiserror::Error;

/// Errors surfaced by the application services.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not enough stock for one of the requested lines. Any stock already
    /// taken for the same checkout has been put back.
    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("could not allocate a unique order number after {attempts} attempts")]
    OrderNumberCollision { attempts: u32 },

    #[error("{0} not found")]
    NotFound(String),

    /// An external collaborator failed to answer.
    #[error("{service} unavailable: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl MarketplaceError {
    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketplaceError::Validation(_) => "validation_error",
            MarketplaceError::InsufficientStock { .. } => "insufficient_stock",
            MarketplaceError::OrderNumberCollision { .. } => "order_number_collision",
            MarketplaceError::NotFound(_) => "not_found",
            MarketplaceError::Collaborator { .. } => "persistence_error",
            MarketplaceError::Domain(err) => err.kind(),
        }
    }

    /// A failure reported by an external collaborator.
    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        MarketplaceError::Collaborator {
            service,
            message: message.into(),
        }
    }

    /// True when another writer already reached the state this call wanted.
    pub fn is_already_confirmed(&self) -> bool {
        matches!(
            self,
            MarketplaceError::Domain(DomainError::Order(OrderError::AlreadyConfirmed))
        )
    }
}

impl From<OrderError> for MarketplaceError {
    fn from(err: OrderError) -> Self {
        MarketplaceError::Domain(DomainError::Order(err))
    }
}

impl From<LedgerError> for MarketplaceError {
    fn from(err: LedgerError) -> Self {
        MarketplaceError::Domain(DomainError::Ledger(err))
    }
}

impl From<EventStoreError> for MarketplaceError {
    fn from(err: EventStoreError) -> Self {
        MarketplaceError::Domain(DomainError::EventStore(err))
    }
}

impl From<serde_json::Error> for MarketplaceError {
    fn from(err: serde_json::Error) -> Self {
        MarketplaceError::Domain(DomainError::Serialization(err))
    }
}

/// Result alias for marketplace operations.
pub type Result<T> = std::result::Result<T, MarketplaceError>;
