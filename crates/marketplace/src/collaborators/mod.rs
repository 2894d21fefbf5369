//! External collaborators the engine depends on, with in-memory versions.

pub mod catalog;
pub mod fees;
pub mod inventory;
pub mod notifications;
pub mod pricing;
pub mod vendors;

use std::sync::Arc;

use domain::{Clock, IdGenerator, RandomIdGenerator, SystemClock};

pub use catalog::{Catalog, CatalogEntry, InMemoryCatalog};
pub use fees::{FeeSchedule, StaticFeeSchedule};
pub use inventory::{InMemoryInventory, Inventory, StockOutcome};
pub use notifications::{ChannelDispatcher, Notification, NotificationDispatcher, RecordingDispatcher};
pub use pricing::{Coupon, FlatPricing, PricingQuote, PricingRules};
pub use vendors::{BankingDetails, InMemoryVendorDirectory, VendorDirectory, VendorProfile};

/// Everything the services call out to, plus the injected clock and id
/// generator.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub inventory: Arc<dyn Inventory>,
    pub pricing: Arc<dyn PricingRules>,
    pub fees: Arc<dyn FeeSchedule>,
    pub vendors: Arc<dyn VendorDirectory>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

/// In-memory collaborators with handles kept for seeding and inspection.
#[derive(Clone)]
pub struct InMemoryCollaborators {
    pub catalog: InMemoryCatalog,
    pub inventory: InMemoryInventory,
    pub vendors: InMemoryVendorDirectory,
    pub pricing: FlatPricing,
    pub fees: StaticFeeSchedule,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl InMemoryCollaborators {
    /// In-memory collaborators with the system clock and random ids.
    pub fn new(notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            catalog: InMemoryCatalog::new(),
            inventory: InMemoryInventory::new(),
            vendors: InMemoryVendorDirectory::new(),
            pricing: FlatPricing::default(),
            fees: StaticFeeSchedule::default(),
            notifier,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIdGenerator),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the id generator.
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Replaces the pricing rules.
    pub fn with_pricing(mut self, pricing: FlatPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Replaces the fee schedule.
    pub fn with_fees(mut self, fees: StaticFeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    /// Shares these collaborators behind trait objects.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            catalog: Arc::new(self.catalog.clone()),
            inventory: Arc::new(self.inventory.clone()),
            pricing: Arc::new(self.pricing.clone()),
            fees: Arc::new(self.fees.clone()),
            vendors: Arc::new(self.vendors.clone()),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        }
    }
}
