//! Inventory collaborator: per-product stock levels.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::ProductId;

use crate::error::{MarketplaceError, Result};

/// Result of a stock decrement that reached the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOutcome {
    Decremented,
    Insufficient { available: u32 },
}

/// Stock is adjusted one product at a time; callers compensate on partial
/// failure.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Takes `quantity` units, or reports how many are left.
    async fn decrement_stock(&self, product_id: &ProductId, quantity: u32) -> Result<StockOutcome>;

    /// Puts `quantity` units back.
    async fn restore_stock(&self, product_id: &ProductId, quantity: u32) -> Result<()>;
}

#[derive(Debug, Default)]
struct InventoryState {
    levels: HashMap<ProductId, u32>,
    offline: bool,
    unavailable: HashSet<ProductId>,
}

impl InventoryState {
    fn check(&self, product_id: &ProductId) -> Result<()> {
        if self.offline {
            return Err(MarketplaceError::collaborator("inventory", "offline"));
        }
        if self.unavailable.contains(product_id) {
            return Err(MarketplaceError::collaborator(
                "inventory",
                format!("{product_id} is unavailable"),
            ));
        }
        Ok(())
    }
}

/// Stock levels held in memory, with switches for simulating outages.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventory {
    /// Creates an inventory with no stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stock level of a product.
    pub fn set_stock(&self, product_id: &ProductId, units: u32) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .levels
            .insert(product_id.clone(), units);
    }

    /// Current stock level; unknown products have none.
    pub fn stock(&self, product_id: &ProductId) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .levels
            .get(product_id)
            .copied()
            .unwrap_or(0)
    }

    /// Makes every call fail, as if the inventory service were down.
    pub fn set_offline(&self, offline: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .offline = offline;
    }

    /// Makes calls for one product fail while the rest keep working.
    pub fn set_unavailable(&self, product_id: &ProductId, unavailable: bool) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if unavailable {
            state.unavailable.insert(product_id.clone());
        } else {
            state.unavailable.remove(product_id);
        }
    }
}

#[async_trait]
impl Inventory for InMemoryInventory {
    async fn decrement_stock(&self, product_id: &ProductId, quantity: u32) -> Result<StockOutcome> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.check(product_id)?;

        let level = state.levels.entry(product_id.clone()).or_insert(0);
        if *level < quantity {
            return Ok(StockOutcome::Insufficient { available: *level });
        }
        *level -= quantity;
        Ok(StockOutcome::Decremented)
    }

    async fn restore_stock(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.check(product_id)?;
        *state.levels.entry(product_id.clone()).or_insert(0) += quantity;
        Ok(())
    }
}
