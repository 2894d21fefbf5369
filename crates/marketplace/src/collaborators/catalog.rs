//! Catalog collaborator: current price and owning vendor of a product.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId, VendorId};

use crate::error::{MarketplaceError, Result};

/// A product's price and vendor at the moment of checkout. Copied onto the
/// line item, so later catalog edits never reach existing orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub vendor_id: VendorId,
    pub name: String,
    pub price: Money,
}

/// Product catalog consulted when pricing a checkout.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Looks up a product. When `vendor_id` is given it must match the
    /// product's owner.
    async fn reserve_price(
        &self,
        product_id: &ProductId,
        vendor_id: Option<VendorId>,
    ) -> Result<CatalogEntry>;
}

/// Catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, CatalogEntry>>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn add(&self, entry: CatalogEntry) {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.product_id.clone(), entry);
    }

    /// Adds a product and returns its id.
    pub fn list(
        &self,
        product_id: &str,
        vendor_id: VendorId,
        name: &str,
        price: Money,
    ) -> ProductId {
        let product_id = ProductId::new(product_id);
        self.add(CatalogEntry {
            product_id: product_id.clone(),
            vendor_id,
            name: name.to_string(),
            price,
        });
        product_id
    }

    /// Changes the listed price of a product.
    pub fn set_price(&self, product_id: &ProductId, price: Money) {
        if let Some(entry) = self
            .products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(product_id)
        {
            entry.price = price;
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn reserve_price(
        &self,
        product_id: &ProductId,
        vendor_id: Option<VendorId>,
    ) -> Result<CatalogEntry> {
        let entry = self
            .products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(product_id)
            .cloned()
            .ok_or_else(|| MarketplaceError::Validation(format!("unknown product {product_id}")))?;

        if vendor_id.is_some_and(|vendor| vendor != entry.vendor_id) {
            return Err(MarketplaceError::Validation(format!(
                "product {product_id} is not sold by that vendor"
            )));
        }
        Ok(entry)
    }
}
