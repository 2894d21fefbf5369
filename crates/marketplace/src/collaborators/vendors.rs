//! Vendor directory: display names and bank details for invoices.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::VendorId;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where a customer sends a manual transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankingDetails {
    pub account_name: String,
    pub bank_name: String,
    pub account_number: String,
    pub branch_code: String,
}

/// A vendor's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub vendor_id: VendorId,
    pub display_name: String,
    pub banking: Option<BankingDetails>,
}

/// Looks up vendor profiles.
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    async fn vendor(&self, vendor_id: VendorId) -> Result<Option<VendorProfile>>;
}

/// Vendor directory held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVendorDirectory {
    vendors: Arc<RwLock<HashMap<VendorId, VendorProfile>>>,
}

impl InMemoryVendorDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a vendor profile.
    pub fn register(&self, profile: VendorProfile) {
        self.vendors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.vendor_id, profile);
    }
}

#[async_trait]
impl VendorDirectory for InMemoryVendorDirectory {
    async fn vendor(&self, vendor_id: VendorId) -> Result<Option<VendorProfile>> {
        Ok(self
            .vendors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&vendor_id)
            .cloned())
    }
}
