//! Commission and payment-processing fee schedule.

use std::collections::HashMap;

use common::{Rate, VendorId};
use domain::PaymentMethod;

/// Rates the ledger uses to split payments.
pub trait FeeSchedule: Send + Sync {
    /// Platform commission charged on the vendor's sales.
    fn commission_for(&self, vendor_id: VendorId) -> Rate;

    /// Processing fee for captured payments.
    fn payment_fee_for(&self, method: PaymentMethod) -> Rate;
}

/// One default commission with per-vendor overrides.
#[derive(Debug, Clone)]
pub struct StaticFeeSchedule {
    pub default_commission: Rate,
    pub gateway_fee: Rate,
    overrides: HashMap<VendorId, Rate>,
}

impl StaticFeeSchedule {
    /// Creates a schedule with no overrides.
    pub fn new(default_commission: Rate, gateway_fee: Rate) -> Self {
        Self {
            default_commission,
            gateway_fee,
            overrides: HashMap::new(),
        }
    }

    /// Overrides the commission for one vendor.
    pub fn with_commission(mut self, vendor_id: VendorId, rate: Rate) -> Self {
        self.overrides.insert(vendor_id, rate);
        self
    }
}

impl Default for StaticFeeSchedule {
    fn default() -> Self {
        Self::new(Rate::from_percent(10), Rate::from_basis_points(290))
    }
}

impl FeeSchedule for StaticFeeSchedule {
    fn commission_for(&self, vendor_id: VendorId) -> Rate {
        self.overrides
            .get(&vendor_id)
            .copied()
            .unwrap_or(self.default_commission)
    }

    fn payment_fee_for(&self, method: PaymentMethod) -> Rate {
        match method {
            PaymentMethod::Gateway => self.gateway_fee,
            PaymentMethod::ManualTransfer | PaymentMethod::CashOnDelivery => Rate::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_overrides_and_method_fees() {
        let special = VendorId::new();
        let fees = StaticFeeSchedule::default().with_commission(special, Rate::from_percent(5));

        assert_eq!(fees.commission_for(special), Rate::from_percent(5));
        assert_eq!(fees.commission_for(VendorId::new()), Rate::from_percent(10));
        assert_eq!(fees.payment_fee_for(PaymentMethod::Gateway), Rate::from_basis_points(290));
        assert_eq!(fees.payment_fee_for(PaymentMethod::ManualTransfer), Rate::zero());
    }
}
