//! Shipping, tax and discount rules applied at checkout.

use std::collections::HashMap;

use common::{Money, Rate};
use domain::FulfillmentMethod;

use crate::error::{MarketplaceError, Result};

/// The parts of an order total that are not merchandise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PricingQuote {
    pub shipping_cost: Money,
    pub tax: Money,
    pub discount: Money,
}

/// Computes shipping, tax and discount for a checkout.
pub trait PricingRules: Send + Sync {
    fn quote(
        &self,
        subtotal: Money,
        fulfillment: FulfillmentMethod,
        coupon_code: Option<&str>,
    ) -> Result<PricingQuote>;
}

/// Discount granted by a coupon code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupon {
    Percent(Rate),
    Fixed(Money),
}

/// Flat shipping for deliveries, free collection, one tax rate on the
/// merchandise subtotal, and a table of coupon codes.
#[derive(Debug, Clone)]
pub struct FlatPricing {
    pub shipping: Money,
    pub tax_rate: Rate,
    coupons: HashMap<String, Coupon>,
}

impl FlatPricing {
    /// Creates pricing with no coupons.
    pub fn new(shipping: Money, tax_rate: Rate) -> Self {
        Self {
            shipping,
            tax_rate,
            coupons: HashMap::new(),
        }
    }

    /// Registers a coupon; codes are case-insensitive.
    pub fn with_coupon(mut self, code: impl Into<String>, coupon: Coupon) -> Self {
        self.coupons.insert(code.into().to_ascii_uppercase(), coupon);
        self
    }
}

impl Default for FlatPricing {
    fn default() -> Self {
        Self::new(Money::from_major(50), Rate::from_percent(15))
    }
}

impl PricingRules for FlatPricing {
    fn quote(
        &self,
        subtotal: Money,
        fulfillment: FulfillmentMethod,
        coupon_code: Option<&str>,
    ) -> Result<PricingQuote> {
        let shipping_cost = match fulfillment {
            FulfillmentMethod::Delivery => self.shipping,
            FulfillmentMethod::Collection => Money::zero(),
        };

        let discount = match coupon_code.map(str::trim).filter(|code| !code.is_empty()) {
            None => Money::zero(),
            Some(code) => match self.coupons.get(&code.to_ascii_uppercase()) {
                Some(Coupon::Percent(rate)) => subtotal.apply_rate(*rate),
                Some(Coupon::Fixed(amount)) => *amount,
                None => {
                    return Err(MarketplaceError::Validation(format!(
                        "unknown coupon code {code}"
                    )));
                }
            },
        };

        Ok(PricingQuote {
            shipping_cost,
            tax: subtotal.apply_rate(self.tax_rate),
            discount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_pays_shipping_and_tax() {
        let quote = FlatPricing::default()
            .quote(Money::from_major(500), FulfillmentMethod::Delivery, None)
            .unwrap();
        assert_eq!(quote.shipping_cost, Money::from_major(50));
        assert_eq!(quote.tax, Money::from_major(75));
        assert_eq!(quote.discount, Money::zero());
    }

    #[test]
    fn collection_ships_free() {
        let quote = FlatPricing::default()
            .quote(Money::from_major(100), FulfillmentMethod::Collection, None)
            .unwrap();
        assert_eq!(quote.shipping_cost, Money::zero());
    }

    #[test]
    fn coupons_are_case_insensitive() {
        let pricing = FlatPricing::default()
            .with_coupon("spring10", Coupon::Percent(Rate::from_percent(10)))
            .with_coupon("FIVE", Coupon::Fixed(Money::from_major(5)));

        let quote = pricing
            .quote(Money::from_major(200), FulfillmentMethod::Delivery, Some("SPRING10"))
            .unwrap();
        assert_eq!(quote.discount, Money::from_major(20));

        let quote = pricing
            .quote(Money::from_major(200), FulfillmentMethod::Delivery, Some("five"))
            .unwrap();
        assert_eq!(quote.discount, Money::from_major(5));

        assert!(pricing
            .quote(Money::from_major(200), FulfillmentMethod::Delivery, Some("nope"))
            .is_err());
    }
}
