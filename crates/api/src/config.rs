//! Application configuration loaded from environment variables.

use common::{Money, Rate};
use domain::RetryPolicy;
use marketplace::collaborators::{FlatPricing, StaticFeeSchedule};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on the in-memory store
/// - `DEFAULT_COMMISSION_BPS`: platform commission (default: `1000`, 10%)
/// - `GATEWAY_FEE_BPS`: gateway processing fee (default: `290`)
/// - `FLAT_SHIPPING_CENTS`: delivery charge (default: `5000`)
/// - `TAX_RATE_BPS`: tax on the merchandise subtotal (default: `1500`)
/// - `MAX_WRITE_ATTEMPTS`: attempts per command on version conflicts (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub commission_bps: u32,
    pub gateway_fee_bps: u32,
    pub flat_shipping_cents: i64,
    pub tax_rate_bps: u32,
    pub max_write_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        fn parse_var<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|value| value.trim().parse().ok())
        }

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            commission_bps: parse_var(&lookup, "DEFAULT_COMMISSION_BPS").unwrap_or(defaults.commission_bps),
            gateway_fee_bps: parse_var(&lookup, "GATEWAY_FEE_BPS").unwrap_or(defaults.gateway_fee_bps),
            flat_shipping_cents: parse_var(&lookup, "FLAT_SHIPPING_CENTS")
                .unwrap_or(defaults.flat_shipping_cents),
            tax_rate_bps: parse_var(&lookup, "TAX_RATE_BPS").unwrap_or(defaults.tax_rate_bps),
            max_write_attempts: parse_var(&lookup, "MAX_WRITE_ATTEMPTS").unwrap_or(defaults.max_write_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fee schedule built from the configured rates.
    pub fn fees(&self) -> StaticFeeSchedule {
        StaticFeeSchedule::new(
            Rate::from_basis_points(self.commission_bps),
            Rate::from_basis_points(self.gateway_fee_bps),
        )
    }

    /// Pricing rules built from the configured shipping and tax.
    pub fn pricing(&self) -> FlatPricing {
        FlatPricing::new(
            Money::from_minor(self.flat_shipping_cents),
            Rate::from_basis_points(self.tax_rate_bps),
        )
    }

    /// Retry policy for conflicting writes.
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_write_attempts)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            commission_bps: 1000,
            gateway_fee_bps: 290,
            flat_shipping_cents: 5000,
            tax_rate_bps: 1500,
            max_write_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.fees().default_commission, Rate::from_percent(10));
        assert_eq!(config.pricing().shipping, Money::from_major(50));
        assert_eq!(config.retry(), RetryPolicy::new(3));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DEFAULT_COMMISSION_BPS", "750"),
            ("TAX_RATE_BPS", "not-a-number"),
            ("DATABASE_URL", "postgres://localhost/market"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.commission_bps, 750);
        assert_eq!(config.tax_rate_bps, 1500);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/market")
        );
    }

    #[test]
    fn test_empty_database_url_means_in_memory() {
        assert!(config_from(&[("DATABASE_URL", "")]).database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
