//! Engine configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::MarketResult;

/// Tunables for the marketplace engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Orders a client may hold in moderation or on the board
    pub max_open_orders: u32,
    /// Assignments a worker may hold in progress or review
    pub max_live_assignments: u32,
    /// Client-side markup on the escrow hold (1.5 = 50% commission)
    pub commission_multiplier: Decimal,
    /// Minimum deposit and withdrawal amount
    pub min_transfer_amount: Decimal,
    /// Interval between deadline sweeps, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            max_open_orders: 10,
            max_live_assignments: 5,
            commission_multiplier: dec!(1.5),
            min_transfer_amount: dec!(100),
            sweep_interval_secs: 60,
        }
    }
}

impl MarketConfig {
    /// Load configuration from `MARKET_*` environment variables, falling
    /// back to the defaults for anything unset
    pub fn from_env() -> MarketResult<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("MARKET"))
            .build()
            .map_err(|e| MarketError::config(e.to_string()))?;
        cfg.try_deserialize()
            .map_err(|e| MarketError::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_marketplace_rules() {
        let cfg = MarketConfig::default();
        assert_eq!(cfg.max_open_orders, 10);
        assert_eq!(cfg.max_live_assignments, 5);
        assert_eq!(cfg.commission_multiplier, dec!(1.5));
        assert_eq!(cfg.min_transfer_amount, dec!(100));
    }

    #[test]
    fn from_env_falls_back_to_defaults() {
        let cfg = MarketConfig::from_env().unwrap();
        assert_eq!(cfg.max_open_orders, MarketConfig::default().max_open_orders);
    }
}
