use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Config, Error, OrderSide, Result, RiskParams};

/// User-configurable risk parameters. Both legs are optional; a missing
/// percentage means no protective order of that kind is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Distance of the stop-loss trigger from the entry (e.g. 0.02 = 2%).
    pub stop_loss_pct: Option<f64>,
    /// Distance of the take-profit trigger from the entry (e.g. 0.04 = 4%).
    pub take_profit_pct: Option<f64>,
}

impl RiskConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
        }
    }

    /// A stop-loss must lie strictly between 0% and 100% so the trigger
    /// price stays positive; take-profit only has to be positive.
    pub fn validate(&self) -> Result<()> {
        if let Some(pct) = self.stop_loss_pct {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(Error::Config(format!(
                    "STOP_LOSS_PCT must be between 0 and 1 (exclusive), got {pct}"
                )));
            }
        }
        if let Some(pct) = self.take_profit_pct {
            if !(pct > 0.0 && pct.is_finite()) {
                return Err(Error::Config(format!(
                    "TAKE_PROFIT_PCT must be positive, got {pct}"
                )));
            }
        }
        Ok(())
    }
}

/// Turns the configured percentages into trigger prices for each fill.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Trigger prices for the protective legs of a `side` entry at
    /// `reference_price`.
    ///
    /// A long is stopped out below the entry and takes profit above it; a
    /// short is the mirror image. A short target at or below zero is dropped.
    pub fn levels(&self, side: OrderSide, reference_price: f64) -> RiskParams {
        if !(reference_price > 0.0 && reference_price.is_finite()) {
            return RiskParams::none();
        }
        let direction = match side {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        };
        let params = RiskParams {
            stop_loss: self
                .config
                .stop_loss_pct
                .map(|pct| reference_price * (1.0 - direction * pct)),
            take_profit: self
                .config
                .take_profit_pct
                .map(|pct| reference_price * (1.0 + direction * pct))
                .filter(|target| *target > 0.0),
        };
        debug!(
            %side,
            reference_price,
            stop_loss = ?params.stop_loss,
            take_profit = ?params.take_profit,
            "Risk levels computed"
        );
        params
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
