use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;

use common::{Action, Candle, Error, Result, Signal, StrategyParameters};

use super::closes;
use crate::indicators::RsiIndicator;
use crate::Strategy;

/// Buys when RSI falls to the oversold threshold and sells when it reaches
/// the overbought threshold.
pub struct RsiStrategy {
    params: StrategyParameters,
    settings: RsiSettings,
}

#[derive(Debug, Clone, Copy)]
struct RsiSettings {
    period: usize,
    oversold: f64,
    overbought: f64,
    neutral: f64,
}

impl RsiSettings {
    fn from_params(params: &StrategyParameters) -> Result<Self> {
        let period = params
            .get_usize("period")
            .ok_or_else(|| Error::InvalidParameters("RSI period must be a whole number".into()))?;
        let oversold = number(params, "oversold")?;
        let overbought = number(params, "overbought")?;
        let neutral = number(params, "neutral")?;

        if period < 2 {
            return Err(Error::InvalidParameters(format!(
                "RSI period must be >= 2, got {period}"
            )));
        }
        if oversold >= overbought {
            return Err(Error::InvalidParameters(format!(
                "oversold threshold ({oversold}) must be below overbought threshold ({overbought})"
            )));
        }
        if oversold >= neutral {
            return Err(Error::InvalidParameters(format!(
                "oversold threshold ({oversold}) must be below neutral level ({neutral})"
            )));
        }
        Ok(Self {
            period,
            oversold,
            overbought,
            neutral,
        })
    }
}

fn number(params: &StrategyParameters, key: &str) -> Result<f64> {
    params
        .get_f64(key)
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidParameters(format!("RSI parameter '{key}' must be numeric")))
}

/// Accept the `*_threshold` spellings used by older parameter files.
fn normalize_aliases(params: &StrategyParameters) -> StrategyParameters {
    let mut out = params.clone();
    for (alias, key) in [
        ("oversold_threshold", "oversold"),
        ("overbought_threshold", "overbought"),
    ] {
        if out.get(key).is_none() {
            if let Some(v) = params.get(alias) {
                out.set(key, v.clone());
            }
        }
    }
    out
}

impl RsiStrategy {
    pub fn default_parameters() -> StrategyParameters {
        StrategyParameters::new()
            .with("period", 14usize)
            .with("oversold", 40.0)
            .with("overbought", 70.0)
            .with("neutral", 50.0)
            .with("timeframe", "1h")
    }

    pub fn new() -> Self {
        let params = Self::default_parameters();
        let settings = RsiSettings {
            period: 14,
            oversold: 40.0,
            overbought: 70.0,
            neutral: 50.0,
        };
        Self { params, settings }
    }

    pub fn with_parameters(params: &StrategyParameters) -> Result<Self> {
        let mut strategy = Self::new();
        strategy.set_parameters(params)?;
        Ok(strategy)
    }

    fn determine_action(&self, rsi: f64) -> Action {
        if rsi <= self.settings.oversold {
            Action::Buy
        } else if rsi >= self.settings.overbought {
            Action::Sell
        } else {
            Action::Hold
        }
    }

    fn confidence(&self, rsi: f64) -> f64 {
        let distance = (rsi - self.settings.neutral).abs();
        let max_distance = self.settings.neutral - self.settings.oversold;
        (distance / max_distance).min(1.0)
    }
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    fn indicator(&self) -> &str {
        "RSI"
    }

    fn min_candles(&self) -> usize {
        self.settings.period + 1
    }

    fn evaluate(&self, candles: &[Candle]) -> Result<Signal> {
        let period = self.settings.period;
        let rsi = RsiIndicator::new(period)
            .compute(&closes(candles))
            .ok_or_else(|| {
                Error::StrategyExecution(format!(
                    "RSI {period} needs at least {} candles, got {}",
                    period + 1,
                    candles.len()
                ))
            })?;

        let action = self.determine_action(rsi);
        debug!(rsi, %action, "RSI evaluated");

        Ok(Signal {
            indicator: self.indicator().to_string(),
            action,
            confidence: self.confidence(rsi),
            values: BTreeMap::from([("rsi".to_string(), rsi)]),
            timestamp: Utc::now(),
        })
    }

    fn set_parameters(&mut self, params: &StrategyParameters) -> Result<()> {
        let mut merged = self.params.clone();
        merged.merge(&normalize_aliases(params));
        self.settings = RsiSettings::from_params(&merged)?;
        self.params = merged;
        Ok(())
    }

    fn parameters(&self) -> &StrategyParameters {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::candles_from_closes;

    /// 15 closes whose 14-period RSI is exactly 35.
    fn rsi_35_series() -> Vec<Candle> {
        let mut closes = vec![100.0, 103.5, 97.0];
        closes.extend(std::iter::repeat(97.0).take(12));
        candles_from_closes(&closes)
    }

    #[test]
    fn rsi_35_with_oversold_40_buys_with_full_confidence() {
        let strategy = RsiStrategy::new();
        let signal = strategy.evaluate(&rsi_35_series()).unwrap();

        assert_eq!(signal.indicator, "RSI");
        assert_eq!(signal.action, Action::Buy);
        assert!((signal.value("rsi").unwrap() - 35.0).abs() < 1e-9);
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn rising_market_sells() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let signal = RsiStrategy::new()
            .evaluate(&candles_from_closes(&closes))
            .unwrap();
        assert_eq!(signal.action, Action::Sell);
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn flat_market_holds_with_zero_confidence() {
        let strategy = RsiStrategy::new();
        let candles = candles_from_closes(&[100.0; 20]);
        let signal = strategy.evaluate(&candles).unwrap();
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.confidence, 0.0);
        assert!(!strategy.should_execute(&candles).unwrap());
    }

    #[test]
    fn too_few_candles_is_an_execution_error() {
        let err = RsiStrategy::new()
            .evaluate(&candles_from_closes(&[100.0; 14]))
            .unwrap_err();
        assert!(matches!(err, Error::StrategyExecution(_)));
    }

    #[test]
    fn inverted_thresholds_are_rejected_and_previous_parameters_kept() {
        let mut strategy = RsiStrategy::new();
        let err = strategy
            .set_parameters(&StrategyParameters::new().with("oversold", 80.0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameters(_)));
        assert_eq!(strategy.parameters().get_f64("oversold"), Some(40.0));
        assert_eq!(strategy.min_candles(), 15);
    }

    #[test]
    fn set_parameters_overlays_and_accepts_threshold_alias() {
        let mut strategy = RsiStrategy::new();
        strategy
            .set_parameters(
                &StrategyParameters::new()
                    .with("period", 7usize)
                    .with("oversold_threshold", 30.0)
                    .with("symbol", "ETH/USDT"),
            )
            .unwrap();

        let params = strategy.parameters();
        assert_eq!(params.get_usize("period"), Some(7));
        assert_eq!(params.get_f64("oversold"), Some(30.0));
        assert_eq!(params.get_f64("overbought"), Some(70.0));
        assert_eq!(params.get_str("symbol"), Some("ETH/USDT"));
        assert_eq!(strategy.lookback(), 16);
    }

    #[test]
    fn execute_applies_overrides_before_evaluating() {
        let mut strategy = RsiStrategy::new();
        // RSI 35 is no longer oversold once the threshold drops to 30.
        let signal = strategy
            .execute(
                &rsi_35_series(),
                &StrategyParameters::new().with("oversold", 30.0),
            )
            .unwrap();
        assert_eq!(signal.action, Action::Hold);
        // |35 - 50| / (50 - 30)
        assert!((signal.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn notification_summarises_signal() {
        let mut strategy = RsiStrategy::new();
        strategy
            .set_parameters(&StrategyParameters::new().with("symbol", "BTC/USDT"))
            .unwrap();
        let signal = strategy.evaluate(&rsi_35_series()).unwrap();
        let n = strategy.notification(&signal);

        assert_eq!(n.message, "RSI signal: BUY");
        assert!(n.context.contains(&("symbol".to_string(), "BTC/USDT".to_string())));
        assert!(n.context.contains(&("rsi".to_string(), "35.00".to_string())));
        assert!(n.context.contains(&("confidence".to_string(), "100%".to_string())));
    }
}
