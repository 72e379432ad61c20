use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;

use common::{Action, Candle, Error, Result, Signal, StrategyParameters};

use super::closes;
use crate::indicators::sma_at;
use crate::Strategy;

/// Golden-cross / death-cross strategy on two simple moving averages.
pub struct MovingAverageStrategy {
    params: StrategyParameters,
    settings: MaSettings,
}

#[derive(Debug, Clone, Copy)]
struct MaSettings {
    fast: usize,
    slow: usize,
    /// Percent separation at which a crossover counts as confirmed.
    min_distance_pct: f64,
}

impl MaSettings {
    fn from_params(params: &StrategyParameters) -> Result<Self> {
        let fast = period(params, "fast_period")?;
        let slow = period(params, "slow_period")?;
        if fast >= slow {
            return Err(Error::InvalidParameters(format!(
                "fast period ({fast}) must be less than slow period ({slow})"
            )));
        }
        let min_distance_pct = params
            .get_f64("min_crossover_distance")
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| {
                Error::InvalidParameters("min_crossover_distance must be a non-negative number".into())
            })?;
        Ok(Self {
            fast,
            slow,
            min_distance_pct,
        })
    }
}

fn period(params: &StrategyParameters, key: &str) -> Result<usize> {
    params
        .get_usize(key)
        .filter(|p| *p >= 1)
        .ok_or_else(|| Error::InvalidParameters(format!("{key} must be a whole number >= 1")))
}

/// Classify the move from the previous (fast, slow) pair to the current one.
pub fn determine_crossover(prev_fast: f64, prev_slow: f64, curr_fast: f64, curr_slow: f64) -> Action {
    if prev_fast <= prev_slow && curr_fast > curr_slow {
        Action::Buy
    } else if prev_fast >= prev_slow && curr_fast < curr_slow {
        Action::Sell
    } else {
        Action::Hold
    }
}

impl MovingAverageStrategy {
    pub fn default_parameters() -> StrategyParameters {
        StrategyParameters::new()
            .with("fast_period", 50usize)
            .with("slow_period", 200usize)
            .with("min_crossover_distance", 0.5)
            .with("timeframe", "1d")
    }

    pub fn new() -> Self {
        Self {
            params: Self::default_parameters(),
            settings: MaSettings {
                fast: 50,
                slow: 200,
                min_distance_pct: 0.5,
            },
        }
    }

    pub fn with_parameters(params: &StrategyParameters) -> Result<Self> {
        let mut strategy = Self::new();
        strategy.set_parameters(params)?;
        Ok(strategy)
    }

    fn confidence(fast: f64, slow: f64) -> f64 {
        let reference = fast.max(slow);
        if reference <= 0.0 {
            return 0.0;
        }
        ((fast - slow).abs() / (reference * 0.01)).min(1.0)
    }
}

impl Default for MovingAverageStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MovingAverageStrategy {
    fn name(&self) -> &str {
        "ma"
    }

    fn indicator(&self) -> &str {
        "MA"
    }

    fn min_candles(&self) -> usize {
        self.settings.fast.max(self.settings.slow)
    }

    fn evaluate(&self, candles: &[Candle]) -> Result<Signal> {
        let required = self.min_candles();
        if candles.len() < required {
            return Err(Error::StrategyExecution(format!(
                "MA crossover needs at least {required} candles, got {}",
                candles.len()
            )));
        }

        let closes = closes(candles);
        let last = closes.len() - 1;
        // Both averages are defined from index `slow - 1` on; with a single
        // aligned point the previous pair is the current one.
        let prev = if last >= required { last - 1 } else { last };

        let (fast, slow) = (self.settings.fast, self.settings.slow);
        let pair_at = |idx: usize| -> Result<(f64, f64)> {
            match (sma_at(&closes, fast, idx), sma_at(&closes, slow, idx)) {
                (Some(f), Some(s)) => Ok((f, s)),
                _ => Err(Error::StrategyExecution(format!(
                    "moving averages undefined at index {idx}"
                ))),
            }
        };
        let (curr_fast, curr_slow) = pair_at(last)?;
        let (prev_fast, prev_slow) = pair_at(prev)?;

        let action = determine_crossover(prev_fast, prev_slow, curr_fast, curr_slow);
        let separation_pct = if curr_fast.max(curr_slow) > 0.0 {
            (curr_fast - curr_slow).abs() / curr_fast.max(curr_slow) * 100.0
        } else {
            0.0
        };
        let confirmed = separation_pct >= self.settings.min_distance_pct;
        debug!(curr_fast, curr_slow, prev_fast, prev_slow, %action, "MA crossover evaluated");

        Ok(Signal {
            indicator: self.indicator().to_string(),
            action,
            confidence: Self::confidence(curr_fast, curr_slow),
            values: BTreeMap::from([
                ("fast_ma".to_string(), curr_fast),
                ("slow_ma".to_string(), curr_slow),
                ("separation_pct".to_string(), separation_pct),
                ("confirmed".to_string(), if confirmed { 1.0 } else { 0.0 }),
            ]),
            timestamp: Utc::now(),
        })
    }

    fn set_parameters(&mut self, params: &StrategyParameters) -> Result<()> {
        let mut merged = self.params.clone();
        merged.merge(params);
        self.settings = MaSettings::from_params(&merged)?;
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

    fn fast2_slow4() -> MovingAverageStrategy {
        MovingAverageStrategy::with_parameters(
            &StrategyParameters::new()
                .with("fast_period", 2usize)
                .with("slow_period", 4usize),
        )
        .unwrap()
    }

    #[test]
    fn crossover_rules() {
        assert_eq!(determine_crossover(99.0, 100.0, 101.0, 100.0), Action::Buy);
        assert_eq!(determine_crossover(100.0, 100.0, 100.5, 100.0), Action::Buy);
        assert_eq!(determine_crossover(101.0, 100.0, 99.0, 100.0), Action::Sell);
        assert_eq!(determine_crossover(100.0, 100.0, 99.5, 100.0), Action::Sell);
        assert_eq!(determine_crossover(101.0, 100.0, 102.0, 100.0), Action::Hold);
        assert_eq!(determine_crossover(99.0, 100.0, 98.0, 100.0), Action::Hold);
        assert_eq!(determine_crossover(100.0, 100.0, 100.0, 100.0), Action::Hold);
    }

    #[test]
    fn fast_crossing_above_flat_slow_buys() {
        // fast(2): 99.0 -> 101.0, slow(4): 100.0 -> 100.0
        let candles = candles_from_closes(&[102.0, 100.0, 98.0, 100.0, 102.0]);
        let signal = fast2_slow4().evaluate(&candles).unwrap();

        assert_eq!(signal.action, Action::Buy);
        assert!((signal.value("fast_ma").unwrap() - 101.0).abs() < 1e-9);
        assert!((signal.value("slow_ma").unwrap() - 100.0).abs() < 1e-9);
        // |101 - 100| / (101 * 0.01)
        assert!((signal.confidence - 1.0 / 1.01).abs() < 1e-9);
        assert_eq!(signal.value("confirmed"), Some(1.0));
    }

    #[test]
    fn fast_crossing_below_flat_slow_sells() {
        // fast(2): 101.0 -> 99.0, slow(4): 100.0 -> 100.0
        let candles = candles_from_closes(&[98.0, 100.0, 102.0, 100.0, 98.0]);
        let signal = fast2_slow4().evaluate(&candles).unwrap();
        assert_eq!(signal.action, Action::Sell);
    }

    #[test]
    fn touching_then_rising_counts_as_crossover() {
        // prev fast == prev slow == 100, then fast 102 > slow 101
        let candles = candles_from_closes(&[100.0, 100.0, 100.0, 100.0, 104.0]);
        let signal = fast2_slow4().evaluate(&candles).unwrap();
        assert_eq!(signal.action, Action::Buy);
    }

    #[test]
    fn already_above_holds() {
        // fast 101 > slow 100.5, then fast 103 > slow 101.5
        let candles = candles_from_closes(&[100.0, 100.0, 100.0, 102.0, 104.0]);
        let signal = fast2_slow4().evaluate(&candles).unwrap();
        assert_eq!(signal.action, Action::Hold);
    }

    #[test]
    fn single_aligned_point_holds() {
        let candles = candles_from_closes(&[100.0, 101.0, 102.0, 103.0]);
        let signal = fast2_slow4().evaluate(&candles).unwrap();
        assert_eq!(signal.action, Action::Hold);
    }

    #[test]
    fn too_few_candles_is_an_execution_error() {
        let err = fast2_slow4()
            .evaluate(&candles_from_closes(&[100.0, 101.0, 102.0]))
            .unwrap_err();
        assert!(matches!(err, Error::StrategyExecution(_)));
    }

    #[test]
    fn fast_period_must_be_below_slow_period() {
        let mut strategy = MovingAverageStrategy::new();
        let err = strategy
            .set_parameters(&StrategyParameters::new().with("fast_period", 200usize))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameters(_)));
        assert_eq!(strategy.parameters().get_usize("fast_period"), Some(50));
        assert_eq!(strategy.min_candles(), 200);
        assert_eq!(strategy.lookback(), 400);
    }

    #[test]
    fn small_separation_is_reported_unconfirmed() {
        // fast 100.25 vs slow 100.125 -> separation well under 0.5%
        let candles = candles_from_closes(&[100.0, 100.0, 100.0, 100.0, 100.5]);
        let signal = fast2_slow4().evaluate(&candles).unwrap();
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.value("confirmed"), Some(0.0));
        assert!(signal.confidence < 1.0);
    }
}
