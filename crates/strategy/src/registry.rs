use std::str::FromStr;

use tracing::info;

use common::{Error, Result, StrategyParameters};

use crate::config::StrategyFileConfig;
use crate::{MovingAverageStrategy, RsiStrategy, Strategy};

/// Strategies the worker can run, resolved from configuration at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Rsi,
    MovingAverage,
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rsi" => Ok(StrategyKind::Rsi),
            "ma" | "moving_average" | "moving-average" => Ok(StrategyKind::MovingAverage),
            other => Err(Error::Config(format!(
                "unknown strategy '{other}' (expected rsi or ma)"
            ))),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Rsi => write!(f, "rsi"),
            StrategyKind::MovingAverage => write!(f, "ma"),
        }
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

/// Build a strategy from its built-in defaults, overlaid by the parameter
/// file's table for that strategy, overlaid by `overrides`.
pub fn build_strategy(
    kind: StrategyKind,
    file_cfg: &StrategyFileConfig,
    overrides: &StrategyParameters,
) -> Result<Box<dyn Strategy>> {
    let mut strategy: Box<dyn Strategy> = match kind {
        StrategyKind::Rsi => Box::new(RsiStrategy::with_parameters(&file_cfg.rsi)?),
        StrategyKind::MovingAverage => {
            Box::new(MovingAverageStrategy::with_parameters(&file_cfg.moving_average)?)
        }
    };
    strategy.set_parameters(overrides)?;

    let params: Vec<String> = strategy
        .parameters()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    info!(strategy = %kind, params = %params.join(" "), "Strategy configured");
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_names() {
        assert_eq!("rsi".parse::<StrategyKind>().unwrap(), StrategyKind::Rsi);
        assert_eq!("MA".parse::<StrategyKind>().unwrap(), StrategyKind::MovingAverage);
        assert_eq!(
            "moving_average".parse::<StrategyKind>().unwrap(),
            StrategyKind::MovingAverage
        );
        assert!("macd".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn overrides_win_over_file_values() {
        let file_cfg = StrategyFileConfig {
            rsi: StrategyParameters::new()
                .with("period", 21usize)
                .with("timeframe", "4h"),
            ..Default::default()
        };
        let overrides = StrategyParameters::new()
            .with("symbol", "BTC/USDT")
            .with("timeframe", "1h");

        let strategy = build_strategy(StrategyKind::Rsi, &file_cfg, &overrides).unwrap();
        let params = strategy.parameters();
        assert_eq!(strategy.name(), "rsi");
        assert_eq!(params.get_usize("period"), Some(21));
        assert_eq!(params.get_str("timeframe"), Some("1h"));
        assert_eq!(params.get_str("symbol"), Some("BTC/USDT"));
    }

    #[test]
    fn invalid_file_parameters_fail_the_build() {
        let file_cfg = StrategyFileConfig {
            moving_average: StrategyParameters::new()
                .with("fast_period", 300usize)
                .with("slow_period", 200usize),
            ..Default::default()
        };
        let result = build_strategy(
            StrategyKind::MovingAverage,
            &file_cfg,
            &StrategyParameters::new(),
        );
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
    }
}
