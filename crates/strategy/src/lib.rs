pub mod backtest;
pub mod config;
pub mod indicators;
pub mod registry;
pub mod strategies;

pub use backtest::{backtest, BacktestReport};
pub use config::StrategyFileConfig;
pub use registry::{build_strategy, StrategyKind};
pub use strategies::{MovingAverageStrategy, RsiStrategy};

use common::{Action, Candle, Notification, Result, Signal, StrategyParameters};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Identifier of this strategy (e.g. "rsi").
    fn name(&self) -> &str;

    /// Indicator label stamped on every signal (e.g. "RSI").
    fn indicator(&self) -> &str;

    /// Fewest candles `evaluate` accepts with the current parameters.
    fn min_candles(&self) -> usize;

    /// How many candles the worker requests per cycle.
    fn lookback(&self) -> usize {
        self.min_candles() * 2
    }

    /// Evaluate a candle series (oldest first) with the current parameters.
    fn evaluate(&self, candles: &[Candle]) -> Result<Signal>;

    /// Overlay `params` on the current parameters, then evaluate.
    fn execute(&mut self, candles: &[Candle], params: &StrategyParameters) -> Result<Signal> {
        if !params.is_empty() {
            self.set_parameters(params)?;
        }
        self.evaluate(candles)
    }

    /// True iff the series produces a BUY or SELL.
    fn should_execute(&self, candles: &[Candle]) -> Result<bool> {
        Ok(self.evaluate(candles)?.action != Action::Hold)
    }

    /// Overlay-merge `params` and validate. On failure the previous
    /// parameters stay in effect.
    fn set_parameters(&mut self, params: &StrategyParameters) -> Result<()>;

    fn parameters(&self) -> &StrategyParameters;

    /// Human-readable summary of a signal for the notification channels.
    fn notification(&self, signal: &Signal) -> Notification {
        let params = self.parameters();
        let mut n = Notification::success(format!("{} signal: {}", signal.indicator, signal.action))
            .with("symbol", params.get_str("symbol").unwrap_or("N/A"))
            .with("timeframe", params.get_str("timeframe").unwrap_or("N/A"))
            .with("confidence", format!("{:.0}%", signal.confidence * 100.0));
        for (name, value) in &signal.values {
            n = n.with(name.as_str(), format!("{value:.2}"));
        }
        n
    }
}
