use serde::Serialize;
use tracing::info;

use common::{Action, Candle, Error, Result};

use crate::Strategy;

/// Aggregate outcome of replaying a strategy over historical candles.
///
/// Returns are simple fractional returns per closed round trip; drawdown is
/// measured on the running sum of those returns, so an open position at the
/// end of the series never affects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestReport {
    pub points: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub longest_winning_streak: usize,
    pub longest_losing_streak: usize,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub position_open: bool,
}

#[derive(Debug, Clone, Copy)]
enum Position {
    Long(f64),
    Short(f64),
}

#[derive(Debug, Default)]
struct Streak {
    wins: bool,
    len: usize,
}

/// Replay `strategy` candle by candle: each prefix long enough for the
/// strategy is evaluated once, as the live worker would have seen it.
pub fn backtest(strategy: &dyn Strategy, candles: &[Candle]) -> Result<BacktestReport> {
    let start = strategy.min_candles();
    if candles.len() < start {
        return Err(Error::StrategyExecution(format!(
            "backtest needs at least {start} candles, got {}",
            candles.len()
        )));
    }

    let mut report = BacktestReport::default();
    let mut position: Option<Position> = None;
    let mut streak = Streak::default();
    let mut peak = 0.0_f64;

    for end in start..=candles.len() {
        let signal = strategy.evaluate(&candles[..end])?;
        let price = candles[end - 1].close;
        report.points += 1;

        match signal.action {
            Action::Buy => report.buy_signals += 1,
            Action::Sell => report.sell_signals += 1,
            Action::Hold => continue,
        }

        let closed = match (position, signal.action) {
            (None, Action::Buy) => {
                position = Some(Position::Long(price));
                None
            }
            (None, Action::Sell) => {
                position = Some(Position::Short(price));
                None
            }
            (Some(Position::Long(entry)), Action::Sell) => Some((price - entry) / entry),
            (Some(Position::Short(entry)), Action::Buy) => Some((entry - price) / entry),
            _ => None,
        };

        if let Some(ret) = closed {
            position = None;
            report.total_trades += 1;
            report.total_return += ret;

            let won = ret > 0.0;
            if won {
                report.winning_trades += 1;
            } else {
                report.losing_trades += 1;
            }
            streak.len = if streak.len > 0 && streak.wins == won { streak.len + 1 } else { 1 };
            streak.wins = won;
            if won {
                report.longest_winning_streak = report.longest_winning_streak.max(streak.len);
            } else {
                report.longest_losing_streak = report.longest_losing_streak.max(streak.len);
            }

            peak = peak.max(report.total_return);
            report.max_drawdown = report.max_drawdown.max(peak - report.total_return);
        }
    }

    report.position_open = position.is_some();
    info!(
        strategy = strategy.name(),
        points = report.points,
        trades = report.total_trades,
        total_return = report.total_return,
        max_drawdown = report.max_drawdown,
        "Backtest complete"
    );
    Ok(report)
}
