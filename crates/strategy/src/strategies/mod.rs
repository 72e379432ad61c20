mod moving_average;
mod rsi;

pub use moving_average::{determine_crossover, MovingAverageStrategy};
pub use rsi::RsiStrategy;

use common::Candle;

fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

#[cfg(test)]
pub(crate) fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: 1_700_000_000_000 + i as i64 * 60_000,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}
