use proptest::prelude::*;

use common::{Action, Candle};
use strategy::indicators::RsiIndicator;
use strategy::{RsiStrategy, Strategy};

fn candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: i as i64 * 3_600_000,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

/// Strictly monotonic series built from a start price and positive steps.
fn walk(start: f64, steps: &[f64], up: bool) -> Vec<f64> {
    let mut prices = vec![start];
    for step in steps {
        let last = *prices.last().unwrap();
        prices.push(if up { last + step } else { last - step });
    }
    prices
}

proptest! {
    /// RSI stays inside [0, 100] for any positive price series.
    #[test]
    fn rsi_is_bounded(
        period in 2usize..30,
        prices in prop::collection::vec(0.01f64..1_000_000.0, 31..120),
    ) {
        let value = RsiIndicator::new(period).compute(&prices).unwrap();
        prop_assert!((0.0..=100.0).contains(&value), "RSI out of range: {}", value);
    }

    /// A strictly rising market pins RSI at 100 and the strategy sells.
    #[test]
    fn strictly_increasing_closes_reach_100(
        period in 2usize..30,
        steps in prop::collection::vec(0.01f64..50.0, 30..100),
    ) {
        let prices = walk(100.0, &steps, true);
        let value = RsiIndicator::new(period).compute(&prices).unwrap();
        prop_assert!((value - 100.0).abs() < 1e-9, "expected 100, got {}", value);

        let signal = RsiStrategy::new().evaluate(&candles(&prices)).unwrap();
        prop_assert_eq!(signal.action, Action::Sell);
    }

    /// A strictly falling market pins RSI at 0 and the strategy buys.
    #[test]
    fn strictly_decreasing_closes_reach_0(
        period in 2usize..30,
        steps in prop::collection::vec(0.01f64..5.0, 30..100),
    ) {
        let prices = walk(1_000.0, &steps, false);
        let value = RsiIndicator::new(period).compute(&prices).unwrap();
        prop_assert!(value.abs() < 1e-9, "expected 0, got {}", value);

        let signal = RsiStrategy::new().evaluate(&candles(&prices)).unwrap();
        prop_assert_eq!(signal.action, Action::Buy);
        prop_assert!((0.0..=1.0).contains(&signal.confidence));
    }

    /// Adding one more up-move to a rising series never lowers RSI.
    #[test]
    fn rsi_rises_with_each_gain_after_a_loss(
        steps in prop::collection::vec(0.01f64..5.0, 20..40),
        drop in 0.5f64..20.0,
    ) {
        let mut prices = walk(500.0, &steps, true);
        let last = *prices.last().unwrap();
        prices.push(last - drop);
        let indicator = RsiIndicator::new(14);
        let mut previous = indicator.compute(&prices).unwrap();
        for _ in 0..10 {
            let last = *prices.last().unwrap();
            prices.push(last + 1.0);
            let value = indicator.compute(&prices).unwrap();
            prop_assert!(value >= previous - 1e-12);
            prop_assert!(value <= 100.0);
            previous = value;
        }
    }
}
