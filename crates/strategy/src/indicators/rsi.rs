/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI):
/// the first average gain/loss is the simple mean of the first `period`
/// changes, every later change is folded in as `(avg * (period - 1) + x) / period`.
#[derive(Debug, Clone, Copy)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// Compute RSI from a slice of close prices (oldest first).
    /// Returns `None` if there are fewer than `period + 1` values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if self.period == 0 || closes.len() < self.period + 1 {
            return None;
        }

        // First average gain/loss over the initial `period` changes
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
            / self.period as f64;

        // Wilder smoothing over remaining changes
        for &change in &changes[self.period..] {
            let gain = if change > 0.0 { change } else { 0.0 };
            let loss = if change < 0.0 { change.abs() } else { 0.0 };
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
        }

        Some(rsi_from_averages(avg_gain, avg_loss))
    }
}

/// Flat market (no gains, no losses) reads as neutral 50.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_returns_none_when_insufficient_data() {
        let rsi = RsiIndicator::new(14);
        // Need at least period+1 = 15 values
        let prices = vec![100.0; 14];
        assert!(rsi.compute(&prices).is_none());
    }

    #[test]
    fn rsi_returns_some_with_sufficient_data() {
        let rsi = RsiIndicator::new(14);
        // 15 values, exactly period+1
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert!(rsi.compute(&prices).is_some());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 0.0).abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_flat_series_is_neutral() {
        let rsi = RsiIndicator::new(14);
        let value = rsi.compute(&[100.0; 20]).unwrap();
        assert_eq!(value, 50.0);
    }

    #[test]
    fn rsi_matches_hand_computed_seed() {
        // 14 changes: one +3.5, one -6.5, twelve flat.
        // avg_gain = 3.5/14, avg_loss = 6.5/14, RS = 7/13, RSI = 35.
        let mut prices = vec![100.0, 103.5, 97.0];
        prices.extend(std::iter::repeat(97.0).take(12));
        assert_eq!(prices.len(), 15);

        let value = RsiIndicator::new(14).compute(&prices).unwrap();
        assert!((value - 35.0).abs() < 1e-9, "Expected 35, got {value}");
    }

    #[test]
    fn rsi_wilder_smoothing_after_seed() {
        // period 2: changes +2, -1, +1
        // seed: gain 1.0, loss 0.5; then gain (1*1+1)/2 = 1.0, loss (0.5*1+0)/2 = 0.25
        // RS = 4, RSI = 80
        let value = RsiIndicator::new(2)
            .compute(&[10.0, 12.0, 11.0, 12.0])
            .unwrap();
        assert!((value - 80.0).abs() < 1e-9, "Expected 80, got {value}");
    }

    #[test]
    fn rsi_known_value() {
        // Reference: 14-period RSI on a known price series
        // Prices sourced from Investopedia RSI example (rounded)
        let rsi = RsiIndicator::new(14);
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09,
        ];
        let v = rsi.compute(&prices).unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI out of range: {v}");
    }
}
