/// Simple moving average of the trailing `period` values of `data`.
/// Returns `None` if there isn't enough data.
pub fn sma(data: &[f64], period: usize) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    sma_at(data, period, data.len() - 1)
}

/// Simple moving average of the `period` values ending at index `end`
/// (inclusive).
pub fn sma_at(data: &[f64], period: usize, end: usize) -> Option<f64> {
    if period == 0 || end >= data.len() || end + 1 < period {
        return None;
    }
    let window = &data[end + 1 - period..=end];
    Some(window.iter().sum::<f64>() / period as f64)
}
