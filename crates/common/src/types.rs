use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV bucket as returned by the exchange. Timestamp is the bucket open
/// time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }
}

/// A trading pair in `BASE/QUOTE` form, e.g. `BTC/USDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: String,
    pub quote: String,
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Exchange wire form without separator (`BTCUSDT`).
    pub fn concatenated(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl std::str::FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('/') => {
                Ok(Symbol::new(base, quote))
            }
            _ => Err(Error::Config(format!(
                "symbol must look like BASE/QUOTE (e.g. BTC/USDT), got '{s}'"
            ))),
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A single named strategy option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Number(v as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

/// Named options owned by a strategy instance. Updates overlay existing keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyParameters(BTreeMap<String, ParamValue>);

impl StrategyParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Overlay `other` on top of `self`; keys absent from `other` are kept.
    pub fn merge(&mut self, other: &StrategyParameters) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Numeric value of `key`. Text values that parse as numbers are accepted.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get_f64(key)
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as usize)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a strategy recommends doing with the latest candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn side(&self) -> Option<OrderSide> {
        match self {
            Action::Buy => Some(OrderSide::Buy),
            Action::Sell => Some(OrderSide::Sell),
            Action::Hold => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Output of one strategy evaluation. Consumed immediately by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub indicator: String,
    pub action: Action,
    /// Normalized strength in `[0, 1]`.
    pub confidence: f64,
    /// Indicator readings, e.g. `rsi` or `fast_ma` / `slow_ma`.
    pub values: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "market"),
            OrderKind::StopLoss => write!(f, "stop-loss"),
            OrderKind::TakeProfit => write!(f, "take-profit"),
        }
    }
}

/// Exchange acknowledgment of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub amount: f64,
    /// Average fill price for market orders, trigger price for risk legs.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Stop-loss / take-profit orders attached after the fill.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_legs: Vec<Order>,
}

impl Order {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        kind: OrderKind,
        amount: f64,
        price: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            kind,
            amount,
            price,
            timestamp: Utc::now(),
            risk_legs: Vec::new(),
        }
    }
}

/// Optional trigger prices for protective orders placed after a fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl RiskParams {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Account balances per currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balances {
    pub free: HashMap<String, f64>,
    pub used: HashMap<String, f64>,
    pub total: HashMap<String, f64>,
}

impl Balances {
    pub fn free_of(&self, currency: &str) -> f64 {
        self.free.get(currency).copied().unwrap_or(0.0)
    }
}

/// An outbound message for the notification channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub is_success: bool,
    /// Ordered key/value details rendered under the message.
    pub context: Vec<(String, String)>,
    pub enqueued_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, is_success: bool) -> Self {
        Self {
            message: message.into(),
            is_success,
            context: Vec::new(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, true)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, false)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Where the worker loop currently is within a polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Fetching,
    Deciding,
    Executing,
    Notifying,
    Sleeping,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Fetching => write!(f, "fetching"),
            WorkerState::Deciding => write!(f, "deciding"),
            WorkerState::Executing => write!(f, "executing"),
            WorkerState::Notifying => write!(f, "notifying"),
            WorkerState::Sleeping => write!(f, "sleeping"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_parses_base_and_quote() {
        let s: Symbol = "btc/usdt".parse().unwrap();
        assert_eq!(s.base, "BTC");
        assert_eq!(s.quote, "USDT");
        assert_eq!(s.to_string(), "BTC/USDT");
        assert_eq!(s.concatenated(), "BTCUSDT");
    }

    #[test]
    fn symbol_rejects_missing_separator() {
        assert!("BTCUSDT".parse::<Symbol>().is_err());
        assert!("/USDT".parse::<Symbol>().is_err());
        assert!("A/B/C".parse::<Symbol>().is_err());
    }

    #[test]
    fn parameters_merge_overlays_without_dropping_keys() {
        let mut params = StrategyParameters::new()
            .with("period", 14usize)
            .with("timeframe", "1h");
        params.merge(&StrategyParameters::new().with("period", 21usize));

        assert_eq!(params.get_usize("period"), Some(21));
        assert_eq!(params.get_str("timeframe"), Some("1h"));
    }

    #[test]
    fn parameters_deserialize_from_toml_numbers_and_strings() {
        let params: StrategyParameters =
            serde_json::from_str(r#"{"period": 14, "oversold": 40.5, "symbol": "BTC/USDT"}"#)
                .unwrap();
        assert_eq!(params.get_usize("period"), Some(14));
        assert_eq!(params.get_f64("oversold"), Some(40.5));
        assert_eq!(params.get_str("symbol"), Some("BTC/USDT"));
        assert_eq!(params.get_usize("oversold"), None);
    }

    #[test]
    fn notification_context_keeps_insertion_order() {
        let n = Notification::success("filled")
            .with("symbol", "BTC/USDT")
            .with("amount", 0.01);
        assert_eq!(n.context[0].0, "symbol");
        assert_eq!(n.context[1], ("amount".to_string(), "0.01".to_string()));
    }

    #[test]
    fn action_maps_to_order_side() {
        assert_eq!(Action::Buy.side(), Some(OrderSide::Buy));
        assert_eq!(Action::Sell.side().map(|s| s.opposite()), Some(OrderSide::Buy));
        assert_eq!(Action::Hold.side(), None);
    }
}
