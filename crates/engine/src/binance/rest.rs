use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::debug;

use common::{
    Balances, Candle, Error, ExchangeClient, Order, OrderKind, OrderSide, Result, Symbol,
};

const BASE_URL: &str = "https://api.binance.com";
const TESTNET_URL: &str = "https://testnet.binance.vision";

struct Credentials {
    api_key: String,
    secret: String,
}

/// Spot REST client for Binance.
///
/// Public endpoints (klines, time, ticker, exchangeInfo) work without
/// credentials; account and order endpoints are HMAC-SHA256 signed.
pub struct BinanceClient {
    base_url: String,
    credentials: Option<Credentials>,
    http: Client,
    rules: RwLock<HashMap<String, SymbolRules>>,
}

/// Trading rules for one symbol from the exchangeInfo filters.
#[derive(Debug, Clone, Default, PartialEq)]
struct SymbolRules {
    min_notional: f64,
    step_size: Option<String>,
    tick_size: Option<String>,
}

impl SymbolRules {
    fn from_info(info: &ExchangeInfoResponse) -> Self {
        let filters = || info.symbols.iter().flat_map(|s| s.filters.iter());
        Self {
            min_notional: min_notional(info),
            step_size: filters()
                .filter(|f| f.filter_type == "LOT_SIZE")
                .find_map(|f| f.step_size.clone()),
            tick_size: filters()
                .filter(|f| f.filter_type == "PRICE_FILTER")
                .find_map(|f| f.tick_size.clone()),
        }
    }

    /// Quantity rounded down to the lot step.
    fn quantity(&self, amount: f64) -> String {
        to_increment(amount, self.step_size.as_deref(), f64::floor)
    }

    /// Trigger price rounded to the nearest tick.
    fn price(&self, price: f64) -> String {
        to_increment(price, self.tick_size.as_deref(), f64::round)
    }
}

/// Render `value` as a multiple of `increment` (a decimal string such as
/// `"0.00001000"`) with no more decimals than the increment carries.
fn to_increment(value: f64, increment: Option<&str>, snap: fn(f64) -> f64) -> String {
    let step = increment
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| *s > 0.0 && s.is_finite());
    let (Some(step), Some(text)) = (step, increment) else {
        return trim_decimal(format!("{value:.8}"));
    };
    let decimals = text
        .split_once('.')
        .map(|(_, frac)| frac.trim_end_matches('0').len())
        .unwrap_or(0);
    // Nudge before snapping so 0.3 / 0.1 = 2.9999999999999996 stays 3 steps.
    let units = snap(value / step + 1e-9);
    format!("{:.*}", decimals, units * step)
}

fn trim_decimal(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

impl BinanceClient {
    /// Authenticated client for live trading.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, testnet: bool) -> Result<Self> {
        let mut client = Self::public(testnet)?;
        client.credentials = Some(Credentials {
            api_key: api_key.into(),
            secret: secret.into(),
        });
        Ok(client)
    }

    /// Client for the unauthenticated market data endpoints only.
    pub fn public(testnet: bool) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Connection(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: if testnet { TESTNET_URL } else { BASE_URL }.to_string(),
            credentials: None,
            http,
            rules: RwLock::new(HashMap::new()),
        })
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            Error::Config("Binance API key and secret are required for account endpoints".into())
        })
    }

    fn sign(secret: &str, query: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid Binance secret: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, params: &str) -> Result<(String, &Credentials)> {
        let creds = self.credentials()?;
        let ts = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = Self::sign(&creds.secret, &query)?;
        Ok((format!("{query}&signature={signature}"), creds))
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{params}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let (query, creds) = self.signed_query(params)?;
        let url = format!("{}{path}?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let (body, creds) = self.signed_query(params)?;
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        read_body(resp).await
    }

    /// exchangeInfo filters for `symbol`, fetched once per client.
    async fn symbol_rules(&self, symbol: &Symbol) -> Result<SymbolRules> {
        let key = symbol.concatenated();
        if let Some(rules) = self.rules.read().await.get(&key) {
            return Ok(rules.clone());
        }
        let body = self
            .public_get("/api/v3/exchangeInfo", &format!("symbol={key}"))
            .await?;
        let info: ExchangeInfoResponse = parse(&body)?;
        let rules = SymbolRules::from_info(&info);
        self.rules.write().await.insert(key, rules.clone());
        Ok(rules)
    }

    async fn place(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        kind: OrderKind,
        amount: f64,
        trigger: Option<f64>,
    ) -> Result<Order> {
        let order_type = match kind {
            OrderKind::Market => "MARKET",
            OrderKind::StopLoss => "STOP_LOSS",
            OrderKind::TakeProfit => "TAKE_PROFIT",
        };
        let rules = self.symbol_rules(symbol).await?;
        let quantity = rules.quantity(amount);
        let amount = quantity.parse::<f64>().unwrap_or(0.0);
        if amount <= 0.0 {
            return Err(Error::OrderValidation(format!(
                "quantity rounds to zero at lot step {}",
                rules.step_size.as_deref().unwrap_or("?")
            )));
        }

        let mut params = format!(
            "symbol={}&side={side}&type={order_type}&quantity={quantity}",
            symbol.concatenated()
        );
        let trigger = match trigger {
            Some(price) => {
                let stop_price = rules.price(price);
                params.push_str(&format!("&stopPrice={stop_price}"));
                Some(stop_price.parse::<f64>().unwrap_or(price))
            }
            None => None,
        };

        debug!(symbol = %symbol, %side, %kind, %quantity, "Submitting order to Binance");
        let body = self.signed_post("/api/v3/order", &params).await?;
        let resp: OrderResponse = parse(&body)?;

        let price = match trigger {
            Some(p) => p,
            None => resp.average_price(),
        };
        let mut order = Order::new(symbol.to_string(), side, kind, amount, price);
        order.id = resp.order_id.to_string();
        if let Some(ts) = resp.transact_time.and_then(|t| Utc.timestamp_millis_opt(t).single()) {
            order.timestamp = ts;
        }
        Ok(order)
    }
}

/// Map the HTTP outcome onto the error taxonomy: rate limits and server
/// errors are transient, balance and filter failures are order validation
/// errors, anything else is a rejection.
async fn read_body(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_status(status, &body))
    }
}

fn classify_status(status: StatusCode, body: &str) -> Error {
    let message = format!("HTTP {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 418
        || status.is_server_error()
    {
        return Error::Exchange(message);
    }
    match serde_json::from_str::<ApiError>(body).map(|e| e.code) {
        // -2010 insufficient balance or order rejected, -1013 filter failure
        Ok(-2010 | -1013) => Error::OrderValidation(message),
        _ => Error::Rejected(message),
    }
}

fn parse<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::Exchange(format!("Unexpected response: {e}")))
}

fn decimal(value: &Value, field: &str) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::Exchange(format!("kline field '{field}' is not a number: {value}")))
}

/// Klines come back as positional arrays:
/// `[openTime, open, high, low, close, volume, closeTime, ...]`.
fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = parse(body)?;
    rows.iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(Error::Exchange(format!(
                    "kline row has {} fields, expected at least 6",
                    row.len()
                )));
            }
            Ok(Candle {
                timestamp: row[0]
                    .as_i64()
                    .ok_or_else(|| Error::Exchange("kline open time is not an integer".into()))?,
                open: decimal(&row[1], "open")?,
                high: decimal(&row[2], "high")?,
                low: decimal(&row[3], "low")?,
                close: decimal(&row[4], "close")?,
                volume: decimal(&row[5], "volume")?,
            })
        })
        .collect()
}

/// Smallest order value allowed by the NOTIONAL or MIN_NOTIONAL filter,
/// or 0 when the symbol has neither.
fn min_notional(info: &ExchangeInfoResponse) -> f64 {
    info.symbols
        .iter()
        .flat_map(|s| s.filters.iter())
        .filter(|f| matches!(f.filter_type.as_str(), "NOTIONAL" | "MIN_NOTIONAL"))
        .filter_map(|f| f.min_notional.as_deref()?.parse::<f64>().ok())
        .fold(0.0, f64::max)
}

fn balances_from(account: AccountResponse) -> Balances {
    let mut balances = Balances::default();
    for b in account.balances {
        let free = b.free.parse::<f64>().unwrap_or(0.0);
        let locked = b.locked.parse::<f64>().unwrap_or(0.0);
        if free == 0.0 && locked == 0.0 {
            continue;
        }
        balances.free.insert(b.asset.clone(), free);
        balances.used.insert(b.asset.clone(), locked);
        balances.total.insert(b.asset, free + locked);
    }
    balances
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn market_data(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let params = format!(
            "symbol={}&interval={timeframe}&limit={limit}",
            symbol.concatenated()
        );
        let body = self.public_get("/api/v3/klines", &params).await?;
        parse_klines(&body)
    }

    async fn server_time(&self) -> Result<i64> {
        let body = self.public_get("/api/v3/time", "").await?;
        let resp: ServerTime = parse(&body)?;
        Ok(resp.server_time)
    }

    async fn balances(&self) -> Result<Balances> {
        let body = self.signed_get("/api/v3/account", "").await?;
        let account: AccountResponse = parse(&body)?;
        Ok(balances_from(account))
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<f64> {
        let params = format!("symbol={}", symbol.concatenated());
        let body = self.public_get("/api/v3/ticker/price", &params).await?;
        let ticker: PriceTicker = parse(&body)?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::Exchange(format!("ticker price: {e}")))
    }

    async fn min_order_size(&self, symbol: &Symbol) -> Result<f64> {
        Ok(self.symbol_rules(symbol).await?.min_notional)
    }

    async fn execute_order(&self, symbol: &Symbol, side: OrderSide, amount: f64) -> Result<Order> {
        self.place(symbol, side, OrderKind::Market, amount, None).await
    }

    async fn create_stop_loss_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        stop_price: f64,
        side: OrderSide,
    ) -> Result<Order> {
        self.place(symbol, side, OrderKind::StopLoss, amount, Some(stop_price))
            .await
    }

    async fn create_take_profit_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        target_price: f64,
        side: OrderSide,
    ) -> Result<Order> {
        self.place(symbol, side, OrderKind::TakeProfit, amount, Some(target_price))
            .await
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    transact_time: Option<i64>,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

impl OrderResponse {
    fn average_price(&self) -> f64 {
        let qty = self.executed_qty.as_deref().and_then(|q| q.parse::<f64>().ok());
        let quote = self
            .cummulative_quote_qty
            .as_deref()
            .and_then(|q| q.parse::<f64>().ok());
        match (qty, quote) {
            (Some(q), Some(v)) if q > 0.0 => v / q,
            _ => self
                .fills
                .first()
                .and_then(|f| f.price.parse::<f64>().ok())
                .unwrap_or(0.0),
        }
    }
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
}

#[derive(Deserialize)]
struct FillDetail {
    price: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTime {
    server_time: i64,
}

#[derive(Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
struct SymbolInfo {
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    min_notional: Option<String>,
    #[serde(default)]
    step_size: Option<String>,
    #[serde(default)]
    tick_size: Option<String>,
}
