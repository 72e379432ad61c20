use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use common::{Candle, Config, Error, ExchangeClient, Result, RetryPolicy, Symbol};

/// Latest candle may be at most this far ahead of the exchange clock.
const FUTURE_TOLERANCE_MS: i64 = 60_000;
const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    exchange: String,
    symbol: String,
    data_type: &'static str,
    timeframe: String,
    limit: usize,
}

struct CacheEntry {
    candles: Vec<Candle>,
    fetched_at: Instant,
}

/// Oldest the latest candle may be, per timeframe, before the series is
/// considered stale.
pub fn max_age_ms(timeframe: &str) -> i64 {
    let minutes = match timeframe {
        "1m" => 2,
        "5m" => 10,
        "15m" => 30,
        "1h" => 5 * 60,
        "4h" => 20 * 60,
        "1d" => 24 * 60,
        _ => 5,
    };
    minutes * MINUTE_MS
}

/// Check a freshly fetched series before it is cached or handed out.
pub fn validate(candles: &[Candle], limit: usize, timeframe: &str, server_time_ms: i64) -> Result<()> {
    if candles.is_empty() {
        return Err(Error::DataValidation("exchange returned no candles".into()));
    }
    if candles.len() < limit {
        return Err(Error::DataValidation(format!(
            "expected {limit} candles, got {}",
            candles.len()
        )));
    }

    let mut previous = i64::MIN;
    for (i, c) in candles.iter().enumerate() {
        let fields = [
            ("open", c.open),
            ("high", c.high),
            ("low", c.low),
            ("close", c.close),
            ("volume", c.volume),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(Error::DataValidation(format!(
                "candle {i} has invalid {name}: {value}"
            )));
        }
        if c.timestamp <= 0 {
            return Err(Error::DataValidation(format!(
                "candle {i} has invalid timestamp {}",
                c.timestamp
            )));
        }
        if c.timestamp < previous {
            return Err(Error::DataValidation(format!(
                "candle {i} is out of order ({} after {previous})",
                c.timestamp
            )));
        }
        previous = c.timestamp;
    }

    let last = previous;
    if last > server_time_ms + FUTURE_TOLERANCE_MS {
        return Err(Error::DataValidation(format!(
            "latest candle {last} is ahead of server time {server_time_ms}"
        )));
    }
    let age = server_time_ms - last;
    let max_age = max_age_ms(timeframe);
    if age > max_age {
        return Err(Error::DataValidation(format!(
            "latest {timeframe} candle is {}s old (max {}s)",
            age / 1000,
            max_age / 1000
        )));
    }
    Ok(())
}

/// Cached, validated, retrying access to exchange candles.
pub struct MarketDataGateway {
    client: Arc<dyn ExchangeClient>,
    retry: RetryPolicy,
    ttl: Duration,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MarketDataGateway {
    pub fn new(client: Arc<dyn ExchangeClient>, retry: RetryPolicy, ttl: Duration) -> Self {
        Self {
            client,
            retry,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(client: Arc<dyn ExchangeClient>, config: &Config) -> Self {
        Self::new(client, config.retry, config.market_cache_ttl)
    }

    fn key(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> CacheKey {
        CacheKey {
            exchange: self.client.name().to_string(),
            symbol: symbol.to_string(),
            data_type: "historical",
            timeframe: timeframe.to_string(),
            limit,
        }
    }

    /// Candles for `symbol`, oldest first. Served from cache unless expired
    /// or `force_refresh` is set.
    pub async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: &str,
        limit: usize,
        force_refresh: bool,
    ) -> Result<Vec<Candle>> {
        let key = self.key(symbol, timeframe, limit);

        if force_refresh {
            self.cache.write().await.remove(&key);
        } else if let Some(entry) = self.cache.read().await.get(&key) {
            if entry.fetched_at.elapsed() < self.ttl {
                debug!(symbol = %symbol, timeframe, limit, "Market data served from cache");
                return Ok(entry.candles.clone());
            }
        }

        let candles = self
            .retry
            .run("fetch market data", || self.fetch_validated(symbol, timeframe, limit))
            .await?;

        if let Some(last) = candles.last() {
            info!(
                symbol = %symbol,
                timeframe,
                points = candles.len(),
                last_candle = %last.time(),
                "Market data fetched"
            );
        }

        self.cache.write().await.insert(
            key,
            CacheEntry {
                candles: candles.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(candles)
    }

    async fn fetch_validated(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let candles = self.client.market_data(symbol, timeframe, limit).await?;
        let server_time = self.client.server_time().await?;
        validate(&candles, limit, timeframe, server_time)?;
        Ok(candles)
    }

    /// Most recent one-minute candle, always fetched fresh.
    pub async fn latest_candle(&self, symbol: &Symbol) -> Result<Candle> {
        let candles = self.fetch(symbol, "1m", 1, true).await?;
        candles
            .last()
            .copied()
            .ok_or_else(|| Error::DataValidation("exchange returned no candles".into()))
    }

    /// One series per timeframe, in the order given. Fails on the first
    /// timeframe that cannot be fetched.
    pub async fn fetch_timeframes(
        &self,
        symbol: &Symbol,
        timeframes: &[&str],
        limit: usize,
    ) -> Result<HashMap<String, Vec<Candle>>> {
        let mut out = HashMap::with_capacity(timeframes.len());
        for tf in timeframes {
            let candles = self.fetch(symbol, tf, limit, false).await?;
            out.insert(tf.to_string(), candles);
        }
        Ok(out)
    }

    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        let dropped = cache.len();
        cache.clear();
        info!(entries = dropped, "Market data cache cleared");
    }
}
