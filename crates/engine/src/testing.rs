//! In-memory exchange used by the engine's unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use common::{
    Balances, Candle, Error, ExchangeClient, Order, OrderKind, OrderSide, Result, Symbol,
};

pub const HOUR_MS: i64 = 3_600_000;
pub const NOW_MS: i64 = 1_700_000_000_000;

/// Hourly candles ending `age_ms` before `NOW_MS`.
pub fn hourly_candles(closes: &[f64], age_ms: i64) -> Vec<Candle> {
    let last = NOW_MS - age_ms;
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: last - (n - 1 - i as i64) * HOUR_MS,
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        })
        .collect()
}

pub struct MockExchange {
    pub candles: Mutex<Vec<Candle>>,
    pub server_time: AtomicI64,
    pub market_calls: AtomicU32,
    /// Errors returned by upcoming `market_data` calls before succeeding.
    pub market_failures: Mutex<VecDeque<Error>>,
    pub always_fail_market: Mutex<bool>,
    pub balances: Mutex<Balances>,
    pub price: Mutex<f64>,
    pub min_size: Mutex<f64>,
    pub order_calls: AtomicU32,
    pub order_failures: Mutex<VecDeque<Error>>,
    pub fail_risk_legs: Mutex<bool>,
    pub order_delay: Mutex<Duration>,
    pub placed: Mutex<Vec<Order>>,
}

impl Default for MockExchange {
    fn default() -> Self {
        let mut balances = Balances::default();
        balances.free.insert("USDT".into(), 10_000.0);
        balances.free.insert("BTC".into(), 1.0);
        Self {
            candles: Mutex::new(hourly_candles(&[100.0; 30], 0)),
            server_time: AtomicI64::new(NOW_MS),
            market_calls: AtomicU32::new(0),
            market_failures: Mutex::new(VecDeque::new()),
            always_fail_market: Mutex::new(false),
            balances: Mutex::new(balances),
            price: Mutex::new(100.0),
            min_size: Mutex::new(5.0),
            order_calls: AtomicU32::new(0),
            order_failures: Mutex::new(VecDeque::new()),
            fail_risk_legs: Mutex::new(false),
            order_delay: Mutex::new(Duration::ZERO),
            placed: Mutex::new(Vec::new()),
        }
    }
}

impl MockExchange {
    pub fn with_candles(candles: Vec<Candle>) -> Self {
        let mock = Self::default();
        *mock.candles.lock().unwrap() = candles;
        mock
    }

    pub fn market_calls(&self) -> u32 {
        self.market_calls.load(Ordering::SeqCst)
    }

    pub fn order_calls(&self) -> u32 {
        self.order_calls.load(Ordering::SeqCst)
    }

    pub fn placed(&self) -> Vec<Order> {
        self.placed.lock().unwrap().clone()
    }

    fn record(&self, order: Order) -> Order {
        self.placed.lock().unwrap().push(order.clone());
        order
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn name(&self) -> &str {
        "mock"
    }

    async fn market_data(&self, _symbol: &Symbol, _timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        if *self.always_fail_market.lock().unwrap() {
            return Err(Error::Connection("connection refused".into()));
        }
        if let Some(e) = self.market_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        let candles = self.candles.lock().unwrap();
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn server_time(&self) -> Result<i64> {
        Ok(self.server_time.load(Ordering::SeqCst))
    }

    async fn balances(&self) -> Result<Balances> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn current_price(&self, _symbol: &Symbol) -> Result<f64> {
        Ok(*self.price.lock().unwrap())
    }

    async fn min_order_size(&self, _symbol: &Symbol) -> Result<f64> {
        Ok(*self.min_size.lock().unwrap())
    }

    async fn execute_order(&self, symbol: &Symbol, side: OrderSide, amount: f64) -> Result<Order> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.order_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.order_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        let price = *self.price.lock().unwrap();
        Ok(self.record(Order::new(symbol.to_string(), side, OrderKind::Market, amount, price)))
    }

    async fn create_stop_loss_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        stop_price: f64,
        side: OrderSide,
    ) -> Result<Order> {
        if *self.fail_risk_legs.lock().unwrap() {
            return Err(Error::Rejected("stop price would trigger immediately".into()));
        }
        Ok(self.record(Order::new(symbol.to_string(), side, OrderKind::StopLoss, amount, stop_price)))
    }

    async fn create_take_profit_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        target_price: f64,
        side: OrderSide,
    ) -> Result<Order> {
        if *self.fail_risk_legs.lock().unwrap() {
            return Err(Error::Rejected("take-profit rejected".into()));
        }
        Ok(self.record(Order::new(
            symbol.to_string(),
            side,
            OrderKind::TakeProfit,
            amount,
            target_price,
        )))
    }
}

/// Notification channel that keeps everything it is sent.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<common::Notification>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<common::Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.message).collect()
    }
}

#[async_trait]
impl notify::NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &common::Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Dispatcher wired to a single recording channel.
pub fn recording_dispatcher() -> (std::sync::Arc<notify::NotificationDispatcher>, std::sync::Arc<RecordingChannel>) {
    let channel = std::sync::Arc::new(RecordingChannel::default());
    let channels: Vec<std::sync::Arc<dyn notify::NotificationChannel>> = vec![channel.clone()];
    let dispatcher = notify::NotificationDispatcher::with_channels(channels, common::RetryPolicy::immediate(0));
    (std::sync::Arc::new(dispatcher), channel)
}
