use async_trait::async_trait;

use crate::{Balances, Candle, Order, OrderSide, Result, Symbol};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Market data flows through `MarketDataGateway` and order flow through
/// `OrderExecutor`; nothing else in the worker should call these directly.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Short identifier used in cache and lock keys (e.g. "binance").
    fn name(&self) -> &str;

    /// OHLCV candles for `symbol`, oldest first.
    async fn market_data(&self, symbol: &Symbol, timeframe: &str, limit: usize)
        -> Result<Vec<Candle>>;

    /// Exchange clock in milliseconds since the Unix epoch.
    async fn server_time(&self) -> Result<i64>;

    async fn balances(&self) -> Result<Balances>;

    /// Get the latest price for a trading pair.
    async fn current_price(&self, symbol: &Symbol) -> Result<f64>;

    /// Minimum order value in quote currency.
    async fn min_order_size(&self, symbol: &Symbol) -> Result<f64>;

    /// Submit a market order and return the fill acknowledgment.
    async fn execute_order(&self, symbol: &Symbol, side: OrderSide, amount: f64) -> Result<Order>;

    async fn create_stop_loss_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        stop_price: f64,
        side: OrderSide,
    ) -> Result<Order>;

    async fn create_take_profit_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        target_price: f64,
        side: OrderSide,
    ) -> Result<Order>;
}
