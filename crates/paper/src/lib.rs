use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{
    Balances, Candle, Config, Error, ExchangeClient, Order, OrderKind, OrderSide, Result, Symbol,
};

/// Simulated exchange client for paper trading.
///
/// Market data, server time, prices and minimum order sizes come from a real
/// data source (Binance public endpoints in production). Balances, fills and
/// resting stop-loss / take-profit orders live in memory. No real orders are
/// ever sent.
pub struct PaperClient {
    source: Arc<dyn ExchangeClient>,
    /// Free balance per currency.
    balances: RwLock<HashMap<String, f64>>,
    /// Protective orders waiting for their trigger price.
    resting: RwLock<Vec<(Symbol, Order)>>,
    /// Slippage in basis points applied to market fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(
        source: Arc<dyn ExchangeClient>,
        quote_currency: &str,
        initial_quote_balance: f64,
        slippage_bps: f64,
    ) -> Self {
        info!(
            source = source.name(),
            currency = quote_currency,
            balance = initial_quote_balance,
            slippage_bps,
            "PaperClient initialized"
        );
        Self {
            source,
            balances: RwLock::new(HashMap::from([(
                quote_currency.to_string(),
                initial_quote_balance,
            )])),
            resting: RwLock::new(Vec::new()),
            slippage_bps,
        }
    }

    pub fn from_config(source: Arc<dyn ExchangeClient>, config: &Config) -> Self {
        Self::new(
            source,
            &config.symbol.quote,
            config.paper_quote_balance,
            config.paper_slippage_bps,
        )
    }

    /// Orders still waiting for their trigger.
    pub async fn resting_orders(&self) -> Vec<Order> {
        self.resting.read().await.iter().map(|(_, o)| o.clone()).collect()
    }

    /// Move balances for a fill of `amount` base at `price`. Fails without
    /// touching anything if the paying side is short.
    async fn settle(&self, symbol: &Symbol, side: OrderSide, amount: f64, price: f64) -> Result<()> {
        let mut balances = self.balances.write().await;
        let (pay, pay_amount, receive, receive_amount) = match side {
            OrderSide::Buy => (&symbol.quote, amount * price, &symbol.base, amount),
            OrderSide::Sell => (&symbol.base, amount, &symbol.quote, amount * price),
        };

        let available = balances.get(pay).copied().unwrap_or(0.0);
        if available < pay_amount {
            return Err(Error::OrderValidation(format!(
                "paper account has {available:.8} {pay}, needs {pay_amount:.8}"
            )));
        }
        balances.insert(pay.clone(), available - pay_amount);
        *balances.entry(receive.clone()).or_insert(0.0) += receive_amount;
        Ok(())
    }

    /// Fill every resting order for `symbol` whose trigger `price` has
    /// reached. Orders that can no longer be covered are dropped.
    pub async fn on_price(&self, symbol: &Symbol, price: f64) {
        let triggered: Vec<Order> = {
            let mut resting = self.resting.write().await;
            let (hit, keep): (Vec<_>, Vec<_>) = resting
                .drain(..)
                .partition(|(s, o)| s == symbol && is_triggered(o, price));
            *resting = keep;
            hit.into_iter().map(|(_, o)| o).collect()
        };

        for order in triggered {
            match self.settle(symbol, order.side, order.amount, order.price).await {
                Ok(()) => info!(
                    symbol = %symbol,
                    kind = %order.kind,
                    side = %order.side,
                    trigger = order.price,
                    price,
                    "Paper resting order triggered"
                ),
                Err(e) => warn!(
                    symbol = %symbol,
                    kind = %order.kind,
                    error = %e,
                    "Paper resting order cancelled"
                ),
            }
        }
    }

    async fn rest(&self, symbol: &Symbol, side: OrderSide, kind: OrderKind, amount: f64, trigger: f64) -> Result<Order> {
        if !(trigger > 0.0 && trigger.is_finite()) {
            return Err(Error::Rejected(format!("invalid {kind} trigger price {trigger}")));
        }
        let order = Order::new(symbol.to_string(), side, kind, amount, trigger);
        debug!(symbol = %symbol, %kind, %side, amount, trigger, "Paper resting order placed");
        self.resting.write().await.push((symbol.clone(), order.clone()));
        Ok(order)
    }
}

/// A sell stop fires on the way down and a sell target on the way up; buy
/// legs are the mirror image.
fn is_triggered(order: &Order, price: f64) -> bool {
    match (order.kind, order.side) {
        (OrderKind::StopLoss, OrderSide::Sell) | (OrderKind::TakeProfit, OrderSide::Buy) => {
            price <= order.price
        }
        (OrderKind::StopLoss, OrderSide::Buy) | (OrderKind::TakeProfit, OrderSide::Sell) => {
            price >= order.price
        }
        (OrderKind::Market, _) => false,
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    fn name(&self) -> &str {
        "paper"
    }

    async fn market_data(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let candles = self.source.market_data(symbol, timeframe, limit).await?;
        if let Some(last) = candles.last() {
            self.on_price(symbol, last.close).await;
        }
        Ok(candles)
    }

    async fn server_time(&self) -> Result<i64> {
        self.source.server_time().await
    }

    async fn balances(&self) -> Result<Balances> {
        let free = self.balances.read().await.clone();
        Ok(Balances {
            used: free.keys().map(|k| (k.clone(), 0.0)).collect(),
            total: free.clone(),
            free,
        })
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<f64> {
        let price = self.source.current_price(symbol).await?;
        self.on_price(symbol, price).await;
        Ok(price)
    }

    async fn min_order_size(&self, symbol: &Symbol) -> Result<f64> {
        self.source.min_order_size(symbol).await
    }

    async fn execute_order(&self, symbol: &Symbol, side: OrderSide, amount: f64) -> Result<Order> {
        let mid_price = self.current_price(symbol).await?;

        // Apply slippage: buys pay more, sells receive less
        let fill_price = match side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        };
        self.settle(symbol, side, amount, fill_price).await?;

        debug!(
            symbol = %symbol,
            %side,
            mid = mid_price,
            fill = fill_price,
            amount,
            "Paper fill simulated"
        );
        Ok(Order::new(symbol.to_string(), side, OrderKind::Market, amount, fill_price))
    }

    async fn create_stop_loss_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        stop_price: f64,
        side: OrderSide,
    ) -> Result<Order> {
        self.rest(symbol, side, OrderKind::StopLoss, amount, stop_price).await
    }

    async fn create_take_profit_order(
        &self,
        symbol: &Symbol,
        amount: f64,
        target_price: f64,
        side: OrderSide,
    ) -> Result<Order> {
        self.rest(symbol, side, OrderKind::TakeProfit, amount, target_price)
            .await
    }
}
