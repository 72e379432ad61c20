use std::sync::Arc;

use tracing::{error, info, warn};

use common::{
    Config, Error, ExchangeClient, Notification, Order, OrderKind, OrderSide, Result,
    RetryPolicy, RiskParams, Symbol,
};
use notify::NotificationDispatcher;

use crate::lock::ExecutionLock;

/// Places orders for one symbol on one exchange.
///
/// This is the ONLY component that calls `ExchangeClient::execute_order`.
/// Each call holds the (exchange, symbol) execution lock for its whole
/// duration and reports its outcome through the dispatcher exactly once.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    symbol: Symbol,
    lock: ExecutionLock,
    retry: RetryPolicy,
    notifier: Arc<NotificationDispatcher>,
}

/// Result of a fill plus any protective legs that could not be placed.
struct Execution {
    order: Order,
    failed_legs: Vec<(OrderKind, Error)>,
}

impl OrderExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        symbol: Symbol,
        lock: ExecutionLock,
        retry: RetryPolicy,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            client,
            symbol,
            lock,
            retry,
            notifier,
        }
    }

    pub fn from_config(
        client: Arc<dyn ExchangeClient>,
        config: &Config,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self::new(
            client,
            config.symbol.clone(),
            ExecutionLock::from_config(config),
            config.retry,
            notifier,
        )
    }

    /// Validate, place and confirm a market order, then attach the requested
    /// stop-loss / take-profit legs on the opposite side.
    pub async fn execute_order(&self, side: OrderSide, amount: f64, risk: &RiskParams) -> Result<Order> {
        info!(symbol = %self.symbol, %side, amount, "Executing order");

        match self.execute_locked(side, amount, risk).await {
            Ok(execution) => {
                self.notifier.dispatch(self.success_notification(&execution)).await;
                Ok(execution.order)
            }
            Err(e) => {
                if e.is_local() {
                    warn!(symbol = %self.symbol, %side, error = %e, "Order not placed");
                } else {
                    error!(symbol = %self.symbol, %side, error = %e, "Order execution failed");
                }
                self.notifier
                    .dispatch(self.failure_notification(side, amount, &e))
                    .await;
                Err(e)
            }
        }
    }

    async fn execute_locked(&self, side: OrderSide, amount: f64, risk: &RiskParams) -> Result<Execution> {
        let _guard = self
            .lock
            .try_acquire(self.client.name(), &self.symbol.to_string())?;

        self.validate(side, amount).await?;

        let client = &self.client;
        let symbol = &self.symbol;
        let mut order = self
            .retry
            .run("execute order", || client.execute_order(symbol, side, amount))
            .await?;
        info!(
            symbol = %self.symbol,
            %side,
            amount,
            price = order.price,
            order_id = %order.id,
            "Order filled"
        );

        let mut failed_legs = Vec::new();
        let exit = side.opposite();
        let filled = order.amount;
        if let Some(stop) = risk.stop_loss {
            match self
                .retry
                .run("create stop-loss", || {
                    client.create_stop_loss_order(symbol, filled, stop, exit)
                })
                .await
            {
                Ok(leg) => order.risk_legs.push(leg),
                Err(e) => {
                    error!(symbol = %self.symbol, stop, error = %e, "Stop-loss order failed");
                    failed_legs.push((OrderKind::StopLoss, e));
                }
            }
        }
        if let Some(target) = risk.take_profit {
            match self
                .retry
                .run("create take-profit", || {
                    client.create_take_profit_order(symbol, filled, target, exit)
                })
                .await
            {
                Ok(leg) => order.risk_legs.push(leg),
                Err(e) => {
                    error!(symbol = %self.symbol, target, error = %e, "Take-profit order failed");
                    failed_legs.push((OrderKind::TakeProfit, e));
                }
            }
        }

        Ok(Execution { order, failed_legs })
    }

    /// Balance and minimum-size checks. Read-only exchange calls share the
    /// retry policy; the checks themselves are never retried.
    async fn validate(&self, side: OrderSide, amount: f64) -> Result<()> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(Error::OrderValidation(format!(
                "order amount must be positive, got {amount}"
            )));
        }

        let client = &self.client;
        let symbol = &self.symbol;
        let balances = self.retry.run("fetch balances", || client.balances()).await?;
        let price = self
            .retry
            .run("fetch price", || client.current_price(symbol))
            .await?;

        match side {
            OrderSide::Buy => {
                let needed = amount * price;
                let free = balances.free_of(&symbol.quote);
                if free < needed {
                    return Err(Error::OrderValidation(format!(
                        "insufficient {} balance: need {needed:.8}, have {free:.8}",
                        symbol.quote
                    )));
                }
            }
            OrderSide::Sell => {
                let free = balances.free_of(&symbol.base);
                if free < amount {
                    return Err(Error::OrderValidation(format!(
                        "insufficient {} balance: need {amount:.8}, have {free:.8}",
                        symbol.base
                    )));
                }
            }
        }

        let min_size = self
            .retry
            .run("fetch minimum order size", || client.min_order_size(symbol))
            .await?;
        let value = amount * price;
        if value < min_size {
            return Err(Error::OrderValidation(format!(
                "order value {value:.8} {} is below the exchange minimum {min_size}",
                symbol.quote
            )));
        }
        Ok(())
    }

    fn success_notification(&self, execution: &Execution) -> Notification {
        let order = &execution.order;
        let mut n = Notification::success(format!("{} order executed", order.side))
            .with("exchange", self.client.name())
            .with("symbol", &self.symbol)
            .with("side", order.side)
            .with("amount", order.amount)
            .with("price", format!("{:.8}", order.price))
            .with("order_id", &order.id);
        for leg in &order.risk_legs {
            n = n.with(leg.kind.to_string(), format!("{:.8} ({})", leg.price, leg.id));
        }
        for (kind, e) in &execution.failed_legs {
            n = n.with(format!("{kind} error"), e);
        }
        n
    }

    fn failure_notification(&self, side: OrderSide, amount: f64, e: &Error) -> Notification {
        Notification::failure(format!("{side} order failed"))
            .with("exchange", self.client.name())
            .with("symbol", &self.symbol)
            .with("side", side)
            .with("amount", amount)
            .with("error", e)
    }
}
