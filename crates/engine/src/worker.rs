use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use common::{Config, Notification, Result, Symbol, TradingMode, WorkerState};
use notify::NotificationDispatcher;
use risk::RiskManager;
use strategy::Strategy;

use crate::executor::OrderExecutor;
use crate::market_data::MarketDataGateway;

/// Cooperative stop signal, checked at the top of every cycle.
///
/// Also fires when the optional stop file appears; the file is removed once
/// seen so the next start is not affected.
#[derive(Clone)]
pub struct StopToken {
    tx: Arc<watch::Sender<bool>>,
    stop_file: Option<PathBuf>,
}

impl StopToken {
    pub fn new(stop_file: Option<PathBuf>) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            stop_file,
        }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        if *self.tx.borrow() {
            return true;
        }
        if let Some(path) = &self.stop_file {
            if path.exists() {
                info!(path = %path.display(), "Stop file found");
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove stop file");
                }
                self.stop();
                return true;
            }
        }
        false
    }

    /// Sleep for `duration`, waking early on `stop()`. Returns true if
    /// woken by a stop.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            res = rx.wait_for(|stopped| *stopped) => res.is_ok(),
        }
    }
}

/// Cloneable handle for whoever supervises the worker (Ctrl-C handler, tests).
#[derive(Clone)]
pub struct WorkerHandle {
    stop: StopToken,
    state: Arc<RwLock<WorkerState>>,
}

impl WorkerHandle {
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }
}

/// Fixed per-process settings for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub exchange: String,
    pub symbol: Symbol,
    pub timeframe: String,
    pub order_amount: f64,
    pub poll_interval: Duration,
    pub mode: TradingMode,
    pub stop_file: Option<PathBuf>,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exchange: config.exchange.clone(),
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
            order_amount: config.order_amount,
            poll_interval: config.poll_interval,
            mode: config.trading_mode,
            stop_file: config.stop_file.clone(),
        }
    }
}

/// The single-symbol trading loop: fetch → decide → execute → notify → sleep.
pub struct Worker {
    settings: WorkerSettings,
    gateway: MarketDataGateway,
    strategy: Box<dyn Strategy>,
    executor: OrderExecutor,
    risk: RiskManager,
    notifier: Arc<NotificationDispatcher>,
    state: Arc<RwLock<WorkerState>>,
    stop: StopToken,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        gateway: MarketDataGateway,
        strategy: Box<dyn Strategy>,
        executor: OrderExecutor,
        risk: RiskManager,
        notifier: Arc<NotificationDispatcher>,
    ) -> (Self, WorkerHandle) {
        let state = Arc::new(RwLock::new(WorkerState::default()));
        let stop = StopToken::new(settings.stop_file.clone());

        let handle = WorkerHandle {
            stop: stop.clone(),
            state: state.clone(),
        };

        let worker = Worker {
            settings,
            gateway,
            strategy,
            executor,
            risk,
            notifier,
            state,
            stop,
        };

        (worker, handle)
    }

    async fn set_state(&self, next: WorkerState) {
        *self.state.write().await = next;
    }

    /// Run until stopped or a fatal error. Local failures (order validation,
    /// lock contention) skip the cycle; anything else ends the loop and is
    /// returned after a final failure notification.
    pub async fn run(self) -> Result<()> {
        let s = &self.settings;
        info!(
            exchange = %s.exchange,
            symbol = %s.symbol,
            strategy = self.strategy.name(),
            timeframe = %s.timeframe,
            mode = %s.mode,
            "Trading worker started"
        );
        self.notifier
            .dispatch(
                Notification::success("Trading worker started")
                    .with("exchange", &s.exchange)
                    .with("symbol", &s.symbol)
                    .with("strategy", self.strategy.name())
                    .with("timeframe", &s.timeframe)
                    .with("mode", s.mode)
                    .with("pid", std::process::id()),
            )
            .await;

        loop {
            if self.stop.is_stopped() {
                break;
            }

            match self.cycle().await {
                Ok(()) => {}
                Err(e) if e.is_local() => {
                    warn!(symbol = %s.symbol, error = %e, "Cycle skipped");
                }
                Err(e) => {
                    error!(symbol = %s.symbol, error = %e, "Fatal error, stopping worker");
                    self.set_state(WorkerState::Stopped).await;
                    self.notifier
                        .dispatch(
                            Notification::failure("Trading worker stopped on fatal error")
                                .with("symbol", &s.symbol)
                                .with("error", &e)
                                .with("kind", format!("{:?}", e.root().kind())),
                        )
                        .await;
                    return Err(e);
                }
            }

            self.set_state(WorkerState::Sleeping).await;
            if self.stop.sleep(s.poll_interval).await {
                break;
            }
        }

        self.set_state(WorkerState::Stopped).await;
        info!(symbol = %s.symbol, "Trading worker stopped");
        self.notifier
            .dispatch(Notification::success("Trading worker stopped").with("symbol", &s.symbol))
            .await;
        Ok(())
    }

    async fn cycle(&self) -> Result<()> {
        let s = &self.settings;

        self.set_state(WorkerState::Fetching).await;
        let candles = self
            .gateway
            .fetch(&s.symbol, &s.timeframe, self.strategy.lookback(), false)
            .await?;

        self.set_state(WorkerState::Deciding).await;
        let signal = self.strategy.evaluate(&candles)?;
        let Some(last) = candles.last() else {
            return Ok(());
        };

        if let Some(side) = signal.action.side() {
            self.set_state(WorkerState::Executing).await;
            let risk = self.risk.levels(side, last.close);
            self.executor
                .execute_order(side, s.order_amount, &risk)
                .await?;

            self.set_state(WorkerState::Notifying).await;
            self.notifier.dispatch(self.strategy.notification(&signal)).await;
        }

        info!(
            symbol = %s.symbol,
            action = %signal.action,
            confidence = signal.confidence,
            last_close = last.close,
            candle_time = %last.time(),
            "Cycle complete"
        );
        Ok(())
    }
}
