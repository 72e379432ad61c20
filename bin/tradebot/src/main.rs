use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{Config, ExchangeClient, StrategyParameters, TradingMode};
use engine::{BinanceClient, MarketDataGateway, OrderExecutor, Worker, WorkerSettings};
use notify::NotificationDispatcher;
use paper::PaperClient;
use risk::{RiskConfig, RiskManager};
use strategy::{build_strategy, StrategyFileConfig, StrategyKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("Failed to load configuration")?;
    info!(mode = %cfg.trading_mode, symbol = %cfg.symbol, "TradeBot starting");

    if cfg.exchange != "binance" {
        bail!("Unsupported exchange '{}' (only binance is available)", cfg.exchange);
    }

    // ── Strategy ──────────────────────────────────────────────────────────────
    let kind: StrategyKind = cfg.strategy.parse()?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)?;
    let overrides = StrategyParameters::new()
        .with("symbol", cfg.symbol.to_string())
        .with("timeframe", cfg.timeframe.clone());
    let strategy = build_strategy(kind, &strategy_file, &overrides)
        .with_context(|| format!("Failed to configure strategy '{kind}'"))?;

    // ── Risk ──────────────────────────────────────────────────────────────────
    let risk = RiskManager::new(RiskConfig::from_config(&cfg))?;

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let exchange_client: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!(testnet = cfg.binance_testnet, "Live trading mode, using BinanceClient");
            let (Some(key), Some(secret)) = (&cfg.binance_api_key, &cfg.binance_secret) else {
                bail!("BINANCE_API_KEY and BINANCE_SECRET are required in live mode");
            };
            Arc::new(BinanceClient::new(key, secret, cfg.binance_testnet)?)
        }
        TradingMode::Paper => {
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode, using PaperClient");
            let source = Arc::new(BinanceClient::public(cfg.binance_testnet)?);
            Arc::new(PaperClient::from_config(source, &cfg))
        }
    };

    // ── Notifications ─────────────────────────────────────────────────────────
    let notifier = Arc::new(NotificationDispatcher::from_config(&cfg));
    info!(channels = ?notifier.active_channels(), "Notification dispatcher ready");

    // ── Pipeline ──────────────────────────────────────────────────────────────
    let gateway = MarketDataGateway::from_config(exchange_client.clone(), &cfg);
    let executor = OrderExecutor::from_config(exchange_client, &cfg, notifier.clone());
    let (worker, handle) = Worker::new(
        WorkerSettings::from_config(&cfg),
        gateway,
        strategy,
        executor,
        risk,
        notifier,
    );

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received. Stopping after the current cycle.");
                handle.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    worker.run().await.context("Trading worker stopped on a fatal error")?;
    info!("TradeBot exited cleanly");
    Ok(())
}
