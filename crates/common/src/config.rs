use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result, RetryPolicy, Symbol, TradingMode};

/// All configuration loaded from environment variables at startup.
///
/// Built once in `main` and handed by reference to every component
/// constructor. Nothing reads the environment after this.
#[derive(Debug, Clone)]
pub struct Config {
    // Trading
    pub trading_mode: TradingMode,
    pub exchange: String,
    pub symbol: Symbol,
    pub timeframe: String,
    pub strategy: String,
    pub strategy_config_path: PathBuf,
    pub order_amount: f64,
    pub poll_interval: Duration,

    // Resilience
    pub retry: RetryPolicy,
    pub market_cache_ttl: Duration,
    pub lock_dir: PathBuf,
    pub stop_file: Option<PathBuf>,

    // Risk legs
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,

    // Exchange credentials
    pub binance_api_key: Option<String>,
    pub binance_secret: Option<String>,
    pub binance_testnet: bool,

    // Paper trading
    pub paper_quote_balance: f64,
    pub paper_slippage_bps: f64,

    // Notifications
    pub notify_channels: Vec<ChannelKind>,
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub channel_id: String,
}

/// Notification channels known to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Telegram,
    Discord,
}

impl FromStr for ChannelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "telegram" => Ok(ChannelKind::Telegram),
            "discord" => Ok(ChannelKind::Discord),
            other => Err(Error::Config(format!(
                "unknown notification channel '{other}' (expected telegram or discord)"
            ))),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Telegram => write!(f, "telegram"),
            ChannelKind::Discord => write!(f, "discord"),
        }
    }
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` delegates here; tests
    /// pass a map instead of touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let trading_mode = match env.required("TRADING_MODE")?.to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let binance_api_key = env.optional("BINANCE_API_KEY");
        let binance_secret = env.optional("BINANCE_SECRET");
        if trading_mode == TradingMode::Live && (binance_api_key.is_none() || binance_secret.is_none())
        {
            return Err(Error::Config(
                "BINANCE_API_KEY and BINANCE_SECRET are required in live mode".into(),
            ));
        }

        let order_amount: f64 = env.parsed_or("ORDER_AMOUNT", 0.01)?;
        if order_amount.is_nan() || order_amount <= 0.0 {
            return Err(Error::Config(format!(
                "ORDER_AMOUNT must be positive, got {order_amount}"
            )));
        }

        let notify_channels = env
            .optional("NOTIFY_CHANNELS")
            .unwrap_or_else(|| "telegram".to_string())
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(ChannelKind::from_str)
            .collect::<Result<Vec<_>>>()?;

        let telegram = match (env.optional("TELEGRAM_BOT_TOKEN"), env.optional("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                bot_token,
                chat_id: chat_id.trim().parse().map_err(|_| {
                    Error::Config(format!("TELEGRAM_CHAT_ID must be numeric, got '{chat_id}'"))
                })?,
            }),
            _ => None,
        };

        let discord = match (env.optional("DISCORD_BOT_TOKEN"), env.optional("DISCORD_CHANNEL_ID")) {
            (Some(bot_token), Some(channel_id)) => Some(DiscordConfig {
                bot_token,
                channel_id,
            }),
            _ => None,
        };

        Ok(Config {
            trading_mode,
            exchange: env
                .optional("EXCHANGE")
                .unwrap_or_else(|| "binance".to_string())
                .to_lowercase(),
            symbol: env
                .optional("SYMBOL")
                .unwrap_or_else(|| "BTC/USDT".to_string())
                .parse()?,
            timeframe: env.optional("TIMEFRAME").unwrap_or_else(|| "1h".to_string()),
            strategy: env
                .optional("STRATEGY")
                .unwrap_or_else(|| "rsi".to_string())
                .to_lowercase(),
            strategy_config_path: env
                .optional("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string())
                .into(),
            order_amount,
            poll_interval: Duration::from_secs(env.parsed_or("POLL_INTERVAL_SECS", 10)?),
            retry: RetryPolicy::new(
                env.parsed_or("MAX_RETRIES", 3)?,
                Duration::from_millis(env.parsed_or("RETRY_BASE_DELAY_MS", 1000)?),
                Duration::from_secs(env.parsed_or("RETRY_MAX_DELAY_SECS", 30)?),
            ),
            market_cache_ttl: Duration::from_secs(env.parsed_or("MARKET_CACHE_TTL_SECS", 10)?),
            lock_dir: env
                .optional("LOCK_DIR")
                .unwrap_or_else(|| "storage/locks".to_string())
                .into(),
            stop_file: Some(
                env.optional("STOP_FILE")
                    .unwrap_or_else(|| "storage/pids/stop_signal".to_string())
                    .into(),
            ),
            stop_loss_pct: env.parsed_opt("STOP_LOSS_PCT")?,
            take_profit_pct: env.parsed_opt("TAKE_PROFIT_PCT")?,
            binance_api_key,
            binance_secret,
            binance_testnet: env.parsed_or("BINANCE_TESTNET", false)?,
            paper_quote_balance: env.parsed_or("PAPER_QUOTE_BALANCE", 10_000.0)?,
            paper_slippage_bps: env.parsed_or("PAPER_SLIPPAGE_BPS", 10.0)?,
            notify_channels,
            telegram,
            discord,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key).ok_or_else(|| {
            Error::Config(format!(
                "Required environment variable '{key}' is not set. Check your .env file."
            ))
        })
    }

    fn parsed_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.optional(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'")))
            })
            .transpose()
    }

    fn parsed_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.parsed_opt(key)?.unwrap_or(default))
    }
}
