pub mod config;
pub mod error;
pub mod exchange;
pub mod retry;
pub mod types;

pub use config::{ChannelKind, Config, DiscordConfig, TelegramConfig};
pub use error::{Error, ErrorKind, Result};
pub use exchange::ExchangeClient;
pub use retry::RetryPolicy;
pub use types::*;
