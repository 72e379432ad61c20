use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use common::{ChannelKind, Config, Notification, Result};

use crate::{DiscordChannel, TelegramChannel};

/// One outbound delivery target.
///
/// Implementations map every failure to `Error::NotificationDelivery` so the
/// dispatcher's retry loop treats it as transient.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Build every channel enabled in `NOTIFY_CHANNELS`. A channel whose
/// credentials are missing is skipped with a warning.
pub fn channels_from_config(config: &Config) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    for kind in &config.notify_channels {
        match kind {
            ChannelKind::Telegram => match &config.telegram {
                Some(tg) => channels.push(Arc::new(TelegramChannel::new(&tg.bot_token, tg.chat_id))),
                None => warn!(
                    channel = %kind,
                    "TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set, channel disabled"
                ),
            },
            ChannelKind::Discord => match &config.discord {
                Some(dc) => channels.push(Arc::new(DiscordChannel::new(&dc.bot_token, &dc.channel_id))),
                None => warn!(
                    channel = %kind,
                    "DISCORD_BOT_TOKEN / DISCORD_CHANNEL_ID not set, channel disabled"
                ),
            },
        }
    }
    let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
    info!(channels = ?names, "Notification channels configured");
    channels
}
