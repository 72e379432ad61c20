use async_trait::async_trait;
use teloxide::prelude::*;

use common::{Error, Notification, Result};

use crate::NotificationChannel;

/// Delivers notifications to a single Telegram chat through the Bot API.
pub struct TelegramChannel {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChannel {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }
}

/// Plain-text body: status header, the message, then a details list.
pub fn format_message(notification: &Notification) -> String {
    let header = if notification.is_success {
        "\u{2705} Success"
    } else {
        "\u{274C} Failure"
    };
    let mut text = format!("{header}\n\n{}", notification.message);
    if !notification.context.is_empty() {
        text.push_str("\n\nDetails:");
        for (key, value) in &notification.context {
            text.push_str(&format!("\n\u{2022} {key}: {value}"));
        }
    }
    text
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.bot
            .send_message(self.chat_id, format_message(notification))
            .await
            .map_err(|e| Error::NotificationDelivery {
                channel: self.name().to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
