use async_trait::async_trait;
use serde_json::{json, Map, Value};

use common::{Error, Notification, Result};

use crate::NotificationChannel;

const API_BASE: &str = "https://discord.com/api/v10";
const GREEN: u32 = 0x00FF00;
const RED: u32 = 0xFF0000;
/// Discord rejects embed field values longer than this.
const FIELD_LIMIT: usize = 1024;

/// Posts notifications as embeds to a Discord channel using a bot token.
pub struct DiscordChannel {
    client: reqwest::Client,
    token: String,
    channel_id: String,
}

impl DiscordChannel {
    pub fn new(token: &str, channel_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            channel_id: channel_id.to_string(),
        }
    }

    fn delivery_error(&self, message: impl Into<String>) -> Error {
        Error::NotificationDelivery {
            channel: self.name().to_string(),
            message: message.into(),
        }
    }
}

/// Message payload with a single embed.
pub fn build_payload(notification: &Notification) -> Value {
    let (title, color) = if notification.is_success {
        ("\u{2705} Success", GREEN)
    } else {
        ("\u{274C} Failure", RED)
    };
    let mut embed = json!({
        "title": title,
        "description": notification.message,
        "color": color,
        "timestamp": notification.enqueued_at.to_rfc3339(),
    });

    if !notification.context.is_empty() {
        let context: Map<String, Value> = notification
            .context
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let pretty = serde_json::to_string_pretty(&context).unwrap_or_default();
        let mut value = format!("```json\n{pretty}\n```");
        if value.len() > FIELD_LIMIT {
            let mut cut = (FIELD_LIMIT - 8).min(pretty.len());
            while !pretty.is_char_boundary(cut) {
                cut -= 1;
            }
            value = format!("```\n{}\n```", &pretty[..cut]);
        }
        embed["fields"] = json!([{ "name": "Context", "value": value }]);
    }

    json!({ "embeds": [embed] })
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let url = format!("{API_BASE}/channels/{}/messages", self.channel_id);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&build_payload(notification))
            .send()
            .await
            .map_err(|e| self.delivery_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.delivery_error(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}
