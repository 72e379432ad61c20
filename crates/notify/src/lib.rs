pub mod channel;
pub mod discord;
pub mod dispatcher;
pub mod telegram;

pub use channel::{channels_from_config, NotificationChannel};
pub use discord::DiscordChannel;
pub use dispatcher::NotificationDispatcher;
pub use telegram::TelegramChannel;
