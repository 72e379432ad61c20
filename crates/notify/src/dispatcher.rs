use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use common::{Config, Notification, RetryPolicy};

use crate::{channels_from_config, NotificationChannel};

/// Fans notifications out to every configured channel.
///
/// Messages are queued and the queue is drained in the same call, oldest
/// first. Each channel is retried on its own; a channel that keeps failing
/// is logged and skipped without affecting the others or the caller.
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    queue: Mutex<VecDeque<Notification>>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    /// Channels from `NOTIFY_CHANNELS`; retry delays of 2, 4, 8… seconds.
    pub fn from_config(config: &Config) -> Self {
        let retry = RetryPolicy::new(
            config.retry.max_retries,
            Duration::from_secs(1),
            config.retry.max_delay,
        );
        Self::with_channels(channels_from_config(config), retry)
    }

    pub fn with_channels(channels: Vec<Arc<dyn NotificationChannel>>, retry: RetryPolicy) -> Self {
        Self {
            channels,
            queue: Mutex::new(VecDeque::new()),
            retry,
        }
    }

    pub fn active_channels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    pub async fn notify(&self, message: impl Into<String>, is_success: bool, context: Vec<(String, String)>) {
        let mut notification = Notification::new(message, is_success);
        notification.context = context;
        self.dispatch(notification).await;
    }

    /// Enqueue `notification` and drain the queue. Never fails.
    pub async fn dispatch(&self, notification: Notification) {
        self.queue.lock().await.push_back(notification);

        loop {
            let next = self.queue.lock().await.pop_front();
            match next {
                Some(n) => self.deliver(&n).await,
                None => break,
            }
        }
    }

    async fn deliver(&self, notification: &Notification) {
        if self.channels.is_empty() {
            debug!(message = %notification.message, "No notification channels, message dropped");
            return;
        }

        for channel in &self.channels {
            let name = channel.name();
            let result = self
                .retry
                .run(&format!("notify via {name}"), || channel.send(notification))
                .await;

            match result {
                Ok(()) => info!(channel = name, message = %notification.message, "Notification sent"),
                Err(e) => error!(
                    channel = name,
                    message = %notification.message,
                    error = %e,
                    "Notification delivery failed permanently"
                ),
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Error, Result};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        attempts: AtomicU32,
        fail_first: u32,
        received: std::sync::Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(name: &'static str, fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_first,
                ..Default::default()
            })
        }

        fn received(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationChannel for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, notification: &Notification) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(Error::NotificationDelivery {
                    channel: self.name.to_string(),
                    message: "HTTP 502".into(),
                });
            }
            self.received.lock().unwrap().push(notification.message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_the_others() {
        let broken = Recorder::new("broken", u32::MAX);
        let healthy = Recorder::new("healthy", 0);
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![broken.clone(), healthy.clone()];
        let dispatcher = NotificationDispatcher::with_channels(channels, RetryPolicy::immediate(3));

        dispatcher
            .notify("Order executed", true, vec![("side".into(), "BUY".into())])
            .await;

        assert_eq!(broken.attempts.load(Ordering::SeqCst), 4);
        assert!(broken.received().is_empty());
        assert_eq!(healthy.received(), vec!["Order executed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_channel_is_retried_with_backoff() {
        let flaky = Recorder::new("flaky", 2);
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![flaky.clone()];
        let dispatcher = NotificationDispatcher::with_channels(
            channels,
            RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)),
        );

        let start = tokio::time::Instant::now();
        dispatcher.dispatch(Notification::success("hello")).await;

        // 2s + 4s before the third attempt
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(flaky.received(), vec!["hello"]);
    }

    #[tokio::test]
    async fn messages_are_delivered_in_order() {
        let channel = Recorder::new("ordered", 0);
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![channel.clone()];
        let dispatcher = NotificationDispatcher::with_channels(channels, RetryPolicy::immediate(0));

        dispatcher.dispatch(Notification::success("first")).await;
        dispatcher.dispatch(Notification::failure("second")).await;

        assert_eq!(channel.received(), vec!["first", "second"]);
        assert_eq!(dispatcher.active_channels(), vec!["ordered"]);
    }

    #[tokio::test]
    async fn no_channels_is_a_no_op() {
        let dispatcher = NotificationDispatcher::with_channels(Vec::new(), RetryPolicy::default());
        dispatcher.notify("nobody listens", false, Vec::new()).await;
        assert!(dispatcher.active_channels().is_empty());
    }
}
