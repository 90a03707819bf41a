// Notification dispatchers - SSE broadcast, webhook and log transports
use crate::application::sensor_repository::{MonitorNotifier, NotificationDispatcher};
use crate::domain::alert::AlertEvent;
use crate::domain::channel::ChannelAlert;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// In-process fan-out feeding server-sent event subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    sender: broadcast::Sender<AlertEvent>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationDispatcher for BroadcastDispatcher {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        // No subscribers is not a failure, the event simply has no audience
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(user_id = %event.user_id, "No live subscribers for alert {}", event.id);
        }
        Ok(())
    }
}

/// POSTs each event as JSON to an external notification gateway.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("Failed to send alert to webhook")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook rejected alert with status {}: {}", status, body);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        tracing::info!(
            user_id = %event.user_id,
            sensor_id = %event.sensor_id,
            field = %event.field_path,
            severity = %event.severity,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// Delivers to every inner dispatcher; fails if any of them failed.
#[derive(Clone, Default)]
pub struct FanoutDispatcher {
    targets: Vec<Arc<dyn NotificationDispatcher>>,
}

impl FanoutDispatcher {
    pub fn new(targets: Vec<Arc<dyn NotificationDispatcher>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl NotificationDispatcher for FanoutDispatcher {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        let mut failures = 0;
        for target in &self.targets {
            if let Err(e) = target.deliver(event).await {
                failures += 1;
                tracing::warn!("Dispatcher failed for alert {}: {}", event.id, e);
            }
        }
        if failures > 0 {
            anyhow::bail!("{} of {} dispatchers failed", failures, self.targets.len());
        }
        Ok(())
    }
}

/// Writes batch monitor alerts to the log.
#[derive(Debug, Clone, Default)]
pub struct LogMonitorNotifier;

#[async_trait]
impl MonitorNotifier for LogMonitorNotifier {
    async fn notify(&self, alert: &ChannelAlert) -> Result<()> {
        tracing::warn!(
            channel = %alert.channel,
            index = alert.index,
            lower = alert.band.lower,
            upper = alert.band.upper,
            "{}",
            alert.message()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::AlertKind;
    use crate::domain::reading::Reading;
    use crate::domain::severity::Severity;
    use chrono::Utc;

    fn event() -> AlertEvent {
        AlertEvent::for_reading(
            "alice",
            &Reading::new("s1", Utc::now()),
            "temperature",
            Severity::Danger,
            AlertKind::Deviation,
            "too hot".to_string(),
        )
    }

    struct Failing;

    #[async_trait]
    impl NotificationDispatcher for Failing {
        async fn deliver(&self, _event: &AlertEvent) -> Result<()> {
            anyhow::bail!("down")
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let dispatcher = BroadcastDispatcher::new(8);
        let mut rx = dispatcher.subscribe();

        let sent = event();
        dispatcher.deliver(&sent).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let dispatcher = BroadcastDispatcher::new(8);
        assert!(dispatcher.deliver(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_all_and_reports_failures() {
        let broadcast = BroadcastDispatcher::new(8);
        let mut rx = broadcast.subscribe();
        let fanout = FanoutDispatcher::new(vec![
            Arc::new(Failing),
            Arc::new(broadcast.clone()),
            Arc::new(LogDispatcher),
        ]);

        let result = fanout.deliver(&event()).await;
        assert!(result.is_err());
        // The healthy target still received it
        assert!(rx.recv().await.is_ok());
    }
}
