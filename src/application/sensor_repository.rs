// Collaborator traits for history, sensor ownership, preferences and delivery
use crate::domain::alert::{AlertEvent, NotificationPreference};
use crate::domain::channel::ChannelAlert;
use crate::domain::reading::ClassifiedReading;
use async_trait::async_trait;

/// Append-only per-sensor time series.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent `limit` records for a sensor, newest first
    async fn recent_history(
        &self,
        sensor_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<ClassifiedReading>>;

    /// Persist a classified reading, returning its store id
    async fn append_reading(&self, record: ClassifiedReading) -> anyhow::Result<String>;
}

/// Sensor registration and ownership metadata.
#[async_trait]
pub trait SensorDirectory: Send + Sync {
    async fn is_registered(&self, sensor_id: &str) -> anyhow::Result<bool>;

    /// Users to fan alerts out to for a sensor
    async fn users_watching(&self, sensor_id: &str) -> anyhow::Result<Vec<String>>;

    async fn sensors_watched_by(&self, user_id: &str) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// `None` when the user never saved preferences
    async fn notification_preference(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Option<NotificationPreference>>;

    /// Every user with stored preferences
    async fn list_users(&self) -> anyhow::Result<Vec<String>>;
}

/// Outbound transport for alert events (email, SSE, push).
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()>;
}

/// Sink for alerts raised by the batch monitor.
#[async_trait]
pub trait MonitorNotifier: Send + Sync {
    async fn notify(&self, alert: &ChannelAlert) -> anyhow::Result<()>;
}
