// Alert and notification preference domain models
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reading::Reading;
use super::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Instant,
    Hourly,
    Daily,
    Weekly,
    Off,
}

impl Frequency {
    /// Aggregation window for digest frequencies.
    pub fn digest_window(&self) -> Option<Duration> {
        match self {
            Frequency::Hourly => Some(Duration::hours(1)),
            Frequency::Daily => Some(Duration::days(1)),
            Frequency::Weekly => Some(Duration::weeks(1)),
            Frequency::Instant | Frequency::Off => None,
        }
    }
}

/// Per-user delivery settings, owned by the user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreference {
    pub enabled: bool,
    pub frequency: Frequency,
    pub notify_on_status_change: bool,
    pub notify_on_temperature_threshold: bool,
    pub temperature_threshold: f64,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: Frequency::Instant,
            notify_on_status_change: true,
            notify_on_temperature_threshold: true,
            temperature_threshold: 30.0,
        }
    }
}

impl NotificationPreference {
    pub fn is_silenced(&self) -> bool {
        !self.enabled || self.frequency == Frequency::Off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Deviation,
    StatusChange,
    TemperatureThreshold,
    Digest,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Deviation => "deviation",
            AlertKind::StatusChange => "status_change",
            AlertKind::TemperatureThreshold => "temperature_threshold",
            AlertKind::Digest => "digest",
        }
    }
}

/// A notification handed to the dispatcher. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub user_id: String,
    pub sensor_id: String,
    pub field_path: String,
    pub severity: Severity,
    pub kind: AlertKind,
    pub message: String,
    pub reading_snapshot: Option<Reading>,
    pub created_at: DateTime<Utc>,
    /// Identical for re-deliveries of the same condition to the same user and
    /// distinct otherwise; consumers drop repeats by it.
    pub dedupe_key: String,
}

impl AlertEvent {
    pub fn for_reading(
        user_id: &str,
        reading: &Reading,
        field_path: impl Into<String>,
        severity: Severity,
        kind: AlertKind,
        message: String,
    ) -> Self {
        let field_path = field_path.into();
        let dedupe_key = format!(
            "{}|{}|{}|{}|{}|{}",
            user_id,
            reading.sensor_id,
            field_path,
            kind.as_str(),
            reading.timestamp.timestamp_millis(),
            severity
        );
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            sensor_id: reading.sensor_id.clone(),
            field_path,
            severity,
            kind,
            message,
            reading_snapshot: Some(reading.clone()),
            created_at: Utc::now(),
            dedupe_key,
        }
    }

    /// Keyed by the start of the window so a retried window keeps its key.
    pub fn digest(
        user_id: &str,
        sensor_id: &str,
        severity: Severity,
        message: String,
        window_start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            sensor_id: sensor_id.to_string(),
            field_path: "*".to_string(),
            severity,
            kind: AlertKind::Digest,
            message,
            reading_snapshot: None,
            created_at: Utc::now(),
            dedupe_key: format!(
                "{}|{}|*|{}|{}",
                user_id,
                sensor_id,
                AlertKind::Digest.as_str(),
                window_start.timestamp_millis()
            ),
        }
    }
}
