// Digest service - Periodic batched notifications for non-instant users
use crate::application::alert_router::qualifying_conditions;
use crate::application::sensor_repository::{
    HistoryStore, NotificationDispatcher, PreferenceStore, SensorDirectory,
};
use crate::domain::alert::{AlertEvent, Frequency, NotificationPreference};
use crate::domain::severity::Severity;
use crate::infrastructure::config::AlertSettings;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Background sweep that aggregates qualifying readings per user and sensor.
///
/// Reads the stores only. Readings that land while a sweep is running may
/// fall into this window or the next one.
pub struct DigestSweeper {
    history: Arc<dyn HistoryStore>,
    directory: Arc<dyn SensorDirectory>,
    preferences: Arc<dyn PreferenceStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    settings: AlertSettings,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DigestSweeper {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        directory: Arc<dyn SensorDirectory>,
        preferences: Arc<dyn PreferenceStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        settings: AlertSettings,
    ) -> Self {
        Self {
            history,
            directory,
            preferences,
            dispatcher,
            settings,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = std::time::Duration::from_secs(self.settings.digest_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Digest sweeper cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(0) => tracing::debug!("Digest sweep: nothing due"),
                        Ok(sent) => tracing::info!(sent, "Digest sweep delivered"),
                        Err(e) => tracing::error!("Digest sweep failed: {}", e),
                    }
                }
            }
        }
    }

    /// Run one pass at `now`, returning how many digests were delivered.
    ///
    /// A user's first pass only anchors their window; the first digest
    /// follows once a full window has elapsed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut delivered = 0;

        for user_id in self.preferences.list_users().await? {
            let Some(preference) = self.preferences.notification_preference(&user_id).await? else {
                continue;
            };
            if preference.is_silenced() {
                continue;
            }
            let Some(window) = preference.frequency.digest_window() else {
                continue;
            };

            let window_start = {
                let mut last_sent = self.last_sent.lock().await;
                match last_sent.get(&user_id).copied() {
                    None => {
                        last_sent.insert(user_id.clone(), now);
                        continue;
                    }
                    Some(last) if now - last < window => continue,
                    Some(last) => last,
                }
            };

            let events = match self
                .digest_for_user(&user_id, &preference, window_start, now)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!(user_id = %user_id, "Failed to build digest: {}", e);
                    continue;
                }
            };

            let mut all_delivered = true;
            for event in &events {
                match self.dispatcher.deliver(event).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        all_delivered = false;
                        tracing::error!(user_id = %user_id, "Failed to deliver digest: {}", e);
                    }
                }
            }

            // Failed windows are retried on the next tick
            if all_delivered {
                self.last_sent.lock().await.insert(user_id, now);
            }
        }

        Ok(delivered)
    }

    async fn digest_for_user(
        &self,
        user_id: &str,
        preference: &NotificationPreference,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AlertEvent>> {
        let mut events = Vec::new();

        for sensor_id in self.directory.sensors_watched_by(user_id).await? {
            let mut records = self
                .history
                .recent_history(&sensor_id, self.settings.digest_scan_limit)
                .await?;
            records.sort_by(|a, b| a.reading.timestamp.cmp(&b.reading.timestamp));

            let mut summary: BTreeMap<String, (usize, Severity)> = BTreeMap::new();
            let mut worst: Option<Severity> = None;

            for (i, record) in records.iter().enumerate() {
                let ts = record.reading.timestamp;
                if ts <= window_start || ts > now {
                    continue;
                }
                let previous = i.checked_sub(1).map(|p| &records[p].reading);
                for q in qualifying_conditions(&record.reading, &record.alerts, previous, preference) {
                    let entry = summary
                        .entry(q.field_path)
                        .or_insert((0, q.severity));
                    entry.0 += 1;
                    entry.1 = entry.1.max(q.severity);
                    worst = Some(worst.map_or(q.severity, |w| w.max(q.severity)));
                }
            }

            let Some(worst) = worst else {
                continue;
            };

            events.push(AlertEvent::digest(
                user_id,
                &sensor_id,
                worst,
                digest_message(&sensor_id, preference.frequency, &summary),
                window_start,
            ));
        }

        Ok(events)
    }
}

fn digest_message(
    sensor_id: &str,
    frequency: Frequency,
    summary: &BTreeMap<String, (usize, Severity)>,
) -> String {
    let total: usize = summary.values().map(|(count, _)| count).sum();
    let period = match frequency {
        Frequency::Hourly => "hour",
        Frequency::Daily => "day",
        Frequency::Weekly => "week",
        Frequency::Instant | Frequency::Off => "period",
    };
    let details: Vec<String> = summary
        .iter()
        .map(|(field, (count, severity))| format!("{} {} x{}", field, severity, count))
        .collect();
    format!(
        "{} alerts for sensor {} in the last {}: {}",
        total,
        sensor_id,
        period,
        details.join(", ")
    )
}
