// Ingest service - Normalize, classify, persist and route a live reading
use crate::application::alert_router::{self, RoutingDecision};
use crate::application::classifier::Classifier;
use crate::application::normalizer::normalize;
use crate::application::sensor_repository::{
    HistoryStore, NotificationDispatcher, PreferenceStore, SensorDirectory,
};
use crate::domain::alert::AlertEvent;
use crate::domain::error::IngestError;
use crate::domain::reading::{ClassifiedReading, HistoryWindow, Reading};
use crate::domain::severity::ClassificationResult;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub id: String,
    pub sensor_id: String,
    pub alerts: ClassificationResult,
    pub notifications: usize,
}

/// Request-driven pipeline. Holds no mutable state of its own, so one
/// instance serves any number of concurrent readings.
#[derive(Clone)]
pub struct IngestService {
    history: Arc<dyn HistoryStore>,
    directory: Arc<dyn SensorDirectory>,
    preferences: Arc<dyn PreferenceStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    classifier: Classifier,
}

impl IngestService {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        directory: Arc<dyn SensorDirectory>,
        preferences: Arc<dyn PreferenceStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        classifier: Classifier,
    ) -> Self {
        Self {
            history,
            directory,
            preferences,
            dispatcher,
            classifier,
        }
    }

    pub async fn ingest(&self, payload: serde_json::Value) -> Result<IngestOutcome, IngestError> {
        let reading = normalize(payload)?;
        let sensor_id = reading.sensor_id.clone();

        if !self.directory.is_registered(&sensor_id).await? {
            return Err(IngestError::UnknownSensor(sensor_id));
        }

        let records = self
            .history
            .recent_history(&sensor_id, self.classifier.settings().history_window)
            .await?;
        let history = HistoryWindow::from_records(records);
        let alerts = self.classifier.classify(&history, &reading);

        let id = self
            .history
            .append_reading(ClassifiedReading::new(reading.clone(), alerts.clone()))
            .await?;

        tracing::debug!(
            sensor_id = %sensor_id,
            history = history.len(),
            verdicts = alerts.len(),
            "Classified reading {}",
            id
        );

        // Out-of-order readings compare with their own predecessor
        let previous = history.latest_before(reading.timestamp);
        let events = self.route_to_watchers(&reading, &alerts, previous).await;
        let notifications = events.len();
        self.dispatch(events);

        Ok(IngestOutcome {
            id,
            sensor_id,
            alerts,
            notifications,
        })
    }

    /// Recent classified records for a registered sensor, newest first.
    pub async fn history(
        &self,
        sensor_id: &str,
        limit: usize,
    ) -> Result<Vec<ClassifiedReading>, IngestError> {
        if !self.directory.is_registered(sensor_id).await? {
            return Err(IngestError::UnknownSensor(sensor_id.to_string()));
        }
        Ok(self.history.recent_history(sensor_id, limit).await?)
    }

    async fn route_to_watchers(
        &self,
        reading: &Reading,
        alerts: &ClassificationResult,
        previous: Option<&Reading>,
    ) -> Vec<AlertEvent> {
        // The reading is already stored; fan-out problems only cost notifications
        let users = match self.directory.users_watching(&reading.sensor_id).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(sensor_id = %reading.sensor_id, "Failed to load watchers: {}", e);
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for user_id in users {
            let preference = match self.preferences.notification_preference(&user_id).await {
                Ok(preference) => preference.unwrap_or_default(),
                Err(e) => {
                    tracing::error!(user_id = %user_id, "Failed to load preferences: {}", e);
                    continue;
                }
            };

            match alert_router::route(&user_id, reading, alerts, previous, &preference) {
                RoutingDecision::Immediate(mut user_events) => events.append(&mut user_events),
                RoutingDecision::Deferred(frequency) => {
                    tracing::debug!(user_id = %user_id, ?frequency, "Deferred to digest");
                }
                RoutingDecision::Silenced => {}
            }
        }
        events
    }

    /// Hand events to the dispatcher without waiting on delivery.
    fn dispatch(&self, events: Vec<AlertEvent>) {
        for event in events {
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher.deliver(&event).await {
                    tracing::error!(
                        user_id = %event.user_id,
                        sensor_id = %event.sensor_id,
                        "Failed to deliver alert {}: {}",
                        event.id,
                        e
                    );
                }
            });
        }
    }
}
