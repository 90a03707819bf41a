// In-memory history, directory and preference store
use crate::application::sensor_repository::{HistoryStore, PreferenceStore, SensorDirectory};
use crate::domain::alert::NotificationPreference;
use crate::domain::reading::ClassifiedReading;
use crate::infrastructure::config::DirectoryConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    history: RwLock<HashMap<String, Vec<ClassifiedReading>>>,
    // sensor_id -> watchers
    sensors: RwLock<HashMap<String, BTreeSet<String>>>,
    preferences: RwLock<HashMap<String, NotificationPreference>>,
}

impl InMemoryStore {
    pub fn from_directory(directory: DirectoryConfig) -> Self {
        let sensors = directory
            .sensors
            .into_iter()
            .map(|entry| (entry.sensor_id, entry.watchers.into_iter().collect()))
            .collect();

        Self {
            history: RwLock::new(HashMap::new()),
            sensors: RwLock::new(sensors),
            preferences: RwLock::new(directory.preferences),
        }
    }
}

#[cfg(test)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_sensor(&self, sensor_id: &str, watchers: &[&str]) {
        let mut sensors = self.sensors.write().await;
        let entry = sensors.entry(sensor_id.to_string()).or_default();
        entry.extend(watchers.iter().map(|w| w.to_string()));
    }

    pub async fn set_preference(&self, user_id: &str, preference: NotificationPreference) {
        self.preferences
            .write()
            .await
            .insert(user_id.to_string(), preference);
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn recent_history(&self, sensor_id: &str, limit: usize) -> Result<Vec<ClassifiedReading>> {
        let history = self.history.read().await;
        let Some(records) = history.get(sensor_id) else {
            return Ok(Vec::new());
        };

        // Arrival order is not time order; sort on the way out
        let mut records = records.clone();
        records.sort_by(|a, b| b.reading.timestamp.cmp(&a.reading.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    async fn append_reading(&self, record: ClassifiedReading) -> Result<String> {
        let mut history = self.history.write().await;
        let records = history.entry(record.reading.sensor_id.clone()).or_default();
        let id = format!("{}-{}", record.reading.sensor_id, records.len());
        records.push(record);
        Ok(id)
    }
}

#[async_trait]
impl SensorDirectory for InMemoryStore {
    async fn is_registered(&self, sensor_id: &str) -> Result<bool> {
        Ok(self.sensors.read().await.contains_key(sensor_id))
    }

    async fn users_watching(&self, sensor_id: &str) -> Result<Vec<String>> {
        Ok(self
            .sensors
            .read()
            .await
            .get(sensor_id)
            .map(|watchers| watchers.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sensors_watched_by(&self, user_id: &str) -> Result<Vec<String>> {
        let sensors = self.sensors.read().await;
        let mut watched: Vec<String> = sensors
            .iter()
            .filter(|(_, watchers)| watchers.contains(user_id))
            .map(|(sensor_id, _)| sensor_id.clone())
            .collect();
        watched.sort();
        Ok(watched)
    }
}

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn notification_preference(&self, user_id: &str) -> Result<Option<NotificationPreference>> {
        Ok(self.preferences.read().await.get(user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let mut users: Vec<String> = self.preferences.read().await.keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}
