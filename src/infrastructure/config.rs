use crate::domain::alert::NotificationPreference;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub classifier: ClassifierSettings,
    pub alerts: AlertSettings,
    pub storage: StorageSettings,
    pub notifications: NotificationSettings,
    pub monitor: MonitorSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub directory: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            directory: "config/directory".to_string(),
        }
    }
}

/// Inclusive physical envelope for a field.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct HardLimit {
    pub min: f64,
    pub max: f64,
}

impl HardLimit {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Relative deviation strictly above which a field is `warning`
    pub warning_deviation: f64,
    /// Relative deviation strictly above which a field is `danger`
    pub danger_deviation: f64,
    /// Prior samples required before statistical classification applies
    pub min_history: usize,
    /// How many recent readings feed the baseline
    pub history_window: usize,
    /// Configured entries override the built-in limits field by field
    #[serde(deserialize_with = "merge_hard_limits")]
    pub hard_limits: HashMap<String, HardLimit>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            warning_deviation: 0.1,
            danger_deviation: 0.2,
            min_history: 3,
            history_window: 10,
            hard_limits: default_hard_limits(),
        }
    }
}

fn default_hard_limits() -> HashMap<String, HardLimit> {
    HashMap::from([
        ("pitch".to_string(), HardLimit { min: -90.0, max: 90.0 }),
        ("roll".to_string(), HardLimit { min: -180.0, max: 180.0 }),
    ])
}

fn merge_hard_limits<'de, D>(deserializer: D) -> Result<HashMap<String, HardLimit>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = HashMap::<String, HardLimit>::deserialize(deserializer)?;
    let mut limits = default_hard_limits();
    limits.extend(configured);
    Ok(limits)
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertSettings {
    pub digest_interval_secs: u64,
    pub digest_scan_limit: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            digest_interval_secs: 60,
            digest_scan_limit: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Influx,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub influx: Option<InfluxSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
}

fn default_measurement() -> String {
    "sensor_reading".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
    pub broadcast_capacity: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            broadcast_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BandPolicy {
    /// Alert above the upper bound and below the lower bound
    #[default]
    Both,
    HighOnly,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorSettings {
    /// Half-width of the acceptance band as a fraction of the mean
    pub band: f64,
    pub delay_ms: u64,
    pub direction: BandPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            band: 0.15,
            delay_ms: 1_800_000,
            direction: BandPolicy::Both,
        }
    }
}

/// Seed data for the in-memory sensor directory and preference store.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DirectoryConfig {
    pub sensors: Vec<SensorEntry>,
    pub preferences: HashMap<String, NotificationPreference>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorEntry {
    pub sensor_id: String,
    #[serde(default)]
    pub watchers: Vec<String>,
}

/// Load settings from `path` (any format the config crate knows), overridden
/// by `SENSORWATCH__SECTION__KEY` environment variables.
pub fn load_app_config(path: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("SENSORWATCH")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_directory_config(path: &str) -> anyhow::Result<DirectoryConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .build()?;

    Ok(settings.try_deserialize()?)
}
