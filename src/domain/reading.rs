// Sensor reading domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::severity::ClassificationResult;

/// Scalar channels copied through as-is by the normalizer.
pub const SCALAR_FIELDS: [&str; 5] = ["adc", "temperature", "roll", "pitch", "position"];

/// Tri-axis channels normalized into [`Vector3`].
pub const VECTOR_FIELDS: [&str; 3] = ["accelerometer", "magnetometer", "gyroscope"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vector3 {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl Vector3 {
    pub fn new(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        Self { x, y, z }
    }

    pub fn component(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// A single field value of a reading.
///
/// Integral numbers keep their integer form so that `adc` counts survive a
/// round trip through storage unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vector3),
    Other(serde_json::Value),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts an arbitrary JSON value without applying any vector rules.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .unwrap_or(Value::Other(serde_json::Value::Number(n))),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Other(other),
        }
    }
}

/// Operating status reported by a sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorStatus {
    #[default]
    Active,
    Inactive,
    Other(String),
}

impl From<String> for SensorStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => SensorStatus::Active,
            "inactive" => SensorStatus::Inactive,
            _ => SensorStatus::Other(value),
        }
    }
}

impl From<SensorStatus> for String {
    fn from(value: SensorStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorStatus::Active => f.write_str("active"),
            SensorStatus::Inactive => f.write_str("inactive"),
            SensorStatus::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: SensorStatus,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Reading {
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            status: SensorStatus::Active,
            fields: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_status(mut self, status: SensorStatus) -> Self {
        self.status = status;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A reading together with the verdict it received at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedReading {
    pub reading: Reading,
    #[serde(default)]
    pub alerts: ClassificationResult,
}

impl ClassifiedReading {
    pub fn new(reading: Reading, alerts: ClassificationResult) -> Self {
        Self { reading, alerts }
    }
}

/// Most recent readings for one sensor, newest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    readings: Vec<Reading>,
}

impl HistoryWindow {
    /// Builds a window, ordering entries newest first regardless of input order.
    pub fn new(mut readings: Vec<Reading>) -> Self {
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self { readings }
    }

    pub fn from_records(records: Vec<ClassifiedReading>) -> Self {
        Self::new(records.into_iter().map(|r| r.reading).collect())
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Newest reading strictly older than `at`.
    pub fn latest_before(&self, at: DateTime<Utc>) -> Option<&Reading> {
        self.readings.iter().find(|r| r.timestamp < at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }
}
