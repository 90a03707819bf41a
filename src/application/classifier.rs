// Classifier - Per-field severity verdicts for a reading
use crate::application::baseline::Baseline;
use crate::domain::error::PositionError;
use crate::domain::reading::{Axis, HistoryWindow, Reading, Value};
use crate::domain::severity::{ClassificationResult, Severity, Verdict};
use crate::infrastructure::config::ClassifierSettings;
use std::collections::{BTreeMap, HashSet};

pub const POSITION_FIELD: &str = "position";

/// Judges a reading against hard physical limits and its own history.
///
/// Evaluation order per reading:
/// 1. hard limits (`pitch`, `roll` by default) short-circuit to `danger`
/// 2. `position` is validated and only ever yields `invalid`
/// 3. with fewer than `min_history` prior samples nothing else is judged
/// 4. remaining numeric fields (and vector components) are graded by their
///    relative deviation from the history mean
///
/// Fields that none of these steps can judge are left out of the result.
#[derive(Debug, Clone)]
pub struct Classifier {
    settings: ClassifierSettings,
}

impl Classifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn classify(&self, history: &HistoryWindow, reading: &Reading) -> ClassificationResult {
        let mut result = ClassificationResult::new();
        let mut settled: HashSet<&str> = HashSet::new();

        for (field, limit) in &self.settings.hard_limits {
            let Some(value) = reading.field(field).and_then(Value::as_f64) else {
                continue;
            };
            if !limit.contains(value) {
                tracing::debug!(
                    sensor_id = %reading.sensor_id,
                    field = %field,
                    value,
                    "Outside physical envelope"
                );
                result.set(field.as_str(), Severity::Danger);
                settled.insert(field.as_str());
            }
        }

        if let Some(position) = reading.field(POSITION_FIELD) {
            if let Err(e) = parse_position(position) {
                tracing::debug!(sensor_id = %reading.sensor_id, "Invalid position: {}", e);
                result.set(POSITION_FIELD, Severity::Invalid);
            }
            settled.insert(POSITION_FIELD);
        }

        if history.len() < self.settings.min_history {
            return result;
        }

        let baseline = Baseline::from_history(history);

        for (field, value) in &reading.fields {
            if settled.contains(field.as_str()) {
                continue;
            }

            match value {
                Value::Vector(vector) => {
                    let mut components = BTreeMap::new();
                    for axis in Axis::ALL {
                        let current = vector.component(axis);
                        let mean = baseline.component_mean(field, axis);
                        if let (Some(current), Some(mean)) = (current, mean) {
                            components.insert(axis, self.grade(current, mean));
                        }
                    }
                    if !components.is_empty() {
                        result.insert(field.as_str(), Verdict::Vector(components));
                    }
                }
                other => {
                    if let (Some(current), Some(mean)) = (other.as_f64(), baseline.mean(field)) {
                        result.set(field.as_str(), self.grade(current, mean));
                    }
                }
            }
        }

        result
    }

    fn grade(&self, value: f64, mean: f64) -> Severity {
        let deviation = relative_deviation(value, mean);
        if deviation > self.settings.danger_deviation {
            Severity::Danger
        } else if deviation > self.settings.warning_deviation {
            Severity::Warning
        } else {
            Severity::Good
        }
    }
}

/// `|value - mean| / |mean|`, infinite for a zero mean.
pub fn relative_deviation(value: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        return f64::INFINITY;
    }
    (value - mean).abs() / mean.abs()
}

/// Parse a `"lat,lon"` string and check both coordinates are on the globe.
pub fn parse_position(value: &Value) -> Result<(f64, f64), PositionError> {
    let raw = match value {
        Value::Text(s) => s.as_str(),
        other => return Err(PositionError::Malformed(format!("{:?}", other))),
    };

    let mut parts = raw.split(',');
    let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PositionError::Malformed(raw.to_string()));
    };

    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| PositionError::Malformed(raw.to_string()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| PositionError::Malformed(raw.to_string()))?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(PositionError::OutOfRange { lat, lon });
    }
    Ok((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reading::Vector3;
    use chrono::{Duration, Utc};

    fn classifier() -> Classifier {
        Classifier::new(ClassifierSettings::default())
    }

    fn history_of(count: usize, field: &str, value: Value) -> HistoryWindow {
        let now = Utc::now();
        HistoryWindow::new(
            (0..count)
                .map(|i| {
                    Reading::new("s1", now - Duration::minutes(i as i64 + 1))
                        .with_field(field, value.clone())
                })
                .collect(),
        )
    }

    fn reading_with(field: &str, value: Value) -> Reading {
        Reading::new("s1", Utc::now()).with_field(field, value)
    }

    #[test]
    fn test_temperature_scenario() {
        let history = history_of(12, "temperature", Value::Float(24.0));
        let c = classifier();

        let result = c.classify(&history, &reading_with("temperature", Value::Float(30.0)));
        assert_eq!(result.severity("temperature"), Some(Severity::Danger));

        let result = c.classify(&history, &reading_with("temperature", Value::Float(26.0)));
        assert_eq!(result.severity("temperature"), Some(Severity::Good));

        let result = c.classify(&history, &reading_with("temperature", Value::Float(27.0)));
        assert_eq!(result.severity("temperature"), Some(Severity::Warning));
    }

    #[test]
    fn test_deviation_thresholds_are_strict() {
        let history = history_of(5, "adc", Value::Float(20.0));
        let c = classifier();

        // exactly 10% above the mean
        let result = c.classify(&history, &reading_with("adc", Value::Float(22.0)));
        assert_eq!(result.severity("adc"), Some(Severity::Good));

        // exactly 20% above the mean
        let result = c.classify(&history, &reading_with("adc", Value::Float(24.0)));
        assert_eq!(result.severity("adc"), Some(Severity::Warning));

        // deviation applies in both directions
        let result = c.classify(&history, &reading_with("adc", Value::Float(15.0)));
        assert_eq!(result.severity("adc"), Some(Severity::Danger));
    }

    #[test]
    fn test_cold_history_only_reports_limits_and_position() {
        let history = history_of(2, "temperature", Value::Float(24.0));
        let reading = Reading::new("s1", Utc::now())
            .with_field("temperature", Value::Float(100.0))
            .with_field("pitch", Value::Float(120.0))
            .with_field("position", Value::Text("91,0".into()));

        let result = classifier().classify(&history, &reading);
        assert_eq!(result.len(), 2);
        assert_eq!(result.severity("pitch"), Some(Severity::Danger));
        assert_eq!(result.severity("position"), Some(Severity::Invalid));
        assert!(!result.contains("temperature"));
    }

    #[test]
    fn test_pitch_and_roll_boundaries() {
        let c = classifier();
        let history = history_of(5, "pitch", Value::Float(90.0));

        let result = c.classify(&history, &reading_with("pitch", Value::Float(90.0)));
        assert_eq!(result.severity("pitch"), Some(Severity::Good));

        let result = c.classify(&history, &reading_with("pitch", Value::Float(90.0001)));
        assert_eq!(result.severity("pitch"), Some(Severity::Danger));

        let history = history_of(5, "roll", Value::Float(-180.0));
        let result = c.classify(&history, &reading_with("roll", Value::Float(-180.0)));
        assert_eq!(result.severity("roll"), Some(Severity::Good));

        let result = c.classify(&history, &reading_with("roll", Value::Float(180.5)));
        assert_eq!(result.severity("roll"), Some(Severity::Danger));
    }

    #[test]
    fn test_hard_limit_skips_statistics() {
        // History mean is far from the value, but only the limit verdict applies
        let history = history_of(5, "roll", Value::Float(10.0));
        let result = classifier().classify(&history, &reading_with("roll", Value::Int(-200)));
        assert_eq!(result.severity("roll"), Some(Severity::Danger));
    }

    #[test]
    fn test_position_validation() {
        let c = classifier();
        let history = HistoryWindow::default();

        let result = c.classify(&history, &reading_with("position", Value::Text("45.0,-122.0".into())));
        assert!(!result.contains("position"));

        let result = c.classify(&history, &reading_with("position", Value::Text("91,0".into())));
        assert_eq!(result.severity("position"), Some(Severity::Invalid));

        let result = c.classify(
            &history,
            &reading_with("position", Value::Text("not-a-number,5".into())),
        );
        assert_eq!(result.severity("position"), Some(Severity::Invalid));

        let result = c.classify(&history, &reading_with("position", Value::Float(45.0)));
        assert_eq!(result.severity("position"), Some(Severity::Invalid));
    }

    #[test]
    fn test_position_never_compared_statistically() {
        let history = history_of(5, "position", Value::Text("10.0,10.0".into()));
        let result = classifier().classify(
            &history,
            &reading_with("position", Value::Text("80.0,170.0".into())),
        );
        assert_eq!(result, ClassificationResult::new());
    }

    #[test]
    fn test_vector_components_evaluated_independently() {
        let history = history_of(
            12,
            "accelerometer",
            Value::Vector(Vector3::new(Some(0.1), Some(0.2), Some(0.3))),
        );
        let reading = reading_with(
            "accelerometer",
            Value::Vector(Vector3::new(Some(0.15), Some(0.2), None)),
        );

        let result = classifier().classify(&history, &reading);
        assert_eq!(result.component("accelerometer", Axis::X), Some(Severity::Danger));
        assert_eq!(result.component("accelerometer", Axis::Y), Some(Severity::Good));
        assert_eq!(result.component("accelerometer", Axis::Z), None);
    }

    #[test]
    fn test_fields_without_baseline_are_omitted() {
        let history = history_of(5, "temperature", Value::Float(24.0));
        let reading = Reading::new("s1", Utc::now())
            .with_field("temperature", Value::Float(24.0))
            .with_field("humidity", Value::Float(40.0))
            .with_field("gyroscope", Value::Vector(Vector3::new(Some(1.0), None, None)));

        let result = classifier().classify(&history, &reading);
        assert_eq!(result.severity("temperature"), Some(Severity::Good));
        assert!(!result.contains("humidity"));
        assert!(!result.contains("gyroscope"));
    }

    #[test]
    fn test_zero_mean_is_infinite_deviation() {
        assert!(relative_deviation(0.0, 0.0).is_infinite());
        let history = history_of(5, "adc", Value::Int(0));
        let result = classifier().classify(&history, &reading_with("adc", Value::Int(1)));
        assert_eq!(result.severity("adc"), Some(Severity::Danger));
    }

    #[test]
    fn test_negative_mean_uses_magnitude() {
        assert!((relative_deviation(-11.0, -10.0) - 0.1).abs() < 1e-12);
        let history = history_of(5, "gyro_z", Value::Float(-10.0));
        let result = classifier().classify(&history, &reading_with("gyro_z", Value::Float(-13.0)));
        assert_eq!(result.severity("gyro_z"), Some(Severity::Danger));
    }

    #[test]
    fn test_classification_is_deterministic_and_idempotent() {
        let c = classifier();
        let history = history_of(6, "temperature", Value::Float(24.0));
        let reading = reading_with("temperature", Value::Float(26.0));

        let first = c.classify(&history, &reading);
        let second = c.classify(&history, &reading);
        assert_eq!(first, second);
        assert_eq!(first.severity("temperature"), Some(Severity::Good));

        // Appending an identical reading does not move the verdict
        let mut readings: Vec<Reading> = history.iter().cloned().collect();
        readings.push(reading.clone());
        readings.push(reading.clone());
        let grown = HistoryWindow::new(readings);
        let third = c.classify(&grown, &reading);
        assert_eq!(third.severity("temperature"), first.severity("temperature"));
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let settings = ClassifierSettings {
            warning_deviation: 0.3,
            danger_deviation: 0.5,
            ..ClassifierSettings::default()
        };
        let history = history_of(5, "temperature", Value::Float(24.0));
        let result = Classifier::new(settings)
            .classify(&history, &reading_with("temperature", Value::Float(30.0)));
        assert_eq!(result.severity("temperature"), Some(Severity::Good));
    }
}
