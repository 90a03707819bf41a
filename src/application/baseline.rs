// Baseline estimator - Running averages over a history window
use crate::domain::reading::{Axis, HistoryWindow, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Per-field means computed fresh from one history window.
///
/// Entries where a field is absent or non-numeric are skipped rather than
/// counted as zero.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    scalars: HashMap<String, Accumulator>,
    components: HashMap<String, BTreeMap<Axis, Accumulator>>,
}

impl Baseline {
    pub fn from_history(history: &HistoryWindow) -> Self {
        let mut baseline = Self::default();

        for reading in history.iter() {
            for (name, value) in &reading.fields {
                match value {
                    Value::Vector(vector) => {
                        let axes = baseline.components.entry(name.clone()).or_default();
                        for axis in Axis::ALL {
                            if let Some(v) = vector.component(axis) {
                                axes.entry(axis).or_default().add(v);
                            }
                        }
                    }
                    other => {
                        if let Some(v) = other.as_f64() {
                            baseline.scalars.entry(name.clone()).or_default().add(v);
                        }
                    }
                }
            }
        }

        baseline
    }

    /// Mean of a scalar field, `None` when no entry carried it.
    pub fn mean(&self, field: &str) -> Option<f64> {
        self.scalars.get(field).and_then(Accumulator::mean)
    }

    /// Mean of one vector component, `None` when no entry carried it.
    pub fn component_mean(&self, field: &str, axis: Axis) -> Option<f64> {
        self.components
            .get(field)
            .and_then(|axes| axes.get(&axis))
            .and_then(Accumulator::mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reading::{Reading, Vector3};
    use chrono::{Duration, Utc};

    fn reading(offset: i64) -> Reading {
        Reading::new("s1", Utc::now() - Duration::minutes(offset))
    }

    #[test]
    fn test_scalar_mean_skips_absent_and_non_numeric() {
        let history = HistoryWindow::new(vec![
            reading(1).with_field("temperature", Value::Float(24.0)),
            reading(2).with_field("temperature", Value::Int(25)),
            reading(3).with_field("temperature", Value::Text("n/a".into())),
            reading(4),
        ]);

        let baseline = Baseline::from_history(&history);
        assert_eq!(baseline.mean("temperature"), Some(24.5));
        assert_eq!(baseline.mean("humidity"), None);
    }

    #[test]
    fn test_component_means_are_independent() {
        let history = HistoryWindow::new(vec![
            reading(1).with_field(
                "accelerometer",
                Value::Vector(Vector3::new(Some(0.1), Some(0.2), None)),
            ),
            reading(2).with_field(
                "accelerometer",
                Value::Vector(Vector3::new(Some(0.3), None, None)),
            ),
        ]);

        let baseline = Baseline::from_history(&history);
        assert!((baseline.component_mean("accelerometer", Axis::X).unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(baseline.component_mean("accelerometer", Axis::Y), Some(0.2));
        assert_eq!(baseline.component_mean("accelerometer", Axis::Z), None);
    }

    #[test]
    fn test_empty_history_has_no_baseline() {
        let baseline = Baseline::from_history(&HistoryWindow::default());
        assert_eq!(baseline.mean("temperature"), None);
        assert_eq!(baseline.component_mean("gyroscope", Axis::X), None);
    }
}
