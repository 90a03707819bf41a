// Alert router - Verdicts to notification events per user preference
use crate::domain::alert::{AlertEvent, AlertKind, Frequency, NotificationPreference};
use crate::domain::reading::Reading;
use crate::domain::severity::{ClassificationResult, Severity};

pub const TEMPERATURE_FIELD: &str = "temperature";
pub const STATUS_FIELD: &str = "status";

/// A condition on a reading that a user should hear about.
#[derive(Debug, Clone, PartialEq)]
pub struct Qualifying {
    pub field_path: String,
    pub severity: Severity,
    pub kind: AlertKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Notifications disabled or frequency is `off`
    Silenced,
    /// Left for the digest sweep of the given frequency
    Deferred(Frequency),
    /// Events to hand to the dispatcher now; may be empty
    Immediate(Vec<AlertEvent>),
}

/// Collect every qualifying condition for one reading.
///
/// Non-good severities always qualify. A status transition and a
/// temperature above the user's threshold qualify when the matching
/// preference flag is set, whatever their statistical severity.
pub fn qualifying_conditions(
    reading: &Reading,
    result: &ClassificationResult,
    previous: Option<&Reading>,
    preference: &NotificationPreference,
) -> Vec<Qualifying> {
    let mut conditions: Vec<Qualifying> = result
        .leaves()
        .into_iter()
        .filter(|(_, severity)| severity.is_alerting())
        .map(|(field_path, severity)| Qualifying {
            message: format!(
                "Sensor {} reported {} on {}",
                reading.sensor_id, severity, field_path
            ),
            field_path,
            severity,
            kind: AlertKind::Deviation,
        })
        .collect();

    if preference.notify_on_status_change {
        if let Some(previous) = previous {
            if previous.status != reading.status {
                conditions.push(Qualifying {
                    field_path: STATUS_FIELD.to_string(),
                    severity: Severity::Warning,
                    kind: AlertKind::StatusChange,
                    message: format!(
                        "Sensor {} status changed from {} to {}",
                        reading.sensor_id, previous.status, reading.status
                    ),
                });
            }
        }
    }

    if preference.notify_on_temperature_threshold {
        if let Some(temperature) = reading.field(TEMPERATURE_FIELD).and_then(|v| v.as_f64()) {
            if temperature > preference.temperature_threshold {
                conditions.push(Qualifying {
                    field_path: TEMPERATURE_FIELD.to_string(),
                    severity: Severity::Danger,
                    kind: AlertKind::TemperatureThreshold,
                    message: format!(
                        "Sensor {} temperature {} exceeds threshold {}",
                        reading.sensor_id, temperature, preference.temperature_threshold
                    ),
                });
            }
        }
    }

    conditions
}

/// Decide what a single user receives for a freshly classified reading.
///
/// Only the instant path builds events; digest frequencies return
/// immediately and leave the reading to the periodic sweep.
pub fn route(
    user_id: &str,
    reading: &Reading,
    result: &ClassificationResult,
    previous: Option<&Reading>,
    preference: &NotificationPreference,
) -> RoutingDecision {
    if preference.is_silenced() {
        return RoutingDecision::Silenced;
    }
    if preference.frequency != Frequency::Instant {
        return RoutingDecision::Deferred(preference.frequency);
    }

    let events = qualifying_conditions(reading, result, previous, preference)
        .into_iter()
        .map(|q| AlertEvent::for_reading(user_id, reading, q.field_path, q.severity, q.kind, q.message))
        .collect();

    RoutingDecision::Immediate(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reading::{Axis, SensorStatus, Value};
    use crate::domain::severity::Verdict;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn quiet_preference() -> NotificationPreference {
        NotificationPreference {
            notify_on_status_change: false,
            notify_on_temperature_threshold: false,
            ..NotificationPreference::default()
        }
    }

    fn mixed_result() -> ClassificationResult {
        let mut result = ClassificationResult::new();
        result.set("temperature", Severity::Good);
        result.set("position", Severity::Invalid);
        let mut accel = BTreeMap::new();
        accel.insert(Axis::X, Severity::Danger);
        accel.insert(Axis::Y, Severity::Warning);
        accel.insert(Axis::Z, Severity::Good);
        result.insert("accelerometer", Verdict::Vector(accel));
        result
    }

    #[test]
    fn test_instant_emits_one_event_per_alerting_leaf() {
        let reading = Reading::new("s1", Utc::now());
        let decision = route("u1", &reading, &mixed_result(), None, &quiet_preference());

        let RoutingDecision::Immediate(events) = decision else {
            panic!("expected immediate delivery");
        };
        let mut paths: Vec<(&str, Severity)> = events
            .iter()
            .map(|e| (e.field_path.as_str(), e.severity))
            .collect();
        paths.sort_by_key(|(p, _)| *p);
        assert_eq!(
            paths,
            vec![
                ("accelerometer.x", Severity::Danger),
                ("accelerometer.y", Severity::Warning),
                ("position", Severity::Invalid),
            ]
        );
        assert!(events.iter().all(|e| e.user_id == "u1" && e.sensor_id == "s1"));
        assert!(events.iter().all(|e| e.reading_snapshot.as_ref() == Some(&reading)));
    }

    #[test]
    fn test_disabled_or_off_is_silenced() {
        let reading = Reading::new("s1", Utc::now());
        let mut pref = quiet_preference();
        pref.enabled = false;
        assert_eq!(
            route("u1", &reading, &mixed_result(), None, &pref),
            RoutingDecision::Silenced
        );

        pref.enabled = true;
        pref.frequency = Frequency::Off;
        assert_eq!(
            route("u1", &reading, &mixed_result(), None, &pref),
            RoutingDecision::Silenced
        );
    }

    #[test]
    fn test_digest_frequencies_are_deferred() {
        let reading = Reading::new("s1", Utc::now());
        for frequency in [Frequency::Hourly, Frequency::Daily, Frequency::Weekly] {
            let pref = NotificationPreference {
                frequency,
                ..quiet_preference()
            };
            assert_eq!(
                route("u1", &reading, &mixed_result(), None, &pref),
                RoutingDecision::Deferred(frequency)
            );
        }
    }

    #[test]
    fn test_status_change_qualifies_when_enabled() {
        let previous = Reading::new("s1", Utc::now());
        let reading = Reading::new("s1", Utc::now()).with_status(SensorStatus::Inactive);
        let empty = ClassificationResult::new();

        let conditions = qualifying_conditions(&reading, &empty, Some(&previous), &quiet_preference());
        assert!(conditions.is_empty());

        let pref = NotificationPreference {
            notify_on_status_change: true,
            ..quiet_preference()
        };
        let conditions = qualifying_conditions(&reading, &empty, Some(&previous), &pref);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].kind, AlertKind::StatusChange);
        assert!(conditions[0].message.contains("from active to inactive"));

        // No previous reading means no transition
        assert!(qualifying_conditions(&reading, &empty, None, &pref).is_empty());
    }

    #[test]
    fn test_temperature_threshold_overrides_good_severity() {
        let reading = Reading::new("s1", Utc::now()).with_field("temperature", Value::Float(31.0));
        let mut result = ClassificationResult::new();
        result.set("temperature", Severity::Good);

        let pref = NotificationPreference {
            notify_on_temperature_threshold: true,
            temperature_threshold: 30.0,
            ..quiet_preference()
        };
        let conditions = qualifying_conditions(&reading, &result, None, &pref);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].kind, AlertKind::TemperatureThreshold);
        assert_eq!(conditions[0].severity, Severity::Danger);

        // At the threshold is not above it
        let at = Reading::new("s1", Utc::now()).with_field("temperature", Value::Float(30.0));
        assert!(qualifying_conditions(&at, &result, None, &pref).is_empty());
    }

    #[test]
    fn test_hot_reading_events_have_distinct_dedupe_keys() {
        let reading = Reading::new("s1", Utc::now()).with_field("temperature", Value::Float(40.0));
        let mut result = ClassificationResult::new();
        result.set("temperature", Severity::Danger);
        let pref = NotificationPreference::default();

        let RoutingDecision::Immediate(alice) = route("alice", &reading, &result, None, &pref) else {
            panic!("expected immediate delivery");
        };
        let RoutingDecision::Immediate(bob) = route("bob", &reading, &result, None, &pref) else {
            panic!("expected immediate delivery");
        };

        // Deviation and threshold events for the same field stay separate
        assert_eq!(alice.len(), 2);
        assert_ne!(alice[0].kind, alice[1].kind);
        assert_ne!(alice[0].dedupe_key, alice[1].dedupe_key);

        for (a, b) in alice.iter().zip(&bob) {
            assert_ne!(a.dedupe_key, b.dedupe_key);
        }
    }
}
