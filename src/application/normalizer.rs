// Reading normalizer - Raw payload to canonical reading
use crate::domain::error::IngestError;
use crate::domain::reading::{Reading, SensorStatus, Value, Vector3, SCALAR_FIELDS, VECTOR_FIELDS};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Map;

/// Convert an untyped payload into a [`Reading`].
///
/// Only a missing `sensor_id` is fatal. Malformed vectors are dropped and
/// unknown keys are carried through unchanged.
pub fn normalize(payload: serde_json::Value) -> Result<Reading, IngestError> {
    let serde_json::Value::Object(mut data) = payload else {
        return Err(IngestError::MissingIdentifier);
    };

    let sensor_id = take_sensor_id(&mut data)?;

    let timestamp = match data.remove("timestamp") {
        Some(raw) => parse_timestamp(&raw).unwrap_or_else(|| {
            tracing::warn!(sensor_id = %sensor_id, "Unparseable timestamp {}, using now", raw);
            Utc::now()
        }),
        None => Utc::now(),
    };

    let status = match data.remove("status") {
        Some(serde_json::Value::String(s)) => SensorStatus::from(s),
        Some(serde_json::Value::Null) | None => SensorStatus::Active,
        Some(other) => SensorStatus::from(other.to_string()),
    };

    let mut reading = Reading::new(sensor_id, timestamp).with_status(status);

    for field in SCALAR_FIELDS {
        if let Some(raw) = data.remove(field) {
            reading.fields.insert(field.to_string(), Value::from_json(raw));
        }
    }

    for field in VECTOR_FIELDS {
        if let Some(raw) = data.remove(field) {
            match normalize_vector(&raw) {
                Some(vector) => {
                    reading.fields.insert(field.to_string(), Value::Vector(vector));
                }
                None => {
                    tracing::debug!(
                        sensor_id = %reading.sensor_id,
                        field,
                        "Dropping malformed vector field"
                    );
                }
            }
        }
    }

    // Sensor-specific channels pass through untouched
    for (key, raw) in data {
        reading.fields.insert(key, Value::from_json(raw));
    }

    Ok(reading)
}

fn take_sensor_id(data: &mut Map<String, serde_json::Value>) -> Result<String, IngestError> {
    let id = match data.remove("sensor_id") {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(IngestError::MissingIdentifier),
    };

    if id.trim().is_empty() {
        return Err(IngestError::MissingIdentifier);
    }
    Ok(id)
}

/// Object with `x/y/z` keys, or an array of at least three numbers.
fn normalize_vector(raw: &serde_json::Value) -> Option<Vector3> {
    match raw {
        serde_json::Value::Object(map) => {
            let component = |key: &str| map.get(key).and_then(serde_json::Value::as_f64);
            Some(Vector3::new(component("x"), component("y"), component("z")))
        }
        serde_json::Value::Array(items) if items.len() >= 3 => {
            let x = items[0].as_f64()?;
            let y = items[1].as_f64()?;
            let z = items[2].as_f64()?;
            Some(Vector3::new(Some(x), Some(y), Some(z)))
        }
        _ => None,
    }
}

fn parse_timestamp(raw: &serde_json::Value) -> Option<DateTime<Utc>> {
    match raw {
        serde_json::Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            // Naive ISO-8601 timestamps are taken as UTC
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        }
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
