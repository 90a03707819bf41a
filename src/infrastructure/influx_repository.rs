// InfluxDB history store implementation
use crate::application::sensor_repository::HistoryStore;
use crate::domain::reading::{
    Axis, ClassifiedReading, Reading, SensorStatus, Value, Vector3, VECTOR_FIELDS,
};
use crate::domain::severity::ClassificationResult;
use crate::infrastructure::config::InfluxSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

const SENSOR_TAG: &str = "sensor_id";
const STATUS_COLUMN: &str = "sensor_status";
const CLASSIFICATION_COLUMN: &str = "classification";

#[derive(Debug, Clone)]
pub struct InfluxHistoryStore {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    measurement: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxHistoryStore {
    pub fn new(settings: InfluxSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token,
            database: settings.database,
            retention_policy: settings.retention_policy,
            measurement: settings.measurement,
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    fn build_write_url(&self) -> String {
        format!(
            "{}/write?db={}&rp={}&precision=ms",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy)
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        if let Some(result) = data.results.first() {
            if let Some(error) = &result.error {
                anyhow::bail!("InfluxDB query error: {}", error);
            }
        }

        Ok(data)
    }
}

#[async_trait]
impl HistoryStore for InfluxHistoryStore {
    async fn recent_history(&self, sensor_id: &str, limit: usize) -> Result<Vec<ClassifiedReading>> {
        let query = format!(
            "SELECT * FROM \"{}\" WHERE \"{}\" = '{}' ORDER BY time DESC LIMIT {}",
            self.measurement,
            SENSOR_TAG,
            escape_literal(sensor_id),
            limit
        );

        tracing::debug!("Executing history query: {}", query);
        let response = self.execute_query(&query).await?;

        let mut records = Vec::new();
        if let Some(result) = response.results.first() {
            if let Some(series) = &result.series {
                for s in series {
                    for row in &s.values {
                        match row_to_record(&s.columns, row) {
                            Some(record) => records.push(record),
                            None => tracing::warn!(sensor_id, "Skipping unreadable history row"),
                        }
                    }
                }
            }
        }

        // Influx already orders by time; keep newest-first even across series
        records.sort_by(|a, b| b.reading.timestamp.cmp(&a.reading.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    async fn append_reading(&self, record: ClassifiedReading) -> Result<String> {
        let line = to_line_protocol(&self.measurement, &record)?;

        let response = self
            .client
            .post(self.build_write_url())
            .header("Authorization", format!("Token {}", self.token))
            .body(line)
            .send()
            .await
            .context("Failed to write reading to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB write failed with status {}: {}", status, body);
        }

        Ok(format!(
            "{}@{}",
            record.reading.sensor_id,
            record.reading.timestamp.timestamp_millis()
        ))
    }
}

/// Encode a record as one line of InfluxDB line protocol (millisecond precision).
///
/// Numbers are always written as floats, whole or not, so a field keeps
/// one Influx type however the sensor formats it. Vectors are flattened to
/// `<field>_x|_y|_z`; free-form JSON values are stored as strings.
fn to_line_protocol(measurement: &str, record: &ClassifiedReading) -> Result<String> {
    let reading = &record.reading;
    let mut fields: Vec<String> = vec![
        format!("{}={}", STATUS_COLUMN, quote_string(&reading.status.to_string())),
        format!(
            "{}={}",
            CLASSIFICATION_COLUMN,
            quote_string(&serde_json::to_string(&record.alerts)?)
        ),
    ];

    for (name, value) in &reading.fields {
        if name == STATUS_COLUMN || name == CLASSIFICATION_COLUMN || name == SENSOR_TAG {
            tracing::warn!(field = %name, "Field collides with a reserved column, not stored");
            continue;
        }
        let key = escape_key(name);
        match value {
            Value::Int(v) => fields.push(format!("{}={}", key, v)),
            Value::Float(v) if v.is_finite() => fields.push(format!("{}={}", key, v)),
            Value::Float(_) => {}
            Value::Text(s) => fields.push(format!("{}={}", key, quote_string(s))),
            Value::Vector(vector) => {
                for axis in Axis::ALL {
                    if let Some(v) = vector.component(axis).filter(|v| v.is_finite()) {
                        fields.push(format!("{}_{}={}", key, axis, v));
                    }
                }
            }
            Value::Other(json) => {
                fields.push(format!("{}={}", key, quote_string(&json.to_string())))
            }
        }
    }

    Ok(format!(
        "{},{}={} {} {}",
        escape_key(measurement),
        SENSOR_TAG,
        escape_key(&reading.sensor_id),
        fields.join(","),
        reading.timestamp.timestamp_millis()
    ))
}

fn row_to_record(columns: &[String], row: &[serde_json::Value]) -> Option<ClassifiedReading> {
    let mut sensor_id = None;
    let mut timestamp = None;
    let mut status = SensorStatus::Active;
    let mut alerts = ClassificationResult::new();
    let mut fields = BTreeMap::new();
    let mut vectors: BTreeMap<String, Vector3> = BTreeMap::new();

    for (column, value) in columns.iter().zip(row) {
        if value.is_null() {
            continue;
        }
        match column.as_str() {
            "time" => {
                let parsed = DateTime::parse_from_rfc3339(value.as_str()?).ok()?;
                timestamp = Some(parsed.with_timezone(&Utc));
            }
            SENSOR_TAG => sensor_id = value.as_str().map(str::to_string),
            STATUS_COLUMN => {
                if let Some(s) = value.as_str() {
                    status = SensorStatus::from(s.to_string());
                }
            }
            CLASSIFICATION_COLUMN => {
                if let Some(parsed) = value.as_str().and_then(|s| serde_json::from_str(s).ok()) {
                    alerts = parsed;
                }
            }
            name => {
                if let Some((field, axis)) = split_vector_column(name) {
                    let vector = vectors.entry(field.to_string()).or_default();
                    let component = value.as_f64();
                    match axis {
                        Axis::X => vector.x = component,
                        Axis::Y => vector.y = component,
                        Axis::Z => vector.z = component,
                    }
                } else {
                    fields.insert(name.to_string(), Value::from_json(value.clone()));
                }
            }
        }
    }

    for (name, vector) in vectors {
        fields.insert(name, Value::Vector(vector));
    }

    let mut reading = Reading::new(sensor_id?, timestamp?).with_status(status);
    reading.fields = fields;
    Some(ClassifiedReading::new(reading, alerts))
}

fn split_vector_column(column: &str) -> Option<(&str, Axis)> {
    let (field, suffix) = column.rsplit_once('_')?;
    if !VECTOR_FIELDS.contains(&field) {
        return None;
    }
    let axis = match suffix {
        "x" => Axis::X,
        "y" => Axis::Y,
        "z" => Axis::Z,
        _ => return None,
    };
    Some((field, axis))
}

/// Escape a measurement name, tag value or field key.
fn escape_key(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn quote_string(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Escape an InfluxQL single-quoted string literal.
fn escape_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}
