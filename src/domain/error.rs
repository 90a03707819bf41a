// Domain errors
use thiserror::Error;

/// Failures that reject an incoming reading outright.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("sensor_id is required")]
    MissingIdentifier,

    #[error("sensor not registered: {0}")]
    UnknownSensor(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Why a `position` value could not be accepted.
#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("position is not a \"lat,lon\" pair: {0}")]
    Malformed(String),

    #[error("position out of range: lat={lat}, lon={lon}")]
    OutOfRange { lat: f64, lon: f64 },
}
