// Domain layer - Sensor data, verdicts and alerts
pub mod alert;
pub mod channel;
pub mod error;
pub mod reading;
pub mod severity;
