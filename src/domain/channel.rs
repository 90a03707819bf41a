// Batch monitoring channel models
use serde::{Deserialize, Serialize};
use std::fmt;

/// One named series of historical values replayed by the batch monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }
}

/// Fixed acceptance band around a channel mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    /// `mean ± |mean · fraction|`, so the band stays ordered for negative means.
    pub fn around(mean: f64, fraction: f64) -> Self {
        let margin = (mean * fraction).abs();
        Self {
            lower: mean - margin,
            upper: mean + margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    High,
    Low,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::High => f.write_str("HIGH"),
            Direction::Low => f.write_str("LOW"),
        }
    }
}

/// Out-of-band value found while replaying a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAlert {
    pub channel: String,
    pub index: usize,
    pub value: f64,
    pub direction: Direction,
    pub band: Band,
}

impl ChannelAlert {
    pub fn message(&self) -> String {
        format!(
            "WARNING SECTION {} IS ABNORMALLY {}: {}",
            self.channel, self.direction, self.value
        )
    }
}
