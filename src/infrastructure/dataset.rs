// Dataset loading for the batch monitor
use crate::domain::channel::Channel;
use anyhow::{Context, Result};
use std::path::Path;

/// Timestamp column written by the data logger, never a channel.
const TIMESTAMP_COLUMN: &str = "Date & Time";

/// Load channels from a `.csv` or `.json` dataset, chosen by extension.
pub fn load_channels(path: &Path) -> Result<Vec<Channel>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let channels = match extension.as_deref() {
        Some("csv") => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open dataset {}", path.display()))?;
            channels_from_csv(file)?
        }
        Some("json") => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read dataset {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse dataset {}", path.display()))?
        }
        _ => anyhow::bail!(
            "Unsupported dataset format for {} (expected .csv or .json)",
            path.display()
        ),
    };

    tracing::info!(path = %path.display(), channels = channels.len(), "Loaded dataset");
    Ok(channels)
}

/// Header row names the channels. Blank, non-numeric or non-finite cells
/// read as 0.
fn channels_from_csv<R: std::io::Read>(reader: R) -> Result<Vec<Channel>> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = csv.headers().context("Dataset has no header row")?.clone();
    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (i, name.trim().to_string()))
        .filter(|(_, name)| name != TIMESTAMP_COLUMN)
        .collect();

    let mut channels: Vec<Channel> = columns
        .iter()
        .map(|(_, name)| Channel::new(name.clone(), Vec::new()))
        .collect();

    for (row, record) in csv.records().enumerate() {
        let record = record.with_context(|| format!("Malformed dataset row {}", row + 1))?;
        for (channel, (index, _)) in channels.iter_mut().zip(&columns) {
            let cell = record.get(*index).unwrap_or("").trim();
            // NaN and inf parse as f64 but count as missing
            let value = cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or_else(|| {
                    if !cell.is_empty() {
                        tracing::debug!(channel = %channel.name, row, cell, "Non-numeric cell read as 0");
                    }
                    0.0
                });
            channel.values.push(value);
        }
    }

    Ok(channels)
}
