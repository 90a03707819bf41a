// Monitor service - Fixed-band replay of pre-loaded channels
//
// This is the standalone batch mode. Each channel is judged against a
// band around its own mean, computed once over the whole dataset, and the
// values are replayed one at a time with a fixed delay in between. The
// classifier's adaptive rules play no part here.
use crate::application::sensor_repository::MonitorNotifier;
use crate::domain::channel::{Band, Channel, ChannelAlert, Direction};
use crate::infrastructure::config::BandPolicy;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSummary {
    pub name: String,
    pub band: Option<Band>,
    pub evaluated: usize,
    pub alerts: usize,
    /// False when cancelled before the last value
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    pub channels: Vec<ChannelSummary>,
}

impl MonitorReport {
    pub fn total_alerts(&self) -> usize {
        self.channels.iter().map(|c| c.alerts).sum()
    }

    pub fn completed(&self) -> bool {
        self.channels.iter().all(|c| c.completed)
    }
}

#[derive(Clone)]
pub struct MonitorService {
    notifier: Arc<dyn MonitorNotifier>,
    band: f64,
    policy: BandPolicy,
    delay: Duration,
}

impl MonitorService {
    pub fn new(
        notifier: Arc<dyn MonitorNotifier>,
        band: f64,
        policy: BandPolicy,
        delay: Duration,
    ) -> Self {
        Self {
            notifier,
            band,
            policy,
            delay,
        }
    }

    /// Start one worker per channel and wait for every one of them.
    ///
    /// Cancelling `cancel` stops each worker at its next sleep; the report
    /// then shows how far each channel got.
    pub async fn run(&self, channels: Vec<Channel>, cancel: CancellationToken) -> MonitorReport {
        let names: Vec<String> = channels.iter().map(|c| c.name.clone()).collect();

        let handles: Vec<_> = channels
            .into_iter()
            .map(|channel| {
                let worker = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.watch_channel(channel, cancel).await })
            })
            .collect();

        let mut report = MonitorReport::default();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(summary) => report.channels.push(summary),
                Err(e) => {
                    tracing::error!(channel = %name, "Monitor worker failed: {}", e);
                    report.channels.push(ChannelSummary {
                        name,
                        band: None,
                        evaluated: 0,
                        alerts: 0,
                        completed: false,
                    });
                }
            }
        }
        report
    }

    async fn watch_channel(&self, channel: Channel, cancel: CancellationToken) -> ChannelSummary {
        let mut summary = ChannelSummary {
            name: channel.name.clone(),
            band: None,
            evaluated: 0,
            alerts: 0,
            completed: true,
        };

        let Some(mean) = channel.mean() else {
            tracing::warn!(channel = %channel.name, "Empty channel, nothing to monitor");
            return summary;
        };
        let band = Band::around(mean, self.band);
        summary.band = Some(band);

        tracing::info!(
            channel = %channel.name,
            mean,
            lower = band.lower,
            upper = band.upper,
            values = channel.values.len(),
            "Monitoring channel"
        );

        for (index, &value) in channel.values.iter().enumerate() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(channel = %channel.name, evaluated = summary.evaluated, "Monitor cancelled");
                    summary.completed = false;
                    return summary;
                }
                _ = tokio::time::sleep(self.delay) => {}
            }

            summary.evaluated += 1;
            let Some(direction) = self.out_of_band(value, &band) else {
                tracing::debug!(channel = %channel.name, value, "Normal");
                continue;
            };

            summary.alerts += 1;
            let alert = ChannelAlert {
                channel: channel.name.clone(),
                index,
                value,
                direction,
                band,
            };
            if let Err(e) = self.notifier.notify(&alert).await {
                tracing::error!(channel = %channel.name, "Failed to send monitor alert: {}", e);
            }
        }

        summary
    }

    fn out_of_band(&self, value: f64, band: &Band) -> Option<Direction> {
        if value > band.upper {
            Some(Direction::High)
        } else if value < band.lower && self.policy == BandPolicy::Both {
            Some(Direction::Low)
        } else {
            None
        }
    }
}
