//! Transfer progress display.

use crate::exec::Meter;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How often the progress line is refreshed
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

const UNITS: [&str; 5] = ["B", "kiB", "MiB", "GiB", "TiB"];

/// Human readable size with one decimal, e.g. `1.5 MiB`. Never goes past TiB.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// `12.0 MiB (4.0 MiB/s)`
pub fn progress_line(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        let rate = (bytes as f64 / secs) as u64;
        format!("{} ({}/s)", format_bytes(bytes), format_bytes(rate))
    } else {
        format_bytes(bytes)
    }
}

/// Refresh `bar` from `meter` once per [`PROGRESS_INTERVAL`], starting now.
fn spawn_ticker(bar: ProgressBar, meter: Meter) -> JoinHandle<()> {
    let started = Instant::now();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
        loop {
            interval.tick().await;
            bar.set_message(progress_line(meter.total(), started.elapsed()));
        }
    })
}

/// Spinner showing bytes metered so far for one transfer.
pub struct TransferProgress {
    bar: ProgressBar,
    ticker: Option<JoinHandle<()>>,
}

impl TransferProgress {
    /// Start refreshing from `meter` every [`PROGRESS_INTERVAL`]. A disabled
    /// reporter draws nothing.
    pub fn start(label: &str, meter: Meter, enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
                ticker: None,
            };
        }

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_prefix(label.to_string());

        let ticker = spawn_ticker(bar.clone(), meter);
        Self {
            bar,
            ticker: Some(ticker),
        }
    }

    pub fn finish(mut self) {
        self.stop();
        self.bar.finish_and_clear();
    }

    fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for TransferProgress {
    fn drop(&mut self) {
        self.stop();
    }
}
