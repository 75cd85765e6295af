pub mod classifier;
pub mod clock;
pub mod dedupe;
pub mod epoch;
pub mod line_parser;
pub mod log_watch;
pub mod notifier;
pub mod pipeline;
pub mod settings;
pub mod snapshot_diff;
pub mod store;
pub mod tracker;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub use notifier::Notification;
pub use settings::TrackerSettings;
pub use tracker::Tracker;

/// Runs the tracker described by the settings at `config_path` until Ctrl+C.
/// Notifications are written to stdout, one JSON object per line.
pub async fn run(config_path: &Path) -> Result<(), String> {
    let settings = TrackerSettings::load(config_path)?;
    let tracker = Tracker::from_settings(&settings, Arc::new(clock::SystemClock))?;

    let printer = tokio::spawn(print_notifications(tracker.subscribe()));

    let watcher = match settings.log_path.clone() {
        Some(log_path) => Some(log_watch::start_log_watch(tracker.clone(), log_path)?),
        None => {
            tracing::warn!("No logPath configured; waiting without a text feed");
            None
        }
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| format!("Failed to listen for shutdown signal: {error}"))?;
    tracing::info!("Shutting down");

    if let Some(handle) = watcher {
        handle.abort();
    }
    printer.abort();

    let summary = tracker.summary(None)?;
    tracing::info!(
        epoch = summary.epoch,
        active = summary.totals.active,
        destroyed = summary.totals.destroyed,
        "Final tally"
    );

    Ok(())
}

async fn print_notifications(mut receiver: tokio::sync::broadcast::Receiver<Notification>) {
    loop {
        match receiver.recv().await {
            Ok(notification) => {
                let line = match serde_json::to_string(&notification) {
                    Ok(line) => line,
                    Err(error) => {
                        tracing::warn!("Failed to serialize notification: {error}");
                        continue;
                    }
                };

                let mut stdout = std::io::stdout().lock();
                if let Err(error) = writeln!(stdout, "{line}") {
                    tracing::warn!("Failed to write notification: {error}");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification printer fell behind; dropped oldest");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
