use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::IngestReport;
use crate::tracker::Tracker;

/// Primes `tracker` with the current content of `log_path` and spawns a task
/// that ingests every later snapshot of the file.
pub fn start_log_watch(tracker: Tracker, log_path: PathBuf) -> Result<JoinHandle<()>, String> {
    let initial_text = read_snapshot(&log_path)?;
    tracker.prime(&initial_text)?;
    tracing::info!(
        log_path = %log_path.display(),
        primed_bytes = initial_text.len(),
        "Watching text feed"
    );

    Ok(tokio::spawn(async move {
        if let Err(error) = watch_text_feed(tracker, &log_path).await {
            tracing::error!("Text feed watcher stopped: {error}");
        }
    }))
}

async fn watch_text_feed(tracker: Tracker, log_path: &Path) -> Result<(), String> {
    let (notify_sender, mut notify_receiver) =
        mpsc::unbounded_channel::<Result<Event, notify::Error>>();

    let mut watcher = notify::recommended_watcher(move |result| {
        if notify_sender.send(result).is_err() {
            tracing::debug!("Text feed watcher notification receiver dropped");
        }
    })
    .map_err(|error| error.to_string())?;

    let watch_directory = log_path
        .parent()
        .map(|parent| {
            if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            }
        })
        .ok_or_else(|| format!("Invalid text feed path '{}'", log_path.display()))?;
    watcher
        .watch(watch_directory, RecursiveMode::NonRecursive)
        .map_err(|error| error.to_string())?;

    while let Some(notification_result) = notify_receiver.recv().await {
        match notification_result {
            Ok(event) => {
                if !is_relevant_notification(&event, log_path) {
                    continue;
                }

                if let Err(error) = ingest_file_snapshot(&tracker, log_path) {
                    tracing::warn!("Failed to ingest text feed update: {error}");
                }
            }
            Err(error) => {
                tracing::warn!("Text feed watcher error: {error}");
            }
        }
    }

    Ok(())
}

fn is_relevant_notification(event: &Event, log_path: &Path) -> bool {
    let relevant_kind = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    if !relevant_kind {
        return false;
    }

    let Some(log_file_name) = log_path.file_name() else {
        return false;
    };

    event.paths.iter().any(|path| {
        path == log_path
            || path
                .file_name()
                .map(|file_name| file_name == log_file_name)
                .unwrap_or(false)
    })
}

fn ingest_file_snapshot(tracker: &Tracker, log_path: &Path) -> Result<IngestReport, String> {
    let text = read_snapshot(log_path)?;
    let report = tracker.ingest_snapshot(&text)?;
    if report.new_lines > 0 {
        tracing::debug!(
            new_lines = report.new_lines,
            unit_events = report.unit_events,
            suppressed_events = report.suppressed_events,
            epoch_advances = report.epoch_advances,
            "Ingested text feed snapshot"
        );
    }
    Ok(report)
}

fn read_snapshot(log_path: &Path) -> Result<String, String> {
    match std::fs::read(log_path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(error) => Err(format!(
            "Failed to read text feed '{}': {error}",
            log_path.display()
        )),
    }
}
