use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase(String),
    DownloadStarted {
        ordinal: usize,
        total: usize,
        file_name: String,
        content_length: Option<u64>,
    },
    Bytes(u64),
    DownloadFinished { ok: bool },
}

/// Best-effort progress callback. Implementations must not fail the run.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Terminal progress bars on stderr, one per download.
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(content_length: Option<u64>) -> ProgressBar {
        match content_length {
            Some(len) => {
                let bar = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::with_template(
                    "{msg} [{bar:10.green}] {bytes}/{total_bytes} ({bytes_per_sec})",
                ) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} {bytes}") {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(65));
                bar
            }
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        match event {
            ProgressEvent::Phase(message) => {
                if let Some(bar) = guard.as_ref() {
                    bar.println(&message);
                } else {
                    eprintln!("{message}");
                }
            }
            ProgressEvent::DownloadStarted {
                ordinal,
                total,
                file_name,
                content_length,
            } => {
                let bar = Self::start(content_length);
                bar.set_message(format!("[{ordinal}/{total}] Downloading \"{file_name}\"..."));
                if let Some(previous) = guard.replace(bar) {
                    previous.finish_and_clear();
                }
            }
            ProgressEvent::Bytes(count) => {
                if let Some(bar) = guard.as_ref() {
                    bar.inc(count);
                }
            }
            ProgressEvent::DownloadFinished { ok } => {
                if let Some(bar) = guard.take() {
                    if ok {
                        bar.finish();
                    } else {
                        bar.abandon_with_message("failed");
                    }
                }
            }
        }
    }
}

/// Drops every event.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn event(&self, _event: ProgressEvent) {}
}
