//! Training event log tailer
//!
//! One tailer per local rank follows `events_<rank>.log`, parses each
//! line and forwards step events to the sink. Missing files and read
//! errors are retried, never fatal.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::{parse_line, EventKind, EventTarget, ParseOutcome, TrainEvent, TrainEventName};

/// Default wait before retrying a missing or unreadable event file
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiver of collected training events
pub trait EventSink: Send + Sync {
    fn report_event(&self, event: &TrainEvent);
}

/// Tails per-rank event logs and reports step events
pub struct EventCollector {
    file_dir: PathBuf,
    local_world_size: usize,
    retry_timeout: Duration,
    sink: Arc<dyn EventSink>,
    stop: AtomicBool,
}

impl EventCollector {
    pub fn new(
        file_dir: impl Into<PathBuf>,
        local_world_size: usize,
        retry_timeout: Duration,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            file_dir: file_dir.into(),
            local_world_size,
            retry_timeout,
            sink,
            stop: AtomicBool::new(false),
        }
    }

    /// Spawn one tailer per local rank
    pub fn start_collectors(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.stop.store(false, Ordering::SeqCst);
        (0..self.local_world_size)
            .map(|rank| {
                let collector = Arc::clone(self);
                info!(rank, "Starting event collector");
                tokio::spawn(async move { collector.collect_events(rank).await })
            })
            .collect()
    }

    pub fn stop_collectors(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Tail one rank's event file until stopped
    pub async fn collect_events(&self, rank: usize) {
        let filepath = self.file_dir.join(format!("events_{}.log", rank));
        info!(file = %filepath.display(), "Collecting events");

        let mut first_step: Option<u64> = None;
        while !self.stopped() {
            match self.monitor_file(&filepath, &mut first_step).await {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(file = %filepath.display(), "Event file not found yet");
                    tokio::time::sleep(self.retry_timeout).await;
                }
                Err(e) => {
                    error!(file = %filepath.display(), error = %e, "Error reading event file");
                    tokio::time::sleep(self.retry_timeout).await;
                }
            }
        }
    }

    async fn monitor_file(
        &self,
        filepath: &std::path::Path,
        first_step: &mut Option<u64>,
    ) -> std::io::Result<()> {
        let file = tokio::fs::File::open(filepath).await?;
        let mut reader = BufReader::new(file);
        info!(file = %filepath.display(), "Monitoring events");

        let mut line = String::new();
        loop {
            if self.stopped() {
                info!(file = %filepath.display(), "Stopped collecting events");
                return Ok(());
            }

            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            let event = match parse_line(&line) {
                ParseOutcome::Valid(event) => event,
                ParseOutcome::Skipped => continue,
                ParseOutcome::Malformed(reason) => {
                    warn!(line = line.trim(), reason, "Dropping malformed event line");
                    continue;
                }
            };

            // The first step after a rendezvous only anchors the stream;
            // reporting starts from the next step.
            if first_step.is_none()
                && event.target == EventTarget::Trainer
                && event.name == TrainEventName::Step
                && event.kind == EventKind::Begin
            {
                info!(step = event.step, "Collected first step since last rendezvous");
                *first_step = Some(event.step);
            }
            if let Some(first) = *first_step {
                if event.step != first {
                    debug!(step = event.step, "Reporting event");
                    self.sink.report_event(&event);
                }
            }
        }
    }
}
