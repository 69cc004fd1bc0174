//! Batching Telemetry Recorder
//!
//! `record()` only pushes onto an unbounded channel, so pipeline stages never
//! wait on analytics. A background task collects events and flushes them
//! once no new event arrived for the debounce window, or as soon as a batch
//! is full. Pending events are flushed on shutdown.
//!
//! Created: 2026-10-04

use super::{TelemetryEvent, TelemetryRecord, TelemetrySink, TelemetryTransport};
use crate::config::TelemetryConfig;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct TelemetryRecorder {
    tx: UnboundedSender<TelemetryRecord>,
}

impl TelemetryRecorder {
    /// Start the flush task. Dropping every recorder clone (or cancelling
    /// `shutdown`) flushes what is left and ends the task.
    pub fn spawn<T>(transport: T, config: &TelemetryConfig, shutdown: CancellationToken) -> (Self, JoinHandle<()>)
    where
        T: TelemetryTransport + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let debounce = Duration::from_millis(config.flush_debounce_ms);
        let max_batch = config.max_batch.max(1);
        let handle = tokio::spawn(run_flush_loop(transport, rx, debounce, max_batch, shutdown));
        (Self { tx }, handle)
    }
}

impl TelemetrySink for TelemetryRecorder {
    fn record(&self, event: TelemetryEvent) {
        info!(target: "telemetry", ?event, "stage event");
        if self.tx.send(TelemetryRecord::now(event)).is_err() {
            debug!(target: "telemetry", "recorder stopped, event dropped");
        }
    }
}

async fn flush<T: TelemetryTransport>(transport: &T, buffer: &mut Vec<TelemetryRecord>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    match transport.send(&batch).await {
        Ok(()) => debug!(target: "telemetry", "flushed {} events", batch.len()),
        Err(e) => warn!(target: "telemetry", "dropping {} events: {:#}", batch.len(), e),
    }
}

async fn run_flush_loop<T: TelemetryTransport>(
    transport: T,
    mut rx: UnboundedReceiver<TelemetryRecord>,
    debounce: Duration,
    max_batch: usize,
    shutdown: CancellationToken,
) {
    let mut buffer: Vec<TelemetryRecord> = Vec::new();
    let mut flush_at: Option<Instant> = None;

    loop {
        let deadline = flush_at.unwrap_or_else(Instant::now);
        tokio::select! {
            _ = shutdown.cancelled() => {
                flush(&transport, &mut buffer).await;
                break;
            }
            maybe = rx.recv() => match maybe {
                Some(record) => {
                    buffer.push(record);
                    if buffer.len() >= max_batch {
                        flush(&transport, &mut buffer).await;
                        flush_at = None;
                    } else {
                        flush_at = Some(Instant::now() + debounce);
                    }
                }
                None => {
                    flush(&transport, &mut buffer).await;
                    break;
                }
            },
            _ = sleep_until(deadline), if flush_at.is_some() => {
                flush(&transport, &mut buffer).await;
                flush_at = None;
            }
        }
    }
}
