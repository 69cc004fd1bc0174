//! Telemetry
//!
//! Structured events emitted at every stage transition of the quote/swap
//! pipeline. Stages only see the `TelemetrySink` trait; the batching
//! recorder and its HTTP transport are wired in by the binary.
//!
//! Created: 2026-10-04

pub mod recorder;
pub mod transport;

pub use recorder::TelemetryRecorder;
pub use transport::{HttpTransport, TelemetryTransport};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// One stage transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    QuoteRequested {
        chain_id: u64,
        in_token: String,
        out_token: String,
        in_amount: String,
    },
    QuoteSucceeded {
        out_amount: String,
        session_id: Option<String>,
        elapsed_ms: u64,
    },
    QuoteFailed {
        error: String,
    },
    WrapRequested {
        amount: String,
    },
    WrapSucceeded {
        tx_hash: String,
    },
    WrapFailed {
        error: String,
    },
    ApprovalRequested {
        token: String,
    },
    ApprovalSucceeded {
        tx_hash: String,
    },
    ApprovalFailed {
        error: String,
    },
    SignatureRequested,
    SignatureSucceeded,
    SignatureFailed {
        error: String,
    },
    SwapRequested {
        session_id: Option<String>,
    },
    SwapSucceeded {
        tx_hash: String,
    },
    SwapFailed {
        step: String,
        error: String,
    },
    SettlementSucceeded {
        tx_hash: String,
        block_number: Option<u64>,
    },
}

/// Event plus the time it was recorded
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

impl TelemetryRecord {
    pub fn now(event: TelemetryEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Receiver of pipeline events. Must not block the caller.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Logs events and drops them
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, event: TelemetryEvent) {
        debug!(target: "telemetry", ?event, "telemetry event");
    }
}

/// Keeps every event in memory so tests can assert on the stage sequence
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryTelemetry {
    events: std::sync::Mutex<Vec<TelemetryEvent>>,
}

#[cfg(test)]
impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
impl TelemetrySink for MemoryTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}
