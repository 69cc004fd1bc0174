//! Quote Module
//!
//! Hub quote fetching: the HTTP client, the polling engine (keys, generations,
//! coalescing, backoff) and the task that drives it.

pub mod client;
pub mod engine;
pub mod poller;

pub use client::{HubClient, QuoteApi, QuoteApiRequest};
pub use engine::{ApplyOutcome, DisabledReason, QuoteEngine, QuoteKey, QuoteRequest, QuoteState, QuoteTicket, SwapPhase};
pub use poller::PollerHandle;
