//! Quote Poller Task
//!
//! Drives a `QuoteEngine` from a single task: debounces input changes,
//! issues requests, applies results and schedules refetches. Inputs and the
//! swap phase come in over watch channels; the latest `QuoteState` goes out
//! on another. Because only this task touches the engine, there is exactly
//! one writer for the quote state.
//!
//! Created: 2026-10-06

use super::client::QuoteApi;
use super::engine::{QuoteEngine, QuoteKey, QuoteRequest, QuoteState, SwapPhase};
use crate::error::QuoteError;
use crate::types::Quote;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type PendingQuote = BoxFuture<'static, (u64, QuoteKey, Result<Quote, QuoteError>)>;

pub struct PollerHandle {
    /// `None` clears the quote (amount emptied, token deselected)
    pub inputs: watch::Sender<Option<QuoteRequest>>,
    pub phase: watch::Sender<SwapPhase>,
    pub quotes: watch::Receiver<QuoteState>,
    pub task: JoinHandle<()>,
}

impl PollerHandle {
    /// Replace the inputs; identical inputs do not restart the debounce
    pub fn set_request(&self, request: Option<QuoteRequest>) {
        self.inputs.send_if_modified(|current| {
            if *current == request {
                false
            } else {
                *current = request;
                true
            }
        });
    }

    pub fn set_phase(&self, phase: SwapPhase) {
        self.phase.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });
    }
}

pub fn spawn<A: QuoteApi + 'static>(engine: QuoteEngine<A>, shutdown: CancellationToken) -> PollerHandle {
    let (inputs_tx, inputs_rx) = watch::channel(None);
    let (phase_tx, phase_rx) = watch::channel(SwapPhase::Configuring);
    let (quotes_tx, quotes_rx) = watch::channel(QuoteState::default());

    let task = tokio::spawn(run(engine, inputs_rx, phase_rx, quotes_tx, shutdown));

    PollerHandle {
        inputs: inputs_tx,
        phase: phase_tx,
        quotes: quotes_rx,
        task,
    }
}

async fn run<A: QuoteApi + 'static>(
    mut engine: QuoteEngine<A>,
    mut inputs: watch::Receiver<Option<QuoteRequest>>,
    mut phase_rx: watch::Receiver<SwapPhase>,
    quotes: watch::Sender<QuoteState>,
    shutdown: CancellationToken,
) {
    let mut request: Option<QuoteRequest> = None;
    let mut phase = SwapPhase::Configuring;
    let mut next_fetch: Option<Instant> = None;
    let mut pending: Option<PendingQuote> = None;

    info!("Quote poller started");

    loop {
        let deadline = next_fetch;
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            changed = inputs.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = inputs.borrow_and_update().clone();
                // Dropping the pending future aborts the request
                pending = None;
                engine.cancel_in_flight();

                match latest.as_ref() {
                    Some(req) if engine.disabled_reason(req).is_none() => {
                        next_fetch = Some(Instant::now() + engine.debounce_for(req));
                        debug!("Inputs changed, quote scheduled");
                    }
                    other => {
                        if let Some(reason) = other.and_then(|req| engine.disabled_reason(req)) {
                            debug!("Quote disabled: {:?}", reason);
                        }
                        engine.clear();
                        next_fetch = None;
                    }
                }
                request = latest;
                quotes.send_replace(engine.state().clone());
            }

            changed = phase_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                phase = *phase_rx.borrow_and_update();
                if phase == SwapPhase::Swapping {
                    pending = None;
                    engine.cancel_in_flight();
                    next_fetch = None;
                    quotes.send_replace(engine.state().clone());
                    debug!("Swap started, quote polling paused");
                } else if pending.is_none() && request.is_some() {
                    let stale = engine
                        .refetch_interval(phase)
                        .map(|interval| engine.state().is_stale(interval))
                        .unwrap_or(true);
                    if stale || next_fetch.is_none() {
                        next_fetch = Some(Instant::now());
                    }
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() && phase != SwapPhase::Swapping => {
                next_fetch = None;
                if let Some(req) = request.as_ref() {
                    match engine.issue(req) {
                        Some(ticket) => pending = Some(ticket.wait().boxed()),
                        None => engine.clear(),
                    }
                    quotes.send_replace(engine.state().clone());
                }
            }

            (generation, key, result) = async {
                match pending.as_mut() {
                    Some(fut) => fut.await,
                    None => std::future::pending().await,
                }
            } => {
                pending = None;
                engine.apply(generation, key, result);
                quotes.send_replace(engine.state().clone());

                if let Some(req) = request.as_ref() {
                    if engine.disabled_reason(req).is_none() {
                        next_fetch = engine.refetch_interval(phase).map(|interval| Instant::now() + interval);
                    }
                }
            }
        }
    }

    engine.cancel_in_flight();
    info!("Quote poller stopped");
}
