//! Quote Polling Engine
//!
//! Purpose:
//!     Owns everything about the live hub quote except the timers: gating
//!     (disabled states), cache keys, in-flight coalescing, "last request
//!     wins" application, session-id threading and the adaptive refetch
//!     interval. The async loop that drives it lives in `poller.rs`.
//!
//! Created: 2026-10-05
//!
//! Design:
//!     - `issue()` hands out a `QuoteTicket` tagged with a generation number
//!     - Tickets for the same key share one in-flight request (`Shared`)
//!     - `apply()` drops every result whose generation is not the latest
//!     - No-route answers become zero-amount quotes, other errors leave no quote

use super::client::{QuoteApi, QuoteApiRequest};
use crate::amounts::slippage_to_bps;
use crate::chains;
use crate::config::{DexBetterPolicy, QuoteConfig};
use crate::error::QuoteError;
use crate::session::SessionRegistry;
use crate::swap::FailureCircuitBreaker;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{NoRouteReason, Quote, Token};
use alloy::primitives::{Address, U256};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Inputs of one quote as configured by the user
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub from_token: Token,
    pub to_token: Token,
    pub from_amount: U256,
    pub dex_min_amount_out: Option<U256>,
    pub slippage: f64,
    pub account: Option<Address>,
    pub chain_id: u64,
    pub partner: String,
}

/// Deterministic identity of a quote request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub slippage_bps: u32,
    pub api_url: String,
    pub chain_id: u64,
}

/// Why the engine refuses to issue a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    ZeroAmount,
    SameToken,
    UnsupportedChain,
    CircuitOpen,
    InvalidSlippage,
}

/// Where the user is in the trade flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapPhase {
    #[default]
    Configuring,
    /// Confirmation view open, quote must stay live
    Confirming,
    /// Swap attempt started, polling stops
    Swapping,
}

/// Latest visible quote state
#[derive(Debug, Clone, Default)]
pub struct QuoteState {
    pub quote: Option<Quote>,
    pub error: Option<QuoteError>,
    pub key: Option<QuoteKey>,
    pub fetched_at: Option<Instant>,
    pub generation: u64,
    pub is_loading: bool,
}

impl QuoteState {
    /// Hub output amount, zero when there is no usable quote
    pub fn out_amount(&self) -> U256 {
        self.quote.as_ref().map(|q| q.out_amount).unwrap_or(U256::ZERO)
    }

    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|t| t.elapsed())
    }

    /// Older than `max_age`, or never fetched
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age().map(|age| age > max_age).unwrap_or(true)
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Quote, QuoteError>>>;

/// Handle for an issued request; awaiting it never mutates engine state
pub struct QuoteTicket {
    pub generation: u64,
    pub key: QuoteKey,
    fetch: SharedFetch,
}

impl QuoteTicket {
    pub async fn wait(self) -> (u64, QuoteKey, Result<Quote, QuoteError>) {
        let result = self.fetch.await;
        (self.generation, self.key, result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer request was issued, result discarded
    Stale,
}

pub struct QuoteEngine<A: QuoteApi> {
    api: Arc<A>,
    config: QuoteConfig,
    sessions: Arc<SessionRegistry>,
    breaker: Arc<FailureCircuitBreaker>,
    telemetry: Arc<dyn TelemetrySink>,
    issued: u64,
    in_flight: HashMap<QuoteKey, SharedFetch>,
    issued_at: HashMap<u64, Instant>,
    state: QuoteState,
    unchanged_refetches: u32,
}

impl<A: QuoteApi + 'static> QuoteEngine<A> {
    pub fn new(
        api: Arc<A>,
        config: QuoteConfig,
        sessions: Arc<SessionRegistry>,
        breaker: Arc<FailureCircuitBreaker>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            api,
            config,
            sessions,
            breaker,
            telemetry,
            issued: 0,
            in_flight: HashMap::new(),
            issued_at: HashMap::new(),
            state: QuoteState::default(),
            unchanged_refetches: 0,
        }
    }

    pub fn state(&self) -> &QuoteState {
        &self.state
    }

    pub fn config(&self) -> &QuoteConfig {
        &self.config
    }

    pub fn disabled_reason(&self, req: &QuoteRequest) -> Option<DisabledReason> {
        if self.breaker.is_tripped() {
            Some(DisabledReason::CircuitOpen)
        } else if req.from_amount.is_zero() {
            Some(DisabledReason::ZeroAmount)
        } else if req.from_token == req.to_token {
            Some(DisabledReason::SameToken)
        } else if !chains::is_supported(req.chain_id) {
            Some(DisabledReason::UnsupportedChain)
        } else if slippage_to_bps(req.slippage).is_err() {
            Some(DisabledReason::InvalidSlippage)
        } else {
            None
        }
    }

    fn api_url(&self, chain_id: u64) -> Option<String> {
        self.config
            .api_url
            .clone()
            .or_else(|| chains::chain_info(chain_id).map(|c| c.api_url.to_string()))
    }

    pub fn key_for(&self, req: &QuoteRequest) -> Option<QuoteKey> {
        Some(QuoteKey {
            from: req.from_token.address,
            to: req.to_token.address,
            amount: req.from_amount,
            slippage_bps: slippage_to_bps(req.slippage).ok()?,
            api_url: self.api_url(req.chain_id)?,
            chain_id: req.chain_id,
        })
    }

    /// Zero amounts skip the debounce so a cleared field shows immediately
    pub fn debounce_for(&self, req: &QuoteRequest) -> Duration {
        if req.from_amount.is_zero() {
            Duration::ZERO
        } else {
            self.config.debounce()
        }
    }

    /// Issue a request for `req`; `None` when the engine is disabled for it
    pub fn issue(&mut self, req: &QuoteRequest) -> Option<QuoteTicket> {
        if let Some(reason) = self.disabled_reason(req) {
            debug!("Quote disabled: {:?}", reason);
            return None;
        }
        let key = self.key_for(req)?;

        self.issued += 1;
        let generation = self.issued;
        self.issued_at.insert(generation, Instant::now());
        self.state.is_loading = true;

        // Coalesce onto a still-running request for the same key
        if let Some(existing) = self.in_flight.get(&key) {
            if existing.peek().is_none() {
                debug!("Quote gen {} coalesced onto in-flight request", generation);
                return Some(QuoteTicket {
                    generation,
                    key,
                    fetch: existing.clone(),
                });
            }
        }

        let api_request = QuoteApiRequest {
            api_url: key.api_url.clone(),
            chain_id: req.chain_id,
            in_token: chains::hub_token_address(req.chain_id, &req.from_token),
            out_token: req.to_token.address,
            in_amount: req.from_amount,
            dex_min_amount_out: req.dex_min_amount_out,
            user: req.account,
            slippage: req.slippage,
            partner: req.partner.clone(),
            session_id: self.sessions.current(),
        };

        self.telemetry.record(TelemetryEvent::QuoteRequested {
            chain_id: req.chain_id,
            in_token: format!("{:?}", req.from_token.address),
            out_token: format!("{:?}", req.to_token.address),
            in_amount: req.from_amount.to_string(),
        });

        let api = Arc::clone(&self.api);
        let fetch = async move { api.quote(&api_request).await }.boxed().shared();
        self.in_flight.insert(key.clone(), fetch.clone());

        Some(QuoteTicket { generation, key, fetch })
    }

    /// Apply a finished ticket. Only the most recently issued generation wins.
    pub fn apply(&mut self, generation: u64, key: QuoteKey, result: Result<Quote, QuoteError>) -> ApplyOutcome {
        let started = self.issued_at.remove(&generation);
        if self.in_flight.get(&key).map(|f| f.peek().is_some()).unwrap_or(false) {
            self.in_flight.remove(&key);
        }

        if generation != self.issued {
            debug!("Discarding stale quote gen {} (latest {})", generation, self.issued);
            return ApplyOutcome::Stale;
        }
        self.issued_at.clear();
        let elapsed_ms = started.map(|t| t.elapsed().as_millis() as u64).unwrap_or(0);

        let outcome = match result {
            Ok(quote) => Ok(quote),
            Err(err) if err.is_no_liquidity() => {
                let reason = match (err, self.config.dex_better_policy) {
                    (QuoteError::DexIsBetter, DexBetterPolicy::Distinct) => NoRouteReason::DexIsBetter,
                    _ => NoRouteReason::NoLiquidity,
                };
                Ok(Quote::no_route(key.from, key.to, key.amount, self.bps_to_percent(key.slippage_bps), reason))
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(quote) => {
                if let Some(id) = quote.session_id.as_deref() {
                    self.sessions.observe(id);
                }
                let same_route = self.state.key.as_ref() == Some(&key)
                    && self.state.quote.as_ref().map(|q| q.out_amount) == Some(quote.out_amount);
                self.unchanged_refetches = if same_route { self.unchanged_refetches + 1 } else { 0 };

                self.telemetry.record(TelemetryEvent::QuoteSucceeded {
                    out_amount: quote.out_amount.to_string(),
                    session_id: quote.session_id.clone(),
                    elapsed_ms,
                });
                if let Some(reason) = quote.no_route {
                    info!("Hub has no route ({:?}), dex path stays available", reason);
                } else {
                    debug!("Quote gen {} applied: out={} min={}", generation, quote.out_amount, quote.min_amount_out);
                }
                self.state.quote = Some(quote);
                self.state.error = None;
            }
            Err(err) => {
                warn!("Quote failed: {}", err);
                self.telemetry.record(TelemetryEvent::QuoteFailed { error: err.to_string() });
                self.unchanged_refetches = 0;
                self.state.quote = None;
                self.state.error = Some(err);
            }
        }

        self.state.key = Some(key);
        self.state.fetched_at = Some(Instant::now());
        self.state.generation = generation;
        self.state.is_loading = false;
        ApplyOutcome::Applied
    }

    fn bps_to_percent(&self, bps: u32) -> f64 {
        bps as f64 / 100.0
    }

    /// Next refetch delay; `None` once a swap attempt has started
    pub fn refetch_interval(&self, phase: SwapPhase) -> Option<Duration> {
        if phase == SwapPhase::Swapping {
            return None;
        }
        let base = self.config.refetch_interval();
        let over = self.unchanged_refetches.saturating_sub(self.config.backoff_after);
        // Each unchanged refetch past the threshold adds half a base interval
        let stretched = base + (base / 2) * over;
        Some(stretched.min(self.config.max_refetch_interval().max(base)))
    }

    /// Supersede everything in flight (inputs changed)
    pub fn cancel_in_flight(&mut self) {
        self.issued += 1;
        self.in_flight.clear();
        self.issued_at.clear();
        self.state.is_loading = false;
    }

    /// Drop the visible quote (inputs cleared or engine disabled)
    pub fn clear(&mut self) {
        self.cancel_in_flight();
        self.unchanged_refetches = 0;
        self.state = QuoteState {
            generation: self.issued,
            ..QuoteState::default()
        };
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::telemetry::NoopTelemetry;
    use crate::types::PermitData;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted quote API: answers from a queue, records every request
    #[derive(Default)]
    pub(crate) struct ScriptedApi {
        pub calls: AtomicUsize,
        pub requests: Mutex<Vec<QuoteApiRequest>>,
        pub responses: Mutex<Vec<Result<Quote, QuoteError>>>,
        pub delay: Option<Duration>,
    }

    impl ScriptedApi {
        pub fn with_responses(responses: Vec<Result<Quote, QuoteError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl QuoteApi for ScriptedApi {
        async fn quote(&self, request: &QuoteApiRequest) -> Result<Quote, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(hub_quote(request.in_amount, U256::from(100u64), "s-default"))
            } else {
                responses.remove(0)
            }
        }
    }

    pub(crate) fn hub_quote(in_amount: U256, out: U256, session: &str) -> Quote {
        Quote {
            in_token: Address::repeat_byte(1),
            out_token: Address::repeat_byte(2),
            in_amount,
            out_amount: out,
            min_amount_out: out * U256::from(995u64) / U256::from(1000u64),
            slippage: 0.5,
            session_id: Some(session.to_string()),
            serialized_order: "0xorder".into(),
            permit_data: PermitData::default(),
            gas_amount_out: None,
            error: None,
            no_route: None,
        }
    }

    pub(crate) fn request(amount: u64) -> QuoteRequest {
        QuoteRequest {
            from_token: Token::new(Address::repeat_byte(1), "USDC", 6),
            to_token: Token::new(Address::repeat_byte(2), "WETH", 18),
            from_amount: U256::from(amount),
            dex_min_amount_out: Some(U256::from(90u64)),
            slippage: 0.5,
            account: Some(Address::repeat_byte(9)),
            chain_id: 137,
            partner: "widget".into(),
        }
    }

    fn engine(api: ScriptedApi, max_failures: u32) -> (QuoteEngine<ScriptedApi>, Arc<ScriptedApi>, Arc<FailureCircuitBreaker>) {
        let api = Arc::new(api);
        let breaker = Arc::new(FailureCircuitBreaker::new(max_failures));
        let engine = QuoteEngine::new(
            Arc::clone(&api),
            QuoteConfig::default(),
            Arc::new(SessionRegistry::new()),
            Arc::clone(&breaker),
            Arc::new(NoopTelemetry),
        );
        (engine, api, breaker)
    }

    #[tokio::test]
    async fn test_issue_and_apply() {
        let (mut engine, api, _) = engine(ScriptedApi::default(), 3);
        let ticket = engine.issue(&request(1_000)).unwrap();
        let (generation, key, result) = ticket.wait().await;
        assert_eq!(engine.apply(generation, key, result), ApplyOutcome::Applied);
        assert_eq!(engine.state().out_amount(), U256::from(100u64));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_states_issue_nothing() {
        let (mut engine, api, _) = engine(ScriptedApi::default(), 3);

        assert!(engine.issue(&request(0)).is_none());

        let mut same = request(1_000);
        same.to_token = same.from_token.clone();
        assert!(engine.issue(&same).is_none());

        let mut unsupported = request(1_000);
        unsupported.chain_id = 31337;
        assert_eq!(engine.disabled_reason(&unsupported), Some(DisabledReason::UnsupportedChain));
        assert!(engine.issue(&unsupported).is_none());

        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_key_requests_coalesce() {
        let api = ScriptedApi {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (mut engine, api, _) = engine(api, 3);

        let first = engine.issue(&request(1_000)).unwrap();
        let second = engine.issue(&request(1_000)).unwrap();
        assert_eq!(first.key, second.key);
        assert_ne!(first.generation, second.generation);

        let (r1, r2) = tokio::join!(first.wait(), second.wait());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        assert_eq!(engine.apply(r1.0, r1.1, r1.2), ApplyOutcome::Stale);
        assert_eq!(engine.apply(r2.0, r2.1, r2.2), ApplyOutcome::Applied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticket_pending_until_api_answers() {
        let api = ScriptedApi {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let (mut engine, _, _) = engine(api, 3);

        let ticket = engine.issue(&request(1_000)).unwrap();
        let mut wait = tokio_test::task::spawn(ticket.wait());
        tokio_test::assert_pending!(wait.poll());
        assert_eq!(engine.in_flight_count(), 1);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(wait.is_woken());
        let (generation, key, result) = tokio_test::assert_ready!(wait.poll());
        assert_eq!(engine.apply(generation, key, result), ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn test_stale_response_rejected() {
        let api = ScriptedApi::with_responses(vec![
            Ok(hub_quote(U256::from(1_000u64), U256::from(111u64), "old")),
            Ok(hub_quote(U256::from(2_000u64), U256::from(222u64), "new")),
        ]);
        let (mut engine, _, _) = engine(api, 3);

        let old = engine.issue(&request(1_000)).unwrap();
        let new = engine.issue(&request(2_000)).unwrap();
        let old_result = old.wait().await;
        let new_result = new.wait().await;

        // Newer response arrives first
        assert_eq!(engine.apply(new_result.0, new_result.1, new_result.2), ApplyOutcome::Applied);
        assert_eq!(engine.apply(old_result.0, old_result.1, old_result.2), ApplyOutcome::Stale);
        assert_eq!(engine.state().out_amount(), U256::from(222u64));
    }

    #[tokio::test]
    async fn test_no_liquidity_becomes_zero_quote() {
        let api = ScriptedApi::with_responses(vec![Err(QuoteError::NoLiquidity), Err(QuoteError::DexIsBetter)]);
        let (mut engine, _, _) = engine(api, 3);

        let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
        engine.apply(g, k, r);
        let quote = engine.state().quote.clone().unwrap();
        assert!(quote.out_amount.is_zero());
        assert_eq!(quote.no_route, Some(NoRouteReason::NoLiquidity));
        assert!(engine.state().error.is_none());

        let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
        engine.apply(g, k, r);
        assert_eq!(engine.state().quote.as_ref().unwrap().no_route, Some(NoRouteReason::DexIsBetter));
    }

    #[tokio::test]
    async fn test_dex_better_merged_by_policy() {
        let api = Arc::new(ScriptedApi::with_responses(vec![Err(QuoteError::DexIsBetter)]));
        let config = QuoteConfig {
            dex_better_policy: DexBetterPolicy::Merge,
            ..QuoteConfig::default()
        };
        let mut engine = QuoteEngine::new(
            api,
            config,
            Arc::new(SessionRegistry::new()),
            Arc::new(FailureCircuitBreaker::new(3)),
            Arc::new(NoopTelemetry),
        );
        let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
        engine.apply(g, k, r);
        assert_eq!(engine.state().quote.as_ref().unwrap().no_route, Some(NoRouteReason::NoLiquidity));
    }

    #[tokio::test]
    async fn test_timeout_is_not_no_liquidity() {
        let api = ScriptedApi::with_responses(vec![Err(QuoteError::Timeout(10_000))]);
        let (mut engine, _, _) = engine(api, 3);
        let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
        engine.apply(g, k, r);
        assert!(engine.state().quote.is_none());
        assert_eq!(engine.state().error, Some(QuoteError::Timeout(10_000)));
    }

    #[tokio::test]
    async fn test_session_id_fed_into_next_request() {
        let api = ScriptedApi::with_responses(vec![
            Ok(hub_quote(U256::from(1_000u64), U256::from(100u64), "s-1")),
            Ok(hub_quote(U256::from(1_000u64), U256::from(100u64), "s-1")),
        ]);
        let (mut engine, api, _) = engine(api, 3);

        let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
        engine.apply(g, k, r);
        let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
        engine.apply(g, k, r);

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests[0].session_id, None);
        assert_eq!(requests[1].session_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_refetch_interval_backs_off() {
        let (mut engine, _, _) = engine(ScriptedApi::default(), 3);
        let base = engine.config().refetch_interval();

        for _ in 0..4 {
            let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
            engine.apply(g, k, r);
        }
        // 3 unchanged refetches after the first = exactly at the threshold
        assert_eq!(engine.refetch_interval(SwapPhase::Configuring), Some(base));
        assert_eq!(engine.refetch_interval(SwapPhase::Confirming), Some(base));

        for _ in 0..2 {
            let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
            engine.apply(g, k, r);
        }
        assert_eq!(engine.refetch_interval(SwapPhase::Configuring), Some(base * 2));
        assert_eq!(engine.refetch_interval(SwapPhase::Swapping), None);

        for _ in 0..20 {
            let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
            engine.apply(g, k, r);
        }
        assert_eq!(
            engine.refetch_interval(SwapPhase::Configuring),
            Some(engine.config().max_refetch_interval())
        );
    }

    /// Three failed swaps with max_failures = 3: the fourth quote is never sent
    #[tokio::test]
    async fn test_scenario_e_breaker_blocks_quotes() {
        let (mut engine, api, breaker) = engine(ScriptedApi::default(), 3);
        for _ in 0..3 {
            let (g, k, r) = engine.issue(&request(1_000)).unwrap().wait().await;
            engine.apply(g, k, r);
            breaker.record_failure();
        }
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);

        assert!(engine.issue(&request(1_000)).is_none());
        assert_eq!(engine.disabled_reason(&request(1_000)), Some(DisabledReason::CircuitOpen));
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_debounce_bypassed_for_zero() {
        let (engine, _, _) = engine(ScriptedApi::default(), 3);
        assert_eq!(engine.debounce_for(&request(0)), Duration::ZERO);
        assert_eq!(engine.debounce_for(&request(5)), Duration::from_millis(300));
    }
}
