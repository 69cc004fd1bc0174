//! Swap Execution State Machine
//!
//! Purpose:
//!     Drives one accepted hub quote through
//!     `[wrap] -> [approve] -> sign -> submit -> settle` and reports a
//!     terminal success or failure.
//!
//! Created: 2026-10-09
//!
//! Design:
//!     - At most one attempt in flight; a second call is rejected
//!     - Steps run strictly in order, nothing is retried inside an attempt
//!       except the bounded status poll
//!     - `SwapSession` lives in a watch channel written only here
//!     - Failure burns the quote's session id, bumps the breaker for
//!       countable errors and keeps `is_wrapped`
//!     - Terminal state is reset after a cooldown, scoped to the attempt id
//!
//! Flow:
//!     1. Validate quote (executable, session not burned, breaker closed)
//!     2. Native input: balance check, deposit, wait receipt
//!     3. Allowance below amount: approve max, wait receipt, invalidate cache
//!     4. EIP-712 permit signature
//!     5. Submit order, poll status for the tx hash
//!     6. Wait for the settlement receipt

use super::breaker::FailureCircuitBreaker;
use super::settlement::{poll_status, SettlementApi, SubmitRequest};
use super::signer::{sign_permit, TypedDataSigner};
use crate::amounts::amount_ui;
use crate::chains::{self, ChainInfo};
use crate::config::SwapSettings;
use crate::error::SwapError;
use crate::history::OrderHistory;
use crate::onchain::{AllowanceChecker, BalanceKey, BalanceReconciler, ChainClient, ReconcileOutcome, TxConfirmation};
use crate::routing::AcceptedQuote;
use crate::session::SessionRegistry;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{Order, SwapSession, SwapStatus, SwapStep, Token};
use alloy::primitives::{Address, U256};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything the executor talks to
#[derive(Clone)]
pub struct SwapServices {
    pub chain: Arc<dyn ChainClient>,
    pub settlement: Arc<dyn SettlementApi>,
    pub signer: Arc<dyn TypedDataSigner>,
    pub allowances: Arc<AllowanceChecker>,
    pub reconciler: Arc<BalanceReconciler>,
    pub sessions: Arc<SessionRegistry>,
    pub breaker: Arc<FailureCircuitBreaker>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub history: Option<Arc<OrderHistory>>,
}

/// Trade to execute against an accepted quote
#[derive(Debug, Clone)]
pub struct SwapInput {
    pub from_token: Token,
    pub to_token: Token,
    pub accepted: AcceptedQuote,
    /// Balance cache entry of the caller's tracked token list; the
    /// post-swap refresh of the pair is merged into it
    pub balance_key: BalanceKey,
}

#[derive(Debug)]
pub struct SwapReceipt {
    pub order: Order,
    pub confirmation: TxConfirmation,
    /// Detached post-swap balance refresh
    pub reconcile: JoinHandle<ReconcileOutcome>,
}

/// Clears the in-flight flag however the attempt ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SwapExecutor {
    services: SwapServices,
    settings: SwapSettings,
    api_url: String,
    in_flight: AtomicBool,
    state: Arc<watch::Sender<SwapSession>>,
}

impl SwapExecutor {
    pub fn new(services: SwapServices, settings: SwapSettings, api_url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SwapSession::default());
        Self {
            services,
            settings,
            api_url: api_url.into(),
            in_flight: AtomicBool::new(false),
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SwapSession> {
        self.state.subscribe()
    }

    pub fn session(&self) -> SwapSession {
        self.state.borrow().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn set_step(&self, step: SwapStep) {
        self.state.send_modify(|s| s.step = step);
    }

    pub async fn execute(&self, input: SwapInput) -> Result<SwapReceipt, SwapError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Swap rejected: another attempt is in flight");
            return Err(SwapError::AlreadyInProgress);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let mut attempt = 0;
        self.state.send_modify(|s| {
            s.reset();
            s.attempt += 1;
            s.status = SwapStatus::Loading;
            attempt = s.attempt;
        });
        info!(
            "Swap attempt {}: {} {} -> {}",
            attempt,
            amount_ui(input.from_token.decimals, input.accepted.quote().in_amount),
            input.from_token.symbol,
            input.to_token.symbol
        );

        let result = self.run(&input).await;
        let outcome = match result {
            Ok((confirmation, before)) => Ok(self.on_success(&input, confirmation, before)),
            Err(err) => {
                self.on_failure(&input, &err);
                Err(err)
            }
        };
        self.schedule_reset(attempt);
        outcome
    }

    async fn run(&self, input: &SwapInput) -> Result<(TxConfirmation, std::collections::HashMap<Address, U256>), SwapError> {
        let quote = input.accepted.quote();
        let chain = &self.services.chain;
        let account = chain.account();

        // 1. Validate
        if self.services.breaker.is_tripped() {
            return Err(SwapError::HubDisabled {
                failures: self.services.breaker.failures(),
            });
        }
        if !quote.is_executable() {
            let reason = quote.error.clone().unwrap_or_else(|| "zero output".into());
            return Err(SwapError::QuoteNotExecutable(reason));
        }
        let session_id = quote.session_id.as_deref().ok_or(SwapError::MissingInput("session id"))?;
        if self.services.sessions.is_burned(session_id) {
            return Err(SwapError::SessionBurned(session_id.to_string()));
        }
        let info = chains::chain_info(chain.chain_id()).ok_or(SwapError::MissingInput("supported chain"))?;
        let amount = quote.in_amount;

        let pair = [input.from_token.address, input.to_token.address];
        let before = self.services.reconciler.read_pair(&input.balance_key, pair).await;

        // 2. Wrap
        let sell_token = if input.from_token.is_native() {
            self.wrap(info, account, amount).await?;
            info.wrapped_native
        } else {
            input.from_token.address
        };

        // 3. Approve
        let has_allowance = self
            .services
            .allowances
            .has_allowance(chain.as_ref(), account, sell_token, amount)
            .await
            .map_err(|e| SwapError::from_chain("allowance", e))?;
        if !has_allowance {
            self.approve(account, sell_token).await?;
        }

        // 4. Sign
        self.set_step(SwapStep::Sign);
        self.services.telemetry.record(TelemetryEvent::SignatureRequested);
        let signature = sign_permit(self.services.signer.as_ref(), account, &quote.permit_data).await?;
        self.services.telemetry.record(TelemetryEvent::SignatureSucceeded);

        // 5. Submit + status poll
        self.set_step(SwapStep::Submit);
        self.services.telemetry.record(TelemetryEvent::SwapRequested {
            session_id: Some(session_id.to_string()),
        });
        let request = SubmitRequest {
            api_url: self.api_url.clone(),
            chain_id: info.chain_id,
            quote: quote.clone(),
            user: account,
            signature,
        };
        let tx_hash = match self.services.settlement.submit(&request).await? {
            Some(hash) => hash,
            None => {
                poll_status(
                    self.services.settlement.as_ref(),
                    &self.api_url,
                    info.chain_id,
                    session_id,
                    account,
                    self.settings.status_poll_interval(),
                    self.settings.status_poll_max_attempts,
                )
                .await?
            }
        };
        self.state.send_modify(|s| s.tx_hash = Some(tx_hash));

        // 6. Settle
        self.set_step(SwapStep::Settle);
        let confirmation = chain
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|e| SwapError::from_chain("settlement", e))?;
        self.services.telemetry.record(TelemetryEvent::SettlementSucceeded {
            tx_hash: format!("{:?}", confirmation.hash),
            block_number: confirmation.block_number,
        });
        Ok((confirmation, before))
    }

    async fn wrap(&self, info: &ChainInfo, account: Address, amount: U256) -> Result<(), SwapError> {
        let chain = &self.services.chain;
        self.set_step(SwapStep::Wrap);
        self.services.telemetry.record(TelemetryEvent::WrapRequested {
            amount: amount.to_string(),
        });

        let available = chain
            .native_balance(account)
            .await
            .map_err(|e| SwapError::from_chain("balance", e))?;
        if available < amount {
            return Err(SwapError::InsufficientBalance {
                required: amount_ui(info.native_decimals, amount),
                available: amount_ui(info.native_decimals, available),
            });
        }
        let hash = chain
            .deposit(info.wrapped_native, amount)
            .await
            .map_err(|e| SwapError::from_chain("wrap", e))?;
        chain
            .wait_for_receipt(hash)
            .await
            .map_err(|e| SwapError::from_chain("wrap", e))?;

        // Irreversible for this attempt
        self.state.send_modify(|s| s.is_wrapped = true);
        self.services.telemetry.record(TelemetryEvent::WrapSucceeded {
            tx_hash: format!("{:?}", hash),
        });
        info!("Wrapped {} {}", amount_ui(info.native_decimals, amount), info.native_symbol);
        Ok(())
    }

    async fn approve(&self, account: Address, token: Address) -> Result<(), SwapError> {
        let chain = &self.services.chain;
        let spender = self.services.allowances.spender();

        self.set_step(SwapStep::Approve);
        self.services.telemetry.record(TelemetryEvent::ApprovalRequested {
            token: format!("{:?}", token),
        });
        let hash = chain
            .approve(token, spender, U256::MAX)
            .await
            .map_err(|e| SwapError::from_chain("approve", e))?;
        chain
            .wait_for_receipt(hash)
            .await
            .map_err(|e| SwapError::from_chain("approve", e))?;

        self.services.allowances.invalidate(account, chain.chain_id(), token);
        self.services.telemetry.record(TelemetryEvent::ApprovalSucceeded {
            tx_hash: format!("{:?}", hash),
        });
        Ok(())
    }

    fn on_success(
        &self,
        input: &SwapInput,
        confirmation: TxConfirmation,
        before: std::collections::HashMap<Address, U256>,
    ) -> SwapReceipt {
        let quote = input.accepted.quote();
        let chain_id = self.services.chain.chain_id();
        let explorer_link = chains::chain_info(chain_id)
            .map(|c| c.explorer_tx_link(confirmation.hash))
            .unwrap_or_default();

        let order = Order {
            from_token: input.from_token.clone(),
            to_token: input.to_token.clone(),
            from_amount: amount_ui(input.from_token.decimals, quote.in_amount),
            to_amount: amount_ui(input.to_token.decimals, quote.out_amount),
            tx_hash: confirmation.hash,
            explorer_link,
            date: Utc::now(),
        };
        if let Some(history) = &self.services.history {
            if let Err(e) = history.append(&order) {
                error!("Failed to record order {:?}: {:#}", order.tx_hash, e);
            }
        }

        self.services.sessions.clear_current();
        self.state.send_modify(|s| {
            s.status = SwapStatus::Success;
            s.step = SwapStep::None;
            s.tx_hash = Some(confirmation.hash);
        });
        self.services.telemetry.record(TelemetryEvent::SwapSucceeded {
            tx_hash: format!("{:?}", confirmation.hash),
        });
        info!("Swap settled: {:?} ({} {} -> {} {})", confirmation.hash, order.from_amount, input.from_token.symbol, order.to_amount, input.to_token.symbol);

        let reconcile = Arc::clone(&self.services.reconciler).spawn(
            input.balance_key,
            [input.from_token.address, input.to_token.address],
            before,
        );

        SwapReceipt {
            order,
            confirmation,
            reconcile,
        }
    }

    fn on_failure(&self, input: &SwapInput, err: &SwapError) {
        let step = self.state.borrow().step;
        let message = err.to_string();

        match step {
            SwapStep::Wrap => self.services.telemetry.record(TelemetryEvent::WrapFailed { error: message.clone() }),
            SwapStep::Approve => self
                .services
                .telemetry
                .record(TelemetryEvent::ApprovalFailed { error: message.clone() }),
            SwapStep::Sign => self
                .services
                .telemetry
                .record(TelemetryEvent::SignatureFailed { error: message.clone() }),
            _ => {}
        }
        self.services.telemetry.record(TelemetryEvent::SwapFailed {
            step: format!("{:?}", step).to_lowercase(),
            error: message,
        });

        // A failed session is never reused
        if let Some(id) = input.accepted.quote().session_id.as_deref() {
            if !matches!(err, SwapError::AlreadyInProgress | SwapError::SessionBurned(_)) {
                self.services.sessions.burn(id);
            }
        }

        if err.counts_against_breaker() {
            self.services.breaker.record_failure();
        }
        let failures = self.services.breaker.failures();

        self.state.send_modify(|s| {
            s.status = SwapStatus::Failed;
            s.step = SwapStep::None;
            s.failures = failures;
            s.error = Some(err.user_message(s.is_wrapped));
        });
        warn!("Swap failed at {:?} ({:?}): {}", step, err.kind(), err);
    }

    /// Return to idle after the cooldown unless a newer attempt started
    fn schedule_reset(&self, attempt: u64) {
        let state = Arc::clone(&self.state);
        let cooldown = self.settings.reset_cooldown();
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            state.send_if_modified(|s| {
                if s.attempt == attempt && s.status.is_terminal() {
                    s.reset();
                    true
                } else {
                    false
                }
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, WalletError};
    use crate::onchain::testing::FakeChain;
    use crate::onchain::BalanceCache;
    use crate::routing::PriceGuard;
    use crate::swap::settlement::tests::ScriptedSettlement;
    use crate::swap::signer::tests::{permit, ScriptedWallet};
    use crate::telemetry::MemoryTelemetry;
    use crate::types::{Quote, NATIVE_PLACEHOLDER};
    use alloy::primitives::TxHash;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const ACCOUNT: Address = Address::repeat_byte(9);
    const USDC: Address = Address::repeat_byte(0xa0);
    const SETTLE_HASH: TxHash = TxHash::repeat_byte(0xee);

    struct Harness {
        executor: Arc<SwapExecutor>,
        chain: Arc<FakeChain>,
        settlement: Arc<ScriptedSettlement>,
        wallet: Arc<ScriptedWallet>,
        sessions: Arc<SessionRegistry>,
        breaker: Arc<FailureCircuitBreaker>,
        telemetry: Arc<MemoryTelemetry>,
        history: Arc<OrderHistory>,
        _data_dir: TempDir,
    }

    fn harness(chain: FakeChain, settlement: ScriptedSettlement, wallet: ScriptedWallet) -> Harness {
        let chain = Arc::new(chain);
        let settlement = Arc::new(settlement);
        let wallet = Arc::new(wallet);
        let sessions = Arc::new(SessionRegistry::new());
        let breaker = Arc::new(FailureCircuitBreaker::new(3));
        let telemetry = Arc::new(MemoryTelemetry::new());
        let data_dir = TempDir::new().unwrap();
        let history = Arc::new(OrderHistory::open(data_dir.path(), 1, ACCOUNT).unwrap());
        let reconciler = Arc::new(BalanceReconciler::new(
            chain.clone(),
            Arc::new(BalanceCache::new()),
            Duration::from_secs(3),
            2,
        ));
        let services = SwapServices {
            chain: chain.clone(),
            settlement: settlement.clone(),
            signer: wallet.clone(),
            allowances: Arc::new(AllowanceChecker::default()),
            reconciler,
            sessions: sessions.clone(),
            breaker: breaker.clone(),
            telemetry: telemetry.clone(),
            history: Some(history.clone()),
        };
        Harness {
            executor: Arc::new(SwapExecutor::new(services, SwapSettings::default(), "https://hub.test")),
            chain,
            settlement,
            wallet,
            sessions,
            breaker,
            telemetry,
            history,
            _data_dir: data_dir,
        }
    }

    fn quote(in_token: Address, session: &str) -> Quote {
        Quote {
            in_token,
            out_token: Address::repeat_byte(0xb0),
            in_amount: U256::from(1_000_000u64),
            out_amount: U256::from(100_000_000u64),
            min_amount_out: U256::from(99_500_000u64),
            slippage: 0.5,
            session_id: Some(session.to_string()),
            serialized_order: "0xorder".into(),
            permit_data: permit(),
            gas_amount_out: None,
            error: None,
            no_route: None,
        }
    }

    fn input(from: Token, session: &str) -> SwapInput {
        let wrapped = chains::chain_info(1).unwrap().wrapped_native;
        let hub_in = if from.is_native() { wrapped } else { from.address };
        let mut guard = PriceGuard::new();
        guard.open(&quote(hub_in, session));
        SwapInput {
            from_token: from,
            to_token: Token::new(Address::repeat_byte(0xb0), "USDC", 6),
            accepted: guard.confirmed().unwrap(),
            balance_key: BalanceKey {
                account: ACCOUNT,
                chain_id: 1,
                token_set_size: 2,
            },
        }
    }

    fn usdc() -> Token {
        Token::new(USDC, "USDC", 6)
    }

    fn position(events: &[TelemetryEvent], wanted: &TelemetryEvent) -> usize {
        events.iter().position(|e| e == wanted).unwrap_or(usize::MAX)
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_input_wraps_before_signing() {
        let chain = FakeChain::new(ACCOUNT, U256::from(10u64).pow(U256::from(18u64)));
        let h = harness(chain, ScriptedSettlement::mined_after(1, SETTLE_HASH), ScriptedWallet::signing());

        let receipt = h
            .executor
            .execute(input(Token::new(NATIVE_PLACEHOLDER, "ETH", 18), "s-1"))
            .await
            .unwrap();
        assert_eq!(receipt.confirmation.hash, SETTLE_HASH);

        let events = h.telemetry.events();
        let wrapped = position(&events, &TelemetryEvent::WrapRequested { amount: "1000000".into() });
        let signing = position(&events, &TelemetryEvent::SignatureRequested);
        assert!(wrapped < signing);
        assert!(h.executor.session().is_wrapped);
        assert_eq!(h.executor.session().status, SwapStatus::Success);

        // Wrapped token had no allowance yet
        assert_eq!(h.chain.calls()[..3], ["balances", "deposit", "allowance"].map(String::from));
        assert_eq!(h.chain.count("approve"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_allowance_skips_approve() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let h = harness(chain, ScriptedSettlement::mined_after(0, SETTLE_HASH), ScriptedWallet::signing());

        let receipt = h.executor.execute(input(usdc(), "s-1")).await.unwrap();
        assert_eq!(receipt.order.from_amount, "1");
        assert_eq!(receipt.order.to_amount, "100");
        assert!(receipt.order.explorer_link.ends_with(&format!("{:?}", SETTLE_HASH)));

        assert_eq!(h.chain.count("deposit"), 0);
        assert_eq!(h.chain.count("approve"), 0);
        let events = h.telemetry.events();
        assert!(!events.iter().any(|e| matches!(e, TelemetryEvent::ApprovalRequested { .. })));
        assert!(events.contains(&TelemetryEvent::SignatureRequested));

        let submitted = h.settlement.submitted.lock().unwrap();
        assert_eq!(submitted[0].session_id(), Some("s-1"));
        assert_eq!(submitted[0].user, ACCOUNT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_timeout_counts_failure() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());

        let err = h.executor.execute(input(usdc(), "s-1")).await.unwrap_err();
        assert_eq!(err, SwapError::StatusTimeout { attempts: 60 });
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(*h.settlement.status_calls.lock().unwrap(), 60);

        assert_eq!(h.breaker.failures(), 1);
        let session = h.executor.session();
        assert_eq!(session.status, SwapStatus::Failed);
        assert_eq!(session.failures, 1);
        assert!(h.sessions.is_burned("s-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_signature_not_counted() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let wallet = ScriptedWallet {
            v4: Err(WalletError::Rejected),
            legacy: Err(WalletError::Rejected),
            calls: Mutex::new(Vec::new()),
        };
        let h = harness(chain, ScriptedSettlement::default(), wallet);

        let err = h.executor.execute(input(usdc(), "s-1")).await.unwrap_err();
        assert_eq!(err, SwapError::UserRejected("signature"));
        assert_eq!(h.breaker.failures(), 0);
        assert!(h.sessions.is_burned("s-1"));
        assert!(h.settlement.submitted.lock().unwrap().is_empty());
        assert!(h
            .telemetry
            .events()
            .iter()
            .any(|e| matches!(e, TelemetryEvent::SignatureFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burned_session_refused() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());
        h.sessions.burn("s-old");

        let err = h.executor.execute(input(usdc(), "s-old")).await.unwrap_err();
        assert_eq!(err, SwapError::SessionBurned("s-old".into()));
        assert!(h.chain.calls().is_empty());
        assert_eq!(h.breaker.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_kept_when_approve_reverts() {
        let chain = FakeChain::new(ACCOUNT, U256::from(5_000_000u64));
        chain.reverting.lock().unwrap().insert("approve");
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());

        let err = h
            .executor
            .execute(input(Token::new(NATIVE_PLACEHOLDER, "ETH", 18), "s-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OnChainRevert);
        assert_eq!(h.breaker.failures(), 1);

        let session = h.executor.session();
        assert!(session.is_wrapped);
        assert!(session.error.unwrap().contains("wrapped"));
        assert!(h.wallet.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_native_balance() {
        let chain = FakeChain::new(ACCOUNT, U256::from(10u64));
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());

        let err = h
            .executor
            .execute(input(Token::new(NATIVE_PLACEHOLDER, "ETH", 18), "s-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(h.chain.count("deposit"), 0);
        assert_eq!(h.breaker.failures(), 0);

        let events = h.telemetry.events();
        assert!(events.iter().any(|e| matches!(e, TelemetryEvent::WrapFailed { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, TelemetryEvent::SwapFailed { step, .. } if step == "wrap")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settlement_revert_carries_reason() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        chain.reverting_hashes.lock().unwrap().insert(SETTLE_HASH);
        let h = harness(chain, ScriptedSettlement::mined_after(0, SETTLE_HASH), ScriptedWallet::signing());

        let err = h.executor.execute(input(usdc(), "s-1")).await.unwrap_err();
        assert_eq!(
            err,
            SwapError::Reverted {
                hash: SETTLE_HASH,
                reason: "STF".into()
            }
        );
        assert_eq!(err.kind(), ErrorKind::OnChainRevert);
        assert_eq!(h.breaker.failures(), 1);

        let session = h.executor.session();
        assert_eq!(session.tx_hash, Some(SETTLE_HASH));
        assert!(session.error.unwrap().contains("STF"));
        assert!(!h
            .telemetry
            .events()
            .iter()
            .any(|e| matches!(e, TelemetryEvent::SettlementSucceeded { .. })));
        assert!(h.history.read_all().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_hash_skips_status_poll() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let settlement = ScriptedSettlement::default();
        *settlement.submit_result.lock().unwrap() = Some(Ok(Some(SETTLE_HASH)));
        let h = harness(chain, settlement, ScriptedWallet::signing());

        let receipt = h.executor.execute(input(usdc(), "s-1")).await.unwrap();
        assert_eq!(receipt.confirmation.hash, SETTLE_HASH);
        assert_eq!(*h.settlement.status_calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_appends_order_and_clears_session() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let h = harness(chain, ScriptedSettlement::mined_after(0, SETTLE_HASH), ScriptedWallet::signing());
        h.sessions.observe("s-1");

        let receipt = h.executor.execute(input(usdc(), "s-1")).await.unwrap();

        let orders = h.history.read_all().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].tx_hash, SETTLE_HASH);
        assert_eq!(orders[0].from_amount, receipt.order.from_amount);
        assert_eq!(orders[0].to_token, receipt.order.to_token);
        assert_eq!(h.sessions.current(), None);
        assert!(!h.sessions.is_burned("s-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_wrap_not_counted() {
        let chain = FakeChain::new(ACCOUNT, U256::from(5_000_000u64));
        chain.rejecting.lock().unwrap().insert("deposit");
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());

        let err = h
            .executor
            .execute(input(Token::new(NATIVE_PLACEHOLDER, "ETH", 18), "s-1"))
            .await
            .unwrap_err();
        assert_eq!(err, SwapError::UserRejected("wrap"));
        assert_eq!(h.breaker.failures(), 0);
        assert!(!h.executor.session().is_wrapped);
        assert!(h.wallet.calls.lock().unwrap().is_empty());
        assert!(h
            .telemetry
            .events()
            .iter()
            .any(|e| matches!(e, TelemetryEvent::WrapFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_approve_not_counted() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.rejecting.lock().unwrap().insert("approve");
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());

        let err = h.executor.execute(input(usdc(), "s-1")).await.unwrap_err();
        assert_eq!(err, SwapError::UserRejected("approve"));
        assert_eq!(h.breaker.failures(), 0);
        assert!(h
            .telemetry
            .events()
            .iter()
            .any(|e| matches!(e, TelemetryEvent::ApprovalFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_wallet_not_counted() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let wallet = ScriptedWallet {
            v4: Err(WalletError::MethodUnsupported("eth_signTypedData_v4")),
            legacy: Err(WalletError::MethodUnsupported("eth_signTypedData")),
            calls: Mutex::new(Vec::new()),
        };
        let h = harness(chain, ScriptedSettlement::default(), wallet);

        let err = h.executor.execute(input(usdc(), "s-1")).await.unwrap_err();
        assert_eq!(err, SwapError::UnsupportedWallet);
        assert_eq!(h.breaker.failures(), 0);
        assert_eq!(h.executor.session().failures, 0);
        assert!(h.settlement.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_attempt_rejected_while_in_flight() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let h = harness(chain, ScriptedSettlement::mined_after(5, SETTLE_HASH), ScriptedWallet::signing());

        let executor = Arc::clone(&h.executor);
        let first = tokio::spawn(async move { executor.execute(input(usdc(), "s-1")).await.map(|r| r.order) });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.executor.is_in_flight());

        let second = h.executor.execute(input(usdc(), "s-2")).await;
        assert!(matches!(second, Err(SwapError::AlreadyInProgress)));
        // The rejected call must not burn the running session
        assert!(!h.sessions.is_burned("s-1"));

        assert!(first.await.unwrap().is_ok());
        assert!(!h.executor.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_resets_after_cooldown() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());

        h.executor.execute(input(usdc(), "s-1")).await.unwrap_err();
        assert_eq!(h.executor.session().status, SwapStatus::Failed);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let session = h.executor.session();
        assert_eq!(session.status, SwapStatus::Idle);
        assert_eq!(session.failures, 1);
        assert!(session.error.is_none());
    }

    /// Three counted failures open the breaker; the next attempt never reaches the chain
    #[tokio::test(start_paused = true)]
    async fn test_breaker_blocks_after_max_failures() {
        let chain = FakeChain::new(ACCOUNT, U256::ZERO);
        chain.allowances.lock().unwrap().insert(USDC, U256::MAX);
        let h = harness(chain, ScriptedSettlement::default(), ScriptedWallet::signing());

        for n in 0..3 {
            let err = h.executor.execute(input(usdc(), &format!("s-{}", n))).await.unwrap_err();
            assert!(err.counts_against_breaker());
        }
        assert!(h.breaker.is_tripped());

        let calls_before = h.chain.calls().len();
        let err = h.executor.execute(input(usdc(), "s-9")).await.unwrap_err();
        assert_eq!(err, SwapError::HubDisabled { failures: 3 });
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(h.chain.calls().len(), calls_before);
    }
}
