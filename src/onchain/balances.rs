//! Balance Cache & Reconciliation Loop
//!
//! Purpose:
//!     After a swap the RPC node may lag behind the chain. The reconciler
//!     re-reads the from/to balances until both differ from the pre-swap
//!     snapshot, or the attempt budget runs out, then merges the result into
//!     the shared cache.
//!
//! Created: 2026-10-08
//!
//! Design:
//!     - Bounded iterative loop with an explicit attempt counter
//!     - Cache writes merge per token, never replace a whole snapshot
//!     - Spawned detached so the success notification is not delayed

use super::client::ChainClient;
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cache key; `token_set_size` is the length of the caller's tracked token list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BalanceKey {
    pub account: Address,
    pub chain_id: u64,
    pub token_set_size: usize,
}

#[derive(Debug, Default)]
pub struct BalanceCache {
    entries: DashMap<BalanceKey, HashMap<Address, U256>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, key: &BalanceKey) -> HashMap<Address, U256> {
        self.entries.get(key).map(|e| e.clone()).unwrap_or_default()
    }

    pub fn balance(&self, key: &BalanceKey, token: Address) -> Option<U256> {
        self.entries.get(key).and_then(|e| e.get(&token).copied())
    }

    /// Insert/overwrite only the given tokens, leave the rest untouched
    pub fn merge(&self, key: BalanceKey, balances: &HashMap<Address, U256>) {
        let mut entry = self.entries.entry(key).or_default();
        for (token, balance) in balances {
            entry.insert(*token, *balance);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Both balances moved
    Reconciled { attempts: u32 },
    /// Budget spent, last read merged anyway
    Exhausted { attempts: u32 },
}

pub struct BalanceReconciler {
    chain: Arc<dyn ChainClient>,
    cache: Arc<BalanceCache>,
    retry_delay: Duration,
    max_attempts: u32,
}

impl BalanceReconciler {
    pub fn new(chain: Arc<dyn ChainClient>, cache: Arc<BalanceCache>, retry_delay: Duration, max_attempts: u32) -> Self {
        Self {
            chain,
            cache,
            retry_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<BalanceCache> {
        &self.cache
    }

    /// Pre-swap snapshot of the pair. Falls back to whatever the cache holds
    /// for `key` when the read fails; tokens missing from both stay unknown.
    pub async fn read_pair(&self, key: &BalanceKey, pair: [Address; 2]) -> HashMap<Address, U256> {
        match self.chain.balances(key.account, &pair).await {
            Ok(balances) => balances,
            Err(e) => {
                debug!("pre-swap balance read failed, using cached values: {}", e);
                pair.iter()
                    .filter_map(|token| self.cache.balance(key, *token).map(|b| (*token, b)))
                    .collect()
            }
        }
    }

    /// Re-read the pair until both balances moved, then merge the two tokens
    /// into the caller's `key` entry. A token with no pre-swap value never
    /// counts as moved, so an unknown snapshot runs the full budget.
    pub async fn run(&self, key: BalanceKey, pair: [Address; 2], before: &HashMap<Address, U256>) -> ReconcileOutcome {
        let mut last_read: HashMap<Address, U256> = HashMap::new();

        for attempt in 1..=self.max_attempts {
            match self.chain.balances(key.account, &pair).await {
                Ok(balances) => {
                    let read: HashMap<Address, U256> =
                        balances.into_iter().filter(|(token, _)| pair.contains(token)).collect();
                    let changed = pair.iter().all(|token| match (read.get(token), before.get(token)) {
                        (Some(now), Some(prev)) => now != prev,
                        _ => false,
                    });
                    if changed {
                        self.cache.merge(key, &read);
                        info!("Balances reconciled after {} attempt(s)", attempt);
                        return ReconcileOutcome::Reconciled { attempts: attempt };
                    }
                    last_read = read;
                }
                Err(e) => debug!("balance read {} failed: {}", attempt, e),
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        self.cache.merge(key, &last_read);
        warn!("Balances unchanged after {} attempts", self.max_attempts);
        ReconcileOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }

    pub fn spawn(self: Arc<Self>, key: BalanceKey, pair: [Address; 2], before: HashMap<Address, U256>) -> JoinHandle<ReconcileOutcome> {
        tokio::spawn(async move { self.run(key, pair, &before).await })
    }
}
