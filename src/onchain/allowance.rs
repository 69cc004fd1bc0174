//! Allowance Checker
//!
//! Answers "has `account` granted the settlement spender at least `required`
//! of `token`?". Answers are cached per (account, chain, token, required)
//! with no expiry; the executor invalidates a token after its approval
//! transaction confirms.
//!
//! Created: 2026-10-07

use super::client::ChainClient;
use crate::chains::SETTLEMENT_SPENDER;
use crate::error::ChainError;
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AllowanceKey {
    account: Address,
    chain_id: u64,
    token: Address,
    required: U256,
}

#[derive(Debug)]
pub struct AllowanceChecker {
    spender: Address,
    cache: DashMap<AllowanceKey, bool>,
}

impl Default for AllowanceChecker {
    fn default() -> Self {
        Self::new(SETTLEMENT_SPENDER)
    }
}

impl AllowanceChecker {
    pub fn new(spender: Address) -> Self {
        Self {
            spender,
            cache: DashMap::new(),
        }
    }

    pub fn spender(&self) -> Address {
        self.spender
    }

    pub async fn has_allowance<C: ChainClient + ?Sized>(
        &self,
        chain: &C,
        account: Address,
        token: Address,
        required: U256,
    ) -> Result<bool, ChainError> {
        let key = AllowanceKey {
            account,
            chain_id: chain.chain_id(),
            token,
            required,
        };
        if let Some(cached) = self.cache.get(&key) {
            return Ok(*cached);
        }

        let allowance = chain.allowance(token, account, self.spender).await?;
        let sufficient = allowance >= required;
        debug!("Allowance {:?}: {} (required {}) -> {}", token, allowance, required, sufficient);
        self.cache.insert(key, sufficient);
        Ok(sufficient)
    }

    /// Drop every cached answer for this token, whatever the required amount
    pub fn invalidate(&self, account: Address, chain_id: u64, token: Address) {
        self.cache
            .retain(|key, _| !(key.account == account && key.chain_id == chain_id && key.token == token));
    }
}
