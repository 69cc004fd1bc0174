// In-memory chain used by the allowance, balance and executor tests

use super::client::{ChainClient, TxConfirmation};
use crate::error::ChainError;
use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct FakeChain {
    pub account: Address,
    pub native: Mutex<U256>,
    pub allowances: Mutex<HashMap<Address, U256>>,
    /// Successive `balances()` answers; the last one repeats
    pub balance_reads: Mutex<VecDeque<HashMap<Address, U256>>>,
    pub calls: Mutex<Vec<String>>,
    /// Methods whose transaction reverts ("deposit", "approve", ...)
    pub reverting: Mutex<HashSet<&'static str>>,
    /// Methods the signer refuses
    pub rejecting: Mutex<HashSet<&'static str>>,
    /// Hashes not sent through this fake (settlement) whose receipt reverts
    pub reverting_hashes: Mutex<HashSet<TxHash>>,
    /// Number of upcoming `balances()` calls that fail
    pub failing_balance_reads: Mutex<u32>,
    sent: Mutex<HashMap<TxHash, &'static str>>,
}

impl FakeChain {
    pub fn new(account: Address, native: U256) -> Self {
        Self {
            account,
            native: Mutex::new(native),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == method).count()
    }

    pub fn push_balances(&self, balances: &[(Address, u64)]) {
        let map = balances.iter().map(|(a, b)| (*a, U256::from(*b))).collect();
        self.balance_reads.lock().unwrap().push_back(map);
    }

    fn send(&self, method: &'static str) -> Result<TxHash, ChainError> {
        self.calls.lock().unwrap().push(method.to_string());
        if self.rejecting.lock().unwrap().contains(method) {
            return Err(ChainError::Rejected("user denied transaction".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        let hash = TxHash::with_last_byte(sent.len() as u8 + 1);
        sent.insert(hash, method);
        Ok(hash)
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn chain_id(&self) -> u64 {
        1
    }

    fn account(&self) -> Address {
        self.account
    }

    async fn native_balance(&self, _owner: Address) -> Result<U256, ChainError> {
        Ok(*self.native.lock().unwrap())
    }

    async fn allowance(&self, token: Address, _owner: Address, _spender: Address) -> Result<U256, ChainError> {
        self.calls.lock().unwrap().push("allowance".into());
        Ok(self.allowances.lock().unwrap().get(&token).copied().unwrap_or_default())
    }

    async fn approve(&self, token: Address, _spender: Address, amount: U256) -> Result<TxHash, ChainError> {
        let hash = self.send("approve")?;
        self.allowances.lock().unwrap().insert(token, amount);
        Ok(hash)
    }

    async fn deposit(&self, _wrapped: Address, amount: U256) -> Result<TxHash, ChainError> {
        let hash = self.send("deposit")?;
        let mut native = self.native.lock().unwrap();
        *native = native.saturating_sub(amount);
        Ok(hash)
    }

    async fn withdraw(&self, _wrapped: Address, _amount: U256) -> Result<TxHash, ChainError> {
        self.send("withdraw")
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxConfirmation, ChainError> {
        let method = self.sent.lock().unwrap().get(&hash).copied();
        let reverts = match method {
            Some(m) => self.reverting.lock().unwrap().contains(m),
            None => self.reverting_hashes.lock().unwrap().contains(&hash),
        };
        if reverts {
            Err(ChainError::Reverted {
                hash,
                reason: "STF".into(),
            })
        } else {
            Ok(TxConfirmation {
                hash,
                block_number: Some(100),
            })
        }
    }

    async fn balances(&self, _owner: Address, tokens: &[Address]) -> Result<HashMap<Address, U256>, ChainError> {
        self.calls.lock().unwrap().push("balances".into());
        let mut failing = self.failing_balance_reads.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(ChainError::Rpc("balance read failed".into()));
        }
        let mut reads = self.balance_reads.lock().unwrap();
        let current = if reads.len() > 1 {
            reads.pop_front().unwrap_or_default()
        } else {
            reads.front().cloned().unwrap_or_default()
        };
        Ok(current.into_iter().filter(|(token, _)| tokens.contains(token)).collect())
    }
}
