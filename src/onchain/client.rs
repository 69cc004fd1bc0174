//! On-Chain Client
//!
//! Purpose:
//!     The handful of chain operations the swap pipeline performs: allowance
//!     read, max approval, wrap/unwrap, receipt wait, and batched balance
//!     reads through Multicall3.
//!
//! Created: 2026-10-07
//!
//! Design:
//!     - `ChainClient` trait is the seam the executor and reconciler use
//!     - `AlloyChain` implements it over any alloy `Provider` with a wallet
//!     - Receipts are polled with a bounded deadline, reverted receipts
//!       carry a best-effort reason from replaying the call

use crate::chains::MULTICALL3;
use crate::contracts::{IMulticall3, IERC20, IWETH};
use crate::error::ChainError;
use crate::types::{is_native_address, Token};
use alloy::eips::BlockId;
use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::Provider;
use alloy::sol_types::SolCall;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// EIP-1193 "user rejected request"
const USER_REJECTED_CODE: i64 = 4001;

/// Mined, successful transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxConfirmation {
    pub hash: TxHash,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Account transactions are sent from
    fn account(&self) -> Address;

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError>;

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash, ChainError>;

    /// Wrap `amount` of the native asset
    async fn deposit(&self, wrapped: Address, amount: U256) -> Result<TxHash, ChainError>;

    /// Unwrap `amount` back to the native asset
    async fn withdraw(&self, wrapped: Address, amount: U256) -> Result<TxHash, ChainError>;

    /// Wait until `hash` is mined. A reverted receipt is `ChainError::Reverted`.
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxConfirmation, ChainError>;

    /// Balances of `tokens` for `owner`; native placeholders read the native balance.
    /// Tokens whose read failed are missing from the result.
    async fn balances(&self, owner: Address, tokens: &[Address]) -> Result<HashMap<Address, U256>, ChainError>;
}

fn map_transport(err: &TransportError) -> ChainError {
    match err.as_error_resp() {
        Some(resp) if resp.code == USER_REJECTED_CODE => ChainError::Rejected(resp.message.to_string()),
        _ => ChainError::Rpc(err.to_string()),
    }
}

fn map_contract(err: alloy::contract::Error) -> ChainError {
    match &err {
        alloy::contract::Error::TransportError(transport) => map_transport(transport),
        _ => ChainError::Rpc(err.to_string()),
    }
}

pub struct AlloyChain<P> {
    provider: P,
    account: Address,
    chain_id: u64,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl<P: Provider + Clone> AlloyChain<P> {
    pub fn new(provider: P, account: Address, chain_id: u64) -> Self {
        Self {
            provider,
            account,
            chain_id,
            receipt_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_receipt_polling(mut self, timeout: Duration, interval: Duration) -> Self {
        self.receipt_timeout = timeout;
        self.poll_interval = interval;
        self
    }

    /// Symbol and decimals of an ERC-20, for CLI token arguments
    pub async fn fetch_token(&self, address: Address) -> Result<Token, ChainError> {
        let erc20 = IERC20::new(address, self.provider.clone());
        let decimals = erc20.decimals().call().await.map_err(map_contract)?;
        let symbol = erc20.symbol().call().await.map_err(map_contract)?;
        Ok(Token::new(address, symbol, decimals))
    }

    /// Replay a reverted transaction at its block to recover the reason
    async fn revert_reason(&self, hash: TxHash, block_number: Option<u64>) -> String {
        let tx = match self.provider.get_transaction_by_hash(hash).await {
            Ok(Some(tx)) => tx,
            _ => return "execution reverted".to_string(),
        };
        let block = block_number.map(BlockId::number).unwrap_or_else(BlockId::latest);
        match self.provider.call(tx.into_request()).block(block).await {
            Err(e) => e.to_string(),
            Ok(_) => "execution reverted".to_string(),
        }
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> ChainClient for AlloyChain<P> {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn account(&self) -> Address {
        self.account
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.provider.get_balance(owner).await.map_err(|e| map_transport(&e))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError> {
        IERC20::new(token, self.provider.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(map_contract)
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash, ChainError> {
        let pending = IERC20::new(token, self.provider.clone())
            .approve(spender, amount)
            .from(self.account)
            .send()
            .await
            .map_err(map_contract)?;
        let hash = *pending.tx_hash();
        info!("Approval sent: {:?} (token {:?})", hash, token);
        Ok(hash)
    }

    async fn deposit(&self, wrapped: Address, amount: U256) -> Result<TxHash, ChainError> {
        let pending = IWETH::new(wrapped, self.provider.clone())
            .deposit()
            .value(amount)
            .from(self.account)
            .send()
            .await
            .map_err(map_contract)?;
        let hash = *pending.tx_hash();
        info!("Wrap sent: {:?} ({} wei)", hash, amount);
        Ok(hash)
    }

    async fn withdraw(&self, wrapped: Address, amount: U256) -> Result<TxHash, ChainError> {
        let pending = IWETH::new(wrapped, self.provider.clone())
            .withdraw(amount)
            .from(self.account)
            .send()
            .await
            .map_err(map_contract)?;
        let hash = *pending.tx_hash();
        info!("Unwrap sent: {:?} ({} wei)", hash, amount);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxConfirmation, ChainError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    let block_number = receipt.block_number();
                    if receipt.status() {
                        debug!("Receipt {:?} mined in block {:?}", hash, block_number);
                        return Ok(TxConfirmation { hash, block_number });
                    }
                    let reason = self.revert_reason(hash, block_number).await;
                    warn!("Transaction {:?} reverted: {}", hash, reason);
                    return Err(ChainError::Reverted { hash, reason });
                }
                Ok(None) => {}
                Err(e) => debug!("Receipt poll for {:?} failed: {}", hash, e),
            }
            if Instant::now() >= deadline {
                return Err(ChainError::ReceiptTimeout(hash));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn balances(&self, owner: Address, tokens: &[Address]) -> Result<HashMap<Address, U256>, ChainError> {
        let calls: Vec<IMulticall3::Call3> = tokens
            .iter()
            .map(|token| {
                if is_native_address(*token) {
                    IMulticall3::Call3 {
                        target: MULTICALL3,
                        allowFailure: true,
                        callData: IMulticall3::getEthBalanceCall { addr: owner }.abi_encode().into(),
                    }
                } else {
                    IMulticall3::Call3 {
                        target: *token,
                        allowFailure: true,
                        callData: IERC20::balanceOfCall { account: owner }.abi_encode().into(),
                    }
                }
            })
            .collect();

        let results = IMulticall3::new(MULTICALL3, self.provider.clone())
            .aggregate3(calls)
            .call()
            .await
            .map_err(map_contract)?;

        let mut balances = HashMap::with_capacity(tokens.len());
        for (token, result) in tokens.iter().zip(results) {
            if !result.success {
                debug!("balance read failed for {:?}", token);
                continue;
            }
            let decoded = if is_native_address(*token) {
                IMulticall3::getEthBalanceCall::abi_decode_returns(&result.returnData)
            } else {
                IERC20::balanceOfCall::abi_decode_returns(&result.returnData)
            };
            match decoded {
                Ok(balance) => {
                    balances.insert(*token, balance);
                }
                Err(e) => debug!("balance decode failed for {:?}: {}", token, e),
            }
        }
        Ok(balances)
    }
}
