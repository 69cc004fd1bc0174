//! Error Types
//!
//! Typed errors for every stage of the quote -> swap pipeline. Each swap
//! error maps onto one taxonomy class (`ErrorKind`) which decides the
//! user-facing message and whether the failure trips the circuit breaker.
//!
//! Created: 2026-10-02

use alloy::primitives::TxHash;
use thiserror::Error;

/// Coarse failure class shared by all pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Quote or status fetch failed / exceeded its bound. Retryable.
    Network,
    /// Hub has no route (or the dex route is better). Routed to DEX.
    NoLiquidity,
    /// Wallet declined a signature or transaction.
    UserRejected,
    /// Wallet cannot sign EIP-712 typed data.
    UnsupportedWallet,
    /// Not enough native asset to wrap / pay.
    InsufficientBalance,
    /// Mined transaction reverted.
    OnChainRevert,
    /// Missing token / amount / account, or a gated precondition.
    InvalidState,
}

/// Quote API failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("quote request timed out after {0}ms")]
    Timeout(u64),

    #[error("quote request failed: {0}")]
    Http(String),

    #[error("quote API responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid quote response: {0}")]
    Decode(String),

    #[error("no liquidity for this trade")]
    NoLiquidity,

    #[error("dex route returns more than the hub")]
    DexIsBetter,

    #[error("hub returned error: {0}")]
    Hub(String),

    #[error("chain {0} is not supported")]
    UnsupportedChain(u64),
}

impl QuoteError {
    /// True for the conditions that become a zero-amount quote instead of an error.
    pub fn is_no_liquidity(&self) -> bool {
        matches!(self, QuoteError::NoLiquidity | QuoteError::DexIsBetter)
    }
}

/// On-chain read / transaction failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction rejected by signer: {0}")]
    Rejected(String),

    #[error("transaction {hash} reverted: {reason}")]
    Reverted { hash: TxHash, reason: String },

    #[error("timed out waiting for receipt of {0}")]
    ReceiptTimeout(TxHash),

    #[error("malformed contract response: {0}")]
    Decode(String),
}

/// Wallet typed-data signing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("user rejected the signature request")]
    Rejected,

    #[error("wallet does not support {0}")]
    MethodUnsupported(&'static str),

    #[error("invalid typed data: {0}")]
    InvalidPayload(String),

    #[error("wallet error: {0}")]
    Other(String),
}

/// Terminal outcome of a failed swap attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("a swap is already in progress")]
    AlreadyInProgress,

    #[error("missing {0}")]
    MissingInput(&'static str),

    #[error("quote is not executable: {0}")]
    QuoteNotExecutable(String),

    #[error("hub routing disabled after {failures} failed swaps")]
    HubDisabled { failures: u32 },

    #[error("price changed, re-accept the new quote before swapping")]
    PriceNotAccepted,

    #[error("session {0} already failed, request a fresh quote")]
    SessionBurned(String),

    #[error("user rejected {0}")]
    UserRejected(&'static str),

    #[error("wallet does not support EIP-712 typed data signing")]
    UnsupportedWallet,

    #[error("insufficient native balance: need {required}, have {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("transaction {hash} reverted: {reason}")]
    Reverted { hash: TxHash, reason: String },

    #[error("{step} failed: {reason}")]
    Chain { step: &'static str, reason: String },

    #[error("settlement API error: {0}")]
    Settlement(String),

    #[error("swap status not resolved after {attempts} polls")]
    StatusTimeout { attempts: u32 },

    #[error("signing failed: {0}")]
    Signing(String),
}

impl SwapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwapError::AlreadyInProgress
            | SwapError::MissingInput(_)
            | SwapError::PriceNotAccepted
            | SwapError::HubDisabled { .. }
            | SwapError::SessionBurned(_) => ErrorKind::InvalidState,
            SwapError::QuoteNotExecutable(_) => ErrorKind::NoLiquidity,
            SwapError::UserRejected(_) => ErrorKind::UserRejected,
            SwapError::UnsupportedWallet => ErrorKind::UnsupportedWallet,
            SwapError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            SwapError::Reverted { .. } => ErrorKind::OnChainRevert,
            SwapError::Chain { .. }
            | SwapError::Settlement(_)
            | SwapError::StatusTimeout { .. }
            | SwapError::Signing(_) => ErrorKind::Network,
        }
    }

    /// Only systemic hub/chain failures count toward the circuit breaker.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::OnChainRevert)
    }

    /// Message shown to the user, chosen by taxonomy class.
    pub fn user_message(&self, is_wrapped: bool) -> String {
        let base = match self.kind() {
            ErrorKind::Network => "The swap could not be completed. Please try again.".to_string(),
            ErrorKind::NoLiquidity => "No liquidity for this trade.".to_string(),
            ErrorKind::UserRejected => "Request rejected in wallet.".to_string(),
            ErrorKind::UnsupportedWallet => {
                "Your wallet does not support signing typed data. Try a different wallet.".to_string()
            }
            ErrorKind::InsufficientBalance => "Insufficient balance.".to_string(),
            ErrorKind::OnChainRevert => format!("Transaction failed on chain: {}", self),
            ErrorKind::InvalidState => self.to_string(),
        };
        if is_wrapped {
            format!("{} Your native tokens were wrapped and remain in your wallet.", base)
        } else {
            base
        }
    }

    pub(crate) fn from_chain(step: &'static str, err: ChainError) -> Self {
        match err {
            ChainError::Reverted { hash, reason } => SwapError::Reverted { hash, reason },
            ChainError::Rejected(_) => SwapError::UserRejected(step),
            other => SwapError::Chain {
                step,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejection_not_counted() {
        assert!(!SwapError::UserRejected("signature").counts_against_breaker());
        assert!(!SwapError::UnsupportedWallet.counts_against_breaker());
        assert!(SwapError::StatusTimeout { attempts: 60 }.counts_against_breaker());
        assert!(SwapError::Reverted {
            hash: TxHash::ZERO,
            reason: "STF".into()
        }
        .counts_against_breaker());
    }

    #[test]
    fn test_chain_error_mapping() {
        let err = SwapError::from_chain("approve", ChainError::Rejected("denied".into()));
        assert_eq!(err.kind(), ErrorKind::UserRejected);

        let err = SwapError::from_chain("wrap", ChainError::Rpc("boom".into()));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_hub_disabled_is_not_no_liquidity() {
        let err = SwapError::HubDisabled { failures: 3 };
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!err.counts_against_breaker());
        assert_eq!(err.user_message(false), "hub routing disabled after 3 failed swaps");
    }

    #[test]
    fn test_wrapped_message_mentions_wrapped_tokens() {
        let msg = SwapError::Settlement("down".into()).user_message(true);
        assert!(msg.contains("wrapped"));
    }
}
