//! On-Chain Module
//!
//! Chain reads and transactions, the allowance cache and post-swap balance
//! reconciliation.

pub mod allowance;
pub mod balances;
pub mod client;

#[cfg(test)]
pub(crate) mod testing;

pub use allowance::AllowanceChecker;
pub use balances::{BalanceCache, BalanceKey, BalanceReconciler, ReconcileOutcome};
pub use client::{AlloyChain, ChainClient, TxConfirmation};
