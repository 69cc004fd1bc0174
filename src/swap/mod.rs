//! Swap Module
//!
//! Hub swap execution: the step state machine, permit signing, the
//! settlement API, the failure circuit breaker and unwrap.

pub mod breaker;
pub mod executor;
pub mod settlement;
pub mod signer;
pub mod unwrap;

pub use breaker::FailureCircuitBreaker;
pub use executor::{SwapExecutor, SwapInput, SwapReceipt, SwapServices};
pub use settlement::{HubSettlementClient, SettlementApi, StatusPoll, SubmitRequest};
pub use signer::{sign_permit, LocalSigner, RpcWalletSigner, SignMethod, TypedDataSigner};
pub use unwrap::unwrap_native;
