//! Liquidity Hub Swap Engine
//!
//! Quote polling against the hub, hub-vs-dex arbitration, price protection
//! and the wrap/approve/sign/submit/settle pipeline for hub swaps.
//!
//! Created: 2026-10-02

pub mod amounts;
pub mod chains;
pub mod config;
pub mod contracts;
pub mod error;
pub mod history;
pub mod onchain;
pub mod quote;
pub mod routing;
pub mod session;
pub mod swap;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::SwapConfig;
pub use error::{ErrorKind, QuoteError, SwapError};
pub use quote::{QuoteEngine, QuoteRequest, QuoteState, SwapPhase};
pub use routing::{decide_owner, ArbiterInputs, PriceGuard};
pub use swap::{FailureCircuitBreaker, SwapExecutor};
pub use types::{LhControl, Order, Quote, SwapSession, Token, TradeOwner};
