//! Routing Module
//!
//! Venue selection (hub vs dex) and price protection for the confirmation step.

pub mod arbiter;
pub mod price_guard;

pub use arbiter::{decide_owner, ArbiterInputs};
pub use price_guard::{AcceptedQuote, PriceGuard};
