//! Persistence
//!
//! Order history log and routing control flags.

pub mod control;
pub mod orders;

pub use control::ControlFlags;
pub use orders::OrderHistory;
