//! Trade-Owner Arbiter
//!
//! Decides which venue executes the trade. Pure function of the current hub
//! output, the external dex minimum output and the routing flags; callers
//! re-run it whenever any input changes.

use crate::types::{LhControl, TradeOwner};
use alloy::primitives::U256;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterInputs {
    /// Hub quote output, zero when there is no usable quote
    pub hub_out_amount: U256,
    /// Minimum output of the dex route, zero when unknown
    pub dex_min_amount_out: U256,
    pub control: LhControl,
    /// User preference; `false` routes everything to the dex
    pub hub_enabled: bool,
    /// Circuit breaker open or explicit kill switch
    pub disabled: bool,
}

pub fn decide_owner(inputs: &ArbiterInputs) -> TradeOwner {
    let owner = if inputs.disabled {
        TradeOwner::Dex
    } else if inputs.hub_out_amount.is_zero() && inputs.dex_min_amount_out.is_zero() {
        TradeOwner::Undecided
    } else if inputs.control == LhControl::Skip || !inputs.hub_enabled {
        TradeOwner::Dex
    } else if inputs.hub_out_amount.is_zero() {
        // Even a forced route needs a hub quote with output
        TradeOwner::Dex
    } else if inputs.control == LhControl::Force || inputs.hub_out_amount > inputs.dex_min_amount_out {
        TradeOwner::Lh
    } else {
        TradeOwner::Dex
    };

    trace!(
        "Trade owner: {} (hub={} dex={} control={:?})",
        owner,
        inputs.hub_out_amount,
        inputs.dex_min_amount_out,
        inputs.control
    );
    owner
}
