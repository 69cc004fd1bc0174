//! Price-Protection Gate
//!
//! Purpose:
//!     While the confirmation view is open the quote keeps refreshing. If a
//!     refresh lowers the post-slippage output below what the user accepted,
//!     execution is blocked until the new price is explicitly accepted.
//!
//! Created: 2026-10-07
//!
//! Design:
//!     - `open()` snapshots the accepted minimum output
//!     - Refreshes are ignored once a swap attempt has started
//!     - Once raised, the flag stays up until `accept()`, even if the price recovers

use crate::error::SwapError;
use crate::types::{Quote, SwapStatus};
use alloy::primitives::U256;
use tracing::{debug, info};

/// Quote the user agreed to; only `PriceGuard::confirmed` builds one
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedQuote {
    quote: Quote,
    accepted_min_out: U256,
}

impl AcceptedQuote {
    pub fn quote(&self) -> &Quote {
        &self.quote
    }

    pub fn accepted_min_out(&self) -> U256 {
        self.accepted_min_out
    }
}

#[derive(Debug, Default)]
pub struct PriceGuard {
    accepted: Option<U256>,
    latest: Option<Quote>,
    should_accept: bool,
    frozen: bool,
}

impl PriceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirmation view opened on `quote`
    pub fn open(&mut self, quote: &Quote) {
        self.accepted = Some(quote.min_amount_out);
        self.latest = Some(quote.clone());
        self.should_accept = false;
        self.frozen = false;
        debug!("Price accepted at min-out {}", quote.min_amount_out);
    }

    /// Feed a refreshed quote. Returns the new `should_accept` flag.
    pub fn on_quote(&mut self, quote: &Quote, status: SwapStatus) -> bool {
        let Some(accepted) = self.accepted else {
            return false;
        };
        if self.frozen || status != SwapStatus::Idle {
            self.frozen = true;
            return self.should_accept;
        }

        if quote.min_amount_out < accepted && !self.should_accept {
            self.should_accept = true;
            info!(
                "Price dropped: min-out {} < accepted {}, re-accept required",
                quote.min_amount_out, accepted
            );
        }
        self.latest = Some(quote.clone());
        self.should_accept
    }

    pub fn should_accept(&self) -> bool {
        self.should_accept
    }

    pub fn accepted_min_out(&self) -> Option<U256> {
        self.accepted
    }

    /// Take the latest quote's min-out as the new accepted price
    pub fn accept(&mut self) {
        if let Some(latest) = self.latest.as_ref() {
            self.accepted = Some(latest.min_amount_out);
            self.should_accept = false;
        }
    }

    /// Quote to execute, or `PriceNotAccepted` while a lower price is pending
    pub fn confirmed(&self) -> Result<AcceptedQuote, SwapError> {
        let (Some(accepted), Some(quote)) = (self.accepted, self.latest.as_ref()) else {
            return Err(SwapError::MissingInput("accepted quote"));
        };
        if self.should_accept {
            return Err(SwapError::PriceNotAccepted);
        }
        Ok(AcceptedQuote {
            quote: quote.clone(),
            accepted_min_out: accepted,
        })
    }

    /// Freeze explicitly when the swap starts
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn close(&mut self) {
        *self = Self::default();
    }
}
