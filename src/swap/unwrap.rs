//! Unwrap
//!
//! Converts the wrapped native asset back to native, for users left holding
//! it after a wrapped swap attempt failed.

use crate::amounts::amount_ui;
use crate::chains;
use crate::error::SwapError;
use crate::onchain::{ChainClient, TxConfirmation};
use alloy::primitives::U256;
use tracing::info;

pub async fn unwrap_native<C: ChainClient + ?Sized>(chain: &C, amount: U256) -> Result<TxConfirmation, SwapError> {
    if amount.is_zero() {
        return Err(SwapError::MissingInput("amount"));
    }
    let info = chains::chain_info(chain.chain_id()).ok_or(SwapError::MissingInput("supported chain"))?;
    let account = chain.account();

    let balances = chain
        .balances(account, &[info.wrapped_native])
        .await
        .map_err(|e| SwapError::from_chain("balance", e))?;
    let available = balances.get(&info.wrapped_native).copied().unwrap_or_default();
    if available < amount {
        return Err(SwapError::InsufficientBalance {
            required: amount_ui(info.native_decimals, amount),
            available: amount_ui(info.native_decimals, available),
        });
    }

    let hash = chain
        .withdraw(info.wrapped_native, amount)
        .await
        .map_err(|e| SwapError::from_chain("unwrap", e))?;
    let confirmation = chain
        .wait_for_receipt(hash)
        .await
        .map_err(|e| SwapError::from_chain("unwrap", e))?;
    info!(
        "Unwrapped {} {} -> {} ({:?})",
        amount_ui(info.native_decimals, amount),
        info.wrapped_symbol,
        info.native_symbol,
        hash
    );
    Ok(confirmation)
}
