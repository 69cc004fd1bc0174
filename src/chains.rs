//! Chain Registry
//!
//! Static per-chain data: wrapped native token, hub API base URL and block
//! explorer. Anything not in the table is an unsupported chain, which turns
//! hub quoting off.
//!
//! Created: 2026-10-02

use crate::types::{Token, NATIVE_PLACEHOLDER};
use alloy::primitives::{address, Address, TxHash};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Permit2, the spender every hub settlement pulls tokens through
pub const SETTLEMENT_SPENDER: Address = address!("000000000022D473030F116dDEE9F6B43aC78BA3");

/// Multicall3 deployed address (same on all supported chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Default hub API base URL
pub const DEFAULT_API_URL: &str = "https://hub.orbs.network";

#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub chain_id: u64,
    pub name: &'static str,
    pub native_symbol: &'static str,
    pub native_decimals: u8,
    pub wrapped_native: Address,
    pub wrapped_symbol: &'static str,
    pub api_url: &'static str,
    pub explorer_url: &'static str,
}

impl ChainInfo {
    pub fn native_token(&self) -> Token {
        Token::new(NATIVE_PLACEHOLDER, self.native_symbol, self.native_decimals)
    }

    pub fn wrapped_token(&self) -> Token {
        Token::new(self.wrapped_native, self.wrapped_symbol, self.native_decimals)
    }

    pub fn explorer_tx_link(&self, tx_hash: TxHash) -> String {
        format!("{}/tx/{:?}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

static CHAINS: Lazy<HashMap<u64, ChainInfo>> = Lazy::new(|| {
    [
        ChainInfo {
            chain_id: 1,
            name: "ethereum",
            native_symbol: "ETH",
            native_decimals: 18,
            wrapped_native: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            wrapped_symbol: "WETH",
            api_url: DEFAULT_API_URL,
            explorer_url: "https://etherscan.io",
        },
        ChainInfo {
            chain_id: 56,
            name: "bsc",
            native_symbol: "BNB",
            native_decimals: 18,
            wrapped_native: address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
            wrapped_symbol: "WBNB",
            api_url: DEFAULT_API_URL,
            explorer_url: "https://bscscan.com",
        },
        ChainInfo {
            chain_id: 137,
            name: "polygon",
            native_symbol: "POL",
            native_decimals: 18,
            wrapped_native: address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270"),
            wrapped_symbol: "WPOL",
            api_url: DEFAULT_API_URL,
            explorer_url: "https://polygonscan.com",
        },
        ChainInfo {
            chain_id: 8453,
            name: "base",
            native_symbol: "ETH",
            native_decimals: 18,
            wrapped_native: address!("4200000000000000000000000000000000000006"),
            wrapped_symbol: "WETH",
            api_url: DEFAULT_API_URL,
            explorer_url: "https://basescan.org",
        },
        ChainInfo {
            chain_id: 59144,
            name: "linea",
            native_symbol: "ETH",
            native_decimals: 18,
            wrapped_native: address!("e5D7C2a44FfDDf6b295A15c148167daaAf5Cf34f"),
            wrapped_symbol: "WETH",
            api_url: DEFAULT_API_URL,
            explorer_url: "https://lineascan.build",
        },
    ]
    .into_iter()
    .map(|c| (c.chain_id, c))
    .collect()
});

pub fn chain_info(chain_id: u64) -> Option<&'static ChainInfo> {
    CHAINS.get(&chain_id)
}

pub fn is_supported(chain_id: u64) -> bool {
    CHAINS.contains_key(&chain_id)
}

/// Address the hub trades for `token`: the wrapped asset stands in for native
pub fn hub_token_address(chain_id: u64, token: &Token) -> Address {
    match chain_info(chain_id) {
        Some(chain) if token.is_native() => chain.wrapped_native,
        _ => token.address,
    }
}

/// Lookup by CLI name ("polygon", "base", ...)
pub fn chain_by_name(name: &str) -> Option<&'static ChainInfo> {
    let name = name.to_lowercase();
    CHAINS.values().find(|c| c.name == name)
}
