// Core data structures shared by the quote, routing and swap stages

use crate::error::WalletError;
use alloy::primitives::{address, Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Placeholder address wallets and token lists use for the chain-native asset
pub const NATIVE_PLACEHOLDER: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// ERC-20 token (or the native asset, see `is_native`)
///
/// Identity is the address only. `Address` compares bytes, so checksummed
/// and lowercase spellings of the same token are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            name: None,
            logo_url: None,
        }
    }

    /// True for the zero address and the 0xEeee.. placeholder
    pub fn is_native(&self) -> bool {
        is_native_address(self.address)
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({:?})", self.symbol, self.address)
    }
}

pub fn is_native_address(address: Address) -> bool {
    address == Address::ZERO || address == NATIVE_PLACEHOLDER
}

/// EIP-712 payload returned by the hub, passed through to the wallet unmodified
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermitData {
    #[serde(default)]
    pub domain: Value,
    #[serde(default)]
    pub types: Value,
    #[serde(default)]
    pub values: Value,
}

/// Field order mandated by EIP-712 for the domain separator type
const DOMAIN_FIELDS: [(&str, &str); 5] = [
    ("name", "string"),
    ("version", "string"),
    ("chainId", "uint256"),
    ("verifyingContract", "address"),
    ("salt", "bytes32"),
];

impl PermitData {
    pub fn is_empty(&self) -> bool {
        self.types.is_null() || self.values.is_null()
    }

    /// Build the full `eth_signTypedData_v4` payload.
    ///
    /// The hub sends ethers-style `{domain, types, values}`; wallets want
    /// `{types (incl. EIP712Domain), primaryType, domain, message}`.
    pub fn to_typed_data(&self) -> Result<Value, WalletError> {
        let types = self
            .types
            .as_object()
            .ok_or_else(|| WalletError::InvalidPayload("types is not an object".into()))?;
        let domain = self
            .domain
            .as_object()
            .ok_or_else(|| WalletError::InvalidPayload("domain is not an object".into()))?;

        let mut all_types: Map<String, Value> = types.clone();
        all_types.remove("EIP712Domain");
        let primary = primary_type(&all_types)?;

        let domain_type: Vec<Value> = DOMAIN_FIELDS
            .iter()
            .filter(|(field, _)| domain.contains_key(*field))
            .map(|(field, ty)| json!({ "name": field, "type": ty }))
            .collect();
        all_types.insert("EIP712Domain".to_string(), Value::Array(domain_type));

        Ok(json!({
            "types": all_types,
            "primaryType": primary,
            "domain": self.domain,
            "message": self.values,
        }))
    }
}

/// The primary type is the one no other struct references.
fn primary_type(types: &Map<String, Value>) -> Result<String, WalletError> {
    let referenced: Vec<String> = types
        .values()
        .filter_map(|fields| fields.as_array())
        .flatten()
        .filter_map(|field| field.get("type").and_then(Value::as_str))
        .map(|ty| ty.trim_end_matches("[]").to_string())
        .collect();

    let mut candidates = types.keys().filter(|name| !referenced.contains(name));
    match (candidates.next(), candidates.next()) {
        (Some(name), None) => Ok(name.clone()),
        (None, _) => Err(WalletError::InvalidPayload("no primary type".into())),
        (Some(_), Some(_)) => Err(WalletError::InvalidPayload("ambiguous primary type".into())),
    }
}

/// Why a quote came back with a zero output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoRouteReason {
    NoLiquidity,
    DexIsBetter,
}

/// Hub quote, read-only once produced by the quote client
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub in_token: Address,
    pub out_token: Address,
    pub in_amount: U256,
    pub out_amount: U256,
    /// Post-slippage minimum output
    pub min_amount_out: U256,
    /// Percent, e.g. 0.5
    pub slippage: f64,
    pub session_id: Option<String>,
    pub serialized_order: String,
    pub permit_data: PermitData,
    /// Gas cost expressed in the output token
    pub gas_amount_out: Option<U256>,
    pub error: Option<String>,
    pub no_route: Option<NoRouteReason>,
}

impl Quote {
    /// Zero-output quote used when the hub has no route
    pub fn no_route(in_token: Address, out_token: Address, in_amount: U256, slippage: f64, reason: NoRouteReason) -> Self {
        Self {
            in_token,
            out_token,
            in_amount,
            out_amount: U256::ZERO,
            min_amount_out: U256::ZERO,
            slippage,
            session_id: None,
            serialized_order: String::new(),
            permit_data: PermitData::default(),
            gas_amount_out: None,
            error: None,
            no_route: Some(reason),
        }
    }

    /// Zero-output or errored quotes never reach execution
    pub fn is_executable(&self) -> bool {
        !self.out_amount.is_zero() && self.error.is_none() && !self.serialized_order.is_empty()
    }
}

/// Which venue executes the trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOwner {
    Dex,
    Lh,
    Undecided,
}

impl fmt::Display for TradeOwner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TradeOwner::Dex => write!(f, "dex"),
            TradeOwner::Lh => write!(f, "lh"),
            TradeOwner::Undecided => write!(f, "undecided"),
        }
    }
}

/// Manual routing override persisted with the control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LhControl {
    #[default]
    None,
    Skip,
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStep {
    #[default]
    None,
    Wrap,
    Approve,
    Sign,
    Submit,
    Settle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Failed,
}

impl SwapStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapStatus::Success | SwapStatus::Failed)
    }
}

/// Per-attempt swap state, written only by the swap executor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapSession {
    pub step: SwapStep,
    pub status: SwapStatus,
    pub is_wrapped: bool,
    pub tx_hash: Option<TxHash>,
    /// Mirrors the circuit-breaker counter; survives `reset`
    pub failures: u32,
    /// Incremented on every new attempt, used to scope delayed resets
    pub attempt: u64,
    pub error: Option<String>,
}

impl SwapSession {
    pub fn reset(&mut self) {
        *self = Self {
            failures: self.failures,
            attempt: self.attempt,
            ..Self::default()
        };
    }
}

/// Successful swap, appended to the per-account order log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub from_token: Token,
    pub to_token: Token,
    pub from_amount: String,
    pub to_amount: String,
    pub tx_hash: TxHash,
    pub explorer_link: String,
    pub date: DateTime<Utc>,
}
