//! Permit Signing
//!
//! EIP-712 signature over the hub's permit data. Wallet-backed signers try
//! `eth_signTypedData_v4` first and fall back to legacy `eth_signTypedData`.
//! A rejection ends the attempt; a wallet supporting neither method is
//! reported as unsupported.
//!
//! Created: 2026-10-08

use crate::error::{SwapError, WalletError};
use crate::types::PermitData;
use alloy::dyn_abi::TypedData;
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// EIP-1193 "user rejected request"
const USER_REJECTED_CODE: i64 = 4001;
/// JSON-RPC "method not found"
const METHOD_NOT_FOUND_CODE: i64 = -32601;
/// EIP-1474 "method not supported"
const METHOD_NOT_SUPPORTED_CODE: i64 = -32004;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMethod {
    V4,
    Legacy,
}

impl SignMethod {
    pub fn rpc_name(&self) -> &'static str {
        match self {
            SignMethod::V4 => "eth_signTypedData_v4",
            SignMethod::Legacy => "eth_signTypedData",
        }
    }
}

#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    /// Hex signature (0x-prefixed, 65 bytes)
    async fn sign_typed_data(&self, method: SignMethod, account: Address, permit: &PermitData) -> Result<String, WalletError>;
}

/// Sign `permit`, trying the v4 method then the legacy one
pub async fn sign_permit<S: TypedDataSigner + ?Sized>(
    signer: &S,
    account: Address,
    permit: &PermitData,
) -> Result<String, SwapError> {
    if permit.is_empty() {
        return Err(SwapError::QuoteNotExecutable("quote has no permit data".into()));
    }

    for method in [SignMethod::V4, SignMethod::Legacy] {
        debug!("Requesting signature via {}", method.rpc_name());
        match signer.sign_typed_data(method, account, permit).await {
            Ok(signature) => {
                info!("Permit signed via {}", method.rpc_name());
                return Ok(signature);
            }
            Err(WalletError::Rejected) => return Err(SwapError::UserRejected("signature")),
            Err(WalletError::MethodUnsupported(name)) => {
                warn!("Wallet does not support {}", name);
            }
            Err(e) => return Err(SwapError::Signing(e.to_string())),
        }
    }
    Err(SwapError::UnsupportedWallet)
}

/// Signs in-process with a private key; both methods produce the same v4 signature
pub struct LocalSigner {
    signer: PrivateKeySigner,
}

impl LocalSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

#[async_trait]
impl TypedDataSigner for LocalSigner {
    async fn sign_typed_data(&self, _method: SignMethod, account: Address, permit: &PermitData) -> Result<String, WalletError> {
        if account != self.signer.address() {
            return Err(WalletError::Other(format!("signer does not control {:?}", account)));
        }
        let payload = permit.to_typed_data()?;
        let typed: TypedData =
            serde_json::from_value(payload).map_err(|e| WalletError::InvalidPayload(e.to_string()))?;
        let signature = self
            .signer
            .sign_dynamic_typed_data(&typed)
            .await
            .map_err(|e| WalletError::Other(e.to_string()))?;
        Ok(alloy::hex::encode_prefixed(signature.as_bytes()))
    }
}

/// Delegates signing to the node / wallet behind an alloy provider
pub struct RpcWalletSigner<P> {
    provider: P,
}

impl<P: Provider> RpcWalletSigner<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider + 'static> TypedDataSigner for RpcWalletSigner<P> {
    async fn sign_typed_data(&self, method: SignMethod, account: Address, permit: &PermitData) -> Result<String, WalletError> {
        let payload = permit.to_typed_data()?;
        // Wallets expect the typed data as a JSON string parameter
        let payload = serde_json::to_string(&payload).map_err(|e| WalletError::InvalidPayload(e.to_string()))?;

        self.provider
            .raw_request::<_, String>(method.rpc_name().into(), (account, payload))
            .await
            .map_err(|e| match e.as_error_resp() {
                Some(resp) if resp.code == USER_REJECTED_CODE => WalletError::Rejected,
                Some(resp) if resp.code == METHOD_NOT_FOUND_CODE || resp.code == METHOD_NOT_SUPPORTED_CODE => {
                    WalletError::MethodUnsupported(method.rpc_name())
                }
                _ => WalletError::Other(e.to_string()),
            })
    }
}
