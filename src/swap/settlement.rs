//! Settlement API Client
//!
//! Submits the signed order to `POST {api}/{submit_path}?chainId=` and polls
//! `POST {api}/swap/status/{sessionId}?chainId=` until the hub reports the
//! on-chain transaction hash. The status loop has its own bounded budget;
//! a single failed poll is logged and retried, never fatal.
//!
//! Created: 2026-10-08

use crate::error::SwapError;
use crate::types::Quote;
use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Signed order ready for submission
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub api_url: String,
    pub chain_id: u64,
    pub quote: Quote,
    pub user: Address,
    pub signature: String,
}

impl SubmitRequest {
    pub fn session_id(&self) -> Option<&str> {
        self.quote.session_id.as_deref()
    }

    fn body(&self) -> Value {
        let q = &self.quote;
        json!({
            "inToken": format!("{:?}", q.in_token),
            "outToken": format!("{:?}", q.out_token),
            "inAmount": q.in_amount.to_string(),
            "outAmount": q.out_amount.to_string(),
            "minAmountOut": q.min_amount_out.to_string(),
            "gasAmountOut": q.gas_amount_out.map(|g| g.to_string()),
            "slippage": q.slippage,
            "sessionId": q.session_id,
            "serializedOrder": q.serialized_order,
            "permitData": q.permit_data,
            "user": format!("{:?}", self.user),
            "signature": self.signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPoll {
    Pending,
    Mined(TxHash),
    Failed(String),
}

#[async_trait]
pub trait SettlementApi: Send + Sync {
    /// Returns the tx hash if the hub already knows it
    async fn submit(&self, request: &SubmitRequest) -> Result<Option<TxHash>, SwapError>;

    async fn status(&self, api_url: &str, chain_id: u64, session_id: &str, user: Address) -> Result<StatusPoll, SwapError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettlementResponse {
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SettlementResponse {
    fn tx_hash(&self) -> Result<Option<TxHash>, SwapError> {
        match self.tx_hash.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<TxHash>()
                .map(Some)
                .map_err(|_| SwapError::Settlement(format!("invalid txHash {:?}", raw))),
        }
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

pub struct HubSettlementClient {
    client: reqwest::Client,
    submit_path: String,
}

impl HubSettlementClient {
    pub fn new(submit_path: impl Into<String>, timeout: Duration) -> Result<Self, SwapError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SwapError::Settlement(e.to_string()))?;
        Ok(Self {
            client,
            submit_path: submit_path.into(),
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<SettlementResponse, SwapError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SwapError::Settlement(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| SwapError::Settlement(e.to_string()))?;
        let parsed: SettlementResponse = serde_json::from_str(&text).unwrap_or_default();
        if !status.is_success() && parsed.error().is_none() {
            return Err(SwapError::Settlement(format!("status {}", status)));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl SettlementApi for HubSettlementClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<Option<TxHash>, SwapError> {
        let url = format!(
            "{}/{}?chainId={}",
            request.api_url.trim_end_matches('/'),
            self.submit_path.trim_matches('/'),
            request.chain_id
        );
        info!("Submitting order (session {:?})", request.session_id());
        let response = self.post(&url, &request.body()).await?;
        if let Some(err) = response.error() {
            return Err(SwapError::Settlement(err.to_string()));
        }
        response.tx_hash()
    }

    async fn status(&self, api_url: &str, chain_id: u64, session_id: &str, user: Address) -> Result<StatusPoll, SwapError> {
        let url = format!(
            "{}/swap/status/{}?chainId={}",
            api_url.trim_end_matches('/'),
            session_id,
            chain_id
        );
        let response = self.post(&url, &json!({ "user": format!("{:?}", user) })).await?;
        if let Some(err) = response.error() {
            return Ok(StatusPoll::Failed(err.to_string()));
        }
        Ok(match response.tx_hash()? {
            Some(hash) => StatusPoll::Mined(hash),
            None => StatusPoll::Pending,
        })
    }
}

/// Poll the status endpoint until it reports a tx hash or the budget runs out
pub async fn poll_status<S: SettlementApi + ?Sized>(
    api: &S,
    api_url: &str,
    chain_id: u64,
    session_id: &str,
    user: Address,
    interval: Duration,
    max_attempts: u32,
) -> Result<TxHash, SwapError> {
    for attempt in 1..=max_attempts {
        match api.status(api_url, chain_id, session_id, user).await {
            Ok(StatusPoll::Mined(hash)) => {
                info!("Hub reported tx {:?} after {} poll(s)", hash, attempt);
                return Ok(hash);
            }
            Ok(StatusPoll::Failed(reason)) => {
                warn!("Hub reported swap failure: {}", reason);
                return Err(SwapError::Settlement(reason));
            }
            Ok(StatusPoll::Pending) => debug!("Status poll {}/{}: pending", attempt, max_attempts),
            Err(e) => debug!("Status poll {}/{} failed: {}", attempt, max_attempts, e),
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(SwapError::StatusTimeout { attempts: max_attempts })
}
