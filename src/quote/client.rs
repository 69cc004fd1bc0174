//! Hub Quote Client
//!
//! One quote request/response cycle against `POST {apiUrl}/quote?chainId=`.
//! Bounded by a fixed timeout. Recognised "no route" answers are classified
//! here (`NoLiquidity` / `DexIsBetter`); turning them into zero quotes is the
//! engine's job.
//!
//! Created: 2026-10-05

use crate::amounts::{apply_slippage, slippage_to_bps};
use crate::error::QuoteError;
use crate::types::{PermitData, Quote};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Hub error code: trade not supported (no liquidity)
const ERR_NO_LIQUIDITY: &str = "tns";
/// Hub error code: the dex route beats the hub
const ERR_DEX_BETTER: &str = "ldv";

/// Client tag sent in the `qs` field
const CLIENT_TAG: &str = "lh-swap";

/// Everything one quote call needs
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteApiRequest {
    pub api_url: String,
    pub chain_id: u64,
    pub in_token: Address,
    pub out_token: Address,
    pub in_amount: U256,
    /// Dex min-out for the hub to beat, `None` sends "-1"
    pub dex_min_amount_out: Option<U256>,
    pub user: Option<Address>,
    pub slippage: f64,
    pub partner: String,
    pub session_id: Option<String>,
}

#[async_trait]
pub trait QuoteApi: Send + Sync {
    async fn quote(&self, request: &QuoteApiRequest) -> Result<Quote, QuoteError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody<'a> {
    in_token: String,
    out_token: String,
    in_amount: String,
    out_amount: String,
    user: String,
    slippage: f64,
    qs: &'a str,
    partner: &'a str,
    session_id: Option<&'a str>,
}

/// Raw `/quote` response, amounts as decimal strings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuoteResponse {
    #[serde(default)]
    pub out_amount: Option<String>,
    #[serde(default)]
    pub min_amount_out: Option<String>,
    #[serde(default)]
    pub gas_amount_out: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub permit_data: Option<PermitData>,
    #[serde(default)]
    pub serialized_order: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn parse_amount(field: &str, value: &str) -> Result<U256, QuoteError> {
    U256::from_str_radix(value.trim(), 10)
        .map_err(|_| QuoteError::Decode(format!("{} is not an unsigned integer: {:?}", field, value)))
}

/// Turn a raw response into a `Quote`, classifying the no-route answers
pub fn parse_quote(request: &QuoteApiRequest, raw: RawQuoteResponse) -> Result<Quote, QuoteError> {
    if let Some(err) = raw.error.as_deref().filter(|e| !e.is_empty()) {
        return Err(match err {
            ERR_NO_LIQUIDITY => QuoteError::NoLiquidity,
            ERR_DEX_BETTER => QuoteError::DexIsBetter,
            other => QuoteError::Hub(other.to_string()),
        });
    }

    // Missing, zero or negative output all mean "no route"
    let out_amount = match raw.out_amount.as_deref().map(str::trim) {
        None | Some("") => return Err(QuoteError::NoLiquidity),
        Some(s) if s.starts_with('-') => return Err(QuoteError::NoLiquidity),
        Some(s) => parse_amount("outAmount", s)?,
    };
    if out_amount.is_zero() {
        return Err(QuoteError::NoLiquidity);
    }

    let slippage_bps = slippage_to_bps(request.slippage).map_err(|e| QuoteError::Decode(e.to_string()))?;
    let min_amount_out = match raw.min_amount_out.as_deref() {
        Some(s) if !s.trim().is_empty() => parse_amount("minAmountOut", s)?,
        _ => U256::ZERO,
    };
    let min_amount_out = if min_amount_out.is_zero() {
        apply_slippage(out_amount, slippage_bps)
    } else {
        min_amount_out
    };

    let gas_amount_out = match raw.gas_amount_out.as_deref() {
        Some(s) if !s.trim().is_empty() => Some(parse_amount("gasAmountOut", s)?),
        _ => None,
    };

    Ok(Quote {
        in_token: request.in_token,
        out_token: request.out_token,
        in_amount: request.in_amount,
        out_amount,
        min_amount_out,
        slippage: request.slippage,
        session_id: raw.session_id.filter(|s| !s.is_empty()),
        serialized_order: raw.serialized_order.unwrap_or_default(),
        permit_data: raw.permit_data.unwrap_or_default(),
        gas_amount_out,
        error: None,
        no_route: None,
    })
}

/// reqwest-backed quote client
pub struct HubClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HubClient {
    pub fn new(timeout: Duration) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Http(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    fn map_reqwest(&self, err: reqwest::Error) -> QuoteError {
        if err.is_timeout() {
            QuoteError::Timeout(self.timeout.as_millis() as u64)
        } else {
            QuoteError::Http(err.to_string())
        }
    }
}

#[async_trait]
impl QuoteApi for HubClient {
    async fn quote(&self, request: &QuoteApiRequest) -> Result<Quote, QuoteError> {
        let url = format!("{}/quote?chainId={}", request.api_url.trim_end_matches('/'), request.chain_id);
        let body = QuoteBody {
            in_token: format!("{:?}", request.in_token),
            out_token: format!("{:?}", request.out_token),
            in_amount: request.in_amount.to_string(),
            out_amount: request
                .dex_min_amount_out
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-1".to_string()),
            user: format!("{:?}", request.user.unwrap_or(Address::ZERO)),
            slippage: request.slippage,
            qs: CLIENT_TAG,
            partner: &request.partner,
            session_id: request.session_id.as_deref(),
        };

        debug!(
            "Quote request: {} {:?} -> {:?} (session {:?})",
            body.in_amount, request.in_token, request.out_token, request.session_id
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest(e))?;
        if !status.is_success() {
            // The hub reports no-route answers with a 4xx and an error code body
            if let Ok(raw) = serde_json::from_str::<RawQuoteResponse>(&text) {
                if raw.error.is_some() {
                    return parse_quote(request, raw);
                }
            }
            return Err(QuoteError::Status {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }

        let raw: RawQuoteResponse =
            serde_json::from_str(&text).map_err(|e| QuoteError::Decode(e.to_string()))?;
        parse_quote(request, raw)
    }
}
