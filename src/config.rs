//! Configuration
//!
//! TOML configuration for the swap engine. Every field has a default, so an
//! empty (or missing) file yields a working setup. Secrets stay in `.env`
//! and are read by the binary, never from the TOML file.
//!
//! Created: 2026-10-03

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwapConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub swap: SwapSettings,
    #[serde(default)]
    pub balances: BalanceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Order history and control flags live here
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_log_level() -> String { "info".to_string() }
fn default_data_dir() -> String { "data".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

/// How the hub's "dex is better" verdict is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexBetterPolicy {
    /// Report it as plain no-liquidity
    Merge,
    /// Keep it as its own reason
    #[default]
    Distinct,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    /// Overrides the chain registry URL
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_partner")]
    pub partner: String,
    #[serde(default = "default_slippage")]
    pub slippage_percent: f64,
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    #[serde(default = "default_quote_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_refetch")]
    pub refetch_interval_ms: u64,
    /// Unchanged refetches before the interval starts stretching
    #[serde(default = "default_backoff_after")]
    pub backoff_after: u32,
    #[serde(default = "default_max_refetch")]
    pub max_refetch_interval_ms: u64,
    #[serde(default)]
    pub dex_better_policy: DexBetterPolicy,
}

fn default_partner() -> String { "widget".to_string() }
fn default_slippage() -> f64 { 0.5 }
fn default_debounce() -> u64 { 300 }
fn default_quote_timeout() -> u64 { 10_000 }
fn default_refetch() -> u64 { 20_000 }
fn default_backoff_after() -> u32 { 3 }
fn default_max_refetch() -> u64 { 60_000 }

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            partner: default_partner(),
            slippage_percent: default_slippage(),
            debounce_ms: default_debounce(),
            timeout_ms: default_quote_timeout(),
            refetch_interval_ms: default_refetch(),
            backoff_after: default_backoff_after(),
            max_refetch_interval_ms: default_max_refetch(),
            dex_better_policy: DexBetterPolicy::default(),
        }
    }
}

impl QuoteConfig {
    pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
    pub fn refetch_interval(&self) -> Duration { Duration::from_millis(self.refetch_interval_ms) }
    pub fn max_refetch_interval(&self) -> Duration { Duration::from_millis(self.max_refetch_interval_ms) }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapSettings {
    /// `swapx` (default) or `swap-async`
    #[serde(default = "default_submit_path")]
    pub submit_path: String,
    #[serde(default = "default_status_interval")]
    pub status_poll_interval_ms: u64,
    #[serde(default = "default_status_attempts")]
    pub status_poll_max_attempts: u32,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Delay before a terminal session is reset to idle
    #[serde(default = "default_reset_cooldown")]
    pub reset_cooldown_ms: u64,
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_ms: u64,
    #[serde(default = "default_receipt_interval")]
    pub receipt_poll_interval_ms: u64,
}

fn default_submit_path() -> String { "swapx".to_string() }
fn default_status_interval() -> u64 { 2_000 }
fn default_status_attempts() -> u32 { 60 }
fn default_max_failures() -> u32 { 3 }
fn default_reset_cooldown() -> u64 { 5_000 }
fn default_receipt_timeout() -> u64 { 180_000 }
fn default_receipt_interval() -> u64 { 1_000 }

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            submit_path: default_submit_path(),
            status_poll_interval_ms: default_status_interval(),
            status_poll_max_attempts: default_status_attempts(),
            max_failures: default_max_failures(),
            reset_cooldown_ms: default_reset_cooldown(),
            receipt_timeout_ms: default_receipt_timeout(),
            receipt_poll_interval_ms: default_receipt_interval(),
        }
    }
}

impl SwapSettings {
    pub fn status_poll_interval(&self) -> Duration { Duration::from_millis(self.status_poll_interval_ms) }
    pub fn reset_cooldown(&self) -> Duration { Duration::from_millis(self.reset_cooldown_ms) }
    pub fn receipt_timeout(&self) -> Duration { Duration::from_millis(self.receipt_timeout_ms) }
    pub fn receipt_poll_interval(&self) -> Duration { Duration::from_millis(self.receipt_poll_interval_ms) }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "default_balance_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_balance_attempts")]
    pub max_attempts: u32,
}

fn default_balance_delay() -> u64 { 3_000 }
fn default_balance_attempts() -> u32 { 10 }

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_balance_delay(),
            max_attempts: default_balance_attempts(),
        }
    }
}

impl BalanceConfig {
    pub fn retry_delay(&self) -> Duration { Duration::from_millis(self.retry_delay_ms) }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// No endpoint = events are only logged
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_flush_debounce")]
    pub flush_debounce_ms: u64,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_flush_debounce() -> u64 { 1_000 }
fn default_max_batch() -> usize { 100 }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            flush_debounce_ms: default_flush_debounce(),
            max_batch: default_max_batch(),
        }
    }
}

impl SwapConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise; then apply env overrides
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// LH_API_URL / LH_PARTNER win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LH_API_URL") {
            if !url.trim().is_empty() {
                self.quote.api_url = Some(url);
            }
        }
        if let Ok(partner) = std::env::var("LH_PARTNER") {
            if !partner.trim().is_empty() {
                self.quote.partner = partner;
            }
        }
    }
}
