//! Order History
//!
//! Append-only JSONL log of successful swaps, one file per (chain, account):
//! `{data_dir}/orders/{chain_id}_{account}.jsonl`. Records are never
//! rewritten or removed.
//!
//! Created: 2026-10-09

use crate::types::Order;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct OrderHistory {
    path: PathBuf,
    // Serialises appends from concurrent swaps
    write_lock: Mutex<()>,
}

impl OrderHistory {
    pub fn open<P: AsRef<Path>>(data_dir: P, chain_id: u64, account: Address) -> Result<Self> {
        let dir = data_dir.as_ref().join("orders");
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create order directory: {:?}", dir))?;
        let path = dir.join(format!("{}_{}.jsonl", chain_id, format!("{:?}", account).to_lowercase()));
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, order: &Order) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open order history: {:?}", self.path))?;

        let json = serde_json::to_string(order).context("Failed to serialize order")?;
        writeln!(file, "{}", json)?;
        debug!("Order {:?} appended to {:?}", order.tx_hash, self.path);
        Ok(())
    }

    /// Oldest first
    pub fn read_all(&self) -> Result<Vec<Order>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);

        let mut orders = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let order: Order =
                serde_json::from_str(&line).with_context(|| format!("Failed to parse order line: {}", line))?;
            orders.push(order);
        }
        Ok(orders)
    }
}
