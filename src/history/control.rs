//! Persisted Routing Controls
//!
//! The manual override (`none|skip|force`) and the hub on/off preference,
//! stored as a small JSON document. Writes go to a temp file that is then
//! renamed over the original, so a reader never sees a partial file.
//!
//! Created: 2026-10-09

use crate::types::LhControl;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlFlags {
    pub lh_control: LhControl,
    pub hub_enabled: bool,
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self {
            lh_control: LhControl::None,
            hub_enabled: true,
        }
    }
}

impl ControlFlags {
    /// Missing file means defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse control flags {:?}", path))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize control flags")?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, json).context("Failed to write temp file")?;
        std::fs::rename(&temp_path, path).context("Failed to rename temp file")?;
        debug!("Control flags saved: {:?}", self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_defaults() {
        let dir = TempDir::new().unwrap();
        let flags = ControlFlags::load(dir.path().join("control.json")).unwrap();
        assert_eq!(flags, ControlFlags::default());
        assert!(flags.hub_enabled);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("control.json");
        let flags = ControlFlags {
            lh_control: LhControl::Skip,
            hub_enabled: false,
        };
        flags.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(ControlFlags::load(&path).unwrap(), flags);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"skip\""));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("control.json");
        std::fs::write(&path, r#"{"lh_control":"force"}"#).unwrap();
        let flags = ControlFlags::load(&path).unwrap();
        assert_eq!(flags.lh_control, LhControl::Force);
        assert!(flags.hub_enabled);
    }
}
