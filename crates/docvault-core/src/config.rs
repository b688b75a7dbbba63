// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration, persisted as JSON next to the vault.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::types::SupportedFormat;

/// Persistent engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory for the vault, catalog, PIN record, and config file.
    pub data_dir: PathBuf,
    /// Encrypt document payloads at rest with the bulk key.
    pub encrypt_payloads: bool,
    /// JPEG quality used when assembling pages (1..=100).
    pub jpeg_quality: u8,
    /// Maximum number of documents processed concurrently by the pipeline.
    pub worker_threads: usize,
    /// Longest image side the edge detector works on; larger inputs are
    /// downscaled first.
    pub detection_max_dimension: u32,
    /// Lowercase file extensions the folder scanner imports.
    pub scan_extensions: Vec<String>,
    /// xz preset used for backups (0..=9).
    pub backup_compression_level: u32,
    /// Service name under which keys are stored in the OS keychain.
    pub keychain_service: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            encrypt_payloads: true,
            jpeg_quality: 85,
            worker_threads: 4,
            detection_max_dimension: 1024,
            scan_extensions: ["pdf", "jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            backup_compression_level: 6,
            keychain_service: "DocVault".into(),
        }
    }
}

impl VaultConfig {
    /// Config rooted at an explicit directory, all other settings default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write settings to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Directory holding encrypted payloads.
    pub fn vault_dir(&self) -> PathBuf {
        self.data_dir.join("vault")
    }

    /// SQLite catalog of records and folders.
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.db")
    }

    /// Sealed PIN record.
    pub fn pin_path(&self) -> PathBuf {
        self.data_dir.join("pin.sealed")
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// JPEG quality pulled into the encoder's accepted range.
    pub fn effective_jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }

    /// Whether the scanner should import a file with this extension: it
    /// must be configured and be a format the vault understands.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        if SupportedFormat::from_extension(ext).is_none() {
            return false;
        }
        self.scan_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

/// Resolve the platform data directory:
/// `$XDG_DATA_HOME/docvault`, then `$HOME/.local/share/docvault`, then a
/// directory under the system temp dir.
pub fn default_data_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("docvault");
    }
    if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".local").join("share").join("docvault");
    }
    std::env::temp_dir().join("docvault")
}
