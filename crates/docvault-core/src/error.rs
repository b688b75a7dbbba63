// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for DocVault.
//
// Only genuine failures live here. Geometry fallback, rectification no-ops,
// and duplicate checksums are normal outcomes and are modelled as return
// types in the crates that produce them.

use thiserror::Error;

/// Top-level error type for all DocVault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    // -- Image pipeline --
    #[error("image codec failure: {0}")]
    Codec(String),

    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    // -- Cryptography --
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The authentication tag did not verify. No plaintext is ever returned
    /// alongside this error.
    #[error("authentication failed: ciphertext was modified, truncated, or sealed with another key")]
    Authentication,

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("unsupported backup archive: {0}")]
    UnsupportedBackup(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VaultError>;
