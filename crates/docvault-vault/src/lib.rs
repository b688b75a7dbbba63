// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docvault-vault — Encrypted document storage for DocVault.
//
// Bridges the page pipeline in `docvault-document` and the cryptography in
// `docvault-security` to durable storage: the metadata catalog, the
// content-addressed vault store, folder scanning, encrypted backups, and the
// capture pipeline that ties them together.

pub mod backup;
pub mod metadata;
pub mod pipeline;
pub mod scanner;
pub mod services;
pub mod store;

pub use backup::{BackupCodec, BackupContents, RestoreReport};
pub use metadata::{MemoryMetadataStore, MetadataStore, SqliteMetadataStore};
pub use pipeline::{CapturePipeline, CaptureRequest};
pub use scanner::{FolderScanReport, FolderScanner, ScanReport};
pub use services::{VaultServices, init_tracing};
pub use store::VaultStore;
