// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service wiring — builds every vault subsystem once at startup and exposes
// async entry points for the shell.
//
// The catalog, store, scanner, and backup codec are synchronous; the async
// methods here move their work onto blocking workers.

use std::sync::Arc;

use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

use docvault_core::config::VaultConfig;
use docvault_core::error::{Result, VaultError};
use docvault_core::types::{DocumentId, IngestOutcome};
use docvault_security::{EnvelopeCipher, KeyAlias, KeyProvider, PinVault, PlatformKeyProvider};

use crate::backup::{BackupCodec, RestoreReport};
use crate::metadata::{MemoryMetadataStore, MetadataStore, SqliteMetadataStore};
use crate::pipeline::{CapturePipeline, CaptureRequest};
use crate::scanner::{FolderScanner, ScanReport};
use crate::store::VaultStore;

/// Install the global `tracing` subscriber: fmt output filtered by
/// `RUST_LOG`, defaulting to `info`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Every vault subsystem, wired to one config and one key provider.
///
/// Cheap to clone; all parts are shared.
#[derive(Debug, Clone)]
pub struct VaultServices {
    config: Arc<VaultConfig>,
    store: Arc<VaultStore>,
    pipeline: CapturePipeline,
    scanner: FolderScanner,
    backup: BackupCodec,
    pin: Arc<PinVault>,
}

impl VaultServices {
    /// Open the on-disk catalog under `config.data_dir` and build the
    /// services around it. Call once at startup.
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub fn init(config: VaultConfig, keys: Arc<dyn KeyProvider>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let metadata = Arc::new(SqliteMetadataStore::open(config.catalog_path())?);
        let services = Self::assemble(config, keys, metadata)?;
        info!("vault services initialised");
        Ok(services)
    }

    /// `init` with keys from the OS keychain, stored under
    /// `config.keychain_service`.
    pub fn init_platform(config: VaultConfig) -> Result<Self> {
        let keys = Arc::new(PlatformKeyProvider::new(config.keychain_service.clone()));
        Self::init(config, keys)
    }

    /// Same wiring with a memory-only catalog. Payloads still go to
    /// `config.vault_dir()`.
    pub fn in_memory(config: VaultConfig, keys: Arc<dyn KeyProvider>) -> Result<Self> {
        Self::assemble(config, keys, Arc::new(MemoryMetadataStore::new()))
    }

    fn assemble(
        config: VaultConfig,
        keys: Arc<dyn KeyProvider>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let bulk = EnvelopeCipher::new(Arc::clone(&keys), KeyAlias::Bulk);
        let store = Arc::new(VaultStore::new(
            config.vault_dir(),
            metadata,
            bulk.clone(),
            config.encrypt_payloads,
        )?);

        Ok(Self {
            pipeline: CapturePipeline::from_config(Arc::clone(&store), &config),
            scanner: FolderScanner::new(Arc::clone(&store), Arc::clone(&config)),
            backup: BackupCodec::new(bulk, config.backup_compression_level),
            pin: Arc::new(PinVault::new(config.pin_path(), keys)),
            store,
            config,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<VaultStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn scanner(&self) -> &FolderScanner {
        &self.scanner
    }

    pub fn backup(&self) -> &BackupCodec {
        &self.backup
    }

    pub fn pin(&self) -> &PinVault {
        &self.pin
    }

    // -- Async entry points ---------------------------------------------------

    pub async fn capture(&self, request: CaptureRequest) -> Result<IngestOutcome> {
        self.pipeline.capture(request).await
    }

    pub async fn scan_folders(&self) -> Result<ScanReport> {
        let scanner = self.scanner.clone();
        run_blocking(move || scanner.scan_enabled()).await
    }

    pub async fn load_document(&self, id: DocumentId) -> Result<Vec<u8>> {
        let store = Arc::clone(&self.store);
        run_blocking(move || store.load_payload(&id)).await
    }

    pub async fn delete_document(&self, id: DocumentId) -> Result<()> {
        let store = Arc::clone(&self.store);
        run_blocking(move || store.delete(&id)).await
    }

    /// Snapshot the whole catalog into an encrypted archive.
    pub async fn export_backup(&self) -> Result<Vec<u8>> {
        let (store, backup) = (Arc::clone(&self.store), self.backup.clone());
        run_blocking(move || backup.backup_store(&store)).await
    }

    pub async fn import_backup(&self, archive: Vec<u8>) -> Result<RestoreReport> {
        let (store, backup) = (Arc::clone(&self.store), self.backup.clone());
        run_blocking(move || backup.restore_into(&store, &archive)).await
    }

    /// Persist the current settings to `config_path()`.
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config.config_path())
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VaultError::Io(std::io::Error::other(format!("blocking worker failed: {e}"))))?
}
