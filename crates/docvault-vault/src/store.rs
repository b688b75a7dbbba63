// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vault store — content-addressed, encrypted-at-rest document payloads.
//
// Payloads live at `<vault>/<checksum>.bin`, where the checksum is the
// SHA-256 of the plaintext. The metadata catalog is the source of truth for
// which payloads exist; a checksum is stored at most once.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use docvault_core::error::{Result, VaultError};
use docvault_core::types::{
    DocumentId, DocumentMetadata, DocumentRecord, FolderId, FolderSource, IngestOutcome,
    InsertOutcome, is_sha256_hex,
};
use docvault_security::EnvelopeCipher;
use docvault_security::integrity::verify_hash;

use crate::metadata::MetadataStore;

/// File extension of stored payloads.
const PAYLOAD_EXTENSION: &str = "bin";

/// One mutex per checksum currently being ingested or restored.
#[derive(Debug, Default)]
struct ChecksumLocks {
    held: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChecksumLocks {
    /// Run `f` while holding the lock for `checksum`.
    fn with_lock<T>(&self, checksum: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let slot = {
            let mut held = self.held.lock().map_err(|_| poisoned())?;
            Arc::clone(held.entry(checksum.to_owned()).or_default())
        };

        let outcome = {
            let _guard = slot.lock().map_err(|_| poisoned())?;
            f()
        };

        // Drop the entry once nobody else is waiting on it.
        let mut held = self.held.lock().map_err(|_| poisoned())?;
        if Arc::strong_count(&slot) == 2 {
            held.remove(checksum);
        }
        outcome
    }
}

fn poisoned() -> VaultError {
    VaultError::Database("checksum lock poisoned".into())
}

/// The encrypted document store.
///
/// All methods are synchronous; they do filesystem and catalog I/O. In an
/// async context, wrap calls in `tokio::task::spawn_blocking`.
pub struct VaultStore {
    payload_dir: PathBuf,
    metadata: Arc<dyn MetadataStore>,
    cipher: EnvelopeCipher,
    encrypt_payloads: bool,
    locks: ChecksumLocks,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("payload_dir", &self.payload_dir)
            .field("cipher", &self.cipher)
            .field("encrypt_payloads", &self.encrypt_payloads)
            .finish_non_exhaustive()
    }
}

impl VaultStore {
    /// Create a store rooted at `payload_dir`, creating the directory if
    /// needed. `cipher` should use the bulk key alias.
    pub fn new(
        payload_dir: impl Into<PathBuf>,
        metadata: Arc<dyn MetadataStore>,
        cipher: EnvelopeCipher,
        encrypt_payloads: bool,
    ) -> Result<Self> {
        let payload_dir = payload_dir.into();
        std::fs::create_dir_all(&payload_dir)?;
        info!(dir = %payload_dir.display(), encrypt_payloads, "vault store ready");
        Ok(Self {
            payload_dir,
            metadata,
            cipher,
            encrypt_payloads,
            locks: ChecksumLocks::default(),
        })
    }

    pub fn payload_dir(&self) -> &Path {
        &self.payload_dir
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Path a payload with this checksum is stored at.
    pub fn payload_path(&self, checksum: &str) -> PathBuf {
        self.payload_dir
            .join(format!("{checksum}.{PAYLOAD_EXTENSION}"))
    }

    // -- Documents ------------------------------------------------------------

    /// Store `payload` unless content with the same checksum is already in
    /// the vault.
    ///
    /// `checksum` must be the lowercase hex SHA-256 of `payload`. On a miss
    /// the payload is written atomically and a record inserted; if the
    /// catalog insert fails the written payload is removed again.
    #[instrument(skip(self, payload, metadata), fields(checksum = %checksum, bytes = payload.len()))]
    pub fn ingest(
        &self,
        payload: &[u8],
        checksum: &str,
        metadata: DocumentMetadata,
    ) -> Result<IngestOutcome> {
        if !is_sha256_hex(checksum) {
            return Err(VaultError::InvalidInput(format!(
                "checksum is not lowercase hex SHA-256: {checksum:?}"
            )));
        }
        verify_hash(payload, checksum)?;

        self.locks.with_lock(checksum, || {
            if let Some(existing) = self.metadata.document_by_checksum(checksum)? {
                debug!(id = %existing.id, "content already stored");
                return Ok(IngestOutcome::Deduplicated(existing));
            }

            let target = self.payload_path(checksum);
            self.write_payload(&target, payload)?;

            let record = DocumentRecord::new(
                metadata,
                target.to_string_lossy().into_owned(),
                payload.len() as u64,
                self.encrypt_payloads,
                checksum.to_owned(),
            );

            match self.metadata.insert_document(&record) {
                Ok(InsertOutcome::Inserted(record)) => {
                    info!(id = %record.id, name = %record.display_name, "document stored");
                    Ok(IngestOutcome::Stored(record))
                }
                Ok(InsertOutcome::Existing(existing)) => {
                    // Another writer of the same catalog got there first.
                    if Path::new(&existing.stored_path) != target {
                        self.discard_payload(&target);
                    }
                    Ok(IngestOutcome::Deduplicated(existing))
                }
                Err(e) => {
                    error!(error = %e, "catalog insert failed; removing payload");
                    self.discard_payload(&target);
                    Err(e)
                }
            }
        })
    }

    /// Change a document's display name. Content and checksum are untouched.
    #[instrument(skip(self), fields(id = %id))]
    pub fn rename(&self, id: &DocumentId, new_name: &str) -> Result<DocumentRecord> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(VaultError::InvalidInput("document name cannot be empty".into()));
        }

        let mut record = self.require_document(id)?;
        record.display_name = new_name.to_owned();
        record.modified_at = Utc::now();
        self.metadata.update_document(&record)?;

        info!(name = %record.display_name, "document renamed");
        Ok(record)
    }

    /// Remove a document's record and its stored payload.
    ///
    /// Only files inside the vault directory are ever deleted; a record
    /// pointing elsewhere loses its catalog entry but the file stays.
    ///
    /// Runs under the checksum lock, so an ingest of the same content waits
    /// until the old payload is gone and then stores a fresh one.
    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&self, id: &DocumentId) -> Result<()> {
        let checksum = self.require_document(id)?.checksum;

        self.locks.with_lock(&checksum, || {
            // Re-read under the lock; a concurrent delete may have won.
            let record = self.require_document(id)?;
            self.metadata.delete_document(id)?;

            let stored = Path::new(&record.stored_path);
            if self.is_inside_vault(stored) {
                match std::fs::remove_file(stored) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        warn!(path = %stored.display(), "payload already missing");
                    }
                    Err(e) => {
                        // The record is gone; nothing references this file any more.
                        warn!(
                            path = %stored.display(),
                            error = %e,
                            "could not remove payload; left orphaned in vault"
                        );
                    }
                }
            } else {
                warn!(path = %stored.display(), "stored path outside vault; file left in place");
            }

            info!(name = %record.display_name, "document deleted");
            Ok(())
        })
    }

    /// Read a document's plaintext, decrypting if needed, and check it
    /// against the recorded checksum.
    #[instrument(skip(self), fields(id = %id))]
    pub fn load_payload(&self, id: &DocumentId) -> Result<Vec<u8>> {
        let record = self.require_document(id)?;
        let file = std::fs::File::open(&record.stored_path)?;

        let plaintext = if record.encrypted {
            let mut reader = self.cipher.decrypt_stream(file)?;
            let mut plaintext = Vec::with_capacity(reader.len());
            std::io::Read::read_to_end(&mut reader, &mut plaintext)?;
            plaintext
        } else {
            let mut file = file;
            let mut plaintext = Vec::new();
            std::io::Read::read_to_end(&mut file, &mut plaintext)?;
            plaintext
        };

        verify_hash(&plaintext, &record.checksum)?;
        debug!(bytes = plaintext.len(), "payload loaded");
        Ok(plaintext)
    }

    pub fn document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        self.metadata.document_by_id(id)
    }

    /// All documents, newest first.
    pub fn documents(&self) -> Result<Vec<DocumentRecord>> {
        self.metadata.all_documents()
    }

    /// Documents whose source label is `folder_source`.
    pub fn documents_in_folder(&self, folder_source: &str) -> Result<Vec<DocumentRecord>> {
        Ok(self
            .metadata
            .all_documents()?
            .into_iter()
            .filter(|d| d.folder_source == folder_source)
            .collect())
    }

    /// Case-insensitive search over names and extracted text.
    pub fn search(&self, query: &str) -> Result<Vec<DocumentRecord>> {
        self.metadata.search_documents(query)
    }

    /// Re-insert a record from a backup. No payload is written; an existing
    /// record with the same checksum wins.
    #[instrument(skip(self, record), fields(checksum = %record.checksum))]
    pub fn restore_record(&self, record: &DocumentRecord) -> Result<IngestOutcome> {
        if !is_sha256_hex(&record.checksum) {
            return Err(VaultError::InvalidInput(format!(
                "record {} has a malformed checksum",
                record.id
            )));
        }

        self.locks.with_lock(&record.checksum, || {
            match self.metadata.insert_document(record)? {
                InsertOutcome::Inserted(r) => Ok(IngestOutcome::Stored(r)),
                InsertOutcome::Existing(r) => Ok(IngestOutcome::Deduplicated(r)),
            }
        })
    }

    // -- Folders --------------------------------------------------------------

    /// Register a folder to scan. An existing folder with the same path is
    /// returned instead.
    #[instrument(skip(self))]
    pub fn add_folder(&self, path: &str, display_name: &str) -> Result<InsertOutcome<FolderSource>> {
        let path = path.trim();
        if path.is_empty() {
            return Err(VaultError::InvalidInput("folder path cannot be empty".into()));
        }
        let display_name = match display_name.trim() {
            "" => default_folder_name(path),
            name => name.to_owned(),
        };

        let outcome = self.metadata.insert_folder(&FolderSource::new(path, display_name))?;
        if outcome.is_inserted() {
            info!(path, "folder added");
        }
        Ok(outcome)
    }

    /// Insert a folder from a backup unless its path is already known.
    pub fn restore_folder(&self, folder: &FolderSource) -> Result<InsertOutcome<FolderSource>> {
        self.metadata.insert_folder(folder)
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn set_folder_enabled(&self, id: &FolderId, enabled: bool) -> Result<FolderSource> {
        let mut folder = self.require_folder(id)?;
        folder.enabled = enabled;
        self.metadata.update_folder(&folder)?;
        debug!(path = %folder.path, enabled, "folder toggled");
        Ok(folder)
    }

    /// Stop tracking a folder. Documents already imported from it stay.
    #[instrument(skip(self), fields(id = %id))]
    pub fn remove_folder(&self, id: &FolderId) -> Result<()> {
        if !self.metadata.delete_folder(id)? {
            return Err(VaultError::NotFound(format!("folder {id}")));
        }
        info!("folder removed");
        Ok(())
    }

    pub fn folders(&self) -> Result<Vec<FolderSource>> {
        self.metadata.all_folders()
    }

    // -- Internals ------------------------------------------------------------

    fn require_document(&self, id: &DocumentId) -> Result<DocumentRecord> {
        self.metadata
            .document_by_id(id)?
            .ok_or_else(|| VaultError::NotFound(format!("document {id}")))
    }

    fn require_folder(&self, id: &FolderId) -> Result<FolderSource> {
        self.metadata
            .all_folders()?
            .into_iter()
            .find(|f| f.id == *id)
            .ok_or_else(|| VaultError::NotFound(format!("folder {id}")))
    }

    /// Write through a temp file in the vault directory, then rename into
    /// place so a crash never leaves a partial payload under its final name.
    fn write_payload(&self, target: &Path, payload: &[u8]) -> Result<()> {
        let temp = tempfile::NamedTempFile::new_in(&self.payload_dir)?;

        let file = if self.encrypt_payloads {
            let mut writer = self.cipher.encrypt_stream(temp)?;
            writer.write_all(payload)?;
            writer.finish()?
        } else {
            let mut temp = temp;
            temp.write_all(payload)?;
            temp
        };
        file.as_file().sync_all()?;
        file.persist(target).map_err(|e| VaultError::Io(e.error))?;

        debug!(path = %target.display(), "payload written");
        Ok(())
    }

    fn discard_payload(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove orphaned payload");
        }
    }

    fn is_inside_vault(&self, path: &Path) -> bool {
        let Ok(dir) = self.payload_dir.canonicalize() else {
            return false;
        };
        match path.canonicalize() {
            Ok(resolved) => resolved.starts_with(&dir),
            // A missing payload still counts if its parent is the vault.
            Err(_) => path
                .parent()
                .and_then(|parent| parent.canonicalize().ok())
                .is_some_and(|parent| parent.starts_with(&dir)),
        }
    }
}

/// Last path component of `path`, or the path itself.
fn default_folder_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    trimmed
        .rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or(path)
        .to_owned()
}
