// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backup codec — encrypted, compressed snapshots of the catalog.
//
// Archive layout:
//
//   "DVBK" || version (u8) || iv (12) || ciphertext || tag (16)
//
// The ciphertext is the xz (LZMA2) compression of a JSON document holding
// every record and folder. The five header bytes are authenticated as
// associated data, so a rewritten version byte fails decryption. Payload
// files are not part of the archive.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use docvault_core::error::{Result, VaultError};
use docvault_core::types::{DocumentRecord, FolderSource};
use docvault_security::EnvelopeCipher;

use crate::store::VaultStore;

/// Leading bytes of every archive.
pub const BACKUP_MAGIC: &[u8; 4] = b"DVBK";

/// Current archive version.
pub const BACKUP_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = BACKUP_MAGIC.len() + 1;

/// Highest xz preset.
const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Decoded archive contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupContents {
    pub format_version: u8,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<DocumentRecord>,
    pub folders: Vec<FolderSource>,
}

/// Outcome of restoring an archive into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub documents_restored: usize,
    /// Records whose checksum was already present.
    pub documents_skipped: usize,
    pub folders_restored: usize,
    /// Folders whose path was already registered.
    pub folders_skipped: usize,
    /// Records rejected by the store (malformed checksum and the like).
    pub documents_failed: usize,
}

/// Creates and reads backup archives with one cipher and xz preset.
#[derive(Debug, Clone)]
pub struct BackupCodec {
    cipher: EnvelopeCipher,
    compression_level: u32,
}

impl BackupCodec {
    /// `cipher` should use the bulk key alias. The level is clamped to 0..=9.
    pub fn new(cipher: EnvelopeCipher, compression_level: u32) -> Self {
        Self {
            cipher,
            compression_level: compression_level.min(MAX_COMPRESSION_LEVEL),
        }
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Serialize, compress, and encrypt a snapshot into memory.
    pub fn create_backup(
        &self,
        documents: &[DocumentRecord],
        folders: &[FolderSource],
    ) -> Result<Vec<u8>> {
        let mut archive = Vec::new();
        self.write_backup(documents, folders, &mut archive)?;
        Ok(archive)
    }

    /// Stream an archive into `sink` and return the sink.
    #[instrument(skip_all, fields(documents = documents.len(), folders = folders.len()))]
    pub fn write_backup<W: Write>(
        &self,
        documents: &[DocumentRecord],
        folders: &[FolderSource],
        mut sink: W,
    ) -> Result<W> {
        let header = header(BACKUP_FORMAT_VERSION);
        sink.write_all(&header)?;

        let contents = BackupContents {
            format_version: BACKUP_FORMAT_VERSION,
            created_at: Utc::now(),
            documents: documents.to_vec(),
            folders: folders.to_vec(),
        };

        let sealed = self.cipher.encrypt_stream_with_aad(sink, &header)?;
        let mut encoder = XzEncoder::new(sealed, self.compression_level);
        serde_json::to_writer(&mut encoder, &contents)?;
        let sealed = encoder
            .finish()
            .map_err(|e| VaultError::Compression(format!("xz encode: {e}")))?;
        let sink = sealed.finish()?;

        info!(level = self.compression_level, "backup written");
        Ok(sink)
    }

    /// Decrypt and decode an in-memory archive.
    pub fn restore_backup(&self, archive: &[u8]) -> Result<BackupContents> {
        self.read_backup(archive)
    }

    /// Read a whole archive from `source`. Nothing is returned unless the
    /// archive authenticates.
    #[instrument(skip_all)]
    pub fn read_backup<R: Read>(&self, mut source: R) -> Result<BackupContents> {
        let mut header_bytes = [0u8; HEADER_LEN];
        source.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VaultError::UnsupportedBackup("archive shorter than its header".into())
            } else {
                VaultError::Io(e)
            }
        })?;
        check_header(&header_bytes)?;

        let plaintext = self.cipher.decrypt_stream_with_aad(source, &header_bytes)?;
        let mut json = Vec::new();
        XzDecoder::new(plaintext)
            .read_to_end(&mut json)
            .map_err(|e| VaultError::Compression(format!("xz decode: {e}")))?;

        let contents: BackupContents = serde_json::from_slice(&json)?;
        if contents.format_version != header_bytes[HEADER_LEN - 1] {
            return Err(VaultError::UnsupportedBackup(format!(
                "header says version {} but body says {}",
                header_bytes[HEADER_LEN - 1],
                contents.format_version
            )));
        }

        debug!(
            documents = contents.documents.len(),
            folders = contents.folders.len(),
            "backup decoded"
        );
        Ok(contents)
    }

    /// Snapshot everything `store` holds.
    pub fn backup_store(&self, store: &VaultStore) -> Result<Vec<u8>> {
        self.create_backup(&store.documents()?, &store.folders()?)
    }

    /// Decode `archive` and re-insert its folders, then its records, through
    /// the store's insert-if-absent paths. Restoring the same archive twice
    /// adds nothing the second time.
    #[instrument(skip_all, fields(bytes = archive.len()))]
    pub fn restore_into(&self, store: &VaultStore, archive: &[u8]) -> Result<RestoreReport> {
        let contents = self.restore_backup(archive)?;
        let mut report = RestoreReport::default();

        for folder in &contents.folders {
            if store.restore_folder(folder)?.is_inserted() {
                report.folders_restored += 1;
            } else {
                report.folders_skipped += 1;
            }
        }

        for record in &contents.documents {
            match store.restore_record(record) {
                Ok(outcome) if outcome.is_deduplicated() => report.documents_skipped += 1,
                Ok(_) => report.documents_restored += 1,
                Err(e @ VaultError::InvalidInput(_)) => {
                    warn!(id = %record.id, error = %e, "record skipped");
                    report.documents_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            documents = report.documents_restored,
            skipped = report.documents_skipped,
            folders = report.folders_restored,
            "backup restored"
        );
        Ok(report)
    }
}

fn header(version: u8) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..BACKUP_MAGIC.len()].copy_from_slice(BACKUP_MAGIC);
    header[BACKUP_MAGIC.len()] = version;
    header
}

fn check_header(header: &[u8; HEADER_LEN]) -> Result<()> {
    if &header[..BACKUP_MAGIC.len()] != BACKUP_MAGIC {
        return Err(VaultError::UnsupportedBackup("not a DocVault backup".into()));
    }
    let version = header[BACKUP_MAGIC.len()];
    if version != BACKUP_FORMAT_VERSION {
        return Err(VaultError::UnsupportedBackup(format!(
            "archive version {version} is not supported"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::metadata::{MemoryMetadataStore, SqliteMetadataStore};
    use docvault_core::types::DocumentMetadata;
    use docvault_security::integrity::hash_bytes;
    use docvault_security::{InMemoryKeyProvider, KeyAlias, KeyProvider};
    use tempfile::TempDir;

    fn keys() -> Arc<dyn KeyProvider> {
        Arc::new(InMemoryKeyProvider::new())
    }

    fn codec(keys: &Arc<dyn KeyProvider>) -> BackupCodec {
        BackupCodec::new(EnvelopeCipher::new(Arc::clone(keys), KeyAlias::Bulk), 6)
    }

    fn sample_records() -> Vec<DocumentRecord> {
        (0..3)
            .map(|i| {
                let mut meta = DocumentMetadata::new(format!("doc {i}"), "/home/me/Docs")
                    .with_original_path(format!("/home/me/Docs/{i}.pdf"));
                meta.extracted_text = (i == 1).then(|| "searchable".to_string());
                DocumentRecord::new(
                    meta,
                    format!("/vault/{i}.bin"),
                    100 + i as u64,
                    true,
                    hash_bytes(format!("content {i}").as_bytes()),
                )
            })
            .collect()
    }

    fn sample_folders() -> Vec<FolderSource> {
        let mut disabled = FolderSource::new("/mnt/usb", "USB");
        disabled.enabled = false;
        vec![FolderSource::new("/home/me/Docs", "Docs"), disabled]
    }

    #[test]
    fn archive_round_trips_records_and_folders() {
        let keys = keys();
        let codec = codec(&keys);
        let records = sample_records();
        let folders = sample_folders();

        let archive = codec.create_backup(&records, &folders).unwrap();
        assert!(archive.starts_with(b"DVBK\x01"));

        let contents = codec.restore_backup(&archive).unwrap();
        assert_eq!(contents.format_version, BACKUP_FORMAT_VERSION);
        assert_eq!(contents.documents, records);
        assert_eq!(contents.folders, folders);
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let keys = keys();
        let codec = codec(&keys);
        let archive = codec.create_backup(&[], &[]).unwrap();
        let contents = codec.restore_backup(&archive).unwrap();
        assert!(contents.documents.is_empty());
        assert!(contents.folders.is_empty());
    }

    #[test]
    fn archive_is_opaque() {
        let keys = keys();
        let archive = codec(&keys).create_backup(&sample_records(), &[]).unwrap();
        let haystack = String::from_utf8_lossy(&archive);
        assert!(!haystack.contains("searchable"));
        assert!(!haystack.contains("/home/me/Docs"));
    }

    #[test]
    fn bad_magic_and_version_are_unsupported() {
        let keys = keys();
        let codec = codec(&keys);
        let archive = codec.create_backup(&sample_records(), &[]).unwrap();

        let mut wrong_magic = archive.clone();
        wrong_magic[0] = b'X';
        assert!(matches!(
            codec.restore_backup(&wrong_magic),
            Err(VaultError::UnsupportedBackup(_))
        ));

        let mut wrong_version = archive.clone();
        wrong_version[4] = 2;
        assert!(matches!(
            codec.restore_backup(&wrong_version),
            Err(VaultError::UnsupportedBackup(_))
        ));

        assert!(matches!(
            codec.restore_backup(b"DV"),
            Err(VaultError::UnsupportedBackup(_))
        ));
    }

    #[test]
    fn tampering_and_wrong_key_fail_authentication() {
        let keys = keys();
        let codec = codec(&keys);
        let mut archive = codec.create_backup(&sample_records(), &[]).unwrap();

        let other_keys: Arc<dyn KeyProvider> = Arc::new(InMemoryKeyProvider::new());
        assert!(matches!(
            BackupCodec::new(EnvelopeCipher::new(other_keys, KeyAlias::Bulk), 6)
                .restore_backup(&archive),
            Err(VaultError::Authentication)
        ));

        let middle = archive.len() / 2;
        archive[middle] ^= 0x80;
        assert!(matches!(
            codec.restore_backup(&archive),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn compression_levels_are_clamped_and_interoperate() {
        let keys = keys();
        let fast = BackupCodec::new(EnvelopeCipher::new(Arc::clone(&keys), KeyAlias::Bulk), 0);
        let best = BackupCodec::new(EnvelopeCipher::new(Arc::clone(&keys), KeyAlias::Bulk), 42);
        assert_eq!(best.compression_level(), 9);

        let archive = fast.create_backup(&sample_records(), &sample_folders()).unwrap();
        assert_eq!(best.restore_backup(&archive).unwrap().documents.len(), 3);
    }

    #[test]
    fn streaming_write_and_read() {
        let keys = keys();
        let codec = codec(&keys);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.dvbk");

        let file = std::fs::File::create(&path).unwrap();
        codec
            .write_backup(&sample_records(), &sample_folders(), file)
            .unwrap()
            .sync_all()
            .unwrap();

        let contents = codec.read_backup(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(contents.documents.len(), 3);
        assert_eq!(contents.folders.len(), 2);
    }

    #[test]
    fn restore_into_store_is_idempotent() {
        let keys = keys();
        let codec = codec(&keys);
        let dir = TempDir::new().unwrap();

        // Source vault with real content.
        let source = VaultStore::new(
            dir.path().join("a"),
            Arc::new(MemoryMetadataStore::new()),
            EnvelopeCipher::new(Arc::clone(&keys), KeyAlias::Bulk),
            true,
        )
        .unwrap();
        source.add_folder("/home/me/Docs", "Docs").unwrap();
        for i in 0..4 {
            let payload = format!("page {i}").into_bytes();
            source
                .ingest(&payload, &hash_bytes(&payload), DocumentMetadata::new(format!("p{i}"), "x"))
                .unwrap();
        }
        let archive = codec.backup_store(&source).unwrap();

        // Fresh vault on a new device.
        let target = VaultStore::new(
            dir.path().join("b"),
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap()),
            EnvelopeCipher::new(Arc::clone(&keys), KeyAlias::Bulk),
            true,
        )
        .unwrap();

        let first = codec.restore_into(&target, &archive).unwrap();
        assert_eq!(first.documents_restored, 4);
        assert_eq!(first.folders_restored, 1);

        let second = codec.restore_into(&target, &archive).unwrap();
        assert_eq!(second.documents_restored, 0);
        assert_eq!(second.documents_skipped, 4);
        assert_eq!(second.folders_skipped, 1);
        assert_eq!(target.documents().unwrap().len(), 4);

        let mut restored: Vec<_> = target.documents().unwrap();
        let mut original: Vec<_> = source.documents().unwrap();
        restored.sort_by(|a, b| a.checksum.cmp(&b.checksum));
        original.sort_by(|a, b| a.checksum.cmp(&b.checksum));
        assert_eq!(restored, original);
    }
}
