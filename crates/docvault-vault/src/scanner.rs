// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Folder scanner — imports supported files from the enabled source folders.
//
// Each file is fingerprinted with a streaming SHA-256 first, so content the
// vault already holds is recognised without reading it into memory. Failures
// on single files are counted and logged; they never abort a scan.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use docvault_core::config::VaultConfig;
use docvault_core::error::Result;
use docvault_core::types::{DocumentMetadata, FolderSource, IngestOutcome};
use docvault_security::integrity::hash_file;

use crate::store::VaultStore;

const FILE_URI_SCHEME: &str = "file://";

/// Totals for one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderScanReport {
    /// Supported files found under the folder.
    pub files_seen: usize,
    pub stored: usize,
    pub deduplicated: usize,
    pub failed: usize,
}

/// Totals for a whole scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub folders_scanned: usize,
    /// Folders that were missing, not directories, or not filesystem paths.
    pub folders_skipped: usize,
    pub files_seen: usize,
    pub stored: usize,
    pub deduplicated: usize,
    pub failed: usize,
}

impl ScanReport {
    fn absorb(&mut self, folder: &FolderScanReport) {
        self.folders_scanned += 1;
        self.files_seen += folder.files_seen;
        self.stored += folder.stored;
        self.deduplicated += folder.deduplicated;
        self.failed += folder.failed;
    }
}

/// Walks source folders and feeds their files into a `VaultStore`.
///
/// Synchronous; run it on a blocking worker from async code.
#[derive(Debug, Clone)]
pub struct FolderScanner {
    store: Arc<VaultStore>,
    config: Arc<VaultConfig>,
}

impl FolderScanner {
    /// Files are filtered by `config.scan_extensions`.
    pub fn new(store: Arc<VaultStore>, config: Arc<VaultConfig>) -> Self {
        Self { store, config }
    }

    /// Scan every enabled folder.
    #[instrument(skip(self))]
    pub fn scan_enabled(&self) -> Result<ScanReport> {
        let folders = self.store.metadata().enabled_folders()?;
        info!(count = folders.len(), "scanning enabled folders");

        let mut report = ScanReport::default();
        for folder in &folders {
            match self.scan_folder(folder)? {
                Some(folder_report) => report.absorb(&folder_report),
                None => report.folders_skipped += 1,
            }
        }

        info!(
            folders = report.folders_scanned,
            skipped = report.folders_skipped,
            stored = report.stored,
            deduplicated = report.deduplicated,
            failed = report.failed,
            "scan completed"
        );
        Ok(report)
    }

    /// Scan one folder and refresh its `last_scanned` and `document_count`.
    ///
    /// Returns `None` when the folder cannot be walked (missing, not a
    /// directory, or a non-file URI). Only catalog errors are returned as
    /// `Err`.
    #[instrument(skip(self, folder), fields(path = %folder.path))]
    pub fn scan_folder(&self, folder: &FolderSource) -> Result<Option<FolderScanReport>> {
        let Some(root) = local_path(&folder.path) else {
            warn!("not a filesystem folder; skipped");
            return Ok(None);
        };
        if !root.is_dir() {
            warn!(root = %root.display(), "folder missing or not a directory; skipped");
            return Ok(None);
        }

        let mut report = FolderScanReport::default();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "unreadable entry");
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.is_supported(entry.path()) {
                continue;
            }

            report.files_seen += 1;
            match self.import_file(entry.path(), &folder.path) {
                Ok(IngestOutcome::Stored(_)) => report.stored += 1,
                Ok(IngestOutcome::Deduplicated(_)) => report.deduplicated += 1,
                Err(e) => {
                    warn!(file = %entry.path().display(), error = %e, "import failed");
                    report.failed += 1;
                }
            }
        }

        let mut updated = folder.clone();
        updated.last_scanned = Some(Utc::now());
        updated.document_count = self.store.metadata().count_documents_in_folder(&folder.path)?;
        self.store.metadata().update_folder(&updated)?;

        debug!(?report, document_count = updated.document_count, "folder scanned");
        Ok(Some(report))
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.config.accepts_extension(&ext.to_string_lossy()))
    }

    fn import_file(&self, path: &Path, folder_label: &str) -> Result<IngestOutcome> {
        let checksum = hash_file(path)?;
        if let Some(existing) = self.store.metadata().document_by_checksum(&checksum)? {
            return Ok(IngestOutcome::Deduplicated(existing));
        }

        let payload = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".into());

        let mut metadata =
            DocumentMetadata::new(name, folder_label).with_original_path(path.to_string_lossy());
        if let Some(modified) = std::fs::metadata(path).ok().and_then(|m| m.modified().ok()) {
            metadata = metadata.with_modified_at(DateTime::<Utc>::from(modified));
        }

        // The file may have changed since it was hashed; ingest re-verifies.
        self.store.ingest(&payload, &checksum, metadata)
    }
}

/// Filesystem path for a folder entry: plain paths and `file://` URIs.
fn local_path(raw: &str) -> Option<PathBuf> {
    if let Some(rest) = raw.strip_prefix(FILE_URI_SCHEME) {
        return Some(PathBuf::from(rest));
    }
    if raw.contains("://") {
        return None;
    }
    Some(PathBuf::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SqliteMetadataStore;
    use docvault_security::{EnvelopeCipher, InMemoryKeyProvider, KeyAlias};
    use tempfile::TempDir;

    fn scanner_in(dir: &Path) -> FolderScanner {
        scanner_with(dir, VaultConfig::default())
    }

    fn scanner_with(dir: &Path, config: VaultConfig) -> FolderScanner {
        let keys = Arc::new(InMemoryKeyProvider::new());
        let store = VaultStore::new(
            dir.join("vault"),
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap()),
            EnvelopeCipher::new(keys, KeyAlias::Bulk),
            true,
        )
        .unwrap();
        FolderScanner::new(Arc::new(store), Arc::new(config))
    }

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn imports_supported_files_recursively() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("Documents");
        write(&docs.join("a.pdf"), b"pdf a");
        write(&docs.join("nested/deeper/b.JPG"), b"jpeg b");
        write(&docs.join("notes.txt"), b"ignored");
        write(&docs.join("no_extension"), b"ignored too");

        let scanner = scanner_in(dir.path());
        let folder = scanner
            .store
            .add_folder(&docs.to_string_lossy(), "Documents")
            .unwrap()
            .into_inner();

        let report = scanner.scan_enabled().unwrap();
        assert_eq!(report.folders_scanned, 1);
        assert_eq!(report.files_seen, 2);
        assert_eq!(report.stored, 2);
        assert_eq!(report.failed, 0);

        let docs_in_folder = scanner.store.documents_in_folder(&folder.path).unwrap();
        assert_eq!(docs_in_folder.len(), 2);
        assert!(docs_in_folder.iter().all(|d| d.original_path.is_some()));

        let refreshed = &scanner.store.folders().unwrap()[0];
        assert_eq!(refreshed.document_count, 2);
        assert!(refreshed.last_scanned.is_some());
    }

    #[test]
    fn only_configured_known_formats_are_imported() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("mixed");
        write(&docs.join("keep.PDF"), b"pdf");
        write(&docs.join("photo.jpg"), b"jpeg");
        write(&docs.join("notes.txt"), b"text");

        let mut config = VaultConfig::default();
        config.scan_extensions = vec!["pdf".into(), "txt".into()];
        let scanner = scanner_with(dir.path(), config);
        scanner.store.add_folder(&docs.to_string_lossy(), "").unwrap();

        let report = scanner.scan_enabled().unwrap();
        assert_eq!(report.files_seen, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(scanner.store.documents().unwrap()[0].display_name, "keep.PDF");
    }

    #[test]
    fn rescanning_and_copies_deduplicate() {
        let dir = TempDir::new().unwrap();
        let one = dir.path().join("one");
        let two = dir.path().join("two");
        write(&one.join("invoice.pdf"), b"identical");
        write(&two.join("invoice-copy.pdf"), b"identical");

        let scanner = scanner_in(dir.path());
        scanner.store.add_folder(&one.to_string_lossy(), "").unwrap();
        scanner.store.add_folder(&two.to_string_lossy(), "").unwrap();

        let first = scanner.scan_enabled().unwrap();
        assert_eq!(first.stored, 1);
        assert_eq!(first.deduplicated, 1);

        let second = scanner.scan_enabled().unwrap();
        assert_eq!(second.stored, 0);
        assert_eq!(second.deduplicated, 2);
        assert_eq!(scanner.store.documents().unwrap().len(), 1);
    }

    #[test]
    fn missing_disabled_and_foreign_folders_are_skipped() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present");
        write(&present.join("x.png"), b"png");

        let scanner = scanner_in(dir.path());
        scanner.store.add_folder(&present.to_string_lossy(), "").unwrap();
        scanner
            .store
            .add_folder(&dir.path().join("gone").to_string_lossy(), "")
            .unwrap();
        scanner
            .store
            .add_folder("content://com.android.externalstorage/tree/Docs", "Docs")
            .unwrap();
        let disabled = scanner
            .store
            .add_folder(&dir.path().join("disabled").to_string_lossy(), "")
            .unwrap()
            .into_inner();
        write(&dir.path().join("disabled/y.pdf"), b"never read");
        scanner.store.set_folder_enabled(&disabled.id, false).unwrap();

        let report = scanner.scan_enabled().unwrap();
        assert_eq!(report.folders_scanned, 1);
        assert_eq!(report.folders_skipped, 2);
        assert_eq!(report.stored, 1);
    }

    #[test]
    fn file_uris_resolve_to_paths() {
        assert_eq!(local_path("file:///tmp/docs"), Some(PathBuf::from("/tmp/docs")));
        assert_eq!(local_path("/tmp/docs"), Some(PathBuf::from("/tmp/docs")));
        assert_eq!(local_path("content://tree/primary"), None);

        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("uri");
        write(&docs.join("a.webp"), b"webp");
        let scanner = scanner_in(dir.path());
        let uri = format!("file://{}", docs.to_string_lossy());
        scanner.store.add_folder(&uri, "").unwrap();

        let report = scanner.scan_enabled().unwrap();
        assert_eq!(report.stored, 1);
        // The folder label is the registered path, URI form included.
        assert_eq!(scanner.store.documents_in_folder(&uri).unwrap().len(), 1);
    }
}
