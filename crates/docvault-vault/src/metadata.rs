// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metadata catalog — document records and folder sources.
//
// The vault talks to the catalog only through the `MetadataStore` trait.
// Two implementations ship here: SQLite for real deployments and an
// in-memory store for tests and ephemeral sessions. Payload bytes never
// enter the catalog; records reference them by stored path and checksum.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use docvault_core::error::{Result, VaultError};
use docvault_core::types::{DocumentId, DocumentRecord, FolderId, FolderSource, InsertOutcome};

/// CRUD contract for the catalog.
///
/// Implementations are synchronous. Async callers wrap calls in
/// `tokio::task::spawn_blocking`.
pub trait MetadataStore: Send + Sync {
    /// Insert `record` unless a record with the same checksum exists, in
    /// which case the existing record is returned untouched.
    fn insert_document(&self, record: &DocumentRecord) -> Result<InsertOutcome<DocumentRecord>>;

    /// Overwrite the stored record with the same id. `NotFound` if absent.
    fn update_document(&self, record: &DocumentRecord) -> Result<()>;

    /// Remove a record. Returns whether anything was deleted.
    fn delete_document(&self, id: &DocumentId) -> Result<bool>;

    fn document_by_checksum(&self, checksum: &str) -> Result<Option<DocumentRecord>>;

    fn document_by_id(&self, id: &DocumentId) -> Result<Option<DocumentRecord>>;

    /// All records, newest first.
    fn all_documents(&self) -> Result<Vec<DocumentRecord>>;

    /// Case-insensitive substring match over display name and extracted
    /// text, newest first. An empty query matches everything.
    fn search_documents(&self, query: &str) -> Result<Vec<DocumentRecord>>;

    /// Number of records whose `folder_source` equals `folder_source`.
    fn count_documents_in_folder(&self, folder_source: &str) -> Result<u64>;

    /// Insert `folder` unless a folder with the same path exists.
    fn insert_folder(&self, folder: &FolderSource) -> Result<InsertOutcome<FolderSource>>;

    /// Overwrite the stored folder with the same id. `NotFound` if absent.
    fn update_folder(&self, folder: &FolderSource) -> Result<()>;

    fn delete_folder(&self, id: &FolderId) -> Result<bool>;

    /// All folders, ordered by path.
    fn all_folders(&self) -> Result<Vec<FolderSource>>;

    fn enabled_folders(&self) -> Result<Vec<FolderSource>>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        stored_path TEXT NOT NULL,
        original_path TEXT,
        size_bytes INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        modified_at TEXT NOT NULL,
        folder_source TEXT NOT NULL,
        encrypted INTEGER NOT NULL,
        checksum TEXT NOT NULL UNIQUE,
        extracted_text TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_documents_folder ON documents(folder_source);

    CREATE TABLE IF NOT EXISTS folders (
        id TEXT PRIMARY KEY,
        path TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_scanned TEXT,
        document_count INTEGER NOT NULL DEFAULT 0
    );
"#;

const DOCUMENT_COLUMNS: &str = "id, display_name, stored_path, original_path, size_bytes, \
     created_at, modified_at, folder_source, encrypted, checksum, extracted_text";

const FOLDER_COLUMNS: &str = "id, path, display_name, enabled, last_scanned, document_count";

/// Catalog backed by a single SQLite connection.
///
/// The connection sits behind a `Mutex` so the store can be shared across
/// blocking workers.
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetadataStore").finish_non_exhaustive()
    }
}

impl SqliteMetadataStore {
    /// Open (or create) the catalog at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())
            .map_err(|e| VaultError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| VaultError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| VaultError::Database(format!("create tables: {e}")))?;

        info!("metadata catalog opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory catalog (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VaultError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| VaultError::Database(format!("create tables: {e}")))?;

        debug!("in-memory metadata catalog opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Database("connection lock poisoned".into()))
    }

    fn query_documents(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<DocumentRecord>> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| VaultError::Database(format!("prepare: {e}")))?;
        stmt.query_map(params, row_to_record)
            .map_err(|e| VaultError::Database(format!("query documents: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VaultError::Database(format!("collect rows: {e}")))
    }

    fn query_folders(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<FolderSource>> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| VaultError::Database(format!("prepare: {e}")))?;
        stmt.query_map(params, row_to_folder)
            .map_err(|e| VaultError::Database(format!("query folders: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VaultError::Database(format!("collect rows: {e}")))
    }

    fn select_document_by_checksum(
        conn: &Connection,
        checksum: &str,
    ) -> Result<Option<DocumentRecord>> {
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE checksum = ?1"),
            params![checksum],
            row_to_record,
        )
        .optional()
        .map_err(|e| VaultError::Database(format!("document by checksum: {e}")))
    }

    fn select_folder_by_path(conn: &Connection, path: &str) -> Result<Option<FolderSource>> {
        conn.query_row(
            &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE path = ?1"),
            params![path],
            row_to_folder,
        )
        .optional()
        .map_err(|e| VaultError::Database(format!("folder by path: {e}")))
    }
}

impl MetadataStore for SqliteMetadataStore {
    #[instrument(skip(self, record), fields(checksum = %record.checksum))]
    fn insert_document(&self, record: &DocumentRecord) -> Result<InsertOutcome<DocumentRecord>> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO documents ({DOCUMENT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.id.to_string(),
                    record.display_name,
                    record.stored_path,
                    record.original_path,
                    record.size_bytes as i64,
                    timestamp(&record.created_at),
                    timestamp(&record.modified_at),
                    record.folder_source,
                    record.encrypted,
                    record.checksum,
                    record.extracted_text,
                ],
            )
            .map_err(|e| VaultError::Database(format!("insert document: {e}")))?;

        if changed == 1 {
            debug!(id = %record.id, "document inserted");
            return Ok(InsertOutcome::Inserted(record.clone()));
        }

        // Ignored: either the checksum or the id already exists.
        match Self::select_document_by_checksum(&conn, &record.checksum)? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(VaultError::Database(format!(
                "document id {} already used by different content",
                record.id
            ))),
        }
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    fn update_document(&self, record: &DocumentRecord) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE documents SET display_name = ?2, stored_path = ?3, original_path = ?4,
                        size_bytes = ?5, created_at = ?6, modified_at = ?7, folder_source = ?8,
                        encrypted = ?9, checksum = ?10, extracted_text = ?11
                 WHERE id = ?1",
                params![
                    record.id.to_string(),
                    record.display_name,
                    record.stored_path,
                    record.original_path,
                    record.size_bytes as i64,
                    timestamp(&record.created_at),
                    timestamp(&record.modified_at),
                    record.folder_source,
                    record.encrypted,
                    record.checksum,
                    record.extracted_text,
                ],
            )
            .map_err(|e| VaultError::Database(format!("update document: {e}")))?;

        if changed == 0 {
            return Err(VaultError::NotFound(format!("document {}", record.id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    fn delete_document(&self, id: &DocumentId) -> Result<bool> {
        let changed = self
            .conn()?
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])
            .map_err(|e| VaultError::Database(format!("delete document: {e}")))?;
        Ok(changed > 0)
    }

    fn document_by_checksum(&self, checksum: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.conn()?;
        Self::select_document_by_checksum(&conn, checksum)
    }

    fn document_by_id(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        self.conn()?
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                params![id.to_string()],
                row_to_record,
            )
            .optional()
            .map_err(|e| VaultError::Database(format!("document by id: {e}")))
    }

    fn all_documents(&self) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn()?;
        let records = Self::query_documents(
            &conn,
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC"),
            [],
        )?;
        debug!(count = records.len(), "retrieved all documents");
        Ok(records)
    }

    #[instrument(skip(self))]
    fn search_documents(&self, query: &str) -> Result<Vec<DocumentRecord>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let conn = self.conn()?;
        Self::query_documents(
            &conn,
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE display_name LIKE ?1 ESCAPE '\\'
                    OR IFNULL(extracted_text, '') LIKE ?1 ESCAPE '\\'
                 ORDER BY created_at DESC"
            ),
            params![pattern],
        )
    }

    fn count_documents_in_folder(&self, folder_source: &str) -> Result<u64> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE folder_source = ?1",
                params![folder_source],
                |row| row.get(0),
            )
            .map_err(|e| VaultError::Database(format!("count documents: {e}")))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, folder), fields(path = %folder.path))]
    fn insert_folder(&self, folder: &FolderSource) -> Result<InsertOutcome<FolderSource>> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO folders ({FOLDER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    folder.id.to_string(),
                    folder.path,
                    folder.display_name,
                    folder.enabled,
                    folder.last_scanned.as_ref().map(timestamp),
                    folder.document_count as i64,
                ],
            )
            .map_err(|e| VaultError::Database(format!("insert folder: {e}")))?;

        if changed == 1 {
            return Ok(InsertOutcome::Inserted(folder.clone()));
        }
        match Self::select_folder_by_path(&conn, &folder.path)? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(VaultError::Database(format!(
                "folder id {} already used by a different path",
                folder.id
            ))),
        }
    }

    #[instrument(skip(self, folder), fields(id = %folder.id))]
    fn update_folder(&self, folder: &FolderSource) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE folders SET path = ?2, display_name = ?3, enabled = ?4,
                        last_scanned = ?5, document_count = ?6
                 WHERE id = ?1",
                params![
                    folder.id.to_string(),
                    folder.path,
                    folder.display_name,
                    folder.enabled,
                    folder.last_scanned.as_ref().map(timestamp),
                    folder.document_count as i64,
                ],
            )
            .map_err(|e| VaultError::Database(format!("update folder: {e}")))?;

        if changed == 0 {
            return Err(VaultError::NotFound(format!("folder {}", folder.id)));
        }
        Ok(())
    }

    fn delete_folder(&self, id: &FolderId) -> Result<bool> {
        let changed = self
            .conn()?
            .execute("DELETE FROM folders WHERE id = ?1", params![id.to_string()])
            .map_err(|e| VaultError::Database(format!("delete folder: {e}")))?;
        Ok(changed > 0)
    }

    fn all_folders(&self) -> Result<Vec<FolderSource>> {
        let conn = self.conn()?;
        Self::query_folders(
            &conn,
            &format!("SELECT {FOLDER_COLUMNS} FROM folders ORDER BY path ASC"),
            [],
        )
    }

    fn enabled_folders(&self) -> Result<Vec<FolderSource>> {
        let conn = self.conn()?;
        Self::query_folders(
            &conn,
            &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE enabled = 1 ORDER BY path ASC"),
            [],
        )
    }
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

/// Column indices follow `DOCUMENT_COLUMNS`.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    let id_str: String = row.get(0)?;
    let size_bytes: i64 = row.get(4)?;
    let created_at: String = row.get(5)?;
    let modified_at: String = row.get(6)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;

    Ok(DocumentRecord {
        id: DocumentId(uuid),
        display_name: row.get(1)?,
        stored_path: row.get(2)?,
        original_path: row.get(3)?,
        size_bytes: size_bytes.max(0) as u64,
        created_at: parse_timestamp(5, &created_at)?,
        modified_at: parse_timestamp(6, &modified_at)?,
        folder_source: row.get(7)?,
        encrypted: row.get(8)?,
        checksum: row.get(9)?,
        extracted_text: row.get(10)?,
    })
}

/// Column indices follow `FOLDER_COLUMNS`.
fn row_to_folder(row: &rusqlite::Row<'_>) -> rusqlite::Result<FolderSource> {
    let id_str: String = row.get(0)?;
    let last_scanned: Option<String> = row.get(4)?;
    let document_count: i64 = row.get(5)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;
    let last_scanned = last_scanned
        .map(|raw| parse_timestamp(4, &raw))
        .transpose()?;

    Ok(FolderSource {
        id: FolderId(uuid),
        path: row.get(1)?,
        display_name: row.get(2)?,
        enabled: row.get(3)?,
        last_scanned,
        document_count: document_count.max(0) as u64,
    })
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryCatalog {
    documents: Vec<DocumentRecord>,
    folders: Vec<FolderSource>,
}

/// Catalog held entirely in memory. Same semantics as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<MemoryCatalog>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn catalog(&self) -> Result<MutexGuard<'_, MemoryCatalog>> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Database("memory catalog lock poisoned".into()))
    }
}

fn newest_first(mut records: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}

fn by_path(mut folders: Vec<FolderSource>) -> Vec<FolderSource> {
    folders.sort_by(|a, b| a.path.cmp(&b.path));
    folders
}

impl MetadataStore for MemoryMetadataStore {
    fn insert_document(&self, record: &DocumentRecord) -> Result<InsertOutcome<DocumentRecord>> {
        let mut catalog = self.catalog()?;
        if let Some(existing) = catalog.documents.iter().find(|d| d.checksum == record.checksum) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        if catalog.documents.iter().any(|d| d.id == record.id) {
            return Err(VaultError::Database(format!(
                "document id {} already used by different content",
                record.id
            )));
        }
        catalog.documents.push(record.clone());
        Ok(InsertOutcome::Inserted(record.clone()))
    }

    fn update_document(&self, record: &DocumentRecord) -> Result<()> {
        let mut catalog = self.catalog()?;
        let slot = catalog
            .documents
            .iter_mut()
            .find(|d| d.id == record.id)
            .ok_or_else(|| VaultError::NotFound(format!("document {}", record.id)))?;
        *slot = record.clone();
        Ok(())
    }

    fn delete_document(&self, id: &DocumentId) -> Result<bool> {
        let mut catalog = self.catalog()?;
        let before = catalog.documents.len();
        catalog.documents.retain(|d| d.id != *id);
        Ok(catalog.documents.len() < before)
    }

    fn document_by_checksum(&self, checksum: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .catalog()?
            .documents
            .iter()
            .find(|d| d.checksum == checksum)
            .cloned())
    }

    fn document_by_id(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        Ok(self.catalog()?.documents.iter().find(|d| d.id == *id).cloned())
    }

    fn all_documents(&self) -> Result<Vec<DocumentRecord>> {
        Ok(newest_first(self.catalog()?.documents.clone()))
    }

    fn search_documents(&self, query: &str) -> Result<Vec<DocumentRecord>> {
        let needle = query.trim().to_lowercase();
        let matches = self
            .catalog()?
            .documents
            .iter()
            .filter(|d| {
                d.display_name.to_lowercase().contains(&needle)
                    || d.extracted_text
                        .as_deref()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        Ok(newest_first(matches))
    }

    fn count_documents_in_folder(&self, folder_source: &str) -> Result<u64> {
        Ok(self
            .catalog()?
            .documents
            .iter()
            .filter(|d| d.folder_source == folder_source)
            .count() as u64)
    }

    fn insert_folder(&self, folder: &FolderSource) -> Result<InsertOutcome<FolderSource>> {
        let mut catalog = self.catalog()?;
        if let Some(existing) = catalog.folders.iter().find(|f| f.path == folder.path) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        if catalog.folders.iter().any(|f| f.id == folder.id) {
            return Err(VaultError::Database(format!(
                "folder id {} already used by a different path",
                folder.id
            )));
        }
        catalog.folders.push(folder.clone());
        Ok(InsertOutcome::Inserted(folder.clone()))
    }

    fn update_folder(&self, folder: &FolderSource) -> Result<()> {
        let mut catalog = self.catalog()?;
        let slot = catalog
            .folders
            .iter_mut()
            .find(|f| f.id == folder.id)
            .ok_or_else(|| VaultError::NotFound(format!("folder {}", folder.id)))?;
        *slot = folder.clone();
        Ok(())
    }

    fn delete_folder(&self, id: &FolderId) -> Result<bool> {
        let mut catalog = self.catalog()?;
        let before = catalog.folders.len();
        catalog.folders.retain(|f| f.id != *id);
        Ok(catalog.folders.len() < before)
    }

    fn all_folders(&self) -> Result<Vec<FolderSource>> {
        Ok(by_path(self.catalog()?.folders.clone()))
    }

    fn enabled_folders(&self) -> Result<Vec<FolderSource>> {
        let enabled = self
            .catalog()?
            .folders
            .iter()
            .filter(|f| f.enabled)
            .cloned()
            .collect();
        Ok(by_path(enabled))
    }
}
