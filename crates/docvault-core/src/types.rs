// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the DocVault engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a registered source folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub Uuid);

impl FolderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Folder label attached to pages produced by the in-app scanner.
pub const SCANNER_FOLDER_LABEL: &str = "App Scanner";

/// File formats accepted by the folder scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportedFormat {
    Pdf,
    Jpeg,
    Png,
    Webp,
}

impl SupportedFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Filter parameters
// ---------------------------------------------------------------------------

/// Quarter-turn rotations supported by the filter chain (clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }
}

/// Colour presets applied after the manual adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterPreset {
    #[default]
    Original,
    /// Contrast/brightness bias that suppresses background shadow tint.
    Enhanced,
    Grayscale,
    BlackWhite,
}

/// Manual adjustments plus preset for one page.
///
/// Pure value type. Ranges: brightness [-100, 100], contrast [0.5, 2.0],
/// saturation [0, 2.0], sharpness [0, 10].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub sharpness: f32,
    pub rotation: Rotation,
    pub preset: FilterPreset,
}

impl FilterParams {
    pub const BRIGHTNESS_RANGE: (f32, f32) = (-100.0, 100.0);
    pub const CONTRAST_RANGE: (f32, f32) = (0.5, 2.0);
    pub const SATURATION_RANGE: (f32, f32) = (0.0, 2.0);
    pub const SHARPNESS_RANGE: (f32, f32) = (0.0, 10.0);

    /// Return a copy with every numeric field pulled into its valid range.
    /// Non-finite values fall back to the neutral setting.
    pub fn clamped(&self) -> Self {
        fn clamp(value: f32, (lo, hi): (f32, f32), neutral: f32) -> f32 {
            if value.is_finite() {
                value.clamp(lo, hi)
            } else {
                neutral
            }
        }

        Self {
            brightness: clamp(self.brightness, Self::BRIGHTNESS_RANGE, 0.0),
            contrast: clamp(self.contrast, Self::CONTRAST_RANGE, 1.0),
            saturation: clamp(self.saturation, Self::SATURATION_RANGE, 1.0),
            sharpness: clamp(self.sharpness, Self::SHARPNESS_RANGE, 0.0),
            rotation: self.rotation,
            preset: self.preset,
        }
    }

    /// Whether the manual adjustments leave pixels untouched.
    pub fn is_neutral(&self) -> bool {
        self.brightness == 0.0
            && self.contrast == 1.0
            && self.saturation == 1.0
            && self.sharpness == 0.0
            && self.rotation == Rotation::None
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            sharpness: 0.0,
            rotation: Rotation::None,
            preset: FilterPreset::Original,
        }
    }
}

// ---------------------------------------------------------------------------
// Vault records
// ---------------------------------------------------------------------------

/// Caller-supplied metadata for a document being ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub display_name: String,
    /// Label of the folder (or subsystem) the document came from.
    pub folder_source: String,
    /// Where an imported file originally lived. Never modified by the vault.
    pub original_path: Option<String>,
    /// Last-modified time of the source, if known.
    pub modified_at: Option<DateTime<Utc>>,
    pub extracted_text: Option<String>,
}

impl DocumentMetadata {
    pub fn new(display_name: impl Into<String>, folder_source: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            folder_source: folder_source.into(),
            original_path: None,
            modified_at: None,
            extracted_text: None,
        }
    }

    pub fn with_original_path(mut self, path: impl Into<String>) -> Self {
        self.original_path = Some(path.into());
        self
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }
}

/// A document held by the vault.
///
/// `checksum` is the lowercase hex SHA-256 of the plaintext payload and is
/// unique across all records; it is the deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub display_name: String,
    pub stored_path: String,
    pub original_path: Option<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub folder_source: String,
    pub encrypted: bool,
    pub checksum: String,
    pub extracted_text: Option<String>,
}

impl DocumentRecord {
    /// Build a fresh record for a payload that has just been written.
    pub fn new(
        metadata: DocumentMetadata,
        stored_path: String,
        size_bytes: u64,
        encrypted: bool,
        checksum: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            display_name: metadata.display_name,
            stored_path,
            original_path: metadata.original_path,
            size_bytes,
            created_at: now,
            modified_at: metadata.modified_at.unwrap_or(now),
            folder_source: metadata.folder_source,
            encrypted,
            checksum,
            extracted_text: metadata.extracted_text,
        }
    }
}

/// A folder (filesystem path or opaque tree URI) the scanner imports from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderSource {
    pub id: FolderId,
    pub path: String,
    pub display_name: String,
    /// Disabled folders are skipped by the next scan.
    pub enabled: bool,
    pub last_scanned: Option<DateTime<Utc>>,
    pub document_count: u64,
}

impl FolderSource {
    pub fn new(path: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: FolderId::new(),
            path: path.into(),
            display_name: display_name.into(),
            enabled: true,
            last_scanned: None,
            document_count: 0,
        }
    }
}

/// Result of an insert-if-absent operation.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    /// The value was new and has been stored.
    Inserted(T),
    /// An equivalent value already existed; it is returned unchanged.
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Inserted(value) | Self::Existing(value) => value,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Result of ingesting a payload into the vault.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// New content: the payload was written and a record created.
    Stored(DocumentRecord),
    /// The checksum was already present; nothing was written.
    Deduplicated(DocumentRecord),
}

impl IngestOutcome {
    pub fn record(&self) -> &DocumentRecord {
        match self {
            Self::Stored(record) | Self::Deduplicated(record) => record,
        }
    }

    pub fn is_deduplicated(&self) -> bool {
        matches!(self, Self::Deduplicated(_))
    }
}

/// Whether `value` looks like a lowercase hex SHA-256 digest.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_pulls_params_into_range() {
        let params = FilterParams {
            brightness: 250.0,
            contrast: 0.1,
            saturation: f32::NAN,
            sharpness: 42.0,
            ..FilterParams::default()
        }
        .clamped();

        assert_eq!(params.brightness, 100.0);
        assert_eq!(params.contrast, 0.5);
        assert_eq!(params.saturation, 1.0);
        assert_eq!(params.sharpness, 10.0);
    }

    #[test]
    fn default_params_are_neutral() {
        assert!(FilterParams::default().is_neutral());
        let turned = FilterParams {
            rotation: Rotation::Cw180,
            ..FilterParams::default()
        };
        assert!(!turned.is_neutral());
    }

    #[test]
    fn supported_format_from_extension() {
        assert_eq!(SupportedFormat::from_extension("JPG"), Some(SupportedFormat::Jpeg));
        assert_eq!(SupportedFormat::from_extension("webp"), Some(SupportedFormat::Webp));
        assert_eq!(SupportedFormat::from_extension("docx"), None);
    }

    #[test]
    fn sha256_hex_shape() {
        let digest = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert!(is_sha256_hex(digest));
        assert!(!is_sha256_hex(&digest.to_uppercase()));
        assert!(!is_sha256_hex("abc"));
    }

    #[test]
    fn record_uses_source_modified_time() {
        let modified = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let metadata = DocumentMetadata::new("receipt.pdf", "Downloads").with_modified_at(modified);
        let record = DocumentRecord::new(metadata, "/vault/x.bin".into(), 10, true, "00".repeat(32));
        assert_eq!(record.modified_at, modified);
        assert!(record.created_at > modified);
    }
}
