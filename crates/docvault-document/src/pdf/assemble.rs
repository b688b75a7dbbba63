// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembler — packages a processed page as a one-page PDF.
//
// The page is encoded once as JPEG and embedded unchanged as a DCTDecode
// image XObject. The MediaBox matches the page's pixel size.

use docvault_core::error::{Result, VaultError};
use docvault_security::integrity::hash_reader;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use tracing::{debug, info, instrument};

use crate::image::raster::RasterImage;

/// Default JPEG quality for assembled pages.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// A finished PDF container, ready for encryption and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDocument {
    /// Target name with a `.pdf` extension.
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`.
    pub checksum: String,
    pub width: u32,
    pub height: u32,
}

/// Builds single-page PDFs from raster pages.
#[derive(Debug, Clone, Copy)]
pub struct DocumentAssembler {
    jpeg_quality: u8,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl DocumentAssembler {
    /// Quality is clamped to 1..=100.
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Encode `page` and wrap it in a PDF named after `target_name`.
    #[instrument(skip(self, page), fields(width = page.width(), height = page.height()))]
    pub fn assemble(&self, page: &RasterImage, target_name: &str) -> Result<AssembledDocument> {
        let (width, height) = page.dimensions();
        if width == 0 || height == 0 {
            return Err(VaultError::InvalidInput("cannot assemble an empty page".into()));
        }

        let jpeg = page.encode_jpeg(self.jpeg_quality)?;
        debug!(jpeg_bytes = jpeg.len(), quality = self.jpeg_quality, "page encoded");

        let bytes = build_single_page_pdf(jpeg, width, height, target_name)?;
        let checksum = hash_reader(bytes.as_slice())?;
        let file_name = pdf_file_name(target_name);

        info!(file_name, pdf_bytes = bytes.len(), "document assembled");
        Ok(AssembledDocument {
            file_name,
            bytes,
            checksum,
            width,
            height,
        })
    }
}

/// Append `.pdf` unless the name already ends with it (any case).
pub fn pdf_file_name(target_name: &str) -> String {
    let trimmed = target_name.trim();
    let base = if trimmed.is_empty() { "scan" } else { trimmed };
    if base.to_ascii_lowercase().ends_with(".pdf") {
        base.to_owned()
    } else {
        format!("{base}.pdf")
    }
}

fn build_single_page_pdf(jpeg: Vec<u8>, width: u32, height: u32, title: &str) -> Result<Vec<u8>> {
    let (w, h) = (i64::from(width), i64::from(height));
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w,
            "Height" => h,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    // Scale the unit image square to the full page.
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Page0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| VaultError::Pdf(format!("content stream: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Page0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => text_string(title),
        "Producer" => Object::string_literal("DocVault"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| VaultError::Pdf(format!("failed to serialise PDF: {e}")))?;
    Ok(bytes)
}

/// PDF text string: ASCII as a literal, anything else as UTF-16BE with a
/// byte-order mark.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = Vec::with_capacity(2 + text.len() * 2);
    bytes.extend_from_slice(&[0xFE, 0xFF]);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
