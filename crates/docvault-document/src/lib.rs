// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docvault-document — Page processing for the DocVault capture pipeline.
//
// Provides document edge detection, perspective correction, the raster filter
// chain (rotation, colour adjustments, sharpening, presets), and assembly of
// a processed page into a single-page PDF.

pub mod image;
pub mod pdf;
pub mod scan;

// Re-export the primary entry points so callers can use `docvault_document::process` etc.
pub use crate::image::filter::{apply_filter, process, render};
pub use crate::image::raster::RasterImage;
pub use pdf::assemble::{AssembledDocument, DocumentAssembler};
pub use scan::geometry::{
    DetectionConfig, EdgeDetection, EdgeDetector, FallbackReason, Point, Quad, QuadSource,
    detect_document_edges,
};
pub use scan::rectify::{apply_perspective_correction, apply_perspective_correction_points};
