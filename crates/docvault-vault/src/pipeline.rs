// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capture pipeline — from camera bytes to a stored, encrypted PDF.
//
// decode -> detect -> rectify -> adjust -> preset -> assemble runs on one
// blocking worker; ingest runs on a second. A semaphore caps how many
// documents are in flight at once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use docvault_core::config::VaultConfig;
use docvault_core::error::{Result, VaultError};
use docvault_core::types::{DocumentMetadata, FilterParams, IngestOutcome, SCANNER_FOLDER_LABEL};
use docvault_document::{
    AssembledDocument, DocumentAssembler, EdgeDetector, Point, RasterImage,
    apply_perspective_correction, apply_perspective_correction_points, render,
};

use crate::store::VaultStore;

/// One page to capture.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Encoded image as produced by the camera or picker (JPEG, PNG, WebP).
    pub image: Vec<u8>,
    /// Corners adjusted by the user. `None` runs edge detection; anything
    /// other than four finite points leaves the page unrectified.
    pub corners: Option<Vec<Point>>,
    pub params: FilterParams,
    /// Document name; `.pdf` is appended when missing.
    pub name: String,
    pub extracted_text: Option<String>,
}

impl CaptureRequest {
    pub fn new(image: Vec<u8>, name: impl Into<String>) -> Self {
        Self {
            image,
            corners: None,
            params: FilterParams::default(),
            name: name.into(),
            extracted_text: None,
        }
    }

    pub fn with_corners(mut self, corners: Vec<Point>) -> Self {
        self.corners = Some(corners);
        self
    }

    pub fn with_params(mut self, params: FilterParams) -> Self {
        self.params = params;
        self
    }
}

/// Runs captures against one vault store.
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    store: Arc<VaultStore>,
    detector: EdgeDetector,
    assembler: DocumentAssembler,
    permits: Arc<Semaphore>,
}

impl CapturePipeline {
    /// At most `max_in_flight` documents are processed concurrently
    /// (minimum one).
    pub fn new(
        store: Arc<VaultStore>,
        detector: EdgeDetector,
        assembler: DocumentAssembler,
        max_in_flight: usize,
    ) -> Self {
        Self {
            store,
            detector,
            assembler,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Pipeline tuned from `config`.
    pub fn from_config(store: Arc<VaultStore>, config: &VaultConfig) -> Self {
        Self::new(
            store,
            EdgeDetector::with_max_dimension(config.detection_max_dimension),
            DocumentAssembler::new(config.effective_jpeg_quality()),
            config.worker_threads,
        )
    }

    pub fn store(&self) -> &Arc<VaultStore> {
        &self.store
    }

    /// Capture one page into the vault.
    ///
    /// Dropping the returned future before the page is assembled persists
    /// nothing.
    #[instrument(skip_all, fields(name = %request.name, bytes = request.image.len()))]
    pub async fn capture(&self, request: CaptureRequest) -> Result<IngestOutcome> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| VaultError::Io(std::io::Error::other("capture pipeline closed")))?;

        let mut metadata = DocumentMetadata::new(request.name.clone(), SCANNER_FOLDER_LABEL);
        metadata.extracted_text = request.extracted_text.clone();

        let detector = self.detector.clone();
        let assembler = self.assembler;
        let document = tokio::task::spawn_blocking(move || {
            render_document(&detector, &assembler, request)
        })
        .await
        .map_err(join_failed)??;

        metadata.display_name = document.file_name.clone();
        let store = Arc::clone(&self.store);
        let outcome = tokio::task::spawn_blocking(move || {
            store.ingest(&document.bytes, &document.checksum, metadata)
        })
        .await
        .map_err(join_failed)??;

        info!(
            id = %outcome.record().id,
            deduplicated = outcome.is_deduplicated(),
            "capture finished"
        );
        Ok(outcome)
    }

    /// Capture several pages concurrently, each as its own document.
    ///
    /// Results line up with `requests`; completion order across documents
    /// is unspecified.
    pub async fn capture_many(&self, requests: Vec<CaptureRequest>) -> Vec<Result<IngestOutcome>> {
        let count = requests.len();
        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let pipeline = self.clone();
            tasks.spawn(async move { (index, pipeline.capture(request).await) });
        }
        join_in_order(tasks, count).await
    }
}

/// Drain `tasks` into one slot per index. A task that panicked or was
/// cancelled leaves an error in its slot.
async fn join_in_order<T: 'static>(
    mut tasks: JoinSet<(usize, Result<T>)>,
    count: usize,
) -> Vec<Result<T>> {
    let mut slots: Vec<Option<Result<T>>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(result);
                }
            }
            Err(e) => warn!(error = %e, "capture task did not complete"),
        }
    }
    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(VaultError::Io(std::io::Error::other("capture task did not complete")))
            })
        })
        .collect()
}

/// The CPU-bound half of a capture.
fn render_document(
    detector: &EdgeDetector,
    assembler: &DocumentAssembler,
    request: CaptureRequest,
) -> Result<AssembledDocument> {
    let decoded = RasterImage::decode(&request.image)?;

    let rectified = match &request.corners {
        Some(corners) => apply_perspective_correction_points(decoded, corners),
        None => {
            let detection = detector.detect_with_outcome(&decoded);
            if !detection.is_detected() {
                debug!(source = ?detection.source, "no page outline found; using full frame");
            }
            apply_perspective_correction(decoded, &detection.quad)
        }
    };

    let page = render(rectified, &request.params);
    assembler.assemble(&page, &request.name)
}

fn join_failed(e: tokio::task::JoinError) -> VaultError {
    VaultError::Io(std::io::Error::other(format!("blocking worker failed: {e}")))
}
