// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — the RGBA page buffer and the filter chain applied to it.

pub mod filter;
pub mod raster;

pub use raster::RasterImage;
