// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline — document edge detection and perspective correction.

pub mod geometry;
pub mod rectify;

pub use geometry::{EdgeDetection, EdgeDetector, Point, Quad, QuadSource};
