// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective correction — warps a quadrilateral region to an upright
// rectangle.

use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, info, instrument, warn};

use crate::image::raster::RasterImage;
use crate::scan::geometry::{Point, Quad};

/// Largest output side accepted; bigger targets are treated as degenerate.
pub const MAX_OUTPUT_DIMENSION: u32 = 16_384;

/// Output size for `quad`: the longer of each pair of opposite edges,
/// truncated to whole pixels.
pub fn target_dimensions(quad: &Quad) -> (u32, u32) {
    let width = quad
        .top_left
        .distance(&quad.top_right)
        .max(quad.bottom_right.distance(&quad.bottom_left));
    let height = quad
        .top_left
        .distance(&quad.bottom_left)
        .max(quad.top_right.distance(&quad.bottom_right));
    (width as u32, height as u32)
}

/// Warp the region inside `quad` to a `w` x `h` rectangle using bilinear
/// resampling.
///
/// Degenerate input (non-finite corners, zero or oversized target, singular
/// transform) returns the image unchanged. The full-frame quad is a no-op.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn apply_perspective_correction(image: RasterImage, quad: &Quad) -> RasterImage {
    let (in_w, in_h) = image.dimensions();
    if !quad.is_finite() {
        warn!("non-finite corners; leaving image unchanged");
        return image;
    }
    if *quad == Quad::identity(in_w, in_h) {
        debug!("full-frame quad; nothing to correct");
        return image;
    }

    let (out_w, out_h) = target_dimensions(quad);
    if out_w == 0 || out_h == 0 || out_w > MAX_OUTPUT_DIMENSION || out_h > MAX_OUTPUT_DIMENSION {
        warn!(out_w, out_h, "degenerate target size; leaving image unchanged");
        return image;
    }

    let src = quad.corners().map(|p| (p.x, p.y));
    let (w, h) = (out_w as f32, out_h as f32);
    let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

    let Some(projection) = Projection::from_control_points(src, dest) else {
        warn!("singular perspective transform; leaving image unchanged");
        return image;
    };

    let mut output = RgbaImage::new(out_w, out_h);
    warp_into(
        image.as_rgba(),
        &projection,
        Interpolation::Bilinear,
        Rgba([255, 255, 255, 255]),
        &mut output,
    );

    info!(out_w, out_h, "perspective correction applied");
    RasterImage::from_rgba(output)
}

/// Point-list entry point. Anything other than exactly four finite points
/// returns the image unchanged.
pub fn apply_perspective_correction_points(image: RasterImage, corners: &[Point]) -> RasterImage {
    match Quad::from_points(corners) {
        Some(quad) => apply_perspective_correction(image, &quad),
        None => {
            debug!(points = corners.len(), "not a quadrilateral; rectification skipped");
            image
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> RasterImage {
        RasterImage::from_rgba(RgbaImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgba([250, 250, 250, 255])
            } else {
                Rgba([10, 10, 10, 255])
            }
        }))
    }

    #[test]
    fn target_size_uses_longer_edges() {
        let quad = Quad::new(
            Point::new(10.0, 10.0),
            Point::new(110.0, 20.0),
            Point::new(120.0, 220.5),
            Point::new(0.0, 200.0),
        );
        let (w, h) = target_dimensions(&quad);
        assert_eq!(w, 121); // |br - bl| = sqrt(120^2 + 20.5^2) = 121.7
        assert_eq!(h, 200); // |tr - br| = sqrt(10^2 + 200.5^2) = 200.7
    }

    #[test]
    fn full_frame_quad_is_a_no_op() {
        let image = checkerboard(64, 48);
        let out = apply_perspective_correction(image.clone(), &Quad::identity(64, 48));
        assert_eq!(out, image);
    }

    #[test]
    fn axis_aligned_crop_matches_source() {
        let image = checkerboard(64, 64);
        let quad = Quad::new(
            Point::new(16.0, 16.0),
            Point::new(48.0, 16.0),
            Point::new(48.0, 48.0),
            Point::new(16.0, 48.0),
        );
        let out = apply_perspective_correction(image.clone(), &quad);
        assert_eq!(out.dimensions(), (32, 32));
        // Interior pixels away from square boundaries map exactly.
        assert_eq!(out.pixel(3, 3), image.pixel(19, 19));
        assert_eq!(out.pixel(12, 4), image.pixel(28, 20));
    }

    #[test]
    fn collapsed_quad_returns_input() {
        let image = checkerboard(20, 20);
        let p = Point::new(5.0, 5.0);
        let out = apply_perspective_correction(image.clone(), &Quad::new(p, p, p, p));
        assert_eq!(out, image);
    }

    #[test]
    fn oversized_target_returns_input() {
        let image = checkerboard(20, 20);
        let quad = Quad::identity(20_000, 10);
        let out = apply_perspective_correction(image.clone(), &quad);
        assert_eq!(out, image);
    }

    #[test]
    fn wrong_point_count_is_skipped() {
        let image = checkerboard(20, 20);
        let three = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)];
        assert_eq!(apply_perspective_correction_points(image.clone(), &three), image);
    }

    #[test]
    fn skewed_quad_produces_target_size() {
        let image = checkerboard(200, 200);
        let quad = Quad::new(
            Point::new(20.0, 30.0),
            Point::new(180.0, 10.0),
            Point::new(190.0, 190.0),
            Point::new(10.0, 170.0),
        );
        let out = apply_perspective_correction_points(image, &quad.corners());
        assert_eq!(out.dimensions(), target_dimensions(&quad));
    }
}
