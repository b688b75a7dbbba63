// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document edge detection — finds the page quadrilateral in a photo.
//
// Pipeline: luma, optional downscale, Gaussian blur, Canny, contour tracing,
// largest contour by area, Douglas-Peucker to a polygon, corner ordering.
// Detection never fails: anything short of a clean 4-gon falls back to the
// full-image quad.

use image::imageops;
use imageproc::contours::find_contours;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point as PixelPoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::image::raster::RasterImage;

// -- Points and quads ---------------------------------------------------------

/// A point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Four corners ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Quad {
    pub const fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// The whole image: `(0,0), (w,0), (w,h), (0,h)`.
    pub fn identity(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        )
    }

    /// Build a quad from caller-ordered corners. Anything other than exactly
    /// four finite points is rejected.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        match points {
            [tl, tr, br, bl] if points.iter().all(Point::is_finite) => {
                Some(Self::new(*tl, *tr, *br, *bl))
            }
            _ => None,
        }
    }

    /// Canonical corner ordering for unordered vertices: smallest `x + y` is
    /// top-left, largest is bottom-right; of the other two the one further
    /// right is top-right.
    pub fn order_points(mut points: [Point; 4]) -> Self {
        points.sort_by(|a, b| (a.x + a.y).total_cmp(&(b.x + b.y)));
        let (top_right, bottom_left) = if points[1].x > points[2].x {
            (points[1], points[2])
        } else {
            (points[2], points[1])
        };
        Self::new(points[0], top_right, points[3], bottom_left)
    }

    pub fn corners(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    pub fn is_finite(&self) -> bool {
        self.corners().iter().all(Point::is_finite)
    }

    /// Enclosed area by the shoelace formula.
    pub fn area(&self) -> f32 {
        let corners = self.corners();
        let mut twice_area = 0.0f32;
        for i in 0..4 {
            let (a, b) = (corners[i], corners[(i + 1) % 4]);
            twice_area += a.x * b.y - b.x * a.y;
        }
        twice_area.abs() / 2.0
    }

    /// Non-degenerate and free of self-intersection: opposite edges never
    /// cross.
    pub fn is_simple(&self) -> bool {
        let [tl, tr, br, bl] = self.corners();
        self.is_finite()
            && self.area() > 0.0
            && !segments_cross(tl, tr, br, bl)
            && !segments_cross(tr, br, bl, tl)
    }

    /// Multiply every coordinate, e.g. to map between image scales.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        let scale = |p: Point| Point::new(p.x * sx, p.y * sy);
        Self::new(
            scale(self.top_left),
            scale(self.top_right),
            scale(self.bottom_right),
            scale(self.bottom_left),
        )
    }
}

fn cross(o: Point, a: Point, b: Point) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Proper crossing of segments `ab` and `cd`.
fn segments_cross(a: Point, b: Point, c: Point, d: Point) -> bool {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

// -- Detection outcome --------------------------------------------------------

/// Why detection fell back to the full-image quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Image smaller than 3x3.
    ImageTooSmall,
    /// No edge contour was found.
    NoContour,
    /// The largest contour encloses too little area.
    AreaTooSmall,
    /// The simplified contour did not have four vertices.
    NotQuadrilateral(usize),
    /// Four vertices, but they do not form a simple quadrilateral.
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadSource {
    Detected,
    Fallback(FallbackReason),
}

/// A quad plus where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDetection {
    pub quad: Quad,
    pub source: QuadSource,
}

impl EdgeDetection {
    pub fn is_detected(&self) -> bool {
        self.source == QuadSource::Detected
    }
}

// -- Detector -----------------------------------------------------------------

/// Tuning for [`EdgeDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    /// Longest side the detector works on; larger images are downscaled.
    pub max_dimension: u32,
    /// Gaussian sigma (matches a 5x5 kernel).
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum contour area, in source pixels squared.
    pub min_area: f64,
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter.
    pub epsilon_ratio: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            blur_sigma: 1.1,
            canny_low: 75.0,
            canny_high: 200.0,
            min_area: 1000.0,
            epsilon_ratio: 0.02,
        }
    }
}

/// Locates the document outline in a photo.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    config: DetectionConfig,
}

impl EdgeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self::new(DetectionConfig {
            max_dimension,
            ..DetectionConfig::default()
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect the page outline. Always returns a simple quadrilateral.
    pub fn detect(&self, image: &RasterImage) -> Quad {
        self.detect_with_outcome(image).quad
    }

    /// Detect the page outline and report whether detection succeeded.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect_with_outcome(&self, image: &RasterImage) -> EdgeDetection {
        let (width, height) = image.dimensions();
        let fallback = |reason: FallbackReason| {
            warn!(?reason, "edge detection fell back to full image");
            EdgeDetection {
                quad: Quad::identity(width, height),
                source: QuadSource::Fallback(reason),
            }
        };

        if width < 3 || height < 3 {
            return fallback(FallbackReason::ImageTooSmall);
        }

        // Step 1: luma, downscaled if the image is large.
        let gray = imageops::grayscale(image.as_rgba());
        let longest = width.max(height);
        let max_dimension = self.config.max_dimension.max(3);
        let gray = if longest > max_dimension {
            let factor = max_dimension as f32 / longest as f32;
            let work_w = ((width as f32 * factor).round() as u32).max(3);
            let work_h = ((height as f32 * factor).round() as u32).max(3);
            debug!(work_w, work_h, "downscaled for detection");
            imageops::thumbnail(&gray, work_w, work_h)
        } else {
            gray
        };
        let sx = width as f64 / gray.width() as f64;
        let sy = height as f64 / gray.height() as f64;

        // Step 2: blur and edges.
        let blurred = gaussian_blur_f32(&gray, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);

        // Step 3: largest contour. Strictly greater, so the first of equals wins.
        let contours = find_contours::<i32>(&edges);
        let mut best: Option<(f64, &[PixelPoint<i32>])> = None;
        for contour in &contours {
            let area = polygon_area(&contour.points);
            if area > best.map_or(0.0, |(max, _)| max) {
                best = Some((area, contour.points.as_slice()));
            }
        }
        let Some((work_area, outline)) = best else {
            return fallback(FallbackReason::NoContour);
        };
        let source_area = work_area * sx * sy;
        debug!(contours = contours.len(), source_area, "largest contour");
        if source_area <= self.config.min_area {
            return fallback(FallbackReason::AreaTooSmall);
        }

        // Step 4: simplify to a polygon.
        let epsilon = self.config.epsilon_ratio * arc_length(outline, true);
        let polygon = approximate_closed(outline, epsilon);
        let [a, b, c, d] = polygon.as_slice() else {
            return fallback(FallbackReason::NotQuadrilateral(polygon.len()));
        };

        // Step 5: back to source coordinates, canonical order.
        let to_source =
            |p: &PixelPoint<i32>| Point::new((p.x as f64 * sx) as f32, (p.y as f64 * sy) as f32);
        let quad = Quad::order_points([to_source(a), to_source(b), to_source(c), to_source(d)]);
        if !quad.is_simple() {
            return fallback(FallbackReason::Degenerate);
        }

        info!(
            area = quad.area(),
            coverage = quad.area() / (width as f32 * height as f32),
            "document edges detected"
        );
        EdgeDetection {
            quad,
            source: QuadSource::Detected,
        }
    }
}

/// Detect the page outline with default tuning.
pub fn detect_document_edges(image: &RasterImage) -> Quad {
    EdgeDetector::default().detect(image)
}

// -- Contour helpers ----------------------------------------------------------

/// Shoelace area of a closed contour.
fn polygon_area(points: &[PixelPoint<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0f64;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice_area += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    twice_area.abs() / 2.0
}

/// Douglas-Peucker on a closed contour: split at the point farthest from the
/// start and simplify both open halves, so the seam never adds a vertex.
fn approximate_closed(points: &[PixelPoint<i32>], epsilon: f64) -> Vec<PixelPoint<i32>> {
    let Some(&start) = points.first() else {
        return Vec::new();
    };
    let squared_distance = |p: &PixelPoint<i32>| {
        let (dx, dy) = ((p.x - start.x) as i64, (p.y - start.y) as i64);
        dx * dx + dy * dy
    };

    let mut far = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        if squared_distance(p) > squared_distance(&points[far]) {
            far = i;
        }
    }
    if far == 0 || epsilon <= 0.0 || !epsilon.is_finite() {
        return vec![start];
    }

    let mut polygon = approximate_polygon_dp(&points[..=far], epsilon, false);
    let mut return_leg = points[far..].to_vec();
    return_leg.push(start);
    let second = approximate_polygon_dp(&return_leg, epsilon, false);

    // Drop the shared far point and the repeated start.
    polygon.pop();
    polygon.extend(second);
    polygon.pop();
    polygon.dedup();
    polygon
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page_on_background(width: u32, height: u32, page: (u32, u32, u32, u32)) -> RasterImage {
        let (x0, y0, x1, y1) = page;
        RasterImage::from_rgba(RgbaImage::from_fn(width, height, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Rgba([245, 245, 240, 255])
            } else {
                Rgba([35, 30, 40, 255])
            }
        }))
    }

    #[test]
    fn shoelace_area_rectangle() {
        let quad = Quad::identity(10, 5);
        assert!((quad.area() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn order_points_canonicalises_any_permutation() {
        let tl = Point::new(10.0, 12.0);
        let tr = Point::new(90.0, 8.0);
        let br = Point::new(95.0, 110.0);
        let bl = Point::new(5.0, 100.0);
        let expected = Quad::new(tl, tr, br, bl);

        for perm in [[br, tl, bl, tr], [bl, br, tr, tl], [tr, bl, tl, br]] {
            assert_eq!(Quad::order_points(perm), expected);
        }
    }

    #[test]
    fn bow_tie_is_not_simple() {
        let quad = Quad::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        );
        assert!(!quad.is_simple());
        assert!(Quad::identity(4, 4).is_simple());
    }

    #[test]
    fn from_points_requires_four_finite_points() {
        let p = Point::new(1.0, 1.0);
        assert!(Quad::from_points(&[p, p, p]).is_none());
        assert!(Quad::from_points(&[p, p, p, p, p]).is_none());
        assert!(Quad::from_points(&[p, p, p, Point::new(f32::NAN, 0.0)]).is_none());
        assert!(Quad::from_points(&[p, p, p, p]).is_some());
    }

    #[test]
    fn uniform_image_falls_back_to_full_frame() {
        let image = RasterImage::filled(200, 300, [200, 200, 200, 255]);
        let detection = EdgeDetector::default().detect_with_outcome(&image);
        assert_eq!(detection.quad, Quad::identity(200, 300));
        assert_eq!(detection.source, QuadSource::Fallback(FallbackReason::NoContour));
    }

    #[test]
    fn tiny_images_fall_back() {
        for (w, h) in [(1, 1), (2, 2), (2, 50)] {
            let image = RasterImage::filled(w, h, [0, 0, 0, 255]);
            let detection = EdgeDetector::default().detect_with_outcome(&image);
            assert_eq!(detection.quad, Quad::identity(w, h));
            assert!(detection.quad.is_simple());
            assert!(!detection.is_detected());
        }
    }

    #[test]
    fn small_blob_is_below_area_threshold() {
        let image = page_on_background(200, 200, (90, 90, 110, 110));
        let detection = EdgeDetector::default().detect_with_outcome(&image);
        assert_eq!(detection.source, QuadSource::Fallback(FallbackReason::AreaTooSmall));
    }

    #[test]
    fn page_touching_the_frame_falls_back_to_full_frame() {
        // Only the right and bottom page edges are inside the frame, so no
        // closed outline exists.
        let image = page_on_background(400, 500, (0, 0, 300, 400));
        let detection = EdgeDetector::default().detect_with_outcome(&image);
        assert_eq!(detection.quad, Quad::identity(400, 500));
        assert_eq!(detection.source, QuadSource::Fallback(FallbackReason::AreaTooSmall));
        assert!(detection.quad.is_simple());
    }

    #[test]
    fn noisy_image_still_yields_simple_quad() {
        let mut state = 0x2545_f491_u32;
        let image = RasterImage::from_rgba(RgbaImage::from_fn(160, 120, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let v = (state & 0xff) as u8;
            Rgba([v, v.wrapping_mul(3), v.wrapping_add(91), 255])
        }));
        let quad = detect_document_edges(&image);
        assert!(quad.is_simple());
    }

    #[test]
    fn detects_page_rectangle() {
        let image = page_on_background(400, 500, (50, 60, 350, 440));
        let detection = EdgeDetector::default().detect_with_outcome(&image);
        assert!(detection.is_detected(), "got {:?}", detection.source);

        let quad = detection.quad;
        assert!((quad.top_left.x - 50.0).abs() < 4.0 && (quad.top_left.y - 60.0).abs() < 4.0);
        assert!((quad.bottom_right.x - 350.0).abs() < 4.0);
        assert!((quad.bottom_right.y - 440.0).abs() < 4.0);
    }

    #[test]
    fn large_photo_is_downscaled_and_mapped_back() {
        let (x0, y0, x1, y1) = (200, 300, 1800, 2700);
        let image = page_on_background(2000, 3000, (x0, y0, x1, y1));
        let detection = EdgeDetector::default().detect_with_outcome(&image);
        assert!(detection.is_detected(), "got {:?}", detection.source);

        let true_area = ((x1 - x0) * (y1 - y0)) as f32;
        let found = detection.quad.area();
        assert!(found > 0.9 * true_area, "area {found} vs {true_area}");
        assert!(found < 1.1 * true_area, "area {found} vs {true_area}");
    }

    #[test]
    fn tilted_page_is_detected() {
        // A rotated square: diamond with corners on the axes of the centre.
        let (cx, cy, r) = (200.0f32, 200.0f32, 150.0f32);
        let image = RasterImage::from_rgba(RgbaImage::from_fn(400, 400, |x, y| {
            let d = (x as f32 - cx).abs() + (y as f32 - cy).abs();
            if d <= r {
                Rgba([240, 240, 240, 255])
            } else {
                Rgba([20, 20, 20, 255])
            }
        }));
        let detection = EdgeDetector::default().detect_with_outcome(&image);
        assert!(detection.is_detected(), "got {:?}", detection.source);
        assert!(detection.quad.is_simple());
        let expected_area = 2.0 * r * r;
        assert!(detection.quad.area() > 0.85 * expected_area);
    }
}
