// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster filter chain — rotation, colour adjustments, sharpening, and presets.
//
// All functions are pure: same input and parameters, same output bytes.

use docvault_core::types::{FilterParams, FilterPreset, Rotation};
use image::imageops;
use tracing::{debug, instrument};

use crate::image::raster::RasterImage;

/// Luma weights shared by the saturation matrix and the grayscale preset.
const LUMA_R: f32 = 0.213;
const LUMA_G: f32 = 0.715;
const LUMA_B: f32 = 0.072;

/// Black/white cut-off applied to the luma value.
const BLACK_WHITE_THRESHOLD: u8 = 128;

/// Apply rotation, colour adjustments, and sharpening, in that order.
///
/// Parameters are clamped to their valid ranges first. Neutral parameters
/// return the input unchanged.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn process(image: RasterImage, params: &FilterParams) -> RasterImage {
    let params = params.clamped();
    if params.is_neutral() {
        return image;
    }

    let rotated = rotate(image, params.rotation);
    let adjusted = adjust_colour(rotated, params.brightness, params.contrast, params.saturation);
    if params.sharpness > 0.0 {
        sharpen(adjusted, params.sharpness)
    } else {
        adjusted
    }
}

/// Apply one of the colour presets.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn apply_filter(image: RasterImage, preset: FilterPreset) -> RasterImage {
    match preset {
        FilterPreset::Original => image,
        FilterPreset::Enhanced => map_channels(image, |[r, g, b]| {
            [
                enhance_channel(r, 1.2, 10.0),
                enhance_channel(g, 1.2, 10.0),
                enhance_channel(b, 1.1, 5.0),
            ]
        }),
        FilterPreset::Grayscale => map_channels(image, |rgb| {
            let y = luma(rgb);
            [y, y, y]
        }),
        FilterPreset::BlackWhite => map_channels(image, |rgb| {
            let v = if luma(rgb) > BLACK_WHITE_THRESHOLD { 255 } else { 0 };
            [v, v, v]
        }),
    }
}

/// `process` followed by the preset in `params`.
pub fn render(image: RasterImage, params: &FilterParams) -> RasterImage {
    let preset = params.preset;
    apply_filter(process(image, params), preset)
}

// -- Stages -------------------------------------------------------------------

/// Lossless clockwise rotation; 90 and 270 swap the canvas.
fn rotate(image: RasterImage, rotation: Rotation) -> RasterImage {
    let pixels = match rotation {
        Rotation::None => return image,
        Rotation::Cw90 => imageops::rotate90(image.as_rgba()),
        Rotation::Cw180 => imageops::rotate180(image.as_rgba()),
        Rotation::Cw270 => imageops::rotate270(image.as_rgba()),
    };
    debug!(degrees = rotation.degrees(), "rotated");
    RasterImage::from_rgba(pixels)
}

/// `contrast * S * rgb + brightness`, where `S` is the saturation matrix,
/// clamped once at the end. Alpha is left as is.
fn adjust_colour(image: RasterImage, brightness: f32, contrast: f32, saturation: f32) -> RasterImage {
    if brightness == 0.0 && contrast == 1.0 && saturation == 1.0 {
        return image;
    }

    let matrix = saturation_matrix(saturation);
    map_channels(image, |[r, g, b]| {
        let input = [r as f32, g as f32, b as f32];
        let mut out = [0u8; 3];
        for (channel, row) in out.iter_mut().zip(matrix.iter()) {
            let mixed = row[0] * input[0] + row[1] * input[1] + row[2] * input[2];
            *channel = to_channel(contrast * mixed + brightness);
        }
        out
    })
}

/// 4-neighbour unsharp mask on interior pixels; the one-pixel border is
/// copied unchanged.
fn sharpen(image: RasterImage, sharpness: f32) -> RasterImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return image;
    }

    let scale = sharpness * 0.1;
    let source = image.into_rgba();
    let mut output = source.clone();
    let (w, h) = (width as usize, height as usize);
    let src = source.as_raw();
    let dst: &mut [u8] = &mut output;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = (y * w + x) * 4;
            let up = idx - w * 4;
            let down = idx + w * 4;
            for c in 0..3 {
                let neighbours = src[up + c] as i32
                    + src[down + c] as i32
                    + src[idx - 4 + c] as i32
                    + src[idx + 4 + c] as i32;
                let mean = neighbours / 4;
                let center = src[idx + c] as i32;
                let sharpened = center + ((center - mean) as f32 * scale) as i32;
                dst[idx + c] = sharpened.clamp(0, 255) as u8;
            }
        }
    }

    debug!(sharpness, "sharpened");
    RasterImage::from_rgba(output)
}

// -- Helpers ------------------------------------------------------------------

/// Row-major 3x3 saturation matrix. Each row sums to 1, so grey stays grey.
fn saturation_matrix(s: f32) -> [[f32; 3]; 3] {
    let inv = 1.0 - s;
    let (r, g, b) = (LUMA_R * inv, LUMA_G * inv, LUMA_B * inv);
    [[r + s, g, b], [r, g + s, b], [r, g, b + s]]
}

fn luma([r, g, b]: [u8; 3]) -> u8 {
    to_channel(LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32)
}

fn enhance_channel(value: u8, contrast: f32, brightness: f32) -> u8 {
    let enhanced = ((value as f32 - 128.0) * contrast + 128.0 + brightness) as i32;
    enhanced.clamp(0, 255) as u8
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Rewrite the RGB channels of every pixel, keeping alpha.
fn map_channels(image: RasterImage, f: impl Fn([u8; 3]) -> [u8; 3]) -> RasterImage {
    let mut pixels = image.into_rgba();
    for pixel in pixels.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let [nr, ng, nb] = f([r, g, b]);
        pixel.0[0] = nr;
        pixel.0[1] = ng;
        pixel.0[2] = nb;
    }
    RasterImage::from_rgba(pixels)
}
