// ============================================================================
// IMAGE FILTERS: point adjustments and box blur on RGBA8 layers
// ============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{LayerId, PixelSurface};
use crate::gpu::{AcceleratorOutcome, FilterAccelerator};

/// Rec.709 luma weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterParams {
    GaussianBlur { radius: f32 },
    Brightness { value: i32 },
    Contrast { value: f32 },
    Saturation { value: f32 },
    Invert,
    Grayscale,
}

impl FilterParams {
    pub fn name(&self) -> &'static str {
        match self {
            FilterParams::GaussianBlur { .. } => "Gaussian Blur",
            FilterParams::Brightness { .. } => "Brightness",
            FilterParams::Contrast { .. } => "Contrast",
            FilterParams::Saturation { .. } => "Saturation",
            FilterParams::Invert => "Invert Colors",
            FilterParams::Grayscale => "Grayscale",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    pub layer_id: LayerId,
    pub success: bool,
}

/// Run `filter` over a surface in place. The accelerator, when given, is
/// tried first; a decline or a buffer of the wrong size falls back to the CPU.
pub fn apply_filter(
    surface: &mut PixelSurface,
    filter: &FilterParams,
    accelerator: Option<&dyn FilterAccelerator>,
) {
    let (w, h) = (surface.width(), surface.height());
    if let Some(acc) = accelerator {
        match acc.apply(surface.as_bytes(), w, h, filter) {
            AcceleratorOutcome::Applied(bytes) if bytes.len() == surface.byte_len() => {
                surface.as_bytes_mut().copy_from_slice(&bytes);
                return;
            }
            AcceleratorOutcome::Applied(bytes) => log::warn!(
                "filters: {} returned {} bytes for {}x{}, using CPU",
                acc.name(),
                bytes.len(),
                w,
                h
            ),
            AcceleratorOutcome::Declined(reason) => {
                log::debug!("filters: {} declined {}: {}", acc.name(), filter.name(), reason)
            }
        }
    }
    apply_filter_cpu(surface.as_bytes_mut(), w, h, filter);
}

/// CPU implementation over a raw RGBA8 buffer. Alpha is never touched.
pub fn apply_filter_cpu(rgba: &mut [u8], width: u32, height: u32, filter: &FilterParams) {
    match *filter {
        FilterParams::Brightness { value } => {
            let v = value as f32;
            apply_pixel_transform(rgba, width, |r, g, b| (r + v, g + v, b + v));
        }
        FilterParams::Contrast { value } => {
            let factor = (259.0 * (value + 255.0)) / (255.0 * (259.0 - value));
            let c = |v: f32| factor * (v - 128.0) + 128.0;
            apply_pixel_transform(rgba, width, |r, g, b| (c(r), c(g), c(b)));
        }
        FilterParams::Saturation { value } => {
            let factor = 1.0 + value / 100.0;
            apply_pixel_transform(rgba, width, |r, g, b| {
                let gray = luma(r, g, b);
                (
                    gray + factor * (r - gray),
                    gray + factor * (g - gray),
                    gray + factor * (b - gray),
                )
            });
        }
        FilterParams::Invert => {
            apply_pixel_transform(rgba, width, |r, g, b| (255.0 - r, 255.0 - g, 255.0 - b));
        }
        FilterParams::Grayscale => {
            apply_pixel_transform(rgba, width, |r, g, b| {
                let gray = luma(r, g, b);
                (gray, gray, gray)
            });
        }
        FilterParams::GaussianBlur { radius } => box_blur(rgba, width, height, radius),
    }
}

fn luma(r: f32, g: f32, b: f32) -> f32 {
    LUMA[0] * r + LUMA[1] * g + LUMA[2] * b
}

/// Per-pixel RGB transform, rows in parallel.
fn apply_pixel_transform<F>(rgba: &mut [u8], width: u32, transform: F)
where
    F: Fn(f32, f32, f32) -> (f32, f32, f32) + Sync,
{
    let stride = width as usize * 4;
    if stride == 0 {
        return;
    }
    rgba.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let (r, g, b) = transform(px[0] as f32, px[1] as f32, px[2] as f32);
            px[0] = r.round().clamp(0.0, 255.0) as u8;
            px[1] = g.round().clamp(0.0, 255.0) as u8;
            px[2] = b.round().clamp(0.0, 255.0) as u8;
        }
    });
}

/// Separable box blur standing in for a gaussian: horizontal pass, then
/// vertical, each averaging the in-bounds neighbours within `round(radius)`.
fn box_blur(rgba: &mut [u8], width: u32, height: u32, radius: f32) {
    let r = radius.round() as i64;
    let (w, h) = (width as usize, height as usize);
    if r <= 0 || w == 0 || h == 0 || rgba.len() != w * h * 4 {
        return;
    }
    let stride = w * 4;

    let src = rgba.to_vec();
    rgba.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src[y * stride..(y + 1) * stride];
        for x in 0..w {
            let lo = (x as i64 - r).max(0) as usize;
            let hi = (x as i64 + r).min(w as i64 - 1) as usize;
            let mut sum = [0u32; 3];
            for nx in lo..=hi {
                for c in 0..3 {
                    sum[c] += row_in[nx * 4 + c] as u32;
                }
            }
            let count = (hi - lo + 1) as u32;
            for c in 0..3 {
                row_out[x * 4 + c] = (sum[c] / count) as u8;
            }
        }
    });

    let src = rgba.to_vec();
    rgba.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let lo = (y as i64 - r).max(0) as usize;
        let hi = (y as i64 + r).min(h as i64 - 1) as usize;
        let count = (hi - lo + 1) as u32;
        for x in 0..w {
            let mut sum = [0u32; 3];
            for ny in lo..=hi {
                let i = ny * stride + x * 4;
                for c in 0..3 {
                    sum[c] += src[i + c] as u32;
                }
            }
            for c in 0..3 {
                row_out[x * 4 + c] = (sum[c] / count) as u8;
            }
        }
    });
}
