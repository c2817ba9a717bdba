use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{Layer, PixelSurface};

// ============================================================================
// BLEND MODES
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::Color,
            BlendMode::Luminosity,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }

    /// Stable numeric tag; the position in `all()`.
    pub fn to_u8(&self) -> u8 {
        Self::all()
            .iter()
            .position(|m| m == self)
            .map(|i| i as u8)
            .unwrap_or(0)
    }

    /// Unknown tags decode as `Normal`.
    pub fn from_u8(v: u8) -> BlendMode {
        Self::all()
            .get(v as usize)
            .copied()
            .unwrap_or(BlendMode::Normal)
    }

    /// Modes that mix channels together instead of channel-by-channel.
    pub fn is_non_separable(&self) -> bool {
        matches!(
            self,
            BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity
        )
    }
}

// ============================================================================
// PIXEL BLENDING
// ============================================================================

/// Blend `top` over `base` with the given mode and layer opacity (0..=1).
pub fn blend_pixel(base: [u8; 4], top: [u8; 4], mode: BlendMode, opacity: f32) -> [u8; 4] {
    // Fast path: nothing contributed
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }

    // Fast path: opaque normal paint replaces the destination
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let d = [
        base[0] as f32 / 255.0,
        base[1] as f32 / 255.0,
        base[2] as f32 / 255.0,
    ];
    let base_a = base[3] as f32 / 255.0;
    let s = [
        top[0] as f32 / 255.0,
        top[1] as f32 / 255.0,
        top[2] as f32 / 255.0,
    ];
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let blended = blend_rgb(s, d, mode);

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (blended[c] * top_a + d[c] * base_a * (1.0 - top_a)) / out_a;
        out[c] = to_byte(v);
    }
    out[3] = to_byte(out_a);
    out
}

fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blended colour for source `s` over destination `d`, channels in 0..=1.
pub fn blend_rgb(s: [f32; 3], d: [f32; 3], mode: BlendMode) -> [f32; 3] {
    match mode {
        BlendMode::Hue => set_lum(set_sat(s, sat(d)), lum(d)),
        BlendMode::Saturation => set_lum(set_sat(d, sat(s)), lum(d)),
        BlendMode::Color => set_lum(s, lum(d)),
        BlendMode::Luminosity => set_lum(d, lum(s)),
        separable => [
            blend_channel(s[0], d[0], separable),
            blend_channel(s[1], d[1], separable),
            blend_channel(s[2], d[2], separable),
        ],
    }
}

fn blend_channel(s: f32, d: f32, mode: BlendMode) -> f32 {
    match mode {
        BlendMode::Normal => s,
        BlendMode::Multiply => s * d,
        BlendMode::Screen => 1.0 - (1.0 - s) * (1.0 - d),
        BlendMode::Overlay => hard_light_channel(d, s),
        BlendMode::Darken => s.min(d),
        BlendMode::Lighten => s.max(d),
        BlendMode::ColorDodge => color_dodge_channel(s, d),
        BlendMode::ColorBurn => color_burn_channel(s, d),
        BlendMode::HardLight => hard_light_channel(s, d),
        BlendMode::SoftLight => soft_light_channel(s, d),
        BlendMode::Difference => (s - d).abs(),
        BlendMode::Exclusion => s + d - 2.0 * s * d,
        BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity => s,
    }
}

/// Hard light of `d` by `s`: multiply below mid-grey, screen above.
fn hard_light_channel(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        2.0 * s * d
    } else {
        1.0 - 2.0 * (1.0 - s) * (1.0 - d)
    }
}

fn color_dodge_channel(s: f32, d: f32) -> f32 {
    if d <= 0.0 {
        0.0
    } else if s >= 1.0 {
        1.0
    } else {
        (d / (1.0 - s)).min(1.0)
    }
}

fn color_burn_channel(s: f32, d: f32) -> f32 {
    if d >= 1.0 {
        1.0
    } else if s <= 0.0 {
        0.0
    } else {
        1.0 - ((1.0 - d) / s).min(1.0)
    }
}

/// W3C soft light.
fn soft_light_channel(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        d - (1.0 - 2.0 * s) * d * (1.0 - d)
    } else {
        let dd = if d <= 0.25 {
            ((16.0 * d - 12.0) * d + 4.0) * d
        } else {
            d.sqrt()
        };
        d + (2.0 * s - 1.0) * (dd - d)
    }
}

// Non-separable helpers (W3C compositing spec, section 10.2)

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 && l - n > f32::EPSILON {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 && x - l > f32::EPSILON {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| c[a].total_cmp(&c[b]));
    let (lo, mid, hi) = (idx[0], idx[1], idx[2]);
    let mut out = [0.0f32; 3];
    if c[hi] > c[lo] {
        out[mid] = (c[mid] - c[lo]) * s / (c[hi] - c[lo]);
        out[hi] = s;
    }
    out
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Flatten `layers` (index 0 at the bottom) into a `width` x `height` surface.
/// Invisible and empty layers are skipped; each layer sits at its (x, y) offset.
pub fn composite(width: u32, height: u32, layers: &[Layer]) -> PixelSurface {
    let mut out = PixelSurface::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }
    let visible: Vec<&Layer> = layers
        .iter()
        .filter(|l| l.visible && !l.surface().is_empty())
        .collect();
    if visible.is_empty() {
        return out;
    }

    let row_len = width as usize * 4;
    out.as_bytes_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for layer in &visible {
                composite_row(row, y, width, layer);
            }
        });
    out
}

fn composite_row(row: &mut [u8], doc_y: i32, doc_width: u32, layer: &Layer) {
    let surface = layer.surface();
    let ly = doc_y - layer.y;
    if ly < 0 || ly >= surface.height() as i32 {
        return;
    }
    // Horizontal overlap of the layer with the document row
    let x0 = layer.x.max(0);
    let x1 = (layer.x + surface.width() as i32).min(doc_width as i32);
    if x0 >= x1 {
        return;
    }
    let opacity = layer.opacity_factor();
    let src = surface.as_bytes();
    let src_row = ly as usize * surface.width() as usize * 4;
    for x in x0..x1 {
        let lx = (x - layer.x) as usize;
        let si = src_row + lx * 4;
        let di = x as usize * 4;
        let top = [src[si], src[si + 1], src[si + 2], src[si + 3]];
        let base = [row[di], row[di + 1], row[di + 2], row[di + 3]];
        let px = blend_pixel(base, top, layer.blend_mode, opacity);
        row[di..di + 4].copy_from_slice(&px);
    }
}

/// Composite colour of a single document pixel. Out of range reads transparent.
pub fn composite_pixel(layers: &[Layer], x: i32, y: i32) -> [u8; 4] {
    let mut px = [0u8; 4];
    for layer in layers.iter().filter(|l| l.visible) {
        if let Some(top) = layer.surface().pixel(x - layer.x, y - layer.y) {
            px = blend_pixel(px, top, layer.blend_mode, layer.opacity_factor());
        }
    }
    px
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Layer;

    fn close(a: [u8; 4], b: [u8; 4]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| x.abs_diff(*y) <= 1)
    }

    #[test]
    fn half_opacity_blue_over_red_is_purple() {
        let mut red = Layer::new_raster("Red", 4, 4);
        red.surface_mut().fill([255, 0, 0, 255]);
        let mut blue = Layer::new_raster("Blue", 4, 4);
        blue.surface_mut().fill([0, 0, 255, 255]);
        blue.opacity = 50;

        let out = composite(4, 4, &[red, blue]);
        let px = out.pixel(2, 2).unwrap();
        assert!(close(px, [128, 0, 128, 255]), "got {:?}", px);
    }

    #[test]
    fn invisible_layers_are_skipped() {
        let mut bottom = Layer::new_raster("Bottom", 2, 2);
        bottom.surface_mut().fill([10, 20, 30, 255]);
        let mut top = Layer::new_raster("Top", 2, 2);
        top.surface_mut().fill([200, 200, 200, 255]);
        top.visible = false;
        let out = composite(2, 2, &[bottom, top]);
        assert_eq!(out.pixel(0, 0), Some([10, 20, 30, 255]));
    }

    #[test]
    fn layer_offset_places_pixels() {
        let mut layer = Layer::new_raster("Dot", 1, 1);
        layer.surface_mut().fill([255, 255, 255, 255]);
        layer.x = 2;
        layer.y = 1;
        let out = composite(4, 4, &[layer]);
        assert_eq!(out.pixel(2, 1), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn transparent_over_transparent_stays_black() {
        let px = blend_pixel([0, 0, 0, 0], [50, 60, 70, 0], BlendMode::Screen, 1.0);
        assert_eq!(px, [0, 0, 0, 0]);
    }

    #[test]
    fn separable_formulas() {
        let s = [0.5, 0.25, 1.0];
        let d = [0.5, 0.5, 0.0];
        assert_eq!(blend_rgb(s, d, BlendMode::Multiply), [0.25, 0.125, 0.0]);
        assert_eq!(blend_rgb(s, d, BlendMode::Difference), [0.0, 0.25, 1.0]);
        assert_eq!(blend_rgb(s, d, BlendMode::Exclusion), [0.5, 0.5, 1.0]);
        assert_eq!(blend_rgb(s, d, BlendMode::Darken), [0.5, 0.25, 0.0]);
        // dodge: d == 0 -> 0 even with s == 1
        assert_eq!(blend_rgb(s, d, BlendMode::ColorDodge)[2], 0.0);
        // burn: s == 1, d == 0 -> 1 - min(1, 1) = 0
        assert_eq!(blend_rgb(s, d, BlendMode::ColorBurn)[2], 0.0);
        assert_eq!(color_burn_channel(0.0, 1.0), 1.0);
        assert_eq!(color_dodge_channel(1.0, 0.3), 1.0);
    }

    #[test]
    fn overlay_is_hard_light_with_swapped_inputs() {
        for &(s, d) in &[(0.2f32, 0.7f32), (0.8, 0.3), (0.5, 0.5), (0.1, 0.1)] {
            let o = blend_channel(s, d, BlendMode::Overlay);
            let h = blend_channel(d, s, BlendMode::HardLight);
            assert!((o - h).abs() < 1e-6);
        }
    }

    #[test]
    fn soft_light_neutral_at_half() {
        for &d in &[0.0f32, 0.2, 0.6, 1.0] {
            assert!((soft_light_channel(0.5, d) - d).abs() < 1e-6);
        }
    }

    #[test]
    fn luminosity_keeps_destination_hue() {
        let grey = [0.5, 0.5, 0.5];
        let red = [1.0, 0.0, 0.0];
        let out = blend_rgb(grey, red, BlendMode::Luminosity);
        assert!((lum(out) - 0.5).abs() < 1e-4);
        assert!(out[0] > out[1] && out[0] > out[2]);
        // hue/colour of a grey source onto red gives grey
        let out = blend_rgb(grey, red, BlendMode::Color);
        assert!((out[0] - out[1]).abs() < 1e-6 && (out[1] - out[2]).abs() < 1e-6);
    }

    #[test]
    fn blend_mode_tags_round_trip() {
        for mode in BlendMode::all() {
            assert_eq!(BlendMode::from_u8(mode.to_u8()), *mode);
        }
        assert_eq!(BlendMode::all().len(), 16);
        assert_eq!(BlendMode::from_u8(200), BlendMode::Normal);
    }
}
