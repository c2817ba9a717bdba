use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compositor::{self, BlendMode};
use crate::error::{EditorError, EditorResult};
use crate::geometry::PixelRect;

pub type LayerId = Uuid;

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// PIXEL SURFACE
// ============================================================================

/// Straight-alpha RGBA8 buffer, row-major. `data.len() == width * height * 4`
/// holds for every surface the crate hands out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelSurface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn filled(width: u32, height: u32, px: [u8; 4]) -> Self {
        let mut s = Self::new(width, height);
        s.fill(px);
        s
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> EditorResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(EditorError::invalid_buffer(format!(
                "{}x{} surface needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            data: img.as_raw().clone(),
        }
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        self.index(x, y).map(|i| {
            [
                self.data[i],
                self.data[i + 1],
                self.data[i + 2],
                self.data[i + 3],
            ]
        })
    }

    /// Out-of-bounds writes are dropped. Returns whether the pixel was written.
    pub fn put_pixel(&mut self, x: i32, y: i32, px: [u8; 4]) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.data[i..i + 4].copy_from_slice(&px);
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, px: [u8; 4]) {
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Copy of `rect` as a tightly packed buffer. Pixels outside the surface
    /// read as transparent.
    pub fn extract_region(&self, rect: PixelRect) -> Vec<u8> {
        let mut out = vec![0u8; rect.area() * 4];
        let clipped = rect.intersect(&self.bounds());
        if clipped.is_empty() {
            return out;
        }
        let row_bytes = clipped.width as usize * 4;
        for y in clipped.y..clipped.bottom() {
            let src = (y as usize * self.width as usize + clipped.x as usize) * 4;
            let dst = ((y - rect.y) as usize * rect.width as usize + (clipped.x - rect.x) as usize)
                * 4;
            out[dst..dst + row_bytes].copy_from_slice(&self.data[src..src + row_bytes]);
        }
        out
    }

    /// Write a packed `rect`-sized buffer back; the part outside the surface
    /// is skipped.
    pub fn write_region(&mut self, rect: PixelRect, bytes: &[u8]) -> EditorResult<()> {
        if bytes.len() != rect.area() * 4 {
            return Err(EditorError::invalid_buffer(format!(
                "region {}x{} needs {} bytes, got {}",
                rect.width,
                rect.height,
                rect.area() * 4,
                bytes.len()
            )));
        }
        let clipped = rect.intersect(&self.bounds());
        if clipped.is_empty() {
            return Ok(());
        }
        let row_bytes = clipped.width as usize * 4;
        for y in clipped.y..clipped.bottom() {
            let dst = (y as usize * self.width as usize + clipped.x as usize) * 4;
            let src = ((y - rect.y) as usize * rect.width as usize + (clipped.x - rect.x) as usize)
                * 4;
            self.data[dst..dst + row_bytes].copy_from_slice(&bytes[src..src + row_bytes]);
        }
        Ok(())
    }

    /// Swap in a whole new buffer of the same dimensions.
    pub fn replace(&mut self, bytes: Vec<u8>) -> EditorResult<()> {
        if bytes.len() != self.data.len() {
            return Err(EditorError::invalid_buffer(format!(
                "expected {} bytes, got {}",
                self.data.len(),
                bytes.len()
            )));
        }
        self.data = bytes;
        Ok(())
    }

    pub fn copy_from(&mut self, other: &PixelSurface) {
        if other.width == self.width && other.height == self.height {
            self.data.copy_from_slice(&other.data);
        }
    }
}

// ============================================================================
// LAYERS
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    #[default]
    Raster,
    Adjustment,
    Text,
    Group,
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub visible: bool,
    pub locked: bool,
    /// 0..=100
    pub opacity: u8,
    pub blend_mode: BlendMode,
    pub x: i32,
    pub y: i32,
    surface: PixelSurface,
}

impl Layer {
    pub fn new_raster(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self::with_surface(name, PixelSurface::new(width, height))
    }

    pub fn with_surface(name: impl Into<String>, surface: PixelSurface) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: LayerKind::Raster,
            visible: true,
            locked: false,
            opacity: 100,
            blend_mode: BlendMode::Normal,
            x: 0,
            y: 0,
            surface,
        }
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut PixelSurface {
        &mut self.surface
    }

    /// Replace the pixels; the layer's width/height follow the new surface.
    pub fn set_surface(&mut self, surface: PixelSurface) {
        self.surface = surface;
    }

    pub fn opacity_factor(&self) -> f32 {
        self.opacity.min(100) as f32 / 100.0
    }

    pub fn apply_update(&mut self, update: &LayerUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(visible) = update.visible {
            self.visible = visible;
        }
        if let Some(locked) = update.locked {
            self.locked = locked;
        }
        if let Some(opacity) = update.opacity {
            self.opacity = opacity.min(100);
        }
        if let Some(mode) = update.blend_mode {
            self.blend_mode = mode;
        }
    }
}

/// Partial property edit; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct LayerUpdate {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
    pub opacity: Option<u8>,
    pub blend_mode: Option<BlendMode>,
}

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Clone, Debug)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    width: u32,
    height: u32,
    pub resolution: f32,
    /// Bottom to top.
    layers: Vec<Layer>,
    active_layer: Option<LayerId>,
    pub created_at: u64,
    pub modified_at: u64,
    pub source_path: Option<PathBuf>,
}

impl Document {
    /// New document with an opaque white background layer.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        let background =
            Layer::with_surface("Background", PixelSurface::filled(width, height, [255; 4]));
        Self::from_layers(Uuid::new_v4(), name, width, height, vec![background])
    }

    /// Assemble a document from existing layers; the top layer becomes active.
    pub fn from_layers(
        id: Uuid,
        name: impl Into<String>,
        width: u32,
        height: u32,
        layers: Vec<Layer>,
    ) -> Self {
        let now = now_millis();
        let active_layer = layers.last().map(|l| l.id);
        Self {
            id,
            name: name.into(),
            width,
            height,
            resolution: 72.0,
            layers,
            active_layer,
            created_at: now,
            modified_at: now,
            source_path: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    pub(crate) fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.modified_at = now_millis();
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn active_layer_id(&self) -> Option<LayerId> {
        self.active_layer
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active_layer.and_then(|id| self.layer(id))
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> EditorResult<()> {
        if self.layer(id).is_none() {
            return Err(EditorError::LayerNotFound(id));
        }
        self.active_layer = Some(id);
        Ok(())
    }

    /// Active layer that is present and unlocked, for engines about to mutate it.
    pub fn editable_active_layer(&self) -> EditorResult<&Layer> {
        let id = self.active_layer.ok_or(EditorError::NoActiveLayer)?;
        let layer = self.layer(id).ok_or(EditorError::LayerNotFound(id))?;
        if layer.locked {
            return Err(EditorError::LayerLocked(id));
        }
        Ok(layer)
    }

    pub fn get(&self, id: LayerId) -> Option<&PixelSurface> {
        self.layer(id).map(|l| l.surface())
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut PixelSurface> {
        self.layer_mut(id).map(|l| l.surface_mut())
    }

    /// Write `bytes` into `region` of the layer's surface (layer space).
    pub fn set(&mut self, id: LayerId, region: PixelRect, bytes: &[u8]) -> EditorResult<()> {
        let surface = self.get_mut(id).ok_or(EditorError::LayerNotFound(id))?;
        surface.write_region(region, bytes)?;
        self.touch();
        Ok(())
    }

    /// New transparent document-sized layer directly above the active one.
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let layer = Layer::new_raster(name, self.width, self.height);
        self.insert_layer(layer)
    }

    pub fn insert_layer(&mut self, layer: Layer) -> LayerId {
        let id = layer.id;
        let at = self
            .active_layer
            .and_then(|a| self.layer_index(a))
            .map(|i| i + 1)
            .unwrap_or(self.layers.len());
        self.layers.insert(at, layer);
        self.active_layer = Some(id);
        self.touch();
        id
    }

    pub fn remove_layer(&mut self, id: LayerId) -> EditorResult<Layer> {
        let index = self.layer_index(id).ok_or(EditorError::LayerNotFound(id))?;
        if self.layers.len() == 1 {
            return Err(EditorError::InvalidOperation(
                "cannot remove the last layer".into(),
            ));
        }
        let removed = self.layers.remove(index);
        if self.active_layer == Some(id) {
            let next = index.min(self.layers.len() - 1);
            self.active_layer = self.layers.get(next).map(|l| l.id);
        }
        self.touch();
        Ok(removed)
    }

    /// Reorder to `order` (bottom to top), which must name every layer once.
    pub fn reorder_layers(&mut self, order: &[LayerId]) -> EditorResult<()> {
        if order.len() != self.layers.len() {
            return Err(EditorError::InvalidOperation(format!(
                "reorder needs {} layer ids, got {}",
                self.layers.len(),
                order.len()
            )));
        }
        let mut seen = HashSet::with_capacity(order.len());
        for id in order {
            if self.layer(*id).is_none() || !seen.insert(*id) {
                return Err(EditorError::LayerNotFound(*id));
            }
        }
        let mut remaining = std::mem::take(&mut self.layers);
        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            if let Some(i) = remaining.iter().position(|l| l.id == *id) {
                reordered.push(remaining.swap_remove(i));
            }
        }
        self.layers = reordered;
        self.touch();
        Ok(())
    }

    pub fn update_layer(&mut self, id: LayerId, update: &LayerUpdate) -> EditorResult<()> {
        let layer = self.layer_mut(id).ok_or(EditorError::LayerNotFound(id))?;
        layer.apply_update(update);
        self.touch();
        Ok(())
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn flatten(&self) -> PixelSurface {
        compositor::composite(self.width, self.height, &self.layers)
    }

    pub fn composite_pixel(&self, x: i32, y: i32) -> [u8; 4] {
        if !self.bounds().contains(x, y) {
            return [0; 4];
        }
        compositor::composite_pixel(&self.layers, x, y)
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.surface().byte_len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(PixelSurface::from_raw(2, 2, vec![0; 15]).is_err());
        assert!(PixelSurface::from_raw(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn out_of_bounds_writes_are_dropped() {
        let mut s = PixelSurface::new(2, 2);
        assert!(!s.put_pixel(-1, 0, [1, 2, 3, 4]));
        assert!(!s.put_pixel(2, 0, [1, 2, 3, 4]));
        assert!(s.put_pixel(1, 1, [1, 2, 3, 4]));
        assert_eq!(s.byte_len(), 16);
        assert_eq!(s.pixel(1, 1), Some([1, 2, 3, 4]));
    }

    #[test]
    fn region_extract_zero_fills_outside() {
        let s = PixelSurface::filled(2, 2, [9, 9, 9, 9]);
        let bytes = s.extract_region(PixelRect::new(1, 1, 2, 2));
        assert_eq!(&bytes[0..4], &[9, 9, 9, 9]);
        assert!(bytes[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn region_write_clips() {
        let mut s = PixelSurface::new(3, 3);
        let patch = vec![7u8; 2 * 2 * 4];
        s.write_region(PixelRect::new(2, 2, 2, 2), &patch).unwrap();
        assert_eq!(s.pixel(2, 2), Some([7, 7, 7, 7]));
        assert_eq!(s.pixel(1, 1), Some([0, 0, 0, 0]));
        assert!(s.write_region(PixelRect::new(0, 0, 2, 2), &[0; 3]).is_err());
    }

    #[test]
    fn new_document_has_white_background() {
        let doc = Document::new("Untitled", 8, 6);
        assert_eq!(doc.layer_count(), 1);
        let bg = doc.active_layer().unwrap();
        assert_eq!(bg.name, "Background");
        assert_eq!(bg.surface().pixel(7, 5), Some([255, 255, 255, 255]));
    }

    #[test]
    fn layer_management() {
        let mut doc = Document::new("Doc", 4, 4);
        let bg = doc.active_layer_id().unwrap();
        let a = doc.add_layer("A");
        let b = doc.add_layer("B");
        assert_eq!(doc.active_layer_id(), Some(b));
        assert_eq!(
            doc.layers().iter().map(|l| l.id).collect::<Vec<_>>(),
            vec![bg, a, b]
        );

        doc.reorder_layers(&[b, bg, a]).unwrap();
        assert_eq!(doc.layers()[0].id, b);
        assert!(doc.reorder_layers(&[a, b]).is_err());
        assert!(doc.reorder_layers(&[a, b, Uuid::new_v4()]).is_err());
        assert_eq!(doc.layer_count(), 3);

        doc.update_layer(
            a,
            &LayerUpdate {
                opacity: Some(250),
                locked: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(doc.layer(a).unwrap().opacity, 100);
        assert!(doc.layer(a).unwrap().locked);

        doc.remove_layer(b).unwrap();
        doc.remove_layer(a).unwrap();
        assert!(doc.remove_layer(bg).is_err());
        assert_eq!(doc.active_layer_id(), Some(bg));
    }

    #[test]
    fn editable_active_layer_rejects_locked() {
        let mut doc = Document::new("Doc", 2, 2);
        let id = doc.active_layer_id().unwrap();
        doc.layer_mut(id).unwrap().locked = true;
        assert!(matches!(
            doc.editable_active_layer(),
            Err(EditorError::LayerLocked(_))
        ));
    }
}
