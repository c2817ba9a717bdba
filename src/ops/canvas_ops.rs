// ============================================================================
// CANVAS-LEVEL OPERATIONS: physical crop of every layer
// ============================================================================

use crate::canvas::{Document, LayerId, PixelSurface};
use crate::geometry::PixelRect;

/// Resample one layer into a `region`-sized surface. `layer_offset` is the
/// layer's document-space origin; sources outside the layer become transparent.
pub fn crop_layer_pixels(
    surface: &PixelSurface,
    layer_offset: (i32, i32),
    region: PixelRect,
) -> PixelSurface {
    let src_rect = PixelRect::new(
        region.x - layer_offset.0,
        region.y - layer_offset.1,
        region.width,
        region.height,
    );
    let bytes = surface.extract_region(src_rect);
    PixelSurface::from_raw(region.width, region.height, bytes)
        .unwrap_or_else(|_| PixelSurface::new(region.width, region.height))
}

/// Crop (or expand) every layer of `doc` to `region`, reset layer offsets
/// and resize the document. Returns the ids of the layers that were rewritten.
pub fn crop_document(doc: &mut Document, region: PixelRect) -> Vec<LayerId> {
    let mut affected = Vec::with_capacity(doc.layer_count());
    for layer in doc.layers_mut() {
        let cropped = crop_layer_pixels(layer.surface(), (layer.x, layer.y), region);
        layer.set_surface(cropped);
        layer.x = 0;
        layer.y = 0;
        affected.push(layer.id);
    }
    doc.set_dimensions(region.width, region.height);
    log::info!(
        "crop: document {} now {}x{} (from origin {}, {})",
        doc.id,
        region.width,
        region.height,
        region.x,
        region.y
    );
    affected
}
