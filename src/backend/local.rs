use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::{CropResult, PixelBackend};
use crate::canvas::{Document, LayerId, PixelSurface};
use crate::components::brush::{StrokeRecord, replay_stroke};
use crate::error::{EditorError, EditorResult};
use crate::geometry::PixelRect;
use crate::ops::canvas_ops;
use crate::ops::filters::{FilterParams, FilterResult, apply_filter_cpu};

/// In-process backend: a locked map of documents, each owning its layer
/// pixels. Strokes are replayed with the same dab stamping the session uses.
#[derive(Default)]
pub struct LocalBackend {
    documents: Mutex<HashMap<Uuid, Document>>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EditorResult<MutexGuard<'_, HashMap<Uuid, Document>>> {
        self.documents
            .lock()
            .map_err(|_| EditorError::BackendSync("failed to acquire document manager lock".into()))
    }

    /// Run `f` against a stored document.
    fn with_document<T>(
        &self,
        doc_id: Uuid,
        f: impl FnOnce(&mut Document) -> EditorResult<T>,
    ) -> EditorResult<T> {
        let mut docs = self.lock()?;
        let doc = docs
            .get_mut(&doc_id)
            .ok_or(EditorError::DocumentNotFound(doc_id))?;
        f(doc)
    }

    /// New document with a white background, stored and returned.
    pub fn create(&self, name: &str, width: u32, height: u32) -> EditorResult<Document> {
        let doc = Document::new(name, width, height);
        self.lock()?.insert(doc.id, doc.clone());
        log::info!("backend: created document {} ({}x{})", doc.id, width, height);
        Ok(doc)
    }

    pub fn document_ids(&self) -> EditorResult<Vec<Uuid>> {
        Ok(self.lock()?.keys().copied().collect())
    }

    /// Snapshot of a stored document.
    pub fn document(&self, doc_id: Uuid) -> EditorResult<Document> {
        self.with_document(doc_id, |doc| Ok(doc.clone()))
    }
}

impl PixelBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn register_document(&self, doc: &Document) -> EditorResult<()> {
        self.lock()?.insert(doc.id, doc.clone());
        log::debug!(
            "backend: registered document {} with {} layers",
            doc.id,
            doc.layer_count()
        );
        Ok(())
    }

    fn close_document(&self, doc_id: Uuid) -> EditorResult<()> {
        self.lock()?
            .remove(&doc_id)
            .map(|_| ())
            .ok_or(EditorError::DocumentNotFound(doc_id))
    }

    fn get_pixels(&self, doc_id: Uuid, layer_id: LayerId) -> EditorResult<Vec<u8>> {
        self.with_document(doc_id, |doc| {
            doc.get(layer_id)
                .map(|s| s.as_bytes().to_vec())
                .ok_or(EditorError::LayerNotFound(layer_id))
        })
    }

    fn set_pixels(&self, doc_id: Uuid, layer_id: LayerId, bytes: Vec<u8>) -> EditorResult<()> {
        self.with_document(doc_id, |doc| {
            let layer = doc
                .layer_mut(layer_id)
                .ok_or(EditorError::LayerNotFound(layer_id))?;
            let surface = PixelSurface::from_raw(layer.width(), layer.height(), bytes)?;
            layer.set_surface(surface);
            doc.touch();
            Ok(())
        })
    }

    fn set_layer_position(
        &self,
        doc_id: Uuid,
        layer_id: LayerId,
        x: i32,
        y: i32,
    ) -> EditorResult<()> {
        self.with_document(doc_id, |doc| {
            let layer = doc
                .layer_mut(layer_id)
                .ok_or(EditorError::LayerNotFound(layer_id))?;
            layer.x = x;
            layer.y = y;
            doc.touch();
            Ok(())
        })
    }

    fn apply_stroke(&self, doc_id: Uuid, stroke: &StrokeRecord) -> EditorResult<()> {
        self.with_document(doc_id, |doc| {
            let layer = doc
                .layer_mut(stroke.layer_id)
                .ok_or(EditorError::LayerNotFound(stroke.layer_id))?;
            if layer.locked {
                return Err(EditorError::LayerLocked(stroke.layer_id));
            }
            let offset = (layer.x, layer.y);
            replay_stroke(layer.surface_mut(), offset, stroke);
            doc.touch();
            Ok(())
        })
    }

    fn apply_filter(
        &self,
        doc_id: Uuid,
        layer_id: LayerId,
        filter: &FilterParams,
    ) -> EditorResult<FilterResult> {
        self.with_document(doc_id, |doc| {
            let surface = doc
                .get_mut(layer_id)
                .ok_or(EditorError::LayerNotFound(layer_id))?;
            let (w, h) = (surface.width(), surface.height());
            apply_filter_cpu(surface.as_bytes_mut(), w, h, filter);
            doc.touch();
            Ok(FilterResult {
                layer_id,
                success: true,
            })
        })
    }

    fn crop_document(
        &self,
        doc_id: Uuid,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> EditorResult<CropResult> {
        if width == 0 || height == 0 {
            return Err(EditorError::InvalidOperation(
                "crop dimensions must be greater than zero".into(),
            ));
        }
        self.with_document(doc_id, |doc| {
            let layers_affected =
                canvas_ops::crop_document(doc, PixelRect::new(x, y, width, height));
            Ok(CropResult {
                doc_id,
                new_width: width,
                new_height: height,
                layers_affected,
            })
        })
    }
}
