// ============================================================================
// PIXEL BACKEND: persistence collaborator that mirrors session edits
// ============================================================================
//
//   local.rs: in-process document manager (default backend)
//   sync.rs:  fire-and-forget dispatch of backend calls onto rayon
// ============================================================================

pub mod local;
pub mod sync;

pub use local::LocalBackend;
pub use sync::{BackgroundSync, SyncNotice};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{Document, LayerId};
use crate::components::brush::StrokeRecord;
use crate::error::EditorResult;
use crate::ops::filters::{FilterParams, FilterResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropResult {
    pub doc_id: Uuid,
    pub new_width: u32,
    pub new_height: u32,
    pub layers_affected: Vec<LayerId>,
}

/// Keeps its own copy of every document the session edits. Stroke and
/// filter failures are reported but never undo local state; a crop failure
/// aborts the crop.
pub trait PixelBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Store (or replace) the full state of `doc`.
    fn register_document(&self, doc: &Document) -> EditorResult<()>;

    fn close_document(&self, doc_id: Uuid) -> EditorResult<()>;

    fn get_pixels(&self, doc_id: Uuid, layer_id: LayerId) -> EditorResult<Vec<u8>>;

    /// Replace a layer's whole buffer.
    fn set_pixels(&self, doc_id: Uuid, layer_id: LayerId, bytes: Vec<u8>) -> EditorResult<()>;

    fn set_layer_position(&self, doc_id: Uuid, layer_id: LayerId, x: i32, y: i32)
    -> EditorResult<()>;

    fn apply_stroke(&self, doc_id: Uuid, stroke: &StrokeRecord) -> EditorResult<()>;

    fn apply_filter(
        &self,
        doc_id: Uuid,
        layer_id: LayerId,
        filter: &FilterParams,
    ) -> EditorResult<FilterResult>;

    fn crop_document(
        &self,
        doc_id: Uuid,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> EditorResult<CropResult>;
}
