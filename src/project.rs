use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{BackgroundSync, CropResult, LocalBackend, PixelBackend, SyncNotice};
use crate::canvas::{Document, LayerId, LayerUpdate, PixelSurface};
use crate::components::brush::{BrushColor, BrushEngine, PointerSample};
use crate::components::crop::{CropEngine, CropModifiers};
use crate::components::history::{HistoryEntry, HistoryStep, HistoryStore};
use crate::components::move_tool::MoveEngine;
use crate::components::snapping::SnapTargets;
use crate::components::tools::{SelectionTool, Tool};
use crate::error::{EditorError, EditorResult};
use crate::geometry::{RectF, Viewport};
use crate::gpu::FilterAccelerator;
use crate::io;
use crate::ops::filters::{self, FilterParams, FilterResult};
use crate::selection::{AntsTicker, Selection, TickStatus};
use crate::settings::EditorSettings;

const ZOOM_STEP: f64 = 2.0;

/// Modifier keys held during a pointer event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Crop: keep the current aspect ratio.
    pub shift: bool,
    /// Crop: no snapping. Zoom: zoom out.
    pub alt: bool,
}

impl Modifiers {
    fn crop(self) -> CropModifiers {
        CropModifiers {
            lock_aspect: self.shift,
            suppress_snap: self.alt,
        }
    }
}

/// Single open document plus every piece of editing state around it.
///
/// Pointer events arrive in view space and are routed to the active tool.
/// Exactly one gesture engine is live at a time; switching tools cancels it.
/// Finished edits are mirrored to the [`PixelBackend`] in the background.
pub struct EditorSession {
    document: Document,
    selection: Selection,
    history: HistoryStore,
    tool: Tool,
    live_gesture: Option<Tool>,
    brush: BrushEngine,
    move_engine: MoveEngine,
    crop: CropEngine,
    marquee: SelectionTool,
    viewport: Viewport,
    ants: AntsTicker,
    backend: Arc<dyn PixelBackend>,
    sync: BackgroundSync,
    accelerator: Option<Arc<dyn FilterAccelerator>>,
    /// `None` for unsaved/untitled documents.
    path: Option<PathBuf>,
    is_dirty: bool,
}

impl EditorSession {
    pub fn new(document: Document, settings: &EditorSettings, backend: Arc<dyn PixelBackend>) -> Self {
        if let Err(e) = backend.register_document(&document) {
            log::warn!("session: backend {} rejected document: {}", backend.name(), e);
        }
        log::info!(
            "session: opened '{}' ({}x{}) on {} backend",
            document.name,
            document.width(),
            document.height(),
            backend.name()
        );
        Self {
            path: document.source_path.clone(),
            document,
            selection: Selection::none(),
            history: settings.history_store(),
            tool: Tool::default(),
            live_gesture: None,
            brush: BrushEngine::new(settings.brush_settings()),
            move_engine: MoveEngine::new(),
            crop: CropEngine::new(settings.crop_options()),
            marquee: SelectionTool::default(),
            viewport: Viewport::default(),
            ants: settings.ants_ticker(),
            backend,
            sync: BackgroundSync::new(),
            accelerator: None,
            is_dirty: false,
        }
    }

    /// Session over an in-process [`LocalBackend`] with default settings.
    pub fn with_local_backend(document: Document) -> Self {
        Self::new(document, &EditorSettings::default(), Arc::new(LocalBackend::new()))
    }

    pub fn open(path: &Path, settings: &EditorSettings, backend: Arc<dyn PixelBackend>) -> EditorResult<Self> {
        let document = io::load_document(path)?;
        Ok(Self::new(document, settings, backend))
    }

    pub fn save(&mut self, path: &Path) -> EditorResult<()> {
        io::save_document(&self.document, path)?;
        if io::is_project_path(path) {
            self.path = Some(path.to_path_buf());
            self.document.source_path = Some(path.to_path_buf());
            self.is_dirty = false;
        }
        Ok(())
    }

    pub fn set_accelerator(&mut self, accelerator: Option<Arc<dyn FilterAccelerator>>) {
        self.accelerator = accelerator;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn brush(&self) -> &BrushEngine {
        &self.brush
    }

    pub fn brush_mut(&mut self) -> &mut BrushEngine {
        &mut self.brush
    }

    pub fn crop(&self) -> &CropEngine {
        &self.crop
    }

    pub fn move_engine(&self) -> &MoveEngine {
        &self.move_engine
    }

    pub fn marquee_mut(&mut self) -> &mut SelectionTool {
        &mut self.marquee
    }

    pub fn backend(&self) -> &Arc<dyn PixelBackend> {
        &self.backend
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Display title (name with dirty indicator).
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.document.name)
        } else {
            self.document.name.clone()
        }
    }

    pub fn active_tool(&self) -> Tool {
        self.tool
    }

    pub fn is_gesture_live(&self) -> bool {
        self.live_gesture.is_some()
    }

    pub fn flatten(&self) -> PixelSurface {
        self.document.flatten()
    }

    fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    // ------------------------------------------------------------------
    // Tool dispatch
    // ------------------------------------------------------------------

    pub fn set_tool(&mut self, tool: Tool) {
        if tool == self.tool {
            return;
        }
        self.cancel_gesture();
        if self.tool == Tool::Crop {
            self.crop.deactivate();
        }
        if tool == Tool::Crop {
            self.crop
                .activate(self.document.width(), self.document.height());
        }
        log::debug!("session: tool {} -> {}", self.tool.name(), tool.name());
        self.tool = tool;
    }

    pub fn pointer_down(&mut self, sample: PointerSample, mods: Modifiers) -> EditorResult<()> {
        if let Some(live) = self.live_gesture {
            return absorb::<()>(Err(EditorError::GestureActive(live.name()))).map(|_| ());
        }
        let doc_pt = self.viewport.to_document(sample.position);
        let started = match self.tool {
            Tool::Brush => self
                .brush
                .start_stroke(&mut self.document, &self.selection, sample, &self.viewport),
            Tool::Move => self
                .move_engine
                .start_move(&mut self.document, &self.selection, doc_pt),
            Tool::Crop => {
                if !self.crop.is_active() {
                    self.crop
                        .activate(self.document.width(), self.document.height());
                }
                self.crop.start_crop(doc_pt, self.viewport.zoom).map(|_| ())
            }
            Tool::Selection => self.marquee.start(doc_pt),
            Tool::Zoom => {
                let factor = if mods.alt { 1.0 / ZOOM_STEP } else { ZOOM_STEP };
                self.viewport.zoom_about(sample.position, factor);
                log::debug!("session: zoom {}", self.viewport.zoom);
                return Ok(());
            }
            Tool::Eyedropper => {
                let px = self
                    .document
                    .composite_pixel(doc_pt.x.floor() as i32, doc_pt.y.floor() as i32);
                self.brush.color = BrushColor::from_rgba(px);
                log::debug!("session: picked {:?}", px);
                return Ok(());
            }
        };
        if absorb(started)?.is_some() {
            self.live_gesture = Some(self.tool);
        }
        Ok(())
    }

    pub fn pointer_move(&mut self, sample: PointerSample, mods: Modifiers) -> EditorResult<()> {
        let Some(live) = self.live_gesture else {
            return Ok(());
        };
        let doc_pt = self.viewport.to_document(sample.position);
        let res = match live {
            Tool::Brush => self
                .brush
                .continue_stroke(&mut self.document, &self.selection, sample, &self.viewport)
                .map(|_| ()),
            Tool::Move => self
                .move_engine
                .continue_move(&mut self.document, &mut self.selection, doc_pt),
            Tool::Crop => {
                let targets = self.snap_targets();
                self.crop.continue_crop(doc_pt, mods.crop(), &targets).map(|_| ())
            }
            Tool::Selection => self.marquee.update(doc_pt),
            Tool::Zoom | Tool::Eyedropper => Ok(()),
        };
        absorb(res).map(|_| ())
    }

    pub fn pointer_up(&mut self, sample: PointerSample, mods: Modifiers) -> EditorResult<()> {
        self.pointer_move(sample, mods)?;
        let Some(live) = self.live_gesture.take() else {
            return Ok(());
        };
        match live {
            Tool::Brush => {
                if let Some(stroke) = self.brush.end_stroke(&mut self.document, &mut self.history) {
                    self.move_engine.invalidate_layer(stroke.layer_id);
                    self.mark_dirty();
                    let doc_id = self.document.id;
                    let backend = Arc::clone(&self.backend);
                    self.sync.dispatch("apply_stroke", move || {
                        backend.apply_stroke(doc_id, &stroke)
                    });
                }
                Ok(())
            }
            Tool::Move => {
                let pushed = absorb(self.move_engine.end_move(
                    &mut self.document,
                    &mut self.selection,
                    &mut self.history,
                ))?;
                if pushed == Some(true)
                    && let Some(layer_id) = self.document.active_layer_id()
                {
                    self.mark_dirty();
                    self.sync_layer(layer_id);
                }
                Ok(())
            }
            Tool::Crop => {
                absorb(
                    self.crop
                        .end_crop(self.document.width(), self.document.height()),
                )?;
                Ok(())
            }
            Tool::Selection => {
                match self.marquee.finish() {
                    Ok(selection) => {
                        self.move_engine.clear_floating_selection();
                        self.selection = selection;
                        self.ants.restart();
                        log::debug!("session: selection {:?}", self.selection.bounds());
                    }
                    Err(EditorError::DegenerateGeometry(msg)) => {
                        log::debug!("session: selection discarded: {}", msg);
                    }
                    Err(e) => return absorb::<()>(Err(e)).map(|_| ()),
                }
                Ok(())
            }
            Tool::Zoom | Tool::Eyedropper => Ok(()),
        }
    }

    /// Abandon the live gesture, restoring whatever it had changed.
    pub fn cancel_gesture(&mut self) -> bool {
        let Some(live) = self.live_gesture.take() else {
            return false;
        };
        let cancelled = match live {
            Tool::Brush => self.brush.cancel_stroke(&mut self.document),
            Tool::Move => self
                .move_engine
                .cancel_move(&mut self.document, &mut self.selection),
            Tool::Crop => self.crop.cancel_drag(),
            Tool::Selection => self.marquee.cancel(),
            Tool::Zoom | Tool::Eyedropper => false,
        };
        log::debug!("session: {} gesture cancelled", live.name());
        cancelled
    }

    fn snap_targets(&self) -> SnapTargets {
        SnapTargets::new(
            self.document.width(),
            self.document.height(),
            self.selection.bounds(),
        )
    }

    // ------------------------------------------------------------------
    // Crop
    // ------------------------------------------------------------------

    /// Place the crop rectangle directly, activating the crop tool's state.
    pub fn set_crop_region(&mut self, region: RectF) -> EditorResult<()> {
        if !self.crop.is_active() {
            self.crop
                .activate(self.document.width(), self.document.height());
        }
        self.crop.set_region(region)
    }

    /// Crop every layer to the crop tool's region. History is cleared since
    /// earlier entries no longer fit the new canvas.
    pub fn commit_crop(&mut self) -> EditorResult<CropResult> {
        if self.live_gesture.is_some() {
            self.cancel_gesture();
        }
        let region = self
            .crop
            .commit_rect(self.document.width(), self.document.height())
            .ok_or_else(|| EditorError::InvalidOperation("crop tool is not active".into()))?;

        let doc_id = self.document.id;
        let backend = Arc::clone(&self.backend);
        let result = self.sync.run_ordered("crop_document", move || {
            backend.crop_document(doc_id, region.x, region.y, region.width, region.height)
        })?;

        self.selection.clear();
        crate::ops::canvas_ops::crop_document(&mut self.document, region);
        self.history.clear();
        self.move_engine.clear_floating_selection();
        self.crop.deactivate();
        if self.tool == Tool::Crop {
            self.crop
                .activate(self.document.width(), self.document.height());
        }
        self.mark_dirty();
        Ok(result)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> Option<HistoryStep> {
        self.cancel_gesture();
        let step = self.history.undo(&mut self.document, &mut self.selection)?;
        self.after_history_step(&step);
        Some(step)
    }

    pub fn redo(&mut self) -> Option<HistoryStep> {
        self.cancel_gesture();
        let step = self.history.redo(&mut self.document, &mut self.selection)?;
        self.after_history_step(&step);
        Some(step)
    }

    /// Jump to absolute timeline position `index` (entries applied).
    pub fn jump_to_history(&mut self, index: usize) -> Vec<HistoryStep> {
        self.cancel_gesture();
        let steps = self
            .history
            .jump_to(index, &mut self.document, &mut self.selection);
        for step in &steps {
            self.after_history_step(step);
        }
        steps
    }

    fn after_history_step(&mut self, step: &HistoryStep) {
        if step.selection_changed {
            self.move_engine
                .sync_floating_selection_after_undo(step.layer_id, self.selection.bounds());
            if !self.selection.is_none() {
                self.ants.restart();
            }
        } else {
            self.move_engine.invalidate_layer(step.layer_id);
        }
        self.mark_dirty();
        self.sync_layer(step.layer_id);
        log::debug!("session: history step '{}'", step.name);
    }

    /// Mirror one layer's pixels and position to the backend.
    fn sync_layer(&self, layer_id: LayerId) {
        let Some(layer) = self.document.layer(layer_id) else {
            return;
        };
        let doc_id = self.document.id;
        let bytes = layer.surface().as_bytes().to_vec();
        let (x, y) = (layer.x, layer.y);
        let backend = Arc::clone(&self.backend);
        self.sync.dispatch("set_pixels", move || {
            backend.set_pixels(doc_id, layer_id, bytes)?;
            backend.set_layer_position(doc_id, layer_id, x, y)
        });
    }

    /// Mirror the whole document after a structural change.
    fn sync_document(&self) {
        let snapshot = self.document.clone();
        let backend = Arc::clone(&self.backend);
        self.sync
            .dispatch("register_document", move || backend.register_document(&snapshot));
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Drop the selection, committing any floating block where it sits.
    pub fn deselect(&mut self) {
        self.cancel_gesture();
        self.selection.clear();
        self.move_engine.clear_floating_selection();
        self.ants.cancel();
    }

    pub fn tick_marching_ants(&mut self, dt: f32) -> TickStatus {
        self.ants.tick(dt, &self.selection)
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    /// Filter the active layer (accelerator first, CPU otherwise) as one
    /// undoable step covering the whole layer.
    pub fn apply_filter(&mut self, filter: FilterParams) -> EditorResult<FilterResult> {
        if let Some(live) = self.live_gesture {
            return Err(EditorError::GestureActive(live.name()));
        }
        let layer_id = self.document.editable_active_layer()?.id;
        let surface = self
            .document
            .get_mut(layer_id)
            .ok_or(EditorError::LayerNotFound(layer_id))?;
        let before = surface.as_bytes().to_vec();
        filters::apply_filter(surface, &filter, self.accelerator.as_deref());
        let bounds = surface.bounds();
        let after = surface.as_bytes().to_vec();

        self.history.push(HistoryEntry::pixels(
            filter.name(),
            layer_id,
            bounds,
            before,
            after,
        ));
        self.document.touch();
        self.move_engine.invalidate_layer(layer_id);
        self.mark_dirty();
        log::info!("session: {} applied to {}", filter.name(), layer_id);

        let doc_id = self.document.id;
        let backend = Arc::clone(&self.backend);
        self.sync.dispatch("apply_filter", move || {
            let res = backend.apply_filter(doc_id, layer_id, &filter)?;
            if res.success {
                Ok(())
            } else {
                Err(EditorError::BackendSync(format!("{} reported failure", filter.name())))
            }
        });
        Ok(FilterResult {
            layer_id,
            success: true,
        })
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    pub fn add_layer(&mut self, name: &str) -> LayerId {
        let id = self.document.add_layer(name);
        self.mark_dirty();
        self.sync_document();
        id
    }

    pub fn remove_layer(&mut self, id: LayerId) -> EditorResult<()> {
        self.cancel_gesture();
        self.document.remove_layer(id)?;
        self.move_engine.invalidate_layer(id);
        self.mark_dirty();
        self.sync_document();
        Ok(())
    }

    pub fn reorder_layers(&mut self, order: &[LayerId]) -> EditorResult<()> {
        self.document.reorder_layers(order)?;
        self.mark_dirty();
        self.sync_document();
        Ok(())
    }

    pub fn update_layer(&mut self, id: LayerId, update: &LayerUpdate) -> EditorResult<()> {
        self.document.update_layer(id, update)?;
        self.mark_dirty();
        self.sync_document();
        Ok(())
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> EditorResult<()> {
        self.cancel_gesture();
        self.document.set_active_layer(id)
    }

    // ------------------------------------------------------------------
    // Background sync
    // ------------------------------------------------------------------

    /// Collect finished background work. Failures are already logged.
    pub fn poll_sync(&self) -> Vec<SyncNotice> {
        self.sync.drain()
    }

    /// Block until `count` background results arrive (or `timeout`).
    pub fn wait_for_sync(&self, count: usize, timeout: std::time::Duration) -> Vec<SyncNotice> {
        self.sync.wait_for(count, timeout)
    }

    pub fn pending_sync(&self) -> usize {
        self.sync.pending()
    }
}

/// Precondition failures and degenerate gestures become logged no-ops
/// (`Ok(None)`); everything else is passed through.
fn absorb<T>(res: EditorResult<T>) -> EditorResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_precondition() || matches!(e, EditorError::DegenerateGeometry(_)) => {
            log::debug!("session: ignored: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
