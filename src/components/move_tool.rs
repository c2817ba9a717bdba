use std::collections::HashMap;

use crate::canvas::{Document, LayerId, PixelSurface};
use crate::components::history::{HistoryEntry, HistoryStore};
use crate::error::{EditorError, EditorResult};
use crate::geometry::{PixelRect, Point, RectF};
use crate::selection::Selection;

// ============================================================================
// FLOATING SELECTION
// ============================================================================

/// Pixels lifted out of a layer by the first move of a selection. Lives until
/// the selection is dropped, history walks back past its creation, or another
/// edit touches the layer.
#[derive(Clone, Debug)]
pub struct FloatingSelection {
    layer_id: LayerId,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Source layer with the block cleared.
    background: PixelSurface,
    /// Top-left of the block in layer space at extraction.
    origin: (i32, i32),
    /// Selection bounds (document space) at extraction.
    source_bounds: RectF,
    offset: (i32, i32),
}

impl FloatingSelection {
    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    pub fn background(&self) -> &PixelSurface {
        &self.background
    }

    fn current_origin(&self) -> (i32, i32) {
        (self.origin.0 + self.offset.0, self.origin.1 + self.offset.1)
    }

    /// Straight overwrite of the non-transparent block pixels at `at`.
    fn paste(&self, surface: &mut PixelSurface, at: (i32, i32)) {
        let w = self.width as usize;
        for by in 0..self.height as i32 {
            for bx in 0..self.width as i32 {
                let i = (by as usize * w + bx as usize) * 4;
                let px = [
                    self.pixels[i],
                    self.pixels[i + 1],
                    self.pixels[i + 2],
                    self.pixels[i + 3],
                ];
                if px[3] == 0 {
                    continue;
                }
                surface.put_pixel(at.0 + bx, at.1 + by, px);
            }
        }
    }

    fn offset_for(&self, bounds: &RectF) -> (i32, i32) {
        (
            (bounds.x - self.source_bounds.x).round() as i32,
            (bounds.y - self.source_bounds.y).round() as i32,
        )
    }
}

/// Cut the selected pixels out of `surface` (layer at `layer_offset`).
fn extract(
    surface: &mut PixelSurface,
    layer_id: LayerId,
    layer_offset: (i32, i32),
    selection: &Selection,
    bounds: RectF,
) -> Option<FloatingSelection> {
    let block = bounds
        .translated(-layer_offset.0 as f64, -layer_offset.1 as f64)
        .to_pixel_rect()
        .intersect(&surface.bounds());
    if block.is_empty() {
        return None;
    }

    let mut pixels = vec![0u8; block.area() * 4];
    for y in block.y..block.bottom() {
        for x in block.x..block.right() {
            if !selection.contains_pixel(x + layer_offset.0, y + layer_offset.1) {
                continue;
            }
            let Some(px) = surface.pixel(x, y) else {
                continue;
            };
            let i = ((y - block.y) as usize * block.width as usize + (x - block.x) as usize) * 4;
            pixels[i..i + 4].copy_from_slice(&px);
            surface.put_pixel(x, y, [0; 4]);
        }
    }

    Some(FloatingSelection {
        layer_id,
        pixels,
        width: block.width,
        height: block.height,
        background: surface.clone(),
        origin: (block.x, block.y),
        source_bounds: bounds,
        offset: (0, 0),
    })
}

// ============================================================================
// MOVE ENGINE
// ============================================================================

enum MoveGesture {
    Selection {
        layer_id: LayerId,
        start: Point,
        before: PixelSurface,
        selection_before: Selection,
        paste_origin: (i32, i32),
        /// The floating selection was extracted by this gesture.
        created: bool,
        delta: (i32, i32),
    },
    Layer {
        layer_id: LayerId,
        start: Point,
        origin: (i32, i32),
    },
}

#[derive(Default)]
pub struct MoveEngine {
    gesture: Option<MoveGesture>,
    floating: HashMap<LayerId, FloatingSelection>,
}

fn rounded_delta(start: Point, now: Point) -> (i32, i32) {
    (
        (now.x - start.x).round() as i32,
        (now.y - start.y).round() as i32,
    )
}

impl MoveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_moving(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn floating(&self, layer_id: LayerId) -> Option<&FloatingSelection> {
        self.floating.get(&layer_id)
    }

    pub fn floating_offset(&self, layer_id: LayerId) -> Option<(i32, i32)> {
        self.floating.get(&layer_id).map(|f| f.offset)
    }

    pub fn has_floating(&self) -> bool {
        !self.floating.is_empty()
    }

    /// `point` is in document space.
    pub fn start_move(
        &mut self,
        doc: &mut Document,
        selection: &Selection,
        point: Point,
    ) -> EditorResult<()> {
        if self.gesture.is_some() {
            return Err(EditorError::GestureActive("move"));
        }
        let layer = doc.editable_active_layer()?;
        let layer_id = layer.id;
        let layer_offset = (layer.x, layer.y);

        let Some(bounds) = selection.bounds() else {
            self.gesture = Some(MoveGesture::Layer {
                layer_id,
                start: point,
                origin: layer_offset,
            });
            log::debug!("move: layer {} from {:?}", layer_id, layer_offset);
            return Ok(());
        };

        let surface = doc
            .get_mut(layer_id)
            .ok_or(EditorError::LayerNotFound(layer_id))?;
        let before = surface.clone();

        let (paste_origin, created) = match self.floating.get(&layer_id) {
            Some(f) => (f.current_origin(), false),
            None => {
                let floating = extract(surface, layer_id, layer_offset, selection, bounds)
                    .ok_or_else(|| {
                        EditorError::DegenerateGeometry(
                            "selection does not overlap the layer".into(),
                        )
                    })?;
                let at = floating.origin;
                log::debug!(
                    "move: extracted {}x{} block at {:?}",
                    floating.width,
                    floating.height,
                    at
                );
                self.floating.insert(layer_id, floating);
                (at, true)
            }
        };

        self.gesture = Some(MoveGesture::Selection {
            layer_id,
            start: point,
            before,
            selection_before: selection.clone(),
            paste_origin,
            created,
            delta: (0, 0),
        });
        Ok(())
    }

    pub fn continue_move(
        &mut self,
        doc: &mut Document,
        selection: &mut Selection,
        point: Point,
    ) -> EditorResult<()> {
        match self.gesture.as_mut().ok_or(EditorError::NoGesture)? {
            MoveGesture::Selection {
                layer_id,
                start,
                selection_before,
                paste_origin,
                delta,
                ..
            } => {
                let d = rounded_delta(*start, point);
                if d == *delta {
                    return Ok(());
                }
                let floating = self
                    .floating
                    .get(layer_id)
                    .ok_or(EditorError::NoGesture)?;
                let surface = doc
                    .get_mut(*layer_id)
                    .ok_or(EditorError::LayerNotFound(*layer_id))?;
                surface.copy_from(&floating.background);
                floating.paste(surface, (paste_origin.0 + d.0, paste_origin.1 + d.1));
                *selection = selection_before.translated(d.0 as f64, d.1 as f64);
                *delta = d;
            }
            MoveGesture::Layer {
                layer_id,
                start,
                origin,
            } => {
                let d = rounded_delta(*start, point);
                let layer = doc
                    .layer_mut(*layer_id)
                    .ok_or(EditorError::LayerNotFound(*layer_id))?;
                layer.x = origin.0 + d.0;
                layer.y = origin.1 + d.1;
            }
        }
        Ok(())
    }

    /// Finish the gesture. Returns whether a history entry was pushed.
    pub fn end_move(
        &mut self,
        doc: &mut Document,
        selection: &mut Selection,
        history: &mut HistoryStore,
    ) -> EditorResult<bool> {
        let gesture = self.gesture.take().ok_or(EditorError::NoGesture)?;
        match gesture {
            MoveGesture::Selection {
                layer_id,
                before,
                selection_before,
                created,
                delta,
                ..
            } => {
                let surface = doc
                    .get_mut(layer_id)
                    .ok_or(EditorError::LayerNotFound(layer_id))?;
                if delta == (0, 0) {
                    // Net zero: put the layer back exactly as it was
                    surface.copy_from(&before);
                    *selection = selection_before;
                    if created {
                        self.floating.remove(&layer_id);
                    }
                    return Ok(false);
                }

                if let (Some(f), Some(b)) = (self.floating.get_mut(&layer_id), selection.bounds())
                {
                    f.offset = f.offset_for(&b);
                    log::debug!("move: floating offset now {:?}", f.offset);
                }
                let after = surface.as_bytes().to_vec();
                let bounds = surface.bounds();
                history.push(
                    HistoryEntry::pixels(
                        "Move Selection",
                        layer_id,
                        bounds,
                        before.into_bytes(),
                        after,
                    )
                    .with_selection(selection_before, selection.clone()),
                );
                doc.touch();
                Ok(true)
            }
            MoveGesture::Layer {
                layer_id, origin, ..
            } => {
                let layer = doc
                    .layer(layer_id)
                    .ok_or(EditorError::LayerNotFound(layer_id))?;
                let now = (layer.x, layer.y);
                if now == origin {
                    return Ok(false);
                }
                history.push(HistoryEntry::position("Move Layer", layer_id, origin, now));
                doc.touch();
                Ok(true)
            }
        }
    }

    /// Abandon the gesture, restoring pixels, selection and offset. No history.
    pub fn cancel_move(&mut self, doc: &mut Document, selection: &mut Selection) -> bool {
        let Some(gesture) = self.gesture.take() else {
            return false;
        };
        match gesture {
            MoveGesture::Selection {
                layer_id,
                before,
                selection_before,
                created,
                ..
            } => {
                if let Some(surface) = doc.get_mut(layer_id) {
                    surface.copy_from(&before);
                }
                *selection = selection_before;
                if created {
                    self.floating.remove(&layer_id);
                }
            }
            MoveGesture::Layer {
                layer_id, origin, ..
            } => {
                if let Some(layer) = doc.layer_mut(layer_id) {
                    layer.x = origin.0;
                    layer.y = origin.1;
                }
            }
        }
        log::debug!("move: cancelled");
        true
    }

    /// Re-align the floating selection after history restored `restored`
    /// selection bounds on `layer_id`.
    pub fn sync_floating_selection_after_undo(
        &mut self,
        layer_id: LayerId,
        restored: Option<RectF>,
    ) {
        let Some(f) = self.floating.get_mut(&layer_id) else {
            return;
        };
        match restored {
            None => {
                self.floating.remove(&layer_id);
                log::debug!("move: selection gone, floating dropped");
            }
            Some(b) => {
                let offset = f.offset_for(&b);
                if offset == (0, 0) {
                    // Back at the extraction point: the layer is pristine again
                    self.floating.remove(&layer_id);
                    log::debug!("move: back to extraction origin, floating dropped");
                } else {
                    f.offset = offset;
                }
            }
        }
    }

    /// Commit every floating block where it currently sits.
    pub fn clear_floating_selection(&mut self) {
        if !self.floating.is_empty() {
            log::debug!("move: committing {} floating selection(s)", self.floating.len());
        }
        self.floating.clear();
    }

    /// Forget the floating block of one layer after an unrelated edit changed it.
    pub fn invalidate_layer(&mut self, layer_id: LayerId) {
        self.floating.remove(&layer_id);
    }

    /// Block-aligned area the floating selection of `layer_id` covers now.
    pub fn floating_rect(&self, layer_id: LayerId) -> Option<PixelRect> {
        self.floating.get(&layer_id).map(|f| {
            let (x, y) = f.current_origin();
            PixelRect::new(x, y, f.width, f.height)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];

    /// 40x40 transparent layer with a red 5x5 block at (10, 10).
    fn setup() -> (Document, LayerId, Selection) {
        let mut doc = Document::new("t", 40, 40);
        let id = doc.add_layer("Art");
        let block = vec![255u8, 0, 0, 255].repeat(25);
        doc.set(id, PixelRect::new(10, 10, 5, 5), &block).unwrap();
        let sel = Selection::rectangle(RectF::new(10.0, 10.0, 5.0, 5.0));
        (doc, id, sel)
    }

    fn drag(
        engine: &mut MoveEngine,
        doc: &mut Document,
        sel: &mut Selection,
        history: &mut HistoryStore,
        from: (f64, f64),
        to: (f64, f64),
    ) {
        engine.start_move(doc, sel, Point::new(from.0, from.1)).unwrap();
        engine
            .continue_move(doc, sel, Point::new(to.0, to.1))
            .unwrap();
        engine.end_move(doc, sel, history).unwrap();
    }

    fn px(doc: &Document, id: LayerId, x: i32, y: i32) -> [u8; 4] {
        doc.get(id).unwrap().pixel(x, y).unwrap()
    }

    #[test]
    fn repeated_moves_compose_offsets() {
        let (mut doc, id, mut sel) = setup();
        let mut history = HistoryStore::default();
        let mut engine = MoveEngine::new();

        drag(&mut engine, &mut doc, &mut sel, &mut history, (12.0, 12.0), (17.0, 17.0));
        assert_eq!(engine.floating_offset(id), Some((5, 5)));
        drag(&mut engine, &mut doc, &mut sel, &mut history, (20.0, 20.0), (23.0, 18.0));
        assert_eq!(engine.floating_offset(id), Some((8, 3)));

        assert_eq!(sel.bounds(), Some(RectF::new(18.0, 13.0, 5.0, 5.0)));
        assert_eq!(px(&doc, id, 18, 13), RED);
        assert_eq!(px(&doc, id, 22, 17), RED);
        // source area was cleared
        assert_eq!(px(&doc, id, 10, 10), [0; 4]);
        assert_eq!(history.undo_count(), 2);
    }

    #[test]
    fn undo_resyncs_floating_selection() {
        let (mut doc, id, mut sel) = setup();
        let mut history = HistoryStore::default();
        let mut engine = MoveEngine::new();
        drag(&mut engine, &mut doc, &mut sel, &mut history, (12.0, 12.0), (17.0, 17.0));
        drag(&mut engine, &mut doc, &mut sel, &mut history, (20.0, 20.0), (23.0, 18.0));

        history.undo(&mut doc, &mut sel).unwrap();
        engine.sync_floating_selection_after_undo(id, sel.bounds());
        assert_eq!(engine.floating_offset(id), Some((5, 5)));
        assert_eq!(px(&doc, id, 15, 15), RED);

        // next move composes from the restored offset
        drag(&mut engine, &mut doc, &mut sel, &mut history, (0.0, 0.0), (1.0, 0.0));
        assert_eq!(engine.floating_offset(id), Some((6, 5)));

        history.undo(&mut doc, &mut sel).unwrap();
        engine.sync_floating_selection_after_undo(id, sel.bounds());
        history.undo(&mut doc, &mut sel).unwrap();
        engine.sync_floating_selection_after_undo(id, sel.bounds());
        assert!(engine.floating(id).is_none());
        assert_eq!(px(&doc, id, 10, 10), RED);
        assert_eq!(px(&doc, id, 15, 15), [0; 4]);
    }

    #[test]
    fn cancel_restores_everything() {
        let (mut doc, id, mut sel) = setup();
        let original = doc.get(id).unwrap().clone();
        let original_sel = sel.clone();
        let mut engine = MoveEngine::new();
        engine.start_move(&mut doc, &sel, Point::new(12.0, 12.0)).unwrap();
        engine
            .continue_move(&mut doc, &mut sel, Point::new(20.0, 14.0))
            .unwrap();
        assert!(engine.cancel_move(&mut doc, &mut sel));
        assert_eq!(doc.get(id).unwrap(), &original);
        assert_eq!(sel, original_sel);
        assert!(engine.floating(id).is_none());
    }

    #[test]
    fn click_without_drag_changes_nothing() {
        let (mut doc, id, mut sel) = setup();
        let original = doc.get(id).unwrap().clone();
        let mut history = HistoryStore::default();
        let mut engine = MoveEngine::new();
        engine.start_move(&mut doc, &sel, Point::new(12.0, 12.0)).unwrap();
        assert!(!engine.end_move(&mut doc, &mut sel, &mut history).unwrap());
        assert_eq!(doc.get(id).unwrap(), &original);
        assert_eq!(history.undo_count(), 0);
    }

    #[test]
    fn ellipse_extraction_leaves_corners() {
        let (mut doc, id, _) = setup();
        let mut sel = Selection::ellipse(RectF::new(10.0, 10.0, 5.0, 5.0));
        let mut history = HistoryStore::default();
        let mut engine = MoveEngine::new();
        drag(&mut engine, &mut doc, &mut sel, &mut history, (12.0, 12.0), (32.0, 12.0));
        // corner pixel was outside the ellipse, so it stayed behind
        assert_eq!(px(&doc, id, 10, 10), RED);
        assert_eq!(px(&doc, id, 12, 12), [0; 4]);
        assert_eq!(px(&doc, id, 32, 12), RED);
        assert_eq!(px(&doc, id, 30, 10), [0; 4]);
    }

    #[test]
    fn layer_move_records_position_only() {
        let (mut doc, id, _) = setup();
        let mut sel = Selection::none();
        let mut history = HistoryStore::default();
        let mut engine = MoveEngine::new();
        drag(&mut engine, &mut doc, &mut sel, &mut history, (0.0, 0.0), (4.4, -2.6));
        assert_eq!((doc.layer(id).unwrap().x, doc.layer(id).unwrap().y), (4, -3));
        let entry = history.undo_entries().last().unwrap();
        assert!(entry.before().is_empty() && entry.after().is_empty());

        // no net motion, no entry
        drag(&mut engine, &mut doc, &mut sel, &mut history, (0.0, 0.0), (0.2, 0.2));
        assert_eq!(history.undo_count(), 1);
        history.undo(&mut doc, &mut sel).unwrap();
        assert_eq!(doc.layer(id).unwrap().x, 0);
    }

    #[test]
    fn locked_layer_cannot_move() {
        let (mut doc, id, sel) = setup();
        doc.layer_mut(id).unwrap().locked = true;
        let mut engine = MoveEngine::new();
        let err = engine
            .start_move(&mut doc, &sel, Point::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, EditorError::LayerLocked(_)));
    }

    #[test]
    fn deselect_commits_pixels() {
        let (mut doc, id, mut sel) = setup();
        let mut history = HistoryStore::default();
        let mut engine = MoveEngine::new();
        drag(&mut engine, &mut doc, &mut sel, &mut history, (0.0, 0.0), (3.0, 0.0));
        engine.clear_floating_selection();
        assert!(!engine.has_floating());
        assert_eq!(px(&doc, id, 13, 10), RED);
    }
}
