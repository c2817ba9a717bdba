use std::collections::VecDeque;

use uuid::Uuid;

use crate::canvas::{Document, LayerId, now_millis};
use crate::geometry::PixelRect;
use crate::selection::Selection;

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;

// ============================================================================
// HISTORY ENTRY
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct SelectionDelta {
    pub before: Selection,
    pub after: Selection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionDelta {
    pub before: (i32, i32),
    pub after: (i32, i32),
}

/// One undoable edit: a region-bounded before/after pair on a single layer,
/// plus optional non-pixel state that changed with it.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    id: Uuid,
    name: String,
    layer_id: LayerId,
    timestamp: u64,
    bounds: PixelRect,
    before: Vec<u8>,
    after: Vec<u8>,
    selection: Option<SelectionDelta>,
    position: Option<PositionDelta>,
}

impl HistoryEntry {
    /// `before` and `after` are packed buffers for `bounds` in layer space.
    pub fn pixels(
        name: impl Into<String>,
        layer_id: LayerId,
        bounds: PixelRect,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(before.len(), bounds.area() * 4);
        debug_assert_eq!(after.len(), bounds.area() * 4);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            layer_id,
            timestamp: now_millis(),
            bounds,
            before,
            after,
            selection: None,
            position: None,
        }
    }

    /// Layer offset change with no pixel data.
    pub fn position(
        name: impl Into<String>,
        layer_id: LayerId,
        before: (i32, i32),
        after: (i32, i32),
    ) -> Self {
        let mut entry = Self::pixels(name, layer_id, PixelRect::EMPTY, Vec::new(), Vec::new());
        entry.position = Some(PositionDelta { before, after });
        entry
    }

    pub fn with_selection(mut self, before: Selection, after: Selection) -> Self {
        self.selection = Some(SelectionDelta { before, after });
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    pub fn before(&self) -> &[u8] {
        &self.before
    }

    pub fn after(&self) -> &[u8] {
        &self.after
    }

    pub fn selection_delta(&self) -> Option<&SelectionDelta> {
        self.selection.as_ref()
    }

    pub fn position_delta(&self) -> Option<PositionDelta> {
        self.position
    }

    pub fn memory_size(&self) -> usize {
        let outline = self
            .selection
            .as_ref()
            .map(|s| (s.before.points().len() + s.after.points().len()) * 16)
            .unwrap_or(0);
        self.before.len() + self.after.len() + outline + std::mem::size_of::<Self>()
    }

    fn apply(&self, doc: &mut Document, selection: &mut Selection, forward: bool) -> bool {
        let Some(layer) = doc.layer_mut(self.layer_id) else {
            return false;
        };
        let pixels = if forward { &self.after } else { &self.before };
        if !pixels.is_empty()
            && let Err(e) = layer.surface_mut().write_region(self.bounds, pixels)
        {
            log::warn!("history: could not restore '{}': {}", self.name, e);
            return false;
        }
        if let Some(p) = self.position {
            let (x, y) = if forward { p.after } else { p.before };
            layer.x = x;
            layer.y = y;
        }
        if let Some(s) = &self.selection {
            *selection = if forward {
                s.after.clone()
            } else {
                s.before.clone()
            };
        }
        doc.touch();
        true
    }
}

/// What an undo or redo step touched.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryStep {
    pub name: String,
    pub layer_id: LayerId,
    pub selection_changed: bool,
}

impl HistoryStep {
    fn of(entry: &HistoryEntry) -> Self {
        Self {
            name: entry.name.clone(),
            layer_id: entry.layer_id,
            selection_changed: entry.selection.is_some(),
        }
    }
}

// ============================================================================
// HISTORY STORE
// ============================================================================

pub struct HistoryStore {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
    max_bytes: usize,
    /// Running memory total across both stacks.
    total_bytes: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES)
    }
}

impl HistoryStore {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
            max_bytes,
            total_bytes: 0,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        // A new edit forks the timeline
        for e in self.redo_stack.drain(..) {
            self.total_bytes = self.total_bytes.saturating_sub(e.memory_size());
        }

        self.total_bytes += entry.memory_size();
        log::debug!(
            "history: push '{}' ({} bytes, {} total)",
            entry.name,
            entry.memory_size(),
            self.total_bytes
        );
        self.undo_stack.push_back(entry);
        self.prune();
    }

    /// Oldest entries go first; the newest entry always survives.
    fn prune(&mut self) {
        while self.undo_stack.len() > 1
            && (self.undo_stack.len() > self.max_entries || self.total_bytes > self.max_bytes)
        {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(removed.memory_size());
                log::debug!("history: evicted '{}'", removed.name);
            }
        }
    }

    pub fn undo(&mut self, doc: &mut Document, selection: &mut Selection) -> Option<HistoryStep> {
        let entry = self.undo_stack.back()?;
        if !entry.apply(doc, selection, false) {
            return None;
        }
        let entry = self.undo_stack.pop_back()?;
        let step = HistoryStep::of(&entry);
        self.redo_stack.push(entry);
        Some(step)
    }

    pub fn redo(&mut self, doc: &mut Document, selection: &mut Selection) -> Option<HistoryStep> {
        let entry = self.redo_stack.last()?;
        if !entry.apply(doc, selection, true) {
            return None;
        }
        let entry = self.redo_stack.pop()?;
        let step = HistoryStep::of(&entry);
        self.undo_stack.push_back(entry);
        Some(step)
    }

    /// Move to absolute timeline position `index` (number of applied entries).
    /// Returns the steps taken, in order; stops early if a step fails.
    pub fn jump_to(
        &mut self,
        index: usize,
        doc: &mut Document,
        selection: &mut Selection,
    ) -> Vec<HistoryStep> {
        let target = index.min(self.timeline_len());
        let mut steps = Vec::new();
        while self.position() > target {
            match self.undo(doc, selection) {
                Some(step) => steps.push(step),
                None => break,
            }
        }
        while self.position() < target {
            match self.redo(doc, selection) {
                Some(step) => steps.push(step),
                None => break,
            }
        }
        steps
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_bytes = 0;
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Current position in the combined timeline.
    pub fn position(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn timeline_len(&self) -> usize {
        self.undo_stack.len() + self.redo_stack.len()
    }

    /// Entry names oldest first; the first `position()` are applied.
    pub fn timeline(&self) -> Vec<String> {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter().rev())
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.name.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.name.as_str())
    }

    /// O(1) via the cached total.
    pub fn memory_usage(&self) -> usize {
        self.total_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn undo_entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo_stack.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RectF;

    fn doc_with_layer() -> (Document, LayerId) {
        let doc = Document::new("t", 8, 8);
        let id = doc.active_layer_id().unwrap();
        (doc, id)
    }

    /// Paint `rect` with `px` and record it.
    fn paint(doc: &mut Document, id: LayerId, rect: PixelRect, px: u8) -> HistoryEntry {
        let surface = doc.get_mut(id).unwrap();
        let before = surface.extract_region(rect);
        let after = vec![px; rect.area() * 4];
        surface.write_region(rect, &after).unwrap();
        HistoryEntry::pixels("Paint", id, rect, before, after)
    }

    #[test]
    fn undo_redo_round_trip() {
        let (mut doc, id) = doc_with_layer();
        let mut sel = Selection::none();
        let mut history = HistoryStore::default();
        let rect = PixelRect::new(2, 2, 3, 3);
        let pristine = doc.get(id).unwrap().extract_region(rect);
        let entry = paint(&mut doc, id, rect, 42);
        let edited = doc.get(id).unwrap().extract_region(rect);
        history.push(entry);

        assert!(history.undo(&mut doc, &mut sel).is_some());
        assert_eq!(doc.get(id).unwrap().extract_region(rect), pristine);
        assert!(history.redo(&mut doc, &mut sel).is_some());
        assert_eq!(doc.get(id).unwrap().extract_region(rect), edited);
        assert!(history.undo(&mut doc, &mut sel).is_some());
        assert_eq!(doc.get(id).unwrap().extract_region(rect), pristine);
    }

    #[test]
    fn empty_stacks_fail() {
        let (mut doc, _) = doc_with_layer();
        let mut sel = Selection::none();
        let mut history = HistoryStore::default();
        assert!(history.undo(&mut doc, &mut sel).is_none());
        assert!(history.redo(&mut doc, &mut sel).is_none());
    }

    #[test]
    fn missing_layer_leaves_stack_intact() {
        let (mut doc, id) = doc_with_layer();
        let mut sel = Selection::none();
        let mut history = HistoryStore::default();
        let other = doc.add_layer("Other");
        let entry = paint(&mut doc, other, PixelRect::new(0, 0, 1, 1), 1);
        history.push(entry);
        doc.set_active_layer(id).unwrap();
        doc.remove_layer(other).unwrap();
        assert!(history.undo(&mut doc, &mut sel).is_none());
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn push_clears_redo_and_its_bytes() {
        let (mut doc, id) = doc_with_layer();
        let mut sel = Selection::none();
        let mut history = HistoryStore::default();
        history.push(paint(&mut doc, id, PixelRect::new(0, 0, 2, 2), 1));
        history.push(paint(&mut doc, id, PixelRect::new(0, 0, 4, 4), 2));
        history.undo(&mut doc, &mut sel);
        assert_eq!(history.redo_count(), 1);
        let third = paint(&mut doc, id, PixelRect::new(0, 0, 1, 1), 3);
        let expected = history.undo_entries().map(|e| e.memory_size()).sum::<usize>()
            + third.memory_size();
        history.push(third);
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.memory_usage(), expected);
    }

    #[test]
    fn count_cap_evicts_oldest() {
        let (mut doc, id) = doc_with_layer();
        let mut history = HistoryStore::new(3, usize::MAX);
        for i in 0..5u8 {
            let mut e = paint(&mut doc, id, PixelRect::new(0, 0, 1, 1), i);
            e.name = format!("edit {i}");
            history.push(e);
        }
        assert_eq!(history.timeline(), vec!["edit 2", "edit 3", "edit 4"]);
    }

    #[test]
    fn byte_budget_evicts_oldest_in_order() {
        let (mut doc, id) = doc_with_layer();
        let rect = PixelRect::new(0, 0, 8, 8);
        let one = paint(&mut doc, id, rect, 0).memory_size();
        let budget = one * 3 + one / 2;
        let mut history = HistoryStore::new(100, budget);
        for i in 0..6u8 {
            let mut e = paint(&mut doc, id, rect, i);
            e.name = format!("edit {i}");
            history.push(e);
            assert!(history.memory_usage() <= budget);
        }
        assert_eq!(history.timeline(), vec!["edit 3", "edit 4", "edit 5"]);
    }

    #[test]
    fn jump_to_walks_timeline() {
        let (mut doc, id) = doc_with_layer();
        let mut sel = Selection::none();
        let mut history = HistoryStore::default();
        let rect = PixelRect::new(0, 0, 1, 1);
        for i in 1..=4u8 {
            history.push(paint(&mut doc, id, rect, i * 10));
        }
        let steps = history.jump_to(1, &mut doc, &mut sel);
        assert_eq!(steps.len(), 3);
        assert_eq!(doc.get(id).unwrap().pixel(0, 0), Some([10; 4]));
        history.jump_to(3, &mut doc, &mut sel);
        assert_eq!(doc.get(id).unwrap().pixel(0, 0), Some([30; 4]));
        history.jump_to(99, &mut doc, &mut sel);
        assert_eq!(history.position(), 4);
        history.jump_to(0, &mut doc, &mut sel);
        assert_eq!(doc.get(id).unwrap().pixel(0, 0), Some([255; 4]));
    }

    #[test]
    fn position_and_selection_deltas() {
        let (mut doc, id) = doc_with_layer();
        let mut sel = Selection::none();
        let mut history = HistoryStore::default();
        let before_sel = Selection::rectangle(RectF::new(0.0, 0.0, 2.0, 2.0));
        let after_sel = before_sel.translated(3.0, 0.0);
        doc.layer_mut(id).unwrap().x = 5;
        history.push(
            HistoryEntry::position("Move Layer", id, (0, 0), (5, 0))
                .with_selection(before_sel.clone(), after_sel.clone()),
        );
        let step = history.undo(&mut doc, &mut sel).unwrap();
        assert!(step.selection_changed);
        assert_eq!(doc.layer(id).unwrap().x, 0);
        assert_eq!(sel, before_sel);
        history.redo(&mut doc, &mut sel);
        assert_eq!(doc.layer(id).unwrap().x, 5);
        assert_eq!(sel, after_sel);
    }

    #[test]
    fn clear_resets_accounting() {
        let (mut doc, id) = doc_with_layer();
        let mut history = HistoryStore::default();
        history.push(paint(&mut doc, id, PixelRect::new(0, 0, 2, 2), 1));
        history.clear();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.memory_usage(), 0);
    }
}
