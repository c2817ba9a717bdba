use std::collections::VecDeque;
use std::time::Instant;

use crate::canvas::{Document, LayerId, PixelSurface};
use crate::components::history::{HistoryEntry, HistoryStore};
use crate::compositor::{BlendMode, blend_pixel};
use crate::error::{EditorError, EditorResult};
use crate::geometry::{PixelRect, Point, Viewport};
use crate::selection::Selection;

/// Raw points kept for smoothing.
const SMOOTHING_WINDOW: usize = 5;

/// Below the spacing threshold a new point is only recorded past this distance.
const MIN_MOVE_PX: f64 = 0.5;

// ============================================================================
// BRUSH PARAMETERS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushSettings {
    /// Diameter in document pixels.
    pub size: f64,
    /// 0..=100; share of the radius painted at full strength.
    pub hardness: f64,
    /// 0..=100
    pub opacity: f64,
    /// 0..=100
    pub flow: f64,
    /// Dab spacing as a percentage of `size`.
    pub spacing: f64,
    /// 0..=100
    pub smoothing: f64,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size: 10.0,
            hardness: 100.0,
            opacity: 100.0,
            flow: 100.0,
            spacing: 25.0,
            smoothing: 0.0,
        }
    }
}

impl BrushSettings {
    pub fn radius(&self) -> f64 {
        self.size / 2.0
    }

    pub fn stroke_alpha(&self) -> f64 {
        (self.opacity.clamp(0.0, 100.0) / 100.0) * (self.flow.clamp(0.0, 100.0) / 100.0)
    }

    pub fn spacing_px(&self) -> f64 {
        (self.size * self.spacing / 100.0).max(1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// 0..=1
    pub a: f64,
}

impl BrushColor {
    pub const BLACK: BrushColor = BrushColor {
        r: 0,
        g: 0,
        b: 0,
        a: 1.0,
    };

    pub fn from_rgba(px: [u8; 4]) -> Self {
        Self {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3] as f64 / 255.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokePoint {
    /// Document space.
    pub x: f64,
    pub y: f64,
    pub pressure: Option<f64>,
    pub elapsed_ms: u64,
}

impl StrokePoint {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Pointer input in view space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSample {
    pub position: Point,
    pub pressure: Option<f64>,
}

impl PointerSample {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Point::new(x, y),
            pressure: None,
        }
    }
}

/// Everything needed to replay a finished stroke elsewhere.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeRecord {
    pub layer_id: LayerId,
    pub points: Vec<StrokePoint>,
    pub settings: BrushSettings,
    pub color: BrushColor,
    pub eraser: bool,
    /// Selection the stroke was clipped to.
    pub selection: Selection,
}

// ============================================================================
// DAB STAMPING
// ============================================================================

/// Alpha of a dab at `dist` from its centre.
pub fn dab_alpha(dist: f64, radius: f64, inner: f64, base: f64) -> f64 {
    if dist > radius {
        return 0.0;
    }
    if dist <= inner {
        return base;
    }
    let span = radius - inner;
    if span <= 0.0 {
        return 0.0;
    }
    let falloff = 1.0 - (dist - inner) / span;
    base * falloff * falloff
}

/// Layer-space pixels a dab of `radius` at `center` can touch.
fn dab_area(center: Point, offset: (i32, i32), radius: f64) -> PixelRect {
    let cx = center.x - offset.0 as f64;
    let cy = center.y - offset.1 as f64;
    PixelRect::from_min_max(
        (cx - radius).floor() as i32,
        (cy - radius).floor() as i32,
        (cx + radius).ceil() as i32 + 1,
        (cy + radius).ceil() as i32 + 1,
    )
}

/// Stamp one dab centred at `center` (document space) onto `surface`, whose
/// top-left sits at `offset` in the document. Returns the touched area in
/// layer space, unclipped.
#[allow(clippy::too_many_arguments)]
pub fn stamp_dab(
    surface: &mut PixelSurface,
    offset: (i32, i32),
    center: Point,
    pressure: Option<f64>,
    settings: &BrushSettings,
    color: BrushColor,
    eraser: bool,
    selection: &Selection,
) -> PixelRect {
    let radius = settings.radius();
    let cx = center.x - offset.0 as f64;
    let cy = center.y - offset.1 as f64;
    let area = dab_area(center, offset, radius);
    let base = settings.stroke_alpha() * pressure.unwrap_or(1.0).clamp(0.0, 1.0);
    if radius <= 0.0 || base <= 0.0 {
        return area;
    }
    let inner = radius * settings.hardness.clamp(0.0, 100.0) / 100.0;
    let paint = area.intersect(&surface.bounds());

    for py in paint.y..paint.bottom() {
        for px in paint.x..paint.right() {
            // Falloff is measured from the pixel corner; clipping samples the centre.
            let dist = ((px as f64 - cx).powi(2) + (py as f64 - cy).powi(2)).sqrt();
            if dist > radius {
                continue;
            }
            if !selection.contains_pixel(px + offset.0, py + offset.1) {
                continue;
            }
            let alpha = dab_alpha(dist, radius, inner, base);
            if alpha <= 0.0 {
                continue;
            }
            let Some(dst) = surface.pixel(px, py) else {
                continue;
            };
            let out = if eraser {
                let a = (dst[3] as f64 * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8;
                [dst[0], dst[1], dst[2], a]
            } else {
                let a = (alpha * color.a.clamp(0.0, 1.0) * 255.0).round() as u8;
                blend_pixel(dst, [color.r, color.g, color.b, a], BlendMode::Normal, 1.0)
            };
            surface.put_pixel(px, py, out);
        }
    }
    area
}

/// Replay a whole stroke on a surface. Used by backends that keep their own copy.
pub fn replay_stroke(surface: &mut PixelSurface, offset: (i32, i32), stroke: &StrokeRecord) {
    for p in &stroke.points {
        stamp_dab(
            surface,
            offset,
            p.position(),
            p.pressure,
            &stroke.settings,
            stroke.color,
            stroke.eraser,
            &stroke.selection,
        );
    }
}

// ============================================================================
// BRUSH ENGINE
// ============================================================================

struct StrokeSession {
    layer_id: LayerId,
    layer_offset: (i32, i32),
    eraser: bool,
    settings: BrushSettings,
    color: BrushColor,
    started: Instant,
    points: Vec<StrokePoint>,
    recent: VecDeque<Point>,
    dirty: PixelRect,
    snapshot: PixelSurface,
    selection: Selection,
}

impl StrokeSession {
    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn smoothed(&mut self, raw: Point) -> Point {
        self.recent.push_back(raw);
        while self.recent.len() > SMOOTHING_WINDOW {
            self.recent.pop_front();
        }
        let level = (self.settings.smoothing / 100.0).clamp(0.0, 1.0);
        if level <= 0.0 {
            return raw;
        }
        let (mut sx, mut sy, mut wsum) = (0.0, 0.0, 0.0);
        for (i, p) in self.recent.iter().enumerate() {
            let w = (i + 1) as f64;
            sx += p.x * w;
            sy += p.y * w;
            wsum += w;
        }
        raw.lerp(Point::new(sx / wsum, sy / wsum), level)
    }

    fn stamp(&mut self, surface: &mut PixelSurface, point: StrokePoint, selection: &Selection) {
        let touched = stamp_dab(
            surface,
            self.layer_offset,
            point.position(),
            point.pressure,
            &self.settings,
            self.color,
            self.eraser,
            selection,
        );
        self.dirty = self.dirty.union(&touched);
        self.points.push(point);
    }
}

/// Turns pointer motion into dabs on the active layer.
pub struct BrushEngine {
    pub settings: BrushSettings,
    pub color: BrushColor,
    pub eraser: bool,
    session: Option<StrokeSession>,
}

impl Default for BrushEngine {
    fn default() -> Self {
        Self::new(BrushSettings::default())
    }
}

impl BrushEngine {
    pub fn new(settings: BrushSettings) -> Self {
        Self {
            settings,
            color: BrushColor::BLACK,
            eraser: false,
            session: None,
        }
    }

    pub fn is_stroking(&self) -> bool {
        self.session.is_some()
    }

    pub fn stroke_layer(&self) -> Option<LayerId> {
        self.session.as_ref().map(|s| s.layer_id)
    }

    pub fn point_count(&self) -> usize {
        self.session.as_ref().map(|s| s.points.len()).unwrap_or(0)
    }

    pub fn start_stroke(
        &mut self,
        doc: &mut Document,
        selection: &Selection,
        sample: PointerSample,
        viewport: &Viewport,
    ) -> EditorResult<()> {
        if self.session.is_some() {
            return Err(EditorError::GestureActive("brush"));
        }
        let layer = doc.editable_active_layer()?;
        let layer_id = layer.id;
        let layer_offset = (layer.x, layer.y);
        let snapshot = layer.surface().clone();

        let radius = self.settings.radius();
        let start = viewport.to_document(sample.position);
        let mut session = StrokeSession {
            layer_id,
            layer_offset,
            eraser: self.eraser,
            settings: self.settings,
            color: self.color,
            started: Instant::now(),
            points: Vec::new(),
            recent: VecDeque::with_capacity(SMOOTHING_WINDOW),
            dirty: dab_area(start, layer_offset, radius),
            snapshot,
            selection: selection.clone(),
        };
        session.recent.push_back(start);

        let surface = doc
            .get_mut(layer_id)
            .ok_or(EditorError::LayerNotFound(layer_id))?;
        let first = StrokePoint {
            x: start.x,
            y: start.y,
            pressure: sample.pressure,
            elapsed_ms: 0,
        };
        session.stamp(surface, first, selection);
        log::debug!(
            "brush: stroke started on {} at ({:.1}, {:.1})",
            layer_id,
            start.x,
            start.y
        );
        self.session = Some(session);
        Ok(())
    }

    /// Returns how many points were emitted for this sample.
    pub fn continue_stroke(
        &mut self,
        doc: &mut Document,
        selection: &Selection,
        sample: PointerSample,
        viewport: &Viewport,
    ) -> EditorResult<usize> {
        let session = self.session.as_mut().ok_or(EditorError::NoGesture)?;
        let layer_id = session.layer_id;
        let Some(surface) = doc.get_mut(layer_id) else {
            self.session = None;
            return Err(EditorError::LayerNotFound(layer_id));
        };

        let raw = viewport.to_document(sample.position);
        let target = session.smoothed(raw);
        let Some(last) = session.points.last().copied() else {
            return Ok(0);
        };
        let elapsed_ms = session.elapsed_ms();
        let spacing = session.settings.spacing_px();
        let dist = last.position().distance(target);

        let mut emitted = Vec::new();
        if dist >= spacing {
            let steps = (dist / spacing).floor() as usize;
            for i in 1..=steps {
                let t = (i as f64 * spacing) / dist;
                let p = last.position().lerp(target, t);
                let pressure = match (last.pressure, sample.pressure) {
                    (Some(a), Some(b)) => Some(a + (b - a) * t),
                    (_, p) => p,
                };
                emitted.push(StrokePoint {
                    x: p.x,
                    y: p.y,
                    pressure,
                    elapsed_ms,
                });
            }
        } else if dist > MIN_MOVE_PX {
            emitted.push(StrokePoint {
                x: target.x,
                y: target.y,
                pressure: sample.pressure,
                elapsed_ms,
            });
        }

        let count = emitted.len();
        for point in emitted {
            session.stamp(surface, point, selection);
        }
        Ok(count)
    }

    /// Commit the stroke to history. `None` when nothing was painted.
    pub fn end_stroke(
        &mut self,
        doc: &mut Document,
        history: &mut HistoryStore,
    ) -> Option<StrokeRecord> {
        let session = self.session.take()?;
        if session.points.is_empty() {
            return None;
        }
        let surface = doc.get(session.layer_id)?;
        let bounds = session.dirty.intersect(&surface.bounds());
        if bounds.is_empty() {
            log::debug!("brush: stroke left the layer, nothing to record");
            return None;
        }
        let before = session.snapshot.extract_region(bounds);
        let after = surface.extract_region(bounds);
        let name = if session.eraser {
            "Eraser"
        } else {
            "Brush Stroke"
        };
        history.push(HistoryEntry::pixels(
            name,
            session.layer_id,
            bounds,
            before,
            after,
        ));
        doc.touch();
        log::debug!(
            "brush: committed {} points over {}x{}",
            session.points.len(),
            bounds.width,
            bounds.height
        );

        Some(StrokeRecord {
            layer_id: session.layer_id,
            points: session.points,
            settings: session.settings,
            color: session.color,
            eraser: session.eraser,
            selection: session.selection,
        })
    }

    /// Drop the stroke and put back the pixels it had already stamped.
    pub fn cancel_stroke(&mut self, doc: &mut Document) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        if let Some(surface) = doc.get_mut(session.layer_id) {
            let bounds = session.dirty.intersect(&surface.bounds());
            let restore = session.snapshot.extract_region(bounds);
            if let Err(e) = surface.write_region(bounds, &restore) {
                log::warn!("brush: cancel could not restore pixels: {}", e);
            }
        }
        log::debug!("brush: stroke cancelled");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RectF;

    fn transparent_doc(w: u32, h: u32) -> Document {
        let mut doc = Document::new("t", w, h);
        doc.add_layer("Paint");
        doc
    }

    fn alpha_at(doc: &Document, x: i32, y: i32) -> u8 {
        doc.active_layer().unwrap().surface().pixel(x, y).unwrap()[3]
    }

    #[test]
    fn hard_brush_is_uniform_inside_radius() {
        let mut surface = PixelSurface::new(21, 21);
        let settings = BrushSettings {
            size: 10.0,
            hardness: 100.0,
            ..Default::default()
        };
        stamp_dab(
            &mut surface,
            (0, 0),
            Point::new(10.0, 10.0),
            None,
            &settings,
            BrushColor::BLACK,
            false,
            &Selection::none(),
        );
        for y in 0..21 {
            for x in 0..21 {
                let d = (((x - 10) * (x - 10) + (y - 10) * (y - 10)) as f64).sqrt();
                let a = surface.pixel(x, y).unwrap()[3];
                if d <= 5.0 {
                    assert_eq!(a, 255, "inside at ({x},{y})");
                } else {
                    assert_eq!(a, 0, "outside at ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn soft_brush_falls_off_from_centre() {
        let (radius, inner, base) = (10.0, 0.0, 1.0);
        let mut prev = dab_alpha(0.0, radius, inner, base);
        assert_eq!(prev, 1.0);
        for i in 1..=100 {
            let a = dab_alpha(i as f64 * 0.1, radius, inner, base);
            assert!(a < prev, "not decreasing at {}", i);
            prev = a;
        }
        assert_eq!(dab_alpha(10.5, radius, inner, base), 0.0);

        let mut surface = PixelSurface::new(21, 1);
        let settings = BrushSettings {
            size: 20.0,
            hardness: 0.0,
            ..Default::default()
        };
        stamp_dab(
            &mut surface,
            (0, 0),
            Point::new(10.0, 0.0),
            None,
            &settings,
            BrushColor::BLACK,
            false,
            &Selection::none(),
        );
        let row: Vec<u8> = (10..21).map(|x| surface.pixel(x, 0).unwrap()[3]).collect();
        assert_eq!(row[0], 255);
        assert!(row.windows(2).all(|w| w[0] >= w[1]));
        assert!(row[9] < row[1]);
    }

    #[test]
    fn eraser_scales_destination_alpha() {
        let mut surface = PixelSurface::filled(5, 5, [10, 20, 30, 200]);
        let settings = BrushSettings {
            size: 4.0,
            opacity: 50.0,
            ..Default::default()
        };
        stamp_dab(
            &mut surface,
            (0, 0),
            Point::new(2.0, 2.0),
            None,
            &settings,
            BrushColor::BLACK,
            true,
            &Selection::none(),
        );
        assert_eq!(surface.pixel(2, 2), Some([10, 20, 30, 100]));
        assert_eq!(surface.pixel(0, 4), Some([10, 20, 30, 200]));
    }

    #[test]
    fn selection_masks_dabs() {
        let mut surface = PixelSurface::new(20, 20);
        let sel = Selection::rectangle(RectF::new(0.0, 0.0, 10.0, 20.0));
        let settings = BrushSettings {
            size: 10.0,
            ..Default::default()
        };
        stamp_dab(
            &mut surface,
            (0, 0),
            Point::new(10.0, 10.0),
            None,
            &settings,
            BrushColor::BLACK,
            false,
            &sel,
        );
        assert_eq!(surface.pixel(9, 10).unwrap()[3], 255);
        assert_eq!(surface.pixel(10, 10).unwrap()[3], 0);
    }

    #[test]
    fn stroke_commits_one_entry() {
        let mut doc = transparent_doc(64, 64);
        let mut history = HistoryStore::default();
        let mut brush = BrushEngine::default();
        let vp = Viewport::default();
        let sel = Selection::none();

        brush
            .start_stroke(&mut doc, &sel, PointerSample::at(10.0, 10.0), &vp)
            .unwrap();
        assert_eq!(brush.point_count(), 1);
        // spacing = 10 * 25% = 2.5px; 20px move emits 8 points
        let emitted = brush
            .continue_stroke(&mut doc, &sel, PointerSample::at(30.0, 10.0), &vp)
            .unwrap();
        assert_eq!(emitted, 8);
        assert_eq!(alpha_at(&doc, 20, 10), 255);

        let record = brush.end_stroke(&mut doc, &mut history).unwrap();
        assert_eq!(record.points.len(), 9);
        assert_eq!(history.undo_count(), 1);
        assert!(!brush.is_stroking());

        let mut s = Selection::none();
        history.undo(&mut doc, &mut s);
        assert_eq!(alpha_at(&doc, 20, 10), 0);
    }

    #[test]
    fn tiny_moves_are_ignored() {
        let mut doc = transparent_doc(32, 32);
        let mut brush = BrushEngine::default();
        let vp = Viewport::default();
        let sel = Selection::none();
        brush
            .start_stroke(&mut doc, &sel, PointerSample::at(10.0, 10.0), &vp)
            .unwrap();
        let n = brush
            .continue_stroke(&mut doc, &sel, PointerSample::at(10.3, 10.0), &vp)
            .unwrap();
        assert_eq!(n, 0);
        let n = brush
            .continue_stroke(&mut doc, &sel, PointerSample::at(11.5, 10.0), &vp)
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn view_coordinates_are_mapped() {
        let mut doc = transparent_doc(32, 32);
        let mut brush = BrushEngine::default();
        let vp = Viewport {
            origin: Point::new(100.0, 100.0),
            zoom: 2.0,
        };
        brush
            .start_stroke(&mut doc, &Selection::none(), PointerSample::at(120.0, 120.0), &vp)
            .unwrap();
        assert_eq!(alpha_at(&doc, 10, 10), 255);
    }

    #[test]
    fn locked_layer_rejects_stroke() {
        let mut doc = transparent_doc(8, 8);
        let id = doc.active_layer_id().unwrap();
        doc.layer_mut(id).unwrap().locked = true;
        let mut brush = BrushEngine::default();
        let err = brush
            .start_stroke(
                &mut doc,
                &Selection::none(),
                PointerSample::at(1.0, 1.0),
                &Viewport::default(),
            )
            .unwrap_err();
        assert!(err.is_precondition());
        assert!(!brush.is_stroking());
    }

    #[test]
    fn cancel_restores_pixels_and_skips_history() {
        let mut doc = transparent_doc(32, 32);
        let mut history = HistoryStore::default();
        let mut brush = BrushEngine::default();
        let vp = Viewport::default();
        let sel = Selection::none();
        brush
            .start_stroke(&mut doc, &sel, PointerSample::at(10.0, 10.0), &vp)
            .unwrap();
        assert_eq!(alpha_at(&doc, 10, 10), 255);
        assert!(brush.cancel_stroke(&mut doc));
        assert_eq!(alpha_at(&doc, 10, 10), 0);
        assert!(brush.end_stroke(&mut doc, &mut history).is_none());
        assert_eq!(history.undo_count(), 0);
    }
}
