use crate::components::snapping::{SnapTargets, snap_span, snap_value};
use crate::error::{EditorError, EditorResult};
use crate::geometry::{PixelRect, Point, RectF};

/// Device-pixel hit radius of a crop handle at zoom 1.
pub const DEFAULT_HANDLE_RADIUS: f64 = 12.0;
pub const DEFAULT_SNAP_THRESHOLD: f64 = 8.0;
const MIN_SIZE: f64 = 1.0;

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropHandle {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    Top,
    Right,
    Bottom,
    Left,
}

impl CropHandle {
    /// Hit-test order; corners win over edges where they overlap.
    pub const PRIORITY: [CropHandle; 8] = [
        CropHandle::TopLeft,
        CropHandle::TopRight,
        CropHandle::BottomRight,
        CropHandle::BottomLeft,
        CropHandle::Top,
        CropHandle::Right,
        CropHandle::Bottom,
        CropHandle::Left,
    ];

    pub fn position(&self, r: &RectF) -> Point {
        let c = r.center();
        match self {
            CropHandle::TopLeft => Point::new(r.x, r.y),
            CropHandle::TopRight => Point::new(r.right(), r.y),
            CropHandle::BottomRight => Point::new(r.right(), r.bottom()),
            CropHandle::BottomLeft => Point::new(r.x, r.bottom()),
            CropHandle::Top => Point::new(c.x, r.y),
            CropHandle::Right => Point::new(r.right(), c.y),
            CropHandle::Bottom => Point::new(c.x, r.bottom()),
            CropHandle::Left => Point::new(r.x, c.y),
        }
    }

    pub fn is_corner(&self) -> bool {
        matches!(
            self,
            CropHandle::TopLeft
                | CropHandle::TopRight
                | CropHandle::BottomRight
                | CropHandle::BottomLeft
        )
    }

    fn moves_left(&self) -> bool {
        matches!(
            self,
            CropHandle::TopLeft | CropHandle::BottomLeft | CropHandle::Left
        )
    }

    fn moves_right(&self) -> bool {
        matches!(
            self,
            CropHandle::TopRight | CropHandle::BottomRight | CropHandle::Right
        )
    }

    fn moves_top(&self) -> bool {
        matches!(
            self,
            CropHandle::TopLeft | CropHandle::TopRight | CropHandle::Top
        )
    }

    fn moves_bottom(&self) -> bool {
        matches!(
            self,
            CropHandle::BottomLeft | CropHandle::BottomRight | CropHandle::Bottom
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AspectRatio {
    Free,
    /// width / height
    Fixed(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropOptions {
    pub aspect: AspectRatio,
    pub snap_enabled: bool,
    /// Document pixels.
    pub snap_threshold: f64,
    /// Device pixels.
    pub handle_radius: f64,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            aspect: AspectRatio::Free,
            snap_enabled: true,
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
            handle_radius: DEFAULT_HANDLE_RADIUS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropModifiers {
    /// Keep the ratio captured at drag start (free mode only).
    pub lock_aspect: bool,
    pub suppress_snap: bool,
}

// ============================================================================
// CROP ENGINE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CropDragKind {
    Draw,
    Move,
    Resize(CropHandle),
}

#[derive(Clone, Copy, Debug)]
struct CropDrag {
    kind: CropDragKind,
    start: Point,
    start_region: RectF,
    captured_ratio: f64,
}

#[derive(Clone, Copy, Debug)]
enum CropState {
    Inactive,
    Active {
        region: RectF,
        drag: Option<CropDrag>,
    },
}

pub struct CropEngine {
    state: CropState,
    pub options: CropOptions,
}

impl Default for CropEngine {
    fn default() -> Self {
        Self::new(CropOptions::default())
    }
}

impl CropEngine {
    pub fn new(options: CropOptions) -> Self {
        Self {
            state: CropState::Inactive,
            options,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CropState::Active { .. })
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, CropState::Active { drag: Some(_), .. })
    }

    pub fn region(&self) -> Option<RectF> {
        match self.state {
            CropState::Active { region, .. } => Some(region),
            CropState::Inactive => None,
        }
    }

    pub fn drag_kind(&self) -> Option<CropDragKind> {
        match self.state {
            CropState::Active { drag: Some(d), .. } => Some(d.kind),
            _ => None,
        }
    }

    pub fn activate(&mut self, doc_width: u32, doc_height: u32) {
        self.state = CropState::Active {
            region: full_document(doc_width, doc_height),
            drag: None,
        };
    }

    pub fn deactivate(&mut self) {
        self.state = CropState::Inactive;
    }

    pub fn set_region(&mut self, region: RectF) -> EditorResult<()> {
        match &mut self.state {
            CropState::Active { region: r, .. } => {
                *r = region;
                Ok(())
            }
            CropState::Inactive => Err(EditorError::InvalidOperation(
                "crop tool is not active".into(),
            )),
        }
    }

    /// Handle under `point` at the given zoom.
    pub fn hit_handle(&self, point: Point, zoom: f64) -> Option<CropHandle> {
        let region = self.region()?.normalized();
        let radius = self.options.handle_radius / if zoom > 0.0 { zoom } else { 1.0 };
        CropHandle::PRIORITY
            .into_iter()
            .find(|h| h.position(&region).distance(point) <= radius)
    }

    /// `point` in document space.
    pub fn start_crop(&mut self, point: Point, zoom: f64) -> EditorResult<CropDragKind> {
        let handle = self.hit_handle(point, zoom);
        let CropState::Active { region, drag } = &mut self.state else {
            return Err(EditorError::InvalidOperation(
                "crop tool is not active".into(),
            ));
        };
        if drag.is_some() {
            return Err(EditorError::GestureActive("crop"));
        }
        let current = region.normalized();
        let kind = match handle {
            Some(h) => CropDragKind::Resize(h),
            None if current.contains(point) => CropDragKind::Move,
            None => CropDragKind::Draw,
        };
        let captured_ratio = match kind {
            CropDragKind::Draw => 1.0,
            _ if current.height > 0.0 && current.width > 0.0 => current.width / current.height,
            _ => 1.0,
        };
        if kind == CropDragKind::Draw {
            *region = RectF::new(point.x, point.y, 0.0, 0.0);
        } else {
            *region = current;
        }
        *drag = Some(CropDrag {
            kind,
            start: point,
            start_region: *region,
            captured_ratio,
        });
        log::debug!("crop: {:?} from ({:.1}, {:.1})", kind, point.x, point.y);
        Ok(kind)
    }

    pub fn continue_crop(
        &mut self,
        point: Point,
        modifiers: CropModifiers,
        targets: &SnapTargets,
    ) -> EditorResult<RectF> {
        let options = self.options;
        let CropState::Active {
            region,
            drag: Some(drag),
        } = &mut self.state
        else {
            return Err(EditorError::NoGesture);
        };

        let ratio = match options.aspect {
            AspectRatio::Fixed(r) if r > 0.0 => Some(r),
            AspectRatio::Fixed(_) => None,
            AspectRatio::Free if modifiers.lock_aspect => Some(drag.captured_ratio),
            AspectRatio::Free => None,
        };
        let snap = options.snap_enabled && !modifiers.suppress_snap;
        let threshold = options.snap_threshold;

        let snap_to = snap.then_some((targets, threshold));
        *region = match drag.kind {
            CropDragKind::Draw => draw_region(drag.start, point, ratio, snap_to),
            CropDragKind::Move => {
                let mut r = drag
                    .start_region
                    .translated(point.x - drag.start.x, point.y - drag.start.y);
                if snap {
                    let sx = snap_span(&[r.x, r.center().x, r.right()], &targets.xs, threshold);
                    let sy = snap_span(&[r.y, r.center().y, r.bottom()], &targets.ys, threshold);
                    r = r.translated(sx, sy);
                }
                r
            }
            CropDragKind::Resize(handle) => resize_region(
                drag.start_region,
                handle,
                point.x - drag.start.x,
                point.y - drag.start.y,
                ratio,
                snap_to,
            ),
        };
        Ok(*region)
    }

    /// Finish the drag. Negative extents are normalized; a degenerate result
    /// falls back to the whole document.
    pub fn end_crop(&mut self, doc_width: u32, doc_height: u32) -> EditorResult<RectF> {
        let CropState::Active { region, drag } = &mut self.state else {
            return Err(EditorError::NoGesture);
        };
        *drag = None;
        let r = region.normalized();
        *region = if r.width < MIN_SIZE || r.height < MIN_SIZE {
            log::debug!("crop: degenerate region, using full document");
            full_document(doc_width, doc_height)
        } else {
            r
        };
        Ok(*region)
    }

    /// Drop a drag in progress, keeping the region from before it.
    pub fn cancel_drag(&mut self) -> bool {
        if let CropState::Active { region, drag } = &mut self.state
            && let Some(d) = drag.take()
        {
            *region = if d.kind == CropDragKind::Draw {
                region.normalized()
            } else {
                d.start_region
            };
            return true;
        }
        false
    }

    /// Integer region to crop to, if the tool is active.
    pub fn commit_rect(&self, doc_width: u32, doc_height: u32) -> Option<PixelRect> {
        let r = self.region()?.normalized();
        let r = if r.width < MIN_SIZE || r.height < MIN_SIZE {
            full_document(doc_width, doc_height)
        } else {
            r
        };
        Some(PixelRect::new(
            r.x.round() as i32,
            r.y.round() as i32,
            r.width.round().max(1.0) as u32,
            r.height.round().max(1.0) as u32,
        ))
    }
}

fn full_document(w: u32, h: u32) -> RectF {
    RectF::new(0.0, 0.0, w as f64, h as f64)
}

fn snap_coord(v: f64, targets: &[f64], threshold: f64) -> f64 {
    snap_value(v, targets, threshold).unwrap_or(v)
}

fn draw_region(
    anchor: Point,
    point: Point,
    ratio: Option<f64>,
    snap: Option<(&SnapTargets, f64)>,
) -> RectF {
    let mut p = point;
    if let Some((targets, threshold)) = snap {
        p.x = snap_coord(p.x, &targets.xs, threshold);
        p.y = snap_coord(p.y, &targets.ys, threshold);
    }
    if let Some(ratio) = ratio {
        let dx = p.x - anchor.x;
        let dy = p.y - anchor.y;
        let (mut w, mut h) = (dx.abs(), dy.abs());
        if w / ratio >= h {
            h = w / ratio;
        } else {
            w = h * ratio;
        }
        p = Point::new(anchor.x + w.copysign(dx), anchor.y + h.copysign(dy));
    }
    RectF::from_corners(anchor, p)
}

fn resize_region(
    start: RectF,
    handle: CropHandle,
    dx: f64,
    dy: f64,
    ratio: Option<f64>,
    snap: Option<(&SnapTargets, f64)>,
) -> RectF {
    let (mut l, mut r, mut t, mut b) = (start.x, start.right(), start.y, start.bottom());
    if handle.moves_left() {
        l += dx;
    }
    if handle.moves_right() {
        r += dx;
    }
    if handle.moves_top() {
        t += dy;
    }
    if handle.moves_bottom() {
        b += dy;
    }

    if let Some((targets, threshold)) = snap {
        if handle.moves_left() {
            l = snap_coord(l, &targets.xs, threshold);
        }
        if handle.moves_right() {
            r = snap_coord(r, &targets.xs, threshold);
        }
        if handle.moves_top() {
            t = snap_coord(t, &targets.ys, threshold);
        }
        if handle.moves_bottom() {
            b = snap_coord(b, &targets.ys, threshold);
        }
    }

    // Minimum size, pushing only the edge being dragged
    if handle.moves_left() {
        l = l.min(r - MIN_SIZE);
    }
    if handle.moves_right() {
        r = r.max(l + MIN_SIZE);
    }
    if handle.moves_top() {
        t = t.min(b - MIN_SIZE);
    }
    if handle.moves_bottom() {
        b = b.max(t + MIN_SIZE);
    }

    if let Some(ratio) = ratio {
        let c = start.center();
        match handle {
            CropHandle::Left | CropHandle::Right => {
                let h = ((r - l) / ratio).max(MIN_SIZE);
                t = c.y - h / 2.0;
                b = c.y + h / 2.0;
            }
            CropHandle::Top | CropHandle::Bottom => {
                let w = ((b - t) * ratio).max(MIN_SIZE);
                l = c.x - w / 2.0;
                r = c.x + w / 2.0;
            }
            corner => {
                let (mut w, mut h) = (r - l, b - t);
                if dx.abs() >= dy.abs() {
                    h = (w / ratio).max(MIN_SIZE);
                } else {
                    w = (h * ratio).max(MIN_SIZE);
                }
                // Opposite corner stays put
                if corner.moves_left() {
                    l = r - w;
                } else {
                    r = l + w;
                }
                if corner.moves_top() {
                    t = b - h;
                } else {
                    b = t + h;
                }
            }
        }
    }

    RectF::new(l, t, r - l, b - t)
}
