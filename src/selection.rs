use crate::geometry::{Point, RectF};

// ============================================================================
// SELECTION MODEL
// ============================================================================

/// How a newly committed shape combines with the existing selection.
/// Only `Replace` is applied; the others are carried for tool state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMode {
    #[default]
    Replace,
    Add,
    Subtract,
    Intersect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionKind {
    None,
    Rectangle,
    Ellipse,
    Path,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum SelectionShape {
    #[default]
    None,
    Rectangle(RectF),
    Ellipse(RectF),
    /// Closed polygon; `bounds` is the polygon's bounding box.
    Path { bounds: RectF, points: Vec<Point> },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    shape: SelectionShape,
    /// Reserved; containment ignores it.
    pub feather: f32,
}

impl Selection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn rectangle(bounds: RectF) -> Self {
        Self::from_shape(SelectionShape::Rectangle(bounds.normalized()))
    }

    pub fn ellipse(bounds: RectF) -> Self {
        Self::from_shape(SelectionShape::Ellipse(bounds.normalized()))
    }

    pub fn path(points: Vec<Point>) -> Self {
        let bounds = polygon_bounds(&points);
        Self::from_shape(SelectionShape::Path { bounds, points })
    }

    pub fn from_shape(shape: SelectionShape) -> Self {
        Self {
            shape,
            feather: 0.0,
        }
    }

    pub fn shape(&self) -> &SelectionShape {
        &self.shape
    }

    pub fn kind(&self) -> SelectionKind {
        match self.shape {
            SelectionShape::None => SelectionKind::None,
            SelectionShape::Rectangle(_) => SelectionKind::Rectangle,
            SelectionShape::Ellipse(_) => SelectionKind::Ellipse,
            SelectionShape::Path { .. } => SelectionKind::Path,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.shape, SelectionShape::None)
    }

    pub fn bounds(&self) -> Option<RectF> {
        match &self.shape {
            SelectionShape::None => None,
            SelectionShape::Rectangle(r) | SelectionShape::Ellipse(r) => Some(*r),
            SelectionShape::Path { bounds, .. } => Some(*bounds),
        }
    }

    pub fn points(&self) -> &[Point] {
        match &self.shape {
            SelectionShape::Path { points, .. } => points,
            _ => &[],
        }
    }

    /// True when the selection covers no area (a path needs three points).
    pub fn is_degenerate(&self) -> bool {
        match &self.shape {
            SelectionShape::None => false,
            SelectionShape::Rectangle(r) | SelectionShape::Ellipse(r) => r.is_degenerate(),
            SelectionShape::Path { bounds, points } => points.len() < 3 || bounds.is_degenerate(),
        }
    }

    /// Point containment in document space. "None" selects everything.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        match &self.shape {
            SelectionShape::None => true,
            SelectionShape::Rectangle(r) => r.contains(Point::new(x, y)),
            SelectionShape::Ellipse(r) => {
                let rx = r.width / 2.0;
                let ry = r.height / 2.0;
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let c = r.center();
                let nx = (x - c.x) / rx;
                let ny = (y - c.y) / ry;
                nx * nx + ny * ny <= 1.0
            }
            SelectionShape::Path { bounds, points } => {
                if points.len() < 3 {
                    return false;
                }
                if x < bounds.x || x > bounds.right() || y < bounds.y || y > bounds.bottom() {
                    return false;
                }
                point_in_polygon(points, x, y)
            }
        }
    }

    /// Containment of the pixel at integer document coordinates, sampled at its centre.
    pub fn contains_pixel(&self, px: i32, py: i32) -> bool {
        self.contains(px as f64 + 0.5, py as f64 + 0.5)
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        match &mut self.shape {
            SelectionShape::None => {}
            SelectionShape::Rectangle(r) | SelectionShape::Ellipse(r) => {
                *r = r.translated(dx, dy);
            }
            SelectionShape::Path { bounds, points } => {
                *bounds = bounds.translated(dx, dy);
                for p in points.iter_mut() {
                    p.x += dx;
                    p.y += dy;
                }
            }
        }
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Selection {
        let mut s = self.clone();
        s.translate(dx, dy);
        s
    }

    pub fn clear(&mut self) {
        self.shape = SelectionShape::None;
    }
}

fn polygon_bounds(points: &[Point]) -> RectF {
    let Some(first) = points.first() else {
        return RectF::default();
    };
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    RectF::new(x0, y0, x1 - x0, y1 - y0)
}

/// Even-odd ray casting against a horizontal ray towards +x.
fn point_in_polygon(points: &[Point], x: f64, y: f64) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (pi, pj) = (points[i], points[j]);
        if (pi.y > y) != (pj.y > y) {
            let cross_x = (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x;
            if x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

// ============================================================================
// MARCHING ANTS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickStatus {
    /// Still animating; carries the dash offset to draw with.
    Running(f32),
    Finished,
}

/// Dash-offset animation for the selection outline. Reads the selection only
/// to decide whether to keep going.
#[derive(Clone, Debug)]
pub struct AntsTicker {
    offset: f32,
    speed: f32,
    dash: f32,
    cancelled: bool,
}

impl AntsTicker {
    pub fn new(speed: f32, dash: f32) -> Self {
        Self {
            offset: 0.0,
            speed,
            dash: dash.max(1.0),
            cancelled: false,
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn is_running(&self) -> bool {
        !self.cancelled
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Re-arm after a new selection is committed.
    pub fn restart(&mut self) {
        self.cancelled = false;
        self.offset = 0.0;
    }

    /// Advance by `dt` seconds. Cancels itself once the selection is gone.
    pub fn tick(&mut self, dt: f32, selection: &Selection) -> TickStatus {
        if self.cancelled || selection.is_none() {
            self.cancelled = true;
            return TickStatus::Finished;
        }
        // One period is a dash plus its gap
        let period = self.dash * 2.0;
        self.offset = (self.offset + self.speed * dt.max(0.0)) % period;
        TickStatus::Running(self.offset)
    }
}

impl Default for AntsTicker {
    fn default() -> Self {
        Self::new(30.0, 8.0)
    }
}
