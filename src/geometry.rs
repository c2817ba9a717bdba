//! Small geometry types shared by the engines.
//!
//! `Point` and `RectF` live in continuous document space, `PixelRect` is an
//! integer rectangle on a pixel grid (layer or document space depending on
//! the caller).

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Axis-aligned rectangle in document space. Width and height may be
/// negative until `normalized` is called.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (b.x - a.x).abs(),
            (b.y - a.y).abs(),
        )
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn normalized(&self) -> RectF {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        RectF::new(x, y, width, height)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width.abs() < f64::EPSILON || self.height.abs() < f64::EPSILON
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    pub fn translated(&self, dx: f64, dy: f64) -> RectF {
        RectF::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Smallest integer-aligned rectangle covering this one.
    pub fn to_pixel_rect(&self) -> PixelRect {
        let r = self.normalized();
        let x0 = r.x.floor() as i32;
        let y0 = r.y.floor() as i32;
        let x1 = r.right().ceil() as i32;
        let y1 = r.bottom().ceil() as i32;
        PixelRect::from_min_max(x0, y0, x1, y1)
    }
}

/// Integer rectangle, half-open: covers `x..x+width`, `y..y+height`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const EMPTY: PixelRect = PixelRect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning `[x0, x1) x [y0, y1)`; inverted spans collapse to empty.
    pub fn from_min_max(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let width = (x1 - x0).max(0) as u32;
        let height = (y1 - y0).max(0) as u32;
        Self::new(x0, y0, width, height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersect(&self, other: &PixelRect) -> PixelRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        PixelRect::from_min_max(x0, y0, x1, y1)
    }

    pub fn union(&self, other: &PixelRect) -> PixelRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        PixelRect::from_min_max(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> PixelRect {
        PixelRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Maps view (screen) coordinates to document space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// View-space position of the document origin.
    pub origin: Point,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            origin: Point::default(),
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub const MIN_ZOOM: f64 = 1.0 / 32.0;
    pub const MAX_ZOOM: f64 = 64.0;

    pub fn to_document(&self, view: Point) -> Point {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        Point::new((view.x - self.origin.x) / zoom, (view.y - self.origin.y) / zoom)
    }

    pub fn to_view(&self, doc: Point) -> Point {
        Point::new(doc.x * self.zoom + self.origin.x, doc.y * self.zoom + self.origin.y)
    }

    /// Scale by `factor` keeping the document point under `anchor` (view space) fixed.
    pub fn zoom_about(&mut self, anchor: Point, factor: f64) {
        let doc = self.to_document(anchor);
        self.zoom = (self.zoom * factor).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        self.origin = Point::new(anchor.x - doc.x * self.zoom, anchor.y - doc.y * self.zoom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_round_trip() {
        let mut vp = Viewport {
            origin: Point::new(100.0, 50.0),
            zoom: 2.0,
        };
        assert_eq!(vp.to_document(Point::new(120.0, 70.0)), Point::new(10.0, 10.0));
        vp.zoom_about(Point::new(120.0, 70.0), 2.0);
        assert_eq!(vp.zoom, 4.0);
        assert_eq!(vp.to_document(Point::new(120.0, 70.0)), Point::new(10.0, 10.0));
    }

    #[test]
    fn normalizes_negative_extent() {
        let r = RectF::new(50.0, 40.0, -20.0, -10.0).normalized();
        assert_eq!(r, RectF::new(30.0, 30.0, 20.0, 10.0));
    }

    #[test]
    fn pixel_rect_covers_fractional_bounds() {
        let r = RectF::new(1.5, 2.25, 3.0, 1.0).to_pixel_rect();
        assert_eq!(r, PixelRect::new(1, 2, 4, 2));
    }

    #[test]
    fn intersect_and_union() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), PixelRect::new(5, 5, 5, 5));
        assert_eq!(a.union(&b), PixelRect::new(0, 0, 15, 15));
        assert!(a.intersect(&PixelRect::new(20, 20, 2, 2)).is_empty());
        assert_eq!(PixelRect::EMPTY.union(&b), b);
    }
}
