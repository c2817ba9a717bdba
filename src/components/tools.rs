use crate::error::{EditorError, EditorResult};
use crate::geometry::{Point, RectF};
use crate::selection::{Selection, SelectionMode};

/// Lasso points closer than this to the previous one are dropped.
const LASSO_MIN_STEP: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Brush,
    Move,
    Crop,
    Selection,
    Zoom,
    Eyedropper,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[
            Tool::Brush,
            Tool::Move,
            Tool::Crop,
            Tool::Selection,
            Tool::Zoom,
            Tool::Eyedropper,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Brush => "Brush",
            Tool::Move => "Move",
            Tool::Crop => "Crop",
            Tool::Selection => "Selection",
            Tool::Zoom => "Zoom",
            Tool::Eyedropper => "Eyedropper",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::all()
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// SELECTION TOOL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MarqueeShape {
    #[default]
    Rectangle,
    Ellipse,
    Lasso,
}

struct MarqueeDrag {
    anchor: Point,
    current: Point,
    points: Vec<Point>,
}

/// Builds a candidate selection while dragging.
#[derive(Default)]
pub struct SelectionTool {
    pub shape: MarqueeShape,
    pub mode: SelectionMode,
    drag: Option<MarqueeDrag>,
}

impl SelectionTool {
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn start(&mut self, point: Point) -> EditorResult<()> {
        if self.drag.is_some() {
            return Err(EditorError::GestureActive("selection"));
        }
        self.drag = Some(MarqueeDrag {
            anchor: point,
            current: point,
            points: vec![point],
        });
        Ok(())
    }

    pub fn update(&mut self, point: Point) -> EditorResult<()> {
        let drag = self.drag.as_mut().ok_or(EditorError::NoGesture)?;
        drag.current = point;
        if self.shape == MarqueeShape::Lasso
            && drag
                .points
                .last()
                .is_none_or(|last| last.distance(point) >= LASSO_MIN_STEP)
        {
            drag.points.push(point);
        }
        Ok(())
    }

    /// Shape under construction, for drawing the outline.
    pub fn preview(&self) -> Option<Selection> {
        self.drag.as_ref().map(|d| self.build(d))
    }

    fn build(&self, drag: &MarqueeDrag) -> Selection {
        match self.shape {
            MarqueeShape::Rectangle => {
                Selection::rectangle(RectF::from_corners(drag.anchor, drag.current))
            }
            MarqueeShape::Ellipse => {
                Selection::ellipse(RectF::from_corners(drag.anchor, drag.current))
            }
            MarqueeShape::Lasso => Selection::path(drag.points.clone()),
        }
    }

    /// Commit the drag. A zero-area shape is rejected and the caller keeps
    /// its previous selection.
    pub fn finish(&mut self) -> EditorResult<Selection> {
        let drag = self.drag.take().ok_or(EditorError::NoGesture)?;
        let selection = self.build(&drag);
        if selection.is_degenerate() {
            return Err(EditorError::DegenerateGeometry(format!(
                "{:?} selection has no area",
                self.shape
            )));
        }
        if self.mode != SelectionMode::Replace {
            log::debug!(
                "selection: {:?} combining is not supported, replacing",
                self.mode
            );
        }
        Ok(selection)
    }

    pub fn cancel(&mut self) -> bool {
        self.drag.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionKind;

    #[test]
    fn tool_names_round_trip() {
        for t in Tool::all() {
            assert_eq!(Tool::from_name(t.name()), Some(*t));
        }
        assert_eq!(Tool::from_name("eyedropper"), Some(Tool::Eyedropper));
        assert_eq!(Tool::from_name("pencil"), None);
    }

    #[test]
    fn rectangle_marquee_normalizes() {
        let mut tool = SelectionTool::default();
        tool.start(Point::new(30.0, 30.0)).unwrap();
        tool.update(Point::new(10.0, 20.0)).unwrap();
        let sel = tool.finish().unwrap();
        assert_eq!(sel.bounds(), Some(RectF::new(10.0, 20.0, 20.0, 10.0)));
        assert!(!tool.is_dragging());
    }

    #[test]
    fn zero_area_is_rejected() {
        let mut tool = SelectionTool {
            shape: MarqueeShape::Ellipse,
            ..Default::default()
        };
        tool.start(Point::new(5.0, 5.0)).unwrap();
        tool.update(Point::new(5.0, 40.0)).unwrap();
        assert!(matches!(
            tool.finish(),
            Err(EditorError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn lasso_collects_spaced_points() {
        let mut tool = SelectionTool {
            shape: MarqueeShape::Lasso,
            ..Default::default()
        };
        tool.start(Point::new(0.0, 0.0)).unwrap();
        tool.update(Point::new(0.2, 0.0)).unwrap();
        tool.update(Point::new(10.0, 0.0)).unwrap();
        tool.update(Point::new(10.0, 10.0)).unwrap();
        let sel = tool.finish().unwrap();
        assert_eq!(sel.kind(), SelectionKind::Path);
        assert_eq!(sel.points().len(), 3);
        assert!(sel.contains(8.0, 2.0));
    }
}
