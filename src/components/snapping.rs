use crate::geometry::RectF;

/// Snap lines in document space: document edges and centre, plus the edges
/// and centre of the active selection when there is one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapTargets {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

impl SnapTargets {
    pub fn new(doc_width: u32, doc_height: u32, selection: Option<RectF>) -> Self {
        let (w, h) = (doc_width as f64, doc_height as f64);
        let mut xs = vec![0.0, w / 2.0, w];
        let mut ys = vec![0.0, h / 2.0, h];
        if let Some(s) = selection.map(|s| s.normalized()) {
            xs.extend([s.x, s.center().x, s.right()]);
            ys.extend([s.y, s.center().y, s.bottom()]);
        }
        Self { xs, ys }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Nearest target within `threshold` of `value`.
pub fn snap_value(value: f64, targets: &[f64], threshold: f64) -> Option<f64> {
    targets
        .iter()
        .copied()
        .map(|t| (t, (t - value).abs()))
        .filter(|(_, d)| *d <= threshold)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(t, _)| t)
}

/// Single best correction for a rigid span whose reference lines are `edges`
/// (e.g. left, centre, right). Zero when nothing is in range.
pub fn snap_span(edges: &[f64], targets: &[f64], threshold: f64) -> f64 {
    let mut best: Option<f64> = None;
    for &e in edges {
        if let Some(t) = snap_value(e, targets, threshold) {
            let shift = t - e;
            if best.is_none_or(|b| shift.abs() < b.abs()) {
                best = Some(shift);
            }
        }
    }
    best.unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_include_selection() {
        let t = SnapTargets::new(100, 50, Some(RectF::new(10.0, 5.0, 20.0, 10.0)));
        assert_eq!(t.xs, vec![0.0, 50.0, 100.0, 10.0, 20.0, 30.0]);
        assert_eq!(t.ys, vec![0.0, 25.0, 50.0, 5.0, 10.0, 15.0]);
    }

    #[test]
    fn nearest_within_threshold() {
        let targets = [0.0, 50.0, 100.0];
        assert_eq!(snap_value(47.0, &targets, 4.0), Some(50.0));
        assert_eq!(snap_value(45.0, &targets, 4.0), None);
        assert_eq!(snap_value(2.0, &targets, 8.0), Some(0.0));
    }

    #[test]
    fn span_takes_smallest_correction() {
        // left edge is 3 from 0, right edge is 1 from 50
        let shift = snap_span(&[3.0, 26.0, 49.0], &[0.0, 50.0], 5.0);
        assert_eq!(shift, 1.0);
        assert_eq!(snap_span(&[20.0], &[0.0], 5.0), 0.0);
    }
}
