//! Feature derivation
//!
//! Aggregates computed over the samples a field collects in one window:
//! - Per-axis arithmetic mean of a point series
//! - Left/right mean pairs for binocular samples

use crate::types::Point;

/// Simple arithmetic mean of each axis: sum / count.
///
/// Returns `None` for an empty series instead of dividing by zero.
pub fn mean_point(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }

    let count = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));

    Some(Point::new(sum_x / count, sum_y / count))
}

/// Mean of each side independently
pub fn mean_pair(left: &[Point], right: &[Point]) -> (Option<Point>, Option<Point>) {
    (mean_point(left), mean_point(right))
}

/// Mean of the present points only; `None` if every entry is absent
pub fn mean_present<'a, I>(points: I) -> Option<Point>
where
    I: IntoIterator<Item = &'a Option<Point>>,
{
    let present: Vec<Point> = points.into_iter().flatten().copied().collect();
    mean_point(&present)
}
