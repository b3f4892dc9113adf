use std::ops::Range;

use crate::model::Coord;

/// Splits `n` waypoints into overlapping windows of at most `max_waypoints`.
///
/// Consecutive windows share one waypoint: each starts where the previous one
/// ended, so `n` points need `ceil((n - 1) / (max_waypoints - 1))` windows.
pub fn window_ranges(n: usize, max_waypoints: usize) -> Vec<Range<usize>> {
    if n < 2 {
        return Vec::new();
    }

    let size = max_waypoints.max(2);
    let step = size - 1;
    let mut ranges = Vec::with_capacity((n - 1).div_ceil(step));
    let mut start = 0;
    while start < n - 1 {
        ranges.push(start..(start + size).min(n));
        start += step;
    }
    ranges
}

/// Joins per-window paths in order, dropping each later window's first point
/// since it repeats the previous window's last one.
pub fn stitch(segments: impl IntoIterator<Item = Vec<Coord>>) -> Vec<Coord> {
    let mut path: Vec<Coord> = Vec::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i == 0 {
            path.extend(segment);
        } else {
            path.extend(segment.into_iter().skip(1));
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<Coord> {
        (0..n).map(|i| Coord::new(0.0, i as f64)).collect()
    }

    #[test]
    fn test_window_count() {
        assert_eq!(window_ranges(30, 10).len(), (30 - 1usize).div_ceil(10 - 1));
        assert_eq!(window_ranges(30, 10).len(), 4);
        assert_eq!(window_ranges(10, 10).len(), 1);
        assert_eq!(window_ranges(11, 10).len(), 2);
        assert_eq!(window_ranges(2, 2).len(), 1);
        assert_eq!(window_ranges(5, 2).len(), 4);
    }

    #[test]
    fn test_windows_overlap_by_one() {
        let ranges = window_ranges(30, 10);
        assert_eq!(ranges, vec![0..10, 9..19, 18..28, 27..30]);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end - 1, pair[1].start);
        }
        assert!(ranges.iter().all(|r| r.len() <= 10 && r.len() >= 2));
    }

    #[test]
    fn test_too_few_points_yield_no_windows() {
        assert!(window_ranges(0, 10).is_empty());
        assert!(window_ranges(1, 10).is_empty());
    }

    #[test]
    fn test_stitch_raw_windows_reproduces_input() {
        let points = line(30);
        let segments = window_ranges(points.len(), 10)
            .into_iter()
            .map(|r| points[r].to_vec());
        assert_eq!(stitch(segments), points);
    }

    #[test]
    fn test_stitch_has_no_seam_duplicates() {
        let points = line(30);
        let stitched = stitch(window_ranges(30, 10).into_iter().map(|r| points[r].to_vec()));
        assert!(stitched.windows(2).all(|w| w[0] != w[1]));
    }
}
