//! Edge snapping between fences while dragging or resizing.

use crate::geometry::{Rect, ResizeEdges, Size};

/// Closest offset that brings `edge` onto one of `targets`, if any lies
/// within `threshold`.
fn closest_offset(edge: i32, targets: &[i32], threshold: i32) -> Option<i32> {
    targets
        .iter()
        .map(|&t| t - edge)
        .filter(|d| d.abs() <= threshold)
        .min_by_key(|d| d.abs())
}

fn vertical_edges(others: &[Rect]) -> Vec<i32> {
    others.iter().flat_map(|r| [r.left(), r.right()]).collect()
}

fn horizontal_edges(others: &[Rect]) -> Vec<i32> {
    others.iter().flat_map(|r| [r.top(), r.bottom()]).collect()
}

/// Pick the smaller of two candidate offsets for the same axis.
fn nearer(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.abs() < a.abs() { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Snap a rectangle that is being moved as a whole.
///
/// Either of its vertical edges may align with either vertical edge of any
/// other fence (and likewise horizontally); the closest candidate wins and
/// the whole rectangle shifts by that amount.
pub fn snap_move(rect: Rect, others: &[Rect], threshold: i32) -> Rect {
    let xs = vertical_edges(others);
    let ys = horizontal_edges(others);

    let dx = nearer(
        closest_offset(rect.left(), &xs, threshold),
        closest_offset(rect.right(), &xs, threshold),
    )
    .unwrap_or(0);
    let dy = nearer(
        closest_offset(rect.top(), &ys, threshold),
        closest_offset(rect.bottom(), &ys, threshold),
    )
    .unwrap_or(0);

    rect.translated(dx, dy)
}

/// Snap only the edges that a resize is moving.
///
/// A snap that would shrink the fence below `min` is dropped and the edge
/// keeps its unsnapped coordinate.
pub fn snap_resize(rect: Rect, edges: ResizeEdges, others: &[Rect], threshold: i32, min: Size) -> Rect {
    let xs = vertical_edges(others);
    let ys = horizontal_edges(others);

    let mut left = rect.left();
    let mut top = rect.top();
    let mut right = rect.right();
    let mut bottom = rect.bottom();

    if edges.left {
        if let Some(d) = closest_offset(left, &xs, threshold) {
            if right - (left + d) >= min.width {
                left += d;
            }
        }
    }
    if edges.right {
        if let Some(d) = closest_offset(right, &xs, threshold) {
            if (right + d) - left >= min.width {
                right += d;
            }
        }
    }
    if edges.top {
        if let Some(d) = closest_offset(top, &ys, threshold) {
            if bottom - (top + d) >= min.height {
                top += d;
            }
        }
    }
    if edges.bottom {
        if let Some(d) = closest_offset(bottom, &ys, threshold) {
            if (bottom + d) - top >= min.height {
                bottom += d;
            }
        }
    }

    Rect::from_edges(left, top, right, bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Size = Size::new(180, 60);

    #[test]
    fn test_drag_left_edge_onto_neighbour_right_edge() {
        let first = Rect::new(0, 0, 200, 300);
        let dragged = Rect::new(205, 500, 185, 200);
        let snapped = snap_move(dragged, &[first], 10);
        assert_eq!(snapped.left(), 200);
        assert_eq!(snapped.width, 185);
    }

    #[test]
    fn test_right_edge_snaps_to_left_edge() {
        let b = Rect::new(400, 0, 200, 200);
        let a = Rect::new(100, 300, 295, 200);
        let snapped = snap_move(a, &[b], 10);
        assert_eq!(snapped.right(), b.left());
    }

    #[test]
    fn test_beyond_threshold_is_untouched() {
        let b = Rect::new(400, 0, 200, 200);
        let a = Rect::new(100, 300, 289, 200);
        assert_eq!(snap_move(a, &[b], 10), a);
    }

    #[test]
    fn test_closest_candidate_wins() {
        let near = Rect::new(0, 0, 203, 50);
        let far = Rect::new(0, 100, 208, 50);
        let dragged = Rect::new(205, 600, 200, 100);
        assert_eq!(snap_move(dragged, &[far, near], 10).left(), 203);
    }

    #[test]
    fn test_vertical_snap() {
        let other = Rect::new(500, 100, 200, 200);
        let dragged = Rect::new(0, 306, 200, 100);
        assert_eq!(snap_move(dragged, &[other], 10).top(), 300);
    }

    #[test]
    fn test_resize_snaps_only_moving_edge() {
        let other = Rect::new(400, 0, 200, 200);
        let rect = Rect::new(100, 100, 294, 200);
        let edges = ResizeEdges { right: true, ..ResizeEdges::NONE };
        let snapped = snap_resize(rect, edges, &[other], 10, MIN);
        assert_eq!(snapped.left(), 100);
        assert_eq!(snapped.right(), 400);
    }

    #[test]
    fn test_resize_snap_rejected_below_min() {
        // snapping the left edge to x=110 would leave only 175px
        let other = Rect::new(0, 0, 110, 50);
        let rect = Rect::new(104, 100, 181, 200);
        let edges = ResizeEdges { left: true, ..ResizeEdges::NONE };
        assert_eq!(snap_resize(rect, edges, &[other], 10, MIN), rect);
    }

    mod properties {
        use super::*;
        use proptest::collection::vec;
        use proptest::prelude::*;

        fn rect_strategy() -> impl Strategy<Value = Rect> {
            (-2000i32..2000, -2000i32..2000, 1i32..1200, 1i32..1200)
                .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
        }

        fn edges_strategy() -> impl Strategy<Value = ResizeEdges> {
            (0u8..8).prop_map(|n| ResizeEdges {
                left: n & 1 != 0,
                right: n & 1 == 0 && n & 4 != 0,
                top: n & 2 != 0,
                bottom: n & 2 == 0 && n & 4 == 0,
            })
        }

        proptest! {
            #[test]
            fn move_snaps_only_within_threshold(
                rect in rect_strategy(),
                others in vec(rect_strategy(), 0..6),
                threshold in 0i32..30,
            ) {
                let out = snap_move(rect, &others, threshold);
                prop_assert_eq!((out.width, out.height), (rect.width, rect.height));
                let dx = out.x - rect.x;
                let dy = out.y - rect.y;
                prop_assert!(dx.abs() <= threshold && dy.abs() <= threshold);
                if dx != 0 {
                    let xs = vertical_edges(&others);
                    prop_assert!(xs.contains(&out.left()) || xs.contains(&out.right()));
                }
                if dy != 0 {
                    let ys = horizontal_edges(&others);
                    prop_assert!(ys.contains(&out.top()) || ys.contains(&out.bottom()));
                }
            }

            #[test]
            fn resize_snap_never_breaks_min_size(
                rect in rect_strategy(),
                edges in edges_strategy(),
                others in vec(rect_strategy(), 0..6),
                threshold in 0i32..30,
                min_w in 1i32..300,
                min_h in 1i32..300,
            ) {
                let min = Size::new(min_w, min_h);
                prop_assume!(rect.width >= min.width && rect.height >= min.height);
                let out = snap_resize(rect, edges, &others, threshold, min);
                prop_assert!(out.width >= min.width && out.height >= min.height);
                for (moved, before, after) in [
                    (edges.left, rect.left(), out.left()),
                    (edges.right, rect.right(), out.right()),
                    (edges.top, rect.top(), out.top()),
                    (edges.bottom, rect.bottom(), out.bottom()),
                ] {
                    if moved {
                        prop_assert!((after - before).abs() <= threshold);
                    } else {
                        prop_assert_eq!(after, before);
                    }
                }
            }
        }
    }
}
