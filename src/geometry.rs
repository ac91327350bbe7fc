//! Screen geometry: points, rectangles, edge hit-testing and resize math.
//!
//! Rectangles use half-open coordinates: `right() == x + width`, so two
//! fences that touch share the same edge coordinate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from the four edge coordinates.
    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { x: left, y: top, width: right - left, height: bottom - top }
    }

    pub const fn left(&self) -> i32 {
        self.x
    }

    pub const fn top(&self) -> i32 {
        self.y
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub const fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Inclusive on all four edges, matching how a click on the border
    /// pixel still counts as "on the window".
    pub const fn contains(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }

    pub const fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub const fn with_height(&self, height: i32) -> Self {
        Self::new(self.x, self.y, self.width, height)
    }
}

/// Which edges of a fence a press landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizeEdges {
    pub left: bool,
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
}

impl ResizeEdges {
    pub const NONE: Self = Self { left: false, top: false, right: false, bottom: false };

    pub const fn is_none(&self) -> bool {
        !(self.left || self.top || self.right || self.bottom)
    }

    pub const fn horizontal(&self) -> bool {
        self.left || self.right
    }

    pub const fn vertical(&self) -> bool {
        self.top || self.bottom
    }
}

/// Cursor shape that matches a set of edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeCursor {
    Arrow,
    Horizontal,
    Vertical,
    /// Top-left / bottom-right diagonal.
    DiagonalMain,
    /// Top-right / bottom-left diagonal.
    DiagonalAnti,
}

impl From<ResizeEdges> for ResizeCursor {
    fn from(e: ResizeEdges) -> Self {
        if (e.left && e.top) || (e.right && e.bottom) {
            Self::DiagonalMain
        } else if (e.right && e.top) || (e.left && e.bottom) {
            Self::DiagonalAnti
        } else if e.horizontal() {
            Self::Horizontal
        } else if e.vertical() {
            Self::Vertical
        } else {
            Self::Arrow
        }
    }
}

/// Hit-test a window-local point against the resize border.
///
/// Collapsed fences only expose their left and right edges.
pub fn hit_test_edges(local: Point, size: Size, collapsed: bool, border: i32) -> ResizeEdges {
    let left = local.x < border;
    let right = local.x >= size.width - border;
    if collapsed {
        return ResizeEdges { left, right, ..ResizeEdges::NONE };
    }
    ResizeEdges {
        left,
        top: local.y < border,
        right,
        bottom: local.y >= size.height - border,
    }
}

/// Apply a pointer delta to the rectangle captured when the resize began.
///
/// Each moved edge is clamped independently so the result never drops below
/// `min`; the opposite edge stays anchored. A start rect already smaller than
/// `min` is its own floor, so the first pixel of a drag does not jump.
pub fn apply_resize(start: Rect, edges: ResizeEdges, delta: Point, min: Size) -> Rect {
    let min = Size::new(min.width.min(start.width), min.height.min(start.height));
    let mut left = start.left();
    let mut top = start.top();
    let mut right = start.right();
    let mut bottom = start.bottom();

    if edges.left {
        left = (start.left() + delta.x).min(start.right() - min.width);
    }
    if edges.right {
        right = (start.right() + delta.x).max(start.left() + min.width);
    }
    if edges.top {
        top = (start.top() + delta.y).min(start.bottom() - min.height);
    }
    if edges.bottom {
        bottom = (start.bottom() + delta.y).max(start.top() + min.height);
    }

    Rect::from_edges(left, top, right, bottom)
}

/// Keep a dragged fence fully inside the monitor work area.
///
/// Touching an edge exactly is allowed. A fence larger than the area is
/// pinned to its top-left corner.
pub fn clamp_to_work_area(rect: Rect, area: Rect) -> Rect {
    let x = if rect.width >= area.width {
        area.left()
    } else {
        rect.x.clamp(area.left(), area.right() - rect.width)
    };
    let y = if rect.height >= area.height {
        area.top()
    } else {
        rect.y.clamp(area.top(), area.bottom() - rect.height)
    };
    Rect::new(x, y, rect.width, rect.height)
}

/// Vertical list of equal rows starting at `top`, as used for a fence's icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    pub top: i32,
    pub row_height: i32,
}

impl RowLayout {
    pub fn row_rect(&self, index: usize, width: i32) -> Rect {
        Rect::new(0, self.top + index as i32 * self.row_height, width, self.row_height)
    }

    /// Row under local `y`, if any.
    pub fn row_at(&self, y: i32, count: usize) -> Option<usize> {
        if y < self.top || self.row_height <= 0 {
            return None;
        }
        let index = ((y - self.top) / self.row_height) as usize;
        (index < count).then_some(index)
    }

    /// Slot a dragged row lands in: rows split at their midpoint.
    pub fn insert_slot(&self, y: i32, count: usize) -> usize {
        if y < self.top || self.row_height <= 0 {
            return 0;
        }
        let slot = ((y - self.top + self.row_height / 2) / self.row_height) as usize;
        slot.min(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Size = Size::new(180, 60);

    #[test]
    fn test_hit_test_expanded_corners() {
        let size = Size::new(280, 200);
        let e = hit_test_edges(Point::new(2, 3), size, false, 8);
        assert!(e.left && e.top && !e.right && !e.bottom);
        assert_eq!(ResizeCursor::from(e), ResizeCursor::DiagonalMain);

        let e = hit_test_edges(Point::new(275, 198), size, false, 8);
        assert!(e.right && e.bottom);

        let e = hit_test_edges(Point::new(140, 100), size, false, 8);
        assert!(e.is_none());
        assert_eq!(ResizeCursor::from(e), ResizeCursor::Arrow);
    }

    #[test]
    fn test_hit_test_collapsed_only_sides() {
        let size = Size::new(280, 32);
        let e = hit_test_edges(Point::new(3, 2), size, true, 8);
        assert!(e.left);
        assert!(!e.top);
        assert_eq!(ResizeCursor::from(e), ResizeCursor::Horizontal);

        let e = hit_test_edges(Point::new(140, 30), size, true, 8);
        assert!(e.is_none());
    }

    #[test]
    fn test_resize_right_and_bottom() {
        let start = Rect::new(100, 100, 280, 200);
        let edges = ResizeEdges { right: true, bottom: true, ..ResizeEdges::NONE };
        let r = apply_resize(start, edges, Point::new(20, -30), MIN);
        assert_eq!(r, Rect::new(100, 100, 300, 170));
    }

    #[test]
    fn test_resize_left_clamps_to_min_width() {
        let start = Rect::new(100, 100, 280, 200);
        let edges = ResizeEdges { left: true, ..ResizeEdges::NONE };
        let r = apply_resize(start, edges, Point::new(500, 0), MIN);
        assert_eq!(r.width, 180);
        assert_eq!(r.right(), start.right());
    }

    #[test]
    fn test_resize_top_clamps_to_min_height() {
        let start = Rect::new(0, 0, 200, 100);
        let edges = ResizeEdges { top: true, ..ResizeEdges::NONE };
        let r = apply_resize(start, edges, Point::new(0, 90), MIN);
        assert_eq!(r.height, 60);
        assert_eq!(r.bottom(), 100);
    }

    #[test]
    fn test_resize_narrow_fence_does_not_jump() {
        // loaded records may be narrower than the interactive minimum
        let start = Rect::new(100, 100, 120, 200);
        let edges = ResizeEdges { left: true, ..ResizeEdges::NONE };
        let r = apply_resize(start, edges, Point::new(1, 0), MIN);
        assert_eq!(r, start);
        let r = apply_resize(start, edges, Point::new(-10, 0), MIN);
        assert_eq!(r, Rect::new(90, 100, 130, 200));
    }

    #[test]
    fn test_clamp_keeps_fence_inside() {
        let area = Rect::new(0, 0, 1920, 1040);
        assert_eq!(clamp_to_work_area(Rect::new(-50, 10, 280, 200), area), Rect::new(0, 10, 280, 200));
        assert_eq!(
            clamp_to_work_area(Rect::new(1800, 900, 280, 200), area),
            Rect::new(1640, 840, 280, 200)
        );
        // touching is fine
        let touching = Rect::new(1640, 0, 280, 200);
        assert_eq!(clamp_to_work_area(touching, area), touching);
    }

    #[test]
    fn test_contains_is_edge_inclusive() {
        let r = Rect::new(10, 10, 100, 50);
        assert!(r.contains(Point::new(10, 10)));
        assert!(r.contains(Point::new(110, 60)));
        assert!(!r.contains(Point::new(111, 60)));
    }

    #[test]
    fn test_row_layout_hits_and_slots() {
        let rows = RowLayout { top: 36, row_height: 22 };
        assert_eq!(rows.row_at(20, 3), None);
        assert_eq!(rows.row_at(36, 3), Some(0));
        assert_eq!(rows.row_at(80, 3), Some(2));
        assert_eq!(rows.row_at(102, 3), None);

        assert_eq!(rows.insert_slot(0, 3), 0);
        assert_eq!(rows.insert_slot(46, 3), 0);
        assert_eq!(rows.insert_slot(48, 3), 1);
        assert_eq!(rows.insert_slot(500, 3), 3);
        assert_eq!(rows.row_rect(1, 200), Rect::new(0, 58, 200, 22));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn rect_strategy() -> impl Strategy<Value = Rect> {
            (-3000i32..3000, -3000i32..3000, 1i32..2500, 1i32..2500)
                .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
        }

        fn edges_strategy() -> impl Strategy<Value = ResizeEdges> {
            (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(left, top, right, bottom)| {
                ResizeEdges {
                    left: left && !right,
                    top: top && !bottom,
                    right,
                    bottom,
                }
            })
        }

        proptest! {
            #[test]
            fn clamp_fits_inside_area(rect in rect_strategy(), area in rect_strategy()) {
                let out = clamp_to_work_area(rect, area);
                prop_assert_eq!((out.width, out.height), (rect.width, rect.height));
                if rect.width <= area.width && rect.height <= area.height {
                    prop_assert!(out.left() >= area.left() && out.right() <= area.right());
                    prop_assert!(out.top() >= area.top() && out.bottom() <= area.bottom());
                }
            }

            #[test]
            fn resize_respects_floor_and_anchor(
                start in rect_strategy(),
                edges in edges_strategy(),
                dx in -4000i32..4000,
                dy in -4000i32..4000,
                min_w in 1i32..400,
                min_h in 1i32..400,
            ) {
                let min = Size::new(min_w, min_h);
                let out = apply_resize(start, edges, Point::new(dx, dy), min);
                prop_assert!(out.width >= min.width.min(start.width));
                prop_assert!(out.height >= min.height.min(start.height));
                if !edges.left {
                    prop_assert_eq!(out.left(), start.left());
                }
                if !edges.right {
                    prop_assert_eq!(out.right(), start.right());
                }
                if !edges.top {
                    prop_assert_eq!(out.top(), start.top());
                }
                if !edges.bottom {
                    prop_assert_eq!(out.bottom(), start.bottom());
                }
            }
        }
    }
}
