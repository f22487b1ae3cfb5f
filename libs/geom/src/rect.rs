//! Axis-aligned rectangles.

use serde::{Deserialize, Serialize};

use crate::dir::Dir;
use crate::point::Point;
use crate::side::{Side, Sides};
use crate::span::Span;

/// An axis-aligned rectangle, specified by lower-left and upper-right
/// corners.
///
/// Edges are part of the rectangle (closed intervals): a point on an edge
/// is contained, and rectangles that share only an edge still intersect.
/// Use [`Rect::overlaps`] to test for positive-area overlap.
#[derive(
    Debug, Default, Copy, Clone, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Rect {
    p0: Point,
    p1: Point,
}

impl Rect {
    /// Creates a new rectangle from the given opposite corner points,
    /// sorting coordinates as needed.
    #[inline]
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates a rectangle from all four sides (left, bottom, right, top).
    ///
    /// # Example
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let rect = Rect::from_sides(15, 20, 30, 40);
    /// assert_eq!(rect.left(), 15);
    /// assert_eq!(rect.bot(), 20);
    /// assert_eq!(rect.right(), 30);
    /// assert_eq!(rect.top(), 40);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `left > right` or `bot > top`.
    #[inline]
    pub fn from_sides(left: i32, bot: i32, right: i32, top: i32) -> Self {
        assert!(left <= right, "Rect::from_sides requires left ({left}) <= right ({right})");
        assert!(bot <= top, "Rect::from_sides requires bot ({bot}) <= top ({top})");
        Self { p0: Point::new(left, bot), p1: Point::new(right, top) }
    }

    /// Creates a rectangle from all four sides, returning [`None`] if the
    /// sides would make the rectangle empty.
    #[inline]
    pub fn from_sides_option(left: i32, bot: i32, right: i32, top: i32) -> Option<Self> {
        if left > right || bot > top {
            None
        } else {
            Some(Self::from_sides(left, bot, right, top))
        }
    }

    /// Creates a zero-area rectangle containing the given point.
    #[inline]
    pub const fn from_point(p: Point) -> Self {
        Self { p0: p, p1: p }
    }

    /// Creates a rectangle from horizontal and vertical [`Span`]s.
    ///
    /// # Example
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let rect = Rect::from_spans(Span::new(15, 30), Span::new(20, 40));
    /// assert_eq!(rect, Rect::from_sides(15, 20, 30, 40));
    /// ```
    pub const fn from_spans(h: Span, v: Span) -> Self {
        Self { p0: Point::new(h.lo(), v.lo()), p1: Point::new(h.hi(), v.hi()) }
    }

    /// Creates a rectangle from two [`Span`]s, where the first is parallel
    /// to `dir` and the second perpendicular.
    #[inline]
    pub fn from_dir_spans(dir: Dir, parallel: Span, perp: Span) -> Self {
        match dir {
            Dir::Horiz => Self::from_spans(parallel, perp),
            Dir::Vert => Self::from_spans(perp, parallel),
        }
    }

    /// The left x-coordinate.
    #[inline]
    pub const fn left(&self) -> i32 {
        self.p0.x
    }

    /// The bottom y-coordinate.
    #[inline]
    pub const fn bot(&self) -> i32 {
        self.p0.y
    }

    /// The right x-coordinate.
    #[inline]
    pub const fn right(&self) -> i32 {
        self.p1.x
    }

    /// The top y-coordinate.
    #[inline]
    pub const fn top(&self) -> i32 {
        self.p1.y
    }

    /// The lower-left corner.
    #[inline]
    pub const fn lower_left(&self) -> Point {
        self.p0
    }

    /// The upper-right corner.
    #[inline]
    pub const fn upper_right(&self) -> Point {
        self.p1
    }

    /// The coordinate of the given side.
    #[inline]
    pub const fn side(&self, side: Side) -> i32 {
        match side {
            Side::Left => self.left(),
            Side::Bot => self.bot(),
            Side::Right => self.right(),
            Side::Top => self.top(),
        }
    }

    /// The horizontal [`Span`].
    pub fn hspan(&self) -> Span {
        Span::new(self.p0.x, self.p1.x)
    }

    /// The vertical [`Span`].
    pub fn vspan(&self) -> Span {
        Span::new(self.p0.y, self.p1.y)
    }

    /// The span of the rectangle in the given direction.
    pub fn span(&self, dir: Dir) -> Span {
        match dir {
            Dir::Horiz => self.hspan(),
            Dir::Vert => self.vspan(),
        }
    }

    /// Returns a new rectangle with the given horizontal span.
    pub fn with_hspan(self, h: Span) -> Self {
        Self::from_spans(h, self.vspan())
    }

    /// Returns a new rectangle with the given vertical span.
    pub fn with_vspan(self, v: Span) -> Self {
        Self::from_spans(self.hspan(), v)
    }

    /// Returns a new rectangle with the given span in direction `dir`.
    pub fn with_span(self, span: Span, dir: Dir) -> Self {
        match dir {
            Dir::Horiz => self.with_hspan(span),
            Dir::Vert => self.with_vspan(span),
        }
    }

    /// The horizontal extent, `right - left`.
    #[inline]
    pub const fn dx(&self) -> i32 {
        self.p1.x - self.p0.x
    }

    /// The vertical extent, `top - bot`.
    #[inline]
    pub const fn dy(&self) -> i32 {
        self.p1.y - self.p0.y
    }

    /// Alias for [`Rect::dx`].
    #[inline]
    pub const fn width(&self) -> i32 {
        self.dx()
    }

    /// Alias for [`Rect::dy`].
    #[inline]
    pub const fn height(&self) -> i32 {
        self.dy()
    }

    /// The smaller of `dx` and `dy`.
    #[inline]
    pub fn min_dxdy(&self) -> i32 {
        self.dx().min(self.dy())
    }

    /// The larger of `dx` and `dy`.
    #[inline]
    pub fn max_dxdy(&self) -> i32 {
        self.dx().max(self.dy())
    }

    /// The extent of the rectangle in the given direction.
    pub const fn length(&self, dir: Dir) -> i32 {
        match dir {
            Dir::Horiz => self.dx(),
            Dir::Vert => self.dy(),
        }
    }

    /// The direction in which the rectangle is longer, choosing
    /// [`Dir::Horiz`] on ties.
    #[inline]
    pub const fn longer_dir(&self) -> Dir {
        if self.dy() > self.dx() {
            Dir::Vert
        } else {
            Dir::Horiz
        }
    }

    /// The area, computed in 64 bits.
    ///
    /// # Example
    ///
    /// ```
    /// # use geom::prelude::*;
    /// assert_eq!(Rect::from_sides(10, 20, 30, 50).area(), 600);
    /// ```
    #[inline]
    pub const fn area(&self) -> i64 {
        self.dx() as i64 * self.dy() as i64
    }

    /// The center point, rounded down.
    pub const fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2, (self.p0.y + self.p1.y) / 2)
    }

    /// Returns true if `p` lies in the closed rectangle.
    #[inline]
    pub const fn contains_point(&self, p: Point) -> bool {
        self.p0.x <= p.x && p.x <= self.p1.x && self.p0.y <= p.y && p.y <= self.p1.y
    }

    /// Returns true if `other` lies entirely within this rectangle.
    #[inline]
    pub const fn contains(&self, other: &Rect) -> bool {
        self.p0.x <= other.p0.x
            && other.p1.x <= self.p1.x
            && self.p0.y <= other.p0.y
            && other.p1.y <= self.p1.y
    }

    /// Returns true if the closed rectangles share at least one point.
    ///
    /// Rectangles that touch only along an edge or at a corner intersect:
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let a = Rect::from_sides(0, 0, 10, 10);
    /// assert!(a.intersects(&Rect::from_sides(10, 0, 20, 10)));
    /// assert!(!a.intersects(&Rect::from_sides(11, 0, 20, 10)));
    /// ```
    #[inline]
    pub const fn intersects(&self, other: &Rect) -> bool {
        self.p0.x <= other.p1.x
            && other.p0.x <= self.p1.x
            && self.p0.y <= other.p1.y
            && other.p0.y <= self.p1.y
    }

    /// Returns true if the rectangles overlap with positive area.
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let a = Rect::from_sides(0, 0, 10, 10);
    /// assert!(!a.overlaps(&Rect::from_sides(10, 0, 20, 10)));
    /// assert!(a.overlaps(&Rect::from_sides(9, 0, 20, 10)));
    /// ```
    #[inline]
    pub const fn overlaps(&self, other: &Rect) -> bool {
        self.p0.x < other.p1.x
            && other.p0.x < self.p1.x
            && self.p0.y < other.p1.y
            && other.p0.y < self.p1.y
    }

    /// Computes the intersection of two rectangles, or [`None`] if they do
    /// not intersect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let p0 = Point::new(self.p0.x.max(other.p0.x), self.p0.y.max(other.p0.y));
        let p1 = Point::new(self.p1.x.min(other.p1.x), self.p1.y.min(other.p1.y));
        if p0.x > p1.x || p0.y > p1.y {
            return None;
        }
        Some(Rect { p0, p1 })
    }

    /// Computes the rectangular union (bounding box) of two rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            p0: Point::new(self.p0.x.min(other.p0.x), self.p0.y.min(other.p0.y)),
            p1: Point::new(self.p1.x.max(other.p1.x), self.p1.y.max(other.p1.y)),
        }
    }

    /// The rectangular union of every rectangle in the iterator, or
    /// [`None`] if it is empty.
    pub fn union_all<I: IntoIterator<Item = Rect>>(rects: I) -> Option<Rect> {
        rects.into_iter().fold(None, |acc, r| match acc {
            Some(acc) => Some(acc.union(&r)),
            None => Some(r),
        })
    }

    /// Expands the rectangle by `amount` on all sides.
    ///
    /// # Example
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let rect = Rect::from_sides(0, 0, 100, 200);
    /// assert_eq!(rect.bloat(20), Rect::from_sides(-20, -20, 120, 220));
    /// ```
    #[inline]
    pub fn bloat(&self, amount: i32) -> Self {
        Self::from_sides(
            self.p0.x - amount,
            self.p0.y - amount,
            self.p1.x + amount,
            self.p1.y + amount,
        )
    }

    /// Expands the rectangle by `amount` on both sides of direction `dir`.
    #[inline]
    pub fn expand_dir(&self, dir: Dir, amount: i32) -> Self {
        match dir {
            Dir::Horiz => Self::from_sides(
                self.p0.x - amount,
                self.p0.y,
                self.p1.x + amount,
                self.p1.y,
            ),
            Dir::Vert => Self::from_sides(
                self.p0.x,
                self.p0.y - amount,
                self.p1.x,
                self.p1.y + amount,
            ),
        }
    }

    /// Expands the rectangle by `amount` on the given side.
    #[inline]
    pub fn expand_side(&self, side: Side, amount: i32) -> Self {
        let mut r = *self;
        match side {
            Side::Left => r.p0.x -= amount,
            Side::Bot => r.p0.y -= amount,
            Side::Right => r.p1.x += amount,
            Side::Top => r.p1.y += amount,
        }
        r
    }

    /// Expands the rectangle by a (possibly different) amount on each side.
    pub fn expand_sides(&self, sides: Sides<i32>) -> Self {
        Self::from_sides(
            self.p0.x - sides[Side::Left],
            self.p0.y - sides[Side::Bot],
            self.p1.x + sides[Side::Right],
            self.p1.y + sides[Side::Top],
        )
    }

    /// Shrinks the rectangle by `amount` on all sides, returning [`None`]
    /// when the result would be empty.
    #[inline]
    pub fn shrink_all(&self, amount: i32) -> Option<Self> {
        Self::from_sides_option(
            self.p0.x + amount,
            self.p0.y + amount,
            self.p1.x - amount,
            self.p1.y - amount,
        )
    }

    /// Moves the rectangle by the given offset.
    #[inline]
    pub fn translate(&self, offset: Point) -> Self {
        Self { p0: self.p0 + offset, p1: self.p1 + offset }
    }

    /// Snaps all four corners to the given grid.
    #[inline]
    pub fn snap_to_grid(&self, grid: i32) -> Self {
        Self::new(self.p0.snap_to_grid(grid), self.p1.snap_to_grid(grid))
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}) - ({}, {})", self.p0.x, self.p0.y, self.p1.x, self.p1.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_touching_rects_has_zero_area() {
        let a = Rect::from_sides(0, 0, 10, 10);
        let b = Rect::from_sides(10, 5, 20, 15);
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, Rect::from_sides(10, 5, 10, 10));
        assert_eq!(i.area(), 0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn union_all_of_empty_iter_is_none() {
        assert_eq!(Rect::union_all(std::iter::empty()), None);
    }

    #[test]
    fn expand_sides_is_per_side() {
        let r = Rect::from_sides(0, 0, 100, 200);
        let sides = Sides::new(10, 20, 30, 40);
        assert_eq!(r.expand_sides(sides), Rect::from_sides(-10, -20, 130, 240));
    }
}
