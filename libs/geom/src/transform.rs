//! Integer placement transforms.

use serde::{Deserialize, Serialize};

use crate::orient::Orient;
use crate::point::Point;
use crate::rect::Rect;

/// A placement transform: an [`Orient`] applied about the origin followed
/// by a translation.
///
/// All arithmetic is exact integer arithmetic; there is no scaling.
#[derive(
    Debug, Default, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Xform {
    /// The orientation applied before translating.
    pub orient: Orient,
    /// The translation applied after orienting.
    pub offset: Point,
}

impl Xform {
    /// The identity transform.
    pub const IDENTITY: Xform = Xform { orient: Orient::R0, offset: Point::zero() };

    /// Creates a transform from an orientation and an offset.
    pub const fn new(orient: Orient, offset: Point) -> Self {
        Self { orient, offset }
    }

    /// Creates a pure translation.
    pub const fn translate(offset: Point) -> Self {
        Self { orient: Orient::R0, offset }
    }

    /// Applies the transform to a point.
    ///
    /// # Example
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let tf = Xform::new(Orient::R90, Point::new(23, 11));
    /// assert_eq!(tf.apply(Point::new(2, 1)), Point::new(22, 13));
    /// ```
    pub const fn apply(&self, p: Point) -> Point {
        let p = self.orient.apply(p);
        Point::new(p.x + self.offset.x, p.y + self.offset.y)
    }

    /// Applies the transform to a rectangle, producing the axis-aligned
    /// bounding box of the transformed corners.
    ///
    /// # Example
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let tf = Xform::new(Orient::R90, Point::zero());
    /// let r = Rect::from_sides(0, 0, 100, 200);
    /// assert_eq!(tf.apply_rect(r), Rect::from_sides(-200, 0, 0, 100));
    /// ```
    pub fn apply_rect(&self, r: Rect) -> Rect {
        Rect::new(self.apply(r.lower_left()), self.apply(r.upper_right()))
    }

    /// Returns the transform equivalent to applying `self` first and
    /// `other` second.
    pub fn then(&self, other: Xform) -> Xform {
        Xform {
            orient: self.orient.then(other.orient),
            offset: other.orient.apply(self.offset) + other.offset,
        }
    }

    /// Returns the inverse transform.
    ///
    /// ```
    /// # use geom::prelude::*;
    /// let tf = Xform::new(Orient::Myr90, Point::new(7, -3));
    /// let p = Point::new(12, 5);
    /// assert_eq!(tf.inverse().apply(tf.apply(p)), p);
    /// ```
    pub fn inverse(&self) -> Xform {
        let orient = self.orient.inverse();
        Xform { orient, offset: -orient.apply(self.offset) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn then_matches_sequential_application() {
        let a = Xform::new(Orient::Mx, Point::new(5, -9));
        let b = Xform::new(Orient::R270, Point::new(-2, 4));
        let c = a.then(b);
        for p in [Point::new(1, 2), Point::new(-7, 3)] {
            assert_eq!(c.apply(p), b.apply(a.apply(p)));
        }
    }

    #[test]
    fn rect_transform_is_a_bounding_box() {
        let tf = Xform::new(Orient::R180, Point::new(10, 10));
        let r = Rect::from_sides(1, 2, 3, 5);
        assert_eq!(tf.apply_rect(r), Rect::from_sides(7, 5, 9, 8));
    }
}
