//! Rectangle sides and per-side value maps.

use array_map::{ArrayMap, Indexable};
use serde::{Deserialize, Serialize};

use crate::dir::Dir;

/// An enumeration of the four sides of an axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[repr(u8)]
#[derive(Indexable)]
pub enum Side {
    /// The left, or negative-x, side.
    Left,
    /// The bottom, or negative-y, side.
    Bot,
    /// The right, or positive-x, side.
    Right,
    /// The top, or positive-y, side.
    Top,
}

impl Side {
    /// The direction along which the side's edge runs.
    ///
    /// ```
    /// # use geom::side::Side;
    /// # use geom::dir::Dir;
    /// assert_eq!(Side::Left.edge_dir(), Dir::Vert);
    /// assert_eq!(Side::Top.edge_dir(), Dir::Horiz);
    /// ```
    pub const fn edge_dir(&self) -> Dir {
        match *self {
            Side::Left | Side::Right => Dir::Vert,
            Side::Top | Side::Bot => Dir::Horiz,
        }
    }

    /// Returns all four sides in `Left, Bot, Right, Top` order.
    pub const fn all() -> [Side; 4] {
        [Side::Left, Side::Bot, Side::Right, Side::Top]
    }
}

/// An association of a value of type `T` with each of the four [`Side`]s.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq)]
pub struct Sides<T> {
    inner: ArrayMap<Side, T, 4>,
}

impl<T> Sides<T> {
    /// Creates a new [`Sides`] with the provided values for each side.
    pub const fn new(left: T, bot: T, right: T, top: T) -> Self {
        // IMPORTANT: array element order must match the variant order of
        // the Side enum.
        Self { inner: ArrayMap::new([left, bot, right, top]) }
    }
}

impl<T: Copy> Sides<T> {
    /// Creates a new [`Sides`] with `value` on every side.
    pub const fn uniform(value: T) -> Self {
        Self { inner: ArrayMap::new([value; 4]) }
    }
}

impl<T> std::ops::Index<Side> for Sides<T> {
    type Output = T;
    fn index(&self, index: Side) -> &Self::Output {
        self.inner.index(index)
    }
}

impl<T> std::ops::IndexMut<Side> for Sides<T> {
    fn index_mut(&mut self, index: Side) -> &mut Self::Output {
        self.inner.index_mut(index)
    }
}
