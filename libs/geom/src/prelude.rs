//! A prelude exporting the most commonly used types.

pub use crate::dir::Dir;
pub use crate::orient::Orient;
pub use crate::point::Point;
pub use crate::rect::Rect;
pub use crate::rtree::RTree;
pub use crate::side::{Side, Sides};
pub use crate::span::Span;
pub use crate::transform::Xform;
