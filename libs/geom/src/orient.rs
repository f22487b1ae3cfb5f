//! The eight rectangular orientations.

use serde::{Deserialize, Serialize};

use crate::point::Point;

/// A rectangular orientation: a rotation by a multiple of 90 degrees,
/// optionally preceded by a mirror about the y-axis.
///
/// Naming follows the LEF/DEF placement convention: `R90` rotates
/// counter-clockwise, `MY` mirrors x, `MX` mirrors y, and `MYR90`/`MXR90`
/// mirror first and rotate after.
#[derive(
    Debug, Default, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum Orient {
    /// The identity orientation.
    #[default]
    R0,
    /// Rotation by 90 degrees counter-clockwise.
    R90,
    /// Rotation by 180 degrees.
    R180,
    /// Rotation by 270 degrees counter-clockwise.
    R270,
    /// Mirror about the y-axis (x becomes -x).
    My,
    /// Mirror about the x-axis (y becomes -y).
    Mx,
    /// Mirror about the y-axis, then rotate by 90 degrees.
    Myr90,
    /// Mirror about the x-axis, then rotate by 90 degrees.
    Mxr90,
}

impl Orient {
    /// All eight orientations.
    pub const ALL: [Orient; 8] = [
        Orient::R0,
        Orient::R90,
        Orient::R180,
        Orient::R270,
        Orient::My,
        Orient::Mx,
        Orient::Myr90,
        Orient::Mxr90,
    ];

    /// Decomposes into (rotation quarter-turns, mirrored-about-y first).
    const fn decompose(self) -> (u8, bool) {
        match self {
            Orient::R0 => (0, false),
            Orient::R90 => (1, false),
            Orient::R180 => (2, false),
            Orient::R270 => (3, false),
            Orient::My => (0, true),
            Orient::Mx => (2, true),
            Orient::Myr90 => (1, true),
            Orient::Mxr90 => (3, true),
        }
    }

    const fn compose(rot: u8, mirror: bool) -> Orient {
        match (rot % 4, mirror) {
            (0, false) => Orient::R0,
            (1, false) => Orient::R90,
            (2, false) => Orient::R180,
            (3, false) => Orient::R270,
            (0, true) => Orient::My,
            (1, true) => Orient::Myr90,
            (2, true) => Orient::Mx,
            _ => Orient::Mxr90,
        }
    }

    /// Applies the orientation to a point about the origin.
    ///
    /// # Examples
    ///
    /// ```
    /// # use geom::orient::Orient;
    /// # use geom::point::Point;
    /// let p = Point::new(2, 1);
    /// assert_eq!(Orient::R90.apply(p), Point::new(-1, 2));
    /// assert_eq!(Orient::My.apply(p), Point::new(-2, 1));
    /// assert_eq!(Orient::Mxr90.apply(p), Point::new(1, 2));
    /// ```
    pub const fn apply(&self, p: Point) -> Point {
        match *self {
            Orient::R0 => p,
            Orient::R90 => Point::new(-p.y, p.x),
            Orient::R180 => Point::new(-p.x, -p.y),
            Orient::R270 => Point::new(p.y, -p.x),
            Orient::My => Point::new(-p.x, p.y),
            Orient::Mx => Point::new(p.x, -p.y),
            Orient::Myr90 => Point::new(-p.y, -p.x),
            Orient::Mxr90 => Point::new(p.y, p.x),
        }
    }

    /// Returns the orientation equivalent to applying `self` first and
    /// `other` second.
    pub const fn then(&self, other: Orient) -> Orient {
        let (r1, m1) = self.decompose();
        let (r2, m2) = other.decompose();
        if m2 {
            // M R_r = R_{-r} M
            Orient::compose((r2 + 4 - r1) % 4, !m1)
        } else {
            Orient::compose((r2 + r1) % 4, m1)
        }
    }

    /// Returns the inverse orientation.
    ///
    /// ```
    /// # use geom::orient::Orient;
    /// for o in Orient::ALL {
    ///     assert_eq!(o.then(o.inverse()), Orient::R0);
    /// }
    /// ```
    pub const fn inverse(&self) -> Orient {
        let (r, m) = self.decompose();
        if m {
            Orient::compose(r, true)
        } else {
            Orient::compose((4 - r) % 4, false)
        }
    }

    /// True if the orientation swaps the x and y axes.
    pub const fn swaps_axes(&self) -> bool {
        matches!(*self, Orient::R90 | Orient::R270 | Orient::Myr90 | Orient::Mxr90)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_matches_pointwise_application() {
        let probes = [Point::new(3, 7), Point::new(-2, 5), Point::new(0, -4)];
        for a in Orient::ALL {
            for b in Orient::ALL {
                let c = a.then(b);
                for p in probes {
                    assert_eq!(c.apply(p), b.apply(a.apply(p)), "{a:?} then {b:?}");
                }
            }
        }
    }

    #[test]
    fn mirrors_are_self_inverse() {
        for o in [Orient::My, Orient::Mx, Orient::Myr90, Orient::Mxr90] {
            assert_eq!(o.then(o), Orient::R0);
        }
    }
}
