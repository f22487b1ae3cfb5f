//! Power-grid planning.
//!
//! Given a [voltage domain](crate::domain::VoltageDomain) and a list of
//! grid components ([rings](crate::rings::Rings),
//! [straps](crate::straps::Straps),
//! [followpins](crate::straps::FollowPins), and
//! [pad connections](crate::pad::PadDirectConnect)), the
//! [planner](crate::planner::Planner) materializes rectangular supply
//! shapes on routing layers, computes legal via stacks between them from
//! the technology's cut and enclosure rules, resolves obstructions,
//! repairs disconnected channels, and writes the result back into the
//! database as special wires.

#![warn(missing_docs)]

pub mod component;
pub mod connect;
pub mod domain;
pub mod error;
pub mod grid;
pub mod pad;
pub mod planner;
pub mod renderer;
pub mod repair;
pub mod rings;
pub mod shape;
pub mod straps;
pub mod via;
pub mod via_repair;

pub use error::{Error, Result};
pub use planner::Planner;
