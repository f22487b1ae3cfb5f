//! Read-only planner snapshots for an external renderer.
//!
//! The planner emits immutable [`Snapshot`]s to registered
//! [`Observer`]s after every build; a renderer never mutates planner
//! state. A preview build (building grids without writing to the
//! database) leaves the database untouched, and the planner can be reset
//! and rebuilt from any prior state.

use std::collections::BTreeMap;

use arcstr::ArcStr;
use geom::rect::Rect;
use pdb::block::WireShapeRole;
use pdb::layer::Layer;
use pdb::table::Oid;

/// One rendered shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeSnapshot {
    /// The shape rectangle.
    pub rect: Rect,
    /// The obstruction rectangle.
    pub obstruction: Rect,
    /// The owning net name, empty for obstructions.
    pub net: ArcStr,
    /// The wire-shape role.
    pub role: WireShapeRole,
    /// Display label: net, layer, component, grid.
    pub label: String,
}

/// One rendered via.
#[derive(Debug, Clone, PartialEq)]
pub struct ViaSnapshot {
    /// The via area.
    pub rect: Rect,
    /// The lower layer name.
    pub lower: ArcStr,
    /// The upper layer name.
    pub upper: ArcStr,
    /// The owning net name.
    pub net: ArcStr,
}

/// One rendered repair channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairSnapshot {
    /// The layer whose shapes were unconnected.
    pub source: ArcStr,
    /// The layer the repair straps were placed on.
    pub target: ArcStr,
    /// The channel rectangle.
    pub rect: Rect,
    /// The area still available within the channel.
    pub available: Rect,
    /// Display label.
    pub label: String,
}

/// An immutable view of the planner's built state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Shapes per layer.
    pub shapes: BTreeMap<Oid<Layer>, Vec<ShapeSnapshot>>,
    /// Obstructions per layer.
    pub obstructions: BTreeMap<Oid<Layer>, Vec<Rect>>,
    /// Via boxes.
    pub vias: Vec<ViaSnapshot>,
    /// Repair channels found in the last build.
    pub repair: Vec<RepairSnapshot>,
}

/// A read-only consumer of planner snapshots.
pub trait Observer {
    /// Called with a fresh snapshot after every build.
    fn update(&mut self, snapshot: &Snapshot);
}
