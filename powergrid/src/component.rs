//! Shared grid-component behavior: shape insertion, merging, and cutting.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use geom::rect::Rect;
use pdb::block::{Block, Net};
use pdb::layer::{Layer, LayerDir};
use pdb::table::Oid;
use pdb::tech::Tech;
use tracing::debug;

use crate::domain::VoltageDomain;
use crate::error::{Error, Result};
use crate::shape::{
    insert_shape, remove_shape, Shape, ShapePtr, ShapeRef, ShapeSource, ShapeTreeMap,
};

/// The kind of a grid component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// Perimeter rings.
    Ring,
    /// Periodic straps.
    Strap,
    /// Standard-cell rail followpins.
    Followpin,
    /// Pad-to-core connection straps.
    PadConnect,
    /// Straps inserted by channel repair.
    RepairChannel,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ComponentKind::Ring => "ring",
            ComponentKind::Strap => "strap",
            ComponentKind::Followpin => "followpin",
            ComponentKind::PadConnect => "pad connect",
            ComponentKind::RepairChannel => "repair channel",
        };
        write!(f, "{name}")
    }
}

/// Planning context handed to components while a grid builds.
pub struct PlanCtx<'a> {
    /// The technology.
    pub tech: &'a Tech,
    /// The block being planned.
    pub block: &'a Block,
    /// The grid's voltage domain.
    pub domain: &'a VoltageDomain,
    /// Index of the grid in the planner.
    pub grid_index: usize,
    /// Net ordering of the grid.
    pub starts_with_power: bool,
    /// The domain area (region or core).
    pub domain_area: Rect,
    /// The strap extent for [`ExtensionMode::Core`](crate::straps::ExtensionMode).
    pub domain_boundary: Rect,
    /// The outline including ring shapes built so far.
    pub ring_area: Rect,
    /// The die area.
    pub grid_boundary: Rect,
}

impl PlanCtx<'_> {
    /// The supply nets in this grid's strap order.
    pub fn ordered_nets(&self) -> Vec<Oid<Net>> {
        self.domain.nets(self.starts_with_power)
    }
}

/// State shared by every component kind: its nets, its shapes, and its
/// identity within the grid.
#[derive(Debug, Default)]
pub struct ComponentCore {
    /// Net override; empty means the grid's ordered nets.
    pub nets: Vec<Oid<Net>>,
    /// Power-first or ground-first override; unset follows the grid.
    pub starts_with_power: Option<bool>,
    /// The component's shapes, per layer.
    pub shapes: ShapeTreeMap,
    /// The component's identity, set when added to a grid.
    pub source: Option<ShapeSource>,
}

impl ComponentCore {
    /// The nets this component places, in order.
    pub fn nets(&self, ctx: &PlanCtx) -> Vec<Oid<Net>> {
        if self.nets.is_empty() {
            ctx.domain
                .nets(self.starts_with_power.unwrap_or(ctx.starts_with_power))
        } else {
            self.nets.clone()
        }
    }

    /// Removes all shapes.
    pub fn clear_shapes(&mut self) {
        self.shapes.clear();
    }

    /// The number of shapes across all layers.
    pub fn shape_count(&self) -> usize {
        self.shapes.values().map(|t| t.len()).sum()
    }

    /// Inserts a shape, merging aligned same-net overlaps.
    ///
    /// Shapes below the layer's minimum area are skipped. An overlap with
    /// another net fails with [`Error::Short`]; a same-net overlap that
    /// does not share the full extent of one axis fails with
    /// [`Error::UnalignedMerge`]. Shapes reaching the die boundary record
    /// a block-terminal connection rect along that edge.
    pub fn add_shape(&mut self, ctx: &PlanCtx, mut shape: Shape) -> Result<Option<ShapePtr>> {
        let layer = ctx.tech.layers.get(shape.layer)?;
        if !shape.is_valid(layer) {
            debug!(shape = %shape.report(ctx.tech, ctx.block), "skipping shape below minimum area");
            return Ok(None);
        }
        shape.source = self.source;

        let tree = self.shapes.entry(shape.layer).or_default();
        let mut absorbed: Vec<ShapeRef> = Vec::new();
        for (_, entry) in tree.intersecting(shape.rect) {
            let other = entry.0.borrow();
            if !shape.rect.overlaps(&other.rect) {
                continue;
            }
            if other.net != shape.net {
                return Err(Error::Short {
                    net: net_name(ctx.block, shape.net),
                    other: net_name(ctx.block, other.net),
                    layer: layer.name.to_string(),
                    rect: shape.rect.to_string(),
                });
            }
            let x_aligned = shape.rect.left() == other.rect.left()
                && shape.rect.right() == other.rect.right();
            let y_aligned =
                shape.rect.bot() == other.rect.bot() && shape.rect.top() == other.rect.top();
            if !x_aligned && !y_aligned {
                return Err(Error::UnalignedMerge {
                    layer: layer.name.to_string(),
                    rect: shape.rect.to_string(),
                    other: other.rect.to_string(),
                });
            }
            drop(other);
            absorbed.push(entry.clone());
        }

        for entry in absorbed {
            let other = entry.0.borrow();
            shape.rect = shape.rect.union(&other.rect);
            shape.iterm_connections.extend(other.iterm_connections.iter().copied());
            shape.bterm_connections.extend(other.bterm_connections.iter().copied());
            shape.rows.extend(other.rows.iter().copied());
            let key = other.rect;
            drop(other);
            tree.remove_where(key, |e| Rc::ptr_eq(&e.0, &entry.0));
        }

        shape.generate_obstruction(layer);
        add_boundary_bterms(&mut shape, ctx.grid_boundary, layer);

        let ptr = Rc::new(RefCell::new(shape));
        tree.insert(ptr.borrow().rect, ShapeRef(ptr.clone()));
        Ok(Some(ptr))
    }

    /// Removes a shape, detaching it from its vias.
    pub fn remove_shape(&mut self, shape: &ShapePtr) {
        for via in shape.borrow().live_vias() {
            via.borrow_mut().detach_shape(shape);
        }
        remove_shape(&mut self.shapes, shape);
    }

    /// Replaces a shape with `replacements`, re-pointing its vias at
    /// whichever replacement still overlaps them.
    pub fn replace_shape(
        &mut self,
        ctx: &PlanCtx,
        shape: &ShapePtr,
        replacements: Vec<Shape>,
    ) -> Result<()> {
        let vias: Vec<_> = shape.borrow().live_vias().collect();
        self.remove_shape(shape);

        for replacement in replacements {
            let Some(new_ptr) = self.add_shape(ctx, replacement)? else {
                continue;
            };
            for via in &vias {
                let mut via_mut = via.borrow_mut();
                if via_mut.area.intersects(&new_ptr.borrow().rect)
                    && via_mut.reattach_shape(&new_ptr)
                {
                    new_ptr.borrow_mut().add_via(via);
                }
            }
        }
        Ok(())
    }

    /// Cuts every shape against the obstruction trees, replacing shapes
    /// that conflict.
    pub fn cut_shapes(&mut self, ctx: &PlanCtx, obstructions: &ShapeTreeMap) -> Result<()> {
        debug!(count = self.shape_count(), "cutting shapes against obstructions");
        let mut pending: BTreeMap<Oid<Layer>, Vec<(ShapePtr, Vec<Shape>)>> = BTreeMap::new();
        for (&layer, tree) in &self.shapes {
            let Some(obs) = obstructions.get(&layer) else {
                continue;
            };
            for (_, entry) in tree.entries() {
                let replacements = entry.0.borrow().cut(obs, Some(ctx.grid_index));
                if let Some(replacements) = replacements {
                    pending.entry(layer).or_default().push((entry.0.clone(), replacements));
                }
            }
        }
        for (_, work) in pending {
            for (shape, replacements) in work {
                self.replace_shape(ctx, &shape, replacements)?;
            }
        }
        debug!(count = self.shape_count(), "shape count after cutting");
        Ok(())
    }

    /// Copies the component's shapes into `out`, keyed by rect.
    pub fn collect_shapes(&self, out: &mut ShapeTreeMap) {
        for tree in self.shapes.values() {
            for (_, entry) in tree.entries() {
                insert_shape(out, &entry.0);
            }
        }
    }

    /// Copies the component's shapes into `out`, keyed by obstruction.
    pub fn collect_obstructions(&self, out: &mut ShapeTreeMap) {
        for tree in self.shapes.values() {
            for (_, entry) in tree.entries() {
                crate::shape::insert_obstruction(out, &entry.0);
            }
        }
    }
}

fn net_name(block: &Block, net: Option<Oid<Net>>) -> String {
    net.and_then(|n| block.nets.get(n).ok())
        .map(|n| n.name.to_string())
        .unwrap_or_else(|| "<obstruction>".to_string())
}

/// Records block-terminal connection rects where a shape touches the die
/// boundary.
fn add_boundary_bterms(shape: &mut Shape, die: Rect, layer: &Layer) {
    let rect = shape.rect;
    let min_width = layer.min_width.max(1);
    if rect.left() == die.left() {
        let x = (die.left() + min_width).min(rect.right());
        shape.bterm_connections.insert(rect.with_hspan(geom::span::Span::new(rect.left(), x)));
    }
    if rect.right() == die.right() {
        let x = (die.right() - min_width).max(rect.left());
        shape.bterm_connections.insert(rect.with_hspan(geom::span::Span::new(x, rect.right())));
    }
    if rect.bot() == die.bot() {
        let y = (die.bot() + min_width).min(rect.top());
        shape.bterm_connections.insert(rect.with_vspan(geom::span::Span::new(rect.bot(), y)));
    }
    if rect.top() == die.top() {
        let y = (die.top() - min_width).max(rect.bot());
        shape.bterm_connections.insert(rect.with_vspan(geom::span::Span::new(y, rect.top())));
    }
}

/// Validates a component's width against the layer rules.
pub fn check_layer_width(
    tech: &Tech,
    layer_id: Oid<Layer>,
    width: i32,
    dir: LayerDir,
) -> Result<()> {
    let layer = tech.layers.get(layer_id)?;
    if width < layer.min_width {
        return Err(Error::RuleViolation(format!(
            "width {width} on layer {} is below the minimum width {}",
            layer.name, layer.min_width
        )));
    }
    if width > layer.max_width {
        return Err(Error::RuleViolation(format!(
            "width {width} on layer {} exceeds the maximum width {}",
            layer.name, layer.max_width
        )));
    }
    let wrong_way = match (layer.dir.axis(), dir.axis()) {
        (Some(pref), Some(d)) => pref != d,
        _ => false,
    };
    if !layer.width_ok(width, wrong_way) {
        return Err(Error::RuleViolation(format!(
            "width {width} on layer {} is not a legal width-table entry",
            layer.name
        )));
    }
    if tech.mfg_grid > 0 && width % (2 * tech.mfg_grid) != 0 {
        return Err(Error::RuleViolation(format!(
            "width {width} on layer {} must be a multiple of twice the manufacturing grid",
            layer.name
        )));
    }
    Ok(())
}

/// Validates a component's spacing against the layer rules.
pub fn check_layer_spacing(
    tech: &Tech,
    layer_id: Oid<Layer>,
    width: i32,
    spacing: i32,
) -> Result<()> {
    let layer = tech.layers.get(layer_id)?;
    let min_spacing = layer.spacing_for(width, 0);
    if spacing < min_spacing {
        return Err(Error::RuleViolation(format!(
            "spacing {spacing} on layer {} is below the minimum spacing {min_spacing}",
            layer.name
        )));
    }
    if tech.mfg_grid > 0 && spacing % tech.mfg_grid != 0 {
        return Err(Error::RuleViolation(format!(
            "spacing {spacing} on layer {} must be on the manufacturing grid",
            layer.name
        )));
    }
    Ok(())
}
