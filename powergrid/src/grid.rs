//! Grids: ordered component lists and the build pipeline.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use arcstr::ArcStr;
use geom::dir::Dir;
use geom::rect::Rect;
use pdb::layer::Layer;
use pdb::table::Oid;
use tracing::{debug, info};

use crate::component::{ComponentCore, ComponentKind, PlanCtx};
use crate::connect::Connect;
use crate::error::{Error, Result};
use crate::pad::PadDirectConnect;
use crate::repair::RepairChannelStraps;
use crate::rings::Rings;
use crate::shape::{
    insert_obstruction, Shape, ShapeKind, ShapePtr, ShapeRef, ShapeTree, ShapeTreeMap, ViaPtr,
};
use crate::straps::{FollowPins, Straps};
use crate::via::{ConnectRef, Via};

/// One grid component.
#[derive(Debug)]
pub enum GridComponent {
    /// Perimeter rings.
    Rings(Rings),
    /// Periodic straps.
    Straps(Straps),
    /// Standard-cell rail followpins.
    FollowPins(FollowPins),
    /// Pad connection straps.
    PadConnect(PadDirectConnect),
    /// Straps inserted by channel repair.
    Repair(RepairChannelStraps),
}

impl GridComponent {
    /// The component kind.
    pub fn kind(&self) -> ComponentKind {
        match self {
            GridComponent::Rings(_) => ComponentKind::Ring,
            GridComponent::Straps(_) => ComponentKind::Strap,
            GridComponent::FollowPins(_) => ComponentKind::Followpin,
            GridComponent::PadConnect(_) => ComponentKind::PadConnect,
            GridComponent::Repair(_) => ComponentKind::RepairChannel,
        }
    }

    /// The shared component state.
    pub fn core(&self) -> &ComponentCore {
        match self {
            GridComponent::Rings(c) => &c.core,
            GridComponent::Straps(c) => &c.core,
            GridComponent::FollowPins(c) => &c.core,
            GridComponent::PadConnect(c) => &c.core,
            GridComponent::Repair(c) => &c.straps.core,
        }
    }

    /// The shared component state, mutably.
    pub fn core_mut(&mut self) -> &mut ComponentCore {
        match self {
            GridComponent::Rings(c) => &mut c.core,
            GridComponent::Straps(c) => &mut c.core,
            GridComponent::FollowPins(c) => &mut c.core,
            GridComponent::PadConnect(c) => &mut c.core,
            GridComponent::Repair(c) => &mut c.straps.core,
        }
    }

    /// Validates the component's layer specifications.
    pub fn check(&self, ctx: &PlanCtx) -> Result<()> {
        match self {
            GridComponent::Rings(c) => c.check(ctx),
            GridComponent::Straps(c) => c.check(ctx),
            GridComponent::FollowPins(c) => c.check(ctx),
            GridComponent::PadConnect(_) => Ok(()),
            GridComponent::Repair(_) => Ok(()),
        }
    }

    /// Builds the component's shapes.
    pub fn make_shapes(&mut self, ctx: &PlanCtx, grid_shapes: &ShapeTreeMap) -> Result<()> {
        match self {
            GridComponent::Rings(c) => c.make_shapes(ctx),
            GridComponent::Straps(c) => c.make_shapes(ctx, grid_shapes),
            GridComponent::FollowPins(c) => c.make_shapes(ctx),
            GridComponent::PadConnect(c) => c.make_shapes(ctx, grid_shapes),
            GridComponent::Repair(c) => c.make_shapes(ctx, grid_shapes),
        }
    }

    /// Cuts the component's shapes against the obstructions.
    pub fn cut_shapes(&mut self, ctx: &PlanCtx, obstructions: &ShapeTreeMap) -> Result<()> {
        match self {
            GridComponent::Repair(c) => c.cut_shapes(ctx, obstructions),
            other => other.core_mut().cut_shapes(ctx, obstructions),
        }
    }

    /// For straps and followpins: the layer and the pitch used when
    /// searching for unconnected channels.
    pub fn strap_channel_info(&self, ctx: &PlanCtx) -> Option<(Oid<Layer>, i32, Dir)> {
        match self {
            GridComponent::Straps(c) => {
                let dir = c.dir(ctx).ok()?;
                Some((c.layer, c.pitch, dir))
            }
            GridComponent::FollowPins(c) => {
                let pitch = c.pitch(ctx).ok()?;
                Some((c.layer, pitch, Dir::Horiz))
            }
            _ => None,
        }
    }
}

/// A grid: a voltage domain, components in insertion order, and the
/// connect rules that join their layers.
#[derive(Debug)]
pub struct Grid {
    /// The grid name.
    pub name: ArcStr,
    /// Index of the grid's domain in the planner.
    pub domain: usize,
    /// Net ordering within strap groups.
    pub starts_with_power: bool,
    /// Allow partial channel repair instead of aborting.
    pub allow_repair_channels: bool,
    /// The components, in insertion order.
    pub components: Vec<GridComponent>,
    /// The connect rules.
    pub connects: Vec<Connect>,
    /// Layers whose die-edge shapes become block-terminal pins.
    pub pin_layers: BTreeSet<Oid<Layer>>,
    /// The vias built by the last `build`.
    pub vias: Vec<ViaPtr>,
}

impl Grid {
    /// Creates an empty grid.
    pub fn new(name: impl Into<ArcStr>, domain: usize, starts_with_power: bool) -> Self {
        Self {
            name: name.into(),
            domain,
            starts_with_power,
            allow_repair_channels: false,
            components: Vec::new(),
            connects: Vec::new(),
            pin_layers: BTreeSet::new(),
            vias: Vec::new(),
        }
    }

    /// Adds a component, stamping its identity.
    pub fn add_component(&mut self, grid_index: usize, mut component: GridComponent) {
        component.core_mut().source = Some(crate::shape::ShapeSource {
            grid: grid_index,
            component: self.components.len(),
        });
        self.components.push(component);
    }

    /// Adds a connect rule; one rule per layer pair.
    pub fn add_connect(&mut self, connect: Connect) -> Result<()> {
        for existing in &self.connects {
            if existing.lower == connect.lower && existing.upper == connect.upper {
                return Err(Error::Setup(format!(
                    "a connect between these layers already exists in \"{}\"",
                    self.name
                )));
            }
        }
        self.connects.push(connect);
        Ok(())
    }

    /// The layers reachable from `layer` through one connect rule.
    pub fn connectable_layers(&self, layer: Oid<Layer>) -> BTreeSet<Oid<Layer>> {
        let mut layers = BTreeSet::new();
        for connect in &self.connects {
            if connect.lower == layer {
                layers.insert(connect.upper);
            } else if connect.upper == layer {
                layers.insert(connect.lower);
            }
        }
        layers
    }

    /// All shapes of the grid, keyed by rect.
    pub fn shapes(&self) -> ShapeTreeMap {
        let mut map = ShapeTreeMap::new();
        for component in &self.components {
            component.core().collect_shapes(&mut map);
        }
        map
    }

    /// All shapes of the grid, keyed by their obstruction boxes.
    pub fn obstructions(&self, out: &mut ShapeTreeMap) {
        for component in &self.components {
            component.core().collect_obstructions(out);
        }
    }

    /// Clears every built artifact so the grid can be rebuilt.
    pub fn reset(&mut self) {
        self.vias.clear();
        for component in &mut self.components {
            component.core_mut().clear_shapes();
        }
        for connect in &mut self.connects {
            connect.clear_cache();
        }
        // repair components are derived and vanish on reset
        self.components
            .retain(|c| c.kind() != ComponentKind::RepairChannel);
    }

    /// The estimated footprint this grid imposes on other grids: the
    /// domain area on every strap and intermediate routing layer, plus
    /// the ring stack outline.
    ///
    /// The core grid contributes no estimate: its real shapes obstruct
    /// directly. Region grids estimate so other grids stay clear of the
    /// whole region.
    pub fn grid_level_obstructions(&self, ctx: &PlanCtx, out: &mut ShapeTreeMap) -> Result<()> {
        if ctx.domain.region.is_none() {
            return Ok(());
        }

        let mut layers: BTreeSet<Oid<Layer>> = BTreeSet::new();
        for component in &self.components {
            if let Some((layer, _, _)) = component.strap_channel_info(ctx) {
                layers.insert(layer);
            }
        }
        for connect in &self.connects {
            layers.extend(connect.intermediate_routing_layers().iter().copied());
        }
        for layer in layers {
            let mut obs = Shape::obstruction(layer, ctx.domain_area, ShapeKind::GridObs);
            obs.obs_grid = Some(ctx.grid_index);
            let ptr = Rc::new(RefCell::new(obs));
            insert_obstruction(out, &ptr);
        }

        for component in &self.components {
            if let GridComponent::Rings(rings) = component {
                let (rect, layers) = rings.outer_outline(ctx)?;
                for layer in layers {
                    let mut obs = Shape::obstruction(layer, rect, ShapeKind::GridObs);
                    obs.obs_grid = Some(ctx.grid_index);
                    obs.generate_obstruction(ctx.tech.layers.get(layer)?);
                    let ptr = Rc::new(RefCell::new(obs));
                    insert_obstruction(out, &ptr);
                }
            }
        }
        Ok(())
    }

    /// Checks the grid's internal consistency: followpin layers must be
    /// chained by non-overlapping connect rules.
    pub fn check_setup(&self, ctx: &PlanCtx) -> Result<()> {
        let mut followpin_layers = BTreeSet::new();
        for component in &self.components {
            if let GridComponent::FollowPins(c) = component {
                followpin_layers.insert(c.layer);
            }
        }
        if followpin_layers.is_empty() {
            return Ok(());
        }
        let mut followpin_connects = Vec::new();
        for connect in &self.connects {
            if followpin_layers.contains(&connect.lower)
                && followpin_layers.contains(&connect.upper)
            {
                followpin_connects.push(connect);
            }
        }
        if followpin_layers.len() > 1 && followpin_connects.is_empty() {
            return Err(Error::Setup(format!(
                "{} followpin definitions but no connect statements between them",
                followpin_layers.len()
            )));
        }
        if followpin_layers.len() - 1 != followpin_connects.len() {
            return Err(Error::Setup(format!(
                "{} followpin connect statements when {} are required",
                followpin_connects.len(),
                followpin_layers.len() - 1
            )));
        }
        for (i, a) in followpin_connects.iter().enumerate() {
            for b in &followpin_connects[i + 1..] {
                if a.overlaps(b, ctx.tech)? {
                    return Err(Error::Setup(
                        "connect statements for followpins overlap".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Builds the grid: shapes, cuts, vias, channel repair, and via-span
    /// repair.
    pub fn build(
        &mut self,
        ctx: &mut PlanCtx,
        global_shapes: &ShapeTreeMap,
        obstructions: &ShapeTreeMap,
    ) -> Result<()> {
        info!(grid = %self.name, "inserting grid");

        let mut local_obstructions = clone_map(obstructions);

        for index in 0..self.components.len() {
            // snapshot the shapes built so far for ring avoidance and
            // pad target searches
            let grid_shapes = self.shapes();
            ctx.ring_area = self.ring_area(ctx);
            let component = &mut self.components[index];
            component.make_shapes(ctx, &grid_shapes)?;
            component.cut_shapes(ctx, &local_obstructions)?;
            component.core().collect_obstructions(&mut local_obstructions);
        }

        self.make_vias(ctx, global_shapes, obstructions)?;

        let allow_partial = self.allow_repair_channels;
        crate::repair::repair_grid_channels(
            self,
            ctx,
            global_shapes,
            &mut local_obstructions,
            allow_partial,
        )?;

        if self.repair_via_spans(ctx, &local_obstructions)? {
            // shapes changed; rebuild the via set
            self.make_vias(ctx, global_shapes, obstructions)?;
        }
        Ok(())
    }

    /// The outline of the grid including its ring shapes.
    pub fn ring_area(&self, ctx: &PlanCtx) -> Rect {
        let mut area = ctx.domain_area;
        for component in &self.components {
            if let GridComponent::Rings(_) = component {
                for tree in component.core().shapes.values() {
                    for (_, entry) in tree.entries() {
                        let shape = entry.0.borrow();
                        let rect = shape.rect;
                        if rect.dx() > rect.dy() {
                            area = area.with_vspan(area.vspan().union(rect.vspan()));
                        } else {
                            area = area.with_hspan(area.hspan().union(rect.hspan()));
                        }
                    }
                }
            }
        }
        area
    }

    /// Builds the via set for the current shapes: intersect same-net
    /// shapes per connect, drop vias whose stacks are obstructed, and
    /// reject L-shaped partial overlaps.
    pub fn make_vias(
        &mut self,
        ctx: &PlanCtx,
        global_shapes: &ShapeTreeMap,
        obstructions: &ShapeTreeMap,
    ) -> Result<()> {
        debug!(grid = %self.name, "building vias");
        // detach previous vias from their shapes
        for via in &self.vias {
            let mut via = via.borrow_mut();
            via.lower = None;
            via.upper = None;
        }
        self.vias.clear();
        for component in &mut self.components {
            for tree in component.core_mut().shapes.values() {
                for (_, entry) in tree.entries() {
                    entry.0.borrow_mut().prune_vias();
                }
            }
        }

        let mut search_shapes = self.shapes();
        let search_area = search_area_of(&search_shapes, ctx.domain_boundary);
        for (layer, tree) in global_shapes {
            let target = search_shapes.entry(*layer).or_default();
            for (rect, entry) in tree.intersecting(search_area) {
                target.insert(*rect, entry.clone());
            }
        }

        let mut search_obstructions = clone_map(obstructions);
        for tree in search_shapes.values() {
            for (_, entry) in tree.entries() {
                let (layer, obs) = {
                    let s = entry.0.borrow();
                    (s.layer, s.obs)
                };
                search_obstructions
                    .entry(layer)
                    .or_default()
                    .insert(obs, entry.clone());
            }
        }

        let mut vias: Vec<ViaPtr> = Vec::new();
        for (index, connect) in self.connects.iter().enumerate() {
            let Some(lower_tree) = search_shapes.get(&connect.lower) else {
                continue;
            };
            let Some(upper_tree) = search_shapes.get(&connect.upper) else {
                continue;
            };
            for (_, lower_entry) in lower_tree.entries() {
                let lower = lower_entry.0.borrow();
                let Some(net) = lower.net else { continue };
                for (_, upper_entry) in upper_tree.intersecting(lower.rect) {
                    let upper = upper_entry.0.borrow();
                    if upper.net != Some(net) {
                        continue;
                    }
                    let Some(area) = lower.rect.intersection(&upper.rect) else {
                        continue;
                    };
                    if area.area() == 0 {
                        continue;
                    }
                    vias.push(Rc::new(RefCell::new(Via::new(
                        ConnectRef { grid: ctx.grid_index, index },
                        net,
                        area,
                        connect.lower,
                        connect.upper,
                        lower_entry.0.clone(),
                        upper_entry.0.clone(),
                    ))));
                }
            }
        }

        // drop vias with obstructions inside their stacks
        let mut removed = 0usize;
        vias.retain(|via| {
            let v = via.borrow();
            let connect = &self.connects[v.connect.index];
            let blocked = connect.intermediate_layers().iter().any(|layer| {
                search_obstructions
                    .get(layer)
                    .map(|tree| {
                        tree.any_intersecting(v.area, |_, entry| {
                            let other = entry.0.borrow();
                            other.net != Some(v.net)
                        })
                    })
                    .unwrap_or(false)
            });
            if blocked {
                removed += 1;
            }
            !blocked
        });
        debug!(removed, "vias removed due to stack obstructions");

        // reject L-shaped partial overlaps: the via area must span the
        // full width of one shape and the full length of the other
        let mut removed = 0usize;
        vias.retain(|via| {
            let v = via.borrow();
            let (Some(lower), Some(upper)) = (v.lower.clone(), v.upper.clone()) else {
                return false;
            };
            let lower = lower.borrow().rect;
            let upper = upper.borrow().rect;
            let area = v.area;
            let spans_x_lower = area.left() == lower.left() && area.right() == lower.right();
            let spans_y_upper = area.bot() == upper.bot() && area.top() == upper.top();
            let spans_y_lower = area.bot() == lower.bot() && area.top() == lower.top();
            let spans_x_upper = area.left() == upper.left() && area.right() == upper.right();
            let ok = (spans_x_lower && spans_y_upper)
                || (spans_y_lower && spans_x_upper)
                || lower.contains(&upper)
                || upper.contains(&lower);
            if !ok {
                removed += 1;
            }
            ok
        });
        debug!(removed, "vias removed due to partial overlap");

        for via in &vias {
            let (lower, upper) = {
                let v = via.borrow();
                (v.lower.clone(), v.upper.clone())
            };
            if let Some(lower) = lower {
                lower.borrow_mut().add_via(via);
            }
            if let Some(upper) = upper {
                upper.borrow_mut().add_via(via);
            }
        }
        // deterministic order for downstream consumers
        vias.sort_by_key(|v| {
            let v = v.borrow();
            (v.lower_layer(), v.upper_layer(), v.area)
        });
        self.vias = vias;
        Ok(())
    }

    /// Extends the narrower shape of each mismatched via to the full via
    /// span when no obstruction conflicts. Returns true when any shape
    /// changed.
    fn repair_via_spans(&mut self, ctx: &PlanCtx, obstructions: &ShapeTreeMap) -> Result<bool> {
        #[allow(clippy::type_complexity)]
        let mut replacements: Vec<(usize, ShapePtr, Shape)> = Vec::new();
        for via in &self.vias {
            let v = via.borrow();
            for (shape, other) in [(&v.lower, &v.upper), (&v.upper, &v.lower)] {
                let (Some(shape), Some(other)) = (shape, other) else { continue };
                let (source, modifiable) = {
                    let s = shape.borrow();
                    (s.source, s.is_modifiable())
                };
                let Some(source) = source else { continue };
                if source.grid != ctx.grid_index || !modifiable {
                    continue;
                }
                let other_rect = other.borrow().rect;
                let layer = shape.borrow().layer;
                let extended = match obstructions.get(&layer) {
                    Some(tree) => shape.borrow().extend_to(other_rect, tree),
                    None => {
                        let empty = ShapeTree::new();
                        shape.borrow().extend_to(other_rect, &empty)
                    }
                };
                if let Some(extended) = extended {
                    replacements.push((source.component, shape.clone(), extended));
                }
            }
        }

        let changed = !replacements.is_empty();
        for (component, old, new) in replacements {
            let ctx_ref = &*ctx;
            self.components[component]
                .core_mut()
                .replace_shape(ctx_ref, &old, vec![new])?;
        }
        Ok(changed)
    }

    /// Removes vias that lost a shape.
    pub fn remove_invalid_vias(&mut self) {
        self.vias.retain(|via| via.borrow().is_valid());
    }
}

/// Deep-copies a tree map (the shape pointers stay shared).
pub(crate) fn clone_map(map: &ShapeTreeMap) -> ShapeTreeMap {
    let mut out = ShapeTreeMap::new();
    for (layer, tree) in map {
        let mut copy = ShapeTree::new();
        for (rect, entry) in tree.entries() {
            copy.insert(*rect, ShapeRef(entry.0.clone()));
        }
        out.insert(*layer, copy);
    }
    out
}

fn search_area_of(shapes: &ShapeTreeMap, fallback: Rect) -> Rect {
    let mut area = fallback;
    for tree in shapes.values() {
        if let Some(bbox) = tree.bbox() {
            area = area.union(&bbox);
        }
    }
    area
}
