//! The planner: domains, grids, the build pipeline, and the DB writer.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use geom::rect::Rect;
use pdb::block::{BTerm, Block, MasterClass, Net, SBox, WireShapeRole};
use pdb::layer::Layer;
use pdb::table::Oid;
use pdb::tech::Tech;
use pdb::wire::WireType;
use tracing::{debug, info, warn};

use crate::component::PlanCtx;
use crate::domain::VoltageDomain;
use crate::error::{Error, Result};
use crate::grid::{clone_map, Grid, GridComponent};
use crate::renderer::{
    Observer, RepairSnapshot, ShapeSnapshot, Snapshot, ViaSnapshot,
};
use crate::shape::{
    insert_obstruction, insert_shape, Shape, ShapeKind, ShapePtr, ShapeTreeMap,
};

/// The power-grid planner.
///
/// Owns the voltage domains and their grids; operates against a
/// database's technology and block. All planner state is rebuildable:
/// [`Planner::reset`] returns to the pre-build state and
/// [`Planner::build_grids`] may run any number of times before
/// [`Planner::write_to_db`] commits the result.
#[derive(Default)]
pub struct Planner {
    /// The voltage domains.
    pub domains: Vec<VoltageDomain>,
    /// The grids, in build order.
    pub grids: Vec<Grid>,
    observers: Vec<Box<dyn Observer>>,
}

impl Planner {
    /// Creates an empty planner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a voltage domain, returning its index.
    pub fn add_domain(&mut self, domain: VoltageDomain) -> usize {
        self.domains.push(domain);
        self.domains.len() - 1
    }

    /// Adds a grid, returning its index.
    pub fn add_grid(&mut self, grid: Grid) -> usize {
        self.grids.push(grid);
        self.grids.len() - 1
    }

    /// Adds a component to a grid, stamping its identity.
    pub fn add_component(&mut self, grid: usize, component: GridComponent) {
        self.grids[grid].add_component(grid, component);
    }

    /// Registers a read-only observer notified after every build.
    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Clears all built state; the planner can rebuild from scratch.
    pub fn reset(&mut self) {
        for grid in &mut self.grids {
            grid.reset();
        }
    }

    /// Validates every grid's component and connect specifications.
    pub fn check_setup(&self, tech: &Tech, block: &Block) -> Result<()> {
        for (index, grid) in self.grids.iter().enumerate() {
            let ctx = self.plan_ctx(tech, block, index)?;
            grid.check_setup(&ctx)?;
            for component in &grid.components {
                component.check(&ctx)?;
            }
        }
        Ok(())
    }

    fn plan_ctx<'a>(
        &'a self,
        tech: &'a Tech,
        block: &'a Block,
        grid_index: usize,
    ) -> Result<PlanCtx<'a>> {
        make_ctx(tech, block, &self.domains, &self.grids[grid_index], grid_index)
    }

    /// Builds every grid: initial obstructions, per-grid shape
    /// generation, vias, channel repair, and the optional trim pass.
    pub fn build_grids(&mut self, tech: &Tech, block: &Block, trim: bool) -> Result<()> {
        self.reset();

        let mut block_obs = initial_obstructions(tech, block)?;
        let mut all_shapes = ShapeTreeMap::new();
        let nets: Vec<Oid<Net>> = {
            let mut nets = Vec::new();
            for domain in &self.domains {
                for net in domain.all_nets() {
                    if !nets.contains(&net) {
                        nets.push(net);
                    }
                }
            }
            nets
        };
        for &net in &nets {
            for shape in crate::shape::shapes_from_db(block, tech, net)? {
                insert_shape(&mut all_shapes, &shape);
                insert_obstruction(&mut block_obs, &shape);
            }
        }

        for index in 0..self.grids.len() {
            let mut obs_local = clone_map(&block_obs);
            for other in 0..self.grids.len() {
                if other == index {
                    continue;
                }
                let ctx = self.plan_ctx(tech, block, other)?;
                self.grids[other].grid_level_obstructions(&ctx, &mut obs_local)?;
                self.grids[other].obstructions(&mut obs_local);
            }

            // the context borrows the domain list; the grid list stays
            // free for mutation
            let mut ctx = make_ctx(tech, block, &self.domains, &self.grids[index], index)?;
            self.grids[index].build(&mut ctx, &all_shapes, &obs_local)?;

            let shapes = self.grids[index].shapes();
            for (layer, tree) in shapes {
                let target = all_shapes.entry(layer).or_default();
                for (rect, entry) in tree.entries() {
                    target.insert(*rect, entry.clone());
                }
            }
        }

        if trim {
            self.trim_shapes(tech, block)?;
            for grid in &mut self.grids {
                grid.remove_invalid_vias();
            }
        }

        let snapshot = self.snapshot(tech, block)?;
        for observer in &mut self.observers {
            observer.update(&snapshot);
        }
        Ok(())
    }

    /// Shrinks shapes to their minimum connected extent and removes
    /// floating shapes.
    fn trim_shapes(&mut self, tech: &Tech, block: &Block) -> Result<()> {
        debug!("trimming shapes");
        for index in 0..self.grids.len() {
            let ctx = make_ctx(tech, block, &self.domains, &self.grids[index], index)?;
            let grid = &mut self.grids[index];
            let pin_layers = grid.pin_layers.clone();

            #[allow(clippy::type_complexity)]
            let mut work: Vec<(usize, ShapePtr, Option<Shape>)> = Vec::new();
            for (c_index, component) in grid.components.iter().enumerate() {
                for tree in component.core().shapes.values() {
                    for (_, entry) in tree.entries() {
                        let shape = entry.0.borrow();
                        if !shape.is_modifiable() || pin_layers.contains(&shape.layer) {
                            continue;
                        }
                        let Some(min_rect) = shape.minimum_rect(block) else {
                            if shape.is_removable() {
                                work.push((c_index, entry.0.clone(), None));
                            }
                            continue;
                        };
                        if min_rect == shape.rect {
                            continue;
                        }
                        // a shape whose vias all coincide with the minimum
                        // rect is just a via landing; remove it instead
                        let vias_stack = shape
                            .live_vias()
                            .all(|v| v.borrow().area == min_rect);
                        if vias_stack {
                            if shape.is_removable() {
                                work.push((c_index, entry.0.clone(), None));
                            }
                            continue;
                        }
                        let mut new_shape = shape.clone();
                        new_shape.rect = min_rect;
                        new_shape.vias.clear();
                        new_shape.update_term_connections();
                        work.push((c_index, entry.0.clone(), Some(new_shape)));
                    }
                }
            }
            for (c_index, old, replacement) in work {
                let core = grid.components[c_index].core_mut();
                match replacement {
                    Some(new_shape) => core.replace_shape(&ctx, &old, vec![new_shape])?,
                    None => core.remove_shape(&old),
                }
            }
        }
        Ok(())
    }

    /// Materializes every grid into the database as special wires.
    ///
    /// Vias are written first (sorted by lower level, upper level, rect),
    /// then component shapes in (layer level, rect) order. With
    /// `add_pins`, die-edge shapes and shapes on configured pin layers
    /// become special block-terminal pins.
    pub fn write_to_db(&mut self, tech: &Tech, block: &mut Block, add_pins: bool) -> Result<()> {
        // one special wire per net
        let mut net_swires: BTreeMap<Oid<Net>, usize> = BTreeMap::new();
        for domain in &self.domains {
            for net in domain.all_nets() {
                if let std::collections::btree_map::Entry::Vacant(e) = net_swires.entry(net) {
                    e.insert(block.add_swire(net, WireType::Routed)?);
                }
            }
        }

        for grid_index in 0..self.grids.len() {
            // vias first so shapes can still be adjusted by their order
            let vias = self.grids[grid_index].vias.clone();
            for via in vias {
                let via = via.borrow();
                let (Some(lower), Some(upper)) = (via.lower.clone(), via.upper.clone()) else {
                    continue;
                };
                let (lower_rect, lower_role) = {
                    let s = lower.borrow();
                    (s.rect, s.role)
                };
                let (upper_rect, upper_role) = {
                    let s = upper.borrow();
                    (s.rect, s.role)
                };
                let role = if lower_role == upper_role {
                    lower_role
                } else {
                    WireShapeRole::Stripe
                };
                let Some(&swire) = net_swires.get(&via.net) else { continue };

                let connect = &mut self.grids[via.connect.grid].connects[via.connect.index];
                if connect.is_tapered(tech, lower_rect, upper_rect)? {
                    let lower_name = tech.layers.get(connect.lower)?.name.clone();
                    let upper_name = tech.layers.get(connect.upper)?.name.clone();
                    warn!(
                        lower = %lower_name,
                        upper = %upper_name,
                        "tapered via required; it will not be added"
                    );
                    continue;
                }
                connect.make_via(tech, block, via.net, swire, lower_rect, upper_rect, role)?;
            }

            // then the shapes, in deterministic order
            for component in &self.grids[grid_index].components {
                let mut all: Vec<ShapePtr> = Vec::new();
                for tree in component.core().shapes.values() {
                    for (_, entry) in tree.entries() {
                        all.push(entry.0.clone());
                    }
                }
                all.sort_by_key(|s| {
                    let s = s.borrow();
                    let level = tech
                        .layers
                        .get(s.layer)
                        .map(|l| l.routing_level)
                        .unwrap_or(0);
                    (level, s.rect)
                });
                for shape in all {
                    let shape = shape.borrow();
                    let Some(net) = shape.net else { continue };
                    let Some(&swire) = net_swires.get(&net) else { continue };
                    let record = block.nets.get_mut(net)?;
                    record.swires[swire].boxes.push(SBox::Rect {
                        layer: shape.layer,
                        rect: shape.rect,
                        role: shape.role,
                    });
                    if add_pins {
                        let as_pin = self.grids[grid_index].pin_layers.contains(&shape.layer);
                        if as_pin {
                            add_bterm_pin(block, net, shape.layer, shape.rect)?;
                        }
                        for rect in shape.bterm_connections.iter().copied().collect::<Vec<_>>() {
                            add_bterm_pin(block, net, shape.layer, rect)?;
                        }
                    }
                }
            }
        }
        info!("planner output written to the database");
        Ok(())
    }

    /// Produces an immutable snapshot of the built state for renderers.
    pub fn snapshot(&self, tech: &Tech, block: &Block) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        for (index, grid) in self.grids.iter().enumerate() {
            let ctx = self.plan_ctx(tech, block, index)?;
            for component in &grid.components {
                for (layer, tree) in &component.core().shapes {
                    let shapes = snapshot.shapes.entry(*layer).or_default();
                    let obs = snapshot.obstructions.entry(*layer).or_default();
                    for (_, entry) in tree.entries() {
                        let shape = entry.0.borrow();
                        let net = shape
                            .net
                            .and_then(|n| block.nets.get(n).ok())
                            .map(|n| n.name.clone())
                            .unwrap_or_default();
                        let layer_name = tech.layers.get(*layer)?.name.clone();
                        shapes.push(ShapeSnapshot {
                            rect: shape.rect,
                            obstruction: shape.obs,
                            net: net.clone(),
                            role: shape.role,
                            label: format!(
                                "{net}:{layer_name}:{}:{}",
                                component.kind(),
                                grid.name
                            ),
                        });
                        obs.push(shape.obs);
                    }
                }
            }
            for via in &grid.vias {
                let via = via.borrow();
                snapshot.vias.push(ViaSnapshot {
                    rect: via.area,
                    lower: tech.layers.get(via.lower_layer())?.name.clone(),
                    upper: tech.layers.get(via.upper_layer())?.name.clone(),
                    net: block
                        .nets
                        .get(via.net)
                        .map(|n| n.name.clone())
                        .unwrap_or_default(),
                });
            }
            for channel in crate::repair::find_repair_channels(&ctx, grid)? {
                let source = tech.layers.get(channel.connect_to)?.name.clone();
                let target = match &grid.components[channel.target] {
                    GridComponent::Straps(s) => tech.layers.get(s.layer)?.name.clone(),
                    _ => Default::default(),
                };
                snapshot.repair.push(RepairSnapshot {
                    label: format!("{source}-{target}"),
                    source,
                    target,
                    rect: channel.area,
                    available: channel.area,
                });
            }
        }
        Ok(snapshot)
    }
}

/// Builds a planning context for one grid. The returned context borrows
/// the domain list and the database, leaving the grid list free for
/// mutation.
fn make_ctx<'a>(
    tech: &'a Tech,
    block: &'a Block,
    domains: &'a [VoltageDomain],
    grid: &Grid,
    grid_index: usize,
) -> Result<PlanCtx<'a>> {
    let domain = domains
        .get(grid.domain)
        .ok_or_else(|| Error::Setup(format!("grid {} has no domain", grid.name)))?;
    let domain_area = domain.area(block);
    let mut ctx = PlanCtx {
        tech,
        block,
        domain,
        grid_index,
        starts_with_power: grid.starts_with_power,
        domain_area,
        domain_boundary: domain_area,
        ring_area: domain_area,
        grid_boundary: block.die_area,
    };
    // the strap extent accounts for the widest followpin rail
    let mut followpin_width = 0;
    for component in &grid.components {
        if let GridComponent::FollowPins(fp) = component {
            if let Ok(width) = fp.resolved_width(&ctx) {
                followpin_width = followpin_width.max(width);
            }
        }
    }
    ctx.domain_boundary = domain_area.bloat(followpin_width / 2);
    Ok(ctx)
}

/// Gathers the initial obstructions: block obstructions bloated by their
/// min spacing, and placed macro pins and obstructions bloated by the
/// layer spacing.
fn initial_obstructions(tech: &Tech, block: &Block) -> Result<ShapeTreeMap> {
    let mut out = ShapeTreeMap::new();

    for obs in &block.obstructions {
        let rect = match obs.min_spacing {
            Some(spacing) => obs.rect.bloat(spacing),
            None => obs.rect,
        };
        match obs.layer {
            Some(layer) => {
                let ptr = Rc::new(RefCell::new(Shape::obstruction(
                    layer,
                    rect,
                    ShapeKind::BlockObs,
                )));
                insert_obstruction(&mut out, &ptr);
            }
            None => {
                for (layer, record) in tech.layers.iter() {
                    if !record.is_routing() {
                        continue;
                    }
                    let ptr = Rc::new(RefCell::new(Shape::obstruction(
                        layer,
                        rect,
                        ShapeKind::BlockObs,
                    )));
                    insert_obstruction(&mut out, &ptr);
                }
            }
        }
    }

    for (_, inst) in block.insts.iter() {
        if !inst.placed || inst.class != MasterClass::Block {
            continue;
        }
        for (layer, rect) in inst.obstruction_rects().chain(inst.all_pin_rects()) {
            let record = tech.layers.get(layer)?;
            let rect = rect.bloat(record.spacing);
            let ptr = Rc::new(RefCell::new(Shape::obstruction(
                layer,
                rect,
                ShapeKind::BlockObs,
            )));
            insert_obstruction(&mut out, &ptr);
        }
    }
    Ok(out)
}

fn add_bterm_pin(
    block: &mut Block,
    net: Oid<Net>,
    layer: Oid<Layer>,
    rect: Rect,
) -> Result<()> {
    let name = block.nets.get(net)?.name.clone();
    let existing = block.bterms.find(|b| b.net == Some(net));
    let bterm = match existing {
        Some(oid) => oid,
        None => block.bterms.create(BTerm {
            name,
            net: Some(net),
            pins: Vec::new(),
            is_special: true,
        }),
    };
    let record = block.bterms.get_mut(bterm)?;
    if !record.pins.iter().any(|(l, r)| *l == layer && *r == rect) {
        record.pins.push((layer, rect));
    }
    Ok(())
}
