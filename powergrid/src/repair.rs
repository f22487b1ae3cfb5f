//! Channel repair: finding disconnected straps and stitching them to the
//! layer above.

use std::collections::BTreeSet;

use geom::dir::Dir;
use geom::rect::Rect;
use geom::subtract::merge_to_slabs;
use itertools::Itertools;
use pdb::block::Net;
use pdb::layer::Layer;
use pdb::table::Oid;
use tracing::{debug, warn};

use crate::component::{ComponentKind, PlanCtx};
use crate::error::{Error, Result};
use crate::grid::{Grid, GridComponent};
use crate::shape::ShapeTreeMap;
use crate::straps::{ExtensionMode, Straps};

/// A channel needing repair: a region of straps or followpins with no
/// connection above.
#[derive(Debug, Clone)]
pub struct RepairChannelArea {
    /// The channel rectangle, clipped to the domain.
    pub area: Rect,
    /// The layer whose shapes are unconnected.
    pub connect_to: Oid<Layer>,
    /// The component index of the target strap.
    pub target: usize,
    /// The nets needing repair, in grid order.
    pub nets: Vec<Oid<Net>>,
}

/// Straps inserted by channel repair: one strap group bound to a channel
/// area, on the target strap's layer.
#[derive(Debug)]
pub struct RepairChannelStraps {
    /// The underlying strap placement.
    pub straps: Straps,
    /// The layer whose shapes the repair connects.
    pub connect_to: Oid<Layer>,
    /// The channel area.
    pub area: Rect,
    invalid: bool,
}

impl RepairChannelStraps {
    /// Creates a repair strap for `channel`, searching for a workable
    /// width, spacing, and offset.
    pub fn new(
        ctx: &PlanCtx,
        grid: &Grid,
        channel: &RepairChannelArea,
        obstructions: &ShapeTreeMap,
    ) -> Result<Self> {
        let target = match &grid.components[channel.target] {
            GridComponent::Straps(straps) => straps,
            _ => {
                return Err(Error::Setup(
                    "repair channel target must be a strap component".to_string(),
                ))
            }
        };

        let mut straps = Straps::new(target.layer, target.width, target.pitch.max(1));
        straps.spacing = target.resolved_spacing(ctx);
        straps.snap = true;
        straps.number_of_straps = 1;
        straps.core.nets = channel.nets.clone();
        let dir = target.dir(ctx)?;
        straps.direction = Some(dir);
        straps.extend = match dir {
            Dir::Horiz => ExtensionMode::Fixed(channel.area.left(), channel.area.right()),
            Dir::Vert => ExtensionMode::Fixed(channel.area.bot(), channel.area.top()),
        };

        let mut this = Self {
            straps,
            connect_to: channel.connect_to,
            area: channel.area,
            invalid: false,
        };
        this.determine_parameters(ctx, obstructions)?;
        Ok(this)
    }

    /// True when a placement was found.
    pub fn is_repair_valid(&self) -> bool {
        !self.invalid
    }

    /// The net list as a diagnostic string.
    pub fn net_string(&self, ctx: &PlanCtx) -> String {
        self.straps
            .core
            .nets
            .iter()
            .filter_map(|&n| ctx.block.nets.get(n).ok())
            .map(|n| n.name.clone())
            .join(", ")
    }

    /// Searches for strap parameters that fit the channel: start from the
    /// target's width and spacing, then reduce the spacing to the layer
    /// minimum, then halve the width down to the layer's minimum width.
    fn determine_parameters(&mut self, ctx: &PlanCtx, obstructions: &ShapeTreeMap) -> Result<()> {
        let layer = ctx.tech.layers.get(self.straps.layer)?;
        let dir = self.straps.dir(ctx)?;
        let area_width = self.area.length(!dir);
        let max_length = ctx.domain_area.length(dir);
        debug!(
            area = %self.area,
            layer = %layer.name,
            "determining channel repair parameters"
        );

        if self.try_fit(ctx, obstructions, area_width)? {
            return Ok(());
        }

        // reduce spacing to the minimum for this width and length
        self.straps.spacing = layer.spacing_for(self.straps.width, max_length);
        debug!(spacing = self.straps.spacing, "adjusted repair spacing");
        if self.try_fit(ctx, obstructions, area_width)? {
            return Ok(());
        }

        // halve the width down to the layer minimum
        while self.straps.width > layer.min_width {
            let new_width = ctx
                .tech
                .snap_to_mfg_grid(self.straps.width / 2, false)
                .max(layer.min_width);
            self.straps.width = new_width;
            self.straps.spacing = layer.spacing_for(new_width, max_length);
            debug!(
                width = self.straps.width,
                spacing = self.straps.spacing,
                "adjusted repair width"
            );
            if self.try_fit(ctx, obstructions, area_width)? {
                return Ok(());
            }
            if new_width == layer.min_width {
                break;
            }
        }

        self.invalid = true;
        Ok(())
    }

    fn try_fit(
        &mut self,
        ctx: &PlanCtx,
        obstructions: &ShapeTreeMap,
        area_width: i32,
    ) -> Result<bool> {
        if self.straps.group_width(ctx) > area_width {
            return Ok(false);
        }
        self.determine_offset(ctx, obstructions, 0, 0, 0)
    }

    /// Bisects the channel for an offset where the strap group avoids
    /// every obstruction. The search halves the step until it falls below
    /// the group width.
    fn determine_offset(
        &mut self,
        ctx: &PlanCtx,
        obstructions: &ShapeTreeMap,
        extra_offset: i32,
        bisect_dist: i32,
        level: u32,
    ) -> Result<bool> {
        let dir = self.straps.dir(ctx)?;
        let group_width = self.straps.group_width(ctx);
        let half_width = self.straps.width / 2;
        let cross = self.area.span(!dir);
        let mut offset = cross.center() - group_width / 2 + extra_offset + half_width;

        let group_start = offset - half_width;
        let estimated = Rect::from_dir_spans(
            dir,
            self.area.span(dir),
            geom::span::Span::new(group_start, group_start + group_width),
        );

        // the group must stay inside the channel
        if estimated.span(!dir).lo() < cross.lo() || estimated.span(!dir).hi() > cross.hi() {
            return Ok(false);
        }

        // check the strap layer and every routing layer down to the
        // channel layer
        let mut check_layers: Vec<Oid<Layer>> = ctx
            .tech
            .layers_between(self.connect_to, self.straps.layer)
            .into_iter()
            .filter(|&l| ctx.tech.layers.get(l).map(|l| l.is_routing()).unwrap_or(false))
            .collect();
        check_layers.push(self.straps.layer);

        let mut has_obstruction = false;
        for layer in check_layers {
            if let Some(tree) = obstructions.get(&layer) {
                if tree.any_intersecting(estimated, |_, _| true) {
                    has_obstruction = true;
                    break;
                }
            }
        }

        if has_obstruction {
            let new_bisect = if bisect_dist == 0 {
                self.area.length(!dir) / 4
            } else {
                bisect_dist / 2
            };
            let new_bisect = ctx.tech.snap_to_mfg_grid(new_bisect, false);
            if new_bisect == 0 || new_bisect < group_width {
                return Ok(false);
            }
            debug!(level, extra_offset, bisect = new_bisect, "bisecting channel offset");
            if self.determine_offset(ctx, obstructions, extra_offset - new_bisect, new_bisect, level + 1)? {
                return Ok(true);
            }
            return self.determine_offset(
                ctx,
                obstructions,
                extra_offset + new_bisect,
                new_bisect,
                level + 1,
            );
        }

        // anchor the offset to the domain edge the strap iteration uses
        offset -= ctx.domain_area.span(!dir).lo();
        self.straps.offset = Some(offset - half_width);
        Ok(true)
    }

    /// Builds the repair strap shapes.
    pub fn make_shapes(&mut self, ctx: &PlanCtx, grid_shapes: &ShapeTreeMap) -> Result<()> {
        self.straps.make_shapes(ctx, grid_shapes)
    }

    /// Cuts against obstructions, then drops any piece outside the
    /// channel area.
    pub fn cut_shapes(&mut self, ctx: &PlanCtx, obstructions: &ShapeTreeMap) -> Result<()> {
        self.straps.core.cut_shapes(ctx, obstructions)?;

        let mut remove = Vec::new();
        for tree in self.straps.core.shapes.values() {
            for (_, entry) in tree.entries() {
                if !entry.0.borrow().rect.intersects(&self.area) {
                    remove.push(entry.0.clone());
                }
            }
        }
        for shape in remove {
            self.straps.core.remove_shape(&shape);
        }
        Ok(())
    }
}

/// The highest layer carrying plain straps in the grid.
fn highest_strap_layer(ctx: &PlanCtx, grid: &Grid) -> Option<Oid<Layer>> {
    let mut best: Option<(u32, Oid<Layer>)> = None;
    for component in &grid.components {
        if let GridComponent::Straps(straps) = component {
            if let Ok(layer) = ctx.tech.layers.get(straps.layer) {
                let level = layer.routing_level;
                if best.map(|(l, _)| level > l).unwrap_or(true) {
                    best = Some((level, straps.layer));
                }
            }
        }
    }
    best.map(|(_, l)| l)
}

/// The lowest strap component connectable from `layer` through a single
/// connect rule.
fn target_strap(ctx: &PlanCtx, grid: &Grid, layer: Oid<Layer>) -> Option<usize> {
    let connects_to: BTreeSet<Oid<Layer>> = grid
        .connects
        .iter()
        .filter(|c| c.lower == layer)
        .map(|c| c.upper)
        .collect();
    if connects_to.is_empty() {
        return None;
    }

    let mut best: Option<(u32, usize)> = None;
    for (index, component) in grid.components.iter().enumerate() {
        if component.kind() != ComponentKind::Strap {
            continue;
        }
        if let GridComponent::Straps(straps) = component {
            if !connects_to.contains(&straps.layer) {
                continue;
            }
            let Ok(level) = ctx.tech.layers.get(straps.layer).map(|l| l.routing_level) else {
                continue;
            };
            if best.map(|(l, _)| level < l).unwrap_or(true) {
                best = Some((level, index));
            }
        }
    }
    best.map(|(_, i)| i)
}

/// Finds the repair channels of a grid: per layer below the highest strap
/// layer, the pitch-bloated union of strap and followpin shapes with no
/// connection above, clipped to the domain, keeping regions containing at
/// least one followpin or at least two straps.
pub fn find_repair_channels(ctx: &PlanCtx, grid: &Grid) -> Result<Vec<RepairChannelArea>> {
    let Some(highest) = highest_strap_layer(ctx, grid) else {
        return Ok(Vec::new());
    };
    let highest_level = ctx.tech.layers.get(highest)?.routing_level;

    let mut channels = Vec::new();
    let shapes = grid.shapes();
    for (&layer, tree) in &shapes {
        let level = ctx.tech.layers.get(layer)?.routing_level;
        if level >= highest_level {
            continue;
        }
        let Some(target) = target_strap(ctx, grid, layer) else {
            continue;
        };

        // collect the unconnected strap/followpin shapes, bloated by
        // their component's pitch across the strap axis
        let mut bloated: Vec<Rect> = Vec::new();
        let mut used: Vec<(Rect, Oid<Net>, bool)> = Vec::new();
        for (_, entry) in tree.entries() {
            let shape = entry.0.borrow();
            if shape.connections_above() != 0 {
                continue;
            }
            let Some(source) = shape.source else { continue };
            if source.grid != ctx.grid_index {
                continue;
            }
            let component = &grid.components[source.component];
            let Some((_, pitch, dir)) = component.strap_channel_info(ctx) else {
                continue;
            };
            let Some(net) = shape.net else { continue };
            bloated.push(shape.rect.expand_dir(!dir, pitch));
            used.push((shape.rect, net, shape.is_followpin()));
        }

        for slab in merge_to_slabs(&bloated) {
            let Some(area) = slab.intersection(&ctx.domain_boundary) else {
                continue;
            };
            let mut nets: Vec<Oid<Net>> = Vec::new();
            let mut followpin_count = 0;
            let mut strap_count = 0;
            for (rect, net, is_followpin) in &used {
                if area.overlaps(rect) {
                    if !nets.contains(net) {
                        nets.push(*net);
                    }
                    if *is_followpin {
                        followpin_count += 1;
                    } else {
                        strap_count += 1;
                    }
                }
            }
            // every followpin must connect; single stranded straps can be
            // ignored
            if followpin_count >= 1 || strap_count > 1 {
                channels.push(RepairChannelArea { area, connect_to: layer, target, nets });
            }
        }
    }
    Ok(channels)
}

/// Repairs the disconnected channels of a grid, inserting repair straps
/// and rebuilding vias until no repairable channel remains.
pub fn repair_grid_channels(
    grid: &mut Grid,
    ctx: &mut PlanCtx,
    global_shapes: &ShapeTreeMap,
    obstructions: &mut ShapeTreeMap,
    allow_partial: bool,
) -> Result<()> {
    let channels = find_repair_channels(ctx, grid)?;
    if channels.is_empty() {
        return Ok(());
    }
    debug!(count = channels.len(), "channels to repair");

    let mut repaired_areas: Vec<Rect> = Vec::new();
    for channel in &channels {
        // channels overlapping an already-repaired region retry on the
        // next round
        let overlaps_repaired = repaired_areas.iter().any(|other| {
            !(channel.area.right() <= other.left() || channel.area.left() >= other.right())
                || !(channel.area.top() <= other.bot() || channel.area.bot() >= other.top())
        });
        if overlaps_repaired {
            debug!(area = %channel.area, "skipping overlapping channel this round");
            continue;
        }

        let mut strap = RepairChannelStraps::new(ctx, grid, channel, obstructions)?;
        if !strap.is_repair_valid() {
            if allow_partial {
                continue;
            }
            return Err(Error::RepairInfeasible(format!(
                "channel {} on {} for {}",
                channel.area,
                ctx.tech.layers.get(channel.connect_to)?.name,
                strap.net_string(ctx)
            )));
        }

        let grid_shapes = grid.shapes();
        strap.make_shapes(ctx, &grid_shapes)?;
        strap.cut_shapes(ctx, obstructions)?;
        if strap.straps.core.shape_count() == 0 {
            continue;
        }
        strap.straps.core.collect_obstructions(obstructions);

        let grid_index = ctx.grid_index;
        grid.add_component(grid_index, GridComponent::Repair(strap));
        repaired_areas.push(channel.area);
    }

    if !repaired_areas.is_empty() {
        grid.make_vias(ctx, global_shapes, obstructions)?;
    }

    if channels.len() != repaired_areas.len() && !repaired_areas.is_empty() {
        // skipped channels may now be repairable
        return repair_grid_channels(grid, ctx, global_shapes, obstructions, allow_partial);
    }

    let remaining = find_repair_channels(ctx, grid)?;
    if !remaining.is_empty() {
        for channel in &remaining {
            warn!(
                area = %channel.area,
                layer = %ctx.tech.layers.get(channel.connect_to)?.name,
                "remaining unrepaired channel"
            );
        }
        if !allow_partial {
            return Err(Error::RepairInfeasible(format!(
                "{} channels could not be repaired",
                remaining.len()
            )));
        }
    }
    Ok(())
}
