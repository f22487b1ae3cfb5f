//! Post-plan via repair: delete vias under cut-layer obstructions.

use std::collections::BTreeMap;

use geom::rect::Rect;
use pdb::block::{Block, Net, SBox, ViaRef};
use pdb::layer::Layer;
use pdb::table::Oid;
use pdb::tech::Tech;
use tracing::{info, warn};

use crate::error::Result;

/// Per-cut-layer counts from a repair pass.
#[derive(Debug, Default, Clone)]
pub struct ViaRepairReport {
    /// Vias inspected per cut layer.
    pub via_count: BTreeMap<Oid<Layer>, usize>,
    /// Vias removed per cut layer.
    pub removal_count: BTreeMap<Oid<Layer>, usize>,
}

impl ViaRepairReport {
    /// Logs the removal summary.
    pub fn report(&self, tech: &Tech) {
        let mut removed_any = false;
        for (&layer, &removed) in &self.removal_count {
            if removed == 0 {
                continue;
            }
            removed_any = true;
            let total = self.via_count.get(&layer).copied().unwrap_or(0);
            let name = tech
                .layers
                .get(layer)
                .map(|l| l.name.to_string())
                .unwrap_or_else(|_| "?".to_string());
            info!(layer = %name, removed, total, "vias removed");
        }
        if !removed_any {
            info!("no vias removed");
        }
    }
}

/// Walks every via box of the target nets and removes those lying within
/// cut-layer obstructions of the block, placed instances, and signal-net
/// wire vias.
#[derive(Debug)]
pub struct ViaRepair {
    nets: Vec<Oid<Net>>,
    /// Consider block-level obstructions.
    pub use_obstructions: bool,
    /// Consider signal-net wire vias.
    pub use_nets: bool,
    /// Consider placed-instance cut geometry.
    pub use_instances: bool,
}

impl ViaRepair {
    /// Creates a repair pass over the given supply nets.
    pub fn new(nets: Vec<Oid<Net>>) -> Self {
        Self { nets, use_obstructions: true, use_nets: true, use_instances: true }
    }

    /// Runs the pass, deleting conflicting tech-via boxes. Block-via
    /// conflicts are reported but left in place.
    pub fn repair(&self, tech: &Tech, block: &mut Block) -> Result<ViaRepairReport> {
        let mut report = ViaRepairReport::default();
        let obstructions = self.collect_obstructions(tech, block)?;

        // count the vias under inspection
        for &net in &self.nets {
            let record = block.nets.get(net)?;
            for swire in &record.swires {
                for sbox in &swire.boxes {
                    if let SBox::Via { via, origin, .. } = sbox {
                        let mut cut_layers: Vec<Oid<Layer>> = via_cut_boxes_at(tech, block, via, *origin)?
                            .into_iter()
                            .map(|(layer, _)| layer)
                            .collect();
                        cut_layers.dedup();
                        for cut_layer in cut_layers {
                            *report.via_count.entry(cut_layer).or_default() += 1;
                        }
                    }
                }
            }
        }

        for &net in &self.nets {
            // decide removals before mutating the net
            let mut keep_flags: Vec<Vec<bool>> = Vec::new();
            let mut removals: BTreeMap<Oid<Layer>, usize> = BTreeMap::new();
            let mut block_via_conflicts = 0usize;
            {
                let record = block.nets.get(net)?;
                for swire in &record.swires {
                    let mut flags = Vec::with_capacity(swire.boxes.len());
                    for sbox in &swire.boxes {
                        let keep = match sbox {
                            SBox::Via { via, origin, .. } => {
                                let mut conflicted_layer = None;
                                for (cut_layer, cut_rect) in
                                    via_cut_boxes_at(tech, block, via, *origin)?
                                {
                                    if let Some(obs) = obstructions.get(&cut_layer) {
                                        if obs.iter().any(|o| o.intersects(&cut_rect)) {
                                            conflicted_layer = Some(cut_layer);
                                            break;
                                        }
                                    }
                                }
                                match (conflicted_layer, via) {
                                    (None, _) => true,
                                    (Some(layer), ViaRef::Tech(_)) => {
                                        *removals.entry(layer).or_default() += 1;
                                        false
                                    }
                                    (Some(_), ViaRef::Block(_)) => {
                                        block_via_conflicts += 1;
                                        true
                                    }
                                }
                            }
                            SBox::Rect { .. } => true,
                        };
                        flags.push(keep);
                    }
                    keep_flags.push(flags);
                }
            }
            if block_via_conflicts > 0 {
                warn!(
                    count = block_via_conflicts,
                    "conflicting block vias cannot be removed"
                );
            }

            let record = block.nets.get_mut(net)?;
            for (swire, flags) in record.swires.iter_mut().zip(keep_flags) {
                let mut it = flags.into_iter();
                swire.boxes.retain(|_| it.next().unwrap_or(true));
            }
            for (layer, count) in removals {
                *report.removal_count.entry(layer).or_default() += count;
            }
        }
        Ok(report)
    }

    fn collect_obstructions(
        &self,
        tech: &Tech,
        block: &Block,
    ) -> Result<BTreeMap<Oid<Layer>, Vec<Rect>>> {
        let mut out: BTreeMap<Oid<Layer>, Vec<Rect>> = BTreeMap::new();

        if self.use_obstructions {
            for obs in &block.obstructions {
                let Some(layer) = obs.layer else { continue };
                if tech.layers.get(layer)?.is_routing() {
                    continue;
                }
                out.entry(layer).or_default().push(obs.rect);
            }
        }

        if self.use_instances {
            for (_, inst) in block.insts.iter() {
                if !inst.placed {
                    continue;
                }
                for (layer, rect) in inst.obstruction_rects() {
                    if !tech.layers.get(layer)?.is_routing() {
                        out.entry(layer).or_default().push(rect);
                    }
                }
                for (layer, rect) in inst.all_pin_rects() {
                    if !tech.layers.get(layer)?.is_routing() {
                        out.entry(layer).or_default().push(rect);
                    }
                }
            }
        }

        if self.use_nets {
            for (net_id, net) in block.nets.iter() {
                if self.nets.contains(&net_id) || net.sig.is_supply() {
                    continue;
                }
                let Some(wire) = net.wire() else { continue };
                let wire = block.wires.get(wire)?;
                for shape in pdb::wire::wire_shapes(wire, tech, block)? {
                    match shape {
                        pdb::wire::WireShape::TechVia { via, origin, .. } => {
                            let via = tech.vias.get(via)?;
                            for vbox in via.boxes_on(via.cut) {
                                out.entry(via.cut)
                                    .or_default()
                                    .push(vbox.rect.translate(origin));
                            }
                        }
                        pdb::wire::WireShape::BlockVia { via, origin, .. } => {
                            let via = block.vias.get(via)?;
                            for vbox in &via.boxes {
                                if !tech.layers.get(vbox.layer)?.is_routing() {
                                    out.entry(vbox.layer)
                                        .or_default()
                                        .push(vbox.rect.translate(origin));
                                }
                            }
                        }
                        pdb::wire::WireShape::Segment { .. } => {}
                    }
                }
            }
        }
        Ok(out)
    }
}

/// The cut-layer boxes of a via placed at `origin`.
fn via_cut_boxes_at(
    tech: &Tech,
    block: &Block,
    via: &ViaRef,
    origin: geom::point::Point,
) -> Result<Vec<(Oid<Layer>, Rect)>> {
    let mut out = Vec::new();
    match via {
        ViaRef::Tech(oid) => {
            let via = tech.vias.get(*oid)?;
            for vbox in via.boxes_on(via.cut) {
                out.push((via.cut, vbox.rect.translate(origin)));
            }
        }
        ViaRef::Block(oid) => {
            let via = block.vias.get(*oid)?;
            for vbox in &via.boxes {
                if !tech.layers.get(vbox.layer)?.is_routing() {
                    out.push((vbox.layer, vbox.rect.translate(origin)));
                }
            }
        }
    }
    Ok(out)
}
