//! Pad-to-core direct connection straps.

use geom::dir::Dir;
use geom::rect::Rect;
use geom::side::Side;
use pdb::block::{ITerm, MasterClass, Net, WireShapeRole};
use pdb::layer::{Layer, LayerDir};
use pdb::table::Oid;
use tracing::debug;

use crate::component::{ComponentCore, PlanCtx};
use crate::error::Result;
use crate::shape::{Shape, ShapeTreeMap};

/// A strap from one pad supply terminal to the nearest ring of the same
/// net.
///
/// The pad's edge (north, south, east, or west) is classified by its
/// position relative to the core; only pins on correct-direction routing
/// layers that face the core are connected.
#[derive(Debug)]
pub struct PadDirectConnect {
    /// Shared component state.
    pub core: ComponentCore,
    /// The pad instance terminal being connected.
    pub iterm: Oid<ITerm>,
    /// Restrict connections to these layers; empty allows all.
    pub layers: Vec<Oid<Layer>>,
    pad_edge: Option<Side>,
    /// Facing pin rectangles, in block coordinates.
    pins: Vec<(Oid<Layer>, Rect)>,
    net: Option<Oid<Net>>,
}

impl PadDirectConnect {
    /// Creates a pad connection for one instance terminal, classifying
    /// the pad edge and collecting the facing pins.
    pub fn new(ctx: &PlanCtx, iterm_id: Oid<ITerm>, layers: Vec<Oid<Layer>>) -> Result<Self> {
        let mut this = Self {
            core: ComponentCore::default(),
            iterm: iterm_id,
            layers,
            pad_edge: None,
            pins: Vec::new(),
            net: None,
        };
        this.initialize(ctx)?;
        Ok(this)
    }

    /// True if the pad has connectable pins on a classified edge.
    pub fn can_connect(&self) -> bool {
        self.pad_edge.is_some() && !self.pins.is_empty() && self.net.is_some()
    }

    /// The classified pad edge.
    pub fn pad_edge(&self) -> Option<Side> {
        self.pad_edge
    }

    fn initialize(&mut self, ctx: &PlanCtx) -> Result<()> {
        let iterm = ctx.block.iterms.get(self.iterm)?;
        self.net = iterm.net;
        let inst = ctx.block.insts.get(iterm.inst)?;
        if !inst.placed || inst.class != MasterClass::Pad {
            return Ok(());
        }
        let inst_rect = inst.bbox;
        let core = ctx.block.core_area;

        let is_north = inst_rect.bot() > core.top();
        let is_south = inst_rect.top() < core.bot();
        let is_west = inst_rect.right() < core.left();
        let is_east = inst_rect.left() > core.right();
        self.pad_edge = match (is_north, is_south, is_west, is_east) {
            (true, _, _, _) => Some(Side::Top),
            (_, true, _, _) => Some(Side::Bot),
            (_, _, true, _) => Some(Side::Left),
            (_, _, _, true) => Some(Side::Right),
            _ => None,
        };
        let Some(edge) = self.pad_edge else {
            return Ok(());
        };
        debug!(
            inst = %inst.name,
            mterm = %iterm.mterm,
            ?edge,
            "classifying pad connection edge"
        );

        // a west/east pad runs a horizontal strap into the core
        let strap_dir = if matches!(edge, Side::Left | Side::Right) {
            Dir::Horiz
        } else {
            Dir::Vert
        };

        for pin in &inst.pins {
            if pin.mterm != iterm.mterm {
                continue;
            }
            let layer = ctx.tech.layers.get(pin.layer)?;
            if !layer.is_routing() {
                continue;
            }
            if !self.layers.is_empty() && !self.layers.contains(&pin.layer) {
                continue;
            }
            let wanted = match strap_dir {
                Dir::Horiz => LayerDir::Horizontal,
                Dir::Vert => LayerDir::Vertical,
            };
            if layer.dir != wanted {
                continue;
            }
            let rect = inst.xform.apply_rect(pin.rect);
            // keep only pins on the face toward the core
            let facing = match edge {
                Side::Top => rect.bot() == inst_rect.bot(),
                Side::Bot => rect.top() == inst_rect.top(),
                Side::Left => rect.right() == inst_rect.right(),
                Side::Right => rect.left() == inst_rect.left(),
            };
            if facing {
                self.pins.push((pin.layer, rect));
            }
        }
        Ok(())
    }

    /// Runs a strap from each facing pin to the nearest same-net ring
    /// shape, clamped to the layer's maximum width.
    pub fn make_shapes(&mut self, ctx: &PlanCtx, grid_shapes: &ShapeTreeMap) -> Result<()> {
        self.core.clear_shapes();
        let Some(edge) = self.pad_edge else {
            return Ok(());
        };
        let Some(net) = self.net else {
            return Ok(());
        };
        let die = ctx.block.die_area;
        let horizontal = matches!(edge, Side::Left | Side::Right);

        for &(layer_id, pin_rect) in &self.pins {
            // sweep from the pin across the die toward the core
            let search = if horizontal {
                pin_rect.with_hspan(die.hspan())
            } else {
                pin_rect.with_vspan(die.vspan())
            };

            let mut closest: Option<(i32, Rect)> = None;
            for (search_layer, tree) in grid_shapes {
                if *search_layer == layer_id {
                    continue;
                }
                for (_, entry) in tree.intersecting(search) {
                    let shape = entry.0.borrow();
                    if shape.net != Some(net) || shape.role != WireShapeRole::Ring {
                        continue;
                    }
                    let dist = match edge {
                        Side::Left => shape.rect.left() - pin_rect.right(),
                        Side::Right => pin_rect.left() - shape.rect.right(),
                        Side::Bot => shape.rect.bot() - pin_rect.top(),
                        Side::Top => pin_rect.bot() - shape.rect.top(),
                    };
                    if closest.map(|(d, _)| dist < d).unwrap_or(true) {
                        closest = Some((dist, shape.rect));
                    }
                }
            }
            let Some((_, target)) = closest else {
                debug!("no reachable target for pad pin; skipping");
                continue;
            };

            let mut rect = pin_rect;
            match edge {
                Side::Left => {
                    rect = rect.with_hspan(geom::span::Span::new(rect.left(), target.right()))
                }
                Side::Right => {
                    rect = rect.with_hspan(geom::span::Span::new(target.left(), rect.right()))
                }
                Side::Bot => {
                    rect = rect.with_vspan(geom::span::Span::new(rect.bot(), target.top()))
                }
                Side::Top => {
                    rect = rect.with_vspan(geom::span::Span::new(target.bot(), rect.top()))
                }
            }

            // clamp to the layer's maximum width
            let layer = ctx.tech.layers.get(layer_id)?;
            if layer.max_width != i32::MAX {
                if horizontal && rect.dy() > layer.max_width {
                    rect = rect.with_vspan(geom::span::Span::new(
                        rect.bot(),
                        rect.bot() + layer.max_width,
                    ));
                } else if !horizontal && rect.dx() > layer.max_width {
                    rect = rect.with_hspan(geom::span::Span::new(
                        rect.left(),
                        rect.left() + layer.max_width,
                    ));
                }
            }

            let mut shape = Shape::new(layer_id, net, rect, WireShapeRole::Stripe);
            if let Some(touch) = pin_rect.intersection(&rect) {
                shape.iterm_connections.insert(touch);
            }
            self.core.add_shape(ctx, shape)?;
        }
        Ok(())
    }
}
