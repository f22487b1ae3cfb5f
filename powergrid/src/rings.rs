//! Perimeter supply rings.

use geom::rect::Rect;
use geom::side::{Side, Sides};
use pdb::block::{MasterClass, WireShapeRole};
use pdb::layer::{Layer, LayerDir};
use pdb::table::Oid;
use tracing::{debug, warn};

use crate::component::{check_layer_spacing, check_layer_width, ComponentCore, PlanCtx};
use crate::error::{Error, Result};
use crate::shape::Shape;

/// One of the two ring layers.
#[derive(Debug, Clone, Copy)]
pub struct RingLayer {
    /// The routing layer.
    pub layer: Oid<Layer>,
    /// Ring wire width.
    pub width: i32,
    /// Spacing between concentric rings.
    pub spacing: i32,
}

/// A pair of concentric perimeter rings per supply net, on two
/// perpendicular layers.
#[derive(Debug)]
pub struct Rings {
    /// Shared component state.
    pub core: ComponentCore,
    /// The two ring layers; one must be horizontal, the other vertical.
    pub layers: [RingLayer; 2],
    /// Offsets from the domain boundary to the innermost ring
    /// (left, bottom, right, top).
    pub offset: Sides<i32>,
    /// Extend ring ends to the die boundary.
    pub extend_to_boundary: bool,
}

impl Rings {
    /// Creates a ring component.
    pub fn new(layers: [RingLayer; 2], offset: Sides<i32>) -> Self {
        Self { core: ComponentCore::default(), layers, offset, extend_to_boundary: false }
    }

    /// Derives the core offsets from the inner edge of the placed pads,
    /// less the given pad offsets and the ring stack width.
    pub fn set_pad_offset(&mut self, ctx: &PlanCtx, pad_offset: Sides<i32>) -> Result<()> {
        let die = ctx.block.die_area;
        let core = ctx.block.core_area;
        let mut pads_inner = die;

        for (_, inst) in ctx.block.insts.iter() {
            if !inst.placed || inst.class != MasterClass::Pad {
                continue;
            }
            let bbox = inst.bbox;
            let ns_with_core = bbox.left() >= core.left() && bbox.right() <= core.right();
            let ew_with_core = bbox.bot() >= core.bot() && bbox.top() <= core.top();
            if bbox.bot() > core.top() && ns_with_core {
                pads_inner = pads_inner
                    .with_vspan(geom::span::Span::new(pads_inner.bot(), pads_inner.top().min(bbox.bot())));
            } else if bbox.top() < core.bot() && ns_with_core {
                pads_inner = pads_inner
                    .with_vspan(geom::span::Span::new(pads_inner.bot().max(bbox.top()), pads_inner.top()));
            } else if bbox.right() < core.left() && ew_with_core {
                pads_inner = pads_inner
                    .with_hspan(geom::span::Span::new(pads_inner.left().max(bbox.right()), pads_inner.right()));
            } else if bbox.left() > core.right() && ew_with_core {
                pads_inner = pads_inner
                    .with_hspan(geom::span::Span::new(pads_inner.left(), pads_inner.right().min(bbox.left())));
            }
        }

        if pads_inner == core {
            warn!("no placed pads found; using the die boundary for the pad offset");
            pads_inner = die;
        }

        let (hor, ver) = self.total_widths(ctx)?;
        self.offset = Sides::new(
            core.left() - pads_inner.left() - pad_offset[Side::Left] - ver,
            core.bot() - pads_inner.bot() - pad_offset[Side::Bot] - hor,
            pads_inner.right() - core.right() - pad_offset[Side::Right] - ver,
            pads_inner.top() - core.top() - pad_offset[Side::Top] - hor,
        );
        Ok(())
    }

    fn ring_count(&self, ctx: &PlanCtx) -> i32 {
        self.core.nets(ctx).len() as i32
    }

    /// The stacked width of all rings: (horizontal bands, vertical bands).
    pub fn total_widths(&self, ctx: &PlanCtx) -> Result<(i32, i32)> {
        let rings = self.ring_count(ctx);
        let total = |l: &RingLayer| l.width * rings + l.spacing * (rings - 1).max(0);
        let mut hor = total(&self.layers[0]);
        let mut ver = total(&self.layers[1]);
        if ctx.tech.layers.get(self.layers[0].layer)?.dir != LayerDir::Horizontal {
            std::mem::swap(&mut hor, &mut ver);
        }
        Ok((hor, ver))
    }

    /// The outline of the innermost ring.
    pub fn inner_ring_outline(&self, domain_area: Rect) -> Rect {
        domain_area.expand_sides(self.offset)
    }

    /// The outline of the full ring stack, for grid-level obstructions.
    pub fn outer_outline(&self, ctx: &PlanCtx) -> Result<(Rect, Vec<Oid<Layer>>)> {
        let (hor, ver) = self.total_widths(ctx)?;
        let rect = self
            .inner_ring_outline(ctx.domain_area)
            .expand_sides(Sides::new(ver, hor, ver, hor));
        Ok((rect, vec![self.layers[0].layer, self.layers[1].layer]))
    }

    /// Validates the ring widths, spacings, and offsets.
    pub fn check(&self, ctx: &PlanCtx) -> Result<()> {
        for ring in &self.layers {
            let layer = ctx.tech.layers.get(ring.layer)?;
            check_layer_width(ctx.tech, ring.layer, ring.width, layer.dir)?;
            check_layer_spacing(ctx.tech, ring.layer, ring.width, ring.spacing)?;
            for side in Side::all() {
                if !ctx.tech.on_mfg_grid(self.offset[side]) {
                    return Err(Error::RuleViolation(format!(
                        "ring offset {} is off the manufacturing grid",
                        self.offset[side]
                    )));
                }
            }
        }
        let h_is_horizontal =
            ctx.tech.layers.get(self.layers[0].layer)?.dir == LayerDir::Horizontal;
        let v_is_vertical = ctx.tech.layers.get(self.layers[1].layer)?.dir == LayerDir::Vertical;
        let h_is_vertical = ctx.tech.layers.get(self.layers[0].layer)?.dir == LayerDir::Vertical;
        let v_is_horizontal =
            ctx.tech.layers.get(self.layers[1].layer)?.dir == LayerDir::Horizontal;
        if !((h_is_horizontal && v_is_vertical) || (h_is_vertical && v_is_horizontal)) {
            return Err(Error::Setup(
                "ring layers must have perpendicular preferred directions".to_string(),
            ));
        }
        self.check_die_area(ctx)
    }

    fn check_die_area(&self, ctx: &PlanCtx) -> Result<()> {
        let (hor, ver) = self.total_widths(ctx)?;
        let outline = self
            .inner_ring_outline(ctx.domain_area)
            .expand_sides(Sides::new(ver, hor, ver, hor));
        if !ctx.block.die_area.contains(&outline) {
            warn!("core ring shape falls outside the die bounds");
        }
        Ok(())
    }

    /// Generates the ring rectangles, one concentric ring per net.
    pub fn make_shapes(&mut self, ctx: &PlanCtx) -> Result<()> {
        debug!("building ring shapes");
        self.core.clear_shapes();
        let nets = self.core.nets(ctx);
        let outline = self.inner_ring_outline(ctx.domain_area);
        let boundary = ctx.grid_boundary;

        for ring in self.layers {
            let layer = ctx.tech.layers.get(ring.layer)?;
            let width = ring.width;
            let pitch = ring.spacing + width;

            if layer.dir == LayerDir::Horizontal {
                // bottom and top bands
                let mut x_start = outline.left() - width;
                let mut x_end = outline.right() + width;
                if self.extend_to_boundary {
                    x_start = boundary.left();
                    x_end = boundary.right();
                }
                let mut y_start = outline.bot() - width;
                let mut y_end = outline.bot();
                for &net in &nets {
                    self.core.add_shape(
                        ctx,
                        Shape::new(
                            ring.layer,
                            net,
                            Rect::from_sides(x_start, y_start, x_end, y_end),
                            WireShapeRole::Ring,
                        ),
                    )?;
                    if !self.extend_to_boundary {
                        x_start -= pitch;
                        x_end += pitch;
                    }
                    y_start -= pitch;
                    y_end -= pitch;
                }

                let mut x_start = outline.left() - width;
                let mut x_end = outline.right() + width;
                if self.extend_to_boundary {
                    x_start = boundary.left();
                    x_end = boundary.right();
                }
                let mut y_start = outline.top();
                let mut y_end = y_start + width;
                for &net in &nets {
                    self.core.add_shape(
                        ctx,
                        Shape::new(
                            ring.layer,
                            net,
                            Rect::from_sides(x_start, y_start, x_end, y_end),
                            WireShapeRole::Ring,
                        ),
                    )?;
                    if !self.extend_to_boundary {
                        x_start -= pitch;
                        x_end += pitch;
                    }
                    y_start += pitch;
                    y_end += pitch;
                }
            } else {
                // left and right bands
                let mut y_start = outline.bot() - width;
                let mut y_end = outline.top() + width;
                if self.extend_to_boundary {
                    y_start = boundary.bot();
                    y_end = boundary.top();
                }
                let mut x_start = outline.left() - width;
                let mut x_end = outline.left();
                for &net in &nets {
                    self.core.add_shape(
                        ctx,
                        Shape::new(
                            ring.layer,
                            net,
                            Rect::from_sides(x_start, y_start, x_end, y_end),
                            WireShapeRole::Ring,
                        ),
                    )?;
                    x_start -= pitch;
                    x_end -= pitch;
                    if !self.extend_to_boundary {
                        y_start -= pitch;
                        y_end += pitch;
                    }
                }

                let mut y_start = outline.bot() - width;
                let mut y_end = outline.top() + width;
                if self.extend_to_boundary {
                    y_start = boundary.bot();
                    y_end = boundary.top();
                }
                let mut x_start = outline.right();
                let mut x_end = x_start + width;
                for &net in &nets {
                    self.core.add_shape(
                        ctx,
                        Shape::new(
                            ring.layer,
                            net,
                            Rect::from_sides(x_start, y_start, x_end, y_end),
                            WireShapeRole::Ring,
                        ),
                    )?;
                    x_start += pitch;
                    x_end += pitch;
                    if !self.extend_to_boundary {
                        y_start -= pitch;
                        y_end += pitch;
                    }
                }
            }
        }
        Ok(())
    }
}
