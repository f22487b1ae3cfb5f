//! Periodic supply straps and standard-cell followpins.

use geom::dir::Dir;
use geom::rect::Rect;
use geom::span::Span;
use pdb::block::{MasterClass, WireShapeRole};
use pdb::layer::Layer;
use pdb::table::Oid;
use tracing::debug;

use crate::component::{check_layer_spacing, check_layer_width, ComponentCore, PlanCtx};
use crate::error::{Error, Result};
use crate::shape::{Shape, ShapeTreeMap};

/// How far straps extend along their run axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionMode {
    /// To the domain boundary.
    Core,
    /// To the outline of the rings.
    Rings,
    /// To the die boundary.
    Boundary,
    /// Between fixed coordinates.
    Fixed(i32, i32),
}

/// Axis-parallel periodic supply wires on one layer.
#[derive(Debug)]
pub struct Straps {
    /// Shared component state.
    pub core: ComponentCore,
    /// The strap layer.
    pub layer: Oid<Layer>,
    /// Strap width.
    pub width: i32,
    /// Center-to-center distance between same-net straps.
    pub pitch: i32,
    /// Spacing between adjacent nets of a group; 0 derives
    /// `pitch / nets - width`.
    pub spacing: i32,
    /// Offset from the domain edge to the first strap's lower edge;
    /// unset centers the first group within a pitch.
    pub offset: Option<i32>,
    /// Cap on the number of strap groups; 0 fills the domain.
    pub number_of_straps: u32,
    /// Snap strap centers to the layer's routing tracks.
    pub snap: bool,
    /// Extension mode of the strap ends.
    pub extend: ExtensionMode,
    /// The strap direction; defaults to the layer's preferred direction.
    pub direction: Option<Dir>,
}

impl Straps {
    /// Creates a strap component.
    pub fn new(layer: Oid<Layer>, width: i32, pitch: i32) -> Self {
        Self {
            core: ComponentCore::default(),
            layer,
            width,
            pitch,
            spacing: 0,
            offset: None,
            number_of_straps: 0,
            snap: false,
            extend: ExtensionMode::Core,
            direction: None,
        }
    }

    /// The strap run axis.
    pub fn dir(&self, ctx: &PlanCtx) -> Result<Dir> {
        if let Some(dir) = self.direction {
            return Ok(dir);
        }
        let layer = ctx.tech.layers.get(self.layer)?;
        layer.dir.axis().ok_or_else(|| {
            Error::Setup(format!(
                "cannot place straps on {} with no preferred routing direction",
                layer.name
            ))
        })
    }

    /// Resolves the net-to-net spacing: explicit, or `pitch / nets −
    /// width` rounded up to the manufacturing grid.
    pub fn resolved_spacing(&self, ctx: &PlanCtx) -> i32 {
        if self.spacing != 0 {
            return self.spacing;
        }
        let nets = self.core.nets(ctx).len().max(1) as i32;
        let spacing = self.pitch / nets - self.width;
        ctx.tech.snap_to_mfg_grid(spacing, true)
    }

    /// The extent of one strap group: every net's strap plus the spacing
    /// between them.
    pub fn group_width(&self, ctx: &PlanCtx) -> i32 {
        let nets = self.core.nets(ctx).len() as i32;
        nets * self.width + (nets - 1).max(0) * self.resolved_spacing(ctx)
    }

    /// Validates the strap parameters against the layer rules and the
    /// domain size.
    pub fn check(&self, ctx: &PlanCtx) -> Result<()> {
        let layer = ctx.tech.layers.get(self.layer)?;
        check_layer_width(ctx.tech, self.layer, self.width, layer.dir)?;
        let spacing = self.resolved_spacing(ctx);
        check_layer_spacing(ctx.tech, self.layer, self.width, spacing)?;

        let group = self.group_width(ctx);
        if self.pitch != 0 {
            let min_pitch = group + spacing;
            if self.pitch < min_pitch {
                return Err(Error::RuleViolation(format!(
                    "strap pitch {} on layer {} is below the group minimum {min_pitch}",
                    self.pitch, layer.name
                )));
            }
        }
        let dir = self.dir(ctx)?;
        let available = ctx.domain_area.length(!dir);
        if available < self.offset.unwrap_or(0) + group {
            return Err(Error::RuleViolation(format!(
                "insufficient width to place straps on layer {}",
                layer.name
            )));
        }
        Ok(())
    }

    /// Generates the strap rectangles, net by net within each pitch.
    pub fn make_shapes(&mut self, ctx: &PlanCtx, grid_shapes: &ShapeTreeMap) -> Result<()> {
        debug!("building strap shapes");
        self.core.clear_shapes();
        let dir = self.dir(ctx)?;
        let boundary = match self.extend {
            ExtensionMode::Core => ctx.domain_boundary,
            ExtensionMode::Rings => ctx.ring_area,
            ExtensionMode::Boundary => ctx.grid_boundary,
            ExtensionMode::Fixed(start, end) => {
                Rect::from_spans(Span::new(start, end), Span::new(start, end))
            }
        };

        // straps never overlay ring shapes on their own layer
        let avoid: Vec<Rect> = grid_shapes
            .get(&self.layer)
            .map(|tree| {
                tree.entries()
                    .into_iter()
                    .filter(|(_, s)| s.0.borrow().role == WireShapeRole::Ring)
                    .map(|(_, s)| s.0.borrow().obs)
                    .collect()
            })
            .unwrap_or_default();

        let run_span = boundary.span(dir);
        let cross_span = ctx.domain_area.span(!dir);
        self.make_straps(ctx, dir, run_span, cross_span, &avoid)
    }

    fn make_straps(
        &mut self,
        ctx: &PlanCtx,
        dir: Dir,
        run_span: Span,
        cross_span: Span,
        avoid: &[Rect],
    ) -> Result<()> {
        let layer = ctx.tech.layers.get(self.layer)?;
        let half = self.width / 2;
        let spacing = self.resolved_spacing(ctx);
        let nets = self.core.nets(ctx);
        let offset = self.offset.unwrap_or(self.pitch / 2 - half);
        if self.pitch <= 0 {
            return Err(Error::Setup("strap pitch must be positive".to_string()));
        }

        let mut group_count = 0u32;
        let mut last_end = i32::MIN / 2;
        let mut pos = cross_span.lo() + offset;
        while pos <= cross_span.hi() {
            let mut group_start = pos;
            for &net in &nets {
                let mut center = group_start + half;
                if self.snap {
                    center = layer.snap_to_track(center, last_end + spacing + half);
                }
                let start = center - half;
                let end = start + self.width;
                if start >= cross_span.hi() || center > cross_span.hi() {
                    // no further strap fits the domain
                    return Ok(());
                }
                let rect = Rect::from_dir_spans(dir, run_span, Span::new(start, end));
                last_end = end;
                group_start = end + spacing;

                if avoid.iter().any(|a| a.intersects(&rect)) {
                    continue;
                }
                self.core.add_shape(
                    ctx,
                    Shape::new(self.layer, net, rect, WireShapeRole::Stripe),
                )?;
            }
            group_count += 1;
            if self.number_of_straps != 0 && group_count == self.number_of_straps {
                return Ok(());
            }
            pos += self.pitch;
        }
        Ok(())
    }
}

/// Horizontal rails coincident with the standard-cell supply rows.
#[derive(Debug)]
pub struct FollowPins {
    /// Shared component state.
    pub core: ComponentCore,
    /// The rail layer.
    pub layer: Oid<Layer>,
    /// Rail width; 0 derives it from the narrowest core supply pin.
    pub width: i32,
    /// Extension mode of the rail ends.
    pub extend: ExtensionMode,
}

impl FollowPins {
    /// Creates a followpin component.
    pub fn new(layer: Oid<Layer>, width: i32) -> Self {
        Self { core: ComponentCore::default(), layer, width, extend: ExtensionMode::Core }
    }

    /// The rail pitch: twice the first row's height.
    pub fn pitch(&self, ctx: &PlanCtx) -> Result<i32> {
        let rows = ctx.domain.rows(ctx.block);
        let row = rows
            .first()
            .ok_or_else(|| Error::Setup("cannot derive followpin pitch without rows".to_string()))?;
        Ok(2 * row.bbox.dy())
    }

    /// The rail width: explicit, or the narrowest supply pin of any
    /// placed core instance.
    pub fn resolved_width(&self, ctx: &PlanCtx) -> Result<i32> {
        if self.width != 0 {
            return Ok(self.width);
        }
        let mut width = i32::MAX;
        for (_, iterm) in ctx.block.iterms.iter() {
            let Some(net) = iterm.net else { continue };
            let Ok(net) = ctx.block.nets.get(net) else { continue };
            if !net.sig.is_supply() {
                continue;
            }
            let Ok(inst) = ctx.block.insts.get(iterm.inst) else { continue };
            if inst.class != MasterClass::Core {
                continue;
            }
            for pin in &inst.pins {
                if pin.mterm == iterm.mterm && pin.layer == self.layer {
                    width = width.min(pin.rect.min_dxdy());
                }
            }
        }
        if width == i32::MAX {
            return Err(Error::Setup(
                "unable to determine the followpin width from standard cells".to_string(),
            ));
        }
        Ok(width)
    }

    /// Validates the rail width.
    pub fn check(&self, ctx: &PlanCtx) -> Result<()> {
        let width = self.resolved_width(ctx)?;
        let layer = ctx.tech.layers.get(self.layer)?;
        check_layer_width(ctx.tech, self.layer, width, layer.dir)
    }

    /// Generates one power and one ground rail per row; rails reaching
    /// the core edge extend to the followpin boundary.
    pub fn make_shapes(&mut self, ctx: &PlanCtx) -> Result<()> {
        debug!("building followpin shapes");
        self.core.clear_shapes();
        let width = self.resolved_width(ctx)?;
        let half = width / 2;
        let core = ctx.domain_area;
        let boundary = match self.extend {
            ExtensionMode::Core | ExtensionMode::Fixed(..) => ctx.domain_area,
            ExtensionMode::Rings => ctx.ring_area,
            ExtensionMode::Boundary => ctx.grid_boundary,
        };

        let power = ctx.domain.power;
        let ground = ctx.domain.ground;

        let row_indices: Vec<usize> = {
            let rows = ctx.domain.rows(ctx.block);
            ctx.block
                .rows
                .iter()
                .enumerate()
                .filter(|(_, row)| rows.iter().any(|r| std::ptr::eq(*r, *row)))
                .map(|(i, _)| i)
                .collect()
        };

        for row_index in row_indices {
            let row = &ctx.block.rows[row_index];
            let bbox = row.bbox;
            let power_on_top = row.orient == geom::orient::Orient::R0;

            let mut x0 = bbox.left();
            if x0 == core.left() {
                x0 = boundary.left();
            }
            let mut x1 = bbox.right();
            if x1 == core.right() {
                x1 = boundary.right();
            }

            let power_y = (if power_on_top { bbox.top() } else { bbox.bot() }) - half;
            let ground_y = (if power_on_top { bbox.bot() } else { bbox.top() }) - half;

            let mut power_rail = Shape::new(
                self.layer,
                power,
                Rect::from_sides(x0, power_y, x1, power_y + width),
                WireShapeRole::FollowPin,
            );
            power_rail.rows.insert(row_index);
            self.core.add_shape(ctx, power_rail)?;

            let mut ground_rail = Shape::new(
                self.layer,
                ground,
                Rect::from_sides(x0, ground_y, x1, ground_y + width),
                WireShapeRole::FollowPin,
            );
            ground_rail.rows.insert(row_index);
            self.core.add_shape(ctx, ground_rail)?;
        }
        Ok(())
    }
}
