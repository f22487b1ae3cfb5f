//! Via instances and via generation.
//!
//! Via generation picks, for one pair of adjacent routing layers and one
//! metal intersection, the generate rule or fixed tech via that yields the
//! greatest total cut area while satisfying cut-class, min-cut, and
//! enclosure rules. Multi-layer connections stack one such via per
//! adjacent pair.

use std::rc::Rc;

use arcstr::ArcStr;
use geom::point::Point;
use geom::rect::Rect;
use pdb::block::{Block, Net, SBox, ViaRef, WireShapeRole};
use pdb::layer::{ArrayCuts, Layer};
use pdb::table::Oid;
use pdb::tech::Tech;
use pdb::via::{BlockVia, TechVia, ViaGenerateRule, ViaParams};
use tracing::{debug, warn};

use crate::error::Result;
use crate::shape::ShapePtr;

/// Identifies the connect rule a via was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRef {
    /// Index of the grid in the planner.
    pub grid: usize,
    /// Index of the connect within the grid.
    pub index: usize,
}

/// A via instance joining a lower and an upper shape.
#[derive(Debug, Clone)]
pub struct Via {
    /// The net the via belongs to.
    pub net: Oid<Net>,
    /// The intersection of the two shapes.
    pub area: Rect,
    /// The lower shape, dropped when the shape is destroyed.
    pub lower: Option<ShapePtr>,
    /// The upper shape, dropped when the shape is destroyed.
    pub upper: Option<ShapePtr>,
    /// The connect rule that will realize the via.
    pub connect: ConnectRef,
    lower_layer: Oid<Layer>,
    upper_layer: Oid<Layer>,
}

impl Via {
    /// Creates a via instance.
    pub fn new(
        connect: ConnectRef,
        net: Oid<Net>,
        area: Rect,
        lower_layer: Oid<Layer>,
        upper_layer: Oid<Layer>,
        lower: ShapePtr,
        upper: ShapePtr,
    ) -> Self {
        Self {
            net,
            area,
            lower: Some(lower),
            upper: Some(upper),
            connect,
            lower_layer,
            upper_layer,
        }
    }

    /// The lower routing layer.
    pub fn lower_layer(&self) -> Oid<Layer> {
        self.lower_layer
    }

    /// The upper routing layer.
    pub fn upper_layer(&self) -> Oid<Layer> {
        self.upper_layer
    }

    /// True while both shapes are attached.
    pub fn is_valid(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    /// Detaches a destroyed shape.
    pub fn detach_shape(&mut self, shape: &ShapePtr) {
        if self.lower.as_ref().is_some_and(|s| Rc::ptr_eq(s, shape)) {
            self.lower = None;
        }
        if self.upper.as_ref().is_some_and(|s| Rc::ptr_eq(s, shape)) {
            self.upper = None;
        }
    }

    /// Re-attaches a replacement shape on its side, by layer.
    ///
    /// Returns false when the shape's layer matches neither side.
    pub fn reattach_shape(&mut self, shape: &ShapePtr) -> bool {
        let layer = shape.borrow().layer;
        if layer == self.lower_layer {
            self.lower = Some(shape.clone());
            true
        } else if layer == self.upper_layer {
            self.upper = Some(shape.clone());
            true
        } else {
            false
        }
    }
}

/// The metal footprints a placed via produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlacedShapes {
    /// Footprint on the bottom routing layer.
    pub bottom: Option<Rect>,
    /// Footprint on the top routing layer.
    pub top: Option<Rect>,
}

impl PlacedShapes {
    fn merge(&mut self, other: PlacedShapes) {
        self.bottom = match (self.bottom, other.bottom) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        self.top = match (self.top, other.top) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
    }
}

/// A single generated via description.
#[derive(Debug, Clone, PartialEq)]
pub struct GenVia {
    /// The source generate rule, for the via name.
    pub rule_name: ArcStr,
    /// Bottom routing layer.
    pub bottom: Oid<Layer>,
    /// Cut layer.
    pub cut: Oid<Layer>,
    /// Top routing layer.
    pub top: Oid<Layer>,
    /// The cut geometry of the rule.
    pub cut_rect: Rect,
    /// Cut rows.
    pub rows: i32,
    /// Cut columns.
    pub cols: i32,
    /// Center-to-center cut pitch, per axis.
    pub cut_pitch: (i32, i32),
    /// Bottom metal enclosure, per axis.
    pub bottom_enclosure: (i32, i32),
    /// Top metal enclosure, per axis.
    pub top_enclosure: (i32, i32),
}

impl GenVia {
    /// The extent of the via, optionally including the enclosures.
    pub fn via_rect(&self, include_enclosure: bool) -> Rect {
        let width = (self.cols - 1) * self.cut_pitch.0 + self.cut_rect.dx();
        let height = (self.rows - 1) * self.cut_pitch.1 + self.cut_rect.dy();
        let x_enc = if include_enclosure {
            self.bottom_enclosure.0.max(self.top_enclosure.0)
        } else {
            0
        };
        let y_enc = if include_enclosure {
            self.bottom_enclosure.1.max(self.top_enclosure.1)
        } else {
            0
        };
        Rect::from_sides(0, 0, width + 2 * x_enc, height + 2 * y_enc)
    }

    /// The database via name: layers, size, rows/cols, and pitch.
    fn db_name(&self, tech: &Tech) -> Result<String> {
        let bottom = tech.layers.get(self.bottom)?.routing_level;
        let top = tech.layers.get(self.top)?.routing_level;
        let size = self.via_rect(true);
        Ok(format!(
            "via{}_{}_{}_{}_{}_{}_{}_{}",
            bottom,
            top,
            size.dx(),
            size.dy(),
            self.rows,
            self.cols,
            self.cut_pitch.0,
            self.cut_pitch.1
        ))
    }

    fn params(&self) -> ViaParams {
        ViaParams {
            cut_size: (self.cut_rect.dx(), self.cut_rect.dy()),
            cut_spacing: (
                self.cut_pitch.0 - self.cut_rect.dx(),
                self.cut_pitch.1 - self.cut_rect.dy(),
            ),
            bottom_enclosure: self.bottom_enclosure,
            top_enclosure: self.top_enclosure,
            rows: self.rows as u32,
            cols: self.cols as u32,
            bottom: self.bottom,
            cut: self.cut,
            top: self.top,
        }
    }

    fn place(
        &self,
        tech: &Tech,
        block: &mut Block,
        net: Oid<Net>,
        swire: usize,
        role: WireShapeRole,
        x: i32,
        y: i32,
    ) -> Result<PlacedShapes> {
        let name = self.db_name(tech)?;
        let via = match block.find_via(&name) {
            Ok(via) => via,
            Err(_) => block.add_via(BlockVia::from_params(
                name,
                Some(self.rule_name.clone()),
                self.params(),
            )),
        };
        place_block_via(block, net, swire, via, role, Point::new(x, y))
    }
}

/// The realized form of a via between two routing layers.
#[derive(Debug, Clone, PartialEq)]
pub enum DbVia {
    /// A fixed tech via.
    Tech {
        /// The via definition.
        via: Oid<TechVia>,
    },
    /// A generated via.
    Generate(GenVia),
    /// An array of generated vias: a core sub-array plus end-of-row and
    /// end-of-column remainders.
    Array {
        /// The repeated core via.
        core: Box<GenVia>,
        /// The remainder rows via.
        end_of_row: Option<Box<GenVia>>,
        /// The remainder columns via.
        end_of_column: Option<Box<GenVia>>,
        /// The corner remainder via.
        end_of_row_column: Option<Box<GenVia>>,
        /// Array rows (including a remainder row).
        rows: i32,
        /// Array columns (including a remainder column).
        cols: i32,
        /// Spacing between neighboring sub-arrays.
        spacing: (i32, i32),
    },
    /// One via per adjacent layer pair, placed at the same point.
    Stacked(Vec<DbVia>),
    /// A placeholder for a connection that could not be built; placing it
    /// only reports the gap.
    Dummy {
        /// The unconnected area.
        area: Rect,
        /// The lower routing layer.
        lower: Oid<Layer>,
        /// The upper routing layer.
        upper: Oid<Layer>,
    },
}

impl DbVia {
    /// True when the connection could not be built.
    pub fn is_dummy(&self) -> bool {
        match self {
            DbVia::Dummy { .. } => true,
            DbVia::Stacked(stack) => stack.iter().any(DbVia::is_dummy),
            _ => false,
        }
    }

    /// Materializes the via at `(x, y)` into the special wire, creating
    /// database via definitions on first use.
    pub fn place(
        &self,
        tech: &Tech,
        block: &mut Block,
        net: Oid<Net>,
        swire: usize,
        role: WireShapeRole,
        x: i32,
        y: i32,
    ) -> Result<PlacedShapes> {
        match self {
            DbVia::Tech { via } => {
                place_tech_via(tech, block, net, swire, *via, role, Point::new(x, y))
            }
            DbVia::Generate(via) => via.place(tech, block, net, swire, role, x, y),
            DbVia::Array {
                core,
                end_of_row,
                end_of_column,
                end_of_row_column,
                rows,
                cols,
                spacing,
            } => {
                let core_rect = core.via_rect(false);
                // center the whole array on the placement point
                let (total_width, x_offset) = {
                    let mut w = (cols - 1) * (spacing.0 + core_rect.dx());
                    let off = match end_of_column {
                        Some(end) => {
                            let r = end.via_rect(false);
                            w += r.dx();
                            r.dx() / 2
                        }
                        None => {
                            w += core_rect.dx();
                            core_rect.dx() / 2
                        }
                    };
                    (w, off)
                };
                let (total_height, y_offset) = {
                    let mut h = (rows - 1) * (spacing.1 + core_rect.dy());
                    let off = match end_of_row {
                        Some(end) => {
                            let r = end.via_rect(false);
                            h += r.dy();
                            r.dy() / 2
                        }
                        None => {
                            h += core_rect.dy();
                            core_rect.dy() / 2
                        }
                    };
                    (h, off)
                };
                let start_x = -total_width / 2 + x_offset;
                let start_y = -total_height / 2 + y_offset;

                let mut shapes = PlacedShapes::default();
                let mut array_y = start_y + y;
                for row in 0..*rows {
                    let mut array_x = start_x + x;
                    let mut last_rect = core_rect;
                    for col in 0..*cols {
                        let via = match (row, col) {
                            (0, 0) => end_of_row_column.as_deref().unwrap_or(core),
                            (0, _) => end_of_row.as_deref().unwrap_or(core),
                            (_, 0) => end_of_column.as_deref().unwrap_or(core),
                            _ => core,
                        };
                        shapes.merge(
                            via.place(tech, block, net, swire, role, array_x, array_y)?,
                        );
                        last_rect = via.via_rect(false);
                        array_x += (core_rect.dx() + last_rect.dx()) / 2 + spacing.0;
                    }
                    array_y += (core_rect.dy() + last_rect.dy()) / 2 + spacing.1;
                }
                Ok(shapes)
            }
            DbVia::Stacked(stack) => {
                let mut shapes = PlacedShapes::default();
                for (i, via) in stack.iter().enumerate() {
                    let placed = via.place(tech, block, net, swire, role, x, y)?;
                    if i == 0 {
                        shapes.bottom = placed.bottom;
                    }
                    shapes.top = placed.top.or(shapes.top);
                }
                Ok(shapes)
            }
            DbVia::Dummy { area, lower, upper } => {
                let lower = tech.layers.get(*lower)?.name.clone();
                let upper = tech.layers.get(*upper)?.name.clone();
                warn!(%lower, %upper, area = %area, "no via available; connection left open");
                Ok(PlacedShapes::default())
            }
        }
    }
}

fn place_block_via(
    block: &mut Block,
    net: Oid<Net>,
    swire: usize,
    via: Oid<BlockVia>,
    role: WireShapeRole,
    origin: Point,
) -> Result<PlacedShapes> {
    let (bbox, bottom_rect, top_rect) = {
        let record = block.vias.get(via)?;
        let params = record.params;
        let (bottom, top) = match params {
            Some(p) => (Some(p.bottom), Some(p.top)),
            None => (None, None),
        };
        let footprint = |layer: Option<Oid<Layer>>| {
            layer.and_then(|l| {
                Rect::union_all(record.boxes_on(l).map(|b| b.rect.translate(origin)))
            })
        };
        (record.bbox_at(origin), footprint(bottom), footprint(top))
    };
    let net_record = block.nets.get_mut(net)?;
    let swire = net_record
        .swires
        .get_mut(swire)
        .ok_or_else(|| pdb::Error::NotFound(format!("swire {swire}")))?;
    swire.boxes.push(SBox::Via { via: ViaRef::Block(via), origin, bbox, role });
    Ok(PlacedShapes { bottom: bottom_rect, top: top_rect })
}

fn place_tech_via(
    tech: &Tech,
    block: &mut Block,
    net: Oid<Net>,
    swire: usize,
    via: Oid<TechVia>,
    role: WireShapeRole,
    origin: Point,
) -> Result<PlacedShapes> {
    let record = tech.vias.get(via)?;
    let bbox = record.bbox.translate(origin);
    let bottom = Rect::union_all(record.boxes_on(record.bottom).map(|b| b.rect.translate(origin)));
    let top = Rect::union_all(record.boxes_on(record.top).map(|b| b.rect.translate(origin)));
    let net_record = block.nets.get_mut(net)?;
    let swire_record = net_record
        .swires
        .get_mut(swire)
        .ok_or_else(|| pdb::Error::NotFound(format!("swire {swire}")))?;
    swire_record.boxes.push(SBox::Via { via: ViaRef::Tech(via), origin, bbox, role });
    Ok(PlacedShapes { bottom, top })
}

// ---------------------------------------------------------------------------
// candidate evaluation

/// Connect-level knobs applied to every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CandidateOpts {
    pub cut_pitch: Option<(i32, i32)>,
    pub max_rows: u32,
    pub max_cols: u32,
    pub split_cuts: Option<i32>,
}

/// A via-generate rule evaluated against one metal intersection.
#[derive(Debug, Clone)]
pub(crate) struct GenerateCandidate {
    rule_name: ArcStr,
    bottom: Oid<Layer>,
    cut: Oid<Layer>,
    top: Oid<Layer>,
    lower_rect: Rect,
    upper_rect: Rect,
    intersection: Rect,
    cut_rect: Rect,
    cut_pitch: (i32, i32),
    bottom_enclosure_rule: (i32, i32),
    top_enclosure_rule: (i32, i32),
    bottom_width_range: Option<(i32, i32)>,
    top_width_range: Option<(i32, i32)>,
    max_rows: u32,
    max_cols: u32,
    split_cut_array: bool,
    // results of determine_rows_and_cols
    core_row: i32,
    core_col: i32,
    end_row: i32,
    end_col: i32,
    array_core_x: i32,
    array_core_y: i32,
    array_spacing: (i32, i32),
    bottom_enclosure: (i32, i32),
    top_enclosure: (i32, i32),
}

impl GenerateCandidate {
    pub fn new(
        tech: &Tech,
        rule: &ViaGenerateRule,
        lower_rect: Rect,
        upper_rect: Rect,
    ) -> Result<Option<Self>> {
        let Ok((bot_rule, cut_rule, top_rule)) = rule.ordered_rules(&tech.layers) else {
            return Ok(None);
        };
        let Some(cut_rect) = cut_rule.rect else {
            return Ok(None);
        };
        let Some(intersection) = lower_rect.intersection(&upper_rect) else {
            return Ok(None);
        };
        let cut_pitch = cut_rule.spacing.unwrap_or((0, 0));
        Ok(Some(Self {
            rule_name: rule.name.clone(),
            bottom: bot_rule.layer,
            cut: cut_rule.layer,
            top: top_rule.layer,
            lower_rect,
            upper_rect,
            intersection,
            cut_rect,
            cut_pitch: if cut_pitch == (0, 0) {
                // default pitch: abutting cuts one cut apart
                (2 * cut_rect.dx(), 2 * cut_rect.dy())
            } else {
                cut_pitch
            },
            bottom_enclosure_rule: bot_rule.enclosure.unwrap_or((0, 0)),
            top_enclosure_rule: top_rule.enclosure.unwrap_or((0, 0)),
            bottom_width_range: bot_rule.width_range,
            top_width_range: top_rule.width_range,
            max_rows: 0,
            max_cols: 0,
            split_cut_array: false,
            core_row: 0,
            core_col: 0,
            end_row: 0,
            end_col: 0,
            array_core_x: 1,
            array_core_y: 1,
            array_spacing: (0, 0),
            bottom_enclosure: (0, 0),
            top_enclosure: (0, 0),
        }))
    }

    /// True when the rule reaches exactly the requested layer pair and its
    /// width ranges admit the intersecting metals.
    pub fn is_setup_valid(&self, lower: Oid<Layer>, upper: Oid<Layer>) -> bool {
        if self.bottom != lower || self.top != upper {
            return false;
        }
        let admits = |range: Option<(i32, i32)>, width: i32| match range {
            Some((lo, hi)) => (lo..=hi).contains(&width),
            None => true,
        };
        admits(self.bottom_width_range, self.lower_rect.min_dxdy())
            && admits(self.top_width_range, self.upper_rect.min_dxdy())
    }

    pub fn apply_opts(&mut self, opts: CandidateOpts) {
        if let Some(pitch) = opts.cut_pitch {
            self.cut_pitch = pitch;
        }
        self.max_rows = opts.max_rows;
        self.max_cols = opts.max_cols;
        if let Some(split) = opts.split_cuts {
            self.cut_pitch = (split, split);
            self.split_cut_array = true;
        }
    }

    /// The number of cuts fitting in `width` given the enclosures and
    /// pitch.
    fn cuts(width: i32, cut: i32, bot_enc: i32, top_enc: i32, pitch: i32) -> i32 {
        let available = width - 2 * bot_enc.max(top_enc);
        if available < cut {
            return 0;
        }
        if pitch <= 0 {
            return 1;
        }
        (available - cut) / pitch + 1
    }

    /// The extent of `cuts` cuts at the given spacing.
    fn cuts_width(cuts: i32, cut: i32, spacing: i32) -> i32 {
        if cuts == 0 {
            return 0;
        }
        cut * cuts + spacing * (cuts - 1)
    }

    /// Implements the row/column search: maximum cuts inside the
    /// intersection, arranged as arrays when an array-spacing rule wins
    /// more cut area.
    pub fn determine_rows_and_cols(
        &mut self,
        tech: &Tech,
        use_bottom_min_enclosure: bool,
        use_top_min_enclosure: bool,
    ) -> Result<()> {
        let cut_w = self.cut_rect.dx();
        let cut_h = self.cut_rect.dy();
        let width = self.intersection.dx();
        let height = self.intersection.dy();
        let min_enc_bot = self.bottom_enclosure_rule;
        let min_enc_top = self.top_enclosure_rule;

        let mut cols = Self::cuts(width, cut_w, min_enc_bot.0, min_enc_top.0, self.cut_pitch.0);
        let mut rows = Self::cuts(height, cut_h, min_enc_bot.1, min_enc_top.1, self.cut_pitch.1);
        if self.max_cols > 0 {
            cols = cols.min(self.max_cols as i32);
        }
        if self.max_rows > 0 {
            rows = rows.min(self.max_rows as i32);
        }

        let cut_layer = tech.layers.get(self.cut)?;
        let array_size = rows.max(cols);
        if array_size >= 2 && !self.split_cut_array {
            if let Some(spacing_rule) = &cut_layer.array_spacing {
                let array_area_x = width - 2 * min_enc_bot.0.max(min_enc_top.0);
                let array_area_y = height - 2 * min_enc_bot.1.max(min_enc_top.1);
                let mut max_cut_area = 0i64;

                for entry in &spacing_rule.arrays {
                    if let Some(rule_width) = spacing_rule.min_width {
                        if rule_width > width {
                            continue;
                        }
                    }
                    if entry.cuts as i32 > array_size {
                        continue;
                    }
                    let ArrayCuts { cuts, spacing } = *entry;
                    let cut_spacing_x =
                        spacing_rule.cut_spacing.unwrap_or(self.cut_pitch.0 - cut_w);
                    let cut_spacing_y =
                        spacing_rule.cut_spacing.unwrap_or(self.cut_pitch.1 - cut_h);

                    let mut x_cuts = Self::cuts(
                        width,
                        cut_w,
                        min_enc_bot.0,
                        min_enc_top.0,
                        cut_spacing_x + cut_w,
                    );
                    if !spacing_rule.longarray {
                        x_cuts = x_cuts.min(cuts as i32);
                    }
                    let y_cuts = Self::cuts(
                        height,
                        cut_h,
                        min_enc_bot.1,
                        min_enc_top.1,
                        cut_spacing_y + cut_h,
                    )
                    .min(cuts as i32);
                    if x_cuts == 0 || y_cuts == 0 {
                        continue;
                    }

                    let array_width_x = Self::cuts_width(x_cuts, cut_w, cut_spacing_x);
                    let array_width_y = Self::cuts_width(y_cuts, cut_h, cut_spacing_y);
                    let array_pitch_x = array_width_x + spacing;
                    let array_pitch_y = array_width_y + spacing;

                    let full_arrays_x = (array_area_x - array_width_x) / array_pitch_x + 1;
                    let full_arrays_y = (array_area_y - array_width_y) / array_pitch_y + 1;

                    // remainder sub-arrays at the end of each axis
                    let mut last_cols = 0;
                    let remainder_x = array_area_x - full_arrays_x * array_pitch_x;
                    if remainder_x > 0 {
                        last_cols =
                            Self::cuts(remainder_x, cut_w, 0, 0, cut_spacing_x + cut_w);
                    }
                    let mut last_rows = 0;
                    let remainder_y = array_area_y - full_arrays_y * array_pitch_y;
                    if remainder_y > 0 {
                        last_rows =
                            Self::cuts(remainder_y, cut_h, 0, 0, cut_spacing_y + cut_h);
                    }

                    let total_cut_area = self.cut_rect.area()
                        * i64::from(full_arrays_x * x_cuts + last_cols)
                        * i64::from(full_arrays_y * y_cuts + last_rows);
                    if total_cut_area > max_cut_area {
                        self.array_core_x = full_arrays_x;
                        self.array_core_y = full_arrays_y;
                        self.core_col = x_cuts;
                        self.core_row = y_cuts;
                        self.end_col = last_cols;
                        self.end_row = last_rows;
                        self.cut_pitch = (cut_spacing_x + cut_w, cut_spacing_y + cut_h);
                        self.array_spacing = (spacing, spacing);

                        let via_width_x = full_arrays_x
                            * Self::cuts_width(x_cuts, cut_w, cut_spacing_x)
                            + (full_arrays_x - 1) * spacing
                            + Self::cuts_width(last_cols, cut_w, cut_spacing_x)
                            + if last_cols > 0 { spacing } else { 0 };
                        let via_width_y = full_arrays_y
                            * Self::cuts_width(y_cuts, cut_h, cut_spacing_y)
                            + (full_arrays_y - 1) * spacing
                            + Self::cuts_width(last_rows, cut_h, cut_spacing_y)
                            + if last_rows > 0 { spacing } else { 0 };
                        self.assign_enclosures(
                            width - via_width_x,
                            height - via_width_y,
                            use_bottom_min_enclosure,
                            use_top_min_enclosure,
                        );
                        max_cut_area = total_cut_area;
                    }
                }

                if max_cut_area != 0 {
                    return Ok(());
                }
            }
        }

        self.array_core_x = 1;
        self.array_core_y = 1;
        self.core_col = cols;
        self.core_row = rows;
        self.end_col = 0;
        self.end_row = 0;

        let via_width_x = Self::cuts_width(cols, cut_w, self.cut_pitch.0 - cut_w);
        let via_width_y = Self::cuts_width(rows, cut_h, self.cut_pitch.1 - cut_h);
        self.assign_enclosures(
            width - via_width_x,
            height - via_width_y,
            use_bottom_min_enclosure,
            use_top_min_enclosure,
        );
        Ok(())
    }

    fn assign_enclosures(
        &mut self,
        double_enc_x: i32,
        double_enc_y: i32,
        use_bottom_min: bool,
        use_top_min: bool,
    ) {
        if use_bottom_min {
            self.bottom_enclosure = self.bottom_enclosure_rule;
        } else {
            self.bottom_enclosure = (double_enc_x / 2, double_enc_y / 2);
        }
        if use_top_min {
            self.top_enclosure = self.top_enclosure_rule;
        } else {
            self.top_enclosure = (double_enc_x / 2, double_enc_y / 2);
        }
    }

    pub fn total_cuts(&self) -> i32 {
        (self.array_core_y * self.core_row + self.end_row)
            * (self.array_core_x * self.core_col + self.end_col)
    }

    pub fn cut_area(&self) -> i64 {
        self.cut_rect.area() * i64::from(self.total_cuts())
    }

    /// Validates cut-class min cuts, the layer's min-cut rules, and the
    /// cut-enclosure rules.
    pub fn check_constraints(&self, tech: &Tech) -> Result<bool> {
        let cut_layer = tech.layers.get(self.cut)?;
        let total = self.total_cuts();
        if total == 0 {
            return Ok(false);
        }
        let cut_class =
            cut_layer.find_cut_class(self.cut_rect.dx(), self.cut_rect.dy());
        if let Some(class) = cut_class {
            if let Some(required) = class.num_cuts {
                if total < required as i32 {
                    debug!(rule = %self.rule_name, "rejected: cut class requires {required} cuts");
                    return Ok(false);
                }
            }
        }
        let mut has_rules = false;
        let mut is_valid = false;
        for rule in &cut_layer.min_cuts {
            has_rules = true;
            if rule.num_cuts as i32 <= total {
                is_valid = true;
            }
        }
        if has_rules && !is_valid {
            debug!(rule = %self.rule_name, "rejected: below the layer's minimum cut count");
            return Ok(false);
        }

        // enclosure rules above and below
        let mut has_rules = false;
        let mut is_valid = false;
        for rule in &cut_layer.cut_enclosures {
            if let (Some(class), Some(rule_class)) = (cut_class, rule.cut_class.as_ref()) {
                if class.name != *rule_class {
                    continue;
                }
            }
            let (check_bot, check_top) = if !rule.above && !rule.below {
                (true, true)
            } else {
                (rule.below, rule.above)
            };
            let mut applies = false;
            let mut satisfied = true;
            if check_bot {
                let width = self.lower_rect.min_dxdy();
                if rule.max_width.map(|mw| width <= mw).unwrap_or(true) {
                    applies = true;
                    if self.bottom_enclosure.0 < rule.first_overhang
                        || self.bottom_enclosure.1 < rule.second_overhang
                    {
                        satisfied = false;
                    }
                }
            }
            if check_top {
                let width = self.upper_rect.min_dxdy();
                if rule.max_width.map(|mw| width <= mw).unwrap_or(true) {
                    applies = true;
                    if self.top_enclosure.0 < rule.first_overhang
                        || self.top_enclosure.1 < rule.second_overhang
                    {
                        satisfied = false;
                    }
                }
            }
            if applies {
                has_rules = true;
                if satisfied {
                    is_valid = true;
                }
            }
        }
        Ok(is_valid || !has_rules)
    }

    /// Builds the realized via description.
    pub fn build(&self) -> DbVia {
        let gen = |rows: i32, cols: i32| GenVia {
            rule_name: self.rule_name.clone(),
            bottom: self.bottom,
            cut: self.cut,
            top: self.top,
            cut_rect: self.cut_rect,
            rows,
            cols,
            cut_pitch: self.cut_pitch,
            bottom_enclosure: self.bottom_enclosure,
            top_enclosure: self.top_enclosure,
        };
        let is_array = self.array_core_x != 1 || self.array_core_y != 1;
        if !is_array {
            return DbVia::Generate(gen(self.core_row, self.core_col));
        }
        let core = gen(self.core_row, self.core_col);
        let end_of_row = (self.end_row != 0).then(|| Box::new(gen(self.end_row, self.core_col)));
        let end_of_column =
            (self.end_col != 0).then(|| Box::new(gen(self.core_row, self.end_col)));
        let end_of_row_column = (self.end_row != 0 || self.end_col != 0).then(|| {
            let rows = if self.end_row != 0 { self.end_row } else { self.core_row };
            let cols = if self.end_col != 0 { self.end_col } else { self.core_col };
            Box::new(gen(rows, cols))
        });
        DbVia::Array {
            core: Box::new(core),
            end_of_row,
            end_of_column,
            end_of_row_column,
            rows: self.array_core_y + (self.end_row != 0) as i32,
            cols: self.array_core_x + (self.end_col != 0) as i32,
            spacing: self.array_spacing,
        }
    }
}

/// A fixed tech via evaluated against one metal intersection.
#[derive(Debug, Clone)]
pub(crate) struct TechViaCandidate {
    via: Oid<TechVia>,
    bottom: Oid<Layer>,
    top: Oid<Layer>,
    fits: bool,
    cut_area: i64,
}

impl TechViaCandidate {
    pub fn new(tech: &Tech, via_id: Oid<TechVia>, lower_rect: Rect, upper_rect: Rect) -> Result<Self> {
        let via = tech.vias.get(via_id)?;
        let intersection = lower_rect.intersection(&upper_rect);
        let mut fits = intersection.is_some();
        let mut cut_area = 0i64;
        if let Some(intersection) = intersection {
            for vbox in &via.boxes {
                let layer = tech.layers.get(vbox.layer)?;
                if layer.is_routing() {
                    if vbox.rect.dx() > intersection.dx() || vbox.rect.dy() > intersection.dy() {
                        fits = false;
                    }
                } else {
                    cut_area += vbox.rect.area();
                }
            }
        }
        Ok(Self { via: via_id, bottom: via.bottom, top: via.top, fits, cut_area })
    }

    pub fn is_setup_valid(&self, lower: Oid<Layer>, upper: Oid<Layer>) -> bool {
        self.bottom == lower && self.top == upper && self.fits
    }

    pub fn cut_area(&self) -> i64 {
        self.cut_area
    }

    pub fn build(&self) -> DbVia {
        DbVia::Tech { via: self.via }
    }
}

/// Picks the best via for one adjacent layer pair: the candidate with the
/// greatest total cut area, generate rules first, fixed tech vias as the
/// fallback. Ties keep the earliest candidate.
#[allow(clippy::too_many_arguments)]
pub(crate) fn make_single_layer_via(
    tech: &Tech,
    generate_rules: &[Oid<ViaGenerateRule>],
    tech_vias: &[Oid<TechVia>],
    lower: Oid<Layer>,
    lower_rect: Rect,
    upper: Oid<Layer>,
    upper_rect: Rect,
    opts: CandidateOpts,
    lower_is_internal: bool,
    upper_is_internal: bool,
) -> Result<Option<DbVia>> {
    let mut best: Option<(i64, DbVia)> = None;
    for &rule_id in generate_rules {
        let rule = tech.via_rules.get(rule_id)?;
        let Some(mut candidate) = GenerateCandidate::new(tech, rule, lower_rect, upper_rect)?
        else {
            continue;
        };
        if !candidate.is_setup_valid(lower, upper) {
            continue;
        }
        candidate.apply_opts(opts);
        candidate.determine_rows_and_cols(tech, lower_is_internal, upper_is_internal)?;
        if !candidate.check_constraints(tech)? {
            continue;
        }
        let area = candidate.cut_area();
        debug!(
            rule = %rule.name,
            cuts = candidate.total_cuts(),
            area,
            "via candidate evaluated"
        );
        if best.as_ref().map(|(a, _)| area > *a).unwrap_or(true) {
            best = Some((area, candidate.build()));
        }
    }
    if let Some((_, via)) = best {
        return Ok(Some(via));
    }

    // fall back to fixed tech vias
    let mut best: Option<(i64, DbVia)> = None;
    for &via_id in tech_vias {
        let candidate = TechViaCandidate::new(tech, via_id, lower_rect, upper_rect)?;
        if !candidate.is_setup_valid(lower, upper) {
            continue;
        }
        let area = candidate.cut_area();
        if area > 0 && best.as_ref().map(|(a, _)| area > *a).unwrap_or(true) {
            best = Some((area, candidate.build()));
        }
    }
    Ok(best.map(|(_, via)| via))
}
