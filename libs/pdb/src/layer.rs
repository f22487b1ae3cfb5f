//! Technology layers and their manufacturing rules.

use arcstr::ArcStr;
use geom::dir::Dir;

use crate::error::{Error, Result};
use crate::stream::{StreamReader, StreamWriter};

/// The kind of a technology layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// A metal routing layer.
    Routing,
    /// A via cut layer.
    Cut,
}

/// The preferred routing direction of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerDir {
    /// No preferred direction.
    #[default]
    None,
    /// Horizontal wires preferred.
    Horizontal,
    /// Vertical wires preferred.
    Vertical,
}

impl LayerDir {
    /// The axis of a wire routed in the preferred direction, if any.
    pub fn axis(&self) -> Option<Dir> {
        match self {
            LayerDir::None => None,
            LayerDir::Horizontal => Some(Dir::Horiz),
            LayerDir::Vertical => Some(Dir::Vert),
        }
    }
}

/// A minimum-spacing rule on a routing layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SpacingRule {
    /// Constant spacing regardless of geometry.
    Constant {
        /// The required spacing.
        spacing: i32,
    },
    /// Spacing that applies to wires in a width range.
    Range {
        /// Smallest wire width the rule applies to.
        min_width: i32,
        /// Largest wire width the rule applies to.
        max_width: i32,
        /// The required spacing.
        spacing: i32,
    },
    /// A parallel-run-length spacing table.
    ///
    /// `spacing[i][j]` applies to wires at least `widths[i]` wide with at
    /// least `lengths[j]` of parallel run.
    Prl {
        /// Row thresholds: wire widths.
        widths: Vec<i32>,
        /// Column thresholds: parallel run lengths.
        lengths: Vec<i32>,
        /// The spacing matrix, row-major.
        spacing: Vec<Vec<i32>>,
        /// True if the table only applies to wrong-way wires.
        wrong_direction: bool,
    },
    /// A two-widths spacing table; `spacing[i][j]` applies between a wire
    /// at least `widths[i]` wide and one at least `widths[j]` wide.
    TwoWidths {
        /// Width thresholds for both axes of the matrix.
        widths: Vec<i32>,
        /// Minimum parallel run length per row, if constrained.
        prl: Vec<Option<i32>>,
        /// The spacing matrix, row-major.
        spacing: Vec<Vec<i32>>,
    },
    /// An end-of-line rule: wires at most `eol_width` wide require
    /// `spacing` past their line ends.
    Eol {
        /// Largest wire width the rule applies to.
        eol_width: i32,
        /// The required spacing beyond the line end.
        spacing: i32,
    },
}

/// A width-table rule constraining the legal wire widths on a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WidthTable {
    /// True if the table constrains wrong-way wires instead.
    pub wrong_direction: bool,
    /// The legal widths, ascending.
    pub widths: Vec<i32>,
}

/// A cut-class rule: named cut geometry on a cut layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CutClass {
    /// The class name.
    pub name: ArcStr,
    /// Cut width.
    pub width: i32,
    /// Cut length; defaults to `width` when absent.
    pub length: Option<i32>,
    /// Required number of cuts, if constrained.
    pub num_cuts: Option<u32>,
}

impl CutClass {
    /// The effective cut length.
    pub fn effective_length(&self) -> i32 {
        self.length.unwrap_or(self.width)
    }

    /// True if this class describes a cut of the given dimensions.
    pub fn matches(&self, cut_width: i32, cut_length: i32) -> bool {
        self.width == cut_width && self.effective_length() == cut_length
    }
}

/// A cut-enclosure rule on a cut layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CutEnclosure {
    /// Restricts the rule to a cut class, by name.
    pub cut_class: Option<ArcStr>,
    /// Rule applies to the metal above the cut.
    pub above: bool,
    /// Rule applies to the metal below the cut.
    pub below: bool,
    /// Rule only applies to metal at most this wide.
    pub max_width: Option<i32>,
    /// Required overhang along the first axis.
    pub first_overhang: i32,
    /// Required overhang along the second axis.
    pub second_overhang: i32,
}

/// A minimum-cut rule on a cut layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MinCutRule {
    /// Number of cuts required.
    pub num_cuts: u32,
    /// Wire width above which the rule applies.
    pub width: i32,
}

/// One ARRAYCUTS entry of an array-spacing rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayCuts {
    /// Cut count at which this entry applies.
    pub cuts: u32,
    /// Spacing between neighboring cut arrays.
    pub spacing: i32,
}

/// An array-spacing rule (LEF58 `ARRAYSPACING` form) on a cut layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySpacing {
    /// Rule only applies to intersections at least this wide.
    pub min_width: Option<i32>,
    /// Overrides the in-array cut spacing.
    pub cut_spacing: Option<i32>,
    /// True if rows may exceed the cut cap.
    pub longarray: bool,
    /// The array arrangements, by ascending cut count.
    pub arrays: Vec<ArrayCuts>,
}

/// Track grid of a routing layer: `offset + k * pitch` for `k >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackGrid {
    /// The coordinate of track 0.
    pub offset: i32,
    /// Center-to-center track distance.
    pub pitch: i32,
}

/// A technology layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// The layer name.
    pub name: ArcStr,
    /// Routing or cut.
    pub kind: LayerKind,
    /// 1-based level among routing layers; 0 for cut layers.
    pub routing_level: u32,
    /// Preferred routing direction.
    pub dir: LayerDir,
    /// Default (preferred) wire width.
    pub width: i32,
    /// Minimum legal wire width.
    pub min_width: i32,
    /// Maximum legal wire width.
    pub max_width: i32,
    /// Minimum metal area; 0 when unconstrained.
    pub min_area: i64,
    /// Default minimum spacing.
    pub spacing: i32,
    /// Additional spacing rules.
    pub spacing_rules: Vec<SpacingRule>,
    /// Legal-width tables.
    pub width_tables: Vec<WidthTable>,
    /// Cut classes (cut layers).
    pub cut_classes: Vec<CutClass>,
    /// Cut enclosure rules (cut layers).
    pub cut_enclosures: Vec<CutEnclosure>,
    /// Minimum-cut rules (cut layers).
    pub min_cuts: Vec<MinCutRule>,
    /// Array-spacing rule (cut layers).
    pub array_spacing: Option<ArraySpacing>,
    /// Routing track grid, when known.
    pub track: Option<TrackGrid>,
}

impl Layer {
    /// Creates a routing layer with the given level and direction.
    pub fn routing(name: impl Into<ArcStr>, level: u32, dir: LayerDir, width: i32) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Routing,
            routing_level: level,
            dir,
            width,
            min_width: width,
            max_width: i32::MAX,
            min_area: 0,
            spacing: 0,
            spacing_rules: Vec::new(),
            width_tables: Vec::new(),
            cut_classes: Vec::new(),
            cut_enclosures: Vec::new(),
            min_cuts: Vec::new(),
            array_spacing: None,
            track: None,
        }
    }

    /// Creates a cut layer.
    pub fn cut(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Cut,
            routing_level: 0,
            dir: LayerDir::None,
            width: 0,
            min_width: 0,
            max_width: i32::MAX,
            min_area: 0,
            spacing: 0,
            spacing_rules: Vec::new(),
            width_tables: Vec::new(),
            cut_classes: Vec::new(),
            cut_enclosures: Vec::new(),
            min_cuts: Vec::new(),
            array_spacing: None,
            track: None,
        }
    }

    /// True for routing layers.
    pub fn is_routing(&self) -> bool {
        self.kind == LayerKind::Routing
    }

    /// The minimum spacing to a wire of the given `width` and `length`.
    ///
    /// Returns the maximum over the default spacing and every applicable
    /// rule: width ranges, the parallel-run-length table, and the
    /// two-widths table assuming equal widths on both sides. The result is
    /// monotone non-decreasing in both arguments. Directional rules (end
    /// of line) are excluded; callers apply them per axis.
    pub fn spacing_for(&self, width: i32, length: i32) -> i32 {
        let mut result = self.spacing;
        for rule in &self.spacing_rules {
            match rule {
                SpacingRule::Constant { spacing } => result = result.max(*spacing),
                SpacingRule::Range { min_width, max_width, spacing } => {
                    if (*min_width..=*max_width).contains(&width) {
                        result = result.max(*spacing);
                    }
                }
                SpacingRule::Prl { widths, lengths, spacing, wrong_direction } => {
                    if *wrong_direction {
                        continue;
                    }
                    if let Some(s) = prl_lookup(widths, lengths, spacing, width, length) {
                        result = result.max(s);
                    }
                }
                SpacingRule::TwoWidths { widths, prl, spacing } => {
                    if let Some(s) = two_widths_lookup(widths, prl, spacing, width, width, length)
                    {
                        result = result.max(s);
                    }
                }
                SpacingRule::Eol { .. } => {}
            }
        }
        result
    }

    /// The spacing required by wrong-direction parallel-run-length
    /// tables, for wires routed against the preferred direction.
    pub fn wrong_way_spacing_for(&self, width: i32, length: i32) -> Option<i32> {
        self.spacing_rules
            .iter()
            .filter_map(|rule| match rule {
                SpacingRule::Prl { widths, lengths, spacing, wrong_direction: true } => {
                    prl_lookup(widths, lengths, spacing, width, length)
                }
                _ => None,
            })
            .max()
    }

    /// The end-of-line spacing applicable to a wire of the given width, if
    /// any rule matches.
    pub fn eol_spacing_for(&self, width: i32) -> Option<i32> {
        self.spacing_rules
            .iter()
            .filter_map(|rule| match rule {
                SpacingRule::Eol { eol_width, spacing } if width <= *eol_width => Some(*spacing),
                _ => None,
            })
            .max()
    }

    /// Looks up the cut class matching the given cut dimensions.
    ///
    /// The first inserted matching class wins.
    pub fn find_cut_class(&self, cut_width: i32, cut_length: i32) -> Option<&CutClass> {
        self.cut_classes.iter().find(|c| c.matches(cut_width, cut_length))
    }

    /// True if `width` is legal under every applicable width table.
    pub fn width_ok(&self, width: i32, wrong_way: bool) -> bool {
        if width < self.min_width || width > self.max_width {
            return false;
        }
        for table in &self.width_tables {
            if table.wrong_direction != wrong_way || table.widths.is_empty() {
                continue;
            }
            if width > *table.widths.last().expect("non-empty") {
                // wider than the table covers
                continue;
            }
            if !table.widths.contains(&width) {
                return false;
            }
        }
        true
    }

    /// Snaps `pos` to the layer's track grid, choosing the nearest track
    /// at or after `not_before`.
    pub fn snap_to_track(&self, pos: i32, not_before: i32) -> i32 {
        let Some(track) = self.track else {
            return pos.max(not_before);
        };
        let pitch = i64::from(track.pitch.max(1));
        let rel = i64::from(pos) - i64::from(track.offset);
        let mut k = (rel + pitch / 2).div_euclid(pitch);
        loop {
            let snapped = i64::from(track.offset) + k * pitch;
            if snapped >= i64::from(not_before) {
                return snapped as i32;
            }
            k += 1;
        }
    }
}

/// Largest-threshold-at-most lookup into a PRL table.
fn prl_lookup(
    widths: &[i32],
    lengths: &[i32],
    spacing: &[Vec<i32>],
    width: i32,
    length: i32,
) -> Option<i32> {
    let row = largest_at_most(widths, width)?;
    let col = largest_at_most(lengths, length)?;
    spacing.get(row)?.get(col).copied()
}

fn two_widths_lookup(
    widths: &[i32],
    prl: &[Option<i32>],
    spacing: &[Vec<i32>],
    w1: i32,
    w2: i32,
    length: i32,
) -> Option<i32> {
    let applicable = |i: usize| match prl.get(i).copied().flatten() {
        Some(min_prl) => length >= min_prl,
        None => true,
    };
    let row = (0..widths.len())
        .filter(|&i| widths[i] <= w1 && applicable(i))
        .next_back()?;
    let col = (0..widths.len()).filter(|&i| widths[i] <= w2).next_back()?;
    spacing.get(row)?.get(col).copied()
}

fn largest_at_most(thresholds: &[i32], value: i32) -> Option<usize> {
    (0..thresholds.len()).filter(|&i| thresholds[i] <= value).next_back()
}

// ---------------------------------------------------------------------------
// streaming

impl Layer {
    fn flags_word(&self) -> u32 {
        let kind = match self.kind {
            LayerKind::Routing => 0,
            LayerKind::Cut => 1,
        };
        let dir = match self.dir {
            LayerDir::None => 0,
            LayerDir::Horizontal => 1,
            LayerDir::Vertical => 2,
        };
        kind | (dir << 1)
    }

    fn apply_flags_word(word: u32) -> Result<(LayerKind, LayerDir)> {
        let kind = match word & 0x1 {
            0 => LayerKind::Routing,
            _ => LayerKind::Cut,
        };
        let dir = match (word >> 1) & 0x3 {
            0 => LayerDir::None,
            1 => LayerDir::Horizontal,
            2 => LayerDir::Vertical,
            d => return Err(Error::CorruptStream(format!("invalid layer direction {d}"))),
        };
        Ok((kind, dir))
    }

    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_u32(self.flags_word())?;
        w.write_str(&self.name)?;
        w.write_u32(self.routing_level)?;
        w.write_i32(self.width)?;
        w.write_i32(self.min_width)?;
        w.write_i32(self.max_width)?;
        w.write_i64(self.min_area)?;
        w.write_i32(self.spacing)?;

        w.write_u32(self.spacing_rules.len() as u32)?;
        for rule in &self.spacing_rules {
            rule.write_stream(w)?;
        }
        w.write_u32(self.width_tables.len() as u32)?;
        for t in &self.width_tables {
            w.write_bool(t.wrong_direction)?;
            w.write_i32_vec(&t.widths)?;
        }
        w.write_u32(self.cut_classes.len() as u32)?;
        for c in &self.cut_classes {
            w.write_str(&c.name)?;
            w.write_i32(c.width)?;
            w.write_i32(c.length.unwrap_or(-1))?;
            w.write_u32(c.num_cuts.unwrap_or(0))?;
        }
        w.write_u32(self.cut_enclosures.len() as u32)?;
        for e in &self.cut_enclosures {
            w.write_str(e.cut_class.as_deref().unwrap_or(""))?;
            w.write_bool(e.above)?;
            w.write_bool(e.below)?;
            w.write_i32(e.max_width.unwrap_or(-1))?;
            w.write_i32(e.first_overhang)?;
            w.write_i32(e.second_overhang)?;
        }
        w.write_u32(self.min_cuts.len() as u32)?;
        for m in &self.min_cuts {
            w.write_u32(m.num_cuts)?;
            w.write_i32(m.width)?;
        }
        match &self.array_spacing {
            None => w.write_bool(false)?,
            Some(a) => {
                w.write_bool(true)?;
                w.write_i32(a.min_width.unwrap_or(-1))?;
                w.write_i32(a.cut_spacing.unwrap_or(-1))?;
                w.write_bool(a.longarray)?;
                w.write_u32(a.arrays.len() as u32)?;
                for entry in &a.arrays {
                    w.write_u32(entry.cuts)?;
                    w.write_i32(entry.spacing)?;
                }
            }
        }
        match &self.track {
            None => w.write_bool(false)?,
            Some(t) => {
                w.write_bool(true)?;
                w.write_i32(t.offset)?;
                w.write_i32(t.pitch)?;
            }
        }
        Ok(())
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let (kind, dir) = Self::apply_flags_word(r.read_u32()?)?;
        let name = r.read_str()?;
        let routing_level = r.read_u32()?;
        let width = r.read_i32()?;
        let min_width = r.read_i32()?;
        let max_width = r.read_i32()?;
        let min_area = r.read_i64()?;
        let spacing = r.read_i32()?;

        let n = r.read_u32()?;
        let mut spacing_rules = Vec::with_capacity(n as usize);
        for _ in 0..n {
            spacing_rules.push(SpacingRule::read_stream(r)?);
        }
        let n = r.read_u32()?;
        let mut width_tables = Vec::with_capacity(n as usize);
        for _ in 0..n {
            width_tables.push(WidthTable {
                wrong_direction: r.read_bool()?,
                widths: r.read_i32_vec()?,
            });
        }
        let n = r.read_u32()?;
        let mut cut_classes = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = r.read_str()?;
            let width = r.read_i32()?;
            let length = r.read_i32()?;
            let num_cuts = r.read_u32()?;
            cut_classes.push(CutClass {
                name,
                width,
                length: (length >= 0).then_some(length),
                num_cuts: (num_cuts > 0).then_some(num_cuts),
            });
        }
        let n = r.read_u32()?;
        let mut cut_enclosures = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let cut_class = r.read_str()?;
            let above = r.read_bool()?;
            let below = r.read_bool()?;
            let max_width = r.read_i32()?;
            let first_overhang = r.read_i32()?;
            let second_overhang = r.read_i32()?;
            cut_enclosures.push(CutEnclosure {
                cut_class: (!cut_class.is_empty()).then_some(cut_class),
                above,
                below,
                max_width: (max_width >= 0).then_some(max_width),
                first_overhang,
                second_overhang,
            });
        }
        let n = r.read_u32()?;
        let mut min_cuts = Vec::with_capacity(n as usize);
        for _ in 0..n {
            min_cuts.push(MinCutRule { num_cuts: r.read_u32()?, width: r.read_i32()? });
        }
        let array_spacing = if r.read_bool()? {
            let min_width = r.read_i32()?;
            let cut_spacing = r.read_i32()?;
            let longarray = r.read_bool()?;
            let n = r.read_u32()?;
            let mut arrays = Vec::with_capacity(n as usize);
            for _ in 0..n {
                arrays.push(ArrayCuts { cuts: r.read_u32()?, spacing: r.read_i32()? });
            }
            Some(ArraySpacing {
                min_width: (min_width >= 0).then_some(min_width),
                cut_spacing: (cut_spacing >= 0).then_some(cut_spacing),
                longarray,
                arrays,
            })
        } else {
            None
        };
        let track = if r.read_bool()? {
            Some(TrackGrid { offset: r.read_i32()?, pitch: r.read_i32()? })
        } else {
            None
        };

        Ok(Self {
            name,
            kind,
            routing_level,
            dir,
            width,
            min_width,
            max_width,
            min_area,
            spacing,
            spacing_rules,
            width_tables,
            cut_classes,
            cut_enclosures,
            min_cuts,
            array_spacing,
            track,
        })
    }
}

impl SpacingRule {
    fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        match self {
            SpacingRule::Constant { spacing } => {
                w.write_u8(0)?;
                w.write_i32(*spacing)?;
            }
            SpacingRule::Range { min_width, max_width, spacing } => {
                w.write_u8(1)?;
                w.write_i32(*min_width)?;
                w.write_i32(*max_width)?;
                w.write_i32(*spacing)?;
            }
            SpacingRule::Prl { widths, lengths, spacing, wrong_direction } => {
                w.write_u8(2)?;
                w.write_bool(*wrong_direction)?;
                w.write_i32_vec(widths)?;
                w.write_i32_vec(lengths)?;
                w.write_u32(spacing.len() as u32)?;
                for row in spacing {
                    w.write_i32_vec(row)?;
                }
            }
            SpacingRule::TwoWidths { widths, prl, spacing } => {
                w.write_u8(3)?;
                w.write_i32_vec(widths)?;
                w.write_u32(prl.len() as u32)?;
                for p in prl {
                    w.write_i32(p.unwrap_or(-1))?;
                }
                w.write_u32(spacing.len() as u32)?;
                for row in spacing {
                    w.write_i32_vec(row)?;
                }
            }
            SpacingRule::Eol { eol_width, spacing } => {
                w.write_u8(4)?;
                w.write_i32(*eol_width)?;
                w.write_i32(*spacing)?;
            }
        }
        Ok(())
    }

    fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        Ok(match r.read_u8()? {
            0 => SpacingRule::Constant { spacing: r.read_i32()? },
            1 => SpacingRule::Range {
                min_width: r.read_i32()?,
                max_width: r.read_i32()?,
                spacing: r.read_i32()?,
            },
            2 => {
                let wrong_direction = r.read_bool()?;
                let widths = r.read_i32_vec()?;
                let lengths = r.read_i32_vec()?;
                let rows = r.read_u32()?;
                let mut spacing = Vec::with_capacity(rows as usize);
                for _ in 0..rows {
                    spacing.push(r.read_i32_vec()?);
                }
                SpacingRule::Prl { widths, lengths, spacing, wrong_direction }
            }
            3 => {
                let widths = r.read_i32_vec()?;
                let n = r.read_u32()?;
                let mut prl = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let p = r.read_i32()?;
                    prl.push((p >= 0).then_some(p));
                }
                let rows = r.read_u32()?;
                let mut spacing = Vec::with_capacity(rows as usize);
                for _ in 0..rows {
                    spacing.push(r.read_i32_vec()?);
                }
                SpacingRule::TwoWidths { widths, prl, spacing }
            }
            4 => SpacingRule::Eol { eol_width: r.read_i32()?, spacing: r.read_i32()? },
            t => return Err(Error::CorruptStream(format!("invalid spacing rule tag {t}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_with_tables() -> Layer {
        let mut layer = Layer::routing("M2", 2, LayerDir::Horizontal, 200);
        layer.spacing = 140;
        layer.spacing_rules = vec![
            SpacingRule::Prl {
                widths: vec![0, 400, 1000],
                lengths: vec![0, 1000],
                spacing: vec![vec![140, 140], vec![200, 300], vec![400, 500]],
                wrong_direction: false,
            },
            SpacingRule::TwoWidths {
                widths: vec![0, 1500],
                prl: vec![None, Some(2000)],
                spacing: vec![vec![140, 200], vec![200, 600]],
            },
        ];
        layer
    }

    #[test]
    fn spacing_picks_the_strictest_rule() {
        let layer = layer_with_tables();
        assert_eq!(layer.spacing_for(100, 0), 140);
        assert_eq!(layer.spacing_for(500, 0), 200);
        assert_eq!(layer.spacing_for(500, 1200), 300);
        assert_eq!(layer.spacing_for(1600, 2500), 600);
    }

    #[test]
    fn spacing_is_monotone() {
        let layer = layer_with_tables();
        let widths = [0, 100, 399, 400, 999, 1000, 1500, 2000];
        let lengths = [0, 500, 1000, 1999, 2000, 4000];
        for ws in widths.windows(2) {
            for &l in &lengths {
                assert!(layer.spacing_for(ws[0], l) <= layer.spacing_for(ws[1], l));
            }
        }
        for &w in &widths {
            for ls in lengths.windows(2) {
                assert!(layer.spacing_for(w, ls[0]) <= layer.spacing_for(w, ls[1]));
            }
        }
    }

    #[test]
    fn snap_to_track_respects_lower_bound() {
        let mut layer = Layer::routing("M4", 4, LayerDir::Vertical, 200);
        layer.track = Some(TrackGrid { offset: 100, pitch: 400 });
        assert_eq!(layer.snap_to_track(480, i32::MIN), 500);
        assert_eq!(layer.snap_to_track(480, 600), 900);
    }

    #[test]
    fn width_table_constrains_only_listed_range() {
        let mut layer = Layer::routing("M5", 5, LayerDir::Horizontal, 400);
        layer.min_width = 200;
        layer.width_tables =
            vec![WidthTable { wrong_direction: false, widths: vec![200, 400, 800] }];
        assert!(layer.width_ok(400, false));
        assert!(!layer.width_ok(300, false));
        // wider than the table's top entry is allowed
        assert!(layer.width_ok(1000, false));
        // wrong-way widths are not constrained by this table
        assert!(layer.width_ok(300, true));
    }
}
