//! Via records: tech vias, via-generate rules, and block vias.

use arcstr::ArcStr;
use geom::orient::Orient;
use geom::point::Point;
use geom::rect::Rect;

use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::stream::{StreamReader, StreamWriter};
use crate::table::Oid;

/// A rectangle on a specific layer, part of a via's fixed geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViaBox {
    /// The layer the rectangle lives on.
    pub layer: Oid<Layer>,
    /// The rectangle, relative to the via origin.
    pub rect: Rect,
}

/// A via defined by the technology with fixed geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TechVia {
    /// The via name.
    pub name: ArcStr,
    /// Lowest routing layer the via touches.
    pub bottom: Oid<Layer>,
    /// Highest routing layer the via touches.
    pub top: Oid<Layer>,
    /// The cut layer.
    pub cut: Oid<Layer>,
    /// Per-layer rectangles, relative to the via origin.
    pub boxes: Vec<ViaBox>,
    /// Bounding box of all rectangles.
    pub bbox: Rect,
    /// True if LEF marked the via as default for its cut layer.
    pub is_default: bool,
}

impl TechVia {
    /// The rectangles on the given layer.
    pub fn boxes_on(&self, layer: Oid<Layer>) -> impl Iterator<Item = &ViaBox> {
        self.boxes.iter().filter(move |b| b.layer == layer)
    }

    /// The single cut rectangle, when the via has exactly one cut.
    pub fn single_cut(&self) -> Option<Rect> {
        let mut cuts = self.boxes_on(self.cut);
        let first = cuts.next()?;
        cuts.next().is_none().then_some(first.rect)
    }
}

/// One layer's rule inside a via-generate rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ViaLayerRule {
    /// The layer this rule describes.
    pub layer: Oid<Layer>,
    /// Fixed rectangle (cut layers: the cut geometry).
    pub rect: Option<Rect>,
    /// Metal enclosure beyond the cuts, per axis.
    pub enclosure: Option<(i32, i32)>,
    /// Metal width range the rule admits.
    pub width_range: Option<(i32, i32)>,
    /// Default center-to-center cut spacing, per axis.
    pub spacing: Option<(i32, i32)>,
}

impl ViaLayerRule {
    /// Creates a rule carrying only a layer reference.
    pub fn new(layer: Oid<Layer>) -> Self {
        Self { layer, rect: None, enclosure: None, width_range: None, spacing: None }
    }

    /// True if the rule admits a metal of the given width.
    pub fn admits_width(&self, width: i32) -> bool {
        match self.width_range {
            Some((lo, hi)) => (lo..=hi).contains(&width),
            None => true,
        }
    }
}

/// A parameterized via rule: three layer rules (bottom metal, cut, top
/// metal) from which vias of any size can be generated.
#[derive(Debug, Clone, PartialEq)]
pub struct ViaGenerateRule {
    /// The rule name.
    pub name: ArcStr,
    /// True if LEF marked the rule as default.
    pub is_default: bool,
    /// The layer rules; exactly three for a usable rule.
    pub layer_rules: Vec<ViaLayerRule>,
}

impl ViaGenerateRule {
    /// The three layer rules ordered bottom metal, cut, top metal, using
    /// the routing levels from `layers`.
    ///
    /// Fails when the rule does not have exactly one cut layer between two
    /// routing layers.
    pub fn ordered_rules(
        &self,
        layers: &crate::table::Table<Layer>,
    ) -> Result<(&ViaLayerRule, &ViaLayerRule, &ViaLayerRule)> {
        if self.layer_rules.len() != 3 {
            return Err(Error::NotFound(format!(
                "generate rule {} has {} layer rules",
                self.name,
                self.layer_rules.len()
            )));
        }
        let mut routing: Vec<&ViaLayerRule> = Vec::new();
        let mut cut: Option<&ViaLayerRule> = None;
        for rule in &self.layer_rules {
            if layers.get(rule.layer)?.is_routing() {
                routing.push(rule);
            } else {
                cut = Some(rule);
            }
        }
        let cut = cut.ok_or_else(|| {
            Error::NotFound(format!("generate rule {} has no cut layer", self.name))
        })?;
        if routing.len() != 2 {
            return Err(Error::NotFound(format!(
                "generate rule {} has {} routing layers",
                self.name,
                routing.len()
            )));
        }
        let (lo, hi) = (routing[0], routing[1]);
        let lo_level = layers.get(lo.layer)?.routing_level;
        let hi_level = layers.get(hi.layer)?.routing_level;
        if lo_level <= hi_level {
            Ok((lo, cut, hi))
        } else {
            Ok((hi, cut, lo))
        }
    }
}

/// Parameters of a generated block via.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViaParams {
    /// Cut width and height.
    pub cut_size: (i32, i32),
    /// Space between adjacent cuts, per axis.
    pub cut_spacing: (i32, i32),
    /// Bottom metal enclosure, per axis.
    pub bottom_enclosure: (i32, i32),
    /// Top metal enclosure, per axis.
    pub top_enclosure: (i32, i32),
    /// Number of cut rows.
    pub rows: u32,
    /// Number of cut columns.
    pub cols: u32,
    /// Bottom metal layer.
    pub bottom: Oid<Layer>,
    /// Cut layer.
    pub cut: Oid<Layer>,
    /// Top metal layer.
    pub top: Oid<Layer>,
}

impl ViaParams {
    /// The extent of the cut array, centered on the origin.
    pub fn cut_extent(&self) -> Rect {
        let (cw, ch) = self.cut_size;
        let w = self.cols as i32 * cw + (self.cols as i32 - 1) * self.cut_spacing.0;
        let h = self.rows as i32 * ch + (self.rows as i32 - 1) * self.cut_spacing.1;
        Rect::from_sides(-w / 2, -h / 2, -w / 2 + w, -h / 2 + h)
    }

    /// Generates the via geometry, relative to the via origin.
    pub fn boxes(&self) -> Vec<ViaBox> {
        let mut out = Vec::new();
        let extent = self.cut_extent();
        let (cw, ch) = self.cut_size;
        let pitch_x = cw + self.cut_spacing.0;
        let pitch_y = ch + self.cut_spacing.1;
        for row in 0..self.rows as i32 {
            for col in 0..self.cols as i32 {
                let x = extent.left() + col * pitch_x;
                let y = extent.bot() + row * pitch_y;
                out.push(ViaBox {
                    layer: self.cut,
                    rect: Rect::from_sides(x, y, x + cw, y + ch),
                });
            }
        }
        let (bx, by) = self.bottom_enclosure;
        out.push(ViaBox {
            layer: self.bottom,
            rect: Rect::from_sides(
                extent.left() - bx,
                extent.bot() - by,
                extent.right() + bx,
                extent.top() + by,
            ),
        });
        let (tx, ty) = self.top_enclosure;
        out.push(ViaBox {
            layer: self.top,
            rect: Rect::from_sides(
                extent.left() - tx,
                extent.bot() - ty,
                extent.right() + tx,
                extent.top() + ty,
            ),
        });
        out
    }
}

/// A via owned by a block: generated from a rule, fixed boxes, or a
/// rotated instance of another via.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockVia {
    /// The via name, unique within its block.
    pub name: ArcStr,
    /// The generate rule the via was built from, by name.
    pub generate_rule: Option<ArcStr>,
    /// Generation parameters, when rule-generated.
    pub params: Option<ViaParams>,
    /// The via geometry, relative to the via origin.
    pub boxes: Vec<ViaBox>,
    /// Bounding box of the geometry.
    pub bbox: Rect,
    /// A rotated instance of another block via.
    pub rotated: Option<(Oid<BlockVia>, Orient)>,
}

impl BlockVia {
    /// Creates a block via from generate parameters.
    pub fn from_params(
        name: impl Into<ArcStr>,
        generate_rule: Option<ArcStr>,
        params: ViaParams,
    ) -> Self {
        let boxes = params.boxes();
        let bbox = Rect::union_all(boxes.iter().map(|b| b.rect)).unwrap_or_default();
        Self { name: name.into(), generate_rule, params: Some(params), boxes, bbox, rotated: None }
    }

    /// The rectangles on the given layer.
    pub fn boxes_on(&self, layer: Oid<Layer>) -> impl Iterator<Item = &ViaBox> {
        self.boxes.iter().filter(move |b| b.layer == layer)
    }

    /// The bounding box when placed at `origin`.
    pub fn bbox_at(&self, origin: Point) -> Rect {
        self.bbox.translate(origin)
    }
}

// ---------------------------------------------------------------------------
// streaming

fn write_via_box<W: std::io::Write>(w: &mut StreamWriter<W>, b: &ViaBox) -> Result<()> {
    w.write_raw_oid(b.layer.raw())?;
    write_rect(w, b.rect)
}

fn read_via_box<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<ViaBox> {
    let layer = r.read_req_oid()?;
    Ok(ViaBox { layer, rect: read_rect(r)? })
}

pub(crate) fn write_rect<W: std::io::Write>(w: &mut StreamWriter<W>, r: Rect) -> Result<()> {
    w.write_i32(r.left())?;
    w.write_i32(r.bot())?;
    w.write_i32(r.right())?;
    w.write_i32(r.top())
}

pub(crate) fn read_rect<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Rect> {
    let left = r.read_i32()?;
    let bot = r.read_i32()?;
    let right = r.read_i32()?;
    let top = r.read_i32()?;
    Rect::from_sides_option(left, bot, right, top)
        .ok_or_else(|| Error::CorruptStream(format!("inverted rect {left} {bot} {right} {top}")))
}

impl TechVia {
    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        w.write_raw_oid(self.bottom.raw())?;
        w.write_raw_oid(self.top.raw())?;
        w.write_raw_oid(self.cut.raw())?;
        write_rect(w, self.bbox)?;
        w.write_bool(self.is_default)?;
        w.write_u32(self.boxes.len() as u32)?;
        for b in &self.boxes {
            write_via_box(w, b)?;
        }
        Ok(())
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let bottom = r.read_req_oid()?;
        let top = r.read_req_oid()?;
        let cut = r.read_req_oid()?;
        let bbox = read_rect(r)?;
        let is_default = r.read_bool()?;
        let n = r.read_u32()?;
        let mut boxes = Vec::with_capacity(n as usize);
        for _ in 0..n {
            boxes.push(read_via_box(r)?);
        }
        Ok(Self { name, bottom, top, cut, boxes, bbox, is_default })
    }
}

impl ViaGenerateRule {
    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        w.write_bool(self.is_default)?;
        w.write_u32(self.layer_rules.len() as u32)?;
        for rule in &self.layer_rules {
            w.write_raw_oid(rule.layer.raw())?;
            match rule.rect {
                None => w.write_bool(false)?,
                Some(rect) => {
                    w.write_bool(true)?;
                    write_rect(w, rect)?;
                }
            }
            write_opt_pair(w, rule.enclosure)?;
            write_opt_pair(w, rule.width_range)?;
            write_opt_pair(w, rule.spacing)?;
        }
        Ok(())
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let is_default = r.read_bool()?;
        let n = r.read_u32()?;
        let mut layer_rules = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let layer = r.read_req_oid()?;
            let rect = if r.read_bool()? { Some(read_rect(r)?) } else { None };
            let enclosure = read_opt_pair(r)?;
            let width_range = read_opt_pair(r)?;
            let spacing = read_opt_pair(r)?;
            layer_rules.push(ViaLayerRule { layer, rect, enclosure, width_range, spacing });
        }
        Ok(Self { name, is_default, layer_rules })
    }
}

fn write_opt_pair<W: std::io::Write>(
    w: &mut StreamWriter<W>,
    pair: Option<(i32, i32)>,
) -> Result<()> {
    match pair {
        None => w.write_bool(false),
        Some((a, b)) => {
            w.write_bool(true)?;
            w.write_i32(a)?;
            w.write_i32(b)
        }
    }
}

fn read_opt_pair<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Option<(i32, i32)>> {
    if r.read_bool()? {
        Ok(Some((r.read_i32()?, r.read_i32()?)))
    } else {
        Ok(None)
    }
}

impl BlockVia {
    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        w.write_str(self.generate_rule.as_deref().unwrap_or(""))?;
        match &self.params {
            None => w.write_bool(false)?,
            Some(p) => {
                w.write_bool(true)?;
                w.write_i32(p.cut_size.0)?;
                w.write_i32(p.cut_size.1)?;
                w.write_i32(p.cut_spacing.0)?;
                w.write_i32(p.cut_spacing.1)?;
                w.write_i32(p.bottom_enclosure.0)?;
                w.write_i32(p.bottom_enclosure.1)?;
                w.write_i32(p.top_enclosure.0)?;
                w.write_i32(p.top_enclosure.1)?;
                w.write_u32(p.rows)?;
                w.write_u32(p.cols)?;
                w.write_raw_oid(p.bottom.raw())?;
                w.write_raw_oid(p.cut.raw())?;
                w.write_raw_oid(p.top.raw())?;
            }
        }
        w.write_u32(self.boxes.len() as u32)?;
        for b in &self.boxes {
            write_via_box(w, b)?;
        }
        write_rect(w, self.bbox)?;
        match &self.rotated {
            None => {
                w.write_raw_oid(0)?;
                w.write_u8(0)?;
            }
            Some((via, orient)) => {
                w.write_raw_oid(via.raw())?;
                w.write_u8(Orient::ALL.iter().position(|o| o == orient).unwrap_or(0) as u8)?;
            }
        }
        Ok(())
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let generate_rule = r.read_str()?;
        let params = if r.read_bool()? {
            let cut_size = (r.read_i32()?, r.read_i32()?);
            let cut_spacing = (r.read_i32()?, r.read_i32()?);
            let bottom_enclosure = (r.read_i32()?, r.read_i32()?);
            let top_enclosure = (r.read_i32()?, r.read_i32()?);
            let rows = r.read_u32()?;
            let cols = r.read_u32()?;
            let bottom = r.read_req_oid()?;
            let cut = r.read_req_oid()?;
            let top = r.read_req_oid()?;
            Some(ViaParams {
                cut_size,
                cut_spacing,
                bottom_enclosure,
                top_enclosure,
                rows,
                cols,
                bottom,
                cut,
                top,
            })
        } else {
            None
        };
        let n = r.read_u32()?;
        let mut boxes = Vec::with_capacity(n as usize);
        for _ in 0..n {
            boxes.push(read_via_box(r)?);
        }
        let bbox = read_rect(r)?;
        let rotated_raw = r.read_raw_oid()?;
        let orient_idx = r.read_u8()? as usize;
        let orient = *Orient::ALL
            .get(orient_idx)
            .ok_or_else(|| Error::CorruptStream(format!("invalid orient {orient_idx}")))?;
        // freshly read tables stamp live slots with generation 0, so the
        // raw reference resolves directly
        let rotated = (rotated_raw != 0).then(|| (Oid::from_raw_parts(rotated_raw, 0), orient));
        Ok(Self {
            name,
            generate_rule: (!generate_rule.is_empty()).then_some(generate_rule),
            params,
            boxes,
            bbox,
            rotated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_layers() -> (crate::table::Table<Layer>, Oid<Layer>, Oid<Layer>, Oid<Layer>) {
        use crate::layer::LayerDir;
        let mut layers = crate::table::Table::new();
        let m1 = layers.create(Layer::routing("M1", 1, LayerDir::Horizontal, 200));
        let v1 = layers.create(Layer::cut("V1"));
        let m2 = layers.create(Layer::routing("M2", 2, LayerDir::Vertical, 200));
        (layers, m1, v1, m2)
    }

    #[test]
    fn via_params_box_counts() {
        let (_, m1, v1, m2) = dummy_layers();
        let params = ViaParams {
            cut_size: (100, 100),
            cut_spacing: (100, 100),
            bottom_enclosure: (50, 25),
            top_enclosure: (25, 50),
            rows: 2,
            cols: 3,
            bottom: m1,
            cut: v1,
            top: m2,
        };
        let boxes = params.boxes();
        assert_eq!(boxes.iter().filter(|b| b.layer == v1).count(), 6);
        assert_eq!(boxes.iter().filter(|b| b.layer == m1).count(), 1);
        let extent = params.cut_extent();
        assert_eq!(extent.dx(), 500);
        assert_eq!(extent.dy(), 300);

        let bot = boxes.iter().find(|b| b.layer == m1).unwrap().rect;
        assert_eq!(bot.dx(), 600);
        assert_eq!(bot.dy(), 350);
    }

    #[test]
    fn ordered_rules_sorts_by_level() {
        let (layers, m1, v1, m2) = dummy_layers();
        let rule = ViaGenerateRule {
            name: ArcStr::from("M2_M1"),
            is_default: true,
            layer_rules: vec![
                ViaLayerRule::new(m2),
                ViaLayerRule::new(v1),
                ViaLayerRule::new(m1),
            ],
        };
        let (bot, cut, top) = rule.ordered_rules(&layers).unwrap();
        assert_eq!(bot.layer, m1);
        assert_eq!(cut.layer, v1);
        assert_eq!(top.layer, m2);
    }
}
