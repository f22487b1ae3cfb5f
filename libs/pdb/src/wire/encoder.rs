//! The wire stream encoder.

use crate::block::Block;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::ndr::LayerRule;
use crate::table::Oid;
use crate::tech::Tech;
use crate::via::{BlockVia, TechVia};

use super::decoder::prev_point;
use super::ops::{flag, op, WireType, RULE_REFRESH_POINTS};
use super::Wire;

/// A non-default layer rule binding, tech- or block-scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleRef {
    /// A rule from the technology's layer-rule table.
    Tech(Oid<LayerRule>),
    /// A rule from the block's layer-rule table.
    Block(Oid<LayerRule>),
}

impl RuleRef {
    fn opcode(&self) -> u8 {
        match self {
            RuleRef::Tech(_) => op::RULE,
            RuleRef::Block(_) => op::RULE | flag::BLOCK_RULE,
        }
    }

    fn raw(&self) -> u32 {
        match self {
            RuleRef::Tech(oid) | RuleRef::Block(oid) => oid.raw(),
        }
    }
}

/// Builds the opcode/operand encoding of a wire.
///
/// The encoder accumulates into internal buffers; [`WireEncoder::finish`]
/// installs them on a wire. Junction ids returned by the point and via
/// methods address the built stream and may be passed back to the
/// junction-based path starts.
pub struct WireEncoder<'a> {
    tech: &'a Tech,
    block: &'a Block,
    opcodes: Vec<u8>,
    data: Vec<i32>,
    layer: Option<Oid<Layer>>,
    wire_type_bits: u8,
    rule_opcode: u8,
    rule_raw: u32,
    x: i32,
    y: i32,
    point_cnt: u32,
    via_cnt: u32,
    prev_extended_colinear: bool,
}

impl<'a> WireEncoder<'a> {
    /// Creates an encoder for a fresh wire.
    pub fn new(tech: &'a Tech, block: &'a Block) -> Self {
        Self {
            tech,
            block,
            opcodes: Vec::new(),
            data: Vec::new(),
            layer: None,
            wire_type_bits: 0,
            rule_opcode: 0,
            rule_raw: 0,
            x: 0,
            y: 0,
            point_cnt: 0,
            via_cnt: 0,
            prev_extended_colinear: false,
        }
    }

    /// Creates an encoder that continues an existing wire's stream.
    pub fn append(tech: &'a Tech, block: &'a Block, wire: &Wire) -> Self {
        let mut enc = Self::new(tech, block);
        enc.opcodes = wire.opcodes.clone();
        enc.data = wire.data.clone();
        enc
    }

    /// The index the next entry will occupy.
    pub fn next_index(&self) -> usize {
        self.opcodes.len()
    }

    fn add_op(&mut self, opcode: u8, value: i32) -> usize {
        self.opcodes.push(opcode);
        self.data.push(value);
        self.opcodes.len() - 1
    }

    fn init_path(&mut self, layer: Oid<Layer>, wire_type: WireType, rule: Option<RuleRef>) {
        self.layer = Some(layer);
        self.wire_type_bits = wire_type.to_bits();
        self.point_cnt = 0;
        self.via_cnt = 0;
        self.prev_extended_colinear = false;
        match rule {
            Some(rule) => {
                self.rule_opcode = rule.opcode();
                self.rule_raw = rule.raw();
            }
            None => {
                self.rule_opcode = 0;
                self.rule_raw = 0;
            }
        }
    }

    /// Starts a new path on `layer`, optionally bound to a non-default
    /// layer rule.
    pub fn new_path(
        &mut self,
        layer: Oid<Layer>,
        wire_type: WireType,
        rule: Option<RuleRef>,
    ) -> usize {
        self.init_path(layer, wire_type, rule);
        let id = self.add_op(op::PATH | self.wire_type_bits, layer.raw() as i32);
        if self.rule_raw != 0 {
            self.add_op(self.rule_opcode, self.rule_raw as i32);
        }
        id
    }

    /// Starts a new path at an existing junction, keeping the current
    /// wire type.
    pub fn new_path_at(&mut self, junction: usize, rule: Option<RuleRef>) -> Result<usize> {
        self.check_junction(junction)?;
        let pnt = prev_point(self.tech, self.block, &self.opcodes, &self.data, junction, true)?;
        let layer = pnt
            .layer
            .ok_or_else(|| Error::NotFound(format!("no layer at junction {junction}")))?;
        let wire_type_bits = self.wire_type_bits;
        self.init_path(layer, WireType::None, rule);
        self.wire_type_bits = wire_type_bits;
        self.x = pnt.x;
        self.y = pnt.y;
        self.point_cnt = 1;
        let id = self.add_op(op::JUNCTION | self.wire_type_bits, junction as i32);
        if self.rule_raw != 0 {
            self.add_op(self.rule_opcode, self.rule_raw as i32);
            self.add_op(op::COLINEAR, 0);
        } else {
            self.add_op(op::COLINEAR | flag::DEFAULT_WIDTH, 0);
        }
        Ok(id)
    }

    /// Starts a new path at an existing junction with an extension on the
    /// starting point.
    pub fn new_path_at_ext(
        &mut self,
        junction: usize,
        ext: i32,
        rule: Option<RuleRef>,
    ) -> Result<usize> {
        self.check_junction(junction)?;
        let pnt = prev_point(self.tech, self.block, &self.opcodes, &self.data, junction, true)?;
        let layer = pnt
            .layer
            .ok_or_else(|| Error::NotFound(format!("no layer at junction {junction}")))?;
        let wire_type_bits = self.wire_type_bits;
        self.init_path(layer, WireType::None, rule);
        self.wire_type_bits = wire_type_bits;
        self.x = pnt.x;
        self.y = pnt.y;
        self.point_cnt = 1;
        let id = self.add_op(op::JUNCTION | self.wire_type_bits, junction as i32);
        if self.rule_raw != 0 {
            self.add_op(self.rule_opcode, self.rule_raw as i32);
            self.add_op(op::COLINEAR | flag::EXTENSION, ext);
        } else {
            self.add_op(op::COLINEAR | flag::EXTENSION | flag::DEFAULT_WIDTH, ext);
        }
        Ok(id)
    }

    /// Starts a short path: a new path on `layer` electrically tied to an
    /// existing junction.
    pub fn new_path_short(
        &mut self,
        junction: usize,
        layer: Oid<Layer>,
        wire_type: WireType,
        rule: Option<RuleRef>,
    ) -> Result<usize> {
        self.check_junction(junction)?;
        self.init_path(layer, wire_type, rule);
        let id = self.add_op(op::SHORT | self.wire_type_bits, layer.raw() as i32);
        self.add_op(op::OPERAND, junction as i32);
        if self.rule_raw != 0 {
            self.add_op(self.rule_opcode, self.rule_raw as i32);
        }
        Ok(id)
    }

    /// Starts a virtual-wire path at an existing junction.
    pub fn new_path_vwire(
        &mut self,
        junction: usize,
        layer: Oid<Layer>,
        wire_type: WireType,
        rule: Option<RuleRef>,
    ) -> Result<usize> {
        self.check_junction(junction)?;
        self.init_path(layer, wire_type, rule);
        let id = self.add_op(op::VWIRE | self.wire_type_bits, layer.raw() as i32);
        self.add_op(op::OPERAND, junction as i32);
        if self.rule_raw != 0 {
            self.add_op(self.rule_opcode, self.rule_raw as i32);
        }
        Ok(id)
    }

    fn check_junction(&self, junction: usize) -> Result<()> {
        if junction >= self.opcodes.len() {
            return Err(Error::NotFound(format!("junction {junction} out of range")));
        }
        Ok(())
    }

    fn width_flag(&self) -> u8 {
        if self.rule_raw == 0 {
            flag::DEFAULT_WIDTH
        } else {
            0
        }
    }

    fn refresh_rule(&mut self) {
        if self.rule_raw != 0
            && self.point_cnt != 0
            && self.point_cnt % RULE_REFRESH_POINTS == 0
        {
            self.add_op(self.rule_opcode, self.rule_raw as i32);
        }
    }

    /// Adds the next point of the current path, returning its junction
    /// id. Segments must be Manhattan.
    pub fn add_point(&mut self, x: i32, y: i32) -> Result<usize> {
        let dw = self.width_flag();
        let mut jct = self.opcodes.len();
        if self.point_cnt == 0 {
            self.add_op(op::X | dw, x);
            self.add_op(op::Y | dw, y);
            self.x = x;
            self.y = y;
            self.point_cnt += 1;
            jct += 1;
        } else if self.x == x && self.y == y {
            self.add_op(op::COLINEAR | dw, 0);
        } else if self.y == y {
            self.add_op(op::X | dw, x);
            self.x = x;
            self.point_cnt += 1;
        } else if self.x == x {
            self.add_op(op::Y | dw, y);
            self.y = y;
            self.point_cnt += 1;
        } else {
            return Err(Error::Unsupported(format!(
                "non-Manhattan segment ({}, {}) -> ({x}, {y})",
                self.x, self.y
            )));
        }
        self.refresh_rule();
        self.prev_extended_colinear = false;
        Ok(jct)
    }

    /// Adds a point carrying an extension value.
    pub fn add_point_ext(&mut self, x: i32, y: i32, ext: i32) -> Result<usize> {
        let dw = self.width_flag();
        let mut jct = self.opcodes.len();
        if self.point_cnt == 0 {
            self.add_op(op::X | dw, x);
            self.add_op(op::Y | flag::EXTENSION | dw, y);
            self.add_op(op::OPERAND, ext);
            self.x = x;
            self.y = y;
            self.point_cnt += 1;
            jct += 1;
            self.prev_extended_colinear = false;
        } else if self.x == x && self.y == y {
            // a colinear extension needs a segment or via before it, and
            // two in a row are ambiguous
            if self.point_cnt <= 1 && self.via_cnt == 0 {
                return Err(Error::Unsupported(
                    "colinear extension before any segment".to_string(),
                ));
            }
            if self.prev_extended_colinear {
                return Err(Error::Unsupported(
                    "consecutive colinear extensions".to_string(),
                ));
            }
            self.add_op(op::COLINEAR | flag::EXTENSION | dw, ext);
            self.prev_extended_colinear = true;
        } else if self.y == y {
            self.add_op(op::X | flag::EXTENSION | dw, x);
            self.add_op(op::OPERAND, ext);
            self.x = x;
            self.point_cnt += 1;
            self.prev_extended_colinear = false;
        } else if self.x == x {
            self.add_op(op::Y | flag::EXTENSION | dw, y);
            self.add_op(op::OPERAND, ext);
            self.y = y;
            self.point_cnt += 1;
            self.prev_extended_colinear = false;
        } else {
            return Err(Error::Unsupported(format!(
                "non-Manhattan segment ({}, {}) -> ({x}, {y})",
                self.x, self.y
            )));
        }
        self.refresh_rule();
        Ok(jct)
    }

    /// Adds a point with a scalar property.
    ///
    /// The point's opcode carries the property flag; the value follows in
    /// a `PROPERTY` entry. The first point of a path cannot carry one.
    pub fn add_point_with_property(&mut self, x: i32, y: i32, property: i32) -> Result<usize> {
        let jct = self.add_point(x, y)?;
        if self.point_cnt != 1 {
            self.opcodes[jct] |= flag::PROPERTY;
            self.add_op(op::PROPERTY, property);
        }
        Ok(jct)
    }

    /// Places a tech via at the current point. The path continues on the
    /// via's other routing layer.
    pub fn add_tech_via(&mut self, via: Oid<TechVia>) -> Result<usize> {
        if self.point_cnt == 0 {
            return Err(Error::Unsupported("via before any point".to_string()));
        }
        let record = self.tech.vias.get(via)?;
        let layer = self
            .layer
            .ok_or_else(|| Error::NotFound("no active path layer".to_string()))?;
        let id = if record.top == layer {
            self.layer = Some(record.bottom);
            self.add_op(op::TECH_VIA, via.raw() as i32)
        } else if record.bottom == layer {
            self.layer = Some(record.top);
            self.add_op(op::TECH_VIA | flag::VIA_EXIT_TOP, via.raw() as i32)
        } else {
            return Err(Error::Unsupported(format!(
                "via {} does not touch the current layer",
                record.name
            )));
        };
        // tech vias reset the mask color
        self.add_op(op::COLOR, 0);
        self.via_cnt += 1;
        Ok(id)
    }

    /// Places a block via at the current point.
    pub fn add_via(&mut self, via: Oid<BlockVia>) -> Result<usize> {
        if self.point_cnt == 0 {
            return Err(Error::Unsupported("via before any point".to_string()));
        }
        let record = self.block.vias.get(via)?;
        let layer = self
            .layer
            .ok_or_else(|| Error::NotFound("no active path layer".to_string()))?;
        let (bottom, top) = block_via_span(record, self.tech)?;
        let id = if top == layer {
            self.layer = Some(bottom);
            self.add_op(op::VIA, via.raw() as i32)
        } else if bottom == layer {
            self.layer = Some(top);
            self.add_op(op::VIA | flag::VIA_EXIT_TOP, via.raw() as i32)
        } else {
            return Err(Error::Unsupported(format!(
                "via {} does not touch the current layer",
                record.name
            )));
        };
        self.via_cnt += 1;
        Ok(id)
    }

    /// Adds a patch rectangle relative to the current point.
    pub fn add_rect(&mut self, dx1: i32, dy1: i32, dx2: i32, dy2: i32) -> Result<()> {
        if self.point_cnt == 0 {
            return Err(Error::Unsupported("rect before any point".to_string()));
        }
        // operand order must match the decoder
        self.add_op(op::RECT, dx1);
        self.add_op(op::OPERAND, dy1);
        self.add_op(op::OPERAND, dx2);
        self.add_op(op::OPERAND, dy2);
        Ok(())
    }

    /// Records an instance-terminal connection at the current point.
    pub fn add_iterm(&mut self, iterm_raw: u32) -> Result<()> {
        if self.point_cnt == 0 {
            return Err(Error::Unsupported("terminal before any point".to_string()));
        }
        self.add_op(op::ITERM, iterm_raw as i32);
        Ok(())
    }

    /// Records a block-terminal connection at the current point.
    pub fn add_bterm(&mut self, bterm_raw: u32) -> Result<()> {
        if self.point_cnt == 0 {
            return Err(Error::Unsupported("terminal before any point".to_string()));
        }
        self.add_op(op::BTERM, bterm_raw as i32);
        Ok(())
    }

    /// Sets the mask color for the following segments.
    pub fn set_color(&mut self, mask_color: u8) -> Result<()> {
        if !(1..=3).contains(&mask_color) {
            return Err(Error::Unsupported(format!(
                "mask color {mask_color} must be between 1 and 3"
            )));
        }
        self.add_op(op::COLOR, mask_color as i32);
        Ok(())
    }

    /// Clears the mask color.
    pub fn clear_color(&mut self) {
        self.add_op(op::COLOR, 0);
    }

    /// Sets the mask colors of the following via.
    pub fn set_via_color(&mut self, bottom: u8, cut: u8, top: u8) -> Result<()> {
        for color in [bottom, cut, top] {
            if color > 3 {
                return Err(Error::Unsupported(format!(
                    "mask color {color} must be between 0 and 3"
                )));
            }
        }
        let packed = (bottom as i32) << 4 | (cut as i32) << 2 | top as i32;
        self.add_op(op::VIA_COLOR, packed);
        Ok(())
    }

    /// Clears the via mask colors.
    pub fn clear_via_color(&mut self) {
        self.add_op(op::VIA_COLOR, 0);
    }

    /// Installs the built encoding on `wire`.
    pub fn finish(self, wire: &mut Wire) {
        wire.opcodes = self.opcodes;
        wire.data = self.data;
    }

    /// Returns the built opcode and operand sequences.
    pub fn into_parts(self) -> (Vec<u8>, Vec<i32>) {
        (self.opcodes, self.data)
    }
}

/// The (bottom, top) routing layers of a block via.
pub(crate) fn block_via_span(
    via: &BlockVia,
    tech: &Tech,
) -> Result<(Oid<Layer>, Oid<Layer>)> {
    if let Some(params) = &via.params {
        return Ok((params.bottom, params.top));
    }
    let mut bottom: Option<(u32, Oid<Layer>)> = None;
    let mut top: Option<(u32, Oid<Layer>)> = None;
    for b in &via.boxes {
        let layer = tech.layers.get(b.layer)?;
        if !layer.is_routing() {
            continue;
        }
        let level = layer.routing_level;
        if bottom.map(|(l, _)| level < l).unwrap_or(true) {
            bottom = Some((level, b.layer));
        }
        if top.map(|(l, _)| level > l).unwrap_or(true) {
            top = Some((level, b.layer));
        }
    }
    match (bottom, top) {
        (Some((_, b)), Some((_, t))) => Ok((b, t)),
        _ => Err(Error::NotFound(format!("via {} has no routing layers", via.name))),
    }
}
