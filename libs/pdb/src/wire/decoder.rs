//! The wire stream decoder.

use geom::point::Point;

use crate::block::Block;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::table::Oid;
use crate::tech::Tech;
use crate::via::{BlockVia, TechVia};

use super::encoder::block_via_span;
use super::ops::{flag, op, WireType, OPCODE_MASK};
use super::Wire;

/// The scope of a bound non-default layer rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// The rule lives in the technology's layer-rule table.
    Tech,
    /// The rule lives in the block's layer-rule table.
    Block,
}

/// Decoded mask colors of a via.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViaColor {
    /// Mask color of the bottom metal.
    pub bottom: u8,
    /// Mask color of the cut.
    pub cut: u8,
    /// Mask color of the top metal.
    pub top: u8,
}

/// One decoded operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedOp {
    /// A new path begins.
    Path {
        /// The path layer.
        layer: Oid<Layer>,
        /// The path wire type.
        wire_type: WireType,
    },
    /// A short path begins at a junction.
    Short {
        /// The path layer.
        layer: Oid<Layer>,
        /// The path wire type.
        wire_type: WireType,
        /// The junction the path is electrically tied to.
        junction: usize,
    },
    /// A virtual-wire path begins at a junction.
    Vwire {
        /// The path layer.
        layer: Oid<Layer>,
        /// The path wire type.
        wire_type: WireType,
        /// The junction the path is tied to.
        junction: usize,
    },
    /// A path continues from a junction.
    Junction {
        /// The layer at the junction.
        layer: Oid<Layer>,
        /// The path wire type.
        wire_type: WireType,
        /// The junction the path starts at.
        junction: usize,
        /// Starting x, inherited from the junction.
        x: i32,
        /// Starting y, inherited from the junction.
        y: i32,
    },
    /// A non-default layer rule binds to the path.
    Rule {
        /// Tech- or block-scope.
        scope: RuleScope,
        /// The raw layer-rule id.
        rule: u32,
    },
    /// The path reaches a point.
    Point {
        /// Current x.
        x: i32,
        /// Current y.
        y: i32,
        /// Extension carried by the point, if any.
        ext: Option<i32>,
    },
    /// A tech via at the current point.
    TechVia {
        /// The via.
        via: Oid<TechVia>,
        /// True if the path continues on the via's top layer.
        exit_top: bool,
    },
    /// A block via at the current point.
    Via {
        /// The via.
        via: Oid<BlockVia>,
        /// True if the path continues on the via's top layer.
        exit_top: bool,
    },
    /// A patch rectangle relative to the current point.
    Rect {
        /// Lower-left x delta.
        dx1: i32,
        /// Lower-left y delta.
        dy1: i32,
        /// Upper-right x delta.
        dx2: i32,
        /// Upper-right y delta.
        dy2: i32,
    },
    /// An instance-terminal connection at the current point.
    ITerm {
        /// The raw instance-terminal id.
        raw: u32,
    },
    /// A block-terminal connection at the current point.
    BTerm {
        /// The raw block-terminal id.
        raw: u32,
    },
    /// The stream is exhausted.
    End,
}

/// Walks a wire's opcode stream, producing [`DecodedOp`]s.
///
/// The decoder is a small state machine over the trailing tokens: it
/// tracks the current point, pairs the leading `X Y` of a path into one
/// point event, attaches extension operands, and transparently skips
/// `OPERAND`/`PROPERTY`/`NOP` entries while recording color state.
pub struct WireDecoder<'a> {
    tech: &'a Tech,
    block: &'a Block,
    wire: &'a Wire,
    idx: usize,
    jct_id: usize,
    x: i32,
    y: i32,
    point_cnt: u32,
    color: Option<u8>,
    via_color: Option<ViaColor>,
}

impl<'a> WireDecoder<'a> {
    /// Creates a decoder positioned at the start of `wire`.
    pub fn new(tech: &'a Tech, block: &'a Block, wire: &'a Wire) -> Self {
        Self {
            tech,
            block,
            wire,
            idx: 0,
            jct_id: 0,
            x: 0,
            y: 0,
            point_cnt: 0,
            color: None,
            via_color: None,
        }
    }

    /// The junction id (stream index) of the most recent operation.
    pub fn junction_id(&self) -> usize {
        self.jct_id
    }

    /// The current point.
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The active mask color.
    pub fn color(&self) -> Option<u8> {
        self.color
    }

    /// The active via mask colors.
    pub fn via_color(&self) -> Option<ViaColor> {
        self.via_color
    }

    fn at(&self, idx: usize) -> Result<(u8, i32)> {
        match (self.wire.opcodes.get(idx), self.wire.data.get(idx)) {
            (Some(&o), Some(&d)) => Ok((o, d)),
            _ => Err(Error::CorruptStream(format!("wire index {idx} out of range"))),
        }
    }

    /// Decodes the next operation.
    pub fn next(&mut self) -> Result<DecodedOp> {
        loop {
            if self.idx >= self.wire.opcodes.len() {
                return Ok(DecodedOp::End);
            }
            self.jct_id = self.idx;
            let (opcode, operand) = self.at(self.idx)?;
            self.idx += 1;

            match opcode & OPCODE_MASK {
                op::PATH => {
                    self.point_cnt = 0;
                    return Ok(DecodedOp::Path {
                        layer: self.layer_ref(operand)?,
                        wire_type: WireType::from_bits(opcode)?,
                    });
                }
                op::SHORT | op::VWIRE => {
                    self.point_cnt = 0;
                    let layer = self.layer_ref(operand)?;
                    let wire_type = WireType::from_bits(opcode)?;
                    let (jop, junction) = self.at(self.idx)?;
                    if jop & OPCODE_MASK != op::OPERAND {
                        return Err(Error::CorruptStream(
                            "short/vwire missing junction operand".to_string(),
                        ));
                    }
                    self.idx += 1;
                    let junction = junction as usize;
                    if opcode & OPCODE_MASK == op::SHORT {
                        return Ok(DecodedOp::Short { layer, wire_type, junction });
                    }
                    return Ok(DecodedOp::Vwire { layer, wire_type, junction });
                }
                op::JUNCTION => {
                    let junction = operand as usize;
                    let pnt = prev_point(
                        self.tech,
                        self.block,
                        &self.wire.opcodes,
                        &self.wire.data,
                        junction,
                        true,
                    )?;
                    self.x = pnt.x;
                    self.y = pnt.y;
                    self.point_cnt = 0;
                    let layer = pnt.layer.ok_or_else(|| {
                        Error::CorruptStream(format!("no layer at junction {junction}"))
                    })?;
                    return Ok(DecodedOp::Junction {
                        layer,
                        wire_type: WireType::from_bits(opcode)?,
                        junction,
                        x: pnt.x,
                        y: pnt.y,
                    });
                }
                op::RULE => {
                    let scope = if opcode & flag::BLOCK_RULE != 0 {
                        RuleScope::Block
                    } else {
                        RuleScope::Tech
                    };
                    return Ok(DecodedOp::Rule { scope, rule: operand as u32 });
                }
                op::X => {
                    self.x = operand;
                    if self.point_cnt == 0 {
                        // the first point of a path pairs X with Y
                        self.jct_id = self.idx;
                        let (yop, y) = self.at(self.idx)?;
                        if yop & OPCODE_MASK != op::Y {
                            return Err(Error::CorruptStream(
                                "path start missing Y coordinate".to_string(),
                            ));
                        }
                        self.idx += 1;
                        self.y = y;
                        self.point_cnt = 1;
                        let ext = self.take_extension(yop)?;
                        return Ok(DecodedOp::Point { x: self.x, y: self.y, ext });
                    }
                    self.point_cnt += 1;
                    let ext = self.take_extension(opcode)?;
                    return Ok(DecodedOp::Point { x: self.x, y: self.y, ext });
                }
                op::Y => {
                    if self.point_cnt == 0 {
                        return Err(Error::CorruptStream(
                            "Y coordinate before any X".to_string(),
                        ));
                    }
                    self.point_cnt += 1;
                    self.y = operand;
                    let ext = self.take_extension(opcode)?;
                    return Ok(DecodedOp::Point { x: self.x, y: self.y, ext });
                }
                op::COLINEAR => {
                    self.point_cnt += 1;
                    let ext = (opcode & flag::EXTENSION != 0).then_some(operand);
                    return Ok(DecodedOp::Point { x: self.x, y: self.y, ext });
                }
                op::VIA => {
                    let via = self.block.vias.lookup(operand as u32)?;
                    return Ok(DecodedOp::Via {
                        via,
                        exit_top: opcode & flag::VIA_EXIT_TOP != 0,
                    });
                }
                op::TECH_VIA => {
                    let via = self.tech.vias.lookup(operand as u32)?;
                    return Ok(DecodedOp::TechVia {
                        via,
                        exit_top: opcode & flag::VIA_EXIT_TOP != 0,
                    });
                }
                op::RECT => {
                    // operand order matches the encoder
                    let (_, dy1) = self.at(self.idx)?;
                    let (_, dx2) = self.at(self.idx + 1)?;
                    let (_, dy2) = self.at(self.idx + 2)?;
                    self.idx += 3;
                    return Ok(DecodedOp::Rect { dx1: operand, dy1, dx2, dy2 });
                }
                op::ITERM => return Ok(DecodedOp::ITerm { raw: operand as u32 }),
                op::BTERM => return Ok(DecodedOp::BTerm { raw: operand as u32 }),
                op::COLOR => {
                    self.color = (operand != 0).then_some(operand as u8);
                }
                op::VIA_COLOR => {
                    self.via_color = (operand != 0).then(|| ViaColor {
                        bottom: ((operand >> 4) & 0x3) as u8,
                        cut: ((operand >> 2) & 0x3) as u8,
                        top: (operand & 0x3) as u8,
                    });
                }
                op::OPERAND | op::PROPERTY | op::NOP => {}
                other => {
                    return Err(Error::CorruptStream(format!("invalid opcode {other}")));
                }
            }
        }
    }

    /// The layer of a via as seen by the path after crossing it.
    pub fn via_exit_layer(&self, op: DecodedOp) -> Result<Oid<Layer>> {
        match op {
            DecodedOp::TechVia { via, exit_top } => {
                let via = self.tech.vias.get(via)?;
                Ok(if exit_top { via.top } else { via.bottom })
            }
            DecodedOp::Via { via, exit_top } => {
                let via = self.block.vias.get(via)?;
                let (bottom, top) = block_via_span(via, self.tech)?;
                Ok(if exit_top { top } else { bottom })
            }
            _ => Err(Error::NotFound("not a via operation".to_string())),
        }
    }

    fn take_extension(&mut self, opcode: u8) -> Result<Option<i32>> {
        if opcode & flag::EXTENSION == 0 {
            return Ok(None);
        }
        let (eop, ext) = self.at(self.idx)?;
        if eop & OPCODE_MASK != op::OPERAND {
            return Err(Error::CorruptStream("missing extension operand".to_string()));
        }
        self.idx += 1;
        Ok(Some(ext))
    }

    fn layer_ref(&self, raw: i32) -> Result<Oid<Layer>> {
        self.tech.layers.lookup(raw as u32)
    }
}

/// A point recovered by scanning backwards through a wire stream.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WirePoint {
    pub x: i32,
    pub y: i32,
    pub layer: Option<Oid<Layer>>,
}

/// Finds the coordinates (and optionally the layer) in effect at stream
/// index `idx` by scanning backwards through coordinate, colinear, via,
/// and junction entries.
pub(crate) fn prev_point(
    tech: &Tech,
    block: &Block,
    opcodes: &[u8],
    data: &[i32],
    idx: usize,
    find_layer: bool,
) -> Result<WirePoint> {
    let mut idx = idx as isize;
    let mut x: Option<i32> = None;
    let mut y: Option<i32> = None;
    let mut layer: Option<Oid<Layer>> = None;

    loop {
        if idx < 0 {
            return Err(Error::CorruptStream("no point before junction".to_string()));
        }
        let i = idx as usize;
        let opcode = opcodes[i];
        match opcode & OPCODE_MASK {
            op::X => {
                if x.is_none() {
                    x = Some(data[i]);
                }
            }
            op::Y => {
                if y.is_none() {
                    y = Some(data[i]);
                }
            }
            op::COLINEAR => {}
            op::JUNCTION => {
                idx = data[i] as isize;
                continue;
            }
            op::SHORT | op::VWIRE => {
                if find_layer && layer.is_none() {
                    layer = Some(tech.layers.lookup(data[i] as u32)?);
                }
                if x.is_none() || y.is_none() {
                    // the path's first point lives at the tied junction
                    let junction = *data.get(i + 1).ok_or_else(|| {
                        Error::CorruptStream("short/vwire missing junction".to_string())
                    })?;
                    idx = junction as isize;
                    continue;
                }
            }
            op::PATH => {
                if find_layer && layer.is_none() {
                    layer = Some(tech.layers.lookup(data[i] as u32)?);
                }
            }
            op::TECH_VIA => {
                if find_layer && layer.is_none() {
                    let via = tech.vias.get(tech.vias.lookup(data[i] as u32)?)?;
                    layer = Some(if opcode & flag::VIA_EXIT_TOP != 0 {
                        via.top
                    } else {
                        via.bottom
                    });
                }
            }
            op::VIA => {
                if find_layer && layer.is_none() {
                    let via = block.vias.get(block.vias.lookup(data[i] as u32)?)?;
                    let (bottom, top) = block_via_span(via, tech)?;
                    layer = Some(if opcode & flag::VIA_EXIT_TOP != 0 { top } else { bottom });
                }
            }
            _ => {}
        }

        if x.is_some() && y.is_some() && (!find_layer || layer.is_some()) {
            return Ok(WirePoint {
                x: x.expect("checked"),
                y: y.expect("checked"),
                layer,
            });
        }
        idx -= 1;
    }
}
