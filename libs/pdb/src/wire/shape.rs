//! Geometry reconstruction from encoded wires.

use geom::point::Point;
use geom::rect::Rect;

use crate::block::Block;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::table::Oid;
use crate::tech::Tech;
use crate::via::{BlockVia, TechVia};

use super::decoder::{prev_point, DecodedOp, RuleScope, WireDecoder};
use super::ops::{flag, op, WireType, OPCODE_MASK};
use super::Wire;

/// One decoded wire shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireShape {
    /// A Manhattan segment between two points.
    Segment {
        /// The routing layer.
        layer: Oid<Layer>,
        /// Begin x.
        x1: i32,
        /// Begin y.
        y1: i32,
        /// End x.
        x2: i32,
        /// End y.
        y2: i32,
        /// The full wire width.
        width: i32,
        /// Explicit extension at the begin point.
        begin_ext: Option<i32>,
        /// Explicit extension at the end point.
        end_ext: Option<i32>,
        /// The path's wire type.
        wire_type: WireType,
    },
    /// A tech via placed at a point.
    TechVia {
        /// The via.
        via: Oid<TechVia>,
        /// The placement point.
        origin: Point,
        /// The via bounding box at the placement point.
        bbox: Rect,
    },
    /// A block via placed at a point.
    BlockVia {
        /// The via.
        via: Oid<BlockVia>,
        /// The placement point.
        origin: Point,
        /// The via bounding box at the placement point.
        bbox: Rect,
    },
}

impl WireShape {
    /// True for via shapes.
    pub fn is_via(&self) -> bool {
        !matches!(self, WireShape::Segment { .. })
    }

    /// The occupied bounding box of the shape.
    ///
    /// Segment ends extend by the explicit extension where present, else
    /// by half the width.
    pub fn bbox(&self, _tech: &Tech, _block: &Block) -> Rect {
        match *self {
            WireShape::Segment { x1, y1, x2, y2, width, begin_ext, end_ext, .. } => {
                let half = width / 2;
                let begin = begin_ext.unwrap_or(half);
                let end = end_ext.unwrap_or(half);
                if y1 == y2 {
                    let (lo, hi) = if x1 <= x2 { (x1 - begin, x2 + end) } else { (x2 - end, x1 + begin) };
                    Rect::from_sides(lo, y1 - half, hi, y1 + half)
                } else {
                    let (lo, hi) = if y1 <= y2 { (y1 - begin, y2 + end) } else { (y2 - end, y1 + begin) };
                    Rect::from_sides(x1 - half, lo, x1 + half, hi)
                }
            }
            WireShape::TechVia { bbox, .. } | WireShape::BlockVia { bbox, .. } => bbox,
        }
    }
}

/// Decodes the complete shape list of a wire.
pub fn wire_shapes(wire: &Wire, tech: &Tech, block: &Block) -> Result<Vec<WireShape>> {
    let mut decoder = WireDecoder::new(tech, block, wire);
    let mut shapes = Vec::new();

    let mut layer: Option<Oid<Layer>> = None;
    let mut wire_type = WireType::None;
    let mut rule_width: Option<i32> = None;
    let mut prev: Option<(i32, i32, Option<i32>)> = None;

    loop {
        let decoded = decoder.next()?;
        match decoded {
            DecodedOp::Path { layer: l, wire_type: wt }
            | DecodedOp::Short { layer: l, wire_type: wt, .. }
            | DecodedOp::Vwire { layer: l, wire_type: wt, .. } => {
                layer = Some(l);
                wire_type = wt;
                rule_width = None;
                prev = None;
            }
            DecodedOp::Junction { layer: l, wire_type: wt, .. } => {
                layer = Some(l);
                wire_type = wt;
                rule_width = None;
                prev = None;
            }
            DecodedOp::Rule { scope, rule } => {
                rule_width = Some(rule_width_of(tech, block, scope, rule)?);
            }
            DecodedOp::Point { x, y, ext } => {
                if let Some((px, py, pext)) = prev {
                    let moved = px != x || py != y;
                    if moved || ext.is_some() {
                        let l = layer
                            .ok_or_else(|| Error::CorruptStream("point outside a path".into()))?;
                        let width = match rule_width {
                            Some(w) => w,
                            None => tech.layers.get(l)?.width,
                        };
                        shapes.push(WireShape::Segment {
                            layer: l,
                            x1: px,
                            y1: py,
                            x2: x,
                            y2: y,
                            width,
                            begin_ext: pext,
                            end_ext: ext,
                            wire_type,
                        });
                    }
                }
                prev = Some((x, y, ext));
            }
            DecodedOp::TechVia { via, .. } => {
                let origin = decoder.point();
                let bbox = tech.vias.get(via)?.bbox.translate(origin);
                shapes.push(WireShape::TechVia { via, origin, bbox });
                layer = Some(decoder.via_exit_layer(decoded)?);
                prev = Some((origin.x, origin.y, None));
            }
            DecodedOp::Via { via, .. } => {
                let origin = decoder.point();
                let bbox = block.vias.get(via)?.bbox.translate(origin);
                shapes.push(WireShape::BlockVia { via, origin, bbox });
                layer = Some(decoder.via_exit_layer(decoded)?);
                prev = Some((origin.x, origin.y, None));
            }
            DecodedOp::Rect { .. }
            | DecodedOp::ITerm { .. }
            | DecodedOp::BTerm { .. } => {}
            DecodedOp::End => break,
        }
    }
    Ok(shapes)
}

fn rule_width_of(tech: &Tech, block: &Block, scope: RuleScope, raw: u32) -> Result<i32> {
    let rule = match scope {
        RuleScope::Tech => tech.layer_rules.get(tech.layer_rules.lookup(raw)?)?,
        RuleScope::Block => block.layer_rules.get(block.layer_rules.lookup(raw)?)?,
    };
    Ok(rule.width)
}

// ---------------------------------------------------------------------------
// single-shape reverse decoding

const X_INPUT: usize = 0;
const Y_INPUT: usize = 1;
const C_INPUT: usize = 2;

const X_COORD: usize = 0;
const Y_COORD: usize = 1;
const NO_COORD: usize = 2;

// The reverse-decoding state machine over the last three coordinate
// tokens. State 13 means both endpoints are recovered. Indexed by
// [state][input] with inputs X, Y, colinear.
#[rustfmt::skip]
const NEXT_STATE: [[usize; 3]; 13] = [
    /*  0 */ [1, 2, 3],
    /*  1 */ [4, 5, 6],
    /*  2 */ [7, 8, 9],
    /*  3 */ [10, 11, 12],
    /*  4 */ [4, 13, 4],
    /*  5 */ [13, 5, 5],
    /*  6 */ [4, 5, 6],
    /*  7 */ [7, 13, 7],
    /*  8 */ [13, 8, 8],
    /*  9 */ [7, 8, 9],
    /* 10 */ [10, 13, 10],
    /* 11 */ [13, 11, 11],
    /* 12 */ [10, 11, 12],
];

#[rustfmt::skip]
const BEGIN_COORD: [[usize; 3]; 13] = [
    /*  0 */ [NO_COORD, NO_COORD, NO_COORD],
    /*  1 */ [X_COORD, Y_COORD, NO_COORD],
    /*  2 */ [X_COORD, Y_COORD, NO_COORD],
    /*  3 */ [X_COORD, Y_COORD, NO_COORD],
    /*  4 */ [NO_COORD, Y_COORD, NO_COORD],
    /*  5 */ [X_COORD, NO_COORD, NO_COORD],
    /*  6 */ [X_COORD, Y_COORD, NO_COORD],
    /*  7 */ [NO_COORD, Y_COORD, NO_COORD],
    /*  8 */ [X_COORD, NO_COORD, NO_COORD],
    /*  9 */ [X_COORD, Y_COORD, NO_COORD],
    /* 10 */ [NO_COORD, Y_COORD, NO_COORD],
    /* 11 */ [X_COORD, NO_COORD, NO_COORD],
    /* 12 */ [X_COORD, Y_COORD, NO_COORD],
];

#[rustfmt::skip]
const END_COORD: [[usize; 3]; 13] = [
    /*  0 */ [X_COORD, Y_COORD, NO_COORD],
    /*  1 */ [NO_COORD, Y_COORD, NO_COORD],
    /*  2 */ [X_COORD, NO_COORD, NO_COORD],
    /*  3 */ [X_COORD, Y_COORD, NO_COORD],
    /*  4 */ [NO_COORD, Y_COORD, NO_COORD],
    /*  5 */ [NO_COORD, NO_COORD, NO_COORD],
    /*  6 */ [NO_COORD, Y_COORD, NO_COORD],
    /*  7 */ [NO_COORD, NO_COORD, NO_COORD],
    /*  8 */ [X_COORD, NO_COORD, NO_COORD],
    /*  9 */ [X_COORD, NO_COORD, NO_COORD],
    /* 10 */ [NO_COORD, Y_COORD, NO_COORD],
    /* 11 */ [X_COORD, NO_COORD, NO_COORD],
    /* 12 */ [X_COORD, Y_COORD, NO_COORD],
];

/// Decodes the single shape addressed by `shape_id`.
///
/// A coordinate opcode yields the segment ending at that point, decoded
/// by scanning backwards through the stream; a via opcode yields the via
/// at its placement point.
pub fn shape_at(wire: &Wire, tech: &Tech, block: &Block, shape_id: usize) -> Result<WireShape> {
    let opcode = *wire
        .opcodes
        .get(shape_id)
        .ok_or_else(|| Error::NotFound(format!("shape id {shape_id} out of range")))?;
    match opcode & OPCODE_MASK {
        op::X | op::Y | op::COLINEAR => segment_at(wire, tech, block, shape_id),
        op::TECH_VIA => {
            let via = tech.vias.lookup(wire.data[shape_id] as u32)?;
            let pnt = prev_point(tech, block, &wire.opcodes, &wire.data, shape_id, false)?;
            let origin = Point::new(pnt.x, pnt.y);
            let bbox = tech.vias.get(via)?.bbox.translate(origin);
            Ok(WireShape::TechVia { via, origin, bbox })
        }
        op::VIA => {
            let via = block.vias.lookup(wire.data[shape_id] as u32)?;
            let pnt = prev_point(tech, block, &wire.opcodes, &wire.data, shape_id, false)?;
            let origin = Point::new(pnt.x, pnt.y);
            let bbox = block.vias.get(via)?.bbox.translate(origin);
            Ok(WireShape::BlockVia { via, origin, bbox })
        }
        other => Err(Error::NotFound(format!("opcode {other} has no shape"))),
    }
}

fn segment_at(wire: &Wire, tech: &Tech, block: &Block, shape_id: usize) -> Result<WireShape> {
    let opcodes = &wire.opcodes;
    let data = &wire.data;

    let mut layer: Option<Oid<Layer>> = None;
    let mut width = 0;
    let mut found_width = false;
    let mut default_width = false;

    let mut idx = shape_id as isize;
    let mut state = 0usize;
    let mut begin = [0i32; 3];
    let mut end = [0i32; 3];
    let mut begin_ext = None;
    let mut end_ext = None;
    let mut ignore_ext = false;

    // phase 1: recover both endpoints
    while state < 13 {
        if idx < 0 {
            return Err(Error::CorruptStream("segment decode ran off the stream".into()));
        }
        let i = idx as usize;
        let opcode = opcodes[i];
        let input = match opcode & OPCODE_MASK {
            op::JUNCTION => {
                idx = data[i] as isize;
                ignore_ext = true;
                continue;
            }
            op::RULE => {
                if !found_width {
                    found_width = true;
                    width = rule_width_at(tech, block, opcode, data[i])?;
                }
                idx -= 1;
                continue;
            }
            op::X => X_INPUT,
            op::Y => Y_INPUT,
            op::COLINEAR => C_INPUT,
            op::VIA | op::TECH_VIA => {
                if layer.is_none() {
                    layer = Some(via_exit_layer_at(tech, block, opcode, data[i])?);
                }
                ignore_ext = true;
                idx -= 1;
                continue;
            }
            _ => {
                idx -= 1;
                continue;
            }
        };

        if state == 0 {
            if opcode & flag::DEFAULT_WIDTH != 0 {
                found_width = true;
                default_width = true;
            }
            if opcode & flag::EXTENSION != 0 {
                // colinear ops carry their extension inline
                end_ext = Some(if input == C_INPUT { data[i] } else { data[i + 1] });
            }
        } else if state <= 3 && opcode & flag::EXTENSION != 0 && !ignore_ext {
            begin_ext = Some(if input == C_INPUT { data[i] } else { data[i + 1] });
        }

        let value = data[i];
        begin[BEGIN_COORD[state][input]] = value;
        end[END_COORD[state][input]] = value;
        state = NEXT_STATE[state][input];
        idx -= 1;
    }

    // phase 2: keep scanning for the layer and the width
    while layer.is_none() || !found_width {
        if idx < 0 {
            return Err(Error::CorruptStream("segment decode found no path start".into()));
        }
        let i = idx as usize;
        let opcode = opcodes[i];
        match opcode & OPCODE_MASK {
            op::PATH | op::SHORT | op::VWIRE => {
                if layer.is_none() {
                    layer = Some(tech.layers.lookup(data[i] as u32)?);
                }
                idx -= 1;
            }
            op::JUNCTION => {
                idx = data[i] as isize;
            }
            op::RULE => {
                if !found_width {
                    found_width = true;
                    width = rule_width_at(tech, block, opcode, data[i])?;
                }
                idx -= 1;
            }
            op::VIA | op::TECH_VIA => {
                if layer.is_none() {
                    layer = Some(via_exit_layer_at(tech, block, opcode, data[i])?);
                }
                idx -= 1;
            }
            _ => idx -= 1,
        }
    }

    let layer = layer.expect("loop exits with a layer");
    let width = if default_width { tech.layers.get(layer)?.width } else { width };

    Ok(WireShape::Segment {
        layer,
        x1: begin[X_COORD],
        y1: begin[Y_COORD],
        x2: end[X_COORD],
        y2: end[Y_COORD],
        width,
        begin_ext,
        end_ext,
        wire_type: WireType::None,
    })
}

fn rule_width_at(tech: &Tech, block: &Block, opcode: u8, raw: i32) -> Result<i32> {
    let scope = if opcode & flag::BLOCK_RULE != 0 { RuleScope::Block } else { RuleScope::Tech };
    rule_width_of(tech, block, scope, raw as u32)
}

fn via_exit_layer_at(tech: &Tech, block: &Block, opcode: u8, raw: i32) -> Result<Oid<Layer>> {
    let exit_top = opcode & flag::VIA_EXIT_TOP != 0;
    if opcode & OPCODE_MASK == op::TECH_VIA {
        let via = tech.vias.get(tech.vias.lookup(raw as u32)?)?;
        Ok(if exit_top { via.top } else { via.bottom })
    } else {
        let via = block.vias.get(block.vias.lookup(raw as u32)?)?;
        let (bottom, top) = super::encoder::block_via_span(via, tech)?;
        Ok(if exit_top { top } else { bottom })
    }
}
