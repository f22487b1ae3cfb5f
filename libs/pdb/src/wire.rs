//! Encoded routed wires.
//!
//! A wire is two co-indexed sequences: one byte of opcode-plus-flags and
//! one signed 32-bit operand per entry. The low five bits of the opcode
//! byte select the operation; the high three bits are flags. Path-start
//! opcodes reuse the flag bits to carry the wire type, via opcodes reuse
//! bit 5 to select the exit layer, and the rule opcode reuses bit 5 to
//! select tech- or block-scope rules.
//!
//! [`WireEncoder`] builds streams; [`WireDecoder`] walks them as a small
//! state machine; [`shape::wire_shapes`] reconstructs segment and via
//! geometry, and [`Wire::shape_at`] reverse-decodes the shape at a single
//! junction id.

mod decoder;
mod encoder;
pub mod ops;
pub mod shape;

pub use decoder::{DecodedOp, RuleScope, ViaColor, WireDecoder};
pub use encoder::{RuleRef, WireEncoder};
pub use ops::WireType;
pub use shape::{wire_shapes, WireShape};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::stream::{StreamReader, StreamWriter};
use crate::table::Oid;
use crate::tech::Tech;

use ops::op;

/// An encoded routed wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wire {
    pub(crate) is_global: bool,
    /// Raw id of the owning net; 0 when detached.
    pub(crate) net: u32,
    pub(crate) opcodes: Vec<u8>,
    pub(crate) data: Vec<i32>,
}

impl Wire {
    /// The opcode sequence.
    pub fn opcodes(&self) -> &[u8] {
        &self.opcodes
    }

    /// The operand sequence; always the same length as
    /// [`Wire::opcodes`].
    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// The number of opcode/operand pairs.
    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    /// True if the wire has no encoding.
    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    /// True for the global wire of a net.
    pub fn is_global(&self) -> bool {
        self.is_global
    }

    /// The raw id of the owning net, 0 when detached.
    pub fn net_raw(&self) -> u32 {
        self.net
    }

    /// Installs an encoding built by a [`WireEncoder`].
    ///
    /// The sequences must be co-indexed and begin with a path-start
    /// opcode.
    pub fn set_encoding(&mut self, opcodes: Vec<u8>, data: Vec<i32>) -> Result<()> {
        if opcodes.len() != data.len() {
            return Err(Error::Unsupported(format!(
                "opcode/data length mismatch: {} vs {}",
                opcodes.len(),
                data.len()
            )));
        }
        if let Some(&first) = opcodes.first() {
            if !matches!(first & ops::OPCODE_MASK, op::PATH | op::SHORT | op::VWIRE | op::JUNCTION)
            {
                return Err(Error::Unsupported(
                    "wire encoding must begin with a path start".to_string(),
                ));
            }
        }
        self.opcodes = opcodes;
        self.data = data;
        Ok(())
    }

    /// Compares two encodings, ignoring instance- and block-terminal
    /// operands.
    ///
    /// Returns 0 when equal. Non-zero results classify the first
    /// difference: 10 for a length mismatch, 1 for an opcode mismatch, 2
    /// for an operand mismatch; 10 is added to either when the previous
    /// entry was a junction. Any non-zero result means "unequal".
    pub fn equal(&self, target: &Wire) -> u32 {
        if self.data.len() != target.data.len() {
            return 10;
        }
        let mut pjunction = 0;
        for idx in 0..self.data.len() {
            let src_op = self.opcodes[idx] & ops::OPCODE_MASK;
            let tgt_op = target.opcodes[idx] & ops::OPCODE_MASK;
            if src_op != tgt_op {
                return 1 + pjunction;
            }
            if src_op == op::ITERM || src_op == op::BTERM {
                continue;
            }
            if self.data[idx] != target.data[idx] {
                return 2 + pjunction;
            }
            if src_op == op::COLINEAR {
                continue;
            }
            pjunction = if src_op == op::JUNCTION { 10 } else { 0 };
        }
        0
    }

    /// The total Manhattan length of all segments; vias contribute zero.
    pub fn length(&self, tech: &Tech, block: &Block) -> Result<u64> {
        let mut total = 0u64;
        for s in shape::wire_shapes(self, tech, block)? {
            if let shape::WireShape::Segment { x1, y1, x2, y2, .. } = s {
                total += (i64::from(x2 - x1).abs() + i64::from(y2 - y1).abs()) as u64;
            }
        }
        Ok(total)
    }

    /// The bounding box of all decoded shapes.
    pub fn bbox(&self, tech: &Tech, block: &Block) -> Result<Option<geom::rect::Rect>> {
        let shapes = shape::wire_shapes(self, tech, block)?;
        Ok(geom::rect::Rect::union_all(shapes.iter().map(|s| s.bbox(tech, block))))
    }

    /// Decodes the single shape addressed by a junction id; see
    /// [`shape::shape_at`].
    pub fn shape_at(
        &self,
        tech: &Tech,
        block: &Block,
        shape_id: usize,
    ) -> Result<shape::WireShape> {
        shape::shape_at(self, tech, block, shape_id)
    }

    // -----------------------------------------------------------------
    // streaming

    pub(crate) fn flags_word(&self) -> u32 {
        self.is_global as u32
    }

    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_u32(self.flags_word())?;
        w.write_bytes(&self.opcodes)?;
        w.write_i32_vec(&self.data)?;
        w.write_raw_oid(self.net)
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let flags = r.read_u32()?;
        let opcodes = r.read_bytes()?;
        let data = r.read_i32_vec()?;
        let net = r.read_raw_oid()?;
        if opcodes.len() != data.len() {
            return Err(Error::CorruptStream(format!(
                "wire opcode/data length mismatch: {} vs {}",
                opcodes.len(),
                data.len()
            )));
        }
        Ok(Self { is_global: flags & 0x1 != 0, net, opcodes, data })
    }
}

/// Appends `src` onto `dst` within one block.
///
/// Both streams are byte-copied; every junction reference in the appended
/// region is shifted by the pre-copy length so it keeps addressing the
/// copied source entries. Via operands stay valid because both wires share
/// the block's via table.
pub fn append_within(block: &mut Block, dst: Oid<Wire>, src: Oid<Wire>) -> Result<()> {
    let (src_opcodes, src_data) = {
        let src = block.wires.get(src)?;
        (src.opcodes.clone(), src.data.clone())
    };
    let dst = block.wires.get_mut(dst)?;
    let base = dst.opcodes.len() as i32;
    dst.opcodes.extend_from_slice(&src_opcodes);
    dst.data.extend_from_slice(&src_data);
    renumber_junctions(dst, base);
    Ok(())
}

/// Appends a wire from another block onto `dst`.
///
/// Junction references are renumbered as in [`append_within`]. Block-via
/// operands are rewritten to `dst_block`'s via table, copying via
/// definitions by name when absent. Wires carrying instance- or
/// block-terminal connections cannot move across blocks; unless
/// `single_segment` is set, such wires are refused.
pub fn append_across(
    dst_block: &mut Block,
    dst: Oid<Wire>,
    src_block: &Block,
    src: Oid<Wire>,
    single_segment: bool,
) -> Result<()> {
    let src = src_block.wires.get(src)?;
    if !single_segment && has_term_ops(&src.opcodes) {
        return Err(Error::Unsupported(
            "cannot move instance/block terminals across blocks".to_string(),
        ));
    }
    let (opcodes, data) = rewrite_vias(dst_block, src_block, &src.opcodes, &src.data)?;

    let dst = dst_block.wires.get_mut(dst)?;
    let base = dst.opcodes.len() as i32;
    dst.opcodes.extend_from_slice(&opcodes);
    dst.data.extend_from_slice(&data);
    renumber_junctions(dst, base);
    Ok(())
}

/// Replaces `dst`'s encoding with a copy of `src` from the same block.
///
/// With `remove_terms`, instance- and block-terminal entries become `NOP`
/// with operand 0.
pub fn copy_within(
    block: &mut Block,
    dst: Oid<Wire>,
    src: Oid<Wire>,
    remove_terms: bool,
) -> Result<()> {
    let (mut opcodes, mut data) = {
        let src = block.wires.get(src)?;
        (src.opcodes.clone(), src.data.clone())
    };
    if remove_terms {
        nop_terms(&mut opcodes, &mut data);
    }
    let dst = block.wires.get_mut(dst)?;
    dst.opcodes = opcodes;
    dst.data = data;
    Ok(())
}

/// Replaces `dst`'s encoding with a copy of a wire from another block.
///
/// With `copy_vias`, block-via definitions referenced by the source are
/// duplicated into `dst_block` by name as needed and the via operands
/// rewritten.
pub fn copy_across(
    dst_block: &mut Block,
    dst: Oid<Wire>,
    src_block: &Block,
    src: Oid<Wire>,
    remove_terms: bool,
    copy_vias: bool,
) -> Result<()> {
    let src = src_block.wires.get(src)?;
    let (mut opcodes, mut data) = if copy_vias {
        rewrite_vias(dst_block, src_block, &src.opcodes, &src.data)?
    } else {
        (src.opcodes.clone(), src.data.clone())
    };
    if remove_terms {
        nop_terms(&mut opcodes, &mut data);
    }
    let dst = dst_block.wires.get_mut(dst)?;
    dst.opcodes = opcodes;
    dst.data = data;
    Ok(())
}

fn has_term_ops(opcodes: &[u8]) -> bool {
    opcodes
        .iter()
        .any(|&o| matches!(o & ops::OPCODE_MASK, op::ITERM | op::BTERM))
}

fn nop_terms(opcodes: &mut [u8], data: &mut [i32]) {
    for i in 0..opcodes.len() {
        if matches!(opcodes[i] & ops::OPCODE_MASK, op::ITERM | op::BTERM) {
            opcodes[i] = op::NOP;
            data[i] = 0;
        }
    }
}

/// Shifts junction references in the tail starting at `base`.
///
/// `JUNCTION` carries its target directly; `SHORT` and `VWIRE` carry a
/// layer and keep the junction in the following `OPERAND`.
fn renumber_junctions(wire: &mut Wire, base: i32) {
    for i in (base as usize)..wire.opcodes.len() {
        match wire.opcodes[i] & ops::OPCODE_MASK {
            op::JUNCTION => wire.data[i] += base,
            op::SHORT | op::VWIRE => {
                if let Some(next) = wire.data.get_mut(i + 1) {
                    *next += base;
                }
            }
            _ => {}
        }
    }
}

/// Rewrites block-via operands into `dst_block`, copying definitions by
/// name when missing.
fn rewrite_vias(
    dst_block: &mut Block,
    src_block: &Block,
    opcodes: &[u8],
    data: &[i32],
) -> Result<(Vec<u8>, Vec<i32>)> {
    let mut data = data.to_vec();
    for i in 0..opcodes.len() {
        if opcodes[i] & ops::OPCODE_MASK == op::VIA {
            let src_via = src_block.vias.lookup(data[i] as u32)?;
            let src_via = src_block.vias.get(src_via)?;
            let dst_via = match dst_block.find_via(&src_via.name) {
                Ok(oid) => oid,
                Err(_) => dst_block.add_via(src_via.clone()),
            };
            data[i] = dst_via.raw() as i32;
        }
    }
    Ok((opcodes.to_vec(), data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_of(pairs: &[(u8, i32)]) -> Wire {
        Wire {
            is_global: false,
            net: 0,
            opcodes: pairs.iter().map(|&(o, _)| o).collect(),
            data: pairs.iter().map(|&(_, d)| d).collect(),
        }
    }

    #[test]
    fn equal_ignores_term_operands() {
        let a = wire_of(&[(op::PATH, 1), (op::ITERM, 5)]);
        let b = wire_of(&[(op::PATH, 1), (op::ITERM, 9)]);
        assert_eq!(a.equal(&b), 0);
    }

    #[test]
    fn equal_reports_length_mismatch() {
        let a = wire_of(&[(op::PATH, 1)]);
        let b = wire_of(&[(op::PATH, 1), (op::X, 100)]);
        assert_eq!(a.equal(&b), 10);
    }

    #[test]
    fn equal_reports_operand_mismatch() {
        let a = wire_of(&[(op::PATH, 1), (op::X, 100)]);
        let b = wire_of(&[(op::PATH, 1), (op::X, 200)]);
        assert_eq!(a.equal(&b), 2);
    }
}
