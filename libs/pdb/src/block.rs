//! Blocks: nets, special wires, placed instances, and terminals.

use arcstr::ArcStr;
use geom::orient::Orient;
use geom::point::Point;
use geom::rect::Rect;
use geom::transform::Xform;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::ndr::{LayerRule, NonDefaultRule};
use crate::stream::{schema, StreamReader, StreamWriter};
use crate::table::{Oid, Table};
use crate::via::{read_rect, write_rect, BlockVia, TechVia};
use crate::wire::{Wire, WireType};

/// The signal class of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigType {
    /// An ordinary signal net.
    #[default]
    Signal,
    /// A power supply net.
    Power,
    /// A ground net.
    Ground,
}

impl SigType {
    /// True for power and ground nets.
    pub fn is_supply(&self) -> bool {
        matches!(self, SigType::Power | SigType::Ground)
    }

    fn to_byte(self) -> u8 {
        match self {
            SigType::Signal => 0,
            SigType::Power => 1,
            SigType::Ground => 2,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(SigType::Signal),
            1 => Ok(SigType::Power),
            2 => Ok(SigType::Ground),
            b => Err(Error::CorruptStream(format!("invalid signal type {b}"))),
        }
    }
}

/// The role of a special-wire box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireShapeRole {
    /// No particular role.
    #[default]
    None,
    /// Part of a supply ring.
    Ring,
    /// Part of a periodic supply stripe.
    Stripe,
    /// A rail following standard-cell rows.
    FollowPin,
}

impl WireShapeRole {
    fn to_byte(self) -> u8 {
        match self {
            WireShapeRole::None => 0,
            WireShapeRole::Ring => 1,
            WireShapeRole::Stripe => 2,
            WireShapeRole::FollowPin => 3,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(WireShapeRole::None),
            1 => Ok(WireShapeRole::Ring),
            2 => Ok(WireShapeRole::Stripe),
            3 => Ok(WireShapeRole::FollowPin),
            b => Err(Error::CorruptStream(format!("invalid wire shape role {b}"))),
        }
    }
}

/// A reference to a via definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViaRef {
    /// A technology via.
    Tech(Oid<TechVia>),
    /// A block via.
    Block(Oid<BlockVia>),
}

/// One box of a special wire: a layer rectangle or a placed via.
#[derive(Debug, Clone, PartialEq)]
pub enum SBox {
    /// A rectangle on a routing layer.
    Rect {
        /// The layer.
        layer: Oid<Layer>,
        /// The rectangle, in block coordinates.
        rect: Rect,
        /// The wire-shape role.
        role: WireShapeRole,
    },
    /// A via placed at a point.
    Via {
        /// The via definition.
        via: ViaRef,
        /// The placement point.
        origin: Point,
        /// The bounding box of the placed via.
        bbox: Rect,
        /// The wire-shape role.
        role: WireShapeRole,
    },
}

/// A special wire: planner- or loader-generated supply geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SWire {
    /// The DEF wire type of the special wire.
    pub wire_type: WireType,
    /// The boxes, in creation order.
    pub boxes: Vec<SBox>,
}

/// A net.
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    /// The net name.
    pub name: ArcStr,
    /// The signal class.
    pub sig: SigType,
    /// The net's local wire, if any.
    pub(crate) wire: Option<Oid<Wire>>,
    /// The net's global wire, if any.
    pub(crate) global_wire: Option<Oid<Wire>>,
    /// Special wires owned by the net.
    pub swires: Vec<SWire>,
}

impl Net {
    /// Creates a detached net.
    pub fn new(name: impl Into<ArcStr>, sig: SigType) -> Self {
        Self { name: name.into(), sig, wire: None, global_wire: None, swires: Vec::new() }
    }

    /// The net's local wire.
    pub fn wire(&self) -> Option<Oid<Wire>> {
        self.wire
    }

    /// The net's global wire.
    pub fn global_wire(&self) -> Option<Oid<Wire>> {
        self.global_wire
    }
}

/// A standard-cell row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The row name.
    pub name: ArcStr,
    /// The row extent, in block coordinates.
    pub bbox: Rect,
    /// The row orientation; `R0` places the power rail on top.
    pub orient: Orient,
}

/// The placement class of a master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MasterClass {
    /// A standard cell.
    #[default]
    Core,
    /// A macro block.
    Block,
    /// An I/O pad.
    Pad,
}

impl MasterClass {
    fn to_byte(self) -> u8 {
        match self {
            MasterClass::Core => 0,
            MasterClass::Block => 1,
            MasterClass::Pad => 2,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(MasterClass::Core),
            1 => Ok(MasterClass::Block),
            2 => Ok(MasterClass::Pad),
            b => Err(Error::CorruptStream(format!("invalid master class {b}"))),
        }
    }
}

/// Pin geometry of an instance, in master coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PinGeom {
    /// The master terminal name.
    pub mterm: ArcStr,
    /// The layer.
    pub layer: Oid<Layer>,
    /// The pin rectangle, in master coordinates.
    pub rect: Rect,
}

/// A placed instance, reduced to what supply planning consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    /// The instance name.
    pub name: ArcStr,
    /// The master name.
    pub master: ArcStr,
    /// The master's placement class.
    pub class: MasterClass,
    /// True once the instance is placed.
    pub placed: bool,
    /// Master-to-block transform.
    pub xform: Xform,
    /// The instance extent, in block coordinates.
    pub bbox: Rect,
    /// Supply and signal pin geometry, in master coordinates.
    pub pins: Vec<PinGeom>,
    /// Obstruction rectangles, in master coordinates.
    pub obstructions: Vec<(Oid<Layer>, Rect)>,
}

impl Inst {
    /// The pin rectangles of `mterm`, transformed into block coordinates.
    pub fn pin_rects<'a>(&'a self, mterm: &'a str) -> impl Iterator<Item = (Oid<Layer>, Rect)> + 'a {
        let xform = self.xform;
        self.pins
            .iter()
            .filter(move |p| p.mterm == mterm)
            .map(move |p| (p.layer, xform.apply_rect(p.rect)))
    }

    /// All pin rectangles, transformed into block coordinates.
    pub fn all_pin_rects(&self) -> impl Iterator<Item = (Oid<Layer>, Rect)> + '_ {
        let xform = self.xform;
        self.pins.iter().map(move |p| (p.layer, xform.apply_rect(p.rect)))
    }

    /// Obstruction rectangles, transformed into block coordinates.
    pub fn obstruction_rects(&self) -> impl Iterator<Item = (Oid<Layer>, Rect)> + '_ {
        let xform = self.xform;
        self.obstructions.iter().map(move |&(l, r)| (l, xform.apply_rect(r)))
    }
}

/// An instance terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct ITerm {
    /// The owning instance.
    pub inst: Oid<Inst>,
    /// The master terminal name.
    pub mterm: ArcStr,
    /// The connected net, if any.
    pub net: Option<Oid<Net>>,
}

/// A block terminal (top-level pin).
#[derive(Debug, Clone, PartialEq)]
pub struct BTerm {
    /// The terminal name.
    pub name: ArcStr,
    /// The connected net, if any.
    pub net: Option<Oid<Net>>,
    /// Pin rectangles, in block coordinates.
    pub pins: Vec<(Oid<Layer>, Rect)>,
    /// True for special (supply) pins.
    pub is_special: bool,
}

/// A block-level routing obstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstruction {
    /// The layer, or [`None`] for an all-layer obstruction.
    pub layer: Option<Oid<Layer>>,
    /// The obstruction rectangle.
    pub rect: Rect,
    /// Extra spacing required around the obstruction.
    pub min_spacing: Option<i32>,
}

/// A design block.
#[derive(Debug, Clone)]
pub struct Block {
    /// The block name.
    pub name: ArcStr,
    /// The name of the technology this block was built against
    /// (streamed from schema v3 onward).
    pub tech_name: ArcStr,
    /// The die area.
    pub die_area: Rect,
    /// The core (placement) area.
    pub core_area: Rect,
    /// Nets.
    pub nets: Table<Net>,
    /// Encoded wires.
    pub wires: Table<Wire>,
    /// Block vias.
    pub vias: Table<BlockVia>,
    /// Non-default-rule layer overrides (block scope).
    pub layer_rules: Table<LayerRule>,
    /// Non-default rules (block scope).
    pub ndrs: Table<NonDefaultRule>,
    /// Placed instances.
    pub insts: Table<Inst>,
    /// Instance terminals.
    pub iterms: Table<ITerm>,
    /// Block terminals.
    pub bterms: Table<BTerm>,
    /// Standard-cell rows, in creation order.
    pub rows: Vec<Row>,
    /// Block-level obstructions.
    pub obstructions: Vec<Obstruction>,
    via_hash: FxHashMap<ArcStr, Oid<BlockVia>>,
}

impl Block {
    /// Creates an empty block.
    pub fn new(name: impl Into<ArcStr>, tech_name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            tech_name: tech_name.into(),
            die_area: Rect::default(),
            core_area: Rect::default(),
            nets: Table::new(),
            wires: Table::new(),
            vias: Table::new(),
            layer_rules: Table::new(),
            ndrs: Table::new(),
            insts: Table::new(),
            iterms: Table::new(),
            bterms: Table::new(),
            rows: Vec::new(),
            obstructions: Vec::new(),
            via_hash: FxHashMap::default(),
        }
    }

    /// Creates a net.
    pub fn create_net(&mut self, name: impl Into<ArcStr>, sig: SigType) -> Oid<Net> {
        self.nets.create(Net::new(name, sig))
    }

    /// Finds a net by name.
    pub fn find_net(&self, name: &str) -> Result<Oid<Net>> {
        self.nets
            .find(|n| n.name == name)
            .ok_or_else(|| Error::NotFound(format!("net {name}")))
    }

    /// Creates a wire attached to `net`.
    ///
    /// A net owns at most one local and one global wire; creating a second
    /// of either kind fails.
    pub fn create_wire(&mut self, net: Oid<Net>, global: bool) -> Result<Oid<Wire>> {
        let record = self.nets.get(net)?;
        let occupied = if global { record.global_wire } else { record.wire };
        if occupied.is_some() {
            return Err(Error::Unsupported(format!(
                "net {} already has a {} wire",
                record.name,
                if global { "global" } else { "local" }
            )));
        }
        let wire = self.wires.create(Wire {
            is_global: global,
            net: net.raw(),
            opcodes: Vec::new(),
            data: Vec::new(),
        });
        let record = self.nets.get_mut(net)?;
        if global {
            record.global_wire = Some(wire);
        } else {
            record.wire = Some(wire);
        }
        Ok(wire)
    }

    /// Destroys a wire, detaching it from its net.
    pub fn destroy_wire(&mut self, wire: Oid<Wire>) -> Result<()> {
        let record = self.wires.destroy(wire)?;
        if record.net == 0 {
            warn!("destroying a wire with no net");
        } else {
            if let Ok(net) = self.nets.lookup(record.net) {
                let net = self.nets.get_mut(net)?;
                if record.is_global {
                    net.global_wire = None;
                } else {
                    net.wire = None;
                }
            }
        }
        Ok(())
    }

    /// Adds a block via, keeping the name hash current.
    pub fn add_via(&mut self, via: BlockVia) -> Oid<BlockVia> {
        let name = via.name.clone();
        let oid = self.vias.create(via);
        self.via_hash.insert(name, oid);
        oid
    }

    /// O(1) block via lookup by name.
    pub fn find_via(&self, name: &str) -> Result<Oid<BlockVia>> {
        self.via_hash
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("block via {name}")))
    }

    /// Appends a special wire to `net` and returns its index.
    pub fn add_swire(&mut self, net: Oid<Net>, wire_type: WireType) -> Result<usize> {
        let net = self.nets.get_mut(net)?;
        net.swires.push(SWire { wire_type, boxes: Vec::new() });
        Ok(net.swires.len() - 1)
    }

    // -----------------------------------------------------------------
    // streaming

    /// Writes the block payload.
    pub fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        // schema BLOCK_TECH_NAME: current writers always emit the name
        w.write_str(&self.tech_name)?;
        write_rect(w, self.die_area)?;
        write_rect(w, self.core_area)?;

        w.write_table("layer_rule_tbl", &self.layer_rules, |w, v| v.write_stream(w))?;
        w.write_table("non_default_rule_tbl", &self.ndrs, |w, v| v.write_stream(w))?;
        w.write_table("via_tbl", &self.vias, |w, v| v.write_stream(w))?;
        w.write_table("inst_tbl", &self.insts, |w, v| v.write_stream(w))?;
        w.write_table("wire_tbl", &self.wires, |w, v| v.write_stream(w))?;
        w.write_table("net_tbl", &self.nets, |w, v| v.write_stream(w))?;
        w.write_table("iterm_tbl", &self.iterms, |w, v| v.write_stream(w))?;
        w.write_table("bterm_tbl", &self.bterms, |w, v| v.write_stream(w))?;

        w.write_u32(self.rows.len() as u32)?;
        for row in &self.rows {
            w.write_str(&row.name)?;
            write_rect(w, row.bbox)?;
            w.write_u8(Orient::ALL.iter().position(|o| *o == row.orient).unwrap_or(0) as u8)?;
        }
        w.write_u32(self.obstructions.len() as u32)?;
        for obs in &self.obstructions {
            w.write_raw_oid(obs.layer.map(|l| l.raw()).unwrap_or(0))?;
            write_rect(w, obs.rect)?;
            w.write_i32(obs.min_spacing.unwrap_or(-1))?;
        }
        Ok(())
    }

    /// Reads a block payload.
    pub fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let tech_name = if r.is_schema(schema::BLOCK_TECH_NAME) {
            r.read_str()?
        } else {
            ArcStr::default()
        };
        let die_area = read_rect(r)?;
        let core_area = read_rect(r)?;

        let layer_rules = r.read_table("layer_rule_tbl", LayerRule::read_stream)?;
        let ndrs = r.read_table("non_default_rule_tbl", NonDefaultRule::read_stream)?;

        let vias = r.read_table("via_tbl", BlockVia::read_stream)?;

        let insts = r.read_table("inst_tbl", Inst::read_stream)?;
        let wires = r.read_table("wire_tbl", Wire::read_stream)?;
        let nets = r.read_table("net_tbl", Net::read_stream)?;
        let iterms = r.read_table("iterm_tbl", ITerm::read_stream)?;
        let bterms = r.read_table("bterm_tbl", BTerm::read_stream)?;

        let n = r.read_u32()?;
        let mut rows = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = r.read_str()?;
            let bbox = read_rect(r)?;
            let orient_idx = r.read_u8()? as usize;
            let orient = *Orient::ALL
                .get(orient_idx)
                .ok_or_else(|| Error::CorruptStream(format!("invalid orient {orient_idx}")))?;
            rows.push(Row { name, bbox, orient });
        }
        let n = r.read_u32()?;
        let mut obstructions = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let layer = r.read_oid()?;
            let rect = read_rect(r)?;
            let min_spacing = r.read_i32()?;
            obstructions.push(Obstruction {
                layer,
                rect,
                min_spacing: (min_spacing >= 0).then_some(min_spacing),
            });
        }

        let via_hash = vias.iter().map(|(oid, v)| (v.name.clone(), oid)).collect();
        Ok(Self {
            name,
            tech_name,
            die_area,
            core_area,
            nets,
            wires,
            vias,
            layer_rules,
            ndrs,
            insts,
            iterms,
            bterms,
            rows,
            obstructions,
            via_hash,
        })
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        // the via hash is derived state
        self.name == other.name
            && self.tech_name == other.tech_name
            && self.die_area == other.die_area
            && self.core_area == other.core_area
            && self.nets == other.nets
            && self.wires == other.wires
            && self.vias == other.vias
            && self.layer_rules == other.layer_rules
            && self.ndrs == other.ndrs
            && self.insts == other.insts
            && self.iterms == other.iterms
            && self.bterms == other.bterms
            && self.rows == other.rows
            && self.obstructions == other.obstructions
    }
}

// ---------------------------------------------------------------------------
// record streaming

impl Net {
    fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        w.write_u8(self.sig.to_byte())?;
        w.write_raw_oid(self.wire.map(|o| o.raw()).unwrap_or(0))?;
        w.write_raw_oid(self.global_wire.map(|o| o.raw()).unwrap_or(0))?;
        w.write_u32(self.swires.len() as u32)?;
        for swire in &self.swires {
            w.write_u8(swire.wire_type.stream_byte())?;
            w.write_u32(swire.boxes.len() as u32)?;
            for sbox in &swire.boxes {
                match sbox {
                    SBox::Rect { layer, rect, role } => {
                        w.write_u8(0)?;
                        w.write_raw_oid(layer.raw())?;
                        write_rect(w, *rect)?;
                        w.write_u8(role.to_byte())?;
                    }
                    SBox::Via { via, origin, bbox, role } => {
                        w.write_u8(1)?;
                        match via {
                            ViaRef::Tech(oid) => {
                                w.write_u8(0)?;
                                w.write_raw_oid(oid.raw())?;
                            }
                            ViaRef::Block(oid) => {
                                w.write_u8(1)?;
                                w.write_raw_oid(oid.raw())?;
                            }
                        }
                        w.write_i32(origin.x)?;
                        w.write_i32(origin.y)?;
                        write_rect(w, *bbox)?;
                        w.write_u8(role.to_byte())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let sig = SigType::from_byte(r.read_u8()?)?;
        let wire = r.read_oid()?;
        let global_wire = r.read_oid()?;
        let n = r.read_u32()?;
        let mut swires = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let wire_type = WireType::from_stream_byte(r.read_u8()?)?;
            let m = r.read_u32()?;
            let mut boxes = Vec::with_capacity(m as usize);
            for _ in 0..m {
                match r.read_u8()? {
                    0 => {
                        let layer = r.read_req_oid()?;
                        let rect = read_rect(r)?;
                        let role = WireShapeRole::from_byte(r.read_u8()?)?;
                        boxes.push(SBox::Rect { layer, rect, role });
                    }
                    1 => {
                        let via = match r.read_u8()? {
                            0 => ViaRef::Tech(r.read_req_oid()?),
                            1 => ViaRef::Block(r.read_req_oid()?),
                            b => {
                                return Err(Error::CorruptStream(format!(
                                    "invalid via reference kind {b}"
                                )))
                            }
                        };
                        let origin = Point::new(r.read_i32()?, r.read_i32()?);
                        let bbox = read_rect(r)?;
                        let role = WireShapeRole::from_byte(r.read_u8()?)?;
                        boxes.push(SBox::Via { via, origin, bbox, role });
                    }
                    b => {
                        return Err(Error::CorruptStream(format!("invalid sbox kind {b}")));
                    }
                }
            }
            swires.push(SWire { wire_type, boxes });
        }
        Ok(Self { name, sig, wire, global_wire, swires })
    }
}

impl Inst {
    fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        w.write_str(&self.master)?;
        w.write_u8(self.class.to_byte())?;
        w.write_bool(self.placed)?;
        w.write_u8(Orient::ALL.iter().position(|o| *o == self.xform.orient).unwrap_or(0) as u8)?;
        w.write_i32(self.xform.offset.x)?;
        w.write_i32(self.xform.offset.y)?;
        write_rect(w, self.bbox)?;
        w.write_u32(self.pins.len() as u32)?;
        for pin in &self.pins {
            w.write_str(&pin.mterm)?;
            w.write_raw_oid(pin.layer.raw())?;
            write_rect(w, pin.rect)?;
        }
        w.write_u32(self.obstructions.len() as u32)?;
        for (layer, rect) in &self.obstructions {
            w.write_raw_oid(layer.raw())?;
            write_rect(w, *rect)?;
        }
        Ok(())
    }

    fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let master = r.read_str()?;
        let class = MasterClass::from_byte(r.read_u8()?)?;
        let placed = r.read_bool()?;
        let orient_idx = r.read_u8()? as usize;
        let orient = *Orient::ALL
            .get(orient_idx)
            .ok_or_else(|| Error::CorruptStream(format!("invalid orient {orient_idx}")))?;
        let offset = Point::new(r.read_i32()?, r.read_i32()?);
        let bbox = read_rect(r)?;
        let n = r.read_u32()?;
        let mut pins = Vec::with_capacity(n as usize);
        for _ in 0..n {
            pins.push(PinGeom {
                mterm: r.read_str()?,
                layer: r.read_req_oid()?,
                rect: read_rect(r)?,
            });
        }
        let n = r.read_u32()?;
        let mut obstructions = Vec::with_capacity(n as usize);
        for _ in 0..n {
            obstructions.push((r.read_req_oid()?, read_rect(r)?));
        }
        Ok(Self {
            name,
            master,
            class,
            placed,
            xform: Xform::new(orient, offset),
            bbox,
            pins,
            obstructions,
        })
    }
}

impl ITerm {
    fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_raw_oid(self.inst.raw())?;
        w.write_str(&self.mterm)?;
        w.write_raw_oid(self.net.map(|o| o.raw()).unwrap_or(0))
    }

    fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        Ok(Self { inst: r.read_req_oid()?, mterm: r.read_str()?, net: r.read_oid()? })
    }
}

impl BTerm {
    fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        w.write_raw_oid(self.net.map(|o| o.raw()).unwrap_or(0))?;
        w.write_bool(self.is_special)?;
        w.write_u32(self.pins.len() as u32)?;
        for (layer, rect) in &self.pins {
            w.write_raw_oid(layer.raw())?;
            write_rect(w, *rect)?;
        }
        Ok(())
    }

    fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let net = r.read_oid()?;
        let is_special = r.read_bool()?;
        let n = r.read_u32()?;
        let mut pins = Vec::with_capacity(n as usize);
        for _ in 0..n {
            pins.push((r.read_req_oid()?, read_rect(r)?));
        }
        Ok(Self { name, net, pins, is_special })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_local_and_one_global_wire_per_net() {
        let mut block = Block::new("top", "tech");
        let net = block.create_net("VDD", SigType::Power);
        let w = block.create_wire(net, false).unwrap();
        assert!(block.create_wire(net, false).is_err());
        let g = block.create_wire(net, true).unwrap();
        assert!(block.create_wire(net, true).is_err());
        assert_eq!(block.nets.get(net).unwrap().wire(), Some(w));
        assert_eq!(block.nets.get(net).unwrap().global_wire(), Some(g));

        block.destroy_wire(w).unwrap();
        assert_eq!(block.nets.get(net).unwrap().wire(), None);
        let _ = block.create_wire(net, false).unwrap();
    }
}
