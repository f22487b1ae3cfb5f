//! Non-default routing rules and same-net spacing rules.

use arcstr::ArcStr;

use crate::error::Result;
use crate::layer::Layer;
use crate::stream::{StreamReader, StreamWriter};
use crate::table::{Oid, Table};
use crate::via::TechVia;

/// A per-layer override carried by a non-default rule.
///
/// Layer rules live in their own table (tech-scope or block-scope); wire
/// streams bind them by id through the `RULE` opcode.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRule {
    /// The layer the overrides apply to.
    pub layer: Oid<Layer>,
    /// Wire width under this rule.
    pub width: i32,
    /// Wire-to-wire spacing under this rule.
    pub spacing: i32,
    /// Extension past endpoints, if non-default.
    pub wire_extension: i32,
}

/// A named alternative layer/via policy.
#[derive(Debug, Clone, PartialEq)]
pub struct NonDefaultRule {
    /// The rule name.
    pub name: ArcStr,
    /// True if spacings are hard requirements.
    pub hard_spacing: bool,
    /// True for rules owned by a block rather than the technology.
    pub block_rule: bool,
    /// The per-layer overrides, by layer-rule id.
    pub layer_rules: Vec<Oid<LayerRule>>,
    /// Vias the rule permits.
    pub use_vias: Vec<Oid<TechVia>>,
    /// Minimum cut counts per cut layer.
    pub min_cuts: Vec<(Oid<Layer>, u32)>,
}

impl NonDefaultRule {
    /// Creates an empty rule with the given name.
    pub fn new(name: impl Into<ArcStr>, block_rule: bool) -> Self {
        Self {
            name: name.into(),
            hard_spacing: false,
            block_rule,
            layer_rules: Vec::new(),
            use_vias: Vec::new(),
            min_cuts: Vec::new(),
        }
    }

    /// The layer rule for `layer`, if the rule overrides it.
    pub fn layer_rule_for(
        &self,
        layer: Oid<Layer>,
        layer_rules: &Table<LayerRule>,
    ) -> Option<Oid<LayerRule>> {
        self.layer_rules
            .iter()
            .copied()
            .find(|&id| layer_rules.get(id).map(|r| r.layer == layer).unwrap_or(false))
    }

    /// The minimum cut count required on `layer`, if constrained.
    pub fn min_cuts_on(&self, layer: Oid<Layer>) -> Option<u32> {
        self.min_cuts.iter().find(|(l, _)| *l == layer).map(|(_, n)| *n)
    }

    fn flags_word(&self) -> u32 {
        (self.hard_spacing as u32) | ((self.block_rule as u32) << 1)
    }
}

/// A spacing requirement between two layers of the same net.
#[derive(Debug, Clone, PartialEq)]
pub struct SameNetRule {
    /// First layer.
    pub layer1: Oid<Layer>,
    /// Second layer.
    pub layer2: Oid<Layer>,
    /// Required same-net spacing.
    pub spacing: i32,
    /// True if stacked vias between the layers are permitted.
    pub allow_stacked_vias: bool,
}

// ---------------------------------------------------------------------------
// streaming

impl LayerRule {
    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_raw_oid(self.layer.raw())?;
        w.write_i32(self.width)?;
        w.write_i32(self.spacing)?;
        w.write_i32(self.wire_extension)
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        Ok(Self {
            layer: r.read_req_oid()?,
            width: r.read_i32()?,
            spacing: r.read_i32()?,
            wire_extension: r.read_i32()?,
        })
    }
}

impl NonDefaultRule {
    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_u32(self.flags_word())?;
        w.write_str(&self.name)?;
        w.write_u32_vec(&self.layer_rules.iter().map(|o| o.raw()).collect::<Vec<_>>())?;
        w.write_u32_vec(&self.use_vias.iter().map(|o| o.raw()).collect::<Vec<_>>())?;
        w.write_u32(self.min_cuts.len() as u32)?;
        for (layer, cuts) in &self.min_cuts {
            w.write_raw_oid(layer.raw())?;
            w.write_u32(*cuts)?;
        }
        Ok(())
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let flags = r.read_u32()?;
        let name = r.read_str()?;
        let layer_rules = r
            .read_u32_vec()?
            .into_iter()
            .map(|raw| Oid::from_raw_parts(raw, 0))
            .collect();
        let use_vias = r
            .read_u32_vec()?
            .into_iter()
            .map(|raw| Oid::from_raw_parts(raw, 0))
            .collect();
        let n = r.read_u32()?;
        let mut min_cuts = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let layer = r.read_req_oid()?;
            min_cuts.push((layer, r.read_u32()?));
        }
        Ok(Self {
            name,
            hard_spacing: flags & 0x1 != 0,
            block_rule: flags & 0x2 != 0,
            layer_rules,
            use_vias,
            min_cuts,
        })
    }
}

impl SameNetRule {
    pub(crate) fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_raw_oid(self.layer1.raw())?;
        w.write_raw_oid(self.layer2.raw())?;
        w.write_i32(self.spacing)?;
        w.write_bool(self.allow_stacked_vias)
    }

    pub(crate) fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        Ok(Self {
            layer1: r.read_req_oid()?,
            layer2: r.read_req_oid()?,
            spacing: r.read_i32()?,
            allow_stacked_vias: r.read_bool()?,
        })
    }
}
