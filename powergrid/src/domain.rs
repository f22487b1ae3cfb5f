//! Voltage domains.

use arcstr::ArcStr;
use geom::rect::Rect;
use pdb::block::{Block, Net, Row, SigType};
use pdb::table::Oid;
use tracing::info;

use crate::error::{Error, Result};

/// A voltage domain: the supply nets and the area they power.
///
/// The core domain covers the block's core area; a region domain covers a
/// named rectangular region instead.
#[derive(Debug, Clone)]
pub struct VoltageDomain {
    /// The domain name.
    pub name: ArcStr,
    /// The primary power net.
    pub power: Oid<Net>,
    /// The ground net.
    pub ground: Oid<Net>,
    /// The switched power net, if the domain is power-gated.
    pub switched_power: Option<Oid<Net>>,
    /// Additional supply nets.
    pub secondary: Vec<Oid<Net>>,
    /// The region rectangle, or [`None`] for the core domain.
    pub region: Option<Rect>,
}

impl VoltageDomain {
    /// Creates the core domain, locating the power and ground nets by
    /// signal class when not given.
    pub fn core(
        block: &Block,
        power: Option<Oid<Net>>,
        ground: Option<Oid<Net>>,
        secondary: Vec<Oid<Net>>,
    ) -> Result<Self> {
        let power = match power {
            Some(net) => net,
            None => {
                let net = find_single_net(block, SigType::Power)?;
                info!(
                    net = %block.nets.get(net).map(|n| n.name.clone()).unwrap_or_default(),
                    "using inferred power net for the core domain"
                );
                net
            }
        };
        let ground = match ground {
            Some(net) => net,
            None => {
                let net = find_single_net(block, SigType::Ground)?;
                info!(
                    net = %block.nets.get(net).map(|n| n.name.clone()).unwrap_or_default(),
                    "using inferred ground net for the core domain"
                );
                net
            }
        };
        Ok(Self {
            name: ArcStr::from("Core"),
            power,
            ground,
            switched_power: None,
            secondary,
            region: None,
        })
    }

    /// Creates a region domain.
    pub fn region(
        name: impl Into<ArcStr>,
        power: Oid<Net>,
        ground: Oid<Net>,
        secondary: Vec<Oid<Net>>,
        region: Rect,
    ) -> Self {
        Self {
            name: name.into(),
            power,
            ground,
            switched_power: None,
            secondary,
            region: Some(region),
        }
    }

    /// True when the domain is bound to a region.
    pub fn has_region(&self) -> bool {
        self.region.is_some()
    }

    /// The area the domain powers: its region, or the block core.
    pub fn area(&self, block: &Block) -> Rect {
        self.region.unwrap_or(block.core_area)
    }

    /// The supply nets in strap order.
    ///
    /// Power first: primary power, switched power, ground; ground first
    /// swaps ground to the front. Secondary nets always follow.
    pub fn nets(&self, power_first: bool) -> Vec<Oid<Net>> {
        let mut nets = Vec::new();
        if power_first {
            nets.push(self.power);
            nets.extend(self.switched_power);
            nets.push(self.ground);
        } else {
            nets.push(self.ground);
            nets.push(self.power);
            nets.extend(self.switched_power);
        }
        nets.extend(self.secondary.iter().copied());
        nets
    }

    /// All supply nets of the domain, power first.
    pub fn all_nets(&self) -> Vec<Oid<Net>> {
        self.nets(true)
    }

    /// The rows the domain owns: rows overlapping the region, or every
    /// row for the core domain.
    pub fn rows<'a>(&self, block: &'a Block) -> Vec<&'a Row> {
        block
            .rows
            .iter()
            .filter(|row| match self.region {
                Some(region) => row.bbox.overlaps(&region),
                None => true,
            })
            .collect()
    }
}

fn find_single_net(block: &Block, sig: SigType) -> Result<Oid<Net>> {
    let mut nets = block.nets.iter().filter(|(_, n)| n.sig == sig);
    let first = nets
        .next()
        .ok_or_else(|| Error::Setup(format!("no {sig:?} net in block {}", block.name)))?;
    if nets.next().is_some() {
        return Err(Error::Setup(format!(
            "multiple candidate {sig:?} nets in block {}",
            block.name
        )));
    }
    Ok(first.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_order_honors_starts_with() {
        let mut block = Block::new("top", "tech");
        let vdd = block.create_net("VDD", SigType::Power);
        let vss = block.create_net("VSS", SigType::Ground);
        let aux = block.create_net("VDDA", SigType::Power);

        let mut domain = VoltageDomain::core(&block, Some(vdd), Some(vss), vec![aux]).unwrap();
        assert_eq!(domain.nets(true), vec![vdd, vss, aux]);
        assert_eq!(domain.nets(false), vec![vss, vdd, aux]);

        let sw = block.create_net("VDDSW", SigType::Power);
        domain.switched_power = Some(sw);
        assert_eq!(domain.nets(true), vec![vdd, sw, vss, aux]);
    }

    #[test]
    fn inferring_supplies_requires_uniqueness() {
        let mut block = Block::new("top", "tech");
        block.create_net("VDD", SigType::Power);
        block.create_net("VDD2", SigType::Power);
        block.create_net("VSS", SigType::Ground);
        assert!(VoltageDomain::core(&block, None, None, vec![]).is_err());
    }
}
