//! The technology: layers, vias, rules, and derived lookup structures.

use arcstr::ArcStr;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::ndr::{LayerRule, NonDefaultRule, SameNetRule};
use crate::stream::{schema, StreamReader, StreamWriter};
use crate::table::{Oid, Table};
use crate::via::{TechVia, ViaGenerateRule};

/// One entry of the metal-width-via map: the preferred via for a cut layer
/// given the widths of the metals below and above.
#[derive(Debug, Clone, PartialEq)]
pub struct MetalWidthViaEntry {
    /// Width range of the metal below, inclusive.
    pub below_width: (i32, i32),
    /// Width range of the metal above, inclusive.
    pub above_width: (i32, i32),
    /// The cut layer the entry applies to.
    pub cut_layer: Oid<Layer>,
    /// The preferred via, by name.
    pub via_name: ArcStr,
    /// True if the via is intended for power/ground use.
    pub pg_via: bool,
}

/// A cell-edge spacing entry (streamed from schema v2 onward).
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdgeSpacing {
    /// Edge type of the first cell.
    pub first_edge: ArcStr,
    /// Edge type of the second cell.
    pub second_edge: ArcStr,
    /// Required spacing between the edges.
    pub spacing: i32,
}

/// The technology model: the layer stack and every manufacturing rule the
/// planner consults.
#[derive(Debug, Clone)]
pub struct Tech {
    /// The technology name.
    pub name: ArcStr,
    /// Database units per micron.
    pub dbu_per_micron: u32,
    /// The manufacturing grid, in DBU; 0 when unconstrained.
    pub mfg_grid: i32,
    /// Layers, ordered bottom to top.
    pub layers: Table<Layer>,
    /// Tech vias with fixed geometry.
    pub vias: Table<TechVia>,
    /// Via-generate rules.
    pub via_rules: Table<ViaGenerateRule>,
    /// Non-default-rule layer overrides (tech scope).
    pub layer_rules: Table<LayerRule>,
    /// Non-default rules (tech scope).
    pub ndrs: Table<NonDefaultRule>,
    /// Same-net spacing rules.
    pub samenet_rules: Table<SameNetRule>,
    /// Metal-width-via map entries.
    pub metal_width_via_map: Vec<MetalWidthViaEntry>,
    /// Cell-edge spacing table (schema v2+).
    pub cell_edge_spacing: Vec<CellEdgeSpacing>,
    via_hash: FxHashMap<ArcStr, Oid<TechVia>>,
}

impl Tech {
    /// Creates an empty technology.
    pub fn new(name: impl Into<ArcStr>, dbu_per_micron: u32) -> Self {
        Self {
            name: name.into(),
            dbu_per_micron,
            mfg_grid: 0,
            layers: Table::new(),
            vias: Table::new(),
            via_rules: Table::new(),
            layer_rules: Table::new(),
            ndrs: Table::new(),
            samenet_rules: Table::new(),
            metal_width_via_map: Vec::new(),
            cell_edge_spacing: Vec::new(),
            via_hash: FxHashMap::default(),
        }
    }

    /// Adds a layer. Layers must be added bottom to top.
    pub fn add_layer(&mut self, layer: Layer) -> Oid<Layer> {
        self.layers.create(layer)
    }

    /// Finds a layer by name.
    pub fn find_layer(&self, name: &str) -> Result<Oid<Layer>> {
        self.layers
            .find(|l| l.name == name)
            .ok_or_else(|| Error::NotFound(format!("layer {name}")))
    }

    /// Finds the routing layer at the given 1-based level.
    pub fn routing_layer(&self, level: u32) -> Result<Oid<Layer>> {
        self.layers
            .find(|l| l.is_routing() && l.routing_level == level)
            .ok_or_else(|| Error::NotFound(format!("routing level {level}")))
    }

    /// The layers strictly between two layers, bottom to top.
    ///
    /// `lower` and `upper` may be given in either order.
    pub fn layers_between(&self, lower: Oid<Layer>, upper: Oid<Layer>) -> Vec<Oid<Layer>> {
        let mut ids: Vec<Oid<Layer>> = self.layers.iter().map(|(oid, _)| oid).collect();
        let a = ids.iter().position(|&id| id == lower);
        let b = ids.iter().position(|&id| id == upper);
        match (a, b) {
            (Some(a), Some(b)) if a != b => {
                let (lo, hi) = (a.min(b), a.max(b));
                ids.drain(..=lo);
                ids.truncate(hi - lo - 1);
                ids
            }
            _ => Vec::new(),
        }
    }

    /// Adds a tech via, keeping the name hash current.
    pub fn add_via(&mut self, via: TechVia) -> Oid<TechVia> {
        let name = via.name.clone();
        let oid = self.vias.create(via);
        self.via_hash.insert(name, oid);
        oid
    }

    /// O(1) via lookup by name.
    pub fn find_via(&self, name: &str) -> Result<Oid<TechVia>> {
        self.via_hash
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("via {name}")))
    }

    /// Destroys a via, keeping the name hash current.
    pub fn destroy_via(&mut self, oid: Oid<TechVia>) -> Result<TechVia> {
        let via = self.vias.destroy(oid)?;
        self.via_hash.remove(&via.name);
        Ok(via)
    }

    /// Snaps a coordinate onto the manufacturing grid.
    pub fn snap_to_mfg_grid(&self, pos: i32, round_up: bool) -> i32 {
        if self.mfg_grid <= 0 {
            return pos;
        }
        if round_up {
            geom::round_up_to_grid(pos, self.mfg_grid)
        } else {
            geom::round_down_to_grid(pos, self.mfg_grid)
        }
    }

    /// True if `value` lies on the manufacturing grid.
    pub fn on_mfg_grid(&self, value: i32) -> bool {
        self.mfg_grid <= 0 || value % self.mfg_grid == 0
    }

    /// The number of routing layers.
    pub fn routing_layer_count(&self) -> u32 {
        self.layers.iter().filter(|(_, l)| l.is_routing()).count() as u32
    }

    /// Metal-width-via map entries matching the given widths on the given
    /// cut layer, in insertion order.
    pub fn metal_width_vias(
        &self,
        cut_layer: Oid<Layer>,
        below_width: i32,
        above_width: i32,
    ) -> impl Iterator<Item = &MetalWidthViaEntry> {
        self.metal_width_via_map.iter().filter(move |e| {
            e.cut_layer == cut_layer
                && (e.below_width.0..=e.below_width.1).contains(&below_width)
                && (e.above_width.0..=e.above_width.1).contains(&above_width)
        })
    }

    // -----------------------------------------------------------------
    // streaming

    /// Writes the technology payload.
    pub fn write_stream<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> Result<()> {
        w.write_str(&self.name)?;
        w.write_u32(self.dbu_per_micron)?;
        w.write_i32(self.mfg_grid)?;
        w.write_u32(self.routing_layer_count())?;

        w.write_table("layer_tbl", &self.layers, |w, l| l.write_stream(w))?;
        w.write_table("via_tbl", &self.vias, |w, v| v.write_stream(w))?;
        w.write_table("via_generate_rule_tbl", &self.via_rules, |w, v| v.write_stream(w))?;
        w.write_table("layer_rule_tbl", &self.layer_rules, |w, v| v.write_stream(w))?;
        w.write_table("non_default_rule_tbl", &self.ndrs, |w, v| v.write_stream(w))?;
        w.write_table("samenet_rule_tbl", &self.samenet_rules, |w, v| v.write_stream(w))?;

        w.write_u32(self.metal_width_via_map.len() as u32)?;
        for e in &self.metal_width_via_map {
            w.write_i32(e.below_width.0)?;
            w.write_i32(e.below_width.1)?;
            w.write_i32(e.above_width.0)?;
            w.write_i32(e.above_width.1)?;
            w.write_raw_oid(e.cut_layer.raw())?;
            w.write_str(&e.via_name)?;
            w.write_bool(e.pg_via)?;
        }

        // members below this point are schema-gated
        w.write_u32(self.cell_edge_spacing.len() as u32)?;
        for e in &self.cell_edge_spacing {
            w.write_str(&e.first_edge)?;
            w.write_str(&e.second_edge)?;
            w.write_i32(e.spacing)?;
        }
        Ok(())
    }

    /// Reads a technology payload.
    pub fn read_stream<R: std::io::Read>(r: &mut StreamReader<R>) -> Result<Self> {
        let name = r.read_str()?;
        let dbu_per_micron = r.read_u32()?;
        let mfg_grid = r.read_i32()?;
        let _rlayer_cnt = r.read_u32()?;

        let layers = r.read_table("layer_tbl", Layer::read_stream)?;
        let vias = r.read_table("via_tbl", TechVia::read_stream)?;
        let via_rules = r.read_table("via_generate_rule_tbl", ViaGenerateRule::read_stream)?;
        let layer_rules = r.read_table("layer_rule_tbl", LayerRule::read_stream)?;
        let ndrs = r.read_table("non_default_rule_tbl", NonDefaultRule::read_stream)?;
        let samenet_rules = r.read_table("samenet_rule_tbl", SameNetRule::read_stream)?;

        let n = r.read_u32()?;
        let mut metal_width_via_map = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let below_width = (r.read_i32()?, r.read_i32()?);
            let above_width = (r.read_i32()?, r.read_i32()?);
            let cut_layer = r.read_req_oid()?;
            let via_name = r.read_str()?;
            let pg_via = r.read_bool()?;
            metal_width_via_map.push(MetalWidthViaEntry {
                below_width,
                above_width,
                cut_layer,
                via_name,
                pg_via,
            });
        }

        let cell_edge_spacing = if r.is_schema(schema::CELL_EDGE_SPACING) {
            let n = r.read_u32()?;
            let mut entries = Vec::with_capacity(n as usize);
            for _ in 0..n {
                entries.push(CellEdgeSpacing {
                    first_edge: r.read_str()?,
                    second_edge: r.read_str()?,
                    spacing: r.read_i32()?,
                });
            }
            entries
        } else {
            Vec::new()
        };

        let via_hash = vias.iter().map(|(oid, v)| (v.name.clone(), oid)).collect();
        Ok(Self {
            name,
            dbu_per_micron,
            mfg_grid,
            layers,
            vias,
            via_rules,
            layer_rules,
            ndrs,
            samenet_rules,
            metal_width_via_map,
            cell_edge_spacing,
            via_hash,
        })
    }
}

impl PartialEq for Tech {
    fn eq(&self, other: &Self) -> bool {
        // the via hash is derived state
        self.name == other.name
            && self.dbu_per_micron == other.dbu_per_micron
            && self.mfg_grid == other.mfg_grid
            && self.layers == other.layers
            && self.vias == other.vias
            && self.via_rules == other.via_rules
            && self.layer_rules == other.layer_rules
            && self.ndrs == other.ndrs
            && self.samenet_rules == other.samenet_rules
            && self.metal_width_via_map == other.metal_width_via_map
            && self.cell_edge_spacing == other.cell_edge_spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerDir;

    #[test]
    fn layers_between_excludes_endpoints() {
        let mut tech = Tech::new("tech", 1000);
        let m1 = tech.add_layer(Layer::routing("M1", 1, LayerDir::Horizontal, 200));
        let v1 = tech.add_layer(Layer::cut("V1"));
        let m2 = tech.add_layer(Layer::routing("M2", 2, LayerDir::Vertical, 200));
        let v2 = tech.add_layer(Layer::cut("V2"));
        let m3 = tech.add_layer(Layer::routing("M3", 3, LayerDir::Horizontal, 200));

        assert_eq!(tech.layers_between(m1, m3), vec![v1, m2, v2]);
        assert_eq!(tech.layers_between(m3, m1), vec![v1, m2, v2]);
        assert!(tech.layers_between(m1, m1).is_empty());
    }

    #[test]
    fn metal_width_via_map_matches_width_ranges() {
        let mut tech = Tech::new("tech", 1000);
        tech.add_layer(Layer::routing("M1", 1, LayerDir::Horizontal, 200));
        let v1 = tech.add_layer(Layer::cut("V1"));
        tech.add_layer(Layer::routing("M2", 2, LayerDir::Vertical, 200));
        tech.metal_width_via_map.push(MetalWidthViaEntry {
            below_width: (0, 400),
            above_width: (0, 400),
            cut_layer: v1,
            via_name: ArcStr::from("V12_SMALL"),
            pg_via: false,
        });
        tech.metal_width_via_map.push(MetalWidthViaEntry {
            below_width: (400, 10_000),
            above_width: (0, 10_000),
            cut_layer: v1,
            via_name: ArcStr::from("V12_PG"),
            pg_via: true,
        });

        let hits: Vec<&str> =
            tech.metal_width_vias(v1, 200, 300).map(|e| e.via_name.as_str()).collect();
        assert_eq!(hits, vec!["V12_SMALL"]);
        let hits: Vec<&str> =
            tech.metal_width_vias(v1, 400, 300).map(|e| e.via_name.as_str()).collect();
        assert_eq!(hits, vec!["V12_SMALL", "V12_PG"]);
    }

    #[test]
    fn via_hash_follows_create_and_destroy() {
        let mut tech = Tech::new("tech", 1000);
        let m1 = tech.add_layer(Layer::routing("M1", 1, LayerDir::Horizontal, 200));
        let v1 = tech.add_layer(Layer::cut("V1"));
        let m2 = tech.add_layer(Layer::routing("M2", 2, LayerDir::Vertical, 200));
        let via = tech.add_via(TechVia {
            name: ArcStr::from("V12"),
            bottom: m1,
            top: m2,
            cut: v1,
            boxes: Vec::new(),
            bbox: Default::default(),
            is_default: true,
        });
        assert_eq!(tech.find_via("V12").unwrap(), via);
        tech.destroy_via(via).unwrap();
        assert!(tech.find_via("V12").is_err());
    }
}
