//! Connect rules: how shapes on two routing layers are joined by vias.

use std::collections::BTreeMap;

use geom::rect::Rect;
use pdb::block::{Block, Net, WireShapeRole};
use pdb::layer::Layer;
use pdb::table::Oid;
use pdb::tech::Tech;
use pdb::via::{TechVia, ViaGenerateRule};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::via::{make_single_layer_via, CandidateOpts, DbVia, PlacedShapes};

/// A connect rule between two routing layers.
///
/// The rule gathers the intermediate layers from the technology's layer
/// table, collects the candidate via-generate rules and tech vias per
/// adjacent routing pair, and caches built via stacks keyed by the
/// intersection dimensions so same-size intersections reuse one database
/// via definition.
#[derive(Debug)]
pub struct Connect {
    /// The lower routing layer.
    pub lower: Oid<Layer>,
    /// The upper routing layer.
    pub upper: Oid<Layer>,
    /// Explicit via-generate rules to use instead of searching.
    pub fixed_generate_rules: Vec<Oid<ViaGenerateRule>>,
    /// Explicit tech vias to use instead of searching.
    pub fixed_tech_vias: Vec<Oid<TechVia>>,
    /// Cut pitch override, per axis.
    pub cut_pitch: Option<(i32, i32)>,
    /// Cap on cut rows; 0 is unlimited.
    pub max_rows: u32,
    /// Cap on cut columns; 0 is unlimited.
    pub max_cols: u32,
    /// Split-cut pitch per intermediate layer.
    pub split_cuts: BTreeMap<Oid<Layer>, i32>,

    intermediate_layers: Vec<Oid<Layer>>,
    intermediate_routing: Vec<Oid<Layer>>,
    generate_rules: Vec<Oid<ViaGenerateRule>>,
    tech_vias: Vec<Oid<TechVia>>,
    cache: BTreeMap<(i32, i32), DbVia>,
}

impl Connect {
    /// Creates a connect rule, ordering the layers bottom-up and
    /// populating candidates.
    pub fn new(tech: &Tech, a: Oid<Layer>, b: Oid<Layer>) -> Result<Self> {
        let (lower, upper) = {
            let la = tech.layers.get(a)?;
            let lb = tech.layers.get(b)?;
            if !la.is_routing() || !lb.is_routing() {
                return Err(Error::Setup(format!(
                    "connect layers {} and {} must be routing layers",
                    la.name, lb.name
                )));
            }
            if la.routing_level == lb.routing_level {
                return Err(Error::Setup(format!(
                    "connect layers {} and {} are the same level",
                    la.name, lb.name
                )));
            }
            if la.routing_level < lb.routing_level {
                (a, b)
            } else {
                (b, a)
            }
        };

        let intermediate_layers = tech.layers_between(lower, upper);
        let intermediate_routing: Vec<Oid<Layer>> = intermediate_layers
            .iter()
            .copied()
            .filter(|&l| tech.layers.get(l).map(|l| l.is_routing()).unwrap_or(false))
            .collect();

        let mut connect = Self {
            lower,
            upper,
            fixed_generate_rules: Vec::new(),
            fixed_tech_vias: Vec::new(),
            cut_pitch: None,
            max_rows: 0,
            max_cols: 0,
            split_cuts: BTreeMap::new(),
            intermediate_layers,
            intermediate_routing,
            generate_rules: Vec::new(),
            tech_vias: Vec::new(),
            cache: BTreeMap::new(),
        };
        connect.populate_candidates(tech)?;
        Ok(connect)
    }

    /// Registers a fixed via-generate rule, re-collecting candidates.
    pub fn add_fixed_generate_rule(&mut self, tech: &Tech, rule: Oid<ViaGenerateRule>) -> Result<()> {
        self.fixed_generate_rules.push(rule);
        self.populate_candidates(tech)
    }

    /// Registers a fixed tech via, re-collecting candidates.
    pub fn add_fixed_tech_via(&mut self, tech: &Tech, via: Oid<TechVia>) -> Result<()> {
        self.fixed_tech_vias.push(via);
        self.populate_candidates(tech)
    }

    /// Sets a split-cut pitch for intermediate layers; entries on the end
    /// layers are ignored.
    pub fn set_split_cuts(&mut self, splits: BTreeMap<Oid<Layer>, i32>) {
        self.split_cuts = splits;
        self.split_cuts.remove(&self.lower);
        self.split_cuts.remove(&self.upper);
    }

    /// All routing layers of the stack, bottom to top.
    pub fn all_routing_layers(&self) -> Vec<Oid<Layer>> {
        let mut layers = vec![self.lower];
        layers.extend(self.intermediate_routing.iter().copied());
        layers.push(self.upper);
        layers
    }

    /// The intermediate layers (cut and routing), bottom to top.
    pub fn intermediate_layers(&self) -> &[Oid<Layer>] {
        &self.intermediate_layers
    }

    /// The intermediate routing layers, bottom to top.
    pub fn intermediate_routing_layers(&self) -> &[Oid<Layer>] {
        &self.intermediate_routing
    }

    /// True when no routing layer lies between the pair.
    pub fn is_single_layer(&self) -> bool {
        self.intermediate_routing.is_empty()
    }

    /// True if `layer` lies strictly between the pair.
    pub fn contains_intermediate(&self, layer: Oid<Layer>) -> bool {
        self.intermediate_layers.contains(&layer)
    }

    /// True when the layer ranges of two connects overlap.
    pub fn overlaps(&self, other: &Connect, tech: &Tech) -> Result<bool> {
        let level = |id: Oid<Layer>| -> Result<u32> { Ok(tech.layers.get(id)?.routing_level) };
        let (a0, a1) = (level(self.lower)?, level(self.upper)?);
        let (b0, b1) = (level(other.lower)?, level(other.upper)?);
        Ok(a0.max(b0) < a1.min(b1))
    }

    /// A via stack through this connect would taper when an intermediate
    /// routing layer's minimum width exceeds the intersection width.
    pub fn is_tapered(&self, tech: &Tech, lower_rect: Rect, upper_rect: Rect) -> Result<bool> {
        let Some(intersection) = lower_rect.intersection(&upper_rect) else {
            return Ok(false);
        };
        let min_width = intersection.min_dxdy();
        for &layer in &self.intermediate_routing {
            if tech.layers.get(layer)?.min_width > min_width {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Removes candidate rules and vias whose names match the deny
    /// pattern; cached vias built from them are discarded.
    pub fn filter_vias(&mut self, tech: &Tech, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Setup(format!("invalid via filter \"{pattern}\": {e}")))?;
        self.cache.clear();
        let rules = std::mem::take(&mut self.generate_rules);
        self.generate_rules = rules
            .into_iter()
            .filter(|&r| {
                tech.via_rules
                    .get(r)
                    .map(|rule| !regex.is_match(&rule.name))
                    .unwrap_or(false)
            })
            .collect();
        let vias = std::mem::take(&mut self.tech_vias);
        self.tech_vias = vias
            .into_iter()
            .filter(|&v| {
                tech.vias
                    .get(v)
                    .map(|via| !regex.is_match(&via.name))
                    .unwrap_or(false)
            })
            .collect();
        Ok(())
    }

    /// Drops all cached via definitions.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn populate_candidates(&mut self, tech: &Tech) -> Result<()> {
        self.generate_rules.clear();
        self.tech_vias.clear();
        let layers = self.all_routing_layers();
        for pair in layers.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);

            let mut used_fixed = false;
            for &rule_id in &self.fixed_generate_rules {
                let rule = tech.via_rules.get(rule_id)?;
                if rule_reaches(rule, lo, hi) {
                    self.generate_rules.push(rule_id);
                    used_fixed = true;
                }
            }
            if !used_fixed {
                for (rule_id, rule) in tech.via_rules.iter() {
                    if rule_reaches(rule, lo, hi) {
                        self.generate_rules.push(rule_id);
                    }
                }
            }

            let mut used_fixed = false;
            for &via_id in &self.fixed_tech_vias {
                let via = tech.vias.get(via_id)?;
                if via.bottom == lo && via.top == hi {
                    self.tech_vias.push(via_id);
                    used_fixed = true;
                }
            }
            if !used_fixed {
                for (via_id, via) in tech.vias.iter() {
                    if via.bottom == lo && via.top == hi {
                        self.tech_vias.push(via_id);
                    }
                }
            }
        }
        debug!(
            generate_rules = self.generate_rules.len(),
            tech_vias = self.tech_vias.len(),
            "connect candidates collected"
        );
        Ok(())
    }

    fn split_cut_for(&self, lower: Oid<Layer>, upper: Oid<Layer>) -> Option<i32> {
        // split-cut pitches are attached to the routing layers of the pair
        let lower_split = self.split_cuts.get(&lower).copied().unwrap_or(0);
        let upper_split = self.split_cuts.get(&upper).copied().unwrap_or(0);
        let pitch = lower_split.max(upper_split);
        (pitch != 0).then_some(pitch)
    }

    /// Builds (or fetches from the cache) the via stack for one
    /// intersection and materializes it into the net's special wire.
    ///
    /// Any adjacent pair with no workable via turns the whole stack into a
    /// dummy via that reports the gap when placed.
    #[allow(clippy::too_many_arguments)]
    pub fn make_via(
        &mut self,
        tech: &Tech,
        block: &mut Block,
        net: Oid<Net>,
        swire: usize,
        lower_rect: Rect,
        upper_rect: Rect,
        role: WireShapeRole,
    ) -> Result<PlacedShapes> {
        let intersection = lower_rect
            .intersection(&upper_rect)
            .ok_or_else(|| Error::Setup("via shapes do not intersect".to_string()))?;
        let key = (intersection.dx(), intersection.dy());
        let x = tech.snap_to_mfg_grid(intersection.center().x, false);
        let y = tech.snap_to_mfg_grid(intersection.center().y, false);

        if !self.cache.contains_key(&key) {
            let via = self.build_stack(tech, lower_rect, upper_rect, intersection)?;
            self.cache.insert(key, via);
        }
        let via = self.cache.get(&key).expect("inserted above");
        via.place(tech, block, net, swire, role, x, y)
    }

    fn build_stack(
        &self,
        tech: &Tech,
        lower_rect: Rect,
        upper_rect: Rect,
        intersection: Rect,
    ) -> Result<DbVia> {
        let layers = self.all_routing_layers();
        let mut stack: Vec<DbVia> = Vec::new();
        for pair in layers.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let via_lower_rect = if lo == self.lower { lower_rect } else { intersection };
            let via_upper_rect = if hi == self.upper { upper_rect } else { intersection };

            let opts = CandidateOpts {
                cut_pitch: self.cut_pitch,
                max_rows: self.max_rows,
                max_cols: self.max_cols,
                split_cuts: self.split_cut_for(lo, hi),
            };
            let lower_is_internal = lo != self.lower;
            let upper_is_internal = hi != self.upper;
            let via = make_single_layer_via(
                tech,
                &self.generate_rules,
                &self.tech_vias,
                lo,
                via_lower_rect,
                hi,
                via_upper_rect,
                opts,
                lower_is_internal,
                upper_is_internal,
            )?;
            match via {
                Some(via) => stack.push(via),
                None => {
                    // one missing pair invalidates the whole stack
                    warn!(
                        lower = %tech.layers.get(lo)?.name,
                        upper = %tech.layers.get(hi)?.name,
                        "no via rule reaches this layer pair"
                    );
                    return Ok(DbVia::Dummy {
                        area: intersection,
                        lower: self.lower,
                        upper: self.upper,
                    });
                }
            }
        }
        if stack.len() == 1 {
            Ok(stack.into_iter().next().expect("length checked"))
        } else {
            Ok(DbVia::Stacked(stack))
        }
    }
}

fn rule_reaches(rule: &ViaGenerateRule, lower: Oid<Layer>, upper: Oid<Layer>) -> bool {
    if rule.layer_rules.len() != 3 {
        return false;
    }
    let mut has_lower = false;
    let mut has_upper = false;
    for layer_rule in &rule.layer_rules {
        if layer_rule.layer == lower {
            has_lower = true;
        }
        if layer_rule.layer == upper {
            has_upper = true;
        }
    }
    has_lower && has_upper
}
