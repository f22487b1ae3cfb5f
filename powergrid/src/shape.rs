//! Planner shapes and per-layer spatial indexes.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use geom::dir::Dir;
use geom::rect::Rect;
use geom::rtree::RTree;
use geom::subtract::subtract;
use pdb::block::{Block, Net, WireShapeRole};
use pdb::layer::Layer;
use pdb::table::Oid;
use pdb::tech::Tech;

use crate::via::Via;

/// A shared, mutable planner shape.
pub type ShapePtr = Rc<RefCell<Shape>>;

/// A shared, mutable via instance.
pub type ViaPtr = Rc<RefCell<Via>>;

/// A tree entry wrapping a [`ShapePtr`]; equality is pointer identity so
/// entries can be removed from an [`RTree`].
#[derive(Debug, Clone)]
pub struct ShapeRef(pub ShapePtr);

impl PartialEq for ShapeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A per-layer spatial index of shapes.
pub type ShapeTree = RTree<ShapeRef>;

/// Shapes per layer, iterated in layer-id order.
pub type ShapeTreeMap = BTreeMap<Oid<Layer>, ShapeTree>;

/// What a shape represents to the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// A grid shape under construction.
    Shape,
    /// The estimated footprint of another grid.
    GridObs,
    /// A block-level obstruction or placed-instance geometry.
    BlockObs,
    /// A plain obstruction.
    Obs,
    /// Pre-existing supply geometry that must not be modified.
    Fixed,
}

/// Identifies the grid component that created a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeSource {
    /// Index of the grid in the planner.
    pub grid: usize,
    /// Index of the component within the grid.
    pub component: usize,
}

/// A rectangle on a layer with a net and a wire-shape role.
///
/// Shapes cache their obstruction rectangle (the rect bloated by every
/// applicable spacing margin), point weakly at the vias that connect
/// through them, and remember the terminal rectangles they intentionally
/// touch.
#[derive(Debug, Clone)]
pub struct Shape {
    /// The layer.
    pub layer: Oid<Layer>,
    /// The owning net; obstructions have none.
    pub net: Option<Oid<Net>>,
    /// The shape rectangle.
    pub rect: Rect,
    /// The wire-shape role written to the database.
    pub role: WireShapeRole,
    /// What the shape represents.
    pub kind: ShapeKind,
    /// The cached obstruction rectangle.
    pub obs: Rect,
    /// The component that created the shape.
    pub source: Option<ShapeSource>,
    /// For [`ShapeKind::GridObs`]: the grid the estimate belongs to.
    pub obs_grid: Option<usize>,
    /// Vias connecting through this shape.
    pub vias: Vec<Weak<RefCell<Via>>>,
    /// Instance-terminal rectangles the shape connects to.
    pub iterm_connections: BTreeSet<Rect>,
    /// Block-terminal rectangles the shape connects to.
    pub bterm_connections: BTreeSet<Rect>,
    /// For followpins: indexes of the rows the rail runs along.
    pub rows: BTreeSet<usize>,
}

impl Shape {
    /// Creates a grid shape.
    pub fn new(layer: Oid<Layer>, net: Oid<Net>, rect: Rect, role: WireShapeRole) -> Self {
        Self {
            layer,
            net: Some(net),
            rect,
            role,
            kind: ShapeKind::Shape,
            obs: rect,
            source: None,
            obs_grid: None,
            vias: Vec::new(),
            iterm_connections: BTreeSet::new(),
            bterm_connections: BTreeSet::new(),
            rows: BTreeSet::new(),
        }
    }

    /// Creates an obstruction shape.
    pub fn obstruction(layer: Oid<Layer>, rect: Rect, kind: ShapeKind) -> Self {
        Self {
            layer,
            net: None,
            rect,
            role: WireShapeRole::None,
            kind,
            obs: rect,
            source: None,
            obs_grid: None,
            vias: Vec::new(),
            iterm_connections: BTreeSet::new(),
            bterm_connections: BTreeSet::new(),
            rows: BTreeSet::new(),
        }
    }

    /// True for rails following standard-cell rows.
    pub fn is_followpin(&self) -> bool {
        self.role == WireShapeRole::FollowPin
    }

    /// The shorter rect dimension.
    pub fn width(&self) -> i32 {
        self.rect.min_dxdy()
    }

    /// The longer rect dimension.
    pub fn length(&self) -> i32 {
        self.rect.max_dxdy()
    }

    /// True when the shape is longer horizontally (ties count as
    /// horizontal).
    pub fn is_horizontal(&self) -> bool {
        self.rect.dx() >= self.rect.dy()
    }

    /// The axis the shape runs along.
    pub fn axis(&self) -> Dir {
        if self.is_horizontal() {
            Dir::Horiz
        } else {
            Dir::Vert
        }
    }

    /// True if the shape runs against the layer's preferred direction.
    pub fn is_wrong_way(&self, layer: &Layer) -> bool {
        match layer.dir.axis() {
            Some(axis) => axis != self.axis() && self.rect.dx() != self.rect.dy(),
            None => false,
        }
    }

    /// True if the shape meets the layer's minimum area.
    pub fn is_valid(&self, layer: &Layer) -> bool {
        layer.min_area == 0 || self.rect.area() >= layer.min_area
    }

    /// True for shapes the planner may trim or remove.
    pub fn is_modifiable(&self) -> bool {
        self.kind == ShapeKind::Shape
    }

    /// True if the shape may be deleted outright: modifiable, not a
    /// followpin, and attached to fewer than two connections.
    pub fn is_removable(&self) -> bool {
        self.is_modifiable() && !self.is_followpin() && self.connection_count() < 2
    }

    /// The number of via and terminal connections.
    pub fn connection_count(&self) -> usize {
        self.live_vias().count() + self.iterm_connections.len() + self.bterm_connections.len()
    }

    /// The vias still alive among the weak back-references.
    pub fn live_vias(&self) -> impl Iterator<Item = ViaPtr> + '_ {
        self.vias.iter().filter_map(Weak::upgrade)
    }

    /// The number of live vias entering the shape from below.
    pub fn connections_below(&self) -> usize {
        self.live_vias()
            .filter(|v| v.borrow().upper_layer() == self.layer)
            .count()
    }

    /// The number of live vias leaving the shape upward.
    pub fn connections_above(&self) -> usize {
        self.live_vias()
            .filter(|v| v.borrow().lower_layer() == self.layer)
            .count()
    }

    /// Registers a via connecting through this shape.
    pub fn add_via(&mut self, via: &ViaPtr) {
        self.vias.push(Rc::downgrade(via));
    }

    /// Drops dead or detached via back-references.
    pub fn prune_vias(&mut self) {
        self.vias.retain(|v| v.upgrade().is_some());
    }

    /// Recomputes the cached obstruction rectangle.
    ///
    /// The obstruction is the merge of the rect bloated by the layer's
    /// spacing for this width and length, by every applicable
    /// parallel-run-length margin, and by end-of-line margins along the
    /// run axis.
    pub fn generate_obstruction(&mut self, layer: &Layer) {
        let width = self.width();
        let length = self.length();

        let mut obs = self.rect.bloat(layer.spacing_for(width, length));

        if self.is_wrong_way(layer) {
            if let Some(spacing) = layer.wrong_way_spacing_for(width, length) {
                obs = obs.union(&self.rect.bloat(spacing));
            }
        }

        if let Some(eol) = layer.eol_spacing_for(width) {
            let eol_rect = self.rect.expand_dir(self.axis(), eol);
            obs = obs.union(&eol_rect);
        }

        self.obs = obs;
    }

    /// The per-side distances between the obstruction and the rect.
    fn obstruction_halo(&self) -> [i32; 4] {
        [
            self.rect.left() - self.obs.left(),
            self.rect.bot() - self.obs.bot(),
            self.obs.right() - self.rect.right(),
            self.obs.top() - self.rect.top(),
        ]
    }

    /// The rect grown per side by the larger of this shape's halo and
    /// `halo`.
    fn rect_with_largest_halo(&self, halo: [i32; 4]) -> Rect {
        let own = self.obstruction_halo();
        Rect::from_sides(
            self.rect.left() - own[0].max(halo[0]),
            self.rect.bot() - own[1].max(halo[1]),
            self.rect.right() + own[2].max(halo[2]),
            self.rect.top() + own[3].max(halo[3]),
        )
    }

    /// Cuts the shape against `obstructions`, honoring their halos.
    ///
    /// Returns [`None`] when nothing conflicts. Otherwise returns the
    /// replacement shapes: the obstruction rectangle minus all conflict
    /// halos, clipped back to the rect, keeping only pieces that preserve
    /// the shape's full width. Followpins ignore grid-estimate
    /// obstructions entirely; other shapes ignore only their own grid's
    /// estimates.
    pub fn cut(&self, obstructions: &ShapeTree, own_grid: Option<usize>) -> Option<Vec<Shape>> {
        let is_horizontal = self.is_horizontal();
        let halo = self.obstruction_halo();
        let is_followpin = self.is_followpin();

        let mut violations = Vec::new();
        for (_, entry) in obstructions.intersecting(self.obs) {
            let other = entry.0.borrow();
            if std::ptr::eq(&*other, self as *const _) {
                continue;
            }
            if other.kind == ShapeKind::GridObs {
                if is_followpin {
                    // followpins only yield to real obstructions
                    continue;
                }
                if other.obs_grid.is_some() && other.obs_grid == own_grid {
                    continue;
                }
            }
            if let (Some(a), Some(b)) = (self.net, other.net) {
                if a == b {
                    continue;
                }
            }
            let mut vio = other.rect_with_largest_halo(halo);
            // extend the conflict across the width axis so the cut slices
            // cleanly
            if is_horizontal {
                vio = Rect::from_sides(
                    vio.left(),
                    vio.bot().min(self.obs.bot()),
                    vio.right(),
                    vio.top().max(self.obs.top()),
                );
            } else {
                vio = Rect::from_sides(
                    vio.left().min(self.obs.left()),
                    vio.bot(),
                    vio.right().max(self.obs.right()),
                    vio.top(),
                );
            }
            violations.push(vio);
        }

        if violations.is_empty() {
            return None;
        }

        let mut replacements = Vec::new();
        for piece in subtract(self.obs, &violations) {
            if !piece.overlaps(&self.rect) {
                continue;
            }
            let Some(new_rect) = piece.intersection(&self.rect) else {
                continue;
            };
            let keeps_width = if is_horizontal {
                new_rect.dy() == self.rect.dy()
            } else {
                new_rect.dx() == self.rect.dx()
            };
            if !keeps_width {
                continue;
            }
            let mut shape = self.clone();
            shape.rect = new_rect;
            shape.vias.clear();
            shape.update_term_connections();
            replacements.push(shape);
        }
        Some(replacements)
    }

    /// Drops terminal connections that no longer touch the rect.
    pub fn update_term_connections(&mut self) {
        let rect = self.rect;
        self.iterm_connections.retain(|t| rect.overlaps(t));
        self.bterm_connections.retain(|t| rect.overlaps(t));
    }

    /// Extends the shape along its run axis to cover `rect`, unless any
    /// obstruction other than the shape itself conflicts.
    pub fn extend_to(&self, rect: Rect, obstructions: &ShapeTree) -> Option<Shape> {
        let mut new_rect = self.rect;
        if self.is_horizontal() {
            new_rect = new_rect.with_hspan(new_rect.hspan().union(rect.hspan()));
        } else {
            new_rect = new_rect.with_vspan(new_rect.vspan().union(rect.vspan()));
        }
        if new_rect == self.rect {
            return None;
        }
        let blocked = obstructions.any_intersecting(new_rect, |_, entry| {
            // any conflict other than the shape itself blocks the
            // extension, same-net neighbors included
            !std::ptr::eq(&*entry.0.borrow(), self as *const _)
        });
        if blocked {
            return None;
        }
        let mut shape = self.clone();
        shape.rect = new_rect;
        Some(shape)
    }

    /// The smallest rect the shape can shrink to while keeping all of its
    /// connections. Followpins keep their width span and row extent.
    pub fn minimum_rect(&self, block: &Block) -> Option<Rect> {
        let mut rects: Vec<Rect> = Vec::new();
        rects.extend(self.iterm_connections.iter().copied());
        rects.extend(self.bterm_connections.iter().copied());
        for via in self.live_vias() {
            rects.push(via.borrow().area);
        }
        let mut min = Rect::union_all(rects)?;

        if self.is_followpin() {
            if self.is_horizontal() {
                min = min.with_vspan(self.rect.vspan());
            } else {
                min = min.with_hspan(self.rect.hspan());
            }
            for &row in &self.rows {
                if let Some(row) = block.rows.get(row) {
                    if self.is_horizontal() {
                        min = min.with_hspan(min.hspan().union(row.bbox.hspan()));
                    } else {
                        min = min.with_vspan(min.vspan().union(row.bbox.vspan()));
                    }
                }
            }
        }
        Some(min)
    }

    /// A one-line description used in diagnostics.
    pub fn report(&self, tech: &Tech, block: &Block) -> String {
        let layer = tech
            .layers
            .get(self.layer)
            .map(|l| l.name.to_string())
            .unwrap_or_else(|_| "?".to_string());
        match self.net.and_then(|n| block.nets.get(n).ok()) {
            Some(net) => format!("{} {} on {}", net.name, self.rect, layer),
            None => format!("{} on {}", self.rect, layer),
        }
    }
}

/// Inserts a shape into a tree map keyed by its rect.
pub fn insert_shape(map: &mut ShapeTreeMap, shape: &ShapePtr) {
    let (layer, rect) = {
        let s = shape.borrow();
        (s.layer, s.rect)
    };
    map.entry(layer).or_default().insert(rect, ShapeRef(shape.clone()));
}

/// Inserts a shape into a tree map keyed by its obstruction box.
pub fn insert_obstruction(map: &mut ShapeTreeMap, shape: &ShapePtr) {
    let (layer, obs) = {
        let s = shape.borrow();
        (s.layer, s.obs)
    };
    map.entry(layer).or_default().insert(obs, ShapeRef(shape.clone()));
}

/// Removes a shape from a tree map keyed by its rect.
pub fn remove_shape(map: &mut ShapeTreeMap, shape: &ShapePtr) {
    let (layer, rect) = {
        let s = shape.borrow();
        (s.layer, s.rect)
    };
    if let Some(tree) = map.get_mut(&layer) {
        tree.remove_where(rect, |entry| Rc::ptr_eq(&entry.0, shape));
    }
}

/// Copies pre-existing supply geometry of `net` out of the database as
/// fixed shapes.
pub fn shapes_from_db(
    block: &Block,
    tech: &Tech,
    net: Oid<Net>,
) -> crate::error::Result<Vec<ShapePtr>> {
    let mut out = Vec::new();
    let record = block.nets.get(net)?;
    for swire in &record.swires {
        for sbox in &swire.boxes {
            if let pdb::block::SBox::Rect { layer, rect, role } = sbox {
                let mut shape = Shape::new(*layer, net, *rect, *role);
                shape.kind = ShapeKind::Fixed;
                shape.generate_obstruction(tech.layers.get(*layer)?);
                out.push(Rc::new(RefCell::new(shape)));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdb::layer::{LayerDir, SpacingRule};

    fn layer() -> Layer {
        let mut layer = Layer::routing("M1", 1, LayerDir::Horizontal, 200);
        layer.spacing = 100;
        layer
    }

    fn shape_on(rect: Rect) -> (Shape, Layer) {
        let mut tech = Tech::new("t", 1000);
        let l = tech.add_layer(layer());
        let mut block = Block::new("b", "t");
        let net = block.create_net("VDD", pdb::block::SigType::Power);
        let mut shape = Shape::new(l, net, rect, WireShapeRole::Stripe);
        shape.generate_obstruction(tech.layers.get(l).unwrap());
        (shape, layer())
    }

    #[test]
    fn obstruction_includes_spacing() {
        let (shape, _) = shape_on(Rect::from_sides(0, 0, 1000, 200));
        assert_eq!(shape.obs, Rect::from_sides(-100, -100, 1100, 300));
    }

    #[test]
    fn eol_margin_extends_the_run_axis() {
        let mut layer = layer();
        layer.spacing_rules.push(SpacingRule::Eol { eol_width: 300, spacing: 250 });
        let mut tech = Tech::new("t", 1000);
        let l = tech.add_layer(layer);
        let mut block = Block::new("b", "t");
        let net = block.create_net("VDD", pdb::block::SigType::Power);
        let mut shape = Shape::new(l, net, Rect::from_sides(0, 0, 1000, 200), WireShapeRole::Stripe);
        shape.generate_obstruction(tech.layers.get(l).unwrap());
        assert_eq!(shape.obs, Rect::from_sides(-250, -100, 1250, 300));
    }

    #[test]
    fn cut_keeps_full_width_pieces() {
        let (shape, _) = shape_on(Rect::from_sides(0, 0, 10_000, 200));
        let shape = Rc::new(RefCell::new(shape));

        let mut tree = ShapeTree::new();
        let mut obs = Shape::obstruction(
            shape.borrow().layer,
            Rect::from_sides(4000, -500, 6000, 700),
            ShapeKind::BlockObs,
        );
        obs.obs = obs.rect;
        let obs = Rc::new(RefCell::new(obs));
        tree.insert(obs.borrow().obs, ShapeRef(obs.clone()));

        let replacements = shape.borrow().cut(&tree, None).unwrap();
        assert_eq!(replacements.len(), 2);
        for r in &replacements {
            assert_eq!(r.rect.dy(), 200);
            assert!(!r.rect.overlaps(&obs.borrow().rect));
        }
        // pieces end a halo away from the obstruction
        assert_eq!(replacements[0].rect.right(), 4000 - 100);
        assert_eq!(replacements[1].rect.left(), 6000 + 100);
    }

    #[test]
    fn cut_without_conflicts_is_none() {
        let (shape, _) = shape_on(Rect::from_sides(0, 0, 1000, 200));
        let tree = ShapeTree::new();
        assert!(shape.cut(&tree, None).is_none());
    }
}
