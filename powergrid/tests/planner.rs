//! End-to-end planner scenarios: straps, rings, via choice, channel
//! repair, and via repair.

use arcstr::ArcStr;
use geom::orient::Orient;
use geom::point::Point;
use geom::rect::Rect;
use geom::side::Sides;

use pdb::block::{Block, Net, Row, SBox, SigType, ViaRef, WireShapeRole};
use pdb::layer::{Layer, LayerDir};
use pdb::table::Oid;
use pdb::tech::Tech;
use pdb::via::{TechVia, ViaBox, ViaGenerateRule, ViaLayerRule};
use pdb::wire::WireType;

use powergrid::connect::Connect;
use powergrid::domain::VoltageDomain;
use powergrid::grid::{Grid, GridComponent};
use powergrid::rings::{RingLayer, Rings};
use powergrid::straps::{FollowPins, Straps};
use powergrid::via_repair::ViaRepair;
use powergrid::Planner;

struct Fixture {
    tech: Tech,
    block: Block,
    layers: Vec<Oid<Layer>>,
    vdd: Oid<Net>,
    vss: Oid<Net>,
}

/// Builds a six-metal stack with cut layers between. `dirs[i]` is the
/// direction of routing level `i + 1`.
fn fixture(dirs: &[LayerDir]) -> Fixture {
    let mut tech = Tech::new("unit", 1000);
    let mut layers = Vec::new();
    for (i, &dir) in dirs.iter().enumerate() {
        let level = i as u32 + 1;
        let mut layer = Layer::routing(format!("M{level}"), level, dir, 200);
        layer.min_width = 100;
        layer.spacing = 100;
        layers.push(tech.add_layer(layer));
        if i + 1 < dirs.len() {
            tech.add_layer(Layer::cut(format!("V{level}")));
        }
    }
    let mut block = Block::new("top", "unit");
    block.die_area = Rect::from_sides(0, 0, 10_000, 10_000);
    block.core_area = Rect::from_sides(0, 0, 10_000, 10_000);
    let vdd = block.create_net("VDD", SigType::Power);
    let vss = block.create_net("VSS", SigType::Ground);
    Fixture { tech, block, layers, vdd, vss }
}

fn cut_layer(tech: &Tech, name: &str) -> Oid<Layer> {
    tech.find_layer(name).unwrap()
}

/// Adds a via-generate rule `name` joining `bottom`/`top` through `cut`.
fn add_generate_rule(
    tech: &mut Tech,
    name: &str,
    bottom: Oid<Layer>,
    cut: Oid<Layer>,
    top: Oid<Layer>,
    cut_size: i32,
    enclosure: i32,
    pitch: i32,
) {
    let mut cut_rule = ViaLayerRule::new(cut);
    cut_rule.rect = Some(Rect::from_sides(0, 0, cut_size, cut_size));
    cut_rule.spacing = Some((pitch, pitch));
    let mut bot_rule = ViaLayerRule::new(bottom);
    bot_rule.enclosure = Some((enclosure, enclosure));
    let mut top_rule = ViaLayerRule::new(top);
    top_rule.enclosure = Some((enclosure, enclosure));
    tech.via_rules.create(ViaGenerateRule {
        name: ArcStr::from(name),
        is_default: true,
        layer_rules: vec![bot_rule, cut_rule, top_rule],
    });
}

#[test]
fn strap_groups_repeat_on_pitch() {
    let fx = fixture(&[
        LayerDir::Horizontal,
        LayerDir::Vertical,
        LayerDir::Horizontal,
        LayerDir::Horizontal, // M4 horizontal per the reference scenario
    ]);
    let m4 = fx.layers[3];

    let mut planner = Planner::new();
    let domain =
        VoltageDomain::core(&fx.block, Some(fx.vdd), Some(fx.vss), vec![]).unwrap();
    let d = planner.add_domain(domain);
    let g = planner.add_grid(Grid::new("core", d, true));
    let mut straps = Straps::new(m4, 400, 2000);
    straps.spacing = 200;
    planner.add_component(g, GridComponent::Straps(straps));

    planner.build_grids(&fx.tech, &fx.block, false).unwrap();

    let shapes = planner.grids[g].shapes();
    let tree = shapes.get(&m4).expect("M4 straps");
    let mut by_center: Vec<(i32, Oid<Net>)> = tree
        .entries()
        .iter()
        .map(|(_, entry)| {
            let s = entry.0.borrow();
            (s.rect.vspan().center(), s.net.unwrap())
        })
        .collect();
    by_center.sort_unstable();

    let expected: Vec<(i32, Oid<Net>)> = (0..5)
        .flat_map(|k| {
            [(1000 + 2000 * k, fx.vdd), (1600 + 2000 * k, fx.vss)]
        })
        .collect();
    assert_eq!(by_center, expected);

    // successive same-net centers differ by the pitch
    for pair in by_center.iter().filter(|(_, n)| *n == fx.vdd).collect::<Vec<_>>().windows(2) {
        assert_eq!(pair[1].0 - pair[0].0, 2000);
    }

    // straps all have the requested width and do not overlap across nets
    let rects: Vec<(Rect, Oid<Net>)> = tree
        .entries()
        .iter()
        .map(|(_, e)| {
            let s = e.0.borrow();
            (s.rect, s.net.unwrap())
        })
        .collect();
    for (rect, _) in &rects {
        assert_eq!(rect.dy(), 400);
    }
    for (i, (a, net_a)) in rects.iter().enumerate() {
        for (b, net_b) in &rects[i + 1..] {
            if net_a != net_b {
                assert!(!a.overlaps(b), "cross-net strap overlap: {a} and {b}");
            }
        }
    }
}

#[test]
fn ring_offsets_place_four_bands_per_net() {
    let mut fx = fixture(&[
        LayerDir::Horizontal,
        LayerDir::Vertical,
        LayerDir::Horizontal,
        LayerDir::Vertical,
        LayerDir::Vertical,   // M5 vertical ring layer
        LayerDir::Horizontal, // M6 horizontal ring layer
    ]);
    fx.block.core_area = Rect::from_sides(1000, 1000, 9000, 9000);
    let (m5, m6) = (fx.layers[4], fx.layers[5]);

    let mut planner = Planner::new();
    let domain =
        VoltageDomain::core(&fx.block, Some(fx.vdd), Some(fx.vss), vec![]).unwrap();
    let d = planner.add_domain(domain);
    let g = planner.add_grid(Grid::new("core", d, true));
    let mut rings = Rings::new(
        [
            RingLayer { layer: m6, width: 400, spacing: 200 },
            RingLayer { layer: m5, width: 400, spacing: 200 },
        ],
        Sides::uniform(0),
    );
    // a single-net ring makes the reference rectangles exact
    rings.core.nets = vec![fx.vdd];
    planner.add_component(g, GridComponent::Rings(rings));

    planner.build_grids(&fx.tech, &fx.block, false).unwrap();

    let shapes = planner.grids[g].shapes();
    let m6_rects: Vec<Rect> = shapes
        .get(&m6)
        .unwrap()
        .entries()
        .iter()
        .map(|(_, e)| e.0.borrow().rect)
        .collect();
    assert_eq!(m6_rects.len(), 2);
    assert!(m6_rects.contains(&Rect::from_sides(600, 600, 9400, 1000)));
    assert!(m6_rects.contains(&Rect::from_sides(600, 9000, 9400, 9400)));

    let m5_rects: Vec<Rect> = shapes
        .get(&m5)
        .unwrap()
        .entries()
        .iter()
        .map(|(_, e)| e.0.borrow().rect)
        .collect();
    assert_eq!(m5_rects.len(), 2);
    assert!(m5_rects.contains(&Rect::from_sides(600, 600, 1000, 9400)));
    assert!(m5_rects.contains(&Rect::from_sides(9000, 600, 9400, 9400)));
}

#[test]
fn ring_offsets_move_the_bands_outward() {
    let mut fx = fixture(&[
        LayerDir::Horizontal,
        LayerDir::Vertical,
        LayerDir::Horizontal,
        LayerDir::Vertical,
        LayerDir::Vertical,
        LayerDir::Horizontal,
    ]);
    fx.block.core_area = Rect::from_sides(1000, 1000, 9000, 9000);
    let (m5, m6) = (fx.layers[4], fx.layers[5]);

    let mut planner = Planner::new();
    let domain =
        VoltageDomain::core(&fx.block, Some(fx.vdd), Some(fx.vss), vec![]).unwrap();
    let d = planner.add_domain(domain);
    let g = planner.add_grid(Grid::new("core", d, true));
    let mut rings = Rings::new(
        [
            RingLayer { layer: m6, width: 400, spacing: 200 },
            RingLayer { layer: m5, width: 400, spacing: 200 },
        ],
        Sides::uniform(100),
    );
    rings.core.nets = vec![fx.vdd];
    planner.add_component(g, GridComponent::Rings(rings));

    planner.build_grids(&fx.tech, &fx.block, false).unwrap();

    let shapes = planner.grids[g].shapes();
    let m6_rects: Vec<Rect> = shapes
        .get(&m6)
        .unwrap()
        .entries()
        .iter()
        .map(|(_, e)| e.0.borrow().rect)
        .collect();
    assert!(m6_rects.contains(&Rect::from_sides(500, 500, 9500, 900)));
    assert!(m6_rects.contains(&Rect::from_sides(500, 9100, 9500, 9500)));
}

#[test]
fn via_generation_prefers_the_larger_cut_area() {
    let mut fx = fixture(&[LayerDir::Horizontal, LayerDir::Vertical]);
    let (m1, m2) = (fx.layers[0], fx.layers[1]);
    let v1 = cut_layer(&fx.tech, "V1");
    add_generate_rule(&mut fx.tech, "G1", m1, v1, m2, 100, 50, 150);
    add_generate_rule(&mut fx.tech, "G2", m1, v1, m2, 80, 40, 120);

    let mut connect = Connect::new(&fx.tech, m1, m2).unwrap();
    let swire = fx.block.add_swire(fx.vdd, WireType::Routed).unwrap();

    let lower = Rect::from_sides(0, 0, 500, 500);
    let upper = Rect::from_sides(0, 0, 500, 500);
    connect
        .make_via(
            &fx.tech,
            &mut fx.block,
            fx.vdd,
            swire,
            lower,
            upper,
            WireShapeRole::Stripe,
        )
        .unwrap();

    // the via definition generated from G1 was created and placed
    let net = fx.block.nets.get(fx.vdd).unwrap();
    let placed: Vec<_> = net.swires[swire]
        .boxes
        .iter()
        .filter_map(|b| match b {
            SBox::Via { via: ViaRef::Block(v), .. } => Some(*v),
            _ => None,
        })
        .collect();
    assert_eq!(placed.len(), 1);
    let via = fx.block.vias.get(placed[0]).unwrap();
    assert_eq!(via.generate_rule.as_deref(), Some("G1"));
    let params = via.params.unwrap();
    assert_eq!(params.cut_size, (100, 100));
    // 3x3 cuts of G1 beat 3x3 cuts of G2 on total cut area
    assert_eq!((params.rows, params.cols), (3, 3));
}

#[test]
fn channel_repair_inserts_a_centered_strap() {
    let mut fx = fixture(&[
        LayerDir::Horizontal,
        LayerDir::Horizontal, // M2 followpins
        LayerDir::Vertical,
        LayerDir::Vertical, // M4 straps
    ]);
    let (m2, m3, m4) = (fx.layers[1], fx.layers[2], fx.layers[3]);
    let v2 = cut_layer(&fx.tech, "V2");
    let v3 = cut_layer(&fx.tech, "V3");
    add_generate_rule(&mut fx.tech, "GV2", m2, v2, m3, 100, 50, 150);
    add_generate_rule(&mut fx.tech, "GV3", m3, v3, m4, 100, 50, 150);

    // two stacked rows spanning only the channel region
    fx.block.rows.push(Row {
        name: ArcStr::from("row0"),
        bbox: Rect::from_sides(4000, 0, 6000, 1000),
        orient: Orient::R0,
    });
    fx.block.rows.push(Row {
        name: ArcStr::from("row1"),
        bbox: Rect::from_sides(4000, 1000, 6000, 2000),
        orient: Orient::Mx,
    });

    let mut planner = Planner::new();
    let domain =
        VoltageDomain::core(&fx.block, Some(fx.vdd), Some(fx.vss), vec![]).unwrap();
    let d = planner.add_domain(domain);
    let g = planner.add_grid(Grid::new("core", d, true));

    planner.add_component(g, GridComponent::FollowPins(FollowPins::new(m2, 200)));
    // two strap groups near the left edge leave the rows unconnected
    let mut straps = Straps::new(m4, 400, 2000);
    straps.spacing = 200;
    straps.number_of_straps = 1;
    planner.add_component(g, GridComponent::Straps(straps));
    planner.grids[g]
        .add_connect(Connect::new(&fx.tech, m2, m4).unwrap())
        .unwrap();
    planner.grids[g].allow_repair_channels = false;

    planner.build_grids(&fx.tech, &fx.block, false).unwrap();

    // a repair component appeared on M4, centered on the channel
    let repairs: Vec<&GridComponent> = planner.grids[g]
        .components
        .iter()
        .filter(|c| matches!(c, GridComponent::Repair(_)))
        .collect();
    assert!(!repairs.is_empty(), "expected a repair channel component");

    let mut group_min = i32::MAX;
    let mut group_max = i32::MIN;
    for repair in &repairs {
        if let Some(tree) = repair.core().shapes.get(&m4) {
            for (_, entry) in tree.entries() {
                let rect = entry.0.borrow().rect;
                group_min = group_min.min(rect.left());
                group_max = group_max.max(rect.right());
            }
        }
    }
    assert!(group_min < group_max, "repair straps were placed on M4");
    assert_eq!((group_min + group_max) / 2, 5000);

    // every followpin rail now connects upward
    let shapes = planner.grids[g].shapes();
    for (_, entry) in shapes.get(&m2).unwrap().entries() {
        let shape = entry.0.borrow();
        assert!(
            shape.connections_above() > 0,
            "followpin {} still unconnected",
            shape.rect
        );
    }

    // vias stay inside both shapes and share a full side with each
    for via in &planner.grids[g].vias {
        let via = via.borrow();
        let lower = via.lower.as_ref().unwrap().borrow().rect;
        let upper = via.upper.as_ref().unwrap().borrow().rect;
        assert!(lower.intersection(&upper).unwrap().contains(&via.area));
        let spans_lower = (via.area.left() == lower.left()
            && via.area.right() == lower.right())
            || (via.area.bot() == lower.bot() && via.area.top() == lower.top());
        let spans_upper = (via.area.left() == upper.left()
            && via.area.right() == upper.right())
            || (via.area.bot() == upper.bot() && via.area.top() == upper.top());
        assert!(spans_lower || lower.contains(&via.area));
        assert!(spans_upper || upper.contains(&via.area));
    }

    // committing to the database produces special wires with vias
    planner.write_to_db(&fx.tech, &mut fx.block, false).unwrap();
    let net = fx.block.nets.get(fx.vdd).unwrap();
    let has_via = net
        .swires
        .iter()
        .flat_map(|s| &s.boxes)
        .any(|b| matches!(b, SBox::Via { .. }));
    assert!(has_via, "expected materialized vias for VDD");
}

#[test]
fn via_repair_removes_conflicting_cuts() {
    let mut fx = fixture(&[LayerDir::Horizontal, LayerDir::Vertical]);
    let (m1, m2) = (fx.layers[0], fx.layers[1]);
    let v1 = cut_layer(&fx.tech, "V1");

    let via = fx.tech.add_via(TechVia {
        name: ArcStr::from("V12"),
        bottom: m1,
        top: m2,
        cut: v1,
        boxes: vec![
            ViaBox { layer: m1, rect: Rect::from_sides(-100, -100, 100, 100) },
            ViaBox { layer: v1, rect: Rect::from_sides(-50, -50, 50, 50) },
            ViaBox { layer: m2, rect: Rect::from_sides(-100, -100, 100, 100) },
        ],
        bbox: Rect::from_sides(-100, -100, 100, 100),
        is_default: true,
    });

    // two placed vias; only the first conflicts with the instance cut
    // obstruction
    let swire = fx.block.add_swire(fx.vdd, WireType::Routed).unwrap();
    for origin in [Point::new(200, 200), Point::new(2000, 2000)] {
        let record = fx.tech.vias.get(via).unwrap();
        let bbox = record.bbox.translate(origin);
        let net = fx.block.nets.get_mut(fx.vdd).unwrap();
        net.swires[swire].boxes.push(SBox::Via {
            via: ViaRef::Tech(via),
            origin,
            bbox,
            role: WireShapeRole::Stripe,
        });
    }

    fx.block.insts.create(pdb::block::Inst {
        name: ArcStr::from("blockage"),
        master: ArcStr::from("macro"),
        class: pdb::block::MasterClass::Block,
        placed: true,
        xform: geom::transform::Xform::IDENTITY,
        bbox: Rect::from_sides(150, 150, 250, 250),
        pins: vec![],
        obstructions: vec![(v1, Rect::from_sides(150, 150, 250, 250))],
    });

    let repair = ViaRepair::new(vec![fx.vdd]);
    let report = repair.repair(&fx.tech, &mut fx.block).unwrap();

    assert_eq!(report.removal_count.get(&v1).copied(), Some(1));
    assert_eq!(report.via_count.get(&v1).copied(), Some(2));

    let net = fx.block.nets.get(fx.vdd).unwrap();
    let remaining: Vec<Point> = net.swires[swire]
        .boxes
        .iter()
        .filter_map(|b| match b {
            SBox::Via { origin, .. } => Some(*origin),
            _ => None,
        })
        .collect();
    assert_eq!(remaining, vec![Point::new(2000, 2000)]);
}
