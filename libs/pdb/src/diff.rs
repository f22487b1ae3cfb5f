//! Deep equality for regression checking.
//!
//! [`diff`] walks two databases and reports every divergent field path.
//! Records compare with their `PartialEq` implementations; wires compare
//! with [`Wire::equal`](crate::wire::Wire::equal), where any non-zero
//! result is unequal.

use crate::block::Block;
use crate::db::Db;
use crate::table::Table;
use crate::tech::Tech;

/// Compares two databases, returning one line per difference.
///
/// An empty result means the databases are deeply equal.
pub fn diff(a: &Db, b: &Db) -> Vec<String> {
    let mut out = Vec::new();
    diff_tech(&a.tech, &b.tech, &mut out);
    diff_block(&a.block, &b.block, &mut out);
    out
}

fn diff_tech(a: &Tech, b: &Tech, out: &mut Vec<String>) {
    field(out, "tech.name", &a.name, &b.name);
    field(out, "tech.dbu_per_micron", &a.dbu_per_micron, &b.dbu_per_micron);
    field(out, "tech.mfg_grid", &a.mfg_grid, &b.mfg_grid);
    table(out, "tech.layers", &a.layers, &b.layers, |l| l.name.to_string());
    table(out, "tech.vias", &a.vias, &b.vias, |v| v.name.to_string());
    table(out, "tech.via_rules", &a.via_rules, &b.via_rules, |v| v.name.to_string());
    table(out, "tech.layer_rules", &a.layer_rules, &b.layer_rules, |r| r.layer.to_string());
    table(out, "tech.ndrs", &a.ndrs, &b.ndrs, |n| n.name.to_string());
    table(out, "tech.samenet_rules", &a.samenet_rules, &b.samenet_rules, |r| {
        format!("{}-{}", r.layer1, r.layer2)
    });
    if a.metal_width_via_map != b.metal_width_via_map {
        out.push("tech.metal_width_via_map differs".to_string());
    }
    if a.cell_edge_spacing != b.cell_edge_spacing {
        out.push("tech.cell_edge_spacing differs".to_string());
    }
}

fn diff_block(a: &Block, b: &Block, out: &mut Vec<String>) {
    field(out, "block.name", &a.name, &b.name);
    field(out, "block.tech_name", &a.tech_name, &b.tech_name);
    field(out, "block.die_area", &a.die_area, &b.die_area);
    field(out, "block.core_area", &a.core_area, &b.core_area);
    table(out, "block.nets", &a.nets, &b.nets, |n| n.name.to_string());
    table(out, "block.vias", &a.vias, &b.vias, |v| v.name.to_string());
    table(out, "block.layer_rules", &a.layer_rules, &b.layer_rules, |r| r.layer.to_string());
    table(out, "block.ndrs", &a.ndrs, &b.ndrs, |n| n.name.to_string());
    table(out, "block.insts", &a.insts, &b.insts, |i| i.name.to_string());
    table(out, "block.iterms", &a.iterms, &b.iterms, |t| t.mterm.to_string());
    table(out, "block.bterms", &a.bterms, &b.bterms, |t| t.name.to_string());
    if a.rows != b.rows {
        out.push("block.rows differ".to_string());
    }
    if a.obstructions != b.obstructions {
        out.push("block.obstructions differ".to_string());
    }

    // wires compare through the opcode-level equality
    if a.wires.len() != b.wires.len() {
        out.push(format!(
            "block.wires: count {} vs {}",
            a.wires.len(),
            b.wires.len()
        ));
        return;
    }
    for ((oid_a, wire_a), (oid_b, wire_b)) in a.wires.iter().zip(b.wires.iter()) {
        if oid_a.raw() != oid_b.raw() {
            out.push(format!("block.wires: slot {oid_a} vs {oid_b}"));
            continue;
        }
        let code = wire_a.equal(wire_b);
        if code != 0 {
            out.push(format!("block.wires[{oid_a}]: unequal (code {code})"));
        }
    }
}

fn field<T: PartialEq + std::fmt::Debug>(out: &mut Vec<String>, path: &str, a: &T, b: &T) {
    if a != b {
        out.push(format!("{path}: {a:?} vs {b:?}"));
    }
}

fn table<T: PartialEq>(
    out: &mut Vec<String>,
    path: &str,
    a: &Table<T>,
    b: &Table<T>,
    label: impl Fn(&T) -> String,
) {
    if a.len() != b.len() {
        out.push(format!("{path}: count {} vs {}", a.len(), b.len()));
        return;
    }
    for ((oid_a, rec_a), (oid_b, rec_b)) in a.iter().zip(b.iter()) {
        if oid_a.raw() != oid_b.raw() {
            out.push(format!("{path}: slot {oid_a} vs {oid_b}"));
        } else if rec_a != rec_b {
            out.push(format!("{path}[{}] ({}) differs", oid_a, label(rec_a)));
        }
    }
}
