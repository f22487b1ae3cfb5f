//! An in-memory physical-design database.
//!
//! The database stores a LEF/DEF-like world: a [technology](crate::tech::Tech)
//! of routing and cut layers with their manufacturing rules, vias and
//! via-generate rules, and [blocks](crate::block::Block) holding nets,
//! placed instances, and routed wires.
//!
//! Records live in [object tables](crate::table::Table) addressed by stable
//! integer ids ([`Oid`](crate::table::Oid)). The whole database streams to
//! a schema-versioned little-endian binary format
//! ([`stream`](crate::stream)) that round-trips bit-exactly, and
//! [`diff`](crate::diff) provides deep equality for regression checks.
//!
//! Routed wires use a compact opcode/operand encoding
//! ([`wire`](crate::wire)): two co-indexed vectors, one byte of opcode and
//! flags, one signed 32-bit operand.

#![warn(missing_docs)]

pub mod block;
pub mod db;
pub mod diff;
pub mod error;
pub mod layer;
pub mod ndr;
pub mod stream;
pub mod table;
pub mod tech;
pub mod via;
pub mod wire;

pub use db::Db;
pub use error::{Error, Result};
pub use table::{Oid, Table};
