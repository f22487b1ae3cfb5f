//! Schema-versioned binary streaming.
//!
//! The on-disk format is little-endian throughout. A stream begins with an
//! 8-byte magic tag and a `u32` schema version; readers reject unknown
//! magic with [`Error::CorruptStream`] and versions outside the supported
//! range with [`Error::UnknownSchema`]. Members added in later schema
//! revisions are skipped when reading older streams.
//!
//! Strings are length-prefixed UTF-8. Bit-packed flag words are written as
//! a single `u32`, least-significant bit first; adding a flag bit requires
//! bumping the schema version.

use std::io::{Read, Write};

use arcstr::ArcStr;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::table::Table;

/// The 8-byte magic tag at the start of every database stream.
pub const MAGIC: [u8; 8] = *b"DB00\0\0\0\0";

/// Schema version history. Each constant names the revision that
/// introduced a member.
pub mod schema {
    /// Baseline format.
    pub const INITIAL: u32 = 1;
    /// The technology gained a cell-edge-spacing table.
    pub const CELL_EDGE_SPACING: u32 = 2;
    /// Blocks record the name of the technology they were built against.
    pub const BLOCK_TECH_NAME: u32 = 3;
    /// The version written by this build.
    pub const CURRENT: u32 = BLOCK_TECH_NAME;
    /// The oldest version this build can read.
    pub const MINIMUM: u32 = INITIAL;
}

/// Writes database records to an underlying [`Write`] sink.
pub struct StreamWriter<W> {
    sink: W,
}

impl<W: Write> StreamWriter<W> {
    /// Creates a writer and emits the stream header at the current schema
    /// version.
    pub fn new(mut sink: W) -> Result<Self> {
        sink.write_all(&MAGIC)?;
        sink.write_u32::<LittleEndian>(schema::CURRENT)?;
        Ok(Self { sink })
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.sink.write_u8(value)?)
    }

    /// Writes an unsigned 32-bit word.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.sink.write_u32::<LittleEndian>(value)?)
    }

    /// Writes a signed 32-bit word.
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.sink.write_i32::<LittleEndian>(value)?)
    }

    /// Writes a signed 64-bit word.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.sink.write_i64::<LittleEndian>(value)?)
    }

    /// Writes a bool as a single byte.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        Ok(self.sink.write_all(value.as_bytes())?)
    }

    /// Writes a length-prefixed byte vector.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        Ok(self.sink.write_all(value)?)
    }

    /// Writes a length-prefixed vector of signed 32-bit words.
    pub fn write_i32_vec(&mut self, value: &[i32]) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        for &v in value {
            self.write_i32(v)?;
        }
        Ok(())
    }

    /// Writes a length-prefixed vector of unsigned 32-bit words.
    pub fn write_u32_vec(&mut self, value: &[u32]) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        for &v in value {
            self.write_u32(v)?;
        }
        Ok(())
    }

    /// Writes an optional id as its raw value, 0 meaning absent.
    pub fn write_raw_oid(&mut self, raw: u32) -> Result<()> {
        self.write_u32(raw)
    }

    /// Writes a table: label, slot count, free list, then each live
    /// record in id order.
    pub fn write_table<T>(
        &mut self,
        label: &str,
        table: &Table<T>,
        mut write_record: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        self.write_str(label)?;
        self.write_u32(table.slot_count())?;
        let free: Vec<(u32, u32)> = table.free_slots().collect();
        self.write_u32(free.len() as u32)?;
        for (index, generation) in free {
            self.write_u32(index)?;
            self.write_u32(generation)?;
        }
        let live: Vec<u32> = table.live_slots().map(|(i, _)| i).collect();
        self.write_u32(live.len() as u32)?;
        for (index, record) in table.live_slots() {
            self.write_u32(index)?;
            write_record(self, record)?;
        }
        debug_assert_eq!(live.len(), table.len());
        Ok(())
    }
}

/// Reads database records from an underlying [`Read`] source.
pub struct StreamReader<R> {
    source: R,
    version: u32,
}

impl<R: Read> StreamReader<R> {
    /// Creates a reader, verifying the magic tag and schema version.
    pub fn new(mut source: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        source.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::CorruptStream("bad magic tag".to_string()));
        }
        let version = source.read_u32::<LittleEndian>()?;
        if !(schema::MINIMUM..=schema::CURRENT).contains(&version) {
            return Err(Error::UnknownSchema(version));
        }
        debug!(version, "reading database stream");
        Ok(Self { source, version })
    }

    /// The schema version of the stream being read.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// True if the stream was written at or after the given revision.
    pub fn is_schema(&self, revision: u32) -> bool {
        self.version >= revision
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.source.read_u8()?)
    }

    /// Reads an unsigned 32-bit word.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.source.read_u32::<LittleEndian>()?)
    }

    /// Reads a signed 32-bit word.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.source.read_i32::<LittleEndian>()?)
    }

    /// Reads a signed 64-bit word.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.source.read_i64::<LittleEndian>()?)
    }

    /// Reads a bool from a single byte.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::CorruptStream(format!("invalid bool byte {b}"))),
        }
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u32()? as usize;
        // an element is at least one byte; reject lengths no source could hold
        if len > (1 << 30) {
            return Err(Error::CorruptStream(format!("implausible length {len}")));
        }
        Ok(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<ArcStr> {
        let len = self.read_len()?;
        let mut buf = vec![0u8; len];
        self.source.read_exact(&mut buf)?;
        let s = String::from_utf8(buf)
            .map_err(|_| Error::CorruptStream("invalid UTF-8 string".to_string()))?;
        Ok(ArcStr::from(s))
    }

    /// Reads a length-prefixed byte vector.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        let mut buf = vec![0u8; len];
        self.source.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a length-prefixed vector of signed 32-bit words.
    pub fn read_i32_vec(&mut self) -> Result<Vec<i32>> {
        let len = self.read_len()?;
        (0..len).map(|_| self.read_i32()).collect()
    }

    /// Reads a length-prefixed vector of unsigned 32-bit words.
    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>> {
        let len = self.read_len()?;
        (0..len).map(|_| self.read_u32()).collect()
    }

    /// Reads a raw optional id written by
    /// [`StreamWriter::write_raw_oid`].
    pub fn read_raw_oid(&mut self) -> Result<u32> {
        self.read_u32()
    }

    /// Reads an optional typed id; raw 0 means absent.
    ///
    /// Streamed references carry generation 0, matching freshly read
    /// tables.
    pub fn read_oid<T>(&mut self) -> Result<Option<crate::table::Oid<T>>> {
        let raw = self.read_u32()?;
        Ok((raw != 0).then(|| crate::table::Oid::from_raw_parts(raw, 0)))
    }

    /// Reads a required typed id, failing on raw 0.
    pub fn read_req_oid<T>(&mut self) -> Result<crate::table::Oid<T>> {
        self.read_oid()?
            .ok_or_else(|| Error::CorruptStream("missing object reference".to_string()))
    }

    /// Reads a table written by [`StreamWriter::write_table`], verifying
    /// the label.
    pub fn read_table<T>(
        &mut self,
        label: &str,
        mut read_record: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Table<T>> {
        let found = self.read_str()?;
        if found != label {
            return Err(Error::CorruptStream(format!(
                "expected table \"{label}\", found \"{found}\""
            )));
        }
        let slot_count = self.read_u32()?;
        let free_count = self.read_len()?;
        let mut free = Vec::with_capacity(free_count);
        for _ in 0..free_count {
            let index = self.read_u32()?;
            let generation = self.read_u32()?;
            free.push((index, generation));
        }
        let live_count = self.read_len()?;
        let mut live = Vec::with_capacity(live_count);
        for _ in 0..live_count {
            let index = self.read_u32()?;
            live.push((index, read_record(self)?));
        }
        Table::from_parts(slot_count, free, live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = StreamWriter::new(&mut buf).unwrap();
            w.write_str("hello").unwrap();
            w.write_i32(-42).unwrap();
        }
        let mut r = StreamReader::new(buf.as_slice()).unwrap();
        assert_eq!(r.version(), schema::CURRENT);
        assert_eq!(r.read_str().unwrap(), "hello");
        assert_eq!(r.read_i32().unwrap(), -42);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let buf = b"NOTADB!!\x01\x00\x00\x00".to_vec();
        assert!(matches!(StreamReader::new(buf.as_slice()), Err(Error::CorruptStream(_))));
    }

    #[test]
    fn future_schema_is_unknown() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&(schema::CURRENT + 1).to_le_bytes());
        assert!(matches!(
            StreamReader::new(buf.as_slice()),
            Err(Error::UnknownSchema(v)) if v == schema::CURRENT + 1
        ));
    }

    #[test]
    fn table_round_trip_preserves_free_list() {
        let mut table = Table::new();
        let ids: Vec<_> = (0..4).map(|i| table.create(i as i32 * 7)).collect();
        table.destroy(ids[1]).unwrap();

        let mut buf = Vec::new();
        {
            let mut w = StreamWriter::new(&mut buf).unwrap();
            w.write_table("numbers", &table, |w, v| w.write_i32(*v)).unwrap();
        }
        let mut r = StreamReader::new(buf.as_slice()).unwrap();
        let read = r.read_table("numbers", |r| r.read_i32()).unwrap();

        assert_eq!(read.len(), 3);
        // the freed slot is reused with the bumped generation
        let mut copy = read.clone();
        let revived = copy.create(99);
        assert_eq!(revived.raw(), 2);
        assert!(copy.get(ids[1]).is_err());
    }
}
