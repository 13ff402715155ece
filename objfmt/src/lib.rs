//! Output-sink abstraction the encoder emits into (§6), plus a flat-binary [`FlatWriter`] and the
//! tiny length-prefixed container `read_file`/`write_file` round-trips it through.
//!
//! The encoder never touches a file descriptor or a `Vec<u8>` buffer directly; it only knows
//! about [`Sink::output`]. That keeps `xasm::encode` ignorant of whatever backend eventually
//! consumes its bytes, mirroring how the teacher's encoder only ever spoke to a `Program`
//! through `vexfile`'s `read`/`write` pair rather than building one up by hand.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// What kind of thing a [`Record`] is asking the sink to lay down.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecordType {
    /// Plain bytes, already fully resolved (opcode bytes, a ModRM byte, a literal immediate).
    RawData,
    /// An absolute address: `target_segment:target_offset`, possibly `WRT` a third segment.
    Address,
    /// A address relative to `rel_base` (a short/near jump's displacement).
    RelAddr,
    /// A segment selector value alone (the `seg16` half of a far pointer).
    Segment,
    /// `n` bytes of uninitialized space (`RESB`-family).
    Reserve,
    /// `n` bytes of explicit zero fill (`TIMES n DB 0`-equivalent, distinct from `Reserve` at
    /// container granularity even though a flat writer treats both the same).
    ZeroData,
}

/// How an out-of-range or truncated numeric record should be treated by the sink.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sign {
    /// Truncate/extend by raw bit pattern, no range check.
    Wrap,
    /// Value must fit in a signed field of `size` bytes.
    Signed,
    /// Value must fit in an unsigned field of `size` bytes.
    Unsigned,
}

/// One unit of emitted output (§6's `output(record)` contract). `size` is always in bytes.
#[derive(Clone, Debug)]
pub struct Record<'a> {
    pub kind: RecordType,
    pub segment: u16,
    pub offset: i64,
    pub size: u8,
    /// Present for `RawData`.
    pub data: Option<&'a [u8]>,
    /// Present for `Address`/`RelAddr`/`Segment`.
    pub target_segment: Option<u16>,
    pub target_offset: Option<i64>,
    pub target_wrt: Option<u16>,
    pub sign: Sign,
    /// Present for `RelAddr`: the offset the displacement is measured from (the address of the
    /// byte immediately following the field).
    pub rel_base: Option<i64>,
}

impl<'a> Record<'a> {
    pub fn raw(segment: u16, offset: i64, data: &'a [u8]) -> Self {
        Record {
            kind: RecordType::RawData,
            segment,
            offset,
            size: data.len() as u8,
            data: Some(data),
            target_segment: None,
            target_offset: None,
            target_wrt: None,
            sign: Sign::Wrap,
            rel_base: None,
        }
    }

    pub fn reserve(segment: u16, offset: i64, size: u8) -> Self {
        Record {
            kind: RecordType::Reserve,
            segment,
            offset,
            size,
            data: None,
            target_segment: None,
            target_offset: None,
            target_wrt: None,
            sign: Sign::Wrap,
            rel_base: None,
        }
    }
}

/// A backend that consumes the encoder's output records. `xasm::encode` is generic over this
/// trait so the same two-pass walk can feed a flat binary, an object-format writer, or (in
/// `calcsize`'s case) a sink that only counts bytes and never looks at `data`.
pub trait Sink {
    fn output(&mut self, record: Record);
}

/// A sink that only accumulates the total byte count per segment, for the encoder's first
/// (`calcsize`) pass, where no output bytes are needed yet, only their lengths (§4.7).
#[derive(Default)]
pub struct SizeCounter {
    pub total: i64,
}

impl Sink for SizeCounter {
    fn output(&mut self, record: Record) {
        self.total += record.size as i64;
    }
}

/// Lays every record into one contiguous byte buffer, folding `Address` records into raw little-
/// endian bytes whenever the target segment equals the segment the record itself belongs to
/// (§6: "a single-segment flat output resolves its own internal addresses at assembly time").
/// An `Address` record naming a different segment, or carrying a `WRT`, has no flat
/// representation and is reported back to the caller instead of silently truncated.
pub struct FlatWriter {
    buf: Vec<u8>,
    maxbits: u8,
    unresolved: Vec<(i64, u16)>,
}

impl FlatWriter {
    pub fn new(maxbits: u8) -> Self {
        FlatWriter { buf: Vec::new(), maxbits, unresolved: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Offsets of `Address`/`Segment` records this writer could not fold in place, alongside the
    /// segment they targeted: a driver emitting a true flat binary has nothing left to do with
    /// these (there is only one segment), but a driver bridging to a relocatable container reads
    /// this list to know which offsets still need a relocation entry.
    pub fn unresolved(&self) -> &[(i64, u16)] {
        &self.unresolved
    }

    fn write_at(&mut self, offset: i64, bytes: &[u8]) {
        let start = offset as usize;
        let end = start + bytes.len();
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
        self.buf[start..end].copy_from_slice(bytes);
    }

    fn encode_value(value: i64, size: u8, sign: Sign) -> Vec<u8> {
        let mut bytes = value.to_le_bytes().to_vec();
        bytes.truncate(size as usize);
        match sign {
            Sign::Wrap => {}
            Sign::Signed => debug_assert!(fits_signed(value, size)),
            Sign::Unsigned => debug_assert!(fits_unsigned(value, size)),
        }
        bytes
    }
}

fn fits_signed(value: i64, size: u8) -> bool {
    if size >= 8 {
        return true;
    }
    let bits = size as u32 * 8;
    let lo = -(1i64 << (bits - 1));
    let hi = (1i64 << (bits - 1)) - 1;
    value >= lo && value <= hi
}

fn fits_unsigned(value: i64, size: u8) -> bool {
    if size >= 8 {
        return true;
    }
    let bits = size as u32 * 8;
    value >= 0 && value < (1i64 << bits)
}

impl Sink for FlatWriter {
    fn output(&mut self, record: Record) {
        match record.kind {
            RecordType::RawData => {
                let data = record.data.unwrap_or(&[]);
                self.write_at(record.offset, data);
            }
            RecordType::Reserve | RecordType::ZeroData => {
                let zeros = vec![0u8; record.size as usize];
                self.write_at(record.offset, &zeros);
            }
            RecordType::Address => {
                let same_segment = record.target_segment == Some(record.segment) && record.target_wrt.is_none();
                if same_segment {
                    let value = record.target_offset.unwrap_or(0);
                    let bytes = Self::encode_value(value, record.size, record.sign);
                    self.write_at(record.offset, &bytes);
                } else {
                    let zeros = vec![0u8; record.size as usize];
                    self.write_at(record.offset, &zeros);
                    self.unresolved.push((record.offset, record.target_segment.unwrap_or(0)));
                }
            }
            RecordType::RelAddr => {
                let target = record.target_offset.unwrap_or(0);
                let base = record.rel_base.unwrap_or(record.offset + record.size as i64);
                let value = target - base;
                let bytes = Self::encode_value(value, record.size, record.sign);
                self.write_at(record.offset, &bytes);
            }
            RecordType::Segment => {
                let value = record.target_segment.unwrap_or(0) as i64;
                let bytes = Self::encode_value(value, record.size, Sign::Unsigned);
                self.write_at(record.offset, &bytes);
            }
        }
        let _ = self.maxbits;
    }
}

/// The container this crate round-trips a [`FlatWriter`]'s buffer through: a 4-byte little-
/// endian length prefix followed by that many content bytes, nothing else. Adapted down from the
/// teacher's two-section `vexfile` format (`data` length prefix, then trailing `instructions`
/// bytes) to the single flat section this assembler produces (see `DESIGN.md`).
pub struct ObjectFile {
    bytes: Vec<u8>,
}

impl ObjectFile {
    pub fn from(bytes: Vec<u8>) -> Self {
        ObjectFile { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn read<R: Read>(reader: &mut R) -> io::Result<ObjectFile> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(ObjectFile { bytes })
}

pub fn write<W: Write>(writer: &mut W, object: &ObjectFile) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(object.bytes.len() as u32)?;
    writer.write_all(&object.bytes)
}

pub trait ReadObjectExt: Read + Sized {
    fn read_object(&mut self) -> io::Result<ObjectFile> {
        read(self)
    }
}
impl<R: Read> ReadObjectExt for R {}

pub trait WriteObjectExt: Write + Sized {
    fn write_object(&mut self, object: &ObjectFile) -> io::Result<()> {
        write(self, object)
    }
}
impl<W: Write> WriteObjectExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<ObjectFile> {
    BufReader::new(File::open(path)?).read_object()
}

pub fn write_file<P: AsRef<Path>>(path: P, object: &ObjectFile) -> io::Result<()> {
    BufWriter::new(File::create(path)?).write_object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_data_lands_at_its_offset() {
        let mut w = FlatWriter::new(32);
        w.output(Record::raw(0, 0, &[0xb8]));
        w.output(Record::raw(0, 1, &[0x01, 0x00, 0x00, 0x00]));
        assert_eq!(w.bytes(), &[0xb8, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn same_segment_address_folds_to_raw_bytes() {
        let mut w = FlatWriter::new(32);
        w.output(Record {
            kind: RecordType::Address,
            segment: 0,
            offset: 0,
            size: 4,
            data: None,
            target_segment: Some(0),
            target_offset: Some(0x1000),
            target_wrt: None,
            sign: Sign::Unsigned,
            rel_base: None,
        });
        assert_eq!(w.bytes(), &0x1000i32.to_le_bytes());
        assert!(w.unresolved().is_empty());
    }

    #[test]
    fn cross_segment_address_is_reported_unresolved() {
        let mut w = FlatWriter::new(32);
        w.output(Record {
            kind: RecordType::Address,
            segment: 0,
            offset: 4,
            size: 4,
            data: None,
            target_segment: Some(1),
            target_offset: Some(0x20),
            target_wrt: None,
            sign: Sign::Unsigned,
            rel_base: None,
        });
        assert_eq!(w.unresolved(), &[(4, 1)]);
    }

    #[test]
    fn reserve_zero_fills_without_marking_unresolved() {
        let mut w = FlatWriter::new(32);
        w.output(Record::reserve(0, 0, 4));
        assert_eq!(w.bytes(), &[0, 0, 0, 0]);
        assert!(w.unresolved().is_empty());
    }

    #[test]
    fn rel_addr_is_measured_from_the_field_end_by_default() {
        let mut w = FlatWriter::new(32);
        w.output(Record {
            kind: RecordType::RelAddr,
            segment: 0,
            offset: 10,
            size: 1,
            data: None,
            target_segment: Some(0),
            target_offset: Some(20),
            target_wrt: None,
            sign: Sign::Signed,
            rel_base: None,
        });
        assert_eq!(w.bytes()[10] as i8, 9);
    }

    #[test]
    fn object_file_round_trips_through_length_prefixed_container() {
        let object = ObjectFile::from(vec![1, 2, 3, 4, 5]);
        let mut buf = Vec::new();
        write(&mut buf, &object).unwrap();
        let read_back = read(&mut &buf[..]).unwrap();
        assert_eq!(read_back.bytes(), object.bytes());
    }
}
