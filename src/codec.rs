//! Typed produce/consume over a [`crate::buf::Buffer`]. The codec
//! itself is stateless — every function takes the buffer and its
//! arguments explicitly, the same shape as `mio`'s old `Buf`/`MutBuf`
//! traits in `src/buf.rs`, generalized with explicit endianness and an
//! all-or-nothing multi-field transaction for protocol framing.

use crate::buf::Buffer;
use crate::error::{Error, ErrorKind};

/// The four wire byte orders. `u8`/`i8` ignore this entirely. For
/// `u16` the two "swapped" variants degenerate to the plain orders
/// (there is only one 16-bit word to swap), which is the same
/// algorithm applied uniformly rather than a special case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    BigSwapped,
    Little,
    LittleSwapped,
}

/// Permutes a little-endian byte array in place to (or from — the
/// permutation is its own inverse) the wire order named by `endian`.
fn permute(le_bytes: &mut [u8], endian: Endian) {
    match endian {
        Endian::Little => {}
        Endian::Big => le_bytes.reverse(),
        Endian::LittleSwapped => {
            for word in le_bytes.chunks_exact_mut(2) {
                word.swap(0, 1);
            }
        }
        Endian::BigSwapped => {
            let words = le_bytes.len() / 2;
            let original: Vec<u8> = le_bytes.to_vec();
            for i in 0..words {
                let src = i * 2;
                let dst = (words - 1 - i) * 2;
                le_bytes[dst] = original[src];
                le_bytes[dst + 1] = original[src + 1];
            }
        }
    }
}

fn produce_raw(buf: &mut Buffer, bytes: &[u8]) -> Result<(), Error> {
    if buf.remaining() < bytes.len() {
        return Err(Error::new(ErrorKind::BufferTooSmall));
    }
    let end = buf.end();
    buf.raw_mut()[end..end + bytes.len()].copy_from_slice(bytes);
    buf.set_end(end + bytes.len())
}

fn consume_raw(buf: &mut Buffer, len: usize, peek: bool) -> Result<Vec<u8>, Error> {
    if buf.len() < len {
        return Err(Error::new(ErrorKind::BufferTooSmall));
    }
    let start = buf.start();
    let out = buf.raw()[start..start + len].to_vec();
    if !peek {
        buf.set_start(start + len)?;
    }
    Ok(out)
}

/// Like `consume_raw`, but copies into a caller-provided slice instead
/// of allocating a `Vec` — used for scalar widths, which are always
/// known at compile time, so the caller passes a stack array.
fn consume_into(buf: &mut Buffer, out: &mut [u8], peek: bool) -> Result<(), Error> {
    let len = out.len();
    if buf.len() < len {
        return Err(Error::new(ErrorKind::BufferTooSmall));
    }
    let start = buf.start();
    out.copy_from_slice(&buf.raw()[start..start + len]);
    if !peek {
        buf.set_start(start + len)?;
    }
    Ok(())
}

macro_rules! scalar_codec {
    ($produce:ident, $consume:ident, $ty:ty, $width:expr) => {
        /// Produces a
        #[doc = stringify!($ty)]
        /// at the buffer's write cursor, advancing `end` by
        #[doc = stringify!($width)]
        /// bytes on success. Leaves the buffer untouched on failure.
        pub fn $produce(buf: &mut Buffer, value: $ty, endian: Endian) -> Result<(), Error> {
            let mut bytes = value.to_le_bytes();
            permute(&mut bytes, endian);
            produce_raw(buf, &bytes)
        }

        /// Consumes a
        #[doc = stringify!($ty)]
        /// from the buffer's read cursor. With `peek` set, `start` is
        /// left unchanged regardless of outcome; otherwise it advances
        /// by
        #[doc = stringify!($width)]
        /// bytes only on success.
        pub fn $consume(buf: &mut Buffer, peek: bool, endian: Endian) -> Result<$ty, Error> {
            let mut bytes = [0u8; $width];
            consume_into(buf, &mut bytes, peek)?;
            permute(&mut bytes, endian);
            Ok(<$ty>::from_le_bytes(bytes))
        }
    };
}

scalar_codec!(produce_u16, consume_u16, u16, 2);
scalar_codec!(produce_u32, consume_u32, u32, 4);
scalar_codec!(produce_u64, consume_u64, u64, 8);
scalar_codec!(produce_i16, consume_i16, i16, 2);
scalar_codec!(produce_i32, consume_i32, i32, 4);
scalar_codec!(produce_i64, consume_i64, i64, 8);

/// `u8` ignores endianness entirely.
pub fn produce_u8(buf: &mut Buffer, value: u8) -> Result<(), Error> {
    produce_raw(buf, &[value])
}

pub fn consume_u8(buf: &mut Buffer, peek: bool) -> Result<u8, Error> {
    let mut byte = [0u8; 1];
    consume_into(buf, &mut byte, peek)?;
    Ok(byte[0])
}

pub fn produce_i8(buf: &mut Buffer, value: i8) -> Result<(), Error> {
    produce_u8(buf, value as u8)
}

pub fn consume_i8(buf: &mut Buffer, peek: bool) -> Result<i8, Error> {
    Ok(consume_u8(buf, peek)? as i8)
}

/// Floats are bit-cast to a same-width unsigned integer and serialised
/// through the integer path. Quiet NaN payloads may mutate across a
/// round trip; that is an accepted property of bit-cast float codecs,
/// not a bug.
pub fn produce_f32(buf: &mut Buffer, value: f32, endian: Endian) -> Result<(), Error> {
    produce_u32(buf, value.to_bits(), endian)
}

pub fn consume_f32(buf: &mut Buffer, peek: bool, endian: Endian) -> Result<f32, Error> {
    Ok(f32::from_bits(consume_u32(buf, peek, endian)?))
}

pub fn produce_f64(buf: &mut Buffer, value: f64, endian: Endian) -> Result<(), Error> {
    produce_u64(buf, value.to_bits(), endian)
}

pub fn consume_f64(buf: &mut Buffer, peek: bool, endian: Endian) -> Result<f64, Error> {
    Ok(f64::from_bits(consume_u64(buf, peek, endian)?))
}

/// Copies `bytes` verbatim to the write cursor.
pub fn produce_bytes(buf: &mut Buffer, bytes: &[u8]) -> Result<(), Error> {
    produce_raw(buf, bytes)
}

/// Copies `len` bytes out of the read cursor.
pub fn consume_bytes(buf: &mut Buffer, len: usize, peek: bool) -> Result<Vec<u8>, Error> {
    consume_raw(buf, len, peek)
}

/// One field of a transactional multi-value produce/consume: the whole
/// batch executes atomically, succeeding or failing as one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    U8(u8),
    I8(i8),
    U16(u16, Endian),
    I16(i16, Endian),
    U32(u32, Endian),
    I32(i32, Endian),
    U64(u64, Endian),
    I64(i64, Endian),
    F32(f32, Endian),
    F64(f64, Endian),
    Bytes(Vec<u8>),
}

/// The value yielded by [`consume_all`] for a requested [`FieldKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
}

/// Describes one field to read in [`consume_all`]: its shape, and for
/// multi-byte scalars, the wire endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U16(Endian),
    I16(Endian),
    U32(Endian),
    I32(Endian),
    U64(Endian),
    I64(Endian),
    F32(Endian),
    F64(Endian),
    Bytes(usize),
}

fn produce_field(buf: &mut Buffer, field: &Field) -> Result<(), Error> {
    match *field {
        Field::U8(v) => produce_u8(buf, v),
        Field::I8(v) => produce_i8(buf, v),
        Field::U16(v, e) => produce_u16(buf, v, e),
        Field::I16(v, e) => produce_i16(buf, v, e),
        Field::U32(v, e) => produce_u32(buf, v, e),
        Field::I32(v, e) => produce_i32(buf, v, e),
        Field::U64(v, e) => produce_u64(buf, v, e),
        Field::I64(v, e) => produce_i64(buf, v, e),
        Field::F32(v, e) => produce_f32(buf, v, e),
        Field::F64(v, e) => produce_f64(buf, v, e),
        Field::Bytes(ref v) => produce_bytes(buf, v),
    }
}

fn consume_field(buf: &mut Buffer, kind: FieldKind, peek: bool) -> Result<Value, Error> {
    Ok(match kind {
        FieldKind::U8 => Value::U8(consume_u8(buf, peek)?),
        FieldKind::I8 => Value::I8(consume_i8(buf, peek)?),
        FieldKind::U16(e) => Value::U16(consume_u16(buf, peek, e)?),
        FieldKind::I16(e) => Value::I16(consume_i16(buf, peek, e)?),
        FieldKind::U32(e) => Value::U32(consume_u32(buf, peek, e)?),
        FieldKind::I32(e) => Value::I32(consume_i32(buf, peek, e)?),
        FieldKind::U64(e) => Value::U64(consume_u64(buf, peek, e)?),
        FieldKind::I64(e) => Value::I64(consume_i64(buf, peek, e)?),
        FieldKind::F32(e) => Value::F32(consume_f32(buf, peek, e)?),
        FieldKind::F64(e) => Value::F64(consume_f64(buf, peek, e)?),
        FieldKind::Bytes(len) => Value::Bytes(consume_bytes(buf, len, peek)?),
    })
}

/// Produces every field in order. On failure at field *i*, fields
/// `0..i` are rolled back by restoring the pre-call cursors — a
/// half-written header is never visible to the caller.
pub fn produce_all(buf: &mut Buffer, fields: &[Field]) -> Result<(), Error> {
    let (saved_start, saved_end) = (buf.start(), buf.end());
    for field in fields {
        if let Err(err) = produce_field(buf, field) {
            // `set_start`/`set_end` cannot fail restoring a range the
            // buffer already held.
            buf.set_end(saved_end).expect("restoring end cursor");
            buf.set_start(saved_start).expect("restoring start cursor");
            return Err(err);
        }
    }
    Ok(())
}

/// Consumes every requested field kind in order, rolling back `start`
/// to its pre-call position if any field fails. When `peek` is set the
/// whole transaction behaves as a peek: `start` is restored even on
/// success.
pub fn consume_all(buf: &mut Buffer, kinds: &[FieldKind], peek: bool) -> Result<Vec<Value>, Error> {
    let saved_start = buf.start();
    let mut values = Vec::with_capacity(kinds.len());
    for kind in kinds {
        match consume_field(buf, *kind, false) {
            Ok(v) => values.push(v),
            Err(err) => {
                buf.set_start(saved_start).expect("restoring start cursor");
                return Err(err);
            }
        }
    }
    if peek {
        buf.set_start(saved_start).expect("restoring start cursor");
    }
    Ok(values)
}

/// The integer width that packages bits in a [`BitArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    U8,
    U16,
    U32,
}

impl ContainerKind {
    fn bits(self) -> usize {
        match self {
            ContainerKind::U8 => 8,
            ContainerKind::U16 => 16,
            ContainerKind::U32 => 32,
        }
    }
}

/// A bit-addressable array backed by containers of a declared width.
/// Bits pack LSB-first within each container; both bit-level and
/// container-level access operate on the same backing storage.
#[derive(Debug, Clone)]
pub struct BitArray {
    container: ContainerKind,
    bit_count: usize,
    backing: Vec<u32>,
}

impl BitArray {
    pub fn new(container: ContainerKind, bit_count: usize) -> BitArray {
        let bits_per = container.bits();
        let containers = (bit_count + bits_per - 1) / bits_per.max(1);
        BitArray {
            container,
            bit_count,
            backing: vec![0u32; containers.max(1)],
        }
    }

    pub fn container_kind(&self) -> ContainerKind {
        self.container
    }

    pub fn bit_len(&self) -> usize {
        self.bit_count
    }

    pub fn container_len(&self) -> usize {
        self.backing.len()
    }

    fn locate(&self, bit_index: usize) -> Result<(usize, usize), Error> {
        if bit_index >= self.bit_count {
            return Err(Error::new(ErrorKind::OutOfBounds));
        }
        let bits_per = self.container.bits();
        Ok((bit_index / bits_per, bit_index % bits_per))
    }

    pub fn get_bit(&self, bit_index: usize) -> Result<bool, Error> {
        let (container_index, bit_in_container) = self.locate(bit_index)?;
        Ok(self.backing[container_index] & (1 << bit_in_container) != 0)
    }

    pub fn set_bit(&mut self, bit_index: usize, value: bool) -> Result<(), Error> {
        let (container_index, bit_in_container) = self.locate(bit_index)?;
        let mask = 1u32 << bit_in_container;
        if value {
            self.backing[container_index] |= mask;
        } else {
            self.backing[container_index] &= !mask;
        }
        Ok(())
    }

    /// Bulk access to a whole container, masked to its declared width.
    pub fn get_container(&self, container_index: usize) -> Result<u32, Error> {
        let raw = self
            .backing
            .get(container_index)
            .copied()
            .ok_or_else(|| Error::new(ErrorKind::OutOfBounds))?;
        Ok(mask_to_width(raw, self.container))
    }

    pub fn set_container(&mut self, container_index: usize, value: u32) -> Result<(), Error> {
        if container_index >= self.backing.len() {
            return Err(Error::new(ErrorKind::OutOfBounds));
        }
        self.backing[container_index] = mask_to_width(value, self.container);
        Ok(())
    }

    /// Writes the bit array to the wire: each container in container
    /// order, LSB-first within the container, using `endian` to decide
    /// the container's byte order on the wire.
    pub fn produce(&self, buf: &mut Buffer, endian: Endian) -> Result<(), Error> {
        for i in 0..self.backing.len() {
            let container = self.get_container(i)?;
            match self.container {
                ContainerKind::U8 => produce_u8(buf, container as u8)?,
                ContainerKind::U16 => produce_u16(buf, container as u16, endian)?,
                ContainerKind::U32 => produce_u32(buf, container, endian)?,
            }
        }
        Ok(())
    }

    pub fn consume(
        container: ContainerKind,
        bit_count: usize,
        buf: &mut Buffer,
        endian: Endian,
        peek: bool,
    ) -> Result<BitArray, Error> {
        let mut arr = BitArray::new(container, bit_count);
        let saved_start = buf.start();
        for i in 0..arr.backing.len() {
            let value = match container {
                ContainerKind::U8 => consume_u8(buf, false)? as u32,
                ContainerKind::U16 => consume_u16(buf, false, endian)? as u32,
                ContainerKind::U32 => consume_u32(buf, false, endian)?,
            };
            if let Err(err) = arr.set_container(i, value) {
                buf.set_start(saved_start).expect("restoring start cursor");
                return Err(err);
            }
        }
        if peek {
            buf.set_start(saved_start).expect("restoring start cursor");
        }
        Ok(arr)
    }
}

fn mask_to_width(value: u32, container: ContainerKind) -> u32 {
    match container {
        ContainerKind::U8 => value & 0xff,
        ContainerKind::U16 => value & 0xffff,
        ContainerKind::U32 => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_endianness_permutations_match_worked_example() {
        let mut backing = [0u8; 4];
        let mut buf = Buffer::new(&mut backing);
        produce_u32(&mut buf, 0x0102_0304, Endian::BigSwapped).unwrap();
        // LE bytes of 0x01020304 are [04,03,02,01]; BigSwapped keeps each
        // word LE-internal but reverses word order: [02,01,04,03].
        assert_eq!(buf.live(), &[0x02, 0x01, 0x04, 0x03]);

        let mut backing = [0u8; 4];
        let mut buf = Buffer::new(&mut backing);
        produce_u32(&mut buf, 0x0102_0304, Endian::LittleSwapped).unwrap();
        // LittleSwapped keeps word order, reverses each word: [03,04,01,02].
        assert_eq!(buf.live(), &[0x03, 0x04, 0x01, 0x02]);
    }

    #[test]
    fn round_trip_all_endiannesses() {
        for endian in [
            Endian::Big,
            Endian::BigSwapped,
            Endian::Little,
            Endian::LittleSwapped,
        ] {
            for value in [0u64, 1, 0xDEAD_BEEF_CAFE_BABE, u64::MAX] {
                let mut backing = [0u8; 8];
                let mut buf = Buffer::new(&mut backing);
                produce_u64(&mut buf, value, endian).unwrap();
                let got = consume_u64(&mut buf, false, endian).unwrap();
                assert_eq!(got, value, "endian={endian:?}");
                assert_eq!(buf.start(), buf.end());
            }
        }
    }

    #[test]
    fn peek_leaves_start_unchanged() {
        let mut backing = [0u8; 4];
        let mut buf = Buffer::new(&mut backing);
        produce_u32(&mut buf, 7, Endian::Big).unwrap();
        let before = buf.start();
        let value = consume_u32(&mut buf, true, Endian::Big).unwrap();
        assert_eq!(value, 7);
        assert_eq!(buf.start(), before);
    }

    #[test]
    fn float_round_trip() {
        let mut backing = [0u8; 4];
        let mut buf = Buffer::new(&mut backing);
        produce_f32(&mut buf, 3.5, Endian::Little).unwrap();
        assert_eq!(consume_f32(&mut buf, false, Endian::Little).unwrap(), 3.5);
    }

    #[test]
    fn transactional_produce_rolls_back_on_overflow() {
        // A 3-byte buffer cannot hold (u16, u16); the whole call must
        // fail with BufferTooSmall and leave cursors untouched.
        let mut backing = [0u8; 3];
        let mut buf = Buffer::new(&mut backing);
        let (start, end) = (buf.start(), buf.end());

        let err = produce_all(
            &mut buf,
            &[
                Field::U16(0xAABB, Endian::Big),
                Field::U16(0xCCDD, Endian::Big),
            ],
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BufferTooSmall);
        assert_eq!((buf.start(), buf.end()), (start, end));
    }

    #[test]
    fn transactional_consume_rolls_back_on_underflow() {
        let mut backing = [0xAA, 0xBB, 0xCC];
        let mut buf = Buffer::new(&mut backing);
        buf.set_end(3).unwrap();
        let start = buf.start();

        let err = consume_all(
            &mut buf,
            &[FieldKind::U16(Endian::Big), FieldKind::U16(Endian::Big)],
            false,
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BufferTooSmall);
        assert_eq!(buf.start(), start);
    }

    #[test]
    fn bit_array_bit_and_container_access_share_backing() {
        let mut arr = BitArray::new(ContainerKind::U8, 10);
        arr.set_bit(0, true).unwrap();
        arr.set_bit(9, true).unwrap();
        assert_eq!(arr.get_container(0).unwrap(), 0b0000_0001);
        assert_eq!(arr.get_container(1).unwrap(), 0b0000_0010);
        assert!(arr.get_bit(0).unwrap());
        assert!(!arr.get_bit(1).unwrap());
        assert!(arr.get_bit(9).unwrap());
    }

    #[test]
    fn bit_array_out_of_bounds_bit() {
        let arr = BitArray::new(ContainerKind::U16, 5);
        assert_eq!(
            arr.get_bit(5).unwrap_err().kind(),
            ErrorKind::OutOfBounds
        );
    }

    #[test]
    fn bit_array_wire_round_trip() {
        let mut arr = BitArray::new(ContainerKind::U16, 20);
        arr.set_bit(0, true).unwrap();
        arr.set_bit(17, true).unwrap();

        let mut backing = [0u8; 4];
        let mut buf = Buffer::new(&mut backing);
        arr.produce(&mut buf, Endian::Little).unwrap();

        let decoded =
            BitArray::consume(ContainerKind::U16, 20, &mut buf, Endian::Little, false).unwrap();
        assert!(decoded.get_bit(0).unwrap());
        assert!(decoded.get_bit(17).unwrap());
        assert!(!decoded.get_bit(5).unwrap());
    }
}
