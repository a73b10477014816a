//! Little-endian byte cursor and bit-field helpers
//!
//! Every record decoder reads through [`ByteReader`], so a short buffer is
//! always reported as [`DecodeError::Truncated`] rather than a panic.

use crate::error::DecodeError;

/// Bounds-checked reader over a borrowed buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Borrow the next `len` bytes
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                needed: self.pos + len,
                available: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    /// Three-byte little-endian field
    pub fn u24(&mut self) -> Result<u32, DecodeError> {
        let [b0, b1, b2] = self.array()?;
        Ok(u32::from_le_bytes([b0, b1, b2, 0]))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Validate a count prefix against the bytes left before iterating
    pub fn check_count(&self, count: usize, entry_size: usize) -> Result<(), DecodeError> {
        let capacity = self.remaining() / entry_size;
        if count > capacity {
            return Err(DecodeError::CountOverflow { count, capacity });
        }
        Ok(())
    }

    /// Require that the whole buffer was consumed
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.pos != self.bytes.len() {
            return Err(DecodeError::LengthMismatch {
                declared: self.bytes.len(),
                decoded: self.pos,
            });
        }
        Ok(())
    }
}

/// Little-endian writer used by the encoders
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    /// Low three bytes of `value`
    pub fn u24(&mut self, value: u32) -> &mut Self {
        self.bytes(&value.to_le_bytes()[..3])
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn zeros(&mut self, len: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + len, 0);
        self
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Extract `width` bits of `word` starting at bit `lsb`
pub fn bits(word: u64, lsb: u32, width: u32) -> u64 {
    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    (word >> lsb) & mask
}

/// Return `word` with `width` bits at `lsb` replaced by `value`
pub fn set_bits(word: u64, lsb: u32, width: u32, value: u64) -> u64 {
    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    (word & !(mask << lsb)) | ((value & mask) << lsb)
}

/// Sign-extend the low `width` bits of `value`
pub fn sign_extend(value: u64, width: u32) -> i64 {
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_little_endian() {
        let bytes = [0x01, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.u8().unwrap(), 0x01);
        assert_eq!(reader.u16().unwrap(), 0x1234);
        assert_eq!(reader.u24().unwrap(), 0x12_3456);
        assert_eq!(reader.u32().unwrap(), 0x1234_5678);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_reader_truncated() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        reader.u8().unwrap();
        assert_eq!(
            reader.u32(),
            Err(DecodeError::Truncated {
                needed: 5,
                available: 3
            })
        );
        // A failed read consumes nothing.
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_finish_reports_leftover() {
        let mut reader = ByteReader::new(&[0; 6]);
        reader.u32().unwrap();
        assert_eq!(
            reader.finish(),
            Err(DecodeError::LengthMismatch {
                declared: 6,
                decoded: 4
            })
        );
    }

    #[test]
    fn test_check_count() {
        let reader = ByteReader::new(&[0; 40]);
        assert!(reader.check_count(2, 16).is_ok());
        assert_eq!(
            reader.check_count(3, 16),
            Err(DecodeError::CountOverflow {
                count: 3,
                capacity: 2
            })
        );
    }

    #[test]
    fn test_writer_matches_reader() {
        let mut writer = ByteWriter::new();
        writer.u8(7).u16(0xbeef).u24(0xabcdef).i16(-2).u64(1).zeros(2);
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 1 + 2 + 3 + 2 + 8 + 2);

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.u8().unwrap(), 7);
        assert_eq!(reader.u16().unwrap(), 0xbeef);
        assert_eq!(reader.u24().unwrap(), 0xabcdef);
        assert_eq!(reader.i16().unwrap(), -2);
        assert_eq!(reader.u64().unwrap(), 1);
    }

    #[test]
    fn test_bit_helpers() {
        assert_eq!(bits(0b1011_0100, 2, 4), 0b1101);
        assert_eq!(bits(u64::MAX, 0, 64), u64::MAX);
        assert_eq!(set_bits(0xffff, 4, 4, 0), 0xff0f);
        assert_eq!(set_bits(0, 1, 12, 0x1fff), 0xfff << 1);
        assert_eq!(sign_extend(0x7ff, 11), -1);
        assert_eq!(sign_extend(0x3ff, 11), 0x3ff);
    }
}
