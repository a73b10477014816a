//! CXL poison list

use crate::error::DecodeError;
use crate::telemetry::codec::{bits, ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;
use std::fmt;

/// Origin of a poisoned range, stored in the low three DPA bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoisonSource {
    Unknown,
    External,
    Internal,
    Injected,
    Vendor,
    Reserved(u8),
}

impl From<u8> for PoisonSource {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::Unknown,
            1 => Self::External,
            2 => Self::Internal,
            3 => Self::Injected,
            7 => Self::Vendor,
            other => Self::Reserved(other),
        }
    }
}

impl PoisonSource {
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::External => 1,
            Self::Internal => 2,
            Self::Injected => 3,
            Self::Vendor => 7,
            Self::Reserved(raw) => raw & 0x7,
        }
    }
}

impl fmt::Display for PoisonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::External => write!(f, "external"),
            Self::Internal => write!(f, "internal"),
            Self::Injected => write!(f, "injected"),
            Self::Vendor => write!(f, "vendor"),
            Self::Reserved(raw) => write!(f, "reserved({})", raw),
        }
    }
}

/// One poisoned range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaErrorRecord {
    /// 64-byte aligned device physical address
    pub dpa: u64,
    pub source: PoisonSource,
    /// Number of adjacent 64-byte lines
    pub length: u32,
}

impl MediaErrorRecord {
    pub const LEN: usize = 16;

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let word = reader.u64()?;
        let length = reader.u32()?;
        reader.skip(4)?;
        Ok(Self {
            dpa: word & !0x3f,
            source: PoisonSource::from(bits(word, 0, 3) as u8),
            length,
        })
    }

    fn encode(&self, writer: &mut ByteWriter) {
        writer
            .u64((self.dpa & !0x3f) | u64::from(self.source.code()))
            .u32(self.length)
            .zeros(4);
    }
}

/// Get Poison List payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoisonList {
    /// More records are available than fit in this payload
    pub more_records: bool,
    pub overflow: bool,
    pub scan_in_progress: bool,
    pub overflow_timestamp: u64,
    pub records: Vec<MediaErrorRecord>,
}

impl PoisonList {
    pub const HEADER_LEN: usize = 32;
}

impl Record for PoisonList {
    const KIND: RecordKind = RecordKind::PoisonList;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let flags = u64::from(reader.u8()?);
        reader.skip(1)?;
        let overflow_timestamp = reader.u64()?;
        let count = usize::from(reader.u16()?);
        reader.skip(20)?;

        reader.check_count(count, MediaErrorRecord::LEN)?;
        let records = (0..count)
            .map(|_| MediaErrorRecord::decode(reader))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            more_records: bits(flags, 0, 1) == 1,
            overflow: bits(flags, 1, 1) == 1,
            scan_in_progress: bits(flags, 2, 1) == 1,
            overflow_timestamp,
            records,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        let flags = u8::from(self.more_records)
            | u8::from(self.overflow) << 1
            | u8::from(self.scan_in_progress) << 2;
        writer
            .u8(flags)
            .u8(0)
            .u64(self.overflow_timestamp)
            .u16(self.records.len() as u16)
            .zeros(20);
        for record in &self.records {
            record.encode(writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_bits_are_split_from_dpa() {
        let list = PoisonList {
            more_records: true,
            scan_in_progress: true,
            records: vec![MediaErrorRecord {
                dpa: 0x1_0000_0040,
                source: PoisonSource::Injected,
                length: 1,
            }],
            ..Default::default()
        };
        let body = list.encode();
        assert_eq!(body.len(), PoisonList::HEADER_LEN + MediaErrorRecord::LEN);
        assert_eq!(body[0], 0b101);
        assert_eq!(body[32], 0x43);

        let decoded = PoisonList::decode(&body).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn test_count_larger_than_buffer() {
        let mut body = PoisonList::default().encode();
        body[10] = 3; // count
        body.extend_from_slice(&[0u8; 2 * MediaErrorRecord::LEN]);
        assert_eq!(
            PoisonList::decode(&body),
            Err(DecodeError::CountOverflow {
                count: 3,
                capacity: 2
            })
        );
    }
}
