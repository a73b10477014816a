//! Firmware housekeeping counters

use crate::error::DecodeError;
use crate::telemetry::codec::{bits, ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;

/// Cumulative ECC and scrub error counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrInfo {
    pub correctable: u32,
    pub uncorrectable: u32,
    pub scrub_correctable: u32,
    pub scrub_uncorrectable: u32,
    pub scrub_other: u32,
}

impl ErrInfo {
    pub const BODY_LEN: usize = 5 * 4;
}

impl Record for ErrInfo {
    const KIND: RecordKind = RecordKind::ErrInfo;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            correctable: reader.u32()?,
            uncorrectable: reader.u32()?,
            scrub_correctable: reader.u32()?,
            scrub_uncorrectable: reader.u32()?,
            scrub_other: reader.u32()?,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer
            .u32(self.correctable)
            .u32(self.uncorrectable)
            .u32(self.scrub_correctable)
            .u32(self.scrub_uncorrectable)
            .u32(self.scrub_other);
    }
}

/// Well-known persistent counter ids
pub const PERSISTENT_ID_VERSION: u32 = 1;
pub const PERSISTENT_ID_CATTRIP: u32 = 3;

/// Counter kept by firmware across resets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistentData {
    pub id: u32,
    pub value: u32,
}

impl PersistentData {
    pub const BODY_LEN: usize = 8;

    /// Occurrences over the device lifetime
    pub fn count_total(&self) -> u16 {
        bits(u64::from(self.value), 0, 16) as u16
    }

    /// Occurrences since the last boot
    pub fn count_since_boot(&self) -> u16 {
        bits(u64::from(self.value), 16, 16) as u16
    }
}

impl Record for PersistentData {
    const KIND: RecordKind = RecordKind::PersistentData;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: reader.u32()?,
            value: reader.u32()?,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer.u32(self.id).u32(self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistent_counter_halves() {
        let data = PersistentData {
            id: PERSISTENT_ID_CATTRIP,
            value: 0x0002_0007,
        };
        assert_eq!(data.count_total(), 7);
        assert_eq!(data.count_since_boot(), 2);
    }

    #[test]
    fn test_err_info_trailing_bytes() {
        let mut body = ErrInfo::default().encode();
        body.push(0);
        assert_eq!(
            ErrInfo::decode(&body),
            Err(DecodeError::LengthMismatch {
                declared: 21,
                decoded: 20
            })
        );
    }
}
