//! Post-package repair (PPR) records

use crate::error::DecodeError;
use crate::telemetry::codec::{ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;

/// Repair flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PprType {
    #[default]
    Soft,
    Hard,
}

impl TryFrom<u8> for PprType {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Soft),
            1 => Ok(Self::Hard),
            other => Err(DecodeError::InvalidField {
                field: "ppr_type",
                value: u64::from(other),
            }),
        }
    }
}

impl PprType {
    pub fn code(self) -> u8 {
        match self {
            Self::Soft => 0,
            Self::Hard => 1,
        }
    }
}

/// Repair outcome byte
pub const REPAIR_STATUS_PENDING: u8 = 0;
pub const REPAIR_STATUS_SUCCESS: u8 = 1;
pub const REPAIR_STATUS_FAILED: u8 = 2;

/// Address of one DRAM row to repair, plus its outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairRecord {
    pub channel: u8,
    pub rank: u8,
    pub bank: u8,
    pub bank_group: u8,
    pub row: u32,
    /// 3DS logical rank
    pub cid: u8,
    pub resource: u8,
    pub status: u8,
    pub ppr_type: PprType,
    pub nibble_mask: u32,
}

impl RepairRecord {
    pub const LEN: usize = 16;

    pub fn succeeded(&self) -> bool {
        self.status == REPAIR_STATUS_SUCCESS
    }

    pub fn decode_entry(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            channel: reader.u8()?,
            rank: reader.u8()?,
            bank: reader.u8()?,
            bank_group: reader.u8()?,
            row: reader.u32()?,
            cid: reader.u8()?,
            resource: reader.u8()?,
            status: reader.u8()?,
            ppr_type: PprType::try_from(reader.u8()?)?,
            nibble_mask: reader.u32()?,
        })
    }

    pub fn encode_entry(&self, writer: &mut ByteWriter) {
        writer
            .u8(self.channel)
            .u8(self.rank)
            .u8(self.bank)
            .u8(self.bank_group)
            .u32(self.row)
            .u8(self.cid)
            .u8(self.resource)
            .u8(self.status)
            .u8(self.ppr_type.code())
            .u32(self.nibble_mask);
    }

    /// Request payload for `RunSoftPpr`
    pub fn to_request(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.encode_entry(&mut writer);
        writer.into_inner()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairList {
    pub records: Vec<RepairRecord>,
}

impl Record for RepairList {
    const KIND: RecordKind = RecordKind::RepairList;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let count = usize::from(reader.u16()?);
        reader.check_count(count, RepairRecord::LEN)?;
        let records = (0..count)
            .map(|_| RepairRecord::decode_entry(reader))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer.u16(self.records.len() as u16);
        for record in &self.records {
            record.encode_entry(writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_layout() {
        let record = RepairRecord {
            channel: 1,
            rank: 2,
            bank: 3,
            bank_group: 4,
            row: 0x0001_2345,
            cid: 0,
            resource: 0,
            status: REPAIR_STATUS_SUCCESS,
            ppr_type: PprType::Hard,
            nibble_mask: 0xffff_ffff,
        };
        let bytes = record.to_request();
        assert_eq!(bytes.len(), RepairRecord::LEN);
        assert_eq!(&bytes[..8], &[1, 2, 3, 4, 0x45, 0x23, 0x01, 0x00]);
        assert_eq!(bytes[10], REPAIR_STATUS_SUCCESS);
        assert_eq!(bytes[11], 1);
        assert!(record.succeeded());
    }

    #[test]
    fn test_list_rejects_unknown_ppr_type() {
        let mut body = RepairList {
            records: vec![RepairRecord::default()],
        }
        .encode();
        body[2 + 11] = 9;
        assert_eq!(
            RepairList::decode(&body),
            Err(DecodeError::InvalidField {
                field: "ppr_type",
                value: 9
            })
        );
    }

    #[test]
    fn test_list_count_overflow() {
        let body = [5u8, 0, 0, 0];
        assert!(matches!(
            RepairList::decode(&body),
            Err(DecodeError::CountOverflow { count: 5, capacity: 0 })
        ));
    }
}
