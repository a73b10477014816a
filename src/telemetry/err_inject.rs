//! DDR ECC error injection request

use crate::error::DecodeError;
use crate::telemetry::codec::{ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::{Deserialize, Serialize};

/// Target address and mode of one injected error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInjection {
    pub start_address: u32,
    pub row: u32,
    pub column: u32,
    pub bank_group: u32,
    pub bank: u32,
    pub rank: u32,
    /// Inject an uncorrectable rather than a correctable error
    pub uncorrectable: bool,
    pub enable: bool,
    /// DRAM device width (4, 8 or 16)
    pub dq_width: u8,
}

impl ErrorInjection {
    pub const BODY_LEN: usize = 6 * 4 + 4;

    pub fn validate(&self) -> Result<(), DecodeError> {
        if !matches!(self.dq_width, 4 | 8 | 16) {
            return Err(DecodeError::InvalidField {
                field: "dq_width",
                value: u64::from(self.dq_width),
            });
        }
        Ok(())
    }
}

impl Record for ErrorInjection {
    const KIND: RecordKind = RecordKind::ErrorInjection;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let injection = Self {
            start_address: reader.u32()?,
            row: reader.u32()?,
            column: reader.u32()?,
            bank_group: reader.u32()?,
            bank: reader.u32()?,
            rank: reader.u32()?,
            uncorrectable: reader.u8()? != 0,
            enable: reader.u8()? != 0,
            dq_width: reader.u8()?,
        };
        reader.skip(1)?;
        Ok(injection)
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer
            .u32(self.start_address)
            .u32(self.row)
            .u32(self.column)
            .u32(self.bank_group)
            .u32(self.bank)
            .u32(self.rank)
            .u8(u8::from(self.uncorrectable))
            .u8(u8::from(self.enable))
            .u8(self.dq_width)
            .u8(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_validation() {
        let injection = ErrorInjection {
            row: 0x20,
            uncorrectable: true,
            enable: true,
            dq_width: 4,
            ..Default::default()
        };
        let body = injection.encode();
        assert_eq!(body.len(), ErrorInjection::BODY_LEN);
        assert_eq!(&body[24..], &[1, 1, 4, 0]);
        assert!(injection.validate().is_ok());

        let bad = ErrorInjection {
            dq_width: 6,
            ..injection
        };
        assert!(bad.validate().is_err());
    }
}
