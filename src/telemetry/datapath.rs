//! Datapath (traffic checker and bit-scrub) counters

use crate::error::DecodeError;
use crate::telemetry::codec::{ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatapathTelemetry {
    pub tgc_ce: u8,
    pub tgc_ue: u8,
    pub ossc: u8,
    pub osdc: u8,
    pub bit_scrub_ce: u32,
    pub bit_scrub_ue: u32,
    pub bit_scrub_other: u32,
}

impl DatapathTelemetry {
    pub const BODY_LEN: usize = 4 + 3 * 4;
}

impl Record for DatapathTelemetry {
    const KIND: RecordKind = RecordKind::DatapathTelemetry;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            tgc_ce: reader.u8()?,
            tgc_ue: reader.u8()?,
            ossc: reader.u8()?,
            osdc: reader.u8()?,
            bit_scrub_ce: reader.u32()?,
            bit_scrub_ue: reader.u32()?,
            bit_scrub_other: reader.u32()?,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer
            .u8(self.tgc_ce)
            .u8(self.tgc_ue)
            .u8(self.ossc)
            .u8(self.osdc)
            .u32(self.bit_scrub_ce)
            .u32(self.bit_scrub_ue)
            .u32(self.bit_scrub_other);
    }
}
