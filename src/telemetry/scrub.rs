//! DDR scrub engine settings

use crate::error::DecodeError;
use crate::telemetry::codec::{ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::{Deserialize, Serialize};

/// Background, request and on-demand scrubber configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubConfig {
    pub background_enable: bool,
    pub background_timeout: u32,
    pub background_dpa_end: u64,
    pub background_round_interval: u32,
    pub background_cmd_interval: u32,
    /// Write poison back when an uncorrectable error is found
    pub background_write_poison: bool,
    pub request_enable: bool,
    pub request_dpa_start: u64,
    pub request_dpa_end: u64,
    pub request_cmd_interval: u32,
    pub on_demand_enable: bool,
    pub on_demand_write_poison: bool,
}

fn flag(reader: &mut ByteReader<'_>) -> Result<bool, DecodeError> {
    Ok(reader.u32()? != 0)
}

impl ScrubConfig {
    pub const BODY_LEN: usize = 60;

    /// Reject request-scrub ranges that end before they start
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.request_enable && self.request_dpa_end < self.request_dpa_start {
            return Err(DecodeError::InvalidField {
                field: "request_dpa_end",
                value: self.request_dpa_end,
            });
        }
        Ok(())
    }
}

impl Record for ScrubConfig {
    const KIND: RecordKind = RecordKind::ScrubConfig;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            background_enable: flag(reader)?,
            background_timeout: reader.u32()?,
            background_dpa_end: reader.u64()?,
            background_round_interval: reader.u32()?,
            background_cmd_interval: reader.u32()?,
            background_write_poison: flag(reader)?,
            request_enable: flag(reader)?,
            request_dpa_start: reader.u64()?,
            request_dpa_end: reader.u64()?,
            request_cmd_interval: reader.u32()?,
            on_demand_enable: flag(reader)?,
            on_demand_write_poison: flag(reader)?,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        writer
            .u32(u32::from(self.background_enable))
            .u32(self.background_timeout)
            .u64(self.background_dpa_end)
            .u32(self.background_round_interval)
            .u32(self.background_cmd_interval)
            .u32(u32::from(self.background_write_poison))
            .u32(u32::from(self.request_enable))
            .u64(self.request_dpa_start)
            .u64(self.request_dpa_end)
            .u32(self.request_cmd_interval)
            .u32(u32::from(self.on_demand_enable))
            .u32(u32::from(self.on_demand_write_poison));
    }
}
