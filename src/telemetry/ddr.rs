//! DDR controller error and command counters

use crate::error::DecodeError;
use crate::telemetry::codec::{ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;

/// One 8-bit counter per sub-channel plus the channel aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelCounters {
    pub sub_channels: [u8; 4],
    pub channel: u8,
}

impl ChannelCounters {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            sub_channels: reader.array()?,
            channel: reader.u8()?,
        })
    }

    fn encode(&self, writer: &mut ByteWriter) {
        writer.bytes(&self.sub_channels).u8(self.channel);
    }

    /// Sum of the sub-channel counters
    pub fn sub_channel_total(&self) -> u32 {
        self.sub_channels.iter().map(|&c| u32::from(c)).sum()
    }
}

/// Per-channel DDR telemetry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DdrTelemetry {
    /// Write-address ECC errors
    pub write_address_ecc: ChannelCounters,
    pub read_crc: ChannelCounters,
    /// Uncorrectable read errors
    pub read_ue: ChannelCounters,
    /// Corrected read errors
    pub read_ce: ChannelCounters,
    pub refresh_count: u64,
    pub read_activate_count: u64,
    pub precharge_count: u64,
}

impl DdrTelemetry {
    pub const BODY_LEN: usize = 4 * 5 + 3 * 8;
}

impl Record for DdrTelemetry {
    const KIND: RecordKind = RecordKind::DdrTelemetry;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            write_address_ecc: ChannelCounters::decode(reader)?,
            read_crc: ChannelCounters::decode(reader)?,
            read_ue: ChannelCounters::decode(reader)?,
            read_ce: ChannelCounters::decode(reader)?,
            refresh_count: reader.u64()?,
            read_activate_count: reader.u64()?,
            precharge_count: reader.u64()?,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        self.write_address_ecc.encode(writer);
        self.read_crc.encode(writer);
        self.read_ue.encode(writer);
        self.read_ce.encode(writer);
        writer
            .u64(self.refresh_count)
            .u64(self.read_activate_count)
            .u64(self.precharge_count);
    }
}
