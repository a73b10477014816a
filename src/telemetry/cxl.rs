//! CXL link statistics and RAS counters

use crate::error::DecodeError;
use crate::telemetry::codec::{ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;

/// Message counters sampled at two points in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CxlStats {
    pub s2m_ndr: [u64; 2],
    pub s2m_drs: [u64; 2],
    pub m2s_req: [u64; 2],
    pub m2s_rwd: [u64; 2],
    pub link_bandwidth: [u64; 2],
}

fn pair(reader: &mut ByteReader<'_>) -> Result<[u64; 2], DecodeError> {
    Ok([reader.u64()?, reader.u64()?])
}

impl CxlStats {
    pub const BODY_LEN: usize = 5 * 16;

    /// Counter increase between the two samples, per message class
    pub fn deltas(&self) -> [u64; 5] {
        [
            self.s2m_ndr,
            self.s2m_drs,
            self.m2s_req,
            self.m2s_rwd,
            self.link_bandwidth,
        ]
        .map(|[first, second]| second.wrapping_sub(first))
    }
}

impl Record for CxlStats {
    const KIND: RecordKind = RecordKind::CxlStats;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            s2m_ndr: pair(reader)?,
            s2m_drs: pair(reader)?,
            m2s_req: pair(reader)?,
            m2s_rwd: pair(reader)?,
            link_bandwidth: pair(reader)?,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        for [first, second] in [
            self.s2m_ndr,
            self.s2m_drs,
            self.m2s_req,
            self.m2s_rwd,
            self.link_bandwidth,
        ] {
            writer.u64(first).u64(second);
        }
    }
}

/// Free-running CXL link and RAS counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CxlTelemetry {
    pub clock_ticks: u64,
    pub s2m_ndr: u64,
    pub s2m_drs: u64,
    pub m2s_req: u64,
    pub m2s_rwd: u64,
    pub ras_rx_ce: u64,
    pub ras_rx_ue_rwd_header: u64,
    pub ras_rx_ue_req_header: u64,
    pub ras_rx_ue_rwd_be: u64,
    pub ras_rx_ue_rwd_data: u64,
    pub rwd_header_ue: u64,
    pub rwd_header_hdm: u64,
    pub rwd_header_ufe: u64,
    pub req_header_ue: u64,
    pub req_header_hdm: u64,
    pub req_header_ufe: u64,
}

impl CxlTelemetry {
    pub const BODY_LEN: usize = 16 * 8;

    fn fields(&self) -> [u64; 16] {
        [
            self.clock_ticks,
            self.s2m_ndr,
            self.s2m_drs,
            self.m2s_req,
            self.m2s_rwd,
            self.ras_rx_ce,
            self.ras_rx_ue_rwd_header,
            self.ras_rx_ue_req_header,
            self.ras_rx_ue_rwd_be,
            self.ras_rx_ue_rwd_data,
            self.rwd_header_ue,
            self.rwd_header_hdm,
            self.rwd_header_ufe,
            self.req_header_ue,
            self.req_header_hdm,
            self.req_header_ufe,
        ]
    }

    /// Sum of every uncorrectable receive-side counter
    pub fn uncorrectable_total(&self) -> u64 {
        self.fields()[6..]
            .iter()
            .fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

impl Record for CxlTelemetry {
    const KIND: RecordKind = RecordKind::CxlTelemetry;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let mut v = [0u64; 16];
        for slot in v.iter_mut() {
            *slot = reader.u64()?;
        }
        Ok(Self {
            clock_ticks: v[0],
            s2m_ndr: v[1],
            s2m_drs: v[2],
            m2s_req: v[3],
            m2s_rwd: v[4],
            ras_rx_ce: v[5],
            ras_rx_ue_rwd_header: v[6],
            ras_rx_ue_req_header: v[7],
            ras_rx_ue_rwd_be: v[8],
            ras_rx_ue_rwd_data: v[9],
            rwd_header_ue: v[10],
            rwd_header_hdm: v[11],
            rwd_header_ufe: v[12],
            req_header_ue: v[13],
            req_header_hdm: v[14],
            req_header_ufe: v[15],
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        for value in self.fields() {
            writer.u64(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_deltas() {
        let stats = CxlStats {
            s2m_ndr: [10, 25],
            m2s_req: [u64::MAX, 4],
            ..Default::default()
        };
        let deltas = stats.deltas();
        assert_eq!(deltas[0], 15);
        assert_eq!(deltas[2], 5);
        assert_eq!(stats.encode().len(), CxlStats::BODY_LEN);
    }

    #[test]
    fn test_telemetry_field_order() {
        let bytes: Vec<u8> = (0..16u64).flat_map(|v| v.to_le_bytes()).collect();
        let telemetry = CxlTelemetry::decode(&bytes).unwrap();
        assert_eq!(telemetry.clock_ticks, 0);
        assert_eq!(telemetry.ras_rx_ce, 5);
        assert_eq!(telemetry.req_header_ufe, 15);
        assert_eq!(telemetry.uncorrectable_total(), (6..16).sum::<u64>());
        assert_eq!(telemetry.encode(), bytes);
    }
}
