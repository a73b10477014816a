//! Telemetry record decoding
//!
//! Structured data returned by the controller arrives as framed records:
//!
//! ```text
//! kind(1) len(2, LE) body(len)
//! ```
//!
//! Decoding is strict. An unknown kind, a short buffer, a body the layout
//! does not fully consume or a count prefix larger than the buffer is an
//! error, never a partially filled record.

pub mod codec;
pub mod cxl;
pub mod datapath;
pub mod ddr;
pub mod dimm;
pub mod err_inject;
pub mod housekeeping;
pub mod margins;
pub mod poison;
pub mod repair;
pub mod scrub;
pub mod throttle;

pub use codec::{ByteReader, ByteWriter};
pub use cxl::{CxlStats, CxlTelemetry};
pub use datapath::DatapathTelemetry;
pub use ddr::{ChannelCounters, DdrTelemetry};
pub use dimm::{DimmThermal, SpdInfo};
pub use err_inject::ErrorInjection;
pub use housekeeping::{ErrInfo, PersistentData};
pub use margins::{DdrPhyMargins, MarginKind};
pub use poison::{MediaErrorRecord, PoisonList, PoisonSource};
pub use repair::{PprType, RepairList, RepairRecord};
pub use scrub::ScrubConfig;
pub use throttle::{SubChannelThrottle, ThrottleConfig};

use crate::error::{DecodeError, DeviceError};
use crate::events::EventLogPage;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Bytes preceding the body of a framed record
pub const RECORD_HEADER_LEN: usize = 3;

/// Closed catalogue of record kinds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum RecordKind {
    DdrTelemetry = 0x01,
    CxlStats = 0x02,
    CxlTelemetry = 0x03,
    DatapathTelemetry = 0x04,
    DimmThermal = 0x05,
    SpdInfo = 0x06,
    PoisonList = 0x07,
    RepairList = 0x08,
    ScrubConfig = 0x09,
    ErrorInjection = 0x0a,
    EventLogPage = 0x0b,
    DdrPhyMargins = 0x0c,
    ThrottleConfig = 0x0d,
    ErrInfo = 0x0e,
    PersistentData = 0x0f,
}

impl RecordKind {
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        Self::try_from(code).map_err(|e| DecodeError::UnknownRecordKind(e.number))
    }

    /// Name used on the command line and in output
    pub fn name(self) -> &'static str {
        match self {
            Self::DdrTelemetry => "ddr",
            Self::CxlStats => "cxl-stats",
            Self::CxlTelemetry => "cxl",
            Self::DatapathTelemetry => "datapath",
            Self::DimmThermal => "dimm-thermal",
            Self::SpdInfo => "spd",
            Self::PoisonList => "poison",
            Self::RepairList => "repair",
            Self::ScrubConfig => "scrub",
            Self::ErrorInjection => "error-injection",
            Self::EventLogPage => "events",
            Self::DdrPhyMargins => "margins",
            Self::ThrottleConfig => "throttle",
            Self::ErrInfo => "err-info",
            Self::PersistentData => "persistent",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase().replace('_', "-");
        (0x01..=0x0fu8)
            .filter_map(|code| Self::try_from(code).ok())
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown record kind '{}'", s))
    }
}

/// A record type with a fixed binary layout
pub trait Record: Sized {
    const KIND: RecordKind;

    /// Decode the body from the reader's current position
    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError>;

    fn encode_body(&self, writer: &mut ByteWriter);

    /// Decode a complete body; leftover bytes are an error
    fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(body);
        let record = Self::decode_body(&mut reader)?;
        reader.finish()?;
        Ok(record)
    }

    fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.encode_body(&mut writer);
        writer.into_inner()
    }

    /// Encode with the record header
    fn to_framed(&self) -> Vec<u8> {
        encode_framed(Self::KIND, &self.encode())
    }
}

/// Any decoded record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum TelemetryRecord {
    DdrTelemetry(DdrTelemetry),
    CxlStats(CxlStats),
    CxlTelemetry(CxlTelemetry),
    DatapathTelemetry(DatapathTelemetry),
    DimmThermal(DimmThermal),
    SpdInfo(SpdInfo),
    PoisonList(PoisonList),
    RepairList(RepairList),
    ScrubConfig(ScrubConfig),
    ErrorInjection(ErrorInjection),
    EventLogPage(EventLogPage),
    DdrPhyMargins(DdrPhyMargins),
    ThrottleConfig(ThrottleConfig),
    ErrInfo(ErrInfo),
    PersistentData(PersistentData),
}

impl TelemetryRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::DdrTelemetry(_) => RecordKind::DdrTelemetry,
            Self::CxlStats(_) => RecordKind::CxlStats,
            Self::CxlTelemetry(_) => RecordKind::CxlTelemetry,
            Self::DatapathTelemetry(_) => RecordKind::DatapathTelemetry,
            Self::DimmThermal(_) => RecordKind::DimmThermal,
            Self::SpdInfo(_) => RecordKind::SpdInfo,
            Self::PoisonList(_) => RecordKind::PoisonList,
            Self::RepairList(_) => RecordKind::RepairList,
            Self::ScrubConfig(_) => RecordKind::ScrubConfig,
            Self::ErrorInjection(_) => RecordKind::ErrorInjection,
            Self::EventLogPage(_) => RecordKind::EventLogPage,
            Self::DdrPhyMargins(_) => RecordKind::DdrPhyMargins,
            Self::ThrottleConfig(_) => RecordKind::ThrottleConfig,
            Self::ErrInfo(_) => RecordKind::ErrInfo,
            Self::PersistentData(_) => RecordKind::PersistentData,
        }
    }

    fn decode_body(kind: RecordKind, body: &[u8]) -> Result<Self, DecodeError> {
        Ok(match kind {
            RecordKind::DdrTelemetry => Self::DdrTelemetry(DdrTelemetry::decode(body)?),
            RecordKind::CxlStats => Self::CxlStats(CxlStats::decode(body)?),
            RecordKind::CxlTelemetry => Self::CxlTelemetry(CxlTelemetry::decode(body)?),
            RecordKind::DatapathTelemetry => {
                Self::DatapathTelemetry(DatapathTelemetry::decode(body)?)
            }
            RecordKind::DimmThermal => Self::DimmThermal(DimmThermal::decode(body)?),
            RecordKind::SpdInfo => Self::SpdInfo(SpdInfo::decode(body)?),
            RecordKind::PoisonList => Self::PoisonList(PoisonList::decode(body)?),
            RecordKind::RepairList => Self::RepairList(RepairList::decode(body)?),
            RecordKind::ScrubConfig => Self::ScrubConfig(ScrubConfig::decode(body)?),
            RecordKind::ErrorInjection => Self::ErrorInjection(ErrorInjection::decode(body)?),
            RecordKind::EventLogPage => Self::EventLogPage(EventLogPage::decode(body)?),
            RecordKind::DdrPhyMargins => Self::DdrPhyMargins(DdrPhyMargins::decode(body)?),
            RecordKind::ThrottleConfig => Self::ThrottleConfig(ThrottleConfig::decode(body)?),
            RecordKind::ErrInfo => Self::ErrInfo(ErrInfo::decode(body)?),
            RecordKind::PersistentData => Self::PersistentData(PersistentData::decode(body)?),
        })
    }

    /// Encode with the record header
    pub fn to_framed(&self) -> Vec<u8> {
        match self {
            Self::DdrTelemetry(r) => r.to_framed(),
            Self::CxlStats(r) => r.to_framed(),
            Self::CxlTelemetry(r) => r.to_framed(),
            Self::DatapathTelemetry(r) => r.to_framed(),
            Self::DimmThermal(r) => r.to_framed(),
            Self::SpdInfo(r) => r.to_framed(),
            Self::PoisonList(r) => r.to_framed(),
            Self::RepairList(r) => r.to_framed(),
            Self::ScrubConfig(r) => r.to_framed(),
            Self::ErrorInjection(r) => r.to_framed(),
            Self::EventLogPage(r) => r.to_framed(),
            Self::DdrPhyMargins(r) => r.to_framed(),
            Self::ThrottleConfig(r) => r.to_framed(),
            Self::ErrInfo(r) => r.to_framed(),
            Self::PersistentData(r) => r.to_framed(),
        }
    }
}

macro_rules! impl_from_record {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for TelemetryRecord {
                fn from(record: $variant) -> Self {
                    TelemetryRecord::$variant(record)
                }
            }
        )*
    };
}

impl_from_record!(
    DdrTelemetry,
    CxlStats,
    CxlTelemetry,
    DatapathTelemetry,
    DimmThermal,
    SpdInfo,
    PoisonList,
    RepairList,
    ScrubConfig,
    ErrorInjection,
    EventLogPage,
    DdrPhyMargins,
    ThrottleConfig,
    ErrInfo,
    PersistentData,
);

/// Prefix `body` with the record header
pub fn encode_framed(kind: RecordKind, body: &[u8]) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.u8(kind.code()).u16(body.len() as u16).bytes(body);
    writer.into_inner()
}

/// Split a framed record into its kind and body
///
/// The buffer must hold exactly one record: bytes after the declared body
/// are reported as a length mismatch.
pub fn split_framed(bytes: &[u8]) -> Result<(RecordKind, &[u8]), DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let kind = RecordKind::from_code(reader.u8()?)?;
    let len = usize::from(reader.u16()?);
    let body = reader.take(len)?;
    if reader.remaining() != 0 {
        return Err(DecodeError::LengthMismatch {
            declared: RECORD_HEADER_LEN + len,
            decoded: bytes.len(),
        });
    }
    Ok((kind, body))
}

/// Decode one framed record of any kind
pub fn decode_framed(bytes: &[u8]) -> Result<TelemetryRecord, DecodeError> {
    let (kind, body) = split_framed(bytes)?;
    TelemetryRecord::decode_body(kind, body)
}

/// Decode one framed record that must be of kind `R`
pub fn decode_framed_as<R: Record>(bytes: &[u8]) -> Result<R, DeviceError> {
    let (kind, body) = split_framed(bytes)?;
    if kind != R::KIND {
        return Err(DeviceError::UnexpectedRecord {
            expected: R::KIND,
            actual: kind,
        });
    }
    Ok(R::decode(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCategory, EventLogEntry, RecordFlags};

    fn sample_records() -> Vec<TelemetryRecord> {
        vec![
            TelemetryRecord::DdrTelemetry(DdrTelemetry {
                read_ce: ChannelCounters {
                    sub_channels: [1, 0, 2, 0],
                    channel: 3,
                },
                refresh_count: 1 << 40,
                ..Default::default()
            }),
            TelemetryRecord::CxlStats(CxlStats {
                link_bandwidth: [10, 20],
                ..Default::default()
            }),
            TelemetryRecord::CxlTelemetry(CxlTelemetry {
                clock_ticks: 123_456,
                req_header_ufe: 9,
                ..Default::default()
            }),
            TelemetryRecord::DatapathTelemetry(DatapathTelemetry {
                tgc_ce: 4,
                bit_scrub_other: 77,
                ..Default::default()
            }),
            TelemetryRecord::DimmThermal(DimmThermal {
                dimm: 1,
                sensor_count: 2,
                raw: [dimm::ts_raw(38.25), dimm::ts_raw(40.0)],
            }),
            TelemetryRecord::SpdInfo(SpdInfo {
                capacity_gb: 64,
                part_number: "HMCG88AGBRA".to_string(),
                serial_number: 0xdead_beef,
                ..Default::default()
            }),
            TelemetryRecord::PoisonList(PoisonList {
                overflow: true,
                records: vec![MediaErrorRecord {
                    dpa: 0x4000,
                    source: PoisonSource::Internal,
                    length: 2,
                }],
                ..Default::default()
            }),
            TelemetryRecord::RepairList(RepairList {
                records: vec![RepairRecord {
                    row: 0x77,
                    status: repair::REPAIR_STATUS_SUCCESS,
                    ..Default::default()
                }],
            }),
            TelemetryRecord::ScrubConfig(ScrubConfig {
                on_demand_enable: true,
                request_dpa_end: 0xffff_0000,
                ..Default::default()
            }),
            TelemetryRecord::ErrorInjection(ErrorInjection {
                bank: 3,
                enable: true,
                dq_width: 8,
                ..Default::default()
            }),
            TelemetryRecord::EventLogPage(EventLogPage {
                more_records: true,
                entries: vec![EventLogEntry {
                    uuid: uuid::Uuid::from_u128(0xabcd),
                    flags: RecordFlags::default(),
                    handle: 9,
                    related_handle: 0,
                    timestamp: 5,
                    maintenance_class: 0,
                    category: EventCategory::Vendor {
                        data: vec![0x5a; crate::events::EVENT_DATA_LEN],
                    },
                }],
                ..Default::default()
            }),
            TelemetryRecord::DdrPhyMargins(DdrPhyMargins {
                kind: MarginKind::CsCa,
                groups: vec![[[1, 2, 3, 4], [5, 6, 7, 8]]; 4],
            }),
            TelemetryRecord::ThrottleConfig(ThrottleConfig::uniform(SubChannelThrottle {
                enable: true,
                max_commands: 64,
                window_length: 1024,
            })),
            TelemetryRecord::ErrInfo(ErrInfo {
                correctable: 12,
                scrub_other: 1,
                ..Default::default()
            }),
            TelemetryRecord::PersistentData(PersistentData {
                id: housekeeping::PERSISTENT_ID_VERSION,
                value: 0x0001_0002,
            }),
        ]
    }

    #[test]
    fn test_every_kind_decodes_its_own_encoding() {
        let records = sample_records();
        assert_eq!(records.len(), 15);
        for record in records {
            let framed = record.to_framed();
            assert_eq!(framed[0], record.kind().code());
            let decoded = decode_framed(&framed).unwrap();
            assert_eq!(decoded, record, "kind {}", record.kind());
        }
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(
            decode_framed(&[0x7f, 0, 0]),
            Err(DecodeError::UnknownRecordKind(0x7f))
        );
    }

    #[test]
    fn test_truncated_header_and_body() {
        assert!(matches!(
            decode_framed(&[0x01, 0x10]),
            Err(DecodeError::Truncated { .. })
        ));

        // Header declares 44 bytes but only 10 follow.
        let mut framed = vec![0x01, 44, 0];
        framed.extend_from_slice(&[0u8; 10]);
        assert_eq!(
            decode_framed(&framed),
            Err(DecodeError::Truncated {
                needed: 47,
                available: 13
            })
        );
    }

    #[test]
    fn test_declared_length_shorter_than_layout() {
        // Header declares 10 bytes for a 44-byte layout.
        let framed = encode_framed(RecordKind::DdrTelemetry, &[0u8; 10]);
        assert!(matches!(
            decode_framed(&framed),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_declared_length_longer_than_layout() {
        let mut body = ErrInfo::default().encode();
        body.extend_from_slice(&[0, 0, 0, 0]);
        let framed = encode_framed(RecordKind::ErrInfo, &body);
        assert_eq!(
            decode_framed(&framed),
            Err(DecodeError::LengthMismatch {
                declared: 24,
                decoded: 20
            })
        );
    }

    #[test]
    fn test_trailing_bytes_after_frame() {
        let mut framed = ErrInfo::default().to_framed();
        framed.push(0xff);
        assert!(matches!(
            decode_framed(&framed),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_typed_decode_checks_kind() {
        let framed = ErrInfo::default().to_framed();
        assert!(decode_framed_as::<ErrInfo>(&framed).is_ok());
        assert!(matches!(
            decode_framed_as::<PersistentData>(&framed),
            Err(DeviceError::UnexpectedRecord {
                expected: RecordKind::PersistentData,
                actual: RecordKind::ErrInfo
            })
        ));
    }

    #[test]
    fn test_kind_names_parse() {
        assert_eq!("cxl-stats".parse::<RecordKind>().unwrap(), RecordKind::CxlStats);
        assert_eq!("dimm_thermal".parse::<RecordKind>().unwrap(), RecordKind::DimmThermal);
        assert!("bogus".parse::<RecordKind>().is_err());
    }
}
