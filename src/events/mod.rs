//! CXL event log records
//!
//! `GetEventRecords` returns one page per call: a 32-byte header followed by
//! fixed 128-byte records. Each record starts with a common 48-byte header;
//! the 80-byte remainder is interpreted according to the record UUID.

use crate::error::DecodeError;
use crate::telemetry::codec::{bits, ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Size of every event record
pub const EVENT_RECORD_LEN: usize = 128;
/// Size of the common record header
pub const COMMON_HEADER_LEN: usize = 48;
/// Size of the category-specific part
pub const EVENT_DATA_LEN: usize = EVENT_RECORD_LEN - COMMON_HEADER_LEN;
/// Size of the page header
pub const PAGE_HEADER_LEN: usize = 32;

pub const GENERAL_MEDIA_UUID: Uuid = Uuid::from_u128(0xfbcd0a77_c260_417f_85a9_088b1621eba6);
pub const DRAM_UUID: Uuid = Uuid::from_u128(0x601dcbb3_9c06_4eab_b8af_4e9bfb5c9624);
pub const MEMORY_MODULE_UUID: Uuid = Uuid::from_u128(0xfe927475_dd59_4339_a586_79bab113b774);

/// The four device event logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventLogKind {
    Informational,
    Warning,
    Failure,
    Fatal,
}

impl EventLogKind {
    pub const ALL: [EventLogKind; 4] = [
        EventLogKind::Informational,
        EventLogKind::Warning,
        EventLogKind::Failure,
        EventLogKind::Fatal,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::Informational => 0,
            Self::Warning => 1,
            Self::Failure => 2,
            Self::Fatal => 3,
        }
    }
}

impl TryFrom<u8> for EventLogKind {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == raw)
            .ok_or(DecodeError::InvalidField {
                field: "event_log",
                value: u64::from(raw),
            })
    }
}

impl fmt::Display for EventLogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Informational => write!(f, "info"),
            Self::Warning => write!(f, "warn"),
            Self::Failure => write!(f, "failure"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

impl FromStr for EventLogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Ok(Self::Informational),
            "warn" | "warning" => Ok(Self::Warning),
            "failure" | "fail" => Ok(Self::Failure),
            "fatal" => Ok(Self::Fatal),
            _ => Err(format!("unknown event log '{}'", s)),
        }
    }
}

/// Record flags from the common header (24 bits)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordFlags {
    /// 0 informational, 1 warning, 2 failure, 3 fatal
    pub severity: u8,
    pub permanent: bool,
    pub maintenance_needed: bool,
    pub performance_degraded: bool,
    pub hardware_replacement: bool,
}

impl RecordFlags {
    fn from_bits(word: u32) -> Self {
        let word = u64::from(word);
        Self {
            severity: bits(word, 0, 2) as u8,
            permanent: bits(word, 2, 1) == 1,
            maintenance_needed: bits(word, 3, 1) == 1,
            performance_degraded: bits(word, 4, 1) == 1,
            hardware_replacement: bits(word, 5, 1) == 1,
        }
    }

    fn to_bits(self) -> u32 {
        u32::from(self.severity & 0x3)
            | u32::from(self.permanent) << 2
            | u32::from(self.maintenance_needed) << 3
            | u32::from(self.performance_degraded) << 4
            | u32::from(self.hardware_replacement) << 5
    }
}

/// Memory event descriptor byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventDescriptor {
    pub uncorrectable: bool,
    pub threshold: bool,
    pub poison_list_overflow: bool,
}

impl EventDescriptor {
    fn from_byte(byte: u8) -> Self {
        let byte = u64::from(byte);
        Self {
            uncorrectable: bits(byte, 0, 1) == 1,
            threshold: bits(byte, 1, 1) == 1,
            poison_list_overflow: bits(byte, 2, 1) == 1,
        }
    }

    fn to_byte(self) -> u8 {
        u8::from(self.uncorrectable)
            | u8::from(self.threshold) << 1
            | u8::from(self.poison_list_overflow) << 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneralMediaEvent {
    pub dpa: u64,
    pub descriptor: EventDescriptor,
    pub event_type: u8,
    pub transaction_type: u8,
    pub validity: u16,
    pub channel: u8,
    pub rank: u8,
    pub device: u32,
    pub component_id: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DramEvent {
    pub dpa: u64,
    pub descriptor: EventDescriptor,
    pub event_type: u8,
    pub transaction_type: u8,
    pub validity: u16,
    pub channel: u8,
    pub rank: u8,
    pub nibble_mask: u32,
    pub bank_group: u8,
    pub bank: u8,
    pub row: u32,
    pub column: u16,
    pub correction_mask: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryModuleEvent {
    pub event_type: u8,
    pub health_status: u8,
    pub media_status: u8,
    pub additional_status: u8,
    /// Percentage of rated life used
    pub life_used: u8,
    pub temperature: i16,
    pub dirty_shutdown_count: u32,
    pub corrected_volatile_errors: u32,
    pub corrected_persistent_errors: u32,
}

/// Category-specific part of a record, selected by UUID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum EventCategory {
    GeneralMedia(GeneralMediaEvent),
    Dram(DramEvent),
    MemoryModule(MemoryModuleEvent),
    /// Unrecognised UUID; the payload is kept unparsed
    Vendor { data: Vec<u8> },
}

impl EventCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GeneralMedia(_) => "general-media",
            Self::Dram(_) => "dram",
            Self::MemoryModule(_) => "memory-module",
            Self::Vendor { .. } => "vendor",
        }
    }

    /// Device physical address, for media and DRAM events
    pub fn dpa(&self) -> Option<u64> {
        match self {
            Self::GeneralMedia(event) => Some(event.dpa),
            Self::Dram(event) => Some(event.dpa),
            _ => None,
        }
    }

    fn decode(uuid: &Uuid, data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(data);
        let category = if *uuid == GENERAL_MEDIA_UUID {
            let event = GeneralMediaEvent {
                dpa: reader.u64()?,
                descriptor: EventDescriptor::from_byte(reader.u8()?),
                event_type: reader.u8()?,
                transaction_type: reader.u8()?,
                validity: reader.u16()?,
                channel: reader.u8()?,
                rank: reader.u8()?,
                device: reader.u24()?,
                component_id: reader.array()?,
            };
            reader.skip(46)?;
            Self::GeneralMedia(event)
        } else if *uuid == DRAM_UUID {
            let event = DramEvent {
                dpa: reader.u64()?,
                descriptor: EventDescriptor::from_byte(reader.u8()?),
                event_type: reader.u8()?,
                transaction_type: reader.u8()?,
                validity: reader.u16()?,
                channel: reader.u8()?,
                rank: reader.u8()?,
                nibble_mask: reader.u24()?,
                bank_group: reader.u8()?,
                bank: reader.u8()?,
                row: reader.u24()?,
                column: reader.u16()?,
                correction_mask: reader.array()?,
            };
            reader.skip(23)?;
            Self::Dram(event)
        } else if *uuid == MEMORY_MODULE_UUID {
            let event = MemoryModuleEvent {
                event_type: reader.u8()?,
                health_status: reader.u8()?,
                media_status: reader.u8()?,
                additional_status: reader.u8()?,
                life_used: reader.u8()?,
                temperature: reader.i16()?,
                dirty_shutdown_count: reader.u32()?,
                corrected_volatile_errors: reader.u32()?,
                corrected_persistent_errors: reader.u32()?,
            };
            reader.skip(61)?;
            Self::MemoryModule(event)
        } else {
            Self::Vendor {
                data: reader.take(EVENT_DATA_LEN)?.to_vec(),
            }
        };
        reader.finish()?;
        Ok(category)
    }

    fn encode(&self, writer: &mut ByteWriter) {
        let start = writer.len();
        match self {
            Self::GeneralMedia(event) => {
                writer
                    .u64(event.dpa)
                    .u8(event.descriptor.to_byte())
                    .u8(event.event_type)
                    .u8(event.transaction_type)
                    .u16(event.validity)
                    .u8(event.channel)
                    .u8(event.rank)
                    .u24(event.device)
                    .bytes(&event.component_id);
            }
            Self::Dram(event) => {
                writer
                    .u64(event.dpa)
                    .u8(event.descriptor.to_byte())
                    .u8(event.event_type)
                    .u8(event.transaction_type)
                    .u16(event.validity)
                    .u8(event.channel)
                    .u8(event.rank)
                    .u24(event.nibble_mask)
                    .u8(event.bank_group)
                    .u8(event.bank)
                    .u24(event.row)
                    .u16(event.column)
                    .bytes(&event.correction_mask);
            }
            Self::MemoryModule(event) => {
                writer
                    .u8(event.event_type)
                    .u8(event.health_status)
                    .u8(event.media_status)
                    .u8(event.additional_status)
                    .u8(event.life_used)
                    .i16(event.temperature)
                    .u32(event.dirty_shutdown_count)
                    .u32(event.corrected_volatile_errors)
                    .u32(event.corrected_persistent_errors);
            }
            Self::Vendor { data } => {
                let len = data.len().min(EVENT_DATA_LEN);
                writer.bytes(&data[..len]);
            }
        }
        let written = writer.len() - start;
        writer.zeros(EVENT_DATA_LEN - written);
    }
}

/// One 128-byte event record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventLogEntry {
    pub uuid: Uuid,
    pub flags: RecordFlags,
    /// Non-zero handle used to clear the record
    pub handle: u16,
    pub related_handle: u16,
    /// Nanoseconds since the Unix epoch; zero when not provided
    pub timestamp: u64,
    pub maintenance_class: u8,
    pub category: EventCategory,
}

impl EventLogEntry {
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let uuid = Uuid::from_bytes(reader.array()?);
        let length = reader.u8()?;
        if usize::from(length) != EVENT_RECORD_LEN {
            return Err(DecodeError::InvalidField {
                field: "record_length",
                value: u64::from(length),
            });
        }
        let flags = RecordFlags::from_bits(reader.u24()?);
        let handle = reader.u16()?;
        let related_handle = reader.u16()?;
        let timestamp = reader.u64()?;
        let maintenance_class = reader.u8()?;
        reader.skip(15)?;
        let category = EventCategory::decode(&uuid, reader.take(EVENT_DATA_LEN)?)?;

        Ok(Self {
            uuid,
            flags,
            handle,
            related_handle,
            timestamp,
            maintenance_class,
            category,
        })
    }

    pub fn encode(&self, writer: &mut ByteWriter) {
        writer
            .bytes(self.uuid.as_bytes())
            .u8(EVENT_RECORD_LEN as u8)
            .u24(self.flags.to_bits())
            .u16(self.handle)
            .u16(self.related_handle)
            .u64(self.timestamp)
            .u8(self.maintenance_class)
            .zeros(15);
        self.category.encode(writer);
    }
}

/// One Get Event Records response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventLogPage {
    pub overflow: bool,
    /// Firmware holds more records than fit in this page
    pub more_records: bool,
    pub overflow_error_count: u16,
    pub first_overflow_timestamp: u64,
    pub last_overflow_timestamp: u64,
    pub entries: Vec<EventLogEntry>,
}

impl Record for EventLogPage {
    const KIND: RecordKind = RecordKind::EventLogPage;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let flags = u64::from(reader.u8()?);
        reader.skip(1)?;
        let overflow_error_count = reader.u16()?;
        let first_overflow_timestamp = reader.u64()?;
        let last_overflow_timestamp = reader.u64()?;
        let count = usize::from(reader.u16()?);
        reader.skip(10)?;

        reader.check_count(count, EVENT_RECORD_LEN)?;
        let entries = (0..count)
            .map(|_| EventLogEntry::decode(reader))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            overflow: bits(flags, 0, 1) == 1,
            more_records: bits(flags, 1, 1) == 1,
            overflow_error_count,
            first_overflow_timestamp,
            last_overflow_timestamp,
            entries,
        })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        let flags = u8::from(self.overflow) | u8::from(self.more_records) << 1;
        writer
            .u8(flags)
            .u8(0)
            .u16(self.overflow_error_count)
            .u64(self.first_overflow_timestamp)
            .u64(self.last_overflow_timestamp)
            .u16(self.entries.len() as u16)
            .zeros(10);
        for entry in &self.entries {
            entry.encode(writer);
        }
    }
}

/// Which records a Clear Event Records call removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearSelector {
    All,
    Handles(Vec<u16>),
}

/// Clear Event Records request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearEventRecords {
    pub log: EventLogKind,
    pub selector: ClearSelector,
}

impl ClearEventRecords {
    /// Most handles one request can carry
    pub const MAX_HANDLES: usize = u8::MAX as usize;

    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut writer = ByteWriter::new();
        writer.u8(self.log.code());
        match &self.selector {
            ClearSelector::All => {
                writer.u8(0x1).u8(0).zeros(3);
            }
            ClearSelector::Handles(handles) => {
                if handles.len() > Self::MAX_HANDLES {
                    return Err(DecodeError::CountOverflow {
                        count: handles.len(),
                        capacity: Self::MAX_HANDLES,
                    });
                }
                writer.u8(0).u8(handles.len() as u8).zeros(3);
                for handle in handles {
                    writer.u16(*handle);
                }
            }
        }
        Ok(writer.into_inner())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let log = EventLogKind::try_from(reader.u8()?)?;
        let flags = reader.u8()?;
        let count = usize::from(reader.u8()?);
        reader.skip(3)?;
        let selector = if flags & 0x1 == 0x1 {
            ClearSelector::All
        } else {
            reader.check_count(count, 2)?;
            ClearSelector::Handles(
                (0..count)
                    .map(|_| reader.u16())
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };
        reader.finish()?;
        Ok(Self { log, selector })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dram_entry(handle: u16) -> EventLogEntry {
        EventLogEntry {
            uuid: DRAM_UUID,
            flags: RecordFlags {
                severity: 2,
                maintenance_needed: true,
                ..Default::default()
            },
            handle,
            related_handle: 0,
            timestamp: 1_700_000_000_000_000_000,
            maintenance_class: 0,
            category: EventCategory::Dram(DramEvent {
                dpa: 0x8000_0040,
                descriptor: EventDescriptor {
                    uncorrectable: true,
                    ..Default::default()
                },
                event_type: 0,
                transaction_type: 1,
                validity: 0x3f,
                channel: 1,
                rank: 0,
                nibble_mask: 0x00_0f00,
                bank_group: 2,
                bank: 3,
                row: 0x01_2345,
                column: 0x40,
                correction_mask: [0; 32],
            }),
        }
    }

    #[test]
    fn test_record_is_128_bytes() {
        let mut writer = ByteWriter::new();
        dram_entry(1).encode(&mut writer);
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), EVENT_RECORD_LEN);
        assert_eq!(bytes[16], EVENT_RECORD_LEN as u8);
        assert_eq!(&bytes[..4], &[0x60, 0x1d, 0xcb, 0xb3]);
    }

    #[test]
    fn test_page_with_every_category() {
        let mut media = dram_entry(2);
        media.uuid = GENERAL_MEDIA_UUID;
        media.category = EventCategory::GeneralMedia(GeneralMediaEvent {
            dpa: 0x1000,
            descriptor: EventDescriptor::default(),
            event_type: 1,
            transaction_type: 5,
            validity: 0,
            channel: 0,
            rank: 1,
            device: 0x12_3456,
            component_id: [7; 16],
        });

        let mut module = dram_entry(3);
        module.uuid = MEMORY_MODULE_UUID;
        module.category = EventCategory::MemoryModule(MemoryModuleEvent {
            event_type: 0,
            health_status: 1,
            media_status: 0,
            additional_status: 0,
            life_used: 3,
            temperature: -5,
            dirty_shutdown_count: 2,
            corrected_volatile_errors: 10,
            corrected_persistent_errors: 0,
        });

        let mut vendor = dram_entry(4);
        vendor.uuid = Uuid::from_u128(0x1234);
        vendor.category = EventCategory::Vendor {
            data: (0..EVENT_DATA_LEN as u8).collect(),
        };

        let page = EventLogPage {
            more_records: true,
            entries: vec![dram_entry(1), media, module, vendor],
            ..Default::default()
        };
        let body = page.encode();
        assert_eq!(body.len(), PAGE_HEADER_LEN + 4 * EVENT_RECORD_LEN);
        let decoded = EventLogPage::decode(&body).unwrap();
        assert_eq!(decoded, page);
        assert_eq!(decoded.entries[2].category.name(), "memory-module");
        assert_eq!(decoded.entries[0].category.dpa(), Some(0x8000_0040));
    }

    #[test]
    fn test_bad_record_length() {
        let page = EventLogPage {
            entries: vec![dram_entry(1)],
            ..Default::default()
        };
        let mut body = page.encode();
        body[PAGE_HEADER_LEN + 16] = 64;
        assert_eq!(
            EventLogPage::decode(&body),
            Err(DecodeError::InvalidField {
                field: "record_length",
                value: 64
            })
        );
    }

    #[test]
    fn test_page_count_overflow() {
        let mut body = EventLogPage::default().encode();
        body[20] = 2;
        body.extend_from_slice(&[0u8; EVENT_RECORD_LEN]);
        assert_eq!(
            EventLogPage::decode(&body),
            Err(DecodeError::CountOverflow {
                count: 2,
                capacity: 1
            })
        );
    }

    #[test]
    fn test_clear_payload() {
        let clear = ClearEventRecords {
            log: EventLogKind::Failure,
            selector: ClearSelector::Handles(vec![1, 0x0203]),
        };
        let bytes = clear.encode().unwrap();
        assert_eq!(bytes, vec![2, 0, 2, 0, 0, 0, 1, 0, 3, 2]);
        assert_eq!(ClearEventRecords::decode(&bytes).unwrap(), clear);

        let all = ClearEventRecords {
            log: EventLogKind::Fatal,
            selector: ClearSelector::All,
        };
        assert_eq!(all.encode().unwrap(), vec![3, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_log_kind_parse() {
        assert_eq!("warn".parse::<EventLogKind>().unwrap(), EventLogKind::Warning);
        assert_eq!(EventLogKind::try_from(3).unwrap(), EventLogKind::Fatal);
        assert!(EventLogKind::try_from(4).is_err());
    }
}
