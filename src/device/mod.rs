//! Device handle
//!
//! A [`Device`] is the exclusive owner of one controller's mailbox session,
//! its links, the firmware version cache, the latest telemetry snapshot per
//! record kind and a bounded journal of event records read from the device.

pub mod registry;

pub use registry::DeviceRegistry;

use crate::error::{DecodeError, DeviceError, ProtocolError, StateError};
use crate::events::{
    ClearEventRecords, ClearSelector, EventLogEntry, EventLogKind, EventLogPage,
};
use crate::link::{
    Bifurcation, LaneMarginInfo, Link, LinkStateReport, LtssmEntry, RingBuffer,
    LINK_STATE_REPORT_LEN,
};
use crate::mailbox::{MailboxEngine, MailboxStats, Opcode, RetryPolicy};
use crate::telemetry::codec::ByteReader;
use crate::telemetry::{
    decode_framed, decode_framed_as, CxlStats, CxlTelemetry, DatapathTelemetry, DdrPhyMargins,
    DdrTelemetry, DimmThermal, ErrInfo, ErrorInjection, MarginKind, PersistentData, PoisonList,
    Record, RecordKind, RepairList, RepairRecord, ScrubConfig, SpdInfo, TelemetryRecord,
    ThrottleConfig,
};
use crate::transport::Transport;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Poison and scrub addresses are cache-line granular
const DPA_ALIGNMENT: u64 = 64;

/// How long to listen for queued notifications
const NOTIFICATION_WAIT: Duration = Duration::from_millis(5);

/// Bus number and 7-bit target address of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceAddress {
    pub bus: u8,
    pub address: u8,
}

impl DeviceAddress {
    pub fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#04x}", self.bus, self.address)
    }
}

/// Firmware and ASIC revision block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub fw_major: u8,
    pub fw_minor: u8,
    pub asic_major: u8,
    pub asic_minor: u8,
    pub build: u32,
}

impl FirmwareVersion {
    pub const LEN: usize = 8;

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let version = Self {
            fw_major: reader.u8()?,
            fw_minor: reader.u8()?,
            asic_major: reader.u8()?,
            asic_minor: reader.u8()?,
            build: reader.u32()?,
        };
        reader.finish()?;
        Ok(version)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.fw_major, self.fw_minor, self.asic_major, self.asic_minor];
        out.extend_from_slice(&self.build.to_le_bytes());
        out
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} build {} (ASIC {}.{})",
            self.fw_major, self.fw_minor, self.build, self.asic_major, self.asic_minor
        )
    }
}

/// Event record as kept in the host-side journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub log: EventLogKind,
    pub entry: EventLogEntry,
}

/// Settings applied when a device is opened
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub bifurcation: Bifurcation,
    pub retry: RetryPolicy,
    pub history_capacity: usize,
    pub journal_capacity: usize,
    /// Upper bound on pages fetched by one `event_records` call
    pub max_event_pages: usize,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            bifurcation: Bifurcation::X16,
            retry: RetryPolicy::default(),
            history_capacity: 64,
            journal_capacity: 256,
            max_event_pages: 16,
        }
    }
}

/// Handle to one controller
pub struct Device<T: Transport> {
    address: DeviceAddress,
    engine: MailboxEngine<T>,
    links: Vec<Link>,
    version: Option<FirmwareVersion>,
    snapshot: BTreeMap<RecordKind, TelemetryRecord>,
    journal: RingBuffer<JournalEntry>,
    max_event_pages: usize,
    /// Notification entries held back by a failed `process_notifications`
    unreported: Vec<(usize, LtssmEntry)>,
}

impl<T: Transport> Device<T> {
    /// Take ownership of `transport` and read the firmware version
    pub fn open(
        address: DeviceAddress,
        transport: T,
        options: DeviceOptions,
    ) -> Result<Self, DeviceError> {
        let links = options
            .bifurcation
            .link_configs()
            .into_iter()
            .map(|config| Link::new(config, options.history_capacity))
            .collect::<Result<Vec<_>, _>>()?;
        let journal = RingBuffer::new(options.journal_capacity)?;
        if options.max_event_pages == 0 {
            return Err(DeviceError::InvalidArgument(
                "max_event_pages must be at least 1".to_string(),
            ));
        }

        log::debug!("Opening device {} over {}", address, transport.describe());

        let mut device = Self {
            address,
            engine: MailboxEngine::new(transport, options.retry),
            links,
            version: None,
            snapshot: BTreeMap::new(),
            journal,
            max_event_pages: options.max_event_pages,
            unreported: Vec::new(),
        };

        let version = device.firmware_version()?;
        log::info!(
            "Device {} firmware {} ({} link(s))",
            address,
            version,
            device.links.len()
        );
        Ok(device)
    }

    /// Release the device and return its transport
    pub fn close(self) -> T {
        log::debug!("Closing device {}", self.address);
        self.engine.into_transport()
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Mailbox engine; shareable across threads for raw commands
    pub fn engine(&self) -> &MailboxEngine<T> {
        &self.engine
    }

    pub fn mailbox_stats(&self) -> MailboxStats {
        self.engine.stats()
    }

    /// Echo `payload` through the firmware and return the round-trip time
    pub fn ping(&self, payload: &[u8]) -> Result<Duration, DeviceError> {
        let start = Instant::now();
        let echo = self.engine.execute(Opcode::Ping, payload)?;
        if echo != payload {
            return Err(ProtocolError::MalformedFrame(format!(
                "ping echo differs: sent {} bytes, got {}",
                payload.len(),
                echo.len()
            ))
            .into());
        }
        Ok(start.elapsed())
    }

    // Version and CSR access

    /// Cached firmware version; read from the device on first use
    pub fn firmware_version(&mut self) -> Result<FirmwareVersion, DeviceError> {
        match self.version {
            Some(version) => Ok(version),
            None => self.refresh_version(),
        }
    }

    /// Re-read the firmware version, replacing the cache
    pub fn refresh_version(&mut self) -> Result<FirmwareVersion, DeviceError> {
        let payload = self.engine.execute(Opcode::GetVersion, &[])?;
        let version = FirmwareVersion::decode(&payload)?;
        self.version = Some(version);
        Ok(version)
    }

    pub fn read_csr(&self, address: u32) -> Result<u32, DeviceError> {
        let payload = self.engine.execute(Opcode::CsrRead, &address.to_le_bytes())?;
        let mut reader = ByteReader::new(&payload);
        let value = reader.u32()?;
        reader.finish()?;
        Ok(value)
    }

    pub fn write_csr(&mut self, address: u32, value: u32) -> Result<(), DeviceError> {
        let mut payload = address.to_le_bytes().to_vec();
        payload.extend_from_slice(&value.to_le_bytes());
        self.execute(Opcode::CsrWrite, &payload)?;
        Ok(())
    }

    /// Run one transaction; a completed write drops the version cache
    fn execute(&mut self, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let response = self.engine.execute(opcode, payload)?;
        if opcode.is_write() && self.version.take().is_some() {
            log::debug!("Device {}: {} invalidated version cache", self.address, opcode);
        }
        Ok(response)
    }

    // Links

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, index: usize) -> Result<&Link, StateError> {
        self.links.get(index).ok_or(StateError::LinkNotFound {
            index,
            count: self.links.len(),
        })
    }

    fn link_mut(&mut self, index: usize) -> Result<&mut Link, StateError> {
        let count = self.links.len();
        self.links
            .get_mut(index)
            .ok_or(StateError::LinkNotFound { index, count })
    }

    fn read_link_state(&self, index: usize) -> Result<LinkStateReport, DeviceError> {
        let payload = self.engine.execute(Opcode::GetLinkState, &[index as u8])?;
        Ok(LinkStateReport::decode(&payload)?)
    }

    /// Read one link's state and record it; `None` if it was a duplicate
    pub fn poll_link(&mut self, index: usize) -> Result<Option<LtssmEntry>, DeviceError> {
        self.link(index)?;
        let report = self.read_link_state(index)?;
        Ok(self.link_mut(index)?.apply_report(&report)?)
    }

    /// Poll every link in index order
    pub fn poll_links(&mut self) -> Result<Vec<Option<LtssmEntry>>, DeviceError> {
        (0..self.links.len()).map(|index| self.poll_link(index)).collect()
    }

    /// Read a link `reads` times in one cycle and record only the last read
    pub fn observe_cycle(
        &mut self,
        index: usize,
        reads: usize,
    ) -> Result<Option<LtssmEntry>, DeviceError> {
        self.link(index)?;
        let reports = (0..reads)
            .map(|_| self.read_link_state(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.link_mut(index)?.apply_cycle(&reports)?)
    }

    /// Apply link-state notifications pushed by the device
    ///
    /// Returns the history entries that were added. Every well-formed
    /// notification is applied even when others in the same batch are not;
    /// the first bad one (undecodable payload, unknown link or unknown LTSSM
    /// value) is then returned as the error, and the entries added alongside
    /// it are handed back by the next successful call.
    pub fn process_notifications(&mut self) -> Result<Vec<(usize, LtssmEntry)>, DeviceError> {
        let notifications = self.engine.poll_notifications(NOTIFICATION_WAIT)?;
        let mut added = std::mem::take(&mut self.unreported);
        let mut first_error: Option<DeviceError> = None;

        for notification in notifications {
            if notification.opcode != Opcode::LinkStateNotify.code() {
                log::warn!(
                    "Ignoring notification with opcode {:#04x}",
                    notification.opcode
                );
                continue;
            }
            match self.apply_notification(&notification.payload) {
                Ok(Some(entry)) => added.push(entry),
                Ok(None) => {}
                Err(err) => {
                    log::warn!("Rejected link notification: {}", err);
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => {
                self.unreported = added;
                Err(err)
            }
            None => Ok(added),
        }
    }

    fn apply_notification(
        &mut self,
        payload: &[u8],
    ) -> Result<Option<(usize, LtssmEntry)>, DeviceError> {
        let (index, report) = decode_link_notification(payload)?;
        let entry = self.link_mut(index)?.apply_report(&report)?;
        Ok(entry.map(|entry| (index, entry)))
    }

    /// Decode a 12-byte lane margining block and store it on link `index`
    pub fn record_lane_margin(
        &mut self,
        index: usize,
        lane: u8,
        raw: &[u8],
    ) -> Result<LaneMarginInfo, DeviceError> {
        let info = LaneMarginInfo::decode(raw)?;
        self.link_mut(index)?.record_lane_margin(lane, info)?;
        Ok(info)
    }

    pub fn ltssm_history(&self, index: usize) -> Result<Vec<LtssmEntry>, StateError> {
        Ok(self.link(index)?.history())
    }

    // Telemetry

    fn remember(&mut self, record: TelemetryRecord) {
        self.snapshot.insert(record.kind(), record);
    }

    fn fetch<R>(&mut self, opcode: Opcode, payload: &[u8]) -> Result<R, DeviceError>
    where
        R: Record + Clone + Into<TelemetryRecord>,
    {
        let response = self.execute(opcode, payload)?;
        let record = decode_framed_as::<R>(&response)?;
        self.remember(record.clone().into());
        Ok(record)
    }

    /// Read any record kind through the generic telemetry command
    pub fn read_telemetry(
        &mut self,
        kind: RecordKind,
        index: u8,
    ) -> Result<TelemetryRecord, DeviceError> {
        let response = self
            .engine
            .execute(Opcode::ReadTelemetry, &[kind.code(), index])?;
        let record = decode_framed(&response)?;
        if record.kind() != kind {
            return Err(DeviceError::UnexpectedRecord {
                expected: kind,
                actual: record.kind(),
            });
        }
        self.remember(record.clone());
        Ok(record)
    }

    pub fn ddr_telemetry(&mut self, channel: u8) -> Result<DdrTelemetry, DeviceError> {
        self.fetch(Opcode::ReadTelemetry, &[RecordKind::DdrTelemetry.code(), channel])
    }

    pub fn cxl_stats(&mut self, link: u8) -> Result<CxlStats, DeviceError> {
        self.fetch(Opcode::ReadTelemetry, &[RecordKind::CxlStats.code(), link])
    }

    pub fn cxl_telemetry(&mut self, link: u8) -> Result<CxlTelemetry, DeviceError> {
        self.fetch(Opcode::ReadTelemetry, &[RecordKind::CxlTelemetry.code(), link])
    }

    pub fn datapath_telemetry(&mut self, channel: u8) -> Result<DatapathTelemetry, DeviceError> {
        self.fetch(
            Opcode::ReadTelemetry,
            &[RecordKind::DatapathTelemetry.code(), channel],
        )
    }

    pub fn dimm_thermal(&mut self, dimm: u8) -> Result<DimmThermal, DeviceError> {
        self.fetch(Opcode::ReadDimmThermal, &[dimm])
    }

    pub fn spd_info(&mut self, dimm: u8) -> Result<SpdInfo, DeviceError> {
        self.fetch(Opcode::ReadSpdInfo, &[dimm])
    }

    pub fn ddr_phy_margins(
        &mut self,
        ddrc: u8,
        kind: MarginKind,
    ) -> Result<DdrPhyMargins, DeviceError> {
        let margins: DdrPhyMargins = self.fetch(Opcode::ReadDdrPhyMargins, &[ddrc, kind.code()])?;
        if margins.kind != kind {
            return Err(DecodeError::InvalidField {
                field: "margin_kind",
                value: u64::from(margins.kind.code()),
            }
            .into());
        }
        Ok(margins)
    }

    pub fn throttle_config(&mut self) -> Result<ThrottleConfig, DeviceError> {
        self.fetch(
            Opcode::ReadTelemetry,
            &[RecordKind::ThrottleConfig.code(), 0],
        )
    }

    pub fn set_throttle(&mut self, config: &ThrottleConfig) -> Result<(), DeviceError> {
        config.validate()?;
        self.execute(Opcode::SetThrottle, &config.encode())?;
        self.remember((*config).into());
        Ok(())
    }

    pub fn err_info(&mut self) -> Result<ErrInfo, DeviceError> {
        self.fetch(Opcode::ReadErrInfo, &[])
    }

    /// Persistent counter by id; always read from the device
    pub fn persistent_data(&mut self, id: u32) -> Result<PersistentData, DeviceError> {
        let data: PersistentData = self.fetch(Opcode::ReadPersistentData, &id.to_le_bytes())?;
        if data.id != id {
            return Err(DecodeError::InvalidField {
                field: "persistent_id",
                value: u64::from(data.id),
            }
            .into());
        }
        Ok(data)
    }

    /// Latest record of each kind read through this handle
    pub fn telemetry_snapshot(&self) -> Vec<&TelemetryRecord> {
        self.snapshot.values().collect()
    }

    // Event log

    /// Read a log, following the more-records flag up to the page bound
    pub fn event_records(&mut self, log: EventLogKind) -> Result<Vec<EventLogEntry>, DeviceError> {
        let mut entries = Vec::new();
        for page_index in 0..self.max_event_pages {
            let page: EventLogPage = self.fetch(Opcode::GetEventRecords, &[log.code()])?;
            if page.overflow {
                log::warn!(
                    "Device {} {} log overflowed ({} events lost)",
                    self.address,
                    log,
                    page.overflow_error_count
                );
            }
            let more = page.more_records;
            for entry in page.entries {
                self.journal_insert(log, &entry);
                entries.push(entry);
            }
            if !more {
                break;
            }
            if page_index + 1 == self.max_event_pages {
                log::warn!(
                    "Device {} {} log has more records than the {}-page limit",
                    self.address,
                    log,
                    self.max_event_pages
                );
            }
        }
        Ok(entries)
    }

    fn journal_insert(&mut self, log: EventLogKind, entry: &EventLogEntry) {
        let seen = self
            .journal
            .iter()
            .any(|j| j.log == log && j.entry.handle == entry.handle && j.entry.timestamp == entry.timestamp);
        if !seen {
            self.journal.push(JournalEntry {
                log,
                entry: entry.clone(),
            });
        }
    }

    pub fn clear_event_records(
        &mut self,
        log: EventLogKind,
        selector: ClearSelector,
    ) -> Result<(), DeviceError> {
        let request = ClearEventRecords { log, selector }.encode()?;
        self.execute(Opcode::ClearEventRecords, &request)?;
        Ok(())
    }

    /// Host-side copy of every event record read, oldest first
    pub fn event_journal(&self) -> Vec<JournalEntry> {
        self.journal.to_vec()
    }

    // Poison, repair, scrub and error injection

    pub fn poison_list(&mut self, dpa: u64, range: u64) -> Result<PoisonList, DeviceError> {
        check_alignment(dpa)?;
        let mut payload = dpa.to_le_bytes().to_vec();
        payload.extend_from_slice(&range.to_le_bytes());
        self.fetch(Opcode::GetPoisonList, &payload)
    }

    pub fn inject_poison(&mut self, dpa: u64) -> Result<(), DeviceError> {
        check_alignment(dpa)?;
        self.execute(Opcode::InjectPoison, &dpa.to_le_bytes())?;
        log::info!("Device {}: poison injected at {:#x}", self.address, dpa);
        Ok(())
    }

    pub fn clear_poison(&mut self, dpa: u64) -> Result<(), DeviceError> {
        check_alignment(dpa)?;
        self.execute(Opcode::ClearPoison, &dpa.to_le_bytes())?;
        Ok(())
    }

    /// Run a soft post-package repair and return the firmware's outcome
    pub fn run_soft_ppr(&mut self, request: &RepairRecord) -> Result<RepairRecord, DeviceError> {
        let list: RepairList = self.fetch(Opcode::RunSoftPpr, &request.to_request())?;
        match list.records.as_slice() {
            [outcome] => Ok(*outcome),
            other => Err(DecodeError::CountOverflow {
                count: other.len(),
                capacity: 1,
            }
            .into()),
        }
    }

    pub fn scrub_config(&mut self) -> Result<ScrubConfig, DeviceError> {
        self.fetch(Opcode::GetScrubConfig, &[])
    }

    pub fn set_scrub_config(&mut self, config: &ScrubConfig) -> Result<(), DeviceError> {
        config.validate()?;
        self.execute(Opcode::SetScrubConfig, &config.encode())?;
        self.remember((*config).into());
        Ok(())
    }

    pub fn inject_error(&mut self, injection: &ErrorInjection) -> Result<(), DeviceError> {
        injection.validate()?;
        self.execute(Opcode::InjectError, &injection.encode())?;
        Ok(())
    }
}

fn check_alignment(dpa: u64) -> Result<(), DeviceError> {
    if dpa % DPA_ALIGNMENT != 0 {
        return Err(DeviceError::InvalidArgument(format!(
            "DPA {:#x} is not {}-byte aligned",
            dpa, DPA_ALIGNMENT
        )));
    }
    Ok(())
}

/// Split a `LinkStateNotify` payload into link index and report
pub fn decode_link_notification(payload: &[u8]) -> Result<(usize, LinkStateReport), DecodeError> {
    let mut reader = ByteReader::new(payload);
    let index = usize::from(reader.u8()?);
    let report = LinkStateReport::decode(reader.take(LINK_STATE_REPORT_LEN)?)?;
    reader.finish()?;
    Ok((index, report))
}
