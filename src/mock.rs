//! Simulated controller for testing
//!
//! [`MockTransport`] plays the firmware side of the mailbox in-process. It
//! parses request frames, answers them from a small model of the device, and
//! queues the response frames for the host to read back. A cloneable
//! [`MockHandle`] shares the same state so tests can script link states,
//! seed telemetry, push notifications and inject bus faults.

use crate::device::FirmwareVersion;
use crate::error::{DecodeError, TransportError};
use crate::events::{ClearEventRecords, ClearSelector, EventLogEntry, EventLogKind, EventLogPage};
use crate::link::{LinkControlStatus, LinkStateReport};
use crate::mailbox::frame::{encode_response, RequestFrame, NOTIFICATION_TAG};
use crate::mailbox::{MailboxStatus, Opcode};
use crate::telemetry::codec::ByteReader;
use crate::telemetry::dimm::ts_raw;
use crate::telemetry::{
    ChannelCounters, CxlStats, CxlTelemetry, DatapathTelemetry, DdrPhyMargins, DdrTelemetry,
    DimmThermal, ErrInfo, ErrorInjection, MarginKind, MediaErrorRecord, PersistentData,
    PoisonList, PoisonSource, Record, RecordKind, RepairList, RepairRecord, ScrubConfig, SpdInfo,
    ThrottleConfig,
};
use crate::transport::Transport;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Links the simulated controller exposes
const MOCK_LINKS: u8 = 2;

/// Most poison records returned in one page
const MAX_POISON_PER_PAGE: usize = 32;

/// CSR holding the link control/status word of link 0
pub const CSR_LINK_CONTROL: u32 = 0x0010_0000;

/// Bus faults waiting to be applied to upcoming traffic
#[derive(Debug, Default)]
struct Faults {
    nack_sends: u32,
    corrupt: u32,
    drop: u32,
    busy: u32,
    wrong_opcode: u32,
    hold: bool,
}

/// A queued frame and how much of it the host has read
#[derive(Debug)]
struct Outgoing {
    tag: u8,
    bytes: Vec<u8>,
    read: usize,
}

impl Outgoing {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            tag: bytes[1],
            bytes,
            read: 0,
        }
    }
}

/// Device model answering mailbox commands
#[derive(Debug)]
struct Firmware {
    version: FirmwareVersion,
    csrs: BTreeMap<u32, u32>,
    link_scripts: BTreeMap<u8, VecDeque<LinkStateReport>>,
    link_last: BTreeMap<u8, LinkStateReport>,
    records: BTreeMap<(RecordKind, u8), Vec<u8>>,
    persistent: BTreeMap<u32, u32>,
    events: [Vec<EventLogEntry>; 4],
    event_cursor: [usize; 4],
    event_page_size: usize,
    poison: BTreeMap<u64, MediaErrorRecord>,
    scrub: ScrubConfig,
    throttle: ThrottleConfig,
    last_injection: Option<ErrorInjection>,
}

type FirmwareResult = Result<Vec<u8>, MailboxStatus>;

fn invalid(err: DecodeError) -> MailboxStatus {
    log::debug!("Simulated firmware rejecting request: {}", err);
    MailboxStatus::Error
}

impl Firmware {
    fn new() -> Self {
        let mut records = BTreeMap::new();
        for channel in 0..4u8 {
            let ddr = DdrTelemetry {
                read_ce: ChannelCounters {
                    sub_channels: [channel, 0, 0, 0],
                    channel,
                },
                refresh_count: 1_000_000 + u64::from(channel),
                read_activate_count: 42_000,
                precharge_count: 41_000,
                ..Default::default()
            };
            records.insert((RecordKind::DdrTelemetry, channel), ddr.to_framed());
            records.insert(
                (RecordKind::DatapathTelemetry, channel),
                DatapathTelemetry::default().to_framed(),
            );
        }
        for link in 0..MOCK_LINKS {
            let stats = CxlStats {
                link_bandwidth: [12_000, 11_500],
                ..Default::default()
            };
            records.insert((RecordKind::CxlStats, link), stats.to_framed());
            let telemetry = CxlTelemetry {
                clock_ticks: 1 << 32,
                ..Default::default()
            };
            records.insert((RecordKind::CxlTelemetry, link), telemetry.to_framed());
        }
        for dimm in 0..2u8 {
            let thermal = DimmThermal {
                dimm,
                sensor_count: 2,
                raw: [ts_raw(41.25), ts_raw(43.5)],
            };
            records.insert((RecordKind::DimmThermal, dimm), thermal.to_framed());
            let spd = SpdInfo {
                dies_per_package: 1,
                density_gb: 16,
                speed_max: 5600,
                speed_min: 3200,
                ranks: 2,
                capacity_gb: 64,
                channels: 2,
                channel_width: 32,
                io_width: 4,
                dimm_type: 1,
                ddr5_sdram: 1,
                manufacturer_id: 0x80ad,
                date_code_bcd: 0x2314,
                part_number: "HMCG88AGBRA191N".to_string(),
                manufacturing_location: 3,
                serial_number: 0x1000 + u32::from(dimm),
            };
            records.insert((RecordKind::SpdInfo, dimm), spd.to_framed());
        }
        let err_info = ErrInfo {
            correctable: 3,
            scrub_correctable: 1,
            ..Default::default()
        };
        records.insert((RecordKind::ErrInfo, 0), err_info.to_framed());

        let mut csrs = BTreeMap::new();
        csrs.insert(0x0000_0000, 0x1e8b_0001);
        csrs.insert(CSR_LINK_CONTROL, 0);

        Self {
            version: FirmwareVersion {
                fw_major: 1,
                fw_minor: 2,
                asic_major: 1,
                asic_minor: 0,
                build: 417,
            },
            csrs,
            link_scripts: BTreeMap::new(),
            link_last: BTreeMap::new(),
            records,
            persistent: BTreeMap::from([(1, 0x0001_0001), (3, 0)]),
            events: Default::default(),
            event_cursor: [0; 4],
            event_page_size: 4,
            poison: BTreeMap::new(),
            scrub: ScrubConfig {
                background_enable: true,
                background_timeout: 60,
                background_dpa_end: 0x10_0000_0000,
                background_round_interval: 12,
                background_cmd_interval: 8,
                ..Default::default()
            },
            throttle: ThrottleConfig::default(),
            last_injection: None,
        }
    }

    fn handle(&mut self, opcode: Opcode, payload: &[u8]) -> FirmwareResult {
        let mut reader = ByteReader::new(payload);
        match opcode {
            Opcode::Ping => Ok(payload.to_vec()),
            Opcode::GetVersion => Ok(self.version.encode()),
            Opcode::CsrRead => {
                let address = reader.u32().map_err(invalid)?;
                self.csrs
                    .get(&address)
                    .map(|value| value.to_le_bytes().to_vec())
                    .ok_or(MailboxStatus::Error)
            }
            Opcode::CsrWrite => {
                let address = reader.u32().map_err(invalid)?;
                let value = reader.u32().map_err(invalid)?;
                self.csrs.insert(address, value);
                Ok(Vec::new())
            }
            Opcode::GetLinkState => {
                let link = reader.u8().map_err(invalid)?;
                self.link_state(link).map(|report| report.encode())
            }
            Opcode::ReadTelemetry => {
                let kind = RecordKind::from_code(reader.u8().map_err(invalid)?).map_err(invalid)?;
                let index = reader.u8().map_err(invalid)?;
                self.telemetry(kind, index)
            }
            Opcode::ReadDimmThermal => {
                let dimm = reader.u8().map_err(invalid)?;
                self.stored(RecordKind::DimmThermal, dimm)
            }
            Opcode::ReadSpdInfo => {
                let dimm = reader.u8().map_err(invalid)?;
                self.stored(RecordKind::SpdInfo, dimm)
            }
            Opcode::ReadErrInfo => self.stored(RecordKind::ErrInfo, 0),
            Opcode::ReadPersistentData => {
                let id = reader.u32().map_err(invalid)?;
                let value = self.persistent.get(&id).copied().unwrap_or(0);
                Ok(PersistentData { id, value }.to_framed())
            }
            Opcode::ReadDdrPhyMargins => {
                let ddrc = reader.u8().map_err(invalid)?;
                let kind = MarginKind::try_from(reader.u8().map_err(invalid)?).map_err(invalid)?;
                let groups = (0..kind.group_count())
                    .map(|group| {
                        let base = ddrc.wrapping_mul(8).wrapping_add(20 + group as u8);
                        let lane = |i: u8| base.wrapping_add(i);
                        [[lane(0), lane(1), lane(2), lane(3)], [lane(4), lane(5), lane(6), lane(7)]]
                    })
                    .collect();
                Ok(DdrPhyMargins { kind, groups }.to_framed())
            }
            Opcode::RunSoftPpr => {
                let mut record = RepairRecord::decode_entry(&mut reader).map_err(invalid)?;
                reader.finish().map_err(invalid)?;
                record.status = crate::telemetry::repair::REPAIR_STATUS_SUCCESS;
                Ok(RepairList {
                    records: vec![record],
                }
                .to_framed())
            }
            Opcode::GetEventRecords => {
                let log = EventLogKind::try_from(reader.u8().map_err(invalid)?).map_err(invalid)?;
                Ok(self.event_page(log).to_framed())
            }
            Opcode::ClearEventRecords => {
                let request = ClearEventRecords::decode(payload).map_err(invalid)?;
                self.clear_events(request)
            }
            Opcode::GetPoisonList => {
                let start = reader.u64().map_err(invalid)?;
                let range = reader.u64().map_err(invalid)?;
                Ok(self.poison_page(start, range).to_framed())
            }
            Opcode::InjectPoison => {
                let dpa = reader.u64().map_err(invalid)?;
                self.poison.insert(
                    dpa,
                    MediaErrorRecord {
                        dpa,
                        source: PoisonSource::Injected,
                        length: 1,
                    },
                );
                Ok(Vec::new())
            }
            Opcode::ClearPoison => {
                let dpa = reader.u64().map_err(invalid)?;
                self.poison.remove(&dpa);
                Ok(Vec::new())
            }
            Opcode::SetScrubConfig => {
                self.scrub = ScrubConfig::decode(payload).map_err(invalid)?;
                Ok(Vec::new())
            }
            Opcode::GetScrubConfig => Ok(self.scrub.to_framed()),
            Opcode::InjectError => {
                self.last_injection = Some(ErrorInjection::decode(payload).map_err(invalid)?);
                Ok(Vec::new())
            }
            Opcode::SetThrottle => {
                self.throttle = ThrottleConfig::decode(payload).map_err(invalid)?;
                Ok(Vec::new())
            }
            Opcode::LinkStateNotify => Err(MailboxStatus::Rejected),
        }
    }

    fn link_state(&mut self, link: u8) -> Result<LinkStateReport, MailboxStatus> {
        if link >= MOCK_LINKS {
            return Err(MailboxStatus::Error);
        }
        if let Some(next) = self.link_scripts.get_mut(&link).and_then(VecDeque::pop_front) {
            self.link_last.insert(link, next);
        }
        Ok(self
            .link_last
            .get(&link)
            .copied()
            .unwrap_or_else(|| link_report(0x0, 0)))
    }

    fn telemetry(&self, kind: RecordKind, index: u8) -> FirmwareResult {
        match kind {
            RecordKind::ScrubConfig => Ok(self.scrub.to_framed()),
            RecordKind::ThrottleConfig => Ok(self.throttle.to_framed()),
            _ => self.stored(kind, index),
        }
    }

    fn stored(&self, kind: RecordKind, index: u8) -> FirmwareResult {
        self.records
            .get(&(kind, index))
            .cloned()
            .ok_or(MailboxStatus::Error)
    }

    fn event_page(&mut self, log: EventLogKind) -> EventLogPage {
        let slot = usize::from(log.code());
        let entries = &self.events[slot];
        let start = self.event_cursor[slot].min(entries.len());
        let end = (start + self.event_page_size).min(entries.len());
        let more_records = end < entries.len();
        self.event_cursor[slot] = if more_records { end } else { 0 };
        EventLogPage {
            more_records,
            entries: entries[start..end].to_vec(),
            ..Default::default()
        }
    }

    fn clear_events(&mut self, request: ClearEventRecords) -> FirmwareResult {
        let slot = usize::from(request.log.code());
        match request.selector {
            ClearSelector::All => self.events[slot].clear(),
            ClearSelector::Handles(handles) => {
                let log = &mut self.events[slot];
                if handles.iter().any(|h| !log.iter().any(|e| e.handle == *h)) {
                    return Err(MailboxStatus::Error);
                }
                log.retain(|e| !handles.contains(&e.handle));
            }
        }
        self.event_cursor[slot] = 0;
        Ok(Vec::new())
    }

    fn poison_page(&self, start: u64, range: u64) -> PoisonList {
        let end = start.saturating_add(range);
        let matching: Vec<MediaErrorRecord> = self
            .poison
            .range(start..end)
            .map(|(_, record)| *record)
            .collect();
        PoisonList {
            more_records: matching.len() > MAX_POISON_PER_PAGE,
            records: matching.into_iter().take(MAX_POISON_PER_PAGE).collect(),
            ..Default::default()
        }
    }
}

/// Report the simulated firmware returns for a given state
fn link_report(ltssm: u8, timestamp: u64) -> LinkStateReport {
    let mut control_status = LinkControlStatus(0);
    if ltssm == 0x6 {
        control_status.set_current_speed(5);
        control_status.set_negotiated_width(16);
        control_status.set_dll_link_active(true);
    } else if ltssm != 0x0 {
        control_status.set_link_training(true);
    }
    LinkStateReport {
        ltssm,
        recovery_count: 0,
        timestamp,
        control_status,
    }
}

#[derive(Debug)]
struct MockState {
    firmware: Firmware,
    faults: Faults,
    outbox: VecDeque<Outgoing>,
    held: Option<Vec<u8>>,
    requests: Vec<u8>,
    overlaps: usize,
}

impl MockState {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.faults.nack_sends > 0 {
            self.faults.nack_sends -= 1;
            return Err(TransportError::Nack);
        }
        let request = match RequestFrame::decode(bytes) {
            Ok(request) => request,
            Err(err) => {
                // Real firmware ignores frames it cannot parse.
                log::debug!("Simulated firmware dropping request: {}", err);
                return Ok(());
            }
        };

        if self.outbox.iter().any(|frame| frame.tag != NOTIFICATION_TAG) {
            self.overlaps += 1;
        }
        self.requests.push(request.opcode);
        if let Some(late) = self.held.take() {
            self.outbox.push_back(Outgoing::new(late));
        }

        let response = self.respond(&request);

        if self.faults.drop > 0 {
            self.faults.drop -= 1;
            return Ok(());
        }
        if self.faults.hold {
            self.faults.hold = false;
            self.held = Some(response);
            return Ok(());
        }
        let mut response = response;
        if self.faults.corrupt > 0 {
            self.faults.corrupt -= 1;
            if let Some(pec) = response.last_mut() {
                *pec ^= 0xff;
            }
        }
        self.outbox.push_back(Outgoing::new(response));
        Ok(())
    }

    fn respond(&mut self, request: &RequestFrame) -> Vec<u8> {
        if self.faults.busy > 0 {
            self.faults.busy -= 1;
            return encode_response(request.opcode, request.tag, MailboxStatus::Pending, &[]);
        }
        if self.faults.wrong_opcode > 0 {
            self.faults.wrong_opcode -= 1;
            return encode_response(request.opcode ^ 0x80, request.tag, MailboxStatus::Success, &[]);
        }
        let outcome = match Opcode::try_from(request.opcode) {
            Ok(opcode) => self.firmware.handle(opcode, &request.payload),
            Err(_) => Err(MailboxStatus::Rejected),
        };
        match outcome {
            Ok(payload) => {
                encode_response(request.opcode, request.tag, MailboxStatus::Success, &payload)
            }
            Err(status) => encode_response(request.opcode, request.tag, status, &[]),
        }
    }

    fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let frame = self.outbox.front_mut().ok_or(TransportError::Timeout)?;
        let end = (frame.read + max_len).min(frame.bytes.len());
        let chunk = frame.bytes[frame.read..end].to_vec();
        frame.read = end;
        if frame.read == frame.bytes.len() {
            self.outbox.pop_front();
        }
        Ok(chunk)
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport backed by the simulated firmware
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a transport and a handle sharing its state
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            firmware: Firmware::new(),
            faults: Faults::default(),
            outbox: VecDeque::new(),
            held: None,
            requests: Vec::new(),
            overlaps: 0,
        }));
        let handle = MockHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }

    /// Simulated device with a trained link and a few logged events,
    /// used by `--simulate`
    pub fn demo() -> (Self, MockHandle) {
        let (transport, handle) = Self::new();
        handle.script_link_states(
            0,
            &[(0x1, 100), (0x5, 200), (0x7, 300), (0x6, 400)],
        );
        handle.push_event(EventLogKind::Warning, demo_event(1, 1_700_000_000_000_000_000));
        handle.push_event(EventLogKind::Warning, demo_event(2, 1_700_000_060_000_000_000));
        handle.set_persistent(3, 0x0000_0001);
        {
            let mut state = handle.lock();
            state.firmware.poison.insert(
                0x4_0000,
                MediaErrorRecord {
                    dpa: 0x4_0000,
                    source: PoisonSource::Internal,
                    length: 1,
                },
            );
        }
        (transport, handle)
    }
}

fn demo_event(handle: u16, timestamp: u64) -> EventLogEntry {
    use crate::events::{DramEvent, EventCategory, EventDescriptor, RecordFlags, DRAM_UUID};

    EventLogEntry {
        uuid: DRAM_UUID,
        flags: RecordFlags::default(),
        handle,
        related_handle: 0,
        timestamp,
        maintenance_class: 0,
        category: EventCategory::Dram(DramEvent {
            dpa: 0x4_0000 + u64::from(handle) * 64,
            descriptor: EventDescriptor {
                threshold: true,
                ..Default::default()
            },
            event_type: 0,
            transaction_type: 1,
            validity: 0x3,
            channel: 0,
            rank: 1,
            nibble_mask: 0x10,
            bank_group: 2,
            bank: 1,
            row: 0x1a2b,
            column: 0x40,
            correction_mask: [0; 32],
        }),
    }
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        lock(&self.state).send(bytes)
    }

    fn receive(&mut self, max_len: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        lock(&self.state).receive(max_len)
    }

    fn describe(&self) -> String {
        "simulated controller".to_string()
    }
}

/// Test-side control over a [`MockTransport`]
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Flip the pec of the next `n` responses
    pub fn corrupt_next_responses(&self, n: u32) {
        self.lock().faults.corrupt = n;
    }

    /// Process but never answer the next `n` requests
    pub fn drop_next_responses(&self, n: u32) {
        self.lock().faults.drop = n;
    }

    /// Refuse the next `n` bus writes
    pub fn nack_next_sends(&self, n: u32) {
        self.lock().faults.nack_sends = n;
    }

    /// Answer the next `n` requests with a pending status
    pub fn busy_next_responses(&self, n: u32) {
        self.lock().faults.busy = n;
    }

    pub fn wrong_opcode_next_responses(&self, n: u32) {
        self.lock().faults.wrong_opcode = n;
    }

    /// Withhold the next response until another request is sent
    pub fn hold_next_response(&self) {
        self.lock().faults.hold = true;
    }

    /// Queue an unsolicited link-state frame
    pub fn notify_link_state(&self, link: u8, ltssm: u8, timestamp: u64) {
        let mut payload = vec![link];
        payload.extend(link_report(ltssm, timestamp).encode());
        let frame = encode_response(
            Opcode::LinkStateNotify.code(),
            NOTIFICATION_TAG,
            MailboxStatus::Success,
            &payload,
        );
        self.lock().outbox.push_back(Outgoing::new(frame));
    }

    /// Queue a link-state frame whose pec does not match
    pub fn notify_corrupt_link_state(&self, link: u8, ltssm: u8, timestamp: u64) {
        let mut payload = vec![link];
        payload.extend(link_report(ltssm, timestamp).encode());
        let mut frame = encode_response(
            Opcode::LinkStateNotify.code(),
            NOTIFICATION_TAG,
            MailboxStatus::Success,
            &payload,
        );
        if let Some(pec) = frame.last_mut() {
            *pec ^= 0xff;
        }
        self.lock().outbox.push_back(Outgoing::new(frame));
    }

    /// Queue `(ltssm, timestamp)` answers for upcoming `GetLinkState` reads
    ///
    /// Once the script runs out the last state keeps being reported.
    pub fn script_link_states(&self, link: u8, states: &[(u8, u64)]) {
        let mut state = self.lock();
        let script = state.firmware.link_scripts.entry(link).or_default();
        script.extend(states.iter().map(|&(ltssm, ts)| link_report(ltssm, ts)));
    }

    /// Replace the record returned for `(R::KIND, index)`
    pub fn set_record<R: Record>(&self, index: u8, record: &R) {
        self.lock()
            .firmware
            .records
            .insert((R::KIND, index), record.to_framed());
    }

    pub fn set_persistent(&self, id: u32, value: u32) {
        self.lock().firmware.persistent.insert(id, value);
    }

    pub fn version(&self) -> FirmwareVersion {
        self.lock().firmware.version
    }

    pub fn set_version(&self, version: FirmwareVersion) {
        self.lock().firmware.version = version;
    }

    pub fn push_event(&self, log: EventLogKind, entry: EventLogEntry) {
        self.lock().firmware.events[usize::from(log.code())].push(entry);
    }

    /// Records returned per Get Event Records page
    pub fn set_event_page_size(&self, size: usize) {
        self.lock().firmware.event_page_size = size.max(1);
    }

    pub fn last_error_injection(&self) -> Option<ErrorInjection> {
        self.lock().firmware.last_injection
    }

    /// Requests the firmware accepted, of any opcode
    pub fn requests_seen(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests_for(&self, opcode: Opcode) -> usize {
        let code = opcode.code();
        self.lock().requests.iter().filter(|&&op| op == code).count()
    }

    /// Requests sent while an earlier response was still unread
    pub fn overlapping_requests(&self) -> usize {
        self.lock().overlaps
    }
}
