//! LTSSM history tracking
//!
//! The tracker only records what the device reports; it never infers
//! transitions. Repeated reports of the same state are folded unless the
//! device timestamp shows that time has moved on.

use crate::error::{DecodeError, StateError};
use crate::link::history::RingBuffer;
use crate::link::registers::LinkControlStatus;
use crate::link::state::LtssmState;
use crate::telemetry::codec::ByteReader;

use serde::Serialize;

/// Size of the link-state report returned by `GetLinkState`
pub const LINK_STATE_REPORT_LEN: usize = 16;

/// One observation of a link's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateReport {
    pub state: LtssmState,
    /// Firmware timestamp; `None` when the source carries none
    pub device_timestamp: Option<u64>,
}

impl StateReport {
    pub fn new(state: LtssmState, device_timestamp: Option<u64>) -> Self {
        Self {
            state,
            device_timestamp,
        }
    }
}

/// Link-state report as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStateReport {
    pub ltssm: u8,
    pub recovery_count: u16,
    /// Firmware timestamp; zero when the firmware does not stamp reports
    pub timestamp: u64,
    pub control_status: LinkControlStatus,
}

impl LinkStateReport {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let ltssm = reader.u8()?;
        reader.skip(1)?;
        let recovery_count = reader.u16()?;
        let timestamp = reader.u64()?;
        let control_status = LinkControlStatus(reader.u32()?);
        reader.finish()?;
        Ok(Self {
            ltssm,
            recovery_count,
            timestamp,
            control_status,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LINK_STATE_REPORT_LEN);
        out.push(self.ltssm);
        out.push(0);
        out.extend_from_slice(&self.recovery_count.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.control_status.raw().to_le_bytes());
        out
    }

    /// Validate the state byte and build a tracker observation
    pub fn to_state_report(&self) -> Result<StateReport, StateError> {
        let state = LtssmState::from_raw(self.ltssm)?;
        let device_timestamp = (self.timestamp != 0).then_some(self.timestamp);
        Ok(StateReport::new(state, device_timestamp))
    }
}

/// One accepted history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LtssmEntry {
    pub state: LtssmState,
    pub device_timestamp: Option<u64>,
    /// Monotonic sequence number assigned by the tracker
    pub sequence: u64,
}

/// Current state plus bounded history for one link
#[derive(Debug, Clone)]
pub struct LinkTracker {
    link: usize,
    current: LtssmState,
    history: RingBuffer<LtssmEntry>,
    next_sequence: u64,
    dropped: u64,
}

impl LinkTracker {
    pub fn new(link: usize, capacity: usize) -> Result<Self, StateError> {
        Ok(Self {
            link,
            current: LtssmState::Reset,
            history: RingBuffer::new(capacity)?,
            next_sequence: 0,
            dropped: 0,
        })
    }

    /// Latest reported state (`Reset` before any report)
    pub fn current(&self) -> LtssmState {
        self.current
    }

    /// Record a report; returns the new entry, or `None` if it was a duplicate
    pub fn observe(&mut self, report: StateReport) -> Option<&LtssmEntry> {
        if let Some(last) = self.history.last() {
            if last.state == report.state && !advanced(last.device_timestamp, report.device_timestamp)
            {
                self.dropped += 1;
                log::debug!("Link {}: duplicate {} report dropped", self.link, report.state);
                return None;
            }
        }

        if report.state != self.current {
            log::info!("Link {}: {} -> {}", self.link, self.current, report.state);
        }
        self.current = report.state;

        let entry = LtssmEntry {
            state: report.state,
            device_timestamp: report.device_timestamp,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.history.push(entry);
        self.history.last()
    }

    /// Apply one poll cycle; only the most recent read counts
    pub fn observe_cycle(&mut self, reads: &[StateReport]) -> Option<&LtssmEntry> {
        let latest = *reads.last()?;
        self.observe(latest)
    }

    /// History, oldest first
    pub fn history(&self) -> Vec<LtssmEntry> {
        self.history.to_vec()
    }

    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Reports folded as duplicates so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

fn advanced(previous: Option<u64>, next: Option<u64>) -> bool {
    match (previous, next) {
        (Some(previous), Some(next)) => next > previous,
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LtssmState::*;

    fn states(tracker: &LinkTracker) -> Vec<LtssmState> {
        tracker.history().iter().map(|e| e.state).collect()
    }

    #[test]
    fn test_initial_state_is_reset() {
        let tracker = LinkTracker::new(0, 4).unwrap();
        assert_eq!(tracker.current(), Reset);
        assert!(tracker.history().is_empty());
    }

    #[test]
    fn test_untimed_duplicates_are_folded() {
        let mut tracker = LinkTracker::new(0, 8).unwrap();
        for state in [Reset, Reset, DetectOrDeskew, Forward] {
            tracker.observe(StateReport::new(state, None));
        }
        assert_eq!(states(&tracker), vec![Reset, DetectOrDeskew, Forward]);
        assert_eq!(tracker.current(), Forward);
        assert_eq!(tracker.dropped(), 1);
    }

    #[test]
    fn test_same_timestamp_duplicate_is_folded() {
        let mut tracker = LinkTracker::new(0, 8).unwrap();
        let reports = [
            (DetectOrDeskew, 10),
            (Forward, 20),
            (Forward, 20),
            (HotPlug, 30),
        ];
        for (state, ts) in reports {
            tracker.observe(StateReport::new(state, Some(ts)));
        }
        assert_eq!(states(&tracker), vec![DetectOrDeskew, Forward, HotPlug]);
    }

    #[test]
    fn test_advanced_timestamp_keeps_repeat() {
        let mut tracker = LinkTracker::new(0, 8).unwrap();
        assert!(tracker.observe(StateReport::new(Forward, Some(5))).is_some());
        assert!(tracker.observe(StateReport::new(Forward, Some(6))).is_some());
        assert!(tracker.observe(StateReport::new(Forward, Some(6))).is_none());
        assert!(tracker.observe(StateReport::new(Forward, None)).is_none());
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn test_first_timestamp_counts_as_advance() {
        let mut tracker = LinkTracker::new(0, 8).unwrap();
        tracker.observe(StateReport::new(Forward, None));
        assert!(tracker.observe(StateReport::new(Forward, Some(1))).is_some());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = LinkTracker::new(1, 3).unwrap();
        for (ts, state) in [Reset, DetectOrDeskew, EqP2_0, EqP3_0, Forward]
            .into_iter()
            .enumerate()
        {
            tracker.observe(StateReport::new(state, Some(ts as u64 + 1)));
        }
        assert_eq!(states(&tracker), vec![EqP2_0, EqP3_0, Forward]);
        let sequences: Vec<u64> = tracker.history().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn test_cycle_applies_only_latest_read() {
        let mut tracker = LinkTracker::new(0, 8).unwrap();
        let cycle = [
            StateReport::new(DetectOrDeskew, Some(1)),
            StateReport::new(EqP2_0, Some(2)),
            StateReport::new(Forward, Some(3)),
        ];
        let entry = tracker.observe_cycle(&cycle).copied();
        assert_eq!(entry.map(|e| e.state), Some(Forward));
        assert_eq!(states(&tracker), vec![Forward]);
        assert!(tracker.observe_cycle(&[]).is_none());
    }

    #[test]
    fn test_zero_capacity() {
        assert_eq!(
            LinkTracker::new(0, 0).unwrap_err(),
            StateError::ZeroCapacity
        );
    }

    #[test]
    fn test_report_wire_layout() {
        let report = LinkStateReport {
            ltssm: 0x6,
            recovery_count: 3,
            timestamp: 0x0102_0304,
            control_status: LinkControlStatus(0x3105_0040),
        };
        let bytes = report.encode();
        assert_eq!(bytes.len(), LINK_STATE_REPORT_LEN);
        assert_eq!(&bytes[..4], &[0x06, 0x00, 0x03, 0x00]);
        assert_eq!(LinkStateReport::decode(&bytes).unwrap(), report);
    }

    #[test]
    fn test_report_validation() {
        let mut report = LinkStateReport {
            ltssm: 0x1f,
            recovery_count: 0,
            timestamp: 0,
            control_status: LinkControlStatus(0),
        };
        assert_eq!(
            report.to_state_report(),
            Err(StateError::UnknownState(0x1f))
        );

        report.ltssm = 0xb;
        let observed = report.to_state_report().unwrap();
        assert_eq!(observed.state, HotPlug);
        assert_eq!(observed.device_timestamp, None);
    }

    #[test]
    fn test_short_report_is_truncated() {
        assert!(matches!(
            LinkStateReport::decode(&[0x6, 0, 0]),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
