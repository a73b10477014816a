//! PCIe link register views
//!
//! The firmware returns the Link Control (low half) and Link Status (high
//! half) registers as one 32-bit word. Lane margining results come back as
//! a margining lane status word followed by the measured eye size.

use crate::error::DecodeError;
use crate::telemetry::codec::ByteReader;

use bitfield::bitfield;
use serde::Serialize;

bitfield! {
    /// Link Control + Link Status, as one dword
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct LinkControlStatus(u32);
    impl Debug;
    pub u8, aspm_control, set_aspm_control: 1, 0;
    pub read_completion_boundary, set_read_completion_boundary: 3;
    pub link_disable, set_link_disable: 4;
    pub retrain_link, set_retrain_link: 5;
    pub common_clock, set_common_clock: 6;
    pub extended_sync, set_extended_sync: 7;
    pub clock_power_management, set_clock_power_management: 8;
    pub u8, current_speed, set_current_speed: 19, 16;
    pub u8, negotiated_width, set_negotiated_width: 25, 20;
    pub link_training, set_link_training: 27;
    pub slot_clock, set_slot_clock: 28;
    pub dll_link_active, set_dll_link_active: 29;
    pub bandwidth_management_status, set_bandwidth_management_status: 30;
    pub autonomous_bandwidth_status, set_autonomous_bandwidth_status: 31;
}

impl LinkControlStatus {
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// PCIe generation for the current speed encoding (1 = 2.5 GT/s)
    pub fn generation(&self) -> u8 {
        self.current_speed()
    }

    /// Flattened view for output
    pub fn summary(&self) -> LinkStatusSummary {
        LinkStatusSummary {
            raw: self.0,
            generation: self.generation(),
            width: self.negotiated_width(),
            training: self.link_training(),
            dll_active: self.dll_link_active(),
            aspm: self.aspm_control(),
            link_disabled: self.link_disable(),
        }
    }
}

/// Decoded register fields that matter to an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStatusSummary {
    pub raw: u32,
    pub generation: u8,
    pub width: u8,
    pub training: bool,
    pub dll_active: bool,
    pub aspm: u8,
    pub link_disabled: bool,
}

bitfield! {
    /// Margining Lane Status register of one receiver
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct MarginLaneStatus(u32);
    impl Debug;
    pub u8, receiver, set_receiver: 2, 0;
    pub u8, margin_type, set_margin_type: 5, 3;
    pub usage_model, set_usage_model: 6;
    pub u8, payload, set_payload: 15, 8;
}

impl MarginLaneStatus {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Margining result for one lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneMarginInfo {
    pub status: MarginLaneStatus,
    /// Eye height in device units
    pub eye_height: u32,
    /// Eye width in device units
    pub eye_width: u32,
}

impl LaneMarginInfo {
    pub const LEN: usize = 12;

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let info = Self {
            status: MarginLaneStatus(reader.u32()?),
            eye_height: reader.u32()?,
            eye_width: reader.u32()?,
        };
        reader.finish()?;
        Ok(info)
    }

    pub fn summary(&self) -> LaneMarginSummary {
        LaneMarginSummary {
            receiver: self.status.receiver(),
            margin_type: self.status.margin_type(),
            payload: self.status.payload(),
            eye_height: self.eye_height,
            eye_width: self.eye_width,
        }
    }
}

/// Decoded margining fields for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaneMarginSummary {
    pub receiver: u8,
    pub margin_type: u8,
    pub payload: u8,
    pub eye_height: u32,
    pub eye_width: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_half() {
        // Gen5 x16, DLL active, slot clock
        let reg = LinkControlStatus(0x3105_0040);
        assert_eq!(reg.current_speed(), 5);
        assert_eq!(reg.negotiated_width(), 16);
        assert!(reg.dll_link_active());
        assert!(reg.slot_clock());
        assert!(!reg.link_training());
        assert!(reg.common_clock());
        assert_eq!(reg.aspm_control(), 0);
    }

    #[test]
    fn test_setters_touch_only_their_bits() {
        let mut reg = LinkControlStatus::default();
        reg.set_aspm_control(0b11);
        reg.set_retrain_link(true);
        reg.set_negotiated_width(8);
        assert_eq!(reg.raw(), 0x0080_0023);
    }

    #[test]
    fn test_summary() {
        let summary = LinkControlStatus(0x2084_0002).summary();
        assert_eq!(summary.generation, 4);
        assert_eq!(summary.width, 8);
        assert!(summary.dll_active);
        assert_eq!(summary.aspm, 2);
    }

    #[test]
    fn test_margin_lane_status_fields() {
        // Receiver 1, timing margin (type 3), payload 0x2a
        let status = MarginLaneStatus(0x0000_2a19);
        assert_eq!(status.receiver(), 1);
        assert_eq!(status.margin_type(), 3);
        assert!(!status.usage_model());
        assert_eq!(status.payload(), 0x2a);

        let mut built = MarginLaneStatus::default();
        built.set_receiver(1);
        built.set_margin_type(3);
        built.set_payload(0x2a);
        assert_eq!(built, status);
    }

    #[test]
    fn test_lane_margin_decode() {
        let mut bytes = 0x0000_2a19u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&48u32.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes());
        let info = LaneMarginInfo::decode(&bytes).unwrap();
        assert_eq!(info.eye_height, 48);
        assert_eq!(info.eye_width, 20);
        let summary = info.summary();
        assert_eq!(summary.margin_type, 3);
        assert_eq!(summary.payload, 0x2a);

        assert!(matches!(
            LaneMarginInfo::decode(&bytes[..8]),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
