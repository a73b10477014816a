//! Mailbox command opcodes and response status codes

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// One-byte mailbox command opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    /// Read a 32-bit control/status register
    CsrRead = 0x01,
    /// Firmware and ASIC version block
    GetVersion = 0x02,
    /// Write a 32-bit control/status register
    CsrWrite = 0x11,
    /// Echo the payload back
    Ping = 0x16,
    /// DIMM temperature-sensor (TSOD) readout
    ReadDimmThermal = 0x23,
    /// Decoded SPD information for one DIMM
    ReadSpdInfo = 0x24,
    /// Persistent counter by id
    ReadPersistentData = 0x27,
    /// DDR PHY training margins
    ReadDdrPhyMargins = 0x28,
    /// Firmware housekeeping error counters
    ReadErrInfo = 0x31,
    /// Soft post-package repair
    RunSoftPpr = 0x40,
    /// CXL Get Event Records
    GetEventRecords = 0x50,
    /// CXL Clear Event Records
    ClearEventRecords = 0x51,
    /// CXL Get Poison List
    GetPoisonList = 0x52,
    /// CXL Inject Poison
    InjectPoison = 0x53,
    /// CXL Clear Poison
    ClearPoison = 0x54,
    /// Program scrub engines
    SetScrubConfig = 0x55,
    /// Read back scrub engine settings
    GetScrubConfig = 0x56,
    /// Arm a DDR ECC error injection
    InjectError = 0x57,
    /// Program DDR sub-channel command throttling
    SetThrottle = 0x58,
    /// Generic telemetry record read
    ReadTelemetry = 0x60,
    /// Current LTSSM state of one link
    GetLinkState = 0x70,
    /// Unsolicited LTSSM change (device to host, tag 0)
    LinkStateNotify = 0x71,
}

impl Opcode {
    /// Raw wire value
    pub fn code(self) -> u8 {
        self.into()
    }

    /// Whether the command changes device state
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::CsrWrite
                | Self::RunSoftPpr
                | Self::ClearEventRecords
                | Self::InjectPoison
                | Self::ClearPoison
                | Self::SetScrubConfig
                | Self::InjectError
                | Self::SetThrottle
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self, self.code())
    }
}

/// Status byte carried by every response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxStatus {
    /// Command completed
    Success,
    /// Firmware failed to execute the command
    Error,
    /// Firmware is busy; the command may be retried
    Pending,
    /// Firmware does not accept the command
    Rejected,
    /// Any other value
    Unknown(u8),
}

impl MailboxStatus {
    /// Raw wire value
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::Error => 0x04,
            Self::Pending => 0x40,
            Self::Rejected => 0x80,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u8> for MailboxStatus {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0x04 => Self::Error,
            0x40 => Self::Pending,
            0x80 => Self::Rejected,
            other => Self::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_wire() {
        assert_eq!(Opcode::try_from(0x16).unwrap(), Opcode::Ping);
        assert_eq!(Opcode::try_from(0x71).unwrap(), Opcode::LinkStateNotify);
        assert!(Opcode::try_from(0xee).is_err());
    }

    #[test]
    fn test_opcode_write_classification() {
        assert!(Opcode::CsrWrite.is_write());
        assert!(Opcode::InjectPoison.is_write());
        assert!(!Opcode::GetVersion.is_write());
        assert!(!Opcode::ReadTelemetry.is_write());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(MailboxStatus::from(0x04), MailboxStatus::Error);
        assert_eq!(MailboxStatus::from(0x13), MailboxStatus::Unknown(0x13));
        assert_eq!(MailboxStatus::Pending.code(), 0x40);
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(Opcode::Ping.to_string(), "Ping(0x16)");
    }
}
