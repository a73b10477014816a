//! LTSSM state enumeration

use crate::error::StateError;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Link training and status state machine state as reported by firmware
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum LtssmState {
    #[default]
    Reset = 0x0,
    ProtocolReset0 = 0x1,
    ProtocolReset1 = 0x2,
    ProtocolReset2 = 0x3,
    ProtocolReset3 = 0x4,
    DetectOrDeskew = 0x5,
    /// Link up, traffic flowing
    Forward = 0x6,
    EqP2_0 = 0x7,
    EqP2_1 = 0x8,
    EqP3_0 = 0x9,
    EqP3_1 = 0xa,
    HotPlug = 0xb,
    ProtocolReset4 = 0xc,
    /// Firmware-defined catch-all; never used for unknown raw values
    Other = 0xd,
}

impl LtssmState {
    /// Decode a raw state byte
    pub fn from_raw(raw: u8) -> Result<Self, StateError> {
        Self::try_from(raw).map_err(|e| StateError::UnknownState(e.number))
    }

    /// Raw wire value
    pub fn raw(self) -> u8 {
        self.into()
    }

    /// Whether the link is passing traffic
    pub fn is_link_up(self) -> bool {
        self == Self::Forward
    }

    /// Whether the link is in one of the equalization phases
    pub fn is_equalizing(self) -> bool {
        matches!(self, Self::EqP2_0 | Self::EqP2_1 | Self::EqP3_0 | Self::EqP3_1)
    }
}

impl fmt::Display for LtssmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reset => "RESET",
            Self::ProtocolReset0 => "PROT_RESET_0",
            Self::ProtocolReset1 => "PROT_RESET_1",
            Self::ProtocolReset2 => "PROT_RESET_2",
            Self::ProtocolReset3 => "PROT_RESET_3",
            Self::DetectOrDeskew => "DETECT_OR_DESKEW",
            Self::Forward => "FWD",
            Self::EqP2_0 => "EQ_P2_0",
            Self::EqP2_1 => "EQ_P2_1",
            Self::EqP3_0 => "EQ_P3_0",
            Self::EqP3_1 => "EQ_P3_1",
            Self::HotPlug => "HOT_PLUG",
            Self::ProtocolReset4 => "PROT_RESET_4",
            Self::Other => "OTHER",
        };
        f.write_str(name)
    }
}
