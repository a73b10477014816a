//! DDR sub-channel command throttling

use crate::error::DecodeError;
use crate::telemetry::codec::{bits, set_bits, ByteReader, ByteWriter};
use crate::telemetry::{Record, RecordKind};

use serde::{Deserialize, Serialize};

/// Number of throttled sub-channels
pub const SUB_CHANNELS: usize = 4;

const FIELD_WIDTH: u32 = 12;
const MAX_FIELD: u16 = (1 << FIELD_WIDTH) - 1;

/// Throttle settings of one sub-channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChannelThrottle {
    pub enable: bool,
    /// Commands allowed per window (12 bits)
    pub max_commands: u16,
    /// Window length in controller clocks (12 bits)
    pub window_length: u16,
}

impl SubChannelThrottle {
    pub fn from_word(word: u32) -> Self {
        let word = u64::from(word);
        Self {
            enable: bits(word, 0, 1) == 1,
            max_commands: bits(word, 1, FIELD_WIDTH) as u16,
            window_length: bits(word, 13, FIELD_WIDTH) as u16,
        }
    }

    pub fn to_word(&self) -> u32 {
        let mut word = set_bits(0, 0, 1, u64::from(self.enable));
        word = set_bits(word, 1, FIELD_WIDTH, u64::from(self.max_commands));
        word = set_bits(word, 13, FIELD_WIDTH, u64::from(self.window_length));
        word as u32
    }

    /// Reject values that do not fit their 12-bit fields
    pub fn validate(&self) -> Result<(), DecodeError> {
        for (field, value) in [
            ("max_commands", self.max_commands),
            ("window_length", self.window_length),
        ] {
            if value > MAX_FIELD {
                return Err(DecodeError::InvalidField {
                    field,
                    value: u64::from(value),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub sub_channels: [SubChannelThrottle; SUB_CHANNELS],
}

impl ThrottleConfig {
    pub const BODY_LEN: usize = SUB_CHANNELS * 4;

    /// Same setting on every sub-channel
    pub fn uniform(setting: SubChannelThrottle) -> Self {
        Self {
            sub_channels: [setting; SUB_CHANNELS],
        }
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        self.sub_channels.iter().try_for_each(SubChannelThrottle::validate)
    }
}

impl Record for ThrottleConfig {
    const KIND: RecordKind = RecordKind::ThrottleConfig;

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let mut sub_channels = [SubChannelThrottle::default(); SUB_CHANNELS];
        for slot in sub_channels.iter_mut() {
            *slot = SubChannelThrottle::from_word(reader.u32()?);
        }
        Ok(Self { sub_channels })
    }

    fn encode_body(&self, writer: &mut ByteWriter) {
        for sub_channel in &self.sub_channels {
            writer.u32(sub_channel.to_word());
        }
    }
}
