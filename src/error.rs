//! Unified error types for leoctl
//!
//! This module defines all error types used throughout the library and CLI.
//! Uses thiserror for ergonomic error definitions.
//!
//! The taxonomy follows the layering of the stack: bus-level failures are
//! [`TransportError`], framing and retry failures are [`ProtocolError`],
//! record contract violations are [`DecodeError`] and LTSSM contract
//! violations are [`StateError`]. Only transport failures are retried, and
//! only by the mailbox engine.

use crate::device::DeviceAddress;
use crate::telemetry::RecordKind;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from device operations
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error opening the sideband bus
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Requested feature is not compiled in
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bus-level failures reported by a [`crate::transport::Transport`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No data arrived before the caller-supplied timeout
    #[error("Bus timeout")]
    Timeout,

    /// Target did not acknowledge its address or a data byte
    #[error("Bus NACK from target")]
    Nack,

    /// Fewer bytes arrived than were requested
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Any other driver failure
    #[error("Bus I/O failure: {0}")]
    Io(String),
}

/// Mailbox framing and transaction failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Packet error code did not match after exhausting retries
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// No matching response after exhausting retries
    #[error("Mailbox timeout after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// Non-timeout bus failure after exhausting retries
    #[error("Transport failure after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Response carried a different opcode than the request
    #[error("Unexpected opcode in response: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedOpcode { expected: u8, actual: u8 },

    /// Firmware reported an error or rejected the command
    #[error("Device returned status {0:#04x}")]
    DeviceStatus(u8),

    /// Firmware stayed busy for every attempt
    #[error("Device busy after {attempts} attempt(s)")]
    DeviceBusy { attempts: u32 },

    /// Request payload does not fit in one frame
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Response header could not be parsed
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// Binary record contract violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Record-kind tag is not part of the closed catalogue
    #[error("Unknown record kind: {0:#04x}")]
    UnknownRecordKind(u8),

    /// Buffer ended before the layout was complete
    #[error("Truncated record: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Layout consumed a different number of bytes than declared
    #[error("Record length mismatch: declared {declared} bytes, decoded {decoded}")]
    LengthMismatch { declared: usize, decoded: usize },

    /// Count prefix claims more entries than the buffer holds
    #[error("Count prefix {count} exceeds buffer capacity of {capacity} entries")]
    CountOverflow { count: usize, capacity: usize },

    /// A field holds a value outside its enumeration
    #[error("Invalid value {value:#x} for field '{field}'")]
    InvalidField { field: &'static str, value: u64 },
}

/// Link state contract violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Raw LTSSM value outside the enumerated set
    #[error("Unknown LTSSM state: {0:#04x}")]
    UnknownState(u8),

    /// Link index not present on this device
    #[error("Link {index} not found (device has {count})")]
    LinkNotFound { index: usize, count: usize },

    /// Lane number beyond the link width
    #[error("Lane {lane} outside a x{width} link")]
    LaneOutOfRange { lane: u8, width: u8 },

    /// History ring buffer needs room for at least one entry
    #[error("History capacity must be at least 1")]
    ZeroCapacity,
}

/// Errors from device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Mailbox transaction failed
    #[error("Mailbox failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// Returned record could not be decoded
    #[error("Decode failure: {0}")]
    Decode(#[from] DecodeError),

    /// Link state report was inconsistent
    #[error("Link state failure: {0}")]
    State(#[from] StateError),

    /// Device answered with a record of a different kind
    #[error("Expected {expected} record, got {actual}")]
    UnexpectedRecord {
        expected: RecordKind,
        actual: RecordKind,
    },

    /// No device is registered at this address
    #[error("No open device at {0}")]
    DeviceNotOpen(DeviceAddress),

    /// A device is already registered at this address
    #[error("Device at {0} is already open")]
    AlreadyOpen(DeviceAddress),

    /// Caller passed an out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<ProtocolError> for AppError {
    fn from(err: ProtocolError) -> Self {
        AppError::Device(DeviceError::Protocol(err))
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        AppError::Device(DeviceError::Decode(err))
    }
}

impl From<StateError> for AppError {
    fn from(err: StateError) -> Self {
        AppError::Device(DeviceError::State(err))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::ChecksumMismatch {
            expected: 0x5a,
            actual: 0x00,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0x5a, got 0x00"
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Truncated {
            needed: 44,
            available: 12,
        };
        assert!(err.to_string().contains("44"));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn test_transport_error_source_chain() {
        let err = ProtocolError::Transport {
            attempts: 3,
            source: TransportError::Nack,
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Bus NACK from target"));
    }

    #[test]
    fn test_error_conversion() {
        let state_err = StateError::UnknownState(0x1f);
        let app_err: AppError = state_err.into();
        assert!(matches!(
            app_err,
            AppError::Device(DeviceError::State(StateError::UnknownState(0x1f)))
        ));
    }
}
