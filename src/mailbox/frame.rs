//! Mailbox wire framing
//!
//! ```text
//! request : opcode(1) tag(1) len(2, LE) payload(len) pec(1)
//! response: opcode(1) tag(1) status(1) len(2, LE) payload(len) pec(1)
//! ```
//!
//! `pec` is the SMBus packet error code (CRC-8, polynomial 0x07) over every
//! byte that precedes it.

use crate::error::ProtocolError;
use crate::mailbox::opcode::MailboxStatus;

use crc::{Crc, CRC_8_SMBUS};

/// Largest payload a single frame may carry
pub const MAX_PAYLOAD_LEN: usize = 1024;
/// Bytes preceding the payload in a request
pub const REQUEST_HEADER_LEN: usize = 4;
/// Bytes preceding the payload in a response
pub const RESPONSE_HEADER_LEN: usize = 5;
/// Tag carried by unsolicited device-to-host frames
pub const NOTIFICATION_TAG: u8 = 0;

const SMBUS_PEC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Packet error code over `bytes`
pub fn pec(bytes: &[u8]) -> u8 {
    SMBUS_PEC.checksum(bytes)
}

/// Build a request frame
pub fn encode_request(opcode: u8, tag: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + payload.len() + 1);
    frame.push(opcode);
    frame.push(tag);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame.push(pec(&frame));
    Ok(frame)
}

/// A request frame as seen by the device side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub opcode: u8,
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl RequestFrame {
    /// Parse and verify a complete request frame
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < REQUEST_HEADER_LEN + 1 {
            return Err(ProtocolError::MalformedFrame(format!(
                "request of {} bytes is shorter than its header",
                bytes.len()
            )));
        }
        let len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        if bytes.len() != REQUEST_HEADER_LEN + len + 1 {
            return Err(ProtocolError::MalformedFrame(format!(
                "request declares {} payload bytes but carries {}",
                len,
                bytes.len() - REQUEST_HEADER_LEN - 1
            )));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 1);
        let expected = pec(body);
        if trailer[0] != expected {
            return Err(ProtocolError::ChecksumMismatch {
                expected,
                actual: trailer[0],
            });
        }
        Ok(Self {
            opcode: bytes[0],
            tag: bytes[1],
            payload: body[REQUEST_HEADER_LEN..].to_vec(),
        })
    }
}

/// Build a response frame
pub fn encode_response(opcode: u8, tag: u8, status: MailboxStatus, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + payload.len() + 1);
    frame.push(opcode);
    frame.push(tag);
    frame.push(status.code());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame.push(pec(&frame));
    frame
}

/// Fixed-size response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub opcode: u8,
    pub tag: u8,
    pub status: MailboxStatus,
    pub len: usize,
    raw: [u8; RESPONSE_HEADER_LEN],
}

impl ResponseHeader {
    /// Parse the first [`RESPONSE_HEADER_LEN`] bytes of a response
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let raw: [u8; RESPONSE_HEADER_LEN] = bytes.try_into().map_err(|_| {
            ProtocolError::MalformedFrame(format!(
                "response header must be {} bytes, got {}",
                RESPONSE_HEADER_LEN,
                bytes.len()
            ))
        })?;
        let len = u16::from_le_bytes([raw[3], raw[4]]) as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::MalformedFrame(format!(
                "response declares {} payload bytes (max {})",
                len, MAX_PAYLOAD_LEN
            )));
        }
        Ok(Self {
            opcode: raw[0],
            tag: raw[1],
            status: MailboxStatus::from(raw[2]),
            len,
            raw,
        })
    }

    /// Number of bytes that follow the header (payload plus pec)
    pub fn trailing_len(&self) -> usize {
        self.len + 1
    }

    /// Check the pec over header and `trailing`, returning the payload
    pub fn verify(&self, trailing: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if trailing.len() != self.trailing_len() {
            return Err(ProtocolError::MalformedFrame(format!(
                "expected {} trailing bytes, got {}",
                self.trailing_len(),
                trailing.len()
            )));
        }
        let (payload, received) = trailing.split_at(self.len);
        let mut digest = SMBUS_PEC.digest();
        digest.update(&self.raw);
        digest.update(payload);
        let expected = digest.finalize();
        if received[0] != expected {
            return Err(ProtocolError::ChecksumMismatch {
                expected,
                actual: received[0],
            });
        }
        Ok(payload.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pec_known_vector() {
        // CRC-8/SMBUS check value for "123456789"
        assert_eq!(pec(b"123456789"), 0xf4);
    }

    #[test]
    fn test_request_layout() {
        let frame = encode_request(0x16, 7, &[0xaa, 0xbb]).unwrap();
        assert_eq!(&frame[..6], &[0x16, 7, 2, 0, 0xaa, 0xbb]);
        assert_eq!(frame[6], pec(&frame[..6]));

        let parsed = RequestFrame::decode(&frame).unwrap();
        assert_eq!(parsed.opcode, 0x16);
        assert_eq!(parsed.tag, 7);
        assert_eq!(parsed.payload, vec![0xaa, 0xbb]);
    }

    #[test]
    fn test_request_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode_request(0x01, 1, &payload),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_response_verify_returns_payload_unchanged() {
        let payload = [1u8, 2, 3, 4, 5];
        let frame = encode_response(0x01, 9, MailboxStatus::Success, &payload);
        let header = ResponseHeader::parse(&frame[..RESPONSE_HEADER_LEN]).unwrap();
        assert_eq!(header.tag, 9);
        assert_eq!(header.len, 5);
        let body = header.verify(&frame[RESPONSE_HEADER_LEN..]).unwrap();
        assert_eq!(body, payload);
    }

    #[test]
    fn test_response_corrupted_pec() {
        let mut frame = encode_response(0x01, 9, MailboxStatus::Success, &[1, 2]);
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        let header = ResponseHeader::parse(&frame[..RESPONSE_HEADER_LEN]).unwrap();
        assert!(matches!(
            header.verify(&frame[RESPONSE_HEADER_LEN..]),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_response_corrupted_payload() {
        let mut frame = encode_response(0x01, 9, MailboxStatus::Success, &[1, 2]);
        frame[RESPONSE_HEADER_LEN] ^= 0x01;
        let header = ResponseHeader::parse(&frame[..RESPONSE_HEADER_LEN]).unwrap();
        assert!(header.verify(&frame[RESPONSE_HEADER_LEN..]).is_err());
    }

    #[test]
    fn test_response_header_rejects_oversized_len() {
        let header = [0x01, 1, 0, 0xff, 0xff];
        assert!(matches!(
            ResponseHeader::parse(&header),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }
}
