//! Byte transport abstraction
//!
//! The mailbox engine depends only on the [`Transport`] contract, never on
//! a concrete bus driver. Implementations move raw bytes and classify bus
//! failures; they never interpret payloads and never retry.

#[cfg(target_os = "linux")]
pub mod i2c_dev;

#[cfg(target_os = "linux")]
pub use i2c_dev::I2cDevTransport;

use crate::error::TransportError;
use std::time::Duration;

/// Request/response byte exchange over a sideband bus (I2C or SPI)
pub trait Transport: Send {
    /// Write `bytes` to the target as one bus transaction
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Read up to `max_len` bytes from the target
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrives in time.
    /// A read that returns fewer bytes than requested is not an error at this
    /// layer; callers that need an exact count check the length themselves.
    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Short human-readable description for logs
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).send(bytes, timeout)
    }

    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).receive(max_len, timeout)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Read exactly `len` bytes or fail with [`TransportError::ShortRead`]
pub fn receive_exact<T: Transport + ?Sized>(
    transport: &mut T,
    len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let bytes = transport.receive(len, timeout)?;
    if bytes.len() != len {
        return Err(TransportError::ShortRead {
            expected: len,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        reads: VecDeque<Vec<u8>>,
    }

    impl Transport for Scripted {
        fn send(&mut self, _bytes: &[u8], _timeout: Duration) -> Result<(), TransportError> {
            Ok(())
        }

        fn receive(
            &mut self,
            max_len: usize,
            _timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            let mut next = self.reads.pop_front().ok_or(TransportError::Timeout)?;
            next.truncate(max_len);
            Ok(next)
        }
    }

    #[test]
    fn test_receive_exact_short_read() {
        let mut t = Scripted {
            reads: VecDeque::from(vec![vec![1, 2]]),
        };
        let err = receive_exact(&mut t, 5, Duration::from_millis(1)).unwrap_err();
        assert_eq!(
            err,
            TransportError::ShortRead {
                expected: 5,
                actual: 2
            }
        );
    }

    #[test]
    fn test_receive_exact_timeout_propagates() {
        let mut t = Scripted {
            reads: VecDeque::new(),
        };
        let err = receive_exact(&mut t, 1, Duration::from_millis(1)).unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[test]
    fn test_boxed_transport_delegates() {
        let mut boxed: Box<dyn Transport> = Box::new(Scripted {
            reads: VecDeque::from(vec![vec![7, 8, 9]]),
        });
        let bytes = receive_exact(&mut boxed, 3, Duration::from_millis(1)).unwrap();
        assert_eq!(bytes, vec![7, 8, 9]);
    }
}
