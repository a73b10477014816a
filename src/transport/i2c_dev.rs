//! Linux i2c-dev transport
//!
//! Talks to the controller through `/dev/i2c-N`. Every `send` is one write
//! transaction and every `receive` is one read transaction addressed to the
//! bound 7-bit target.

use crate::error::TransportError;
use crate::transport::Transport;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

/// ioctl: bind the 7-bit target address
const I2C_SLAVE: libc::c_ulong = 0x0703;
/// ioctl: adapter timeout in units of 10 ms
const I2C_TIMEOUT: libc::c_ulong = 0x0702;

/// Transport over the Linux i2c-dev character device
pub struct I2cDevTransport {
    file: File,
    path: PathBuf,
    address: u8,
    programmed_timeout: Option<Duration>,
}

impl I2cDevTransport {
    /// Open `/dev/i2c-<bus>` and bind it to `address`
    pub fn open(bus: u8, address: u8) -> Result<Self, TransportError> {
        let path = PathBuf::from(format!("/dev/i2c-{}", bus));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| TransportError::Io(format!("{}: {}", path.display(), e)))?;

        // SAFETY: fd is a valid open descriptor owned by `file`; I2C_SLAVE
        // takes the address by value.
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if rc < 0 {
            return Err(classify(io::Error::last_os_error()));
        }

        log::debug!("Opened {} at address {:#04x}", path.display(), address);

        Ok(Self {
            file,
            path,
            address,
            programmed_timeout: None,
        })
    }

    fn program_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if self.programmed_timeout == Some(timeout) {
            return Ok(());
        }
        let ticks = timeout.as_millis().div_ceil(10).max(1) as libc::c_ulong;
        // SAFETY: fd is valid for the lifetime of `self.file`; I2C_TIMEOUT
        // takes the tick count by value.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_TIMEOUT as _, ticks) };
        if rc < 0 {
            return Err(classify(io::Error::last_os_error()));
        }
        self.programmed_timeout = Some(timeout);
        Ok(())
    }
}

impl Transport for I2cDevTransport {
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        self.program_timeout(timeout)?;
        let written = self.file.write(bytes).map_err(classify)?;
        if written != bytes.len() {
            return Err(TransportError::Nack);
        }
        Ok(())
    }

    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.program_timeout(timeout)?;
        let mut buf = vec![0u8; max_len];
        let read = self.file.read(&mut buf).map_err(classify)?;
        buf.truncate(read);
        Ok(buf)
    }

    fn describe(&self) -> String {
        format!("{}@{:#04x}", self.path.display(), self.address)
    }
}

fn classify(err: io::Error) -> TransportError {
    match err.raw_os_error() {
        Some(libc::ENXIO) | Some(libc::EREMOTEIO) => TransportError::Nack,
        Some(libc::ETIMEDOUT) | Some(libc::EAGAIN) => TransportError::Timeout,
        _ => TransportError::Io(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_nack() {
        let err = io::Error::from_raw_os_error(libc::ENXIO);
        assert_eq!(classify(err), TransportError::Nack);
    }

    #[test]
    fn test_classify_timeout() {
        let err = io::Error::from_raw_os_error(libc::ETIMEDOUT);
        assert_eq!(classify(err), TransportError::Timeout);
    }

    #[test]
    fn test_open_missing_bus() {
        let result = I2cDevTransport::open(250, 0x50);
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
