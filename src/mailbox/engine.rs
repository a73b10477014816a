//! Mailbox protocol engine
//!
//! Turns an opcode and payload into a framed request, performs the exchange
//! under the per-device FIFO lock and returns the verified response payload
//! or a classified [`ProtocolError`].

use crate::error::{ProtocolError, TransportError};
use crate::mailbox::frame::{
    encode_request, ResponseHeader, MAX_PAYLOAD_LEN, NOTIFICATION_TAG, RESPONSE_HEADER_LEN,
};
use crate::mailbox::lock::MailboxLock;
use crate::mailbox::opcode::{MailboxStatus, Opcode};
use crate::transport::{receive_exact, Transport};

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timeout and retry settings for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time allowed for one attempt, from send to verified response
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub backoff: Duration,
    /// Upper bound for the retry delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Total number of attempts per transaction
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(100),
            retries: 3,
            backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

/// Unsolicited frame pushed by the device (tag 0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MailboxStats {
    /// Transactions that returned a verified payload
    pub completed: u64,
    /// Transactions that ended in an error
    pub failed: u64,
    /// Attempts repeated after a retryable failure
    pub retries: u64,
    /// Responses dropped because their tag belonged to an abandoned attempt
    pub discarded: u64,
    /// Unsolicited frames that failed their integrity check
    pub malformed_notifications: u64,
}

struct Session<T> {
    transport: T,
    next_tag: u8,
    notifications: VecDeque<Notification>,
    stats: MailboxStats,
}

impl<T> Session<T> {
    fn allocate_tag(&mut self) -> u8 {
        let tag = self.next_tag;
        self.next_tag = match self.next_tag.wrapping_add(1) {
            NOTIFICATION_TAG => 1,
            next => next,
        };
        tag
    }
}

enum AttemptError {
    Checksum { expected: u8, actual: u8 },
    Transport(TransportError),
    Busy,
    Malformed(ProtocolError),
    Fatal(ProtocolError),
}

impl From<TransportError> for AttemptError {
    fn from(err: TransportError) -> Self {
        AttemptError::Transport(err)
    }
}

impl From<ProtocolError> for AttemptError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ChecksumMismatch { expected, actual } => {
                AttemptError::Checksum { expected, actual }
            }
            malformed @ ProtocolError::MalformedFrame(_) => AttemptError::Malformed(malformed),
            other => AttemptError::Fatal(other),
        }
    }
}

/// Serialized request/response engine for one device
pub struct MailboxEngine<T: Transport> {
    session: MailboxLock<Session<T>>,
    policy: RetryPolicy,
}

impl<T: Transport> MailboxEngine<T> {
    /// Create an engine that owns `transport`
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            session: MailboxLock::new(Session {
                transport,
                next_tag: 1,
                notifications: VecDeque::new(),
                stats: MailboxStats::default(),
            }),
            policy,
        }
    }

    /// Active retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute one command and return the verified response payload
    ///
    /// Blocks until every earlier caller has finished. Checksum failures,
    /// bus failures and busy responses are retried with exponential
    /// backoff; everything else fails immediately.
    pub fn execute(&self, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut session = self.session.acquire();
        let attempts = self.policy.attempts();
        let mut last = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.policy.backoff_for(attempt - 1);
                log::warn!(
                    "Retrying {} (attempt {}/{}) in {:?}",
                    opcode,
                    attempt + 1,
                    attempts,
                    delay
                );
                session.stats.retries += 1;
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }

            let tag = session.allocate_tag();
            match self.attempt(&mut session, opcode, tag, payload) {
                Ok(response) => {
                    session.stats.completed += 1;
                    log::debug!(
                        "{} tag {} completed with {} payload bytes",
                        opcode,
                        tag,
                        response.len()
                    );
                    return Ok(response);
                }
                Err(AttemptError::Fatal(err)) => {
                    session.stats.failed += 1;
                    return Err(err);
                }
                Err(retryable) => last = Some(retryable),
            }
        }

        session.stats.failed += 1;
        Err(match last {
            Some(AttemptError::Checksum { expected, actual }) => {
                ProtocolError::ChecksumMismatch { expected, actual }
            }
            Some(AttemptError::Transport(TransportError::Timeout)) | None => {
                ProtocolError::Timeout { attempts }
            }
            Some(AttemptError::Transport(source)) => ProtocolError::Transport { attempts, source },
            Some(AttemptError::Busy) => ProtocolError::DeviceBusy { attempts },
            Some(AttemptError::Malformed(err)) | Some(AttemptError::Fatal(err)) => err,
        })
    }

    fn attempt(
        &self,
        session: &mut Session<T>,
        opcode: Opcode,
        tag: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, AttemptError> {
        let frame = encode_request(opcode.code(), tag, payload)?;
        let deadline = Instant::now() + self.policy.timeout;

        log::debug!("-> {} tag {} ({} bytes)", opcode, tag, frame.len());
        session.transport.send(&frame, self.policy.timeout)?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AttemptError::Transport(TransportError::Timeout));
            }

            let header_bytes = receive_exact(&mut session.transport, RESPONSE_HEADER_LEN, remaining)?;
            let header = ResponseHeader::parse(&header_bytes)?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let trailing = receive_exact(&mut session.transport, header.trailing_len(), remaining)?;

            if header.tag == NOTIFICATION_TAG {
                match header.verify(&trailing) {
                    Ok(body) => session.notifications.push_back(Notification {
                        opcode: header.opcode,
                        payload: body,
                    }),
                    Err(err) => {
                        session.stats.malformed_notifications += 1;
                        log::warn!("Dropping corrupt notification: {}", err);
                    }
                }
                continue;
            }

            if header.tag != tag {
                session.stats.discarded += 1;
                log::warn!(
                    "Discarding late response with tag {} while waiting for tag {}",
                    header.tag,
                    tag
                );
                continue;
            }

            let body = header.verify(&trailing)?;

            if header.opcode != opcode.code() {
                return Err(AttemptError::Fatal(ProtocolError::UnexpectedOpcode {
                    expected: opcode.code(),
                    actual: header.opcode,
                }));
            }

            return match header.status {
                MailboxStatus::Success => Ok(body),
                MailboxStatus::Pending => Err(AttemptError::Busy),
                other => Err(AttemptError::Fatal(ProtocolError::DeviceStatus(other.code()))),
            };
        }
    }

    /// Collect unsolicited frames waiting on the bus
    ///
    /// Reads until the transport times out (waiting at most `wait` per
    /// read). Stale responses found along the way are discarded. Returns
    /// every queued notification, including those captured during earlier
    /// transactions.
    pub fn poll_notifications(&self, wait: Duration) -> Result<Vec<Notification>, ProtocolError> {
        let mut session = self.session.acquire();
        loop {
            let header_bytes =
                match receive_exact(&mut session.transport, RESPONSE_HEADER_LEN, wait) {
                    Ok(bytes) => bytes,
                    Err(TransportError::Timeout) => break,
                    Err(source) => return Err(ProtocolError::Transport { attempts: 1, source }),
                };
            let header = ResponseHeader::parse(&header_bytes)?;
            let trailing = receive_exact(&mut session.transport, header.trailing_len(), wait)
                .map_err(|source| ProtocolError::Transport { attempts: 1, source })?;

            if header.tag != NOTIFICATION_TAG {
                session.stats.discarded += 1;
                log::warn!("Discarding late response with tag {}", header.tag);
                continue;
            }
            let body = header.verify(&trailing).map_err(|err| {
                session.stats.malformed_notifications += 1;
                err
            })?;
            session.notifications.push_back(Notification {
                opcode: header.opcode,
                payload: body,
            });
        }
        Ok(session.notifications.drain(..).collect())
    }

    /// Take notifications captured during earlier transactions without bus I/O
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.session.acquire().notifications.drain(..).collect()
    }

    /// Snapshot of the transaction counters
    pub fn stats(&self) -> MailboxStats {
        self.session.acquire().stats
    }

    /// Run `f` with exclusive access to the transport
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut session = self.session.acquire();
        f(&mut session.transport)
    }

    /// Consume the engine and return the transport
    pub fn into_transport(self) -> T {
        self.session.into_inner().transport
    }
}
