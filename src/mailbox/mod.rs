//! Mailbox protocol layer
//!
//! Framing, correlation, FIFO serialization and retry for commands sent to
//! the controller over the sideband transport.

pub mod engine;
pub mod frame;
pub mod lock;
pub mod opcode;

pub use engine::{MailboxEngine, MailboxStats, Notification, RetryPolicy};
pub use lock::MailboxLock;
pub use opcode::{MailboxStatus, Opcode};
