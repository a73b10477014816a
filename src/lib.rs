//! leoctl - sideband management library for Leo CXL memory controllers
//!
//! This library drives the controller's I2C mailbox, tracks link training
//! state and decodes the binary telemetry, event log and RAS records the
//! firmware returns.
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`device`]: Device handle and registry
//! - [`error`]: Error types
//! - [`events`]: Event log records
//! - [`link`]: Link model and LTSSM tracking
//! - [`mailbox`]: Framed request/response engine
//! - [`services`]: Long-running monitors
//! - [`telemetry`]: Telemetry record decoding
//! - [`transport`]: Bus access

pub mod cli;
pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod link;
pub mod mailbox;
pub mod services;
pub mod telemetry;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, Result};
