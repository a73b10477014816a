//! Service layer
//!
//! Long-running loops built on top of the device handle.

pub mod link_monitor;

pub use link_monitor::{LinkMonitor, MonitorConfig, MonitorEvent};
