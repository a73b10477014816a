//! Link monitor loop
//!
//! Polls link state on an interval, folds in pushed notifications and
//! optionally watches DIMM temperatures against an alert threshold.

use crate::device::Device;
use crate::error::{AppError, DeviceError};
use crate::link::LtssmEntry;
use crate::transport::Transport;

use serde::Serialize;
use std::time::Duration;

/// Configuration for the monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between ticks
    pub interval: Duration,
    /// Stop after this many ticks; run until an error otherwise
    pub max_ticks: Option<u64>,
    /// Whether to keep going after a failed tick
    pub retry: bool,
    /// Interval between retries
    pub retry_interval: Duration,
    /// Links to poll; every link when empty
    pub links: Vec<usize>,
    /// DIMMs whose temperature is checked each tick
    pub dimms: Vec<u8>,
    /// DIMM sensor reading (°C) that raises an overheat event
    pub dimm_alert_c: f32,
}

impl MonitorConfig {
    pub const DEFAULT_DIMM_ALERT_C: f32 = 110.0;
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_ticks: None,
            retry: true,
            retry_interval: Duration::from_secs(2),
            links: Vec::new(),
            dimms: Vec::new(),
            dimm_alert_c: Self::DEFAULT_DIMM_ALERT_C,
        }
    }
}

/// Something the monitor noticed during a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A new LTSSM history entry was recorded
    Transition { link: usize, entry: LtssmEntry },
    /// A DIMM sensor reached the alert threshold
    Overheat {
        dimm: u8,
        celsius: f32,
        threshold: f32,
    },
}

/// Link monitor
pub struct LinkMonitor {
    config: MonitorConfig,
}

impl LinkMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn polled_links<T: Transport>(&self, device: &Device<T>) -> Vec<usize> {
        if self.config.links.is_empty() {
            (0..device.links().len()).collect()
        } else {
            self.config.links.clone()
        }
    }

    /// One monitoring pass over the device
    pub fn tick<T: Transport>(&self, device: &mut Device<T>) -> Result<Vec<MonitorEvent>, DeviceError> {
        let mut events = Vec::new();

        for (link, entry) in device.process_notifications()? {
            events.push(MonitorEvent::Transition { link, entry });
        }

        for link in self.polled_links(device) {
            if let Some(entry) = device.poll_link(link)? {
                events.push(MonitorEvent::Transition { link, entry });
            }
        }

        let threshold = self.config.dimm_alert_c;
        for &dimm in &self.config.dimms {
            let thermal = device.dimm_thermal(dimm)?;
            if let Some(celsius) = thermal.max_temperature() {
                if celsius >= threshold {
                    log::warn!(
                        "DIMM {} at {:.2}°C (threshold {:.1}°C)",
                        dimm,
                        celsius,
                        threshold
                    );
                    events.push(MonitorEvent::Overheat {
                        dimm,
                        celsius,
                        threshold,
                    });
                }
            }
        }

        Ok(events)
    }

    /// Run the loop, handing each event to `on_event`
    pub fn run<T, F>(&self, device: &mut Device<T>, mut on_event: F) -> Result<(), AppError>
    where
        T: Transport,
        F: FnMut(&MonitorEvent),
    {
        let mut ticks = 0u64;
        loop {
            match self.tick(device) {
                Ok(events) => events.iter().for_each(&mut on_event),
                Err(e) => {
                    log::error!("Monitor tick failed: {}", e);
                    if !self.config.retry {
                        return Err(e.into());
                    }
                    log::info!("Retrying in {:?}...", self.config.retry_interval);
                    std::thread::sleep(self.config.retry_interval);
                }
            }

            ticks += 1;
            if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                log::debug!("Monitor stopping after {} tick(s)", ticks);
                break;
            }

            std::thread::sleep(self.config.interval);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceAddress, DeviceOptions};
    use crate::link::{Bifurcation, LtssmState};
    use crate::mock::{MockHandle, MockTransport};
    use crate::telemetry::dimm::ts_raw;
    use crate::telemetry::DimmThermal;

    fn device(bifurcation: Bifurcation) -> (Device<MockTransport>, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let options = DeviceOptions {
            bifurcation,
            ..Default::default()
        };
        let device = Device::open(DeviceAddress::new(0, 0x40), transport, options).unwrap();
        (device, handle)
    }

    fn quick(max_ticks: u64) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::ZERO,
            max_ticks: Some(max_ticks),
            retry: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_monitor_config_default() {
        let config = MonitorConfig::default();
        assert!(config.max_ticks.is_none());
        assert!(config.retry);
        assert!(config.links.is_empty());
    }

    #[test]
    fn test_tick_reports_transitions_once() {
        let (mut device, handle) = device(Bifurcation::X16);
        handle.script_link_states(0, &[(0x5, 10), (0x6, 20)]);
        let monitor = LinkMonitor::new(quick(1));

        let first = monitor.tick(&mut device).unwrap();
        let second = monitor.tick(&mut device).unwrap();
        let third = monitor.tick(&mut device).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        // The script is exhausted and the same report repeats.
        assert!(third.is_empty());
        assert_eq!(device.link(0).unwrap().state(), LtssmState::Forward);
    }

    #[test]
    fn test_tick_includes_notifications() {
        let (mut device, handle) = device(Bifurcation::X8X8);
        handle.notify_link_state(1, 0xb, 5);
        let monitor = LinkMonitor::new(MonitorConfig {
            links: vec![0],
            ..quick(1)
        });

        let events = monitor.tick(&mut device).unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::Transition { link: 1, entry } if entry.state == LtssmState::HotPlug
        )));
    }

    #[test]
    fn test_overheat_alert() {
        let (mut device, handle) = device(Bifurcation::X16);
        handle.set_record(
            1,
            &DimmThermal {
                dimm: 1,
                sensor_count: 1,
                raw: [ts_raw(112.5), 0],
            },
        );
        let monitor = LinkMonitor::new(MonitorConfig {
            dimms: vec![0, 1],
            ..quick(1)
        });

        let events = monitor.tick(&mut device).unwrap();
        let alerts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::Overheat { .. }))
            .collect();
        assert_eq!(
            alerts,
            vec![&MonitorEvent::Overheat {
                dimm: 1,
                celsius: 112.5,
                threshold: 110.0
            }]
        );
    }

    #[test]
    fn test_overheat_threshold_comes_from_monitor_config() {
        let (mut device, handle) = device(Bifurcation::X8X8);
        handle.set_record(
            0,
            &DimmThermal {
                dimm: 0,
                sensor_count: 1,
                raw: [ts_raw(85.0), 0],
            },
        );
        let default_monitor = LinkMonitor::new(MonitorConfig {
            dimms: vec![0],
            ..quick(1)
        });
        assert!(default_monitor.tick(&mut device).unwrap().is_empty());

        let strict = LinkMonitor::new(MonitorConfig {
            dimms: vec![0],
            dimm_alert_c: 80.0,
            ..quick(1)
        });
        let events = strict.tick(&mut device).unwrap();
        assert_eq!(
            events,
            vec![MonitorEvent::Overheat {
                dimm: 0,
                celsius: 85.0,
                threshold: 80.0
            }]
        );
    }

    #[test]
    fn test_rejected_notification_fails_tick_then_recovers() {
        let (mut device, handle) = device(Bifurcation::X8X8);
        handle.notify_link_state(1, 0xb, 5);
        handle.notify_link_state(1, 0x42, 6);
        let monitor = LinkMonitor::new(MonitorConfig {
            links: vec![0],
            ..quick(1)
        });

        assert!(matches!(
            monitor.tick(&mut device),
            Err(DeviceError::State(_))
        ));
        let events = monitor.tick(&mut device).unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::Transition { link: 1, entry } if entry.state == LtssmState::HotPlug
        )));
    }

    #[test]
    fn test_run_stops_after_max_ticks() {
        let (mut device, handle) = device(Bifurcation::X16);
        handle.script_link_states(0, &[(0x1, 1), (0x5, 2), (0x6, 3)]);
        let monitor = LinkMonitor::new(quick(3));

        let mut seen = Vec::new();
        monitor
            .run(&mut device, |event| seen.push(event.clone()))
            .unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(handle.requests_for(crate::mailbox::Opcode::GetLinkState), 3);
    }

    #[test]
    fn test_run_without_retry_returns_error() {
        let (mut device, handle) = device(Bifurcation::X16);
        handle.drop_next_responses(100);
        let monitor = LinkMonitor::new(MonitorConfig {
            links: vec![0],
            ..quick(5)
        });
        assert!(monitor.run(&mut device, |_| {}).is_err());
    }
}
