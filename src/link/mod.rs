//! Link model and LTSSM tracking
//!
//! A device exposes one x16 link or two x8 links depending on bifurcation.
//! Each [`Link`] owns its configuration, the last control/status register
//! read and a [`LinkTracker`].

pub mod history;
pub mod registers;
pub mod state;
pub mod tracker;

pub use history::RingBuffer;
pub use registers::{
    LaneMarginInfo, LaneMarginSummary, LinkControlStatus, LinkStatusSummary, MarginLaneStatus,
};
pub use state::LtssmState;
pub use tracker::{LinkStateReport, LinkTracker, LtssmEntry, StateReport, LINK_STATE_REPORT_LEN};

use crate::error::{ConfigError, StateError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lane bifurcation of the host interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Bifurcation {
    /// One x16 link
    #[default]
    #[serde(rename = "1x16")]
    X16,
    /// Two x8 links
    #[serde(rename = "2x8")]
    X8X8,
}

impl Bifurcation {
    pub fn link_count(self) -> usize {
        match self {
            Self::X16 => 1,
            Self::X8X8 => 2,
        }
    }

    /// Lane count of each link
    pub fn link_width(self) -> u8 {
        match self {
            Self::X16 => 16,
            Self::X8X8 => 8,
        }
    }

    /// Per-link configuration for every link of this bifurcation
    pub fn link_configs(self) -> Vec<LinkConfig> {
        (0..self.link_count())
            .map(|id| LinkConfig {
                bifurcation: self,
                link_id: id,
                max_width: self.link_width(),
                start_lane: id as u8 * self.link_width(),
            })
            .collect()
    }
}

impl fmt::Display for Bifurcation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X16 => write!(f, "1x16"),
            Self::X8X8 => write!(f, "2x8"),
        }
    }
}

impl FromStr for Bifurcation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1x16" | "x16" => Ok(Self::X16),
            "2x8" | "x8x8" => Ok(Self::X8X8),
            _ => Err(ConfigError::InvalidValue {
                key: "bifurcation".to_string(),
                message: format!("'{}' is not one of 1x16, 2x8", s),
            }),
        }
    }
}

/// Static configuration of one link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkConfig {
    pub bifurcation: Bifurcation,
    pub link_id: usize,
    pub max_width: u8,
    pub start_lane: u8,
}

/// One host link of a device
#[derive(Debug, Clone)]
pub struct Link {
    config: LinkConfig,
    control_status: Option<LinkControlStatus>,
    recovery_count: u16,
    /// Latest margining result per lane, indexed from the link's first lane
    lane_margins: Vec<Option<LaneMarginInfo>>,
    tracker: LinkTracker,
}

impl Link {
    pub fn new(config: LinkConfig, history_capacity: usize) -> Result<Self, StateError> {
        let tracker = LinkTracker::new(config.link_id, history_capacity)?;
        Ok(Self {
            lane_margins: vec![None; usize::from(config.max_width)],
            config,
            control_status: None,
            recovery_count: 0,
            tracker,
        })
    }

    pub fn index(&self) -> usize {
        self.config.link_id
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> LtssmState {
        self.tracker.current()
    }

    /// Control/status register from the most recent report, if any
    pub fn control_status(&self) -> Option<LinkControlStatus> {
        self.control_status
    }

    pub fn recovery_count(&self) -> u16 {
        self.recovery_count
    }

    pub fn tracker(&self) -> &LinkTracker {
        &self.tracker
    }

    pub fn history(&self) -> Vec<LtssmEntry> {
        self.tracker.history()
    }

    /// Store the margining result of `lane` (0-based within this link)
    pub fn record_lane_margin(&mut self, lane: u8, info: LaneMarginInfo) -> Result<(), StateError> {
        let width = self.config.max_width;
        let slot = self
            .lane_margins
            .get_mut(usize::from(lane))
            .ok_or(StateError::LaneOutOfRange { lane, width })?;
        *slot = Some(info);
        Ok(())
    }

    pub fn lane_margin(&self, lane: u8) -> Option<LaneMarginInfo> {
        self.lane_margins.get(usize::from(lane)).copied().flatten()
    }

    /// Smallest eye height and width seen across the margined lanes
    pub fn worst_margin(&self) -> Option<(u32, u32)> {
        let margined = self.lane_margins.iter().flatten();
        let height = margined.clone().map(|m| m.eye_height).min()?;
        let width = margined.map(|m| m.eye_width).min()?;
        Some((height, width))
    }

    /// Validate a wire report and feed it to the tracker
    pub fn apply_report(&mut self, report: &LinkStateReport) -> Result<Option<LtssmEntry>, StateError> {
        let observed = report.to_state_report()?;
        self.control_status = Some(report.control_status);
        self.recovery_count = report.recovery_count;
        Ok(self.tracker.observe(observed).copied())
    }

    /// Apply several reads from one poll cycle; only the latest counts
    pub fn apply_cycle(&mut self, reports: &[LinkStateReport]) -> Result<Option<LtssmEntry>, StateError> {
        let observed = reports
            .iter()
            .map(LinkStateReport::to_state_report)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(latest) = reports.last() {
            self.control_status = Some(latest.control_status);
            self.recovery_count = latest.recovery_count;
        }
        Ok(self.tracker.observe_cycle(&observed).copied())
    }

    /// Flattened view for output
    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            index: self.index(),
            bifurcation: self.config.bifurcation.to_string(),
            max_width: self.config.max_width,
            start_lane: self.config.start_lane,
            state: self.state(),
            recovery_count: self.recovery_count,
            register: self.control_status.map(|reg| reg.summary()),
            margins: self
                .lane_margins
                .iter()
                .enumerate()
                .filter_map(|(lane, info)| {
                    info.map(|info| LaneMargin {
                        lane: self.config.start_lane + lane as u8,
                        margin: info.summary(),
                    })
                })
                .collect(),
        }
    }
}

/// Serializable link snapshot
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub index: usize,
    pub bifurcation: String,
    pub max_width: u8,
    pub start_lane: u8,
    pub state: LtssmState,
    pub recovery_count: u16,
    pub register: Option<LinkStatusSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub margins: Vec<LaneMargin>,
}

/// Margining result of one physical lane
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LaneMargin {
    pub lane: u8,
    #[serde(flatten)]
    pub margin: LaneMarginSummary,
}
