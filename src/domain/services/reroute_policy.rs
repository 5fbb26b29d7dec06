//! Reroute Policy
//!
//! Pure throughput-to-path decision used by the utilization monitor.

use crate::domain::entities::{Ipv4Prefix, PathChoice, PortCounterSample};
use crate::domain::services::flow_builder::default_cookie;
use crate::domain::value_objects::{DatapathId, PortNo, Priority, TableId};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A flow whose egress is swapped between two ports based on load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitoredPath {
    pub dpid: DatapathId,
    /// Port whose transmitted-bytes counter is sampled
    pub reference_port: PortNo,
    pub alternate_port: PortNo,
    pub table_id: TableId,
    pub ipv4_src: Ipv4Prefix,
    pub ipv4_dst: Ipv4Prefix,
    /// Provisioned rule id of the rule forwarding via the reference port
    pub via_reference_rule: u32,
    /// Provisioned rule id of the rule forwarding via the alternate port
    pub via_alternate_rule: u32,
    pub high_priority: Priority,
    pub low_priority: Priority,
    #[serde(default = "default_cookie")]
    pub cookie: u64,
}

impl Default for MonitoredPath {
    fn default() -> Self {
        Self {
            dpid: DatapathId(2),
            reference_port: PortNo(1),
            alternate_port: PortNo(2),
            table_id: 0,
            ipv4_src: Ipv4Prefix::host(Ipv4Addr::new(10, 0, 0, 3)),
            ipv4_dst: Ipv4Prefix::host(Ipv4Addr::new(10, 0, 0, 1)),
            via_reference_rule: 1,
            via_alternate_rule: 2,
            high_priority: 101,
            low_priority: 100,
            cookie: default_cookie(),
        }
    }
}

/// Outcome of one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RerouteDecision {
    /// No traffic delta (or a counter regression): leave rules alone
    Stale,
    ViaReference { speed: f64 },
    ViaAlternate { speed: f64 },
}

impl RerouteDecision {
    pub fn choice(&self) -> Option<PathChoice> {
        match self {
            RerouteDecision::Stale => None,
            RerouteDecision::ViaReference { .. } => Some(PathChoice::Reference),
            RerouteDecision::ViaAlternate { .. } => Some(PathChoice::Alternate),
        }
    }

    pub fn speed(&self) -> Option<f64> {
        match self {
            RerouteDecision::Stale => None,
            RerouteDecision::ViaReference { speed } | RerouteDecision::ViaAlternate { speed } => {
                Some(*speed)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReroutePolicy {
    /// Nominal gap between the two samples of a cycle
    pub sample_interval: Duration,
    /// Bytes per second at or above which traffic moves to the alternate port
    pub threshold_bps: f64,
}

impl Default for ReroutePolicy {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(100),
            threshold_bps: 1000.0,
        }
    }
}

impl ReroutePolicy {
    pub fn new(sample_interval: Duration, threshold_bps: f64) -> Self {
        Self {
            sample_interval,
            threshold_bps,
        }
    }

    /// Bytes per second between two samples, over the nominal interval.
    ///
    /// `None` when the counter did not advance.
    pub fn speed(&self, t0: &PortCounterSample, t1: &PortCounterSample) -> Option<f64> {
        let secs = self.sample_interval.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        match t1.bytes_transmitted.checked_sub(t0.bytes_transmitted) {
            Some(delta) if delta > 0 => Some(delta as f64 / secs),
            _ => None,
        }
    }

    pub fn decide(&self, t0: &PortCounterSample, t1: &PortCounterSample) -> RerouteDecision {
        match self.speed(t0, t1) {
            None => RerouteDecision::Stale,
            Some(speed) if speed >= self.threshold_bps => RerouteDecision::ViaAlternate { speed },
            Some(speed) => RerouteDecision::ViaReference { speed },
        }
    }
}
