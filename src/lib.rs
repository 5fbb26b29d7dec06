//! sdn-balancer Library
//!
//! Reactive L2 forwarding with weighted multipath groups, plus a
//! utilization monitor that reroutes a flow away from a busy port.
//! Exposed as a library for integration tests and embedding.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{ControllerService, EventOutcome, FlowInstaller, ForwardingOutcome};
pub use config::{load_config, Config, ConfigError, SouthboundKind, Topology};
pub use domain::entities::{ControllerEvent, FlowRule, GroupRule, PacketIn, PathChoice};
pub use domain::errors::{InstallError, SouthboundError};
pub use domain::ports::{MacTable, SwitchChannel, SwitchRegistry};
pub use domain::services::{ForwardingPolicy, MonitoredPath, MultipathPolicy, ReroutePolicy};
pub use domain::value_objects::{DatapathId, PortNo};
pub use infrastructure::{ShutdownController, UtilizationMonitor};
