//! Application Layer
//!
//! Use cases orchestrating domain services over the outbound ports.

mod controller_service;
mod flow_installer;

pub use controller_service::{ControllerService, EventOutcome, ForwardingOutcome};
pub use flow_installer::FlowInstaller;
