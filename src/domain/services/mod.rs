//! Domain Services
//!
//! Pure decision logic. Nothing here talks to a switch.

pub mod flow_builder;
pub mod forwarding_policy;
pub mod packet_classifier;
pub mod reroute_policy;

pub use flow_builder::{FlowBuilder, ProvisionedFlow};
pub use forwarding_policy::{
    DropReason, ForwardingDecision, ForwardingPolicy, MultipathPolicy, PathWeight,
};
pub use packet_classifier::{ClassifiedPacket, PacketClassifier, PacketKind};
pub use reroute_policy::{MonitoredPath, RerouteDecision, ReroutePolicy};
