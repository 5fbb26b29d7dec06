//! Switch Channel Port
//!
//! Defines the southbound interface used to push rules to switches and read
//! their port counters. Implementations may speak OpenFlow over a per-switch
//! session, call a network-management REST API, or simulate switches in memory.

use crate::domain::entities::{FlowRule, GroupRule, PacketPayload, PortCounterSample};
use crate::domain::errors::SouthboundError;
use crate::domain::value_objects::{DatapathId, PortNo};
use async_trait::async_trait;
use bytes::Bytes;

/// Southbound channel shared by the event reactor and the utilization monitor.
///
/// Every call is request/response: it returns once the switch (or the
/// management API) acknowledged it, or fails with a [`SouthboundError`].
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait SwitchChannel: Send + Sync {
    /// Install or replace the rule with the same (switch, table, rule) identity.
    async fn install_flow(&self, dpid: DatapathId, rule: &FlowRule)
        -> Result<(), SouthboundError>;

    /// Install or replace a group.
    async fn install_group(
        &self,
        dpid: DatapathId,
        group: &GroupRule,
    ) -> Result<(), SouthboundError>;

    /// Inject a packet, emitting it on `out_port`.
    async fn send_packet_out(
        &self,
        dpid: DatapathId,
        payload: PacketPayload,
        in_port: PortNo,
        out_port: PortNo,
    ) -> Result<(), SouthboundError>;

    /// Broadcast raw packet data out of every port except its ingress.
    async fn flood(&self, dpid: DatapathId, data: Bytes) -> Result<(), SouthboundError> {
        self.send_packet_out(dpid, PacketPayload::Raw(data), PortNo::CONTROLLER, PortNo::FLOOD)
            .await
    }

    /// Read the transmitted-bytes counter of a port.
    async fn query_port_counters(
        &self,
        dpid: DatapathId,
        port: PortNo,
    ) -> Result<PortCounterSample, SouthboundError>;
}
