//! Controller Service - Reactive forwarding use case
//!
//! Handles switch lifecycle and packet-in events: keeps the registry and MAC
//! table current, asks the forwarding policy what to do with each packet and
//! carries the decision out on the switch.

use crate::application::FlowInstaller;
use crate::domain::entities::{ControllerEvent, PacketIn};
use crate::domain::ports::{MacTable, SwitchChannel, SwitchRegistry};
use crate::domain::services::{
    ClassifiedPacket, DropReason, FlowBuilder, ForwardingDecision, ForwardingPolicy,
    PacketClassifier, PacketKind,
};
use crate::domain::value_objects::{DatapathId, PortNo, RuleOwner};
use bytes::Bytes;
use std::sync::Arc;

/// What a single event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Features handshake handled; whether the table-miss rule was acknowledged
    Handshake { table_miss_installed: bool },
    Connected { newly_active: bool },
    Disconnected { was_registered: bool },
    Packet(ForwardingOutcome),
    ErrorLogged,
}

/// What was done with a packet-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardingOutcome {
    /// Switch not ACTIVE
    NotReady,
    /// No complete Ethernet header
    Malformed,
    Ignored,
    /// IPv6 dropped; whether the suppression rule was acknowledged
    Ipv6Suppressed { installed: bool },
    Dropped(DropReason),
    /// Sent to a known port, with or without caching a flow
    Unicast { out_port: PortNo, flow_installed: bool },
    /// Steered into the multipath group
    Multipath {
        group_installed: bool,
        flow_installed: bool,
        unblock_port: PortNo,
    },
    Flooded,
}

/// Controller service - the event reactor's use case.
///
/// All mutation of the switch registry and the MAC table happens here, and
/// only from the single task driving [`ControllerService::handle`].
pub struct ControllerService {
    registry: Arc<dyn SwitchRegistry>,
    mac_table: Arc<dyn MacTable>,
    channel: Arc<dyn SwitchChannel>,
    installer: FlowInstaller,
    policy: ForwardingPolicy,
}

impl ControllerService {
    pub fn new(
        registry: Arc<dyn SwitchRegistry>,
        mac_table: Arc<dyn MacTable>,
        channel: Arc<dyn SwitchChannel>,
        policy: ForwardingPolicy,
    ) -> Self {
        Self {
            registry,
            mac_table,
            installer: FlowInstaller::new(RuleOwner::Reactive, channel.clone()),
            channel,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<dyn SwitchRegistry> {
        &self.registry
    }

    pub fn mac_table(&self) -> &Arc<dyn MacTable> {
        &self.mac_table
    }

    /// Dispatch one event. Never fails: southbound errors are logged and absorbed.
    pub async fn handle(&self, event: ControllerEvent) -> EventOutcome {
        match event {
            ControllerEvent::SwitchFeatures { dpid } => self.on_features(dpid).await,
            ControllerEvent::SwitchConnected { dpid } => EventOutcome::Connected {
                newly_active: self.registry.on_connect(dpid),
            },
            ControllerEvent::SwitchDisconnected { dpid } => {
                let was_registered = self.registry.on_disconnect(dpid);
                self.installer.forget_switch(dpid);
                EventOutcome::Disconnected { was_registered }
            }
            ControllerEvent::PacketIn(packet_in) => {
                EventOutcome::Packet(self.on_packet_in(&packet_in).await)
            }
            ControllerEvent::SwitchError {
                dpid,
                error_type,
                code,
                data,
            } => {
                tracing::warn!(
                    "error from {}: type=0x{:02x} code=0x{:02x} message={}",
                    dpid,
                    error_type,
                    code,
                    hex_array(&data)
                );
                EventOutcome::ErrorLogged
            }
        }
    }

    async fn on_features(&self, dpid: DatapathId) -> EventOutcome {
        // New session, previously acked rules may be gone
        self.installer.forget_switch(dpid);
        self.registry.on_handshake(dpid);
        let table_miss_installed = self
            .installer
            .install_flow(dpid, &FlowBuilder::table_miss())
            .await
            .is_ok();
        tracing::info!("switch:{} connected", dpid.0);
        EventOutcome::Handshake {
            table_miss_installed,
        }
    }

    /// Classify, decide and act on one packet-in.
    pub async fn on_packet_in(&self, packet_in: &PacketIn) -> ForwardingOutcome {
        let dpid = packet_in.dpid;
        let in_port = packet_in.in_port;

        if !self.registry.is_active(dpid) {
            tracing::debug!("packet-in from {} ignored, switch not ready", dpid);
            return ForwardingOutcome::NotReady;
        }

        let Some(packet) = PacketClassifier::classify(&packet_in.data) else {
            tracing::debug!("malformed frame from {} port {}", dpid, in_port);
            return ForwardingOutcome::Malformed;
        };

        let decision = self.policy.decide(
            dpid,
            in_port,
            &packet,
            self.registry.group_state(dpid),
            |mac| self.mac_table.lookup(dpid, mac),
            || self.mac_table.learn(dpid, packet.eth_src, in_port),
        );

        match decision {
            ForwardingDecision::SuppressIpv6 => {
                let installed = self
                    .installer
                    .install_flow(dpid, &FlowBuilder::ipv6_suppress())
                    .await
                    .is_ok();
                ForwardingOutcome::Ipv6Suppressed { installed }
            }
            ForwardingDecision::Drop(reason) => {
                tracing::debug!(
                    "{} packet from {} entered {} on port {}, dropped",
                    packet.ether_type,
                    packet.eth_src,
                    dpid,
                    in_port
                );
                ForwardingOutcome::Dropped(reason)
            }
            ForwardingDecision::Unicast {
                out_port,
                cache_flow,
            } => {
                self.unicast(packet_in, &packet, out_port, cache_flow)
                    .await
            }
            ForwardingDecision::Multipath {
                install_group,
                unblock_port,
                fallback_port,
            } => {
                self.multipath(packet_in, &packet, install_group, unblock_port, fallback_port)
                    .await
            }
            ForwardingDecision::Flood => {
                self.flood(dpid, packet_in.data.clone()).await;
                ForwardingOutcome::Flooded
            }
            ForwardingDecision::Ignore => ForwardingOutcome::Ignored,
        }
    }

    async fn unicast(
        &self,
        packet_in: &PacketIn,
        packet: &ClassifiedPacket,
        out_port: PortNo,
        cache_flow: bool,
    ) -> ForwardingOutcome {
        let dpid = packet_in.dpid;
        let flow_installed = if cache_flow {
            let rule =
                FlowBuilder::unicast(packet_in.in_port, packet.eth_dst, packet.ether_type, out_port);
            self.installer.install_flow(dpid, &rule).await.is_ok()
        } else {
            false
        };

        self.packet_out(packet_in, out_port).await;
        ForwardingOutcome::Unicast {
            out_port,
            flow_installed,
        }
    }

    async fn multipath(
        &self,
        packet_in: &PacketIn,
        packet: &ClassifiedPacket,
        install_group: bool,
        unblock_port: PortNo,
        fallback_port: PortNo,
    ) -> ForwardingOutcome {
        let dpid = packet_in.dpid;
        let PacketKind::Ipv4 { src, .. } = packet.kind else {
            return self.unicast(packet_in, packet, fallback_port, true).await;
        };
        let multipath = self.policy.multipath();

        if install_group {
            let group = FlowBuilder::group(multipath);
            if self.installer.install_group(dpid, &group).await.is_err() {
                // Still PENDING; the next eligible packet retries
                return self.unicast(packet_in, packet, fallback_port, true).await;
            }
            if self.registry.mark_group_installed(dpid) {
                tracing::info!("send_group_mod to {}", dpid);
            }
        }

        let rule = FlowBuilder::multipath(packet_in.in_port, src, multipath.group_id);
        let flow_installed = self.installer.install_flow(dpid, &rule).await.is_ok();

        self.packet_out(packet_in, unblock_port).await;
        ForwardingOutcome::Multipath {
            group_installed: install_group,
            flow_installed,
            unblock_port,
        }
    }

    async fn packet_out(&self, packet_in: &PacketIn, out_port: PortNo) {
        if let Err(e) = self
            .channel
            .send_packet_out(
                packet_in.dpid,
                packet_in.payload(),
                packet_in.in_port,
                out_port,
            )
            .await
        {
            tracing::warn!("packet-out to {} port {} failed: {}", packet_in.dpid, out_port, e);
        }
    }

    async fn flood(&self, dpid: DatapathId, data: Bytes) {
        match self.channel.flood(dpid, data).await {
            Ok(()) => tracing::debug!("flooding msg on {}", dpid),
            Err(e) => tracing::warn!("flood on {} failed: {}", dpid, e),
        }
    }
}

/// `0x01 0x02 ...` rendering of an error payload.
fn hex_array(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("0x{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::{DashMapMacTable, DashMapSwitchRegistry, InMemorySwitchChannel};
    use crate::domain::entities::{Action, GroupState, PacketPayload};
    use crate::domain::services::packet_classifier::frames;
    use crate::domain::services::MultipathPolicy;
    use crate::domain::value_objects::{EtherType, MacAddr, RuleId};
    use std::net::Ipv4Addr;
    use tracing_test::traced_test;

    struct Harness {
        service: ControllerService,
        channel: Arc<InMemorySwitchChannel>,
        registry: Arc<DashMapSwitchRegistry>,
    }

    fn harness() -> Harness {
        let channel = Arc::new(InMemorySwitchChannel::new());
        let registry = Arc::new(DashMapSwitchRegistry::new());
        let service = ControllerService::new(
            registry.clone(),
            Arc::new(DashMapMacTable::new()),
            channel.clone(),
            ForwardingPolicy::new(MultipathPolicy::default(), false),
        );
        Harness {
            service,
            channel,
            registry,
        }
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0, 0, 0, 0, 0, last)
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn packet_in(dpid: u64, in_port: u32, frame: Vec<u8>) -> PacketIn {
        PacketIn {
            dpid: DatapathId(dpid),
            in_port: PortNo(in_port),
            buffer_id: None,
            data: Bytes::from(frame),
        }
    }

    #[test]
    fn test_hex_array() {
        assert_eq!(hex_array(&[0x01, 0xab]), "0x01 0xab");
        assert_eq!(hex_array(&[]), "");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_handshake_installs_table_miss() {
        let h = harness();
        let outcome = h
            .service
            .handle(ControllerEvent::SwitchFeatures { dpid: DatapathId(1) })
            .await;
        assert_eq!(
            outcome,
            EventOutcome::Handshake {
                table_miss_installed: true
            }
        );
        let miss = h
            .channel
            .flow(DatapathId(1), 0, &RuleId::table_miss())
            .unwrap();
        assert_eq!(miss.actions, vec![Action::Output(PortNo::CONTROLLER)]);
        assert!(!h.registry.is_active(DatapathId(1)));
        assert!(logs_contain("switch:1 connected"));
    }

    #[tokio::test]
    async fn test_packet_in_before_connect_is_ignored() {
        let h = harness();
        let frame = frames::ipv4(mac(1), mac(2), ip(1), ip(2));
        let outcome = h.service.on_packet_in(&packet_in(1, 1, frame)).await;
        assert_eq!(outcome, ForwardingOutcome::NotReady);
        assert!(h.channel.packet_outs().is_empty());
    }

    #[tokio::test]
    async fn test_ipv6_suppressed_once() {
        let h = harness();
        h.registry.on_connect(DatapathId(4));
        for _ in 0..3 {
            let outcome = h
                .service
                .on_packet_in(&packet_in(4, 1, frames::ipv6(mac(1), mac(2))))
                .await;
            assert_eq!(outcome, ForwardingOutcome::Ipv6Suppressed { installed: true });
        }
        assert_eq!(h.channel.flow_calls(), 1);
        assert!(h.channel.packet_outs().is_empty());
    }

    #[tokio::test]
    async fn test_ipv6_suppression_failure_is_reported() {
        let h = harness();
        h.registry.on_connect(DatapathId(4));
        h.channel.fail_rule(
            RuleId::ipv6_suppress(),
            crate::domain::errors::SouthboundError::Timeout,
        );
        let frame = || packet_in(4, 1, frames::ipv6(mac(1), mac(2)));

        assert_eq!(
            h.service.on_packet_in(&frame()).await,
            ForwardingOutcome::Ipv6Suppressed { installed: false }
        );
        assert!(h.channel.packet_outs().is_empty());

        // Not remembered, so the next packet retries
        h.channel.clear_rule_failure(&RuleId::ipv6_suppress());
        assert_eq!(
            h.service.on_packet_in(&frame()).await,
            ForwardingOutcome::Ipv6Suppressed { installed: true }
        );
        assert_eq!(h.channel.flow_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_ethertype_ignored() {
        let h = harness();
        h.registry.on_connect(DatapathId(4));
        let frame = frames::raw(mac(1), mac(2), EtherType(0x88cc));
        assert_eq!(
            h.service.on_packet_in(&packet_in(4, 1, frame)).await,
            ForwardingOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_buffered_packet_out_carries_buffer_id() {
        let h = harness();
        h.registry.on_connect(DatapathId(4));
        let arp = |src: MacAddr, dst: MacAddr| frames::arp(src, dst, ip(1), ip(2));

        h.service
            .on_packet_in(&packet_in(4, 2, arp(mac(2), MacAddr::broadcast())))
            .await;
        let mut reply = packet_in(4, 1, arp(mac(1), mac(2)));
        reply.buffer_id = Some(77);
        let outcome = h.service.on_packet_in(&reply).await;

        assert_eq!(
            outcome,
            ForwardingOutcome::Unicast {
                out_port: PortNo(2),
                flow_installed: false
            }
        );
        let last = h.channel.packet_outs().pop().unwrap();
        assert_eq!(last.payload, PacketPayload::Buffered(77));
        assert_eq!(last.in_port, PortNo(1));
    }

    #[tokio::test]
    async fn test_group_failure_falls_back_to_unicast() {
        let h = harness();
        h.registry.on_connect(DatapathId(2));
        // Learn h1 behind port 2 so IPv4 towards it is "known"
        h.service
            .on_packet_in(&packet_in(
                2,
                2,
                frames::arp(mac(1), MacAddr::broadcast(), ip(1), ip(3)),
            ))
            .await;

        h.channel
            .fail_groups(Some(crate::domain::errors::SouthboundError::Timeout));
        let frame = frames::ipv4(mac(3), mac(1), ip(3), ip(1));
        let outcome = h.service.on_packet_in(&packet_in(2, 1, frame.clone())).await;
        assert_eq!(
            outcome,
            ForwardingOutcome::Unicast {
                out_port: PortNo(2),
                flow_installed: true
            }
        );
        assert_eq!(h.registry.group_state(DatapathId(2)), Some(GroupState::Pending));

        h.channel.fail_groups(None);
        let outcome = h.service.on_packet_in(&packet_in(2, 1, frame)).await;
        assert_eq!(
            outcome,
            ForwardingOutcome::Multipath {
                group_installed: true,
                flow_installed: true,
                unblock_port: PortNo(2)
            }
        );
        assert_eq!(
            h.registry.group_state(DatapathId(2)),
            Some(GroupState::GroupInstalled)
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_switch_error_is_absorbed() {
        let h = harness();
        let outcome = h
            .service
            .handle(ControllerEvent::SwitchError {
                dpid: DatapathId(1),
                error_type: 1,
                code: 8,
                data: Bytes::from_static(&[0x04, 0x0e]),
            })
            .await;
        assert_eq!(outcome, EventOutcome::ErrorLogged);
        assert!(logs_contain("type=0x01 code=0x08 message=0x04 0x0e"));
    }

    #[tokio::test]
    async fn test_disconnect_forgets_installer_state() {
        let h = harness();
        let features = ControllerEvent::SwitchFeatures { dpid: DatapathId(1) };
        h.service.handle(features.clone()).await;
        h.service
            .handle(ControllerEvent::SwitchDisconnected { dpid: DatapathId(1) })
            .await;
        h.service.handle(features).await;
        assert_eq!(h.channel.flow_calls(), 2);
    }

    #[tokio::test]
    async fn test_repeated_handshake_resends_table_miss() {
        let h = harness();
        let features = ControllerEvent::SwitchFeatures { dpid: DatapathId(5) };
        for _ in 0..2 {
            assert_eq!(
                h.service.handle(features.clone()).await,
                EventOutcome::Handshake {
                    table_miss_installed: true
                }
            );
        }
        assert_eq!(h.channel.flow_calls(), 2);
        assert!(h
            .channel
            .flow(DatapathId(5), 0, &RuleId::table_miss())
            .is_some());
    }
}
