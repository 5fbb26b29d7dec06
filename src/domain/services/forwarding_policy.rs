//! Forwarding Policy
//!
//! Pure decision logic for a packet-in. This service has NO side effects of
//! its own: MAC learning and table lookups are passed in as closures so the
//! caller controls when the table is mutated.

use crate::domain::entities::{GroupState, LearnOutcome};
use crate::domain::services::packet_classifier::{ClassifiedPacket, PacketKind};
use crate::domain::value_objects::{DatapathId, GroupId, MacAddr, PortNo};
use serde::Deserialize;
use std::collections::BTreeSet;

/// One egress path of the multipath group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathWeight {
    pub port: PortNo,
    /// Relative weight; defaults to equal sharing
    #[serde(default = "default_weight")]
    pub weight: u16,
    /// Egress queue set before output
    #[serde(default)]
    pub queue_id: u32,
}

fn default_weight() -> u16 {
    50
}

/// Where and how the static weighted multipath group is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MultipathPolicy {
    /// Branch switches that get the group
    pub fanout_switches: BTreeSet<DatapathId>,
    /// Only packets entering here are steered into the group
    pub ingress_port: PortNo,
    pub group_id: GroupId,
    pub paths: Vec<PathWeight>,
}

impl MultipathPolicy {
    /// Equal weighting across the given ports.
    pub fn equal_weights(
        fanout_switches: BTreeSet<DatapathId>,
        ingress_port: PortNo,
        group_id: GroupId,
        ports: &[PortNo],
    ) -> Self {
        let weight = if ports.is_empty() {
            0
        } else {
            (100 / ports.len()).max(1) as u16
        };
        Self {
            fanout_switches,
            ingress_port,
            group_id,
            paths: ports
                .iter()
                .map(|&port| PathWeight {
                    port,
                    weight,
                    queue_id: 0,
                })
                .collect(),
        }
    }

    pub fn is_fanout(&self, dpid: DatapathId, in_port: PortNo) -> bool {
        in_port == self.ingress_port && self.fanout_switches.contains(&dpid)
    }

    /// Port the triggering packet is sent to while the group takes over.
    pub fn unblock_port(&self) -> Option<PortNo> {
        self.paths.first().map(|p| p.port)
    }
}

impl Default for MultipathPolicy {
    fn default() -> Self {
        Self::equal_weights(
            [DatapathId(1), DatapathId(2), DatapathId(3)].into_iter().collect(),
            PortNo(1),
            50,
            &[PortNo(2), PortNo(3)],
        )
    }
}

/// Why a packet was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Source MAC already bound to another port
    AnomalousBinding { bound_port: PortNo },
}

/// What the controller should do with a packet-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingDecision {
    /// Install the per-switch IPv6 suppression rule, nothing else
    SuppressIpv6,
    Drop(DropReason),
    /// Send to a known port, optionally caching the path as a flow
    Unicast { out_port: PortNo, cache_flow: bool },
    /// Steer through the multipath group; install it first if still pending
    Multipath {
        install_group: bool,
        unblock_port: PortNo,
        fallback_port: PortNo,
    },
    /// Destination unknown
    Flood,
    /// Not ARP, IPv4 or IPv6
    Ignore,
}

/// Forwarding policy service.
#[derive(Debug, Clone)]
pub struct ForwardingPolicy {
    multipath: MultipathPolicy,
    cache_arp_flows: bool,
}

impl ForwardingPolicy {
    pub fn new(multipath: MultipathPolicy, cache_arp_flows: bool) -> Self {
        Self {
            multipath,
            cache_arp_flows,
        }
    }

    pub fn multipath(&self) -> &MultipathPolicy {
        &self.multipath
    }

    /// Decide what to do with a classified packet.
    ///
    /// Precedence is IPv6, then ARP, then IPv4. `learn` is invoked at most
    /// once: always for ARP, and for IPv4 only when the destination is unknown.
    pub fn decide<L, F>(
        &self,
        dpid: DatapathId,
        in_port: PortNo,
        packet: &ClassifiedPacket,
        group_state: Option<GroupState>,
        lookup: L,
        learn: F,
    ) -> ForwardingDecision
    where
        L: Fn(MacAddr) -> Option<PortNo>,
        F: FnOnce() -> LearnOutcome,
    {
        match packet.kind {
            PacketKind::Ipv6 => ForwardingDecision::SuppressIpv6,
            PacketKind::Arp { .. } => {
                if let LearnOutcome::Conflict { bound_port } = learn() {
                    return ForwardingDecision::Drop(DropReason::AnomalousBinding { bound_port });
                }
                match lookup(packet.eth_dst) {
                    Some(out_port) => ForwardingDecision::Unicast {
                        out_port,
                        cache_flow: self.cache_arp_flows,
                    },
                    None => ForwardingDecision::Flood,
                }
            }
            PacketKind::Ipv4 { .. } => match lookup(packet.eth_dst) {
                Some(out_port) => {
                    let unblock = self.multipath.unblock_port();
                    match unblock {
                        Some(unblock_port) if self.multipath.is_fanout(dpid, in_port) => {
                            ForwardingDecision::Multipath {
                                install_group: group_state == Some(GroupState::Pending),
                                unblock_port,
                                fallback_port: out_port,
                            }
                        }
                        _ => ForwardingDecision::Unicast {
                            out_port,
                            cache_flow: true,
                        },
                    }
                }
                None => match learn() {
                    LearnOutcome::Conflict { bound_port } => {
                        ForwardingDecision::Drop(DropReason::AnomalousBinding { bound_port })
                    }
                    _ => ForwardingDecision::Flood,
                },
            },
            PacketKind::Other => ForwardingDecision::Ignore,
        }
    }
}
