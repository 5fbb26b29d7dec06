//! Flow Builder
//!
//! Builds every flow and group rule the controller installs. All rules that
//! differ only by match fields, output port, priority, table or id come out
//! of the same constructor.

use crate::domain::entities::{
    Action, Bucket, FlowMatch, FlowRule, GroupRule, GroupType, Ipv4Prefix, PathChoice,
};
use crate::domain::services::forwarding_policy::MultipathPolicy;
use crate::domain::services::reroute_policy::MonitoredPath;
use crate::domain::value_objects::{
    priority, EtherType, GroupId, MacAddr, PortNo, Priority, RuleId, TableId,
};
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Table the reactive path writes to.
pub const REACTIVE_TABLE: TableId = 0;

/// Statically provisioned IPv4 forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProvisionedFlow {
    pub dpid: crate::domain::value_objects::DatapathId,
    pub rule_id: u32,
    #[serde(default)]
    pub table_id: TableId,
    pub priority: Priority,
    pub ipv4_src: Ipv4Prefix,
    pub ipv4_dst: Ipv4Prefix,
    pub out_port: PortNo,
    #[serde(default = "default_cookie")]
    pub cookie: u64,
}

pub(crate) fn default_cookie() -> u64 {
    1
}

pub struct FlowBuilder;

impl FlowBuilder {
    /// Generic builder: one output port (or none for drop) at the given identity.
    pub fn rule(
        table_id: TableId,
        rule_id: RuleId,
        priority: Priority,
        flow_match: FlowMatch,
        out_port: Option<PortNo>,
        cookie: u64,
    ) -> FlowRule {
        FlowRule {
            table_id,
            rule_id,
            priority,
            flow_match,
            actions: out_port.map(Action::Output).into_iter().collect(),
            hard_timeout: 0,
            cookie,
        }
    }

    /// Lowest-priority match-all rule punting packets to the controller.
    pub fn table_miss() -> FlowRule {
        Self::rule(
            REACTIVE_TABLE,
            RuleId::table_miss(),
            priority::TABLE_MISS,
            FlowMatch::any(),
            Some(PortNo::CONTROLLER),
            0,
        )
    }

    /// Drop everything with the IPv6 ethertype.
    pub fn ipv6_suppress() -> FlowRule {
        Self::rule(
            REACTIVE_TABLE,
            RuleId::ipv6_suppress(),
            priority::UNICAST,
            FlowMatch {
                ether_type: Some(EtherType::IPV6),
                ..FlowMatch::any()
            },
            None,
            0,
        )
    }

    /// Forward (ingress port, destination mac, ethertype) to a known port.
    pub fn unicast(
        in_port: PortNo,
        eth_dst: MacAddr,
        ether_type: EtherType,
        out_port: PortNo,
    ) -> FlowRule {
        Self::rule(
            REACTIVE_TABLE,
            RuleId::unicast(in_port, eth_dst, ether_type),
            priority::UNICAST,
            FlowMatch {
                in_port: Some(in_port),
                eth_dst: Some(eth_dst),
                ether_type: Some(ether_type),
                ..FlowMatch::any()
            },
            Some(out_port),
            0,
        )
    }

    /// Steer IPv4 traffic from one source entering `in_port` into a group.
    pub fn multipath(in_port: PortNo, ipv4_src: Ipv4Addr, group_id: GroupId) -> FlowRule {
        FlowRule {
            table_id: REACTIVE_TABLE,
            rule_id: RuleId::multipath(in_port, ipv4_src),
            priority: priority::MULTIPATH,
            flow_match: FlowMatch {
                in_port: Some(in_port),
                ether_type: Some(EtherType::IPV4),
                ipv4_src: Some(Ipv4Prefix::host(ipv4_src)),
                ..FlowMatch::any()
            },
            actions: vec![Action::Group(group_id)],
            hard_timeout: 0,
            cookie: 0,
        }
    }

    /// SELECT group with one `[set-queue, output]` bucket per configured path.
    pub fn group(policy: &MultipathPolicy) -> GroupRule {
        GroupRule {
            group_id: policy.group_id,
            group_type: GroupType::Select,
            buckets: policy
                .paths
                .iter()
                .map(|p| Bucket {
                    weight: p.weight,
                    watch_port: PortNo::ANY,
                    watch_group: GroupId::MAX,
                    actions: vec![Action::SetQueue(p.queue_id), Action::Output(p.port)],
                })
                .collect(),
        }
    }

    /// IPv4 src/dst forwarding rule in the provisioned identity space.
    pub fn ipv4_route(
        table_id: TableId,
        rule_id: u32,
        priority: Priority,
        ipv4_src: Ipv4Prefix,
        ipv4_dst: Ipv4Prefix,
        out_port: PortNo,
        cookie: u64,
    ) -> FlowRule {
        Self::rule(
            table_id,
            RuleId::Provisioned(rule_id),
            priority,
            FlowMatch {
                ether_type: Some(EtherType::IPV4),
                ipv4_src: Some(ipv4_src),
                ipv4_dst: Some(ipv4_dst),
                ..FlowMatch::any()
            },
            Some(out_port),
            cookie,
        )
    }

    pub fn provisioned(flow: &ProvisionedFlow) -> FlowRule {
        Self::ipv4_route(
            flow.table_id,
            flow.rule_id,
            flow.priority,
            flow.ipv4_src,
            flow.ipv4_dst,
            flow.out_port,
            flow.cookie,
        )
    }

    /// The two rules routing a monitored flow through `choice`.
    ///
    /// Both rules share a match and differ in id, port and priority. The one
    /// promoted to the high priority comes first.
    pub fn pairing(path: &MonitoredPath, choice: PathChoice) -> [FlowRule; 2] {
        let via = |rule_id: u32, port: PortNo, priority: Priority| {
            Self::ipv4_route(
                path.table_id,
                rule_id,
                priority,
                path.ipv4_src,
                path.ipv4_dst,
                port,
                path.cookie,
            )
        };
        let reference = |priority| via(path.via_reference_rule, path.reference_port, priority);
        let alternate = |priority| via(path.via_alternate_rule, path.alternate_port, priority);

        match choice {
            PathChoice::Reference => [reference(path.high_priority), alternate(path.low_priority)],
            PathChoice::Alternate => [alternate(path.high_priority), reference(path.low_priority)],
        }
    }
}
