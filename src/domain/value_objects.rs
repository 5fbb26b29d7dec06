//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use pnet::util::MacAddr;

/// Datapath identifier of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatapathId(pub u64);

impl DatapathId {
    /// Node name used by the management API (`openflow:<dpid>`).
    pub fn node_name(&self) -> String {
        format!("openflow:{}", self.0)
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Switch port number, including the reserved OpenFlow 1.3 pseudo-ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNo(pub u32);

impl PortNo {
    /// Send out all ports except the ingress port.
    pub const FLOOD: PortNo = PortNo(0xffff_fffb);
    /// Send to the controller.
    pub const CONTROLLER: PortNo = PortNo(0xffff_fffd);
    /// Wildcard port (used for bucket watch ports).
    pub const ANY: PortNo = PortNo(0xffff_ffff);

    pub fn is_reserved(&self) -> bool {
        self.0 >= 0xffff_ff00
    }

    /// Connector name relative to a node, as the management API spells it.
    pub fn connector_suffix(&self) -> String {
        match *self {
            Self::FLOOD => "FLOOD".to_string(),
            Self::CONTROLLER => "CONTROLLER".to_string(),
            Self::ANY => "ANY".to_string(),
            PortNo(n) => n.to_string(),
        }
    }
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FLOOD => write!(f, "flood"),
            Self::CONTROLLER => write!(f, "controller"),
            Self::ANY => write!(f, "any"),
            PortNo(n) => write!(f, "{}", n),
        }
    }
}

/// Ethernet frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EtherType(pub u16);

impl EtherType {
    pub const IPV4: EtherType = EtherType(0x0800);
    pub const ARP: EtherType = EtherType(0x0806);
    pub const IPV6: EtherType = EtherType(0x86dd);
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Flow table identifier.
pub type TableId = u8;

/// Group identifier.
pub type GroupId = u32;

/// Flow priority. Higher wins at match time.
pub type Priority = u16;

/// Priority tiers used by the reactive path.
pub mod priority {
    use super::Priority;

    /// Match-all rule that punts unmatched packets to the controller.
    pub const TABLE_MISS: Priority = 0;
    /// Plain unicast and the IPv6 suppression rule.
    pub const UNICAST: Priority = 1;
    /// Flows steering into the multipath group.
    pub const MULTIPATH: Priority = 3;
}

/// Which component owns a rule identity.
///
/// Reactive and provisioned identities never overlap, so an install from the
/// event reactor can never touch an entry written by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleOwner {
    /// Rules written by the forwarding engine in response to packet-ins.
    Reactive,
    /// Rules written from topology configuration (static flows and monitor pairings).
    Provisioned,
}

impl fmt::Display for RuleOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reactive => write!(f, "reactive"),
            Self::Provisioned => write!(f, "provisioned"),
        }
    }
}

/// Identity of a flow rule within a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    /// Keyed by what the rule matches, so re-learning the same path replaces it.
    Reactive(String),
    /// Numbered by configuration.
    Provisioned(u32),
}

impl RuleId {
    pub fn table_miss() -> Self {
        Self::Reactive("table-miss".to_string())
    }

    pub fn ipv6_suppress() -> Self {
        Self::Reactive("ipv6-drop".to_string())
    }

    pub fn unicast(in_port: PortNo, eth_dst: MacAddr, ether_type: EtherType) -> Self {
        Self::Reactive(format!(
            "unicast-{}-{}-{:04x}",
            in_port.0,
            mac_key(eth_dst),
            ether_type.0
        ))
    }

    pub fn multipath(in_port: PortNo, ipv4_src: std::net::Ipv4Addr) -> Self {
        Self::Reactive(format!("multipath-{}-{}", in_port.0, ipv4_src))
    }

    pub fn owner(&self) -> RuleOwner {
        match self {
            Self::Reactive(_) => RuleOwner::Reactive,
            Self::Provisioned(_) => RuleOwner::Provisioned,
        }
    }

    /// Identifier as written on the wire.
    pub fn wire_id(&self) -> String {
        match self {
            Self::Reactive(key) => format!("reactive-{}", key),
            Self::Provisioned(n) => n.to_string(),
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_id())
    }
}

fn mac_key(mac: MacAddr) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        mac.0, mac.1, mac.2, mac.3, mac.4, mac.5
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_datapath_display_is_padded_hex() {
        assert_eq!(DatapathId(1).to_string(), "0000000000000001");
        assert_eq!(DatapathId(0xabc).to_string(), "0000000000000abc");
        assert_eq!(DatapathId(2).node_name(), "openflow:2");
    }

    #[test]
    fn test_reserved_ports() {
        assert!(PortNo::FLOOD.is_reserved());
        assert!(PortNo::CONTROLLER.is_reserved());
        assert!(PortNo::ANY.is_reserved());
        assert!(!PortNo(3).is_reserved());
        assert_eq!(PortNo::FLOOD.connector_suffix(), "FLOOD");
        assert_eq!(PortNo(7).connector_suffix(), "7");
    }

    #[test]
    fn test_port_display() {
        assert_eq!(PortNo(4).to_string(), "4");
        assert_eq!(PortNo::FLOOD.to_string(), "flood");
    }

    #[test]
    fn test_ether_type_constants() {
        assert_eq!(EtherType::IPV4.0, 2048);
        assert_eq!(EtherType::ARP.0, 2054);
        assert_eq!(EtherType::IPV6.to_string(), "0x86dd");
    }

    #[test]
    fn test_priority_tiers_are_ordered() {
        assert!(priority::TABLE_MISS < priority::UNICAST);
        assert!(priority::UNICAST < priority::MULTIPATH);
    }

    #[test]
    fn test_rule_id_owners() {
        assert_eq!(RuleId::table_miss().owner(), RuleOwner::Reactive);
        assert_eq!(RuleId::Provisioned(1).owner(), RuleOwner::Provisioned);
    }

    #[test]
    fn test_rule_id_wire_spaces_are_disjoint() {
        let reactive = RuleId::unicast(PortNo(1), MacAddr::new(0, 0, 0, 0, 0, 1), EtherType::IPV4);
        assert_eq!(reactive.wire_id(), "reactive-unicast-1-000000000001-0800");
        assert_eq!(RuleId::Provisioned(2).wire_id(), "2");
        assert!(reactive.wire_id().parse::<u32>().is_err());
    }

    #[test]
    fn test_unicast_rule_id_is_stable() {
        let mac = MacAddr::new(0xaa, 0xbb, 0xcc, 0, 0, 1);
        assert_eq!(
            RuleId::unicast(PortNo(2), mac, EtherType::ARP),
            RuleId::unicast(PortNo(2), mac, EtherType::ARP)
        );
        assert_ne!(
            RuleId::unicast(PortNo(2), mac, EtherType::ARP),
            RuleId::unicast(PortNo(3), mac, EtherType::ARP)
        );
    }

    #[test]
    fn test_multipath_rule_id() {
        let id = RuleId::multipath(PortNo(1), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(id.wire_id(), "reactive-multipath-1-10.0.0.1");
    }
}
