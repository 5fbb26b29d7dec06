//! Domain Entities - Core business objects
//!
//! These entities represent the switches, bindings and rules the control plane
//! reasons about. They carry no transport concerns.

use crate::domain::value_objects::{
    DatapathId, EtherType, GroupId, MacAddr, PortNo, Priority, RuleId, TableId,
};
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Instant;

/// Connection state of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    /// Features handshake seen, not yet in the main dispatch state
    Connecting,
    /// Fully connected and accepting rules
    Active,
    /// Not registered (never connected, or gone)
    Disconnected,
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::Connecting => write!(f, "connecting"),
            SwitchState::Active => write!(f, "active"),
            SwitchState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// One-shot multipath configuration state of a fan-out switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Pending,
    GroupInstalled,
}

/// A switch known to the registry.
#[derive(Debug, Clone)]
pub struct Switch {
    pub dpid: DatapathId,
    pub state: SwitchState,
    pub group_state: GroupState,
    /// When the switch was first registered
    pub registered_at: Instant,
}

impl Switch {
    pub fn new(dpid: DatapathId, state: SwitchState) -> Self {
        Self {
            dpid,
            state,
            group_state: GroupState::Pending,
            registered_at: Instant::now(),
        }
    }
}

/// Result of a MAC learning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// No prior binding; one was created
    LearnedNew,
    /// Prior binding already points at this port
    LearnedSame,
    /// Prior binding points at a different port; left untouched
    Conflict { bound_port: PortNo },
}

impl LearnOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, LearnOutcome::Conflict { .. })
    }
}

/// (switch, mac) -> ingress port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacBinding {
    pub dpid: DatapathId,
    pub mac: MacAddr,
    pub port: PortNo,
}

/// IPv4 address with prefix length (CIDR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Ipv4Prefix {
    pub addr: Ipv4Addr,
    pub len: u8,
}

impl Ipv4Prefix {
    pub fn host(addr: Ipv4Addr) -> Self {
        Self { addr, len: 32 }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl std::str::FromStr for Ipv4Prefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (
                addr,
                len.parse::<u8>()
                    .map_err(|_| format!("invalid prefix length in {}", s))?,
            ),
            None => (s, 32),
        };
        if len > 32 {
            return Err(format!("prefix length out of range in {}", s));
        }
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| format!("invalid IPv4 address in {}", s))?;
        Ok(Self { addr, len })
    }
}

impl TryFrom<String> for Ipv4Prefix {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Match fields of a flow rule. `None` means wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub in_port: Option<PortNo>,
    pub eth_dst: Option<MacAddr>,
    pub ether_type: Option<EtherType>,
    pub ipv4_src: Option<Ipv4Prefix>,
    pub ipv4_dst: Option<Ipv4Prefix>,
}

impl FlowMatch {
    pub fn any() -> Self {
        Self::default()
    }
}

/// A single action in an action list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Output(PortNo),
    Group(GroupId),
    SetQueue(u32),
}

/// A flow rule as the controller intends it to be resident on a switch.
///
/// An empty action list drops matching packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub table_id: TableId,
    pub rule_id: RuleId,
    pub priority: Priority,
    pub flow_match: FlowMatch,
    pub actions: Vec<Action>,
    /// Seconds until removal; 0 means permanent
    pub hard_timeout: u16,
    pub cookie: u64,
}

impl FlowRule {
    pub fn identity(&self, dpid: DatapathId) -> FlowIdentity {
        FlowIdentity {
            dpid,
            table_id: self.table_id,
            rule_id: self.rule_id.clone(),
        }
    }

    /// The single output port, if the rule is a plain unicast forward.
    pub fn output_port(&self) -> Option<PortNo> {
        self.actions.iter().find_map(|a| match a {
            Action::Output(p) => Some(*p),
            _ => None,
        })
    }
}

/// (switch, table, rule) - rules sharing an identity replace each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowIdentity {
    pub dpid: DatapathId,
    pub table_id: TableId,
    pub rule_id: RuleId,
}

impl fmt::Display for FlowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/table {}/{}", self.dpid, self.table_id, self.rule_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub weight: u16,
    pub watch_port: PortNo,
    pub watch_group: GroupId,
    pub actions: Vec<Action>,
}

impl Bucket {
    pub fn output_port(&self) -> Option<PortNo> {
        self.actions.iter().find_map(|a| match a {
            Action::Output(p) => Some(*p),
            _ => None,
        })
    }
}

/// Weighted multipath group resident on a switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRule {
    pub group_id: GroupId,
    pub group_type: GroupType,
    pub buckets: Vec<Bucket>,
}

/// Transmitted-bytes counter read from a switch port.
#[derive(Debug, Clone)]
pub struct PortCounterSample {
    pub dpid: DatapathId,
    pub port: PortNo,
    pub bytes_transmitted: u64,
    pub timestamp: Instant,
}

/// Which candidate egress the monitored flow currently takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathChoice {
    /// Through the measured reference port
    Reference,
    /// Through the alternate port
    Alternate,
}

impl fmt::Display for PathChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathChoice::Reference => write!(f, "reference"),
            PathChoice::Alternate => write!(f, "alternate"),
        }
    }
}

/// Monitor-side view of one rerouted flow.
#[derive(Debug, Clone)]
pub struct PathState {
    pub dpid: DatapathId,
    pub reference_port: PortNo,
    pub alternate_port: PortNo,
    pub via_reference_rule: RuleId,
    pub via_alternate_rule: RuleId,
    /// Last fully applied pairing, `None` before the first one
    pub active: Option<PathChoice>,
    /// Last informative speed in bytes per second
    pub last_speed: Option<f64>,
    /// Cycles run so far (stale and failed ones included)
    pub cycles: u64,
}

impl PathState {
    pub fn active_port(&self) -> Option<PortNo> {
        self.active.map(|c| match c {
            PathChoice::Reference => self.reference_port,
            PathChoice::Alternate => self.alternate_port,
        })
    }

    pub fn standby_port(&self) -> Option<PortNo> {
        self.active.map(|c| match c {
            PathChoice::Reference => self.alternate_port,
            PathChoice::Alternate => self.reference_port,
        })
    }
}

/// Packet carried by a packet-out: either still buffered on the switch, or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketPayload {
    Buffered(u32),
    Raw(Bytes),
}

/// Unmatched packet delivered to the controller.
#[derive(Debug, Clone)]
pub struct PacketIn {
    pub dpid: DatapathId,
    pub in_port: PortNo,
    /// Switch-side buffer holding the packet, if any
    pub buffer_id: Option<u32>,
    pub data: Bytes,
}

impl PacketIn {
    /// Raw bytes are only attached when the switch did not buffer the packet.
    pub fn payload(&self) -> PacketPayload {
        match self.buffer_id {
            Some(id) => PacketPayload::Buffered(id),
            None => PacketPayload::Raw(self.data.clone()),
        }
    }
}

/// Notifications delivered by the host event-dispatch runtime.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Features handshake completed
    SwitchFeatures { dpid: DatapathId },
    /// Switch entered the main dispatch state
    SwitchConnected { dpid: DatapathId },
    /// Switch connection went away
    SwitchDisconnected { dpid: DatapathId },
    PacketIn(PacketIn),
    /// Error message reported by a switch
    SwitchError {
        dpid: DatapathId,
        error_type: u16,
        code: u16,
        data: Bytes,
    },
}

impl ControllerEvent {
    pub fn dpid(&self) -> DatapathId {
        match self {
            ControllerEvent::SwitchFeatures { dpid }
            | ControllerEvent::SwitchConnected { dpid }
            | ControllerEvent::SwitchDisconnected { dpid }
            | ControllerEvent::SwitchError { dpid, .. } => *dpid,
            ControllerEvent::PacketIn(p) => p.dpid,
        }
    }
}
