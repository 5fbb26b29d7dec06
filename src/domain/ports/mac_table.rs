//! MAC Table Port
//!
//! Per-switch MAC address to ingress port bindings.

use crate::domain::entities::{LearnOutcome, MacBinding};
use crate::domain::value_objects::{DatapathId, MacAddr, PortNo};

/// MAC learning table.
///
/// A binding is created on first sight and never migrated: a packet from a
/// known MAC arriving on a different port is reported as a conflict and the
/// existing binding stays in place.
pub trait MacTable: Send + Sync {
    /// Learn that `mac` lives behind `in_port` on `dpid`.
    fn learn(&self, dpid: DatapathId, mac: MacAddr, in_port: PortNo) -> LearnOutcome;

    /// Port behind which `mac` was learned on `dpid`.
    fn lookup(&self, dpid: DatapathId, mac: MacAddr) -> Option<PortNo>;

    /// All bindings learned on one switch.
    #[allow(dead_code)]
    fn bindings(&self, dpid: DatapathId) -> Vec<MacBinding>;

    /// Total number of bindings across switches.
    #[allow(dead_code)]
    fn count(&self) -> usize;
}
