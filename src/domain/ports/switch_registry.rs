//! Switch Registry Port
//!
//! Tracks which switches are connected and their one-shot multipath state.

use crate::domain::entities::{GroupState, SwitchState};
use crate::domain::value_objects::DatapathId;

/// Registry of live switches.
///
/// Mutated only by the event reactor. A switch that is absent is "not ready",
/// never an error.
pub trait SwitchRegistry: Send + Sync {
    /// Record a completed features handshake (CONNECTING). Existing entries are kept.
    fn on_handshake(&self, dpid: DatapathId);

    /// Register the switch as ACTIVE if absent, or promote it from CONNECTING.
    /// Returns true if the switch was not active before.
    fn on_connect(&self, dpid: DatapathId) -> bool;

    /// Remove the switch. Returns true if it was present.
    fn on_disconnect(&self, dpid: DatapathId) -> bool;

    /// Whether the switch is registered and ACTIVE.
    fn is_active(&self, dpid: DatapathId) -> bool;

    /// Current connection state (DISCONNECTED for unknown switches).
    fn state(&self, dpid: DatapathId) -> SwitchState;

    /// Multipath configuration state, `None` for unknown switches.
    fn group_state(&self, dpid: DatapathId) -> Option<GroupState>;

    /// Flip the one-shot flag. Returns true only on the PENDING -> GROUP_INSTALLED transition.
    fn mark_group_installed(&self, dpid: DatapathId) -> bool;

    /// All ACTIVE switches, sorted.
    #[allow(dead_code)]
    fn active_switches(&self) -> Vec<DatapathId>;
}
