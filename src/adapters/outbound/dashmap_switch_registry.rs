//! DashMap Switch Registry
//!
//! Implements SwitchRegistry using DashMap for lock-free concurrent reads.

use crate::domain::entities::{GroupState, Switch, SwitchState};
use crate::domain::ports::SwitchRegistry;
use crate::domain::value_objects::DatapathId;
use dashmap::DashMap;
use std::sync::Arc;

/// DashMap-backed switch registry.
pub struct DashMapSwitchRegistry {
    switches: Arc<DashMap<DatapathId, Switch>>,
}

impl DashMapSwitchRegistry {
    pub fn new() -> Self {
        Self {
            switches: Arc::new(DashMap::new()),
        }
    }

    /// Snapshot of one registered switch.
    #[allow(dead_code)]
    pub fn get(&self, dpid: DatapathId) -> Option<Switch> {
        self.switches.get(&dpid).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

impl Default for DashMapSwitchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchRegistry for DashMapSwitchRegistry {
    fn on_handshake(&self, dpid: DatapathId) {
        self.switches
            .entry(dpid)
            .or_insert_with(|| Switch::new(dpid, SwitchState::Connecting));
    }

    fn on_connect(&self, dpid: DatapathId) -> bool {
        let mut entry = self
            .switches
            .entry(dpid)
            .or_insert_with(|| Switch::new(dpid, SwitchState::Connecting));
        let promoted = entry.state != SwitchState::Active;
        entry.state = SwitchState::Active;
        if promoted {
            tracing::debug!("register datapath: {}", dpid);
        }
        promoted
    }

    fn on_disconnect(&self, dpid: DatapathId) -> bool {
        let removed = self.switches.remove(&dpid).is_some();
        if removed {
            tracing::debug!("unregister datapath: {}", dpid);
        }
        removed
    }

    fn is_active(&self, dpid: DatapathId) -> bool {
        self.state(dpid) == SwitchState::Active
    }

    fn state(&self, dpid: DatapathId) -> SwitchState {
        self.switches
            .get(&dpid)
            .map(|e| e.state)
            .unwrap_or(SwitchState::Disconnected)
    }

    fn group_state(&self, dpid: DatapathId) -> Option<GroupState> {
        self.switches.get(&dpid).map(|e| e.group_state)
    }

    fn mark_group_installed(&self, dpid: DatapathId) -> bool {
        match self.switches.get_mut(&dpid) {
            Some(mut entry) if entry.group_state == GroupState::Pending => {
                entry.group_state = GroupState::GroupInstalled;
                true
            }
            _ => false,
        }
    }

    fn active_switches(&self) -> Vec<DatapathId> {
        let mut active: Vec<DatapathId> = self
            .switches
            .iter()
            .filter(|e| e.value().state == SwitchState::Active)
            .map(|e| *e.key())
            .collect();
        active.sort();
        active
    }
}
