//! Flow Installer
//!
//! Pushes flow and group rules through the southbound channel. Each installer
//! handle is bound to one identity space, so the reactive path and the
//! monitor can share a channel without ever writing the same switch entry.

use crate::domain::entities::{FlowIdentity, FlowRule, GroupRule};
use crate::domain::errors::InstallError;
use crate::domain::ports::SwitchChannel;
use crate::domain::value_objects::{DatapathId, GroupId, RuleOwner};
use dashmap::DashMap;
use std::sync::Arc;

/// Installer handle for one [`RuleOwner`].
///
/// Remembers the last acknowledged rule per identity and skips exact repeats.
/// Rules with a hard timeout are always re-sent since the switch may have
/// expired them.
pub struct FlowInstaller {
    owner: RuleOwner,
    channel: Arc<dyn SwitchChannel>,
    acked_flows: DashMap<FlowIdentity, FlowRule>,
    acked_groups: DashMap<(DatapathId, GroupId), GroupRule>,
}

impl FlowInstaller {
    pub fn new(owner: RuleOwner, channel: Arc<dyn SwitchChannel>) -> Self {
        Self {
            owner,
            channel,
            acked_flows: DashMap::new(),
            acked_groups: DashMap::new(),
        }
    }

    pub fn owner(&self) -> RuleOwner {
        self.owner
    }

    /// Install or replace a flow. Repeating an acknowledged install is a no-op.
    pub async fn install_flow(&self, dpid: DatapathId, rule: &FlowRule) -> Result<(), InstallError> {
        self.check_owner(dpid, rule)?;

        let identity = rule.identity(dpid);
        if rule.hard_timeout == 0
            && self
                .acked_flows
                .get(&identity)
                .is_some_and(|acked| acked.value() == rule)
        {
            tracing::trace!("flow {} already installed", identity);
            return Ok(());
        }

        self.send_flow(dpid, rule).await
    }

    /// Install or replace a flow even if the same rule was acknowledged before.
    ///
    /// For rules whose switch-side presence must be reasserted on every pass.
    pub async fn push_flow(&self, dpid: DatapathId, rule: &FlowRule) -> Result<(), InstallError> {
        self.check_owner(dpid, rule)?;
        self.send_flow(dpid, rule).await
    }

    fn check_owner(&self, dpid: DatapathId, rule: &FlowRule) -> Result<(), InstallError> {
        if rule.rule_id.owner() != self.owner {
            tracing::error!(
                "{} installer refused rule {} on {}",
                self.owner,
                rule.rule_id,
                dpid
            );
            return Err(InstallError::ForeignIdentity {
                owner: self.owner,
                rule_id: rule.rule_id.clone(),
            });
        }
        Ok(())
    }

    async fn send_flow(&self, dpid: DatapathId, rule: &FlowRule) -> Result<(), InstallError> {
        let identity = rule.identity(dpid);
        match self.channel.install_flow(dpid, rule).await {
            Ok(()) => {
                tracing::debug!(
                    "flow {} installed at priority {}",
                    identity,
                    rule.priority
                );
                self.acked_flows.insert(identity, rule.clone());
                Ok(())
            }
            Err(e) => {
                // The switch-side entry is now unknown
                self.acked_flows.remove(&identity);
                tracing::warn!("flow install failed for {}: {}", identity, e);
                Err(e.into())
            }
        }
    }

    /// Install or replace a group.
    pub async fn install_group(
        &self,
        dpid: DatapathId,
        group: &GroupRule,
    ) -> Result<(), InstallError> {
        let key = (dpid, group.group_id);
        if self
            .acked_groups
            .get(&key)
            .is_some_and(|acked| acked.value() == group)
        {
            return Ok(());
        }

        match self.channel.install_group(dpid, group).await {
            Ok(()) => {
                self.acked_groups.insert(key, group.clone());
                Ok(())
            }
            Err(e) => {
                self.acked_groups.remove(&key);
                tracing::warn!(
                    "group {} install failed on {}: {}",
                    group.group_id,
                    dpid,
                    e
                );
                Err(e.into())
            }
        }
    }

    /// Drop everything remembered about a switch, e.g. after it disconnected.
    pub fn forget_switch(&self, dpid: DatapathId) {
        self.acked_flows.retain(|identity, _| identity.dpid != dpid);
        self.acked_groups.retain(|(d, _), _| *d != dpid);
    }

    /// Number of flows acknowledged and remembered.
    pub fn remembered_flows(&self) -> usize {
        self.acked_flows.len()
    }
}
