//! In-Memory Switch Channel
//!
//! Simulates switch flow and group tables in process. Used for dry runs
//! (`BALANCER_SOUTHBOUND=memory`) and by the test suites, which script port
//! counters and inject southbound failures through it.

use crate::domain::entities::{
    FlowIdentity, FlowRule, GroupRule, PacketPayload, PortCounterSample,
};
use crate::domain::errors::SouthboundError;
use crate::domain::ports::SwitchChannel;
use crate::domain::value_objects::{DatapathId, GroupId, PortNo, RuleId};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// A packet-out as received by the simulated switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOutRecord {
    pub dpid: DatapathId,
    pub payload: PacketPayload,
    pub in_port: PortNo,
    pub out_port: PortNo,
}

impl PacketOutRecord {
    pub fn is_flood(&self) -> bool {
        self.out_port == PortNo::FLOOD
    }
}

/// Scripted counter: values are consumed in order, the last one repeats.
#[derive(Debug, Default)]
struct CounterScript {
    values: VecDeque<u64>,
    last: u64,
}

impl CounterScript {
    fn next(&mut self) -> u64 {
        if let Some(v) = self.values.pop_front() {
            self.last = v;
        }
        self.last
    }
}

/// Entries kept in each record log before the oldest are dropped.
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

pub struct InMemorySwitchChannel {
    flows: DashMap<FlowIdentity, FlowRule>,
    groups: DashMap<(DatapathId, GroupId), GroupRule>,
    /// Most recent packet-outs, oldest first
    packet_outs: Mutex<VecDeque<PacketOutRecord>>,
    /// Most recent acknowledged flow installs, in call order
    install_log: Mutex<VecDeque<(DatapathId, FlowRule)>>,
    log_capacity: usize,
    counters: DashMap<(DatapathId, PortNo), CounterScript>,
    failing_rules: DashMap<RuleId, SouthboundError>,
    failing_counters: DashMap<(DatapathId, PortNo), SouthboundError>,
    group_failure: Mutex<Option<SouthboundError>>,
    flow_calls: AtomicUsize,
    group_calls: AtomicUsize,
    counter_reads: AtomicUsize,
}

impl Default for InMemorySwitchChannel {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }
}

fn record<T>(log: &Mutex<VecDeque<T>>, capacity: usize, entry: T) {
    let mut log = log.lock();
    while log.len() >= capacity.max(1) {
        log.pop_front();
    }
    log.push_back(entry);
}

impl InMemorySwitchChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the install and packet-out logs to `capacity` entries each.
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            flows: DashMap::new(),
            groups: DashMap::new(),
            packet_outs: Mutex::new(VecDeque::new()),
            install_log: Mutex::new(VecDeque::new()),
            log_capacity: capacity,
            counters: DashMap::new(),
            failing_rules: DashMap::new(),
            failing_counters: DashMap::new(),
            group_failure: Mutex::new(None),
            flow_calls: AtomicUsize::new(0),
            group_calls: AtomicUsize::new(0),
            counter_reads: AtomicUsize::new(0),
        }
    }

    // ---- scripting ----

    /// Queue counter values for a port. Reads past the end repeat the last value.
    pub fn script_counters(
        &self,
        dpid: DatapathId,
        port: PortNo,
        values: impl IntoIterator<Item = u64>,
    ) {
        self.counters
            .entry((dpid, port))
            .or_default()
            .values
            .extend(values);
    }

    /// Make every install of `rule_id` fail until cleared.
    pub fn fail_rule(&self, rule_id: RuleId, error: SouthboundError) {
        self.failing_rules.insert(rule_id, error);
    }

    pub fn clear_rule_failure(&self, rule_id: &RuleId) {
        self.failing_rules.remove(rule_id);
    }

    pub fn fail_counters(&self, dpid: DatapathId, port: PortNo, error: SouthboundError) {
        self.failing_counters.insert((dpid, port), error);
    }

    pub fn fail_groups(&self, error: Option<SouthboundError>) {
        *self.group_failure.lock() = error;
    }

    // ---- inspection ----

    /// Rule resident under an identity.
    pub fn flow(&self, dpid: DatapathId, table_id: u8, rule_id: &RuleId) -> Option<FlowRule> {
        self.flows
            .get(&FlowIdentity {
                dpid,
                table_id,
                rule_id: rule_id.clone(),
            })
            .map(|e| e.value().clone())
    }

    /// All rules resident on a switch.
    pub fn flows(&self, dpid: DatapathId) -> Vec<FlowRule> {
        self.flows
            .iter()
            .filter(|e| e.key().dpid == dpid)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn group(&self, dpid: DatapathId, group_id: GroupId) -> Option<GroupRule> {
        self.groups.get(&(dpid, group_id)).map(|e| e.value().clone())
    }

    pub fn packet_outs(&self) -> Vec<PacketOutRecord> {
        self.packet_outs.lock().iter().cloned().collect()
    }

    pub fn floods(&self) -> Vec<PacketOutRecord> {
        self.packet_outs
            .lock()
            .iter()
            .filter(|p| p.is_flood())
            .cloned()
            .collect()
    }

    pub fn install_log(&self) -> Vec<(DatapathId, FlowRule)> {
        self.install_log.lock().iter().cloned().collect()
    }

    /// Flow install calls, failed ones included.
    pub fn flow_calls(&self) -> usize {
        self.flow_calls.load(Ordering::Relaxed)
    }

    /// Group install calls, failed ones included.
    pub fn group_calls(&self) -> usize {
        self.group_calls.load(Ordering::Relaxed)
    }

    pub fn counter_reads(&self) -> usize {
        self.counter_reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SwitchChannel for InMemorySwitchChannel {
    async fn install_flow(&self, dpid: DatapathId, rule: &FlowRule) -> Result<(), SouthboundError> {
        self.flow_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.failing_rules.get(&rule.rule_id) {
            return Err(err.value().clone());
        }
        self.flows.insert(rule.identity(dpid), rule.clone());
        record(&self.install_log, self.log_capacity, (dpid, rule.clone()));
        Ok(())
    }

    async fn install_group(
        &self,
        dpid: DatapathId,
        group: &GroupRule,
    ) -> Result<(), SouthboundError> {
        self.group_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.group_failure.lock().clone() {
            return Err(err);
        }
        self.groups.insert((dpid, group.group_id), group.clone());
        Ok(())
    }

    async fn send_packet_out(
        &self,
        dpid: DatapathId,
        payload: PacketPayload,
        in_port: PortNo,
        out_port: PortNo,
    ) -> Result<(), SouthboundError> {
        record(
            &self.packet_outs,
            self.log_capacity,
            PacketOutRecord {
                dpid,
                payload,
                in_port,
                out_port,
            },
        );
        Ok(())
    }

    async fn query_port_counters(
        &self,
        dpid: DatapathId,
        port: PortNo,
    ) -> Result<PortCounterSample, SouthboundError> {
        self.counter_reads.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.failing_counters.get(&(dpid, port)) {
            return Err(err.value().clone());
        }
        // Unscripted ports behave like an idle link
        let bytes_transmitted = self
            .counters
            .get_mut(&(dpid, port))
            .map(|mut script| script.next())
            .unwrap_or(0);
        Ok(PortCounterSample {
            dpid,
            port,
            bytes_transmitted,
            timestamp: Instant::now(),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::entities::{Action, FlowMatch};
    use crate::domain::services::FlowBuilder;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_install_replaces_by_identity() {
        let ch = InMemorySwitchChannel::new();
        let first = FlowBuilder::rule(
            0,
            RuleId::Provisioned(1),
            101,
            FlowMatch::any(),
            Some(PortNo(1)),
            1,
        );
        let mut second = first.clone();
        second.priority = 100;
        second.actions = vec![Action::Output(PortNo(2))];

        ch.install_flow(DatapathId(2), &first).await.unwrap();
        ch.install_flow(DatapathId(2), &second).await.unwrap();

        assert_eq!(ch.flow_count(), 1);
        let resident = ch.flow(DatapathId(2), 0, &RuleId::Provisioned(1)).unwrap();
        assert_eq!(resident.priority, 100);
        assert_eq!(resident.output_port(), Some(PortNo(2)));
        assert_eq!(ch.install_log().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_counters_repeat_last() {
        let ch = InMemorySwitchChannel::new();
        ch.script_counters(DatapathId(2), PortNo(1), [1000, 1050]);

        let first = ch.query_port_counters(DatapathId(2), PortNo(1)).await.unwrap();
        assert_eq!(first.bytes_transmitted, 1000);
        let next = ch.query_port_counters(DatapathId(2), PortNo(1)).await.unwrap();
        assert_eq!(next.bytes_transmitted, 1050);
        let again = ch.query_port_counters(DatapathId(2), PortNo(1)).await.unwrap();
        assert_eq!(again.bytes_transmitted, 1050);

        let idle = ch.query_port_counters(DatapathId(9), PortNo(1)).await.unwrap();
        assert_eq!(idle.bytes_transmitted, 0);
        assert_eq!(ch.counter_reads(), 4);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let ch = InMemorySwitchChannel::new();
        ch.fail_rule(RuleId::table_miss(), SouthboundError::Timeout);
        assert!(ch
            .install_flow(DatapathId(1), &FlowBuilder::table_miss())
            .await
            .is_err());
        assert_eq!(ch.flow_calls(), 1);
        assert_eq!(ch.flow_count(), 0);

        ch.clear_rule_failure(&RuleId::table_miss());
        ch.install_flow(DatapathId(1), &FlowBuilder::table_miss())
            .await
            .unwrap();
        assert_eq!(ch.flow_count(), 1);

        ch.fail_counters(DatapathId(2), PortNo(1), SouthboundError::Timeout);
        assert!(matches!(
            ch.query_port_counters(DatapathId(2), PortNo(1)).await,
            Err(SouthboundError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_flood_is_recorded() {
        let ch = InMemorySwitchChannel::new();
        ch.flood(DatapathId(1), Bytes::from_static(b"x")).await.unwrap();
        ch.send_packet_out(DatapathId(1), PacketPayload::Buffered(3), PortNo(1), PortNo(2))
            .await
            .unwrap();

        assert_eq!(ch.packet_outs().len(), 2);
        let floods = ch.floods();
        assert_eq!(floods.len(), 1);
        assert_eq!(floods[0].in_port, PortNo::CONTROLLER);
        assert_eq!(floods[0].payload, PacketPayload::Raw(Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn test_logs_keep_most_recent_entries() {
        let ch = InMemorySwitchChannel::with_log_capacity(3);
        for id in 0..5 {
            let rule = FlowBuilder::rule(
                0,
                RuleId::Provisioned(id),
                101,
                FlowMatch::any(),
                Some(PortNo(1)),
                1,
            );
            ch.install_flow(DatapathId(2), &rule).await.unwrap();
            ch.send_packet_out(DatapathId(2), PacketPayload::Buffered(id), PortNo(1), PortNo(2))
                .await
                .unwrap();
        }

        let logged: Vec<RuleId> = ch.install_log().into_iter().map(|(_, r)| r.rule_id).collect();
        assert_eq!(
            logged,
            vec![
                RuleId::Provisioned(2),
                RuleId::Provisioned(3),
                RuleId::Provisioned(4)
            ]
        );
        let buffers: Vec<PacketPayload> = ch.packet_outs().into_iter().map(|p| p.payload).collect();
        assert_eq!(
            buffers,
            vec![
                PacketPayload::Buffered(2),
                PacketPayload::Buffered(3),
                PacketPayload::Buffered(4)
            ]
        );

        // Tables and counters are not affected by the log bound
        assert_eq!(ch.flow_count(), 5);
        assert_eq!(ch.flow_calls(), 5);
    }
}
