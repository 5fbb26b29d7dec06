//! Utilization Monitor
//!
//! Periodically samples the transmitted-bytes counter of a reference port and
//! swaps a monitored flow between two egress ports when that port is busy.

use crate::application::FlowInstaller;
use crate::domain::entities::{PathChoice, PathState};
use crate::domain::ports::SwitchChannel;
use crate::domain::services::{
    FlowBuilder, MonitoredPath, ProvisionedFlow, RerouteDecision, ReroutePolicy,
};
use crate::domain::value_objects::{RuleId, RuleOwner};
use crate::infrastructure::shutdown::ShutdownController;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Gap between the two samples of a cycle
    pub sample_interval: Duration,
    /// Bytes per second at or above which the alternate port takes over
    pub threshold_bps: f64,
    /// Stop after this many cycles; `None` runs until cancelled
    pub max_cycles: Option<u64>,
    /// Idle time between cycles
    pub cycle_pause: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(100),
            threshold_bps: 1000.0,
            max_cycles: None,
            cycle_pause: Duration::ZERO,
        }
    }
}

/// Result of one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Counter did not move; rules untouched
    Stale,
    /// Both rules of the pairing acknowledged
    Applied { choice: PathChoice, speed: f64 },
    /// Promotion rejected; the previous pairing is still authoritative
    PromotionFailed { choice: PathChoice },
    /// Promotion acknowledged but the demotion was not
    DemotionFailed { choice: PathChoice },
    /// A counter read failed
    SampleFailed,
    /// Shutdown arrived between the two samples
    Cancelled,
}

pub struct UtilizationMonitor {
    config: MonitorConfig,
    policy: ReroutePolicy,
    path: MonitoredPath,
    static_flows: Vec<ProvisionedFlow>,
    channel: Arc<dyn SwitchChannel>,
    installer: FlowInstaller,
    state: Arc<RwLock<PathState>>,
}

impl UtilizationMonitor {
    pub fn new(
        config: MonitorConfig,
        path: MonitoredPath,
        static_flows: Vec<ProvisionedFlow>,
        channel: Arc<dyn SwitchChannel>,
    ) -> Self {
        let state = PathState {
            dpid: path.dpid,
            reference_port: path.reference_port,
            alternate_port: path.alternate_port,
            via_reference_rule: RuleId::Provisioned(path.via_reference_rule),
            via_alternate_rule: RuleId::Provisioned(path.via_alternate_rule),
            active: None,
            last_speed: None,
            cycles: 0,
        };
        Self {
            policy: ReroutePolicy::new(config.sample_interval, config.threshold_bps),
            config,
            path,
            static_flows,
            installer: FlowInstaller::new(RuleOwner::Provisioned, channel.clone()),
            channel,
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Snapshot of the monitored path.
    pub async fn path_state(&self) -> PathState {
        self.state.read().await.clone()
    }

    /// Shared handle to the live path state.
    pub fn state_handle(&self) -> Arc<RwLock<PathState>> {
        self.state.clone()
    }

    /// Install the configured static flows. Returns how many were acknowledged.
    pub async fn provision(&self) -> usize {
        let mut installed = 0;
        for flow in &self.static_flows {
            let rule = FlowBuilder::provisioned(flow);
            if self.installer.install_flow(flow.dpid, &rule).await.is_ok() {
                installed += 1;
            }
        }
        tracing::info!(
            "provisioned {}/{} static flows",
            installed,
            self.static_flows.len()
        );
        installed
    }

    /// Spawn the monitor loop. The handle yields the number of cycles run.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start(self: Arc<Self>, shutdown: ShutdownController) -> JoinHandle<u64> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Provision, then poll until cancelled or the cycle bound is reached.
    ///
    /// Cancellation is only observed between cycles and while waiting between
    /// samples, never between the two installs of a pairing.
    pub async fn run(&self, shutdown: ShutdownController) -> u64 {
        let _guard = shutdown.task_guard();
        let mut cancel = shutdown.subscribe();

        self.provision().await;

        let mut cycles = 0u64;
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            if self.config.max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            if self.run_cycle(&mut cancel).await == CycleOutcome::Cancelled {
                break;
            }
            cycles += 1;

            if !self.config.cycle_pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.cycle_pause) => {}
                    _ = cancel.recv() => break,
                }
            }
        }

        tracing::info!("utilization monitor stopped after {} cycles", cycles);
        cycles
    }

    /// Sample, wait, sample again, then apply the decided pairing.
    pub async fn run_cycle(&self, cancel: &mut broadcast::Receiver<()>) -> CycleOutcome {
        let dpid = self.path.dpid;
        let port = self.path.reference_port;

        let t0 = match self.channel.query_port_counters(dpid, port).await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("counter read on {} port {} failed: {}", dpid, port, e);
                return self.finish(CycleOutcome::SampleFailed, None).await;
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(self.config.sample_interval) => {}
            _ = cancel.recv() => {
                tracing::info!("monitor cycle cancelled between samples");
                return CycleOutcome::Cancelled;
            }
        }

        let t1 = match self.channel.query_port_counters(dpid, port).await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("counter read on {} port {} failed: {}", dpid, port, e);
                return self.finish(CycleOutcome::SampleFailed, None).await;
            }
        };

        let decision = self.policy.decide(&t0, &t1);
        let (choice, speed) = match decision {
            RerouteDecision::Stale => {
                tracing::debug!(
                    "stale sample on {} port {} ({} bytes)",
                    dpid,
                    port,
                    t1.bytes_transmitted
                );
                return self.finish(CycleOutcome::Stale, None).await;
            }
            RerouteDecision::ViaReference { speed } => (PathChoice::Reference, speed),
            RerouteDecision::ViaAlternate { speed } => (PathChoice::Alternate, speed),
        };

        // Sent on every non-stale cycle, unchanged or not
        let [promote, demote] = FlowBuilder::pairing(&self.path, choice);

        if self.installer.push_flow(dpid, &promote).await.is_err() {
            tracing::error!("reroute via {} abandoned, promotion failed", choice);
            return self
                .finish(CycleOutcome::PromotionFailed { choice }, Some(speed))
                .await;
        }
        if self.installer.push_flow(dpid, &demote).await.is_err() {
            tracing::error!("reroute via {} incomplete, demotion failed", choice);
            return self
                .finish(CycleOutcome::DemotionFailed { choice }, Some(speed))
                .await;
        }

        let out_port = promote.output_port().unwrap_or(port);
        tracing::info!(
            "{:.0} B/s on {} port {}, routing {} -> {} via {} port {}",
            speed,
            dpid,
            port,
            self.path.ipv4_src,
            self.path.ipv4_dst,
            choice,
            out_port
        );
        self.finish(CycleOutcome::Applied { choice, speed }, Some(speed))
            .await
    }

    async fn finish(&self, outcome: CycleOutcome, speed: Option<f64>) -> CycleOutcome {
        let mut state = self.state.write().await;
        state.cycles += 1;
        if speed.is_some() {
            state.last_speed = speed;
        }
        if let CycleOutcome::Applied { choice, .. } = outcome {
            state.active = Some(choice);
        }
        outcome
    }
}
