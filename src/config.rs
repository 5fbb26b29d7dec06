use crate::adapters::outbound::RestconfConfig;
use crate::domain::entities::Ipv4Prefix;
use crate::domain::services::{MonitoredPath, MultipathPolicy, ProvisionedFlow};
use crate::domain::value_objects::{DatapathId, PortNo, TableId};
use crate::infrastructure::MonitorConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Which southbound binding to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SouthboundKind {
    /// Network-management REST API
    Restconf,
    /// Simulated in-process switches (dry run)
    Memory,
}

impl SouthboundKind {
    fn from_env(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "memory" => SouthboundKind::Memory,
            _ => SouthboundKind::Restconf,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Southbound settings
    pub southbound: SouthboundKind,
    pub restconf_url: String,
    pub restconf_user: String,
    pub restconf_password: String,
    pub southbound_timeout_ms: u64,

    pub topology_path: Option<String>,

    // Utilization monitor settings
    pub monitor_enabled: bool,
    pub sample_interval_ms: u64,
    pub threshold_bps: f64,
    pub monitor_max_cycles: Option<u64>,
    pub cycle_pause_ms: u64,

    // Reactive forwarding settings
    pub cache_arp_flows: bool,
    pub event_queue: usize,

    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            southbound: SouthboundKind::Restconf,
            restconf_url: "http://127.0.0.1:8181/restconf".to_string(),
            restconf_user: "admin".to_string(),
            restconf_password: "admin".to_string(),
            southbound_timeout_ms: 2000,
            topology_path: None,
            monitor_enabled: true,
            sample_interval_ms: 100,
            threshold_bps: 1000.0,
            monitor_max_cycles: None,
            cycle_pause_ms: 0,
            cache_arp_flows: false,
            event_queue: 1024,
            debug: false,
        }
    }
}

impl Config {
    pub fn restconf(&self) -> RestconfConfig {
        RestconfConfig {
            base_url: self.restconf_url.clone(),
            username: self.restconf_user.clone(),
            password: self.restconf_password.clone(),
            timeout: Duration::from_millis(self.southbound_timeout_ms),
        }
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            threshold_bps: self.threshold_bps,
            max_cycles: self.monitor_max_cycles,
            cycle_pause: Duration::from_millis(self.cycle_pause_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroSampleInterval);
        }
        if !(self.threshold_bps.is_finite() && self.threshold_bps >= 0.0) {
            return Err(ConfigError::InvalidThreshold(self.threshold_bps));
        }
        Ok(())
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

pub fn load_config() -> anyhow::Result<Config> {
    let southbound = std::env::var("BALANCER_SOUTHBOUND")
        .map(|v| SouthboundKind::from_env(&v))
        .unwrap_or(SouthboundKind::Restconf);

    let restconf_url = std::env::var("BALANCER_RESTCONF_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8181/restconf".to_string());

    let restconf_user =
        std::env::var("BALANCER_RESTCONF_USER").unwrap_or_else(|_| "admin".to_string());

    let restconf_password =
        std::env::var("BALANCER_RESTCONF_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    let southbound_timeout_ms = std::env::var("BALANCER_SOUTHBOUND_TIMEOUT_MS")
        .unwrap_or_else(|_| "2000".to_string())
        .parse()
        .unwrap_or(2000);

    let topology_path = std::env::var("BALANCER_TOPOLOGY_PATH").ok();

    // Utilization monitor settings
    let monitor_enabled = env_flag("BALANCER_MONITOR_ENABLED", true);

    let sample_interval_ms = std::env::var("BALANCER_SAMPLE_INTERVAL_MS")
        .unwrap_or_else(|_| "100".to_string())
        .parse()
        .unwrap_or(100);

    let threshold_bps = std::env::var("BALANCER_THRESHOLD_BPS")
        .unwrap_or_else(|_| "1000".to_string())
        .parse()
        .unwrap_or(1000.0);

    let monitor_max_cycles = std::env::var("BALANCER_MONITOR_MAX_CYCLES")
        .ok()
        .and_then(|v| v.parse().ok());

    let cycle_pause_ms = std::env::var("BALANCER_CYCLE_PAUSE_MS")
        .unwrap_or_else(|_| "0".to_string())
        .parse()
        .unwrap_or(0);

    // Reactive forwarding settings
    let cache_arp_flows = env_flag("BALANCER_CACHE_ARP_FLOWS", false);

    let event_queue = std::env::var("BALANCER_EVENT_QUEUE")
        .unwrap_or_else(|_| "1024".to_string())
        .parse()
        .unwrap_or(1024);

    let debug = std::env::var("DEBUG").is_ok();

    let config = Config {
        southbound,
        restconf_url,
        restconf_user,
        restconf_password,
        southbound_timeout_ms,
        topology_path,
        monitor_enabled,
        sample_interval_ms,
        threshold_bps,
        monitor_max_cycles,
        cycle_pause_ms,
        cache_arp_flows,
        event_queue,
        debug,
    };
    config.validate()?;
    Ok(config)
}

/// Invalid configuration or topology.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("sample interval must be greater than zero")]
    ZeroSampleInterval,
    #[error("threshold must be a non-negative number, got {0}")]
    InvalidThreshold(f64),
    #[error("multipath group has no buckets")]
    EmptyBuckets,
    #[error("multipath bucket for port {0} has zero weight")]
    ZeroWeight(PortNo),
    #[error("monitored path uses port {0} as both reference and alternate")]
    SamePorts(PortNo),
    #[error("rule {rule_id} is provisioned twice on {dpid} table {table_id}")]
    DuplicateRule {
        dpid: DatapathId,
        table_id: TableId,
        rule_id: u32,
    },
}

/// Network layout the controller is deployed on.
///
/// The default mirrors the reference deployment: fan-out switches s1..s3,
/// switch 2 monitored on port 1 with port 2 as the alternate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub multipath: MultipathPolicy,
    pub monitored_path: MonitoredPath,
    pub static_flows: Vec<ProvisionedFlow>,
}

impl Default for Topology {
    fn default() -> Self {
        let to_h1 = |dpid: u64, rule_id: u32, src: u8| ProvisionedFlow {
            dpid: DatapathId(dpid),
            rule_id,
            table_id: 0,
            priority: 101,
            ipv4_src: Ipv4Prefix::host(Ipv4Addr::new(10, 0, 0, src)),
            ipv4_dst: Ipv4Prefix::host(Ipv4Addr::new(10, 0, 0, 1)),
            out_port: PortNo(1),
            cookie: 1,
        };
        Self {
            multipath: MultipathPolicy::default(),
            monitored_path: MonitoredPath::default(),
            static_flows: vec![to_h1(1, 0, 2), to_h1(1, 1, 3), to_h1(3, 0, 3), to_h1(2, 0, 2)],
        }
    }
}

impl Topology {
    /// Read a JSON topology file and validate it.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let topology: Topology = serde_json::from_str(&raw)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multipath.paths.is_empty() {
            return Err(ConfigError::EmptyBuckets);
        }
        if let Some(p) = self.multipath.paths.iter().find(|p| p.weight == 0) {
            return Err(ConfigError::ZeroWeight(p.port));
        }

        let path = &self.monitored_path;
        if path.reference_port == path.alternate_port {
            return Err(ConfigError::SamePorts(path.reference_port));
        }

        let monitored = [path.via_reference_rule, path.via_alternate_rule]
            .into_iter()
            .map(|rule_id| (path.dpid, path.table_id, rule_id));
        let provisioned = self
            .static_flows
            .iter()
            .map(|f| (f.dpid, f.table_id, f.rule_id));

        let mut seen = HashSet::new();
        for (dpid, table_id, rule_id) in monitored.chain(provisioned) {
            if !seen.insert((dpid, table_id, rule_id)) {
                return Err(ConfigError::DuplicateRule {
                    dpid,
                    table_id,
                    rule_id,
                });
            }
        }
        Ok(())
    }
}
