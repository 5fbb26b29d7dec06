//! sdn-balancer - SDN load-balancing controller with hexagonal architecture
//!
//! This is the composition root that wires together all the components.

mod adapters;
mod application;
mod config;
mod domain;
mod infrastructure;

use crate::adapters::inbound::EventReactor;
use crate::adapters::outbound::{
    DashMapMacTable, DashMapSwitchRegistry, InMemorySwitchChannel, RestconfSwitchChannel,
};
use crate::application::ControllerService;
use crate::config::{load_config, SouthboundKind, Topology};
use crate::domain::ports::SwitchChannel;
use crate::domain::services::ForwardingPolicy;
use crate::infrastructure::{shutdown_signal, ShutdownController, UtilizationMonitor};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let topology = match &cfg.topology_path {
        Some(path) => {
            let topology = Topology::load(path)?;
            tracing::info!("topology loaded from {}", path);
            topology
        }
        None => Topology::default(),
    };
    topology.validate()?;

    tracing::info!(
        "starting sdn-balancer southbound={:?} group={} monitored={} port {}",
        cfg.southbound,
        topology.multipath.group_id,
        topology.monitored_path.dpid,
        topology.monitored_path.reference_port
    );

    // ===== COMPOSITION ROOT =====

    // 1. Southbound channel
    let channel: Arc<dyn SwitchChannel> = match cfg.southbound {
        SouthboundKind::Restconf => {
            tracing::info!("using management API at {}", cfg.restconf_url);
            Arc::new(RestconfSwitchChannel::new(cfg.restconf())?)
        }
        SouthboundKind::Memory => {
            tracing::warn!("using in-memory switches, no rules reach real hardware");
            Arc::new(InMemorySwitchChannel::new())
        }
    };

    // 2. Controller state and the reactive use case
    let registry = Arc::new(DashMapSwitchRegistry::new());
    let mac_table = Arc::new(DashMapMacTable::new());
    let service = Arc::new(ControllerService::new(
        registry,
        mac_table,
        channel.clone(),
        ForwardingPolicy::new(topology.multipath.clone(), cfg.cache_arp_flows),
    ));

    let shutdown = ShutdownController::new();

    // 3. Event reactor; the sender is handed to whatever drives switch sessions
    let (_events, reactor) = EventReactor::new(service, cfg.event_queue);
    let reactor_handle = tokio::spawn(reactor.run(shutdown.clone()));

    // 4. Utilization monitor
    let monitor_handle = if cfg.monitor_enabled {
        let monitor = Arc::new(UtilizationMonitor::new(
            cfg.monitor(),
            topology.monitored_path.clone(),
            topology.static_flows.clone(),
            channel,
        ));
        Some(monitor.start(shutdown.clone()))
    } else {
        tracing::info!("utilization monitor disabled");
        None
    };

    shutdown_signal(shutdown.clone()).await;

    if !shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!("exiting with {} tasks still running", shutdown.active_tasks());
    }

    if let Ok(events) = reactor_handle.await {
        tracing::info!("handled {} events", events);
    }
    if let Some(handle) = monitor_handle {
        if let Ok(cycles) = handle.await {
            tracing::info!("ran {} monitor cycles", cycles);
        }
    }

    Ok(())
}
