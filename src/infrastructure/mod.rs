//! Infrastructure Layer
//!
//! Background tasks and process lifecycle.

pub mod shutdown;
pub mod utilization_monitor;

pub use shutdown::{shutdown_signal, ShutdownController, TaskGuard};
pub use utilization_monitor::{CycleOutcome, MonitorConfig, UtilizationMonitor};
