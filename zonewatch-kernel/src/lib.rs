//! Zone hazard monitoring kernel.
//!
//! Sensor readings go through [`ZoneMonitor::ingest`]: liveness bookkeeping,
//! hazard classification, rising-edge event detection and the deduplicated
//! operator feed. The `mqtt` module binds the engine to a broker.

pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod health;
pub mod liveness;
pub mod models;
pub mod monitor;
pub mod mqtt;
pub mod state;

pub use classifier::{classify, Boundaries, ClassifierThresholds, EventLadders, Rung};
pub use clock::{Clock, SystemClock};
pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use feed::EventFeed;
pub use health::{HealthTracker, KernelHealth};
pub use liveness::{LivenessRecord, Transition};
pub use models::{
    EventKind, EventRecord, HazardLevel, Metric, Reading, SystemOverview, SystemStatus, ZoneId,
    ZoneStatus,
};
pub use monitor::{MonitorSettings, MonitorStats, ZoneMonitor};
