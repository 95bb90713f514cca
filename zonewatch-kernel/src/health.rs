use crate::monitor::ZoneMonitor;
use crate::mqtt::OutboundSink;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MqttStatus {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub zones_tracked: usize,
    pub zones_connected: usize,
    pub events_emitted: u64,
    pub events_suppressed: u64,
    pub mqtt_status: MqttStatus,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<MqttStatus>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new(MqttStatus::Connecting)),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = MqttStatus::Connected;
    }

    pub fn mark_mqtt_disconnected(&self) {
        *self.mqtt_status.lock() = MqttStatus::Disconnected;
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = MqttStatus::Reconnecting;
    }

    pub fn mqtt_status(&self) -> MqttStatus {
        *self.mqtt_status.lock()
    }

    pub fn get_health(&self, monitor: &ZoneMonitor) -> KernelHealth {
        let stats = monitor.stats();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            zones_tracked: stats.zones_tracked,
            zones_connected: stats.zones_connected,
            events_emitted: stats.events_emitted,
            events_suppressed: stats.events_suppressed,
            mqtt_status: self.mqtt_status(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Publishes a health snapshot on `topic` every `every` until shutdown.
    pub fn spawn_health_publisher<S: OutboundSink>(
        &self,
        sink: S,
        topic: String,
        monitor: Arc<ZoneMonitor>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let tracker = self.clone();

        task::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let health = tracker.get_health(&monitor);
                        match serde_json::to_vec(&health) {
                            Ok(payload) => match sink.publish(topic.clone(), payload).await {
                                Ok(()) => debug!(
                                    uptime = health.uptime_seconds,
                                    zones = health.zones_tracked,
                                    connected = health.zones_connected,
                                    "published kernel health"
                                ),
                                Err(e) => warn!(error = %e, "failed to publish kernel health"),
                            },
                            Err(e) => warn!(error = %e, "failed to encode kernel health"),
                        }
                    }
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("health publisher stopped");
        })
    }
}
