/*!
Test harness around a `ZoneMonitor`

Drives the kernel with a `ManualClock`, records every event and status the
monitor emits, and can flush the outbound queue through the real publisher
code into a `MockMqttClient`.
*/

use crate::clock::ManualClock;
use crate::mqtt_stub::{MockMessage, MockMqttClient};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use zonewatch_kernel::clock::Clock;
use zonewatch_kernel::models::{EventKind, EventRecord, Reading, ZoneStatus};
use zonewatch_kernel::monitor::{MonitorSettings, ZoneMonitor};
use zonewatch_kernel::mqtt::{self, Outbound, Topics};

pub struct MonitorHarness {
    pub monitor: Arc<ZoneMonitor>,
    pub clock: ManualClock,
    pub topics: Topics,
    pub mqtt_client: MockMqttClient,
    events: Arc<Mutex<Vec<EventRecord>>>,
    statuses: Arc<Mutex<Vec<ZoneStatus>>>,
    outbound: Mutex<mpsc::UnboundedReceiver<Outbound>>,
}

impl MonitorHarness {
    pub fn new() -> Self {
        Self::with_settings(MonitorSettings::default())
    }

    pub fn with_settings(settings: MonitorSettings) -> Self {
        init_tracing();

        let monitor = Arc::new(ZoneMonitor::new(settings));
        let events = Arc::new(Mutex::new(Vec::new()));
        let statuses = Arc::new(Mutex::new(Vec::new()));

        let sink = events.clone();
        monitor.on_event(move |event| sink.lock().push(event.clone()));
        let sink = statuses.clone();
        monitor.on_status(move |status| sink.lock().push(status.clone()));
        let outbound = mqtt::forward_outbound(&monitor);

        Self {
            monitor,
            clock: ManualClock::new(),
            topics: Topics::new("zonewatch"),
            mqtt_client: MockMqttClient::new(),
            events,
            statuses,
            outbound: Mutex::new(outbound),
        }
    }

    /// Empty reading for `zone`, stamped with the harness clock.
    pub fn reading(&self, zone: &str) -> Reading {
        Reading::new(zone, self.clock.now())
    }

    pub fn send(&self, reading: Reading) -> ZoneStatus {
        self.monitor.ingest(reading)
    }

    /// Shortcut for the three classified channels plus flame.
    pub fn send_values(&self, zone: &str, temperature: f64, gas: f64, pm25: f64, flame: bool) -> ZoneStatus {
        self.send(
            self.reading(zone)
                .temperature(temperature)
                .gas(gas)
                .pm25(pm25)
                .flame(flame),
        )
    }

    /// Goes through the wire decoder, as a broker publish would.
    pub fn send_json(&self, topic: &str, payload: &Value) -> Option<ZoneStatus> {
        let bytes = serde_json::to_vec(payload).ok()?;
        mqtt::ingest_publish(&self.topics, &self.monitor, topic, &bytes, self.clock.now())
    }

    /// Hands a message taken from the mock client's receiver to the kernel.
    pub fn deliver(&self, message: &MockMessage) -> Option<ZoneStatus> {
        mqtt::ingest_publish(&self.topics, &self.monitor, &message.topic, &message.payload, self.clock.now())
    }

    pub fn advance(&self, by: Duration) -> Instant {
        self.clock.advance(by)
    }

    pub fn advance_secs(&self, secs: u64) -> Instant {
        self.advance(Duration::from_secs(secs))
    }

    /// One liveness sweep at the current harness time.
    pub fn tick(&self) -> Vec<ZoneStatus> {
        self.monitor.tick(self.clock.now())
    }

    pub fn close_channel(&self) -> Vec<ZoneStatus> {
        self.monitor.transport_closed(self.clock.now())
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    pub fn events_of_kind(&self, kind: EventKind) -> Vec<EventRecord> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|event| event.kind == kind).count()
    }

    pub fn statuses(&self) -> Vec<ZoneStatus> {
        self.statuses.lock().clone()
    }

    pub fn clear_recorded(&self) {
        self.events.lock().clear();
        self.statuses.lock().clear();
    }

    /// Publishes everything queued so far into `mqtt_client`. Returns how
    /// many outbound items were drained.
    pub async fn flush_outbound(&self) -> usize {
        let pending: Vec<Outbound> = {
            let mut rx = self.outbound.lock();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        for item in &pending {
            mqtt::publish_outbound(&self.mqtt_client, &self.topics, item).await;
        }
        pending.len()
    }
}

impl Default for MonitorHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zonewatch_kernel=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
