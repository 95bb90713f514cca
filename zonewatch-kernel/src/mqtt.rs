/**
 * MQTT TRANSPORT - Sensor readings in, events and zone status out
 *
 * INBOUND:
 * - <prefix>/zones/reading@v1 : flat reading with a `zone` field
 * - <prefix>/ingest@v1        : device envelope { device_id, data, ts }
 *
 * OUTBOUND:
 * - <prefix>/events@v1        : every recorded event
 * - <prefix>/alerts/danger@v1 : danger-level events only
 * - <prefix>/zones/status@v1  : zone status after each update
 *
 * An event-loop error means the channel to the sensors is gone: every zone is
 * forced disconnected and the loop retries after a short pause. Subscriptions
 * are renewed on every ConnAck.
 */

use crate::clock::Clock;
use crate::config::MqttConf;
use crate::error::{KernelError, Result};
use crate::health::HealthTracker;
use crate::models::{EventRecord, HazardLevel, IngestIn, Reading, ReadingIn, ZoneStatus};
use crate::monitor::ZoneMonitor;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

const RETRY_DELAY: Duration = Duration::from_secs(2);
const REQUEST_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub reading: String,
    pub ingest: String,
    pub events: String,
    pub danger_alerts: String,
    pub zone_status: String,
    pub health: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            reading: format!("{prefix}/zones/reading@v1"),
            ingest: format!("{prefix}/ingest@v1"),
            events: format!("{prefix}/events@v1"),
            danger_alerts: format!("{prefix}/alerts/danger@v1"),
            zone_status: format!("{prefix}/zones/status@v1"),
            health: format!("{prefix}/kernel/health@v1"),
        }
    }

    pub fn inbound(&self) -> [&str; 2] {
        [&self.reading, &self.ingest]
    }
}

pub fn create_mqtt_client(conf: &MqttConf) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs.max(5)));
    opts.set_clean_session(true);
    AsyncClient::new(opts, REQUEST_CAPACITY)
}

/// Turns an inbound payload into a reading stamped with `received_at`.
/// `Ok(None)` for topics this kernel does not consume.
pub fn decode_reading(
    topics: &Topics,
    topic: &str,
    payload: &[u8],
    received_at: Instant,
) -> Result<Option<Reading>> {
    let (zone, data) = if topic == topics.reading {
        let mut data: ReadingIn = serde_json::from_slice(payload)?;
        let zone = data.zone.take().unwrap_or_default();
        (zone, data)
    } else if topic == topics.ingest {
        let envelope: IngestIn = serde_json::from_slice(payload)?;
        (envelope.zone_id().to_string(), envelope.data)
    } else {
        return Ok(None);
    };

    let zone = zone.trim();
    if zone.is_empty() {
        return Err(KernelError::Payload(format!("reading on {topic} has no zone")));
    }
    Ok(Some(data.into_reading(zone, received_at)))
}

/// Decodes and applies one publish. Bad payloads are logged and dropped.
pub fn ingest_publish(
    topics: &Topics,
    monitor: &ZoneMonitor,
    topic: &str,
    payload: &[u8],
    received_at: Instant,
) -> Option<ZoneStatus> {
    match decode_reading(topics, topic, payload, received_at) {
        Ok(Some(reading)) => Some(monitor.ingest(reading)),
        Ok(None) => {
            debug!(topic, "ignoring publish on unhandled topic");
            None
        }
        Err(e) => {
            warn!(topic, error = %e, payload = %String::from_utf8_lossy(payload), "dropping reading");
            None
        }
    }
}

/// Something the publisher task sends out.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(EventRecord),
    Status(ZoneStatus),
}

/// (topic, payload) pairs for one outbound item.
pub fn encode_outbound(topics: &Topics, outbound: &Outbound) -> Result<Vec<(String, Vec<u8>)>> {
    match outbound {
        Outbound::Event(event) => {
            let payload = serde_json::to_vec(event)?;
            let mut out = Vec::with_capacity(2);
            if event.level == HazardLevel::Danger {
                out.push((topics.danger_alerts.clone(), payload.clone()));
            }
            out.push((topics.events.clone(), payload));
            Ok(out)
        }
        Outbound::Status(status) => Ok(vec![(topics.zone_status.clone(), serde_json::to_vec(status)?)]),
    }
}

/// Channel fed by the monitor's event and status listeners.
pub fn forward_outbound(monitor: &ZoneMonitor) -> mpsc::UnboundedReceiver<Outbound> {
    let (tx, rx) = mpsc::unbounded_channel();
    let events = tx.clone();
    monitor.on_event(move |event| {
        let _ = events.send(Outbound::Event(event.clone()));
    });
    monitor.on_status(move |status| {
        let _ = tx.send(Outbound::Status(status.clone()));
    });
    rx
}

/// Where outbound payloads go. `AsyncClient` in production, a recording
/// mock in tests.
pub trait OutboundSink: Send + Sync + 'static {
    fn publish(&self, topic: String, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

impl OutboundSink for AsyncClient {
    async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<()> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, false, payload).await?;
        Ok(())
    }
}

pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topics: Topics,
    monitor: Arc<ZoneMonitor>,
    clock: Arc<dyn Clock>,
    health: HealthTracker,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        health.mark_mqtt_connected();
                        for topic in topics.inbound() {
                            if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
                                warn!(topic, error = %e, "MQTT subscribe failed");
                            }
                        }
                        info!(reading = %topics.reading, ingest = %topics.ingest, "MQTT connected, subscribed");
                    }
                    Ok(Event::Incoming(Incoming::Publish(p))) => {
                        ingest_publish(&topics, &monitor, &p.topic, &p.payload, clock.now());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT connection lost, retrying in {}s", RETRY_DELAY.as_secs());
                        health.increment_reconnects();
                        monitor.transport_closed(clock.now());
                        tokio::select! {
                            _ = tokio::time::sleep(RETRY_DELAY) => {}
                            _ = shutdown.changed() => {}
                        }
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        health.mark_mqtt_disconnected();
        if let Err(e) = client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request not sent");
        }
        info!("MQTT listener stopped");
    })
}

pub async fn publish_outbound<S: OutboundSink>(sink: &S, topics: &Topics, outbound: &Outbound) {
    let messages = match encode_outbound(topics, outbound) {
        Ok(messages) => messages,
        Err(e) => {
            warn!(error = %e, "failed to encode outbound message");
            return;
        }
    };
    for (topic, payload) in messages {
        if let Err(e) = sink.publish(topic.clone(), payload).await {
            warn!(topic = %topic, error = %e, "failed to publish");
        }
    }
}

/// Drains `outbound` until the channel closes or shutdown is signalled.
pub fn spawn_publisher<S: OutboundSink>(
    sink: S,
    topics: Topics,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            tokio::select! {
                next = outbound.recv() => match next {
                    Some(item) => publish_outbound(&sink, &topics, &item).await,
                    None => break,
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("outbound publisher stopped");
    })
}
