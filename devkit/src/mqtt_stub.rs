/*!
Mock MQTT client for tests without a broker

Records every publication and subscription, and can feed simulated inbound
messages to a receiver. Implements the kernel's `OutboundSink`, so the real
publisher code can run against it.
*/

use anyhow::Result;
use parking_lot::Mutex;
use rumqttc::QoS;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use zonewatch_kernel::mqtt::OutboundSink;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Stands in for `rumqttc::AsyncClient`.
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Channel receiving whatever `simulate_incoming` sends.
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock() = Some(sender);
        receiver
    }

    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        self.record(MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        });
        Ok(())
    }

    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        debug!(topic = %topic, "[mock] subscribed");
        self.subscriptions.lock().push(topic);
        Ok(())
    }

    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };

        if let Some(sender) = self.message_sender.lock().as_ref() {
            sender
                .send(message.clone())
                .map_err(|e| anyhow::anyhow!("send error: {e}"))?;
        }
        debug!(topic = %message.topic, "[mock] simulated incoming");
        Ok(())
    }

    fn record(&self, message: MockMessage) {
        debug!(topic = %message.topic, bytes = message.payload.len(), "[mock] published");
        self.published_messages.lock().push(message);
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Every payload on `topic` parsed as JSON, oldest first.
    pub fn json_messages(&self, topic: &str) -> Result<Vec<Value>> {
        self.find_messages_by_topic(topic)
            .iter()
            .map(|msg| serde_json::from_slice(&msg.payload).map_err(anyhow::Error::from))
            .collect()
    }

    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last) => Ok(Some(serde_json::from_slice(&last.payload)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
        self.subscriptions.lock().clear();
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundSink for MockMqttClient {
    async fn publish(&self, topic: String, payload: Vec<u8>) -> zonewatch_kernel::Result<()> {
        self.record(MockMessage {
            topic,
            payload,
            qos: QoS::AtLeastOnce,
            retain: false,
        });
        Ok(())
    }
}

/// Builds sensor payloads in the shapes the kernel accepts.
///
/// ```
/// use zonewatch_devkit::SensorMessageBuilder;
///
/// let msg = SensorMessageBuilder::zone("warehouse").temperature(62.0).flame(true).reading_v1();
/// assert_eq!(msg["zone"], "warehouse");
/// ```
#[derive(Debug, Clone)]
pub struct SensorMessageBuilder {
    zone: String,
    fields: Map<String, Value>,
}

impl SensorMessageBuilder {
    pub fn zone<S: Into<String>>(zone: S) -> Self {
        Self {
            zone: zone.into(),
            fields: Map::new(),
        }
    }

    /// Sets any field verbatim, including malformed values.
    pub fn field<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn temperature(self, value: f64) -> Self {
        self.field("temperature", json!(value))
    }

    pub fn gas(self, value: f64) -> Self {
        self.field("gas", json!(value))
    }

    pub fn pm25(self, value: f64) -> Self {
        self.field("pm25", json!(value))
    }

    pub fn flame(self, on: bool) -> Self {
        self.field("flame", json!(on))
    }

    /// Flat `zones/reading@v1` payload.
    pub fn reading_v1(&self) -> Value {
        let mut body = self.fields.clone();
        body.insert("zone".into(), json!(self.zone));
        Value::Object(body)
    }

    /// `ingest@v1` device envelope, device id `zone-<zone>`.
    pub fn ingest_v1(&self) -> Value {
        json!({
            "device_id": format!("zone-{}", self.zone),
            "data": Value::Object(self.fields.clone()),
            "ts": 1_700_000_000u64,
        })
    }
}
