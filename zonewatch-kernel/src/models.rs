//! Data model shared by the classifier, the liveness tracker, the event feed
//! and the zone monitor.
//!
//! Inbound payloads (`ReadingIn`, `IngestIn`) are deliberately lenient: a
//! numeric field that is missing, null, non-numeric or non-finite reads as 0.
//! A `Reading` is the sanitized, immutable form the engine works with.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub type ZoneId = String;

/// Hazard classification of a zone, totally ordered from `Normal` to `Danger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardLevel {
    #[default]
    Normal,
    Caution,
    Warning,
    Danger,
}

impl HazardLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardLevel::Normal => "normal",
            HazardLevel::Caution => "caution",
            HazardLevel::Warning => "warning",
            HazardLevel::Danger => "danger",
        }
    }
}

impl fmt::Display for HazardLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric channels carried by a reading. Each one has its own event ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Gas,
    Pm1,
    Pm25,
    Pm10,
    GasDelta,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Temperature,
        Metric::Gas,
        Metric::Pm1,
        Metric::Pm25,
        Metric::Pm10,
        Metric::GasDelta,
    ];

    /// Config and wire name.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Gas => "gas",
            Metric::Pm1 => "pm1",
            Metric::Pm25 => "pm25",
            Metric::Pm10 => "pm10",
            Metric::GasDelta => "gas_delta",
        }
    }

    /// Human name used in event messages.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Gas => "gas concentration",
            Metric::Pm1 => "PM1.0",
            Metric::Pm25 => "PM2.5",
            Metric::Pm10 => "PM10",
            Metric::GasDelta => "gas surge",
        }
    }
}

/// One sanitized sensor sample for a zone. Immutable once built: the setters
/// consume the value and are only meant for construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    zone: ZoneId,
    temperature: f64,
    gas: f64,
    pm1: f64,
    pm25: f64,
    pm10: f64,
    gas_delta: f64,
    flame: bool,
    received_at: Instant,
}

impl Reading {
    /// All-zero reading, flame off.
    pub fn new(zone: impl Into<ZoneId>, received_at: Instant) -> Self {
        Self {
            zone: zone.into(),
            temperature: 0.0,
            gas: 0.0,
            pm1: 0.0,
            pm25: 0.0,
            pm10: 0.0,
            gas_delta: 0.0,
            flame: false,
            received_at,
        }
    }

    pub fn with_metric(mut self, metric: Metric, value: f64) -> Self {
        let value = finite_or_zero(value);
        match metric {
            Metric::Temperature => self.temperature = value,
            Metric::Gas => self.gas = value,
            Metric::Pm1 => self.pm1 = value,
            Metric::Pm25 => self.pm25 = value,
            Metric::Pm10 => self.pm10 = value,
            Metric::GasDelta => self.gas_delta = value,
        }
        self
    }

    pub fn temperature(self, value: f64) -> Self {
        self.with_metric(Metric::Temperature, value)
    }

    pub fn gas(self, value: f64) -> Self {
        self.with_metric(Metric::Gas, value)
    }

    pub fn pm25(self, value: f64) -> Self {
        self.with_metric(Metric::Pm25, value)
    }

    pub fn flame(mut self, flame: bool) -> Self {
        self.flame = flame;
        self
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Gas => self.gas,
            Metric::Pm1 => self.pm1,
            Metric::Pm25 => self.pm25,
            Metric::Pm10 => self.pm10,
            Metric::GasDelta => self.gas_delta,
        }
    }

    pub fn has_flame(&self) -> bool {
        self.flame
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Reading payload as published by a sensor node.
///
/// Matches `<prefix>/zones/reading@v1`, and the `data` object of `ingest@v1`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingIn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, alias = "temp", deserialize_with = "lenient_f64")]
    pub temperature: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gas: f64,
    /// Generic dust value, used when `pm25` is absent.
    #[serde(default, deserialize_with = "lenient_opt_f64", skip_serializing_if = "Option::is_none")]
    pub dust: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pm1: f64,
    #[serde(default, deserialize_with = "lenient_opt_f64", skip_serializing_if = "Option::is_none")]
    pub pm25: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pm10: f64,
    #[serde(default, alias = "mq2_delta", deserialize_with = "lenient_f64")]
    pub gas_delta: f64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub flame: bool,
    /// Device wall-clock time; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Value>,
}

impl ReadingIn {
    pub fn into_reading(self, zone: impl Into<ZoneId>, received_at: Instant) -> Reading {
        let pm25 = self.pm25.or(self.dust).unwrap_or(0.0);
        Reading::new(zone, received_at)
            .temperature(self.temperature)
            .gas(self.gas)
            .with_metric(Metric::Pm1, self.pm1)
            .pm25(pm25)
            .with_metric(Metric::Pm10, self.pm10)
            .with_metric(Metric::GasDelta, self.gas_delta)
            .flame(self.flame)
    }
}

/// Device envelope: `{ device_id, data: {...}, ts }`.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestIn {
    pub device_id: String,
    #[serde(default)]
    pub data: ReadingIn,
    #[serde(default)]
    pub ts: Option<Value>,
}

impl IngestIn {
    /// `zone-warehouse` and `warehouse` name the same zone.
    pub fn zone_id(&self) -> &str {
        self.device_id
            .strip_prefix("zone-")
            .unwrap_or(&self.device_id)
    }
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_f64(&value).unwrap_or(0.0))
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_f64(&value))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    })
}

/// What produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Threshold { metric: Metric },
    Flame,
    FlameCleared,
    Connected,
    Disconnected,
}

/// Identity used for duplicate suppression. Scoped to the zone so two zones
/// sharing a display name never suppress each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DedupKey {
    pub zone: ZoneId,
    pub level: HazardLevel,
    pub message: String,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.zone, self.level, self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub zone: ZoneId,
    pub level: HazardLevel,
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub dedup_key: DedupKey,
    #[serde(skip)]
    pub first_emitted_at: Instant,
    /// RFC 3339 wall-clock time, for operators.
    pub recorded_at: String,
}

impl EventRecord {
    pub fn new(
        zone: impl Into<ZoneId>,
        level: HazardLevel,
        kind: EventKind,
        message: impl Into<String>,
        value: Option<f64>,
        at: Instant,
    ) -> Self {
        let zone = zone.into();
        let message = message.into();
        Self {
            id: Uuid::new_v4(),
            dedup_key: DedupKey { zone: zone.clone(), level, message: message.clone() },
            zone,
            level,
            kind,
            message,
            value,
            first_emitted_at: at,
            recorded_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }

    pub fn is_flame(&self) -> bool {
        self.kind == EventKind::Flame
    }
}

/// Published view of a zone after each update.
///
/// `revision` grows by one with every published update of the zone. Listeners
/// run outside the zone lock, so updates racing on one zone can reach them out
/// of order; the highest revision is the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneStatus {
    pub zone: ZoneId,
    pub name: String,
    pub level: HazardLevel,
    pub connected: bool,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    /// No zone is reporting.
    Standby,
    Normal,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub normal: usize,
    pub caution: usize,
    pub warning: usize,
    pub danger: usize,
}

impl LevelCounts {
    pub fn add(&mut self, level: HazardLevel) {
        match level {
            HazardLevel::Normal => self.normal += 1,
            HazardLevel::Caution => self.caution += 1,
            HazardLevel::Warning => self.warning += 1,
            HazardLevel::Danger => self.danger += 1,
        }
    }

    pub fn get(&self, level: HazardLevel) -> usize {
        match level {
            HazardLevel::Normal => self.normal,
            HazardLevel::Caution => self.caution,
            HazardLevel::Warning => self.warning,
            HazardLevel::Danger => self.danger,
        }
    }
}

/// Aggregate over connected zones only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemOverview {
    pub counts: LevelCounts,
    pub connected_zones: usize,
    pub total_zones: usize,
    pub status: SystemStatus,
}

impl SystemOverview {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a ZoneStatus>) -> Self {
        let mut counts = LevelCounts::default();
        let mut connected_zones = 0;
        let mut total_zones = 0;

        for status in statuses {
            total_zones += 1;
            if status.connected {
                connected_zones += 1;
                counts.add(status.level);
            }
        }

        let status = if connected_zones == 0 {
            SystemStatus::Standby
        } else if counts.danger > 0 {
            SystemStatus::Danger
        } else if counts.warning > 0 {
            SystemStatus::Warning
        } else {
            SystemStatus::Normal
        };

        Self { counts, connected_zones, total_zones, status }
    }
}
