use crate::classifier::{ClassifierThresholds, EventLadders};
use crate::error::{KernelError, Result};
use crate::feed::{DEFAULT_CAPACITY, DEFAULT_DEDUP_WINDOW};
use crate::liveness::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TIMEOUT};
use crate::monitor::MonitorSettings;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "ZONEWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "zonewatch.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub mqtt: MqttConf,
    pub zones: HashMap<String, ZoneConf>,
    pub monitor: MonitorConf,
    pub thresholds: ThresholdsConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ZoneConf {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub topic_prefix: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "zonewatch-kernel".into(),
            keep_alive_secs: 15,
            topic_prefix: "zonewatch".into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorConf {
    pub liveness_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub dedup_window_secs: u64,
    pub feed_capacity: usize,
    pub hysteresis_margin: f64,
    pub health_interval_secs: u64,
}

impl Default for MonitorConf {
    fn default() -> Self {
        Self {
            liveness_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            dedup_window_secs: DEFAULT_DEDUP_WINDOW.as_secs(),
            feed_capacity: DEFAULT_CAPACITY,
            hysteresis_margin: 0.0,
            health_interval_secs: 30,
        }
    }
}

impl MonitorConf {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ThresholdsConf {
    pub classifier: ClassifierThresholds,
    pub events: EventLadders,
}

impl KernelConfig {
    /// Parses and validates. An empty document yields the defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(KernelError::InvalidConfig(msg));

        if self.mqtt.host.trim().is_empty() {
            return invalid("mqtt.host is empty".into());
        }
        if self.mqtt.port == 0 {
            return invalid("mqtt.port must be non-zero".into());
        }
        let prefix = &self.mqtt.topic_prefix;
        if prefix.is_empty() || prefix.contains(['#', '+']) || prefix.ends_with('/') {
            return invalid(format!("mqtt.topic_prefix '{prefix}' is not a plain topic prefix"));
        }

        let monitor = &self.monitor;
        for (name, secs) in [
            ("liveness_timeout_secs", monitor.liveness_timeout_secs),
            ("sweep_interval_secs", monitor.sweep_interval_secs),
            ("health_interval_secs", monitor.health_interval_secs),
        ] {
            if secs == 0 {
                return invalid(format!("monitor.{name} must be greater than zero"));
            }
        }
        if monitor.feed_capacity == 0 {
            return invalid("monitor.feed_capacity must be greater than zero".into());
        }
        if !monitor.hysteresis_margin.is_finite() || monitor.hysteresis_margin < 0.0 {
            return invalid(format!(
                "monitor.hysteresis_margin must be a non-negative number, got {}",
                monitor.hysteresis_margin
            ));
        }

        let classifier = &self.thresholds.classifier;
        for (name, bounds) in [
            ("temperature", classifier.temperature),
            ("gas", classifier.gas),
            ("pm25", classifier.pm25),
        ] {
            if !bounds.is_ascending() {
                return invalid(format!("thresholds.classifier.{name} is not ascending"));
            }
        }
        if let Some(metric) = self.thresholds.events.first_unordered() {
            return invalid(format!("thresholds.events.{} is not ascending", metric.key()));
        }

        for (id, zone) in &self.zones {
            if id.trim().is_empty() {
                return invalid("zone with an empty id".into());
            }
            if zone.name.trim().is_empty() {
                return invalid(format!("zone '{id}' has an empty name"));
            }
        }
        Ok(())
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            liveness_timeout: Duration::from_secs(self.monitor.liveness_timeout_secs),
            dedup_window: Duration::from_secs(self.monitor.dedup_window_secs),
            feed_capacity: self.monitor.feed_capacity,
            hysteresis_margin: self.monitor.hysteresis_margin,
            classifier: self.thresholds.classifier.clone(),
            ladders: self.thresholds.events.clone(),
        }
    }
}

/// Loads from `$ZONEWATCH_CONFIG`, falling back to `zonewatch.yaml`.
pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(&path).await
}

/// Never fails: a missing, unreadable or invalid file yields the defaults.
pub async fn load_config_from(path: impl AsRef<Path>) -> KernelConfig {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return KernelConfig::default();
    }

    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            return KernelConfig::default();
        }
    };

    match KernelConfig::from_yaml(&text) {
        Ok(config) => {
            info!(path = %path.display(), zones = config.zones.len(), "config loaded");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            KernelConfig::default()
        }
    }
}
