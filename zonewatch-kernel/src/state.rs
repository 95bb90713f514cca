use crate::liveness::LivenessRecord;
use crate::models::{HazardLevel, Reading, ZoneId, ZoneStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Everything the monitor knows about one zone. Only mutated while holding
/// that zone's lock.
#[derive(Debug, Clone)]
pub struct ZoneState {
    pub id: ZoneId,
    pub name: String,
    pub level: HazardLevel,
    pub liveness: LivenessRecord,
    /// Last processed reading, baseline for edge detection.
    pub previous: Option<Reading>,
    /// Count of published status updates.
    pub revision: u64,
}

impl ZoneState {
    pub fn new(id: impl Into<ZoneId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level: HazardLevel::Normal,
            liveness: LivenessRecord::new(),
            previous: None,
            revision: 0,
        }
    }

    pub fn status(&self) -> ZoneStatus {
        ZoneStatus {
            zone: self.id.clone(),
            name: self.name.clone(),
            level: self.level,
            connected: self.liveness.is_connected(),
            revision: self.revision,
        }
    }

    /// Status for listeners. Call with the zone lock held so revisions follow
    /// the order updates were applied in.
    pub fn next_status(&mut self) -> ZoneStatus {
        self.revision += 1;
        self.status()
    }

    pub fn flame_active(&self) -> bool {
        self.previous.as_ref().is_some_and(Reading::has_flame)
    }
}

/// Zone id -> independently lockable state. Zones are never removed.
#[derive(Debug, Default)]
pub struct ZoneTable {
    zones: RwLock<HashMap<ZoneId, Shared<ZoneState>>>,
}

impl ZoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Shared<ZoneState>> {
        self.zones.read().get(id).cloned()
    }

    /// Returns the zone, creating it with `name()` as display name if unknown.
    pub fn get_or_create(&self, id: &str, name: impl FnOnce() -> String) -> Shared<ZoneState> {
        if let Some(zone) = self.get(id) {
            return zone;
        }
        self.zones
            .write()
            .entry(id.to_string())
            .or_insert_with(|| new_state(ZoneState::new(id, name())))
            .clone()
    }

    /// Handles to every zone, so callers can lock them one at a time.
    pub fn all(&self) -> Vec<Shared<ZoneState>> {
        self.zones.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }
}
