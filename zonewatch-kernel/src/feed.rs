/**
 * EVENT FEED - Bounded, deduplicated event log for operators
 *
 * ROLE: Records the events produced by the zone monitor, newest first, with a
 * single pinned slot for an active flame alert.
 *
 * OPERATION:
 * - DedupTable: (zone, level, message) -> last emission. A key seen less than
 *   one window ago is suppressed. Expired entries are overwritten on lookup.
 * - record() bypasses the table; liveness transitions always land.
 * - recent: ordinary entries, newest at the front, at most `capacity` long.
 * - pinned: flame event held at the head, outside the capacity count, only
 *   removed by a flame clear or replaced by another flame.
 */

use crate::models::{DedupKey, EventRecord};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DedupTable {
    window: Duration,
    last_emitted: HashMap<DedupKey, Instant>,
}

impl DedupTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: HashMap::new(),
        }
    }

    /// Returns true and records `now` when `key` may be emitted.
    pub fn admit(&mut self, key: &DedupKey, now: Instant) -> bool {
        if let Some(&last) = self.last_emitted.get(key) {
            // Clock going backwards counts as no time passed
            let elapsed = now.checked_duration_since(last).unwrap_or(Duration::ZERO);
            if elapsed < self.window {
                return false;
            }
        }
        self.last_emitted.insert(key.clone(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.last_emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_emitted.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct EventFeed {
    pinned: Option<EventRecord>,
    recent: VecDeque<EventRecord>,
    capacity: usize,
    dedup: DedupTable,
    emitted: u64,
    suppressed: u64,
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_DEDUP_WINDOW)
    }
}

impl EventFeed {
    pub fn new(capacity: usize, dedup_window: Duration) -> Self {
        Self {
            pinned: None,
            recent: VecDeque::with_capacity(capacity + 1),
            capacity,
            dedup: DedupTable::new(dedup_window),
            emitted: 0,
            suppressed: 0,
        }
    }

    /// Records `event` unless an identical (level, message) was emitted within
    /// the dedup window. Returns whether the feed changed.
    pub fn submit(&mut self, event: EventRecord) -> bool {
        if !self.dedup.admit(&event.dedup_key, event.first_emitted_at) {
            self.suppressed += 1;
            debug!(key = %event.dedup_key, "duplicate event suppressed");
            return false;
        }

        self.record(event);
        true
    }

    /// Records `event` without the duplicate check. Used for liveness
    /// transitions, which are real state changes every time they occur.
    pub fn record(&mut self, event: EventRecord) {
        self.emitted += 1;
        if event.is_flame() {
            if let Some(displaced) = self.pinned.replace(event) {
                self.push_recent(displaced);
            }
        } else {
            self.push_recent(event);
        }
    }

    /// Unpins the flame event owned by `zone`, keeping it as an ordinary entry.
    pub fn clear_pin(&mut self, zone: &str) -> Option<EventRecord> {
        if self.pinned_zone() != Some(zone) {
            return None;
        }
        let unpinned = self.pinned.take()?;
        self.push_recent(unpinned.clone());
        Some(unpinned)
    }

    fn push_recent(&mut self, event: EventRecord) {
        self.recent.push_front(event);
        while self.recent.len() > self.capacity {
            self.recent.pop_back();
        }
    }

    pub fn pinned(&self) -> Option<&EventRecord> {
        self.pinned.as_ref()
    }

    pub fn pinned_zone(&self) -> Option<&str> {
        self.pinned.as_ref().map(|event| event.zone.as_str())
    }

    pub fn recent(&self) -> impl Iterator<Item = &EventRecord> {
        self.recent.iter()
    }

    /// Pinned entry first, then ordinary entries newest first.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.pinned.iter().chain(self.recent.iter()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.recent.len() + usize::from(self.pinned.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
