//! Per-zone liveness state machine.
//!
//! Two states, `connected` and `disconnected`, starting disconnected. A
//! reading connects; only the periodic sweep (`check_timeout`) disconnects on
//! silence, and a transport-level close disconnects everything at once.
//! Methods return a `Transition` only when the state actually changed.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::warn;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Connected,
    Disconnected,
}

/// Invariant: `connected` implies `last_seen` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessRecord {
    connected: bool,
    last_seen: Option<Instant>,
}

impl LivenessRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    /// Records a reading that arrived at `at`. A late-stamped reading never
    /// moves `last_seen` backwards.
    pub fn mark_seen(&mut self, at: Instant) -> Option<Transition> {
        self.last_seen = Some(match self.last_seen {
            Some(previous) if previous > at => previous,
            _ => at,
        });

        if self.connected {
            None
        } else {
            self.connected = true;
            Some(Transition::Connected)
        }
    }

    /// Sweep check. `now` earlier than `last_seen` means the clock went
    /// backwards: treated as no time passed.
    pub fn check_timeout(&mut self, now: Instant, timeout: Duration) -> Option<Transition> {
        if !self.connected {
            return None;
        }
        let Some(last_seen) = self.last_seen else {
            self.connected = false;
            return Some(Transition::Disconnected);
        };

        match now.checked_duration_since(last_seen) {
            Some(silent) if silent > timeout => {
                self.connected = false;
                Some(Transition::Disconnected)
            }
            Some(_) => None,
            None => {
                warn!("liveness sweep clock is behind last reading, skipping timeout check");
                None
            }
        }
    }

    /// Transport channel closed: no zone can be live.
    pub fn force_disconnect(&mut self) -> Option<Transition> {
        if self.connected {
            self.connected = false;
            Some(Transition::Disconnected)
        } else {
            None
        }
    }

    pub fn silent_for(&self, now: Instant) -> Option<Duration> {
        self.last_seen.map(|seen| now.saturating_duration_since(seen))
    }
}
