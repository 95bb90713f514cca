/**
 * ZONE MONITOR - Orchestrates classification, liveness and events per zone
 *
 * ROLE: Owns one state record per zone and runs each incoming reading through
 * liveness -> classification -> edge detection -> event feed, then publishes
 * the zone's new status.
 *
 * CONCURRENCY:
 * - Each zone sits behind its own mutex; readings for one zone are serialized,
 *   different zones proceed in parallel.
 * - Lock order is always zone -> feed.
 * - The sweep uses try_lock and skips a zone busy with a reading; that zone is
 *   being refreshed anyway.
 * - Listeners run after the zone lock is released and must not register new
 *   listeners from inside a callback. Two readings for the same zone may reach
 *   listeners out of order; the status revision is assigned under the zone
 *   lock, so the highest revision seen is the current one.
 *
 * EVENTS:
 * - Threshold edges need a previous reading; a zone's first reading only sets
 *   the baseline. Flame fires on the first reading too.
 * - Liveness transitions skip dedup. Threshold and flame events go through it.
 */

use crate::classifier::{ClassifierThresholds, EventLadders};
use crate::clock::Clock;
use crate::feed::{EventFeed, DEFAULT_CAPACITY, DEFAULT_DEDUP_WINDOW};
use crate::liveness::{Transition, DEFAULT_TIMEOUT};
use crate::models::{
    EventKind, EventRecord, HazardLevel, Metric, Reading, SystemOverview, ZoneId, ZoneStatus,
};
use crate::state::{new_state, Shared, ZoneState, ZoneTable};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type EventCallback = Box<dyn Fn(&EventRecord) + Send + Sync>;
pub type StatusCallback = Box<dyn Fn(&ZoneStatus) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub liveness_timeout: Duration,
    pub dedup_window: Duration,
    pub feed_capacity: usize,
    pub hysteresis_margin: f64,
    pub classifier: ClassifierThresholds,
    pub ladders: EventLadders,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            liveness_timeout: DEFAULT_TIMEOUT,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            feed_capacity: DEFAULT_CAPACITY,
            hysteresis_margin: 0.0,
            classifier: ClassifierThresholds::default(),
            ladders: EventLadders::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub zones_tracked: usize,
    pub zones_connected: usize,
    pub events_emitted: u64,
    pub events_suppressed: u64,
}

pub struct ZoneMonitor {
    settings: MonitorSettings,
    zones: ZoneTable,
    feed: Shared<EventFeed>,
    event_listeners: RwLock<Vec<EventCallback>>,
    status_listeners: RwLock<Vec<StatusCallback>>,
}

impl ZoneMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        let feed = EventFeed::new(settings.feed_capacity, settings.dedup_window);
        Self {
            settings,
            zones: ZoneTable::new(),
            feed: new_state(feed),
            event_listeners: RwLock::new(Vec::new()),
            status_listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Declares a known zone up front (disconnected until its first reading),
    /// or renames an existing one.
    pub fn register_zone(&self, id: &str, name: &str) -> ZoneStatus {
        let zone = self.zones.get_or_create(id, || name.to_string());
        let mut state = zone.lock();
        state.name = name.to_string();
        state.status()
    }

    /// Applies one reading to its zone. Unknown zones are created on the fly.
    pub fn ingest(&self, reading: Reading) -> ZoneStatus {
        let zone = self.zones.get_or_create(reading.zone(), || reading.zone().to_string());
        let mut emitted = Vec::new();

        let status = {
            let mut state = zone.lock();
            let at = reading.received_at();

            if let Some(transition) = state.liveness.mark_seen(at) {
                info!(zone = %state.id, "zone connected");
                self.record(&mut emitted, liveness_event(&state, transition, at));
            }

            let level = self.settings.classifier.classify(
                &reading,
                state.previous.as_ref(),
                self.settings.hysteresis_margin,
            );

            if let Some(previous) = state.previous.as_ref() {
                for metric in Metric::ALL {
                    let current = reading.metric(metric);
                    let Some(rung) = self.settings.ladders.rising_edge(metric, previous.metric(metric), current) else {
                        continue;
                    };
                    let message = format!("{} {} {}", state.name, metric.label(), rung.level);
                    let event = EventRecord::new(
                        &state.id,
                        rung.level,
                        EventKind::Threshold { metric },
                        message,
                        Some(current),
                        at,
                    );
                    self.submit(&mut emitted, event);
                }
            }

            let was_flaming = state.flame_active();
            if reading.has_flame() && !was_flaming {
                let event = EventRecord::new(
                    &state.id,
                    HazardLevel::Danger,
                    EventKind::Flame,
                    format!("{} flame detected", state.name),
                    None,
                    at,
                );
                self.submit(&mut emitted, event);
            } else if was_flaming && !reading.has_flame() {
                let unpinned = self.feed.lock().clear_pin(&state.id).is_some();
                if unpinned {
                    let event = EventRecord::new(
                        &state.id,
                        HazardLevel::Normal,
                        EventKind::FlameCleared,
                        format!("{} flame cleared", state.name),
                        None,
                        at,
                    );
                    self.submit(&mut emitted, event);
                }
            }

            if level != state.level {
                info!(zone = %state.id, from = %state.level, to = %level, "zone level changed");
            }
            state.level = level;
            state.previous = Some(reading);
            state.next_status()
        };

        self.dispatch(&emitted, std::slice::from_ref(&status));
        status
    }

    /// Liveness sweep. Returns the zones that just went silent.
    pub fn tick(&self, now: Instant) -> Vec<ZoneStatus> {
        let timeout = self.settings.liveness_timeout;
        let mut emitted = Vec::new();
        let mut changed = Vec::new();

        for zone in self.zones.all() {
            let Some(mut state) = zone.try_lock() else {
                debug!("zone busy with a reading, skipped by sweep");
                continue;
            };
            if let Some(transition) = state.liveness.check_timeout(now, timeout) {
                info!(zone = %state.id, timeout_secs = timeout.as_secs(), "zone disconnected after silence");
                self.record(&mut emitted, liveness_event(&state, transition, now));
                changed.push(state.next_status());
            }
        }

        self.dispatch(&emitted, &changed);
        changed
    }

    /// Transport channel closed: every connected zone goes down immediately.
    pub fn transport_closed(&self, now: Instant) -> Vec<ZoneStatus> {
        let mut emitted = Vec::new();
        let mut changed = Vec::new();

        for zone in self.zones.all() {
            let mut state = zone.lock();
            if let Some(transition) = state.liveness.force_disconnect() {
                self.record(&mut emitted, liveness_event(&state, transition, now));
                changed.push(state.next_status());
            }
        }

        if !changed.is_empty() {
            warn!(zones = changed.len(), "transport closed, zones forced disconnected");
        }
        self.dispatch(&emitted, &changed);
        changed
    }

    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        self.event_listeners.write().push(Box::new(callback));
    }

    pub fn on_status<F>(&self, callback: F)
    where
        F: Fn(&ZoneStatus) + Send + Sync + 'static,
    {
        self.status_listeners.write().push(Box::new(callback));
    }

    /// Pinned event first, then the most recent entries.
    pub fn current_feed(&self) -> Vec<EventRecord> {
        self.feed.lock().snapshot()
    }

    pub fn pinned_event(&self) -> Option<EventRecord> {
        self.feed.lock().pinned().cloned()
    }

    pub fn zone_status(&self, id: &str) -> Option<ZoneStatus> {
        self.zones.get(id).map(|zone| zone.lock().status())
    }

    pub fn zone_statuses(&self) -> HashMap<ZoneId, ZoneStatus> {
        self.zones
            .all()
            .into_iter()
            .map(|zone| {
                let status = zone.lock().status();
                (status.zone.clone(), status)
            })
            .collect()
    }

    pub fn overview(&self) -> SystemOverview {
        SystemOverview::from_statuses(self.zone_statuses().values())
    }

    pub fn stats(&self) -> MonitorStats {
        let statuses = self.zone_statuses();
        let feed = self.feed.lock();
        MonitorStats {
            zones_tracked: statuses.len(),
            zones_connected: statuses.values().filter(|s| s.connected).count(),
            events_emitted: feed.emitted(),
            events_suppressed: feed.suppressed(),
        }
    }

    fn submit(&self, emitted: &mut Vec<EventRecord>, event: EventRecord) {
        if !self.feed.lock().submit(event.clone()) {
            return;
        }
        self.accepted(emitted, event);
    }

    fn record(&self, emitted: &mut Vec<EventRecord>, event: EventRecord) {
        self.feed.lock().record(event.clone());
        self.accepted(emitted, event);
    }

    fn accepted(&self, emitted: &mut Vec<EventRecord>, event: EventRecord) {
        if event.level == HazardLevel::Danger {
            warn!(zone = %event.zone, message = %event.message, "danger event");
        } else {
            debug!(zone = %event.zone, level = %event.level, message = %event.message, "event recorded");
        }
        emitted.push(event);
    }

    fn dispatch(&self, events: &[EventRecord], statuses: &[ZoneStatus]) {
        if !events.is_empty() {
            let listeners = self.event_listeners.read();
            for event in events {
                for listener in listeners.iter() {
                    listener(event);
                }
            }
        }
        if !statuses.is_empty() {
            let listeners = self.status_listeners.read();
            for status in statuses {
                for listener in listeners.iter() {
                    listener(status);
                }
            }
        }
    }

    /// Runs `tick` every `every` until `shutdown` flips to true.
    pub fn start_liveness_sweep(
        monitor: Arc<ZoneMonitor>,
        clock: Arc<dyn Clock>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        info!(
            interval_ms = every.as_millis() as u64,
            timeout_secs = monitor.settings.liveness_timeout.as_secs(),
            "starting liveness sweep"
        );

        tokio::spawn(async move {
            if *shutdown.borrow() {
                return;
            }
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let changed = monitor.tick(clock.now());
                        if !changed.is_empty() {
                            debug!(zones = changed.len(), "sweep disconnected zones");
                        }
                    }
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("liveness sweep stopped");
        })
    }
}

fn liveness_event(state: &ZoneState, transition: Transition, at: Instant) -> EventRecord {
    match transition {
        Transition::Connected => EventRecord::new(
            &state.id,
            HazardLevel::Normal,
            EventKind::Connected,
            format!("{} sensor connected", state.name),
            None,
            at,
        ),
        Transition::Disconnected => EventRecord::new(
            &state.id,
            HazardLevel::Warning,
            EventKind::Disconnected,
            format!("{} sensor disconnected", state.name),
            None,
            at,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use parking_lot::Mutex;

    fn reading(zone: &str, at: Instant, temperature: f64, gas: f64, pm25: f64, flame: bool) -> Reading {
        Reading::new(zone, at)
            .temperature(temperature)
            .gas(gas)
            .pm25(pm25)
            .flame(flame)
    }

    fn recorder(monitor: &ZoneMonitor) -> Arc<Mutex<Vec<EventRecord>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        monitor.on_event(move |event| sink.lock().push(event.clone()));
        events
    }

    fn count(events: &[EventRecord], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    #[test]
    fn test_danger_scenario_fires_three_edges() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        let first = monitor.ingest(reading("z1", t0, 20.0, 10.0, 5.0, false));
        assert!(first.connected);
        assert_eq!(first.level, HazardLevel::Normal);

        let second = monitor.ingest(reading("z1", t0 + Duration::from_secs(5), 62.0, 410.0, 80.0, false));
        assert_eq!(second.level, HazardLevel::Danger);
        assert!(second.connected);

        let events = events.lock();
        assert_eq!(count(&events, EventKind::Connected), 1);
        for metric in [Metric::Temperature, Metric::Gas, Metric::Pm25] {
            let fired: Vec<_> = events
                .iter()
                .filter(|e| e.kind == EventKind::Threshold { metric })
                .collect();
            assert_eq!(fired.len(), 1, "{metric:?}");
            assert_eq!(fired[0].level, HazardLevel::Danger);
        }
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_steady_value_fires_once() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        monitor.ingest(reading("z1", t0, 20.0, 0.0, 0.0, false));
        for i in 1..=5 {
            monitor.ingest(reading("z1", t0 + Duration::from_secs(i * 70), 50.0, 0.0, 0.0, false));
        }

        let events = events.lock();
        let temperature: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Threshold { metric: Metric::Temperature })
            .collect();
        assert_eq!(temperature.len(), 1);
        assert_eq!(temperature[0].level, HazardLevel::Caution);
        assert_eq!(temperature[0].value, Some(50.0));
    }

    #[test]
    fn test_simultaneous_events_from_one_reading() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        monitor.ingest(reading("z1", t0, 20.0, 0.0, 0.0, false));
        monitor.ingest(reading("z1", t0 + Duration::from_secs(1), 40.0, 250.0, 0.0, false));

        let events = events.lock();
        let levels: HashMap<_, _> = events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Threshold { metric } => Some((metric, e.level)),
                _ => None,
            })
            .collect();
        assert_eq!(levels.get(&Metric::Temperature), Some(&HazardLevel::Caution));
        assert_eq!(levels.get(&Metric::Gas), Some(&HazardLevel::Warning));
        assert_eq!(levels.len(), 2);
    }

    #[test]
    fn test_oscillation_is_deduplicated() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        // 20 -> 40 -> 20 -> 40 crosses the caution rung twice within the window
        for (i, t) in [20.0, 40.0, 20.0, 40.0].into_iter().enumerate() {
            monitor.ingest(reading("z1", t0 + Duration::from_secs(i as u64 * 5), t, 0.0, 0.0, false));
        }
        assert_eq!(count(&events.lock(), EventKind::Threshold { metric: Metric::Temperature }), 1);
        assert_eq!(monitor.stats().events_suppressed, 1);

        // Past the window the same crossing is reported again
        monitor.ingest(reading("z1", t0 + Duration::from_secs(70), 20.0, 0.0, 0.0, false));
        monitor.ingest(reading("z1", t0 + Duration::from_secs(75), 40.0, 0.0, 0.0, false));
        assert_eq!(count(&events.lock(), EventKind::Threshold { metric: Metric::Temperature }), 2);
    }

    #[test]
    fn test_flame_pin_and_clear() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        monitor.ingest(reading("z1", t0, 20.0, 0.0, 0.0, false));
        let status = monitor.ingest(reading("z1", t0 + Duration::from_secs(1), 20.0, 0.0, 0.0, true));
        assert_eq!(status.level, HazardLevel::Danger);
        assert_eq!(monitor.pinned_event().map(|e| e.kind), Some(EventKind::Flame));

        let status = monitor.ingest(reading("z1", t0 + Duration::from_secs(2), 20.0, 0.0, 0.0, false));
        assert_eq!(status.level, HazardLevel::Normal);
        assert!(monitor.pinned_event().is_none());

        let events = events.lock();
        assert_eq!(count(&events, EventKind::Flame), 1);
        assert_eq!(count(&events, EventKind::FlameCleared), 1);
        let cleared = events.iter().find(|e| e.kind == EventKind::FlameCleared).unwrap();
        assert_eq!(cleared.level, HazardLevel::Normal);

        let feed = monitor.current_feed();
        assert_eq!(feed[0].kind, EventKind::FlameCleared);
        assert_eq!(feed[1].kind, EventKind::Flame);
    }

    #[test]
    fn test_flame_on_first_reading() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);
        let status = monitor.ingest(reading("z1", t0, 62.0, 410.0, 80.0, true));
        assert_eq!(status.level, HazardLevel::Danger);
        assert_eq!(monitor.pinned_event().map(|e| e.zone), Some("z1".to_string()));

        let kinds: Vec<_> = events.lock().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Connected, EventKind::Flame]);
    }

    #[test]
    fn test_first_reading_sets_baseline_only() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        let status = monitor.ingest(reading("z1", t0, 40.0, 250.0, 30.0, false));
        assert_eq!(status.level, HazardLevel::Warning);
        assert_eq!(events.lock().len(), 1);
        assert_eq!(count(&events.lock(), EventKind::Connected), 1);

        // Staying hot is not a crossing; climbing further is
        monitor.ingest(reading("z1", t0 + Duration::from_secs(1), 40.0, 250.0, 30.0, false));
        monitor.ingest(reading("z1", t0 + Duration::from_secs(2), 55.0, 250.0, 30.0, false));
        let events = events.lock();
        let temperature: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Threshold { metric: Metric::Temperature })
            .collect();
        assert_eq!(temperature.len(), 1);
        assert_eq!(temperature[0].level, HazardLevel::Warning);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_pm1_crossing_fires_warning() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);
        monitor.register_zone("z1", "Boiler Room");

        monitor.ingest(Reading::new("z1", t0).with_metric(Metric::Pm1, 10.0));
        let status = monitor.ingest(Reading::new("z1", t0 + Duration::from_secs(1)).with_metric(Metric::Pm1, 60.0));
        // pm1 has no classifier boundary
        assert_eq!(status.level, HazardLevel::Normal);

        let events = events.lock();
        let pm1: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Threshold { metric: Metric::Pm1 })
            .collect();
        assert_eq!(pm1.len(), 1);
        assert_eq!(pm1[0].level, HazardLevel::Warning);
        assert_eq!(pm1[0].message, "Boiler Room PM1.0 warning");
        assert_eq!(pm1[0].value, Some(60.0));
    }

    #[test]
    fn test_reconnect_within_window_is_reported() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings {
            liveness_timeout: Duration::from_secs(20),
            ..MonitorSettings::default()
        });
        let events = recorder(&monitor);

        monitor.ingest(reading("z1", t0, 20.0, 0.0, 0.0, false));
        assert_eq!(monitor.transport_closed(t0 + Duration::from_secs(5)).len(), 1);
        let status = monitor.ingest(reading("z1", t0 + Duration::from_secs(10), 20.0, 0.0, 0.0, false));
        assert!(status.connected);

        assert_eq!(count(&events.lock(), EventKind::Connected), 2);
        assert_eq!(count(&events.lock(), EventKind::Disconnected), 1);
        assert_eq!(monitor.current_feed()[0].kind, EventKind::Connected);
        assert_eq!(monitor.stats().events_suppressed, 0);

        // A second silence inside the window is reported as well
        assert_eq!(monitor.tick(t0 + Duration::from_secs(35)).len(), 1);
        assert_eq!(count(&events.lock(), EventKind::Disconnected), 2);
    }

    #[test]
    fn test_same_name_zones_do_not_suppress_each_other() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);
        monitor.register_zone("a", "Boiler");
        monitor.register_zone("b", "Boiler");

        for zone in ["a", "b"] {
            monitor.ingest(reading(zone, t0, 20.0, 10.0, 5.0, false));
            monitor.ingest(reading(zone, t0 + Duration::from_secs(1), 62.0, 410.0, 80.0, false));
        }

        let events = events.lock();
        for zone in ["a", "b"] {
            let dangers = events
                .iter()
                .filter(|e| e.zone == zone && matches!(e.kind, EventKind::Threshold { .. }))
                .filter(|e| e.level == HazardLevel::Danger)
                .count();
            assert_eq!(dangers, 3, "{zone}");
            assert!(events.iter().any(|e| e.zone == zone && e.kind == EventKind::Connected));
        }
        assert_eq!(monitor.stats().events_suppressed, 0);
    }

    #[test]
    fn test_flame_clear_without_pin_is_silent() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        monitor.ingest(reading("z1", t0, 0.0, 0.0, 0.0, true));
        // z2 takes the pin over
        monitor.ingest(reading("z2", t0, 0.0, 0.0, 0.0, true));
        monitor.ingest(reading("z1", t0 + Duration::from_secs(1), 0.0, 0.0, 0.0, false));

        assert_eq!(count(&events.lock(), EventKind::FlameCleared), 0);
        assert_eq!(monitor.pinned_event().map(|e| e.zone), Some("z2".to_string()));
    }

    #[test]
    fn test_sweep_disconnects_silent_zone_once() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);

        monitor.ingest(reading("z1", t0, 20.0, 0.0, 0.0, false));
        monitor.ingest(reading("z2", t0 + Duration::from_secs(50), 20.0, 0.0, 0.0, false));

        assert!(monitor.tick(t0 + Duration::from_secs(60)).is_empty());
        let changed = monitor.tick(t0 + Duration::from_secs(70));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].zone, "z1");
        assert!(!changed[0].connected);
        assert!(monitor.tick(t0 + Duration::from_secs(80)).is_empty());

        assert_eq!(count(&events.lock(), EventKind::Disconnected), 1);
        assert!(monitor.zone_status("z2").unwrap().connected);
    }

    #[test]
    fn test_sweep_skips_zone_being_updated() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        monitor.ingest(reading("z1", t0, 20.0, 0.0, 0.0, false));

        let zone = monitor.zones.get("z1").unwrap();
        let guard = zone.lock();
        assert!(monitor.tick(t0 + Duration::from_secs(120)).is_empty());
        drop(guard);

        assert_eq!(monitor.tick(t0 + Duration::from_secs(120)).len(), 1);
    }

    #[test]
    fn test_transport_closed_disconnects_all() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let events = recorder(&monitor);
        monitor.register_zone("idle", "Idle Zone");
        monitor.ingest(reading("a", t0, 20.0, 0.0, 0.0, false));
        monitor.ingest(reading("b", t0, 20.0, 0.0, 0.0, false));

        let changed = monitor.transport_closed(t0 + Duration::from_secs(1));
        assert_eq!(changed.len(), 2);
        assert!(monitor.zone_statuses().values().all(|s| !s.connected));
        assert_eq!(count(&events.lock(), EventKind::Disconnected), 2);
        assert!(monitor.transport_closed(t0 + Duration::from_secs(2)).is_empty());
    }

    #[test]
    fn test_registered_zone_name_in_messages() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let status = monitor.register_zone("warehouse", "Raw Material Warehouse");
        assert!(!status.connected);

        monitor.ingest(reading("warehouse", t0, 20.0, 0.0, 0.0, false));
        monitor.ingest(reading("warehouse", t0 + Duration::from_secs(1), 65.0, 0.0, 0.0, false));
        let feed = monitor.current_feed();
        assert!(feed.iter().any(|e| e.message == "Raw Material Warehouse temperature danger"));
        assert!(feed.iter().any(|e| e.message == "Raw Material Warehouse sensor connected"));
    }

    #[test]
    fn test_status_listener_sees_every_update() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        monitor.on_status(move |status| sink.lock().push(status.clone()));

        monitor.ingest(reading("z1", t0, 20.0, 0.0, 0.0, false));
        monitor.ingest(reading("z1", t0 + Duration::from_secs(1), 50.0, 0.0, 0.0, false));
        monitor.tick(t0 + Duration::from_secs(100));

        let statuses = statuses.lock();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[1].level, HazardLevel::Warning);
        assert!(!statuses[2].connected);
        let revisions: Vec<_> = statuses.iter().map(|s| s.revision).collect();
        assert_eq!(revisions, vec![1, 2, 3]);
        assert_eq!(monitor.zone_status("z1").unwrap().revision, 3);
    }

    #[test]
    fn test_concurrent_same_zone_revisions() {
        let t0 = Instant::now();
        let monitor = Arc::new(ZoneMonitor::new(MonitorSettings::default()));
        let latest = Arc::new(Mutex::new(0u64));
        let delivered = Arc::new(Mutex::new(0usize));
        let (sink, calls) = (latest.clone(), delivered.clone());
        monitor.on_status(move |status| {
            let mut latest = sink.lock();
            *latest = (*latest).max(status.revision);
            *calls.lock() += 1;
        });

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for i in 0..25u64 {
                        let temperature = if (n + i) % 2 == 0 { 20.0 } else { 50.0 };
                        monitor.ingest(reading("shared", t0 + Duration::from_millis(i), temperature, 0.0, 0.0, false));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let current = monitor.zone_status("shared").unwrap();
        assert_eq!(current.revision, 100);
        assert_eq!(*latest.lock(), current.revision);
        assert_eq!(*delivered.lock(), 100);
    }

    #[test]
    fn test_overview_counts_connected_only() {
        let t0 = Instant::now();
        let monitor = ZoneMonitor::new(MonitorSettings::default());
        assert_eq!(monitor.overview().status, crate::models::SystemStatus::Standby);

        monitor.ingest(reading("a", t0, 62.0, 410.0, 80.0, false));
        monitor.ingest(reading("b", t0 + Duration::from_secs(55), 20.0, 0.0, 0.0, false));
        assert_eq!(monitor.overview().status, crate::models::SystemStatus::Danger);

        monitor.tick(t0 + Duration::from_secs(65));
        let overview = monitor.overview();
        assert_eq!(overview.connected_zones, 1);
        assert_eq!(overview.total_zones, 2);
        assert_eq!(overview.counts.danger, 0);
        assert_eq!(overview.status, crate::models::SystemStatus::Normal);
    }

    #[test]
    fn test_parallel_zones() {
        let t0 = Instant::now();
        let monitor = Arc::new(ZoneMonitor::new(MonitorSettings::default()));
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    let zone = format!("zone-{n}");
                    for i in 0..50u64 {
                        let temperature = if i % 2 == 0 { 20.0 } else { 40.0 };
                        monitor.ingest(reading(&zone, t0 + Duration::from_millis(i), temperature, 0.0, 0.0, false));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = monitor.stats();
        assert_eq!(stats.zones_tracked, 8);
        assert_eq!(stats.zones_connected, 8);
        // Per zone: one connect, one caution crossing; the other 24 crossings are duplicates
        assert_eq!(stats.events_emitted, 16);
        assert_eq!(stats.events_suppressed, 8 * 24);
        assert!(monitor.current_feed().len() <= DEFAULT_CAPACITY);
    }

    #[tokio::test]
    async fn test_liveness_sweep_task_stops_on_shutdown() {
        let settings = MonitorSettings {
            liveness_timeout: Duration::from_millis(30),
            ..MonitorSettings::default()
        };
        let monitor = Arc::new(ZoneMonitor::new(settings));
        monitor.ingest(reading("z1", Instant::now(), 20.0, 0.0, 0.0, false));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = ZoneMonitor::start_liveness_sweep(
            monitor.clone(),
            Arc::new(SystemClock),
            Duration::from_millis(5),
            shutdown_rx,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!monitor.zone_status("z1").unwrap().connected);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweep did not stop")
            .unwrap();
    }
}
