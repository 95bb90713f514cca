//! Threshold classification.
//!
//! Two independent tables live here:
//! - `ClassifierThresholds` turns a whole reading into a zone `HazardLevel`.
//!   Danger needs corroboration (temperature AND gas AND pm2.5 above their
//!   danger boundaries) unless flame is asserted; warning and caution fire on
//!   any single channel.
//! - `EventLadders` holds per-metric rungs used for rising-edge events. A
//!   ladder is checked from the top so one reading fires at most one rung per
//!   metric.

use crate::models::{HazardLevel, Metric, Reading};
use serde::{Deserialize, Serialize};

/// Caution / warning / danger cutoffs for one channel. Strictly "above".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundaries {
    pub caution: f64,
    pub warning: f64,
    pub danger: f64,
}

impl Boundaries {
    pub const fn new(caution: f64, warning: f64, danger: f64) -> Self {
        Self { caution, warning, danger }
    }

    pub fn is_ascending(&self) -> bool {
        self.caution < self.warning && self.warning < self.danger
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    pub temperature: Boundaries,
    pub gas: Boundaries,
    pub pm25: Boundaries,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            temperature: Boundaries::new(35.0, 45.0, 60.0),
            gas: Boundaries::new(100.0, 200.0, 400.0),
            pm25: Boundaries::new(25.0, 50.0, 75.0),
        }
    }
}

impl ClassifierThresholds {
    /// Classifies `reading`. With a positive `hysteresis_margin`, the level of
    /// `previous` is held while the current values still exceed that level's
    /// boundaries lowered by the margin. A margin of 0 ignores `previous`.
    pub fn classify(
        &self,
        reading: &Reading,
        previous: Option<&Reading>,
        hysteresis_margin: f64,
    ) -> HazardLevel {
        if reading.has_flame() {
            return HazardLevel::Danger;
        }

        let strict = self.level(reading, 0.0);
        let Some(previous) = previous else {
            return strict;
        };
        if hysteresis_margin <= 0.0 {
            return strict;
        }

        let held = self.classify(previous, None, 0.0);
        let relaxed = self.level(reading, hysteresis_margin);
        strict.max(relaxed.min(held))
    }

    fn level(&self, reading: &Reading, margin: f64) -> HazardLevel {
        let temperature = reading.metric(Metric::Temperature);
        let gas = reading.metric(Metric::Gas);
        let pm25 = reading.metric(Metric::Pm25);
        let above = |value: f64, cutoff: f64| value > cutoff - margin;

        if above(temperature, self.temperature.danger)
            && above(gas, self.gas.danger)
            && above(pm25, self.pm25.danger)
        {
            HazardLevel::Danger
        } else if above(temperature, self.temperature.warning)
            || above(gas, self.gas.warning)
            || above(pm25, self.pm25.warning)
        {
            HazardLevel::Warning
        } else if above(temperature, self.temperature.caution)
            || above(gas, self.gas.caution)
            || above(pm25, self.pm25.caution)
        {
            HazardLevel::Caution
        } else {
            HazardLevel::Normal
        }
    }
}

/// Classifies with the default thresholds and no hysteresis.
pub fn classify(reading: &Reading, previous: Option<&Reading>) -> HazardLevel {
    ClassifierThresholds::default().classify(reading, previous, 0.0)
}

/// One event boundary: crossing `above` from at-or-below fires at `level`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rung {
    pub level: HazardLevel,
    pub above: f64,
}

impl Rung {
    pub const fn new(level: HazardLevel, above: f64) -> Self {
        Self { level, above }
    }
}

/// Per-metric event rungs, each ladder in ascending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLadders {
    pub temperature: Vec<Rung>,
    pub gas: Vec<Rung>,
    pub pm25: Vec<Rung>,
    pub pm1: Vec<Rung>,
    pub pm10: Vec<Rung>,
    pub gas_delta: Vec<Rung>,
}

impl Default for EventLadders {
    fn default() -> Self {
        use HazardLevel::{Caution, Danger, Warning};
        Self {
            temperature: vec![Rung::new(Caution, 35.0), Rung::new(Warning, 50.0), Rung::new(Danger, 60.0)],
            gas: vec![Rung::new(Caution, 100.0), Rung::new(Warning, 200.0), Rung::new(Danger, 400.0)],
            pm25: vec![Rung::new(Caution, 25.0), Rung::new(Warning, 50.0), Rung::new(Danger, 75.0)],
            pm1: vec![Rung::new(Warning, 50.0)],
            pm10: vec![Rung::new(Warning, 100.0)],
            gas_delta: vec![Rung::new(Warning, 50.0)],
        }
    }
}

impl EventLadders {
    pub fn ladder(&self, metric: Metric) -> &[Rung] {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Gas => &self.gas,
            Metric::Pm25 => &self.pm25,
            Metric::Pm1 => &self.pm1,
            Metric::Pm10 => &self.pm10,
            Metric::GasDelta => &self.gas_delta,
        }
    }

    /// Highest rung crossed going from `previous` to `current`, if any.
    pub fn rising_edge(&self, metric: Metric, previous: f64, current: f64) -> Option<Rung> {
        self.ladder(metric)
            .iter()
            .rev()
            .find(|rung| previous <= rung.above && current > rung.above)
            .copied()
    }

    /// Name of the first metric whose ladder is not strictly ascending.
    pub fn first_unordered(&self) -> Option<Metric> {
        Metric::ALL.into_iter().find(|metric| {
            self.ladder(*metric)
                .windows(2)
                .any(|pair| pair[0].above >= pair[1].above || pair[0].level >= pair[1].level)
        })
    }
}
