use std::time::Instant;

/// Monotonic time source. The engine itself only takes explicit instants;
/// the process wiring stamps readings and drives the sweep through this.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
