use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Monotonic time source sampled by [`Clock`].
pub trait TimeSource {
    /// Time elapsed since an arbitrary fixed origin. Must never go backwards.
    fn now(&self) -> Duration;
}

/// Wall-clock time source backed by [`std::time::Instant`].
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: std::time::Instant,
}

#[cfg(not(target_arch = "wasm32"))]
impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Host-driven time source. Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Rc<Cell<Duration>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, step: Duration) {
        self.now.set(self.now.get() + step);
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Frame clock owned by a session. It is created once and sampled every
/// tick, so each delta is measured against the previous tick.
pub struct Clock {
    source: Box<dyn TimeSource>,
    last: Option<Duration>,
    elapsed: Duration,
}

impl Clock {
    pub fn new(source: Box<dyn TimeSource>) -> Self {
        Self {
            source,
            last: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Marks the current instant as the reference for the next delta.
    pub fn start(&mut self) {
        self.last = Some(self.source.now());
    }

    pub fn is_running(&self) -> bool {
        self.last.is_some()
    }

    /// Seconds since the previous sample; zero on the first one.
    pub fn delta(&mut self) -> f32 {
        let now = self.source.now();
        let delta = match self.last {
            Some(previous) => now.saturating_sub(previous),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        self.elapsed += delta;
        delta.as_secs_f32()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("last", &self.last)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_relative_to_previous_sample() {
        let time = ManualTime::new();
        let mut clock = Clock::new(Box::new(time.clone()));
        clock.start();
        time.advance(Duration::from_millis(16));
        assert!((clock.delta() - 0.016).abs() < 1e-6);
        time.advance(Duration::from_millis(34));
        assert!((clock.delta() - 0.034).abs() < 1e-6);
        assert_eq!(clock.elapsed(), Duration::from_millis(50));
    }

    #[test]
    fn first_sample_without_start_is_zero() {
        let time = ManualTime::new();
        time.set(Duration::from_secs(10));
        let mut clock = Clock::new(Box::new(time.clone()));
        assert_eq!(clock.delta(), 0.0);
        assert!(clock.is_running());
    }

    #[test]
    fn backwards_source_never_yields_negative_delta() {
        let time = ManualTime::new();
        time.set(Duration::from_secs(5));
        let mut clock = Clock::new(Box::new(time.clone()));
        clock.start();
        time.set(Duration::from_secs(4));
        assert_eq!(clock.delta(), 0.0);
    }
}
