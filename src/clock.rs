use log::trace;
use std::time::{Duration, Instant};

/// Wall clock sampler for the driver loop
///
/// `update` returns the milliseconds since the previous call, which is what
/// `Scene::update` expects. For a fixed tick rate, time is also accumulated
/// and `next_tick` hands out whole intervals until the accumulator runs dry.
pub struct FrameClock {
    previous: Instant,
    start: Instant,
    tick_interval_us: i64,
    time_acc_us: i64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            previous: now,
            start: now,
            tick_interval_us: 0,
            time_acc_us: 0,
        }
    }

    /// Clock that also accumulates fixed ticks of `tick_rate` seconds
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_tick_rate(tick_rate: f32) -> Self {
        Self {
            tick_interval_us: (tick_rate * 1_000_000.0) as i64,
            ..Self::new()
        }
    }

    /// Milliseconds since the last update
    pub fn update(&mut self) -> f32 {
        self.update_at(Instant::now())
    }

    /// Same as `update` with an explicit sample time. A time earlier than
    /// the previous sample counts as zero elapsed.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_at(&mut self, now: Instant) -> f32 {
        let delta = now.saturating_duration_since(self.previous);
        self.previous = now;
        let delta_us = i64::try_from(delta.as_micros()).unwrap_or(i64::MAX);
        if self.tick_interval_us > 0 {
            self.time_acc_us = self.time_acc_us.saturating_add(delta_us);
        }
        trace!("Frame delta {} us", delta_us);
        delta_us as f32 / 1000.0
    }

    /// Takes one fixed tick off the accumulator, returning its length in
    /// milliseconds. `drop_ticks` discards any backlog instead of letting
    /// the caller catch up.
    #[allow(clippy::cast_precision_loss)]
    pub fn next_tick(&mut self, drop_ticks: bool) -> Option<f32> {
        if self.tick_interval_us <= 0 || self.time_acc_us < self.tick_interval_us
        {
            return None;
        }
        if drop_ticks {
            self.time_acc_us = 0;
        } else {
            self.time_acc_us -= self.tick_interval_us;
        }
        Some(self.tick_interval_us as f32 / 1000.0)
    }

    /// Time since the clock was created
    #[must_use]
    pub fn running_time(&self) -> Duration {
        self.previous.saturating_duration_since(self.start)
    }
}
