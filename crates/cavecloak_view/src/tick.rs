//! # Server Tick Clock
//!
//! Fixed-rate clock standing in for the host's main loop when the service
//! runs standalone (simulation binary, benchmarks). A game server ticks at
//! 20 Hz; the view service runs on every `check_interval_ticks`-th of those
//! ticks through [`crate::PlayerViewService::on_server_tick`].
//!
//! ```text
//! loop {
//!     while clock.is_due() {
//!         let start = clock.begin();
//!         service.on_server_tick();
//!         clock.end(start);
//!     }
//!     clock.sleep_until_due();
//! }
//! ```

use std::time::{Duration, Instant};

/// Host ticks per second.
pub const SERVER_TICKS_PER_SECOND: u32 = 20;

/// Timing of executed ticks.
#[derive(Clone, Copy, Debug)]
pub struct TickStats {
    /// Shortest tick in microseconds.
    pub min_tick_us: u64,
    /// Longest tick in microseconds.
    pub max_tick_us: u64,
    /// Rolling average in microseconds.
    pub avg_tick_us: u64,
    /// Ticks that overran their budget.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn new(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_micros(budget),
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

/// Fixed-timestep clock.
pub struct ServerTickClock {
    tick_duration: Duration,
    last_poll: Instant,
    accumulator: Duration,
    tick_count: u64,
    stats: TickStats,
}

impl ServerTickClock {
    /// Clock running `rate` ticks per second (at least one).
    #[must_use]
    pub fn new(rate: u32) -> Self {
        let tick_duration = Duration::from_micros(1_000_000 / u64::from(rate.max(1)));
        Self {
            tick_duration,
            last_poll: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::new(tick_duration),
        }
    }

    /// Whether a tick is due. Call until it returns false.
    #[must_use]
    pub fn is_due(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_poll);
        self.last_poll = now;
        self.accumulator >= self.tick_duration
    }

    /// Consumes one due tick and returns its start time.
    #[must_use]
    pub fn begin(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Records the duration of the tick started at `start`.
    pub fn end(&mut self, start: Instant) {
        let elapsed = start.elapsed();
        let micros = duration_micros(elapsed);
        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(micros);
        self.stats.max_tick_us = self.stats.max_tick_us.max(micros);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + micros) / 16;
        if elapsed > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// Sleeps until the next tick is due.
    pub fn sleep_until_due(&self) {
        let elapsed = self.accumulator + self.last_poll.elapsed();
        if elapsed < self.tick_duration {
            std::thread::sleep(self.tick_duration - elapsed);
        }
    }

    /// Ticks begun so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Budget of one tick.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}

impl Default for ServerTickClock {
    fn default() -> Self {
        Self::new(SERVER_TICKS_PER_SECOND)
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
