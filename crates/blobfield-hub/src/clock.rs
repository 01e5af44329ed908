//! Fixed-rate simulation clock.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Target simulation rate.
pub const TICKS_PER_SECOND: u32 = 10;

/// Interval between steps at [`TICKS_PER_SECOND`].
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000 / TICKS_PER_SECOND as u64);

/// Best-effort fixed-interval ticker owned by the hub task.
///
/// A late step delays the following ones instead of firing a burst to catch up.
#[derive(Debug)]
pub struct SimulationClock {
    interval: Interval,
    period: Duration,
}

impl SimulationClock {
    /// Start a clock whose first tick is one period from now.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next step.
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}
