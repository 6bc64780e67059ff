use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Fixed-rate gate for sequential work: the first tick completes immediately,
/// every later tick completes no sooner than one period after the previous one.
///
/// Overrunning units never cause a burst of catch-up ticks.
#[derive(Debug)]
pub struct Pacer {
    interval: Interval,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval(period.max(MIN_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}
