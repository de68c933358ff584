use std::time::Duration;

use tokio::time::Instant;

/// Exponential backoff between retries of a failed upstream call.
///
/// Each [`Cooldown::make`] hands out the current delay and multiplies the
/// next one. With an auto-reset window the delay falls back to its start
/// value once no backoff happened for that long; without one it is reset
/// explicitly after a successful call.
#[derive(Debug, Clone)]
pub struct Cooldown {
    start: Duration,
    current: Duration,
    multiplier: f64,
    auto_reset_after: Option<Duration>,
    last_used: Option<Instant>,
}

impl Cooldown {
    pub fn new(start: Duration, multiplier: f64) -> Self {
        Self {
            start,
            current: start,
            multiplier,
            auto_reset_after: None,
            last_used: None,
        }
    }

    pub fn with_auto_reset(mut self, after: Duration) -> Self {
        self.auto_reset_after = Some(after);
        self
    }

    /// Current delay, without advancing it.
    pub fn get(&mut self) -> Duration {
        if let (Some(window), Some(last)) = (self.auto_reset_after, self.last_used) {
            if last.elapsed() > window {
                self.current = self.start;
            }
        }
        self.current
    }

    /// Current delay; the next one is `multiplier` times longer.
    pub fn make(&mut self) -> Duration {
        let delay = self.get();
        self.current = delay.mul_f64(self.multiplier);
        self.last_used = Some(Instant::now());
        delay
    }

    pub fn reset(&mut self, only_if_no_auto_reset: bool) {
        if only_if_no_auto_reset && self.auto_reset_after.is_some() {
            return;
        }
        self.current = self.start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn grows_by_the_multiplier() {
        let mut c = Cooldown::new(Duration::from_secs(1), 2.0);
        assert_eq!(c.make(), Duration::from_secs(1));
        assert_eq!(c.make(), Duration::from_secs(2));
        assert_eq!(c.get(), Duration::from_secs(4));

        c.reset(false);
        assert_eq!(c.get(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_reset_after_quiet_window() {
        let mut c = Cooldown::new(Duration::from_secs(1), 3.0).with_auto_reset(Duration::from_secs(60));
        c.make();
        c.make();
        assert_eq!(c.get(), Duration::from_secs(9));

        // explicit soft reset is ignored when auto reset is configured
        c.reset(true);
        assert_eq!(c.get(), Duration::from_secs(9));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(c.get(), Duration::from_secs(1));
    }
}
