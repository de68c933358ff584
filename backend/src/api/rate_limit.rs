//! Sliding-window request accounting.
//!
//! The limiter keeps the send instants of requests made within the last
//! `period` and answers how many more may be sent and how long to wait for
//! more. Expired instants are dropped lazily on every query.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::ApiError;

/// How [`RateLimiter::time_until_available`] estimates the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Wait until exactly enough slots have been freed.
    Smart,
    /// Wait until the oldest recorded request expires, whatever was asked.
    Strict,
}

/// What [`RateLimiter::mark_sent`] does when the window is already full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    EvictOldest,
    Reject,
}

#[derive(Clone)]
pub struct RateLimiter {
    max_requests: usize,
    period: Duration,
    wait_policy: WaitPolicy,
    overflow: OverflowPolicy,
    timeline: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, period: Duration, wait_policy: WaitPolicy) -> Self {
        Self {
            max_requests,
            period,
            wait_policy,
            overflow: OverflowPolicy::EvictOldest,
            timeline: VecDeque::with_capacity(max_requests),
        }
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Records one request sent now.
    pub fn mark_sent(&mut self) -> Result<(), ApiError> {
        let now = Instant::now();
        self.prune(now);

        if self.timeline.len() >= self.max_requests {
            match self.overflow {
                OverflowPolicy::EvictOldest => {
                    self.timeline.pop_front();
                }
                OverflowPolicy::Reject => {
                    return Err(ApiError::RateLimitExceeded(format!(
                        "{} requests per {:?}",
                        self.max_requests, self.period
                    )));
                }
            }
        }

        self.timeline.push_back(now);
        Ok(())
    }

    pub fn available(&mut self) -> usize {
        self.prune(Instant::now());
        self.max_requests.saturating_sub(self.timeline.len())
    }

    /// Time to wait before `requests` (all of them when `None`) can be sent.
    pub fn time_until_available(&mut self, requests: Option<usize>) -> Result<Duration, ApiError> {
        let now = Instant::now();
        self.prune(now);

        match self.wait_policy {
            WaitPolicy::Smart => {
                let requested = requests.unwrap_or(self.max_requests);
                if requested > self.max_requests {
                    return Err(ApiError::InvalidRequestCount {
                        requested,
                        max: self.max_requests,
                    });
                }

                let available = self.max_requests - self.timeline.len();
                if available >= requested {
                    return Ok(Duration::ZERO);
                }

                let lacking = requested - available;
                Ok(self.remaining(self.timeline[lacking - 1], now))
            }
            WaitPolicy::Strict => Ok(self
                .timeline
                .front()
                .map(|oldest| self.remaining(*oldest, now))
                .unwrap_or(Duration::ZERO)),
        }
    }

    fn remaining(&self, sent_at: Instant, now: Instant) -> Duration {
        self.period.saturating_sub(now.saturating_duration_since(sent_at))
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.timeline.front() {
            if now.saturating_duration_since(*front) >= self.period {
                self.timeline.pop_front();
            } else {
                break;
            }
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("period", &self.period)
            .field("policy", &self.wait_policy)
            .field("in_window", &self.timeline.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smart(max: usize) -> RateLimiter {
        RateLimiter::new(max, Duration::from_secs(60), WaitPolicy::Smart)
    }

    #[tokio::test(start_paused = true)]
    async fn available_counts_down_and_recovers() {
        let mut rl = smart(5);
        for _ in 0..3 {
            rl.mark_sent().unwrap();
        }
        assert_eq!(rl.available(), 2);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(rl.available(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn permissive_overflow_evicts_oldest() {
        let mut rl = smart(2);
        rl.mark_sent().unwrap();
        rl.mark_sent().unwrap();
        rl.mark_sent().unwrap();
        assert_eq!(rl.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_overflow_rejects() {
        let mut rl = smart(1).with_overflow(OverflowPolicy::Reject);
        rl.mark_sent().unwrap();
        assert!(matches!(rl.mark_sent(), Err(ApiError::RateLimitExceeded(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn smart_wait_targets_the_lacking_slot() {
        let mut rl = smart(3);
        rl.mark_sent().unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        rl.mark_sent().unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        rl.mark_sent().unwrap();

        assert_eq!(rl.time_until_available(Some(1)).unwrap(), Duration::from_secs(40));
        assert_eq!(rl.time_until_available(Some(2)).unwrap(), Duration::from_secs(50));
        assert_eq!(rl.time_until_available(None).unwrap(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn smart_wait_is_zero_with_free_slots() {
        let mut rl = smart(3);
        rl.mark_sent().unwrap();
        assert_eq!(rl.time_until_available(Some(2)).unwrap(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn smart_rejects_more_than_max() {
        let mut rl = smart(3);
        assert!(matches!(
            rl.time_until_available(Some(4)),
            Err(ApiError::InvalidRequestCount { requested: 4, max: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn strict_wait_follows_the_oldest_request() {
        let mut rl = RateLimiter::new(3, Duration::from_secs(60), WaitPolicy::Strict);
        assert_eq!(rl.time_until_available(Some(3)).unwrap(), Duration::ZERO);

        rl.mark_sent().unwrap();
        tokio::time::advance(Duration::from_secs(15)).await;
        rl.mark_sent().unwrap();

        assert_eq!(rl.time_until_available(Some(1)).unwrap(), Duration::from_secs(45));
    }
}
