use std::fmt;

use crate::error::MarketError;
use crate::patterns::{PatternDetector, PatternMatch};
use crate::tick::Tick;
use crate::tick_buffer::RingBuffer;
use crate::time::{Timeframe, Timestamp};

pub const DEFAULT_MAX_TICKS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartSettings {
    pub max_ticks: usize,
    /// After this long a repeated move may be reported again. `None` never
    /// lets an overlapping match through.
    pub repetition_cooldown: Option<Timeframe>,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            max_ticks: DEFAULT_MAX_TICKS,
            repetition_cooldown: Some(Timeframe::hours(6)),
        }
    }
}

/// Bounded tick history of one pool plus the state needed to report each
/// move only once.
#[derive(Debug, Clone)]
pub struct Chart {
    ticks: RingBuffer<Tick>,
    previous_match_end: Option<Timestamp>,
    repetition_cooldown: Option<Timeframe>,
}

impl Chart {
    pub fn new(settings: ChartSettings) -> Result<Self, MarketError> {
        Ok(Self {
            ticks: RingBuffer::new(settings.max_ticks)?,
            previous_match_end: None,
            repetition_cooldown: settings.repetition_cooldown,
        })
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn ticks(&self) -> &RingBuffer<Tick> {
        &self.ticks
    }

    pub fn last_tick(&self) -> Option<&Tick> {
        self.ticks.last()
    }

    pub fn previous_match_end(&self) -> Option<Timestamp> {
        self.previous_match_end
    }

    /// Time covered from the first to the last tick.
    pub fn timeframe(&self) -> Option<Timeframe> {
        Some(self.ticks.last()?.timestamp() - self.ticks.first()?.timestamp())
    }

    pub fn complete_share(&self) -> f64 {
        if self.ticks.is_empty() {
            return 0.0;
        }
        let complete = self.ticks.iter().filter(|t| t.is_complete()).count();
        complete as f64 / self.ticks.len() as f64
    }

    /// Adds one tick. A provisional tick never replaces a finalized one for
    /// the same minute.
    pub fn update_one(&mut self, tick: Tick) -> Result<(), MarketError> {
        if !tick.is_complete()
            && self
                .ticks
                .iter()
                .rev()
                .any(|t| t.is_complete() && t.timestamp() == tick.timestamp())
        {
            return Ok(());
        }
        self.update(vec![tick])
    }

    /// Splices a chronological batch into the history.
    ///
    /// Existing ticks at or after the batch start are discarded; those newer
    /// than the batch end are appended back after it.
    pub fn update(&mut self, mut new_ticks: Vec<Tick>) -> Result<(), MarketError> {
        let (Some(first), Some(last)) = (new_ticks.first(), new_ticks.last()) else {
            return Ok(());
        };
        let (first_ts, last_ts) = (first.timestamp(), last.timestamp());

        if let Some(discard_from) = self.ticks.position(|t| t.timestamp() >= first_ts) {
            let discarded = self.ticks.tail_from(discard_from);
            self.ticks.pop(discarded.len())?;

            if let Some(keep_from) = discarded.iter().position(|t| t.timestamp() > last_ts) {
                new_ticks.extend_from_slice(&discarded[keep_from..]);
            }
        }

        self.ticks.extend(new_ticks);
        Ok(())
    }

    /// First match worth reporting, coarsest view first.
    ///
    /// With `only_new`, a match starting before the previously reported end is
    /// skipped unless the repetition cooldown has elapsed since that end.
    pub fn get_pattern(
        &mut self,
        detector: &PatternDetector,
        liquidity: Option<f64>,
        only_new: bool,
        now: Timestamp,
    ) -> Option<PatternMatch> {
        let matches = detector.match_any(self.ticks.iter(), liquidity);

        let found = matches
            .into_iter()
            .find(|m| !(only_new && self.is_repeat(m, now)))?;

        self.previous_match_end = Some(found.end);
        Some(found)
    }

    fn is_repeat(&self, m: &PatternMatch, now: Timestamp) -> bool {
        match self.previous_match_end {
            Some(prev) => {
                m.start < prev
                    && self.repetition_cooldown.is_none_or(|cooldown| now - prev < cooldown)
            }
            None => false,
        }
    }
}

impl fmt::Display for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chart(ticks: {}", self.ticks.len())?;

        if let (Some(first), Some(last)) = (self.ticks.first(), self.ticks.last()) {
            write!(
                f,
                ", timeframe: {} - {}, last tick: {}, complete ticks: {:.0}%",
                first.timestamp().format("%m-%d %H:%M"),
                last.timestamp().format("%m-%d %H:%M"),
                last,
                self.complete_share() * 100.0
            )?;
        }

        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(min: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Timeframe::minutes(min)
    }

    fn chart() -> Chart {
        Chart::new(ChartSettings::default()).unwrap()
    }

    fn prices(c: &Chart) -> Vec<f64> {
        c.ticks().iter().map(|t| t.price()).collect()
    }

    #[test]
    fn appends_in_order() {
        let mut c = chart();
        c.update_one(Tick::incomplete(at(0), 1.0)).unwrap();
        c.update_one(Tick::incomplete(at(1), 2.0)).unwrap();
        assert_eq!(prices(&c), vec![1.0, 2.0]);
        assert_eq!(c.timeframe(), Some(Timeframe::minutes(1)));
    }

    #[test]
    fn incomplete_does_not_replace_complete() {
        let mut c = chart();
        c.update(vec![Tick::complete(at(0), 1.0, 5.0), Tick::complete(at(1), 2.0, 5.0)])
            .unwrap();
        c.update_one(Tick::incomplete(at(1), 9.0)).unwrap();

        assert_eq!(prices(&c), vec![1.0, 2.0]);
        assert!(c.last_tick().unwrap().is_complete());
    }

    #[test]
    fn complete_replaces_incomplete_at_same_minute() {
        let mut c = chart();
        c.update_one(Tick::incomplete(at(0), 1.0)).unwrap();
        c.update_one(Tick::complete(at(0), 1.1, 3.0)).unwrap();
        assert_eq!(c.len(), 1);
        assert!(c.last_tick().unwrap().is_complete());
    }

    #[test]
    fn backfill_splices_and_keeps_newer_live_ticks() {
        let mut c = chart();
        for m in 0..5 {
            c.update_one(Tick::incomplete(at(m), m as f64)).unwrap();
        }

        // history for minutes 2..=3 arrives after live ticks up to minute 4
        c.update(vec![Tick::complete(at(2), 20.0, 1.0), Tick::complete(at(3), 30.0, 1.0)])
            .unwrap();

        assert_eq!(prices(&c), vec![0.0, 1.0, 20.0, 30.0, 4.0]);
        assert!(!c.last_tick().unwrap().is_complete());
    }

    #[test]
    fn splicing_works_on_a_wrapped_buffer() {
        let mut c = Chart::new(ChartSettings {
            max_ticks: 4,
            repetition_cooldown: None,
        })
        .unwrap();
        for m in 0..6 {
            c.update_one(Tick::incomplete(at(m), m as f64)).unwrap();
        }
        assert_eq!(prices(&c), vec![2.0, 3.0, 4.0, 5.0]);

        c.update(vec![Tick::complete(at(4), 40.0, 1.0)]).unwrap();
        assert_eq!(prices(&c), vec![2.0, 3.0, 40.0, 5.0]);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut c = chart();
        c.update_one(Tick::incomplete(at(0), 1.0)).unwrap();
        c.update(Vec::new()).unwrap();
        assert_eq!(c.len(), 1);
    }

    fn dumped_chart(cooldown: Option<Timeframe>) -> Chart {
        let mut c = Chart::new(ChartSettings {
            max_ticks: 100,
            repetition_cooldown: cooldown,
        })
        .unwrap();
        c.update(vec![
            Tick::incomplete(at(0), 100.0),
            Tick::incomplete(at(1), 100.0),
            Tick::incomplete(at(2), 100.0),
            Tick::incomplete(at(3), 60.0),
        ])
        .unwrap();
        c
    }

    #[test]
    fn only_new_suppresses_the_same_move() {
        let detector = PatternDetector::default();
        let mut c = dumped_chart(Some(Timeframe::hours(6)));
        let now = at(4);

        let first = c.get_pattern(&detector, None, true, now);
        assert!(first.is_some());
        assert_eq!(c.previous_match_end(), Some(at(3)));

        assert!(c.get_pattern(&detector, None, true, now).is_none());
        // without the flag the same match is reported again
        assert!(c.get_pattern(&detector, None, false, now).is_some());
    }

    #[test]
    fn cooldown_lets_the_move_through_again() {
        let detector = PatternDetector::default();
        let mut c = dumped_chart(Some(Timeframe::hours(1)));

        assert!(c.get_pattern(&detector, None, true, at(4)).is_some());
        assert!(c.get_pattern(&detector, None, true, at(30)).is_none());
        assert!(c.get_pattern(&detector, None, true, at(3 + 60)).is_some());
    }

    #[test]
    fn no_cooldown_means_never_repeat() {
        let detector = PatternDetector::default();
        let mut c = dumped_chart(None);

        assert!(c.get_pattern(&detector, None, true, at(4)).is_some());
        assert!(c.get_pattern(&detector, None, true, at(10_000)).is_none());
    }

    #[test]
    fn display_summarises_the_history() {
        let mut c = chart();
        assert_eq!(c.to_string(), "Chart(ticks: 0)");

        c.update(vec![Tick::complete(at(0), 1.0, 1.0), Tick::incomplete(at(1), 2.0)])
            .unwrap();
        let s = c.to_string();
        assert!(s.contains("ticks: 2"));
        assert!(s.contains("complete ticks: 50%"));
    }
}
