//! Turns upstream payloads into chart input.

use market::Tick;
use market::time::TIMESTAMP_UNIT;

use crate::api::Candlestick;

/// One complete tick per bar close, preceded by a synthetic open tick one
/// unit earlier whenever the bar does not directly follow the previous one.
pub fn candlesticks_to_ticks(candles: &[Candlestick]) -> Vec<Tick> {
    let mut ticks: Vec<Tick> = Vec::with_capacity(candles.len() * 2);

    for c in candles {
        let has_gap = ticks
            .last()
            .is_none_or(|last| c.timestamp > last.timestamp() + TIMESTAMP_UNIT);

        if has_gap {
            ticks.push(Tick::complete(c.timestamp - TIMESTAMP_UNIT, c.open, 0.0));
        }
        ticks.push(Tick::complete(c.timestamp, c.close, c.volume));
    }

    ticks
}

/// Priority of a pool in the backfill queue; smaller sorts first.
///
/// Pools never backfilled come first, then the least recently backfilled;
/// ties go to the pool with the most volume-weighted hourly movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackfillPriority {
    pub last_backfill: Option<u64>,
    pub activity: f64,
}

impl BackfillPriority {
    pub fn new(last_backfill: Option<u64>, volume: f64, h1_change: Option<f64>) -> Self {
        Self {
            last_backfill,
            activity: volume * h1_change.unwrap_or(0.0).abs(),
        }
    }

    pub fn cmp_key(&self, other: &Self) -> std::cmp::Ordering {
        self.last_backfill
            .cmp(&other.last_backfill)
            .then_with(|| other.activity.total_cmp(&self.activity))
    }
}
