use std::fmt;

use crate::time::Timestamp;

pub type Price = f64;

/// One timestamped price observation for a pool.
///
/// `Complete` ticks come from historical candlesticks and carry traded
/// volume. `Incomplete` ticks come from live price polls and are treated as a
/// provisional "current" point until a complete tick for the same minute
/// arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Complete {
        timestamp: Timestamp,
        price: Price,
        volume: f64,
    },
    Incomplete {
        timestamp: Timestamp,
        price: Price,
    },
}

impl Tick {
    pub fn complete(timestamp: Timestamp, price: Price, volume: f64) -> Self {
        Tick::Complete {
            timestamp,
            price,
            volume,
        }
    }

    pub fn incomplete(timestamp: Timestamp, price: Price) -> Self {
        Tick::Incomplete { timestamp, price }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Tick::Complete { timestamp, .. } | Tick::Incomplete { timestamp, .. } => *timestamp,
        }
    }

    pub fn price(&self) -> Price {
        match self {
            Tick::Complete { price, .. } | Tick::Incomplete { price, .. } => *price,
        }
    }

    pub fn volume(&self) -> Option<f64> {
        match self {
            Tick::Complete { volume, .. } => Some(*volume),
            Tick::Incomplete { .. } => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Tick::Complete { .. })
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_complete() { "Complete" } else { "Incomplete" };
        write!(
            f,
            "{}({}, {})",
            kind,
            self.timestamp().format("%m-%d %H:%M:%S"),
            self.price()
        )
    }
}
