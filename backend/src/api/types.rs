use market::{Address, Network, Timestamp};

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSource {
    Top,
    Trending,
}

impl PoolSource {
    pub fn path_prefix(self) -> &'static str {
        match self {
            PoolSource::Top => "",
            PoolSource::Trending => "trending_",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Transactions,
    Volume,
}

impl SortBy {
    pub fn as_param(self) -> &'static str {
        match self {
            SortBy::Transactions => "h24_tx_count_desc",
            SortBy::Volume => "h24_volume_usd_desc",
        }
    }
}

/// Inclusive range of listing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    start: u32,
    end: u32,
}

impl PageRange {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 10;
    pub const ALL: PageRange = PageRange {
        start: Self::MIN,
        end: Self::MAX,
    };

    pub fn new(start: u32, end: u32) -> Result<Self, ApiError> {
        for page in [start, end] {
            if !(Self::MIN..=Self::MAX).contains(&page) {
                return Err(ApiError::ValueOutOfDomain(format!(
                    "page {page} is outside [{}, {}]",
                    Self::MIN,
                    Self::MAX
                )));
            }
        }
        if start > end {
            return Err(ApiError::ValueOutOfDomain(format!(
                "start page {start} comes after end page {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(page: u32) -> Result<Self, ApiError> {
        Self::new(page, page)
    }

    pub fn pages(self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OhlcvTimeframe {
    Minute1,
    Minute5,
    Minute15,
    Hour1,
    Hour4,
    Hour12,
    Day1,
}

impl OhlcvTimeframe {
    pub fn path(self) -> &'static str {
        match self {
            OhlcvTimeframe::Minute1 | OhlcvTimeframe::Minute5 | OhlcvTimeframe::Minute15 => "minute",
            OhlcvTimeframe::Hour1 | OhlcvTimeframe::Hour4 | OhlcvTimeframe::Hour12 => "hour",
            OhlcvTimeframe::Day1 => "day",
        }
    }

    pub fn aggregate(self) -> u32 {
        match self {
            OhlcvTimeframe::Minute1 | OhlcvTimeframe::Hour1 | OhlcvTimeframe::Day1 => 1,
            OhlcvTimeframe::Hour4 => 4,
            OhlcvTimeframe::Minute5 => 5,
            OhlcvTimeframe::Hour12 => 12,
            OhlcvTimeframe::Minute15 => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    /// Priced in the pool's quote token.
    Token,
}

impl Currency {
    pub fn as_param(self) -> &'static str {
        match self {
            Currency::Usd => "usd",
            Currency::Token => "token",
        }
    }
}

/// A pool found through discovery, before any figures are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRef {
    pub network: Network,
    pub address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candlestick {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
