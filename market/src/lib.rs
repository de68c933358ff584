//! Pool price tracking and directional pattern detection.
//!
//! Everything in this crate is synchronous and free of I/O: ticks go in,
//! segments and pattern matches come out.

pub mod chart;
pub mod error;
pub mod patterns;
pub mod registry;
pub mod segments;
pub mod tick;
pub mod tick_buffer;
pub mod time;
pub mod types;

pub use chart::{Chart, ChartSettings};
pub use error::MarketError;
pub use patterns::{DetectorConfig, LiquidityScaling, PatternDetector, PatternKind, PatternMatch};
pub use registry::{PoolFilter, PoolRegistry, RepeatedPoolKey, UpdateSummary};
pub use segments::{MergeLimits, Segment, SegmentView, Segments, Traversal};
pub use tick::Tick;
pub use tick_buffer::RingBuffer;
pub use time::{Timeframe, Timestamp};
pub use types::{Address, Dex, DexKey, Network, Pool, PoolSnapshot, PoolStats, TimePeriods, Token, TokenKey};
