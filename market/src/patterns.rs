//! Directional pattern catalogue and matcher.
//!
//! A pattern is a short sequence of [`PatternUnit`]s. A pattern of length `L`
//! matches when the last `L` compressed segments satisfy the units one to
//! one. Each unit asks for a signed minimum change, scaled up for thin
//! pools, plus optional timeframe bounds.
//!
//! ## Significance
//!
//! Every template names a *magnitude indicator*: the unit with the largest
//! absolute minimum change. A match is significant when the indicator
//! segment moved at least `significance_threshold` times the unit's unscaled
//! minimum.
//!
//! ## Delay tolerance
//!
//! Live polling keeps appending small segments after a move has finished. When
//! the newest segment spans no more than the tolerance it is ignored and the
//! window ending one segment earlier is tried instead.

use once_cell::sync::Lazy;

use crate::segments::{Segment, SegmentView, Segments};
use crate::tick::Tick;
use crate::time::{Timeframe, Timestamp};

/// Liquidity below which requirements start scaling up.
pub const DEFAULT_SCALING_BASE: f64 = 100_000.0;
pub const DEFAULT_SCALING_SLOPE: f64 = 2.5;
/// Divisor applied instead of liquidity scaling in testing mode.
pub const TESTING_DIVISOR: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternUnit {
    /// Signed fractional change; the sign selects the direction.
    pub min_change: f64,
    pub min_timeframe: Option<Timeframe>,
    pub max_timeframe: Option<Timeframe>,
}

impl PatternUnit {
    fn percent(min_change_pct: f64) -> Self {
        Self {
            min_change: min_change_pct / 100.0,
            min_timeframe: None,
            max_timeframe: None,
        }
    }

    fn at_least(mut self, tf: Timeframe) -> Self {
        self.min_timeframe = Some(tf);
        self
    }

    fn at_most(mut self, tf: Timeframe) -> Self {
        self.max_timeframe = Some(tf);
        self
    }

    pub fn min_magnitude(&self) -> f64 {
        self.min_change.abs()
    }

    pub fn matches(&self, segment: &Segment, scaling: &LiquidityScaling, liquidity: Option<f64>) -> bool {
        let same_direction = self.min_change * segment.change >= 0.0;
        let required = scaling.scale(self.min_magnitude(), liquidity);
        let tf = segment.timeframe();

        same_direction
            && segment.magnitude() >= required
            && self.min_timeframe.is_none_or(|min| tf >= min)
            && self.max_timeframe.is_none_or(|max| tf <= max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternTemplate {
    pub units: Vec<PatternUnit>,
    pub significance_threshold: Option<f64>,
    magnitude_indicator: usize,
}

impl PatternTemplate {
    pub fn new(units: Vec<PatternUnit>, significance_threshold: Option<f64>) -> Self {
        assert!(!units.is_empty(), "pattern needs at least one unit");

        // first unit with the largest requirement wins ties
        let mut magnitude_indicator = 0;
        for (i, unit) in units.iter().enumerate() {
            if unit.min_magnitude() > units[magnitude_indicator].min_magnitude() {
                magnitude_indicator = i;
            }
        }

        Self {
            units,
            significance_threshold,
            magnitude_indicator,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn magnitude_indicator(&self) -> &PatternUnit {
        &self.units[self.magnitude_indicator]
    }

    /// Tries the trailing window, then the one ending a segment earlier when
    /// the newest segment is within `delay_tolerance`.
    fn match_trailing(
        &self,
        segments: &[Segment],
        delay_tolerance: Option<Timeframe>,
        scaling: &LiquidityScaling,
        liquidity: Option<f64>,
    ) -> Option<(Timestamp, Timestamp, bool, f64)> {
        let n = segments.len();
        let l = self.len();

        if n >= l {
            if let Some(found) = self.evaluate(&segments[n - l..], scaling, liquidity) {
                return Some(found);
            }
        }

        let tolerance = delay_tolerance?;
        if n > l && segments[n - 1].timeframe() <= tolerance {
            return self.evaluate(&segments[n - 1 - l..n - 1], scaling, liquidity);
        }

        None
    }

    fn evaluate(
        &self,
        window: &[Segment],
        scaling: &LiquidityScaling,
        liquidity: Option<f64>,
    ) -> Option<(Timestamp, Timestamp, bool, f64)> {
        let all_match = self
            .units
            .iter()
            .zip(window)
            .all(|(unit, segment)| unit.matches(segment, scaling, liquidity));
        if !all_match {
            return None;
        }

        let indicator = &window[self.magnitude_indicator];
        let magnitude = indicator.magnitude();
        let ratio = magnitude / self.magnitude_indicator().min_magnitude();
        let significant = self.significance_threshold.is_none_or(|t| ratio >= t);

        Some((window[0].start, window[window.len() - 1].end, significant, magnitude))
    }
}

/// The fixed catalogue, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternKind {
    Dump,
    Downtrend,
    Reversal,
    Pump,
    Uptrend,
    SlowUptrend,
}

static TEMPLATES: Lazy<[PatternTemplate; 6]> = Lazy::new(|| {
    [
        PatternTemplate::new(vec![PatternUnit::percent(-15.0).at_most(Timeframe::hours(1))], Some(1.5)),
        PatternTemplate::new(vec![PatternUnit::percent(-30.0).at_most(Timeframe::hours(2))], Some(2.0)),
        PatternTemplate::new(
            vec![
                PatternUnit::percent(-30.0).at_least(Timeframe::hours(2)),
                PatternUnit::percent(10.0).at_least(Timeframe::minutes(30)),
            ],
            Some(2.0),
        ),
        PatternTemplate::new(vec![PatternUnit::percent(50.0).at_most(Timeframe::hours(1))], Some(2.0)),
        PatternTemplate::new(vec![PatternUnit::percent(20.0).at_least(Timeframe::hours(2))], Some(2.0)),
        PatternTemplate::new(vec![PatternUnit::percent(10.0).at_least(Timeframe::hours(12))], Some(2.0)),
    ]
});

impl PatternKind {
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Dump,
        PatternKind::Downtrend,
        PatternKind::Reversal,
        PatternKind::Pump,
        PatternKind::Uptrend,
        PatternKind::SlowUptrend,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PatternKind::Dump => "Dump",
            PatternKind::Downtrend => "Downtrend",
            PatternKind::Reversal => "Reversal",
            PatternKind::Pump => "Pump",
            PatternKind::Uptrend => "Uptrend",
            PatternKind::SlowUptrend => "Slow Uptrend",
        }
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            PatternKind::Dump => "D",
            PatternKind::Downtrend => "DW",
            PatternKind::Reversal => "R",
            PatternKind::Pump => "P",
            PatternKind::Uptrend => "U",
            PatternKind::SlowUptrend => "SU",
        }
    }

    pub fn template(self) -> &'static PatternTemplate {
        &TEMPLATES[self as usize]
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a unit's minimum magnitude grows for pools with thin liquidity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiquidityScaling {
    /// `x * (1 + slope * (base - liquidity) / base)` for `0 < liquidity < base`.
    Linear { base: f64, slope: f64 },
    /// `x / divisor` regardless of liquidity; used to make patterns easy to hit.
    FixedDivisor(f64),
}

impl Default for LiquidityScaling {
    fn default() -> Self {
        LiquidityScaling::Linear {
            base: DEFAULT_SCALING_BASE,
            slope: DEFAULT_SCALING_SLOPE,
        }
    }
}

impl LiquidityScaling {
    pub fn scale(&self, min_magnitude: f64, liquidity: Option<f64>) -> f64 {
        match *self {
            LiquidityScaling::Linear { base, slope } => match liquidity {
                Some(l) if l > 0.0 && l < base => min_magnitude * (1.0 + slope * (base - l) / base),
                _ => min_magnitude,
            },
            LiquidityScaling::FixedDivisor(divisor) => min_magnitude / divisor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Longest trailing segment that may be skipped when matching.
    pub delay_tolerance: Option<Timeframe>,
    pub scaling: LiquidityScaling,
    /// Coarsest view is tried first when set.
    pub coarse_views_first: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            delay_tolerance: Some(Timeframe::minutes(5)),
            scaling: LiquidityScaling::default(),
            coarse_views_first: true,
        }
    }
}

impl DetectorConfig {
    pub fn testing() -> Self {
        Self {
            scaling: LiquidityScaling::FixedDivisor(TESTING_DIVISOR),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub pattern: PatternKind,
    pub start: Timestamp,
    pub end: Timestamp,
    pub significant: bool,
    /// Absolute change of the magnitude-indicator segment.
    pub magnitude: f64,
}

impl PatternMatch {
    pub fn timeframe(&self) -> Timeframe {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: DetectorConfig,
}

impl PatternDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Matches a single pattern against one compressed view.
    pub fn match_segments(
        &self,
        kind: PatternKind,
        segments: &Segments,
        liquidity: Option<f64>,
    ) -> Option<PatternMatch> {
        let (start, end, significant, magnitude) = kind.template().match_trailing(
            segments.as_slice(),
            self.config.delay_tolerance,
            &self.config.scaling,
            liquidity,
        )?;

        Some(PatternMatch {
            pattern: kind,
            start,
            end,
            significant,
            magnitude,
        })
    }

    /// Every match over every view, grouped by pattern in catalogue order.
    pub fn match_views(&self, views: &[Segments], liquidity: Option<f64>) -> Vec<PatternMatch> {
        let mut out = Vec::new();

        for kind in PatternKind::ALL {
            let ordered: Box<dyn Iterator<Item = &Segments>> = if self.config.coarse_views_first {
                Box::new(views.iter().rev())
            } else {
                Box::new(views.iter())
            };

            out.extend(ordered.filter_map(|view| self.match_segments(kind, view, liquidity)));
        }

        out
    }

    pub fn match_any<'a, I>(&self, ticks: I, liquidity: Option<f64>) -> Vec<PatternMatch>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        let views = SegmentView::generate_all(ticks);
        self.match_views(&views, liquidity)
    }
}
