//! Trend compression.
//!
//! A tick series is turned into one raw segment per consecutive pair of
//! ticks, then adjacent segments are merged until every neighbour pair points
//! in opposite directions (or a merge would break the view's limits):
//!
//! 1. two codirectional neighbours are concatenated;
//! 2. a small counter-move sandwiched between two larger moves in the same
//!    direction is absorbed together with both of them.
//!
//! Coarser views are compressed from the previous, finer view rather than
//! from raw ticks.

use std::fmt;

use crate::tick::Tick;
use crate::time::{Timeframe, Timestamp};

pub type Change = f64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Net fractional price change, e.g. `-0.3` for a 30% drop.
    pub change: Change,
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Segment {
    pub fn new(change: Change, start: Timestamp, end: Timestamp) -> Self {
        Self { change, start, end }
    }

    pub fn magnitude(&self) -> f64 {
        self.change.abs()
    }

    pub fn direction(&self) -> Direction {
        if self.change > 0.0 {
            Direction::Up
        } else if self.change < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn is_upward(&self) -> bool {
        self.change > 0.0
    }

    pub fn timeframe(&self) -> Timeframe {
        self.end - self.start
    }

    /// Flat segments are codirectional with everything.
    pub fn is_codirectional_with(&self, other: &Segment) -> bool {
        self.change * other.change >= 0.0
    }

    /// Joins two segments; changes compose multiplicatively.
    pub fn concat(&self, other: &Segment) -> Segment {
        Segment {
            change: (1.0 + self.change) * (1.0 + other.change) - 1.0,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Upper bounds a merged segment must respect.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MergeLimits {
    pub max_timeframe: Option<Timeframe>,
    pub max_magnitude: Option<f64>,
}

impl MergeLimits {
    pub const NONE: MergeLimits = MergeLimits {
        max_timeframe: None,
        max_magnitude: None,
    };

    fn allow(&self, parts: &[Segment]) -> bool {
        let merged = concat_all(parts);

        if self.max_timeframe.is_some_and(|max| merged.timeframe() > max) {
            return false;
        }
        if self.max_magnitude.is_some_and(|max| merged.magnitude() > max) {
            return false;
        }
        true
    }
}

/// Direction in which adjacent triples are scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Traversal {
    Forward,
    /// Newest data first, so freshly arrived ticks are compressed first.
    #[default]
    Reverse,
}

/// Compressed, chronologically ordered segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segments {
    items: Vec<Segment>,
}

impl Segments {
    pub fn from_ticks<'a, I>(ticks: I, limits: MergeLimits, traversal: Traversal) -> Self
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        Self {
            items: compress(raw_segments(ticks), limits, traversal),
        }
    }

    /// Compresses an already compressed sequence further under new limits.
    pub fn recompress(&self, limits: MergeLimits, traversal: Traversal) -> Self {
        Self {
            items: compress(self.items.clone(), limits, traversal),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Segment] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.items.last()
    }

    /// Product of `1 + change` over all segments, minus one.
    pub fn total_change(&self) -> Change {
        self.items
            .iter()
            .fold(1.0, |acc, s| acc * (1.0 + s.change))
            - 1.0
    }
}

impl<'a> IntoIterator for &'a Segments {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Display for Segments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.len() > 50 {
            return write!(f, "Segments(total: {})", self.items.len());
        }
        writeln!(f, "Segments(")?;
        for s in &self.items {
            writeln!(
                f,
                "    {}: {:7.1}%",
                s.start.format("%m-%d %H:%M"),
                s.change * 100.0
            )?;
        }
        write!(f, ")")
    }
}

/// The fixed set of compression views, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentView {
    Timeframe10m,
    Timeframe15m,
    Timeframe30m,
    Global,
}

impl SegmentView {
    pub const ALL: [SegmentView; 4] = [
        SegmentView::Timeframe10m,
        SegmentView::Timeframe15m,
        SegmentView::Timeframe30m,
        SegmentView::Global,
    ];

    pub fn limits(self) -> MergeLimits {
        match self {
            SegmentView::Timeframe10m => MergeLimits {
                max_timeframe: Some(Timeframe::minutes(10)),
                max_magnitude: None,
            },
            SegmentView::Timeframe15m => MergeLimits {
                max_timeframe: Some(Timeframe::minutes(15)),
                max_magnitude: None,
            },
            SegmentView::Timeframe30m => MergeLimits {
                max_timeframe: Some(Timeframe::minutes(30)),
                max_magnitude: None,
            },
            SegmentView::Global => MergeLimits::NONE,
        }
    }

    pub fn generate<'a, I>(self, ticks: I) -> Segments
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        Segments::from_ticks(ticks, self.limits(), Traversal::Reverse)
    }

    /// Builds every view, each from the previous one, finest first.
    pub fn generate_all<'a, I>(ticks: I) -> Vec<Segments>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        let mut views: Vec<Segments> = Vec::with_capacity(Self::ALL.len());
        views.push(Self::ALL[0].generate(ticks));

        for view in &Self::ALL[1..] {
            let next = views[views.len() - 1].recompress(view.limits(), Traversal::Reverse);
            views.push(next);
        }

        views
    }
}

fn raw_segments<'a, I>(ticks: I) -> Vec<Segment>
where
    I: IntoIterator<Item = &'a Tick>,
{
    let mut out = Vec::new();
    let mut prev: Option<&Tick> = None;

    for tick in ticks {
        if let Some(p) = prev {
            let change = if p.price() != 0.0 {
                (tick.price() - p.price()) / p.price()
            } else {
                0.0
            };
            out.push(Segment::new(change, p.timestamp(), tick.timestamp()));
        }
        prev = Some(tick);
    }

    out
}

fn concat_all(parts: &[Segment]) -> Segment {
    parts[1..].iter().fold(parts[0], |acc, s| acc.concat(s))
}

fn can_be_absorbed(left: &Segment, middle: &Segment, right: &Segment) -> bool {
    left.is_codirectional_with(right)
        && !left.is_codirectional_with(middle)
        && middle.magnitude() <= left.magnitude().min(right.magnitude())
}

fn replace_by_concatenation(segments: &mut Vec<Segment>, at: usize, count: usize) {
    let merged = concat_all(&segments[at..at + count]);
    segments.splice(at..at + count, std::iter::once(merged));
}

fn compress(mut segments: Vec<Segment>, limits: MergeLimits, traversal: Traversal) -> Vec<Segment> {
    if traversal == Traversal::Reverse {
        segments.reverse();
    }

    let mut i = 0;
    while i + 2 < segments.len() {
        let (s1, s2, s3) = (segments[i], segments[i + 1], segments[i + 2]);

        let merge = if s1.is_codirectional_with(&s2) && limits.allow(&[s1, s2]) {
            Some((i, 2))
        } else if s2.is_codirectional_with(&s3) && limits.allow(&[s2, s3]) {
            Some((i + 1, 2))
        } else if can_be_absorbed(&s1, &s2, &s3) && limits.allow(&[s1, s2, s3]) {
            Some((i, 3))
        } else {
            None
        };

        match merge {
            Some((at, count)) => {
                replace_by_concatenation(&mut segments, at, count);
                // merges can cascade backwards
                i = i.saturating_sub(2);
            }
            None => i += 1,
        }
    }

    if segments.len() == 2
        && segments[0].is_codirectional_with(&segments[1])
        && limits.allow(&segments[..])
    {
        replace_by_concatenation(&mut segments, 0, 2);
    }

    if traversal == Traversal::Reverse {
        segments.reverse();
    }

    segments
}
