use crate::model::Language;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use core::fmt::{Display, Formatter};

/// Star-count qualifier of a search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarFilter {
    /// `stars:>=n`
    AtLeast(u64),
    /// `stars:lo..hi`, both ends inclusive.
    Range(u64, u64),
    /// `stars:n`
    Exact(u64),
}

impl StarFilter {
    #[must_use]
    pub const fn matches(self, stars: u64) -> bool {
        match self {
            Self::AtLeast(min) => stars >= min,
            Self::Range(lo, hi) => lo <= stars && stars <= hi,
            Self::Exact(n) => stars == n,
        }
    }
}

impl Display for StarFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AtLeast(min) => write!(f, "stars:>={min}"),
            Self::Range(lo, hi) => write!(f, "stars:{lo}..{hi}"),
            Self::Exact(n) => write!(f, "stars:{n}"),
        }
    }
}

/// An inclusive creation-time range with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CreatedRange {
    /// From the start of 2008, before any repository on the service existed, to `now`.
    #[must_use]
    pub fn full(now: DateTime<Utc>) -> Self {
        let start = Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).single().unwrap_or(DateTime::UNIX_EPOCH);
        Self { start, end: now }
    }

    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Halve the range into `[start, mid]` and `[mid + 1s, end]`.
    ///
    /// Returns `None` for a single-second range, which cannot be narrowed further.
    #[must_use]
    pub fn split(&self) -> Option<(Self, Self)> {
        let span = (self.end - self.start).num_seconds();
        if span < 1 {
            return None;
        }
        let mid = self.start + TimeDelta::seconds(span / 2);
        Some((
            Self { start: self.start, end: mid },
            Self {
                start: mid + TimeDelta::seconds(1),
                end: self.end,
            },
        ))
    }
}

impl Display for CreatedRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
        write!(f, "created:{}..{}", self.start.format(FORMAT), self.end.format(FORMAT))
    }
}

/// A repository search, rendered in the service's qualifier syntax by `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchQuery {
    pub language: Language,
    pub stars: StarFilter,
    pub created: Option<CreatedRange>,
}

impl SearchQuery {
    #[must_use]
    pub const fn new(language: Language, stars: StarFilter) -> Self {
        Self {
            language,
            stars,
            created: None,
        }
    }

    #[must_use]
    pub const fn created(mut self, range: CreatedRange) -> Self {
        self.created = Some(range);
        self
    }
}

impl Display for SearchQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "language:{} {}", self.language.search_qualifier(), self.stars)?;
        if let Some(created) = &self.created {
            write!(f, " {created}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn renders_qualifiers() {
        assert_eq!(SearchQuery::new(Language::Go, StarFilter::AtLeast(100)).to_string(), "language:go stars:>=100");
        assert_eq!(
            SearchQuery::new(Language::Node, StarFilter::Range(100, 250)).to_string(),
            "language:javascript stars:100..250"
        );

        let range = CreatedRange {
            start: at(2008, 1, 1, 0, 0, 0),
            end: at(2012, 6, 30, 23, 59, 59),
        };
        assert_eq!(
            SearchQuery::new(Language::Rust, StarFilter::Exact(42)).created(range).to_string(),
            "language:rust stars:42 created:2008-01-01T00:00:00Z..2012-06-30T23:59:59Z"
        );
    }

    #[test]
    fn star_filters_are_inclusive() {
        assert!(StarFilter::AtLeast(10).matches(10));
        assert!(!StarFilter::AtLeast(10).matches(9));
        assert!(StarFilter::Range(5, 7).matches(5));
        assert!(StarFilter::Range(5, 7).matches(7));
        assert!(!StarFilter::Range(5, 7).matches(8));
        assert!(StarFilter::Exact(3).matches(3));
    }

    #[test]
    fn split_halves_cover_the_range_without_overlap() {
        let range = CreatedRange {
            start: at(2020, 1, 1, 0, 0, 0),
            end: at(2020, 1, 1, 0, 0, 9),
        };
        let (left, right) = range.split().unwrap();
        assert_eq!(left.start, range.start);
        assert_eq!(right.end, range.end);
        assert_eq!(right.start - left.end, TimeDelta::seconds(1));
    }

    #[test]
    fn two_second_range_splits_into_points() {
        let start = at(2020, 1, 1, 0, 0, 0);
        let range = CreatedRange {
            start,
            end: start + TimeDelta::seconds(1),
        };
        let (left, right) = range.split().unwrap();
        assert_eq!(left.start, left.end);
        assert_eq!(right.start, right.end);
        assert!(left.split().is_none());
    }

    #[test]
    fn full_range_starts_in_2008() {
        let now = at(2025, 3, 1, 0, 0, 0);
        let full = CreatedRange::full(now);
        assert_eq!(full.start, at(2008, 1, 1, 0, 0, 0));
        assert!(full.contains(now));
    }
}
