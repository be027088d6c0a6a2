use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{PartitionError, Result};

/// Distant-future sentinel closing a [`Window`] that has no caller-supplied
/// upper bound.
///
/// A window never carries a real open end: open-endedness belongs to source
/// periods, and letting it leak into the window would leave the last unit of
/// a partition unbounded.
pub const HORIZON: NaiveDate = match NaiveDate::from_ymd_opt(9999, 12, 31) {
    Some(date) => date,
    None => panic!("horizon date out of range"),
};

/// An inclusive date interval with an optional end.
///
/// `end == None` means the period is still running. Periods are ordered by
/// start date, then by end date, with an open end sorting after every
/// concrete end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawPeriod")
)]
pub struct Period {
    start: NaiveDate,
    end: Option<NaiveDate>,
}

impl Period {
    /// Create a period, rejecting an end before the start.
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Result<Self> {
        match end {
            Some(end) if end < start => Err(PartitionError::InvalidPeriod { start, end }),
            _ => Ok(Self { start, end }),
        }
    }

    /// A period with both bounds present.
    pub fn closed(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        Self::new(start, Some(end))
    }

    // Callers guarantee `start <= end`.
    pub(crate) fn from_bounds(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// A period that is still running.
    pub fn open_ended(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn is_open_ended(&self) -> bool {
        self.end.is_none()
    }

    /// Does `date` fall inside this period (both bounds inclusive)?
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && self.end.is_none_or(|end| date <= end)
    }

    /// Two periods overlap iff neither starts after the other ends.
    pub fn overlaps(&self, other: &Period) -> bool {
        let self_before_other = self.end.is_some_and(|end| end < other.start);
        let other_before_self = other.end.is_some_and(|end| end < self.start);
        !self_before_other && !other_before_self
    }

    /// Inclusive length in calendar days. A one-day period has length 1.
    pub fn length(&self) -> Result<i64> {
        match self.end {
            Some(end) => Ok((end - self.start).num_days() + 1),
            None => Err(PartitionError::OpenEnded(*self)),
        }
    }

    /// The first day no longer covered by this period.
    ///
    /// `None` for open-ended periods and for a period ending on the last
    /// representable date.
    pub fn day_after_end(&self) -> Option<NaiveDate> {
        self.end.and_then(|end| end.succ_opt())
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start.cmp(&other.start).then_with(|| match (self.end, other.end) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, \u{221e})", self.start),
        }
    }
}

/// The bounded period a partition is clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawWindow")
)]
pub struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

impl Window {
    /// Create a window over `[start, end]`.
    ///
    /// The end must leave room for one more day, because the builder uses
    /// `end + 1` as the exclusive upper change point.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start || end.succ_opt().is_none() {
            return Err(PartitionError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    /// A window ending at `end`, or at [`HORIZON`] when no end is given.
    pub fn from_optional_end(start: NaiveDate, end: Option<NaiveDate>) -> Result<Self> {
        Self::new(start, end.unwrap_or(HORIZON))
    }

    /// A window from `start` up to [`HORIZON`].
    pub fn until_horizon(start: NaiveDate) -> Result<Self> {
        Self::new(start, HORIZON)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn period(&self) -> Period {
        Period::from_bounds(self.start, self.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, period: &Period) -> bool {
        self.period().overlaps(period)
    }

    // Guaranteed to exist by the check in `new`.
    pub(crate) fn end_exclusive(&self) -> NaiveDate {
        self.end.succ_opt().unwrap_or(self.end)
    }

    /// The part of this window that also lies inside `period`, or `None`
    /// when the two are disjoint.
    pub fn intersect(&self, period: &Period) -> Option<Window> {
        if !self.overlaps(period) {
            return None;
        }
        let start = self.start.max(period.start());
        let end = period.end().map_or(self.end, |end| end.min(self.end));
        Some(Window { start, end })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

// Deserialization goes through the checked constructors.

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawPeriod {
    start: NaiveDate,
    end: Option<NaiveDate>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawPeriod> for Period {
    type Error = PartitionError;

    fn try_from(raw: RawPeriod) -> Result<Self> {
        Self::new(raw.start, raw.end)
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawWindow {
    start: NaiveDate,
    end: NaiveDate,
}

#[cfg(feature = "serde")]
impl TryFrom<RawWindow> for Window {
    type Error = PartitionError;

    fn try_from(raw: RawWindow) -> Result<Self> {
        Self::new(raw.start, raw.end)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn closed(a: &str, b: &str) -> Period {
        Period::closed(d(a), d(b)).unwrap()
    }

    #[test]
    fn rejects_end_before_start() {
        let err = Period::closed(d("2001-02-01"), d("2001-01-31")).unwrap_err();
        assert!(matches!(err, PartitionError::InvalidPeriod { .. }));
    }

    #[test]
    fn single_day_period_is_valid() {
        let p = closed("2001-03-01", "2001-03-01");
        assert_eq!(p.length().unwrap(), 1);
    }

    #[test]
    fn overlap_is_inclusive_at_both_ends() {
        let a = closed("2001-01-01", "2001-06-30");
        assert!(a.overlaps(&closed("2001-06-30", "2001-07-31")));
        assert!(!a.overlaps(&closed("2001-07-01", "2001-07-31")));
        assert!(closed("2000-12-01", "2001-01-01").overlaps(&a));
    }

    #[test]
    fn open_end_overlaps_everything_after_start() {
        let open = Period::open_ended(d("2001-09-03"));
        assert!(open.overlaps(&closed("2150-01-01", "2150-01-02")));
        assert!(!open.overlaps(&closed("2001-01-01", "2001-09-02")));
        assert!(open.overlaps(&Period::open_ended(d("1990-01-01"))));
    }

    #[test]
    fn ordering_puts_open_end_last() {
        let mut periods = vec![
            Period::open_ended(d("2001-01-01")),
            closed("2001-01-01", "2001-12-31"),
            closed("2000-06-01", "2002-01-01"),
            closed("2001-01-01", "2001-01-31"),
        ];
        periods.sort();
        assert_eq!(periods[0], closed("2000-06-01", "2002-01-01"));
        assert_eq!(periods[1], closed("2001-01-01", "2001-01-31"));
        assert_eq!(periods[2], closed("2001-01-01", "2001-12-31"));
        assert!(periods[3].is_open_ended());
    }

    #[test]
    fn length_counts_calendar_days_inclusive() {
        assert_eq!(closed("2001-01-01", "2001-12-31").length().unwrap(), 365);
        assert_eq!(closed("2004-02-01", "2004-02-29").length().unwrap(), 29);
    }

    #[test]
    fn length_of_open_period_is_an_error() {
        let err = Period::open_ended(d("2001-01-01")).length().unwrap_err();
        assert!(matches!(err, PartitionError::OpenEnded(_)));
    }

    #[test]
    fn window_without_end_uses_horizon() {
        let w = Window::from_optional_end(d("2001-01-01"), None).unwrap();
        assert_eq!(w.end(), HORIZON);
        assert!(!w.period().is_open_ended());
    }

    #[test]
    fn window_rejects_unrepresentable_end() {
        assert!(Window::new(d("2001-01-01"), NaiveDate::MAX).is_err());
    }

    #[test]
    fn intersect_clips_to_both_bounds() {
        let w = Window::new(d("2001-01-01"), d("2001-12-31")).unwrap();
        let clipped = w.intersect(&closed("2000-05-01", "2001-03-15")).unwrap();
        assert_eq!(clipped.start(), d("2001-01-01"));
        assert_eq!(clipped.end(), d("2001-03-15"));

        let open = w.intersect(&Period::open_ended(d("2001-09-03"))).unwrap();
        assert_eq!(open.start(), d("2001-09-03"));
        assert_eq!(open.end(), d("2001-12-31"));

        assert!(w.intersect(&closed("2002-01-01", "2002-02-01")).is_none());
    }

    #[test]
    fn display_marks_open_end() {
        assert_eq!(
            Period::open_ended(d("2001-09-03")).to_string(),
            "[2001-09-03, \u{221e})"
        );
        assert_eq!(
            closed("2001-01-01", "2001-06-30").to_string(),
            "[2001-01-01, 2001-06-30]"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_round_trips_periods_and_windows() {
        let closed_period = closed("2001-01-01", "2001-06-30");
        let json = serde_json::to_value(closed_period).unwrap();
        assert_eq!(json, serde_json::json!({ "start": "2001-01-01", "end": "2001-06-30" }));
        assert_eq!(serde_json::from_value::<Period>(json).unwrap(), closed_period);

        let open = Period::open_ended(d("2001-09-03"));
        let json = serde_json::to_value(open).unwrap();
        assert_eq!(json, serde_json::json!({ "start": "2001-09-03", "end": null }));
        let back: Period = serde_json::from_value(json).unwrap();
        assert!(back.is_open_ended());
        assert_eq!(back, open);

        let window = Window::until_horizon(d("2001-01-01")).unwrap();
        let text = serde_json::to_string(&window).unwrap();
        assert_eq!(serde_json::from_str::<Window>(&text).unwrap(), window);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializing_rejects_inverted_bounds() {
        let inverted = r#"{"start":"2001-12-31","end":"2001-01-01"}"#;

        let err = serde_json::from_str::<Period>(inverted).unwrap_err();
        assert!(err.to_string().contains("invalid period"), "{err}");
        let err = serde_json::from_str::<Window>(inverted).unwrap_err();
        assert!(err.to_string().contains("invalid period"), "{err}");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializing_rejects_window_without_a_following_day() {
        let json = serde_json::json!({ "start": "2001-01-01", "end": NaiveDate::MAX });
        assert!(serde_json::from_value::<Window>(json).is_err());
    }
}
