use core::{fmt::Debug, hash::Hash};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

/// A point in time usable as the key of a rolling window.
///
/// Timestamps are totally ordered, hashable, and can be moved back by a span
/// to find the start of a trailing window.
pub trait Timestamp: Copy + Ord + Hash + Debug {
    /// Length of time between two timestamps
    type Span: Copy + Debug;

    /// Returns `self - span`, or `None` if the result is not representable
    fn checked_sub_span(self, span: Self::Span) -> Option<Self>;
}

impl Timestamp for i64 {
    type Span = i64;

    #[inline]
    fn checked_sub_span(self, span: i64) -> Option<Self> {
        self.checked_sub(span)
    }
}

impl Timestamp for u64 {
    type Span = u64;

    #[inline]
    fn checked_sub_span(self, span: u64) -> Option<Self> {
        self.checked_sub(span)
    }
}

impl Timestamp for NaiveDateTime {
    type Span = TimeDelta;

    #[inline]
    fn checked_sub_span(self, span: TimeDelta) -> Option<Self> {
        self.checked_sub_signed(span)
    }
}

impl Timestamp for DateTime<Utc> {
    type Span = TimeDelta;

    #[inline]
    fn checked_sub_span(self, span: TimeDelta) -> Option<Self> {
        self.checked_sub_signed(span)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::all)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_integer_spans() {
        assert_eq!(10i64.checked_sub_span(4), Some(6));
        assert_eq!(3u64.checked_sub_span(4), None);
        assert_eq!(i64::MIN.checked_sub_span(1), None);
    }

    #[test]
    fn test_datetime_spans() {
        let t = NaiveDate::from_ymd_opt(2025, 4, 11)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        assert_eq!(t.checked_sub_span(TimeDelta::days(10)), Some(expected));
        assert_eq!(
            t.and_utc().checked_sub_span(TimeDelta::days(10)),
            Some(expected.and_utc())
        );
    }
}
