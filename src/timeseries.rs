//! Differential time series and the balance-at-time reduction.
//!
//! A tracked quantity is stored as a snapshot value (fixed at the reference
//! block) plus a [`TimeSeries`] of signed deltas. Its value at any timestamp
//! `t` is the snapshot plus the sum of every delta whose timestamp is `<= t`,
//! a left-continuous step function over the delta timestamps.

use std::borrow::Cow;

use bigdecimal::BigDecimal;
use num_traits::Zero;

/// One signed change to a tracked quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Block timestamp in seconds
    pub timestamp: u64,
    pub value: BigDecimal,
}

impl Delta {
    pub fn new(timestamp: u64, value: BigDecimal) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered sequence of deltas for one tracked quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeries {
    deltas: Vec<Delta>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: Delta) {
        self.deltas.push(delta);
    }

    /// Sort ascending by timestamp.
    ///
    /// Stable: deltas sharing a timestamp keep their insertion order, so
    /// sorting an already-sorted series is a no-op.
    pub fn sort(&mut self) {
        self.deltas.sort_by_key(|d| d.timestamp);
    }

    pub fn is_sorted(&self) -> bool {
        is_sorted(&self.deltas)
    }

    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Value of the quantity at `timestamp` given its snapshot.
    pub fn value_at(&self, timestamp: u64, snapshot: &BigDecimal, sort_first: bool) -> BigDecimal {
        reduce(timestamp, Some(snapshot), Some(self.deltas.as_slice()), sort_first)
    }
}

impl Extend<Delta> for TimeSeries {
    fn extend<I: IntoIterator<Item = Delta>>(&mut self, iter: I) {
        self.deltas.extend(iter);
    }
}

impl FromIterator<Delta> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = Delta>>(iter: I) -> Self {
        Self {
            deltas: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Delta>> for TimeSeries {
    fn from(deltas: Vec<Delta>) -> Self {
        Self { deltas }
    }
}

fn is_sorted(deltas: &[Delta]) -> bool {
    deltas.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

/// Fold a snapshot and a delta sequence into the quantity's value at `timestamp`.
///
/// A missing snapshot or series counts as zero / empty. With `sort_first` the
/// series is ordered on a private copy (only when it is not already sorted), so
/// the caller's data is never touched. Without it, the caller asserts the
/// series is sorted, and the prefix is located by binary search.
pub fn reduce(
    timestamp: u64,
    snapshot: Option<&BigDecimal>,
    series: Option<&[Delta]>,
    sort_first: bool,
) -> BigDecimal {
    let base = snapshot.cloned().unwrap_or_else(BigDecimal::zero);

    let Some(series) = series else {
        return base;
    };

    let ordered: Cow<'_, [Delta]> = if sort_first && !is_sorted(series) {
        let mut owned = series.to_vec();
        owned.sort_by_key(|d| d.timestamp);
        Cow::Owned(owned)
    } else {
        Cow::Borrowed(series)
    };

    let end = ordered.partition_point(|d| d.timestamp <= timestamp);

    base + ordered[..end].iter().map(|d| &d.value).sum::<BigDecimal>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(u64, i64)]) -> TimeSeries {
        points
            .iter()
            .map(|&(t, v)| Delta::new(t, BigDecimal::from(v)))
            .collect()
    }

    #[test]
    fn test_before_first_delta_returns_snapshot() {
        let s = series(&[(10, 5), (20, -3)]);
        let snapshot = BigDecimal::from(100);
        assert_eq!(s.value_at(0, &snapshot, false), snapshot);
        assert_eq!(s.value_at(9, &snapshot, true), snapshot);
    }

    #[test]
    fn test_step_function_is_inclusive_and_left_continuous() {
        let s = series(&[(10, 5), (20, -3), (30, 7)]);
        let snapshot = BigDecimal::from(100);

        assert_eq!(s.value_at(10, &snapshot, false), BigDecimal::from(105));
        assert_eq!(s.value_at(15, &snapshot, false), BigDecimal::from(105));
        assert_eq!(s.value_at(20, &snapshot, false), BigDecimal::from(102));
        assert_eq!(s.value_at(29, &snapshot, false), BigDecimal::from(102));
        assert_eq!(s.value_at(30, &snapshot, false), BigDecimal::from(109));
        assert_eq!(s.value_at(u64::MAX, &snapshot, false), BigDecimal::from(109));
    }

    #[test]
    fn test_difference_between_two_queries_is_window_sum() {
        let s = series(&[(1, 4), (3, -2), (3, 9), (7, 11), (12, -5)]);
        let snapshot = BigDecimal::from(0);

        for (t1, t2) in [(0u64, 3u64), (2, 7), (3, 12), (5, 5), (0, 100)] {
            let window: BigDecimal = s
                .deltas()
                .iter()
                .filter(|d| t1 < d.timestamp && d.timestamp <= t2)
                .map(|d| &d.value)
                .sum();
            assert_eq!(
                s.value_at(t2, &snapshot, false) - s.value_at(t1, &snapshot, false),
                window,
                "window ({t1}, {t2}]"
            );
        }
    }

    #[test]
    fn test_sort_first_handles_unsorted_input_without_mutating_it() {
        let unsorted = vec![
            Delta::new(30, BigDecimal::from(7)),
            Delta::new(10, BigDecimal::from(5)),
            Delta::new(20, BigDecimal::from(-3)),
        ];
        let before = unsorted.clone();

        let value = reduce(20, Some(&BigDecimal::from(1)), Some(unsorted.as_slice()), true);

        assert_eq!(value, BigDecimal::from(3));
        assert_eq!(unsorted, before);
    }

    #[test]
    fn test_missing_snapshot_and_series_are_zero() {
        assert_eq!(reduce(50, None, None, true), BigDecimal::zero());

        let s = series(&[(10, 8)]);
        assert_eq!(reduce(50, None, Some(s.deltas()), true), BigDecimal::from(8));
        assert_eq!(reduce(50, Some(&BigDecimal::from(2)), None, false), BigDecimal::from(2));
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let mut s = series(&[(20, 1), (10, 2), (20, 3), (10, 4)]);
        s.sort();
        let once = s.clone();
        s.sort();

        assert_eq!(s, once);
        let order: Vec<i64> = s
            .deltas()
            .iter()
            .map(|d| d.value.to_string().parse().unwrap())
            .collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
        assert!(s.is_sorted());
    }
}
