use alloc::vec::Vec;
use core::cmp::{Ordering, Reverse};

use ahash::RandomState;
use chrono::{NaiveDateTime, TimeDelta};
use hashbrown::HashMap;
use num_traits::Float;
use ordered_float::{OrderedFloat, PrimitiveFloat};
use tracing::{debug, trace};

use crate::{AvlTree, Error, Kbn, LinkedHeap, NodeRef, Result, Timestamp, range_query};

/// Trailing window length, in days, used by
/// [`PriceTracker::default`] for `NaiveDateTime` timestamps
pub const DEFAULT_WINDOW_DAYS: i64 = 10;

/// Statistics recorded for one observation.
///
/// `min`, `max` and `avg` describe the trailing window that ends at the
/// observation, the observation itself included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats<T> {
    /// Observed price
    pub price: T,
    /// Lowest price inside the window
    pub min: T,
    /// Highest price inside the window
    pub max: T,
    /// Mean price inside the window
    pub avg: T,
}

/// Heap handles of an observation that is still inside the window
#[derive(Debug, Clone, Copy)]
struct WindowEntry<T> {
    price: T,
    min_node: NodeRef,
    max_node: NodeRef,
}

/// Rolling min/max/mean of prices over a trailing time window.
///
/// Every observation is kept in an AVL history index together with the
/// statistics of the window that ended at it. Prices inside the window also
/// live in a min-heap and in a max-heap (a min-heap over
/// `Reverse<OrderedFloat<T>>`), and their heap references are kept per
/// timestamp so that expired observations can be removed from both heaps
/// directly. Expired observations are found through a range query on the
/// history index, so the eviction cost follows the number of entries leaving
/// the window, not its size.
///
/// # Type Parameters
///
/// * `S` - Timestamp type, see [`Timestamp`]
/// * `T` - Floating point price type
///
/// # Examples
///
/// ```
/// # use ta_price_window::PriceTracker;
/// let mut tracker = PriceTracker::<i64, f64>::new(2);
/// for (time, price) in [(1, 5.0), (2, 3.0), (3, 4.0), (4, 8.0)] {
///     tracker.add_observation(time, price).unwrap();
/// }
///
/// // Time 1 is older than 4 - 2 and has left the window
/// let stats = tracker.get(&4).unwrap();
/// assert_eq!((stats.min, stats.max, stats.avg), (3.0, 8.0, 5.0));
/// assert_eq!(tracker.len(), 3);
/// assert_eq!(tracker.history_len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct PriceTracker<S: Timestamp, T> {
    /// Trailing window length
    window: S::Span,
    /// Heap references of the observations inside the window
    entries: HashMap<S, WindowEntry<T>, RandomState>,
    /// Statistics of every observation ever recorded
    history: AvlTree<S, WindowStats<T>>,
    /// Prices inside the window, smallest at the root
    min_heap: LinkedHeap<OrderedFloat<T>, T>,
    /// Prices inside the window, largest at the root
    max_heap: LinkedHeap<Reverse<OrderedFloat<T>>, T>,
    /// Sum of the prices inside the window
    sum: Kbn<T>,
    /// Timestamp of the most recent observation
    latest: Option<S>,
    /// Eviction cutoff of the previous observation; nothing older is left in
    /// the window
    horizon: Option<S>,
}

impl<T> Default for PriceTracker<NaiveDateTime, T>
where
    T: Float + Default + PrimitiveFloat,
{
    /// Creates a tracker with a window of [`DEFAULT_WINDOW_DAYS`] days
    fn default() -> Self {
        Self::new(TimeDelta::days(DEFAULT_WINDOW_DAYS))
    }
}

impl<S: Timestamp, T> PriceTracker<S, T>
where
    T: Float + Default + PrimitiveFloat,
{
    /// Creates a tracker with the given trailing window length.
    ///
    /// # Arguments
    ///
    /// * `window` - Length of the trailing window. An observation at time `t`
    ///   stays in the window while the latest timestamp is at most `t + window`.
    ///
    /// # Returns
    ///
    /// * `Self` - An empty tracker
    pub fn new(window: S::Span) -> Self {
        Self {
            window,
            entries: HashMap::with_hasher(RandomState::default()),
            history: AvlTree::new(),
            min_heap: LinkedHeap::new(),
            max_heap: LinkedHeap::new(),
            sum: Kbn::default(),
            latest: None,
            horizon: None,
        }
    }

    /// Returns the trailing window length
    #[inline]
    pub fn window(&self) -> S::Span {
        self.window
    }

    /// Returns the number of observations inside the current window
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the window holds no observation
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of observations recorded in the history
    #[inline]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Returns the lowest price inside the current window
    pub fn min(&self) -> Option<T> {
        self.min_heap.peek().map(|(_, price)| *price)
    }

    /// Returns the highest price inside the current window
    pub fn max(&self) -> Option<T> {
        self.max_heap.peek().map(|(_, price)| *price)
    }

    /// Returns the mean price inside the current window
    pub fn mean(&self) -> Option<T> {
        if self.entries.is_empty() {
            return None;
        }
        T::from(self.entries.len()).map(|n| self.sum.total() / n)
    }

    /// Returns the statistics recorded for `time`.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] - no observation was recorded at `time`
    pub fn get(&self, time: &S) -> Result<&WindowStats<T>> {
        self.history.get(time)
    }

    /// Returns the most recent observation and its statistics
    pub fn latest(&self) -> Option<(S, &WindowStats<T>)> {
        let time = self.latest?;
        self.history.get(&time).ok().map(|stats| (time, stats))
    }

    /// Returns every recorded observation with `start <= time <= end`, oldest first.
    ///
    /// # Arguments
    ///
    /// * `start` - Earliest timestamp to include
    /// * `end` - Latest timestamp to include
    ///
    /// # Returns
    ///
    /// * `Vec<(&S, &WindowStats<T>)>` - Matching observations, empty when `start > end`
    pub fn query(&self, start: &S, end: &S) -> Vec<(&S, &WindowStats<T>)> {
        range_query(&self.history, start, end)
    }

    /// Records a price observation and returns the statistics of the window
    /// ending at it.
    ///
    /// Observations older than `time - window` are evicted from the window
    /// before the new price enters it. An observation at the latest recorded
    /// timestamp replaces the earlier one.
    ///
    /// # Arguments
    ///
    /// * `time` - Observation timestamp, not older than the latest one
    /// * `price` - Observed price
    ///
    /// # Returns
    ///
    /// * `WindowStats<T>` - The statistics stored in the history for `time`
    ///
    /// # Errors
    ///
    /// * [`Error::OutOfOrder`] - `time` is older than the latest observation
    pub fn add_observation(&mut self, time: S, price: T) -> Result<WindowStats<T>> {
        if let Some(latest) = self.latest {
            match time.cmp(&latest) {
                Ordering::Less => return Err(Error::OutOfOrder),
                Ordering::Equal => {
                    self.remove_entry(&time)?;
                }
                Ordering::Greater => {}
            }
        }

        let evicted = self.evict_before(time)?;

        let min_node = self.min_heap.insert(OrderedFloat(price), price);
        let max_node = self.max_heap.insert(Reverse(OrderedFloat(price)), price);
        self.entries.insert(
            time,
            WindowEntry {
                price,
                min_node,
                max_node,
            },
        );
        self.sum += price;

        let stats = WindowStats {
            price,
            min: self.min().unwrap_or(price),
            max: self.max().unwrap_or(price),
            avg: self.mean().unwrap_or(price),
        };
        self.history.insert(time, stats);
        self.latest = Some(time);

        debug!(?time, evicted, in_window = self.entries.len(), "recorded observation");
        Ok(stats)
    }

    /// Rebuilds the running sum from the prices inside the window
    pub fn recompute(&mut self) {
        self.sum = Kbn::default();
        for entry in self.entries.values() {
            self.sum += entry.price;
        }
    }

    /// Forgets every observation, keeping the window length
    pub fn reset(&mut self) {
        self.entries.clear();
        self.history.clear();
        self.min_heap.clear();
        self.max_heap.clear();
        self.sum = Kbn::default();
        self.latest = None;
        self.horizon = None;
    }

    /// Evicts every observation strictly older than `time - window`.
    ///
    /// Everything before the previous cutoff is already gone, so only the
    /// history between that cutoff and the new one is searched.
    ///
    /// # Returns
    ///
    /// * `usize` - The number of evicted observations
    fn evict_before(&mut self, time: S) -> Result<usize> {
        let Some(cutoff) = time.checked_sub_span(self.window) else {
            return Ok(0);
        };
        let Some(low) = self
            .horizon
            .or_else(|| self.history.first().map(|(t, _)| *t))
        else {
            return Ok(0);
        };

        let expired: Vec<S> = range_query(&self.history, &low, &cutoff)
            .into_iter()
            .map(|(t, _)| *t)
            .filter(|t| *t < cutoff && self.entries.contains_key(t))
            .collect();

        for t in &expired {
            self.remove_entry(t)?;
            trace!(time = ?t, "evicted observation");
        }
        self.horizon = Some(cutoff);
        Ok(expired.len())
    }

    /// Takes the observation at `time` out of both heaps and the running sum.
    ///
    /// Both heap references are checked before anything is removed, so a
    /// failure leaves the window untouched.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidNode`] - a stored reference no longer names a node of its heap
    fn remove_entry(&mut self, time: &S) -> Result<()> {
        let Some(entry) = self.entries.get(time).copied() else {
            return Ok(());
        };
        if !self.min_heap.contains(entry.min_node) || !self.max_heap.contains(entry.max_node) {
            return Err(Error::InvalidNode);
        }
        self.min_heap.delete_node(entry.min_node)?;
        self.max_heap.delete_node(entry.max_node)?;
        self.entries.remove(time);
        self.sum -= entry.price;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::all)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use chrono::{DateTime, NaiveDate, Utc};

    fn hour(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn feed(tracker: &mut PriceTracker<i64, f64>, data: &[(i64, f64)]) -> Vec<WindowStats<f64>> {
        data.iter()
            .map(|&(t, p)| tracker.add_observation(t, p).unwrap())
            .collect()
    }

    #[test]
    fn test_tracker_creation() {
        let tracker = PriceTracker::<i64, f64>::new(5);
        assert_eq!(tracker.window(), 5);
        assert!(tracker.is_empty());
        assert_eq!(tracker.history_len(), 0);
        assert_eq!(tracker.min(), None);
        assert_eq!(tracker.max(), None);
        assert_eq!(tracker.mean(), None);
        assert!(tracker.latest().is_none());
    }

    #[test]
    fn test_default_window_is_ten_days() {
        let tracker = PriceTracker::<NaiveDateTime, f64>::default();
        assert_eq!(tracker.window(), TimeDelta::days(10));
    }

    #[test]
    fn test_first_observation_is_its_own_window() {
        let mut tracker = PriceTracker::<i64, f64>::new(3);
        let stats = tracker.add_observation(10, 42.5).unwrap();
        assert_eq!(
            stats,
            WindowStats {
                price: 42.5,
                min: 42.5,
                max: 42.5,
                avg: 42.5
            }
        );
    }

    #[test]
    fn test_hourly_constant_prices() {
        let mut tracker = PriceTracker::<NaiveDateTime, f64>::default();
        for h in 1..=9 {
            tracker.add_observation(hour(1, h), 1.0).unwrap();
        }

        let found = tracker.query(&hour(1, 0), &hour(2, 0));
        assert_eq!(found.len(), 9);
        for (_, stats) in found {
            assert_approx_eq!(stats.price, 1.0);
            assert_approx_eq!(stats.min, 1.0);
            assert_approx_eq!(stats.max, 1.0);
            assert_approx_eq!(stats.avg, 1.0);
        }
        assert_eq!(tracker.len(), 9);
    }

    #[test]
    fn test_rolling_window_statistics() {
        let mut tracker = PriceTracker::<i64, f64>::new(2);
        let stats = feed(
            &mut tracker,
            &[(1, 5.0), (2, 3.0), (3, 4.0), (4, 8.0), (5, 1.0), (6, 2.0)],
        );

        let expected = [
            (5.0, 5.0, 5.0),
            (3.0, 5.0, 4.0),
            (3.0, 5.0, 4.0),
            (3.0, 8.0, 5.0),
            (1.0, 8.0, 13.0 / 3.0),
            (1.0, 8.0, 11.0 / 3.0),
        ];
        for (got, (min, max, avg)) in stats.iter().zip(expected) {
            assert_approx_eq!(got.min, min);
            assert_approx_eq!(got.max, max);
            assert_approx_eq!(got.avg, avg);
        }
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.min(), Some(1.0));
        assert_eq!(tracker.max(), Some(8.0));
    }

    #[test]
    fn test_boundary_observation_stays_in_window() {
        let mut tracker = PriceTracker::<i64, f64>::new(2);
        feed(&mut tracker, &[(1, 10.0), (3, 20.0)]);
        // 1 == 3 - 2 is not strictly older than the cutoff
        assert_eq!(tracker.len(), 2);
        assert_approx_eq!(tracker.mean().unwrap(), 15.0);

        tracker.add_observation(4, 30.0).unwrap();
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.min(), Some(20.0));
    }

    #[test]
    fn test_gap_evicts_whole_window() {
        let mut tracker = PriceTracker::<i64, f64>::new(2);
        feed(&mut tracker, &[(1, 1.0), (2, 9.0)]);
        let stats = tracker.add_observation(100, 4.0).unwrap();
        assert_eq!((stats.min, stats.max, stats.avg), (4.0, 4.0, 4.0));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.history_len(), 3);

        // History outlives the window
        assert_eq!(tracker.get(&2).unwrap().price, 9.0);
    }

    #[test]
    fn test_out_of_order_is_rejected() {
        let mut tracker = PriceTracker::<i64, f64>::new(5);
        feed(&mut tracker, &[(5, 1.0), (7, 3.0)]);
        assert_eq!(tracker.add_observation(6, 2.0), Err(Error::OutOfOrder));
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.latest().map(|(t, s)| (t, s.price)), Some((7, 3.0)));
    }

    #[test]
    fn test_same_timestamp_replaces_latest() {
        let mut tracker = PriceTracker::<i64, f64>::new(5);
        feed(&mut tracker, &[(1, 5.0), (2, 3.0)]);
        let stats = tracker.add_observation(2, 7.0).unwrap();

        assert_eq!((stats.min, stats.max), (5.0, 7.0));
        assert_approx_eq!(stats.avg, 6.0);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.history_len(), 2);
        assert_eq!(tracker.get(&2).unwrap().price, 7.0);
    }

    #[test]
    fn test_failed_removal_leaves_window_intact() {
        let mut tracker = PriceTracker::<i64, f64>::new(10);
        feed(&mut tracker, &[(1, 2.0), (2, 6.0)]);

        // Drop the max-heap node behind the tracker's back
        let entry = tracker.entries[&1];
        tracker.max_heap.delete_node(entry.max_node).unwrap();

        assert_eq!(tracker.remove_entry(&1), Err(Error::InvalidNode));
        assert!(tracker.entries.contains_key(&1));
        assert!(tracker.min_heap.contains(entry.min_node));
        assert_eq!(tracker.min_heap.len(), 2);
        assert_approx_eq!(tracker.sum.total(), 8.0);
    }

    #[test]
    fn test_heap_references_are_bound_to_their_heap() {
        let mut tracker = PriceTracker::<i64, f64>::new(10);
        feed(&mut tracker, &[(1, 2.0), (2, 6.0)]);

        // Both heaps fill slots in lockstep, yet their references never mix
        let entry = tracker.entries[&1];
        assert!(!tracker.min_heap.contains(entry.max_node));
        assert_eq!(
            tracker.min_heap.delete_node(entry.max_node),
            Err(Error::InvalidNode)
        );
        assert_eq!(tracker.min_heap.len(), 2);
    }

    #[test]
    fn test_query_ranges() {
        let mut tracker = PriceTracker::<i64, f64>::new(10);
        feed(&mut tracker, &[(1, 1.0), (3, 3.0), (5, 5.0), (7, 7.0)]);

        let times: Vec<i64> = tracker.query(&2, &6).into_iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![3, 5]);
        assert!(tracker.query(&6, &2).is_empty());
        assert!(tracker.query(&8, &20).is_empty());
        assert_eq!(tracker.get(&4), Err(Error::NotFound));
    }

    #[test]
    fn test_recompute_matches_running_sum() {
        let mut tracker = PriceTracker::<i64, f64>::new(3);
        feed(
            &mut tracker,
            &[(1, 0.1), (2, 0.2), (3, 0.3), (4, 0.4), (5, 0.5), (6, 0.6)],
        );
        let before = tracker.mean().unwrap();
        tracker.recompute();
        assert_approx_eq!(tracker.mean().unwrap(), before);
        assert_approx_eq!(before, 0.45);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut tracker = PriceTracker::<i64, f64>::new(3);
        feed(&mut tracker, &[(1, 1.0), (2, 2.0)]);
        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(tracker.history_len(), 0);
        assert_eq!(tracker.max(), None);

        // Older timestamps are accepted again after a reset
        let stats = tracker.add_observation(0, 4.0).unwrap();
        assert_eq!(stats.avg, 4.0);
    }

    #[test]
    fn test_utc_timestamps() {
        let mut tracker = PriceTracker::<DateTime<Utc>, f64>::new(TimeDelta::hours(1));
        let start = hour(1, 9).and_utc();
        for (minutes, price) in [(0, 2.0), (30, 6.0), (61, 4.0)] {
            tracker
                .add_observation(start + TimeDelta::minutes(minutes), price)
                .unwrap();
        }
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.min(), Some(4.0));
        assert_eq!(tracker.max(), Some(6.0));
    }
}
