use proptest::prelude::*;
use ta_price_window::PriceTracker;

/// Window statistics computed by scanning every observation
fn brute_force(observations: &[(i64, f64)], now: i64, window: i64) -> (f64, f64, f64) {
    let inside: Vec<f64> = observations
        .iter()
        .filter(|(t, _)| *t >= now - window)
        .map(|(_, p)| *p)
        .collect();
    let min = inside.iter().copied().fold(f64::INFINITY, f64::min);
    let max = inside.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = inside.iter().sum::<f64>() / inside.len() as f64;
    (min, max, avg)
}

proptest! {
    /// Every recorded statistic matches a full scan of the trailing window,
    /// including repeated timestamps that replace the latest observation.
    #[test]
    fn prop_window_matches_scan(
        window in 0i64..12,
        steps in prop::collection::vec((0i64..4, 0u32..1000), 1..150),
    ) {
        let mut tracker = PriceTracker::<i64, f64>::new(window);
        let mut observations: Vec<(i64, f64)> = Vec::new();
        let mut now = 0i64;

        for (gap, cents) in steps {
            now += gap;
            let price = f64::from(cents) / 100.0;
            if observations.last().is_some_and(|(t, _)| *t == now) {
                observations.pop();
            }
            observations.push((now, price));

            let stats = tracker.add_observation(now, price).unwrap();
            let (min, max, avg) = brute_force(&observations, now, window);
            prop_assert_eq!(stats.price, price);
            prop_assert_eq!(stats.min, min);
            prop_assert_eq!(stats.max, max);
            prop_assert!((stats.avg - avg).abs() < 1e-9, "avg {} != {}", stats.avg, avg);

            let in_window = observations.iter().filter(|(t, _)| *t >= now - window).count();
            prop_assert_eq!(tracker.len(), in_window);
        }

        prop_assert_eq!(tracker.history_len(), observations.len());
        let first = observations[0].0;
        prop_assert_eq!(tracker.query(&first, &now).len(), observations.len());
    }
}
