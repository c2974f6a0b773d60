//! Heat-band classification: a fixed 10-interval partition of "now - atime" (the age, in
//! seconds). "Hotter" means a smaller age (more recently accessed).

use chrono::{DateTime, Utc};
use log::warn;

/// `(lower_bound_seconds, key)` pairs, ascending by `lower_bound_seconds`. The first bound is
/// negative (`-1 day`) so an atime up to a day in the future still lands in the youngest
/// bucket without tripping the future-atime warning; anything further in the future does.
const HEAT_BANDS: &[(i64, &str)] = &[
    (-86_400, "*-1h"),
    (3_600, "1h-1d"),
    (86_400, "1d-1w"),
    (604_800, "1w-1m"),
    (2_592_000, "1m-3m"),
    (7_776_000, "3m-6m"),
    (15_552_000, "6m-1y"),
    (31_536_000, "1y-2y"),
    (63_072_000, "2y-5y"),
    (157_680_000, "5y-*"),
];

/// Return the key of the heat band containing `age_seconds` (= `now - atime`). An age more
/// negative than the youngest bucket's lower bound (i.e. an atime more than a day in the
/// future) is a warning, not an error, and is reported in the youngest bucket.
pub fn heat_band(age_seconds: i64) -> &'static str {
    if age_seconds < HEAT_BANDS[0].0 {
        warn!(
            "atime is in the future (age {} s); classifying as youngest heat band",
            age_seconds
        );
        return HEAT_BANDS[0].1;
    }
    let idx = HEAT_BANDS.partition_point(|&(lower, _)| lower <= age_seconds);
    HEAT_BANDS[idx - 1].1
}

/// `age_seconds` of `atime` relative to `start_timestamp` (both naive wall-clock values,
/// matching the original's `(start_timestamp - atime).total_seconds()`).
pub fn age_seconds(start_timestamp: DateTime<Utc>, atime: DateTime<Utc>) -> i64 {
    (start_timestamp - atime).num_seconds()
}

/// All heat-band keys, in ascending order (youngest to oldest). Used by the aggregator,
/// whose `heat_bins` bucket set is fixed rather than discovered from the index mapping.
pub fn all_heat_bands() -> impl Iterator<Item = &'static str> {
    HEAT_BANDS.iter().map(|&(_, key)| key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hours_ago_lands_in_1h_1d() {
        assert_eq!(heat_band(2 * 3_600), "1h-1d");
    }

    #[test]
    fn four_hundred_days_ago_lands_in_1y_2y() {
        assert_eq!(heat_band(400 * 86_400), "1y-2y");
    }

    #[test]
    fn slightly_future_atime_is_youngest_without_warning_path() {
        assert_eq!(heat_band(-3_600), "*-1h");
    }

    #[test]
    fn far_future_atime_falls_back_to_youngest_with_warning() {
        assert_eq!(heat_band(-2 * 86_400), "*-1h");
    }

    #[test]
    fn monotone() {
        let samples = [
            -200_000i64,
            -3600,
            0,
            3600,
            86_400,
            31_536_000,
            999_999_999_999,
        ];
        let mut last_idx = 0usize;
        for &a in &samples {
            let key = heat_band(a);
            let idx = all_heat_bands().position(|k| k == key).unwrap();
            assert!(idx >= last_idx, "heat bands must be monotone in age");
            last_idx = idx;
        }
    }
}
