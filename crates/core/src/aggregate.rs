use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::filter::TimeWindow;
use crate::model::operation::{LatencyBin, RpmPoint, Stats};

/// `100 * errors / count`, truncated toward zero. Zero when there are no rows.
pub fn error_percent(error_count: i64, count: i64) -> i64 {
    if count <= 0 {
        return 0;
    }
    (100 * error_count) / count
}

impl Stats {
    /// Builds stats from raw aggregates, mapping missing values to zero.
    pub fn from_counts(count: Option<i64>, error_count: Option<i64>, duration: Option<f64>) -> Self {
        let count = count.unwrap_or(0).max(0);
        let error_count = error_count.unwrap_or(0).max(0);
        let duration = match duration {
            Some(d) if d.is_finite() && count > 0 => d,
            _ => 0.0,
        };
        Self {
            count,
            error_count,
            error_percent: error_percent(error_count, count),
            duration,
        }
    }
}

pub fn floor_to_bucket(ts: DateTime<Utc>, bucket_ms: i64) -> DateTime<Utc> {
    let ms = ts.timestamp_millis();
    let floored = ms - ms.rem_euclid(bucket_ms);
    DateTime::from_timestamp_millis(floored).unwrap_or(ts)
}

/// Most points a gap-filled RPM series may hold.
pub const MAX_RPM_POINTS: i64 = 1440;

/// Widens `bucket` to a whole multiple of itself so that `window` spans at
/// most [`MAX_RPM_POINTS`] buckets. Windows that already fit keep `bucket`.
pub fn rpm_bucket_for(window: &TimeWindow, bucket: Duration) -> Duration {
    let bucket_ms = bucket.num_milliseconds().max(1);
    let span_ms = (window.to - window.from).num_milliseconds().max(0);
    let needed_ms = (span_ms + MAX_RPM_POINTS - 1) / MAX_RPM_POINTS;
    if needed_ms <= bucket_ms {
        return Duration::milliseconds(bucket_ms);
    }
    let multiple = (needed_ms + bucket_ms - 1) / bucket_ms;
    Duration::milliseconds(bucket_ms.saturating_mul(multiple))
}

/// Expands sparse `(bucket_start_ms, count, error_count)` rows into a continuous
/// series covering the whole window. Buckets with no traces get zero counts.
/// `bucket` should already come from [`rpm_bucket_for`]; it is widened again
/// here so the series stays bounded either way.
pub fn fill_rpm_series(
    rows: &[(i64, i64, i64)],
    window: &TimeWindow,
    bucket: Duration,
) -> Vec<RpmPoint> {
    let bucket_ms = rpm_bucket_for(window, bucket).num_milliseconds().max(1);
    let by_bucket = rows
        .iter()
        .map(|(start, count, errors)| (*start, (*count, *errors)))
        .collect::<BTreeMap<_, _>>();

    let first = floor_to_bucket(window.from, bucket_ms).timestamp_millis();
    let last = floor_to_bucket(window.to, bucket_ms).timestamp_millis();

    let mut out = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        let (count, error_count) = by_bucket.get(&cursor).copied().unwrap_or((0, 0));
        if let Some(start_time) = DateTime::from_timestamp_millis(cursor) {
            out.push(RpmPoint {
                start_time,
                count,
                error_count,
            });
        }
        cursor += bucket_ms;
    }
    out
}

/// Turns `(bin_index, count)` rows into histogram bins labelled by their lower
/// duration bound.
pub fn latency_bins(rows: &[(i64, i64)], width: f64) -> Vec<LatencyBin> {
    let width = if width.is_finite() && width > 0.0 {
        width
    } else {
        1.0
    };
    let mut bins = rows
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(idx, count)| LatencyBin {
            duration: *idx as f64 * width,
            count: *count,
        })
        .collect::<Vec<_>>();
    bins.sort_by(|a, b| a.duration.total_cmp(&b.duration));
    bins
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn error_percent_truncates() {
        assert_eq!(error_percent(3, 7), 42);
        assert_eq!(error_percent(2, 3), 66);
        assert_eq!(error_percent(7, 7), 100);
    }

    #[test]
    fn zero_rows_give_zero_stats() {
        let stats = Stats::from_counts(None, None, None);
        assert_eq!(
            stats,
            Stats {
                count: 0,
                error_count: 0,
                error_percent: 0,
                duration: 0.0,
            }
        );
        assert_eq!(Stats::from_counts(Some(0), Some(0), Some(f64::NAN)).duration, 0.0);
    }

    #[test]
    fn rpm_series_is_gap_filled() {
        let from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 30).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 1, 0, 4, 0).unwrap();
        let window = TimeWindow { from, to };
        let minute = Utc.with_ymd_and_hms(2026, 2, 1, 0, 2, 0).unwrap();
        let rows = vec![(minute.timestamp_millis(), 5, 1)];

        let series = fill_rpm_series(&rows, &window, Duration::minutes(1));
        assert_eq!(series.len(), 5);
        assert_eq!(
            series[0].start_time,
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(series[2].count, 5);
        assert_eq!(series[2].error_count, 1);
        assert_eq!(series.iter().map(|p| p.count).sum::<i64>(), 5);
    }

    #[test]
    fn narrow_window_keeps_configured_bucket() {
        let from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let window = TimeWindow {
            from,
            to: from + Duration::hours(24),
        };
        assert_eq!(rpm_bucket_for(&window, Duration::minutes(1)), Duration::minutes(1));
    }

    #[test]
    fn wide_window_widens_bucket_and_bounds_series() {
        let window = TimeWindow {
            from: Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        let bucket = rpm_bucket_for(&window, Duration::minutes(1));
        assert!(bucket > Duration::minutes(1));
        assert_eq!(bucket.num_milliseconds() % 60_000, 0);

        let series = fill_rpm_series(&[], &window, Duration::minutes(1));
        assert!(series.len() as i64 <= MAX_RPM_POINTS + 1, "{}", series.len());
        assert!(series.iter().all(|p| p.count == 0));
    }

    #[test]
    fn extreme_window_stays_bounded() {
        let window = TimeWindow {
            from: DateTime::<Utc>::MIN_UTC,
            to: DateTime::<Utc>::MAX_UTC,
        };
        let series = fill_rpm_series(&[], &window, Duration::minutes(1));
        assert!(series.len() as i64 <= MAX_RPM_POINTS + 1);
    }

    #[test]
    fn latency_bins_are_sorted_and_labelled() {
        let bins = latency_bins(&[(2, 4), (0, 1), (1, 0)], 10.0);
        assert_eq!(
            bins,
            vec![
                LatencyBin {
                    duration: 0.0,
                    count: 1
                },
                LatencyBin {
                    duration: 20.0,
                    count: 4
                },
            ]
        );
    }
}
