use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{GraphQlTimeRange, MetricTimeseriesInterval, TimeDuration};

/// Number of buckets `bucket_timestamps` would produce, `None` when the
/// interval is not positive or does not fit in milliseconds.
pub fn bucket_count(interval: &TimeDuration, range: &GraphQlTimeRange) -> Option<u64> {
    let step = interval.to_millis().filter(|millis| *millis > 0)?;
    if range.to < range.from {
        return Some(0);
    }
    let span = (range.to - range.from).num_milliseconds();
    u64::try_from(span / step).ok().map(|count| count + 1)
}

/// Bucket starts from `range.from` through `range.to` inclusive.
pub fn bucket_timestamps(interval: &TimeDuration, range: &GraphQlTimeRange) -> Vec<DateTime<Utc>> {
    let step = match interval.to_duration() {
        Some(step) if step > Duration::zero() => step,
        _ => return Vec::new(),
    };
    if range.to < range.from {
        return Vec::new();
    }

    let mut buckets = Vec::new();
    let mut current = Some(range.from);
    while let Some(bucket) = current.filter(|bucket| *bucket <= range.to) {
        buckets.push(bucket);
        current = bucket.checked_add_signed(step);
    }
    buckets
}

/// Densifies `intervals` to one entry per bucket, filling gaps with zero.
///
/// Points that do not sit exactly on a bucket start are dropped. When the same
/// bucket appears twice, the later point wins.
pub fn zero_filled_intervals(
    intervals: Vec<MetricTimeseriesInterval>,
    interval: &TimeDuration,
    range: &GraphQlTimeRange,
) -> Vec<MetricTimeseriesInterval> {
    if !matches!(interval.to_millis(), Some(millis) if millis > 0) {
        return intervals;
    }

    let by_timestamp: HashMap<DateTime<Utc>, f64> = intervals
        .into_iter()
        .map(|point| (point.timestamp, point.value))
        .collect();

    bucket_timestamps(interval, range)
        .into_iter()
        .map(|timestamp| MetricTimeseriesInterval {
            timestamp,
            value: by_timestamp.get(&timestamp).copied().unwrap_or(0.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeUnit;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_single_point_fills_whole_range() {
        let start = at(1_600_000_000);
        let range = GraphQlTimeRange::new(start, start + Duration::minutes(5));
        let points = vec![MetricTimeseriesInterval {
            timestamp: start + Duration::minutes(2),
            value: 9.0,
        }];

        let filled = zero_filled_intervals(points, &TimeDuration::new(1, TimeUnit::Minute), &range);

        assert_eq!(filled.len(), 6);
        assert_eq!(filled.iter().filter(|p| p.value == 0.0).count(), 5);
        assert_eq!(filled[2].value, 9.0);
        assert_eq!(filled[5].timestamp, start + Duration::minutes(5));
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let range = GraphQlTimeRange::new(at(0), at(120));
        let filled = zero_filled_intervals(Vec::new(), &TimeDuration::new(60, TimeUnit::Second), &range);

        let timestamps: Vec<_> = filled.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![at(0), at(60), at(120)]);
        assert!(filled.iter().all(|p| p.value == 0.0));
    }

    #[test]
    fn test_zero_interval_passes_through() {
        let points = vec![MetricTimeseriesInterval { timestamp: at(7), value: 1.0 }];
        let range = GraphQlTimeRange::new(at(0), at(60));

        let filled = zero_filled_intervals(points.clone(), &TimeDuration::new(0, TimeUnit::Second), &range);
        assert_eq!(filled, points);
    }

    #[test]
    fn test_oversized_interval_yields_single_bucket() {
        let range = GraphQlTimeRange::new(at(0), at(120));
        let interval = TimeDuration::new(1_000_000_000, TimeUnit::Day);
        let points = vec![MetricTimeseriesInterval { timestamp: at(0), value: 4.0 }];

        let filled = zero_filled_intervals(points, &interval, &range);

        assert_eq!(filled, vec![MetricTimeseriesInterval { timestamp: at(0), value: 4.0 }]);
        assert_eq!(bucket_count(&interval, &range), Some(1));
    }

    #[test]
    fn test_step_past_max_datetime_stops() {
        let end = DateTime::<Utc>::MAX_UTC;
        let range = GraphQlTimeRange::new(end - Duration::days(1), end);
        let buckets = bucket_timestamps(&TimeDuration::new(1, TimeUnit::Hour), &range);

        assert_eq!(buckets.len(), 25);
        assert_eq!(buckets.last(), Some(&end));
    }

    #[test]
    fn test_unrepresentable_interval_passes_through() {
        let points = vec![MetricTimeseriesInterval { timestamp: at(7), value: 1.0 }];
        let range = GraphQlTimeRange::new(at(0), at(60));
        let interval = TimeDuration::new(u64::MAX, TimeUnit::Day);

        assert_eq!(zero_filled_intervals(points.clone(), &interval, &range), points);
        assert_eq!(bucket_count(&interval, &range), None);
    }

    #[test]
    fn test_bucket_count_matches_buckets() {
        let range = GraphQlTimeRange::new(at(0), at(300));
        let interval = TimeDuration::new(1, TimeUnit::Minute);

        assert_eq!(bucket_count(&interval, &range), Some(6));
        assert_eq!(bucket_timestamps(&interval, &range).len(), 6);
    }

    #[test]
    fn test_inverted_range_has_no_buckets() {
        let range = GraphQlTimeRange::new(at(60), at(0));
        assert!(bucket_timestamps(&TimeDuration::new(1, TimeUnit::Second), &range).is_empty());
    }
}
