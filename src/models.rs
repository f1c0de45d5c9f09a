use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    fn millis(self) -> i64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }

    pub fn graphql_name(self) -> &'static str {
        match self {
            TimeUnit::Millisecond => "MILLISECONDS",
            TimeUnit::Second => "SECONDS",
            TimeUnit::Minute => "MINUTES",
            TimeUnit::Hour => "HOURS",
            TimeUnit::Day => "DAYS",
        }
    }
}

/// A bucket width, e.g. `1 minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeDuration {
    pub value: u64,
    pub unit: TimeUnit,
}

impl TimeDuration {
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Width in milliseconds, `None` when it does not fit an `i64`.
    pub fn to_millis(&self) -> Option<i64> {
        i64::try_from(self.value)
            .ok()
            .and_then(|value| value.checked_mul(self.unit.millis()))
    }

    pub fn to_duration(&self) -> Option<Duration> {
        self.to_millis().map(Duration::milliseconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlTimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl GraphQlTimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Renders the `timeRange` argument of a query.
    pub fn as_graphql_argument(&self) -> String {
        format!(
            "{{startTime: \"{}\", endTime: \"{}\"}}",
            self.from.to_rfc3339(),
            self.to.to_rfc3339()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricAggregationType {
    Sum,
    #[serde(rename = "avg")]
    Average,
    Min,
    Max,
    Count,
    #[serde(rename = "avgrate_sec")]
    AvgrateSecond,
    #[serde(rename = "avgrate_min")]
    AvgrateMinute,
    P99,
    P95,
    P90,
    P50,
    #[serde(rename = "distinctcount")]
    DistinctCount,
}

impl MetricAggregationType {
    /// Name used in result aliases, e.g. `avg(duration)`.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricAggregationType::Sum => "sum",
            MetricAggregationType::Average => "avg",
            MetricAggregationType::Min => "min",
            MetricAggregationType::Max => "max",
            MetricAggregationType::Count => "count",
            MetricAggregationType::AvgrateSecond => "avgrate_sec",
            MetricAggregationType::AvgrateMinute => "avgrate_min",
            MetricAggregationType::P99 => "p99",
            MetricAggregationType::P95 => "p95",
            MetricAggregationType::P90 => "p90",
            MetricAggregationType::P50 => "p50",
            MetricAggregationType::DistinctCount => "distinctcount",
        }
    }

    /// Server-side aggregation enum value.
    pub fn graphql_name(self) -> &'static str {
        match self {
            MetricAggregationType::Sum => "SUM",
            MetricAggregationType::Average => "AVG",
            MetricAggregationType::Min => "MIN",
            MetricAggregationType::Max => "MAX",
            MetricAggregationType::Count => "COUNT",
            MetricAggregationType::AvgrateSecond | MetricAggregationType::AvgrateMinute => "AVGRATE",
            MetricAggregationType::P99
            | MetricAggregationType::P95
            | MetricAggregationType::P90
            | MetricAggregationType::P50 => "PERCENTILE",
            MetricAggregationType::DistinctCount => "DISTINCT_COUNT",
        }
    }

    /// Extra selection arguments some aggregations carry (percentile size, rate units).
    pub fn graphql_arguments(self) -> Option<String> {
        match self {
            MetricAggregationType::P99 => Some("size: 99".to_string()),
            MetricAggregationType::P95 => Some("size: 95".to_string()),
            MetricAggregationType::P90 => Some("size: 90".to_string()),
            MetricAggregationType::P50 => Some("size: 50".to_string()),
            MetricAggregationType::AvgrateSecond => Some("units: SECONDS, size: 1".to_string()),
            MetricAggregationType::AvgrateMinute => Some("units: MINUTES, size: 1".to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTimeseriesInterval {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupData {
    pub keys: Vec<String>,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_duration_conversion() {
        assert_eq!(TimeDuration::new(1, TimeUnit::Minute).to_millis(), Some(60_000));
        assert_eq!(
            TimeDuration::new(15, TimeUnit::Second).to_duration(),
            Some(Duration::seconds(15))
        );
    }

    #[test]
    fn test_unrepresentable_duration() {
        assert_eq!(TimeDuration::new(u64::MAX, TimeUnit::Millisecond).to_millis(), None);
        assert_eq!(TimeDuration::new(i64::MAX as u64, TimeUnit::Day).to_duration(), None);
    }

    #[test]
    fn test_aggregation_names() {
        assert_eq!(MetricAggregationType::Average.as_str(), "avg");
        assert_eq!(MetricAggregationType::P99.graphql_name(), "PERCENTILE");
        let parsed: MetricAggregationType = serde_json::from_str("\"avgrate_sec\"").unwrap();
        assert_eq!(parsed, MetricAggregationType::AvgrateSecond);
    }
}
