//! Projection of explore responses into chart-ready series.
//!
//! Every operation is a pure function of the response, the requested
//! specifications and the optional bucketing context given at construction.

pub mod timeseries;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graphql::explore::{ExploreResponse, ExploreResultRow};
use crate::graphql::specification::{
    AttributeExpression, ExploreSpecification, ExploreSpecificationBuilder,
};
use crate::models::{
    GraphQlTimeRange, GroupData, MetricAggregationType, MetricTimeseriesInterval, TimeDuration,
};

pub use timeseries::zero_filled_intervals;

/// Group name the server uses for everything past the group limit.
pub const OTHER_SERVER_GROUP_NAME: &str = "__Other";
/// Label shown in place of [`OTHER_SERVER_GROUP_NAME`].
pub const OTHER_UI_GROUP_NAME: &str = "Others";
/// Delimiter used when a group key is shown as a single label.
pub const GROUP_KEY_DELIMITER: &str = ",";

/// One group's series, as produced by [`ExploreResult::grouped_timeseries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedTimeseries {
    pub keys: Vec<String>,
    pub intervals: Vec<MetricTimeseriesInterval>,
}

impl GroupedTimeseries {
    pub fn label(&self) -> String {
        self.keys.join(GROUP_KEY_DELIMITER)
    }
}

#[derive(Debug, Clone)]
pub struct ExploreResult {
    response: ExploreResponse,
    interval: Option<TimeDuration>,
    time_range: Option<GraphQlTimeRange>,
    spec_builder: ExploreSpecificationBuilder,
}

impl ExploreResult {
    pub fn new(
        response: ExploreResponse,
        interval: Option<TimeDuration>,
        time_range: Option<GraphQlTimeRange>,
    ) -> Self {
        Self {
            response,
            interval,
            time_range,
            spec_builder: ExploreSpecificationBuilder::new(),
        }
    }

    pub fn time_series_data(
        &self,
        metric_key: &str,
        aggregation: MetricAggregationType,
    ) -> Vec<MetricTimeseriesInterval> {
        self.timeseries(&self.spec_builder.for_key(metric_key, aggregation))
    }

    pub fn grouped_series_data(
        &self,
        group_expressions: &[AttributeExpression],
        metric_key: &str,
        aggregation: MetricAggregationType,
    ) -> Vec<GroupData> {
        self.grouped_series(
            &self.group_specs(group_expressions),
            &self.spec_builder.for_key(metric_key, aggregation),
        )
    }

    pub fn grouped_time_series_data(
        &self,
        group_expressions: &[AttributeExpression],
        metric_key: &str,
        aggregation: MetricAggregationType,
    ) -> Vec<GroupedTimeseries> {
        self.grouped_timeseries(
            &self.group_specs(group_expressions),
            &self.spec_builder.for_key(metric_key, aggregation),
        )
    }

    /// Rows carrying `spec`, projected onto the time axis.
    pub fn timeseries(&self, spec: &ExploreSpecification) -> Vec<MetricTimeseriesInterval> {
        let rows: Vec<&ExploreResultRow> = self.rows_containing(spec).collect();
        self.rows_to_timeseries(&rows, spec)
    }

    /// One entry per row carrying `spec`, in response order. Rows sharing a
    /// key are not merged.
    pub fn grouped_series(
        &self,
        group_specs: &[ExploreSpecification],
        spec: &ExploreSpecification,
    ) -> Vec<GroupData> {
        let alias = spec.result_alias();
        self.rows_containing(spec)
            .map(|row| GroupData {
                keys: group_names(row, group_specs),
                value: row.get(&alias).map(|v| v.as_f64()).unwrap_or_default(),
            })
            .collect()
    }

    /// Partitions every row by its group key and projects each partition
    /// as its own timeseries, in first-seen group order.
    pub fn grouped_timeseries(
        &self,
        group_specs: &[ExploreSpecification],
        spec: &ExploreSpecification,
    ) -> Vec<GroupedTimeseries> {
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut partitions: Vec<(Vec<String>, Vec<&ExploreResultRow>)> = Vec::new();

        for row in &self.response.results {
            let keys = group_names(row, group_specs);
            match index.get(&keys) {
                Some(&position) => partitions[position].1.push(row),
                None => {
                    index.insert(keys.clone(), partitions.len());
                    partitions.push((keys, vec![row]));
                }
            }
        }

        debug!(
            groups = partitions.len(),
            rows = self.response.results.len(),
            alias = %spec.result_alias(),
            "partitioned explore rows"
        );

        partitions
            .into_iter()
            .map(|(keys, rows)| GroupedTimeseries {
                intervals: self.rows_to_timeseries(&rows, spec),
                keys,
            })
            .collect()
    }

    fn group_specs(&self, expressions: &[AttributeExpression]) -> Vec<ExploreSpecification> {
        expressions
            .iter()
            .map(|expression| self.spec_builder.for_attribute_expression(expression))
            .collect()
    }

    fn rows_containing<'a>(
        &'a self,
        spec: &ExploreSpecification,
    ) -> impl Iterator<Item = &'a ExploreResultRow> + 'a {
        let alias = spec.result_alias();
        self.response
            .results
            .iter()
            .filter(move |row| row.contains(&alias))
    }

    fn rows_to_timeseries(
        &self,
        rows: &[&ExploreResultRow],
        spec: &ExploreSpecification,
    ) -> Vec<MetricTimeseriesInterval> {
        let alias = spec.result_alias();
        let intervals: Vec<MetricTimeseriesInterval> = rows
            .iter()
            .filter_map(|row| {
                // No interval marker: the row cannot be placed on the time axis.
                let timestamp = row.interval_start?;
                Some(MetricTimeseriesInterval {
                    timestamp,
                    value: row.get(&alias).map(|v| v.as_f64()).unwrap_or_default(),
                })
            })
            .collect();

        match (&self.interval, &self.time_range) {
            (Some(interval), Some(range)) => zero_filled_intervals(intervals, interval, range),
            _ => intervals,
        }
    }
}

fn group_names(row: &ExploreResultRow, group_specs: &[ExploreSpecification]) -> Vec<String> {
    group_specs
        .iter()
        .map(|spec| {
            let name = row
                .get(&spec.result_alias())
                .map(|value| value.as_label())
                .unwrap_or_default();
            if name == OTHER_SERVER_GROUP_NAME {
                OTHER_UI_GROUP_NAME.to_string()
            } else {
                name
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeUnit;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const CALLS: &str = "sum(numCalls)";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn row(service: &str, calls: i64, secs: i64) -> ExploreResultRow {
        ExploreResultRow::new()
            .with_value("serviceName", service)
            .with_value(CALLS, calls)
            .with_interval_start(at(secs))
    }

    fn service_groups() -> Vec<AttributeExpression> {
        vec![AttributeExpression::new("serviceName")]
    }

    #[test]
    fn test_end_to_end_zero_fill() {
        let response = ExploreResponse::new(vec![
            ExploreResultRow::new().with_value("a", 5).with_interval_start(at(0)),
            ExploreResultRow::new().with_value("a", 7).with_interval_start(at(60)),
        ]);
        let result = ExploreResult::new(
            response,
            Some(TimeDuration::new(60, TimeUnit::Second)),
            Some(GraphQlTimeRange::new(at(0), at(120))),
        );
        let spec = ExploreSpecificationBuilder::new().attribute_for_key("a");

        assert_eq!(
            result.timeseries(&spec),
            vec![
                MetricTimeseriesInterval { timestamp: at(0), value: 5.0 },
                MetricTimeseriesInterval { timestamp: at(60), value: 7.0 },
                MetricTimeseriesInterval { timestamp: at(120), value: 0.0 },
            ]
        );
    }

    #[test]
    fn test_missing_alias_without_interval_is_empty() {
        let response = ExploreResponse::new(vec![row("a", 1, 0), row("b", 2, 60)]);
        let result = ExploreResult::new(response, None, None);

        assert!(result
            .time_series_data("duration", MetricAggregationType::Average)
            .is_empty());
    }

    #[test]
    fn test_missing_alias_with_interval_is_zero_filled() {
        let response = ExploreResponse::new(vec![row("a", 1, 0)]);
        let start = at(1_000_020);
        let result = ExploreResult::new(
            response,
            Some(TimeDuration::new(1, TimeUnit::Minute)),
            Some(GraphQlTimeRange::new(start, start + Duration::minutes(5))),
        );

        let series = result.time_series_data("duration", MetricAggregationType::Average);
        assert_eq!(series.len(), 6);
        assert!(series.iter().all(|p| p.value == 0.0));
    }

    #[test]
    fn test_timeseries_without_context_keeps_response_order() {
        let response = ExploreResponse::new(vec![
            row("a", 3, 120),
            ExploreResultRow::new().with_value("serviceName", "b"),
            row("a", 1, 0),
        ]);
        let result = ExploreResult::new(response, None, None);

        let series = result.time_series_data("numCalls", MetricAggregationType::Sum);
        assert_eq!(
            series,
            vec![
                MetricTimeseriesInterval { timestamp: at(120), value: 3.0 },
                MetricTimeseriesInterval { timestamp: at(0), value: 1.0 },
            ]
        );
    }

    #[test]
    fn test_rows_without_interval_start_are_dropped() {
        let untimed = ExploreResultRow::new()
            .with_value("serviceName", "checkout")
            .with_value(CALLS, 8);
        let response = ExploreResponse::new(vec![row("checkout", 1, 0), untimed, row("cart", 2, 60)]);
        let result = ExploreResult::new(response, None, None);

        let series = result.time_series_data("numCalls", MetricAggregationType::Sum);
        assert_eq!(series.iter().map(|p| p.value).collect::<Vec<_>>(), vec![1.0, 2.0]);

        let groups =
            result.grouped_time_series_data(&service_groups(), "numCalls", MetricAggregationType::Sum);
        assert_eq!(groups[0].keys, vec!["checkout".to_string()]);
        assert_eq!(
            groups[0].intervals,
            vec![MetricTimeseriesInterval { timestamp: at(0), value: 1.0 }]
        );

        let grouped = result.grouped_series_data(&service_groups(), "numCalls", MetricAggregationType::Sum);
        assert_eq!(grouped.len(), 3);
    }

    #[test]
    fn test_grouped_series_preserves_order_and_rewrites_overflow() {
        let response = ExploreResponse::new(vec![
            row("checkout", 4, 0),
            ExploreResultRow::new().with_value("serviceName", "no-metric"),
            row(OTHER_SERVER_GROUP_NAME, 9, 0),
            row("checkout", 2, 60),
        ]);
        let result = ExploreResult::new(response, None, None);

        let series =
            result.grouped_series_data(&service_groups(), "numCalls", MetricAggregationType::Sum);

        assert_eq!(
            series,
            vec![
                GroupData { keys: vec!["checkout".into()], value: 4.0 },
                GroupData { keys: vec![OTHER_UI_GROUP_NAME.into()], value: 9.0 },
                GroupData { keys: vec!["checkout".into()], value: 2.0 },
            ]
        );
    }

    #[test]
    fn test_grouped_timeseries_partitions_every_row() {
        let rows = vec![
            row("checkout", 1, 0),
            row("cart", 2, 0),
            row("checkout", 3, 60),
            row(OTHER_SERVER_GROUP_NAME, 4, 60),
        ];
        let total = rows.len();
        let result = ExploreResult::new(ExploreResponse::new(rows), None, None);

        let groups =
            result.grouped_time_series_data(&service_groups(), "numCalls", MetricAggregationType::Sum);

        let keys: Vec<Vec<String>> = groups.iter().map(|g| g.keys.clone()).collect();
        assert_eq!(
            keys,
            vec![
                vec!["checkout".to_string()],
                vec!["cart".to_string()],
                vec![OTHER_UI_GROUP_NAME.to_string()],
            ]
        );
        let projected: usize = groups.iter().map(|g| g.intervals.len()).sum();
        assert_eq!(projected, total);
        assert_eq!(groups[0].intervals[1].value, 3.0);
    }

    #[test]
    fn test_grouped_timeseries_zero_fills_each_group() {
        let rows = vec![row("checkout", 1, 0), row("cart", 2, 120)];
        let result = ExploreResult::new(
            ExploreResponse::new(rows),
            Some(TimeDuration::new(1, TimeUnit::Minute)),
            Some(GraphQlTimeRange::new(at(0), at(120))),
        );

        let groups =
            result.grouped_time_series_data(&service_groups(), "numCalls", MetricAggregationType::Sum);

        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert_eq!(group.intervals.len(), 3);
        }
        let values: Vec<f64> = groups[1].intervals.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_multi_key_groups_keep_delimiter_values_apart() {
        let groups = vec![
            AttributeExpression::new("serviceName"),
            AttributeExpression::new("apiName"),
        ];
        let rows = vec![
            row("a,b", 1, 0).with_value("apiName", "c"),
            row("a", 2, 0).with_value("apiName", "b,c"),
        ];
        let result = ExploreResult::new(ExploreResponse::new(rows), None, None);

        let series =
            result.grouped_time_series_data(&groups, "numCalls", MetricAggregationType::Sum);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].keys, vec!["a,b".to_string(), "c".to_string()]);
        assert_eq!(series[0].label(), series[1].label());
    }
}
