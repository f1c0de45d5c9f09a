use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    api::AppState,
    graphql::{
        explore::{ExploreRequest, GraphQlFilter},
        topology::{TopologyDataSource, TopologyResponse},
        AttributeExpression, EntitiesValuesDataSource, ExploreResponse,
    },
    metrics::{self, RequestTimer},
    models::{GraphQlTimeRange, GroupData, MetricAggregationType, MetricTimeseriesInterval, TimeDuration},
    projection::{timeseries::bucket_count, ExploreResult, GroupedTimeseries},
    DashboardError, Result,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectionRequest {
    pub response: ExploreResponse,
    pub metric: String,
    pub aggregation: MetricAggregationType,
    #[serde(default)]
    pub group_by: Vec<AttributeExpression>,
    #[serde(default)]
    pub interval: Option<TimeDuration>,
    #[serde(default)]
    pub time_range: Option<GraphQlTimeRange>,
}

impl ProjectionRequest {
    fn check_bucket_budget(&self, max_buckets: u64) -> Result<()> {
        match (&self.interval, &self.time_range) {
            (Some(interval), Some(range)) => ensure_bucket_budget(interval, range, max_buckets),
            _ => Ok(()),
        }
    }

    fn into_result(self) -> (ExploreResult, Vec<AttributeExpression>, String, MetricAggregationType) {
        let result = ExploreResult::new(self.response, self.interval, self.time_range);
        (result, self.group_by, self.metric, self.aggregation)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExploreTimeseriesRequest {
    pub request: ExploreRequest,
    pub metric: String,
    pub aggregation: MetricAggregationType,
    #[serde(default)]
    pub group_by: Vec<AttributeExpression>,
}

/// Rejects requests whose zero-fill would exceed `max_buckets` buckets per series.
fn ensure_bucket_budget(
    interval: &TimeDuration,
    range: &GraphQlTimeRange,
    max_buckets: u64,
) -> Result<()> {
    match bucket_count(interval, range) {
        Some(count) if count > max_buckets => Err(DashboardError::InvalidRequest(format!(
            "{} buckets requested, limit is {}",
            count, max_buckets
        ))),
        _ => Ok(()),
    }
}

pub async fn timeseries(
    State(state): State<AppState>,
    Json(request): Json<ProjectionRequest>,
) -> Result<Json<Vec<MetricTimeseriesInterval>>> {
    let _timer = RequestTimer::new("projection_timeseries");
    request.check_bucket_budget(state.max_buckets)?;
    metrics::record_projected_rows("timeseries", request.response.results.len());

    let (result, _, metric, aggregation) = request.into_result();
    Ok(Json(result.time_series_data(&metric, aggregation)))
}

pub async fn grouped_series(Json(request): Json<ProjectionRequest>) -> Result<Json<Vec<GroupData>>> {
    let _timer = RequestTimer::new("projection_grouped_series");
    metrics::record_projected_rows("grouped_series", request.response.results.len());

    let (result, group_by, metric, aggregation) = request.into_result();
    Ok(Json(result.grouped_series_data(&group_by, &metric, aggregation)))
}

pub async fn grouped_timeseries(
    State(state): State<AppState>,
    Json(request): Json<ProjectionRequest>,
) -> Result<Json<Vec<GroupedTimeseries>>> {
    let _timer = RequestTimer::new("projection_grouped_timeseries");
    request.check_bucket_budget(state.max_buckets)?;
    metrics::record_projected_rows("grouped_timeseries", request.response.results.len());

    let (result, group_by, metric, aggregation) = request.into_result();
    Ok(Json(result.grouped_time_series_data(&group_by, &metric, aggregation)))
}

/// Runs an explore query against the backend and returns one series per group.
/// Without `group_by` the whole response comes back as a single group with no keys.
pub async fn explore_timeseries(
    State(state): State<AppState>,
    Json(body): Json<ExploreTimeseriesRequest>,
) -> Result<Json<Vec<GroupedTimeseries>>> {
    let _timer = RequestTimer::new("explore_timeseries");
    if let Some(interval) = &body.request.interval {
        ensure_bucket_budget(interval, &body.request.time_range, state.max_buckets)?;
    }
    info!(
        "Exploring {} {} over {} selections",
        body.aggregation.as_str(),
        body.metric,
        body.request.selections.len()
    );

    let response = state.transport.explore(&body.request).await?;
    metrics::record_projected_rows("explore_timeseries", response.results.len());

    let result = ExploreResult::new(response, body.request.interval, Some(body.request.time_range));
    if body.group_by.is_empty() {
        return Ok(Json(vec![GroupedTimeseries {
            keys: Vec::new(),
            intervals: result.time_series_data(&body.metric, body.aggregation),
        }]));
    }

    Ok(Json(result.grouped_time_series_data(
        &body.group_by,
        &body.metric,
        body.aggregation,
    )))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntityValuesRequest {
    pub data_source: EntitiesValuesDataSource,
    pub time_range: GraphQlTimeRange,
    #[serde(default)]
    pub filters: Vec<GraphQlFilter>,
}

pub async fn entity_values(
    State(state): State<AppState>,
    Json(body): Json<EntityValuesRequest>,
) -> Result<Json<Vec<serde_json::Value>>> {
    let _timer = RequestTimer::new("entity_values");
    let values = body
        .data_source
        .fetch_values(state.transport.as_ref(), body.time_range, body.filters)
        .await?;
    Ok(Json(values))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopologyQuery {
    pub data_source: TopologyDataSource,
    pub time_range: GraphQlTimeRange,
    #[serde(default)]
    pub filters: Vec<GraphQlFilter>,
}

pub async fn topology(
    State(state): State<AppState>,
    Json(body): Json<TopologyQuery>,
) -> Result<Json<TopologyResponse>> {
    let _timer = RequestTimer::new("topology");
    let topology = body
        .data_source
        .fetch_topology(state.transport.as_ref(), body.time_range, body.filters)
        .await?;
    Ok(Json(topology))
}

pub async fn prometheus_metrics() -> String {
    metrics::gather()
}
