use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::graphql::specification::ExploreSpecificationBuilder;
use crate::graphql::trace::{Trace, TraceRequest, TraceType};
use crate::graphql::QueryTransport;
use crate::models::GraphQlTimeRange;
use crate::Result;

const TRACE_ATTRIBUTES: [&str; 5] = ["serviceName", "protocol", "apiName", "startTime", "duration"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTraceDetails {
    pub id: String,
    pub trace_type: TraceType,
    pub time_string: String,
    pub title_string: String,
}

/// Header data for the API trace detail page.
pub struct ApiTraceDetailService<T> {
    transport: Arc<T>,
    spec_builder: ExploreSpecificationBuilder,
}

impl<T: QueryTransport> ApiTraceDetailService<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            spec_builder: ExploreSpecificationBuilder::new(),
        }
    }

    pub async fn fetch_trace_details(
        &self,
        trace_id: &str,
        time_range: GraphQlTimeRange,
    ) -> Result<ApiTraceDetails> {
        let request = TraceRequest {
            trace_type: TraceType::Api,
            trace_id: trace_id.to_string(),
            time_range,
            trace_properties: TRACE_ATTRIBUTES
                .iter()
                .map(|key| self.spec_builder.attribute_for_key(key))
                .collect(),
            span_properties: Vec::new(),
            span_limit: 1,
        };

        let trace = self.transport.trace(&request).await?;
        let duration = self.transport.attribute(trace.trace_type, "duration").await?;
        info!("Loaded trace details for {}", trace.id);

        Ok(ApiTraceDetails {
            id: trace.id.clone(),
            trace_type: TraceType::Api,
            time_string: build_time_string(&trace, &duration.units),
            title_string: build_title_string(&trace),
        })
    }
}

fn build_time_string(trace: &Trace, units: &str) -> String {
    let start = match trace.attribute("startTime") {
        Some(Value::Number(millis)) => millis
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(|start| start.format("%-d %b %Y %-I:%M:%S %p").to_string()),
        _ => None,
    }
    .unwrap_or_else(|| trace.attribute_text("startTime"));

    format!("{} for {} {}", start, trace.attribute_text("duration"), units)
}

fn build_title_string(trace: &Trace) -> String {
    format!(
        "{} {} {}",
        trace.attribute_text("serviceName"),
        trace.attribute_text("protocol"),
        trace.attribute_text("apiName")
    )
}
