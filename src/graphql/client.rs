use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::graphql::entities::{EntitiesRequest, EntitiesResponse};
use crate::graphql::explore::{ExploreRequest, ExploreResponse};
use crate::graphql::topology::{TopologyRequest, TopologyResponse};
use crate::graphql::trace::{attributes_document, AttributeMetadata, Trace, TraceRequest, TraceType};
use crate::metrics;
use crate::{DashboardError, Result};

/// Sends queries to the tracing backend. Retries, caching and deduplication
/// are the implementor's business.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn explore(&self, request: &ExploreRequest) -> Result<ExploreResponse>;

    async fn trace(&self, request: &TraceRequest) -> Result<Trace>;

    async fn attribute(&self, trace_type: TraceType, key: &str) -> Result<AttributeMetadata>;

    async fn entities(&self, request: &EntitiesRequest) -> Result<EntitiesResponse>;

    async fn topology(&self, request: &TopologyRequest) -> Result<TopologyResponse>;
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AttributeResults {
    results: Vec<AttributeMetadata>,
}

#[derive(Debug, Clone)]
pub struct GraphQlClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphQlClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn query<T: DeserializeOwned>(&self, operation: &str, document: String) -> Result<T> {
        let _timer = metrics::start_query_timer(operation);
        debug!("Sending {} query: {}", operation, document);

        let envelope: GraphQlEnvelope = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": document }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_envelope(operation, envelope)
    }
}

fn decode_envelope<T: DeserializeOwned>(operation: &str, envelope: GraphQlEnvelope) -> Result<T> {
    if !envelope.errors.is_empty() {
        let messages: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();
        warn!("{} query failed: {}", operation, messages.join("; "));
        return Err(DashboardError::GraphQl(messages.join("; ")));
    }

    let payload = envelope
        .data
        .and_then(|mut data| data.get_mut(operation).map(Value::take))
        .filter(|payload| !payload.is_null())
        .ok_or_else(|| DashboardError::NotFound(format!("No {} in response", operation)))?;

    Ok(serde_json::from_value(payload)?)
}

#[async_trait]
impl QueryTransport for GraphQlClient {
    async fn explore(&self, request: &ExploreRequest) -> Result<ExploreResponse> {
        let response: ExploreResponse = self.query("explore", request.to_graphql_document()?).await?;
        info!("Explore query returned {} rows", response.results.len());
        Ok(response.restore_aliases(&request.alias_lookup()))
    }

    async fn trace(&self, request: &TraceRequest) -> Result<Trace> {
        let trace: Trace = self.query("trace", request.to_graphql_document()).await?;
        Ok(trace.restore_aliases(request))
    }

    async fn attribute(&self, trace_type: TraceType, key: &str) -> Result<AttributeMetadata> {
        let attributes: AttributeResults = self
            .query("attributes", attributes_document(trace_type.attribute_scope()))
            .await?;

        attributes
            .results
            .into_iter()
            .find(|attribute| attribute.name == key)
            .ok_or_else(|| DashboardError::NotFound(format!("Attribute {} not found", key)))
    }

    async fn entities(&self, request: &EntitiesRequest) -> Result<EntitiesResponse> {
        let response: EntitiesResponse = self.query("entities", request.to_graphql_document()).await?;
        info!("Entities query returned {} rows", response.results.len());
        Ok(response.restore_aliases(&request.alias_lookup()))
    }

    async fn topology(&self, request: &TopologyRequest) -> Result<TopologyResponse> {
        let payload: Value = self.query("entities", request.to_graphql_document()).await?;
        let topology = TopologyResponse::from_graphql(payload, request)?;
        info!(
            "Topology query returned {} nodes and {} edges",
            topology.nodes.len(),
            topology.edges.len()
        );
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(value: Value) -> GraphQlEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_explore_payload() {
        let response: ExploreResponse = decode_envelope(
            "explore",
            envelope(json!({
                "data": { "explore": { "results": [
                    { "s0": { "value": 4 }, "__intervalStart": 0 }
                ] } }
            })),
        )
        .unwrap();

        assert_eq!(response.results.len(), 1);
        assert!(response.results[0].interval_start.is_some());
    }

    #[test]
    fn test_errors_take_precedence() {
        let result: Result<ExploreResponse> = decode_envelope(
            "explore",
            envelope(json!({
                "data": null,
                "errors": [{ "message": "bad field" }, { "message": "bad arg" }]
            })),
        );

        match result {
            Err(DashboardError::GraphQl(message)) => assert_eq!(message, "bad field; bad arg"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_entities_payload() {
        let response: EntitiesResponse = decode_envelope(
            "entities",
            envelope(json!({
                "data": { "entities": { "results": [{ "id": { "value": "e-1" }, "s0": { "value": "cart" } }] } }
            })),
        )
        .unwrap();

        assert_eq!(response.results.len(), 1);
        assert!(response.results[0].contains("s0"));
    }

    #[test]
    fn test_missing_operation_is_not_found() {
        let result: Result<Trace> =
            decode_envelope("trace", envelope(json!({ "data": { "trace": null } })));
        assert!(matches!(result, Err(DashboardError::NotFound(_))));
    }

    #[test]
    fn test_client_keeps_endpoint() {
        let client = GraphQlClient::new("http://localhost:2020/graphql", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:2020/graphql");
    }
}
