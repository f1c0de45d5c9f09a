use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graphql::specification::{graphql_string, selection_alias, ExploreSpecification};
use crate::models::GraphQlTimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceType {
    Api,
    Backend,
}

impl TraceType {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceType::Api => "API",
            TraceType::Backend => "BACKEND",
        }
    }

    /// Attribute scope the metadata for this trace type lives under.
    pub fn attribute_scope(self) -> &'static str {
        match self {
            TraceType::Api => "API_TRACE",
            TraceType::Backend => "BACKEND_TRACE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRequest {
    pub trace_type: TraceType,
    pub trace_id: String,
    pub time_range: GraphQlTimeRange,
    pub trace_properties: Vec<ExploreSpecification>,
    #[serde(default)]
    pub span_properties: Vec<ExploreSpecification>,
    pub span_limit: u32,
}

impl TraceRequest {
    pub fn to_graphql_document(&self) -> String {
        let attributes = |specs: &[ExploreSpecification]| {
            specs
                .iter()
                .enumerate()
                .map(|(index, spec)| {
                    format!(
                        "{}: attribute(expression: {})",
                        selection_alias(index),
                        spec.expression.as_graphql_argument()
                    )
                })
                .collect::<Vec<_>>()
                .join(" ")
        };

        format!(
            "{{ trace(type: {}, id: {}, timeRange: {}) {{ id type {} spans(limit: {}) {{ results {{ id {} }} }} }} }}",
            self.trace_type.as_str(),
            graphql_string(&self.trace_id),
            self.time_range.as_graphql_argument(),
            attributes(&self.trace_properties),
            self.span_limit,
            attributes(&self.span_properties)
        )
    }

    pub fn trace_alias_lookup(&self) -> HashMap<String, String> {
        alias_lookup(&self.trace_properties)
    }

    pub fn span_alias_lookup(&self) -> HashMap<String, String> {
        alias_lookup(&self.span_properties)
    }
}

fn alias_lookup(specs: &[ExploreSpecification]) -> HashMap<String, String> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| (selection_alias(index), spec.result_alias()))
        .collect()
}

fn rename_keys(attributes: &mut serde_json::Map<String, Value>, lookup: &HashMap<String, String>) {
    *attributes = std::mem::take(attributes)
        .into_iter()
        .map(|(key, value)| match lookup.get(&key) {
            Some(original) => (original.clone(), value),
            None => (key, value),
        })
        .collect();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    #[serde(rename = "type")]
    pub trace_type: TraceType,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Trace {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Rewrites positional aliases on the trace and on each span back to
    /// result aliases.
    pub fn restore_aliases(mut self, request: &TraceRequest) -> Self {
        let trace_lookup = request.trace_alias_lookup();
        self.attributes = std::mem::take(&mut self.attributes)
            .into_iter()
            .map(|(key, value)| match trace_lookup.get(&key) {
                Some(original) => (original.clone(), value),
                None => (key, value),
            })
            .collect();

        let span_lookup = request.span_alias_lookup();
        let spans = self
            .attributes
            .get_mut("spans")
            .and_then(|spans| spans.get_mut("results"))
            .and_then(Value::as_array_mut);
        for span in spans.into_iter().flatten() {
            if let Some(span) = span.as_object_mut() {
                rename_keys(span, &span_lookup);
            }
        }
        self
    }

    /// Attribute rendered for display; strings lose their quotes, absent is empty.
    pub fn attribute_text(&self, key: &str) -> String {
        match self.attribute(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMetadata {
    pub name: String,
    #[serde(default)]
    pub units: String,
}

pub fn attributes_document(scope: &str) -> String {
    format!("{{ attributes(scope: {}) {{ results {{ name units }} }} }}", scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::specification::ExploreSpecificationBuilder;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn request() -> TraceRequest {
        let builder = ExploreSpecificationBuilder::new();
        TraceRequest {
            trace_type: TraceType::Api,
            trace_id: "abc".to_string(),
            time_range: GraphQlTimeRange::new(
                Utc.timestamp_opt(0, 0).unwrap(),
                Utc.timestamp_opt(60, 0).unwrap(),
            ),
            trace_properties: vec![
                builder.attribute_for_key("serviceName"),
                builder.attribute_for_key("tags_env"),
            ],
            span_properties: vec![builder.attribute_for_key("tags.env")],
            span_limit: 1,
        }
    }

    #[test]
    fn test_trace_document() {
        let document = request().to_graphql_document();

        assert!(document.starts_with("{ trace(type: API, id: \"abc\""));
        assert!(document.contains("s0: attribute(expression: {key: \"serviceName\"})"));
        assert!(document.contains("spans(limit: 1) { results { id s0: attribute(expression: {key: \"tags.env\"}) } }"));
    }

    #[test]
    fn test_trace_id_is_escaped() {
        let mut request = request();
        request.trace_id = "abc\") { secrets } x(id: \"".to_string();

        let document = request.to_graphql_document();
        assert!(document.contains("id: \"abc\\\") { secrets } x(id: \\\"\", timeRange"));
    }

    #[test]
    fn test_restore_trace_aliases() {
        let trace: Trace = serde_json::from_value(json!({
            "id": "t-1",
            "type": "API",
            "s0": "frontend",
            "s1": "prod",
            "spans": { "results": [{ "id": "span-1", "s0": "staging" }] }
        }))
        .unwrap();

        let trace = trace.restore_aliases(&request());

        assert_eq!(trace.attribute_text("serviceName"), "frontend");
        assert_eq!(trace.attribute_text("tags_env"), "prod");
        assert_eq!(
            trace.attribute("spans").unwrap()["results"][0]["tags.env"],
            json!("staging")
        );
    }

    #[test]
    fn test_trace_attributes_flatten() {
        let trace: Trace = serde_json::from_value(json!({
            "id": "t-1",
            "type": "API",
            "serviceName": "frontend",
            "duration": 42
        }))
        .unwrap();

        assert_eq!(trace.trace_type, TraceType::Api);
        assert_eq!(trace.attribute_text("serviceName"), "frontend");
        assert_eq!(trace.attribute_text("duration"), "42");
        assert_eq!(trace.attribute_text("missing"), "");
    }
}
