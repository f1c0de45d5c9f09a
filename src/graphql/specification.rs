use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::MetricAggregationType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeExpression {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl AttributeExpression {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            subpath: None,
        }
    }

    pub fn with_subpath(key: impl Into<String>, subpath: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            subpath: Some(subpath.into()),
        }
    }

    pub(crate) fn as_graphql_argument(&self) -> String {
        match &self.subpath {
            Some(subpath) => format!(
                "{{key: {}, subpath: {}}}",
                graphql_string(&self.key),
                graphql_string(subpath)
            ),
            None => format!("{{key: {}}}", graphql_string(&self.key)),
        }
    }
}

impl fmt::Display for AttributeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subpath {
            Some(subpath) => write!(f, "{}.{}", self.key, subpath),
            None => write!(f, "{}", self.key),
        }
    }
}

/// A requested column: either a plain attribute or an aggregated metric.
///
/// The alias links the selection sent to the server with the value read back
/// from each result row. Two specifications are equal when their aliases are.
/// Callers must not mix specifications whose aliases collide in one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreSpecification {
    pub name: String,
    pub expression: AttributeExpression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<MetricAggregationType>,
}

impl ExploreSpecification {
    pub fn result_alias(&self) -> String {
        match self.aggregation {
            Some(aggregation) => format!("{}({})", aggregation.as_str(), self.expression),
            None => self.expression.to_string(),
        }
    }

    /// Renders the selection under `alias`, which must be a valid GraphQL name
    /// (see [`selection_alias`]).
    pub fn as_graphql_selection(&self, alias: &str) -> String {
        let mut arguments = vec![format!("expression: {}", self.expression.as_graphql_argument())];
        if let Some(aggregation) = self.aggregation {
            arguments.push(format!("aggregation: {}", aggregation.graphql_name()));
            arguments.extend(aggregation.graphql_arguments());
        }

        format!(
            "{}: selection({}) {{ value type }}",
            alias,
            arguments.join(", ")
        )
    }
}

impl PartialEq for ExploreSpecification {
    fn eq(&self, other: &Self) -> bool {
        self.result_alias() == other.result_alias()
    }
}

impl Eq for ExploreSpecification {}

impl Hash for ExploreSpecification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.result_alias().hash(state);
    }
}

/// GraphQL alias for the selection at `index` in a request. Result aliases
/// such as `avg(duration)` are not valid GraphQL names, so requests alias by
/// position and map the position back to the result alias when decoding.
pub fn selection_alias(index: usize) -> String {
    format!("s{}", index)
}

/// Quotes `value` as a GraphQL string literal.
pub fn graphql_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Whether `value` matches `[_A-Za-z][_0-9A-Za-z]*`, the shape of GraphQL
/// names and enum values.
pub fn is_graphql_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .map_or(false, |first| first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExploreSpecificationBuilder;

impl ExploreSpecificationBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn for_key(&self, key: &str, aggregation: MetricAggregationType) -> ExploreSpecification {
        ExploreSpecification {
            name: key.to_string(),
            expression: AttributeExpression::new(key),
            aggregation: Some(aggregation),
        }
    }

    pub fn for_attribute_expression(&self, expression: &AttributeExpression) -> ExploreSpecification {
        ExploreSpecification {
            name: expression.key.clone(),
            expression: expression.clone(),
            aggregation: None,
        }
    }

    pub fn attribute_for_key(&self, key: &str) -> ExploreSpecification {
        self.for_attribute_expression(&AttributeExpression::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_aliases() {
        let builder = ExploreSpecificationBuilder::new();

        assert_eq!(
            builder.for_key("duration", MetricAggregationType::Average).result_alias(),
            "avg(duration)"
        );
        assert_eq!(builder.attribute_for_key("serviceName").result_alias(), "serviceName");
        assert_eq!(
            builder
                .for_attribute_expression(&AttributeExpression::with_subpath("tags", "env"))
                .result_alias(),
            "tags.env"
        );
    }

    #[test]
    fn test_equality_is_by_alias() {
        let builder = ExploreSpecificationBuilder::new();
        let mut renamed = builder.for_key("calls", MetricAggregationType::Sum);
        renamed.name = "Calls".to_string();

        assert_eq!(renamed, builder.for_key("calls", MetricAggregationType::Sum));
        assert_ne!(renamed, builder.for_key("calls", MetricAggregationType::Count));
    }

    #[test]
    fn test_selection_rendering() {
        let spec = ExploreSpecificationBuilder::new().for_key("duration", MetricAggregationType::P99);

        assert_eq!(
            spec.as_graphql_selection(&selection_alias(0)),
            "s0: selection(expression: {key: \"duration\"}, aggregation: PERCENTILE, size: 99) { value type }"
        );
    }

    #[test]
    fn test_expression_strings_are_escaped() {
        let spec = ExploreSpecificationBuilder::new().for_attribute_expression(
            &AttributeExpression::with_subpath("tags\"}) { injected }", "a\\b"),
        );

        assert_eq!(
            spec.as_graphql_selection("s1"),
            "s1: selection(expression: {key: \"tags\\\"}) { injected }\", subpath: \"a\\\\b\"}) { value type }"
        );
    }

    #[test]
    fn test_graphql_names() {
        assert!(is_graphql_name("API_TRACE"));
        assert!(is_graphql_name("_s0"));
        assert!(!is_graphql_name(""));
        assert!(!is_graphql_name("9lives"));
        assert!(!is_graphql_name("API_TRACE) { x }"));
    }
}
