use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graphql::specification::{
    graphql_string, is_graphql_name, selection_alias, ExploreSpecification,
};
use crate::models::{GraphQlTimeRange, TimeDuration};
use crate::{DashboardError, Result};

/// Row key carrying the start of the interval a row was aggregated over.
pub const GQL_EXPLORE_RESULT_INTERVAL_KEY: &str = "__intervalStart";

/// A single selected value as returned by the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultValue {
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl ResultValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            value_type: None,
        }
    }

    /// Numeric view of the value. Unparseable strings and nulls read as zero.
    pub fn as_f64(&self) -> f64 {
        match &self.value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            Value::Bool(b) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    /// Label view of the value, used for group names.
    pub fn as_label(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// One row of an explore response: result alias to value, plus the interval
/// marker when the query was bucketed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ExploreResultRow {
    pub values: BTreeMap<String, ResultValue>,
    pub interval_start: Option<DateTime<Utc>>,
}

impl ExploreResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, alias: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(alias.into(), ResultValue::new(value));
        self
    }

    pub fn with_interval_start(mut self, start: DateTime<Utc>) -> Self {
        self.interval_start = Some(start);
        self
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.values.contains_key(alias)
    }

    pub fn get(&self, alias: &str) -> Option<&ResultValue> {
        self.values.get(alias)
    }
}

fn parse_interval_start(value: &Value) -> std::result::Result<Option<DateTime<Utc>>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| format!("invalid {}: {}", GQL_EXPLORE_RESULT_INTERVAL_KEY, e)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(Some)
            .ok_or_else(|| format!("invalid {}: {}", GQL_EXPLORE_RESULT_INTERVAL_KEY, n)),
        other => Err(format!(
            "invalid {}: unexpected {}",
            GQL_EXPLORE_RESULT_INTERVAL_KEY, other
        )),
    }
}

impl TryFrom<Map<String, Value>> for ExploreResultRow {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let mut row = ExploreResultRow::new();
        for (key, value) in map {
            if key == GQL_EXPLORE_RESULT_INTERVAL_KEY {
                row.interval_start = parse_interval_start(&value)?;
                continue;
            }
            let value: ResultValue = serde_json::from_value(value)
                .map_err(|e| format!("invalid value for {}: {}", key, e))?;
            row.values.insert(key, value);
        }
        Ok(row)
    }
}

impl From<ExploreResultRow> for Map<String, Value> {
    fn from(row: ExploreResultRow) -> Self {
        let mut map = Map::new();
        for (alias, value) in row.values {
            map.insert(alias, serde_json::to_value(value).unwrap_or(Value::Null));
        }
        if let Some(start) = row.interval_start {
            map.insert(
                GQL_EXPLORE_RESULT_INTERVAL_KEY.to_string(),
                Value::String(start.to_rfc3339()),
            );
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExploreResponse {
    #[serde(default)]
    pub results: Vec<ExploreResultRow>,
}

impl ExploreResponse {
    pub fn new(results: Vec<ExploreResultRow>) -> Self {
        Self { results }
    }

    /// Rewrites positional GraphQL aliases back to result aliases.
    pub fn restore_aliases(mut self, lookup: &HashMap<String, String>) -> Self {
        for row in &mut self.results {
            row.values = std::mem::take(&mut row.values)
                .into_iter()
                .map(|(alias, value)| match lookup.get(&alias) {
                    Some(original) => (original.clone(), value),
                    None => (alias, value),
                })
                .collect();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Like,
    In,
}

impl FilterOperator {
    fn graphql_name(self) -> &'static str {
        match self {
            FilterOperator::Equals => "EQUALS",
            FilterOperator::NotEquals => "NOT_EQUALS",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlFilter {
    pub key: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl GraphQlFilter {
    pub fn new(key: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn as_graphql_argument(&self) -> String {
        format!(
            "{{key: {}, operator: {}, value: {}, type: ATTRIBUTE}}",
            graphql_string(&self.key),
            self.operator.graphql_name(),
            self.value
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreGroupBy {
    pub keys: Vec<ExploreSpecification>,
    pub limit: u32,
    /// Ask the server to fold groups past `limit` into the overflow group.
    #[serde(default)]
    pub include_rest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreRequest {
    pub context: String,
    pub limit: u32,
    pub time_range: GraphQlTimeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<TimeDuration>,
    pub selections: Vec<ExploreSpecification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<ExploreGroupBy>,
    #[serde(default)]
    pub filters: Vec<GraphQlFilter>,
}

impl ExploreRequest {
    fn all_selections(&self) -> impl Iterator<Item = &ExploreSpecification> {
        let group_keys = self.group_by.iter().flat_map(|group_by| group_by.keys.iter());
        group_keys.chain(self.selections.iter())
    }

    /// Maps each positional GraphQL alias to the result alias it stands for.
    pub fn alias_lookup(&self) -> HashMap<String, String> {
        self.all_selections()
            .enumerate()
            .map(|(index, spec)| (selection_alias(index), spec.result_alias()))
            .collect()
    }

    pub fn to_graphql_document(&self) -> Result<String> {
        if !is_graphql_name(&self.context) {
            return Err(DashboardError::InvalidRequest(format!(
                "invalid explore context {:?}",
                self.context
            )));
        }

        let mut arguments = vec![
            format!("context: {}", self.context),
            format!("limit: {}", self.limit),
            format!("timeRange: {}", self.time_range.as_graphql_argument()),
        ];
        if let Some(interval) = &self.interval {
            arguments.push(format!(
                "interval: {{size: {}, units: {}}}",
                interval.value,
                interval.unit.graphql_name()
            ));
        }
        if let Some(group_by) = &self.group_by {
            let keys: Vec<String> = group_by
                .keys
                .iter()
                .map(|spec| graphql_string(&spec.expression.to_string()))
                .collect();
            arguments.push(format!(
                "groupBy: {{keys: [{}], groupLimit: {}, includeRest: {}}}",
                keys.join(", "),
                group_by.limit,
                group_by.include_rest
            ));
        }
        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(|f| f.as_graphql_argument()).collect();
            arguments.push(format!("filterBy: [{}]", filters.join(", ")));
        }

        let mut fields = Vec::new();
        if self.interval.is_some() {
            fields.push(format!("{}: intervalStart", GQL_EXPLORE_RESULT_INTERVAL_KEY));
        }
        fields.extend(
            self.all_selections()
                .enumerate()
                .map(|(index, spec)| spec.as_graphql_selection(&selection_alias(index))),
        );

        Ok(format!(
            "{{ explore({}) {{ results {{ {} }} }} }}",
            arguments.join(", "),
            fields.join(" ")
        ))
    }
}
