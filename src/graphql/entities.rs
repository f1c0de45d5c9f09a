use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::graphql::client::QueryTransport;
use crate::graphql::explore::{ExploreResultRow, GraphQlFilter};
use crate::graphql::specification::{selection_alias, ExploreSpecification};
use crate::graphql::topology::EntityType;
use crate::models::GraphQlTimeRange;
use crate::Result;

pub const DEFAULT_ENTITIES_LIMIT: u32 = 100;

/// Query for entities of one type, each carrying the requested properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitiesRequest {
    pub entity_type: EntityType,
    pub limit: u32,
    pub time_range: GraphQlTimeRange,
    pub properties: Vec<ExploreSpecification>,
    #[serde(default)]
    pub filters: Vec<GraphQlFilter>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl EntitiesRequest {
    pub fn alias_lookup(&self) -> HashMap<String, String> {
        self.properties
            .iter()
            .enumerate()
            .map(|(index, spec)| (selection_alias(index), spec.result_alias()))
            .collect()
    }

    pub fn to_graphql_document(&self) -> String {
        let mut arguments = vec![
            format!("type: {}", self.entity_type.graphql_name()),
            format!("limit: {}", self.limit),
            format!("timeRange: {}", self.time_range.as_graphql_argument()),
            format!("includeInactive: {}", self.include_inactive),
        ];
        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(|f| f.as_graphql_argument()).collect();
            arguments.push(format!("filterBy: [{}]", filters.join(", ")));
        }

        let fields: Vec<String> = self
            .properties
            .iter()
            .enumerate()
            .map(|(index, spec)| spec.as_graphql_selection(&selection_alias(index)))
            .collect();

        format!(
            "{{ entities({}) {{ results {{ id {} }} }} }}",
            arguments.join(", "),
            fields.join(" ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntitiesResponse {
    #[serde(default)]
    pub results: Vec<ExploreResultRow>,
}

impl EntitiesResponse {
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

    /// One value per entity for `specification`, `Null` where an entity lacks it.
    pub fn values_for(&self, specification: &ExploreSpecification) -> Vec<Value> {
        let alias = specification.result_alias();
        self.results
            .iter()
            .map(|row| row.get(&alias).map_or(Value::Null, |value| value.value.clone()))
            .collect()
    }
}

/// Lists the values of a single property across all entities of a type,
/// e.g. every service name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitiesValuesDataSource {
    pub entity_type: EntityType,
    pub specification: ExploreSpecification,
    #[serde(default = "default_entities_limit")]
    pub limit: u32,
    #[serde(default)]
    pub include_inactive: bool,
}

fn default_entities_limit() -> u32 {
    DEFAULT_ENTITIES_LIMIT
}

impl EntitiesValuesDataSource {
    pub fn new(entity_type: EntityType, specification: ExploreSpecification) -> Self {
        Self {
            entity_type,
            specification,
            limit: DEFAULT_ENTITIES_LIMIT,
            include_inactive: false,
        }
    }

    pub fn build_request(
        &self,
        time_range: GraphQlTimeRange,
        filters: Vec<GraphQlFilter>,
    ) -> EntitiesRequest {
        EntitiesRequest {
            entity_type: self.entity_type,
            limit: self.limit,
            time_range,
            properties: vec![self.specification.clone()],
            filters,
            include_inactive: self.include_inactive,
        }
    }

    pub async fn fetch_values(
        &self,
        transport: &dyn QueryTransport,
        time_range: GraphQlTimeRange,
        filters: Vec<GraphQlFilter>,
    ) -> Result<Vec<Value>> {
        let request = self.build_request(time_range, filters);
        let response = transport.entities(&request).await?;
        debug!(
            "Entities query for {} returned {} rows",
            self.specification.result_alias(),
            response.results.len()
        );
        Ok(response.values_for(&self.specification))
    }
}
