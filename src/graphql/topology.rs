use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graphql::client::QueryTransport;
use crate::graphql::explore::{ExploreResultRow, GraphQlFilter};
use crate::graphql::specification::{selection_alias, ExploreSpecification, ExploreSpecificationBuilder};
use crate::models::GraphQlTimeRange;
use crate::{DashboardError, Result};

const OUTGOING_EDGES_PREFIX: &str = "outgoing_";
const INCOMING_EDGES_PREFIX: &str = "incoming_";

pub const DEFAULT_ROOT_NODE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Api,
    Service,
    Backend,
}

impl EntityType {
    pub fn graphql_name(self) -> &'static str {
        match self {
            EntityType::Api => "API",
            EntityType::Service => "SERVICE",
            EntityType::Backend => "BACKEND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyMetricCategory {
    pub name: String,
    pub min_value: f64,
    #[serde(default)]
    pub max_value: Option<f64>,
    pub fill_color: String,
    pub stroke_color: String,
    pub focus_color: String,
}

impl TopologyMetricCategory {
    /// `min_value <= value < max_value`; an absent maximum is unbounded.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_value && self.max_value.map_or(true, |max| value < max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyMetricWithCategory {
    pub specification: ExploreSpecification,
    #[serde(default)]
    pub categories: Vec<TopologyMetricCategory>,
}

impl TopologyMetricWithCategory {
    pub fn category_for(&self, value: f64) -> Option<&TopologyMetricCategory> {
        self.categories.iter().find(|category| category.contains(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyMetrics {
    pub primary: TopologyMetricWithCategory,
    #[serde(default)]
    pub secondary: Option<TopologyMetricWithCategory>,
    #[serde(default)]
    pub others: Vec<TopologyMetricWithCategory>,
}

impl TopologyMetrics {
    pub fn specifications(&self) -> Vec<ExploreSpecification> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .chain(self.others.iter())
            .map(|metric| metric.specification.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNodeSpecification {
    pub title_specification: ExploreSpecification,
    pub metric_specifications: Vec<ExploreSpecification>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyEdgeSpecification {
    pub metric_specifications: Vec<ExploreSpecification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCacheability {
    Cacheable,
    NotCacheable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub cacheability: RequestCacheability,
    pub isolated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyRequest {
    pub root_node_type: EntityType,
    pub root_node_specification: TopologyNodeSpecification,
    pub root_node_filters: Vec<GraphQlFilter>,
    pub root_node_limit: u32,
    pub time_range: GraphQlTimeRange,
    pub downstream_node_specifications: Vec<(EntityType, TopologyNodeSpecification)>,
    pub upstream_node_specifications: Vec<(EntityType, TopologyNodeSpecification)>,
    pub edge_specification: TopologyEdgeSpecification,
}

impl TopologyNodeSpecification {
    fn specifications(&self) -> impl Iterator<Item = &ExploreSpecification> {
        std::iter::once(&self.title_specification).chain(self.metric_specifications.iter())
    }
}

fn selections<'a>(specs: impl Iterator<Item = &'a ExploreSpecification>) -> String {
    specs
        .enumerate()
        .map(|(index, spec)| spec.as_graphql_selection(&selection_alias(index)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn alias_lookup<'a>(specs: impl Iterator<Item = &'a ExploreSpecification>) -> HashMap<String, String> {
    specs
        .enumerate()
        .map(|(index, spec)| (selection_alias(index), spec.result_alias()))
        .collect()
}

impl TopologyRequest {
    /// Renders the root entities query. Each neighbor type becomes an edge
    /// field aliased `outgoing_<TYPE>` (downstream) or `incoming_<TYPE>`
    /// (upstream).
    pub fn to_graphql_document(&self) -> String {
        let mut arguments = vec![
            format!("type: {}", self.root_node_type.graphql_name()),
            format!("limit: {}", self.root_node_limit),
            format!("timeRange: {}", self.time_range.as_graphql_argument()),
        ];
        if !self.root_node_filters.is_empty() {
            let filters: Vec<String> = self
                .root_node_filters
                .iter()
                .map(|f| f.as_graphql_argument())
                .collect();
            arguments.push(format!("filterBy: [{}]", filters.join(", ")));
        }

        let edge_fields = selections(self.edge_specification.metric_specifications.iter());
        let edges = |prefix: &str, field: &str, neighbors: &[(EntityType, TopologyNodeSpecification)]| {
            neighbors
                .iter()
                .map(|(entity_type, spec)| {
                    format!(
                        "{}{}: {}(neighborType: {}) {{ results {{ {} neighbor {{ id {} }} }} }}",
                        prefix,
                        entity_type.graphql_name(),
                        field,
                        entity_type.graphql_name(),
                        edge_fields,
                        selections(spec.specifications())
                    )
                })
                .collect::<Vec<_>>()
        };

        let mut fields = vec![
            "id".to_string(),
            selections(self.root_node_specification.specifications()),
        ];
        fields.extend(edges(OUTGOING_EDGES_PREFIX, "outgoingEdges", &self.downstream_node_specifications));
        fields.extend(edges(INCOMING_EDGES_PREFIX, "incomingEdges", &self.upstream_node_specifications));

        format!(
            "{{ entities({}) {{ results {{ {} }} }} }}",
            arguments.join(", "),
            fields.join(" ")
        )
    }

    fn neighbor_specification(&self, outgoing: bool, entity_type: EntityType) -> Option<&TopologyNodeSpecification> {
        let neighbors = if outgoing {
            &self.downstream_node_specifications
        } else {
            &self.upstream_node_specifications
        };
        neighbors
            .iter()
            .find(|(neighbor_type, _)| *neighbor_type == entity_type)
            .map(|(_, spec)| spec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: String,
    pub entity_type: EntityType,
    pub values: ExploreResultRow,
}

/// Directed edge from upstream `from` to downstream `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: String,
    pub to: String,
    pub values: ExploreResultRow,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopologyResponse {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

#[derive(Debug, Deserialize)]
struct RawEntities {
    #[serde(default)]
    results: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawEdges {
    #[serde(default)]
    results: Vec<RawEdge>,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    neighbor: RawNode,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

fn decode_row(fields: Map<String, Value>, lookup: &HashMap<String, String>) -> Result<ExploreResultRow> {
    let mut row = ExploreResultRow::try_from(fields).map_err(DashboardError::Serialization)?;
    row.values = std::mem::take(&mut row.values)
        .into_iter()
        .map(|(alias, value)| match lookup.get(&alias) {
            Some(original) => (original.clone(), value),
            None => (alias, value),
        })
        .collect();
    Ok(row)
}

impl TopologyResponse {
    /// Flattens the entities payload of a topology query into unique nodes
    /// (first occurrence wins) and edges, both in response order.
    pub fn from_graphql(payload: Value, request: &TopologyRequest) -> Result<Self> {
        let raw: RawEntities = serde_json::from_value(payload)?;
        let root_lookup = alias_lookup(request.root_node_specification.specifications());
        let edge_lookup = alias_lookup(request.edge_specification.metric_specifications.iter());

        let mut response = TopologyResponse::default();
        let mut seen = HashSet::new();

        for node in raw.results {
            let mut values = Map::new();
            let mut edge_groups = Vec::new();
            for (key, value) in node.fields {
                if let Some(entity_type) = key.strip_prefix(OUTGOING_EDGES_PREFIX) {
                    edge_groups.push((true, entity_type.to_string(), value));
                } else if let Some(entity_type) = key.strip_prefix(INCOMING_EDGES_PREFIX) {
                    edge_groups.push((false, entity_type.to_string(), value));
                } else {
                    values.insert(key, value);
                }
            }

            // Downstream before upstream, then by neighbor type.
            edge_groups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

            if seen.insert(node.id.clone()) {
                response.nodes.push(TopologyNode {
                    id: node.id.clone(),
                    entity_type: request.root_node_type,
                    values: decode_row(values, &root_lookup)?,
                });
            }

            for (outgoing, entity_type, edges) in edge_groups {
                let entity_type: EntityType = serde_json::from_value(Value::String(entity_type))?;
                let neighbor_lookup = request
                    .neighbor_specification(outgoing, entity_type)
                    .map(|spec| alias_lookup(spec.specifications()))
                    .unwrap_or_default();
                let edges: RawEdges = serde_json::from_value(edges)?;

                for edge in edges.results {
                    let neighbor_id = edge.neighbor.id;
                    if seen.insert(neighbor_id.clone()) {
                        response.nodes.push(TopologyNode {
                            id: neighbor_id.clone(),
                            entity_type,
                            values: decode_row(edge.neighbor.fields, &neighbor_lookup)?,
                        });
                    }

                    let (from, to) = if outgoing {
                        (node.id.clone(), neighbor_id)
                    } else {
                        (neighbor_id, node.id.clone())
                    };
                    response.edges.push(TopologyEdge {
                        from,
                        to,
                        values: decode_row(edge.fields, &edge_lookup)?,
                    });
                }
            }
        }

        Ok(response)
    }
}

/// Dashboard configuration for a topology graph around one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyDataSource {
    pub entity_type: EntityType,
    #[serde(default)]
    pub upstream_entity_types: Vec<EntityType>,
    #[serde(default)]
    pub downstream_entity_types: Vec<EntityType>,
    pub node_metrics: TopologyMetrics,
    pub edge_metrics: TopologyMetrics,
    #[serde(default = "default_root_node_limit")]
    pub limit: u32,
}

fn default_root_node_limit() -> u32 {
    DEFAULT_ROOT_NODE_LIMIT
}

impl TopologyDataSource {
    pub fn build_request(
        &self,
        time_range: GraphQlTimeRange,
        filters: Vec<GraphQlFilter>,
    ) -> TopologyRequest {
        let node_specification = self.node_specification();
        let for_types = |types: &[EntityType]| {
            types
                .iter()
                .map(|entity_type| (*entity_type, node_specification.clone()))
                .collect::<Vec<_>>()
        };

        TopologyRequest {
            root_node_type: self.entity_type,
            root_node_specification: node_specification.clone(),
            root_node_filters: filters,
            root_node_limit: self.limit,
            time_range,
            downstream_node_specifications: for_types(&self.downstream_entity_types),
            upstream_node_specifications: for_types(&self.upstream_entity_types),
            edge_specification: TopologyEdgeSpecification {
                metric_specifications: self.edge_metrics.specifications(),
            },
        }
    }

    pub async fn fetch_topology(
        &self,
        transport: &dyn QueryTransport,
        time_range: GraphQlTimeRange,
        filters: Vec<GraphQlFilter>,
    ) -> Result<TopologyResponse> {
        transport.topology(&self.build_request(time_range, filters)).await
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            cacheability: RequestCacheability::Cacheable,
            isolated: true,
        }
    }

    fn node_specification(&self) -> TopologyNodeSpecification {
        TopologyNodeSpecification {
            title_specification: ExploreSpecificationBuilder::new().attribute_for_key("name"),
            metric_specifications: self.node_metrics.specifications(),
        }
    }
}
