pub mod client;
pub mod entities;
pub mod explore;
pub mod specification;
pub mod topology;
pub mod trace;

pub use client::{GraphQlClient, QueryTransport};
pub use entities::{EntitiesRequest, EntitiesResponse, EntitiesValuesDataSource};
pub use explore::{ExploreRequest, ExploreResponse, ExploreResultRow, ResultValue};
pub use specification::{AttributeExpression, ExploreSpecification, ExploreSpecificationBuilder};
