pub mod api;
pub mod config;
pub mod error;
pub mod graphql;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod projection;
pub mod sync;
pub mod trace_detail;
pub mod widgets;

pub use error::{DashboardError, Result};
pub use projection::ExploreResult;
