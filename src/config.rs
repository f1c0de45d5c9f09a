use std::time::Duration;

use serde::Deserialize;

use crate::Result;

/// Environment prefix, e.g. `TRACE_EXPLORER_GRAPHQL_URL`.
pub const ENV_PREFIX: &str = "TRACE_EXPLORER";

pub const DEFAULT_MAX_BUCKETS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub graphql_url: String,
    pub listen_addr: String,
    pub log_level: String,
    pub request_timeout_secs: u64,
    /// Upper bound on zero-filled buckets per projected series.
    pub max_buckets: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .set_default("graphql_url", "http://localhost:2020/graphql")?
            .set_default("listen_addr", "0.0.0.0:8080")?
            .set_default("log_level", "info")?
            .set_default("request_timeout_secs", 30)?
            .set_default("max_buckets", DEFAULT_MAX_BUCKETS)?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
