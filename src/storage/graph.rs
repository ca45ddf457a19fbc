//! Neo4j sink.
//!
//! Records are chunked, serialized to a JSON string and unpacked
//! server-side with `apoc.convert.fromJsonList`, so a whole chunk is one
//! round trip. The import statements MERGE on ids and are safe to replay.

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, query};

use crate::error::{AppError, Result};
use crate::models::{GraphSinkConfig, Record};
use crate::storage::{RecordKind, RecordSink};

const TWEET_IMPORT: &str = include_str!("cypher/tweets.cypher");
const USER_IMPORT: &str = include_str!("cypher/users.cypher");

/// Graph database sink backed by a pooled `neo4rs` connection.
#[derive(Clone)]
pub struct GraphSink {
    graph: Graph,
    chunk_size: usize,
}

impl GraphSink {
    /// Connect with an explicit password.
    pub async fn connect(config: &GraphSinkConfig, password: &str) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(password)
            .db(config.database.as_str())
            .max_connections(4)
            .build()?;
        let graph = Graph::connect(neo_config).await?;
        log::info!(
            "Connected to graph database {} at {}",
            config.database,
            config.uri
        );
        Ok(Self {
            graph,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Connect using the password found in `config.password_env`.
    pub async fn from_config(config: &GraphSinkConfig) -> Result<Self> {
        let password = std::env::var(&config.password_env).map_err(|_| {
            AppError::config(format!(
                "graph sink enabled but {} is not set",
                config.password_env
            ))
        })?;
        Self::connect(config, &password).await
    }
}

fn import_statement(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Tweets => TWEET_IMPORT,
        RecordKind::Users => USER_IMPORT,
    }
}

#[async_trait]
impl RecordSink for GraphSink {
    fn name(&self) -> &str {
        "graph"
    }

    async fn insert(&self, kind: RecordKind, records: &[Record]) -> Result<usize> {
        let chunks = records.len().div_ceil(self.chunk_size);
        for (n, chunk) in records.chunks(self.chunk_size).enumerate() {
            log::info!("Inserting {} chunk {} of {}", kind, n + 1, chunks);
            let rows = serde_json::to_string(chunk)?;
            self.graph
                .run(query(import_statement(kind)).param("rows", rows))
                .await?;
        }
        Ok(records.len())
    }
}
