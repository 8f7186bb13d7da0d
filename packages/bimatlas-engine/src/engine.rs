//! Engine facade.
//!
//! Wires the relational point-of-truth and the graph view behind one
//! handle. Method groups live next to their concern: catalog operations in
//! [`crate::catalog`], ingestion in [`crate::ingest`], reads in
//! [`crate::query`], streaming in [`crate::stream`], filter sets in
//! [`crate::filter_sets`].

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::store::{
    AgeGraphStore, GraphStore, MemoryGraphStore, MemoryStore, PostgresStore, RelationalStore,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Engine {
    relational: Arc<dyn RelationalStore>,
    graph: Arc<dyn GraphStore>,
}

impl Engine {
    pub fn new(relational: Arc<dyn RelationalStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self { relational, graph }
    }

    /// Connect to Postgres/AGE, creating schema and graph when missing.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = PostgresStore::connect(config).await?;
        store.ensure_schema().await?;
        let graph = AgeGraphStore::new(store.pool().clone(), &config.graph_name)?;
        graph.ensure_graph().await?;
        Ok(Self::new(Arc::new(store), Arc::new(graph)))
    }

    /// Engine over the in-memory adapters, returning the concrete stores
    /// for direct inspection. Test use.
    pub fn in_memory() -> (Self, MemoryStore, MemoryGraphStore) {
        let store = MemoryStore::new();
        let graph = MemoryGraphStore::new();
        (
            Self::new(Arc::new(store.clone()), Arc::new(graph.clone())),
            store,
            graph,
        )
    }

    pub fn relational(&self) -> &Arc<dyn RelationalStore> {
        &self.relational
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    /// Resolve an optional revision to a concrete id on the branch; `None`
    /// means the latest revision. Fails `NotFound` for an unknown branch or
    /// an empty one.
    pub async fn resolve_revision(&self, branch_id: i64, revision: Option<i64>) -> Result<i64> {
        if self.relational.fetch_branch(branch_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("branch {branch_id}")));
        }
        match revision {
            Some(rev) => Ok(rev),
            None => self
                .relational
                .latest_revision(branch_id)
                .await?
                .ok_or_else(|| {
                    EngineError::NotFound(format!("branch {branch_id} has no revisions"))
                }),
        }
    }
}
