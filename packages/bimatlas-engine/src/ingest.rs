//! Revision writer.
//!
//! Ingestion runs in two phases. Phase 1 extracts products and
//! relationships from the IFC file (CPU-bound, off the async runtime).
//! Phase 2 applies the SCD2 delta in one relational transaction (the
//! point of truth) and then mirrors the change into the graph
//! best-effort. A graph failure after the relational commit leaves the
//! store authoritative and the graph partially updated; every mirror write
//! is close-if-open / create-if-missing, so the next ingestion repairs the
//! drift.

use crate::deadline::Deadline;
use crate::diff::ChangeSet;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::model::{IngestionCounts, IngestionResult};
use bimatlas_ifc::{Extraction, ProductRecord, RelationshipRecord};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

impl Engine {
    /// Ingest an IFC file into a branch, producing exactly one revision.
    pub async fn ingest_file(
        &self,
        path: impl AsRef<Path>,
        branch_id: i64,
        label: Option<&str>,
        deadline: Deadline,
    ) -> Result<IngestionResult> {
        let path = path.as_ref().to_path_buf();
        let source_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if self.relational().fetch_branch(branch_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("branch {branch_id}")));
        }

        info!(branch_id, file = %source_filename, "starting ingestion");
        let extraction = tokio::task::spawn_blocking(move || bimatlas_ifc::extract(&path))
            .await
            .map_err(|err| EngineError::Store(format!("extraction task failed: {err}")))??;

        self.ingest_extraction(extraction, &source_filename, branch_id, label, deadline)
            .await
    }

    /// Ingest an already-extracted snapshot (the upload surface hands the
    /// extraction over after spooling the file).
    pub async fn ingest_extraction(
        &self,
        extraction: Extraction,
        source_filename: &str,
        branch_id: i64,
        label: Option<&str>,
        deadline: Deadline,
    ) -> Result<IngestionResult> {
        let (products, relationships, mut diagnostics) = extraction.into_parts();
        info!(
            branch_id,
            products = products.len(),
            relationships = relationships.len(),
            "extracted {source_filename}"
        );

        deadline
            .run("ingest", async {
                let applied = self
                    .relational()
                    .apply_revision(branch_id, source_filename, label, &products)
                    .await?;
                let revision_id = applied.revision_id;
                let change = applied.change;
                info!(
                    branch_id,
                    revision_id,
                    added = change.added.len(),
                    modified = change.modified.len(),
                    deleted = change.deleted.len(),
                    unchanged = change.unchanged.len(),
                    "relational changes committed"
                );

                let edges_created = self
                    .mirror_graph(
                        branch_id,
                        revision_id,
                        &change,
                        &products,
                        &relationships,
                        &mut diagnostics,
                    )
                    .await;

                Ok(IngestionResult {
                    revision_id,
                    branch_id,
                    total_products: products.len(),
                    counts: IngestionCounts {
                        added: change.added.len(),
                        modified: change.modified.len(),
                        deleted: change.deleted.len(),
                        unchanged: change.unchanged.len(),
                    },
                    edges_created,
                    diagnostics,
                })
            })
            .await
    }

    /// Best-effort graph mirror. Never fails the ingestion; every problem
    /// is logged and surfaced in the diagnostics.
    async fn mirror_graph(
        &self,
        branch_id: i64,
        rev: i64,
        change: &ChangeSet,
        products: &[ProductRecord],
        relationships: &[RelationshipRecord],
        diagnostics: &mut Vec<String>,
    ) -> usize {
        let graph = self.graph();
        let by_gid: HashMap<&str, &ProductRecord> = products
            .iter()
            .map(|r| (r.global_id.as_str(), r))
            .collect();

        // Close nodes and their edges for modified/deleted products. Edges
        // first, so the edge match still finds the node open.
        for gid in change.closed() {
            if let Err(err) = graph.close_edges_for_node(branch_id, gid, rev).await {
                warn!(branch_id, %gid, "failed to close edges: {err}");
                diagnostics.push(format!("graph: failed to close edges of {gid}"));
            }
            if let Err(err) = graph.close_node(branch_id, gid, rev).await {
                warn!(branch_id, %gid, "failed to close node: {err}");
                diagnostics.push(format!("graph: failed to close node {gid}"));
            }
        }

        // Create nodes for added/modified products. Added ids get a
        // close-if-open first: a stale open node from an earlier failed
        // mirror would otherwise leave two open nodes.
        let added: HashSet<&str> = change.added.iter().map(String::as_str).collect();
        for gid in change.inserted() {
            let Some(record) = by_gid.get(gid.as_str()) else {
                continue;
            };
            if added.contains(gid.as_str()) {
                if let Err(err) = graph.close_node(branch_id, gid, rev).await {
                    warn!(branch_id, %gid, "failed to close stale node: {err}");
                }
            }
            if let Err(err) = graph
                .create_node(
                    branch_id,
                    record.ifc_class.as_str(),
                    gid,
                    record.name.as_deref(),
                    rev,
                )
                .await
            {
                warn!(branch_id, %gid, "failed to create node: {err}");
                diagnostics.push(format!("graph: failed to create node {gid}"));
            }
        }

        // Edges for relationships touching an added/modified product; edges
        // between two unchanged products carry forward on the existing
        // nodes. Both endpoints must be in the new model.
        let changed_or_new: HashSet<&str> = change.inserted().map(String::as_str).collect();
        let all_new: HashSet<&str> = products.iter().map(|r| r.global_id.as_str()).collect();
        let mut edges_created = 0;
        for rel in relationships {
            let from = rel.from_global_id.as_str();
            let to = rel.to_global_id.as_str();
            if !changed_or_new.contains(from) && !changed_or_new.contains(to) {
                continue;
            }
            if !all_new.contains(from) || !all_new.contains(to) {
                continue;
            }
            match graph
                .create_edge(branch_id, from, to, rel.kind.as_label(), rev)
                .await
            {
                Ok(true) => edges_created += 1,
                Ok(false) => {
                    diagnostics.push(format!(
                        "graph: skipped dangling edge {from} -[{}]-> {to}",
                        rel.kind.as_label()
                    ));
                }
                Err(err) => {
                    warn!(
                        branch_id,
                        from, to, "failed to create edge {}: {err}",
                        rel.kind.as_label()
                    );
                    diagnostics.push(format!(
                        "graph: failed to create edge {from} -[{}]-> {to}",
                        rel.kind.as_label()
                    ));
                }
            }
        }

        info!(branch_id, rev, edges_created, "graph mirror complete");
        edges_created
    }
}
