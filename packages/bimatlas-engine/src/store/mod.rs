//! Storage ports.
//!
//! Two backends, two traits: the relational store is the point of truth
//! (catalog, revisions, SCD2 product rows), the graph store is a
//! best-effort mirrored view for topological queries. Production adapters
//! are Postgres and Apache AGE over one shared pool; the in-memory
//! adapters back the test suite.

mod age;
mod memory;
mod postgres;
pub mod validate;

pub use age::AgeGraphStore;
pub use memory::{MemoryGraphStore, MemoryStore};
pub use postgres::PostgresStore;

use crate::error::Result;
use crate::filter_sets::{FilterLogic, FilterRule, FilterSet};
use crate::model::{
    AppliedRevision, Branch, GraphNodeRef, Product, ProductFilter, ProductRow, Project,
    RelatedProduct, Revision, RevisionDiff,
};
use async_trait::async_trait;
use bimatlas_ifc::ProductRecord;

/// Relational store port (the point of truth).
#[async_trait]
pub trait RelationalStore: Send + Sync {
    // ── schema ──────────────────────────────────────────────────────────

    /// Create tables and indexes when missing. Idempotent.
    async fn ensure_schema(&self) -> Result<()>;

    // ── project / branch catalog ────────────────────────────────────────

    /// Create a project and its `main` branch in one transaction.
    async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(Project, Branch)>;

    async fn fetch_project(&self, project_id: i64) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Delete a project, cascading to branches, revisions and products.
    /// Returns the ids of the deleted branches so the caller can purge the
    /// graph view.
    async fn delete_project(&self, project_id: i64) -> Result<Vec<i64>>;

    /// Fails with `DuplicateName` on a `(project_id, name)` conflict. The
    /// new branch starts empty.
    async fn create_branch(&self, project_id: i64, name: &str) -> Result<Branch>;

    async fn fetch_branch(&self, branch_id: i64) -> Result<Option<Branch>>;

    async fn list_branches(&self, project_id: i64) -> Result<Vec<Branch>>;

    // ── revisions ───────────────────────────────────────────────────────

    /// Highest revision id bound to the branch, if any.
    async fn latest_revision(&self, branch_id: i64) -> Result<Option<i64>>;

    async fn list_revisions(&self, branch_id: i64) -> Result<Vec<Revision>>;

    // ── SCD2 revision writer ────────────────────────────────────────────

    /// Run one ingestion delta in a single transaction: take the branch
    /// advisory lock (`Conflict` when held), insert the revision row, load
    /// the open `(global_id, content_hash)` set, diff it against `records`,
    /// assert the open-window invariant, close `modified ∪ deleted`, insert
    /// `added ∪ modified`, commit. After the commit returns, the relational
    /// view is consistent whether or not the graph mirror succeeds.
    async fn apply_revision(
        &self,
        branch_id: i64,
        source_filename: &str,
        label: Option<&str>,
        records: &[ProductRecord],
    ) -> Result<AppliedRevision>;

    // ── revision-scoped product reads ───────────────────────────────────

    async fn product_at(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Option<ProductRow>>;

    async fn products_at(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
    ) -> Result<Vec<ProductRow>>;

    async fn count_products_at(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
    ) -> Result<i64>;

    /// One page of visible rows, ordered by surrogate id. The streaming
    /// layer walks pages so it never holds the full result set.
    async fn products_page(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductRow>>;

    // ── revision diff ───────────────────────────────────────────────────

    /// Symmetric SCD2 state comparison between two revisions of a branch.
    async fn revision_diff(
        &self,
        branch_id: i64,
        from_rev: i64,
        to_rev: i64,
    ) -> Result<RevisionDiff>;

    // ── invariants ──────────────────────────────────────────────────────

    /// `global_id`s with more than one open row on the branch. Always empty
    /// unless the store is corrupt.
    async fn open_window_violations(&self, branch_id: i64) -> Result<Vec<String>>;

    // ── filter sets ─────────────────────────────────────────────────────

    async fn create_filter_set(
        &self,
        branch_id: i64,
        name: &str,
        logic: FilterLogic,
        rules: &[FilterRule],
    ) -> Result<FilterSet>;

    async fn fetch_filter_set(&self, filter_set_id: i64) -> Result<Option<FilterSet>>;

    async fn update_filter_set(
        &self,
        filter_set_id: i64,
        name: Option<&str>,
        logic: Option<FilterLogic>,
        rules: Option<&[FilterRule]>,
    ) -> Result<Option<FilterSet>>;

    /// Returns `false` when the set did not exist.
    async fn delete_filter_set(&self, filter_set_id: i64) -> Result<bool>;

    async fn list_filter_sets(&self, branch_id: i64) -> Result<Vec<FilterSet>>;

    /// Case-insensitive name search, optionally scoped to a project or a
    /// branch.
    async fn search_filter_sets(
        &self,
        query: &str,
        project_id: Option<i64>,
        branch_id: Option<i64>,
    ) -> Result<Vec<FilterSet>>;

    /// Persist which sets are active on a branch (replaces the previous
    /// selection).
    async fn set_applied_filter_sets(&self, branch_id: i64, filter_set_ids: &[i64]) -> Result<()>;

    async fn applied_filter_sets(&self, branch_id: i64) -> Result<Vec<FilterSet>>;
}

/// Property-graph store port.
///
/// All writes are idempotent in the close-if-open / create-if-missing
/// sense: the writer must be able to re-mirror after a partial failure
/// without corrupting the view.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the named graph (and any backend extension state) if missing.
    async fn ensure_graph(&self) -> Result<()>;

    // ── writes (revision-tagged, branch-scoped) ─────────────────────────

    /// Create a node labelled by `ifc_class` with `valid_from_rev = rev`
    /// and the open sentinel.
    async fn create_node(
        &self,
        branch_id: i64,
        ifc_class: &str,
        global_id: &str,
        name: Option<&str>,
        rev: i64,
    ) -> Result<()>;

    /// Close the open node for `(branch_id, global_id)`. No-op when nothing
    /// is open.
    async fn close_node(&self, branch_id: i64, global_id: &str, rev: i64) -> Result<()>;

    /// Create an edge between the two *current* nodes. Returns `false`
    /// (without failing) when either endpoint does not currently exist.
    async fn create_edge(
        &self,
        branch_id: i64,
        from_global_id: &str,
        to_global_id: &str,
        label: &str,
        rev: i64,
    ) -> Result<bool>;

    /// Close every open edge (either direction) incident to the node.
    async fn close_edges_for_node(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<()>;

    /// Remove every node and edge of a branch. Used on catalog deletes.
    async fn purge_branch(&self, branch_id: i64) -> Result<()>;

    // ── reads (revision-scoped) ─────────────────────────────────────────

    /// Outgoing and incoming relations of a visible node.
    async fn relations_of(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<RelatedProduct>>;

    /// `IfcProject` nodes visible at `(rev, branch)`.
    async fn spatial_roots(&self, branch_id: i64, rev: i64) -> Result<Vec<GraphNodeRef>>;

    /// Direct children via outgoing `IfcRelAggregates`.
    async fn spatial_children(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<GraphNodeRef>>;

    /// Elements contained via incoming `IfcRelContainedInSpatialStructure`.
    async fn contained_elements(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<GraphNodeRef>>;
}

/// Convert a row to the serialized product shape (mesh base64, no graph
/// enrichment).
pub fn row_to_product(row: &ProductRow) -> Product {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let mesh = match (&row.vertices, &row.faces) {
        (Some(vertices), Some(faces)) => Some(crate::model::MeshPayload {
            vertices: STANDARD.encode(vertices),
            normals: row.normals.as_ref().map(|n| STANDARD.encode(n)),
            faces: STANDARD.encode(faces),
        }),
        _ => None,
    };

    Product {
        global_id: row.global_id.clone(),
        ifc_class: row.ifc_class.clone(),
        name: row.name.clone(),
        description: row.description.clone(),
        object_type: row.object_type.clone(),
        tag: row.tag.clone(),
        contained_in: None,
        mesh,
        relations: Vec::new(),
    }
}
