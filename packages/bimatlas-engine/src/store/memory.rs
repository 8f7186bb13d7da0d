//! In-memory adapters for both ports.
//!
//! HashMap/Vec-backed implementations for unit and integration tests; not
//! for production use. The graph adapter reproduces the AGE semantics the
//! writer depends on (open sentinel, close-if-open no-ops, dangling-edge
//! skips) and can be switched into a failing mode to exercise the
//! relational/graph atomicity gap.

use crate::diff::diff_products;
use crate::error::{EngineError, Result};
use crate::filter_sets::{FilterLogic, FilterRule, FilterSet};
use crate::model::{
    AppliedRevision, Branch, ChangeType, DiffEntry, Direction, GraphNodeRef, ProductFilter,
    ProductRow, Project, RelatedProduct, Revision, RevisionDiff,
};
use crate::store::{GraphStore, RelationalStore};
use async_trait::async_trait;
use bimatlas_ifc::ProductRecord;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ── relational ──────────────────────────────────────────────────────────

struct Relational {
    projects: Vec<Project>,
    branches: Vec<Branch>,
    revisions: Vec<Revision>,
    products: Vec<ProductRow>,
    filter_sets: Vec<FilterSet>,
    applied: HashMap<i64, Vec<i64>>,
    next_project: i64,
    next_branch: i64,
    next_revision: i64,
    next_row: i64,
    next_filter_set: i64,
}

impl Default for Relational {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            branches: Vec::new(),
            revisions: Vec::new(),
            products: Vec::new(),
            filter_sets: Vec::new(),
            applied: HashMap::new(),
            next_project: 1,
            next_branch: 1,
            next_revision: 1,
            next_row: 1,
            next_filter_set: 1,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Relational>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn matches_filter(row: &ProductRow, filter: &ProductFilter) -> bool {
    if !filter.ifc_classes.is_empty() && !filter.ifc_classes.contains(&row.ifc_class) {
        return false;
    }
    if let Some(container) = &filter.contained_in {
        if row.contained_in.as_deref() != Some(container.as_str()) {
            return false;
        }
    }
    let checks = [
        (Some(row.global_id.as_str()), &filter.global_id),
        (row.name.as_deref(), &filter.name),
        (row.object_type.as_deref(), &filter.object_type),
        (row.tag.as_deref(), &filter.tag),
        (row.description.as_deref(), &filter.description),
    ];
    checks
        .iter()
        .all(|(field, needle)| match needle {
            Some(needle) => contains_ci(*field, needle),
            None => true,
        })
}

impl Relational {
    fn visible<'a>(
        &'a self,
        branch_id: i64,
        rev: i64,
    ) -> impl Iterator<Item = &'a ProductRow> + 'a {
        self.products
            .iter()
            .filter(move |p| p.branch_id == branch_id && p.visible_at(rev))
    }

    fn visible_by_gid(&self, branch_id: i64, rev: i64) -> HashMap<&str, &ProductRow> {
        self.visible(branch_id, rev)
            .map(|p| (p.global_id.as_str(), p))
            .collect()
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(Project, Branch)> {
        let mut inner = self.inner.write();
        let project = Project {
            id: inner.next_project,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        inner.next_project += 1;
        let branch = Branch {
            id: inner.next_branch,
            project_id: project.id,
            name: "main".to_string(),
            created_at: Utc::now(),
        };
        inner.next_branch += 1;
        inner.projects.push(project.clone());
        inner.branches.push(branch.clone());
        Ok((project, branch))
    }

    async fn fetch_project(&self, project_id: i64) -> Result<Option<Project>> {
        Ok(self
            .inner
            .read()
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.inner.read().projects.clone())
    }

    async fn delete_project(&self, project_id: i64) -> Result<Vec<i64>> {
        let mut inner = self.inner.write();
        if !inner.projects.iter().any(|p| p.id == project_id) {
            return Err(EngineError::NotFound(format!("project {project_id}")));
        }
        let branch_ids: Vec<i64> = inner
            .branches
            .iter()
            .filter(|b| b.project_id == project_id)
            .map(|b| b.id)
            .collect();
        inner.projects.retain(|p| p.id != project_id);
        inner.branches.retain(|b| b.project_id != project_id);
        inner.revisions.retain(|r| !branch_ids.contains(&r.branch_id));
        inner.products.retain(|p| !branch_ids.contains(&p.branch_id));
        inner
            .filter_sets
            .retain(|fs| !branch_ids.contains(&fs.branch_id));
        for branch_id in &branch_ids {
            inner.applied.remove(branch_id);
        }
        Ok(branch_ids)
    }

    async fn create_branch(&self, project_id: i64, name: &str) -> Result<Branch> {
        let mut inner = self.inner.write();
        if !inner.projects.iter().any(|p| p.id == project_id) {
            return Err(EngineError::NotFound(format!("project {project_id}")));
        }
        if inner
            .branches
            .iter()
            .any(|b| b.project_id == project_id && b.name == name)
        {
            return Err(EngineError::DuplicateName(format!(
                "branch {name:?} already exists in project {project_id}"
            )));
        }
        let branch = Branch {
            id: inner.next_branch,
            project_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        inner.next_branch += 1;
        inner.branches.push(branch.clone());
        Ok(branch)
    }

    async fn fetch_branch(&self, branch_id: i64) -> Result<Option<Branch>> {
        Ok(self
            .inner
            .read()
            .branches
            .iter()
            .find(|b| b.id == branch_id)
            .cloned())
    }

    async fn list_branches(&self, project_id: i64) -> Result<Vec<Branch>> {
        Ok(self
            .inner
            .read()
            .branches
            .iter()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn latest_revision(&self, branch_id: i64) -> Result<Option<i64>> {
        Ok(self
            .inner
            .read()
            .revisions
            .iter()
            .filter(|r| r.branch_id == branch_id)
            .map(|r| r.id)
            .max())
    }

    async fn list_revisions(&self, branch_id: i64) -> Result<Vec<Revision>> {
        let mut revisions: Vec<Revision> = self
            .inner
            .read()
            .revisions
            .iter()
            .filter(|r| r.branch_id == branch_id)
            .cloned()
            .collect();
        revisions.sort_by_key(|r| r.id);
        Ok(revisions)
    }

    async fn apply_revision(
        &self,
        branch_id: i64,
        source_filename: &str,
        label: Option<&str>,
        records: &[ProductRecord],
    ) -> Result<AppliedRevision> {
        // The single write lock serialises ingestion per branch (and, in
        // this adapter, across branches).
        let mut inner = self.inner.write();
        if !inner.branches.iter().any(|b| b.id == branch_id) {
            return Err(EngineError::NotFound(format!("branch {branch_id}")));
        }

        let mut open: HashMap<String, String> = HashMap::new();
        let mut violations: Vec<String> = Vec::new();
        for row in inner
            .products
            .iter()
            .filter(|p| p.branch_id == branch_id && p.is_open())
        {
            if open
                .insert(row.global_id.clone(), row.content_hash.clone())
                .is_some()
            {
                violations.push(row.global_id.clone());
            }
        }
        if !violations.is_empty() {
            return Err(EngineError::Store(format!(
                "open-window invariant violated on branch {branch_id} for {violations:?}"
            )));
        }

        let revision_id = inner.next_revision;
        inner.next_revision += 1;
        inner.revisions.push(Revision {
            id: revision_id,
            branch_id,
            label: label.map(str::to_string),
            source_filename: source_filename.to_string(),
            created_at: Utc::now(),
        });

        let new: HashMap<String, String> = records
            .iter()
            .map(|r| (r.global_id.clone(), r.content_hash.clone()))
            .collect();
        let change = diff_products(&new, &open);

        let to_close: HashSet<&String> = change.closed().collect();
        for row in inner
            .products
            .iter_mut()
            .filter(|p| p.branch_id == branch_id && p.is_open())
        {
            if to_close.contains(&row.global_id) {
                row.valid_to_rev = Some(revision_id);
            }
        }

        let by_gid: HashMap<&str, &ProductRecord> = records
            .iter()
            .map(|r| (r.global_id.as_str(), r))
            .collect();
        let inserted: Vec<String> = change.inserted().cloned().collect();
        for gid in inserted {
            let record = by_gid[gid.as_str()];
            let row = ProductRow {
                id: inner.next_row,
                branch_id,
                global_id: record.global_id.clone(),
                ifc_class: record.ifc_class.as_str().to_string(),
                name: record.name.clone(),
                description: record.description.clone(),
                object_type: record.object_type.clone(),
                tag: record.tag.clone(),
                contained_in: record.contained_in.clone(),
                vertices: record.vertices.clone(),
                normals: record.normals.clone(),
                faces: record.faces.clone(),
                matrix: record.matrix.clone(),
                content_hash: record.content_hash.clone(),
                valid_from_rev: revision_id,
                valid_to_rev: None,
            };
            inner.next_row += 1;
            inner.products.push(row);
        }

        Ok(AppliedRevision {
            revision_id,
            change,
        })
    }

    async fn product_at(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Option<ProductRow>> {
        Ok(self
            .inner
            .read()
            .visible(branch_id, rev)
            .find(|p| p.global_id == global_id)
            .cloned())
    }

    async fn products_at(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
    ) -> Result<Vec<ProductRow>> {
        let mut rows: Vec<ProductRow> = self
            .inner
            .read()
            .visible(branch_id, rev)
            .filter(|p| matches_filter(p, filter))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.id);
        Ok(rows)
    }

    async fn count_products_at(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
    ) -> Result<i64> {
        Ok(self
            .inner
            .read()
            .visible(branch_id, rev)
            .filter(|p| matches_filter(p, filter))
            .count() as i64)
    }

    async fn products_page(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductRow>> {
        let rows = self.products_at(branch_id, rev, filter).await?;
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn revision_diff(
        &self,
        branch_id: i64,
        from_rev: i64,
        to_rev: i64,
    ) -> Result<RevisionDiff> {
        let inner = self.inner.read();
        let at_from = inner.visible_by_gid(branch_id, from_rev);
        let at_to = inner.visible_by_gid(branch_id, to_rev);

        let entry = |row: &ProductRow, change_type: ChangeType| DiffEntry {
            global_id: row.global_id.clone(),
            ifc_class: row.ifc_class.clone(),
            name: row.name.clone(),
            change_type,
        };

        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut deleted = Vec::new();

        for (gid, row) in &at_to {
            match at_from.get(gid) {
                None => added.push(entry(row, ChangeType::Added)),
                Some(old) if old.id != row.id => {
                    modified.push(entry(row, ChangeType::Modified));
                }
                Some(_) => {}
            }
        }
        for (gid, row) in &at_from {
            if !at_to.contains_key(gid) {
                deleted.push(entry(row, ChangeType::Deleted));
            }
        }

        added.sort_by(|a, b| a.global_id.cmp(&b.global_id));
        modified.sort_by(|a, b| a.global_id.cmp(&b.global_id));
        deleted.sort_by(|a, b| a.global_id.cmp(&b.global_id));

        Ok(RevisionDiff {
            from_revision: from_rev,
            to_revision: to_rev,
            added,
            modified,
            deleted,
        })
    }

    async fn open_window_violations(&self, branch_id: i64) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in inner
            .products
            .iter()
            .filter(|p| p.branch_id == branch_id && p.is_open())
        {
            *counts.entry(row.global_id.as_str()).or_insert(0) += 1;
        }
        let mut violations: Vec<String> = counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(gid, _)| gid.to_string())
            .collect();
        violations.sort();
        Ok(violations)
    }

    async fn create_filter_set(
        &self,
        branch_id: i64,
        name: &str,
        logic: FilterLogic,
        rules: &[FilterRule],
    ) -> Result<FilterSet> {
        let mut inner = self.inner.write();
        if !inner.branches.iter().any(|b| b.id == branch_id) {
            return Err(EngineError::NotFound(format!("branch {branch_id}")));
        }
        let set = FilterSet {
            id: inner.next_filter_set,
            branch_id,
            name: name.to_string(),
            logic,
            rules: rules.to_vec(),
            created_at: Utc::now(),
        };
        inner.next_filter_set += 1;
        inner.filter_sets.push(set.clone());
        Ok(set)
    }

    async fn fetch_filter_set(&self, filter_set_id: i64) -> Result<Option<FilterSet>> {
        Ok(self
            .inner
            .read()
            .filter_sets
            .iter()
            .find(|fs| fs.id == filter_set_id)
            .cloned())
    }

    async fn update_filter_set(
        &self,
        filter_set_id: i64,
        name: Option<&str>,
        logic: Option<FilterLogic>,
        rules: Option<&[FilterRule]>,
    ) -> Result<Option<FilterSet>> {
        let mut inner = self.inner.write();
        let Some(set) = inner
            .filter_sets
            .iter_mut()
            .find(|fs| fs.id == filter_set_id)
        else {
            return Ok(None);
        };
        if let Some(name) = name {
            set.name = name.to_string();
        }
        if let Some(logic) = logic {
            set.logic = logic;
        }
        if let Some(rules) = rules {
            set.rules = rules.to_vec();
        }
        Ok(Some(set.clone()))
    }

    async fn delete_filter_set(&self, filter_set_id: i64) -> Result<bool> {
        let mut inner = self.inner.write();
        let before = inner.filter_sets.len();
        inner.filter_sets.retain(|fs| fs.id != filter_set_id);
        for applied in inner.applied.values_mut() {
            applied.retain(|id| *id != filter_set_id);
        }
        Ok(inner.filter_sets.len() < before)
    }

    async fn list_filter_sets(&self, branch_id: i64) -> Result<Vec<FilterSet>> {
        Ok(self
            .inner
            .read()
            .filter_sets
            .iter()
            .filter(|fs| fs.branch_id == branch_id)
            .cloned()
            .collect())
    }

    async fn search_filter_sets(
        &self,
        query: &str,
        project_id: Option<i64>,
        branch_id: Option<i64>,
    ) -> Result<Vec<FilterSet>> {
        let inner = self.inner.read();
        let needle = query.to_lowercase();
        Ok(inner
            .filter_sets
            .iter()
            .filter(|fs| fs.name.to_lowercase().contains(&needle))
            .filter(|fs| match branch_id {
                Some(branch_id) => fs.branch_id == branch_id,
                None => true,
            })
            .filter(|fs| match project_id {
                Some(project_id) => inner
                    .branches
                    .iter()
                    .any(|b| b.id == fs.branch_id && b.project_id == project_id),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn set_applied_filter_sets(
        &self,
        branch_id: i64,
        filter_set_ids: &[i64],
    ) -> Result<()> {
        self.inner
            .write()
            .applied
            .insert(branch_id, filter_set_ids.to_vec());
        Ok(())
    }

    async fn applied_filter_sets(&self, branch_id: i64) -> Result<Vec<FilterSet>> {
        let inner = self.inner.read();
        let ids = inner.applied.get(&branch_id).cloned().unwrap_or_default();
        Ok(inner
            .filter_sets
            .iter()
            .filter(|fs| ids.contains(&fs.id))
            .cloned()
            .collect())
    }
}

// ── graph ───────────────────────────────────────────────────────────────

const OPEN: i64 = -1;

struct GNode {
    branch_id: i64,
    label: String,
    global_id: String,
    name: Option<String>,
    valid_from: i64,
    valid_to: i64,
}

impl GNode {
    fn visible_at(&self, rev: i64) -> bool {
        self.valid_from <= rev && (self.valid_to == OPEN || self.valid_to > rev)
    }

    fn is_open(&self) -> bool {
        self.valid_to == OPEN
    }
}

struct GEdge {
    branch_id: i64,
    label: String,
    from_node: u64,
    to_node: u64,
    from_gid: String,
    to_gid: String,
    valid_from: i64,
    valid_to: i64,
}

impl GEdge {
    fn visible_at(&self, rev: i64) -> bool {
        self.valid_from <= rev && (self.valid_to == OPEN || self.valid_to > rev)
    }
}

#[derive(Default)]
struct Graph {
    nodes: HashMap<u64, GNode>,
    edges: Vec<GEdge>,
    next_node: u64,
}

#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<RwLock<Graph>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail, to simulate a graph outage after the
    /// relational commit.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(EngineError::Store("graph backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Test helper: open node instances for `(branch, global_id)`.
    pub fn open_node_count(&self, branch_id: i64, global_id: &str) -> usize {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|n| n.branch_id == branch_id && n.global_id == global_id && n.is_open())
            .count()
    }

    /// Test helper: open edges on a branch.
    pub fn open_edge_count(&self, branch_id: i64) -> usize {
        self.inner
            .read()
            .edges
            .iter()
            .filter(|e| e.branch_id == branch_id && e.valid_to == OPEN)
            .count()
    }

    fn node_ref(node: &GNode) -> GraphNodeRef {
        GraphNodeRef {
            global_id: node.global_id.clone(),
            ifc_class: node.label.clone(),
            name: node.name.clone(),
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn ensure_graph(&self) -> Result<()> {
        Ok(())
    }

    async fn create_node(
        &self,
        branch_id: i64,
        ifc_class: &str,
        global_id: &str,
        name: Option<&str>,
        rev: i64,
    ) -> Result<()> {
        self.check_writable()?;
        let mut graph = self.inner.write();
        let id = graph.next_node;
        graph.next_node += 1;
        graph.nodes.insert(
            id,
            GNode {
                branch_id,
                label: ifc_class.to_string(),
                global_id: global_id.to_string(),
                name: name.map(str::to_string),
                valid_from: rev,
                valid_to: OPEN,
            },
        );
        Ok(())
    }

    async fn close_node(&self, branch_id: i64, global_id: &str, rev: i64) -> Result<()> {
        self.check_writable()?;
        let mut graph = self.inner.write();
        for node in graph.nodes.values_mut() {
            if node.branch_id == branch_id && node.global_id == global_id && node.is_open() {
                node.valid_to = rev;
            }
        }
        Ok(())
    }

    async fn create_edge(
        &self,
        branch_id: i64,
        from_global_id: &str,
        to_global_id: &str,
        label: &str,
        rev: i64,
    ) -> Result<bool> {
        self.check_writable()?;
        let mut graph = self.inner.write();
        let find_open = |graph: &Graph, gid: &str| {
            graph
                .nodes
                .iter()
                .find(|(_, n)| n.branch_id == branch_id && n.global_id == gid && n.is_open())
                .map(|(id, _)| *id)
        };
        let (Some(from_node), Some(to_node)) = (
            find_open(&graph, from_global_id),
            find_open(&graph, to_global_id),
        ) else {
            return Ok(false);
        };
        graph.edges.push(GEdge {
            branch_id,
            label: label.to_string(),
            from_node,
            to_node,
            from_gid: from_global_id.to_string(),
            to_gid: to_global_id.to_string(),
            valid_from: rev,
            valid_to: OPEN,
        });
        Ok(true)
    }

    async fn close_edges_for_node(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<()> {
        self.check_writable()?;
        let mut graph = self.inner.write();
        for edge in graph.edges.iter_mut() {
            if edge.branch_id == branch_id
                && edge.valid_to == OPEN
                && (edge.from_gid == global_id || edge.to_gid == global_id)
            {
                edge.valid_to = rev;
            }
        }
        Ok(())
    }

    async fn purge_branch(&self, branch_id: i64) -> Result<()> {
        self.check_writable()?;
        let mut graph = self.inner.write();
        graph.nodes.retain(|_, n| n.branch_id != branch_id);
        graph.edges.retain(|e| e.branch_id != branch_id);
        Ok(())
    }

    async fn relations_of(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<RelatedProduct>> {
        let graph = self.inner.read();
        let mut relations = Vec::new();
        let mut seen: HashSet<(String, String, Direction)> = HashSet::new();

        for edge in graph
            .edges
            .iter()
            .filter(|e| e.branch_id == branch_id && e.visible_at(rev))
        {
            let (other_node, direction) = if edge.from_gid == global_id {
                (edge.to_node, Direction::Outgoing)
            } else if edge.to_gid == global_id {
                (edge.from_node, Direction::Incoming)
            } else {
                continue;
            };
            let this_node = if direction == Direction::Outgoing {
                edge.from_node
            } else {
                edge.to_node
            };
            let visible = |id: u64| graph.nodes.get(&id).is_some_and(|n| n.visible_at(rev));
            if !visible(this_node) || !visible(other_node) {
                continue;
            }
            let other = &graph.nodes[&other_node];
            if seen.insert((other.global_id.clone(), edge.label.clone(), direction)) {
                relations.push(RelatedProduct {
                    global_id: other.global_id.clone(),
                    ifc_class: other.label.clone(),
                    name: other.name.clone(),
                    relationship: edge.label.clone(),
                    direction,
                });
            }
        }
        Ok(relations)
    }

    async fn spatial_roots(&self, branch_id: i64, rev: i64) -> Result<Vec<GraphNodeRef>> {
        let graph = self.inner.read();
        let mut roots: Vec<GraphNodeRef> = graph
            .nodes
            .values()
            .filter(|n| n.branch_id == branch_id && n.label == "IfcProject" && n.visible_at(rev))
            .map(Self::node_ref)
            .collect();
        roots.sort_by(|a, b| a.global_id.cmp(&b.global_id));
        Ok(roots)
    }

    async fn spatial_children(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<GraphNodeRef>> {
        let graph = self.inner.read();
        let mut children = Vec::new();
        for edge in graph.edges.iter().filter(|e| {
            e.branch_id == branch_id
                && e.label == "IfcRelAggregates"
                && e.from_gid == global_id
                && e.visible_at(rev)
        }) {
            let parent_visible = graph
                .nodes
                .get(&edge.from_node)
                .is_some_and(|n| n.visible_at(rev));
            if let Some(child) = graph.nodes.get(&edge.to_node) {
                if parent_visible && child.visible_at(rev) {
                    children.push(Self::node_ref(child));
                }
            }
        }
        children.sort_by(|a, b| a.global_id.cmp(&b.global_id));
        Ok(children)
    }

    async fn contained_elements(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<GraphNodeRef>> {
        let graph = self.inner.read();
        let mut elements = Vec::new();
        for edge in graph.edges.iter().filter(|e| {
            e.branch_id == branch_id
                && e.label == "IfcRelContainedInSpatialStructure"
                && e.to_gid == global_id
                && e.visible_at(rev)
        }) {
            let spatial_visible = graph
                .nodes
                .get(&edge.to_node)
                .is_some_and(|n| n.visible_at(rev));
            if let Some(element) = graph.nodes.get(&edge.from_node) {
                if spatial_visible && element.visible_at(rev) {
                    elements.push(Self::node_ref(element));
                }
            }
        }
        elements.sort_by(|a, b| a.global_id.cmp(&b.global_id));
        Ok(elements)
    }
}
