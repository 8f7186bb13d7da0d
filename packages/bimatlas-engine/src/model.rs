//! Domain models: catalog entities, versioned product rows, query DTOs.
//!
//! Rows keep raw mesh bytes; the serialized [`Product`] carries base64
//! strings and an open/`None` `valid_to`. The graph's `-1` sentinel never
//! leaks past this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── catalog ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: i64,
    pub branch_id: i64,
    pub label: Option<String>,
    pub source_filename: String,
    pub created_at: DateTime<Utc>,
}

// ── versioned product row (SCD Type 2) ──────────────────────────────────

/// One `ifc_products` row. Multiple rows may share a `global_id`; they are
/// distinguished by their validity window, and at most one per
/// `(branch_id, global_id)` is open (`valid_to_rev = None`).
#[derive(Clone, Debug)]
pub struct ProductRow {
    pub id: i64,
    pub branch_id: i64,
    pub global_id: String,
    pub ifc_class: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub object_type: Option<String>,
    pub tag: Option<String>,
    pub contained_in: Option<String>,
    pub vertices: Option<Vec<u8>>,
    pub normals: Option<Vec<u8>>,
    pub faces: Option<Vec<u8>>,
    pub matrix: Option<Vec<u8>>,
    pub content_hash: String,
    pub valid_from_rev: i64,
    pub valid_to_rev: Option<i64>,
}

impl ProductRow {
    /// Visibility at revision `rev`: `valid_from ≤ rev` and the window is
    /// still open at `rev`.
    pub fn visible_at(&self, rev: i64) -> bool {
        self.valid_from_rev <= rev && self.valid_to_rev.map_or(true, |to| to > rev)
    }

    pub fn is_open(&self) -> bool {
        self.valid_to_rev.is_none()
    }
}

// ── query DTOs ──────────────────────────────────────────────────────────

/// Mesh buffers, base64-encoded for text transports.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshPayload {
    /// Float32 x,y,z triples.
    pub vertices: String,
    /// Float32 normal triples; absent when the source had none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normals: Option<String>,
    /// Uint32 triangle indices.
    pub faces: String,
}

/// Reference to the spatial container of a product.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRef {
    pub global_id: String,
    pub ifc_class: String,
    pub name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A product reached over a graph edge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedProduct {
    pub global_id: String,
    pub ifc_class: String,
    pub name: Option<String>,
    /// IFC relationship entity name, e.g. `IfcRelAggregates`.
    pub relationship: String,
    pub direction: Direction,
}

/// Materialized product as served to consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub global_id: String,
    pub ifc_class: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub object_type: Option<String>,
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contained_in: Option<ContainerRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshPayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelatedProduct>,
}

/// A node in the graph, as returned by traversal reads.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNodeRef {
    pub global_id: String,
    pub ifc_class: String,
    pub name: Option<String>,
}

/// Recursive spatial decomposition tree node.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialNode {
    pub global_id: String,
    pub ifc_class: String,
    pub name: Option<String>,
    pub children: Vec<SpatialNode>,
    pub contained_elements: Vec<GraphNodeRef>,
}

// ── revision diff ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub global_id: String,
    pub ifc_class: String,
    pub name: Option<String>,
    pub change_type: ChangeType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionDiff {
    pub from_revision: i64,
    pub to_revision: i64,
    pub added: Vec<DiffEntry>,
    pub modified: Vec<DiffEntry>,
    pub deleted: Vec<DiffEntry>,
}

// ── ingestion ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// Summary of one completed ingestion run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResult {
    pub revision_id: i64,
    pub branch_id: i64,
    pub total_products: usize,
    pub counts: IngestionCounts,
    pub edges_created: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// Output of [`crate::store::RelationalStore::apply_revision`]: the new
/// revision id plus the change classification the graph mirror needs.
#[derive(Clone, Debug)]
pub struct AppliedRevision {
    pub revision_id: i64,
    pub change: crate::diff::ChangeSet,
}

// ── filters ─────────────────────────────────────────────────────────────

/// Product listing predicates; rows must match *all* supplied predicates.
/// `ifc_classes` is matched after client-side hierarchy expansion; the
/// string fields are case-insensitive substring matches.
#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub ifc_classes: Vec<String>,
    pub contained_in: Option<String>,
    pub global_id: Option<String>,
    pub name: Option<String>,
    pub object_type: Option<String>,
    pub tag: Option<String>,
    pub description: Option<String>,
}

impl ProductFilter {
    pub fn is_empty(&self) -> bool {
        self.ifc_classes.is_empty()
            && self.contained_in.is_none()
            && self.global_id.is_none()
            && self.name.is_none()
            && self.object_type.is_none()
            && self.tag.is_none()
            && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(from: i64, to: Option<i64>) -> ProductRow {
        ProductRow {
            id: 1,
            branch_id: 1,
            global_id: "2O2Fr$t4X7Zf8NOew3FL9r".into(),
            ifc_class: "IfcWall".into(),
            name: None,
            description: None,
            object_type: None,
            tag: None,
            contained_in: None,
            vertices: None,
            normals: None,
            faces: None,
            matrix: None,
            content_hash: "h".into(),
            valid_from_rev: from,
            valid_to_rev: to,
        }
    }

    #[test]
    fn visibility_window() {
        let open = row(2, None);
        assert!(!open.visible_at(1));
        assert!(open.visible_at(2));
        assert!(open.visible_at(99));

        let closed = row(1, Some(3));
        assert!(closed.visible_at(1));
        assert!(closed.visible_at(2));
        // valid_to_rev is exclusive: the row is superseded *at* revision 3.
        assert!(!closed.visible_at(3));
    }

    #[test]
    fn product_event_shape_is_camel_case() {
        let product = Product {
            global_id: "2O2Fr$t4X7Zf8NOew3FL9r".into(),
            ifc_class: "IfcWall".into(),
            name: Some("Wall A".into()),
            description: None,
            object_type: None,
            tag: None,
            contained_in: None,
            mesh: None,
            relations: Vec::new(),
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["globalId"], "2O2Fr$t4X7Zf8NOew3FL9r");
        assert_eq!(json["ifcClass"], "IfcWall");
        assert!(json.get("mesh").is_none());
    }
}
