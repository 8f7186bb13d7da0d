//! Product and relationship records.
//!
//! The two-phase extraction mirrors the ingestion model: spatial structure
//! elements first (no geometry), then every product with a tessellatable
//! representation. Each record carries a SHA-256 `content_hash` over all
//! mutable fields; the serialization length-prefixes every field so only
//! identical attribute-plus-geometry products hash equal.

use crate::containment::build_containment_map;
use crate::error::{ExtractionError, Result};
use crate::geometry::{FaceSetTessellator, Mesh, Tessellator};
use crate::model::ParsedModel;
use crate::relationships::extract_relationships;
use crate::types::{Entity, IfcClass};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// The objectified relationship entities mirrored as graph edge labels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum RelKind {
    Aggregates,
    ContainedInSpatialStructure,
    ConnectsElements,
    VoidsElement,
    FillsElement,
}

impl RelKind {
    pub const ALL: [RelKind; 5] = [
        RelKind::Aggregates,
        RelKind::ContainedInSpatialStructure,
        RelKind::ConnectsElements,
        RelKind::VoidsElement,
        RelKind::FillsElement,
    ];

    /// Edge label, identical to the IFC entity name.
    pub fn as_label(&self) -> &'static str {
        match self {
            RelKind::Aggregates => "IfcRelAggregates",
            RelKind::ContainedInSpatialStructure => "IfcRelContainedInSpatialStructure",
            RelKind::ConnectsElements => "IfcRelConnectsElements",
            RelKind::VoidsElement => "IfcRelVoidsElement",
            RelKind::FillsElement => "IfcRelFillsElement",
        }
    }

    pub fn from_step_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "IFCRELAGGREGATES" => Some(RelKind::Aggregates),
            "IFCRELCONTAINEDINSPATIALSTRUCTURE" => Some(RelKind::ContainedInSpatialStructure),
            "IFCRELCONNECTSELEMENTS" => Some(RelKind::ConnectsElements),
            "IFCRELVOIDSELEMENT" => Some(RelKind::VoidsElement),
            "IFCRELFILLSELEMENT" => Some(RelKind::FillsElement),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_label() == label)
    }
}

/// A directed relationship to create as a graph edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub from_global_id: String,
    pub to_global_id: String,
    pub kind: RelKind,
}

/// One extracted product, mapping 1:1 to a versioned product row.
///
/// Geometry buffers are little-endian: vertices and normals are f32 triples,
/// faces are u32 triangle indices, the matrix is a 4×4 f64. World transforms
/// are already baked into the vertices, so the stored matrix is identity.
#[derive(Clone, Debug)]
pub struct ProductRecord {
    pub global_id: String,
    pub ifc_class: IfcClass,
    pub name: Option<String>,
    pub description: Option<String>,
    pub object_type: Option<String>,
    pub tag: Option<String>,
    /// GlobalId of the enclosing spatial container, if any.
    pub contained_in: Option<String>,
    pub vertices: Option<Vec<u8>>,
    pub normals: Option<Vec<u8>>,
    pub faces: Option<Vec<u8>>,
    pub matrix: Option<Vec<u8>>,
    pub content_hash: String,
}

impl ProductRecord {
    pub fn has_geometry(&self) -> bool {
        self.vertices.is_some() && self.faces.is_some()
    }
}

/// Result of extracting one IFC file. Never touches storage.
#[derive(Debug, Default)]
pub struct Extraction {
    pub schema: Option<String>,
    pub diagnostics: Vec<String>,
    products: Vec<ProductRecord>,
    relationships: Vec<RelationshipRecord>,
}

impl Extraction {
    pub fn products(&self) -> impl Iterator<Item = &ProductRecord> {
        self.products.iter()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipRecord> {
        self.relationships.iter()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn into_parts(self) -> (Vec<ProductRecord>, Vec<RelationshipRecord>, Vec<String>) {
        (self.products, self.relationships, self.diagnostics)
    }
}

// ── content hash ────────────────────────────────────────────────────────

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u32).to_le_bytes());
    hasher.update(bytes);
}

fn opt_str(value: &Option<String>) -> &[u8] {
    value.as_deref().unwrap_or("").as_bytes()
}

fn opt_bytes(value: &Option<Vec<u8>>) -> &[u8] {
    value.as_deref().unwrap_or(&[])
}

/// Canonical SHA-256 over all mutable fields, in fixed order, each field
/// length-prefixed (little-endian u32).
pub fn content_hash(record: &ProductRecord) -> String {
    let mut hasher = Sha256::new();
    hash_field(&mut hasher, record.ifc_class.as_str().as_bytes());
    hash_field(&mut hasher, opt_str(&record.name));
    hash_field(&mut hasher, opt_str(&record.description));
    hash_field(&mut hasher, opt_str(&record.object_type));
    hash_field(&mut hasher, opt_str(&record.tag));
    hash_field(&mut hasher, opt_str(&record.contained_in));
    hash_field(&mut hasher, opt_bytes(&record.vertices));
    hash_field(&mut hasher, opt_bytes(&record.normals));
    hash_field(&mut hasher, opt_bytes(&record.faces));
    hash_field(&mut hasher, opt_bytes(&record.matrix));
    format!("{:x}", hasher.finalize())
}

// ── buffer encoding ─────────────────────────────────────────────────────

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn u32_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn identity_matrix_bytes() -> Vec<u8> {
    let mut m = [0.0f64; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[10] = 1.0;
    m[15] = 1.0;
    m.iter().flat_map(|v| v.to_le_bytes()).collect()
}

// ── extraction ──────────────────────────────────────────────────────────

const SPATIAL_TYPES: [&str; 5] = [
    "IFCPROJECT",
    "IFCSITE",
    "IFCBUILDING",
    "IFCBUILDINGSTOREY",
    "IFCSPACE",
];

/// A product candidate: known element classes always qualify; unknown
/// classes qualify when they look like an `IfcProduct` (22-char GlobalId
/// plus a placement or representation reference) and are not an
/// objectified relationship.
fn is_element_product(entity: &Entity) -> bool {
    if entity.class.is_spatial() {
        return false;
    }
    match &entity.class {
        IfcClass::Other(name) => {
            !name.to_ascii_uppercase().starts_with("IFCREL")
                && entity.global_id().is_some_and(|g| g.len() == 22)
                && (entity.get_ref(5).is_some() || entity.get_ref(6).is_some())
        }
        _ => entity.global_id().is_some(),
    }
}

fn base_record(entity: &Entity, contained_in: Option<String>) -> ProductRecord {
    ProductRecord {
        global_id: entity.global_id().unwrap_or_default().to_string(),
        ifc_class: entity.class.clone(),
        name: entity.get_string(2).map(str::to_string),
        description: entity.get_string(3).map(str::to_string),
        object_type: entity.get_string(4).map(str::to_string),
        tag: None,
        contained_in,
        vertices: None,
        normals: None,
        faces: None,
        matrix: None,
        content_hash: String::new(),
    }
}

fn attach_mesh(record: &mut ProductRecord, mesh: Mesh) {
    record.normals = (!mesh.normals.is_empty()).then(|| f32_bytes(&mesh.normals));
    record.vertices = Some(f32_bytes(&mesh.vertices));
    record.faces = Some(u32_bytes(&mesh.faces));
    record.matrix = Some(identity_matrix_bytes());
}

/// Extract all products and relationships from parsed STEP content.
pub fn extract_model(model: &ParsedModel, tessellator: &dyn Tessellator) -> Extraction {
    let containment = build_containment_map(model);
    let mut diagnostics = model.diagnostics().to_vec();

    // Phase 1: spatial structure elements, no geometry.
    let mut spatial = Vec::new();
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for spatial_type in SPATIAL_TYPES {
        for entity in model.of_type(spatial_type) {
            let Some(gid) = entity.global_id() else { continue };
            if !seen.insert(gid) {
                continue;
            }
            let mut record = base_record(entity, containment.get(gid).cloned());
            record.content_hash = content_hash(&record);
            spatial.push(record);
        }
    }

    // Phase 2: element products, sorted by instance id for stable output.
    let mut element_entities: Vec<&Entity> =
        model.all().filter(|e| is_element_product(e)).collect();
    element_entities.sort_by_key(|e| e.id.0);

    let mut elements = Vec::new();
    for entity in element_entities {
        let gid = entity.global_id().unwrap_or_default();
        if gid.is_empty() || !seen.insert(gid) {
            continue;
        }
        let mut record = base_record(entity, containment.get(gid).cloned());
        // IfcElement.Tag
        record.tag = entity.get_string(7).map(str::to_string);

        match tessellator.tessellate(model, entity) {
            Some(mesh) if !mesh.is_empty() => attach_mesh(&mut record, mesh),
            _ => {
                if entity.get_ref(6).is_some() {
                    diagnostics.push(format!(
                        "no tessellatable representation for {} ({})",
                        record.global_id, record.ifc_class
                    ));
                }
            }
        }
        record.content_hash = content_hash(&record);
        elements.push(record);
    }

    let mut products = spatial;
    products.extend(elements);
    tracing::debug!(
        products = products.len(),
        diagnostics = diagnostics.len(),
        "extraction complete"
    );

    Extraction {
        schema: model.schema().map(str::to_string),
        diagnostics,
        products,
        relationships: extract_relationships(model),
    }
}

/// Parse and extract STEP content held in memory.
pub fn extract_str(content: &str, tessellator: &dyn Tessellator) -> Result<Extraction> {
    let model = ParsedModel::parse(content)?;
    Ok(extract_model(&model, tessellator))
}

/// Parse and extract an IFC file with the built-in face-set tessellator.
pub fn extract(path: impl AsRef<Path>) -> Result<Extraction> {
    extract_with(path, &FaceSetTessellator)
}

/// Parse and extract an IFC file with a caller-supplied geometry engine.
pub fn extract_with(path: impl AsRef<Path>, tessellator: &dyn Tessellator) -> Result<Extraction> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_str(&content, tessellator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: Option<&str>, description: Option<&str>) -> ProductRecord {
        ProductRecord {
            global_id: "0WallGid000000000000aa".into(),
            ifc_class: IfcClass::IfcWall,
            name: name.map(str::to_string),
            description: description.map(str::to_string),
            object_type: None,
            tag: None,
            contained_in: None,
            vertices: None,
            normals: None,
            faces: None,
            matrix: None,
            content_hash: String::new(),
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let a = record(Some("Wall A"), None);
        let b = record(Some("Wall A"), None);
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_changes_with_any_field() {
        let base = record(Some("Wall A"), None);
        let renamed = record(Some("Wall A'"), None);
        assert_ne!(content_hash(&base), content_hash(&renamed));

        let mut with_geometry = record(Some("Wall A"), None);
        with_geometry.vertices = Some(vec![0, 0, 128, 63]);
        assert_ne!(content_hash(&base), content_hash(&with_geometry));
    }

    #[test]
    fn field_boundaries_do_not_collide() {
        // ("ab", "") and ("a", "b") must hash differently.
        let ab = record(Some("ab"), Some(""));
        let a_b = record(Some("a"), Some("b"));
        assert_ne!(content_hash(&ab), content_hash(&a_b));
    }

    #[test]
    fn global_id_is_not_hashed() {
        let a = record(Some("Wall A"), None);
        let mut b = record(Some("Wall A"), None);
        b.global_id = "0Othr0000000000000000a".into();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn rel_kind_labels_round_trip() {
        for kind in RelKind::ALL {
            assert_eq!(RelKind::from_label(kind.as_label()), Some(kind));
        }
        assert_eq!(
            RelKind::from_step_name("IFCRELAGGREGATES"),
            Some(RelKind::Aggregates)
        );
    }
}
