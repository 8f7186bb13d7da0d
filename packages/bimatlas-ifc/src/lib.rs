//! IFC 4.3 STEP extractor for BimAtlas.
//!
//! Parses an IFC (STEP physical file) into typed [`ProductRecord`]s and
//! directed [`RelationshipRecord`]s, ready for diffing and ingestion. This
//! crate never touches storage.
//!
//! Pipeline: the scanner finds entity spans in the `DATA;` section, the
//! tokenizer decodes attribute lists, and everything lands in a flat
//! [`ParsedModel`] arena keyed by instance id. Containment is resolved
//! before geometry; products are emitted spatial-structure-first with a
//! canonical SHA-256 content hash per record.
//!
//! Geometry is a pluggable [`Tessellator`]; the built-in engine handles the
//! IFC4 explicit face sets and bakes local placements into world
//! coordinates. Elements that cannot be tessellated are still emitted, with
//! empty geometry and a diagnostics note.
//!
//! ```no_run
//! let extraction = bimatlas_ifc::extract("building.ifc")?;
//! for product in extraction.products() {
//!     println!("{} {}", product.ifc_class, product.global_id);
//! }
//! # Ok::<(), bimatlas_ifc::ExtractionError>(())
//! ```

mod containment;
mod error;
mod geometry;
mod model;
mod records;
mod relationships;
mod scanner;
mod tokenizer;
mod types;

pub use containment::{build_containment_map, ContainmentMap};
pub use error::{ExtractionError, Result};
pub use geometry::{FaceSetTessellator, Mesh, Tessellator};
pub use model::ParsedModel;
pub use records::{
    content_hash, extract, extract_model, extract_str, extract_with, Extraction, ProductRecord,
    RelKind, RelationshipRecord,
};
pub use relationships::extract_relationships;
pub use types::{AttributeValue, Entity, EntityId, IfcClass};
