use crate::types::EntityId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractionError>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read IFC file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not a STEP file: no DATA section found")]
    MissingDataSection,

    #[error("malformed entity {id} ({ifc_type}): {reason}")]
    MalformedEntity {
        id: EntityId,
        ifc_type: String,
        reason: String,
    },
}
