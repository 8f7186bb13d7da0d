use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error taxonomy. `kind()` is the stable string carried on the
/// boundary; internal sources are logged, never serialized.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Extraction(#[from] bimatlas_ifc::ExtractionError),

    #[error("store error: {0}")]
    Store(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NotFound",
            EngineError::DuplicateName(_) => "DuplicateName",
            EngineError::Validation(_) => "ValidationError",
            EngineError::Extraction(_) => "ExtractionError",
            EngineError::Store(_) => "StoreError",
            EngineError::Conflict(_) => "ConflictError",
            EngineError::Cancelled(_) => "Cancelled",
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // SQLSTATE 23505: unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return EngineError::DuplicateName(db_err.message().to_string());
            }
        }
        EngineError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::NotFound("x".into()).kind(), "NotFound");
        assert_eq!(EngineError::Validation("x".into()).kind(), "ValidationError");
        assert_eq!(EngineError::Conflict("x".into()).kind(), "ConflictError");
        assert_eq!(EngineError::Cancelled("x".into()).kind(), "Cancelled");
    }

    #[test]
    fn extraction_errors_carry_through() {
        let err: EngineError = bimatlas_ifc::ExtractionError::MissingDataSection.into();
        assert_eq!(err.kind(), "ExtractionError");
    }
}
