//! Parameter safety for graph query construction.
//!
//! `GlobalId`s and labels are embedded into openCypher text (the backend
//! does not parametrize label names), so both are validated against strict
//! alphabets and string values are escaped before embedding.

use crate::error::{EngineError, Result};

/// IFC `GlobalId`: exactly 22 characters of the IFC base64 alphabet
/// (`0-9A-Za-z_$`).
pub fn validate_global_id(value: &str) -> Result<&str> {
    let valid = value.len() == 22
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');
    if valid {
        Ok(value)
    } else {
        Err(EngineError::Validation(format!(
            "invalid GlobalId syntax: {value:?}"
        )))
    }
}

/// Node/edge label: `[A-Za-z][A-Za-z0-9]*`.
pub fn validate_label(label: &str) -> Result<&str> {
    let mut bytes = label.bytes();
    let valid = matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric());
    if valid {
        Ok(label)
    } else {
        Err(EngineError::Validation(format!("invalid label: {label:?}")))
    }
}

/// Escape a string for embedding inside a single-quoted Cypher literal.
pub fn escape_cypher_string(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
}

/// Revision/branch visibility clause for a query alias. The graph uses the
/// sentinel `-1` for an open `valid_to_rev`.
pub fn rev_filter(alias: &str, branch_id: i64, rev: i64) -> String {
    format!(
        "{alias}.branch_id = {branch_id} AND {alias}.valid_from_rev <= {rev} \
         AND ({alias}.valid_to_rev = -1 OR {alias}.valid_to_rev > {rev})"
    )
}
