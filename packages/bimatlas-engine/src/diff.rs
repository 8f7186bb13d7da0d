//! Snapshot diff engine.
//!
//! Pure classification of a new extraction against the currently-open rows
//! of a branch, keyed by content hash. No side effects; callers run it
//! inside the ingestion transaction against the open set they just loaded.

use std::collections::HashMap;

/// Disjoint change sets, each a sorted list of `global_id`s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Not present in the open rows.
    pub added: Vec<String>,
    /// Present, but the content hash differs.
    pub modified: Vec<String>,
    /// Open, but absent from the new snapshot.
    pub deleted: Vec<String>,
    /// Present with an identical hash.
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    /// `added ∪ modified`: the ids that get a new open row (and graph node).
    pub fn inserted(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }

    /// `modified ∪ deleted`: the ids whose open row (and graph node) closes.
    pub fn closed(&self) -> impl Iterator<Item = &String> {
        self.modified.iter().chain(self.deleted.iter())
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Compare the new `global_id → content_hash` map against the open rows.
pub fn diff_products(
    new: &HashMap<String, String>,
    open: &HashMap<String, String>,
) -> ChangeSet {
    let mut change = ChangeSet::default();

    for (gid, hash) in new {
        match open.get(gid) {
            None => change.added.push(gid.clone()),
            Some(current) if current != hash => change.modified.push(gid.clone()),
            Some(_) => change.unchanged.push(gid.clone()),
        }
    }
    for gid in open.keys() {
        if !new.contains_key(gid) {
            change.deleted.push(gid.clone());
        }
    }

    change.added.sort();
    change.modified.sort();
    change.deleted.sort();
    change.unchanged.sort();
    change
}
