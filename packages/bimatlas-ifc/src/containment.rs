//! Spatial containment resolution.
//!
//! Maps each element `GlobalId` to the `GlobalId` of its enclosing spatial
//! container before any geometry work happens. Physical elements are placed
//! by `IfcRelContainedInSpatialStructure` (one container per element, IFC 4.3
//! sec 4.1.5.13); spatial elements themselves are placed by
//! `IfcRelAggregates` when aggregated under another spatial element.

use crate::model::ParsedModel;
use rustc_hash::FxHashMap;

/// element GlobalId → container GlobalId
pub type ContainmentMap = FxHashMap<String, String>;

pub fn build_containment_map(model: &ParsedModel) -> ContainmentMap {
    let mut map = ContainmentMap::default();

    // IfcRelContainedInSpatialStructure: RelatedElements=4, RelatingStructure=5
    for rel in model.of_type("IFCRELCONTAINEDINSPATIALSTRUCTURE") {
        let Some(container_gid) = rel
            .get_ref(5)
            .and_then(|id| model.get(id))
            .and_then(|e| e.global_id())
        else {
            continue;
        };
        for element_id in rel.get_ref_list(4) {
            if let Some(gid) = model.get(element_id).and_then(|e| e.global_id()) {
                map.insert(gid.to_string(), container_gid.to_string());
            }
        }
    }

    // IfcRelAggregates: RelatingObject=4, RelatedObjects=5.
    // Only spatial-under-spatial aggregation contributes containment; direct
    // containment above wins when both are present.
    for rel in model.of_type("IFCRELAGGREGATES") {
        let Some(parent) = rel.get_ref(4).and_then(|id| model.get(id)) else {
            continue;
        };
        if !parent.class.is_spatial() {
            continue;
        }
        let Some(parent_gid) = parent.global_id().map(str::to_string) else {
            continue;
        };
        for child_id in rel.get_ref_list(5) {
            let Some(child) = model.get(child_id) else {
                continue;
            };
            if !child.class.is_spatial() {
                continue;
            }
            if let Some(child_gid) = child.global_id() {
                map.entry(child_gid.to_string())
                    .or_insert_with(|| parent_gid.clone());
            }
        }
    }

    map
}
