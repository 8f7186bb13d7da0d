//! Objectified relationship extraction.
//!
//! Produces directed `(from, to, kind)` triples for the relationship
//! entities that become graph edges. Directions follow IFC semantics:
//!
//! - `IfcRelAggregates`: parent → child
//! - `IfcRelContainedInSpatialStructure`: element → spatial container
//! - `IfcRelVoidsElement`: building element → opening element
//! - `IfcRelFillsElement`: opening element → filling element
//! - `IfcRelConnectsElements`: relating element → related element
//!
//! Only endpoints with a `GlobalId` are emitted (all `IfcRoot` subtypes).

use crate::model::ParsedModel;
use crate::records::{RelKind, RelationshipRecord};
use crate::types::Entity;

fn gid_of(model: &ParsedModel, entity: &Entity, index: usize) -> Option<String> {
    entity
        .get_ref(index)
        .and_then(|id| model.get(id))
        .and_then(|e| e.global_id())
        .map(str::to_string)
}

pub fn extract_relationships(model: &ParsedModel) -> Vec<RelationshipRecord> {
    let mut records = Vec::new();

    // RelatingObject=4, RelatedObjects=5
    for rel in model.of_type("IFCRELAGGREGATES") {
        let Some(parent) = gid_of(model, rel, 4) else {
            continue;
        };
        for child_id in rel.get_ref_list(5) {
            if let Some(child) = model.get(child_id).and_then(|e| e.global_id()) {
                records.push(RelationshipRecord {
                    from_global_id: parent.clone(),
                    to_global_id: child.to_string(),
                    kind: RelKind::Aggregates,
                });
            }
        }
    }

    // RelatedElements=4, RelatingStructure=5; edge runs element → container
    for rel in model.of_type("IFCRELCONTAINEDINSPATIALSTRUCTURE") {
        let Some(container) = gid_of(model, rel, 5) else {
            continue;
        };
        for element_id in rel.get_ref_list(4) {
            if let Some(element) = model.get(element_id).and_then(|e| e.global_id()) {
                records.push(RelationshipRecord {
                    from_global_id: element.to_string(),
                    to_global_id: container.clone(),
                    kind: RelKind::ContainedInSpatialStructure,
                });
            }
        }
    }

    // RelatingBuildingElement=4, RelatedOpeningElement=5
    for rel in model.of_type("IFCRELVOIDSELEMENT") {
        if let (Some(from), Some(to)) = (gid_of(model, rel, 4), gid_of(model, rel, 5)) {
            records.push(RelationshipRecord {
                from_global_id: from,
                to_global_id: to,
                kind: RelKind::VoidsElement,
            });
        }
    }

    // RelatingOpeningElement=4, RelatedBuildingElement=5
    for rel in model.of_type("IFCRELFILLSELEMENT") {
        if let (Some(from), Some(to)) = (gid_of(model, rel, 4), gid_of(model, rel, 5)) {
            records.push(RelationshipRecord {
                from_global_id: from,
                to_global_id: to,
                kind: RelKind::FillsElement,
            });
        }
    }

    // ConnectionGeometry=4, RelatingElement=5, RelatedElement=6
    for rel in model.of_type("IFCRELCONNECTSELEMENTS") {
        if let (Some(from), Some(to)) = (gid_of(model, rel, 5), gid_of(model, rel, 6)) {
            records.push(RelationshipRecord {
                from_global_id: from,
                to_global_id: to,
                kind: RelKind::ConnectsElements,
            });
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "DATA;\n\
#1=IFCBUILDINGSTOREY('0StryGid000000000000aa',$,'S',$,$,$,$,$,.ELEMENT.,0.);\n\
#2=IFCWALL('0WallGid000000000000aa',$,'W',$,$,$,$,$);\n\
#3=IFCOPENINGELEMENT('0OpenGid000000000000aa',$,$,$,$,$,$,$);\n\
#4=IFCDOOR('0DoorGid000000000000aa',$,$,$,$,$,$,$);\n\
#5=IFCRELCONTAINEDINSPATIALSTRUCTURE('0RC1xGid000000000000aa',$,$,$,(#2,#4),#1);\n\
#6=IFCRELVOIDSELEMENT('0RV1xGid000000000000aa',$,$,$,#2,#3);\n\
#7=IFCRELFILLSELEMENT('0RF1xGid000000000000aa',$,$,$,#3,#4);\n\
#8=IFCRELCONNECTSELEMENTS('0RX1xGid000000000000aa',$,$,$,$,#2,#4);\n\
ENDSEC;";

    #[test]
    fn all_five_directions() {
        let model = ParsedModel::parse(FIXTURE).unwrap();
        let mut rels = extract_relationships(&model);
        rels.sort_by(|a, b| a.kind.as_label().cmp(b.kind.as_label()));

        let containment: Vec<_> = rels
            .iter()
            .filter(|r| r.kind == RelKind::ContainedInSpatialStructure)
            .collect();
        assert_eq!(containment.len(), 2);
        // element → container
        assert!(containment
            .iter()
            .all(|r| r.to_global_id == "0StryGid000000000000aa"));

        let voids = rels.iter().find(|r| r.kind == RelKind::VoidsElement).unwrap();
        assert_eq!(voids.from_global_id, "0WallGid000000000000aa");
        assert_eq!(voids.to_global_id, "0OpenGid000000000000aa");

        let fills = rels.iter().find(|r| r.kind == RelKind::FillsElement).unwrap();
        assert_eq!(fills.from_global_id, "0OpenGid000000000000aa");
        assert_eq!(fills.to_global_id, "0DoorGid000000000000aa");

        let connects = rels
            .iter()
            .find(|r| r.kind == RelKind::ConnectsElements)
            .unwrap();
        assert_eq!(connects.from_global_id, "0WallGid000000000000aa");
        assert_eq!(connects.to_global_id, "0DoorGid000000000000aa");
    }

    #[test]
    fn dangling_reference_is_skipped() {
        let broken = "DATA;\n\
#2=IFCWALL('0WallGid000000000000aa',$,'W',$,$,$,$,$);\n\
#6=IFCRELVOIDSELEMENT('0RV1xGid000000000000aa',$,$,$,#2,#99);\n\
ENDSEC;";
        let model = ParsedModel::parse(broken).unwrap();
        assert!(extract_relationships(&model).is_empty());
    }
}
