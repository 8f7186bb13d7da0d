//! Client-side IFC class hierarchy.
//!
//! Class filters accept abstract ancestors (`IfcElement`, `IfcProduct`);
//! the store only knows concrete class strings, so filters are expanded to
//! self-plus-descendants here before they reach SQL. The table covers the
//! classes the extractor enumerates; unknown classes pass through
//! unexpanded.

use std::collections::HashSet;

const HIERARCHY: &[(&str, &[&str])] = &[
    ("IfcProduct", &["IfcElement", "IfcSpatialStructureElement"]),
    (
        "IfcElement",
        &[
            "IfcBuildingElement",
            "IfcDistributionElement",
            "IfcFurnishingElement",
            "IfcOpeningElement",
            "IfcBuildingElementProxy",
        ],
    ),
    (
        "IfcBuildingElement",
        &[
            "IfcWall",
            "IfcCurtainWall",
            "IfcSlab",
            "IfcRoof",
            "IfcBeam",
            "IfcColumn",
            "IfcDoor",
            "IfcWindow",
            "IfcStair",
            "IfcStairFlight",
            "IfcRamp",
            "IfcRampFlight",
            "IfcRailing",
            "IfcCovering",
            "IfcPlate",
            "IfcMember",
            "IfcFooting",
            "IfcPile",
        ],
    ),
    ("IfcWall", &["IfcWallStandardCase"]),
    (
        "IfcDistributionElement",
        &["IfcFlowTerminal", "IfcFlowSegment", "IfcFlowFitting"],
    ),
    ("IfcFurnishingElement", &["IfcFurniture"]),
    (
        "IfcSpatialStructureElement",
        &["IfcSite", "IfcBuilding", "IfcBuildingStorey", "IfcSpace"],
    ),
];

fn children_of(class: &str) -> &'static [&'static str] {
    HIERARCHY
        .iter()
        .find(|(parent, _)| *parent == class)
        .map(|(_, children)| *children)
        .unwrap_or(&[])
}

/// Expand each class to itself plus all transitive descendants,
/// deduplicated, preserving first-seen order.
pub fn expand_classes(classes: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    let mut queue: Vec<&str> = classes.iter().map(String::as_str).collect();

    while let Some(class) = queue.first().copied() {
        queue.remove(0);
        if seen.insert(class) {
            out.push(class.to_string());
            queue.extend(children_of(class));
        }
    }
    out
}
