//! Core types shared across the extractor: entity identifiers, the IFC class
//! enumeration, and decoded STEP attribute values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// STEP instance identifier (`#123` in the file).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// IFC 4.3 product classes, with `Other` capturing any class the fixed
/// enumeration does not name. Relationship entities are handled separately
/// (see [`crate::records::RelKind`]); they are never products.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum IfcClass {
    // Spatial structure
    IfcProject,
    IfcSite,
    IfcBuilding,
    IfcBuildingStorey,
    IfcSpace,

    // Building elements
    IfcWall,
    IfcWallStandardCase,
    IfcCurtainWall,
    IfcSlab,
    IfcRoof,
    IfcBeam,
    IfcColumn,
    IfcDoor,
    IfcWindow,
    IfcStair,
    IfcStairFlight,
    IfcRamp,
    IfcRampFlight,
    IfcRailing,
    IfcCovering,
    IfcPlate,
    IfcMember,
    IfcFooting,
    IfcPile,
    IfcBuildingElementProxy,
    IfcOpeningElement,

    // Furnishing and distribution
    IfcFurnishingElement,
    IfcFurniture,
    IfcDistributionElement,
    IfcFlowTerminal,
    IfcFlowSegment,
    IfcFlowFitting,

    /// Any other class, carrying the type name as it appeared in the file.
    Other(String),
}

impl IfcClass {
    /// Parse a STEP type name (upper-case in the file, e.g. `IFCWALL`).
    pub fn from_step_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "IFCPROJECT" => Self::IfcProject,
            "IFCSITE" => Self::IfcSite,
            "IFCBUILDING" => Self::IfcBuilding,
            "IFCBUILDINGSTOREY" => Self::IfcBuildingStorey,
            "IFCSPACE" => Self::IfcSpace,
            "IFCWALL" => Self::IfcWall,
            "IFCWALLSTANDARDCASE" => Self::IfcWallStandardCase,
            "IFCCURTAINWALL" => Self::IfcCurtainWall,
            "IFCSLAB" => Self::IfcSlab,
            "IFCROOF" => Self::IfcRoof,
            "IFCBEAM" => Self::IfcBeam,
            "IFCCOLUMN" => Self::IfcColumn,
            "IFCDOOR" => Self::IfcDoor,
            "IFCWINDOW" => Self::IfcWindow,
            "IFCSTAIR" => Self::IfcStair,
            "IFCSTAIRFLIGHT" => Self::IfcStairFlight,
            "IFCRAMP" => Self::IfcRamp,
            "IFCRAMPFLIGHT" => Self::IfcRampFlight,
            "IFCRAILING" => Self::IfcRailing,
            "IFCCOVERING" => Self::IfcCovering,
            "IFCPLATE" => Self::IfcPlate,
            "IFCMEMBER" => Self::IfcMember,
            "IFCFOOTING" => Self::IfcFooting,
            "IFCPILE" => Self::IfcPile,
            "IFCBUILDINGELEMENTPROXY" => Self::IfcBuildingElementProxy,
            "IFCOPENINGELEMENT" => Self::IfcOpeningElement,
            "IFCFURNISHINGELEMENT" => Self::IfcFurnishingElement,
            "IFCFURNITURE" => Self::IfcFurniture,
            "IFCDISTRIBUTIONELEMENT" => Self::IfcDistributionElement,
            "IFCFLOWTERMINAL" => Self::IfcFlowTerminal,
            "IFCFLOWSEGMENT" => Self::IfcFlowSegment,
            "IFCFLOWFITTING" => Self::IfcFlowFitting,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Canonical class name, e.g. `IfcWall`. `Other` returns the name as it
    /// appeared in the file.
    pub fn as_str(&self) -> &str {
        match self {
            Self::IfcProject => "IfcProject",
            Self::IfcSite => "IfcSite",
            Self::IfcBuilding => "IfcBuilding",
            Self::IfcBuildingStorey => "IfcBuildingStorey",
            Self::IfcSpace => "IfcSpace",
            Self::IfcWall => "IfcWall",
            Self::IfcWallStandardCase => "IfcWallStandardCase",
            Self::IfcCurtainWall => "IfcCurtainWall",
            Self::IfcSlab => "IfcSlab",
            Self::IfcRoof => "IfcRoof",
            Self::IfcBeam => "IfcBeam",
            Self::IfcColumn => "IfcColumn",
            Self::IfcDoor => "IfcDoor",
            Self::IfcWindow => "IfcWindow",
            Self::IfcStair => "IfcStair",
            Self::IfcStairFlight => "IfcStairFlight",
            Self::IfcRamp => "IfcRamp",
            Self::IfcRampFlight => "IfcRampFlight",
            Self::IfcRailing => "IfcRailing",
            Self::IfcCovering => "IfcCovering",
            Self::IfcPlate => "IfcPlate",
            Self::IfcMember => "IfcMember",
            Self::IfcFooting => "IfcFooting",
            Self::IfcPile => "IfcPile",
            Self::IfcBuildingElementProxy => "IfcBuildingElementProxy",
            Self::IfcOpeningElement => "IfcOpeningElement",
            Self::IfcFurnishingElement => "IfcFurnishingElement",
            Self::IfcFurniture => "IfcFurniture",
            Self::IfcDistributionElement => "IfcDistributionElement",
            Self::IfcFlowTerminal => "IfcFlowTerminal",
            Self::IfcFlowSegment => "IfcFlowSegment",
            Self::IfcFlowFitting => "IfcFlowFitting",
            Self::Other(name) => name,
        }
    }

    /// Spatial structure elements (containers in the decomposition tree).
    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            Self::IfcProject
                | Self::IfcSite
                | Self::IfcBuilding
                | Self::IfcBuildingStorey
                | Self::IfcSpace
        )
    }
}

impl fmt::Display for IfcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded STEP attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// Reference to another entity (`#123`).
    EntityRef(EntityId),
    /// `'text'`, with `''` unescaped.
    String(String),
    Integer(i64),
    Float(f64),
    /// Enumeration literal (`.TRUE.` → `TRUE`).
    Enum(String),
    /// Nested list `( … )`.
    List(Vec<AttributeValue>),
    /// Wrapped select value like `IFCLABEL('x')`.
    Typed(String, Vec<AttributeValue>),
    /// `$`
    Null,
    /// `*`
    Derived,
}

/// A fully decoded entity instance.
#[derive(Clone, Debug)]
pub struct Entity {
    pub id: EntityId,
    /// Type name exactly as written in the file (upper-case).
    pub type_name: String,
    pub class: IfcClass,
    pub attributes: Vec<AttributeValue>,
}

impl Entity {
    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index)
    }

    /// String attribute at `index`, unwrapping a typed select if present.
    pub fn get_string(&self, index: usize) -> Option<&str> {
        match self.get(index)? {
            AttributeValue::String(s) => Some(s),
            AttributeValue::Typed(_, inner) => match inner.first()? {
                AttributeValue::String(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_ref(&self, index: usize) -> Option<EntityId> {
        match self.get(index)? {
            AttributeValue::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    pub fn get_list(&self, index: usize) -> Option<&[AttributeValue]> {
        match self.get(index)? {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Entity references inside a list attribute.
    pub fn get_ref_list(&self, index: usize) -> Vec<EntityId> {
        self.get_list(index)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| match v {
                        AttributeValue::EntityRef(id) => Some(*id),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_float(&self, index: usize) -> Option<f64> {
        match self.get(index)? {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Typed(_, inner) => match inner.first()? {
                AttributeValue::Float(f) => Some(*f),
                AttributeValue::Integer(i) => Some(*i as f64),
                _ => None,
            },
            _ => None,
        }
    }

    /// The `GlobalId` of an `IfcRoot` subtype (always attribute 0).
    pub fn global_id(&self) -> Option<&str> {
        self.get_string(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_parses_case_insensitively() {
        assert_eq!(IfcClass::from_step_name("IFCWALL"), IfcClass::IfcWall);
        assert_eq!(IfcClass::from_step_name("IfcWall"), IfcClass::IfcWall);
    }

    #[test]
    fn unknown_class_keeps_name() {
        let c = IfcClass::from_step_name("IFCALIGNMENT");
        assert_eq!(c, IfcClass::Other("IFCALIGNMENT".to_string()));
        assert_eq!(c.as_str(), "IFCALIGNMENT");
    }

    #[test]
    fn spatial_classes() {
        assert!(IfcClass::IfcBuildingStorey.is_spatial());
        assert!(!IfcClass::IfcWall.is_spatial());
    }

    #[test]
    fn entity_accessors() {
        let e = Entity {
            id: EntityId(1),
            type_name: "IFCWALL".into(),
            class: IfcClass::IfcWall,
            attributes: vec![
                AttributeValue::String("2O2Fr$t4X7Zf8NOew3FL9r".into()),
                AttributeValue::Null,
                AttributeValue::String("Wall A".into()),
                AttributeValue::List(vec![
                    AttributeValue::EntityRef(EntityId(5)),
                    AttributeValue::EntityRef(EntityId(6)),
                ]),
            ],
        };
        assert_eq!(e.global_id(), Some("2O2Fr$t4X7Zf8NOew3FL9r"));
        assert_eq!(e.get_string(2), Some("Wall A"));
        assert_eq!(e.get_ref_list(3), vec![EntityId(5), EntityId(6)]);
        assert_eq!(e.get_string(1), None);
    }
}
