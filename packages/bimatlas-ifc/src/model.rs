//! Entity arena.
//!
//! All decoded entities live in one flat map keyed by instance id, with a
//! secondary index per type name. References stay `EntityId`s, so cyclic IFC
//! structures (relationships naming products naming relationships) never
//! become pointer cycles in memory.

use crate::error::{ExtractionError, Result};
use crate::records::RelKind;
use crate::scanner::{file_schema, EntityScanner};
use crate::tokenizer::parse_attributes;
use crate::types::{Entity, EntityId, IfcClass};
use rustc_hash::FxHashMap;

pub struct ParsedModel {
    entities: FxHashMap<u32, Entity>,
    by_type: FxHashMap<String, Vec<EntityId>>,
    schema: Option<String>,
    diagnostics: Vec<String>,
}

impl ParsedModel {
    /// Decode every entity of a STEP file.
    ///
    /// Entities of classes the extractor depends on (products, spatial
    /// structure, the objectified relationships) must parse; anything else
    /// that fails to parse is skipped with a diagnostic.
    pub fn parse(content: &str) -> Result<Self> {
        let scanner =
            EntityScanner::new(content).ok_or(ExtractionError::MissingDataSection)?;

        let mut entities = FxHashMap::default();
        let mut by_type: FxHashMap<String, Vec<EntityId>> = FxHashMap::default();
        let mut diagnostics = Vec::new();

        for raw in scanner {
            let id = EntityId(raw.id);
            let type_name = raw.type_name.to_ascii_uppercase();
            match parse_attributes(raw.body) {
                Ok(attributes) => {
                    let class = IfcClass::from_step_name(&type_name);
                    by_type.entry(type_name.clone()).or_default().push(id);
                    entities.insert(
                        raw.id,
                        Entity {
                            id,
                            type_name,
                            class,
                            attributes,
                        },
                    );
                }
                Err(reason) => {
                    let required = !matches!(
                        IfcClass::from_step_name(&type_name),
                        IfcClass::Other(_)
                    ) || RelKind::from_step_name(&type_name).is_some();
                    if required {
                        return Err(ExtractionError::MalformedEntity {
                            id,
                            ifc_type: type_name,
                            reason,
                        });
                    }
                    diagnostics.push(format!("skipped unparseable entity {id} ({type_name})"));
                }
            }
        }

        Ok(Self {
            entities,
            by_type,
            schema: file_schema(content),
            diagnostics,
        })
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id.0)
    }

    /// All instances of a STEP type name (upper-case, e.g. `IFCWALL`).
    pub fn of_type(&self, type_name: &str) -> impl Iterator<Item = &Entity> {
        self.by_type
            .get(type_name)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|id| self.entities.get(&id.0))
    }

    pub fn all(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Schema identifier from the file header, e.g. `IFC4X3_ADD2`.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}
