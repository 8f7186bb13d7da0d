//! Shared STEP fixtures and helpers for the engine tests.
#![allow(dead_code)] // each test binary uses a different subset

use bimatlas_engine::{Deadline, Engine, IngestionResult, Result};
use bimatlas_ifc::{extract_str, FaceSetTessellator};

pub const PROJECT_GID: &str = "0Proj0000000000000000a";
pub const STOREY_GID: &str = "1XS$$$$$$$$$$$$$$$$$$$";
pub const WALL_GID: &str = "2O2Fr$t4X7Zf8NOew3FL9r";
pub const BEAM_GID: &str = "3ABC0000000000000000ab";

fn step_file(data_section: &str) -> String {
    format!(
        "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4X3_ADD2'));\nENDSEC;\nDATA;\n{data_section}ENDSEC;\nEND-ISO-10303-21;\n"
    )
}

fn wall_entities(wall_name: &str) -> String {
    format!(
        "#10=IFCCARTESIANPOINT((0.,0.,0.));\n\
#11=IFCAXIS2PLACEMENT3D(#10,$,$);\n\
#12=IFCLOCALPLACEMENT($,#11);\n\
#20=IFCCARTESIANPOINTLIST3D(((0.,0.,0.),(1.,0.,0.),(1.,0.,3.),(0.,0.,3.)));\n\
#21=IFCTRIANGULATEDFACESET(#20,$,.T.,((1,2,3),(1,3,4)),$);\n\
#22=IFCSHAPEREPRESENTATION($,'Body','Tessellation',(#21));\n\
#23=IFCPRODUCTDEFINITIONSHAPE($,$,(#22));\n\
#30=IFCWALL('{WALL_GID}',$,'{wall_name}',$,$,#12,#23,'W-01');\n"
    )
}

/// Storey + wall, wall contained in the storey: two products, one
/// containment edge.
pub fn storey_wall(wall_name: &str) -> String {
    step_file(&format!(
        "#2=IFCBUILDINGSTOREY('{STOREY_GID}',$,'Level 1',$,$,$,$,$,.ELEMENT.,0.);\n\
{}\
#41=IFCRELCONTAINEDINSPATIALSTRUCTURE('0RCon0000000000000000a',$,$,$,(#30),#2);\n",
        wall_entities(wall_name)
    ))
}

/// Storey only: the storey+wall model with the wall removed.
pub fn storey_only() -> String {
    step_file(
        "#2=IFCBUILDINGSTOREY('1XS$$$$$$$$$$$$$$$$$$$',$,'Level 1',$,$,$,$,$,.ELEMENT.,0.);\n",
    )
}

/// Project → storey → wall, with both the aggregation and the containment
/// relationship. Three products, two edges.
pub fn full_model(wall_name: &str) -> String {
    step_file(&format!(
        "#1=IFCPROJECT('{PROJECT_GID}',$,'Demo Project',$,$,$,$,$,$);\n\
#2=IFCBUILDINGSTOREY('{STOREY_GID}',$,'Level 1',$,$,$,$,$,.ELEMENT.,0.);\n\
{}\
#40=IFCRELAGGREGATES('0RAgg0000000000000000a',$,$,$,#1,(#2));\n\
#41=IFCRELCONTAINEDINSPATIALSTRUCTURE('0RCon0000000000000000a',$,$,$,(#30),#2);\n",
        wall_entities(wall_name)
    ))
}

/// A lone beam with no spatial structure.
pub fn beam_only() -> String {
    step_file(&format!(
        "#50=IFCBEAM('{BEAM_GID}',$,'Beam B',$,$,$,$,'B-01');\n"
    ))
}

/// Extract STEP content and ingest it into a branch.
pub async fn ingest(
    engine: &Engine,
    content: &str,
    branch_id: i64,
    label: Option<&str>,
) -> Result<IngestionResult> {
    let extraction = extract_str(content, &FaceSetTessellator)?;
    engine
        .ingest_extraction(extraction, "model.ifc", branch_id, label, Deadline::NONE)
        .await
}
