//! Mesh extraction.
//!
//! The tessellation engine proper is a black box behind the [`Tessellator`]
//! trait; the built-in [`FaceSetTessellator`] handles the IFC4 tessellated
//! representations (`IfcTriangulatedFaceSet`, `IfcPolygonalFaceSet`) that
//! already carry explicit triangle data, and bakes the resolved
//! `IfcLocalPlacement` chain into world coordinates so consumers never need
//! a transform matrix.

use crate::model::ParsedModel;
use crate::types::{AttributeValue, Entity, EntityId};
use nalgebra::{Matrix4, Point3, Vector3};

/// Triangle mesh in world coordinates.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// x,y,z triples.
    pub vertices: Vec<f32>,
    /// nx,ny,nz triples, parallel to `vertices`. May be empty.
    pub normals: Vec<f32>,
    /// Triangle index triples into `vertices`.
    pub faces: Vec<u32>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }
}

/// Geometry engine seam. Returns `None` when the product has no
/// representation this engine can triangulate.
pub trait Tessellator: Send + Sync {
    fn tessellate(&self, model: &ParsedModel, product: &Entity) -> Option<Mesh>;
}

/// Built-in tessellator for explicit face-set representations.
#[derive(Default)]
pub struct FaceSetTessellator;

impl Tessellator for FaceSetTessellator {
    fn tessellate(&self, model: &ParsedModel, product: &Entity) -> Option<Mesh> {
        // IfcProduct: ObjectPlacement=5, Representation=6
        let shape = product.get_ref(6).and_then(|id| model.get(id))?;
        let placement = placement_matrix(model, product.get_ref(5), 0);

        let mut merged = Mesh::default();
        // IfcProductDefinitionShape: Representations=2
        for rep_id in shape.get_ref_list(2) {
            let Some(rep) = model.get(rep_id) else { continue };
            // IfcShapeRepresentation: Items=3
            for item_id in rep.get_ref_list(3) {
                let Some(item) = model.get(item_id) else { continue };
                let mesh = match item.type_name.as_str() {
                    "IFCTRIANGULATEDFACESET" => triangulated_face_set(model, item),
                    "IFCPOLYGONALFACESET" => polygonal_face_set(model, item),
                    _ => None,
                };
                if let Some(mesh) = mesh {
                    merge(&mut merged, mesh);
                }
            }
        }

        if merged.is_empty() {
            return None;
        }
        bake(&mut merged, &placement);
        if merged.normals.len() != merged.vertices.len() {
            merged.normals = accumulated_normals(&merged.vertices, &merged.faces);
        }
        Some(merged)
    }
}

// ── placement ───────────────────────────────────────────────────────────

const MAX_PLACEMENT_DEPTH: usize = 64;

/// Resolve an `IfcLocalPlacement` chain into one world matrix.
fn placement_matrix(
    model: &ParsedModel,
    placement: Option<EntityId>,
    depth: usize,
) -> Matrix4<f64> {
    if depth > MAX_PLACEMENT_DEPTH {
        return Matrix4::identity();
    }
    let Some(entity) = placement.and_then(|id| model.get(id)) else {
        return Matrix4::identity();
    };
    if entity.type_name != "IFCLOCALPLACEMENT" {
        return Matrix4::identity();
    }
    // PlacementRelTo=0, RelativePlacement=1
    let parent = placement_matrix(model, entity.get_ref(0), depth + 1);
    let local = entity
        .get_ref(1)
        .and_then(|id| model.get(id))
        .map(|p| axis2_placement_matrix(model, p))
        .unwrap_or_else(Matrix4::identity);
    parent * local
}

/// `IfcAxis2Placement3D`: Location=0, Axis=1, RefDirection=2.
fn axis2_placement_matrix(model: &ParsedModel, placement: &Entity) -> Matrix4<f64> {
    let origin = placement
        .get_ref(0)
        .and_then(|id| model.get(id))
        .and_then(direction_of)
        .unwrap_or_else(Vector3::zeros);
    let z = placement
        .get_ref(1)
        .and_then(|id| model.get(id))
        .and_then(direction_of)
        .unwrap_or_else(Vector3::z)
        .normalize();
    let x_hint = placement
        .get_ref(2)
        .and_then(|id| model.get(id))
        .and_then(direction_of)
        .unwrap_or_else(|| {
            if z.x.abs() > 0.99 {
                Vector3::y()
            } else {
                Vector3::x()
            }
        });
    // Gram-Schmidt: project the hint off the z axis.
    let x = (x_hint - z * x_hint.dot(&z)).normalize();
    let y = z.cross(&x);

    Matrix4::new(
        x.x, y.x, z.x, origin.x, //
        x.y, y.y, z.y, origin.y, //
        x.z, y.z, z.z, origin.z, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Coordinates of an `IfcCartesianPoint` / `IfcDirection` (attribute 0).
fn direction_of(entity: &Entity) -> Option<Vector3<f64>> {
    let coords = entity.get_list(0)?;
    let mut v = [0.0f64; 3];
    for (slot, value) in v.iter_mut().zip(coords.iter()) {
        *slot = match value {
            AttributeValue::Float(f) => *f,
            AttributeValue::Integer(i) => *i as f64,
            _ => return None,
        };
    }
    Some(Vector3::new(v[0], v[1], v[2]))
}

// ── face sets ───────────────────────────────────────────────────────────

/// `IfcTriangulatedFaceSet`: Coordinates=0, Normals=1, CoordIndex=3.
fn triangulated_face_set(model: &ParsedModel, item: &Entity) -> Option<Mesh> {
    let vertices = coordinate_list(model, item.get_ref(0)?)?;
    let faces = index_triples(item.get_list(3)?);
    if faces.is_empty() {
        return None;
    }
    let normals = item
        .get_list(1)
        .map(flat_floats)
        .filter(|n| n.len() == vertices.len())
        .unwrap_or_default();
    Some(Mesh {
        vertices,
        normals,
        faces,
    })
}

/// `IfcPolygonalFaceSet`: Coordinates=0, Faces=2 (IfcIndexedPolygonalFace).
fn polygonal_face_set(model: &ParsedModel, item: &Entity) -> Option<Mesh> {
    let vertices = coordinate_list(model, item.get_ref(0)?)?;
    let mut faces = Vec::new();
    for face_id in item.get_ref_list(2) {
        let Some(face) = model.get(face_id) else { continue };
        // IfcIndexedPolygonalFace: CoordIndex=0 (1-based polygon loop)
        let loop_indices: Vec<u32> = face
            .get_list(0)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| match v {
                        AttributeValue::Integer(i) => Some((*i as u32).saturating_sub(1)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        // Fan triangulation of the polygon loop.
        for w in 1..loop_indices.len().saturating_sub(1) {
            faces.extend_from_slice(&[loop_indices[0], loop_indices[w], loop_indices[w + 1]]);
        }
    }
    if faces.is_empty() {
        return None;
    }
    Some(Mesh {
        vertices,
        normals: Vec::new(),
        faces,
    })
}

/// `IfcCartesianPointList3D`: CoordList=0, a list of (x,y,z) lists.
fn coordinate_list(model: &ParsedModel, id: EntityId) -> Option<Vec<f32>> {
    let entity = model.get(id)?;
    if entity.type_name != "IFCCARTESIANPOINTLIST3D" {
        return None;
    }
    let flat = flat_floats(entity.get_list(0)?);
    (!flat.is_empty()).then_some(flat)
}

fn flat_floats(nested: &[AttributeValue]) -> Vec<f32> {
    let mut out = Vec::new();
    for point in nested {
        if let AttributeValue::List(coords) = point {
            for c in coords {
                match c {
                    AttributeValue::Float(f) => out.push(*f as f32),
                    AttributeValue::Integer(i) => out.push(*i as f32),
                    _ => {}
                }
            }
        }
    }
    out
}

/// Nested 1-based triangle index lists → flat 0-based indices.
fn index_triples(nested: &[AttributeValue]) -> Vec<u32> {
    let mut out = Vec::new();
    for triple in nested {
        if let AttributeValue::List(indices) = triple {
            for i in indices {
                if let AttributeValue::Integer(i) = i {
                    out.push((*i as u32).saturating_sub(1));
                }
            }
        }
    }
    out
}

// ── assembly ────────────────────────────────────────────────────────────

fn merge(target: &mut Mesh, source: Mesh) {
    let offset = (target.vertices.len() / 3) as u32;
    // Normals survive the merge only while every part carries a full set;
    // a partial set is dropped and rebuilt afterwards.
    let both_full = source.normals.len() == source.vertices.len()
        && target.normals.len() == target.vertices.len();
    if both_full {
        target.normals.extend_from_slice(&source.normals);
    } else {
        target.normals.clear();
    }
    target.vertices.extend_from_slice(&source.vertices);
    target
        .faces
        .extend(source.faces.iter().map(|i| i + offset));
}

/// Apply the placement to vertices and normals in place.
fn bake(mesh: &mut Mesh, matrix: &Matrix4<f64>) {
    if *matrix == Matrix4::identity() {
        return;
    }
    for v in mesh.vertices.chunks_exact_mut(3) {
        let p = matrix.transform_point(&Point3::new(v[0] as f64, v[1] as f64, v[2] as f64));
        v[0] = p.x as f32;
        v[1] = p.y as f32;
        v[2] = p.z as f32;
    }
    for n in mesh.normals.chunks_exact_mut(3) {
        let rotated = matrix
            .transform_vector(&Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64))
            .normalize();
        n[0] = rotated.x as f32;
        n[1] = rotated.y as f32;
        n[2] = rotated.z as f32;
    }
}

/// Area-weighted vertex normals for meshes whose representation had none.
fn accumulated_normals(vertices: &[f32], faces: &[u32]) -> Vec<f32> {
    let mut normals = vec![0.0f32; vertices.len()];
    for tri in faces.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize * 3, tri[1] as usize * 3, tri[2] as usize * 3];
        if c + 2 >= vertices.len() || a + 2 >= vertices.len() || b + 2 >= vertices.len() {
            continue;
        }
        let pa = Vector3::new(vertices[a], vertices[a + 1], vertices[a + 2]);
        let pb = Vector3::new(vertices[b], vertices[b + 1], vertices[b + 2]);
        let pc = Vector3::new(vertices[c], vertices[c + 1], vertices[c + 2]);
        let n = (pb - pa).cross(&(pc - pa));
        for base in [a, b, c] {
            normals[base] += n.x;
            normals[base + 1] += n.y;
            normals[base + 2] += n.z;
        }
    }
    for n in normals.chunks_exact_mut(3) {
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if len > 1e-12 {
            n[0] /= len;
            n[1] /= len;
            n[2] /= len;
        }
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParsedModel;

    const FIXTURE: &str = "DATA;\n\
#1=IFCCARTESIANPOINT((0.,0.,0.));\n\
#2=IFCAXIS2PLACEMENT3D(#1,$,$);\n\
#3=IFCLOCALPLACEMENT($,#2);\n\
#4=IFCCARTESIANPOINTLIST3D(((0.,0.,0.),(1.,0.,0.),(0.,1.,0.)));\n\
#5=IFCTRIANGULATEDFACESET(#4,$,.T.,((1,2,3)),$);\n\
#6=IFCSHAPEREPRESENTATION($,'Body','Tessellation',(#5));\n\
#7=IFCPRODUCTDEFINITIONSHAPE($,$,(#6));\n\
#8=IFCWALL('0WallGid000000000000aa',$,'W',$,$,#3,#7,$);\n\
ENDSEC;";

    #[test]
    fn triangulated_face_set_extracts() {
        let model = ParsedModel::parse(FIXTURE).unwrap();
        let wall = model.of_type("IFCWALL").next().unwrap();
        let mesh = FaceSetTessellator.tessellate(&model, wall).unwrap();
        assert_eq!(mesh.vertices.len(), 9);
        assert_eq!(mesh.faces, vec![0, 1, 2]);
        // Normals were absent in the file, so they are derived.
        assert_eq!(mesh.normals.len(), 9);
        assert!((mesh.normals[2] - 1.0).abs() < 1e-6, "z-up triangle normal");
    }

    #[test]
    fn placement_translation_is_baked() {
        let translated = FIXTURE.replace("((0.,0.,0.));", "((10.,0.,5.));");
        let model = ParsedModel::parse(&translated).unwrap();
        let wall = model.of_type("IFCWALL").next().unwrap();
        let mesh = FaceSetTessellator.tessellate(&model, wall).unwrap();
        assert!((mesh.vertices[0] - 10.0).abs() < 1e-6);
        assert!((mesh.vertices[2] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn product_without_representation() {
        let model = ParsedModel::parse(FIXTURE).unwrap();
        let bare = crate::types::Entity {
            id: crate::types::EntityId(99),
            type_name: "IFCWALL".into(),
            class: crate::types::IfcClass::IfcWall,
            attributes: vec![AttributeValue::String("0Bare0000000000000000a".into())],
        };
        assert!(FaceSetTessellator.tessellate(&model, &bare).is_none());
    }
}
