use crate::error::{Error, Result};
use crate::geom::Geometry;
use std::path::Path;
use vek::*;

/// Read a triangle mesh from a Wavefront OBJ file.
///
/// All models in the file are flattened into one vertex/triangle soup;
/// faces are triangulated by the loader. Degenerate triangles are rejected
/// by the geometry constructor.
pub fn read_triangles(path: &Path, sticking_default: f32) -> Result<Geometry> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj(path, &options)
        .map_err(|e| Error::InputFormat(format!("{}: {e}", path.display())))?;

    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        if mesh.positions.len() % 3 != 0 {
            return Err(Error::InputFormat(format!(
                "{}: model {:?} has a truncated position buffer",
                path.display(),
                model.name
            )));
        }
        let base = vertices.len() as u32;
        vertices.extend(
            mesh.positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2])),
        );
        if mesh.indices.len() % 3 != 0 {
            return Err(Error::InputFormat(format!(
                "{}: model {:?} has a truncated index buffer",
                path.display(),
                model.name
            )));
        }
        triangles.extend(
            mesh.indices
                .chunks_exact(3)
                .map(|t| [base + t[0], base + t[1], base + t[2]]),
        );
    }
    if triangles.is_empty() {
        return Err(Error::InputFormat(format!(
            "{}: no triangles found",
            path.display()
        )));
    }
    Geometry::from_triangles(vertices, triangles, sticking_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_a_two_triangle_plate() {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        writeln!(
            file,
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3\nf 1 3 4"
        )
        .unwrap();
        let geo = read_triangles(file.path(), 0.8).unwrap();
        assert_eq!(geo.primitive_count(), 2);
        assert_eq!(geo.kind(), "triangles");
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let r = read_triangles(Path::new("/no/such/file.obj"), 1.0);
        assert!(matches!(r, Err(Error::InputFormat(_))));
    }

    #[test]
    fn quad_faces_are_triangulated() {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        writeln!(file, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4").unwrap();
        let geo = read_triangles(file.path(), 1.0).unwrap();
        assert_eq!(geo.primitive_count(), 2);
    }
}
