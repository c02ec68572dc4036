pub mod discs;
pub mod obj;
pub mod vtp;

// Reexports
pub use self::discs::read_discs;
pub use self::obj::read_triangles;
pub use self::vtp::{
    write_boundary_vtp, write_geometry_vtp, write_ray_log_vtp, write_ray_src_log_vtp,
};

use crate::error::Result;
use crate::geom::Geometry;
use std::path::Path;

/// Which surface primitive the reader should produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveMode {
    Triangles,
    Discs,
}

/// Read the input surface with the reader matching `mode`.
pub fn read_geometry(path: &Path, mode: PrimitiveMode, sticking_default: f32) -> Result<Geometry> {
    match mode {
        PrimitiveMode::Triangles => read_triangles(path, sticking_default),
        PrimitiveMode::Discs => read_discs(path, sticking_default),
    }
}
