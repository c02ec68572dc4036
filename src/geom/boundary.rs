use super::Aabb;
use crate::geom::PrimId;
use vek::*;

/// Margin added around the traced geometry when building the boundary, so
/// the geometry's bounding box is strictly contained and the source plane
/// sits above the highest surface point.
pub const BOUNDARY_EPS: f32 = 0.1;

/// Reflective enclosure of the domain.
///
/// An axis-aligned prism around the geometry: the four lateral faces (eight
/// triangles) specularly reflect particles back into the domain, while the
/// top and bottom are open — a ray leaving through them hits nothing and the
/// trajectory terminates. Face normals point inward.
#[derive(Clone, Debug)]
pub struct Boundary {
    aabb: Aabb,
    vertices: [Vec3<f32>; 8],
    triangles: [[u32; 3]; 8],
    normals: [Vec3<f32>; 8],
}

impl Boundary {
    /// Build the boundary around a geometry bounding box. The box is padded
    /// by [`BOUNDARY_EPS`] laterally and on top.
    pub fn new(geometry_aabb: Aabb) -> Self {
        let min = geometry_aabb.min - Vec3::new(BOUNDARY_EPS, BOUNDARY_EPS, 0.0);
        let max = geometry_aabb.max + Vec3::new(BOUNDARY_EPS, BOUNDARY_EPS, BOUNDARY_EPS);
        let (x0, y0, z0) = (min.x, min.y, min.z);
        let (x1, y1, z1) = (max.x, max.y, max.z);
        let vertices = [
            Vec3::new(x0, y0, z0),
            Vec3::new(x1, y0, z0),
            Vec3::new(x1, y1, z0),
            Vec3::new(x0, y1, z0),
            Vec3::new(x0, y0, z1),
            Vec3::new(x1, y0, z1),
            Vec3::new(x1, y1, z1),
            Vec3::new(x0, y1, z1),
        ];
        let triangles = [
            // x = x0
            [0, 3, 7],
            [0, 7, 4],
            // x = x1
            [1, 2, 6],
            [1, 6, 5],
            // y = y0
            [0, 1, 5],
            [0, 5, 4],
            // y = y1
            [3, 2, 6],
            [3, 6, 7],
        ];
        let normals = [
            Vec3::unit_x(),
            Vec3::unit_x(),
            -Vec3::unit_x(),
            -Vec3::unit_x(),
            Vec3::unit_y(),
            Vec3::unit_y(),
            -Vec3::unit_y(),
            -Vec3::unit_y(),
        ];
        Self { aabb: Aabb { min, max }, vertices, triangles, normals, }
    }

    /// Inward unit normal of a lateral face triangle.
    #[inline]
    pub fn normal(&self, prim: PrimId) -> Vec3<f32> {
        self.normals[prim as usize]
    }

    /// Height of the open top face, which is also the source plane.
    #[inline]
    pub fn zmax(&self) -> f32 {
        self.aabb.max.z
    }

    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec3<f32>; 8] {
        &self.vertices
    }

    #[inline]
    pub fn triangles(&self) -> &[[u32; 3]; 8] {
        &self.triangles
    }

    /// Smallest distance from `p` to any of the four lateral faces.
    pub fn lateral_clearance(&self, p: Vec3<f32>) -> f32 {
        let dx = (p.x - self.aabb.min.x).min(self.aabb.max.x - p.x);
        let dy = (p.y - self.aabb.min.y).min(self.aabb.max.y - p.y);
        dx.min(dy)
    }
}
