pub mod boundary;

// Reexports
pub use self::boundary::Boundary;

use crate::error::{Error, Result};
use crate::math::{triangle_normal, vmax, vmin};
use std::f32::consts::PI;
use vek::*;

/// Dense primitive index, assigned from 0 in input order.
pub type PrimId = u32;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3<f32>,
    pub max: Vec3<f32>,
}

impl Aabb {
    pub fn of_points<I: IntoIterator<Item = Vec3<f32>>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut aabb = Aabb { min: first, max: first };
        for p in points {
            aabb.min = vmin(aabb.min, p);
            aabb.max = vmax(aabb.max, p);
        }
        Some(aabb)
    }

    pub fn expand(&mut self, p: Vec3<f32>) {
        self.min = vmin(self.min, p);
        self.max = vmax(self.max, p);
    }
}

/// A normal-oriented disc primitive.
#[derive(Clone, Copy, Debug)]
pub struct Disc {
    pub center: Vec3<f32>,
    pub radius: f32,
    pub normal: Vec3<f32>,
}

/// The closed set of surface primitive representations.
#[derive(Clone, Debug)]
pub enum Primitives {
    /// Vertex-indexed triangles over the shared vertex array.
    Triangles(Vec<[u32; 3]>),
    /// Oriented discs; the vertex array is empty in this variant.
    Discs(Vec<Disc>),
}

/// The traced surface: a shared vertex array, the primitive array, and the
/// per-primitive attributes the kernel reads on every bounce.
///
/// Immutable after construction apart from the sticking/relevance overrides,
/// which must be applied before tracing starts.
#[derive(Clone, Debug)]
pub struct Geometry {
    vertices: Vec<Vec3<f32>>,
    prims: Primitives,
    normals: Vec<Vec3<f32>>,
    areas: Vec<f32>,
    sticking: Vec<f32>,
    relevance: Vec<bool>,
}

impl Geometry {
    /// Build triangle geometry. Fails on out-of-range vertex indices and on
    /// degenerate (zero-area) triangles.
    pub fn from_triangles(
        vertices: Vec<Vec3<f32>>,
        triangles: Vec<[u32; 3]>,
        sticking_default: f32,
    ) -> Result<Self> {
        let mut normals = Vec::with_capacity(triangles.len());
        let mut areas = Vec::with_capacity(triangles.len());
        for (idx, tri) in triangles.iter().enumerate() {
            for &v in tri {
                if v as usize >= vertices.len() {
                    return Err(Error::InputFormat(format!(
                        "triangle {idx} references vertex {v} out of {}",
                        vertices.len()
                    )));
                }
            }
            let [a, b, c] = [
                vertices[tri[0] as usize],
                vertices[tri[1] as usize],
                vertices[tri[2] as usize],
            ];
            let n = triangle_normal(a, b, c);
            let area = n.magnitude() * 0.5;
            if !(area > 0.0) {
                return Err(Error::InputFormat(format!("triangle {idx} is degenerate")));
            }
            normals.push(n / (2.0 * area));
            areas.push(area);
        }
        let count = triangles.len();
        Ok(Self {
            vertices,
            prims: Primitives::Triangles(triangles),
            normals,
            areas,
            sticking: vec![sticking_default; count],
            relevance: vec![true; count],
        })
    }

    /// Build disc point-cloud geometry. Fails on non-positive radii and
    /// zero-length normals.
    pub fn from_discs(discs: Vec<Disc>, sticking_default: f32) -> Result<Self> {
        let mut normals = Vec::with_capacity(discs.len());
        let mut areas = Vec::with_capacity(discs.len());
        let mut normalized = Vec::with_capacity(discs.len());
        for (idx, disc) in discs.into_iter().enumerate() {
            if !(disc.radius > 0.0) {
                return Err(Error::InputFormat(format!("disc {idx} has non-positive radius")));
            }
            let len = disc.normal.magnitude();
            if !(len > 0.0) {
                return Err(Error::InputFormat(format!("disc {idx} has zero normal")));
            }
            let n = disc.normal / len;
            normals.push(n);
            areas.push(PI * disc.radius * disc.radius);
            normalized.push(Disc { normal: n, ..disc });
        }
        let count = normalized.len();
        Ok(Self {
            vertices: Vec::new(),
            prims: Primitives::Discs(normalized),
            normals,
            areas,
            sticking: vec![sticking_default; count],
            relevance: vec![true; count],
        })
    }

    #[inline]
    pub fn primitive_count(&self) -> usize {
        self.areas.len()
    }

    /// Unit surface normal of a primitive.
    #[inline]
    pub fn normal(&self, prim: PrimId) -> Vec3<f32> {
        self.normals[prim as usize]
    }

    #[inline]
    pub fn area(&self, prim: PrimId) -> f32 {
        self.areas[prim as usize]
    }

    /// Whether the primitive contributes to the importance-sampling pilot.
    #[inline]
    pub fn relevance(&self, prim: PrimId) -> bool {
        self.relevance[prim as usize]
    }

    /// Fraction of incoming weight absorbed on contact.
    #[inline]
    pub fn sticking(&self, prim: PrimId) -> f32 {
        self.sticking[prim as usize]
    }

    pub fn set_sticking(&mut self, prim: PrimId, value: f32) {
        self.sticking[prim as usize] = value;
    }

    pub fn set_relevance_all(&mut self, relevant: bool) {
        self.relevance.iter_mut().for_each(|r| *r = relevant);
    }

    /// Whether a candidate hit point lies on the primitive. Triangles accept
    /// unconditionally; discs accept only when the projection falls within
    /// the disc radius.
    pub fn accepts_hit(&self, prim: PrimId, point: Vec3<f32>) -> bool {
        match &self.prims {
            Primitives::Triangles(_) => true,
            Primitives::Discs(discs) => {
                let disc = &discs[prim as usize];
                (point - disc.center).magnitude_squared() <= disc.radius * disc.radius
            }
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match &self.prims {
            Primitives::Triangles(_) => Aabb::of_points(self.vertices.iter().copied()),
            Primitives::Discs(discs) => Aabb::of_points(discs.iter().flat_map(|d| {
                let r = Vec3::broadcast(d.radius);
                [d.center - r, d.center + r]
            })),
        }
        .unwrap_or(Aabb { min: Vec3::zero(), max: Vec3::zero() })
    }

    pub fn kind(&self) -> &'static str {
        match self.prims {
            Primitives::Triangles(_) => "triangles",
            Primitives::Discs(_) => "discs",
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec3<f32>] {
        &self.vertices
    }

    #[inline]
    pub fn primitives(&self) -> &Primitives {
        &self.prims
    }
}
