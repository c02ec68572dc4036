use crate::math::{cosine_hemisphere, orthonormal_basis, reflect};
use crate::rng::RandomSource;
use crate::scene::Ray;
use vek::*;

/// Offset applied along the surface normal when re-seeding a ray, so the
/// next intersect call cannot re-hit the surface it just left.
pub const SURFACE_OFFSET_EPS: f32 = 1e-4;

/// A candidate next-bounce ray computed eagerly inside a filter callback.
/// Used only if that callback's hit wins the post-intersect resolution.
#[derive(Clone, Copy, Debug)]
pub struct StagedRay {
    pub origin: Vec3<f32>,
    pub direction: Vec3<f32>,
}

impl StagedRay {
    pub fn zero() -> Self {
        Self { origin: Vec3::zero(), direction: Vec3::unit_z() }
    }
}

/// The closed set of reflection models.
///
/// Both are pure: given the incoming ray, the hit distance, the surface
/// normal, and an RNG state they produce the outgoing ray and nothing else.
/// Weight accounting happens in the trajectory context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReflectionModel {
    /// Cosine-weighted diffuse re-emission about the surface normal.
    DiffuseCosine,
    /// Mirror reflection; used on the boundary.
    Specular,
}

impl ReflectionModel {
    /// Compute the outgoing ray for a hit at parameter `t` along `ray`.
    ///
    /// `normal` must be unit length and face the incoming ray (callers flip
    /// it against the ray direction).
    pub fn bounce<R: RandomSource>(
        &self,
        ray: &Ray,
        t: f32,
        normal: Vec3<f32>,
        rng: &R,
        state: &mut R::State,
    ) -> StagedRay {
        let p = ray.origin + ray.direction * t;
        match self {
            ReflectionModel::DiffuseCosine => {
                let basis = orthonormal_basis(normal);
                let u1 = rng.uniform_f32(state);
                let u2 = rng.uniform_f32(state);
                StagedRay {
                    origin: p + basis[0] * SURFACE_OFFSET_EPS,
                    direction: cosine_hemisphere(&basis, u1, u2),
                }
            }
            ReflectionModel::Specular => StagedRay {
                origin: p + normal * SURFACE_OFFSET_EPS,
                direction: reflect(ray.direction, normal).normalized(),
            },
        }
    }
}
