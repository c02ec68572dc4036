use crate::math::{cosine_hemisphere, orthonormal_basis};
use crate::rng::RandomSource;
use crate::scene::Ray;
use vek::*;

/// `tnear` assigned to freshly emitted rays.
pub const SOURCE_EPS: f32 = 1e-4;

/// The emitting plane: an axis-aligned rectangle at constant `z`, radiating
/// into `-z`. Promoted to configuration so the emission geometry is not
/// hard-coded into the samplers.
#[derive(Clone, Copy, Debug)]
pub struct SourcePlane {
    pub z: f32,
    pub c1: Vec2<f32>,
    pub c2: Vec2<f32>,
}

impl SourcePlane {
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.c1.x <= x && x <= self.c2.x && self.c1.y <= y && y <= self.c2.y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        (self.c2.x - self.c1.x) as f64 * (self.c2.y - self.c1.y) as f64
    }

    /// Density of the uniform origin distribution over the rectangle.
    #[inline]
    pub fn uniform_pdf(&self) -> f64 {
        1.0 / self.area()
    }
}

/// Where emitted rays start.
#[derive(Clone, Copy, Debug)]
pub enum OriginSampler {
    /// Uniform over an axis-aligned rectangle at constant `z`.
    RectangleZ(SourcePlane),
    /// Every ray starts at the same point.
    Constant(Vec3<f32>),
}

/// Which way emitted rays point.
#[derive(Clone, Copy, Debug)]
pub enum DirectionSampler {
    /// Cosine-weighted about the inward plane normal `(0, 0, -1)`.
    Cosine,
    /// Every ray gets the same unit direction.
    Constant(Vec3<f32>),
}

/// Particle source: an origin sampler paired with a direction sampler.
///
/// The production source is a rectangle with cosine-weighted directions;
/// the constant samplers emit a single repeatable ray, which deterministic
/// scenarios rely on.
#[derive(Clone, Debug)]
pub struct Source {
    origin: OriginSampler,
    direction: DirectionSampler,
    frame: [Vec3<f32>; 3],
}

impl Source {
    /// Rectangle origin, cosine-weighted directions.
    pub fn new(plane: SourcePlane) -> Self {
        Self {
            origin: OriginSampler::RectangleZ(plane),
            direction: DirectionSampler::Cosine,
            frame: orthonormal_basis(Vec3::new(0.0, 0.0, -1.0)),
        }
    }

    /// Fixed origin, fixed direction: every emitted ray is identical.
    pub fn constant(origin: Vec3<f32>, direction: Vec3<f32>) -> Self {
        Self {
            origin: OriginSampler::Constant(origin),
            direction: DirectionSampler::Constant(direction.normalized()),
            frame: orthonormal_basis(Vec3::new(0.0, 0.0, -1.0)),
        }
    }

    /// The emitting rectangle, when this source has one. Importance
    /// sampling requires it.
    pub fn rectangle(&self) -> Option<&SourcePlane> {
        match &self.origin {
            OriginSampler::RectangleZ(plane) => Some(plane),
            OriginSampler::Constant(_) => None,
        }
    }

    /// Fill `ray` with a sampled origin and direction.
    pub fn fill<R: RandomSource>(&self, ray: &mut Ray, rng: &R, state: &mut R::State) {
        let origin = match &self.origin {
            OriginSampler::RectangleZ(plane) => {
                let u = rng.uniform_f32(state);
                let v = rng.uniform_f32(state);
                Vec3::new(
                    plane.c1.x + (plane.c2.x - plane.c1.x) * u,
                    plane.c1.y + (plane.c2.y - plane.c1.y) * v,
                    plane.z,
                )
            }
            OriginSampler::Constant(origin) => *origin,
        };
        self.fill_at(ray, origin, rng, state);
    }

    /// Fill `ray` from a caller-chosen origin on the plane (used by the
    /// importance-sampled production phase).
    pub fn fill_with_origin<R: RandomSource>(
        &self,
        ray: &mut Ray,
        origin: Vec2<f32>,
        rng: &R,
        state: &mut R::State,
    ) {
        let z = match &self.origin {
            OriginSampler::RectangleZ(plane) => plane.z,
            OriginSampler::Constant(o) => o.z,
        };
        self.fill_at(ray, Vec3::new(origin.x, origin.y, z), rng, state);
    }

    fn fill_at<R: RandomSource>(
        &self,
        ray: &mut Ray,
        origin: Vec3<f32>,
        rng: &R,
        state: &mut R::State,
    ) {
        ray.origin = origin;
        ray.direction = match self.direction {
            DirectionSampler::Cosine => {
                let u1 = rng.uniform_f32(state);
                let u2 = rng.uniform_f32(state);
                cosine_hemisphere(&self.frame, u1, u2)
            }
            DirectionSampler::Constant(direction) => direction,
        };
        ray.tnear = SOURCE_EPS;
        ray.tfar = f32::INFINITY;
        ray.time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{Pcg64Source, Pcg64State};
    use approx::assert_relative_eq;

    fn test_source() -> Source {
        Source::new(SourcePlane {
            z: 1.0,
            c1: Vec2::new(-1.0, 0.0),
            c2: Vec2::new(1.0, 2.0),
        })
    }

    #[test]
    fn sampled_rays_start_on_the_plane_and_point_down() {
        let source = test_source();
        let rng = Pcg64Source;
        let mut state = Pcg64State::seed_from(29);
        let mut ray = Ray::new(Vec3::zero(), Vec3::unit_z());
        let plane = *source.rectangle().unwrap();
        for _ in 0..1024 {
            source.fill(&mut ray, &rng, &mut state);
            assert!(plane.contains(ray.origin.x, ray.origin.y));
            assert_relative_eq!(ray.origin.z, 1.0);
            assert_relative_eq!(ray.direction.magnitude(), 1.0, epsilon = 1e-5);
            assert!(ray.direction.z <= 1e-6);
            assert_relative_eq!(ray.tnear, SOURCE_EPS);
            assert!(ray.tfar.is_infinite());
        }
    }

    #[test]
    fn uniform_pdf_matches_the_rectangle() {
        let source = test_source();
        let plane = source.rectangle().unwrap();
        assert_relative_eq!(plane.area(), 4.0);
        assert_relative_eq!(plane.uniform_pdf(), 0.25);
    }

    #[test]
    fn constant_source_repeats_the_same_ray() {
        let source = Source::constant(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, -2.0));
        assert!(source.rectangle().is_none());
        let rng = Pcg64Source;
        let mut state = Pcg64State::seed_from(29);
        let mut ray = Ray::new(Vec3::zero(), Vec3::unit_z());
        for _ in 0..8 {
            source.fill(&mut ray, &rng, &mut state);
            assert_eq!(ray.origin, Vec3::new(0.25, 0.25, 1.0));
            assert_relative_eq!(ray.direction.z, -1.0, epsilon = 1e-6);
            assert_relative_eq!(ray.direction.magnitude(), 1.0, epsilon = 1e-6);
        }
    }
}
