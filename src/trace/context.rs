use crate::accumulator::HitAccumulator;
use crate::geom::{Boundary, Geometry, PrimId};
use crate::reflection::{ReflectionModel, StagedRay};
use crate::rng::RandomSource;
use crate::scene::{CommittedScene, Filter, GeomId, Hit, HitFilter, Ray, RayHit};
use vek::*;

pub const INITIAL_RAY_WEIGHT: f32 = 1.0;
// Choosing a good value for the lower threshold matters: it bounds the
// trajectory length while the renew weight keeps the estimator unbiased.
pub const RAY_WEIGHT_LOWER_THRESHOLD: f32 = 0.1;
pub const RAY_RENEW_WEIGHT: f32 = 3.0 * RAY_WEIGHT_LOWER_THRESHOLD;
/// `tnear` assigned when a ray is re-seeded after a bounce.
pub const STEP_EPS: f32 = 1e-4;

/// Per-trajectory state driving intersect → filter → reflect → reweight.
///
/// One instance per worker thread, created at thread entry and reset at the
/// start of every intersect call. The context doubles as the scene's
/// [`HitFilter`]: while the traversal narrows down the nearest accepted hit,
/// the callbacks eagerly stage the outgoing ray for the last candidate seen
/// per geometry. After `intersect` returns, [`post_process`] resolves which
/// staged ray (if any) becomes the next bounce, deposits weight, and runs
/// the roulette.
///
/// [`post_process`]: TrajectoryContext::intersect
pub struct TrajectoryContext<'a, R: RandomSource> {
    geometry_id: GeomId,
    geometry: &'a Geometry,
    boundary_id: GeomId,
    boundary: &'a Boundary,
    surface_model: ReflectionModel,
    boundary_model: ReflectionModel,
    rng: &'a R,
    reflect_state: &'a mut R::State,
    accumulator: HitAccumulator,

    /// Weight still carried by the particle.
    pub weight: f32,
    /// Whether the trajectory continues after the last intersect call.
    pub reflect: bool,
    /// The staged ray chosen by the last intersect call; only meaningful
    /// when `reflect` is true.
    pub rayout: StagedRay,
    /// Distance of the resolved hit, or the unchanged ray `tfar` on a miss.
    pub tfar: f32,

    geo_intersected: bool,
    geo_first_t: f32,
    geo_prim: PrimId,
    geo_rayout: StagedRay,
    bound_intersected: bool,
    bound_first_t: f32,
    bound_rayout: StagedRay,
    last_deposit: Option<(PrimId, f64)>,
}

impl<'a, R: RandomSource> TrajectoryContext<'a, R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        geometry_id: GeomId,
        geometry: &'a Geometry,
        boundary_id: GeomId,
        boundary: &'a Boundary,
        surface_model: ReflectionModel,
        boundary_model: ReflectionModel,
        rng: &'a R,
        reflect_state: &'a mut R::State,
        accumulator: HitAccumulator,
    ) -> Self {
        Self {
            geometry_id,
            geometry,
            boundary_id,
            boundary,
            surface_model,
            boundary_model,
            rng,
            reflect_state,
            accumulator,
            weight: INITIAL_RAY_WEIGHT,
            reflect: false,
            rayout: StagedRay::zero(),
            tfar: 0.0,
            geo_intersected: false,
            geo_first_t: 0.0,
            geo_prim: 0,
            geo_rayout: StagedRay::zero(),
            bound_intersected: false,
            bound_first_t: 0.0,
            bound_rayout: StagedRay::zero(),
            last_deposit: None,
        }
    }

    /// Arm the context for a fresh trajectory.
    pub fn reset_trajectory(&mut self, initial_weight: f32) {
        self.weight = initial_weight;
        self.reflect = false;
        self.last_deposit = None;
    }

    /// One bounce: run the scene intersection with this context as the
    /// any-hit filter, then resolve the staged candidates.
    pub fn intersect(&mut self, scene: &CommittedScene, rayhit: &mut RayHit) {
        rayhit.hit = Hit::none();
        self.geo_intersected = false;
        self.bound_intersected = false;
        self.last_deposit = None;
        scene.intersect(rayhit, self);
        self.post_process(rayhit);
    }

    /// Weight dropped by the last intersect call, if it deposited.
    #[inline]
    pub fn last_deposit(&self) -> Option<(PrimId, f64)> {
        self.last_deposit
    }

    #[inline]
    pub fn accumulator(&self) -> &HitAccumulator {
        &self.accumulator
    }

    pub fn into_accumulator(self) -> HitAccumulator {
        self.accumulator
    }

    fn post_process(&mut self, rayhit: &RayHit) {
        if !self.geo_intersected && !self.bound_intersected {
            // The ray left the domain through an open face.
            self.reflect = false;
            self.tfar = rayhit.ray.tfar;
            return;
        }

        self.reflect = true;

        if self.bound_intersected
            && (!self.geo_intersected || self.bound_first_t < self.geo_first_t)
        {
            self.rayout = self.bound_rayout;
            self.tfar = self.bound_first_t;
            return;
        }

        // Geometry wins; on an exact tie the physical surface takes
        // precedence over the boundary.
        self.rayout = self.geo_rayout;
        self.tfar = self.geo_first_t;
        let drop = self.weight * self.geometry.sticking(self.geo_prim);
        self.accumulator.deposit(self.geo_prim, drop as f64);
        self.last_deposit = Some((self.geo_prim, drop as f64));
        self.weight -= drop;

        // Roulette ("rejection control"): below the threshold, kill the ray
        // with probability 1 - weight/renew, otherwise renew its weight.
        // Keeps the estimator unbiased while bounding the trajectory length.
        if self.weight < RAY_WEIGHT_LOWER_THRESHOLD {
            let kill_probability = 1.0 - self.weight / RAY_RENEW_WEIGHT;
            if self.rng.uniform_f32(self.reflect_state) < kill_probability {
                self.reflect = false;
            } else {
                self.weight = RAY_RENEW_WEIGHT;
            }
        }
    }
}

impl<R: RandomSource> HitFilter for TrajectoryContext<'_, R> {
    fn filter(&mut self, candidate: &Hit, ray: &Ray) -> Filter {
        if candidate.t <= ray.tnear {
            return Filter::Reject;
        }
        if candidate.geom_id == self.geometry_id {
            let point = ray.origin + ray.direction * candidate.t;
            if !self.geometry.accepts_hit(candidate.prim_id, point) {
                return Filter::Reject;
            }
            let normal = facing(self.geometry.normal(candidate.prim_id), ray.direction);
            self.geo_rayout =
                self.surface_model
                    .bounce(ray, candidate.t, normal, self.rng, self.reflect_state);
            self.geo_first_t = candidate.t;
            self.geo_prim = candidate.prim_id;
            self.geo_intersected = true;
            Filter::Accept
        } else if candidate.geom_id == self.boundary_id {
            let normal = facing(self.boundary.normal(candidate.prim_id), ray.direction);
            self.bound_rayout =
                self.boundary_model
                    .bounce(ray, candidate.t, normal, self.rng, self.reflect_state);
            self.bound_first_t = candidate.t;
            self.bound_intersected = true;
            Filter::Accept
        } else {
            Filter::Reject
        }
    }
}

/// Orient `n` against the incoming direction, so reflection always happens
/// on the side the ray arrived from.
#[inline]
fn facing(n: Vec3<f32>, direction: Vec3<f32>) -> Vec3<f32> {
    if n.dot(direction) > 0.0 {
        -n
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Aabb;
    use crate::rng::{Pcg64Source, Pcg64State};
    use crate::scene::{Scene, SceneGeometry};
    use approx::assert_relative_eq;

    fn triangle_setup(sticking: f32) -> (Geometry, Boundary, CommittedScene, GeomId, GeomId) {
        let geometry = Geometry::from_triangles(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
            sticking,
        )
        .unwrap();
        let boundary = Boundary::new(geometry.bounding_box());
        let mut scene = Scene::new();
        let boundary_id = scene.attach(SceneGeometry::from_boundary(&boundary));
        let geometry_id = scene.attach(SceneGeometry::from_geometry(&geometry));
        (geometry, boundary, scene.commit(), geometry_id, boundary_id)
    }

    #[test]
    fn full_sticking_deposits_everything_on_first_hit() {
        let (geometry, boundary, scene, geometry_id, boundary_id) = triangle_setup(1.0);
        let rng = Pcg64Source;
        let mut state = Pcg64State::seed_from(31);
        let mut ctx = TrajectoryContext::new(
            geometry_id,
            &geometry,
            boundary_id,
            &boundary,
            ReflectionModel::DiffuseCosine,
            ReflectionModel::Specular,
            &rng,
            &mut state,
            HitAccumulator::new(1),
        );
        ctx.reset_trajectory(1.0);
        let mut rayhit = RayHit::new(Ray::new(
            Vec3::new(0.25, 0.25, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ));
        rayhit.ray.tnear = 1e-4;
        ctx.intersect(&scene, &mut rayhit);

        assert!(!ctx.reflect);
        assert_relative_eq!(ctx.weight, 0.0);
        assert_eq!(ctx.last_deposit(), Some((0, 1.0)));
        let acc = ctx.into_accumulator();
        assert_relative_eq!(acc.deposited()[0], 1.0);
        assert_eq!(acc.hit_counts()[0], 1);
    }

    #[test]
    fn boundary_hit_reflects_without_deposit() {
        let (geometry, boundary, scene, geometry_id, boundary_id) = triangle_setup(1.0);
        let rng = Pcg64Source;
        let mut state = Pcg64State::seed_from(31);
        let mut ctx = TrajectoryContext::new(
            geometry_id,
            &geometry,
            boundary_id,
            &boundary,
            ReflectionModel::DiffuseCosine,
            ReflectionModel::Specular,
            &rng,
            &mut state,
            HitAccumulator::new(1),
        );
        ctx.reset_trajectory(1.0);
        // above the triangle plane, flying sideways into the lateral wall
        let mut rayhit = RayHit::new(Ray::new(
            Vec3::new(0.25, 0.25, 0.05),
            Vec3::new(1.0, 0.0, 0.0),
        ));
        rayhit.ray.tnear = 1e-4;
        ctx.intersect(&scene, &mut rayhit);

        assert!(ctx.reflect);
        assert_relative_eq!(ctx.weight, 1.0);
        assert_eq!(ctx.last_deposit(), None);
        // specular: the x component flips, the rest is unchanged
        assert_relative_eq!(ctx.rayout.direction.x, -1.0, epsilon = 1e-5);
        assert_relative_eq!(ctx.rayout.direction.y, 0.0, epsilon = 1e-5);
        assert!(ctx.accumulator().deposited()[0] == 0.0);
    }

    #[test]
    fn roulette_preserves_the_expected_weight() {
        let (geometry, boundary, scene, geometry_id, boundary_id) = triangle_setup(0.01);
        let rng = Pcg64Source;
        let mut state = Pcg64State::seed_from(60);
        let mut ctx = TrajectoryContext::new(
            geometry_id,
            &geometry,
            boundary_id,
            &boundary,
            ReflectionModel::DiffuseCosine,
            ReflectionModel::Specular,
            &rng,
            &mut state,
            HitAccumulator::new(1),
        );

        let trials = 4000;
        let before = 0.05f32;
        let mut weight_after = 0.0f64;
        for _ in 0..trials {
            ctx.reset_trajectory(before);
            let mut rayhit = RayHit::new(Ray::new(
                Vec3::new(0.25, 0.25, 1.0),
                Vec3::new(0.0, 0.0, -1.0),
            ));
            rayhit.ray.tnear = 1e-4;
            ctx.intersect(&scene, &mut rayhit);
            if ctx.reflect {
                assert_relative_eq!(ctx.weight, RAY_RENEW_WEIGHT);
                weight_after += ctx.weight as f64;
            }
        }
        // E[weight after roulette] == weight before (minus the deposit)
        let deposited = before as f64 * 0.01;
        let expected = (before as f64 - deposited) * trials as f64;
        let tolerance = 4.0 * (trials as f64).sqrt() * RAY_RENEW_WEIGHT as f64;
        assert!((weight_after - expected).abs() < tolerance);
    }

    #[test]
    fn leaving_through_the_open_top_terminates() {
        let (geometry, boundary, scene, geometry_id, boundary_id) = triangle_setup(1.0);
        let rng = Pcg64Source;
        let mut state = Pcg64State::seed_from(31);
        let mut ctx = TrajectoryContext::new(
            geometry_id,
            &geometry,
            boundary_id,
            &boundary,
            ReflectionModel::DiffuseCosine,
            ReflectionModel::Specular,
            &rng,
            &mut state,
            HitAccumulator::new(1),
        );
        ctx.reset_trajectory(1.0);
        let mut rayhit = RayHit::new(Ray::new(
            Vec3::new(0.25, 0.25, 0.5),
            Vec3::new(0.0, 0.0, 1.0),
        ));
        rayhit.ray.tnear = 1e-4;
        ctx.intersect(&scene, &mut rayhit);
        assert!(!ctx.reflect);
        assert!(ctx.tfar.is_infinite());
    }
}
