use crate::accumulator::HitAccumulator;
use crate::error::{Error, Result};
use crate::geom::{Boundary, Geometry, PrimId, Primitives};
use crate::math::orthonormal_basis;
use crate::reflection::{ReflectionModel, StagedRay};
use crate::rng::{thread_seeds, Pcg64Source, Pcg64State, RandomSource};
use crate::scene::{CommittedScene, GeomId, Hit, Ray, RayHit, Scene, SceneGeometry};
use crate::source::Source;
use crate::stats::GaussianMixture;
use crate::trace::context::{TrajectoryContext, INITIAL_RAY_WEIGHT, STEP_EPS};
use crate::trace::result::TraceResult;
use std::f32::consts::TAU;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info, warn};
use vek::*;

const PILOT_RAYS: usize = 32 * 1024;
const PILOT_TARGET: usize = 4 * 1024;
const EXPOSED_AREA_SAMPLES: usize = 1024;
const EXPOSED_AREA_SEED: u64 = 7877;
const MIXTURE_FIT_SEED: u64 = 9157;
/// Mixture draws per trajectory before giving up on the rejection loop.
const MAX_REJECTED_DRAWS: usize = 100_000;

/// How per-primitive exposed areas are computed at the end of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExposedAreaMode {
    /// `exposed_area[p] = area(p)`. The mode for triangle meshes.
    WholeArea,
    /// Estimate visible disc area by firing rays at each disc from a wider
    /// disc above it. Experimental; discs too close to a reflective wall
    /// fall back to the whole area.
    Sampling,
}

/// Run parameters.
#[derive(Clone, Debug)]
pub struct TraceConfig {
    pub num_rays: usize,
    /// Cap on worker threads; never raised above the machine's logical CPUs.
    pub max_threads: Option<usize>,
    pub pilot_rays: usize,
    /// Relevant-sample count that ends the pilot early.
    pub pilot_target: usize,
    pub max_mixture_components: usize,
    pub exposed_area: ExposedAreaMode,
    /// Record pilot ray segments and source points in the result.
    pub log_rays: bool,
    /// Label written into the result record and the output metadata.
    pub input_label: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            num_rays: 1024 * 1024,
            max_threads: None,
            pilot_rays: PILOT_RAYS,
            pilot_target: PILOT_TARGET,
            max_mixture_components: 4,
            exposed_area: ExposedAreaMode::WholeArea,
            log_rays: false,
            input_label: "<memory>".into(),
        }
    }
}

/// A pilot trajectory that deposited on relevant primitives: where it
/// started and how much it delivered.
#[derive(Clone, Copy, Debug)]
pub struct SourceSample {
    pub origin: Vec3<f32>,
    pub deposited_weight: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct WorkerStats {
    geo_hits: u64,
    non_geo_hits: u64,
    rejected: u64,
    max_bounces: u64,
}

struct PilotOutcome {
    samples: Vec<SourceSample>,
    ray_log: Vec<[Vec3<f32>; 2]>,
    ray_src_log: Vec<Vec3<f32>>,
}

/// The top-level orchestrator: builds the scene, runs the two-phase
/// importance-sampled loop across worker threads, and reduces the
/// per-thread accumulators in thread-index order.
pub struct Tracer<'a> {
    geometry: &'a Geometry,
    boundary: &'a Boundary,
    source: &'a Source,
    config: TraceConfig,
}

impl<'a> Tracer<'a> {
    pub fn new(
        geometry: &'a Geometry,
        boundary: &'a Boundary,
        source: &'a Source,
        config: TraceConfig,
    ) -> Self {
        Self { geometry, boundary, source, config }
    }

    pub fn run(&self) -> Result<TraceResult> {
        let prim_count = self.geometry.primitive_count();
        let mut scene = Scene::new();
        let boundary_id = scene.attach(SceneGeometry::from_boundary(self.boundary));
        let geometry_id = scene.attach(SceneGeometry::from_geometry(self.geometry));
        let scene = scene.commit();

        enable_flush_to_zero();
        let threads = self.effective_threads();
        let mut states: Vec<(Pcg64State, Pcg64State)> = (0..threads)
            .map(|t| {
                let (src, refl) = thread_seeds(t);
                (Pcg64State::seed_from(src), Pcg64State::seed_from(refl))
            })
            .collect();

        info!(
            rays = self.config.num_rays,
            threads,
            primitives = prim_count,
            "starting trace"
        );
        let timer = Instant::now();

        // Phase 1: pilot run from the raw rectangular source, single
        // threaded on the first worker's states.
        let pilot = {
            let (src_state, reflect_state) = &mut states[0];
            self.run_pilot(&scene, geometry_id, boundary_id, src_state, reflect_state)
        };

        // Phase 2: learn the source distribution from the relevant origins.
        let mut fallback_used = false;
        let mixture = if self.source.rectangle().is_none() {
            debug!("source has no rectangle; importance sampling disabled");
            None
        } else if pilot.samples.is_empty() {
            warn!("no relevant pilot samples; production uses the uniform source");
            None
        } else {
            let origins: Vec<[f64; 2]> = pilot
                .samples
                .iter()
                .map(|s| [s.origin.x as f64, s.origin.y as f64])
                .collect();
            let mut fit_rng = Pcg64State::seed_from(MIXTURE_FIT_SEED);
            match GaussianMixture::fit(&origins, self.config.max_mixture_components, &mut fit_rng)
            {
                Ok(mixture) => {
                    debug!(components = mixture.components().len(), "mixture fitted");
                    Some(mixture)
                }
                Err(err) => {
                    warn!("mixture fit unavailable ({err}); using the single-Gaussian fallback");
                    fallback_used = true;
                    Some(GaussianMixture::single_gaussian(&origins)?)
                }
            }
        };

        // Phase 3: production across workers over static index ranges, so a
        // rerun with the same seeds and thread count is byte-identical.
        let ranges = split_ranges(self.config.num_rays, threads);
        let outcomes = crossbeam_utils::thread::scope(|s| {
            let mut handles = Vec::with_capacity(threads);
            for (tid, (src_state, reflect_state)) in states.into_iter().enumerate() {
                let range = ranges[tid].clone();
                let scene = &scene;
                let mixture = mixture.as_ref();
                handles.push(s.spawn(move |_| {
                    self.run_worker(
                        scene,
                        geometry_id,
                        boundary_id,
                        mixture,
                        range,
                        src_state,
                        reflect_state,
                    )
                }));
            }
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<std::thread::Result<Vec<_>>>()
        })
        .map_err(|_| Error::InvariantViolation("worker thread panicked".into()))?
        .map_err(|_| Error::InvariantViolation("worker thread panicked".into()))?;

        let mut merged = HitAccumulator::new(prim_count);
        let mut stats = WorkerStats::default();
        for (accumulator, worker) in &outcomes {
            merged.merge(accumulator);
            stats.geo_hits += worker.geo_hits;
            stats.non_geo_hits += worker.non_geo_hits;
            stats.rejected += worker.rejected;
            stats.max_bounces = stats.max_bounces.max(worker.max_bounces);
        }

        match self.config.exposed_area {
            ExposedAreaMode::WholeArea => {
                let areas = (0..prim_count)
                    .map(|p| self.geometry.area(p as PrimId) as f64)
                    .collect();
                merged.set_exposed_areas(areas);
            }
            ExposedAreaMode::Sampling => {
                self.sample_exposed_areas(&scene, geometry_id, &mut merged)
            }
        }

        let time_nanoseconds = timer.elapsed().as_nanos();
        info!(
            geo_hits = stats.geo_hits,
            rejected = stats.rejected,
            ms = (time_nanoseconds / 1_000_000) as u64,
            "trace finished"
        );

        Ok(TraceResult {
            time_nanoseconds,
            num_rays: self.config.num_rays,
            geo_hits: stats.geo_hits,
            non_geo_hits: stats.non_geo_hits,
            rejected_samples: stats.rejected,
            max_trajectory_bounces: stats.max_bounces,
            pilot_samples: pilot.samples.len(),
            fallback_used,
            input_file: self.config.input_label.clone(),
            geometry_kind: self.geometry.kind(),
            accumulator: merged,
            ray_log: pilot.ray_log,
            ray_src_log: pilot.ray_src_log,
        })
    }

    fn run_pilot(
        &self,
        scene: &CommittedScene,
        geometry_id: GeomId,
        boundary_id: GeomId,
        src_state: &mut Pcg64State,
        reflect_state: &mut Pcg64State,
    ) -> PilotOutcome {
        let rng = Pcg64Source;
        // Scratch accumulator: pilot deposits never reach the result.
        let mut ctx = TrajectoryContext::new(
            geometry_id,
            self.geometry,
            boundary_id,
            self.boundary,
            ReflectionModel::DiffuseCosine,
            ReflectionModel::Specular,
            &rng,
            reflect_state,
            HitAccumulator::new(self.geometry.primitive_count()),
        );
        let mut samples = Vec::new();
        let mut ray_log = Vec::new();
        let mut ray_src_log = Vec::new();
        let mut rayhit = RayHit::new(Ray::new(Vec3::zero(), -Vec3::unit_z()));
        for _ in 0..self.config.pilot_rays {
            self.source.fill(&mut rayhit.ray, &rng, src_state);
            let origin = rayhit.ray.origin;
            if self.config.log_rays {
                ray_src_log.push(origin);
            }
            ctx.reset_trajectory(INITIAL_RAY_WEIGHT);
            let mut relevant = 0.0f64;
            loop {
                rayhit.ray.tfar = f32::INFINITY;
                ctx.intersect(scene, &mut rayhit);
                if let Some((prim, value)) = ctx.last_deposit() {
                    if self.geometry.relevance(prim) {
                        relevant += value;
                    }
                }
                if self.config.log_rays {
                    let reach = ctx.tfar.min(10.0);
                    ray_log.push([
                        rayhit.ray.origin,
                        rayhit.ray.origin + rayhit.ray.direction * reach,
                    ]);
                }
                if !ctx.reflect {
                    break;
                }
                reseed(&mut rayhit.ray, &ctx.rayout);
            }
            if relevant > 0.0 {
                samples.push(SourceSample { origin, deposited_weight: relevant });
                if samples.len() >= self.config.pilot_target {
                    break;
                }
            }
        }
        debug!(samples = samples.len(), "pilot finished");
        PilotOutcome { samples, ray_log, ray_src_log }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_worker(
        &self,
        scene: &CommittedScene,
        geometry_id: GeomId,
        boundary_id: GeomId,
        mixture: Option<&GaussianMixture>,
        range: Range<usize>,
        mut src_state: Pcg64State,
        mut reflect_state: Pcg64State,
    ) -> (HitAccumulator, WorkerStats) {
        enable_flush_to_zero();
        let rng = Pcg64Source;
        let mut stats = WorkerStats::default();
        let mut ctx = TrajectoryContext::new(
            geometry_id,
            self.geometry,
            boundary_id,
            self.boundary,
            ReflectionModel::DiffuseCosine,
            ReflectionModel::Specular,
            &rng,
            &mut reflect_state,
            HitAccumulator::new(self.geometry.primitive_count()),
        );
        let mut rayhit = RayHit::new(Ray::new(Vec3::zero(), -Vec3::unit_z()));
        for _ in range {
            let initial_weight = match mixture {
                Some(mixture) => self.fill_importance_sampled(
                    &mut rayhit.ray,
                    mixture,
                    &rng,
                    &mut src_state,
                    &mut stats,
                ),
                None => {
                    self.source.fill(&mut rayhit.ray, &rng, &mut src_state);
                    INITIAL_RAY_WEIGHT
                }
            };
            ctx.reset_trajectory(initial_weight);
            let mut bounces = 0u64;
            loop {
                rayhit.ray.tfar = f32::INFINITY;
                ctx.intersect(scene, &mut rayhit);
                bounces += 1;
                if rayhit.hit.is_hit() && rayhit.hit.geom_id == geometry_id {
                    stats.geo_hits += 1;
                } else {
                    stats.non_geo_hits += 1;
                }
                if !ctx.reflect {
                    break;
                }
                reseed(&mut rayhit.ray, &ctx.rayout);
            }
            stats.max_bounces = stats.max_bounces.max(bounces);
        }
        (ctx.into_accumulator(), stats)
    }

    /// Draw a production origin from the mixture, rejected into the source
    /// rectangle, and seed the trajectory with the correction weight
    /// `p_uniform(x) / p_mixture(x)`.
    fn fill_importance_sampled(
        &self,
        ray: &mut Ray,
        mixture: &GaussianMixture,
        rng: &Pcg64Source,
        state: &mut Pcg64State,
        stats: &mut WorkerStats,
    ) -> f32 {
        let Some(plane) = self.source.rectangle() else {
            self.source.fill(ray, rng, state);
            return INITIAL_RAY_WEIGHT;
        };
        for _ in 0..MAX_REJECTED_DRAWS {
            let sample = mixture.sample(state);
            let (x, y) = (sample[0] as f32, sample[1] as f32);
            if !plane.contains(x, y) {
                stats.rejected += 1;
                continue;
            }
            let density = mixture.pdf(sample);
            if !(density > 0.0) {
                stats.rejected += 1;
                continue;
            }
            self.source.fill_with_origin(ray, Vec2::new(x, y), rng, state);
            // TODO: renormalize for the truncation of the mixture to the
            // rectangle; the mass outside currently biases the weight.
            return (plane.uniform_pdf() / density) as f32;
        }
        debug!("mixture sampling starved; taking a uniform draw");
        self.source.fill(ray, rng, state);
        INITIAL_RAY_WEIGHT
    }

    /// Sampling-mode exposed areas. Triangles keep their whole area; each
    /// disc is probed by rays from a disc of twice its radius, launched
    /// along the inverted normal.
    fn sample_exposed_areas(
        &self,
        scene: &CommittedScene,
        geometry_id: GeomId,
        merged: &mut HitAccumulator,
    ) {
        let prim_count = self.geometry.primitive_count();
        let mut areas = vec![0.0f64; prim_count];
        match self.geometry.primitives() {
            Primitives::Triangles(_) => {
                for (prim, area) in areas.iter_mut().enumerate() {
                    *area = self.geometry.area(prim as PrimId) as f64;
                }
            }
            Primitives::Discs(discs) => {
                let rng = Pcg64Source;
                let mut state = Pcg64State::seed_from(EXPOSED_AREA_SEED);
                for (idx, disc) in discs.iter().enumerate() {
                    // Sampling is unreliable once the probe disc reaches a
                    // reflective wall; those discs keep their whole area.
                    if self.boundary.lateral_clearance(disc.center) < 2.0 * disc.radius {
                        warn!(prim = idx, "disc too close to the boundary; using whole area");
                        areas[idx] = self.geometry.area(idx as PrimId) as f64;
                        continue;
                    }
                    let normal = self.geometry.normal(idx as PrimId);
                    let basis = orthonormal_basis(normal);
                    let probe_radius = 2.0 * disc.radius;
                    let probe_center = disc.center + normal * probe_radius;
                    let mut hits = 0u32;
                    let mut rayhit = RayHit::new(Ray::new(probe_center, -normal));
                    for _ in 0..EXPOSED_AREA_SAMPLES {
                        let rho = probe_radius * rng.uniform_f32(&mut state).sqrt();
                        let theta = TAU * rng.uniform_f32(&mut state);
                        rayhit.ray.origin = probe_center
                            + basis[1] * (rho * theta.cos())
                            + basis[2] * (rho * theta.sin());
                        rayhit.ray.direction = -normal;
                        rayhit.ray.tnear = 0.0;
                        rayhit.ray.tfar = f32::INFINITY;
                        rayhit.hit = Hit::none();
                        scene.intersect_nearest(&mut rayhit);
                        if rayhit.hit.is_hit()
                            && rayhit.hit.geom_id == geometry_id
                            && rayhit.hit.prim_id == idx as PrimId
                        {
                            hits += 1;
                        }
                    }
                    let probe_area =
                        std::f64::consts::PI * probe_radius as f64 * probe_radius as f64;
                    areas[idx] = probe_area * hits as f64 / EXPOSED_AREA_SAMPLES as f64;
                }
            }
        }
        merged.set_exposed_areas(areas);
    }

    fn effective_threads(&self) -> usize {
        let available = num_cpus::get().max(1);
        self.config
            .max_threads
            .unwrap_or(available)
            .max(1)
            .min(available)
            .min(self.config.num_rays.max(1))
    }
}

/// Overwrite `ray` with a staged outgoing ray, renormalizing the direction
/// before it re-enters the intersect loop.
fn reseed(ray: &mut Ray, staged: &StagedRay) {
    ray.origin = staged.origin;
    ray.direction = staged.direction.normalized();
    ray.tnear = STEP_EPS;
    ray.tfar = f32::INFINITY;
    ray.time = 0.0;
}

/// Contiguous per-thread index ranges covering `0..total`.
fn split_ranges(total: usize, parts: usize) -> Vec<Range<usize>> {
    let base = total / parts;
    let extra = total % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

#[cfg(target_arch = "x86_64")]
fn enable_flush_to_zero() {
    // FTZ (bit 15) and DAZ (bit 6) in MXCSR: subnormal precision is traded
    // against the gradual-underflow penalty on every worker thread.
    #[allow(deprecated)]
    unsafe {
        use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};
        _mm_setcsr(_mm_getcsr() | 0x8040);
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn enable_flush_to_zero() {}
