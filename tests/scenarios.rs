//! End-to-end tracer scenarios over a small plate geometry.

use fluxtrace::{
    Boundary, ExposedAreaMode, Geometry, Source, SourcePlane, TraceConfig, TraceResult, Tracer,
};
use vek::*;

/// A quad plate at z = 0 spanning `[0, size]^2`, split into two triangles.
fn plate(size: f32, sticking: f32) -> Geometry {
    Geometry::from_triangles(
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(size, 0.0, 0.0),
            Vec3::new(size, size, 0.0),
            Vec3::new(0.0, size, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
        sticking,
    )
    .unwrap()
}

fn run(geometry: &Geometry, config: TraceConfig) -> TraceResult {
    let bbox = geometry.bounding_box();
    let boundary = Boundary::new(bbox);
    let source = Source::new(SourcePlane {
        z: boundary.zmax(),
        c1: Vec2::new(bbox.min.x, bbox.min.y),
        c2: Vec2::new(bbox.max.x, bbox.max.y),
    });
    Tracer::new(geometry, &boundary, &source, config)
        .run()
        .unwrap()
}

fn uniform_config(num_rays: usize, threads: usize) -> TraceConfig {
    TraceConfig {
        num_rays,
        max_threads: Some(threads),
        pilot_rays: 512,
        ..Default::default()
    }
}

#[test]
fn single_triangle_single_ray_deposits_exactly_once() {
    let geometry = Geometry::from_triangles(
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ],
        vec![[0, 1, 2]],
        1.0,
    )
    .unwrap();
    let boundary = Boundary::new(geometry.bounding_box());
    let source = Source::constant(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, -1.0));
    let result = Tracer::new(
        &geometry,
        &boundary,
        &source,
        TraceConfig {
            num_rays: 1,
            max_threads: Some(1),
            pilot_rays: 0,
            ..Default::default()
        },
    )
    .run()
    .unwrap();

    assert_eq!(result.accumulator.deposited(), &[1.0][..]);
    assert_eq!(result.accumulator.hit_counts(), &[1][..]);
    assert_eq!(result.geo_hits, 1);
    assert_eq!(result.non_geo_hits, 0);
    assert_eq!(result.max_trajectory_bounces, 1);
}

#[test]
fn empty_domain_deposits_nothing_and_the_clock_runs() {
    let geometry = Geometry::from_triangles(Vec::new(), Vec::new(), 1.0).unwrap();
    let result = run(&geometry, uniform_config(2_000, 2));
    assert_eq!(result.accumulator.primitive_count(), 0);
    assert!(result.accumulator.deposited().iter().all(|&d| d == 0.0));
    assert_eq!(result.geo_hits, 0);
    assert_eq!(result.pilot_samples, 0);
    assert!(result.time_nanoseconds > 0);
}

#[test]
fn full_sticking_deposits_at_most_the_emitted_weight() {
    let mut geometry = plate(1.0, 1.0);
    // no relevant primitives: production runs from the raw uniform source
    // with unit weights, so total deposit is bounded by the ray count
    geometry.set_relevance_all(false);
    let num_rays = 20_000;
    let result = run(&geometry, uniform_config(num_rays, 1));

    let total = result.accumulator.total_deposited();
    assert!(total <= num_rays as f64 + 1e-6);
    // a minority of shallow rays drifts past the plate edge into the
    // boundary pad ring and exits through the open bottom
    assert!(total >= 0.6 * num_rays as f64, "only {total} deposited");
    assert_eq!(result.pilot_samples, 0);
    assert!(!result.fallback_used);
    let hits: u64 = result.accumulator.hit_counts().iter().sum();
    assert!(hits as f64 >= total);
}

#[test]
fn zero_sticking_deposits_nothing_but_the_clock_runs() {
    let geometry = plate(1.0, 0.0);
    let result = run(&geometry, uniform_config(2_000, 2));
    assert!(result.accumulator.deposited().iter().all(|&d| d == 0.0));
    assert!(result.time_nanoseconds > 0);
    assert_eq!(result.pilot_samples, 0);
}

#[test]
fn repeated_runs_are_byte_identical() {
    let mut geometry = plate(1.0, 0.7);
    geometry.set_relevance_all(false);
    let a = run(&geometry, uniform_config(5_000, 2));
    let b = run(&geometry, uniform_config(5_000, 2));
    assert_eq!(a.accumulator.deposited(), b.accumulator.deposited());
    assert_eq!(a.accumulator.hit_counts(), b.accumulator.hit_counts());
    assert_eq!(a.geo_hits, b.geo_hits);
}

#[test]
fn thread_count_changes_totals_only_statistically() {
    let mut geometry = plate(1.0, 1.0);
    geometry.set_relevance_all(false);
    let num_rays = 40_000;
    let serial = run(&geometry, uniform_config(num_rays, 1));
    let parallel = run(&geometry, uniform_config(num_rays, 4));

    for (s, p) in serial
        .accumulator
        .deposited()
        .iter()
        .zip(parallel.accumulator.deposited())
    {
        assert!(*s > 0.0);
        let relative = (s - p).abs() / s;
        assert!(relative < 0.05, "per-primitive totals diverged by {relative}");
    }
}

#[test]
fn importance_sampling_overweights_against_the_truncation_bias() {
    // A fully absorbing plate: every production trajectory deposits its
    // initial weight p_u/p_m on the first hit. The untruncated mixture
    // density makes the expected total overshoot the ray count by the
    // mixture mass outside the rectangle, and never undershoot it much.
    let geometry = plate(10.0, 1.0);
    let num_rays = 30_000;
    let result = run(
        &geometry,
        TraceConfig {
            num_rays,
            max_threads: Some(2),
            pilot_rays: 8 * 1024,
            pilot_target: 2 * 1024,
            ..Default::default()
        },
    );

    assert_eq!(result.pilot_samples, 2 * 1024);
    assert!(!result.fallback_used);
    assert!(result.rejected_samples > 0);
    let total = result.accumulator.total_deposited();
    let n = num_rays as f64;
    assert!(total > 0.95 * n, "importance-sampled total {total} fell below {n}");
    assert!(total < 1.6 * n, "importance-sampled total {total} ran away");
}

#[test]
fn low_sticking_trajectories_terminate_via_roulette() {
    let mut geometry = plate(1.0, 0.01);
    geometry.set_relevance_all(false);
    let result = run(&geometry, uniform_config(2_000, 2));
    // weight conservation: a trajectory can never deposit more than its
    // (renewed) weight history allows, and the run must terminate
    assert!(result.accumulator.total_deposited() < 2_000.0);
    assert!(result.geo_hits > 0);
    // the roulette bounds trajectory length
    assert!(result.max_trajectory_bounces > 0);
    assert!(
        result.max_trajectory_bounces < 10_000,
        "a trajectory took {} bounces",
        result.max_trajectory_bounces
    );
}

#[test]
fn whole_area_mode_reports_primitive_areas() {
    let mut geometry = plate(2.0, 0.5);
    geometry.set_relevance_all(false);
    let result = run(
        &geometry,
        TraceConfig {
            num_rays: 100,
            max_threads: Some(1),
            pilot_rays: 16,
            exposed_area: ExposedAreaMode::WholeArea,
            ..Default::default()
        },
    );
    let areas = result.accumulator.exposed_areas();
    assert_eq!(areas.len(), 2);
    assert!((areas[0] - 2.0).abs() < 1e-5);
    assert!((areas[1] - 2.0).abs() < 1e-5);
}
