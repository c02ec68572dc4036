use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fluxtrace::{Boundary, Geometry, Source, SourcePlane, TraceConfig, Tracer};
use vek::*;

/// A gridded plate at z = 0 so the BVH has something to chew on.
fn gridded_plate(cells: u32) -> Geometry {
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    let step = 1.0 / cells as f32;
    for y in 0..=cells {
        for x in 0..=cells {
            vertices.push(Vec3::new(x as f32 * step, y as f32 * step, 0.0));
        }
    }
    let stride = cells + 1;
    for y in 0..cells {
        for x in 0..cells {
            let v0 = y * stride + x;
            let v1 = v0 + 1;
            let v2 = v0 + stride + 1;
            let v3 = v0 + stride;
            triangles.push([v0, v1, v2]);
            triangles.push([v0, v2, v3]);
        }
    }
    Geometry::from_triangles(vertices, triangles, 0.8).unwrap()
}

fn bench_trace(c: &mut Criterion) {
    let mut geometry = gridded_plate(16);
    geometry.set_relevance_all(false);
    let bbox = geometry.bounding_box();
    let boundary = Boundary::new(bbox);
    let source = Source::new(SourcePlane {
        z: boundary.zmax(),
        c1: Vec2::new(bbox.min.x, bbox.min.y),
        c2: Vec2::new(bbox.max.x, bbox.max.y),
    });

    c.bench_function("trace_8k_rays_single_thread", |b| {
        let config = TraceConfig {
            num_rays: 8 * 1024,
            max_threads: Some(1),
            pilot_rays: 64,
            ..Default::default()
        };
        b.iter(|| {
            let tracer = Tracer::new(&geometry, &boundary, &source, config.clone());
            black_box(tracer.run().unwrap())
        })
    });

    c.bench_function("trace_8k_rays_all_threads", |b| {
        let config = TraceConfig {
            num_rays: 8 * 1024,
            max_threads: None,
            pilot_rays: 64,
            ..Default::default()
        };
        b.iter(|| {
            let tracer = Tracer::new(&geometry, &boundary, &source, config.clone());
            black_box(tracer.run().unwrap())
        })
    });
}

criterion_group!(benches, bench_trace);
criterion_main!(benches);
