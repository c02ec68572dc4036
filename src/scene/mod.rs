mod bvh;

use self::bvh::{hits_aabb, Bvh};
use crate::geom::{Boundary, Disc, Geometry, PrimId, Primitives};
use crate::math::{triangle_normal, vmax, vmin};
use vek::*;

/// Identifier of a geometry attached to a [`Scene`].
pub type GeomId = u32;

/// Sentinel for "no geometry / no primitive".
pub const INVALID_ID: u32 = u32::MAX;

/// A single ray. `direction` is unit length after construction by the
/// source or a reflection model; `tnear > 0` guards against re-hitting the
/// surface a ray was just re-seeded from.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3<f32>,
    pub direction: Vec3<f32>,
    pub tnear: f32,
    pub tfar: f32,
    pub time: f32,
}

impl Ray {
    pub fn new(origin: Vec3<f32>, direction: Vec3<f32>) -> Self {
        Self {
            origin,
            direction,
            tnear: 0.0,
            tfar: f32::INFINITY,
            time: 0.0,
        }
    }
}

/// A committed intersection record. `normal` is the unnormalized geometric
/// normal of the primitive at the hit.
#[derive(Clone, Copy, Debug)]
pub struct Hit {
    pub geom_id: GeomId,
    pub prim_id: PrimId,
    pub normal: Vec3<f32>,
    pub uv: Vec2<f32>,
    pub t: f32,
}

impl Hit {
    pub fn none() -> Self {
        Self {
            geom_id: INVALID_ID,
            prim_id: INVALID_ID,
            normal: Vec3::zero(),
            uv: Vec2::zero(),
            t: f32::INFINITY,
        }
    }

    #[inline]
    pub fn is_hit(&self) -> bool {
        self.geom_id != INVALID_ID
    }
}

/// Ray plus the nearest accepted hit found for it.
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub ray: Ray,
    pub hit: Hit,
}

impl RayHit {
    pub fn new(ray: Ray) -> Self {
        Self { ray, hit: Hit::none() }
    }
}

/// Outcome of a filter callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Accept,
    Reject,
}

/// Any-hit callback protocol.
///
/// During [`CommittedScene::intersect`] the filter is invoked for every
/// candidate hit with `tnear < t <= tfar` — in traversal order, which is
/// NOT sorted by distance. Accepting a candidate commits it and shrinks the ray
/// interval; rejecting leaves the ray unchanged. The trajectory context uses
/// this to stage the next bounce eagerly while the traversal narrows down
/// the nearest accepted hit.
pub trait HitFilter {
    fn filter(&mut self, candidate: &Hit, ray: &Ray) -> Filter;
}

/// A filter that accepts every candidate, yielding plain nearest-hit
/// behaviour.
pub struct AcceptAll;

impl HitFilter for AcceptAll {
    #[inline]
    fn filter(&mut self, _candidate: &Hit, _ray: &Ray) -> Filter {
        Filter::Accept
    }
}

/// Primitive soup of one attached geometry.
#[derive(Clone, Debug)]
pub enum ScenePrimitives {
    Triangles {
        vertices: Vec<Vec3<f32>>,
        indices: Vec<[u32; 3]>,
    },
    Discs(Vec<Disc>),
}

/// One geometry attached to a scene.
#[derive(Clone, Debug)]
pub struct SceneGeometry {
    prims: ScenePrimitives,
}

impl SceneGeometry {
    pub fn from_geometry(geometry: &Geometry) -> Self {
        let prims = match geometry.primitives() {
            Primitives::Triangles(indices) => ScenePrimitives::Triangles {
                vertices: geometry.vertices().to_vec(),
                indices: indices.clone(),
            },
            Primitives::Discs(discs) => ScenePrimitives::Discs(discs.clone()),
        };
        Self { prims }
    }

    pub fn from_boundary(boundary: &Boundary) -> Self {
        Self {
            prims: ScenePrimitives::Triangles {
                vertices: boundary.vertices().to_vec(),
                indices: boundary.triangles().to_vec(),
            },
        }
    }

    fn primitive_count(&self) -> usize {
        match &self.prims {
            ScenePrimitives::Triangles { indices, .. } => indices.len(),
            ScenePrimitives::Discs(discs) => discs.len(),
        }
    }

    fn bounds(&self, prim: usize) -> (Vec3<f32>, Vec3<f32>) {
        match &self.prims {
            ScenePrimitives::Triangles { vertices, indices } => {
                let [a, b, c] = indices[prim].map(|i| vertices[i as usize]);
                (vmin(vmin(a, b), c), vmax(vmax(a, b), c))
            }
            ScenePrimitives::Discs(discs) => {
                let d = &discs[prim];
                let r = Vec3::broadcast(d.radius);
                (d.center - r, d.center + r)
            }
        }
    }
}

/// A scene under construction. Geometries are attached, then [`commit`]
/// builds the acceleration structure; this is the one-off barrier all
/// workers must be past before tracing.
///
/// [`commit`]: Scene::commit
#[derive(Default)]
pub struct Scene {
    geoms: Vec<SceneGeometry>,
}

#[derive(Clone, Copy)]
struct PrimRef {
    geom: u32,
    prim: u32,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, geometry: SceneGeometry) -> GeomId {
        self.geoms.push(geometry);
        (self.geoms.len() - 1) as GeomId
    }

    pub fn commit(self) -> CommittedScene {
        let mut prims = Vec::new();
        let mut bounds = Vec::new();
        for (gid, geom) in self.geoms.iter().enumerate() {
            for pid in 0..geom.primitive_count() {
                prims.push(PrimRef { geom: gid as u32, prim: pid as u32 });
                bounds.push(geom.bounds(pid));
            }
        }
        let bvh = Bvh::build(&bounds);
        CommittedScene { geoms: self.geoms, prims, bvh }
    }
}

/// An immutable, traceable scene.
pub struct CommittedScene {
    geoms: Vec<SceneGeometry>,
    prims: Vec<PrimRef>,
    bvh: Bvh,
}

impl CommittedScene {
    /// Find the nearest accepted hit for `rayhit.ray`.
    ///
    /// The filter decides acceptance per candidate (see [`HitFilter`]). On
    /// return, `rayhit.hit` holds the nearest accepted hit (or
    /// [`Hit::none`]) and `rayhit.ray.tfar` is shrunk to its distance.
    pub fn intersect(&self, rayhit: &mut RayHit, filter: &mut dyn HitFilter) {
        if self.bvh.is_empty() {
            return;
        }
        let ray = rayhit.ray;
        let mut tfar = ray.tfar;
        let inv_dir = ray.direction.map(|c| 1.0 / c);

        let nodes = self.bvh.nodes();
        let order = self.bvh.prim_order();
        let mut stack = Vec::with_capacity(64);
        stack.push(0u32);

        while let Some(node_idx) = stack.pop() {
            let node = &nodes[node_idx as usize];
            if !hits_aabb(node, ray.origin, inv_dir, ray.tnear, tfar) {
                continue;
            }
            if node.count == 0 {
                stack.push(node.left_first);
                stack.push(node.left_first + 1);
                continue;
            }
            for &flat in &order[node.left_first as usize..(node.left_first + node.count) as usize] {
                let pref = self.prims[flat as usize];
                if let Some(candidate) = self.intersect_prim(pref, &ray, tfar) {
                    let mut current = ray;
                    current.tfar = tfar;
                    match filter.filter(&candidate, &current) {
                        Filter::Accept => {
                            tfar = candidate.t;
                            rayhit.hit = candidate;
                        }
                        Filter::Reject => {}
                    }
                }
            }
        }
        rayhit.ray.tfar = tfar;
    }

    /// Plain nearest-hit query without user filtering.
    pub fn intersect_nearest(&self, rayhit: &mut RayHit) {
        self.intersect(rayhit, &mut AcceptAll);
    }

    fn intersect_prim(&self, pref: PrimRef, ray: &Ray, tfar: f32) -> Option<Hit> {
        match &self.geoms[pref.geom as usize].prims {
            ScenePrimitives::Triangles { vertices, indices } => {
                let [a, b, c] = indices[pref.prim as usize].map(|i| vertices[i as usize]);
                intersect_triangle(ray, tfar, a, b, c).map(|(t, u, v)| Hit {
                    geom_id: pref.geom,
                    prim_id: pref.prim,
                    normal: triangle_normal(a, b, c),
                    uv: Vec2::new(u, v),
                    t,
                })
            }
            ScenePrimitives::Discs(discs) => {
                let disc = &discs[pref.prim as usize];
                intersect_disc(ray, tfar, disc).map(|(t, dist)| Hit {
                    geom_id: pref.geom,
                    prim_id: pref.prim,
                    normal: disc.normal,
                    uv: Vec2::new(dist, 0.0),
                    t,
                })
            }
        }
    }
}

/// Möller–Trumbore, double-sided. Returns `(t, u, v)` for
/// `tnear < t < tfar`.
fn intersect_triangle(
    ray: &Ray,
    tfar: f32,
    a: Vec3<f32>,
    b: Vec3<f32>,
    c: Vec3<f32>,
) -> Option<(f32, f32, f32)> {
    let e1 = b - a;
    let e2 = c - a;
    let pvec = ray.direction.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = ray.origin - a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(e1);
    let v = ray.direction.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(qvec) * inv_det;
    // Equality on the far side keeps equal-distance candidates visible to
    // the filter, which is how boundary/geometry ties get resolved.
    (t > ray.tnear && t <= tfar).then_some((t, u, v))
}

/// Oriented-disc intersection. Returns `(t, distance_to_center)` when the
/// ray crosses the supporting plane within the disc radius.
fn intersect_disc(ray: &Ray, tfar: f32, disc: &Disc) -> Option<(f32, f32)> {
    let denom = ray.direction.dot(disc.normal);
    if denom.abs() < 1e-12 {
        return None;
    }
    let t = (disc.center - ray.origin).dot(disc.normal) / denom;
    if t <= ray.tnear || t > tfar {
        return None;
    }
    let p = ray.origin + ray.direction * t;
    let dist_sq = (p - disc.center).magnitude_squared();
    (dist_sq <= disc.radius * disc.radius).then(|| (t, dist_sq.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Aabb;
    use approx::assert_relative_eq;

    fn plate_scene() -> (CommittedScene, GeomId) {
        let geo = Geometry::from_triangles(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
            1.0,
        )
        .unwrap();
        let mut scene = Scene::new();
        let gid = scene.attach(SceneGeometry::from_geometry(&geo));
        (scene.commit(), gid)
    }

    #[test]
    fn nearest_hit_straight_down() {
        let (scene, gid) = plate_scene();
        let mut rayhit = RayHit::new(Ray::new(
            Vec3::new(0.25, 0.25, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ));
        scene.intersect_nearest(&mut rayhit);
        assert!(rayhit.hit.is_hit());
        assert_eq!(rayhit.hit.geom_id, gid);
        assert_relative_eq!(rayhit.hit.t, 1.0, epsilon = 1e-5);
        assert_relative_eq!(rayhit.ray.tfar, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn miss_leaves_ray_untouched() {
        let (scene, _) = plate_scene();
        let mut rayhit = RayHit::new(Ray::new(
            Vec3::new(0.25, 0.25, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ));
        scene.intersect_nearest(&mut rayhit);
        assert!(!rayhit.hit.is_hit());
        assert!(rayhit.ray.tfar.is_infinite());
    }

    #[test]
    fn rejecting_filter_discards_candidates() {
        struct RejectGeom(GeomId);
        impl HitFilter for RejectGeom {
            fn filter(&mut self, candidate: &Hit, _ray: &Ray) -> Filter {
                if candidate.geom_id == self.0 {
                    Filter::Reject
                } else {
                    Filter::Accept
                }
            }
        }
        let (scene, gid) = plate_scene();
        let mut rayhit = RayHit::new(Ray::new(
            Vec3::new(0.25, 0.25, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ));
        scene.intersect(&mut rayhit, &mut RejectGeom(gid));
        assert!(!rayhit.hit.is_hit());
    }

    #[test]
    fn candidates_at_or_below_tnear_are_not_reported() {
        let (scene, _) = plate_scene();
        let mut ray = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, -1.0));
        ray.tnear = 1.5; // the plate sits at t == 1.0
        let mut rayhit = RayHit::new(ray);
        scene.intersect_nearest(&mut rayhit);
        assert!(!rayhit.hit.is_hit());
    }

    #[test]
    fn nearest_of_two_geometries_wins() {
        let low = Geometry::from_triangles(
            vec![
                Vec3::new(-2.0, -2.0, 0.0),
                Vec3::new(2.0, -2.0, 0.0),
                Vec3::new(0.0, 2.0, 0.0),
            ],
            vec![[0, 1, 2]],
            1.0,
        )
        .unwrap();
        let high = Geometry::from_triangles(
            vec![
                Vec3::new(-2.0, -2.0, 0.5),
                Vec3::new(2.0, -2.0, 0.5),
                Vec3::new(0.0, 2.0, 0.5),
            ],
            vec![[0, 1, 2]],
            1.0,
        )
        .unwrap();
        let mut scene = Scene::new();
        let _low_id = scene.attach(SceneGeometry::from_geometry(&low));
        let high_id = scene.attach(SceneGeometry::from_geometry(&high));
        let scene = scene.commit();
        let mut rayhit = RayHit::new(Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0)));
        scene.intersect_nearest(&mut rayhit);
        assert_eq!(rayhit.hit.geom_id, high_id);
        assert_relative_eq!(rayhit.hit.t, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn disc_hit_respects_radius() {
        let geo = Geometry::from_discs(
            vec![Disc {
                center: Vec3::new(0.0, 0.0, 0.0),
                radius: 0.5,
                normal: Vec3::new(0.0, 0.0, 1.0),
            }],
            1.0,
        )
        .unwrap();
        let mut scene = Scene::new();
        scene.attach(SceneGeometry::from_geometry(&geo));
        let scene = scene.commit();

        let mut inside = RayHit::new(Ray::new(Vec3::new(0.2, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0)));
        scene.intersect_nearest(&mut inside);
        assert!(inside.hit.is_hit());
        assert_relative_eq!(inside.hit.uv.x, 0.2, epsilon = 1e-5);

        let mut outside =
            RayHit::new(Ray::new(Vec3::new(0.7, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0)));
        scene.intersect_nearest(&mut outside);
        assert!(!outside.hit.is_hit());
    }

    #[test]
    fn bvh_agrees_with_a_brute_force_scan() {
        use crate::rng::{Pcg64Source, Pcg64State, RandomSource};

        // a bumpy gridded plate, big enough for real BVH subdivision
        let cells = 8u32;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for y in 0..=cells {
            for x in 0..=cells {
                let h = ((x + y) % 3) as f32 * 0.1;
                vertices.push(Vec3::new(
                    x as f32 / cells as f32,
                    y as f32 / cells as f32,
                    h,
                ));
            }
        }
        let stride = cells + 1;
        for y in 0..cells {
            for x in 0..cells {
                let v0 = y * stride + x;
                let v1 = v0 + 1;
                let v2 = v0 + stride + 1;
                let v3 = v0 + stride;
                indices.push([v0, v1, v2]);
                indices.push([v0, v2, v3]);
            }
        }
        let geo = Geometry::from_triangles(vertices.clone(), indices.clone(), 1.0).unwrap();
        let mut scene = Scene::new();
        let gid = scene.attach(SceneGeometry::from_geometry(&geo));
        let scene = scene.commit();

        let rng = Pcg64Source;
        let mut state = Pcg64State::seed_from(97);
        for _ in 0..512 {
            let origin = Vec3::new(
                rng.uniform_f32(&mut state) * 1.4 - 0.2,
                rng.uniform_f32(&mut state) * 1.4 - 0.2,
                1.0,
            );
            let direction = Vec3::new(
                rng.uniform_f32(&mut state) - 0.5,
                rng.uniform_f32(&mut state) - 0.5,
                -1.0,
            )
            .normalized();
            let ray = Ray::new(origin, direction);

            let mut brute: Option<f32> = None;
            for tri in &indices {
                let [a, b, c] = tri.map(|i| vertices[i as usize]);
                if let Some((t, _, _)) = intersect_triangle(&ray, f32::INFINITY, a, b, c) {
                    brute = Some(brute.map_or(t, |nearest: f32| nearest.min(t)));
                }
            }

            let mut rayhit = RayHit::new(ray);
            scene.intersect_nearest(&mut rayhit);
            match brute {
                Some(t) => {
                    assert!(rayhit.hit.is_hit());
                    assert_eq!(rayhit.hit.geom_id, gid);
                    assert!((rayhit.hit.t - t).abs() < 1e-5);
                }
                None => assert!(!rayhit.hit.is_hit()),
            }
        }
    }

    #[test]
    fn empty_scene_reports_no_hits() {
        let scene = Scene::new().commit();
        let mut rayhit = RayHit::new(Ray::new(Vec3::zero(), -Vec3::unit_z()));
        scene.intersect_nearest(&mut rayhit);
        assert!(!rayhit.hit.is_hit());
        assert!(rayhit.ray.tfar.is_infinite());
    }

    #[test]
    fn boundary_attaches_as_triangles() {
        let boundary = Boundary::new(Aabb { min: Vec3::zero(), max: Vec3::one() });
        let mut scene = Scene::new();
        let bid = scene.attach(SceneGeometry::from_boundary(&boundary));
        let scene = scene.commit();
        // fire at the x = max lateral face from inside
        let mut rayhit =
            RayHit::new(Ray::new(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0)));
        scene.intersect_nearest(&mut rayhit);
        assert!(rayhit.hit.is_hit());
        assert_eq!(rayhit.hit.geom_id, bid);
        assert_relative_eq!(rayhit.hit.t, 0.5 + 0.1, epsilon = 1e-5);
    }
}
