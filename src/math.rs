use std::f32::consts::TAU;
use vek::*;

/// An orthonormal frame `[n̂, b̂, t̂]` built around `v`.
///
/// The perpendicular axis is chosen among three analytically perpendicular
/// candidates by maximum component sum, which keeps the frame well
/// conditioned for near-axis-aligned inputs. Deterministic: the same input
/// always yields the same frame.
pub fn orthonormal_basis(v: Vec3<f32>) -> [Vec3<f32>; 3] {
    let candidates = [
        Vec3::new(v.z, v.z, -(v.x + v.y)),
        Vec3::new(v.y, -(v.x + v.z), v.y),
        Vec3::new(-(v.y + v.z), v.x, v.x),
    ];
    let sum = |w: Vec3<f32>| w.x + w.y + w.z;
    let mut b = candidates[0];
    for c in &candidates[1..] {
        if sum(*c) > sum(b) {
            b = *c;
        }
    }
    let t = v.cross(b);
    [v.normalized(), b.normalized(), t.normalized()]
}

/// Cosine-weighted direction about the first axis of `basis`, from two
/// uniform variates in `[0, 1)`.
pub fn cosine_hemisphere(basis: &[Vec3<f32>; 3], u1: f32, u2: f32) -> Vec3<f32> {
    let r = u1.sqrt();
    let theta = TAU * u2;
    let dir = basis[1] * (r * theta.cos())
        + basis[2] * (r * theta.sin())
        + basis[0] * (1.0 - u1).max(0.0).sqrt();
    dir.normalized()
}

/// Mirror `d` about the unit normal `n`.
#[inline]
pub fn reflect(d: Vec3<f32>, n: Vec3<f32>) -> Vec3<f32> {
    d - n * (2.0 * d.dot(n))
}

/// Unnormalized geometric normal of a triangle, winding-order dependent.
#[inline]
pub fn triangle_normal(a: Vec3<f32>, b: Vec3<f32>, c: Vec3<f32>) -> Vec3<f32> {
    (b - a).cross(c - a)
}

#[inline]
pub fn triangle_area(a: Vec3<f32>, b: Vec3<f32>, c: Vec3<f32>) -> f32 {
    triangle_normal(a, b, c).magnitude() * 0.5
}

/// Component-wise minimum.
#[inline]
pub fn vmin(a: Vec3<f32>, b: Vec3<f32>) -> Vec3<f32> {
    Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

/// Component-wise maximum.
#[inline]
pub fn vmax(a: Vec3<f32>, b: Vec3<f32>) -> Vec3<f32> {
    Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}
