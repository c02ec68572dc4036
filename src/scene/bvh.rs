use crate::math::{vmax, vmin};
use vek::*;

/// Flat binary BVH node. `count > 0` marks a leaf covering
/// `prim_order[left_first..left_first + count]`; otherwise `left_first` is
/// the index of the first of two consecutive children.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Node {
    pub min: Vec3<f32>,
    pub max: Vec3<f32>,
    pub left_first: u32,
    pub count: u32,
}

/// Bounding volume hierarchy over primitive AABBs.
///
/// Built once at scene commit; read-only during tracing.
pub(crate) struct Bvh {
    nodes: Vec<Node>,
    prim_order: Vec<u32>,
}

const LEAF_SIZE: usize = 4;

impl Bvh {
    /// Build over per-primitive bounds given as `(min, max)` pairs.
    pub fn build(bounds: &[(Vec3<f32>, Vec3<f32>)]) -> Self {
        let centroids: Vec<Vec3<f32>> =
            bounds.iter().map(|(lo, hi)| (*lo + *hi) * 0.5).collect();
        let mut prim_order: Vec<u32> = (0..bounds.len() as u32).collect();
        let mut nodes = Vec::with_capacity(bounds.len().max(1) * 2);
        nodes.push(Node {
            min: Vec3::zero(),
            max: Vec3::zero(),
            left_first: 0,
            count: bounds.len() as u32,
        });
        let mut bvh = Self { nodes, prim_order: Vec::new() };
        Self::subdivide(&mut bvh.nodes, 0, &mut prim_order, bounds, &centroids);
        bvh.prim_order = prim_order;
        bvh
    }

    fn refit(node: &mut Node, order: &[u32], bounds: &[(Vec3<f32>, Vec3<f32>)]) {
        let mut lo = Vec3::broadcast(f32::INFINITY);
        let mut hi = Vec3::broadcast(f32::NEG_INFINITY);
        for &p in &order[node.left_first as usize..(node.left_first + node.count) as usize] {
            lo = vmin(lo, bounds[p as usize].0);
            hi = vmax(hi, bounds[p as usize].1);
        }
        node.min = lo;
        node.max = hi;
    }

    fn subdivide(
        nodes: &mut Vec<Node>,
        node_idx: usize,
        order: &mut [u32],
        bounds: &[(Vec3<f32>, Vec3<f32>)],
        centroids: &[Vec3<f32>],
    ) {
        let mut node = nodes[node_idx];
        Self::refit(&mut node, order, bounds);
        if (node.count as usize) <= LEAF_SIZE {
            nodes[node_idx] = node;
            return;
        }

        let first = node.left_first as usize;
        let count = node.count as usize;
        let slice = &mut order[first..first + count];

        // Split along the widest centroid axis at its midpoint; fall back to
        // a median split when the partition degenerates.
        let (clo, chi) = slice.iter().fold(
            (Vec3::broadcast(f32::INFINITY), Vec3::broadcast(f32::NEG_INFINITY)),
            |(lo, hi), &p| {
                let c = centroids[p as usize];
                (vmin(lo, c), vmax(hi, c))
            },
        );
        let extent = chi - clo;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        let along = |p: u32| axis_component(centroids[p as usize], axis);
        let pivot = (axis_component(clo, axis) + axis_component(chi, axis)) * 0.5;
        let mut mid = partition(slice, |&p| along(p) < pivot);
        if mid == 0 || mid == count {
            slice.sort_unstable_by(|&a, &b| {
                along(a)
                    .partial_cmp(&along(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            mid = count / 2;
        }

        let left_idx = nodes.len();
        nodes.push(Node {
            min: Vec3::zero(),
            max: Vec3::zero(),
            left_first: first as u32,
            count: mid as u32,
        });
        nodes.push(Node {
            min: Vec3::zero(),
            max: Vec3::zero(),
            left_first: (first + mid) as u32,
            count: (count - mid) as u32,
        });
        node.left_first = left_idx as u32;
        node.count = 0;
        nodes[node_idx] = node;

        Self::subdivide(nodes, left_idx, order, bounds, centroids);
        Self::subdivide(nodes, left_idx + 1, order, bounds, centroids);
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn prim_order(&self) -> &[u32] {
        &self.prim_order
    }

    pub fn is_empty(&self) -> bool {
        self.prim_order.is_empty()
    }
}

/// Slab test against the node bounds over `(tnear, tfar)`.
#[inline]
pub(crate) fn hits_aabb(
    node: &Node,
    origin: Vec3<f32>,
    inv_dir: Vec3<f32>,
    tnear: f32,
    tfar: f32,
) -> bool {
    let t0 = (node.min - origin) * inv_dir;
    let t1 = (node.max - origin) * inv_dir;
    let lo = vmin(t0, t1);
    let hi = vmax(t0, t1);
    let enter = lo.x.max(lo.y).max(lo.z).max(tnear);
    let exit = hi.x.min(hi.y).min(hi.z).min(tfar);
    enter <= exit
}

#[inline]
fn axis_component(v: Vec3<f32>, axis: usize) -> f32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

fn partition<T, F: Fn(&T) -> bool>(slice: &mut [T], pred: F) -> usize {
    let mut mid = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            slice.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
