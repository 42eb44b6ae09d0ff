use bevy::math::{Mat4, Vec3, Vec4};

use crate::{
    bvh::{
        Bvh,
        BvhNode,
        BvhNodeKind,
    },
    chunk::{
        Aabb,
        CHUNK_SIZE,
    },
};


#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    fn from_row(row: Vec4) -> Self {
        let normal = row.truncate();
        let length = normal.length();
        if length <= 1e-6 {
            return Self::default();
        }

        Self {
            normal: normal / length,
            distance: row.w / length,
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    // a box is outside once even its most positive corner sits past the one unit slack
    pub fn excludes(&self, aabb: &Aabb) -> bool {
        let radius = self.normal.abs().dot(aabb.half_extent());
        self.signed_distance(aabb.center()) + radius < -1.0
    }
}


#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frustum {
    /// left, right, bottom, top, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Self {
            planes: [
                Plane::from_row(r3 + r0),
                Plane::from_row(r3 - r0),
                Plane::from_row(r3 + r1),
                Plane::from_row(r3 - r1),
                Plane::from_row(r2),
                Plane::from_row(r3 - r2),
            ],
        }
    }

    pub fn excludes(&self, aabb: &Aabb) -> bool {
        self.planes.iter().any(|plane| plane.excludes(aabb))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(point) >= 0.0)
    }
}


fn prune(node: &BvhNode, frustum: &Frustum, timestamp: Option<f32>) -> bool {
    if let (Some(timestamp), Some(time)) = (timestamp, node.time) {
        if !time.includes(timestamp) {
            return true;
        }
    }

    frustum.excludes(&node.aabb)
}

/// appends the slots of every chunk surviving frustum and time tests to `out`, returns the count
pub fn cull(
    bvh: &Bvh,
    frustum: &Frustum,
    timestamp: Option<f32>,
    mapping: &[u32],
    out: &mut Vec<u32>,
) -> usize {
    out.clear();
    if bvh.is_empty() {
        return 0;
    }

    let mut stack: Vec<u32> = Vec::with_capacity(64);
    stack.push(0);

    while let Some(index) = stack.pop() {
        let node = &bvh.nodes[index as usize];
        if prune(node, frustum, timestamp) {
            continue;
        }

        match node.kind {
            BvhNodeKind::Leaf { chunk } => {
                let start = chunk as usize * CHUNK_SIZE;
                out.extend_from_slice(&mapping[start..start + CHUNK_SIZE]);
            }
            BvhNodeKind::Internal { left, right } => {
                stack.push(left);
                stack.push(right);
            }
        }
    }

    out.len()
}
