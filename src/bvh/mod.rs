use serde::{
    Deserialize,
    Serialize,
};

use crate::chunk::{
    Aabb,
    ChunkBounds,
    TimeInterval,
};


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct BvhPrimitive {
    pub bounds: ChunkBounds,
    pub chunk: u32,
}

impl BvhPrimitive {
    fn centroid(&self, axis: usize) -> f32 {
        self.bounds.aabb.center()[axis]
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub enum BvhNodeKind {
    Leaf {
        chunk: u32,
    },
    Internal {
        left: u32,
        right: u32,
    },
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct BvhNode {
    pub aabb: Aabb,
    pub time: Option<TimeInterval>,
    pub kind: BvhNodeKind,
}


// balanced median-split tree with exactly one chunk per leaf, root at index 0
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
}

impl Bvh {
    pub fn build(chunks: &[ChunkBounds]) -> Self {
        let mut primitives: Vec<BvhPrimitive> = chunks
            .iter()
            .enumerate()
            .map(|(chunk, bounds)| BvhPrimitive {
                bounds: *bounds,
                chunk: chunk as u32,
            })
            .collect();

        let mut bvh = Self {
            nodes: Vec::with_capacity(primitives.len().saturating_mul(2)),
        };

        if !primitives.is_empty() {
            bvh.build_node(&mut primitives);
        }

        bvh
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<&BvhNode> {
        self.nodes.first()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, BvhNodeKind::Leaf { .. }))
            .count()
    }

    fn build_node(&mut self, primitives: &mut [BvhPrimitive]) -> u32 {
        let mut aabb = Aabb::EMPTY;
        let mut time: Option<TimeInterval> = None;
        for primitive in primitives.iter() {
            aabb = aabb.union(&primitive.bounds.aabb);
            if let Some(interval) = primitive.bounds.time {
                time = Some(time.map_or(interval, |t| t.union(&interval)));
            }
        }

        let index = self.nodes.len() as u32;

        if primitives.len() <= 1 {
            self.nodes.push(BvhNode {
                aabb,
                time,
                kind: BvhNodeKind::Leaf {
                    chunk: primitives[0].chunk,
                },
            });
            return index;
        }

        self.nodes.push(BvhNode {
            aabb,
            time,
            kind: BvhNodeKind::Leaf { chunk: u32::MAX },
        });

        let axis = longest_axis(&aabb);
        let mid = primitives.len() / 2;
        select_nth(primitives, mid, axis);

        let (lower, upper) = primitives.split_at_mut(mid);
        let left = self.build_node(lower);
        let right = self.build_node(upper);

        self.nodes[index as usize].kind = BvhNodeKind::Internal { left, right };
        index
    }
}


fn longest_axis(aabb: &Aabb) -> usize {
    let extent = aabb.max - aabb.min;

    let mut axis = 0;
    if extent.y > extent.x {
        axis = 1;
    }
    if extent.z > extent[axis] {
        axis = 2;
    }
    axis
}

// hoare partition around the middle element, returns the split point j with [l, j] <= pivot <= [j + 1, r]
fn partition(primitives: &mut [BvhPrimitive], left: usize, right: usize, axis: usize) -> usize {
    let pivot = primitives[left + (right - left) / 2].centroid(axis);

    let mut i = left;
    let mut j = right;
    loop {
        while primitives[i].centroid(axis) < pivot {
            i += 1;
        }
        while primitives[j].centroid(axis) > pivot {
            j -= 1;
        }
        if i >= j {
            return j;
        }

        primitives.swap(i, j);
        i += 1;
        j -= 1;
    }
}

/// moves the k-th smallest centroid along `axis` to position k, smaller ones before it
pub fn select_nth(primitives: &mut [BvhPrimitive], k: usize, axis: usize) {
    if primitives.len() < 2 {
        return;
    }

    let mut left = 0;
    let mut right = primitives.len() - 1;
    while left < right {
        let split = partition(primitives, left, right, axis);
        if k <= split {
            right = split;
        } else {
            left = split + 1;
        }
    }
}
