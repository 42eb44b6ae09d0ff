use std::collections::HashSet;

use bevy::math::{Mat4, Vec3};
use rand::Rng;

use bevy_splat_engine::{
    ChunkConfig,
    SplatKind,
    bvh::{
        Bvh,
        BvhNode,
        BvhNodeKind,
    },
    chunk::{
        Aabb,
        CHUNK_SIZE,
        ChunkBounds,
        ChunkGrid,
        TimeInterval,
    },
    cull::{
        Frustum,
        cull,
    },
};


fn random_bounds(count: usize, temporal: bool) -> Vec<ChunkBounds> {
    let mut rng = rand::thread_rng();

    (0..count)
        .map(|_| {
            let min = Vec3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
            );
            let size = Vec3::new(
                rng.gen_range(0.1..5.0),
                rng.gen_range(0.1..5.0),
                rng.gen_range(0.1..5.0),
            );
            let start: f32 = rng.gen_range(0.0..1.0);

            ChunkBounds {
                aabb: Aabb::new(min, min + size),
                time: temporal.then(|| TimeInterval::new(start, start + rng.gen_range(0.0..0.3))),
            }
        })
        .collect()
}

fn check_containment(bvh: &Bvh, index: u32, leaves: &mut Vec<u32>) -> BvhNode {
    let node = bvh.nodes[index as usize];

    match node.kind {
        BvhNodeKind::Leaf { chunk } => leaves.push(chunk),
        BvhNodeKind::Internal { left, right } => {
            for child in [left, right] {
                let child = check_containment(bvh, child, leaves);
                assert!(node.aabb.contains(&child.aabb));
                if let (Some(parent), Some(child)) = (node.time, child.time) {
                    assert!(parent.contains(&child));
                }
            }
        }
    }

    node
}

fn view_projection(eye: Vec3, target: Vec3) -> Mat4 {
    Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0) * Mat4::look_at_rh(eye, target, Vec3::Y)
}


#[test]
fn test_bvh_single_chunk_is_leaf() {
    let bounds = random_bounds(1, false);
    let bvh = Bvh::build(&bounds);

    assert_eq!(bvh.nodes.len(), 1);
    assert_eq!(bvh.leaf_count(), 1);

    let root = bvh.root().unwrap();
    assert_eq!(root.kind, BvhNodeKind::Leaf { chunk: 0 });
    assert_eq!(root.aabb, bounds[0].aabb);
    assert!(root.time.is_none());
}

#[test]
fn test_bvh_empty() {
    let bvh = Bvh::build(&[]);
    assert!(bvh.is_empty());
    assert!(bvh.root().is_none());

    let mut out = vec![7];
    assert_eq!(cull(&bvh, &Frustum::default(), None, &[], &mut out), 0);
    assert!(out.is_empty());
}

#[test]
fn test_bvh_containment() {
    for (count, temporal) in [(2, false), (37, false), (100, true), (257, true)] {
        let bounds = random_bounds(count, temporal);
        let bvh = Bvh::build(&bounds);

        assert_eq!(bvh.leaf_count(), count);
        assert_eq!(bvh.nodes.len(), 2 * count - 1);

        let mut leaves = Vec::new();
        let root = check_containment(&bvh, 0, &mut leaves);

        leaves.sort_unstable();
        assert_eq!(leaves, (0..count as u32).collect::<Vec<_>>());

        for chunk in &bounds {
            assert!(root.aabb.contains(&chunk.aabb));
            if let Some(time) = chunk.time {
                assert!(root.time.unwrap().contains(&time));
            }
        }
    }
}


#[test]
fn test_cull_is_sound() {
    let mut rng = rand::thread_rng();

    let chunk_count = 24;
    let grid = ChunkGrid::for_chunks(chunk_count);
    let mapping = grid.slot_mapping(chunk_count);

    let mut centers = vec![0.0; grid.capacity() * 4];
    for chunk in 0..chunk_count {
        let anchor = Vec3::new(
            rng.gen_range(-40.0..40.0),
            rng.gen_range(-40.0..40.0),
            rng.gen_range(-40.0..40.0),
        );
        for slot in grid.chunk_slots(chunk) {
            let position = anchor + Vec3::new(
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.0..3.0),
            );
            centers[slot * 4..slot * 4 + 4].copy_from_slice(&[position.x, position.y, position.z, 1.0]);
        }
    }

    let bounds = SplatKind::ThreeD.build_chunks(&centers, &[], &mapping, chunk_count, &ChunkConfig::default());
    let bvh = Bvh::build(&bounds);

    for _ in 0..16 {
        let eye = Vec3::new(
            rng.gen_range(-30.0..30.0),
            rng.gen_range(-30.0..30.0),
            rng.gen_range(-30.0..30.0),
        );
        let target = eye + Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), -1.0);
        let frustum = Frustum::from_view_projection(&view_projection(eye, target));

        let mut visible = Vec::new();
        let count = cull(&bvh, &frustum, None, &mapping, &mut visible);
        assert_eq!(count, visible.len());
        assert_eq!(count % CHUNK_SIZE, 0);

        let visible: HashSet<u32> = visible.into_iter().collect();
        assert_eq!(visible.len(), count);

        for &slot in &mapping {
            let center = &centers[slot as usize * 4..];
            let position = Vec3::new(center[0], center[1], center[2]);
            if frustum.contains_point(position) {
                assert!(visible.contains(&slot), "slot {slot} inside the frustum was culled");
            }
        }
    }
}

#[test]
fn test_cull_time_window() {
    let bounds = vec![
        ChunkBounds {
            aabb: Aabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0)),
            time: Some(TimeInterval::new(0.0, 0.25)),
        },
        ChunkBounds {
            aabb: Aabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0)),
            time: Some(TimeInterval::new(0.5, 0.75)),
        },
    ];
    let bvh = Bvh::build(&bounds);
    let mapping: Vec<u32> = (0..2 * CHUNK_SIZE as u32).collect();
    let frustum = Frustum::from_view_projection(&view_projection(Vec3::ZERO, Vec3::NEG_Z));

    let mut visible = Vec::new();
    assert_eq!(cull(&bvh, &frustum, Some(0.1), &mapping, &mut visible), CHUNK_SIZE);
    assert!(visible.iter().all(|&slot| (slot as usize) < CHUNK_SIZE));

    assert_eq!(cull(&bvh, &frustum, Some(0.6), &mapping, &mut visible), CHUNK_SIZE);
    assert!(visible.iter().all(|&slot| (slot as usize) >= CHUNK_SIZE));

    assert_eq!(cull(&bvh, &frustum, Some(0.4), &mapping, &mut visible), 0);
    assert_eq!(cull(&bvh, &frustum, None, &mapping, &mut visible), 2 * CHUNK_SIZE);

    // static kinds ignore the timestamp entirely
    SplatKind::ThreeD.cull(&bvh, &frustum, Some(0.4), &mapping, &mut visible);
    assert_eq!(visible.len(), 2 * CHUNK_SIZE);
}
