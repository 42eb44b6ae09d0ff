#[cfg(feature = "sort_rayon")]
use rayon::prelude::*;

use bevy::math::{Mat4, Vec4};

use crate::gaussian::settings::SortConfig;

pub mod trigger;


/// row of the view-projection whose dot product grows with distance from the camera.
///
/// perspective projections use clip w, which stays valid under reverse-z and infinite far planes.
/// orthographic projections have a constant w and fall back to clip z, so they must be forward-z.
pub fn depth_row(view_projection: &Mat4) -> Vec4 {
    let w_row = view_projection.row(3);
    if w_row.truncate().length_squared() > f32::EPSILON {
        w_row
    } else {
        view_projection.row(2)
    }
}


// bucketed counting sort over view depth, farthest bucket first
#[derive(Clone, Debug, Default)]
pub struct DepthSorter {
    bucket_count: u32,
    depths: Vec<f32>,
    buckets: Vec<u32>,
    offsets: Vec<u32>,
}

impl DepthSorter {
    pub fn new(config: &SortConfig) -> Self {
        let bucket_count = config.bucket_count.max(1);

        Self {
            bucket_count,
            depths: Vec::new(),
            buckets: Vec::new(),
            offsets: vec![0; bucket_count as usize],
        }
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// grows the scratch buffers, never shrinks them
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.depths.len() {
            self.depths.resize(capacity, 0.0);
            self.buckets.resize(capacity, 0);
        }
    }

    fn compute_depths(&mut self, visible: &[u32], depth: &(impl Fn(u32) -> f32 + Sync)) -> (f32, f32) {
        let depths = &mut self.depths[..visible.len()];

        #[cfg(feature = "sort_rayon")]
        {
            depths
                .par_iter_mut()
                .zip(visible.par_iter())
                .for_each(|(d, &slot)| *d = depth(slot));

            depths
                .par_iter()
                .fold(
                    || (f32::INFINITY, f32::NEG_INFINITY),
                    |(min, max), &d| (min.min(d), max.max(d)),
                )
                .reduce(
                    || (f32::INFINITY, f32::NEG_INFINITY),
                    |(a_min, a_max), (b_min, b_max)| (a_min.min(b_min), a_max.max(b_max)),
                )
        }

        #[cfg(not(feature = "sort_rayon"))]
        {
            let mut min = f32::INFINITY;
            let mut max = f32::NEG_INFINITY;
            for (d, &slot) in depths.iter_mut().zip(visible) {
                *d = depth(slot);
                min = min.min(*d);
                max = max.max(*d);
            }
            (min, max)
        }
    }

    /// writes `visible` into `out` ordered far to near, ties keep their input order
    pub fn sort(&mut self, visible: &[u32], depth: impl Fn(u32) -> f32 + Sync, out: &mut Vec<u32>) {
        let count = visible.len();
        out.clear();
        if count == 0 {
            return;
        }

        self.reserve(count);
        let (min, max) = self.compute_depths(visible, &depth);

        let top = self.bucket_count - 1;
        let range = max - min;
        let scale = if range > 0.0 && range.is_finite() {
            top as f32 / range
        } else {
            0.0
        };

        self.offsets.fill(0);
        for (bucket, &d) in self.buckets[..count].iter_mut().zip(&self.depths[..count]) {
            *bucket = if scale > 0.0 {
                (((d - min) * scale) as u32).min(top)
            } else {
                0
            };
            self.offsets[*bucket as usize] += 1;
        }

        let mut start = 0;
        for offset in self.offsets.iter_mut().rev() {
            let occupancy = *offset;
            *offset = start;
            start += occupancy;
        }

        out.resize(count, 0);
        for (&slot, &bucket) in visible.iter().zip(&self.buckets[..count]) {
            let offset = &mut self.offsets[bucket as usize];
            out[*offset as usize] = slot;
            *offset += 1;
        }
    }
}
