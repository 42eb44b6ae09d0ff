use bevy::math::Vec3;
use serde::{
    Deserialize,
    Serialize,
};

#[cfg(feature = "sort_rayon")]
use rayon::prelude::*;

use crate::gaussian::settings::ChunkConfig;

pub mod motion;


pub const CHUNK_SIDE: usize = 16;
pub const CHUNK_SIZE: usize = CHUNK_SIDE * CHUNK_SIDE;

// a zero falloff rate never fades, its reach is capped to the normalized time domain
pub const MAX_TEMPORAL_RADIUS: f32 = 1.1;


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct TimeInterval {
    pub start: f32,
    pub end: f32,
}

impl Default for TimeInterval {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl TimeInterval {
    pub const EMPTY: Self = Self {
        start: f32::INFINITY,
        end: f32::NEG_INFINITY,
    };

    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn includes(&self, timestamp: f32) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && self.end >= other.end
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct ChunkBounds {
    pub aabb: Aabb,
    pub time: Option<TimeInterval>,
}


/// per-slot inputs to the temporal radius of a time-varying splat
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct TemporalFalloff {
    pub t_scale: f32,
    /// opacity in 0..=255
    pub opacity: u8,
}

impl TemporalFalloff {
    pub fn from_opacity(t_scale: f32, opacity: f32) -> Self {
        Self {
            t_scale,
            opacity: crate::math::quantize_u8(opacity, 0.0, 1.0),
        }
    }

    /// time offset after which the splat's opacity drops below the threshold
    pub fn radius(&self, config: &ChunkConfig) -> f32 {
        // the floored threshold only enters the log term
        if self.opacity <= config.alpha_threshold {
            return 0.0;
        }

        let ln_opacity = (self.opacity as f32 / 255.0).ln();
        let radius = ((ln_opacity - config.ln_threshold()) / self.t_scale).sqrt();

        if radius.is_nan() {
            0.0
        } else {
            radius.min(MAX_TEMPORAL_RADIUS)
        }
    }
}


// chunk grid over a texel grid, chunks are 16x16 tiles of splat slots
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct ChunkGrid {
    pub width: usize,
    pub height: usize,
}

impl ChunkGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn from_texture(width: usize, height: usize) -> Self {
        Self::new(width / CHUNK_SIDE, height / CHUNK_SIDE)
    }

    /// smallest texture-shaped grid holding `chunk_count` chunks
    pub fn for_chunks(chunk_count: usize) -> Self {
        let (width, height) = crate::math::texture_size(chunk_count * CHUNK_SIZE);
        Self::from_texture(width, height)
    }

    pub fn chunk_count(&self) -> usize {
        self.width * self.height
    }

    pub fn capacity(&self) -> usize {
        self.chunk_count() * CHUNK_SIZE
    }

    pub fn slot(&self, chunk: usize, local_x: usize, local_y: usize) -> usize {
        let chunk_x = chunk % self.width;
        let chunk_y = chunk / self.width;

        local_x
            + CHUNK_SIDE * chunk_x
            + CHUNK_SIDE * self.width * local_y
            + CHUNK_SIDE * self.width * CHUNK_SIDE * chunk_y
    }

    pub fn coordinates(&self, slot: usize) -> (usize, usize, usize) {
        let row_width = CHUNK_SIDE * self.width;
        let x = slot % row_width;
        let y = slot / row_width;

        let chunk = (y / CHUNK_SIDE) * self.width + x / CHUNK_SIDE;
        (chunk, x % CHUNK_SIDE, y % CHUNK_SIDE)
    }

    pub fn chunk_slots(&self, chunk: usize) -> impl Iterator<Item = usize> + '_ {
        (0..CHUNK_SIZE).map(move |local| self.slot(chunk, local % CHUNK_SIDE, local / CHUNK_SIDE))
    }

    /// chunk-major slot table, entry `chunk * 256 + local_y * 16 + local_x`
    pub fn slot_mapping(&self, chunk_count: usize) -> Vec<u32> {
        assert!(chunk_count <= self.chunk_count(), "chunk count exceeds grid");

        (0..chunk_count)
            .flat_map(|chunk| self.chunk_slots(chunk))
            .map(|slot| slot as u32)
            .collect()
    }
}


pub fn static_chunk_bounds(centers: &[f32], stride: usize, slots: &[u32]) -> ChunkBounds {
    let mut aabb = Aabb::EMPTY;
    for &slot in slots {
        let center = &centers[slot as usize * stride..];
        aabb.expand_point(Vec3::new(center[0], center[1], center[2]));
    }

    ChunkBounds { aabb, time: None }
}

pub fn temporal_chunk_bounds(
    centers: &[f32],
    falloff: &[TemporalFalloff],
    slots: &[u32],
    config: &ChunkConfig,
) -> ChunkBounds {
    let mut aabb = Aabb::EMPTY;
    let mut time = TimeInterval::EMPTY;

    for &slot in slots {
        let slot = slot as usize;
        let center = &centers[slot * motion::CENTER_STRIDE..(slot + 1) * motion::CENTER_STRIDE];
        let radius = falloff[slot].radius(config);
        let t_center = center[12];

        time = time.union(&TimeInterval::new(t_center - radius, t_center + radius));

        let (min, max) = motion::swept_extent(center, radius);
        aabb.expand_point(min);
        aabb.expand_point(max);
    }

    ChunkBounds {
        aabb,
        time: Some(time),
    }
}


pub fn build_chunk_bounds(
    chunk_count: usize,
    mapping: &[u32],
    bounds: impl Fn(&[u32]) -> ChunkBounds + Sync,
) -> Vec<ChunkBounds> {
    assert!(mapping.len() >= chunk_count * CHUNK_SIZE, "slot mapping shorter than chunk count");

    #[cfg(feature = "sort_rayon")]
    {
        mapping[..chunk_count * CHUNK_SIZE]
            .par_chunks(CHUNK_SIZE)
            .map(&bounds)
            .collect()
    }

    #[cfg(not(feature = "sort_rayon"))]
    {
        mapping[..chunk_count * CHUNK_SIZE]
            .chunks(CHUNK_SIZE)
            .map(&bounds)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_coordinates_inverse() {
        let grid = ChunkGrid::new(3, 2);
        for slot in 0..grid.capacity() {
            let (chunk, x, y) = grid.coordinates(slot);
            assert_eq!(grid.slot(chunk, x, y), slot);
        }
    }

    #[test]
    fn test_radius_below_threshold() {
        let config = ChunkConfig::default();
        let falloff = TemporalFalloff { t_scale: 10.0, opacity: 10 };

        assert_eq!(falloff.radius(&config), 0.0);
    }
}
