use bevy::math::{Vec3, Vec4};
use bytemuck::{
    Pod,
    Zeroable,
};
use half::f16;
use static_assertions::const_assert_eq;

use crate::{
    chunk::{
        Aabb,
        CHUNK_SIDE,
        CHUNK_SIZE,
        ChunkGrid,
        TemporalFalloff,
    },
    engine::{
        ChunkedLayout,
        SceneDescriptor,
    },
    gaussian::{
        f16::{
            from_f16s,
            to_f16s,
        },
        record::{
            Motion,
            SplatRecord,
        },
        settings::QualityTier,
    },
    kernel::{
        SpaceTime,
        SplatKernel,
        SplatKind,
        ThreeD,
    },
    math::{
        clamp_splat_count,
        dequantize,
        dequantize_u8,
        quantize,
        quantize_u8,
    },
};


const X_BITS: u32 = 11;
const Y_BITS: u32 = 10;
const Z_BITS: u32 = 11;

/// bytes in one RGBA32UI texel of the range texture
pub const RANGE_TEXEL_BYTES: usize = 16;


/// per-chunk dequantization ranges.
///
/// serialized as 8 halves per texel: ThreeD stores position+scale then color,
/// SpaceTime inserts the motion texel between them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkRange {
    /// xmin, ymin, zmin, xmax, ymax, zmax
    pub position: [f16; 6],
    /// min and max of sqrt(scale) over every axis
    pub scale: [f16; 2],
    /// min/max pairs for pos1, pos2 and pos3, then two zero halves
    pub motion: [f16; 8],
    /// min/max pairs for r, g and b, then two zero halves
    pub color: [f16; 8],
}

const_assert_eq!(std::mem::size_of::<ChunkRange>(), 3 * RANGE_TEXEL_BYTES);

impl ChunkRange {
    pub fn texel_count(kind: SplatKind) -> usize {
        match kind {
            SplatKind::ThreeD => 2,
            SplatKind::SpaceTime => 3,
        }
    }

    pub fn byte_len(kind: SplatKind) -> usize {
        Self::texel_count(kind) * RANGE_TEXEL_BYTES
    }

    pub fn write_bytes(&self, kind: SplatKind, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::bytes_of(&self.position));
        out.extend_from_slice(bytemuck::bytes_of(&self.scale));
        if kind == SplatKind::SpaceTime {
            out.extend_from_slice(bytemuck::bytes_of(&self.motion));
        }
        out.extend_from_slice(bytemuck::bytes_of(&self.color));
    }

    /// `bytes` must hold at least `byte_len(kind)` bytes
    pub fn from_bytes(kind: SplatKind, bytes: &[u8]) -> Self {
        let color_offset = Self::byte_len(kind) - RANGE_TEXEL_BYTES;

        Self {
            position: bytemuck::pod_read_unaligned(&bytes[0..12]),
            scale: bytemuck::pod_read_unaligned(&bytes[12..16]),
            motion: match kind {
                SplatKind::ThreeD => [f16::ZERO; 8],
                SplatKind::SpaceTime => bytemuck::pod_read_unaligned(&bytes[16..32]),
            },
            color: bytemuck::pod_read_unaligned(&bytes[color_offset..color_offset + RANGE_TEXEL_BYTES]),
        }
    }
}

// one RGBA32UI texel per SpaceTime splat
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkedOther {
    /// pos1, pos2, pos3 as xyz bytes, the fourth byte of each holds one sqrt(scale) axis
    pub motion: [[u8; 4]; 3],
    pub t_center: f16,
    pub t_scale: f16,
}

const_assert_eq!(std::mem::size_of::<ChunkedOther>(), 16);


pub fn pack_xyz(v: Vec3, min: Vec3, max: Vec3) -> u32 {
    quantize(v.x, X_BITS, min.x, max.x)
        | (quantize(v.y, Y_BITS, min.y, max.y) << X_BITS)
        | (quantize(v.z, Z_BITS, min.z, max.z) << (X_BITS + Y_BITS))
}

pub fn unpack_xyz(packed: u32, min: Vec3, max: Vec3) -> Vec3 {
    Vec3::new(
        dequantize(packed & ((1 << X_BITS) - 1), X_BITS, min.x, max.x),
        dequantize((packed >> X_BITS) & ((1 << Y_BITS) - 1), Y_BITS, min.y, max.y),
        dequantize(packed >> (X_BITS + Y_BITS), Z_BITS, min.z, max.z),
    )
}


fn spread_bits(v: u32) -> u32 {
    let mut x = v & 0x3ff;
    x = (x | (x << 16)) & 0x0300_00ff;
    x = (x | (x << 8)) & 0x0300_f00f;
    x = (x | (x << 4)) & 0x030c_30c3;
    x = (x | (x << 2)) & 0x0924_9249;
    x
}

pub fn morton_code(v: Vec3, bounds: &Aabb) -> u32 {
    let x = quantize(v.x, 10, bounds.min.x, bounds.max.x);
    let y = quantize(v.y, 10, bounds.min.y, bounds.max.y);
    let z = quantize(v.z, 10, bounds.min.z, bounds.max.z);

    spread_bits(x) | (spread_bits(y) << 1) | (spread_bits(z) << 2)
}

/// splat indices ordered along a z-order curve so nearby splats share chunks
pub fn morton_order(records: &[SplatRecord]) -> Vec<usize> {
    let mut bounds = Aabb::EMPTY;
    for record in records {
        bounds.expand_point(record.position);
    }

    let mut keyed: Vec<(u32, usize)> = records
        .iter()
        .enumerate()
        .map(|(index, record)| (morton_code(record.position, &bounds), index))
        .collect();
    keyed.sort_unstable();

    keyed.into_iter().map(|(_, index)| index).collect()
}


fn sqrt_scale(scale: Vec3) -> Vec3 {
    scale.max(Vec3::ZERO).to_array().map(f32::sqrt).into()
}

fn vec3_range(values: impl Iterator<Item = Vec3>) -> (Vec3, Vec3) {
    values.fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(min, max), v| (min.min(v), max.max(v)),
    )
}

fn scalar_range(values: impl Iterator<Item = Vec3>) -> (f32, f32) {
    let (min, max) = vec3_range(values);
    (min.min_element(), max.max_element())
}

// a collapsed range quantizes everything to zero, which decodes back to min
fn encode_u8(x: f32, min: f32, max: f32) -> u8 {
    let max = if max > min { max } else { min + 1.0 };
    quantize_u8(x, min, max)
}

fn pairs(values: &[f16]) -> impl Iterator<Item = (f32, f32)> + '_ {
    values.chunks_exact(2).map(|pair| (pair[0].to_f32(), pair[1].to_f32()))
}


#[derive(Clone, Debug, PartialEq)]
pub struct ChunkedScene {
    pub kind: SplatKind,
    /// populated splats before padding the last chunk
    pub count: usize,
    pub grid: ChunkGrid,
    pub chunk_count: usize,
    pub ranges: Vec<ChunkRange>,
    pub xyz: Vec<u32>,
    pub rotation: Vec<[u8; 4]>,
    /// rgb normalized by the chunk color range, alpha stored as raw opacity
    pub color: Vec<[u8; 4]>,
    /// ThreeD only, SpaceTime keeps scale inside `other`
    pub scale: Vec<[u8; 3]>,
    /// SpaceTime only
    pub other: Vec<ChunkedOther>,
}

impl ChunkedScene {
    /// empty texel storage for `chunk_count` chunks
    pub fn with_grid(kind: SplatKind, grid: ChunkGrid, chunk_count: usize, count: usize) -> Self {
        let capacity = grid.capacity();
        let (scale, other) = match kind {
            SplatKind::ThreeD => (vec![[0; 3]; capacity], Vec::new()),
            SplatKind::SpaceTime => (Vec::new(), vec![ChunkedOther::default(); capacity]),
        };

        Self {
            kind,
            count,
            grid,
            chunk_count,
            ranges: Vec::with_capacity(chunk_count),
            xyz: vec![0; capacity],
            rotation: vec![[0; 4]; capacity],
            color: vec![[0; 4]; capacity],
            scale,
            other,
        }
    }

    pub fn encode(records: &[SplatRecord], kind: SplatKind) -> Self {
        let count = clamp_splat_count(records.len());
        let records = &records[..count];
        let order = morton_order(records);

        let chunk_count = count.div_ceil(CHUNK_SIZE);
        let mut scene = Self::with_grid(kind, ChunkGrid::for_chunks(chunk_count), chunk_count, count);

        for chunk in 0..chunk_count {
            let members = &order[chunk * CHUNK_SIZE..((chunk + 1) * CHUNK_SIZE).min(count)];

            // the last chunk is filled with transparent copies of its final splat
            let mut splats: Vec<SplatRecord> = members.iter().map(|&index| records[index]).collect();
            if let Some(&last) = splats.last() {
                let mut filler = last;
                filler.color.w = 0.0;
                splats.resize(CHUNK_SIZE, filler);
            }

            scene.encode_chunk(chunk, &splats);
        }

        scene
    }

    fn encode_chunk(&mut self, chunk: usize, splats: &[SplatRecord]) {
        let (position_min, position_max) = vec3_range(splats.iter().map(|s| s.position));
        let (scale_min, scale_max) = scalar_range(splats.iter().map(|s| sqrt_scale(s.scale)));
        let (color_min, color_max) = vec3_range(splats.iter().map(|s| s.color.truncate()));

        let motions: Vec<Motion> = splats.iter().map(|s| s.motion.unwrap_or_default()).collect();
        let mut motion = [0.0; 8];
        if self.kind == SplatKind::SpaceTime {
            let orders: [fn(&Motion) -> Vec3; 3] = [|m| m.pos1, |m| m.pos2, |m| m.pos3];
            for (pair, order) in motion.chunks_exact_mut(2).zip(orders) {
                let (min, max) = scalar_range(motions.iter().map(order));
                pair.copy_from_slice(&[min, max]);
            }
        }

        let mut color = [0.0; 8];
        for (axis, pair) in color.chunks_exact_mut(2).take(3).enumerate() {
            pair.copy_from_slice(&[color_min[axis], color_max[axis]]);
        }

        let range = ChunkRange {
            position: to_f16s([
                position_min.x,
                position_min.y,
                position_min.z,
                position_max.x,
                position_max.y,
                position_max.z,
            ]),
            scale: to_f16s([scale_min, scale_max]),
            motion: to_f16s(motion),
            color: to_f16s(color),
        };
        let decoded = DecodedRange::from(&range);

        for (local, (splat, motion)) in splats.iter().zip(&motions).enumerate() {
            let slot = self.grid.slot(chunk, local % CHUNK_SIDE, local / CHUNK_SIDE);

            self.xyz[slot] = pack_xyz(splat.position, decoded.position_min, decoded.position_max);
            self.rotation[slot] = splat.rotation.to_array().map(|q| quantize_u8(q, -1.0, 1.0));

            let rgb = splat.color.truncate();
            self.color[slot] = [
                encode_u8(rgb.x, decoded.color[0].0, decoded.color[0].1),
                encode_u8(rgb.y, decoded.color[1].0, decoded.color[1].1),
                encode_u8(rgb.z, decoded.color[2].0, decoded.color[2].1),
                quantize_u8(splat.color.w, 0.0, 1.0),
            ];

            let scale = sqrt_scale(splat.scale)
                .to_array()
                .map(|s| encode_u8(s, decoded.scale.0, decoded.scale.1));

            match self.kind {
                SplatKind::ThreeD => self.scale[slot] = scale,
                SplatKind::SpaceTime => {
                    let order = |v: Vec3, (min, max): (f32, f32), s: u8| {
                        [encode_u8(v.x, min, max), encode_u8(v.y, min, max), encode_u8(v.z, min, max), s]
                    };

                    self.other[slot] = ChunkedOther {
                        motion: [
                            order(motion.pos1, decoded.motion[0], scale[0]),
                            order(motion.pos2, decoded.motion[1], scale[1]),
                            order(motion.pos3, decoded.motion[2], scale[2]),
                        ],
                        t_center: f16::from_f32(motion.t_center),
                        t_scale: f16::from_f32(motion.t_scale),
                    };
                }
            }
        }

        self.ranges.push(range);
    }

    fn scale_bytes(&self, slot: usize) -> [u8; 3] {
        match self.kind {
            SplatKind::ThreeD => self.scale[slot],
            SplatKind::SpaceTime => self.other[slot].motion.map(|order| order[3]),
        }
    }

    pub fn decode(&self, slot: usize) -> SplatRecord {
        let (chunk, _, _) = self.grid.coordinates(slot);
        let range = DecodedRange::from(&self.ranges[chunk]);

        let position = unpack_xyz(self.xyz[slot], range.position_min, range.position_max);
        let scale = Vec3::from_array(self.scale_bytes(slot).map(|s| {
            let root = dequantize_u8(s, range.scale.0, range.scale.1);
            root * root
        }));
        let rotation = Vec4::from_array(self.rotation[slot].map(|q| dequantize_u8(q, -1.0, 1.0))).normalize_or_zero();

        let color = self.color[slot];
        let color = Vec4::new(
            dequantize_u8(color[0], range.color[0].0, range.color[0].1),
            dequantize_u8(color[1], range.color[1].0, range.color[1].1),
            dequantize_u8(color[2], range.color[2].0, range.color[2].1),
            dequantize_u8(color[3], 0.0, 1.0),
        );

        let motion = match self.kind {
            SplatKind::ThreeD => None,
            SplatKind::SpaceTime => {
                let other = self.other[slot];
                let order = |v: [u8; 4], (min, max): (f32, f32)| {
                    Vec3::new(dequantize_u8(v[0], min, max), dequantize_u8(v[1], min, max), dequantize_u8(v[2], min, max))
                };

                Some(Motion {
                    pos1: order(other.motion[0], range.motion[0]),
                    pos2: order(other.motion[1], range.motion[1]),
                    pos3: order(other.motion[2], range.motion[2]),
                    omega: Vec4::ZERO,
                    t_center: other.t_center.to_f32(),
                    t_scale: other.t_scale.to_f32(),
                })
            }
        };

        SplatRecord {
            position,
            scale,
            rotation,
            color,
            sh: None,
            motion,
        }
    }

    fn populated_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.chunk_count).flat_map(|chunk| self.grid.chunk_slots(chunk))
    }

    /// dequantized centers over the whole capacity grid, unpopulated slots stay zero
    pub fn sort_centers(&self) -> Vec<f32> {
        let stride = self.kind.center_stride();
        let mut centers = vec![0.0; self.grid.capacity() * stride];

        for slot in self.populated_slots() {
            let record = self.decode(slot);
            let center = &mut centers[slot * stride..(slot + 1) * stride];
            match self.kind {
                SplatKind::ThreeD => ThreeD::write_center(&record, center),
                SplatKind::SpaceTime => SpaceTime::write_center(&record, center),
            }
        }

        centers
    }

    pub fn falloff(&self) -> Vec<TemporalFalloff> {
        if self.kind != SplatKind::SpaceTime {
            return Vec::new();
        }

        let mut falloff = vec![TemporalFalloff::default(); self.grid.capacity()];
        for slot in self.populated_slots() {
            falloff[slot] = TemporalFalloff {
                t_scale: self.other[slot].t_scale.to_f32(),
                opacity: self.color[slot][3],
            };
        }
        falloff
    }

    pub fn descriptor(&self, tier: QualityTier) -> SceneDescriptor {
        SceneDescriptor {
            kind: self.kind,
            tier,
            count: self.chunk_count * CHUNK_SIZE,
            centers: self.sort_centers(),
            chunks: Some(ChunkedLayout {
                grid: self.grid,
                chunk_count: self.chunk_count,
                falloff: self.falloff(),
            }),
        }
    }
}


struct DecodedRange {
    position_min: Vec3,
    position_max: Vec3,
    scale: (f32, f32),
    motion: [(f32, f32); 3],
    color: [(f32, f32); 3],
}

impl From<&ChunkRange> for DecodedRange {
    fn from(range: &ChunkRange) -> Self {
        let position: [f32; 6] = from_f16s(range.position);
        let mut motion = [(0.0, 0.0); 3];
        let mut color = [(0.0, 0.0); 3];
        for (dst, src) in motion.iter_mut().zip(pairs(&range.motion)) {
            *dst = src;
        }
        for (dst, src) in color.iter_mut().zip(pairs(&range.color)) {
            *dst = src;
        }

        Self {
            position_min: Vec3::new(position[0], position[1], position[2]),
            position_max: Vec3::new(position[3], position[4], position[5]),
            scale: (range.scale[0].to_f32(), range.scale[1].to_f32()),
            motion,
            color,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xyz_bit_layout() {
        let min = Vec3::ZERO;
        let max = Vec3::ONE;

        assert_eq!(pack_xyz(Vec3::new(1.0, 0.0, 0.0), min, max), 0x7ff);
        assert_eq!(pack_xyz(Vec3::new(0.0, 1.0, 0.0), min, max), 0x3ff << 11);
        assert_eq!(pack_xyz(Vec3::new(0.0, 0.0, 1.0), min, max), 0x7ff << 21);
        assert_eq!(unpack_xyz(u32::MAX, min, max), Vec3::ONE);
    }

    #[test]
    fn test_morton_interleave() {
        assert_eq!(spread_bits(0b111), 0b1001001);
        let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(morton_code(Vec3::ZERO, &bounds) < morton_code(Vec3::ONE, &bounds));
    }

    #[test]
    fn test_range_texels_interleave_pairs() {
        let range = ChunkRange {
            position: to_f16s([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            scale: to_f16s([0.5, 0.75]),
            motion: to_f16s([-1.0, 1.0, -2.0, 2.0, -3.0, 3.0, 0.0, 0.0]),
            color: to_f16s([0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.0, 0.0]),
        };

        let mut three_d = Vec::new();
        range.write_bytes(SplatKind::ThreeD, &mut three_d);
        assert_eq!(three_d.len(), 32);
        assert_eq!(&three_d[16..18], f16::from_f32(0.1).to_le_bytes());
        assert_eq!(&three_d[18..20], f16::from_f32(0.2).to_le_bytes());

        let mut spacetime = Vec::new();
        range.write_bytes(SplatKind::SpaceTime, &mut spacetime);
        assert_eq!(spacetime.len(), 48);
        assert_eq!(&spacetime[16..18], f16::from_f32(-1.0).to_le_bytes());
        assert_eq!(&spacetime[18..20], f16::from_f32(1.0).to_le_bytes());
        assert_eq!(&spacetime[32..34], f16::from_f32(0.1).to_le_bytes());

        assert_eq!(ChunkRange::from_bytes(SplatKind::SpaceTime, &spacetime), range);

        let mut color_only = range;
        color_only.motion = [f16::ZERO; 8];
        assert_eq!(ChunkRange::from_bytes(SplatKind::ThreeD, &three_d), color_only);
    }

    #[test]
    fn test_scale_squares_on_decode() {
        let mut record = SplatRecord {
            scale: Vec3::new(0.25, 1.0, 0.04),
            ..Default::default()
        };
        record.color.w = 1.0;

        let scene = ChunkedScene::encode(&[record], SplatKind::ThreeD);
        let slot = scene.grid.slot(0, 0, 0);

        let (min, max) = (scene.ranges[0].scale[0].to_f32(), scene.ranges[0].scale[1].to_f32());
        assert!((min - 0.2).abs() < 1e-3);
        assert!((max - 1.0).abs() < 1e-3);
        assert_eq!(scene.scale[slot][1], 255);
        assert!(scene.decode(slot).scale.abs_diff_eq(record.scale, 0.01));
    }
}
