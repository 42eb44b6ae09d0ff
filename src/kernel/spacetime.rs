use bevy::math::{Vec3, Vec4};
use bytemuck::{
    Pod,
    Zeroable,
};
use half::f16;
use static_assertions::const_assert_eq;

use crate::{
    chunk::{
        ChunkBounds,
        TemporalFalloff,
        motion,
        temporal_chunk_bounds,
    },
    error::Result,
    gaussian::{
        f16::{
            from_f16s,
            to_f16s,
            vec3_from_f16s,
            vec3_to_f16s,
        },
        record::{
            Motion,
            SplatRecord,
        },
        settings::{
            ChunkConfig,
            QualityTier,
        },
    },
    io::{
        layout::{
            BufferLayout,
            SplatBuffer,
            TexelFormat,
        },
        source::{
            SourceLayout,
            SourceView,
        },
    },
    kernel::{
        SplatKernel,
        SplatKind,
        three_d::{
            POS6_PAD2,
            POS12_PAD4,
            Pos6Pad2,
            Pos12Pad4,
            color_from_u8,
            color_to_u8,
        },
    },
    math::{
        dequantize_u8,
        quantize_u8,
        sigmoid,
    },
};


pub const ROTATION_RANGE: (f32, f32) = (-1.0, 1.3);
pub const OMEGA_RANGE: (f32, f32) = (-0.17, 0.17);
pub const MOTION_RANGE: (f32, f32) = (-5.0, 5.0);
pub const T_CENTER_RANGE: (f32, f32) = (-0.05, 1.05);


pub const ROT4_OMEGA4_SCALE6_TS2: BufferLayout = BufferLayout {
    role: "rot",
    name: "Rot4Omega4Scale6Ts2",
    bytes_per_texel: 16,
    texel_per_splat: 1,
    format: TexelFormat::Rgba32Uint,
};

pub const MOTION11_TC1_COL4: BufferLayout = BufferLayout {
    role: "other",
    name: "Motion11Tc1Col4",
    bytes_per_texel: 16,
    texel_per_splat: 1,
    format: TexelFormat::Rgba32Uint,
};

pub const ROT8_OMEGA4_COL4: BufferLayout = BufferLayout {
    role: "rot",
    name: "Rot8Omega4Col4",
    bytes_per_texel: 16,
    texel_per_splat: 1,
    format: TexelFormat::Rgba32Uint,
};

pub const MOTION15_TC1_SCALE6_TS2: BufferLayout = BufferLayout {
    role: "other",
    name: "Motion15Tc1Scale6Ts2",
    bytes_per_texel: 12,
    texel_per_splat: 2,
    format: TexelFormat::Rgb32Uint,
};

pub const ROT8_OMEGA8: BufferLayout = BufferLayout {
    role: "rot",
    name: "Rot8Omega8",
    bytes_per_texel: 16,
    texel_per_splat: 1,
    format: TexelFormat::Rgba32Uint,
};

pub const MOTION18_SCALE6_TC2_TS2_COL4: BufferLayout = BufferLayout {
    role: "other",
    name: "Motion18Scale6Tc2Ts2Col4",
    bytes_per_texel: 16,
    texel_per_splat: 2,
    format: TexelFormat::Rgba32Uint,
};


#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Rot4Omega4Scale6Ts2 {
    pub rotation: [u8; 4],
    pub omega: [u8; 4],
    pub scale: [f16; 3],
    pub t_scale: f16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Motion11Tc1Col4 {
    pub pos1: [u8; 4],
    pub pos2: [u8; 4],
    /// pos3 xyz, time center in the last byte
    pub pos3_t_center: [u8; 4],
    pub color: [u8; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Rot8Omega4Col4 {
    pub rotation: [f16; 4],
    pub omega: [u8; 4],
    pub color: [u8; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Motion15Tc1Scale6Ts2 {
    pub pos1: [f16; 3],
    pub pos2: [f16; 3],
    pub pos3_t_center: [u8; 4],
    pub scale: [f16; 3],
    pub t_scale: f16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Rot8Omega8 {
    pub rotation: [f16; 4],
    pub omega: [f16; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Motion18Scale6Tc2Ts2Col4 {
    pub pos1: [f16; 3],
    pub pos2: [f16; 3],
    pub pos3: [f16; 3],
    pub t_center: f16,
    pub scale: [f16; 3],
    pub t_scale: f16,
    pub color: [u8; 4],
}

const_assert_eq!(std::mem::size_of::<Rot4Omega4Scale6Ts2>(), 16);
const_assert_eq!(std::mem::size_of::<Motion11Tc1Col4>(), 16);
const_assert_eq!(std::mem::size_of::<Rot8Omega4Col4>(), 16);
const_assert_eq!(std::mem::size_of::<Motion15Tc1Scale6Ts2>(), 24);
const_assert_eq!(std::mem::size_of::<Rot8Omega8>(), 16);
const_assert_eq!(std::mem::size_of::<Motion18Scale6Tc2Ts2Col4>(), 32);


fn quantize4(v: Vec4, (min, max): (f32, f32)) -> [u8; 4] {
    v.to_array().map(|x| quantize_u8(x, min, max))
}

fn dequantize4(v: [u8; 4], (min, max): (f32, f32)) -> Vec4 {
    Vec4::from_array(v.map(|x| dequantize_u8(x, min, max)))
}

fn quantize_motion(v: Vec3, tail: u8) -> [u8; 4] {
    let (min, max) = MOTION_RANGE;
    [
        quantize_u8(v.x, min, max),
        quantize_u8(v.y, min, max),
        quantize_u8(v.z, min, max),
        tail,
    ]
}

fn dequantize_motion(v: [u8; 4]) -> Vec3 {
    let (min, max) = MOTION_RANGE;
    Vec3::new(
        dequantize_u8(v[0], min, max),
        dequantize_u8(v[1], min, max),
        dequantize_u8(v[2], min, max),
    )
}

fn quantize_t_center(t_center: f32) -> u8 {
    quantize_u8(t_center, T_CENTER_RANGE.0, T_CENTER_RANGE.1)
}

fn dequantize_t_center(t_center: u8) -> f32 {
    dequantize_u8(t_center, T_CENTER_RANGE.0, T_CENTER_RANGE.1)
}


#[derive(Clone, Debug, PartialEq)]
pub struct SpaceTimeFields {
    pub position: [usize; 3],
    pub scale: [usize; 3],
    pub rotation: [usize; 4],
    pub omega: [usize; 4],
    pub color: [usize; 3],
    pub opacity: usize,
    pub motion: [usize; 9],
    pub t_center: usize,
    pub t_scale: usize,
}


pub struct SpaceTime;

impl SpaceTime {
    fn tier(buffers: &[SplatBuffer]) -> QualityTier {
        match buffers[1].layout.name {
            "Rot8Omega8" => QualityTier::High,
            "Rot8Omega4Col4" => QualityTier::Medium,
            _ => QualityTier::Low,
        }
    }

    fn position(index: usize, buffers: &[SplatBuffer]) -> Vec3 {
        match buffers[0].layout.name {
            "Pos12Pad4" => Vec3::from_array(buffers[0].read::<Pos12Pad4>(index).position),
            _ => vec3_from_f16s(buffers[0].read::<Pos6Pad2>(index).position),
        }
    }

    /// reconstructs a record from quantized buffers, rotation is returned unnormalized
    pub fn decode_texels(index: usize, buffers: &[SplatBuffer]) -> SplatRecord {
        let position = Self::position(index, buffers);
        let (rot, other) = (&buffers[1], &buffers[2]);

        let (rotation, omega, scale, t_scale, color, pos1, pos2, pos3, t_center) = match Self::tier(buffers) {
            QualityTier::Low => {
                let r: Rot4Omega4Scale6Ts2 = rot.read(index);
                let o: Motion11Tc1Col4 = other.read(index);
                (
                    dequantize4(r.rotation, ROTATION_RANGE),
                    dequantize4(r.omega, OMEGA_RANGE),
                    vec3_from_f16s(r.scale),
                    r.t_scale.to_f32(),
                    color_from_u8(o.color),
                    dequantize_motion(o.pos1),
                    dequantize_motion(o.pos2),
                    dequantize_motion(o.pos3_t_center),
                    dequantize_t_center(o.pos3_t_center[3]),
                )
            }
            QualityTier::Medium => {
                let r: Rot8Omega4Col4 = rot.read(index);
                let o: Motion15Tc1Scale6Ts2 = other.read(index);
                (
                    Vec4::from_array(from_f16s(r.rotation)),
                    dequantize4(r.omega, OMEGA_RANGE),
                    vec3_from_f16s(o.scale),
                    o.t_scale.to_f32(),
                    color_from_u8(r.color),
                    vec3_from_f16s(o.pos1),
                    vec3_from_f16s(o.pos2),
                    dequantize_motion(o.pos3_t_center),
                    dequantize_t_center(o.pos3_t_center[3]),
                )
            }
            QualityTier::High => {
                let r: Rot8Omega8 = rot.read(index);
                let o: Motion18Scale6Tc2Ts2Col4 = other.read(index);
                (
                    Vec4::from_array(from_f16s(r.rotation)),
                    Vec4::from_array(from_f16s(r.omega)),
                    vec3_from_f16s(o.scale),
                    o.t_scale.to_f32(),
                    color_from_u8(o.color),
                    vec3_from_f16s(o.pos1),
                    vec3_from_f16s(o.pos2),
                    vec3_from_f16s(o.pos3),
                    o.t_center.to_f32(),
                )
            }
        };

        SplatRecord {
            position,
            scale,
            rotation,
            color,
            sh: None,
            motion: Some(Motion {
                pos1,
                pos2,
                pos3,
                omega,
                t_center,
                t_scale,
            }),
        }
    }
}

impl SplatKernel for SpaceTime {
    type Fields = SpaceTimeFields;

    const KIND: SplatKind = SplatKind::SpaceTime;
    const CENTER_STRIDE: usize = motion::CENTER_STRIDE;
    const TEMPORAL: bool = true;

    fn resolve(layout: &SourceLayout) -> Result<SpaceTimeFields> {
        Ok(SpaceTimeFields {
            position: layout.offsets(["x", "y", "z"])?,
            scale: layout.offsets(["scale_0", "scale_1", "scale_2"])?,
            rotation: layout.offsets(["rot_1", "rot_2", "rot_3", "rot_0"])?,
            omega: layout.offsets(["omega_1", "omega_2", "omega_3", "omega_0"])?,
            color: layout.offsets(["f_dc_0", "f_dc_1", "f_dc_2"])?,
            opacity: layout.offset("opacity")?,
            motion: layout.offsets([
                "motion_0", "motion_1", "motion_2",
                "motion_3", "motion_4", "motion_5",
                "motion_6", "motion_7", "motion_8",
            ])?,
            t_center: layout.offset("trbf_center")?,
            t_scale: layout.offset("trbf_scale")?,
        })
    }

    fn decode(fields: &SpaceTimeFields, index: usize, source: &SourceView) -> SplatRecord {
        let color = source.f32s(index, &fields.color).map(|c| c.clamp(0.0, 1.0));
        let motion = source.f32s(index, &fields.motion);
        let t_scale = (-source.f32(index, fields.t_scale)).exp();

        SplatRecord {
            position: Vec3::from_array(source.f32s(index, &fields.position)),
            scale: Vec3::from_array(source.f32s(index, &fields.scale)).exp(),
            rotation: Vec4::from_array(source.f32s(index, &fields.rotation)).normalize_or_zero(),
            color: Vec4::new(color[0], color[1], color[2], sigmoid(source.f32(index, fields.opacity))),
            sh: None,
            motion: Some(Motion {
                pos1: Vec3::new(motion[0], motion[1], motion[2]),
                pos2: Vec3::new(motion[3], motion[4], motion[5]),
                pos3: Vec3::new(motion[6], motion[7], motion[8]),
                omega: Vec4::from_array(source.f32s(index, &fields.omega)),
                t_center: source.f32(index, fields.t_center),
                t_scale: t_scale * t_scale,
            }),
        }
    }

    fn layouts(tier: QualityTier, _with_sh: bool) -> Vec<BufferLayout> {
        match tier {
            QualityTier::Low => vec![POS6_PAD2, ROT4_OMEGA4_SCALE6_TS2, MOTION11_TC1_COL4],
            QualityTier::Medium => vec![POS6_PAD2, ROT8_OMEGA4_COL4, MOTION15_TC1_SCALE6_TS2],
            QualityTier::High => vec![POS12_PAD4, ROT8_OMEGA8, MOTION18_SCALE6_TC2_TS2_COL4],
        }
    }

    fn encode(record: &SplatRecord, index: usize, buffers: &mut [SplatBuffer]) {
        let motion = record.motion.unwrap_or_default();
        let tier = Self::tier(buffers);
        let color = color_to_u8(record.color);
        let t_scale = f16::from_f32(motion.t_scale);

        match tier {
            QualityTier::High => buffers[0].write(index, &Pos12Pad4 {
                position: record.position.to_array(),
                pad: 0.0,
            }),
            _ => buffers[0].write(index, &Pos6Pad2 {
                position: vec3_to_f16s(record.position),
                pad: 0,
            }),
        }

        match tier {
            QualityTier::Low => {
                buffers[1].write(index, &Rot4Omega4Scale6Ts2 {
                    rotation: quantize4(record.rotation, ROTATION_RANGE),
                    omega: quantize4(motion.omega, OMEGA_RANGE),
                    scale: vec3_to_f16s(record.scale),
                    t_scale,
                });
                buffers[2].write(index, &Motion11Tc1Col4 {
                    pos1: quantize_motion(motion.pos1, 0),
                    pos2: quantize_motion(motion.pos2, 0),
                    pos3_t_center: quantize_motion(motion.pos3, quantize_t_center(motion.t_center)),
                    color,
                });
            }
            QualityTier::Medium => {
                buffers[1].write(index, &Rot8Omega4Col4 {
                    rotation: to_f16s(record.rotation.to_array()),
                    omega: quantize4(motion.omega, OMEGA_RANGE),
                    color,
                });
                buffers[2].write(index, &Motion15Tc1Scale6Ts2 {
                    pos1: vec3_to_f16s(motion.pos1),
                    pos2: vec3_to_f16s(motion.pos2),
                    pos3_t_center: quantize_motion(motion.pos3, quantize_t_center(motion.t_center)),
                    scale: vec3_to_f16s(record.scale),
                    t_scale,
                });
            }
            QualityTier::High => {
                buffers[1].write(index, &Rot8Omega8 {
                    rotation: to_f16s(record.rotation.to_array()),
                    omega: to_f16s(motion.omega.to_array()),
                });
                buffers[2].write(index, &Motion18Scale6Tc2Ts2Col4 {
                    pos1: vec3_to_f16s(motion.pos1),
                    pos2: vec3_to_f16s(motion.pos2),
                    pos3: vec3_to_f16s(motion.pos3),
                    t_center: f16::from_f32(motion.t_center),
                    scale: vec3_to_f16s(record.scale),
                    t_scale,
                    color,
                });
            }
        }
    }

    fn write_center(record: &SplatRecord, center: &mut [f32]) {
        let motion = record.motion.unwrap_or_default();
        let p = record.position;

        center.copy_from_slice(&[
            p.x, motion.pos1.x, motion.pos2.x, motion.pos3.x,
            p.y, motion.pos1.y, motion.pos2.y, motion.pos3.y,
            p.z, motion.pos1.z, motion.pos2.z, motion.pos3.z,
            motion.t_center,
        ]);
    }

    fn center_from_buffers(index: usize, buffers: &[SplatBuffer], center: &mut [f32]) {
        Self::write_center(&Self::decode_texels(index, buffers), center);
    }

    fn position_at(center: &[f32], timestamp: f32) -> Vec3 {
        motion::position_at(center, timestamp)
    }

    fn chunk_bounds(
        centers: &[f32],
        falloff: &[TemporalFalloff],
        slots: &[u32],
        config: &ChunkConfig,
    ) -> ChunkBounds {
        temporal_chunk_bounds(centers, falloff, slots, config)
    }
}
