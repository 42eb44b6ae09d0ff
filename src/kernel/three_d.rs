use bevy::{
    log::warn,
    math::{Vec3, Vec4},
};
use bytemuck::{
    Pod,
    Zeroable,
};
use half::f16;
use static_assertions::const_assert_eq;

use crate::{
    error::Result,
    gaussian::{
        f16::{
            CovariancePacked96,
            vec3_from_f16s,
            vec3_to_f16s,
        },
        record::{
            SH_CHANNELS,
            SH_DEGREE_1_COEFF_COUNT,
            SH_DEGREE_2_COEFF_COUNT,
            SH_MAX,
            SH_MIN,
            SH_REST_PER_CHANNEL,
            SphericalHarmonics,
            SplatRecord,
        },
        settings::QualityTier,
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
    },
    math::{
        dequantize_u8,
        quantize_u8,
        sh_dc_to_color,
        sigmoid,
    },
};


pub const POS6_PAD2: BufferLayout = BufferLayout {
    role: "pospad",
    name: "Pos6Pad2",
    bytes_per_texel: 8,
    texel_per_splat: 1,
    format: TexelFormat::Rgba16Float,
};

pub const POS12_PAD4: BufferLayout = BufferLayout {
    role: "pospad",
    name: "Pos12Pad4",
    bytes_per_texel: 16,
    texel_per_splat: 1,
    format: TexelFormat::Rgba32Float,
};

pub const COV12_COL4: BufferLayout = BufferLayout {
    role: "covcol",
    name: "Cov12Col4",
    bytes_per_texel: 16,
    texel_per_splat: 1,
    format: TexelFormat::Rgba32Uint,
};

pub const SH9_PAD3: BufferLayout = BufferLayout {
    role: "sh",
    name: "SH9Pad3",
    bytes_per_texel: 12,
    texel_per_splat: 1,
    format: TexelFormat::Rgb32Uint,
};

pub const SH24: BufferLayout = BufferLayout {
    role: "sh",
    name: "SH24",
    bytes_per_texel: 12,
    texel_per_splat: 2,
    format: TexelFormat::Rgb32Uint,
};


#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Pos6Pad2 {
    pub position: [f16; 3],
    pub pad: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Pos12Pad4 {
    pub position: [f32; 3],
    pub pad: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Cov12Col4 {
    pub covariance: CovariancePacked96,
    pub color: [u8; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Sh9Pad3 {
    pub degree_1: [u8; 9],
    pub pad: [u8; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Sh24 {
    pub degree_1: [u8; 9],
    pub degree_2: [u8; 15],
}

const_assert_eq!(std::mem::size_of::<Pos6Pad2>(), 8);
const_assert_eq!(std::mem::size_of::<Pos12Pad4>(), 16);
const_assert_eq!(std::mem::size_of::<Cov12Col4>(), 16);
const_assert_eq!(std::mem::size_of::<Sh9Pad3>(), 12);
const_assert_eq!(std::mem::size_of::<Sh24>(), 24);


const BASE_FIELDS: [&str; 14] = [
    "x", "y", "z",
    "scale_0", "scale_1", "scale_2",
    "rot_0", "rot_1", "rot_2", "rot_3",
    "f_dc_0", "f_dc_1", "f_dc_2",
    "opacity",
];

pub fn matches(layout: &SourceLayout) -> bool {
    BASE_FIELDS.iter().all(|name| layout.has(name)) && !layout.has("trbf_center")
}


pub fn color_to_u8(color: Vec4) -> [u8; 4] {
    color.to_array().map(|c| quantize_u8(c, 0.0, 1.0))
}

pub fn color_from_u8(color: [u8; 4]) -> Vec4 {
    Vec4::from_array(color.map(|c| dequantize_u8(c, 0.0, 1.0)))
}

fn pack_sh<const N: usize>(coefficients: &[Vec3; N], out: &mut [u8]) {
    for (j, coefficient) in coefficients.iter().enumerate() {
        for c in 0..SH_CHANNELS {
            out[SH_CHANNELS * j + c] = quantize_u8(coefficient[c], SH_MIN, SH_MAX);
        }
    }
}

fn unpack_sh<const N: usize>(bytes: &[u8]) -> [Vec3; N] {
    std::array::from_fn(|j| {
        Vec3::new(
            dequantize_u8(bytes[SH_CHANNELS * j], SH_MIN, SH_MAX),
            dequantize_u8(bytes[SH_CHANNELS * j + 1], SH_MIN, SH_MAX),
            dequantize_u8(bytes[SH_CHANNELS * j + 2], SH_MIN, SH_MAX),
        )
    })
}


#[derive(Clone, Debug, PartialEq)]
pub struct ThreeDFields {
    pub position: [usize; 3],
    pub scale: [usize; 3],
    /// x, y, z, w
    pub rotation: [usize; 4],
    pub dc: [usize; 3],
    pub opacity: usize,
    pub sh: Option<ShFields>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShFields {
    pub degree_1: [[usize; SH_CHANNELS]; SH_DEGREE_1_COEFF_COUNT],
    pub degree_2: [[usize; SH_CHANNELS]; SH_DEGREE_2_COEFF_COUNT],
}

fn rest_offset(layout: &SourceLayout, channel: usize, coefficient: usize) -> Result<usize> {
    layout.offset(&format!("f_rest_{}", channel * SH_REST_PER_CHANNEL + coefficient))
}

impl ShFields {
    fn resolve(layout: &SourceLayout) -> Result<Self> {
        let mut degree_1 = [[0; SH_CHANNELS]; SH_DEGREE_1_COEFF_COUNT];
        for (j, offsets) in degree_1.iter_mut().enumerate() {
            for (c, offset) in offsets.iter_mut().enumerate() {
                *offset = rest_offset(layout, c, j)?;
            }
        }

        let mut degree_2 = [[0; SH_CHANNELS]; SH_DEGREE_2_COEFF_COUNT];
        for (j, offsets) in degree_2.iter_mut().enumerate() {
            for (c, offset) in offsets.iter_mut().enumerate() {
                *offset = rest_offset(layout, c, SH_DEGREE_1_COEFF_COUNT + j)?;
            }
        }

        Ok(Self { degree_1, degree_2 })
    }
}


/// decoded contents of one ThreeD splat as stored in its quantized buffers
#[derive(Clone, Debug, PartialEq)]
pub struct ThreeDTexels {
    pub position: Vec3,
    pub covariance: [f32; 6],
    pub color: Vec4,
    pub sh: Option<SphericalHarmonics>,
}


pub struct ThreeD;

impl ThreeD {
    pub fn decode_texels(index: usize, buffers: &[SplatBuffer]) -> ThreeDTexels {
        let position = Self::position_from_buffers(index, buffers);
        let covcol: Cov12Col4 = buffers[1].read(index);

        let sh = buffers.get(2).map(|sh_buffer| match sh_buffer.layout.name {
            "SH24" => {
                let texel: Sh24 = sh_buffer.read(index);
                SphericalHarmonics {
                    degree_1: unpack_sh(&texel.degree_1),
                    degree_2: unpack_sh(&texel.degree_2),
                }
            }
            _ => {
                let texel: Sh9Pad3 = sh_buffer.read(index);
                SphericalHarmonics {
                    degree_1: unpack_sh(&texel.degree_1),
                    ..Default::default()
                }
            }
        });

        ThreeDTexels {
            position,
            covariance: covcol.covariance.covariance(),
            color: color_from_u8(covcol.color),
            sh,
        }
    }

    fn position_from_buffers(index: usize, buffers: &[SplatBuffer]) -> Vec3 {
        let pospad = &buffers[0];
        match pospad.layout.name {
            "Pos12Pad4" => {
                let texel: Pos12Pad4 = pospad.read(index);
                Vec3::from_array(texel.position)
            }
            _ => {
                let texel: Pos6Pad2 = pospad.read(index);
                vec3_from_f16s(texel.position)
            }
        }
    }
}

impl SplatKernel for ThreeD {
    type Fields = ThreeDFields;

    const KIND: SplatKind = SplatKind::ThreeD;
    const CENTER_STRIDE: usize = 4;
    const TEMPORAL: bool = false;

    fn resolve(layout: &SourceLayout) -> Result<ThreeDFields> {
        let sh = if layout.has("f_rest_0") {
            Some(ShFields::resolve(layout)?)
        } else {
            warn!("source carries no spherical harmonics, forcing sh degree 0");
            None
        };

        Ok(ThreeDFields {
            position: layout.offsets(["x", "y", "z"])?,
            scale: layout.offsets(["scale_0", "scale_1", "scale_2"])?,
            rotation: layout.offsets(["rot_1", "rot_2", "rot_3", "rot_0"])?,
            dc: layout.offsets(["f_dc_0", "f_dc_1", "f_dc_2"])?,
            opacity: layout.offset("opacity")?,
            sh,
        })
    }

    fn has_sh(fields: &ThreeDFields) -> bool {
        fields.sh.is_some()
    }

    fn decode(fields: &ThreeDFields, index: usize, source: &SourceView) -> SplatRecord {
        let dc = source.f32s(index, &fields.dc).map(sh_dc_to_color);
        let opacity = sigmoid(source.f32(index, fields.opacity));

        let sh = fields.sh.as_ref().map(|sh| SphericalHarmonics {
            degree_1: sh.degree_1.map(|offsets| Vec3::from_array(source.f32s(index, &offsets))),
            degree_2: sh.degree_2.map(|offsets| Vec3::from_array(source.f32s(index, &offsets))),
        });

        SplatRecord {
            position: Vec3::from_array(source.f32s(index, &fields.position)),
            scale: Vec3::from_array(source.f32s(index, &fields.scale)).exp(),
            rotation: Vec4::from_array(source.f32s(index, &fields.rotation)).normalize_or_zero(),
            color: Vec4::new(dc[0], dc[1], dc[2], opacity),
            sh,
            motion: None,
        }
    }

    fn layouts(tier: QualityTier, with_sh: bool) -> Vec<BufferLayout> {
        let mut layouts = match tier {
            QualityTier::High => vec![POS12_PAD4, COV12_COL4],
            QualityTier::Medium | QualityTier::Low => vec![POS6_PAD2, COV12_COL4],
        };

        if with_sh {
            match tier {
                QualityTier::High => layouts.push(SH24),
                QualityTier::Medium => layouts.push(SH9_PAD3),
                QualityTier::Low => {}
            }
        }

        layouts
    }

    fn encode(record: &SplatRecord, index: usize, buffers: &mut [SplatBuffer]) {
        match buffers[0].layout.name {
            "Pos12Pad4" => buffers[0].write(index, &Pos12Pad4 {
                position: record.position.to_array(),
                pad: 0.0,
            }),
            _ => buffers[0].write(index, &Pos6Pad2 {
                position: vec3_to_f16s(record.position),
                pad: 0,
            }),
        }

        buffers[1].write(index, &Cov12Col4 {
            covariance: CovariancePacked96::from(record.covariance()),
            color: color_to_u8(record.color),
        });

        if let Some(sh_buffer) = buffers.get_mut(2) {
            let sh = record.sh.unwrap_or_default();

            let mut degree_1 = [0u8; 9];
            pack_sh(&sh.degree_1, &mut degree_1);

            match sh_buffer.layout.name {
                "SH24" => {
                    let mut degree_2 = [0u8; 15];
                    pack_sh(&sh.degree_2, &mut degree_2);
                    sh_buffer.write(index, &Sh24 { degree_1, degree_2 });
                }
                _ => sh_buffer.write(index, &Sh9Pad3 { degree_1, pad: [0; 3] }),
            }
        }
    }

    fn write_center(record: &SplatRecord, center: &mut [f32]) {
        center.copy_from_slice(&[record.position.x, record.position.y, record.position.z, 1.0]);
    }

    fn center_from_buffers(index: usize, buffers: &[SplatBuffer], center: &mut [f32]) {
        let position = Self::position_from_buffers(index, buffers);
        center.copy_from_slice(&[position.x, position.y, position.z, 1.0]);
    }

    fn position_at(center: &[f32], _timestamp: f32) -> Vec3 {
        Vec3::new(center[0], center[1], center[2])
    }
}
