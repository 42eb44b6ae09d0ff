use half::f16;

use bevy::math::Vec3;
use bytemuck::{
    Pod,
    Zeroable,
};
use serde::{
    Deserialize,
    Serialize,
};


// upper triangle of a symmetric 3x3 covariance as three half pairs, xx in the low bits of word 0
#[derive(
    Clone,
    Debug,
    Default,
    Copy,
    PartialEq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct CovariancePacked96 {
    pub covariance: [u32; 3],
}

impl CovariancePacked96 {
    pub fn covariance(&self) -> [f32; 6] {
        let (xy, xx) = unpack_u32_to_f32s(self.covariance[0]);
        let (yy, xz) = unpack_u32_to_f32s(self.covariance[1]);
        let (zz, yz) = unpack_u32_to_f32s(self.covariance[2]);

        [xx, xy, xz, yy, yz, zz]
    }
}

impl From<[f32; 6]> for CovariancePacked96 {
    fn from(covariance: [f32; 6]) -> Self {
        Self {
            covariance: [
                pack_f32s_to_u32(covariance[1], covariance[0]),
                pack_f32s_to_u32(covariance[3], covariance[2]),
                pack_f32s_to_u32(covariance[5], covariance[4]),
            ],
        }
    }
}


pub fn pack_f32s_to_u32(upper: f32, lower: f32) -> u32 {
    pack_f16s_to_u32(
        f16::from_f32(upper),
        f16::from_f32(lower),
    )
}

pub fn pack_f16s_to_u32(upper: f16, lower: f16) -> u32 {
    let upper_bits = (upper.to_bits() as u32) << 16;
    let lower_bits = lower.to_bits() as u32;
    upper_bits | lower_bits
}

pub fn unpack_u32_to_f16s(value: u32) -> (f16, f16) {
    let upper = f16::from_bits((value >> 16) as u16);
    let lower = f16::from_bits((value & 0xFFFF) as u16);
    (upper, lower)
}

pub fn unpack_u32_to_f32s(value: u32) -> (f32, f32) {
    let (upper, lower) = unpack_u32_to_f16s(value);
    (upper.to_f32(), lower.to_f32())
}


pub fn to_f16s<const N: usize>(values: [f32; N]) -> [f16; N] {
    values.map(f16::from_f32)
}

pub fn from_f16s<const N: usize>(values: [f16; N]) -> [f32; N] {
    values.map(f16::to_f32)
}

pub fn vec3_to_f16s(v: Vec3) -> [f16; 3] {
    to_f16s(v.to_array())
}

pub fn vec3_from_f16s(values: [f16; 3]) -> Vec3 {
    Vec3::from_array(from_f16s(values))
}
