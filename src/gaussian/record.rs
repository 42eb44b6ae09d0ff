use bevy::math::{Vec3, Vec4};
use serde::{
    Deserialize,
    Serialize,
};

use crate::gaussian::covariance::compute_covariance_3d;


pub const SH_DEGREE_1_COEFF_COUNT: usize = 3;
pub const SH_DEGREE_2_COEFF_COUNT: usize = 5;
pub const SH_DEGREE_3_COEFF_COUNT: usize = 7;
pub const SH_CHANNELS: usize = 3;
pub const SH_REST_PER_CHANNEL: usize = SH_DEGREE_1_COEFF_COUNT + SH_DEGREE_2_COEFF_COUNT + SH_DEGREE_3_COEFF_COUNT;

pub const SH_MIN: f32 = -1.0;
pub const SH_MAX: f32 = 1.0;


// one rgb triple per coefficient, degree 3 is parsed nowhere and never emitted
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct SphericalHarmonics {
    pub degree_1: [Vec3; SH_DEGREE_1_COEFF_COUNT],
    pub degree_2: [Vec3; SH_DEGREE_2_COEFF_COUNT],
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
pub struct Motion {
    pub pos1: Vec3,
    pub pos2: Vec3,
    pub pos3: Vec3,
    /// angular velocity quaternion (x, y, z, w), decoded and stored but not applied
    pub omega: Vec4,
    pub t_center: f32,
    /// temporal falloff rate, already decoded as `exp(-ts)^2`
    pub t_scale: f32,
}

impl Motion {
    pub fn offset_at(&self, timestamp: f32) -> Vec3 {
        let dt = timestamp - self.t_center;
        self.pos1 * dt + self.pos2 * (dt * dt) + self.pos3 * (dt * dt * dt)
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
pub struct SplatRecord {
    pub position: Vec3,
    pub scale: Vec3,
    /// normalized quaternion (x, y, z, w)
    pub rotation: Vec4,
    /// rgb in [0, 1], alpha is the sigmoid-decoded opacity
    pub color: Vec4,
    pub sh: Option<SphericalHarmonics>,
    pub motion: Option<Motion>,
}

impl Default for SplatRecord {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec4::new(0.0, 0.0, 0.0, 1.0),
            color: Vec4::ONE,
            sh: None,
            motion: None,
        }
    }
}

impl SplatRecord {
    pub fn covariance(&self) -> [f32; 6] {
        compute_covariance_3d(self.rotation, self.scale)
    }

    pub fn position_at(&self, timestamp: f32) -> Vec3 {
        match &self.motion {
            Some(motion) => self.position + motion.offset_at(timestamp),
            None => self.position,
        }
    }
}
