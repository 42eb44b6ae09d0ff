use bevy::math::{Vec3, Vec4};
use rand::{
    prelude::Distribution,
    Rng,
};

use crate::gaussian::record::{
    Motion,
    SphericalHarmonics,
    SplatRecord,
};


fn random_vec3<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(min..max),
        rng.gen_range(min..max),
        rng.gen_range(min..max),
    )
}

impl Distribution<SphericalHarmonics> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SphericalHarmonics {
        SphericalHarmonics {
            degree_1: std::array::from_fn(|_| random_vec3(rng, -1.0, 1.0)),
            degree_2: std::array::from_fn(|_| random_vec3(rng, -1.0, 1.0)),
        }
    }
}

impl Distribution<Motion> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Motion {
        Motion {
            pos1: random_vec3(rng, -1.0, 1.0),
            pos2: random_vec3(rng, -0.5, 0.5),
            pos3: random_vec3(rng, -0.25, 0.25),
            omega: Vec4::new(
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-0.1..0.1),
            ),
            t_center: rng.gen_range(0.0..1.0),
            t_scale: rng.gen_range(1.0..50.0),
        }
    }
}

impl Distribution<SplatRecord> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SplatRecord {
        let rotation = Vec4::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(0.1..1.0),
        ).normalize();

        SplatRecord {
            position: random_vec3(rng, -20.0, 20.0),
            scale: random_vec3(rng, 0.01, 1.0),
            rotation,
            color: Vec4::new(
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
            ),
            sh: Some(rng.r#gen()),
            motion: None,
        }
    }
}

pub fn random_splats(n: usize) -> Vec<SplatRecord> {
    let mut rng = rand::thread_rng();
    let mut splats: Vec<SplatRecord> = Vec::with_capacity(n);

    for _ in 0..n {
        splats.push(rng.r#gen());
    }

    splats
}

pub fn random_spacetime_splats(n: usize) -> Vec<SplatRecord> {
    let mut rng = rand::thread_rng();

    (0..n)
        .map(|_| {
            let mut splat: SplatRecord = rng.r#gen();
            splat.sh = None;
            splat.motion = Some(rng.r#gen());
            splat
        })
        .collect()
}
