use bevy::math::{Mat3, Quat, Vec3, Vec4};


// Σ = R·S·Sᵀ·Rᵀ, returned as the upper triangle [xx, xy, xz, yy, yz, zz]
#[allow(non_snake_case)]
pub fn compute_covariance_3d(rotation: Vec4, scale: Vec3) -> [f32; 6] {
    let S = Mat3::from_diagonal(scale);
    let rotation = rotation.try_normalize().map_or(Quat::IDENTITY, Quat::from_vec4);
    let R = Mat3::from_quat(rotation);

    let M = R * S;
    let Sigma = M * M.transpose();

    [
        Sigma.row(0).x,
        Sigma.row(0).y,
        Sigma.row(0).z,
        Sigma.row(1).y,
        Sigma.row(1).z,
        Sigma.row(2).z,
    ]
}
