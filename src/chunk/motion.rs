use bevy::math::Vec3;


// per-axis [base, pos1, pos2, pos3] for x, y and z, then the time center
pub const CENTER_STRIDE: usize = 13;


fn cubic(coefficients: &[f32], dt: f32) -> f32 {
    coefficients[0] + dt * (coefficients[1] + dt * (coefficients[2] + dt * coefficients[3]))
}

pub fn position_at(center: &[f32], timestamp: f32) -> Vec3 {
    let dt = timestamp - center[12];

    Vec3::new(
        cubic(&center[0..4], dt),
        cubic(&center[4..8], dt),
        cubic(&center[8..12], dt),
    )
}

// min and max of `c0 + c1 t + c2 t^2 + c3 t^3` over t in [-radius, radius]
fn axis_extent(coefficients: &[f32], radius: f32) -> (f32, f32) {
    let mut min = coefficients[0].min(cubic(coefficients, -radius)).min(cubic(coefficients, radius));
    let mut max = coefficients[0].max(cubic(coefficients, -radius)).max(cubic(coefficients, radius));

    if radius <= 0.0 {
        return (min, max);
    }

    let mut visit = |t: f32| {
        if t.is_finite() && t > -radius && t < radius {
            let value = cubic(coefficients, t);
            min = min.min(value);
            max = max.max(value);
        }
    };

    // derivative c1 + 2 c2 t + 3 c3 t^2
    let a = 3.0 * coefficients[3];
    let b = 2.0 * coefficients[2];
    let c = coefficients[1];

    if a.abs() <= f32::EPSILON {
        if b.abs() > f32::EPSILON {
            visit(-c / b);
        }
    } else {
        let discriminant = b * b - 4.0 * a * c;
        if discriminant >= 0.0 {
            let root = discriminant.sqrt();
            visit((-b - root) / (2.0 * a));
            visit((-b + root) / (2.0 * a));
        }
    }

    (min, max)
}

/// bounds of the motion path while the splat stays above the opacity threshold
pub fn swept_extent(center: &[f32], radius: f32) -> (Vec3, Vec3) {
    let (x_min, x_max) = axis_extent(&center[0..4], radius);
    let (y_min, y_max) = axis_extent(&center[4..8], radius);
    let (z_min, z_max) = axis_extent(&center[8..12], radius);

    (
        Vec3::new(x_min, y_min, z_min),
        Vec3::new(x_max, y_max, z_max),
    )
}
