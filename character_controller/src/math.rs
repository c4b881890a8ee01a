use rapier3d::math::{Rotation, Vector};
use rapier3d::na::Unit;
use rapier3d::prelude::Real;

pub(crate) const DIRECTION_EPS_SQ: Real = 1.0e-8;

/// Blend factor `1 - e^(-sharpness * dt)`; zero for non-positive rates or steps.
pub fn sharpness_factor(sharpness: Real, dt: Real) -> Real {
    if !(sharpness > 0.0) || !(dt > 0.0) {
        return 0.0;
    }
    (1.0 - (-sharpness * dt).exp()).clamp(0.0, 1.0)
}

pub fn project_on_plane(vector: Vector<Real>, normal: Vector<Real>) -> Vector<Real> {
    let len_sq = normal.norm_squared();
    if len_sq <= DIRECTION_EPS_SQ {
        return vector;
    }
    vector - normal * (vector.dot(&normal) / len_sq)
}

pub fn try_normalize(vector: Vector<Real>) -> Option<Vector<Real>> {
    if vector.norm_squared() <= DIRECTION_EPS_SQ {
        None
    } else {
        Some(vector.normalize())
    }
}

pub fn clamp_magnitude(vector: Vector<Real>, max: Real) -> Vector<Real> {
    let len = vector.norm();
    if len > max && len > 0.0 {
        vector * (max / len)
    } else {
        vector
    }
}

/// Direction tangent to `surface_normal` that keeps the heading of `direction` around `up`.
pub fn direction_tangent_to_surface(
    direction: Vector<Real>,
    surface_normal: Vector<Real>,
    up: Vector<Real>,
) -> Option<Vector<Real>> {
    let right = direction.cross(&up);
    try_normalize(surface_normal.cross(&right))
}

/// Rotation taking `from` a fraction `t` of the way toward `to` along the great circle.
///
/// Opposite directions turn around `fallback_axis`.
pub fn partial_rotation_between(
    from: Vector<Real>,
    to: Vector<Real>,
    t: Real,
    fallback_axis: Vector<Real>,
) -> Rotation<Real> {
    if t <= 0.0 {
        return Rotation::identity();
    }
    if let Some(rotation) = Rotation::scaled_rotation_between(&from, &to, t) {
        return rotation;
    }
    if from.dot(&to) >= 0.0 {
        return Rotation::identity();
    }
    match try_normalize(fallback_axis) {
        Some(axis) => {
            Rotation::from_axis_angle(&Unit::new_unchecked(axis), std::f32::consts::PI * t)
        }
        None => Rotation::identity(),
    }
}

/// Orientation whose `+Z` looks along `forward` with `+Y` as close to `up` as possible.
pub fn look_rotation(forward: Vector<Real>, up: Vector<Real>) -> Option<Rotation<Real>> {
    let forward = try_normalize(forward)?;
    let up = try_normalize(up)?;
    if forward.cross(&up).norm_squared() <= DIRECTION_EPS_SQ {
        return None;
    }
    Some(Rotation::face_towards(&forward, &up))
}
