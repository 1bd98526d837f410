//! Angle utilities
//!
//! Normalisation, arc distances and Euler ZYX conversions shared by the
//! lattice discretization, the action space and the workspace pose keys.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

const TWO_PI: f64 = 2.0 * PI;

/// Normalize an angle into the range (-pi, pi].
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % TWO_PI;
    if a <= -PI {
        a += TWO_PI;
    }
    if a > PI {
        a -= TWO_PI;
    }
    a
}

/// Normalize an angle into the range [0, 2*pi).
pub fn normalize_angle_positive(angle: f64) -> f64 {
    let a = normalize_angle(angle);
    if a < 0.0 {
        let shifted = a + TWO_PI;
        // a tiny negative input rounds up to exactly 2*pi
        if shifted >= TWO_PI {
            0.0
        } else {
            shifted
        }
    } else {
        a
    }
}

pub fn to_degrees(rads: f64) -> f64 {
    rads * 180.0 / PI
}

pub fn to_radians(degs: f64) -> f64 {
    degs * PI / 180.0
}

/// Shortest signed difference `af - ai`, in (-pi, pi].
pub fn shortest_angle_diff(af: f64, ai: f64) -> f64 {
    normalize_angle(af - ai)
}

/// Shortest unsigned distance between two angles, in [0, pi].
pub fn shortest_angle_dist(af: f64, ai: f64) -> f64 {
    shortest_angle_diff(af, ai).abs()
}

pub fn minor_arc_diff(af: f64, ai: f64) -> f64 {
    shortest_angle_diff(af, ai)
}

/// Signed difference travelling the long way round.
pub fn major_arc_diff(af: f64, ai: f64) -> f64 {
    let diff = shortest_angle_diff(af, ai);
    -1.0 * 1.0_f64.copysign(diff) * (TWO_PI - diff.abs())
}

pub fn minor_arc_dist(af: f64, ai: f64) -> f64 {
    minor_arc_diff(af, ai).abs()
}

pub fn major_arc_dist(af: f64, ai: f64) -> f64 {
    major_arc_diff(af, ai).abs()
}

/// The angle equivalent to `af` closest to, and not less than, `ai`.
pub fn unwind(ai: f64, af: f64) -> f64 {
    ai + normalize_angle_positive(af - ai)
}

/// Extract (yaw, pitch, roll) from a rotation matrix, ZYX convention.
pub fn get_euler_zyx(rot: &Matrix3<f64>) -> (f64, f64, f64) {
    let y = rot[(1, 0)].atan2(rot[(0, 0)]);
    let p = (-rot[(2, 0)]).atan2((rot[(2, 1)] * rot[(2, 1)] + rot[(2, 2)] * rot[(2, 2)]).sqrt());
    let r = rot[(2, 1)].atan2(rot[(2, 2)]);
    (y, p, r)
}

/// Extract (yaw, pitch, roll) from a quaternion, ZYX convention.
pub fn get_euler_zyx_from_quaternion(rot: &UnitQuaternion<f64>) -> (f64, f64, f64) {
    get_euler_zyx(&rot.to_rotation_matrix().into_inner())
}

/// Rotation matrix `Rz(y) * Ry(p) * Rx(r)`.
pub fn from_euler_zyx(y: f64, p: f64, r: f64) -> Matrix3<f64> {
    let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), y)
        * Rotation3::from_axis_angle(&Vector3::y_axis(), p)
        * Rotation3::from_axis_angle(&Vector3::x_axis(), r);
    rot.into_inner()
}

pub fn quaternion_from_euler_zyx(y: f64, p: f64, r: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(from_euler_zyx(y, p, r)))
}

/// Round-trip (yaw, pitch, roll) through a rotation matrix so equivalent
/// triples come out identical.
pub fn normalize_euler_zyx(y: f64, p: f64, r: f64) -> (f64, f64, f64) {
    get_euler_zyx(&from_euler_zyx(y, p, r))
}

/// Signed rotation about z of the closest planar rotation to `q`.
pub fn get_nearest_planar_rotation(q: &UnitQuaternion<f64>) -> f64 {
    let quat = q.quaternion();
    let s_squared = 1.0 - quat.w * quat.w;
    if s_squared < 10.0 * f64::EPSILON {
        0.0
    } else {
        let s = 1.0 / s_squared.sqrt();
        (2.0 * quat.w.clamp(-1.0, 1.0).acos()) * (quat.k * s)
    }
}
