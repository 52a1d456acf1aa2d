//! Scalar helpers shared by the fusion engine and the compass

/// Degrees to radians
pub const DEG_TO_RAD: f64 = core::f64::consts::PI / 180.0;
/// Radians to degrees
pub const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// Smallest magnitude allowed for a tilt-angle denominator
pub const TILT_EPSILON: f64 = 1e-9;

/// `atan2(numerator, denominator)` in degrees with a guarded denominator.
///
/// The denominator is a non-negative magnitude. When it collapses toward
/// zero it is replaced by a positive epsilon, so the result stays within
/// `[-90, 90]` and saturates toward the sign of `numerator`.
pub fn guarded_atan2_deg(numerator: f64, denominator: f64) -> f64 {
    let denominator = libm::fmax(libm::fabs(denominator), TILT_EPSILON);
    libm::atan2(numerator, denominator) * RAD_TO_DEG
}

/// Wrap an angle in degrees into `[0, 360)`
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle - 360.0 * libm::floor(angle / 360.0);
    // floor rounding can land exactly on 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
