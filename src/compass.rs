//! Magnetometer heading for the dashboard compass

use nalgebra::Vector3;

use crate::math::{DEG_TO_RAD, RAD_TO_DEG, wrap_degrees};

/// Rotate a magnetometer reading into the horizontal plane
///
/// Uses the current roll and pitch (degrees) and returns the horizontal
/// `(mx, my)` pair. The rotation follows the mounting convention of the
/// cluster's sensor board:
///
/// ```text
/// mx' = mx cos(p) + my sin(r) sin(p) - mz cos(r) sin(p)
/// my' = my cos(r) + mz sin(r)
/// ```
pub fn tilt_compensate(magnetometer: Vector3<f64>, roll: f64, pitch: f64) -> (f64, f64) {
    let (sin_r, cos_r) = (libm::sin(roll * DEG_TO_RAD), libm::cos(roll * DEG_TO_RAD));
    let (sin_p, cos_p) = (libm::sin(pitch * DEG_TO_RAD), libm::cos(pitch * DEG_TO_RAD));

    let mx = magnetometer.x * cos_p + magnetometer.y * sin_r * sin_p
        - magnetometer.z * cos_r * sin_p;
    let my = magnetometer.y * cos_r + magnetometer.z * sin_r;

    (mx, my)
}

/// Calculate the displayed heading from horizontal field components
///
/// `heading = 90 - atan2(my, mx)`, shifted by the declination when one is
/// given, wrapped into `[0, 360)` and finally mirrored (`180 - heading`) to
/// match the sensor mounting.
///
/// # Returns
/// `None` when both components are zero and no direction can be derived;
/// otherwise a heading in `[0, 360)`.
///
/// # Example
/// ```
/// use dash_core::compass::calculate_heading;
///
/// let heading = calculate_heading(1.0, 0.0, None).unwrap();
/// assert!((heading - 90.0).abs() < 1e-9);
/// assert_eq!(calculate_heading(0.0, 0.0, None), None);
/// ```
pub fn calculate_heading(mx: f64, my: f64, declination: Option<f64>) -> Option<f64> {
    if mx == 0.0 && my == 0.0 {
        return None;
    }

    let heading = 90.0 - libm::atan2(my, mx) * RAD_TO_DEG;
    let heading = wrap_degrees(heading + declination.unwrap_or(0.0));

    Some(wrap_degrees(180.0 - heading))
}
