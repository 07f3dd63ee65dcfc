//! PD orientation control.
//!
//! Drives the body toward a desired rotation by applying a world-space torque.
//! The proportional and derivative gains are derived from a spring
//! frequency/damping pair, and the resulting angular acceleration is scaled
//! by the body's inertia tensor so bodies with anisotropic inertia rotate
//! along the intended axis.

use bevy::prelude::*;

use crate::spring::SpringSettings;

/// Smallest rotation angle (radians) treated as a real error.
const MIN_ERROR_ANGLE: f32 = 1e-5;

/// Rotation of minimal angle (at most 180°) that takes `from` to `to`.
///
/// The returned quaternion always has a non-negative scalar component, and
/// `shortest_rotation(from, to) * from` reproduces `to` (up to sign).
pub fn shortest_rotation(from: Quat, to: Quat) -> Quat {
    let q = to * from.inverse();
    if q.w < 0.0 {
        -q
    } else {
        q
    }
}

/// Proportional-derivative torque controller for body orientation.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct OrientationController {
    proportional_gain: f32,
    derivative_gain: f32,
}

impl Default for OrientationController {
    fn default() -> Self {
        Self::from_settings(SpringSettings::new(14.0, 1.0))
    }
}

impl OrientationController {
    /// Create a controller for the given frequency and damping.
    ///
    /// `kp = 9·f²`, `kd = 4.5·f·ζ`.
    pub fn new(frequency: f32, damping: f32) -> Self {
        Self {
            proportional_gain: 9.0 * frequency * frequency,
            derivative_gain: 4.5 * frequency * damping,
        }
    }

    pub fn from_settings(settings: SpringSettings) -> Self {
        Self::new(settings.frequency, settings.damping)
    }

    #[inline]
    pub fn proportional_gain(&self) -> f32 {
        self.proportional_gain
    }

    #[inline]
    pub fn derivative_gain(&self) -> f32 {
        self.derivative_gain
    }

    /// Compute the world-space torque that steers `current` toward `desired`.
    ///
    /// `inertia_tensor` holds the principal moments and
    /// `inertia_tensor_rotation` the body-local rotation of the principal axes.
    pub fn corrective_torque(
        &self,
        current: Quat,
        desired: Quat,
        angular_velocity: Vec3,
        inertia_tensor: Vec3,
        inertia_tensor_rotation: Quat,
    ) -> Vec3 {
        let error = shortest_rotation(current, desired);
        let (axis, angle) = error.to_axis_angle();

        let proportional = if angle.abs() > MIN_ERROR_ANGLE && axis.length_squared() > 0.0 {
            axis.normalize() * (angle * self.proportional_gain)
        } else {
            Vec3::ZERO
        };

        let acceleration = proportional - self.derivative_gain * angular_velocity;
        if acceleration == Vec3::ZERO {
            return Vec3::ZERO;
        }

        // Principal-axis frame in world space.
        let inertia_to_world = current * inertia_tensor_rotation;
        let local = inertia_to_world.inverse() * acceleration;
        inertia_to_world * (local * inertia_tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn assert_same_rotation(a: Quat, b: Quat) {
        // q and -q describe the same rotation.
        assert!(a.dot(b).abs() > 1.0 - 1e-4, "{a:?} != {b:?}");
    }

    #[test]
    fn shortest_rotation_has_non_negative_scalar() {
        let samples = [
            Quat::IDENTITY,
            Quat::from_rotation_y(0.3),
            Quat::from_rotation_y(3.5),
            Quat::from_rotation_x(-2.9),
            Quat::from_euler(EulerRot::YXZ, 2.0, -1.0, 0.7),
            -Quat::from_rotation_z(1.2),
        ];
        for from in samples {
            for to in samples {
                let q = shortest_rotation(from, to);
                assert!(q.w >= 0.0);
                assert_same_rotation(q * from, to);
            }
        }
    }

    #[test]
    fn shortest_rotation_takes_the_short_way() {
        let from = Quat::from_rotation_y(0.0);
        let to = Quat::from_rotation_y(350f32.to_radians());
        let (_, angle) = shortest_rotation(from, to).to_axis_angle();
        assert_abs_diff_eq!(angle, 10f32.to_radians(), epsilon = 1e-4);
    }

    #[test]
    fn gains_follow_frequency_and_damping() {
        let controller = OrientationController::new(2.0, 0.5);
        assert_abs_diff_eq!(controller.proportional_gain(), 36.0);
        assert_abs_diff_eq!(controller.derivative_gain(), 4.5);
    }

    #[test]
    fn zero_error_at_rest_produces_no_torque() {
        let controller = OrientationController::default();
        let rotation = Quat::from_rotation_y(1.0);
        let torque =
            controller.corrective_torque(rotation, rotation, Vec3::ZERO, Vec3::ONE, Quat::IDENTITY);
        assert_eq!(torque, Vec3::ZERO);
    }

    #[test]
    fn zero_error_still_damps_spin() {
        let controller = OrientationController::new(1.0, 1.0);
        let torque = controller.corrective_torque(
            Quat::IDENTITY,
            Quat::IDENTITY,
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::ONE,
            Quat::IDENTITY,
        );
        assert_abs_diff_eq!(torque.y, -9.0, epsilon = 1e-5);
    }

    #[test]
    fn yaw_error_produces_yaw_torque() {
        let controller = OrientationController::new(1.0, 1.0);
        let torque = controller.corrective_torque(
            Quat::IDENTITY,
            Quat::from_rotation_y(FRAC_PI_2),
            Vec3::ZERO,
            Vec3::ONE,
            Quat::IDENTITY,
        );
        assert_abs_diff_eq!(torque.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(torque.z, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(torque.y, 9.0 * FRAC_PI_2, epsilon = 1e-4);
    }

    #[test]
    fn torque_scales_with_inertia_along_principal_axes() {
        let controller = OrientationController::new(1.0, 0.0);
        let inertia = Vec3::new(1.0, 4.0, 2.0);
        let torque = controller.corrective_torque(
            Quat::IDENTITY,
            Quat::from_rotation_y(0.5),
            Vec3::ZERO,
            inertia,
            Quat::IDENTITY,
        );
        assert_abs_diff_eq!(torque.y, 9.0 * 0.5 * 4.0, epsilon = 1e-4);
    }

    #[test]
    fn rotated_inertia_frame_is_respected() {
        let controller = OrientationController::new(1.0, 0.0);
        // Principal axes rotated so the large moment lies along world X.
        let inertia = Vec3::new(1.0, 1.0, 5.0);
        let inertia_rotation = Quat::from_rotation_y(FRAC_PI_2);
        let torque = controller.corrective_torque(
            Quat::IDENTITY,
            Quat::from_rotation_x(0.2),
            Vec3::ZERO,
            inertia,
            inertia_rotation,
        );
        assert_abs_diff_eq!(torque.x, 9.0 * 0.2 * 5.0, epsilon = 1e-3);
        assert_abs_diff_eq!(torque.y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(torque.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn half_turn_error_is_bounded() {
        let controller = OrientationController::new(1.0, 0.0);
        let torque = controller.corrective_torque(
            Quat::IDENTITY,
            Quat::from_rotation_y(PI),
            Vec3::ZERO,
            Vec3::ONE,
            Quat::IDENTITY,
        );
        assert!(torque.length() <= 9.0 * PI + 1e-3);
    }
}
