//! Intent-driven velocity adjustment.
//!
//! Movement never snaps the velocity to its target. Each tick the controller
//! computes how far the velocity is from `intent * max_speed` along the
//! movement axes and closes at most `max_acceleration * dt` of that gap.

use bevy::prelude::*;

use crate::config::MovementProfile;

/// Intent components below this magnitude count as no input.
const INTENT_DEADZONE: f32 = 1e-3;

/// Speed and acceleration in effect for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementLimits {
    pub max_speed: f32,
    pub max_acceleration: f32,
}

impl MovementLimits {
    /// Limits while grounded. Sprinting requires sprint held and forward intent.
    pub fn grounded(profile: &MovementProfile, intent: Vec2, sprint: bool) -> Self {
        let (max_speed, max_acceleration) = profile.limits(is_sprinting(intent, sprint));
        Self {
            max_speed,
            max_acceleration,
        }
    }

    /// Limits while airborne. The speed cap never drops below the current
    /// horizontal speed, so momentum carried into the air is kept.
    pub fn airborne(profile: &MovementProfile, intent: Vec2, sprint: bool, velocity: Vec3) -> Self {
        let (max_speed, max_acceleration) = profile.limits(is_sprinting(intent, sprint));
        Self {
            max_speed: max_speed.max(horizontal_speed(velocity)),
            max_acceleration,
        }
    }
}

/// Whether the sprint variant of a profile applies.
#[inline]
pub fn is_sprinting(intent: Vec2, sprint: bool) -> bool {
    sprint && intent.y > 0.0
}

#[inline]
pub fn has_intent(intent: Vec2) -> bool {
    intent.x.abs() > INTENT_DEADZONE || intent.y.abs() > INTENT_DEADZONE
}

/// Speed in the horizontal (XZ) plane.
#[inline]
pub fn horizontal_speed(velocity: Vec3) -> f32 {
    Vec2::new(velocity.x, velocity.z).length()
}

/// Project `axis` onto the plane with normal `normal` and normalize it.
#[inline]
pub fn project_on_contact_plane(axis: Vec3, normal: Vec3) -> Vec3 {
    (axis - normal * axis.dot(normal)).normalize_or_zero()
}

/// Steer `velocity` toward `intent * max_speed` along `forward`/`right`.
///
/// `intent.x` drives the right axis and `intent.y` the forward axis. Both
/// axes are projected onto the contact plane first so motion follows slopes.
/// The combined 2D adjustment is clamped to `max_acceleration * dt`.
#[allow(clippy::too_many_arguments)]
pub fn adjust_velocity(
    velocity: Vec3,
    intent: Vec2,
    forward: Vec3,
    right: Vec3,
    ground_normal: Vec3,
    max_speed: f32,
    max_acceleration: f32,
    dt: f32,
    grounded: bool,
) -> Vec3 {
    if !grounded && !has_intent(intent) {
        return velocity;
    }

    let right = project_on_contact_plane(right, ground_normal);
    let forward = project_on_contact_plane(forward, ground_normal);

    let current = Vec2::new(velocity.dot(right), velocity.dot(forward));
    let desired = intent * max_speed;

    let max_change = (max_acceleration * dt).max(0.0);
    let change = (desired - current).clamp_length_max(max_change);

    velocity + right * change.x + forward * change.y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f32 = 0.02;

    fn adjust(velocity: Vec3, intent: Vec2, limits: MovementLimits, grounded: bool) -> Vec3 {
        adjust_velocity(
            velocity,
            intent,
            Vec3::NEG_Z,
            Vec3::X,
            Vec3::Y,
            limits.max_speed,
            limits.max_acceleration,
            DT,
            grounded,
        )
    }

    #[test]
    fn sprint_from_rest_changes_half_a_unit() {
        let profile = MovementProfile::new(5.0, 20.0, 10.0, 25.0);
        let intent = Vec2::new(0.0, 1.0);
        let limits = MovementLimits::grounded(&profile, intent, true);
        assert_eq!(limits.max_speed, 10.0);

        let velocity = adjust(Vec3::ZERO, intent, limits, true);
        assert_abs_diff_eq!(velocity.dot(Vec3::NEG_Z), 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(velocity.x, 0.0);
    }

    #[test]
    fn sprint_needs_forward_intent() {
        let profile = MovementProfile::grounded();
        assert!(!is_sprinting(Vec2::new(1.0, 0.0), true));
        assert!(!is_sprinting(Vec2::new(0.0, -1.0), true));
        assert!(!is_sprinting(Vec2::new(0.0, 1.0), false));

        let limits = MovementLimits::grounded(&profile, Vec2::new(0.0, -1.0), true);
        assert_eq!(limits.max_speed, profile.max_speed);
    }

    #[test]
    fn adjustment_never_exceeds_acceleration_budget() {
        let limits = MovementLimits {
            max_speed: 8.0,
            max_acceleration: 30.0,
        };
        let budget = limits.max_acceleration * DT;
        let velocities = [
            Vec3::ZERO,
            Vec3::new(20.0, 0.0, -3.0),
            Vec3::new(-7.0, 4.0, 12.0),
            Vec3::new(0.1, -9.0, 0.1),
        ];
        let intents = [
            Vec2::ZERO,
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 0.3),
            Vec2::new(0.0, -1.0),
        ];
        for velocity in velocities {
            for intent in intents {
                for grounded in [true, false] {
                    let adjusted = adjust(velocity, intent, limits, grounded);
                    let delta = adjusted - velocity;
                    assert!(delta.x.abs() <= budget + 1e-5);
                    assert!(delta.z.abs() <= budget + 1e-5);
                    assert!(delta.length() <= budget + 1e-5);
                }
            }
        }
    }

    #[test]
    fn airborne_without_intent_keeps_velocity() {
        let limits = MovementLimits {
            max_speed: 5.0,
            max_acceleration: 5.0,
        };
        let velocity = Vec3::new(3.0, -2.0, 1.0);
        assert_eq!(adjust(velocity, Vec2::ZERO, limits, false), velocity);
    }

    #[test]
    fn grounded_without_intent_decelerates() {
        let limits = MovementLimits {
            max_speed: 5.0,
            max_acceleration: 20.0,
        };
        let velocity = adjust(Vec3::new(3.0, 0.0, 0.0), Vec2::ZERO, limits, true);
        assert_abs_diff_eq!(velocity.x, 3.0 - 0.4, epsilon = 1e-5);
    }

    #[test]
    fn airborne_cap_keeps_momentum() {
        let profile = MovementProfile::airborne();
        let velocity = Vec3::new(12.0, -3.0, 0.0);
        let limits = MovementLimits::airborne(&profile, Vec2::new(1.0, 0.0), false, velocity);
        assert_abs_diff_eq!(limits.max_speed, 12.0);

        // Pushing along the current direction never slows the body down.
        let adjusted = adjust(velocity, Vec2::new(1.0, 0.0), limits, false);
        assert!(adjusted.x >= velocity.x - 1e-5);
    }

    #[test]
    fn axes_follow_slopes() {
        let normal = Vec3::new(0.0, 1.0, 1.0).normalize();
        let forward = project_on_contact_plane(Vec3::NEG_Z, normal);
        assert_abs_diff_eq!(forward.dot(normal), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(forward.length(), 1.0, epsilon = 1e-6);
        // Walking forward into this slope climbs.
        assert!(forward.y > 0.0);
    }
}
