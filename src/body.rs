//! The rigid-body capability the controller drives.
//!
//! [`PhysicsBody`] is the narrow contract the locomotion core needs from a
//! physics engine. The controller reads a [`BodyState`] snapshot once per
//! tick, works on local copies, and commits the result back through the
//! write methods at the end of the tick.

use bevy::prelude::*;

use crate::collision::CollisionData;

/// Snapshot of a rigid body, read once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub linear_velocity: Vec3,
    /// World orientation (unit quaternion).
    pub rotation: Quat,
    pub angular_velocity: Vec3,
    /// Principal moments of inertia.
    pub inertia_tensor: Vec3,
    /// Body-local rotation of the principal inertia axes.
    pub inertia_tensor_rotation: Quat,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            linear_velocity: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
            inertia_tensor: Vec3::ONE,
            inertia_tensor_rotation: Quat::IDENTITY,
        }
    }
}

impl BodyState {
    /// A body at rest at `position` with unit inertia.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..default()
        }
    }

    /// Forward axis (-Z) in world space.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Right axis (+X) in world space.
    #[inline]
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

/// Capabilities the controller consumes from a physics body.
pub trait PhysicsBody {
    /// Current body state.
    fn state(&self) -> BodyState;

    /// Overwrite the linear velocity.
    fn set_linear_velocity(&mut self, velocity: Vec3);

    /// Apply a world-space torque for this tick.
    fn apply_torque(&mut self, torque: Vec3);

    /// Move the body to a world position.
    fn move_to(&mut self, position: Vec3);

    /// Cast a ray straight down from the body origin, returning the nearest hit
    /// within `max_distance`. The body's own colliders are never hit.
    fn cast_down(&self, max_distance: f32) -> Option<CollisionData>;

    /// World gravity acting on the body.
    fn gravity(&self) -> Vec3;
}
