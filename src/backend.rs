//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement to
//! work with the locomotion controller, so the controller can be used with
//! any physics engine (Rapier3D, a custom integrator, a test double).

use std::marker::PhantomData;

use bevy::prelude::*;

use crate::body::{BodyState, PhysicsBody};
use crate::collision::CollisionData;

/// Fallback fixed timestep when no `Time<Fixed>` resource exists.
pub const DEFAULT_FIXED_TIMESTEP: f32 = 1.0 / 60.0;

/// Trait for physics backend implementations.
///
/// All functions are static and operate on the `World`, so the controller
/// system can run exclusively and remain the sole writer of the body during
/// its tick.
pub trait LocomotionBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Read the rigid-body state of an entity.
    fn body_state(world: &World, entity: Entity) -> BodyState;

    /// Set the linear velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Apply a world-space torque to an entity for the current tick.
    ///
    /// Called once per tick with the controller's full torque; backends must
    /// replace, not accumulate across ticks.
    fn apply_torque(world: &mut World, entity: Entity, torque: Vec3);

    /// Move an entity to a world position.
    fn move_to(world: &mut World, entity: Entity, position: Vec3);

    /// Cast a ray straight down from the entity, ignoring its own colliders.
    fn cast_down(world: &World, entity: Entity, max_distance: f32) -> Option<CollisionData>;

    /// Gravity acting on an entity, if the backend knows it.
    ///
    /// Returning `None` makes the controller use [`LocomotionConfig::gravity`](crate::config::LocomotionConfig::gravity).
    fn gravity(_world: &World, _entity: Entity) -> Option<Vec3> {
        None
    }

    /// Get the fixed timestep delta time.
    fn fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.timestep().as_secs_f32())
            .filter(|&d| d > 0.0)
            .unwrap_or(DEFAULT_FIXED_TIMESTEP)
    }

    /// Monotonic time of the fixed clock, in seconds.
    fn fixed_elapsed(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.elapsed_secs())
            .unwrap_or(0.0)
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

/// A backend entity seen through the [`PhysicsBody`] contract.
pub struct BackendBody<'w, B: LocomotionBackend> {
    world: &'w mut World,
    entity: Entity,
    gravity: Vec3,
    _marker: PhantomData<fn() -> B>,
}

impl<'w, B: LocomotionBackend> BackendBody<'w, B> {
    /// Wrap `entity`. `fallback_gravity` is used when the backend reports none.
    pub fn new(world: &'w mut World, entity: Entity, fallback_gravity: Vec3) -> Self {
        let gravity = B::gravity(world, entity).unwrap_or(fallback_gravity);
        Self {
            world,
            entity,
            gravity,
            _marker: PhantomData,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }
}

impl<B: LocomotionBackend> PhysicsBody for BackendBody<'_, B> {
    fn state(&self) -> BodyState {
        B::body_state(self.world, self.entity)
    }

    fn set_linear_velocity(&mut self, velocity: Vec3) {
        B::set_velocity(self.world, self.entity, velocity);
    }

    fn apply_torque(&mut self, torque: Vec3) {
        B::apply_torque(self.world, self.entity, torque);
    }

    fn move_to(&mut self, position: Vec3) {
        B::move_to(self.world, self.entity, position);
    }

    fn cast_down(&self, max_distance: f32) -> Option<CollisionData> {
        B::cast_down(self.world, self.entity, max_distance)
    }

    fn gravity(&self) -> Vec3 {
        self.gravity
    }
}
