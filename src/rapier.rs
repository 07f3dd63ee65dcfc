//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.
//!
//! The character's collider must live on the same entity as its rigid body:
//! the ground ray excludes that body, and contact normals are collected from
//! the pairs that collider takes part in.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::LocomotionBackend;
use crate::body::BodyState;
use crate::collision::{CollisionData, SurfaceKind};
use crate::config::{LocomotionConfig, ProbeMode};
use crate::controller::LocomotionController;
use crate::LocomotionSet;

/// Rapier3D physics backend for the locomotion controller.
///
/// Ray casts and contact collection need `RapierContext`, which is only
/// available as a system parameter, so they run in dedicated systems in
/// [`LocomotionSet::Sensors`] and cache their results on the entity.
pub struct Rapier3dBackend;

impl LocomotionBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn body_state(world: &World, entity: Entity) -> BodyState {
        let (position, rotation) = world
            .get::<Transform>(entity)
            .map(|t| (t.translation, t.rotation))
            .or_else(|| {
                world.get::<GlobalTransform>(entity).map(|t| {
                    let (_, rotation, translation) = t.to_scale_rotation_translation();
                    (translation, rotation)
                })
            })
            .unwrap_or((Vec3::ZERO, Quat::IDENTITY));

        let velocity = world.get::<Velocity>(entity).copied().unwrap_or_default();

        let (inertia_tensor, inertia_tensor_rotation) = world
            .get::<ReadMassProperties>(entity)
            .map(|props| (props.principal_inertia, props.principal_inertia_local_frame))
            .filter(|(inertia, _)| inertia.cmpgt(Vec3::ZERO).all() && inertia.is_finite())
            .unwrap_or((Vec3::ONE, Quat::IDENTITY));

        BodyState {
            position,
            linear_velocity: velocity.linvel,
            rotation,
            angular_velocity: velocity.angvel,
            inertia_tensor,
            inertia_tensor_rotation,
        }
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn apply_torque(world: &mut World, entity: Entity, torque: Vec3) {
        // Held until FinalApplication, see `apply_locomotion_torque`.
        if let Some(mut accumulator) = world.get_mut::<LocomotionTorque>(entity) {
            accumulator.pending = torque;
        }
    }

    fn move_to(world: &mut World, entity: Entity, position: Vec3) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.translation = position;
        }
    }

    fn cast_down(world: &World, entity: Entity, max_distance: f32) -> Option<CollisionData> {
        world
            .get::<GroundSensor>(entity)
            .and_then(|sensor| sensor.hit)
            .filter(|hit| hit.distance <= max_distance)
    }
}

/// Plugin that sets up Rapier3D-specific systems for the locomotion controller.
///
/// Rapier must step in the fixed schedule for the controller's ticks to line
/// up with the physics steps:
/// `RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule()`.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<StairsSurface>();

        // Phase 1: Preparation - take back last tick's torque
        app.add_systems(
            FixedUpdate,
            clear_locomotion_torque.in_set(LocomotionSet::Preparation),
        );

        // Phase 2: Sensors - ground ray and contact normals
        app.add_systems(
            FixedUpdate,
            (rapier_ground_sensor, rapier_collect_contacts).in_set(LocomotionSet::Sensors),
        );

        // Phase 4: Final Application - hand this tick's torque to Rapier
        app.add_systems(
            FixedUpdate,
            apply_locomotion_torque.in_set(LocomotionSet::FinalApplication),
        );
    }
}

/// Marker for colliders that should be classified as stairs.
///
/// Stairs are walkable up to [`LocomotionConfig::max_stairs_angle`] instead of
/// [`LocomotionConfig::max_ground_angle`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct StairsSurface;

/// Result of the last downward ground ray.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct GroundSensor {
    pub hit: Option<CollisionData>,
}

/// Torque the controller owns on the body's [`ExternalForce`].
///
/// Our torque is added at the end of the tick and subtracted again at the
/// start of the next one, so torques from other sources are left intact.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct LocomotionTorque {
    /// Torque set by the controller this tick.
    pub pending: Vec3,
    /// Torque currently added to `ExternalForce`.
    pub applied: Vec3,
}

fn surface_of(stairs: &Query<(), With<StairsSurface>>, entity: Entity) -> SurfaceKind {
    if stairs.contains(entity) {
        SurfaceKind::Stairs
    } else {
        SurfaceKind::Ground
    }
}

/// Length of the ground ray: long enough for both ground check and snap probe.
fn ground_ray_length(config: &LocomotionConfig) -> f32 {
    config
        .ground_snap
        .map_or(config.ground_check_distance, |snap| {
            config.ground_check_distance.max(snap.probe_distance)
        })
}

/// Cast the ground ray for every controlled body.
fn rapier_ground_sensor(
    rapier_context: ReadRapierContext,
    mut q_sensors: Query<(Entity, &GlobalTransform, &LocomotionConfig, &mut GroundSensor)>,
    q_stairs: Query<(), With<StairsSurface>>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, config, mut sensor) in &mut q_sensors {
        let origin = transform.translation();
        let filter = QueryFilter::default()
            .exclude_rigid_body(entity)
            .exclude_sensors();

        sensor.hit = context
            .cast_ray_and_get_normal(origin, Vec3::NEG_Y, ground_ray_length(config), true, filter)
            .map(|(hit_entity, intersection)| {
                CollisionData::new(
                    intersection.time_of_impact,
                    intersection.normal,
                    intersection.point,
                    Some(hit_entity),
                )
                .with_surface(surface_of(&q_stairs, hit_entity))
            });
    }
}

/// Feed the contact normals of this step into each controller.
fn rapier_collect_contacts(
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(Entity, &LocomotionConfig, &mut LocomotionController)>,
    q_stairs: Query<(), With<StairsSurface>>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, config, mut controller) in &mut q_controllers {
        if config.probe_mode != ProbeMode::Contacts {
            continue;
        }

        for pair in context.contact_pairs_with(entity) {
            if !pair.has_any_active_contact() {
                continue;
            }

            let is_first = is_entity(pair.collider1(), entity);
            let other = if is_first {
                pair.collider2()
            } else {
                pair.collider1()
            };
            let surface = Option::<Entity>::from(other)
                .map_or(SurfaceKind::Ground, |other| surface_of(&q_stairs, other));

            for manifold in pair.manifolds() {
                // Manifold normals point from the first collider to the second.
                let normal = if is_first {
                    -manifold.normal()
                } else {
                    manifold.normal()
                };
                for _ in 0..manifold.num_points() {
                    controller.record_contact(normal, surface, config);
                }
            }
        }
    }
}

fn is_entity(collider: impl Into<Option<Entity>>, entity: Entity) -> bool {
    collider.into() == Some(entity)
}

/// Remove the torque applied last tick.
pub fn clear_locomotion_torque(mut q: Query<(&mut ExternalForce, &mut LocomotionTorque)>) {
    for (mut ext_force, mut torque) in &mut q {
        ext_force.torque -= torque.applied;
        torque.applied = Vec3::ZERO;
    }
}

/// Apply the torque set by the controller this tick.
pub fn apply_locomotion_torque(mut q: Query<(&mut ExternalForce, &mut LocomotionTorque)>) {
    for (mut ext_force, mut torque) in &mut q {
        ext_force.torque += torque.pending;
        torque.applied = torque.pending;
        torque.pending = Vec3::ZERO;
    }
}

/// Bundle for creating a character with Rapier3D physics.
///
/// Provides the Rapier components the backend reads and writes. Add a
/// [`Collider`] on the same entity, plus the controller components.
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// fn spawn_player(mut commands: Commands) {
///     commands.spawn((
///         Transform::from_xyz(0.0, 2.0, 0.0),
///         LocomotionController::new(),
///         LocomotionConfig::default(),
///         LocomotionIntent::default(),
///         RapierLocomotionBundle::new(),
///         Collider::capsule_y(0.5, 0.3),
///     ));
/// }
/// ```
///
/// # Defaults
///
/// - `rigid_body`: [`RigidBody::Dynamic`]
/// - `locked_axes`: rotation about X and Z locked, yaw free for the orientation torque
/// - `damping`: Linear 0.0, Angular 1.0
#[derive(Bundle, Default)]
pub struct RapierLocomotionBundle {
    pub rigid_body: RigidBody,
    /// Current linear and angular velocity. Written by the controller each tick.
    pub velocity: Velocity,
    /// Receives the controller's orientation torque.
    pub external_force: ExternalForce,
    pub locked_axes: LockedAxes,
    pub damping: Damping,
    /// Computed mass properties. Rapier updates this from the collider.
    pub mass_properties: ReadMassProperties,
    pub torque: LocomotionTorque,
    pub sensor: GroundSensor,
}

impl RapierLocomotionBundle {
    /// Create a dynamic body that may only turn around the up axis.
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            locked_axes: LockedAxes::ROTATION_LOCKED_X | LockedAxes::ROTATION_LOCKED_Z,
            damping: Damping {
                linear_damping: 0.0,
                angular_damping: 1.0,
            },
            ..default()
        }
    }

    /// Create a body whose rotation is fully free.
    ///
    /// The orientation torque then keeps the character upright as well as
    /// turning it.
    pub fn free_rotation() -> Self {
        Self {
            locked_axes: LockedAxes::empty(),
            ..Self::new()
        }
    }

    /// Set custom damping values.
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Damping {
            linear_damping: linear,
            angular_damping: angular,
        };
        self
    }

    /// Set which axes are locked.
    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::RunSystemOnce;

    fn create_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(RapierPhysicsPlugin::<NoUserData>::default());
        app.insert_resource(Time::<Fixed>::from_hz(60.0));
        app
    }

    #[test]
    fn rapier_backend_body_state() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((
                Transform::from_xyz(1.0, 2.0, 3.0),
                RigidBody::Dynamic,
                Velocity::linear(Vec3::new(4.0, 0.0, -1.0)),
            ))
            .id();

        app.update();

        let state = Rapier3dBackend::body_state(app.world(), entity);
        assert!((state.position - Vec3::new(1.0, 2.0, 3.0)).length() < 0.01);
        assert!((state.linear_velocity - Vec3::new(4.0, 0.0, -1.0)).length() < 0.01);
        // No mass properties yet: unit inertia.
        assert_eq!(state.inertia_tensor, Vec3::ONE);
    }

    #[test]
    fn rapier_backend_set_velocity() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((Transform::default(), RigidBody::Dynamic, Velocity::zero()))
            .id();

        Rapier3dBackend::set_velocity(app.world_mut(), entity, Vec3::new(0.0, 5.0, 0.0));

        let state = Rapier3dBackend::body_state(app.world(), entity);
        assert_eq!(state.linear_velocity, Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn cast_down_filters_by_distance() {
        let mut app = create_test_app();
        let hit = CollisionData::new(1.2, Vec3::Y, Vec3::ZERO, None);
        let entity = app
            .world_mut()
            .spawn(GroundSensor { hit: Some(hit) })
            .id();

        assert!(Rapier3dBackend::cast_down(app.world(), entity, 1.5).is_some());
        assert!(Rapier3dBackend::cast_down(app.world(), entity, 1.0).is_none());
    }

    #[test]
    fn torque_is_replaced_each_tick() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((
                ExternalForce {
                    force: Vec3::ZERO,
                    torque: Vec3::new(0.0, 0.0, 2.0),
                },
                LocomotionTorque::default(),
            ))
            .id();

        for torque in [Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, -1.0, 0.0)] {
            app.world_mut()
                .run_system_once(clear_locomotion_torque)
                .unwrap();
            Rapier3dBackend::apply_torque(app.world_mut(), entity, torque);
            app.world_mut()
                .run_system_once(apply_locomotion_torque)
                .unwrap();

            let ext = app.world().get::<ExternalForce>(entity).unwrap();
            // PROOF: external torque kept, ours replaced rather than summed
            assert_eq!(ext.torque, Vec3::new(0.0, 0.0, 2.0) + torque);
        }
    }

    #[test]
    fn bundle_creates_valid_entity() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                RapierLocomotionBundle::new(),
                Collider::capsule_y(0.5, 0.3),
            ))
            .id();

        app.update();

        assert!(app.world().get::<RigidBody>(entity).is_some());
        assert!(app.world().get::<Velocity>(entity).is_some());
        assert!(app.world().get::<ExternalForce>(entity).is_some());
        assert!(app.world().get::<LocomotionTorque>(entity).is_some());
        assert!(app.world().get::<GroundSensor>(entity).is_some());
    }

    #[test]
    fn bundle_builders() {
        let upright = RapierLocomotionBundle::new();
        assert_eq!(
            upright.locked_axes,
            LockedAxes::ROTATION_LOCKED_X | LockedAxes::ROTATION_LOCKED_Z
        );

        let free = RapierLocomotionBundle::free_rotation();
        assert_eq!(free.locked_axes, LockedAxes::empty());
        assert!(matches!(free.rigid_body, RigidBody::Dynamic));

        let custom = RapierLocomotionBundle::new()
            .with_damping(0.5, 2.0)
            .with_locked_axes(LockedAxes::ROTATION_LOCKED);
        assert_eq!(custom.damping.linear_damping, 0.5);
        assert_eq!(custom.damping.angular_damping, 2.0);
        assert_eq!(custom.locked_axes, LockedAxes::ROTATION_LOCKED);
    }

    #[test]
    fn ray_length_covers_snap_probe() {
        let config = LocomotionConfig::default().with_ground_snap(Some(
            crate::config::GroundSnapConfig {
                max_snap_speed: 10.0,
                probe_distance: 3.0,
            },
        ));
        assert_eq!(ground_ray_length(&config), 3.0);
        assert_eq!(
            ground_ray_length(&config.with_ground_snap(None)),
            config.ground_check_distance
        );
    }
}
