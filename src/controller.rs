//! The per-character locomotion controller.

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;

use crate::body::PhysicsBody;
use crate::collision::SurfaceKind;
use crate::config::{LocomotionConfig, MovementProfile, ProfileKind, Tunables};
use crate::detection::{ContactInfo, GroundProbe};
use crate::hsm::StateMachine;
use crate::intent::InputSnapshot;
use crate::jump::JumpController;
use crate::states::{MovementState, TickContext};

/// Timestep assumed for derived values before the first tick.
const DEFAULT_TIMESTEP: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TunablesCache {
    config: LocomotionConfig,
    tunables: Tunables,
}

/// Locomotion state of one character.
///
/// Owns the movement state machine, the ground probe and the jump buffer.
/// Call [`LocomotionController::update`] exactly once per fixed tick.
#[derive(Component, Reflect, Default)]
#[reflect(Component)]
pub struct LocomotionController {
    #[reflect(ignore)]
    machine: StateMachine<MovementState>,
    probe: GroundProbe,
    jump: JumpController,
    profile: ProfileKind,
    /// Desired heading around the up axis (radians).
    desired_yaw: f32,
    /// Set once the heading was given explicitly or taken from the body.
    heading_set: bool,
    #[reflect(ignore)]
    cache: Option<TunablesCache>,
}

impl LocomotionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: start facing `yaw` radians around the up axis.
    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.set_desired_yaw(yaw);
        self
    }

    /// Advance the controller by one tick.
    ///
    /// `now` is the monotonic simulation time and `dt` the fixed timestep,
    /// both in seconds. A non-positive `dt` leaves everything untouched.
    pub fn update<P: PhysicsBody>(
        &mut self,
        body: &mut P,
        input: &InputSnapshot,
        config: &LocomotionConfig,
        now: f32,
        dt: f32,
    ) {
        if !(dt > 0.0) {
            return;
        }

        self.refresh_tunables(config, dt);

        if input.jump_pressed {
            self.jump.request_jump(now, config.jump_input_buffer_duration);
        }
        self.jump.tick(now);

        // Without an explicit heading, keep facing the way the body spawned.
        if !self.heading_set {
            self.desired_yaw = yaw_of(body.state().rotation);
            self.heading_set = true;
        }
        self.desired_yaw = wrap_angle(self.desired_yaw - input.look_delta.x * config.rotation_speed * dt);

        let Some(cache) = self.cache.as_ref() else {
            return;
        };

        let mut ctx = TickContext::new(
            body,
            config,
            &cache.tunables,
            input,
            now,
            dt,
            Quat::from_rotation_y(self.desired_yaw),
            &mut self.probe,
            &mut self.jump,
            &mut self.profile,
        );

        if !self.machine.is_running() {
            self.machine.start(MovementState::Root, &mut ctx);
        }
        self.machine.update(&mut ctx);
        ctx.commit();
    }

    /// Exit every active state. The next [`update`](Self::update) starts over from the root.
    pub fn stop<P: PhysicsBody>(&mut self, body: &mut P, config: &LocomotionConfig, now: f32) {
        let tunables = self.tunables(config);
        let input = InputSnapshot::default();
        let mut ctx = TickContext::new(
            body,
            config,
            &tunables,
            &input,
            now,
            0.0,
            Quat::from_rotation_y(self.desired_yaw),
            &mut self.probe,
            &mut self.jump,
            &mut self.profile,
        );
        self.machine.stop(&mut ctx);
    }

    /// Record a collision contact reported by the physics engine.
    ///
    /// Contacts are summed until the next tick's probe.
    pub fn record_contact(&mut self, normal: Vec3, surface: SurfaceKind, config: &LocomotionConfig) {
        let tunables = self.tunables(config);
        self.probe.record_contact(normal, surface, &tunables);
    }

    /// Tunables of the last tick, or fresh ones for a controller that has not ticked yet.
    fn tunables(&self, config: &LocomotionConfig) -> Tunables {
        match &self.cache {
            Some(cache) => cache.tunables,
            None => Tunables::new(&config.sanitized(), DEFAULT_TIMESTEP),
        }
    }

    fn refresh_tunables(&mut self, config: &LocomotionConfig, dt: f32) {
        let stale = match &self.cache {
            Some(cache) => cache.config != *config || cache.tunables.timestep != dt,
            None => true,
        };
        if stale {
            trace!("recomputing locomotion tunables for dt={dt}");
            self.cache = Some(TunablesCache {
                config: *config,
                tunables: Tunables::new(config, dt),
            });
        }
    }

    /// Grounded, coyote time included.
    pub fn is_grounded(&self, now: f32) -> bool {
        self.probe.is_grounded(now)
    }

    pub fn on_steep_surface(&self) -> bool {
        self.probe.on_steep_surface()
    }

    pub fn distance_to_ground(&self) -> f32 {
        self.probe.distance_to_ground()
    }

    /// Contact info from the last tick.
    pub fn contact(&self) -> &ContactInfo {
        self.probe.contact()
    }

    pub fn probe(&self) -> &GroundProbe {
        &self.probe
    }

    pub fn jump(&self) -> &JumpController {
        &self.jump
    }

    pub fn current_profile(&self) -> ProfileKind {
        self.profile
    }

    /// The movement profile currently in effect.
    pub fn movement_profile<'c>(&self, config: &'c LocomotionConfig) -> &'c MovementProfile {
        config.profile(self.profile)
    }

    /// Deepest active state, if the controller has started.
    pub fn active_state(&self) -> Option<MovementState> {
        self.machine.leaf().copied()
    }

    /// Active states from the root down.
    pub fn active_path(&self) -> Vec<MovementState> {
        self.machine.active_path().into_iter().copied().collect()
    }

    pub fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    pub fn desired_yaw(&self) -> f32 {
        self.desired_yaw
    }

    pub fn set_desired_yaw(&mut self, yaw: f32) {
        self.desired_yaw = wrap_angle(yaw);
        self.heading_set = true;
    }

    pub fn desired_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.desired_yaw)
    }

    /// Tunables derived for the last tick, if any.
    pub fn cached_tunables(&self) -> Option<&Tunables> {
        self.cache.as_ref().map(|cache| &cache.tunables)
    }
}

/// Heading of `rotation` around the up axis.
fn yaw_of(rotation: Quat) -> f32 {
    rotation.to_euler(EulerRot::YXZ).0
}

/// Wrap an angle into `[-π, π)`.
fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}
