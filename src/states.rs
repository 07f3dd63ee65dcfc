//! Movement states and the per-tick context they share.
//!
//! ```text
//! Root
//! ├── Grounded
//! │   ├── Idle
//! │   └── Move
//! └── Airborne
//! ```
//!
//! States never touch the body directly. They work on the copies held by
//! [`TickContext`], which [`TickContext::commit`] writes back once at the end
//! of the tick.

use bevy::prelude::*;

use crate::body::{BodyState, PhysicsBody};
use crate::config::{LocomotionConfig, ProfileKind, Tunables};
use crate::detection::{ContactInfo, GroundProbe};
use crate::hsm::{HierarchicalState, Transition};
use crate::intent::InputSnapshot;
use crate::jump::JumpController;
use crate::movement::{adjust_velocity, has_intent, MovementLimits};

/// Node of the movement state tree.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub enum MovementState {
    Root,
    Grounded,
    Airborne {
        /// Ground distance when the body left the ground.
        distance_at_entry: f32,
    },
    Idle,
    Move,
}

impl MovementState {
    /// A fresh airborne state; the entry distance is recorded on enter.
    pub const fn airborne() -> Self {
        Self::Airborne {
            distance_at_entry: f32::MAX,
        }
    }

    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Grounded | Self::Idle | Self::Move)
    }

    pub fn is_airborne(&self) -> bool {
        matches!(self, Self::Airborne { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Grounded => "Grounded",
            Self::Airborne { .. } => "Airborne",
            Self::Idle => "Idle",
            Self::Move => "Move",
        }
    }
}

/// Everything a state may read or change during one tick.
pub struct TickContext<'a> {
    pub body: &'a mut dyn PhysicsBody,
    pub config: &'a LocomotionConfig,
    pub tunables: &'a Tunables,
    pub input: &'a InputSnapshot,
    pub now: f32,
    pub dt: f32,
    pub desired_rotation: Quat,

    pub probe: &'a mut GroundProbe,
    pub jump: &'a mut JumpController,
    pub profile: &'a mut ProfileKind,

    /// Body state read at the start of the tick.
    pub snapshot: BodyState,
    /// Working velocity, committed at the end of the tick.
    pub velocity: Vec3,
    /// Working position, committed only when `moved` is set.
    pub position: Vec3,
    pub moved: bool,
    /// Torque accumulated this tick.
    pub torque: Vec3,
    contact: Option<ContactInfo>,
}

impl<'a> TickContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        body: &'a mut dyn PhysicsBody,
        config: &'a LocomotionConfig,
        tunables: &'a Tunables,
        input: &'a InputSnapshot,
        now: f32,
        dt: f32,
        desired_rotation: Quat,
        probe: &'a mut GroundProbe,
        jump: &'a mut JumpController,
        profile: &'a mut ProfileKind,
    ) -> Self {
        let snapshot = body.state();
        Self {
            body,
            config,
            tunables,
            input,
            now,
            dt,
            desired_rotation,
            probe,
            jump,
            profile,
            snapshot,
            velocity: snapshot.linear_velocity,
            position: snapshot.position,
            moved: false,
            torque: Vec3::ZERO,
            contact: None,
        }
    }

    /// Probe the ground. Only the first call in a tick probes; later calls
    /// return the same result.
    pub fn probe_ground(&mut self) -> ContactInfo {
        if let Some(contact) = self.contact {
            return contact;
        }
        let contact = self.probe.probe(
            &*self.body,
            &mut self.velocity,
            self.config,
            self.tunables,
            self.now,
        );
        self.contact = Some(contact);
        contact
    }

    /// Grounded this tick, coyote time included.
    pub fn is_grounded(&self) -> bool {
        self.probe.is_grounded(self.now)
    }

    pub fn select_profile(&mut self, kind: ProfileKind) {
        *self.profile = kind;
    }

    /// Steer the working velocity from the movement intent.
    pub fn apply_movement(&mut self, grounded: bool) {
        let contact = self.probe_ground();
        let profile = self.config.profile(*self.profile);
        let intent = self.input.move_intent;

        let (limits, normal) = if grounded {
            (
                MovementLimits::grounded(profile, intent, self.input.sprint),
                contact.ground_normal,
            )
        } else {
            (
                MovementLimits::airborne(profile, intent, self.input.sprint, self.velocity),
                contact.ground_normal,
            )
        };

        self.velocity = adjust_velocity(
            self.velocity,
            intent,
            self.snapshot.forward(),
            self.snapshot.right(),
            normal,
            limits.max_speed,
            limits.max_acceleration,
            self.dt,
            grounded,
        );
    }

    /// Bleed off velocity while standing still.
    pub fn apply_stop_friction(&mut self) {
        let factor = (self.config.stop_friction * self.dt).min(1.0);
        self.velocity -= self.velocity * factor;
    }

    /// Add the extra gravity of a fall beyond the 1x the engine applies.
    pub fn apply_fall_gravity(&mut self) {
        let gravity = self.body.gravity();
        if self.velocity.dot(gravity) <= 0.0 {
            return;
        }
        self.velocity += gravity * ((self.config.fall_gravity_multiplier - 1.0) * self.dt);
    }

    /// Cancel the along-slope part of the gravity the engine applies.
    pub fn apply_slope_gravity(&mut self) {
        if !self.config.slope_gravity_compensation {
            return;
        }
        let contact = self.probe_ground();
        if !contact.is_grounded {
            return;
        }
        let gravity = self.body.gravity();
        let normal = contact.ground_normal;
        let along_slope = gravity - normal * gravity.dot(normal);
        self.velocity -= along_slope * self.dt;
    }

    /// Pull the body toward ride height with the ride spring.
    pub fn apply_ride_spring(&mut self) {
        let contact = self.probe_ground();
        if !contact.has_ground_hit {
            return;
        }

        let (y, vy) = self.tunables.ride_spring.advance(
            self.position.y,
            self.velocity.y,
            contact.desired_ride_position,
        );
        self.position.y = y;
        self.velocity.y = vy;
        self.moved = true;
    }

    /// Add the torque steering the body toward the desired rotation.
    pub fn apply_orientation(&mut self) {
        self.torque += self.tunables.orientation.corrective_torque(
            self.snapshot.rotation,
            self.desired_rotation,
            self.snapshot.angular_velocity,
            self.snapshot.inertia_tensor,
            self.snapshot.inertia_tensor_rotation,
        );
    }

    /// Launch the body if a jump is pending and allowed. Returns whether it jumped.
    pub fn try_jump(&mut self) -> bool {
        let contact = self.probe_ground();
        let coyote = *self.probe.coyote();
        let delta = self.jump.try_consume(
            self.probe.raw_grounded(),
            &coyote,
            self.now,
            self.velocity,
            contact.ground_normal,
            self.body.gravity(),
            self.config.jump_height,
        );

        match delta {
            Some(delta) => {
                self.velocity += delta;
                self.probe.on_jump();
                trace!("jump: added {delta} at t={}", self.now);
                true
            }
            None => false,
        }
    }

    /// Write the working state back to the body.
    pub fn commit(self) {
        if self.moved {
            self.body.move_to(self.position);
        }
        self.body.set_linear_velocity(self.velocity);
        self.body.apply_torque(self.torque);
    }
}

impl<'a> HierarchicalState<TickContext<'a>> for MovementState {
    fn enter(&mut self, ctx: &mut TickContext<'a>) -> Option<Self> {
        debug!("enter {}", self.name());
        match self {
            Self::Root => {
                ctx.probe_ground();
                if ctx.is_grounded() {
                    Some(Self::Grounded)
                } else {
                    Some(Self::airborne())
                }
            }
            Self::Grounded => {
                ctx.select_profile(ProfileKind::Grounded);
                if has_intent(ctx.input.move_intent) {
                    Some(Self::Move)
                } else {
                    Some(Self::Idle)
                }
            }
            Self::Airborne { distance_at_entry } => {
                ctx.select_profile(ProfileKind::Airborne);
                *distance_at_entry = ctx.probe_ground().distance_to_ground;
                ctx.try_jump();
                None
            }
            Self::Idle | Self::Move => None,
        }
    }

    fn update(&mut self, ctx: &mut TickContext<'a>) -> Transition<Self> {
        match *self {
            Self::Root => Transition::None,
            Self::Grounded => {
                ctx.probe_ground();
                if ctx.jump.is_pending() || !ctx.is_grounded() {
                    Transition::Replace(Self::airborne())
                } else {
                    Transition::None
                }
            }
            Self::Airborne { distance_at_entry } => {
                let contact = ctx.probe_ground();
                if ctx.is_grounded() && contact.distance_to_ground < distance_at_entry {
                    return Transition::Replace(Self::Grounded);
                }
                ctx.apply_movement(false);
                ctx.apply_fall_gravity();
                ctx.apply_orientation();
                Transition::None
            }
            Self::Idle => {
                if has_intent(ctx.input.move_intent) {
                    return Transition::Replace(Self::Move);
                }
                ctx.apply_movement(true);
                ctx.apply_stop_friction();
                Transition::None
            }
            Self::Move => {
                if !has_intent(ctx.input.move_intent) {
                    return Transition::Replace(Self::Idle);
                }
                ctx.apply_movement(true);
                Transition::None
            }
        }
    }

    fn late_update(&mut self, ctx: &mut TickContext<'a>) {
        if let Self::Grounded = self {
            ctx.apply_slope_gravity();
            ctx.apply_ride_spring();
            ctx.apply_orientation();
        }
    }

    fn exit(&mut self, _ctx: &mut TickContext<'a>) {
        trace!("exit {}", self.name());
    }
}
