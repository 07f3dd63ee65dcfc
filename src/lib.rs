//! # `msg_locomotion`
//!
//! A physics-driven 3D locomotion controller for rigid-body characters, with
//! a physics backend abstraction.
//!
//! This crate provides a tuneable character controller that:
//! - Rides above the ground on a closed-form damped spring
//! - Classifies ground contact with hysteresis (grounded, steep, airborne)
//! - Turns the body with a PD torque that accounts for its inertia tensor
//! - Steers velocity from 2D intent with a bounded acceleration budget
//! - Buffers jump presses and honors coyote time
//! - Sequences all of it with a hierarchical state machine
//!   (`Grounded → {Idle, Move}`, `Airborne`)
//! - Abstracts the physics backend (Rapier3D included behind `rapier3d`)
//!
//! ## Architecture
//!
//! Each tick the controller:
//! 1. Probes the ground (ray plus optional accumulated contacts)
//! 2. Updates the active states, which adjust a working copy of the velocity
//! 3. Applies ride spring and orientation torque while grounded
//! 4. Consumes a pending jump when allowed
//! 5. Commits velocity, position and torque to the body
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use msg_locomotion::prelude::*;
//!
//! // Components for a character
//! let controller = LocomotionController::new();
//! let config = LocomotionConfig::responsive();
//! let intent = LocomotionIntent::default();
//!
//! // These can be spawned together with a physics backend's body components
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod body;
pub mod collision;
pub mod config;
pub mod controller;
pub mod detection;
pub mod hsm;
pub mod intent;
pub mod jump;
pub mod movement;
pub mod orientation;
pub mod spring;
pub mod state;
pub mod states;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::LocomotionBackend;
    pub use crate::body::{BodyState, PhysicsBody};
    pub use crate::collision::{CollisionData, SurfaceKind};
    pub use crate::config::{
        GroundSnapConfig, LocomotionConfig, MovementProfile, ProbeMode, ProfileKind,
    };
    pub use crate::controller::LocomotionController;
    pub use crate::detection::ContactInfo;
    pub use crate::intent::{InputSnapshot, LocomotionIntent};
    pub use crate::state::{Airborne, Grounded, OnSteepSurface};
    pub use crate::states::MovementState;
    pub use crate::{LocomotionPlugin, LocomotionSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, RapierLocomotionBundle, StairsSurface};
}

/// Phases of a controller tick in `FixedUpdate`, run in order.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    /// Backend housekeeping before sensing (e.g. clearing last tick's torque).
    Preparation,
    /// Backend sensors: ground rays, contact collection.
    Sensors,
    /// The controller tick.
    Control,
    /// Write results to the physics engine and sync marker components.
    FinalApplication,
}

/// Main plugin for the locomotion controller.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (raycasting, velocity and torque).
///
/// # Examples
///
/// With the Rapier3D backend:
/// ```rust,ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
///     .add_plugins(LocomotionPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct LocomotionPlugin<B: backend::LocomotionBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::LocomotionBackend> Default for LocomotionPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::LocomotionBackend> Plugin for LocomotionPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::LocomotionConfig>();
        app.register_type::<controller::LocomotionController>();
        app.register_type::<intent::LocomotionIntent>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::OnSteepSurface>();

        app.configure_sets(
            FixedUpdate,
            (
                LocomotionSet::Preparation,
                LocomotionSet::Sensors,
                LocomotionSet::Control,
                LocomotionSet::FinalApplication,
            )
                .chain(),
        );

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.add_systems(
            FixedUpdate,
            systems::update_locomotion::<B>.in_set(LocomotionSet::Control),
        );
        app.add_systems(
            FixedUpdate,
            systems::sync_state_markers.in_set(LocomotionSet::FinalApplication),
        );
    }
}
