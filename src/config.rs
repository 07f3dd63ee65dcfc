//! Controller configuration components.
//!
//! [`LocomotionConfig`] holds every tunable of the controller. It is set when
//! the character is spawned and treated as immutable afterward; derived
//! values (spring coefficients, walkable dot thresholds, PD gains) are cached
//! in [`Tunables`] and only recomputed when the config or timestep changes.

use bevy::prelude::*;
use thiserror::Error;

use crate::collision::SurfaceKind;
use crate::orientation::OrientationController;
use crate::spring::{SpringCoefficients, SpringSettings};

/// Speed and acceleration limits for one movement context (grounded or airborne).
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct MovementProfile {
    /// Maximum speed when walking (units/second).
    pub max_speed: f32,
    /// Acceleration budget when walking (units/second²).
    pub acceleration: f32,
    /// Maximum speed when sprinting (units/second).
    pub max_sprint_speed: f32,
    /// Acceleration budget when sprinting (units/second²).
    pub sprint_acceleration: f32,
}

impl MovementProfile {
    pub const fn new(
        max_speed: f32,
        acceleration: f32,
        max_sprint_speed: f32,
        sprint_acceleration: f32,
    ) -> Self {
        Self {
            max_speed,
            acceleration,
            max_sprint_speed,
            sprint_acceleration,
        }
    }

    /// Default grounded profile.
    pub const fn grounded() -> Self {
        Self::new(5.0, 20.0, 10.0, 25.0)
    }

    /// Default airborne profile.
    pub const fn airborne() -> Self {
        Self::new(5.0, 5.0, 10.0, 5.0)
    }

    /// `(max_speed, acceleration)` for the walk or sprint variant.
    #[inline]
    pub fn limits(&self, sprinting: bool) -> (f32, f32) {
        if sprinting {
            (self.max_sprint_speed, self.sprint_acceleration)
        } else {
            (self.max_speed, self.acceleration)
        }
    }
}

/// Which of the two profiles is currently selected by the state machine.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfileKind {
    #[default]
    Grounded,
    Airborne,
}

/// How the ground probe classifies contact.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbeMode {
    /// Classify from the downward ground ray only.
    #[default]
    Raycast,
    /// Classify from collision contacts recorded since the last tick, with
    /// ground snapping and steep-contact fallbacks. The ground ray still
    /// provides distance and ride position.
    Contacts,
}

/// Ground snapping parameters.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct GroundSnapConfig {
    /// Bodies faster than this are never snapped (units/second).
    pub max_snap_speed: f32,
    /// Length of the snap probe ray.
    pub probe_distance: f32,
}

impl Default for GroundSnapConfig {
    fn default() -> Self {
        Self {
            max_snap_speed: 100.0,
            probe_distance: 1.5,
        }
    }
}

/// Configuration parameters for the locomotion controller.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct LocomotionConfig {
    // === Movement ===
    /// Profile used while grounded.
    pub grounded: MovementProfile,
    /// Profile used while airborne.
    pub airborne: MovementProfile,

    // === Slopes ===
    /// Steepest walkable ground (radians).
    pub max_ground_angle: f32,
    /// Steepest walkable stairs surface (radians).
    pub max_stairs_angle: f32,

    // === Ride ===
    /// Height above the ground the body rests at.
    pub ride_height: f32,
    /// Length of the downward ground ray.
    pub ground_check_distance: f32,
    /// Spring pulling the body toward ride height.
    pub ride_spring: SpringSettings,

    // === Rotation ===
    /// Spring used to derive the orientation PD gains.
    pub rotation_spring: SpringSettings,
    /// Yaw rate per unit of look input (radians/second).
    pub rotation_speed: f32,

    // === Jump ===
    /// Apex height of a jump from rest.
    pub jump_height: f32,
    /// How long an early jump press is remembered (seconds).
    pub jump_input_buffer_duration: f32,
    /// Grace period after leaving the ground during which jumping is allowed (seconds).
    pub coyote_time_duration: f32,

    // === Friction ===
    /// Share of the velocity removed per second while grounded without intent.
    pub stop_friction: f32,

    // === Ground Detection ===
    /// Ground classification strategy.
    pub probe_mode: ProbeMode,
    /// Snap settings; `None` disables snapping.
    pub ground_snap: Option<GroundSnapConfig>,

    // === Gravity ===
    /// Gravity the jump speed is computed against.
    pub gravity: Vec3,
    /// Gravity scale while falling. The physics engine applies 1x, the
    /// controller adds the remainder.
    pub fall_gravity_multiplier: f32,
    /// Cancel the along-slope part of gravity while grounded, so bodies
    /// rest on walkable slopes instead of sliding down.
    pub slope_gravity_compensation: bool,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            grounded: MovementProfile::grounded(),
            airborne: MovementProfile::airborne(),

            max_ground_angle: 45f32.to_radians(),
            max_stairs_angle: 60f32.to_radians(),

            ride_height: 1.0,
            ground_check_distance: 1.5,
            ride_spring: SpringSettings::new(10.0, 1.0),

            rotation_spring: SpringSettings::new(14.0, 1.0),
            rotation_speed: std::f32::consts::TAU,

            jump_height: 2.0,
            jump_input_buffer_duration: 0.1,
            coyote_time_duration: 0.1,

            stop_friction: 0.5,

            probe_mode: ProbeMode::Raycast,
            ground_snap: Some(GroundSnapConfig::default()),

            gravity: Vec3::new(0.0, -9.81, 0.0),
            fall_gravity_multiplier: 2.0,
            slope_gravity_compensation: true,
        }
    }
}

/// Reason a [`LocomotionConfig`] was rejected by [`LocomotionConfig::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be finite and non-negative, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("{field} must be within [0, 90] degrees, got {degrees} degrees")]
    AngleOutOfRange { field: &'static str, degrees: f32 },
    #[error("ground_check_distance ({check}) must be at least ride_height ({ride})")]
    ProbeShorterThanRide { check: f32, ride: f32 },
}

impl LocomotionConfig {
    /// Create a config tuned for snappier, player-controlled characters.
    pub fn responsive() -> Self {
        Self {
            grounded: MovementProfile::new(6.0, 40.0, 11.0, 50.0),
            airborne: MovementProfile::new(6.0, 10.0, 11.0, 10.0),
            ride_spring: SpringSettings::new(14.0, 1.0),
            jump_input_buffer_duration: 0.15,
            coyote_time_duration: 0.15,
            ..default()
        }
    }

    /// Builder: set the grounded profile.
    pub fn with_grounded_profile(mut self, profile: MovementProfile) -> Self {
        self.grounded = profile;
        self
    }

    /// Builder: set the airborne profile.
    pub fn with_airborne_profile(mut self, profile: MovementProfile) -> Self {
        self.airborne = profile;
        self
    }

    /// Builder: set ride height and ground check distance.
    pub fn with_ride_height(mut self, ride_height: f32, ground_check_distance: f32) -> Self {
        self.ride_height = ride_height;
        self.ground_check_distance = ground_check_distance;
        self
    }

    /// Builder: set the ride spring.
    pub fn with_ride_spring(mut self, frequency: f32, damping: f32) -> Self {
        self.ride_spring = SpringSettings::new(frequency, damping);
        self
    }

    /// Builder: set the rotation spring.
    pub fn with_rotation_spring(mut self, frequency: f32, damping: f32) -> Self {
        self.rotation_spring = SpringSettings::new(frequency, damping);
        self
    }

    /// Builder: set slope limits (radians).
    pub fn with_max_angles(mut self, ground: f32, stairs: f32) -> Self {
        self.max_ground_angle = ground;
        self.max_stairs_angle = stairs;
        self
    }

    /// Builder: set jump height, input buffer and coyote time.
    pub fn with_jump(mut self, height: f32, buffer: f32, coyote: f32) -> Self {
        self.jump_height = height;
        self.jump_input_buffer_duration = buffer;
        self.coyote_time_duration = coyote;
        self
    }

    /// Builder: set the probe mode.
    pub fn with_probe_mode(mut self, mode: ProbeMode) -> Self {
        self.probe_mode = mode;
        self
    }

    /// Builder: set or disable ground snapping.
    pub fn with_ground_snap(mut self, snap: Option<GroundSnapConfig>) -> Self {
        self.ground_snap = snap;
        self
    }

    /// Builder: set gravity.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Builder: set the stop friction applied while idle on the ground.
    pub fn with_stop_friction(mut self, friction: f32) -> Self {
        self.stop_friction = friction;
        self
    }

    /// Builder: set the gravity scale while falling.
    pub fn with_fall_gravity_multiplier(mut self, multiplier: f32) -> Self {
        self.fall_gravity_multiplier = multiplier;
        self
    }

    /// Builder: enable or disable slope gravity compensation.
    pub fn with_slope_gravity_compensation(mut self, enabled: bool) -> Self {
        self.slope_gravity_compensation = enabled;
        self
    }

    /// Profile for the given context.
    #[inline]
    pub fn profile(&self, kind: ProfileKind) -> &MovementProfile {
        match kind {
            ProfileKind::Grounded => &self.grounded,
            ProfileKind::Airborne => &self.airborne,
        }
    }

    /// Check that all tunables are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = [
            ("ride_height", self.ride_height),
            ("ground_check_distance", self.ground_check_distance),
            ("jump_height", self.jump_height),
            ("jump_input_buffer_duration", self.jump_input_buffer_duration),
            ("coyote_time_duration", self.coyote_time_duration),
            ("stop_friction", self.stop_friction),
            ("fall_gravity_multiplier", self.fall_gravity_multiplier),
            ("ride_spring.frequency", self.ride_spring.frequency),
            ("ride_spring.damping", self.ride_spring.damping),
            ("rotation_spring.frequency", self.rotation_spring.frequency),
            ("rotation_spring.damping", self.rotation_spring.damping),
            ("grounded.max_speed", self.grounded.max_speed),
            ("grounded.acceleration", self.grounded.acceleration),
            ("grounded.max_sprint_speed", self.grounded.max_sprint_speed),
            ("grounded.sprint_acceleration", self.grounded.sprint_acceleration),
            ("airborne.max_speed", self.airborne.max_speed),
            ("airborne.acceleration", self.airborne.acceleration),
            ("airborne.max_sprint_speed", self.airborne.max_sprint_speed),
            ("airborne.sprint_acceleration", self.airborne.sprint_acceleration),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }

        for (field, angle) in [
            ("max_ground_angle", self.max_ground_angle),
            ("max_stairs_angle", self.max_stairs_angle),
        ] {
            if !(0.0..=std::f32::consts::FRAC_PI_2).contains(&angle) {
                return Err(ConfigError::AngleOutOfRange {
                    field,
                    degrees: angle.to_degrees(),
                });
            }
        }

        if self.ground_check_distance < self.ride_height {
            return Err(ConfigError::ProbeShorterThanRide {
                check: self.ground_check_distance,
                ride: self.ride_height,
            });
        }

        Ok(())
    }

    /// A copy with every out-of-range value clamped into range.
    pub fn sanitized(&self) -> Self {
        fn clean(value: f32) -> f32 {
            if value.is_finite() {
                value.max(0.0)
            } else {
                0.0
            }
        }
        fn clean_profile(profile: MovementProfile) -> MovementProfile {
            MovementProfile::new(
                clean(profile.max_speed),
                clean(profile.acceleration),
                clean(profile.max_sprint_speed),
                clean(profile.sprint_acceleration),
            )
        }

        let max_angle = std::f32::consts::FRAC_PI_2;
        let ride_height = clean(self.ride_height);
        Self {
            grounded: clean_profile(self.grounded),
            airborne: clean_profile(self.airborne),
            max_ground_angle: clean(self.max_ground_angle).min(max_angle),
            max_stairs_angle: clean(self.max_stairs_angle).min(max_angle),
            ride_height,
            ground_check_distance: clean(self.ground_check_distance).max(ride_height),
            ride_spring: SpringSettings::new(
                clean(self.ride_spring.frequency),
                clean(self.ride_spring.damping),
            ),
            rotation_spring: SpringSettings::new(
                clean(self.rotation_spring.frequency),
                clean(self.rotation_spring.damping),
            ),
            jump_height: clean(self.jump_height),
            jump_input_buffer_duration: clean(self.jump_input_buffer_duration),
            coyote_time_duration: clean(self.coyote_time_duration),
            stop_friction: clean(self.stop_friction),
            fall_gravity_multiplier: clean(self.fall_gravity_multiplier),
            ..*self
        }
    }
}

/// Values derived from a [`LocomotionConfig`] and the fixed timestep.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct Tunables {
    /// Timestep the spring coefficients were computed for.
    pub timestep: f32,
    /// Ride spring motion coefficients.
    pub ride_spring: SpringCoefficients,
    /// Orientation PD gains.
    pub orientation: OrientationController,
    /// `cos(max_ground_angle)`.
    pub min_ground_dot: f32,
    /// `cos(max_stairs_angle)`.
    pub min_stairs_dot: f32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self::new(&LocomotionConfig::default(), 1.0 / 60.0)
    }
}

impl Tunables {
    /// Derive tunables for `config` at `timestep`.
    pub fn new(config: &LocomotionConfig, timestep: f32) -> Self {
        Self {
            timestep,
            ride_spring: SpringCoefficients::from_settings(timestep, config.ride_spring),
            orientation: OrientationController::from_settings(config.rotation_spring),
            min_ground_dot: config.max_ground_angle.cos(),
            min_stairs_dot: config.max_stairs_angle.cos(),
        }
    }

    /// Minimum normal `y` for a surface of the given kind to count as walkable.
    #[inline]
    pub fn min_dot(&self, surface: SurfaceKind) -> f32 {
        match surface {
            SurfaceKind::Ground => self.min_ground_dot,
            SurfaceKind::Stairs => self.min_stairs_dot,
        }
    }
}
