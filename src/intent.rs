//! Movement intent components.
//!
//! Intents represent the desired movement from player input or AI. The
//! controller never polls input devices; it samples a [`LocomotionIntent`]
//! into an [`InputSnapshot`] once per tick.

use bevy::prelude::*;

/// Input sampled for a single controller tick.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    /// Planar movement intent: `x` = right, `y` = forward. Length at most 1.
    pub move_intent: Vec2,
    /// Look/turn delta. `x` turns the character around the up axis.
    pub look_delta: Vec2,
    /// Jump was pressed this tick (rising edge).
    pub jump_pressed: bool,
    /// Sprint is held.
    pub sprint: bool,
}

impl InputSnapshot {
    pub fn new(move_intent: Vec2) -> Self {
        Self {
            move_intent: move_intent.clamp_length_max(1.0),
            ..default()
        }
    }

    /// Builder: press jump this tick.
    pub fn with_jump(mut self) -> Self {
        self.jump_pressed = true;
        self
    }

    /// Builder: hold sprint.
    pub fn with_sprint(mut self) -> Self {
        self.sprint = true;
        self
    }

    /// Builder: set the look delta.
    pub fn with_look(mut self, look_delta: Vec2) -> Self {
        self.look_delta = look_delta;
        self
    }
}

/// Movement intent written by gameplay code and read by the controller.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// let mut intent = LocomotionIntent::new();
/// intent.set_move(Vec2::new(0.0, 1.0));
/// intent.set_sprint(true);
/// assert!(intent.is_moving());
///
/// intent.clear();
/// assert!(!intent.is_moving());
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct LocomotionIntent {
    /// Planar movement intent: `x` = right, `y` = forward.
    pub move_intent: Vec2,
    /// Look delta accumulated since the last tick.
    pub look_delta: Vec2,
    /// Whether sprint is held.
    pub sprint: bool,
    /// Whether the jump action is currently held.
    ///
    /// Set this every frame from any boolean source (keyboard, gamepad, AI).
    /// The controller detects the `false` to `true` change and arms a
    /// buffered jump request from it.
    ///
    /// ```rust,ignore
    /// intent.set_jump_pressed(keyboard.pressed(KeyCode::Space));
    /// ```
    pub jump_pressed: bool,
    /// Previous tick's `jump_pressed` (for edge detection).
    /// This is managed internally by the controller.
    pub(crate) jump_pressed_prev: bool,
}

impl LocomotionIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the movement intent. Longer than unit vectors are clamped.
    pub fn set_move(&mut self, intent: Vec2) {
        self.move_intent = intent.clamp_length_max(1.0);
    }

    /// Add to the look delta consumed by the next tick.
    pub fn add_look(&mut self, delta: Vec2) {
        self.look_delta += delta;
    }

    pub fn set_sprint(&mut self, sprint: bool) {
        self.sprint = sprint;
    }

    pub fn set_jump_pressed(&mut self, pressed: bool) {
        self.jump_pressed = pressed;
    }

    pub fn is_jump_pressed(&self) -> bool {
        self.jump_pressed
    }

    pub fn is_moving(&self) -> bool {
        self.move_intent.length_squared() > 1e-6
    }

    /// Clear movement and look intent. Held buttons are left alone.
    pub fn clear(&mut self) {
        self.move_intent = Vec2::ZERO;
        self.look_delta = Vec2::ZERO;
    }

    /// Sample this intent for one tick.
    ///
    /// Latches the jump edge and consumes the accumulated look delta.
    pub fn sample(&mut self) -> InputSnapshot {
        let snapshot = InputSnapshot {
            move_intent: self.move_intent,
            look_delta: self.look_delta,
            jump_pressed: self.jump_pressed && !self.jump_pressed_prev,
            sprint: self.sprint,
        };
        self.jump_pressed_prev = self.jump_pressed;
        self.look_delta = Vec2::ZERO;
        snapshot
    }
}
