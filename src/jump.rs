//! Buffered jumping with coyote time.

use bevy::prelude::*;

use crate::detection::CoyoteWindow;

/// A jump press waiting to be honored.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct JumpRequest {
    pub pending: bool,
    /// Monotonic time (seconds) after which the press is forgotten.
    pub time_of_expiry: f32,
}

/// Holds at most one pending jump and turns it into a velocity change when allowed.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct JumpController {
    request: JumpRequest,
}

impl JumpController {
    /// Arm a request that expires `buffer_duration` seconds after `now`.
    ///
    /// A second press while one is pending restarts the buffer.
    pub fn request_jump(&mut self, now: f32, buffer_duration: f32) {
        self.request = JumpRequest {
            pending: true,
            time_of_expiry: now + buffer_duration,
        };
    }

    /// Drop the request once its buffer has run out.
    pub fn tick(&mut self, now: f32) {
        if self.request.pending && now >= self.request.time_of_expiry {
            trace!("jump request expired at {now}");
            self.request = JumpRequest::default();
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.request.pending
    }

    #[inline]
    pub fn request(&self) -> &JumpRequest {
        &self.request
    }

    pub fn clear(&mut self) {
        self.request = JumpRequest::default();
    }

    /// Consume the pending request if the body may jump.
    ///
    /// Returns the velocity change to add to the body, or `None` when nothing
    /// is pending or the body is neither grounded nor inside the coyote
    /// window. An ineligible request stays pending.
    #[allow(clippy::too_many_arguments)]
    pub fn try_consume(
        &mut self,
        is_grounded: bool,
        coyote: &CoyoteWindow,
        now: f32,
        velocity: Vec3,
        ground_normal: Vec3,
        gravity: Vec3,
        jump_height: f32,
    ) -> Option<Vec3> {
        if !self.request.pending || now >= self.request.time_of_expiry {
            return None;
        }
        if !is_grounded && !coyote.is_open(now) {
            return None;
        }

        self.request = JumpRequest::default();
        Some(jump_velocity(velocity, ground_normal, gravity, jump_height))
    }
}

/// Velocity change that launches a body to `jump_height`.
///
/// The launch direction leans halfway toward the ground normal. Speed the
/// body already has along it is subtracted (never below zero); speed into
/// the ground is cancelled first.
pub fn jump_velocity(velocity: Vec3, ground_normal: Vec3, gravity: Vec3, jump_height: f32) -> Vec3 {
    let direction = (ground_normal + Vec3::Y).normalize_or(Vec3::Y);
    let mut speed = (2.0 * gravity.length() * jump_height.max(0.0)).sqrt();

    let aligned = velocity.dot(direction);
    if aligned > 0.0 {
        speed = (speed - aligned).max(0.0);
    } else if aligned < 0.0 {
        speed -= aligned;
    }

    direction * speed
}
