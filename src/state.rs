//! State marker components.
//!
//! These components mirror the controller's state for use in queries. They
//! are added and removed by [`sync_state_markers`](crate::systems::sync_state_markers)
//! after every controller tick.

use bevy::prelude::*;

/// Marker component indicating the character is grounded.
///
/// Present while the movement state machine is in its grounded branch
/// (coyote time included). Mutually exclusive with [`Airborne`].
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// // Grounded is a marker component - just use it in queries
/// fn check_grounded(grounded: Option<&Grounded>) -> bool {
///     grounded.is_some()
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is airborne.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Marker component indicating the character touches a surface too steep to walk on.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct OnSteepSurface {
    /// Normal of the steep surface.
    pub normal: Vec3,
}

impl Default for OnSteepSurface {
    fn default() -> Self {
        Self { normal: Vec3::Y }
    }
}

impl OnSteepSurface {
    pub fn new(normal: Vec3) -> Self {
        Self { normal }
    }

    /// Slope angle of the surface (radians from horizontal).
    pub fn slope_angle(&self) -> f32 {
        self.normal.y.clamp(-1.0, 1.0).acos()
    }
}
