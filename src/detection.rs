//! Ground contact classification.
//!
//! [`GroundProbe`] decides once per tick whether the body is grounded, on a
//! steep surface, or airborne. Classification is hysteretic: a body that was
//! grounded last tick stays grounded anywhere within the ground ray, while an
//! airborne body must come within ride height before it lands. This keeps the
//! state from flickering when the body hovers exactly at ride height.
//!
//! Two modes are supported (see [`ProbeMode`]):
//! - **Raycast**: the downward ground ray alone classifies contact.
//! - **Contacts**: collision normals recorded since the previous tick are
//!   summed by [`ContactAccumulator`] and classify contact, with a ground snap
//!   and a steep-contact fallback. The ray still measures ride distance.

use bevy::prelude::*;

use crate::body::PhysicsBody;
use crate::collision::{CollisionData, SurfaceKind};
use crate::config::{LocomotionConfig, ProbeMode, Tunables};

/// Normals closer than this (component-wise) are treated as the same surface.
const NORMAL_EPSILON: f32 = 1e-3;

/// Steep contacts must face at least slightly upward to count (walls, not ceilings).
const MIN_STEEP_NORMAL_Y: f32 = -0.01;

/// Result of one probe.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct ContactInfo {
    /// Whether walkable ground is under the body this tick.
    pub is_grounded: bool,
    /// Whether the body is touching a surface too steep to walk on.
    pub on_steep_surface: bool,
    /// Unit normal of the contact plane. Up when nothing was hit.
    pub ground_normal: Vec3,
    /// Distance from the body to the ground ray hit.
    pub distance_to_ground: f32,
    /// World-space height the body should ride at.
    pub desired_ride_position: f32,
    /// Whether the ground ray hit; `desired_ride_position` is only meaningful when set.
    pub has_ground_hit: bool,
}

impl ContactInfo {
    /// Contact info for a body with nothing underneath.
    pub fn airborne(height: f32, distance_to_ground: f32) -> Self {
        Self {
            is_grounded: false,
            on_steep_surface: false,
            ground_normal: Vec3::Y,
            distance_to_ground,
            desired_ride_position: height,
            has_ground_hit: false,
        }
    }
}

impl Default for ContactInfo {
    fn default() -> Self {
        Self::airborne(0.0, f32::MAX)
    }
}

/// Grace window after leaving the ground during which the body still counts as grounded.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct CoyoteWindow {
    /// Monotonic time (seconds) at which the window closes.
    pub time_of_expiry: f32,
}

impl CoyoteWindow {
    /// Open the window until `now + duration`.
    pub fn arm(&mut self, now: f32, duration: f32) {
        self.time_of_expiry = now + duration;
    }

    /// Close the window immediately.
    pub fn clear(&mut self) {
        self.time_of_expiry = 0.0;
    }

    /// Whether the window is still open at `now`.
    #[inline]
    pub fn is_open(&self, now: f32) -> bool {
        now < self.time_of_expiry
    }
}

/// Sums collision contact normals between ticks.
///
/// Contacts may be reported several times per tick; every report is added,
/// never overwritten. [`ContactAccumulator::clear`] resets the sums at the end
/// of each tick.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct ContactAccumulator {
    ground_count: u32,
    ground_normal: Vec3,
    steep_count: u32,
    steep_normal: Vec3,
}

impl Default for ContactAccumulator {
    fn default() -> Self {
        Self {
            ground_count: 0,
            ground_normal: Vec3::ZERO,
            steep_count: 0,
            steep_normal: Vec3::ZERO,
        }
    }
}

impl ContactAccumulator {
    /// Record one contact normal. `min_dot` is the walkable threshold for the touched surface.
    pub fn record(&mut self, normal: Vec3, min_dot: f32) {
        if normal.y >= min_dot {
            self.ground_count += 1;
            self.ground_normal += normal;
        } else if normal.y > MIN_STEEP_NORMAL_Y {
            self.steep_count += 1;
            self.steep_normal += normal;
        }
    }

    #[inline]
    pub fn ground_count(&self) -> u32 {
        self.ground_count
    }

    #[inline]
    pub fn steep_count(&self) -> u32 {
        self.steep_count
    }

    /// Averaged ground normal, if any ground contact was recorded.
    pub fn ground_normal(&self) -> Option<Vec3> {
        (self.ground_count > 0).then(|| self.ground_normal.normalize_or(Vec3::Y))
    }

    /// Averaged steep normal, if any steep contact was recorded.
    pub fn steep_normal(&self) -> Option<Vec3> {
        (self.steep_count > 0).then(|| self.steep_normal.normalize_or(Vec3::Y))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Ground probe state carried between ticks.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct GroundProbe {
    grounded: bool,
    on_steep: bool,
    contact: ContactInfo,
    coyote: CoyoteWindow,
    steps_since_grounded: u32,
    steps_since_jump: u32,
    last_contact_normal: Vec3,
    contacts: ContactAccumulator,
}

impl Default for GroundProbe {
    fn default() -> Self {
        Self {
            grounded: false,
            on_steep: false,
            contact: ContactInfo::default(),
            coyote: CoyoteWindow::default(),
            steps_since_grounded: 0,
            // Start "long after" a jump so the first ticks may snap.
            steps_since_jump: u32::MAX / 2,
            last_contact_normal: Vec3::Y,
            contacts: ContactAccumulator::default(),
        }
    }
}

impl GroundProbe {
    /// Record a collision contact for the next probe.
    pub fn record_contact(&mut self, normal: Vec3, surface: SurfaceKind, tunables: &Tunables) {
        self.contacts.record(normal.normalize_or_zero(), tunables.min_dot(surface));
    }

    /// Classify contact for this tick.
    ///
    /// `velocity` is the working velocity of the tick; a ground snap may
    /// reproject it onto the snapped surface.
    pub fn probe<P: PhysicsBody + ?Sized>(
        &mut self,
        body: &P,
        velocity: &mut Vec3,
        config: &LocomotionConfig,
        tunables: &Tunables,
        now: f32,
    ) -> ContactInfo {
        let previously_grounded = self.grounded;
        let previously_on_steep = self.on_steep;

        self.steps_since_grounded = self.steps_since_grounded.saturating_add(1);
        self.steps_since_jump = self.steps_since_jump.saturating_add(1);

        let position = body.state().position;
        let mut contact = ContactInfo::airborne(position.y, self.contact.distance_to_ground);
        let mut ray_grounded = false;
        let mut ray_steep = false;

        if let Some(hit) = body.cast_down(config.ground_check_distance) {
            contact.has_ground_hit = true;
            contact.ground_normal = hit.normal;
            contact.distance_to_ground = hit.distance;
            contact.desired_ride_position = hit.point.y + config.ride_height;

            let near = hit.distance < config.ride_height;
            if hit.normal.y >= tunables.min_dot(hit.surface) && (previously_grounded || near) {
                ray_grounded = true;
            } else if previously_on_steep || previously_grounded || near {
                ray_steep = true;
            }
        }

        let (grounded, steep) = match config.probe_mode {
            ProbeMode::Raycast => (ray_grounded, ray_steep),
            ProbeMode::Contacts => self.classify_contacts(
                body,
                velocity,
                &mut contact,
                config,
                tunables,
            ),
        };

        if !grounded && !steep {
            contact.ground_normal = Vec3::Y;
        }

        contact.is_grounded = grounded;
        contact.on_steep_surface = steep;

        if grounded {
            self.steps_since_grounded = 0;
        }
        if previously_grounded && !grounded {
            self.coyote.arm(now, config.coyote_time_duration);
        }

        self.grounded = grounded;
        self.on_steep = steep;
        self.last_contact_normal = contact.ground_normal;
        self.contact = contact;
        self.contacts.clear();

        contact
    }

    fn classify_contacts<P: PhysicsBody + ?Sized>(
        &mut self,
        body: &P,
        velocity: &mut Vec3,
        contact: &mut ContactInfo,
        config: &LocomotionConfig,
        tunables: &Tunables,
    ) -> (bool, bool) {
        if let Some(normal) = self.contacts.ground_normal() {
            contact.ground_normal = normal;
            return (true, false);
        }

        if let Some(normal) = self.snap_to_ground(body, velocity, config, tunables) {
            contact.ground_normal = normal;
            return (true, false);
        }

        if self.contacts.steep_count() > 1 {
            if let Some(normal) = self.contacts.steep_normal() {
                if normal.y > tunables.min_ground_dot {
                    // Wedged between steep surfaces that together form a floor.
                    contact.ground_normal = normal;
                    return (true, false);
                }
            }
        }

        let steep = self.contacts.steep_count() > 0;
        if steep {
            if let Some(normal) = self.contacts.steep_normal() {
                contact.ground_normal = normal;
            }
        }
        (false, steep)
    }

    /// Synthesize ground contact for a body that just left the ground by
    /// accident (e.g. cresting a small step).
    fn snap_to_ground<P: PhysicsBody + ?Sized>(
        &self,
        body: &P,
        velocity: &mut Vec3,
        config: &LocomotionConfig,
        tunables: &Tunables,
    ) -> Option<Vec3> {
        let snap = config.ground_snap?;

        if self.steps_since_grounded > 1 || self.steps_since_jump <= 2 {
            return None;
        }

        let speed = velocity.length();
        if speed > snap.max_snap_speed {
            return None;
        }

        let hit: CollisionData = body.cast_down(snap.probe_distance)?;
        if hit.normal.y < tunables.min_dot(hit.surface) {
            return None;
        }

        let normal = hit.normal;
        let dot = velocity.normalize_or_zero().dot(normal);
        if dot > 0.0 {
            if normal.abs_diff_eq(self.last_contact_normal, NORMAL_EPSILON) {
                // Same surface: project onto it, keeping speed.
                *velocity = (*velocity - normal * velocity.dot(normal)).normalize_or_zero() * speed;
            } else {
                // Surface changed: reflect across the bisector of old and new normals.
                let reflection_normal = -(normal + self.last_contact_normal).normalize_or(normal);
                *velocity = velocity.reflect(reflection_normal);
            }
        }

        trace!("ground snap onto {normal} at speed {speed}");
        Some(normal)
    }

    /// Note that a jump happened this tick; suppresses snapping for two ticks.
    pub fn on_jump(&mut self) {
        self.steps_since_jump = 0;
        self.coyote.clear();
    }

    /// Grounded, or still inside the coyote window.
    #[inline]
    pub fn is_grounded(&self, now: f32) -> bool {
        self.grounded || self.coyote.is_open(now)
    }

    /// Grounded by this tick's contact alone, ignoring coyote time.
    #[inline]
    pub fn raw_grounded(&self) -> bool {
        self.grounded
    }

    #[inline]
    pub fn on_steep_surface(&self) -> bool {
        self.on_steep
    }

    #[inline]
    pub fn distance_to_ground(&self) -> f32 {
        self.contact.distance_to_ground
    }

    /// Contact info computed by the last probe.
    #[inline]
    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    #[inline]
    pub fn coyote(&self) -> &CoyoteWindow {
        &self.coyote
    }

    #[inline]
    pub fn contacts(&self) -> &ContactAccumulator {
        &self.contacts
    }
}
