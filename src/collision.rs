//! Ray hit and contact data shared by the ground probe and the physics backends.

use bevy::prelude::*;

/// Surface classification of whatever a ray or contact touched.
///
/// Stairs use a separate (usually steeper) walkable angle so the character
/// can climb step geometry whose edges produce tilted normals.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SurfaceKind {
    #[default]
    Ground,
    Stairs,
}

/// Information about a raycast hit.
#[derive(Debug, Clone, Copy)]
pub struct CollisionData {
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
    /// Normal of the surface at the hit point (unit length).
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Classification of the surface that was hit.
    pub surface: SurfaceKind,
    /// Entity that was hit (if any).
    pub entity: Option<Entity>,
}

impl CollisionData {
    /// Create a hit on a regular ground surface.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal: normal.normalize_or(Vec3::Y),
            point,
            surface: SurfaceKind::Ground,
            entity,
        }
    }

    /// Builder: mark the hit surface as stairs.
    pub fn on_stairs(mut self) -> Self {
        self.surface = SurfaceKind::Stairs;
        self
    }

    /// Builder: set the surface classification.
    pub fn with_surface(mut self, surface: SurfaceKind) -> Self {
        self.surface = surface;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hit_is_ground_surface() {
        let hit = CollisionData::new(0.8, Vec3::Y, Vec3::new(1.0, 0.0, 2.0), None);

        assert_eq!(hit.distance, 0.8);
        assert_eq!(hit.normal, Vec3::Y);
        assert_eq!(hit.surface, SurfaceKind::Ground);
    }

    #[test]
    fn normal_is_normalized() {
        let hit = CollisionData::new(1.0, Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO, None);
        assert!((hit.normal.length() - 1.0).abs() < 1e-6);

        let degenerate = CollisionData::new(1.0, Vec3::ZERO, Vec3::ZERO, None);
        assert_eq!(degenerate.normal, Vec3::Y);
    }

    #[test]
    fn stairs_builder() {
        let entity = Entity::from_raw(7);
        let hit = CollisionData::new(0.5, Vec3::Y, Vec3::ZERO, Some(entity)).on_stairs();

        assert_eq!(hit.surface, SurfaceKind::Stairs);
        assert_eq!(hit.entity, Some(entity));
    }
}
