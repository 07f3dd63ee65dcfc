//! Core controller systems.
//!
//! The controller tick runs as an exclusive system so it is the only writer
//! of each body while it runs. It is generic over the physics backend.

use std::collections::HashMap;

use bevy::prelude::*;

use crate::backend::{BackendBody, LocomotionBackend};
use crate::config::LocomotionConfig;
use crate::controller::LocomotionController;
use crate::intent::{InputSnapshot, LocomotionIntent};
use crate::state::{Airborne, Grounded, OnSteepSurface};

/// Advance every locomotion controller by one fixed tick.
///
/// Samples each entity's [`LocomotionIntent`] (characters without one get no
/// input), validates its [`LocomotionConfig`] and runs the controller against
/// the backend body. An invalid config is reported once per change and the
/// tick runs on [`LocomotionConfig::sanitized`] values.
pub fn update_locomotion<B: LocomotionBackend>(
    world: &mut World,
    mut reported: Local<HashMap<Entity, LocomotionConfig>>,
) {
    let dt = B::fixed_timestep(world);
    let now = B::fixed_elapsed(world);

    let entities: Vec<(Entity, LocomotionConfig, InputSnapshot)> = world
        .query_filtered::<
            (Entity, &LocomotionConfig, Option<&mut LocomotionIntent>),
            With<LocomotionController>,
        >()
        .iter_mut(world)
        .map(|(entity, config, intent)| {
            let input = intent.map(|mut intent| intent.sample()).unwrap_or_default();
            (entity, *config, input)
        })
        .collect();

    reported.retain(|entity, _| world.get_entity(*entity).is_ok());

    for (entity, config, input) in entities {
        let config = match config.validate() {
            Ok(()) => {
                reported.remove(&entity);
                config
            }
            Err(err) => {
                if reported.get(&entity) != Some(&config) {
                    warn!("invalid locomotion config on {entity}: {err}; using sanitized values");
                    reported.insert(entity, config);
                }
                config.sanitized()
            }
        };

        let Some(mut controller) = world
            .get_mut::<LocomotionController>(entity)
            .map(|mut controller| std::mem::take(&mut *controller))
        else {
            continue;
        };

        {
            let mut body = BackendBody::<B>::new(world, entity, config.gravity);
            controller.update(&mut body, &input, &config, now, dt);
        }

        if let Some(mut slot) = world.get_mut::<LocomotionController>(entity) {
            *slot = controller;
        }
    }
}

/// Sync the state marker components with each controller's state.
pub fn sync_state_markers(
    mut commands: Commands,
    q_controllers: Query<(
        Entity,
        &LocomotionController,
        Has<Grounded>,
        Has<Airborne>,
        Option<&OnSteepSurface>,
    )>,
) {
    for (entity, controller, has_grounded, has_airborne, steep) in &q_controllers {
        let Some(state) = controller.active_state() else {
            continue;
        };

        // Sync Grounded/Airborne
        let grounded = state.is_grounded();
        if grounded && !has_grounded {
            commands.entity(entity).insert(Grounded).remove::<Airborne>();
        } else if !grounded && !has_airborne {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }

        // Sync OnSteepSurface
        if controller.on_steep_surface() {
            let normal = controller.contact().ground_normal;
            if steep.is_none_or(|steep| steep.normal != normal) {
                commands.entity(entity).insert(OnSteepSurface::new(normal));
            }
        } else if steep.is_some() {
            commands.entity(entity).remove::<OnSteepSurface>();
        }
    }
}
