//! Camera follow and retargeting

use super::{GameEvent, SystemContext};
use crate::game::entity::Entity;

pub fn run(ctx: &mut SystemContext<'_>) {
    let fallback = ctx.store.follow_entity();
    let cameras: Vec<Entity> = ctx.store.cameras.entities().to_vec();

    for entity in cameras {
        if ctx.store.removal.contains(entity) {
            continue;
        }
        let Some(current) = ctx.store.cameras.get(entity).map(|c| c.target) else {
            continue;
        };
        let target_valid = current
            .is_some_and(|t| ctx.store.is_alive(t) && !ctx.store.removal.contains(t));

        let target = if target_valid {
            current
        } else if current != fallback {
            ctx.events.push(GameEvent::CameraRetargeted {
                camera: entity,
                target: fallback,
            });
            fallback
        } else {
            current
        };

        let position = target.and_then(|t| ctx.store.position_of(&*ctx.physics, t));
        if let Some(camera) = ctx.store.cameras.get_mut(entity) {
            camera.target = target;
            if let Some(position) = position {
                camera.last_position = position;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::PhysicsEngine;
    use crate::game::systems::test_support::Harness;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_follows_target_position() {
        let mut h = Harness::new();
        let p = h.player(Vec2::new(10.0, 20.0));
        let body = h.store.bases.get(p).unwrap().body.unwrap();
        h.physics.set_transform(body, Vec2::new(300.0, 400.0), 0.0);

        h.run(run, 0.1);
        assert_eq!(h.store.cameras.get(p).unwrap().last_position, Vec2::new(300.0, 400.0));
        assert!(h.events.is_empty());
    }

    #[test]
    fn test_retargets_when_target_dies() {
        let mut h = Harness::new();
        let first = h.player(Vec2::new(10.0, 20.0));
        let second = h.player(Vec2::new(500.0, 500.0));
        let spectator = h.store.create_spectator(&h.physics, Some(first)).unwrap();

        h.store.schedule_for_removal(first);
        h.run(run, 0.1);

        let camera = h.store.cameras.get(spectator).unwrap();
        assert_eq!(camera.target, Some(second));
        assert_eq!(camera.last_position, Vec2::new(500.0, 500.0));
        assert_eq!(
            h.events,
            vec![GameEvent::CameraRetargeted {
                camera: spectator,
                target: Some(second)
            }]
        );
    }

    #[test]
    fn test_idle_spectator_picks_up_new_player() {
        let mut h = Harness::new();
        let spectator = h.store.create_spectator(&h.physics, None).unwrap();
        h.run(run, 0.1);
        assert!(h.events.is_empty());

        let p = h.player(Vec2::new(64.0, 64.0));
        h.run(run, 0.1);
        assert_eq!(h.store.cameras.get(spectator).unwrap().target, Some(p));
        assert_eq!(h.events.len(), 1);
    }
}
