//! Gameplay systems
//!
//! Each system is a plain function over a [`SystemContext`]. The pipeline is
//! two explicit ordered lists with the physics step between them; nothing is
//! registered dynamically and systems keep no state between calls.

pub mod camera;
pub mod gun;
pub mod health;
pub mod input;
pub mod melee;
pub mod projectile;
pub mod state_reset;

use rand::rngs::StdRng;

use super::entity::Entity;
use super::physics::{BodyHandle, PhysicsEngine};
use super::pool::ProjectilePool;
use super::store::EntityStore;
use crate::net::bridge::ClientId;
use crate::util::vec2::Vec2;

/// Things systems want the network layer to announce
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    BulletTrace {
        shooter: Entity,
        start: Vec2,
        end: Vec2,
    },
    PlayerDied {
        client: Option<ClientId>,
        victim: Entity,
        killer: Option<Entity>,
        spectator: Entity,
    },
    CameraRetargeted {
        camera: Entity,
        target: Option<Entity>,
    },
}

/// Everything a system may touch during one tick
pub struct SystemContext<'a> {
    pub store: &'a mut EntityStore,
    pub physics: &'a mut dyn PhysicsEngine,
    pub pool: &'a mut ProjectilePool,
    pub events: &'a mut Vec<GameEvent>,
    pub rng: &'a mut StdRng,
    /// Seconds since the previous tick
    pub delta: f32,
    pub tick: u64,
}

pub type System = fn(&mut SystemContext<'_>);

pub const PRE_PHYSICS: &[System] = &[
    state_reset::run,
    input::run,
    melee::run,
    gun::run,
    projectile::motion,
    health::run,
    camera::run,
];

pub const POST_PHYSICS: &[System] = &[projectile::impact];

/// One full simulation step
pub fn run_tick(ctx: &mut SystemContext<'_>) {
    for system in PRE_PHYSICS {
        system(ctx);
    }
    ctx.physics.step(ctx.delta);
    for system in POST_PHYSICS {
        system(ctx);
    }
}

/// Body of an entity a combat system is acting on
pub(crate) fn body_of(store: &EntityStore, entity: Entity) -> BodyHandle {
    match store.bases.get(entity).and_then(|base| base.body) {
        Some(body) => body,
        None => panic!("entity {entity} reached a combat system without a physics body"),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use crate::game::components::State;

    #[test]
    fn test_pipeline_moves_player_and_clears_state() {
        let mut h = Harness::new();
        let p = h.player(Vec2::new(100.0, 100.0));
        h.store.states.get_mut(p).unwrap().insert(State::HURT);
        h.store.inputs.get_mut(p).unwrap().direction = crate::game::constants::direction::RIGHT;

        h.run_tick(0.1);

        assert!(h.store.states.get(p).unwrap().is_idle());
        let pos = h.position(p);
        assert!((pos.x - 115.0).abs() < 1e-3, "moved to {:?}", pos);
    }

    #[test]
    #[should_panic(expected = "without a physics body")]
    fn test_bodyless_combat_entity_panics() {
        let mut h = Harness::new();
        let spectator = h.store.create_spectator(&h.physics, None).unwrap();
        body_of(&h.store, spectator);
    }
}
