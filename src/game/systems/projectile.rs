//! Pooled projectile lifetime and impacts
//!
//! Clients simulate projectile flight from the spawn record, so the server
//! only decides when a projectile stops existing: lifetime expiry before
//! the physics step, contact after it. Both paths hand the entity back to
//! the pool; replication notices the disappearance and sends the destroy.

use smallvec::SmallVec;
use tracing::debug;

use super::SystemContext;
use crate::game::components::State;
use crate::game::entity::Entity;
use crate::game::physics::ContactPair;
use crate::game::store::EntityStore;

pub fn motion(ctx: &mut SystemContext<'_>) {
    let mut expired: SmallVec<[Entity; 16]> = SmallVec::new();
    for (entity, projectile) in ctx.store.projectiles.iter_mut() {
        if !projectile.active {
            continue;
        }
        projectile.remaining_life -= ctx.delta;
        if projectile.remaining_life <= 0.0 {
            expired.push(entity);
        }
    }

    for entity in expired {
        if let Err(e) = ctx.pool.release(ctx.store, ctx.physics, entity) {
            debug!("Expired projectile not released: {}", e);
        }
    }
}

fn is_active_projectile(store: &EntityStore, entity: Entity) -> bool {
    store.projectiles.get(entity).is_some_and(|p| p.active)
}

pub fn impact(ctx: &mut SystemContext<'_>) {
    let contacts: SmallVec<[ContactPair; 16]> =
        ctx.physics.contact_events().iter().copied().collect();

    for pair in contacts {
        let (bullet, other) = match (
            is_active_projectile(ctx.store, pair.a),
            is_active_projectile(ctx.store, pair.b),
        ) {
            (true, false) => (pair.a, pair.b),
            (false, true) => (pair.b, pair.a),
            _ => continue,
        };
        let Some(projectile) = ctx.store.projectiles.get(bullet).copied() else {
            continue;
        };
        if projectile.owner == Some(other) {
            continue;
        }

        if let Some(health) = ctx.store.healths.get_mut(other) {
            health.decrement(projectile.damage, projectile.owner.unwrap_or(bullet));
            if let Some(state) = ctx.store.states.get_mut(other) {
                state.insert(State::HURT);
            }
        }
        if let Err(e) = ctx.pool.release(ctx.store, ctx.physics, bullet) {
            debug!("Projectile impact not released: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::player;
    use crate::game::physics::PhysicsEngine;
    use crate::game::systems::test_support::Harness;
    use crate::util::vec2::Vec2;

    /// Activate a pooled projectile the way the gun system does
    fn shoot(h: &mut Harness, owner: Option<Entity>, at: Vec2, velocity: Vec2, life: f32) -> Entity {
        let e = h.pool.acquire(&mut h.store).unwrap();
        let p = h.store.projectiles.get_mut(e).unwrap();
        p.owner = owner;
        p.origin = at;
        p.direction = velocity.normalize();
        p.speed = velocity.length();
        p.remaining_life = life;
        p.damage = 15.0;
        let body = h.store.bases.get(e).unwrap().body.unwrap();
        h.physics.set_transform(body, at, 0.0);
        h.physics.enable(body);
        h.physics.set_velocity(body, velocity);
        e
    }

    #[test]
    fn test_short_lived_projectile_released_same_tick() {
        let mut h = Harness::new();
        let e = shoot(&mut h, None, Vec2::ZERO, Vec2::new(100.0, 0.0), 0.016);
        let available = h.pool.available();

        h.run(motion, 0.1);

        assert!(!h.store.projectiles.get(e).unwrap().active);
        assert_eq!(h.pool.available(), available + 1);
        let body = h.store.bases.get(e).unwrap().body.unwrap();
        assert!(!h.physics.is_enabled(body));
    }

    #[test]
    fn test_lifetime_counts_down() {
        let mut h = Harness::new();
        let e = shoot(&mut h, None, Vec2::ZERO, Vec2::new(100.0, 0.0), 1.0);
        h.run(motion, 0.25);
        let p = h.store.projectiles.get(e).unwrap();
        assert!(p.active);
        assert!((p.remaining_life - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_impact_damages_and_releases() {
        let mut h = Harness::new();
        let shooter = h.player(Vec2::new(0.0, 0.0));
        let target = h.player(Vec2::new(200.0, 0.0));
        let e = shoot(&mut h, Some(shooter), Vec2::new(150.0, 0.0), Vec2::new(400.0, 0.0), 1.0);

        h.physics.step(0.1);
        h.run(impact, 0.1);

        let health = h.store.healths.get(target).unwrap();
        assert_eq!(health.current, player::MAX_HEALTH - 15.0);
        assert_eq!(health.last_attacker, Some(shooter));
        assert!(h.store.states.get(target).unwrap().contains(State::HURT));
        assert!(!h.store.projectiles.get(e).unwrap().active);
    }

    #[test]
    fn test_owner_is_not_hit() {
        let mut h = Harness::new();
        let shooter = h.player(Vec2::new(0.0, 0.0));
        let e = shoot(&mut h, Some(shooter), Vec2::new(5.0, 0.0), Vec2::new(10.0, 0.0), 1.0);

        h.physics.step(0.1);
        h.run(impact, 0.1);

        assert_eq!(h.store.healths.get(shooter).unwrap().current, player::MAX_HEALTH);
        assert!(h.store.projectiles.get(e).unwrap().active);
    }

    #[test]
    fn test_rifle_round_hits_target_closer_than_one_step() {
        let mut h = Harness::new();
        h.config.weapons.rifle.spread = 0.0;
        let shooter = h.player(Vec2::new(100.0, 100.0));
        let target = h.player(Vec2::new(200.0, 100.0));
        h.store.inputs.get_mut(shooter).unwrap().switch_slot = Some(2);
        h.run_tick(0.1);

        // Muzzle to target is well under the 128px a rifle round covers per tick
        let before = h.pool.available();
        h.store.inputs.get_mut(shooter).unwrap().mouse_down = true;
        h.run_tick(0.1);

        let health = h.store.healths.get(target).unwrap();
        assert_eq!(health.current, player::MAX_HEALTH - h.config.weapons.rifle.damage);
        assert_eq!(health.last_attacker, Some(shooter));
        assert!(h.store.states.get(target).unwrap().contains(State::HURT));
        assert_eq!(h.pool.available(), before);
    }
}
