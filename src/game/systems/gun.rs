//! Weapon switching, reloading and firing
//!
//! Per entity and tick: apply a slot switch, advance the reload state
//! machine, tick the fire-rate cooldown, then resolve at most one shot.
//! A shot fires every pellet: hitscan pellets raycast immediately,
//! projectile pellets check an entity out of the pool.

use rand::Rng;
use tracing::warn;

use super::{body_of, GameEvent, SystemContext};
use crate::game::components::{Gun, State};
use crate::game::constants::collision;
use crate::game::entity::Entity;
use crate::game::physics::RaycastFilter;
use crate::game::weapons::FireMode;
use crate::util::vec2::Vec2;

pub fn run(ctx: &mut SystemContext<'_>) {
    let shooters: Vec<Entity> = ctx.store.inputs.entities().to_vec();
    for shooter in shooters {
        if let Some((gun, angle)) = update_weapon(ctx, shooter) {
            fire(ctx, shooter, &gun, angle);
        }
        if let Some(input) = ctx.store.inputs.get_mut(shooter) {
            input.consume_edges();
        }
    }
}

/// Advance the active gun; returns a snapshot of it when a shot was taken
fn update_weapon(ctx: &mut SystemContext<'_>, shooter: Entity) -> Option<(Gun, f32)> {
    let input = ctx.store.inputs.get(shooter).copied()?;
    let inventory = ctx.store.inventories.get_mut(shooter)?;

    if let Some(slot) = input.switch_slot {
        inventory.switch_to(slot as usize);
    }

    let active = inventory.active_slot;
    let gun = inventory.slots[active].as_mut()?;
    let reserve = &mut inventory.reserve[gun.ammo_type.index()];

    if gun.is_reloading() {
        if gun.advance_reload(ctx.delta, reserve) {
            inventory.dirty = true;
        }
    } else if input.reload_requested && gun.try_start_reload(*reserve) {
        inventory.dirty = true;
    }

    gun.fire_cooldown.update(ctx.delta);

    let wants_fire = if gun.automatic {
        input.mouse_down || input.dirty_click
    } else {
        input.dirty_click
    };
    if !wants_fire || !gun.can_fire() {
        return None;
    }
    gun.consume_shot();
    inventory.dirty = true;
    Some((gun.clone(), input.angle))
}

fn fire(ctx: &mut SystemContext<'_>, shooter: Entity, gun: &Gun, angle: f32) {
    let origin = ctx.physics.position(body_of(ctx.store, shooter));
    if let Some(state) = ctx.store.states.get_mut(shooter) {
        state.insert(State::SHOOTING);
    }

    for _ in 0..gun.pellets {
        let jitter = ctx.rng.gen_range(-gun.spread..=gun.spread);
        let direction = Vec2::from_angle(angle + jitter);
        let muzzle = origin + direction * gun.barrel_length;
        match gun.fire_mode {
            FireMode::Hitscan => hitscan(ctx, shooter, gun, muzzle, direction),
            FireMode::Projectile => {
                if !launch(ctx, shooter, gun, muzzle, direction) {
                    break;
                }
            }
        }
    }
}

fn hitscan(ctx: &mut SystemContext<'_>, shooter: Entity, gun: &Gun, muzzle: Vec2, direction: Vec2) {
    let filter = RaycastFilter {
        mask: collision::HITSCAN_MASK,
        ignore: Some(shooter),
    };
    let end = match ctx.physics.raycast(muzzle, direction, gun.range, filter) {
        Some(hit) => {
            if let Some(health) = ctx.store.healths.get_mut(hit.entity) {
                health.decrement(gun.damage, shooter);
                if let Some(state) = ctx.store.states.get_mut(hit.entity) {
                    state.insert(State::HURT);
                }
            }
            hit.point
        }
        None => muzzle + direction * gun.range,
    };
    ctx.events.push(GameEvent::BulletTrace {
        shooter,
        start: muzzle,
        end,
    });
}

/// False when the pool is empty and the remaining pellets should be skipped
fn launch(ctx: &mut SystemContext<'_>, shooter: Entity, gun: &Gun, muzzle: Vec2, direction: Vec2) -> bool {
    let entity = match ctx.pool.acquire(ctx.store) {
        Ok(entity) => entity,
        Err(e) => {
            warn!(shooter = %shooter, "Projectile not fired: {}", e);
            return false;
        }
    };

    if let Some(projectile) = ctx.store.projectiles.get_mut(entity) {
        projectile.owner = Some(shooter);
        projectile.origin = muzzle;
        projectile.direction = direction;
        projectile.speed = gun.projectile_speed;
        projectile.spawn_tick = ctx.tick;
        projectile.remaining_life = gun.projectile_lifetime;
        projectile.damage = gun.damage;
    }
    let body = body_of(ctx.store, entity);
    ctx.physics.set_transform(body, muzzle, direction.angle());
    ctx.physics.enable(body);
    ctx.physics.set_velocity(body, direction * gun.projectile_speed);
    true
}
