//! Unarmed swings for players with an empty hand

use smallvec::SmallVec;

use super::{body_of, SystemContext};
use crate::game::components::State;
use crate::game::constants::melee;
use crate::game::entity::Entity;
use crate::util::aabb::Aabb;
use crate::util::vec2::Vec2;

pub fn run(ctx: &mut SystemContext<'_>) {
    let fighters: Vec<Entity> = ctx.store.cooldowns.entities().to_vec();
    for attacker in fighters {
        swing(ctx, attacker);
    }
}

fn swing(ctx: &mut SystemContext<'_>, attacker: Entity) {
    let store = &mut *ctx.store;
    let Some(input) = store.inputs.get(attacker).copied() else {
        return;
    };
    if !store.states.contains(attacker)
        || store
            .inventories
            .get(attacker)
            .is_some_and(|inv| inv.has_gun_in_hand())
    {
        return;
    }
    let Some(cooldown) = store.cooldowns.get_mut(attacker) else {
        return;
    };
    cooldown.update(ctx.delta);
    if !(input.mouse_down || input.dirty_click) || !cooldown.is_ready() {
        return;
    }
    cooldown.reset();
    if let Some(state) = store.states.get_mut(attacker) {
        state.insert(State::MELEE);
    }

    let body = body_of(store, attacker);
    let strike = ctx.physics.position(body) + Vec2::from_angle(input.angle) * melee::REACH;
    let area = Aabb::around_circle(strike, melee::RADIUS);
    let victims: SmallVec<[Entity; 8]> = ctx
        .physics
        .query_aabb(&area)
        .into_iter()
        .filter(|hit| hit.entity != attacker)
        .filter(|hit| hit.bounds.overlaps_circle(strike, melee::RADIUS))
        .filter(|hit| store.healths.contains(hit.entity))
        .map(|hit| hit.entity)
        .collect();

    for victim in victims {
        if let Some(health) = store.healths.get_mut(victim) {
            health.decrement(melee::DAMAGE, attacker);
        }
        if let Some(state) = store.states.get_mut(victim) {
            state.insert(State::HURT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::player;
    use crate::game::systems::test_support::Harness;

    fn click(h: &mut Harness, e: Entity, angle: f32) {
        let input = h.store.inputs.get_mut(e).unwrap();
        input.angle = angle;
        input.dirty_click = true;
    }

    #[test]
    fn test_swing_hits_target_in_front() {
        let mut h = Harness::new();
        let attacker = h.player(Vec2::new(100.0, 100.0));
        let victim = h.player(Vec2::new(130.0, 100.0));
        let bystander = h.player(Vec2::new(100.0, 200.0));
        click(&mut h, attacker, 0.0);

        h.run(run, 0.1);

        let health = h.store.healths.get(victim).unwrap();
        assert_eq!(health.current, player::MAX_HEALTH - melee::DAMAGE);
        assert_eq!(health.last_attacker, Some(attacker));
        assert!(h.store.states.get(victim).unwrap().contains(State::HURT));
        assert!(h.store.states.get(attacker).unwrap().contains(State::MELEE));
        assert_eq!(h.store.healths.get(bystander).unwrap().current, player::MAX_HEALTH);
    }

    #[test]
    fn test_attacker_never_hits_itself() {
        let mut h = Harness::new();
        let attacker = h.player(Vec2::new(100.0, 100.0));
        // Aim straight down; own body still overlaps the strike box edge
        click(&mut h, attacker, std::f32::consts::FRAC_PI_2);

        h.run(run, 0.1);

        let health = h.store.healths.get(attacker).unwrap();
        assert_eq!(health.current, player::MAX_HEALTH);
        assert!(!h.store.states.get(attacker).unwrap().contains(State::HURT));
    }

    #[test]
    fn test_cooldown_gates_second_swing() {
        let mut h = Harness::new();
        let attacker = h.player(Vec2::new(100.0, 100.0));
        let victim = h.player(Vec2::new(130.0, 100.0));
        h.store.inputs.get_mut(attacker).unwrap().mouse_down = true;

        h.run(run, 0.1);
        h.run(run, 0.1);
        assert_eq!(
            h.store.healths.get(victim).unwrap().current,
            player::MAX_HEALTH - melee::DAMAGE
        );

        for _ in 0..5 {
            h.run(run, 0.1);
        }
        assert_eq!(
            h.store.healths.get(victim).unwrap().current,
            player::MAX_HEALTH - 2.0 * melee::DAMAGE
        );
    }

    #[test]
    fn test_gun_in_hand_disables_melee() {
        let mut h = Harness::new();
        let attacker = h.player(Vec2::new(100.0, 100.0));
        let victim = h.player(Vec2::new(130.0, 100.0));
        h.store.inventories.get_mut(attacker).unwrap().switch_to(1);
        click(&mut h, attacker, 0.0);

        h.run(run, 0.1);
        assert_eq!(h.store.healths.get(victim).unwrap().current, player::MAX_HEALTH);
    }
}
