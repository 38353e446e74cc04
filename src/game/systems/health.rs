//! Death handling

use tracing::info;

use super::{GameEvent, SystemContext};
use crate::game::components::EntityType;
use crate::game::entity::Entity;

pub fn run(ctx: &mut SystemContext<'_>) {
    let dead: Vec<Entity> = ctx
        .store
        .healths
        .iter()
        .filter(|(entity, health)| health.is_dead() && !ctx.store.removal.contains(*entity))
        .map(|(entity, _)| entity)
        .collect();

    for victim in dead {
        die(ctx, victim);
    }
}

/// Player death: swap the client onto a spectator watching the killer
fn die(ctx: &mut SystemContext<'_>, victim: Entity) {
    let kind = ctx.store.kind_of(victim);
    if kind != Some(EntityType::Player) {
        panic!("entity {victim} of kind {kind:?} died but only player deaths are handled");
    }

    let store = &mut *ctx.store;
    let killer = store
        .healths
        .get(victim)
        .and_then(|h| h.last_attacker)
        .filter(|&k| k != victim && store.is_alive(k) && !store.removal.contains(k));

    store.schedule_for_removal(victim);
    let spectator = store
        .create_spectator(&*ctx.physics, killer)
        .unwrap_or_else(|e| panic!("no spectator slot for dead player {victim}: {e}"));

    let client = store.client_links.remove(victim).map(|link| {
        store.client_links.insert(spectator, link);
        link.client
    });

    info!(
        victim = %victim,
        killer = ?killer.map(|k| k.to_string()),
        client = ?client,
        "Player died"
    );
    ctx.events.push(GameEvent::PlayerDied {
        client,
        victim,
        killer,
        spectator,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::components::ClientLink;
    use crate::game::systems::test_support::Harness;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_player_death_creates_one_spectator() {
        let mut h = Harness::new();
        let killer = h.player(Vec2::new(0.0, 0.0));
        let victim = h.player(Vec2::new(100.0, 0.0));
        h.store.client_links.insert(victim, ClientLink { client: 3 });
        h.store.healths.get_mut(victim).unwrap().decrement(1000.0, killer);
        let cameras_before = h.store.cameras.len();

        h.run(run, 0.1);
        // A second pass must not kill the same player again
        h.run(run, 0.1);

        assert!(h.store.removal.contains(victim));
        assert_eq!(h.store.removal.len(), 1);
        assert_eq!(h.store.cameras.len(), cameras_before + 1);

        let [GameEvent::PlayerDied {
            client,
            victim: v,
            killer: k,
            spectator,
        }] = h.events.as_slice()
        else {
            panic!("expected exactly one death, got {:?}", h.events);
        };
        assert_eq!(*client, Some(3));
        assert_eq!(*v, victim);
        assert_eq!(*k, Some(killer));
        assert_eq!(h.store.cameras.get(*spectator).unwrap().target, Some(killer));
        assert_eq!(h.store.client_links.get(*spectator), Some(&ClientLink { client: 3 }));
        assert!(h.store.client_links.get(victim).is_none());
    }

    #[test]
    fn test_suicide_has_no_killer() {
        let mut h = Harness::new();
        let victim = h.player(Vec2::ZERO);
        h.store.healths.get_mut(victim).unwrap().decrement(1000.0, victim);
        h.run(run, 0.1);
        assert!(matches!(
            h.events.as_slice(),
            [GameEvent::PlayerDied { killer: None, .. }]
        ));
    }

    #[test]
    #[should_panic(expected = "only player deaths are handled")]
    fn test_non_player_death_is_fatal() {
        let mut h = Harness::new();
        let rock = h
            .store
            .create_static_prop(&mut h.physics, crate::game::world::PropKind::Rock, Vec2::ZERO)
            .unwrap();
        let mut health = crate::game::components::Health::new(10.0);
        health.current = 0.0;
        h.store.healths.insert(rock, health);
        h.run(run, 0.1);
    }
}
