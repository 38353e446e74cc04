//! Per-client interest management and delta replication
//!
//! Each tick every client gets the difference between what its camera saw
//! last tick and what it sees now:
//! - entities entering the view get a full create record
//! - moving entities still in view get an update, static ones never do
//! - entities leaving the view get a remove
//! - projectiles are announced once with their trajectory and destroyed
//!   when they leave the view or stop existing
//!
//! Output order is fixed and visible sets are walked in wire id order, so
//! the same world state always produces the same bytes.

use rustc_hash::{FxHashMap, FxHashSet};

use super::protocol::{
    EntityCreateRecord, EntityUpdateRecord, ProjectileSpawnRecord, ServerPacket,
};
use super::session::ClientSession;
use crate::game::entity::Entity;
use crate::game::physics::PhysicsEngine;
use crate::game::store::EntityStore;
use crate::game::world::WorldGenerator;
use crate::util::aabb::Aabb;

/// World state replication reads from; owner status flags are cleared
pub struct ReplicationView<'a> {
    pub store: &'a mut EntityStore,
    pub physics: &'a dyn PhysicsEngine,
    pub world: &'a dyn WorldGenerator,
    pub tick: u64,
}

/// Record counts for one client and tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub projectiles_spawned: usize,
    pub projectiles_destroyed: usize,
}

impl std::ops::AddAssign for ReplicationStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
        self.projectiles_spawned += other.projectiles_spawned;
        self.projectiles_destroyed += other.projectiles_destroyed;
    }
}

/// Camera-centered query box for the entity a client controls
pub fn view_bounds(store: &EntityStore, viewer: Entity) -> Option<Aabb> {
    let camera = store.cameras.get(viewer)?;
    Some(Aabb::from_center(
        camera.last_position,
        camera.width,
        camera.height,
    ))
}

/// Reusable scratch space; one encoder serves every client in turn
#[derive(Debug, Default)]
pub struct ReplicationEncoder {
    visible: Vec<Entity>,
    projectiles: Vec<(Entity, u64)>,
}

impl ReplicationEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append this tick's records to the session's buffer
    pub fn encode(
        &mut self,
        session: &mut ClientSession,
        view: &mut ReplicationView<'_>,
    ) -> ReplicationStats {
        let mut stats = ReplicationStats::default();
        let Some(bounds) = view_bounds(view.store, session.entity) else {
            return stats;
        };

        self.collect(view, &bounds);
        encode_meshes(session, view.world, &bounds);
        self.encode_entities(session, view, &mut stats);
        self.encode_projectiles(session, view, &mut stats);
        self.encode_states(session, view.store);
        encode_owner_status(session, view.store);
        stats
    }

    fn collect(&mut self, view: &ReplicationView<'_>, bounds: &Aabb) {
        self.visible.clear();
        self.projectiles.clear();
        let store = &*view.store;

        for hit in view.physics.query_aabb(bounds) {
            let entity = hit.entity;
            if !store.is_alive(entity) || store.removal.contains(entity) {
                continue;
            }
            // The broadphase is coarse; the body center decides
            match store.position_of(view.physics, entity) {
                Some(position) if bounds.contains_point(position) => {}
                _ => continue,
            }
            if store.networked.contains(entity) {
                self.visible.push(entity);
            } else if let Some(projectile) = store.projectiles.get(entity).filter(|p| p.active) {
                self.projectiles.push((entity, projectile.spawn_tick));
            }
        }

        self.visible.sort_unstable_by_key(|e| e.to_wire());
        self.visible.dedup();
        self.projectiles.sort_unstable_by_key(|(e, _)| e.to_wire());
        self.projectiles.dedup();
    }

    fn encode_entities(
        &self,
        session: &mut ClientSession,
        view: &ReplicationView<'_>,
        stats: &mut ReplicationStats,
    ) {
        let store = &*view.store;
        let mut created = Vec::new();
        let mut updated = Vec::new();

        for &entity in &self.visible {
            let Some(base) = store.bases.get(entity) else {
                continue;
            };
            let Some(body) = base.body else {
                continue;
            };
            let position = view.physics.position(body);
            let rot_sin = view.physics.rotation(body).sin();

            if !session.previous_visible.contains(&entity) {
                created.push(EntityCreateRecord {
                    id: entity.to_wire(),
                    kind: base.kind as u8,
                    variant: base.variant,
                    position,
                    rot_sin,
                });
            } else if store.dynamic.contains(entity) {
                updated.push(EntityUpdateRecord {
                    id: entity.to_wire(),
                    position,
                    rot_sin,
                });
            }
        }

        let current: FxHashSet<Entity> = self.visible.iter().copied().collect();
        let mut removed: Vec<u32> = session
            .previous_visible
            .iter()
            .filter(|e| !current.contains(*e))
            .map(|e| e.to_wire())
            .collect();
        removed.sort_unstable();

        stats.created = created.len();
        stats.updated = updated.len();
        stats.removed = removed.len();

        if !created.is_empty() {
            session.push(&ServerPacket::EntityCreate(created));
        }
        if !updated.is_empty() {
            session.push(&ServerPacket::EntityUpdate(updated));
        }
        if !removed.is_empty() {
            session.push(&ServerPacket::EntityRemove(removed));
        }
        session.previous_visible = current;
    }

    fn encode_projectiles(
        &self,
        session: &mut ClientSession,
        view: &ReplicationView<'_>,
        stats: &mut ReplicationStats,
    ) {
        let current: FxHashMap<Entity, u64> = self.projectiles.iter().copied().collect();

        // A pooled entity reused for a new shot shows up with a new spawn tick
        let mut destroyed: Vec<u32> = session
            .previous_projectiles
            .iter()
            .filter(|(entity, tick)| current.get(*entity) != Some(*tick))
            .map(|(entity, _)| entity.to_wire())
            .collect();
        destroyed.sort_unstable();

        let spawns: Vec<ProjectileSpawnRecord> = self
            .projectiles
            .iter()
            .filter(|(entity, tick)| session.previous_projectiles.get(entity) != Some(tick))
            .filter_map(|&(entity, _)| {
                let p = view.store.projectiles.get(entity)?;
                Some(ProjectileSpawnRecord {
                    id: entity.to_wire(),
                    origin: p.origin,
                    direction: p.direction,
                    speed: p.speed,
                    spawn_tick: p.spawn_tick,
                })
            })
            .collect();

        stats.projectiles_destroyed = destroyed.len();
        stats.projectiles_spawned = spawns.len();

        for id in destroyed {
            session.push(&ServerPacket::ProjectileDestroy { id });
        }
        if !spawns.is_empty() {
            session.push(&ServerPacket::ProjectileSpawnBatch {
                tick: view.tick,
                spawns,
            });
        }
        session.previous_projectiles = current;
    }

    fn encode_states(&self, session: &mut ClientSession, store: &EntityStore) {
        for &entity in &self.visible {
            if let Some(state) = store.states.get(entity).filter(|s| !s.is_idle()) {
                session.push(&ServerPacket::EntityState {
                    id: entity.to_wire(),
                    flags: state.bits(),
                });
            }
        }
    }
}

/// Terrain is sent the first time it enters the view, never removed
fn encode_meshes(session: &mut ClientSession, world: &dyn WorldGenerator, bounds: &Aabb) {
    for (index, mesh) in world.terrain_meshes().iter().enumerate() {
        if session.previous_meshes.contains(&index) {
            continue;
        }
        if !mesh.bounds().is_some_and(|b| b.overlaps(bounds)) {
            continue;
        }
        session.previous_meshes.insert(index);
        session.push(&ServerPacket::BiomeCreate {
            mesh_index: index as u32,
            biome: mesh.biome as u8,
            vertices: mesh.vertices.clone(),
            indices: mesh.indices.clone(),
        });
    }
}

/// Health and loadout of the controlled entity, only when changed
fn encode_owner_status(session: &mut ClientSession, store: &mut EntityStore) {
    let entity = session.entity;

    if let Some(health) = store.healths.get_mut(entity).filter(|h| h.dirty) {
        health.dirty = false;
        session.push(&ServerPacket::Health {
            normalized: health.normalized(),
        });
    }

    if let Some(inventory) = store.inventories.get_mut(entity).filter(|i| i.dirty) {
        inventory.dirty = false;
        session.push(&ServerPacket::InventoryUpdate {
            active_slot: inventory.active_slot as u8,
            items: inventory.item_types().iter().map(|&t| t as u8).collect(),
        });
        let (in_mag, magazine_size, reserve) = match inventory.active_gun() {
            Some(gun) => (
                gun.ammo_in_mag,
                gun.magazine_size,
                inventory.reserve[gun.ammo_type.index()],
            ),
            None => (0, 0, 0),
        };
        session.push(&ServerPacket::AmmoUpdate {
            in_mag: in_mag.min(u32::from(u16::MAX)) as u16,
            magazine_size: magazine_size.min(u32::from(u16::MAX)) as u16,
            reserve,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::components::{EntityType, State};
    use crate::game::physics::KinematicPhysics;
    use crate::game::pool::ProjectilePool;
    use crate::game::weapons::{GameConfig, GunFactory};
    use crate::game::world::{IslandWorld, PropKind};
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct Fixture {
        store: EntityStore,
        physics: KinematicPhysics,
        world: IslandWorld,
        pool: ProjectilePool,
        encoder: ReplicationEncoder,
        tick: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = EntityStore::new();
            let mut physics = KinematicPhysics::new();
            let mut pool = ProjectilePool::new();
            pool.init(&mut store, &mut physics, 4).unwrap();
            Self {
                store,
                physics,
                world: IslandWorld::new(1024, 3),
                pool,
                encoder: ReplicationEncoder::new(),
                tick: 1,
            }
        }

        fn player(&mut self, position: Vec2) -> Entity {
            let config = GameConfig::default();
            let guns = GunFactory::new(&config);
            self.store
                .create_player(&mut self.physics, &guns, position)
                .unwrap()
        }

        fn look_at(&mut self, viewer: Entity, position: Vec2) {
            self.store.cameras.get_mut(viewer).unwrap().last_position = position;
        }

        fn encode(&mut self, session: &mut ClientSession) -> (ReplicationStats, Vec<ServerPacket>) {
            let mut view = ReplicationView {
                store: &mut self.store,
                physics: &self.physics,
                world: &self.world,
                tick: self.tick,
            };
            let stats = self.encoder.encode(session, &mut view);
            self.tick += 1;
            let packets = ServerPacket::decode_all(&session.take_output()).unwrap();
            (stats, packets)
        }
    }

    fn entity_packets(packets: &[ServerPacket]) -> Vec<&ServerPacket> {
        packets
            .iter()
            .filter(|p| {
                matches!(
                    p,
                    ServerPacket::EntityCreate(_)
                        | ServerPacket::EntityUpdate(_)
                        | ServerPacket::EntityRemove(_)
                )
            })
            .collect()
    }

    #[test]
    fn test_create_update_remove_cycle() {
        let mut f = Fixture::new();
        let viewer = f.player(Vec2::new(500.0, 500.0));
        let crate_near = f
            .store
            .create_static_prop(&mut f.physics, PropKind::Crate, Vec2::new(600.0, 500.0))
            .unwrap();
        f.store
            .create_static_prop(&mut f.physics, PropKind::Rock, Vec2::new(5000.0, 5000.0))
            .unwrap();
        f.look_at(viewer, Vec2::new(500.0, 500.0));
        let mut session = ClientSession::new(1, viewer);

        let (stats, packets) = f.encode(&mut session);
        assert_eq!((stats.created, stats.updated, stats.removed), (2, 0, 0));
        let created: Vec<u32> = match entity_packets(&packets).as_slice() {
            [ServerPacket::EntityCreate(records)] => records.iter().map(|r| r.id).collect(),
            other => panic!("unexpected {:?}", other),
        };
        let mut expected = vec![viewer.to_wire(), crate_near.to_wire()];
        expected.sort_unstable();
        assert_eq!(created, expected);

        // Only the moving player gets an update
        let (stats, packets) = f.encode(&mut session);
        assert_eq!((stats.created, stats.updated, stats.removed), (0, 1, 0));
        match entity_packets(&packets).as_slice() {
            [ServerPacket::EntityUpdate(records)] => assert_eq!(records[0].id, viewer.to_wire()),
            other => panic!("unexpected {:?}", other),
        }

        // Camera moves away from the crate
        f.look_at(viewer, Vec2::new(-3000.0, -3000.0));
        let (stats, packets) = f.encode(&mut session);
        assert_eq!(stats.removed, 2);
        assert!(matches!(
            entity_packets(&packets).as_slice(),
            [ServerPacket::EntityRemove(ids)] if ids.len() == 2
        ));
        assert!(session.previous_visible.is_empty());
    }

    #[test]
    fn test_visible_set_algebra_holds_every_tick() {
        let mut f = Fixture::new();
        let viewer = f.player(Vec2::new(512.0, 512.0));
        let mut rng = StdRng::seed_from_u64(9);
        let walkers: Vec<Entity> = (0..12)
            .map(|_| f.player(Vec2::new(rng.gen_range(-1500.0..2500.0), rng.gen_range(-1500.0..2500.0))))
            .collect();
        f.look_at(viewer, Vec2::new(512.0, 512.0));
        let mut session = ClientSession::new(1, viewer);

        for _ in 0..30 {
            for &w in &walkers {
                let body = f.store.bases.get(w).unwrap().body.unwrap();
                let to = Vec2::new(rng.gen_range(-1500.0..2500.0), rng.gen_range(-1500.0..2500.0));
                f.physics.set_transform(body, to, 0.0);
            }
            let before = session.previous_visible.clone();
            let (_, packets) = f.encode(&mut session);

            let mut expected = before.clone();
            for packet in &packets {
                match packet {
                    ServerPacket::EntityCreate(records) => {
                        for r in records {
                            assert!(!before.iter().any(|e| e.to_wire() == r.id));
                            expected.insert(*f.store.bases.entities().iter().find(|e| e.to_wire() == r.id).unwrap());
                        }
                    }
                    ServerPacket::EntityRemove(ids) => {
                        for id in ids {
                            expected.retain(|e| e.to_wire() != *id);
                        }
                    }
                    _ => {}
                }
            }
            assert_eq!(expected, session.previous_visible);
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let run = || {
            let mut f = Fixture::new();
            let viewer = f.player(Vec2::new(400.0, 400.0));
            for i in 0..20 {
                let x = (i * 97 % 900) as f32;
                let y = (i * 53 % 700) as f32;
                if i % 3 == 0 {
                    f.store
                        .create_static_prop(&mut f.physics, PropKind::Tree, Vec2::new(x, y))
                        .unwrap();
                } else {
                    f.player(Vec2::new(x, y));
                }
            }
            f.look_at(viewer, Vec2::new(400.0, 400.0));
            let mut session = ClientSession::new(1, viewer);
            let mut view = ReplicationView {
                store: &mut f.store,
                physics: &f.physics,
                world: &f.world,
                tick: 5,
            };
            f.encoder.encode(&mut session, &mut view);
            session.take_output()
        };
        let first = run();
        assert!(!first.is_empty());
        assert_eq!(first, run());
    }

    #[test]
    fn test_projectile_spawn_then_destroy_on_release() {
        let mut f = Fixture::new();
        let viewer = f.player(Vec2::new(500.0, 500.0));
        f.look_at(viewer, Vec2::new(500.0, 500.0));
        let mut session = ClientSession::new(1, viewer);
        f.encode(&mut session);

        let bullet = f.pool.acquire(&mut f.store).unwrap();
        {
            let p = f.store.projectiles.get_mut(bullet).unwrap();
            p.origin = Vec2::new(520.0, 500.0);
            p.direction = Vec2::RIGHT;
            p.speed = 1280.0;
            p.spawn_tick = 7;
            p.remaining_life = 0.016;
        }
        let body = f.store.bases.get(bullet).unwrap().body.unwrap();
        f.physics.set_transform(body, Vec2::new(520.0, 500.0), 0.0);
        f.physics.enable(body);

        let (stats, packets) = f.encode(&mut session);
        assert_eq!(stats.projectiles_spawned, 1);
        let spawn = packets.iter().find_map(|p| match p {
            ServerPacket::ProjectileSpawnBatch { spawns, .. } => Some(spawns.clone()),
            _ => None,
        });
        let spawns = spawn.expect("spawn batch");
        assert_eq!(spawns[0].id, bullet.to_wire());
        assert_eq!(spawns[0].spawn_tick, 7);
        assert_eq!(spawns[0].direction, Vec2::RIGHT);
        // Projectiles never go through entity records
        assert!(entity_packets(&packets)
            .iter()
            .all(|p| !matches!(p, ServerPacket::EntityCreate(_))));

        // Still in flight: nothing new
        let (stats, _) = f.encode(&mut session);
        assert_eq!((stats.projectiles_spawned, stats.projectiles_destroyed), (0, 0));

        f.pool.release(&mut f.store, &mut f.physics, bullet).unwrap();
        let (stats, packets) = f.encode(&mut session);
        assert_eq!(stats.projectiles_destroyed, 1);
        assert!(packets.contains(&ServerPacket::ProjectileDestroy {
            id: bullet.to_wire()
        }));
        assert!(session.previous_projectiles.is_empty());
    }

    #[test]
    fn test_reused_projectile_is_destroyed_and_respawned() {
        let mut f = Fixture::new();
        let viewer = f.player(Vec2::new(500.0, 500.0));
        f.look_at(viewer, Vec2::new(500.0, 500.0));
        let mut session = ClientSession::new(1, viewer);

        let bullet = f.pool.acquire(&mut f.store).unwrap();
        let body = f.store.bases.get(bullet).unwrap().body.unwrap();
        f.physics.set_transform(body, Vec2::new(510.0, 500.0), 0.0);
        f.physics.enable(body);
        f.store.projectiles.get_mut(bullet).unwrap().spawn_tick = 1;
        f.encode(&mut session);

        f.store.projectiles.get_mut(bullet).unwrap().spawn_tick = 3;
        let (stats, packets) = f.encode(&mut session);
        assert_eq!((stats.projectiles_destroyed, stats.projectiles_spawned), (1, 1));
        let destroy_at = packets
            .iter()
            .position(|p| matches!(p, ServerPacket::ProjectileDestroy { .. }))
            .unwrap();
        let spawn_at = packets
            .iter()
            .position(|p| matches!(p, ServerPacket::ProjectileSpawnBatch { .. }))
            .unwrap();
        assert!(destroy_at < spawn_at);
    }

    #[test]
    fn test_states_health_and_inventory() {
        let mut f = Fixture::new();
        let viewer = f.player(Vec2::new(500.0, 500.0));
        let other = f.player(Vec2::new(550.0, 500.0));
        f.look_at(viewer, Vec2::new(500.0, 500.0));
        let mut session = ClientSession::new(1, viewer);

        f.store.states.get_mut(other).unwrap().insert(State::HURT);
        f.store.healths.get_mut(viewer).unwrap().decrement(25.0, other);
        let (_, packets) = f.encode(&mut session);

        assert!(packets.contains(&ServerPacket::EntityState {
            id: other.to_wire(),
            flags: State::HURT.bits(),
        }));
        assert!(packets.contains(&ServerPacket::Health { normalized: 0.75 }));
        assert!(packets.contains(&ServerPacket::InventoryUpdate {
            active_slot: 0,
            items: vec![0, 1, 2],
        }));
        assert!(packets.contains(&ServerPacket::AmmoUpdate {
            in_mag: 0,
            magazine_size: 0,
            reserve: 0,
        }));

        // Flags cleared: nothing about health or inventory on the next tick
        let (_, packets) = f.encode(&mut session);
        assert!(!packets.iter().any(|p| matches!(
            p,
            ServerPacket::Health { .. } | ServerPacket::InventoryUpdate { .. }
        )));
        // The state was never reset here, so it is still broadcast
        assert!(packets.iter().any(|p| matches!(p, ServerPacket::EntityState { .. })));
    }

    #[test]
    fn test_terrain_meshes_sent_once() {
        let mut f = Fixture::new();
        let viewer = f.player(Vec2::new(512.0, 512.0));
        f.look_at(viewer, Vec2::new(512.0, 512.0));
        let mut session = ClientSession::new(1, viewer);

        let (_, packets) = f.encode(&mut session);
        let meshes = packets
            .iter()
            .filter(|p| matches!(p, ServerPacket::BiomeCreate { .. }))
            .count();
        assert_eq!(meshes, f.world.terrain_meshes().len());

        let (_, packets) = f.encode(&mut session);
        assert!(!packets
            .iter()
            .any(|p| matches!(p, ServerPacket::BiomeCreate { .. })));
    }

    #[test]
    fn test_spectator_without_body_still_sees() {
        let mut f = Fixture::new();
        let target = f.player(Vec2::new(100.0, 100.0));
        let spectator = f.store.create_spectator(&f.physics, Some(target)).unwrap();
        let mut session = ClientSession::new(1, spectator);

        let (stats, packets) = f.encode(&mut session);
        assert_eq!(stats.created, 1);
        assert!(matches!(
            entity_packets(&packets).as_slice(),
            [ServerPacket::EntityCreate(r)] if r[0].kind == EntityType::Player as u8
        ));
    }
}
