//! Entity and component storage
//!
//! Every component type lives in its own [`ComponentSet`], a sparse set
//! keyed by entity index. Storages are public fields so systems can borrow
//! several of them mutably at once; joins are explicit lookups.
//!
//! Factories attach a complete component bundle in one call. Destruction is
//! deferred: `schedule_for_removal` tags the entity and `sweep_removals`
//! tears everything down once per tick.

use super::components::{
    AttackCooldown, Camera, ClientLink, EntityBase, EntityType, Health, Input, Inventory,
    Projectile, State,
};
use super::constants::{collision, melee, player, weapons};
use super::entity::{Entity, EntityAllocator, EntityError};
use super::physics::{BodyDef, BodyType, PhysicsEngine, Shape};
use super::weapons::{GunFactory, ItemType};
use super::world::PropKind;
use crate::util::vec2::Vec2;

const EMPTY: u32 = u32::MAX;

/// Sparse set: O(1) lookup by entity index, dense iteration
#[derive(Debug, Clone)]
pub struct ComponentSet<T> {
    sparse: Vec<u32>,
    entities: Vec<Entity>,
    values: Vec<T>,
}

/// Zero-data tag storage
pub type MarkerSet = ComponentSet<()>;

impl<T> Default for ComponentSet<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> ComponentSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn slot(&self, entity: Entity) -> Option<usize> {
        let slot = *self.sparse.get(entity.index() as usize)?;
        (slot != EMPTY && self.entities[slot as usize] == entity).then_some(slot as usize)
    }

    /// Attach or replace; returns the previous value
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(slot) = self.slot(entity) {
            return Some(std::mem::replace(&mut self.values[slot], value));
        }
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, EMPTY);
        }
        self.sparse[index] = self.entities.len() as u32;
        self.entities.push(entity);
        self.values.push(value);
        None
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot(entity)?;
        self.sparse[entity.index() as usize] = EMPTY;
        let last = self.entities.len() - 1;
        if slot != last {
            let moved = self.entities[last];
            self.sparse[moved.index() as usize] = slot as u32;
        }
        self.entities.swap_remove(slot);
        Some(self.values.swap_remove(slot))
    }

    #[inline]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity).map(|slot| &self.values[slot])
    }

    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot(entity).map(|slot| &mut self.values[slot])
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in dense order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entities.iter().copied().zip(self.values.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities.iter().copied().zip(self.values.iter_mut())
    }
}

impl MarkerSet {
    /// Tag an entity; true if it was not tagged before
    pub fn mark(&mut self, entity: Entity) -> bool {
        self.insert(entity, ()).is_none()
    }
}

/// Owner of every entity and component in the simulation
#[derive(Debug, Default)]
pub struct EntityStore {
    allocator: EntityAllocator,

    pub bases: ComponentSet<EntityBase>,
    pub inputs: ComponentSet<Input>,
    pub cooldowns: ComponentSet<AttackCooldown>,
    pub states: ComponentSet<State>,
    pub healths: ComponentSet<Health>,
    pub cameras: ComponentSet<Camera>,
    pub inventories: ComponentSet<Inventory>,
    pub projectiles: ComponentSet<Projectile>,
    pub client_links: ComponentSet<ClientLink>,

    /// Opted into entity replication
    pub networked: MarkerSet,
    /// Body moves; replicated with per-tick updates
    pub dynamic: MarkerSet,
    /// Destroyed by the next sweep
    pub removal: MarkerSet,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn live_count(&self) -> usize {
        self.allocator.live_count()
    }

    pub fn kind_of(&self, entity: Entity) -> Option<EntityType> {
        self.bases.get(entity).map(|base| base.kind)
    }

    /// Current body position, if the entity has a body
    pub fn position_of(&self, physics: &dyn PhysicsEngine, entity: Entity) -> Option<Vec2> {
        let body = self.bases.get(entity)?.body?;
        Some(physics.position(body))
    }

    /// Number of live entities of one kind
    pub fn count_kind(&self, kind: EntityType) -> usize {
        self.bases.iter().filter(|(_, base)| base.kind == kind).count()
    }

    /// Controllable player with a full loadout at `position`
    pub fn create_player(
        &mut self,
        physics: &mut dyn PhysicsEngine,
        guns: &GunFactory<'_>,
        position: Vec2,
    ) -> Result<Entity, EntityError> {
        let entity = self.allocator.allocate()?;
        let body = physics.create_body(BodyDef {
            owner: entity,
            body_type: BodyType::Dynamic,
            shape: Shape::Circle {
                radius: player::RADIUS,
            },
            position,
            rotation: 0.0,
            category: collision::PLAYER,
            mask: collision::PLAYER | collision::WALL | collision::COVER | collision::WATER | collision::BULLET,
            sensor: false,
            enabled: true,
        });

        let mut inventory = Inventory::empty();
        inventory.slots[1] = guns.make(ItemType::Pistol);
        inventory.slots[2] = guns.make(ItemType::Rifle);
        for gun in inventory.slots.iter().flatten() {
            let reserve = &mut inventory.reserve[gun.ammo_type.index()];
            *reserve = (*reserve).max(gun.magazine_size * weapons::STARTING_RESERVE_MAGAZINES);
        }

        self.bases.insert(
            entity,
            EntityBase {
                kind: EntityType::Player,
                variant: 0,
                body: Some(body),
            },
        );
        self.inputs.insert(entity, Input::default());
        self.cooldowns.insert(entity, AttackCooldown::new(melee::COOLDOWN));
        self.states.insert(entity, State::IDLE);
        self.healths.insert(entity, Health::new(player::MAX_HEALTH));
        self.cameras.insert(entity, Camera::following(Some(entity)));
        self.inventories.insert(entity, inventory);
        self.networked.mark(entity);
        self.dynamic.mark(entity);
        Ok(entity)
    }

    /// Bodiless camera holder; follows `followee` or whatever is worth watching
    pub fn create_spectator(
        &mut self,
        physics: &dyn PhysicsEngine,
        followee: Option<Entity>,
    ) -> Result<Entity, EntityError> {
        let target = followee
            .filter(|&e| self.is_alive(e))
            .or_else(|| self.follow_entity());
        let entity = self.allocator.allocate()?;
        let mut camera = Camera::following(target);
        if let Some(pos) = target.and_then(|t| self.position_of(physics, t)) {
            camera.last_position = pos;
        }
        self.bases.insert(
            entity,
            EntityBase {
                kind: EntityType::Spectator,
                variant: 0,
                body: None,
            },
        );
        self.cameras.insert(entity, camera);
        Ok(entity)
    }

    /// Lowest-index moving replicated entity with a body
    pub fn follow_entity(&self) -> Option<Entity> {
        self.dynamic
            .entities()
            .iter()
            .copied()
            .filter(|&e| {
                self.networked.contains(e)
                    && !self.removal.contains(e)
                    && self.bases.get(e).is_some_and(|b| b.body.is_some())
            })
            .min_by_key(|e| e.index())
    }

    pub fn create_static_prop(
        &mut self,
        physics: &mut dyn PhysicsEngine,
        kind: PropKind,
        position: Vec2,
    ) -> Result<Entity, EntityError> {
        let (entity_type, shape, category) = match kind {
            PropKind::Crate => (
                EntityType::Crate,
                Shape::Rect {
                    half_width: 20.0,
                    half_height: 20.0,
                },
                collision::COVER,
            ),
            PropKind::Rock => (EntityType::Rock, Shape::Circle { radius: 30.0 }, collision::WALL),
            PropKind::Tree => (EntityType::Tree, Shape::Circle { radius: 20.0 }, collision::WALL),
        };
        let entity = self.allocator.allocate()?;
        let body = physics.create_body(BodyDef {
            owner: entity,
            body_type: BodyType::Static,
            shape,
            position,
            rotation: 0.0,
            category,
            mask: collision::PLAYER | collision::BULLET,
            sensor: false,
            enabled: true,
        });
        self.bases.insert(
            entity,
            EntityBase {
                kind: entity_type,
                variant: 0,
                body: Some(body),
            },
        );
        self.networked.mark(entity);
        Ok(entity)
    }

    /// Disabled projectile for the pool; never replicated as an entity
    pub fn create_projectile(
        &mut self,
        physics: &mut dyn PhysicsEngine,
    ) -> Result<Entity, EntityError> {
        let entity = self.allocator.allocate()?;
        let body = physics.create_body(BodyDef {
            owner: entity,
            body_type: BodyType::Dynamic,
            shape: Shape::Circle {
                radius: weapons::PROJECTILE_RADIUS,
            },
            position: Vec2::ZERO,
            rotation: 0.0,
            category: collision::BULLET,
            mask: collision::PLAYER | collision::WALL | collision::COVER,
            sensor: true,
            enabled: false,
        });
        self.bases.insert(
            entity,
            EntityBase {
                kind: EntityType::Projectile,
                variant: 0,
                body: Some(body),
            },
        );
        self.projectiles.insert(entity, Projectile::inactive());
        Ok(entity)
    }

    /// Tag for destruction at the end of the tick; false if stale or already tagged
    pub fn schedule_for_removal(&mut self, entity: Entity) -> bool {
        self.is_alive(entity) && self.removal.mark(entity)
    }

    /// Destroy every tagged entity, its body and all of its components
    pub fn sweep_removals(&mut self, physics: &mut dyn PhysicsEngine) -> usize {
        let doomed: Vec<Entity> = self.removal.entities().to_vec();
        for &entity in &doomed {
            if let Some(body) = self.bases.remove(entity).and_then(|base| base.body) {
                physics.destroy_body(body);
            }
            self.inputs.remove(entity);
            self.cooldowns.remove(entity);
            self.states.remove(entity);
            self.healths.remove(entity);
            self.cameras.remove(entity);
            self.inventories.remove(entity);
            self.projectiles.remove(entity);
            self.client_links.remove(entity);
            self.networked.remove(entity);
            self.dynamic.remove(entity);
            self.removal.remove(entity);
            // Tagging only accepts live handles, so freeing cannot fail here
            let _ = self.allocator.free(entity);
        }
        doomed.len()
    }
}
