//! Fixed-capacity projectile pool
//!
//! All projectile entities are created up front with disabled bodies.
//! Firing flips one on, expiry or impact flips it back off; nothing is
//! created or destroyed while the match runs.

use super::entity::{Entity, EntityError};
use super::physics::PhysicsEngine;
use super::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("No projectile available ({capacity} in flight)")]
    Exhausted { capacity: usize },
    #[error("Projectile {0} is not checked out of the pool")]
    NotInUse(Entity),
}

#[derive(Debug, Default)]
pub struct ProjectilePool {
    free: Vec<Entity>,
    capacity: usize,
}

impl ProjectilePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create `count` disabled projectile entities
    pub fn init(
        &mut self,
        store: &mut EntityStore,
        physics: &mut dyn PhysicsEngine,
        count: usize,
    ) -> Result<(), EntityError> {
        self.free.reserve(count);
        for _ in 0..count {
            let entity = store.create_projectile(physics)?;
            self.free.push(entity);
            self.capacity += 1;
        }
        // Pop order matches creation order
        self.free.reverse();
        Ok(())
    }

    /// Check a projectile out and mark it active
    pub fn acquire(&mut self, store: &mut EntityStore) -> Result<Entity, PoolError> {
        let entity = self.free.pop().ok_or(PoolError::Exhausted {
            capacity: self.capacity,
        })?;
        if let Some(projectile) = store.projectiles.get_mut(entity) {
            projectile.active = true;
        }
        Ok(entity)
    }

    /// Disable the body, clear `active` and return the handle
    pub fn release(
        &mut self,
        store: &mut EntityStore,
        physics: &mut dyn PhysicsEngine,
        entity: Entity,
    ) -> Result<(), PoolError> {
        let projectile = store
            .projectiles
            .get_mut(entity)
            .filter(|p| p.active)
            .ok_or(PoolError::NotInUse(entity))?;
        projectile.active = false;
        projectile.owner = None;
        if let Some(body) = store.bases.get(entity).and_then(|b| b.body) {
            physics.disable(body);
        }
        self.free.push(entity);
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.free.len()
    }
}
