//! Generational entity handles
//!
//! An [`Entity`] is an index into component storage plus a generation
//! counter. Destroying an entity bumps the generation of its slot, so any
//! handle still pointing at the old occupant fails validation instead of
//! silently reaching the new one.

/// Bits of the wire id reserved for the slot index
const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
/// Generation bits that fit in the wire id alongside the index
const WIRE_GENERATION_MASK: u32 = (1 << (32 - INDEX_BITS)) - 1;

/// Maximum number of simultaneously live entities
pub const MAX_ENTITIES: usize = 1 << INDEX_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// 32-bit id sent to clients: 12 generation bits above a 20-bit index
    #[inline]
    pub const fn to_wire(self) -> u32 {
        ((self.generation & WIRE_GENERATION_MASK) << INDEX_BITS) | (self.index & INDEX_MASK)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Handle validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    #[error("Entity {0} is stale or was never allocated")]
    Stale(Entity),
    #[error("Entity capacity of {MAX_ENTITIES} exhausted")]
    CapacityExhausted,
}

/// Slot allocator with generation tracking and index recycling
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Current generation of every slot ever handed out
    generations: Vec<u32>,
    /// Liveness per slot
    alive: Vec<bool>,
    /// Recycled slots, reused LIFO
    free: Vec<u32>,
    live_count: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Result<Entity, EntityError> {
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            self.live_count += 1;
            return Ok(Entity::new(index, self.generations[slot]));
        }

        if self.generations.len() >= MAX_ENTITIES {
            return Err(EntityError::CapacityExhausted);
        }

        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        self.live_count += 1;
        Ok(Entity::new(index, 0))
    }

    /// Free the slot and advance its generation
    pub fn free(&mut self, entity: Entity) -> Result<(), EntityError> {
        if !self.is_alive(entity) {
            return Err(EntityError::Stale(entity));
        }
        let slot = entity.index() as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(entity.index());
        self.live_count -= 1;
        Ok(())
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index() as usize;
        slot < self.generations.len()
            && self.alive[slot]
            && self.generations[slot] == entity.generation()
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        assert_eq!(a, Entity::new(0, 0));
        assert_eq!(b, Entity::new(1, 0));
        assert_eq!(alloc.live_count(), 2);
    }

    #[test]
    fn test_reuse_bumps_generation() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate().unwrap();
        alloc.free(a).unwrap();
        assert!(!alloc.is_alive(a));

        let b = alloc.allocate().unwrap();
        assert_eq!(b.index(), a.index());
        assert_eq!(b.generation(), 1);
        assert!(alloc.is_alive(b));
        assert!(!alloc.is_alive(a));
        assert_ne!(a.to_wire(), b.to_wire());
    }

    #[test]
    fn test_double_free_is_stale() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate().unwrap();
        alloc.free(a).unwrap();
        assert_eq!(alloc.free(a), Err(EntityError::Stale(a)));
        assert_eq!(alloc.live_count(), 0);
    }

    #[test]
    fn test_unknown_handle_not_alive() {
        let alloc = EntityAllocator::new();
        assert!(!alloc.is_alive(Entity::new(5, 0)));
    }

    #[test]
    fn test_wire_id_layout() {
        let e = Entity::new(3, 2);
        assert_eq!(e.to_wire(), (2 << 20) | 3);
        assert_eq!(Entity::new(7, 0).to_wire(), 7);
    }
}
