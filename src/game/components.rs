//! Component types attached to entities
//!
//! Components are plain data. Behaviour lives in the systems; the only
//! logic here is the small state machines that keep their own invariants
//! (cooldowns, health clamping, magazine bookkeeping).

use super::constants::{camera, weapons::INVENTORY_SLOTS};
use super::entity::Entity;
use super::physics::BodyHandle;
use super::weapons::{AmmoType, FireMode, ItemType};
use crate::net::bridge::ClientId;
use crate::util::vec2::Vec2;

/// Wire-visible kind of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityType {
    Spectator = 0,
    Player = 1,
    Crate = 2,
    Hitbox = 3,
    Rock = 4,
    Tree = 5,
    Projectile = 6,
}

/// Present on every simulated object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityBase {
    pub kind: EntityType,
    pub variant: u8,
    pub body: Option<BodyHandle>,
}

/// Per-tick control state written by the owning client
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Input {
    /// Movement bitmask, see `constants::direction`
    pub direction: u8,
    /// Aim angle in radians
    pub angle: f32,
    pub mouse_down: bool,
    /// Set by a click since the last tick, consumed at the end of the tick
    pub dirty_click: bool,
    pub switch_slot: Option<u8>,
    pub reload_requested: bool,
}

impl Input {
    /// Clear edge-triggered flags once every system has seen them
    pub fn consume_edges(&mut self) {
        self.dirty_click = false;
        self.switch_slot = None;
        self.reload_requested = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackCooldown {
    pub duration: f32,
    pub current: f32,
}

impl AttackCooldown {
    /// Starts elapsed, so the first attack is immediate
    pub fn new(duration: f32) -> Self {
        Self {
            duration,
            current: 0.0,
        }
    }

    /// Count down; true only on the update that crosses zero
    pub fn update(&mut self, delta: f32) -> bool {
        if self.current <= 0.0 {
            return false;
        }
        self.current -= delta;
        self.current <= 0.0
    }

    pub fn reset(&mut self) {
        self.current = self.duration;
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.current <= 0.0
    }
}

/// Animation state bitflags, cleared every tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct State(u8);

impl State {
    pub const IDLE: State = State(0);
    pub const MELEE: State = State(1);
    pub const HURT: State = State(1 << 1);
    pub const SHOOTING: State = State(1 << 2);

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn insert(&mut self, flag: State) {
        self.0 |= flag.0;
    }

    #[inline]
    pub fn contains(self, flag: State) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline]
    pub fn is_idle(self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub max: f32,
    pub current: f32,
    pub dirty: bool,
    pub last_attacker: Option<Entity>,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self {
            max,
            current: max,
            dirty: true,
            last_attacker: None,
        }
    }

    /// Apply damage, clamping at zero
    pub fn decrement(&mut self, amount: f32, attacker: Entity) {
        self.current = (self.current - amount).max(0.0);
        self.dirty = true;
        self.last_attacker = Some(attacker);
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }

    /// Fraction of max health in `[0, 1]`
    pub fn normalized(&self) -> f32 {
        if self.max > 0.0 {
            (self.current / self.max).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub target: Option<Entity>,
    pub last_position: Vec2,
    pub width: f32,
    pub height: f32,
}

impl Camera {
    pub fn following(target: Option<Entity>) -> Self {
        Self {
            target,
            last_position: Vec2::ZERO,
            width: camera::VIEW_WIDTH,
            height: camera::VIEW_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReloadState {
    Idle,
    Reloading { remaining: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gun {
    pub item_type: ItemType,
    pub fire_mode: FireMode,
    pub ammo_type: AmmoType,
    pub magazine_size: u32,
    pub ammo_in_mag: u32,
    pub ammo_per_shot: u32,
    /// Per-shot gate derived from the fire rate
    pub fire_cooldown: AttackCooldown,
    pub reload_time: f32,
    pub reload: ReloadState,
    pub damage: f32,
    /// Pixels
    pub range: f32,
    /// Radians either side of the aim angle
    pub spread: f32,
    pub pellets: u32,
    /// Pixels from the body center to the muzzle
    pub barrel_length: f32,
    /// Pixels per second
    pub projectile_speed: f32,
    /// Seconds
    pub projectile_lifetime: f32,
    pub automatic: bool,
}

impl Gun {
    #[inline]
    pub fn is_reloading(&self) -> bool {
        matches!(self.reload, ReloadState::Reloading { .. })
    }

    /// Idle -> Reloading when the magazine has room and reserve is available
    pub fn try_start_reload(&mut self, reserve: u32) -> bool {
        if self.is_reloading() || self.ammo_in_mag >= self.magazine_size || reserve == 0 {
            return false;
        }
        self.reload = ReloadState::Reloading {
            remaining: self.reload_time,
        };
        true
    }

    /// Advance a reload; on expiry refill from `reserve` and return to Idle.
    /// Returns true on the tick the magazine is refilled.
    pub fn advance_reload(&mut self, delta: f32, reserve: &mut u32) -> bool {
        let ReloadState::Reloading { remaining } = &mut self.reload else {
            return false;
        };
        *remaining -= delta;
        if *remaining > 0.0 {
            return false;
        }
        let moved = (self.magazine_size - self.ammo_in_mag).min(*reserve);
        self.ammo_in_mag += moved;
        *reserve -= moved;
        self.reload = ReloadState::Idle;
        true
    }

    pub fn cancel_reload(&mut self) {
        self.reload = ReloadState::Idle;
    }

    /// Firing needs Idle, an elapsed shot cooldown and a full shot's worth of ammo
    pub fn can_fire(&self) -> bool {
        !self.is_reloading()
            && self.fire_cooldown.is_ready()
            && self.ammo_per_shot > 0
            && self.ammo_in_mag >= self.ammo_per_shot
    }

    /// Spend one shot and arm the fire-rate cooldown
    pub fn consume_shot(&mut self) {
        self.ammo_in_mag -= self.ammo_per_shot;
        self.fire_cooldown.reset();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    pub slots: [Option<Gun>; INVENTORY_SLOTS],
    pub active_slot: usize,
    /// Reserve ammo per `AmmoType`
    pub reserve: [u32; AmmoType::COUNT],
    /// Set when slots, selection or ammo counts change
    pub dirty: bool,
}

impl Inventory {
    pub fn empty() -> Self {
        Self {
            slots: Default::default(),
            active_slot: 0,
            reserve: [0; AmmoType::COUNT],
            dirty: true,
        }
    }

    pub fn active_gun(&self) -> Option<&Gun> {
        self.slots[self.active_slot].as_ref()
    }

    pub fn has_gun_in_hand(&self) -> bool {
        self.active_gun().is_some()
    }

    /// Select a slot, cancelling any reload of the gun being put away
    pub fn switch_to(&mut self, slot: usize) -> bool {
        if slot >= INVENTORY_SLOTS || slot == self.active_slot {
            return false;
        }
        if let Some(gun) = self.slots[self.active_slot].as_mut() {
            gun.cancel_reload();
        }
        self.active_slot = slot;
        self.dirty = true;
        true
    }

    /// Item kind in every slot, in slot order
    pub fn item_types(&self) -> [ItemType; INVENTORY_SLOTS] {
        std::array::from_fn(|i| {
            self.slots[i]
                .as_ref()
                .map_or(ItemType::None, |gun| gun.item_type)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub owner: Option<Entity>,
    pub origin: Vec2,
    /// Unit vector
    pub direction: Vec2,
    /// Pixels per second
    pub speed: f32,
    pub spawn_tick: u64,
    /// Seconds left before expiry
    pub remaining_life: f32,
    pub damage: f32,
    pub active: bool,
}

impl Projectile {
    pub fn inactive() -> Self {
        Self {
            owner: None,
            origin: Vec2::ZERO,
            direction: Vec2::ZERO,
            speed: 0.0,
            spawn_tick: 0,
            remaining_life: 0.0,
            damage: 0.0,
            active: false,
        }
    }
}

/// Back-reference from a controlled entity to its client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientLink {
    pub client: ClientId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::weapons::{GameConfig, GunFactory};

    #[test]
    fn test_cooldown_fires_once_on_crossing() {
        let mut cd = AttackCooldown::new(0.3);
        assert!(cd.is_ready());
        assert!(!cd.update(0.1));

        cd.reset();
        assert!(!cd.is_ready());
        assert!(!cd.update(0.1));
        assert!(!cd.update(0.1));
        assert!(cd.update(0.15));
        assert!(cd.is_ready());
        assert!(!cd.update(0.1));
    }

    #[test]
    fn test_state_flags() {
        let mut state = State::IDLE;
        assert!(state.is_idle());
        state.insert(State::MELEE);
        state.insert(State::HURT);
        assert_eq!(state.bits(), 0b011);
        assert!(state.contains(State::HURT));
        assert!(!state.contains(State::SHOOTING));
        state.clear();
        assert!(state.is_idle());
    }

    #[test]
    fn test_health_clamps_and_marks_dirty() {
        let attacker = Entity::new(9, 0);
        let mut health = Health::new(100.0);
        health.dirty = false;

        health.decrement(30.0, attacker);
        assert!(health.dirty);
        assert_eq!(health.current, 70.0);
        assert_eq!(health.last_attacker, Some(attacker));
        assert!((health.normalized() - 0.7).abs() < 1e-6);

        health.decrement(500.0, attacker);
        assert_eq!(health.current, 0.0);
        assert!(health.is_dead());
        assert_eq!(health.normalized(), 0.0);
    }

    fn shotgun() -> Gun {
        GunFactory::new(&GameConfig::default()).shotgun()
    }

    #[test]
    fn test_reload_refills_from_reserve() {
        let mut gun = shotgun();
        gun.magazine_size = 6;
        gun.ammo_in_mag = 0;
        gun.reload_time = 1.0;
        let mut reserve = 10;

        assert!(gun.try_start_reload(reserve));
        assert!(!gun.can_fire());
        assert!(!gun.advance_reload(0.6, &mut reserve));
        assert!(gun.advance_reload(0.6, &mut reserve));
        assert_eq!(gun.ammo_in_mag, 6);
        assert_eq!(reserve, 4);
        assert_eq!(gun.reload, ReloadState::Idle);
    }

    #[test]
    fn test_reload_partial_reserve() {
        let mut gun = shotgun();
        gun.ammo_in_mag = 2;
        let mut reserve = 3;
        assert!(gun.try_start_reload(reserve));
        gun.advance_reload(gun.reload_time + 0.1, &mut reserve);
        assert_eq!(gun.ammo_in_mag, 5);
        assert_eq!(reserve, 0);
        assert!(gun.ammo_in_mag <= gun.magazine_size);
    }

    #[test]
    fn test_reload_preconditions() {
        let mut gun = shotgun();
        // Full magazine
        assert!(!gun.try_start_reload(10));
        // No reserve
        gun.ammo_in_mag = 0;
        assert!(!gun.try_start_reload(0));
        assert_eq!(gun.reload, ReloadState::Idle);
    }

    #[test]
    fn test_empty_gun_cannot_fire() {
        let mut gun = shotgun();
        gun.ammo_in_mag = 0;
        assert!(!gun.can_fire());
    }

    #[test]
    fn test_consume_shot_arms_cooldown() {
        let mut gun = shotgun();
        assert!(gun.can_fire());
        gun.consume_shot();
        assert_eq!(gun.ammo_in_mag, gun.magazine_size - 1);
        assert!(!gun.can_fire());
        gun.fire_cooldown.update(gun.fire_cooldown.duration);
        assert!(gun.can_fire());
    }

    #[test]
    fn test_switch_cancels_reload() {
        let mut inv = Inventory::empty();
        let mut gun = shotgun();
        gun.ammo_in_mag = 0;
        gun.try_start_reload(5);
        inv.slots[1] = Some(gun);
        inv.active_slot = 1;
        inv.dirty = false;

        assert!(inv.switch_to(0));
        assert!(inv.dirty);
        assert!(!inv.has_gun_in_hand());
        assert!(!inv.slots[1].as_ref().unwrap().is_reloading());
        assert!(!inv.switch_to(0));
        assert!(!inv.switch_to(INVENTORY_SLOTS));
        assert_eq!(inv.item_types(), [ItemType::None, ItemType::Shotgun, ItemType::None]);
    }
}
