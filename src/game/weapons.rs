//! Weapon tuning loaded from JSON and the factory that turns it into guns
//!
//! ```json
//! { "weapons": { "pistol": { "fireMode": "hitscan", "ammoType": "light", ... },
//!                "rifle": { ... }, "shotgun": { ... } } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::components::{AttackCooldown, Gun, ReloadState};
use super::constants::world::PIXELS_PER_METER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FireMode {
    Hitscan = 0,
    Projectile = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmmoType {
    Light = 0,
    Heavy = 1,
    Shell = 2,
    Rocket = 3,
}

impl AmmoType {
    pub const COUNT: usize = 4;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Item kinds shown in the inventory bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ItemType {
    #[default]
    None = 0,
    Pistol = 1,
    Rifle = 2,
    Shotgun = 3,
}

/// Failures loading or validating the game config
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read game config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse game config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid {weapon} config: {reason}")]
    Invalid {
        weapon: &'static str,
        reason: &'static str,
    },
}

/// Tuning for one weapon, field names match the JSON keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponConfig {
    pub fire_mode: FireMode,
    pub ammo_type: AmmoType,
    pub magazine_size: u32,
    pub ammo_per_shot: u32,
    /// Shots per second
    pub fire_rate: f32,
    /// Seconds
    pub reload_time: f32,
    pub damage: f32,
    /// Pixels
    pub range: f32,
    /// Max jitter either side of the aim angle, radians
    pub spread: f32,
    pub pellets: u32,
    /// Meters
    pub barrel_length: f32,
    /// Meters per second
    pub projectile_speed: f32,
    /// Seconds
    pub projectile_lifetime: f32,
    pub automatic: bool,
}

impl WeaponConfig {
    fn validate(&self, weapon: &'static str) -> Result<(), ConfigError> {
        let invalid = |reason| Err(ConfigError::Invalid { weapon, reason });
        if self.magazine_size == 0 {
            return invalid("magazineSize must be at least 1");
        }
        if self.ammo_per_shot == 0 || self.ammo_per_shot > self.magazine_size {
            return invalid("ammoPerShot must be between 1 and magazineSize");
        }
        if !(self.fire_rate > 0.0) {
            return invalid("fireRate must be positive");
        }
        if self.reload_time < 0.0 {
            return invalid("reloadTime cannot be negative");
        }
        if self.pellets == 0 {
            return invalid("pellets must be at least 1");
        }
        if self.spread < 0.0 {
            return invalid("spread cannot be negative");
        }
        if !(self.range > 0.0) {
            return invalid("range must be positive");
        }
        if self.fire_mode == FireMode::Projectile
            && (!(self.projectile_speed > 0.0) || !(self.projectile_lifetime > 0.0))
        {
            return invalid("projectile weapons need positive projectileSpeed and projectileLifetime");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponSet {
    pub pistol: WeaponConfig,
    pub rifle: WeaponConfig,
    pub shotgun: WeaponConfig,
}

/// Root of the game config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub weapons: WeaponSet,
}

impl GameConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weapons.pistol.validate("pistol")?;
        self.weapons.rifle.validate("rifle")?;
        self.weapons.shotgun.validate("shotgun")
    }

    /// Compact JSON sent to clients in GAME_CONFIG
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            weapons: WeaponSet {
                pistol: WeaponConfig {
                    fire_mode: FireMode::Hitscan,
                    ammo_type: AmmoType::Light,
                    magazine_size: 12,
                    ammo_per_shot: 1,
                    fire_rate: 4.0,
                    reload_time: 1.2,
                    damage: 20.0,
                    range: 800.0,
                    spread: 0.03,
                    pellets: 1,
                    barrel_length: 0.6,
                    projectile_speed: 0.0,
                    projectile_lifetime: 0.0,
                    automatic: false,
                },
                rifle: WeaponConfig {
                    fire_mode: FireMode::Projectile,
                    ammo_type: AmmoType::Heavy,
                    magazine_size: 30,
                    ammo_per_shot: 1,
                    fire_rate: 10.0,
                    reload_time: 2.0,
                    damage: 12.0,
                    range: 1200.0,
                    spread: 0.05,
                    pellets: 1,
                    barrel_length: 0.9,
                    projectile_speed: 40.0,
                    projectile_lifetime: 1.0,
                    automatic: true,
                },
                shotgun: WeaponConfig {
                    fire_mode: FireMode::Hitscan,
                    ammo_type: AmmoType::Shell,
                    magazine_size: 6,
                    ammo_per_shot: 1,
                    fire_rate: 1.2,
                    reload_time: 2.5,
                    damage: 8.0,
                    range: 450.0,
                    spread: 0.2,
                    pellets: 8,
                    barrel_length: 0.8,
                    projectile_speed: 0.0,
                    projectile_lifetime: 0.0,
                    automatic: false,
                },
            },
        }
    }
}

/// Builds guns from config with a full magazine
pub struct GunFactory<'a> {
    config: &'a GameConfig,
}

impl<'a> GunFactory<'a> {
    pub fn new(config: &'a GameConfig) -> Self {
        Self { config }
    }

    pub fn make(&self, item: ItemType) -> Option<Gun> {
        let weapons = &self.config.weapons;
        let weapon = match item {
            ItemType::None => return None,
            ItemType::Pistol => &weapons.pistol,
            ItemType::Rifle => &weapons.rifle,
            ItemType::Shotgun => &weapons.shotgun,
        };
        Some(Self::from_config(item, weapon))
    }

    pub fn pistol(&self) -> Gun {
        Self::from_config(ItemType::Pistol, &self.config.weapons.pistol)
    }

    pub fn rifle(&self) -> Gun {
        Self::from_config(ItemType::Rifle, &self.config.weapons.rifle)
    }

    pub fn shotgun(&self) -> Gun {
        Self::from_config(ItemType::Shotgun, &self.config.weapons.shotgun)
    }

    fn from_config(item_type: ItemType, config: &WeaponConfig) -> Gun {
        Gun {
            item_type,
            fire_mode: config.fire_mode,
            ammo_type: config.ammo_type,
            magazine_size: config.magazine_size,
            ammo_in_mag: config.magazine_size,
            ammo_per_shot: config.ammo_per_shot,
            fire_cooldown: AttackCooldown::new(1.0 / config.fire_rate),
            reload_time: config.reload_time,
            reload: ReloadState::Idle,
            damage: config.damage,
            range: config.range,
            spread: config.spread,
            pellets: config.pellets,
            barrel_length: config.barrel_length * PIXELS_PER_METER,
            projectile_speed: config.projectile_speed * PIXELS_PER_METER,
            projectile_lifetime: config.projectile_lifetime,
            automatic: config.automatic,
        }
    }
}
