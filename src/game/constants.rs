/// Tick scheduling
pub mod tick {
    /// Default simulation rate in Hz
    pub const DEFAULT_TICK_RATE: u32 = 10;
    /// Upper bound accepted from configuration
    pub const MAX_TICK_RATE: u32 = 128;
    /// Seconds between periodic tick statistics log lines
    pub const STATS_LOG_INTERVAL_SECS: u64 = 30;
}

/// Player body and movement
pub mod player {
    /// Body radius in pixels
    pub const RADIUS: f32 = 12.5;
    /// Movement speed in pixels per second
    pub const SPEED: f32 = 150.0;
    /// Starting and maximum health
    pub const MAX_HEALTH: f32 = 100.0;
    /// Longest accepted display name (characters)
    pub const MAX_NAME_LENGTH: usize = 16;
    /// Name used when sanitising leaves nothing
    pub const DEFAULT_NAME: &str = "Player";
}

/// Movement bitmask carried by MOVEMENT packets
pub mod direction {
    pub const UP: u8 = 1;
    pub const LEFT: u8 = 2;
    pub const DOWN: u8 = 4;
    pub const RIGHT: u8 = 8;
}

/// Unarmed attack
pub mod melee {
    /// Seconds between swings
    pub const COOLDOWN: f32 = 0.5;
    /// Distance from the attacker's center to the strike point (pixels)
    pub const REACH: f32 = 25.0;
    /// Search radius around the strike point (pixels)
    pub const RADIUS: f32 = 15.0;
    pub const DAMAGE: f32 = 10.0;
}

/// Viewport used for interest management
pub mod camera {
    pub const VIEW_WIDTH: f32 = 1920.0;
    pub const VIEW_HEIGHT: f32 = 1080.0;
}

/// World geometry
pub mod world {
    /// Default square world edge length (pixels)
    pub const DEFAULT_SIZE: u32 = 4096;
    /// Pixels per physics meter, for weapon values authored in meters
    pub const PIXELS_PER_METER: f32 = 32.0;
    /// Edge length of one terrain tile mesh (pixels)
    pub const TILE_SIZE: f32 = 512.0;
    /// Granularity of biome lookups (pixels)
    pub const BIOME_CELL_SIZE: f32 = 64.0;
    /// Attempts made to find a dry spawn point before falling back to the center
    pub const SPAWN_ATTEMPTS: usize = 32;
}

/// Weapons and inventory
pub mod weapons {
    /// Inventory slots per player
    pub const INVENTORY_SLOTS: usize = 3;
    /// Reserve ammo granted per carried ammo type, in magazines
    pub const STARTING_RESERVE_MAGAZINES: u32 = 2;
    /// Default projectile pool capacity
    pub const DEFAULT_POOL_SIZE: usize = 512;
    /// Projectile body radius (pixels)
    pub const PROJECTILE_RADIUS: f32 = 3.0;
}

/// Collision category bits
pub mod collision {
    pub const PLAYER: u16 = 1;
    pub const WALL: u16 = 2;
    pub const COVER: u16 = 4;
    pub const WATER: u16 = 8;
    pub const BULLET: u16 = 16;
    pub const PICKUP: u16 = 32;
    /// Shapes a hitscan ray can stop on
    pub const HITSCAN_MASK: u16 = PLAYER | WALL | COVER;
}

/// Network limits
pub mod net {
    /// Longest accepted chat message (bytes)
    pub const MAX_CHAT_LENGTH: usize = 50;
    /// Largest inbound transport message (bytes)
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
}
