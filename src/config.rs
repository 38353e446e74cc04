use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::game::constants::{tick, weapons, world};
use crate::game::weapons::{ConfigError, GameConfig};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// World edge length in pixels
    pub world_size: u32,
    /// Terrain seed; random when unset
    pub world_seed: Option<u64>,
    pub projectile_pool_size: usize,
    pub max_players: usize,
    /// Weapon tuning JSON
    pub game_config_path: PathBuf,
    pub metrics_port: u16,
    /// Path to TLS certificate file (PEM)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (PEM)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 9001,
            tick_rate: tick::DEFAULT_TICK_RATE,
            world_size: world::DEFAULT_SIZE,
            world_seed: None,
            projectile_pool_size: weapons::DEFAULT_POOL_SIZE,
            max_players: 100,
            game_config_path: PathBuf::from("config/game.json"),
            metrics_port: 9090,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

/// Parse `name` if set; warn and return `None` when it is malformed or rejected
fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    accept: impl Fn(&T) -> bool,
    expected: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => Some(value),
        Ok(_) => {
            warn!("{} must be {}, using default", name, expected);
            None
        }
        Err(_) => {
            warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from(|name| std::env::var(name).ok())
    }

    /// Load from any variable source; invalid values keep their defaults
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "BIND_ADDRESS", |_: &IpAddr| true, "an IP address") {
            config.bind_address = addr;
        }
        if let Some(port) = parse_var(&lookup, "PORT", |p: &u16| *p > 0, "> 0") {
            config.port = port;
        }
        if let Some(rate) = parse_var(
            &lookup,
            "TICK_RATE",
            |r: &u32| (1..=tick::MAX_TICK_RATE).contains(r),
            "1-128",
        ) {
            config.tick_rate = rate;
        }
        if let Some(size) = parse_var(
            &lookup,
            "WORLD_SIZE",
            |s: &u32| (512..=65536).contains(s),
            "512-65536",
        ) {
            config.world_size = size;
        }
        if let Some(seed) = parse_var(&lookup, "WORLD_SEED", |_: &u64| true, "an integer") {
            config.world_seed = Some(seed);
        }
        if let Some(size) = parse_var(
            &lookup,
            "PROJECTILE_POOL_SIZE",
            |s: &usize| (1..=65536).contains(s),
            "1-65536",
        ) {
            config.projectile_pool_size = size;
        }
        if let Some(max) = parse_var(
            &lookup,
            "MAX_PLAYERS",
            |m: &usize| (1..=10000).contains(m),
            "1-10000",
        ) {
            config.max_players = max;
        }
        if let Some(path) = lookup("GAME_CONFIG_PATH").filter(|p| !p.is_empty()) {
            config.game_config_path = PathBuf::from(path);
        }
        if let Some(port) = parse_var(&lookup, "METRICS_PORT", |p: &u16| *p > 0, "> 0") {
            config.metrics_port = port;
        }
        if let Some(cert_path) = lookup("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }
        if let Some(key_path) = lookup("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.tick_rate == 0 || self.tick_rate > tick::MAX_TICK_RATE {
            return Err(format!(
                "tick_rate must be 1-{}, got {}",
                tick::MAX_TICK_RATE,
                self.tick_rate
            ));
        }
        if self.projectile_pool_size == 0 {
            return Err("projectile_pool_size must be at least 1".to_string());
        }
        if self.max_players == 0 {
            return Err("max_players must be at least 1".to_string());
        }
        if self.metrics_port == self.port {
            return Err("metrics_port must differ from port".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string());
        }
        Ok(())
    }
}

/// Weapon tuning from disk; a missing file falls back to the built-in table
pub fn load_game_config(path: &Path) -> Result<GameConfig, ConfigError> {
    if !path.exists() {
        warn!(
            "Game config {} not found, using built-in weapon defaults",
            path.display()
        );
        return Ok(GameConfig::default());
    }
    GameConfig::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9001);
        assert_eq!(config.tick_rate, 10);
        assert_eq!(config.world_size, 4096);
        assert_eq!(config.projectile_pool_size, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::load_from(lookup(&[
            ("PORT", "7000"),
            ("TICK_RATE", "30"),
            ("WORLD_SEED", "42"),
            ("GAME_CONFIG_PATH", "/tmp/weapons.json"),
        ]));
        assert_eq!(config.port, 7000);
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.world_seed, Some(42));
        assert_eq!(config.game_config_path, PathBuf::from("/tmp/weapons.json"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ServerConfig::load_from(lookup(&[
            ("PORT", "0"),
            ("TICK_RATE", "500"),
            ("MAX_PLAYERS", "lots"),
            ("BIND_ADDRESS", "not-an-ip"),
        ]));
        assert_eq!(config.port, 9001);
        assert_eq!(config.tick_rate, 10);
        assert_eq!(config.max_players, 100);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_validate_rejects_half_tls() {
        let config = ServerConfig {
            tls_cert_path: Some("cert.pem".into()),
            ..ServerConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("TLS"));
    }

    #[test]
    fn test_missing_game_config_uses_defaults() {
        let config = load_game_config(Path::new("/definitely/not/here.json")).unwrap();
        assert_eq!(config, GameConfig::default());
    }

    #[test]
    fn test_shipped_game_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/game.json");
        assert_eq!(load_game_config(&path).unwrap(), GameConfig::default());
    }

    #[test]
    fn test_malformed_game_config_is_an_error() {
        let path = std::env::temp_dir().join(format!("skirmish-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let result = load_game_config(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
