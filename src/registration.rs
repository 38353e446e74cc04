//! Directory registration
//!
//! Announces this server to the web API once at startup and then reports the
//! live player count on a fixed interval. Nothing here is awaited by the
//! tick loop; failures are logged and the next heartbeat simply tries again.

use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Directory rejected request: {status} - {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfig {
    pub api_url: String,
    pub secret: String,
    pub server_id: String,
    pub host: String,
    pub port: u16,
    pub region: String,
    pub max_players: u32,
}

/// Numeric variable with a fallback; malformed values are logged and ignored
fn number_or<T: FromStr + Copy>(raw: Option<String>, name: &str, default: T) -> T {
    let Some(raw) = raw.filter(|v| !v.is_empty()) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!("Invalid {} '{}', using default", name, raw);
            default
        }
    }
}

impl RegistrationConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `None` when the API url or shared secret is missing
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let api_url = var("WEB_API_URL", "");
        let secret = var("SERVER_SHARED_SECRET", "");
        if api_url.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            secret,
            server_id: var("SERVER_ID", "server-1"),
            host: var("SERVER_HOST", "localhost"),
            port: number_or(lookup("SERVER_PORT"), "SERVER_PORT", 9001),
            region: var("SERVER_REGION", "local"),
            max_players: number_or(lookup("MAX_PLAYERS"), "MAX_PLAYERS", 100),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    id: &'a str,
    host: &'a str,
    port: u16,
    region: &'a str,
    max_players: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatRequest<'a> {
    id: &'a str,
    current_players: u64,
}

pub struct RegistrationClient {
    client: Client,
    config: RegistrationConfig,
}

impl RegistrationClient {
    pub fn new(config: RegistrationConfig) -> Result<Self, RegistrationError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), RegistrationError> {
        let response = self
            .client
            .post(format!("{}{}", self.config.api_url, path))
            .bearer_auth(&self.config.secret)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::Rejected { status, body });
        }
        Ok(())
    }

    pub async fn register(&self) -> Result<(), RegistrationError> {
        let c = &self.config;
        self.post(
            "/servers/register",
            &RegisterRequest {
                id: &c.server_id,
                host: &c.host,
                port: c.port,
                region: &c.region,
                max_players: c.max_players,
            },
        )
        .await
    }

    pub async fn heartbeat(&self, current_players: u64) -> Result<(), RegistrationError> {
        self.post(
            "/servers/heartbeat",
            &HeartbeatRequest {
                id: &self.config.server_id,
                current_players,
            },
        )
        .await
    }
}

/// Register, then heartbeat forever on a background task
pub fn start_registration(metrics: Arc<Metrics>) -> Option<tokio::task::JoinHandle<()>> {
    let Some(config) = RegistrationConfig::from_env() else {
        info!("WEB_API_URL or SERVER_SHARED_SECRET not set, skipping registration");
        return None;
    };
    let client = match RegistrationClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            warn!("Registration client unavailable: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        match client.register().await {
            Ok(()) => info!("Registered as {}", client.config.server_id),
            Err(e) => warn!("Registration failed: {}", e),
        }

        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        // First tick completes immediately; registration just happened
        interval.tick().await;
        loop {
            interval.tick().await;
            let players = metrics.players.load(Ordering::Relaxed);
            match client.heartbeat(players).await {
                Ok(()) => debug!("Heartbeat sent ({} players)", players),
                Err(e) => warn!("Heartbeat failed: {}", e),
            }
        }
    }))
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
    fn test_skipped_without_url_or_secret() {
        assert!(RegistrationConfig::from_lookup(lookup(&[])).is_none());
        assert!(RegistrationConfig::from_lookup(lookup(&[("WEB_API_URL", "http://api")])).is_none());
        assert!(RegistrationConfig::from_lookup(lookup(&[
            ("WEB_API_URL", "http://api"),
            ("SERVER_SHARED_SECRET", ""),
        ]))
        .is_none());
    }

    #[test]
    fn test_defaults_and_trailing_slash() {
        let config = RegistrationConfig::from_lookup(lookup(&[
            ("WEB_API_URL", "http://api.local/"),
            ("SERVER_SHARED_SECRET", "s3cret"),
            ("SERVER_REGION", "eu"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "http://api.local");
        assert_eq!(config.server_id, "server-1");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9001);
        assert_eq!(config.region, "eu");
        assert_eq!(config.max_players, 100);
    }

    #[test]
    fn test_numeric_overrides_and_bad_values() {
        let config = RegistrationConfig::from_lookup(lookup(&[
            ("WEB_API_URL", "http://api"),
            ("SERVER_SHARED_SECRET", "x"),
            ("SERVER_PORT", "7443"),
            ("MAX_PLAYERS", "many"),
        ]))
        .unwrap();
        assert_eq!(config.port, 7443);
        assert_eq!(config.max_players, 100);

        let config = RegistrationConfig::from_lookup(lookup(&[
            ("WEB_API_URL", "http://api"),
            ("SERVER_SHARED_SECRET", "x"),
            ("SERVER_PORT", "70000"),
            ("MAX_PLAYERS", "24"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.max_players, 24);
    }

    #[test]
    fn test_payload_field_names() {
        let register = serde_json::to_value(RegisterRequest {
            id: "a",
            host: "h",
            port: 1,
            region: "r",
            max_players: 8,
        })
        .unwrap();
        assert_eq!(
            register,
            serde_json::json!({"id": "a", "host": "h", "port": 1, "region": "r", "maxPlayers": 8})
        );

        let heartbeat = serde_json::to_value(HeartbeatRequest {
            id: "a",
            current_players: 3,
        })
        .unwrap();
        assert_eq!(heartbeat, serde_json::json!({"id": "a", "currentPlayers": 3}));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_an_error() {
        let config = RegistrationConfig::from_lookup(lookup(&[
            ("WEB_API_URL", "http://127.0.0.1:1"),
            ("SERVER_SHARED_SECRET", "x"),
        ]))
        .unwrap();
        let client = RegistrationClient::new(config).unwrap();
        assert!(matches!(
            client.heartbeat(0).await,
            Err(RegistrationError::Http(_))
        ));
    }
}
