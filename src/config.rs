use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
}

impl ServerConfig {
    /// Reads `PORT`, falling back to the default on absence or parse failure.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self { port }
    }

    pub fn address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_url: String,
    pub local_mode: bool,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub update_interval: Duration,
    pub hidden_update_interval: Duration,
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    pub tick: Duration,
    pub roster_size: usize,
    pub grid_size: f64,
    pub width: f64,
    pub height: f64,
    pub growth_chance: f64,
    pub growth_reward: i64,
    pub initial_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            local_mode: false,
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(5),
            update_interval: Duration::from_millis(50),
            hidden_update_interval: Duration::from_millis(1000),
            fallback: FallbackConfig::default(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            roster_size: 3,
            grid_size: 20.0,
            width: 800.0,
            height: 600.0,
            growth_chance: 0.01,
            growth_reward: 10,
            initial_length: 3,
        }
    }
}

impl ClientConfig {
    pub fn with_settings(mut self, settings: NetworkSettings) -> Self {
        self.local_mode = settings.local_mode;
        self.auto_reconnect = settings.auto_reconnect;
        self
    }
}

/// User toggles persisted between runs, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSettings {
    pub local_mode: bool,
    pub auto_reconnect: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            local_mode: false,
            auto_reconnect: true,
        }
    }
}

impl NetworkSettings {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
