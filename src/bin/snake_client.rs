//! Headless client: connects, mirrors the world and reports the roster.

use snake_arena::client::{self, world, ClientWorld};
use snake_arena::config::{ClientConfig, NetworkSettings, DEFAULT_SERVER_URL};
use snake_arena::game::constants::INITIAL_SIZE;
use snake_arena::game::store::lay_body;
use snake_arena::game::types::PlayerUpdate;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = match env::var("SNAKE_SETTINGS") {
        Ok(path) => NetworkSettings::load(&PathBuf::from(path))?,
        Err(_) => NetworkSettings::default(),
    };
    let server_url = env::var("SNAKE_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    let config = ClientConfig {
        server_url,
        ..ClientConfig::default()
    }
    .with_settings(settings);

    let segments = lay_body(400.0, 300.0);
    let local = PlayerUpdate {
        x: 400.0,
        y: 300.0,
        segments,
        size: INITIAL_SIZE,
        score: 0,
        powerups: Vec::new(),
        direction: None,
    };
    let shared = world::shared(ClientWorld::new(local));
    world::lock(&shared).running = true;

    let netplay = client::start(config, shared.clone());
    let mut report = tokio::time::interval(REPORT_INTERVAL);

    loop {
        tokio::select! {
            _ = report.tick() => {
                let stats = netplay.stats();
                let (players, food) = {
                    let world = world::lock(&shared);
                    (world.roster().len(), world.food().len())
                };
                tracing::info!(
                    state = ?stats.state,
                    reconnect_attempts = stats.reconnect_attempts,
                    synthetic = stats.synthetic_players,
                    players,
                    food,
                    "client status"
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("client stopped");
    Ok(())
}
