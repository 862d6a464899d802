//! Client half: keeps a local mirror of the shared world in sync with the
//! server, and substitutes a synthetic roster when the server is unreachable.

pub mod connection;
pub mod fallback;
pub mod roster;
pub mod world;

pub use connection::{ConnectionManager, ConnectionState, Connector, Link, Retry, WsConnector};
pub use fallback::FallbackSimulation;
pub use world::{ClientWorld, SharedWorld};

use crate::config::ClientConfig;
use crate::game::types::PlayerUpdate;
use crate::protocol::ClientMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub synthetic_players: usize,
}

/// Whatever is feeding the mirror: a live server link or the local simulation.
/// Sends return whether the message was handed to the transport.
pub trait Netplay: Send + Sync {
    fn state(&self) -> ConnectionState;

    fn send(&self, message: ClientMessage) -> bool;

    /// Throttles periodic state pushes while the game is not visible.
    fn set_hidden(&self, hidden: bool);

    fn stats(&self) -> ConnectionStats;

    fn send_update(&self, update: &PlayerUpdate) -> bool {
        self.send(ClientMessage::Update(update.clone()))
    }

    fn send_eat(&self, food_id: &str) -> bool {
        self.send(ClientMessage::Eat {
            food_id: food_id.to_string(),
        })
    }

    fn send_powerup(&self, powerup_id: &str) -> bool {
        self.send(ClientMessage::Powerup {
            powerup_id: powerup_id.to_string(),
        })
    }

    fn send_death(&self) -> bool {
        self.send(ClientMessage::Death)
    }

    fn send_chat(&self, message: &str) -> bool {
        self.send(ClientMessage::Chat {
            message: message.to_string(),
        })
    }
}

/// Starts the feed selected by `config`. Must be called inside a tokio runtime.
pub fn start(config: ClientConfig, world: SharedWorld) -> Box<dyn Netplay> {
    if config.local_mode {
        tracing::info!("local mode selected, skipping network");
        world::lock(&world).clear_remote();
        return Box::new(FallbackSimulation::activate(config.fallback, world));
    }
    let connector = WsConnector::new(config.connect_timeout);
    Box::new(ConnectionManager::spawn(config, world, connector))
}
