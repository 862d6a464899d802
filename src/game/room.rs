use super::constants::{SESSION_OUTBOUND_CAPACITY, TICK_MS};
use super::store::{new_id, EntityStore};
use crate::protocol::{self, ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

mod session;

pub use session::SessionIo;
use session::SessionEntry;

/// One authoritative world shared by every connected session.
///
/// All mutations happen under a single lock; outbound frames are queued with
/// `try_send` so a slow socket never holds the lock or stalls the ticker.
#[derive(Debug)]
pub struct Room {
  state: Mutex<RoomState>,
  running: AtomicBool,
}

#[derive(Debug)]
struct RoomState {
  sessions: HashMap<String, SessionEntry>,
  store: EntityStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStats {
  pub sessions: usize,
  pub players: usize,
}

impl Room {
  pub fn new() -> Self {
    Self::with_store(EntityStore::new())
  }

  pub fn with_store(store: EntityStore) -> Self {
    Self {
      state: Mutex::new(RoomState {
        sessions: HashMap::new(),
        store,
      }),
      running: AtomicBool::new(false),
    }
  }

  /// Opens a session: seeds its player, sends `init` to it and `playerJoined` to
  /// everyone else, then makes sure the broadcast ticker is running.
  pub async fn add_session(self: &Arc<Self>) -> SessionIo {
    let session_id = new_id();
    let (sender, outbound_rx) = mpsc::channel(SESSION_OUTBOUND_CAPACITY);
    {
      let mut state = self.state.lock().await;
      state.open_session(&session_id, sender);
    }
    self.ensure_loop();
    SessionIo {
      session_id,
      outbound_rx,
    }
  }

  pub async fn remove_session(&self, session_id: &str) {
    let mut state = self.state.lock().await;
    state.disconnect_session(session_id);
  }

  /// Returns `false` once the session is no longer registered.
  pub async fn handle_text_message(&self, session_id: &str, text: &str) -> bool {
    let mut state = self.state.lock().await;
    if !state.sessions.contains_key(session_id) {
      return false;
    }
    match protocol::decode_client_message(text) {
      Ok(Some(message)) => state.handle_client_message(session_id, message),
      Ok(None) => tracing::debug!(session_id, "ignoring unknown message kind"),
      Err(error) => tracing::warn!(session_id, %error, "discarding malformed message"),
    }
    state.sessions.contains_key(session_id)
  }

  pub async fn stats(&self) -> RoomStats {
    let state = self.state.lock().await;
    RoomStats {
      sessions: state.sessions.len(),
      players: state.store.player_count(),
    }
  }

  fn ensure_loop(self: &Arc<Self>) {
    if self
      .running
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return;
    }

    let room = Arc::clone(self);
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(std::time::Duration::from_millis(TICK_MS));
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        interval.tick().await;
        let mut state = room.state.lock().await;
        if state.sessions.is_empty() {
          room.running.store(false, Ordering::SeqCst);
          tracing::debug!("room empty, broadcast loop stopped");
          break;
        }
        state.tick();
      }
    });
  }
}

impl Default for Room {
  fn default() -> Self {
    Self::new()
  }
}

impl RoomState {
  fn open_session(&mut self, session_id: &str, sender: mpsc::Sender<String>) {
    let player = self.store.spawn_player(session_id);
    self
      .sessions
      .insert(session_id.to_string(), SessionEntry::new(sender));
    tracing::info!(player_id = session_id, "player connected");

    let snapshot = self.store.snapshot();
    self.send_to(
      session_id,
      &ServerMessage::Init {
        player_id: session_id.to_string(),
        players: snapshot.players,
        food: snapshot.food,
        powerups: snapshot.powerups,
      },
    );
    self.broadcast(&ServerMessage::PlayerJoined { player }, Some(session_id));
  }

  fn disconnect_session(&mut self, session_id: &str) {
    if self.sessions.remove(session_id).is_none() {
      return;
    }
    self.store.remove_player(session_id);
    tracing::info!(player_id = session_id, "player disconnected");
    self.broadcast(
      &ServerMessage::PlayerLeft {
        player_id: session_id.to_string(),
      },
      None,
    );
  }

  fn handle_client_message(&mut self, session_id: &str, message: ClientMessage) {
    match message {
      ClientMessage::Update(update) => {
        let Some(player) = self.store.update_player(session_id, update).cloned() else { return };
        self.broadcast(
          &ServerMessage::PlayerUpdate {
            player_id: session_id.to_string(),
            player,
          },
          None,
        );
      }
      ClientMessage::Eat { food_id } => {
        let Some(eaten) = self.store.consume_food(session_id, &food_id) else {
          tracing::debug!(player_id = session_id, food_id = %food_id, "stale food target");
          return;
        };
        self.broadcast(
          &ServerMessage::FoodEaten {
            player_id: session_id.to_string(),
            food_id: eaten.food_id,
            new_food: eaten.replacement,
            player_score: eaten.score,
          },
          None,
        );
      }
      ClientMessage::Powerup { powerup_id } => {
        let Some(collected) = self.store.consume_powerup(session_id, &powerup_id) else {
          tracing::debug!(player_id = session_id, powerup_id = %powerup_id, "stale powerup target");
          return;
        };
        self.broadcast(
          &ServerMessage::PowerupCollected {
            player_id: session_id.to_string(),
            powerup_id: collected.powerup_id,
            new_powerup: collected.replacement,
            powerup_type: collected.kind,
          },
          None,
        );
      }
      ClientMessage::Death => {
        let Some(player) = self.store.reset_player(session_id).cloned() else { return };
        tracing::debug!(player_id = session_id, "player reset after death");
        self.broadcast(
          &ServerMessage::PlayerDeath {
            player_id: session_id.to_string(),
            player,
          },
          None,
        );
      }
      ClientMessage::Chat { message } => {
        self.broadcast(
          &ServerMessage::Chat {
            player_id: session_id.to_string(),
            message,
          },
          None,
        );
      }
    }
  }

  fn tick(&mut self) {
    self.store.age_effects(TICK_MS as i64);
    let snapshot = self.store.snapshot();
    self.broadcast(
      &ServerMessage::GameState {
        players: snapshot.players,
        food: snapshot.food,
        powerups: snapshot.powerups,
      },
      None,
    );
  }

  fn send_to(&mut self, session_id: &str, message: &ServerMessage) {
    let Some(payload) = Self::encode(message) else { return };
    let Some(session) = self.sessions.get(session_id) else { return };
    if let Err(error) = session.sender.try_send(payload) {
      Self::log_send_failure(session_id, &error);
      self.disconnect_session(session_id);
    }
  }

  fn broadcast(&mut self, message: &ServerMessage, exclude: Option<&str>) {
    let Some(payload) = Self::encode(message) else { return };
    let mut stale = Vec::new();
    for (session_id, session) in &self.sessions {
      if Some(session_id.as_str()) == exclude {
        continue;
      }
      if let Err(error) = session.sender.try_send(payload.clone()) {
        Self::log_send_failure(session_id, &error);
        stale.push(session_id.clone());
      }
    }
    for session_id in stale {
      self.disconnect_session(&session_id);
    }
  }

  fn encode(message: &ServerMessage) -> Option<String> {
    match protocol::encode(message) {
      Ok(payload) => Some(payload),
      Err(error) => {
        tracing::warn!(%error, "failed to encode server message");
        None
      }
    }
  }

  fn log_send_failure(session_id: &str, error: &TrySendError<String>) {
    match error {
      TrySendError::Full(_) => {
        tracing::warn!(session_id, "outbound buffer full, dropping slow session")
      }
      TrySendError::Closed(_) => tracing::debug!(session_id, "outbound channel closed"),
    }
  }
}
