use super::roster::{PlayerPatch, RemoteRoster, RosterEvent};
use crate::game::types::{Food, PlayerUpdate, Point, Powerup};
use crate::protocol::ServerMessage;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Mirrored powerups disappear after this long even if nobody collects them.
pub const POWERUP_LIFETIME: Duration = Duration::from_secs(10);
pub const CHAT_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct MirroredPowerup {
    pub powerup: Powerup,
    pub received_at: Instant,
}

impl MirroredPowerup {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.received_at) >= POWERUP_LIFETIME
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub player_id: String,
    pub message: String,
}

/// Everything the client knows about the world. Gameplay owns `local`; every
/// other field is written only by reconciliation.
#[derive(Debug, Clone)]
pub struct ClientWorld {
    pub local: PlayerUpdate,
    pub running: bool,
    pub paused: bool,
    roster: RemoteRoster,
    food: Vec<Food>,
    powerups: Vec<MirroredPowerup>,
    retired_powerups: HashSet<String>,
    chat: VecDeque<ChatLine>,
}

impl ClientWorld {
    pub fn new(local: PlayerUpdate) -> Self {
        Self {
            local,
            running: false,
            paused: false,
            roster: RemoteRoster::new(),
            food: Vec::new(),
            powerups: Vec::new(),
            retired_powerups: HashSet::new(),
            chat: VecDeque::new(),
        }
    }

    pub fn roster(&self) -> &RemoteRoster {
        &self.roster
    }

    pub fn food(&self) -> &[Food] {
        &self.food
    }

    /// Local gameplay places its own food while no server is feeding the mirror.
    pub fn set_food(&mut self, food: Vec<Food>) {
        self.food = food;
    }

    pub fn powerups(&self) -> &[MirroredPowerup] {
        &self.powerups
    }

    pub fn chat(&self) -> impl Iterator<Item = &ChatLine> {
        self.chat.iter()
    }

    pub fn is_active(&self) -> bool {
        self.running && !self.paused
    }

    /// Forgets every remote peer, e.g. before a synthetic roster takes over.
    pub fn clear_remote(&mut self) {
        self.roster.clear();
    }

    pub fn apply_roster_event(&mut self, event: RosterEvent) {
        self.roster.apply(event);
    }

    /// The food item AI opponents chase.
    pub fn current_food(&self) -> Option<Point> {
        self.food.first().map(|food| Point { x: food.x, y: food.y })
    }

    /// Routes one server message into the mirror.
    pub fn apply_server_message(&mut self, message: ServerMessage, now: Instant) {
        match message {
            ServerMessage::Init {
                player_id,
                players,
                food,
                powerups,
            } => {
                self.roster.set_local_id(player_id);
                self.roster.apply(RosterEvent::Snapshot(
                    players.into_iter().map(PlayerPatch::from).collect(),
                ));
                self.food = food;
                self.replace_powerups(powerups, now);
            }
            ServerMessage::PlayerJoined { player } => {
                self.roster.apply(RosterEvent::Joined(player.into()));
            }
            ServerMessage::PlayerLeft { player_id } | ServerMessage::PlayerDeath { player_id, .. } => {
                self.roster.apply(RosterEvent::Left(player_id));
            }
            ServerMessage::PlayerUpdate { player, .. } => {
                self.roster.apply(RosterEvent::Updated(player.into()));
            }
            ServerMessage::GameState {
                players,
                food,
                powerups,
            } => {
                self.roster.apply(RosterEvent::Snapshot(
                    players.into_iter().map(PlayerPatch::from).collect(),
                ));
                self.food = food;
                self.replace_powerups(powerups, now);
            }
            ServerMessage::FoodEaten {
                player_id,
                food_id,
                new_food,
                player_score,
            } => {
                self.food.retain(|food| food.id != food_id);
                if !self.food.iter().any(|food| food.id == new_food.id) {
                    self.food.push(new_food);
                }
                self.roster
                    .apply(RosterEvent::Updated(PlayerPatch::score(&player_id, player_score)));
            }
            ServerMessage::PowerupCollected {
                powerup_id,
                new_powerup,
                ..
            } => {
                self.powerups.retain(|mirrored| mirrored.powerup.id != powerup_id);
                self.replace_powerups_with_addition(new_powerup, now);
            }
            ServerMessage::Chat { player_id, message } => {
                if self.chat.len() == CHAT_HISTORY {
                    self.chat.pop_front();
                }
                self.chat.push_back(ChatLine { player_id, message });
            }
        }
    }

    /// Drops mirrored powerups older than [`POWERUP_LIFETIME`]; snapshots will not
    /// bring them back.
    pub fn expire_powerups(&mut self, now: Instant) {
        let retired = &mut self.retired_powerups;
        self.powerups.retain(|mirrored| {
            if mirrored.is_expired(now) {
                retired.insert(mirrored.powerup.id.clone());
                false
            } else {
                true
            }
        });
    }

    fn replace_powerups(&mut self, incoming: Vec<Powerup>, now: Instant) {
        let previous = std::mem::take(&mut self.powerups);
        let live: HashSet<&str> = incoming.iter().map(|powerup| powerup.id.as_str()).collect();
        self.retired_powerups.retain(|id| live.contains(id.as_str()));
        let retired = &self.retired_powerups;
        self.powerups = incoming
            .into_iter()
            .filter(|powerup| !retired.contains(&powerup.id))
            .map(|powerup| {
                let received_at = previous
                    .iter()
                    .find(|mirrored| mirrored.powerup.id == powerup.id)
                    .map(|mirrored| mirrored.received_at)
                    .unwrap_or(now);
                MirroredPowerup {
                    powerup,
                    received_at,
                }
            })
            .collect();
        self.expire_powerups(now);
    }

    fn replace_powerups_with_addition(&mut self, powerup: Powerup, now: Instant) {
        if self.powerups.iter().any(|mirrored| mirrored.powerup.id == powerup.id) {
            return;
        }
        self.powerups.push(MirroredPowerup {
            powerup,
            received_at: now,
        });
    }
}

/// The single lock guarding the client mirror.
pub type SharedWorld = Arc<Mutex<ClientWorld>>;

pub fn shared(world: ClientWorld) -> SharedWorld {
    Arc::new(Mutex::new(world))
}

pub fn lock(world: &SharedWorld) -> MutexGuard<'_, ClientWorld> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::store::new_player;
    use crate::game::types::{Player, PowerupKind};

    fn local() -> PlayerUpdate {
        PlayerUpdate {
            x: 0.0,
            y: 0.0,
            segments: vec![Point { x: 0.0, y: 0.0 }],
            score: 0,
            size: 20,
            powerups: Vec::new(),
            direction: None,
        }
    }

    fn player(id: &str) -> Player {
        new_player(id, &mut rand::thread_rng())
    }

    fn powerup(id: &str) -> Powerup {
        Powerup {
            id: id.to_string(),
            x: 1.0,
            y: 2.0,
            kind: PowerupKind::Speed,
            color: "#ffaa00".to_string(),
        }
    }

    fn food(id: &str) -> Food {
        Food {
            id: id.to_string(),
            x: 5.0,
            y: 5.0,
            color: "red".to_string(),
        }
    }

    #[test]
    fn init_learns_identity_and_excludes_self() {
        let mut world = ClientWorld::new(local());
        world.apply_server_message(
            ServerMessage::Init {
                player_id: "me".to_string(),
                players: vec![player("me"), player("other")],
                food: vec![food("f1")],
                powerups: vec![powerup("p1")],
            },
            Instant::now(),
        );
        assert_eq!(world.roster().local_id(), Some("me"));
        assert!(world.roster().get("me").is_none());
        assert!(world.roster().get("other").is_some());
        assert_eq!(world.food().len(), 1);
        assert_eq!(world.powerups().len(), 1);
    }

    #[test]
    fn self_echo_of_update_never_enters_roster() {
        let mut world = ClientWorld::new(local());
        world.apply_server_message(
            ServerMessage::Init {
                player_id: "me".to_string(),
                players: vec![player("me")],
                food: Vec::new(),
                powerups: Vec::new(),
            },
            Instant::now(),
        );
        world.apply_server_message(
            ServerMessage::PlayerJoined { player: player("me") },
            Instant::now(),
        );
        world.apply_server_message(
            ServerMessage::PlayerUpdate {
                player_id: "me".to_string(),
                player: player("me"),
            },
            Instant::now(),
        );
        assert!(world.roster().is_empty());
    }

    #[test]
    fn death_of_other_removes_until_next_snapshot() {
        let mut world = ClientWorld::new(local());
        let other = player("other");
        let now = Instant::now();
        world.apply_server_message(ServerMessage::PlayerJoined { player: other.clone() }, now);
        world.apply_server_message(
            ServerMessage::PlayerDeath {
                player_id: "other".to_string(),
                player: other.clone(),
            },
            now,
        );
        assert!(world.roster().is_empty());
        world.apply_server_message(
            ServerMessage::GameState {
                players: vec![other],
                food: Vec::new(),
                powerups: Vec::new(),
            },
            now,
        );
        assert_eq!(world.roster().len(), 1);
    }

    #[test]
    fn food_eaten_swaps_item_and_updates_score() {
        let mut world = ClientWorld::new(local());
        let now = Instant::now();
        world.apply_server_message(ServerMessage::PlayerJoined { player: player("other") }, now);
        world.set_food(vec![food("f1"), food("f2")]);
        world.apply_server_message(
            ServerMessage::FoodEaten {
                player_id: "other".to_string(),
                food_id: "f1".to_string(),
                new_food: food("f3"),
                player_score: 10,
            },
            now,
        );
        let ids: Vec<&str> = world.food().iter().map(|food| food.id.as_str()).collect();
        assert_eq!(ids, vec!["f2", "f3"]);
        assert_eq!(world.roster().get("other").map(|player| player.score), Some(10));
    }

    #[test]
    fn powerups_expire_and_stay_retired() {
        let mut world = ClientWorld::new(local());
        let start = Instant::now();
        let snapshot = || ServerMessage::GameState {
            players: Vec::new(),
            food: Vec::new(),
            powerups: vec![powerup("p1")],
        };
        world.apply_server_message(snapshot(), start);
        world.apply_server_message(snapshot(), start + Duration::from_secs(5));
        assert_eq!(world.powerups()[0].received_at, start);

        world.expire_powerups(start + POWERUP_LIFETIME);
        assert!(world.powerups().is_empty());
        world.apply_server_message(snapshot(), start + Duration::from_secs(11));
        assert!(world.powerups().is_empty());

        world.apply_server_message(
            ServerMessage::PowerupCollected {
                player_id: "other".to_string(),
                powerup_id: "p1".to_string(),
                new_powerup: powerup("p2"),
                powerup_type: PowerupKind::Speed,
            },
            start + Duration::from_secs(12),
        );
        assert_eq!(world.powerups().len(), 1);
        assert_eq!(world.powerups()[0].powerup.id, "p2");
    }

    #[test]
    fn chat_history_is_bounded() {
        let mut world = ClientWorld::new(local());
        for index in 0..(CHAT_HISTORY + 5) {
            world.apply_server_message(
                ServerMessage::Chat {
                    player_id: "a".to_string(),
                    message: format!("line {index}"),
                },
                Instant::now(),
            );
        }
        assert_eq!(world.chat().count(), CHAT_HISTORY);
        assert_eq!(world.chat().next().map(|line| line.message.as_str()), Some("line 5"));
    }
}
