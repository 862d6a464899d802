use crate::game::types::{ActiveEffect, Direction, Player, Point};
use std::collections::{HashMap, HashSet};

/// Mirror of one remote peer. Real and synthetic peers share this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub id: String,
    pub name: String,
    pub color: String,
    pub skin: String,
    pub head: String,
    pub x: f64,
    pub y: f64,
    pub segments: Vec<Point>,
    pub direction: Option<Direction>,
    pub score: i64,
    pub size: i64,
    pub effects: Vec<ActiveEffect>,
}

/// Identity-keyed change. `None` fields leave the mirrored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerPatch {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<String>,
    pub skin: Option<String>,
    pub head: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub segments: Option<Vec<Point>>,
    pub direction: Option<Direction>,
    pub score: Option<i64>,
    pub size: Option<i64>,
    pub effects: Option<Vec<ActiveEffect>>,
}

impl PlayerPatch {
    pub fn score(id: &str, score: i64) -> Self {
        Self {
            id: id.to_string(),
            score: Some(score),
            ..Self::default()
        }
    }
}

impl From<Player> for PlayerPatch {
    fn from(player: Player) -> Self {
        Self {
            id: player.id,
            name: Some(player.name),
            color: Some(player.color),
            skin: Some(player.skin),
            head: Some(player.head),
            x: Some(player.x),
            y: Some(player.y),
            segments: Some(player.segments),
            direction: player.direction,
            score: Some(player.score),
            size: Some(player.size),
            effects: Some(player.powerups),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    Joined(PlayerPatch),
    Updated(PlayerPatch),
    Left(String),
    /// Full world state: upsert every entry, prune identities it omits.
    Snapshot(Vec<PlayerPatch>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteRoster {
    local_id: Option<String>,
    players: HashMap<String, RemotePlayer>,
}

impl RemoteRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.players.remove(&id);
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&RemotePlayer> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn players(&self) -> impl Iterator<Item = &RemotePlayer> {
        self.players.values()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    /// Applies one event. Anything about the local identity is discarded.
    pub fn apply(&mut self, event: RosterEvent) {
        match event {
            RosterEvent::Joined(patch) => self.upsert(patch),
            RosterEvent::Updated(patch) => {
                if self.is_local(&patch.id) {
                    return;
                }
                if let Some(player) = self.players.get_mut(&patch.id) {
                    player.merge(patch);
                }
            }
            RosterEvent::Left(id) => {
                if !self.is_local(&id) {
                    self.players.remove(&id);
                }
            }
            RosterEvent::Snapshot(patches) => {
                let present: HashSet<String> = patches.iter().map(|patch| patch.id.clone()).collect();
                for patch in patches {
                    self.upsert(patch);
                }
                self.players.retain(|id, _| present.contains(id));
            }
        }
    }

    fn upsert(&mut self, patch: PlayerPatch) {
        if self.is_local(&patch.id) {
            return;
        }
        match self.players.get_mut(&patch.id) {
            Some(player) => player.merge(patch),
            None => {
                let player = RemotePlayer::from_patch(patch);
                self.players.insert(player.id.clone(), player);
            }
        }
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_id.as_deref() == Some(id)
    }
}

/// Value-in, value-out form of [`RemoteRoster::apply`].
pub fn reconcile(mut roster: RemoteRoster, event: RosterEvent) -> RemoteRoster {
    roster.apply(event);
    roster
}

impl RemotePlayer {
    fn from_patch(patch: PlayerPatch) -> Self {
        let segments = patch.segments.unwrap_or_default();
        let head = segments.first().copied();
        Self {
            name: patch.name.unwrap_or_else(|| patch.id.clone()),
            color: patch.color.unwrap_or_default(),
            skin: patch.skin.unwrap_or_else(|| "default".to_string()),
            head: patch.head.unwrap_or_else(|| "default".to_string()),
            x: patch.x.or(head.map(|point| point.x)).unwrap_or_default(),
            y: patch.y.or(head.map(|point| point.y)).unwrap_or_default(),
            segments,
            direction: patch.direction,
            score: patch.score.unwrap_or_default(),
            size: patch.size.unwrap_or_default(),
            effects: patch.effects.unwrap_or_default(),
            id: patch.id,
        }
    }

    fn merge(&mut self, patch: PlayerPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(skin) = patch.skin {
            self.skin = skin;
        }
        if let Some(head) = patch.head {
            self.head = head;
        }
        if let Some(segments) = patch.segments {
            if let Some(first) = segments.first() {
                self.x = first.x;
                self.y = first.y;
            }
            self.segments = segments;
        }
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if patch.direction.is_some() {
            self.direction = patch.direction;
        }
        if let Some(score) = patch.score {
            self.score = score;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(effects) = patch.effects {
            self.effects = effects;
        }
    }
}
