use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Up,
  Down,
  Left,
  Right,
}

impl Direction {
  pub const ALL: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
  ];

  pub fn opposite(self) -> Direction {
    match self {
      Direction::Up => Direction::Down,
      Direction::Down => Direction::Up,
      Direction::Left => Direction::Right,
      Direction::Right => Direction::Left,
    }
  }

  /// Unit step in screen coordinates (y grows downwards).
  pub fn delta(self) -> (f64, f64) {
    match self {
      Direction::Up => (0.0, -1.0),
      Direction::Down => (0.0, 1.0),
      Direction::Left => (-1.0, 0.0),
      Direction::Right => (1.0, 0.0),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerupKind {
  Speed,
  Size,
  Invincible,
  Ghost,
  Magnet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffect {
  #[serde(rename = "type")]
  pub kind: PowerupKind,
  /// Remaining milliseconds.
  pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
  pub id: String,
  pub name: String,
  pub x: f64,
  pub y: f64,
  pub size: i64,
  pub score: i64,
  /// Head first.
  pub segments: Vec<Point>,
  pub color: String,
  pub skin: String,
  pub head: String,
  #[serde(default)]
  pub powerups: Vec<ActiveEffect>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub direction: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
  pub id: String,
  pub x: f64,
  pub y: f64,
  pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Powerup {
  pub id: String,
  pub x: f64,
  pub y: f64,
  #[serde(rename = "type")]
  pub kind: PowerupKind,
  pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
  pub players: Vec<Player>,
  pub food: Vec<Food>,
  pub powerups: Vec<Powerup>,
}

/// Full state push from a client. Overwrites the mutable fields of the sender's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
  pub x: f64,
  pub y: f64,
  pub segments: Vec<Point>,
  pub score: i64,
  pub size: i64,
  #[serde(default)]
  pub powerups: Vec<ActiveEffect>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub direction: Option<Direction>,
}
