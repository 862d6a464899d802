use super::constants::{
  DEFAULT_COSMETIC, FOOD_POOL_SIZE, FOOD_SCORE_REWARD, FOOD_SIZE_GAIN, GHOST_EFFECT_MS,
  INITIAL_SEGMENTS, INITIAL_SIZE, INVINCIBLE_EFFECT_MS, MAGNET_EFFECT_MS, POWERUP_COLOR,
  POWERUP_POOL_SIZE, SEGMENT_SPACING, SIZE_POWERUP_GAIN, SPAWNABLE_POWERUPS, SPEED_EFFECT_MS,
  WORLD_HEIGHT, WORLD_WIDTH,
};
use super::types::{
  ActiveEffect, Food, Player, PlayerUpdate, Point, Powerup, PowerupKind, WorldSnapshot,
};
use rand::Rng;
use std::collections::HashMap;
use uuid::Uuid;

/// Authoritative in-memory world: players keyed by connection identity plus the
/// fixed-size food and powerup pools.
#[derive(Debug)]
pub struct EntityStore {
  players: HashMap<String, Player>,
  food: Vec<Food>,
  powerups: Vec<Powerup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodEaten {
  pub food_id: String,
  pub replacement: Food,
  pub score: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerupCollected {
  pub powerup_id: String,
  pub kind: PowerupKind,
  pub replacement: Powerup,
  /// `None` for instant powerups such as `size`.
  pub effect: Option<ActiveEffect>,
}

impl EntityStore {
  pub fn new() -> Self {
    Self::with_pools(FOOD_POOL_SIZE, POWERUP_POOL_SIZE)
  }

  pub fn with_pools(food_count: usize, powerup_count: usize) -> Self {
    let mut rng = rand::thread_rng();
    Self {
      players: HashMap::new(),
      food: (0..food_count).map(|_| random_food(&mut rng)).collect(),
      powerups: (0..powerup_count).map(|_| random_powerup(&mut rng)).collect(),
    }
  }

  pub fn player(&self, id: &str) -> Option<&Player> {
    self.players.get(id)
  }

  pub fn player_count(&self) -> usize {
    self.players.len()
  }

  pub fn food(&self) -> &[Food] {
    &self.food
  }

  pub fn powerups(&self) -> &[Powerup] {
    &self.powerups
  }

  /// Seeds a default player for `id` and inserts it, replacing any previous record.
  pub fn spawn_player(&mut self, id: &str) -> Player {
    let player = new_player(id, &mut rand::thread_rng());
    self.add_player(player.clone());
    player
  }

  pub fn add_player(&mut self, player: Player) {
    self.players.insert(player.id.clone(), player);
  }

  pub fn remove_player(&mut self, id: &str) -> Option<Player> {
    self.players.remove(id)
  }

  /// Last writer wins. An empty body is ignored so the head always exists.
  pub fn update_player(&mut self, id: &str, update: PlayerUpdate) -> Option<&Player> {
    let player = self.players.get_mut(id)?;
    player.x = update.x;
    player.y = update.y;
    if !update.segments.is_empty() {
      player.segments = update.segments;
    }
    player.score = update.score;
    player.size = update.size;
    player.powerups = update.powerups;
    if update.direction.is_some() {
      player.direction = update.direction;
    }
    Some(player)
  }

  pub fn consume_food(&mut self, id: &str, food_id: &str) -> Option<FoodEaten> {
    let player = self.players.get_mut(id)?;
    let index = self.food.iter().position(|food| food.id == food_id)?;
    let eaten = self.food.remove(index);
    let replacement = random_food(&mut rand::thread_rng());
    self.food.push(replacement.clone());

    player.score = player.score.saturating_add(FOOD_SCORE_REWARD);
    player.size = player.size.saturating_add(FOOD_SIZE_GAIN);
    Some(FoodEaten {
      food_id: eaten.id,
      replacement,
      score: player.score,
    })
  }

  pub fn consume_powerup(&mut self, id: &str, powerup_id: &str) -> Option<PowerupCollected> {
    let player = self.players.get_mut(id)?;
    let index = self
      .powerups
      .iter()
      .position(|powerup| powerup.id == powerup_id)?;
    let collected = self.powerups.remove(index);
    let replacement = random_powerup(&mut rand::thread_rng());
    self.powerups.push(replacement.clone());

    let effect = match effect_duration(collected.kind) {
      Some(duration) => {
        let effect = ActiveEffect {
          kind: collected.kind,
          duration,
        };
        player.powerups.retain(|active| active.kind != effect.kind);
        player.powerups.push(effect.clone());
        Some(effect)
      }
      None => {
        player.size = player.size.saturating_add(SIZE_POWERUP_GAIN);
        None
      }
    };

    Some(PowerupCollected {
      powerup_id: collected.id,
      kind: collected.kind,
      replacement,
      effect,
    })
  }

  /// Respawns the player at a fresh position with default size, score and body.
  pub fn reset_player(&mut self, id: &str) -> Option<&Player> {
    let player = self.players.get_mut(id)?;
    let mut rng = rand::thread_rng();
    let (x, y) = random_position(&mut rng);
    player.x = x;
    player.y = y;
    player.score = 0;
    player.size = INITIAL_SIZE;
    player.segments = lay_body(x, y);
    player.powerups.clear();
    player.direction = None;
    Some(player)
  }

  /// Ages every active effect by `elapsed_ms`, dropping those at or below zero.
  pub fn age_effects(&mut self, elapsed_ms: i64) {
    for player in self.players.values_mut() {
      player.powerups.retain_mut(|effect| {
        effect.duration = effect.duration.saturating_sub(elapsed_ms);
        effect.duration > 0
      });
    }
  }

  pub fn snapshot(&self) -> WorldSnapshot {
    WorldSnapshot {
      players: self.players.values().cloned().collect(),
      food: self.food.clone(),
      powerups: self.powerups.clone(),
    }
  }
}

impl Default for EntityStore {
  fn default() -> Self {
    Self::new()
  }
}

fn effect_duration(kind: PowerupKind) -> Option<i64> {
  match kind {
    PowerupKind::Speed => Some(SPEED_EFFECT_MS),
    PowerupKind::Invincible => Some(INVINCIBLE_EFFECT_MS),
    PowerupKind::Ghost => Some(GHOST_EFFECT_MS),
    PowerupKind::Magnet => Some(MAGNET_EFFECT_MS),
    PowerupKind::Size => None,
  }
}

pub fn new_id() -> String {
  Uuid::new_v4().to_string()
}

fn random_position(rng: &mut impl Rng) -> (f64, f64) {
  (rng.gen::<f64>() * WORLD_WIDTH, rng.gen::<f64>() * WORLD_HEIGHT)
}

fn random_color(rng: &mut impl Rng) -> String {
  format!("hsl({:.0}, 70%, 50%)", rng.gen::<f64>() * 360.0)
}

/// Collinear body trailing to the left of the head.
pub fn lay_body(x: f64, y: f64) -> Vec<Point> {
  (0..INITIAL_SEGMENTS)
    .map(|index| Point {
      x: x - index as f64 * SEGMENT_SPACING,
      y,
    })
    .collect()
}

pub fn new_player(id: &str, rng: &mut impl Rng) -> Player {
  let (x, y) = random_position(rng);
  let short: String = id.chars().take(4).collect();
  Player {
    id: id.to_string(),
    name: format!("Player {short}"),
    x,
    y,
    size: INITIAL_SIZE,
    score: 0,
    segments: lay_body(x, y),
    color: random_color(rng),
    skin: DEFAULT_COSMETIC.to_string(),
    head: DEFAULT_COSMETIC.to_string(),
    powerups: Vec::new(),
    direction: None,
  }
}

fn random_food(rng: &mut impl Rng) -> Food {
  let (x, y) = random_position(rng);
  Food {
    id: new_id(),
    x,
    y,
    color: random_color(rng),
  }
}

fn random_powerup(rng: &mut impl Rng) -> Powerup {
  let (x, y) = random_position(rng);
  Powerup {
    id: new_id(),
    x,
    y,
    kind: SPAWNABLE_POWERUPS[rng.gen_range(0..SPAWNABLE_POWERUPS.len())],
    color: POWERUP_COLOR.to_string(),
  }
}
