pub const WORLD_WIDTH: f64 = 2000.0;
pub const WORLD_HEIGHT: f64 = 2000.0;
pub const FOOD_POOL_SIZE: usize = 50;
pub const POWERUP_POOL_SIZE: usize = 10;
pub const INITIAL_SEGMENTS: usize = 5;
pub const SEGMENT_SPACING: f64 = 20.0;
pub const INITIAL_SIZE: i64 = 20;
pub const TICK_MS: u64 = 100;
pub const FOOD_SCORE_REWARD: i64 = 10;
pub const FOOD_SIZE_GAIN: i64 = 2;
pub const SIZE_POWERUP_GAIN: i64 = 10;
pub const SPEED_EFFECT_MS: i64 = 5000;
pub const INVINCIBLE_EFFECT_MS: i64 = 3000;
pub const GHOST_EFFECT_MS: i64 = 3000;
pub const MAGNET_EFFECT_MS: i64 = 4000;
pub const POWERUP_COLOR: &str = "#ffaa00";
pub const DEFAULT_COSMETIC: &str = "default";
pub const SESSION_OUTBOUND_CAPACITY: usize = 256;

pub const SPAWNABLE_POWERUPS: [super::types::PowerupKind; 3] = [
  super::types::PowerupKind::Speed,
  super::types::PowerupKind::Size,
  super::types::PowerupKind::Invincible,
];
