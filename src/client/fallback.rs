use super::roster::{PlayerPatch, RosterEvent};
use super::world::{lock, SharedWorld};
use super::{ConnectionState, ConnectionStats, Netplay};
use crate::config::FallbackConfig;
use crate::game::types::{Direction, Food, Point};
use crate::protocol::ClientMessage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

/// Prefix reserved for synthetic identities. Server identities are UUIDs and
/// never contain an underscore.
pub const SYNTHETIC_PREFIX: &str = "virtual_";

const NAMES: [&str; 5] = ["Alex", "Maria", "Dmitry", "Anna", "Sergey"];
const SKINS: [&str; 5] = ["default", "neon", "golden", "rainbow", "fire"];
const COLORS: [&str; 5] = ["#ff6b6b", "#ffd166", "#06d6a0", "#4dabf7", "#f06595"];

pub fn is_synthetic_id(id: &str) -> bool {
    id.starts_with(SYNTHETIC_PREFIX)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPlayer {
    pub id: String,
    pub name: String,
    pub skin: String,
    pub color: String,
    pub body: Vec<Point>,
    pub direction: Direction,
    pub score: i64,
}

impl SyntheticPlayer {
    fn full_patch(&self) -> PlayerPatch {
        let head = self.body.first().copied();
        PlayerPatch {
            id: self.id.clone(),
            name: Some(self.name.clone()),
            color: Some(self.color.clone()),
            skin: Some(self.skin.clone()),
            head: Some("default".to_string()),
            x: head.map(|point| point.x),
            y: head.map(|point| point.y),
            segments: Some(self.body.clone()),
            direction: Some(self.direction),
            score: Some(self.score),
            size: Some(self.body.len() as i64),
            effects: Some(Vec::new()),
        }
    }

    fn motion_patch(&self) -> PlayerPatch {
        PlayerPatch {
            name: None,
            color: None,
            skin: None,
            head: None,
            ..self.full_patch()
        }
    }
}

/// Synthetic roster plus its AI. Deterministic for a given rng.
#[derive(Debug)]
pub struct LocalSimulation {
    players: Vec<SyntheticPlayer>,
    config: FallbackConfig,
    rng: StdRng,
}

impl LocalSimulation {
    pub fn new(config: FallbackConfig, mut rng: StdRng) -> Self {
        let players = (0..config.roster_size)
            .map(|index| {
                let cells = 20;
                let start_x = rng.gen_range(0..cells) as f64 * config.grid_size;
                let start_y = rng.gen_range(0..cells) as f64 * config.grid_size;
                SyntheticPlayer {
                    id: format!("{SYNTHETIC_PREFIX}{index}"),
                    name: NAMES[index % NAMES.len()].to_string(),
                    skin: SKINS[index % SKINS.len()].to_string(),
                    color: COLORS[index % COLORS.len()].to_string(),
                    body: (0..config.initial_length)
                        .map(|offset| Point {
                            x: start_x - offset as f64 * config.grid_size,
                            y: start_y,
                        })
                        .collect(),
                    direction: Direction::Right,
                    score: rng.gen_range(0..1000),
                }
            })
            .collect();
        Self {
            players,
            config,
            rng,
        }
    }

    pub fn players(&self) -> &[SyntheticPlayer] {
        &self.players
    }

    /// One `Joined` per synthetic player, as a server would announce them.
    pub fn joined_events(&self) -> Vec<RosterEvent> {
        self.players
            .iter()
            .map(|player| RosterEvent::Joined(player.full_patch()))
            .collect()
    }

    /// A grid-aligned food item inside the arena, for worlds no server has fed.
    pub fn local_food(&mut self) -> Food {
        let columns = (self.config.width / self.config.grid_size).max(1.0) as u32;
        let rows = (self.config.height / self.config.grid_size).max(1.0) as u32;
        Food {
            id: format!("{SYNTHETIC_PREFIX}food"),
            x: self.rng.gen_range(0..columns) as f64 * self.config.grid_size,
            y: self.rng.gen_range(0..rows) as f64 * self.config.grid_size,
            color: COLORS[0].to_string(),
        }
    }

    /// Advances every synthetic player one step toward `food`.
    pub fn step(&mut self, food: Option<Point>) -> Vec<RosterEvent> {
        let mut events = Vec::with_capacity(self.players.len());
        for index in 0..self.players.len() {
            self.advance(index, food);
            events.push(RosterEvent::Updated(self.players[index].motion_patch()));
        }
        events
    }

    fn advance(&mut self, index: usize, food: Option<Point>) {
        let config = &self.config;
        let player = &mut self.players[index];
        let Some(head) = player.body.first().copied() else { return };

        if let Some(target) = food {
            player.direction = greedy_direction(head, target, player.direction);
        }
        let (dx, dy) = player.direction.delta();
        let next = Point {
            x: head.x + dx * config.grid_size,
            y: head.y + dy * config.grid_size,
        };
        if next.x < 0.0 || next.x >= config.width || next.y < 0.0 || next.y >= config.height {
            player.direction = Direction::ALL[self.rng.gen_range(0..Direction::ALL.len())];
            return;
        }

        player.body.insert(0, next);
        player.body.pop();

        if self.rng.gen_bool(config.growth_chance) {
            if let Some(tail) = player.body.last().copied() {
                player.body.push(tail);
            }
            player.score += config.growth_reward;
        }
    }
}

/// Picks the heading that closes the larger axis gap first, never reversing.
pub fn greedy_direction(head: Point, target: Point, current: Direction) -> Direction {
    let dx = target.x - head.x;
    let dy = target.y - head.y;
    let horizontal = if dx > 0.0 {
        Some(Direction::Right)
    } else if dx < 0.0 {
        Some(Direction::Left)
    } else {
        None
    };
    let vertical = if dy > 0.0 {
        Some(Direction::Down)
    } else if dy < 0.0 {
        Some(Direction::Up)
    } else {
        None
    };
    let preferred = if dx.abs() >= dy.abs() {
        [horizontal, vertical]
    } else {
        [vertical, horizontal]
    };
    preferred
        .into_iter()
        .flatten()
        .find(|direction| *direction != current.opposite())
        .unwrap_or(current)
}

/// Degraded-mode feed: synthetic peers pushed into the mirror on a fixed tick.
pub struct FallbackSimulation {
    task: JoinHandle<()>,
    roster_size: usize,
}

impl FallbackSimulation {
    /// Seeds the roster into `world` immediately, then spawns the tick loop.
    pub fn activate(config: FallbackConfig, world: SharedWorld) -> Self {
        Self::activate_with_rng(config, world, StdRng::from_entropy())
    }

    pub fn activate_with_rng(config: FallbackConfig, world: SharedWorld, rng: StdRng) -> Self {
        let tick = config.tick;
        let roster_size = config.roster_size;
        let mut simulation = LocalSimulation::new(config, rng);
        {
            let mut world = lock(&world);
            if world.food().is_empty() {
                world.set_food(vec![simulation.local_food()]);
            }
            for event in simulation.joined_events() {
                world.apply_roster_event(event);
            }
        }
        tracing::info!(players = roster_size, "local simulation activated");

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut world = lock(&world);
                let food = world.current_food();
                for event in simulation.step(food) {
                    world.apply_roster_event(event);
                }
                world.expire_powerups(std::time::Instant::now());
            }
        });

        Self { task, roster_size }
    }

    pub fn roster_size(&self) -> usize {
        self.roster_size
    }
}

impl Netplay for FallbackSimulation {
    fn state(&self) -> ConnectionState {
        ConnectionState::Degraded
    }

    fn send(&self, _message: ClientMessage) -> bool {
        false
    }

    fn set_hidden(&self, _hidden: bool) {}

    fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            state: ConnectionState::Degraded,
            reconnect_attempts: 0,
            synthetic_players: self.roster_size,
        }
    }
}

impl Drop for FallbackSimulation {
    fn drop(&mut self) {
        self.task.abort();
    }
}
