//! Authoritative snake simulation. The tick loop owns the [`World`]
//! exclusively; other tasks only ever see the snapshots it emits.

use crate::input::InputEvent;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    palette_color, Color, Direction, GridSize, PlayerId, Position, SnakeState, WorldSnapshot,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use thiserror::Error;

pub const SPAWN_LENGTH: usize = 3;
pub const SPAWN_DIRECTION: Direction = Direction::Right;

/// Classic start lanes, head first.
pub const START_LANES: [[(i32, i32); SPAWN_LENGTH]; 3] = [
    [(5, 5), (5, 6), (5, 7)],
    [(5, 20), (5, 21), (5, 22)],
    [(5, 40), (5, 41), (5, 42)],
];

const RANDOM_SPAWN_ATTEMPTS: usize = 256;

/// Broken engine invariant. Never expected; the affected snake is eliminated.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("snake has no body")]
    EmptyBody,
    #[error("body length changed from {expected} to {actual}")]
    LengthChanged { expected: usize, actual: usize },
    #[error("head at ({x}, {y}) lies outside the grid")]
    HeadOutOfBounds { x: i32, y: i32 },
    #[error("body occupies a cell twice")]
    Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elimination {
    Boundary,
    SelfCollision,
    Invariant(InvariantViolation),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpawnError {
    #[error("player {0} already has a snake")]
    AlreadySpawned(PlayerId),
    #[error("no free lane for player {0}")]
    NoFreeLane(PlayerId),
    #[error("snake body is empty")]
    EmptyBody,
}

#[derive(Debug, Clone)]
pub struct Snake {
    pub id: PlayerId,
    body: VecDeque<Position>,
    direction: Direction,
    /// Direction the next move will use
    pending: Direction,
    color: Color,
    length: usize,
}

impl Snake {
    pub fn new(
        id: PlayerId,
        coords: Vec<Position>,
        direction: Direction,
        color: Color,
    ) -> Result<Self, SpawnError> {
        if coords.is_empty() {
            return Err(SpawnError::EmptyBody);
        }
        Ok(Self {
            id,
            length: coords.len(),
            body: coords.into(),
            direction,
            pending: direction,
            color,
        })
    }

    pub fn head(&self) -> Option<Position> {
        self.body.front().copied()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn len(&self) -> usize {
        self.body.len()
    }

    pub fn occupies(&self, pos: Position) -> bool {
        self.body.contains(&pos)
    }

    /// Requests a new heading for the next move. A reversal of the
    /// committed direction is refused.
    pub fn steer(&mut self, direction: Direction) -> bool {
        if direction.is_opposite(self.direction) {
            return false;
        }
        self.pending = direction;
        true
    }

    fn advance(&mut self, new_head: Position) {
        self.body.push_front(new_head);
        self.body.pop_back();
        self.direction = self.pending;
    }

    fn check_invariants(&self, grid: &GridSize) -> Result<(), InvariantViolation> {
        let head = self.head().ok_or(InvariantViolation::EmptyBody)?;
        if self.len() != self.length {
            return Err(InvariantViolation::LengthChanged {
                expected: self.length,
                actual: self.len(),
            });
        }
        if !grid.contains(head) {
            return Err(InvariantViolation::HeadOutOfBounds {
                x: head.x,
                y: head.y,
            });
        }
        let distinct: HashSet<&Position> = self.body.iter().collect();
        if distinct.len() != self.len() {
            return Err(InvariantViolation::Overlap);
        }
        Ok(())
    }

    pub fn state(&self) -> SnakeState {
        SnakeState {
            id: self.id,
            coords: self.body.iter().copied().collect(),
            color: self.color,
            direction: self.direction,
        }
    }
}

/// Result of one simulation step.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub snapshot: WorldSnapshot,
    pub eliminated: Vec<(PlayerId, Elimination)>,
}

pub struct World {
    grid: GridSize,
    tick: u64,
    snakes: BTreeMap<PlayerId, Snake>,
    spawned: usize,
    rng: StdRng,
}

impl World {
    pub fn new(grid: GridSize, seed: u64) -> Self {
        Self {
            grid,
            tick: 0,
            snakes: BTreeMap::new(),
            spawned: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn alive_count(&self) -> usize {
        self.snakes.len()
    }

    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.snakes.contains_key(&id)
    }

    pub fn snake(&self, id: PlayerId) -> Option<&Snake> {
        self.snakes.get(&id)
    }

    /// Creates a snake for `id`, using the next start lane when it fits
    /// and is free, otherwise a random free vertical lane.
    pub fn spawn(&mut self, id: PlayerId) -> Result<SnakeState, SpawnError> {
        if self.snakes.contains_key(&id) {
            return Err(SpawnError::AlreadySpawned(id));
        }

        let coords = self
            .start_lane(self.spawned)
            .or_else(|| self.random_lane())
            .ok_or(SpawnError::NoFreeLane(id))?;

        let color = palette_color(self.spawned);
        let snake = Snake::new(id, coords, SPAWN_DIRECTION, color)?;
        let state = snake.state();

        self.spawned += 1;
        self.snakes.insert(id, snake);
        info!("Spawned player {} at {:?}", id, state.head());
        Ok(state)
    }

    /// Places a fully specified snake. Fails if any cell is taken or off the grid.
    pub fn insert(&mut self, snake: Snake) -> Result<(), SpawnError> {
        if self.snakes.contains_key(&snake.id) {
            return Err(SpawnError::AlreadySpawned(snake.id));
        }
        let coords: Vec<Position> = snake.body.iter().copied().collect();
        if !self.lane_is_free(&coords) {
            return Err(SpawnError::NoFreeLane(snake.id));
        }
        self.spawned += 1;
        self.snakes.insert(snake.id, snake);
        Ok(())
    }

    fn start_lane(&self, index: usize) -> Option<Vec<Position>> {
        let lane: Vec<Position> = START_LANES
            .get(index)?
            .iter()
            .map(|&(x, y)| Position::new(x, y))
            .collect();
        self.lane_is_free(&lane).then_some(lane)
    }

    fn random_lane(&mut self) -> Option<Vec<Position>> {
        let len = SPAWN_LENGTH as i32;
        let max_x = (self.grid.width - 1).max(1);
        let max_y = self.grid.height - len;
        if max_y < 0 {
            return None;
        }

        for _ in 0..RANDOM_SPAWN_ATTEMPTS {
            let x = self.rng.gen_range(0..max_x);
            let y = self.rng.gen_range(0..=max_y);
            let lane: Vec<Position> = (0..len).map(|i| Position::new(x, y + i)).collect();
            if self.lane_is_free(&lane) {
                return Some(lane);
            }
        }
        None
    }

    fn lane_is_free(&self, lane: &[Position]) -> bool {
        lane.iter().all(|&pos| {
            self.grid.contains(pos) && !self.snakes.values().any(|snake| snake.occupies(pos))
        })
    }

    /// Advances the world by one tick.
    ///
    /// Input is applied in arrival order, so the last accepted event per
    /// player wins. Each live snake then moves one cell; leaving the grid or
    /// running into its own body eliminates it for good. Snakes of different
    /// players may share a cell.
    pub fn step(&mut self, events: &[InputEvent]) -> TickOutcome {
        self.tick += 1;

        for event in events {
            match self.snakes.get_mut(&event.player) {
                Some(snake) => {
                    if !snake.steer(event.direction) {
                        debug!(
                            "Player {} tried to reverse into {:?}",
                            event.player, event.direction
                        );
                    }
                }
                None => debug!("Ignoring input for player {} without a snake", event.player),
            }
        }

        let grid = self.grid;
        let mut eliminated = Vec::new();

        for snake in self.snakes.values_mut() {
            let Some(head) = snake.head() else {
                eliminated.push((snake.id, Elimination::Invariant(InvariantViolation::EmptyBody)));
                continue;
            };
            let new_head = head.step(snake.pending);

            if !grid.contains(new_head) {
                eliminated.push((snake.id, Elimination::Boundary));
                continue;
            }
            if snake.occupies(new_head) {
                eliminated.push((snake.id, Elimination::SelfCollision));
                continue;
            }

            snake.advance(new_head);

            if let Err(violation) = snake.check_invariants(&grid) {
                error!("Player {} violated an engine invariant: {}", snake.id, violation);
                eliminated.push((snake.id, Elimination::Invariant(violation)));
            }
        }

        for (id, reason) in &eliminated {
            self.snakes.remove(id);
            info!("Player {} eliminated on tick {}: {:?}", id, self.tick, reason);
        }

        TickOutcome {
            snapshot: self.snapshot(),
            eliminated,
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            snakes: self.snakes.values().map(Snake::state).collect(),
        }
    }
}
