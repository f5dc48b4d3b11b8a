//! Host configuration. Built once at startup and shared read-only.

use crate::error::ConfigError;
use crate::game::SPAWN_LENGTH;
use shared::{GridSize, DEFAULT_PORT, DEFAULT_TICK_RATE, MAX_CONNECTIONS_PER_ORIGIN, PALETTE};
use std::time::Duration;

/// Fastest tick the host accepts.
pub const MAX_TICK_RATE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` the listener binds to
    pub listen_addr: String,
    pub grid: GridSize,
    /// Simulation ticks per second
    pub tick_rate: u32,
    pub max_connections_per_origin: usize,
    /// Total live sessions, players and spectators alike
    pub max_players: usize,
    /// Sessions required before the lobby countdown starts
    pub min_players: usize,
    /// Delay between reaching `min_players` and the first tick
    pub lobby_wait: Duration,
    /// Pending input events kept between ticks
    pub input_capacity: usize,
    /// Frames queued per session before sends count as failures
    pub outbound_capacity: usize,
    pub write_timeout: Duration,
    /// Consecutive failed sends after which a session is dropped
    pub max_send_failures: u32,
    pub spawn_seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            grid: GridSize::default(),
            tick_rate: DEFAULT_TICK_RATE,
            max_connections_per_origin: MAX_CONNECTIONS_PER_ORIGIN,
            max_players: PALETTE.len(),
            min_players: 1,
            lobby_wait: Duration::from_secs(3),
            input_capacity: 256,
            outbound_capacity: 8,
            write_timeout: Duration::from_millis(200),
            max_send_failures: 3,
            spawn_seed: 0x5EED,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::TickRateTooHigh {
                rate: self.tick_rate,
                max: MAX_TICK_RATE,
            });
        }

        let limits = [
            ("max_connections_per_origin", self.max_connections_per_origin),
            ("max_players", self.max_players),
            ("min_players", self.min_players),
            ("input_capacity", self.input_capacity),
            ("outbound_capacity", self.outbound_capacity),
            ("max_send_failures", self.max_send_failures as usize),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroLimit(*name));
        }

        if self.min_players > self.max_players {
            return Err(ConfigError::RosterBounds {
                min: self.min_players,
                max: self.max_players,
            });
        }

        let side = SPAWN_LENGTH as i32;
        if self.grid.width < side || self.grid.height < side {
            return Err(ConfigError::GridTooSmall {
                width: self.grid.width,
                height: self.grid.height,
            });
        }

        Ok(())
    }
}
