use std::net::IpAddr;
use thiserror::Error;

/// Reasons a new connection is refused at admission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("too many connections from {origin} (limit {limit})")]
    TooManyConnectionsFromOrigin { origin: IpAddr, limit: usize },
    #[error("server full ({limit} players)")]
    ServerFull { limit: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick rate must be at least 1 Hz")]
    ZeroTickRate,
    #[error("tick rate {rate} Hz is above the {max} Hz limit")]
    TickRateTooHigh { rate: u32, max: u32 },
    #[error("`{0}` must be at least 1")]
    ZeroLimit(&'static str),
    #[error("min_players ({min}) exceeds max_players ({max})")]
    RosterBounds { min: usize, max: usize },
    #[error("a {width}x{height} grid cannot hold a starting snake")]
    GridTooSmall { width: i32, height: i32 },
}

/// Failures that stop the host process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
