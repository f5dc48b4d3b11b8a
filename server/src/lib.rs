//! # Wormy Host
//!
//! Authoritative host for the multiplayer snake arena. The host owns the
//! only copy of the world, advances it at a fixed tick rate and streams a
//! snapshot of every live snake to all connected clients.
//!
//! ## Task layout
//!
//! - **Accept loop**: admits TCP connections through the session registry
//!   and spawns one supervised task per session
//! - **Session task**: a reader that decodes client frames into the input
//!   queue and a writer that drains the session's outbound frame queue
//! - **Game loop**: waits in the lobby, spawns the snakes, then on every
//!   tick drains the input queue, steps the world and publishes the
//!   snapshot
//!
//! Only the session registry and the input queue are shared between tasks.
//! The world itself lives on the game loop's stack and is never aliased.
//!
//! ## Modules
//!
//! - [`config`]: immutable host configuration
//! - [`session`]: session registry, admission limits and cleanup guard
//! - [`input`]: bounded drop-oldest input queue
//! - [`game`]: snakes, spawning and the tick step
//! - [`broadcast`]: snapshot fan-out with slow-client eviction
//! - [`network`]: listener, session tasks and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         listen_addr: "127.0.0.1:65432".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     let summary = server.run().await?;
//!     println!("Round lasted {} ticks", summary.ticks);
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
pub mod session;

pub use error::{AdmissionError, ConfigError, ServerError};
