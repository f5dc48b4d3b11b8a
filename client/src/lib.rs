//! # Snake Arena Client Library
//!
//! Client side of the arena: connect to a host, receive board updates,
//! hand the newest one to a renderer and send the player's heading back.
//!
//! ## Task Layout
//!
//! Two activities run concurrently on every client:
//!
//! - The **receiver** task reads newline-delimited JSON frames from the
//!   host and stores them in a [`mailbox::SnapshotMailbox`]. Only the newest
//!   snapshot is kept, so a slow renderer skips ticks instead of falling
//!   behind.
//! - The **render/send loop** in [`network::Client::run`] draws the latest
//!   snapshot at most once per tick and, on its own cadence, sends the
//!   current intended direction from [`input::LocalInput`].
//!
//! When the host closes the connection or a read fails the mailbox is
//! marked disconnected and the loop hands the reason to
//! [`rendering::Renderer::disconnected`].
//!
//! ## Modules
//!
//! - `input`: key mapping and the direction slot
//! - `mailbox`: last-write-wins snapshot hand-off and connection status
//! - `network`: receiver, input sender and the client driver
//! - `rendering`: the `Renderer` seam plus a logging implementation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::LocalInput;
//! use client::network::{Client, ClientSettings};
//! use client::rendering::LogRenderer;
//!
//! # async fn demo() -> Result<(), client::network::ClientError> {
//! let client = Client::connect("127.0.0.1:65432").await?;
//! let input = LocalInput::new();
//! let mut renderer = LogRenderer::new();
//! client.run(&mut renderer, &input, ClientSettings::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod input;
pub mod mailbox;
pub mod network;
pub mod rendering;
