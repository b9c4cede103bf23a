//! # mcproto
//!
//! Protocol engine for a Minecraft-style game server (protocol 340, 1.12.2).
//!
//! ## Layers
//! - [`core`]: VarNum codec, wire primitives, frame splitting
//! - [`protocol`]: state machine, versioned packet tables, dispatch
//! - [`connection`]: connection records, upgradeable locks, registry
//! - [`transport`]: TCP multiplexer and handler worker pool
//! - [`utils`]: identity, logging, metrics
//!
//! ## Example
//! ```no_run
//! use mcproto::config::NetworkConfig;
//! use mcproto::protocol::{Event, EventKind};
//! use mcproto::transport::Server;
//!
//! # async fn run() -> mcproto::error::Result<()> {
//! let server = Server::new(NetworkConfig::default())?;
//! server.dispatcher().on(EventKind::ChatMessage, |ctx, event| {
//!     if let Event::ChatMessage(chat) = event {
//!         tracing::info!(conn_id = ctx.id(), message = %chat.message, "chat");
//!     }
//!     Ok(())
//! });
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
