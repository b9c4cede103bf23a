//! # Protocol Layer
//!
//! Everything above framing: the connection state machine, the versioned
//! packet tables, typed events, built-in state handling, and dispatch to
//! game-logic callbacks.
//!
//! ## Components
//! - **State**: `Handshaking → Status | Login → Play`, plus terminal `Closed`
//! - **Packets**: per-version, per-state id tables with decoders
//! - **Events**: one typed value per serverbound packet
//! - **Clientbound**: the outbound payloads the protocol sends itself
//! - **Handshake**: transitions and record updates owned by the protocol
//! - **Dispatcher**: routing, callbacks, and the per-connection error policy

pub mod clientbound;
pub mod dispatcher;
pub mod events;
pub mod handshake;
pub mod packets;
pub mod state;

pub use dispatcher::{Dispatcher, ErrorAction, HandlerContext};
pub use events::{Event, EventKind};
pub use state::ConnectionState;

#[cfg(test)]
mod tests;
