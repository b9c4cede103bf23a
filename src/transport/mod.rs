//! # Transport Layer
//!
//! Sockets and threads: the TCP multiplexer and the worker pool that runs
//! packet handlers in per-connection order.

pub mod server;
pub mod worker;

pub use server::{Server, ServerHandle};
pub use worker::WorkerPool;
