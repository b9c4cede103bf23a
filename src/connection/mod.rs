//! Connection records, their locks, and the registry of live connections.

pub mod lock;
pub mod record;
pub mod registry;

pub use lock::{Access, LazyGuard, Upgrade, UpgradeLock};
pub use record::{Connection, ConnectionData, ConnectionId, Liveness, Outbound, PlayerPosition};
pub use registry::ConnectionRegistry;
