//! # Utility Modules
//!
//! Supporting pieces used throughout the server.
//!
//! ## Components
//! - **Identity**: player name to UUID collaborator, with the offline default
//! - **Logging**: tracing subscriber setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: thread-safe observability counters

pub mod identity;
pub mod logging;
pub mod metrics;

pub use identity::{IdentityProvider, OfflineIdentity};
pub use metrics::{global_metrics, Metrics, MetricsSnapshot};
