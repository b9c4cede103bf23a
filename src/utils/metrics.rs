//! Observability and Metrics
//!
//! Process-wide atomic counters for the server: connections, frames, bytes and
//! the protocol errors that closed connections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently registered connections
    pub connections_active: AtomicU64,
    /// Connections refused because the server was full
    pub connections_rejected: AtomicU64,
    /// Legacy server list pings answered
    pub legacy_pings: AtomicU64,
    /// Logins that reached the play state
    pub logins: AtomicU64,
    /// Frames decoded from clients
    pub frames_received: AtomicU64,
    /// Frames queued to clients
    pub frames_sent: AtomicU64,
    /// Bytes read from sockets
    pub bytes_received: AtomicU64,
    /// Bytes written to sockets
    pub bytes_sent: AtomicU64,
    /// Frame or dispatch errors of any kind
    pub protocol_errors: AtomicU64,
    /// Unknown packet ids for the connection's state
    pub invalid_packets: AtomicU64,
    /// Connections closed for missing keep-alives
    pub keep_alive_timeouts: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            legacy_pings: AtomicU64::new(0),
            logins: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            invalid_packets: AtomicU64::new(0),
            keep_alive_timeouts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn legacy_ping(&self) {
        self.legacy_pings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame written, with its encoded size
    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_packet(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keep_alive_timeout(&self) {
        self.keep_alive_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            legacy_pings: self.legacy_pings.load(Ordering::Relaxed),
            logins: self.logins.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            keep_alive_timeouts: self.keep_alive_timeouts.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            legacy_pings = snapshot.legacy_pings,
            logins = snapshot.logins,
            frames_received = snapshot.frames_received,
            frames_sent = snapshot.frames_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            protocol_errors = snapshot.protocol_errors,
            invalid_packets = snapshot.invalid_packets,
            keep_alive_timeouts = snapshot.keep_alive_timeouts,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub legacy_pings: u64,
    pub logins: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub protocol_errors: u64,
    pub invalid_packets: u64,
    pub keep_alive_timeouts: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Logs how long the enclosing scope took when dropped.
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_us = self.start.elapsed().as_micros() as u64,
            "Operation completed"
        );
    }
}
