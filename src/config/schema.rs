//! Configuration schema definitions.
//!
//! This module defines the file configuration for the supervised server.
//! All types derive Serde traits for deserialization from config files, and
//! every field is defaulted so a minimal (even empty) file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration (address, TLS, socket options).
    pub listener: ListenerConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Serving and shutdown timeouts.
    pub timeouts: TimeoutConfig,

    /// Panic recovery settings.
    pub recovery: RecoveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listen address: `host:port`, `:port`, `tcp4://host:port` or
    /// `unix://path`. Empty disables listening.
    pub address: String,

    /// Bind with `SO_REUSEPORT` so a replacement process can take over the port.
    pub reuse_port: bool,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:80".to_string(),
            reuse_port: true,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted request line + headers, in bytes.
    pub max_request_header_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_header_bytes: 2 * 1024,
        }
    }
}

/// Timeout configuration, in milliseconds. Zero disables a serving timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for reading a request body.
    pub read_request_ms: u64,

    /// Deadline for reading the request headers.
    pub read_header_ms: u64,

    /// Deadline for producing a response.
    pub write_response_ms: u64,

    /// Keep-alive idle timeout.
    pub idle_connection_ms: u64,

    /// Bound on the graceful shutdown.
    pub shutdown_ms: u64,

    /// Extra wait for requests still in flight after the graceful shutdown.
    pub force_shutdown_ms: u64,
}

impl TimeoutConfig {
    pub fn read_request(&self) -> Duration {
        Duration::from_millis(self.read_request_ms)
    }

    pub fn read_header(&self) -> Duration {
        Duration::from_millis(self.read_header_ms)
    }

    pub fn write_response(&self) -> Duration {
        Duration::from_millis(self.write_response_ms)
    }

    pub fn idle_connection(&self) -> Duration {
        Duration::from_millis(self.idle_connection_ms)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_millis(self.shutdown_ms)
    }

    pub fn force_shutdown(&self) -> Duration {
        Duration::from_millis(self.force_shutdown_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_request_ms: 5_000,
            read_header_ms: 1_000,
            write_response_ms: 90_000,
            idle_connection_ms: 30_000,
            shutdown_ms: 5_000,
            force_shutdown_ms: 1_000,
        }
    }
}

/// Panic recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Catch handler panics and answer 500.
    pub enabled: bool,

    /// Include a sanitised dump of the request in panic logs.
    pub dump_requests: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dump_requests: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_filter: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "http_supervisor=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
