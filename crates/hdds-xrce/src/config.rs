// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Agent configuration: defaults, file loading, validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::XrceError;

fn default_udp_port() -> u16 {
    2019
}
fn default_serial_baud() -> u32 {
    115_200
}
fn default_max_clients() -> usize {
    128
}
fn default_heartbeat_period_ms() -> u64 {
    200
}
fn default_liveliness_dead_threshold_ms() -> u64 {
    5_000
}
fn default_liveliness_probe_interval_ms() -> u64 {
    1_000
}
fn default_liveliness_remove_attempts() -> u32 {
    3
}
fn default_retention_window() -> usize {
    crate::streams::DEFAULT_RETENTION_WINDOW
}
fn default_output_mtu() -> usize {
    512
}
fn default_middleware_kind() -> String {
    "null".to_string()
}

/// Configuration for the XRCE agent, loadable from TOML via [`Self::from_file`]
/// or built programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrceAgentConfig {
    /// UDP listen port (default: 2019, the XRCE standard port).
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// Optional serial device path (e.g. "/dev/ttyUSB0").
    #[serde(default)]
    pub serial_device: Option<String>,
    /// Serial baud rate (default: 115200).
    #[serde(default = "default_serial_baud")]
    pub serial_baud: u32,
    /// Optional TCP listen port. If set, TCP transport is enabled.
    #[serde(default)]
    pub tcp_port: Option<u16>,
    /// Maximum concurrent clients (default: 128).
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Period between synthesized HEARTBEATs on reliable output streams.
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,
    /// How long without inbound traffic before a session is considered dead.
    #[serde(default = "default_liveliness_dead_threshold_ms")]
    pub liveliness_dead_threshold_ms: u64,
    /// Spacing between liveliness probes once a session is dead.
    #[serde(default = "default_liveliness_probe_interval_ms")]
    pub liveliness_probe_interval_ms: u64,
    /// Probe cycles a dead session gets before it is destroyed.
    #[serde(default = "default_liveliness_remove_attempts")]
    pub liveliness_remove_attempts: u32,
    /// Reliable-stream retention ring size (default 16).
    #[serde(default = "default_retention_window")]
    pub retention_window: usize,
    /// Maximum outgoing message size before fragmentation kicks in.
    #[serde(default = "default_output_mtu")]
    pub output_mtu: usize,
    /// Selects which `Middleware` implementation the agent binds to.
    #[serde(default = "default_middleware_kind")]
    pub middleware_kind: String,
}

impl Default for XrceAgentConfig {
    fn default() -> Self {
        Self {
            udp_port: default_udp_port(),
            serial_device: None,
            serial_baud: default_serial_baud(),
            tcp_port: None,
            max_clients: default_max_clients(),
            heartbeat_period_ms: default_heartbeat_period_ms(),
            liveliness_dead_threshold_ms: default_liveliness_dead_threshold_ms(),
            liveliness_probe_interval_ms: default_liveliness_probe_interval_ms(),
            liveliness_remove_attempts: default_liveliness_remove_attempts(),
            retention_window: default_retention_window(),
            output_mtu: default_output_mtu(),
            middleware_kind: default_middleware_kind(),
        }
    }
}

impl XrceAgentConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, XrceError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), XrceError> {
        if self.max_clients == 0 {
            return Err(XrceError::Config("max_clients must be > 0".into()));
        }
        // session_id is u8 so max 255 clients
        if self.max_clients > 255 {
            return Err(XrceError::Config(
                "max_clients must be <= 255 (session_id is u8)".into(),
            ));
        }
        if self.heartbeat_period_ms == 0 {
            return Err(XrceError::Config("heartbeat_period_ms must be > 0".into()));
        }
        if self.liveliness_dead_threshold_ms == 0 {
            return Err(XrceError::Config(
                "liveliness_dead_threshold_ms must be > 0".into(),
            ));
        }
        if self.liveliness_probe_interval_ms == 0 {
            return Err(XrceError::Config(
                "liveliness_probe_interval_ms must be > 0".into(),
            ));
        }
        if self.liveliness_remove_attempts == 0 {
            return Err(XrceError::Config(
                "liveliness_remove_attempts must be > 0".into(),
            ));
        }
        if self.retention_window == 0 {
            return Err(XrceError::Config("retention_window must be > 0".into()));
        }
        // minimum: message header + submessage header + minimal payload
        if self.output_mtu < 16 {
            return Err(XrceError::Config("output_mtu must be >= 16".into()));
        }
        if self.serial_baud == 0 {
            return Err(XrceError::Config("serial_baud must be > 0".into()));
        }
        Ok(())
    }

    pub fn liveliness_dead_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.liveliness_dead_threshold_ms)
    }

    pub fn liveliness_probe_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.liveliness_probe_interval_ms)
    }

    pub fn heartbeat_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_period_ms)
    }
}
