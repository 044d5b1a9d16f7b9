// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS-XRCE v1.0 agent/client bridge.
//!
//! Implements the OMG DDS-XRCE (eXtremely Resource Constrained Environments)
//! protocol for bridging resource-constrained devices (MCUs, sensors, embedded
//! Linux) into a full DDS network.
//!
//! # Architecture
//!
//! ```text
//! XRCE Client (MCU)                XRCE Agent (this crate)         DDS Network
//!   ESP32 / STM32                    Linux / Windows
//!        |                                |                            |
//!        |--- CREATE_CLIENT ------------>|                            |
//!        |--- CREATE(topic) ------------>|--- create DDS reader ----->|
//!        |--- WRITE_DATA(payload) ------>|--- DDS write ------------->|
//!        |<-- DATA(payload) -------------|<-- DDS sample ------------|
//!        |--- DELETE ------------------->|--- cleanup --------------->|
//! ```
//!
//! # Key Features
//!
//! - **Transport-agnostic**: Supports UDP, Serial (UART), and TCP transports
//! - **DDS-agnostic**: Any DDS implementation can be plugged in via [`Middleware`]
//! - **Fragmentation**: Large payloads are fragmented and reassembled transparently
//! - **Session management**: Reliable delivery with sequence numbers and heartbeats
//!
//! # Transports
//!
//! | Transport | Use Case | MTU |
//! |-----------|----------|-----|
//! | [`UdpTransport`] | WiFi / Ethernet MCUs | 1500 |
//! | [`SerialTransport`] | UART / RS-485 / HC-12 | 64-256 |
//! | [`TcpTransport`] | Cloud / NAT traversal | 65535 |

pub mod agent;
pub mod config;
pub mod error;
pub mod graph;
pub mod message;
pub mod middleware;
pub mod processor;
pub mod proxy_client;
pub mod readjob;
pub mod root;
pub mod streams;
pub mod submessage;
pub mod transport;
pub mod wire;

// Re-exports for convenience.
pub use agent::{AgentHandle, XrceAgent};
pub use config::XrceAgentConfig;
pub use error::XrceError;
pub use graph::{Object, ObjectGraph};
pub use message::{InputMessage, MessageHeader, OutputMessage, SubmessageHeader};
pub use middleware::{Handle, Middleware, NullMiddleware, ReadSpec};
pub use processor::{Outbound, Processor};
pub use proxy_client::{classify_liveliness, Liveliness, ProxyClient};
pub use readjob::ReadJob;
pub use root::Root;
pub use streams::{Stream, StreamSet};
pub use submessage::{Submessage, SubmessageId, WirePayload};
pub use transport::{SerialTransport, TcpTransport, TransportAddr, UdpTransport, XrceTransport};
pub use wire::{CdrReader, CdrWriter, ClientKey, ObjectId, ObjectKind, RequestId, SessionId, StreamId};

#[cfg(test)]
mod tests;
