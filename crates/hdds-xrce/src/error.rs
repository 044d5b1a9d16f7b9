// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Crate-wide error type.

use thiserror::Error;

/// Errors produced by the XRCE subsystem.
#[derive(Debug, Error)]
pub enum XrceError {
    /// Not enough bytes to parse a header / payload.
    #[error("buffer too short")]
    BufferTooShort,

    /// Write capacity was exceeded while building a message.
    #[error("write capacity exceeded")]
    CapacityExceeded,

    /// Unknown submessage id.
    #[error("unknown submessage id: 0x{0:02x}")]
    UnknownSubmessageId(u8),

    /// Unknown object kind nibble.
    #[error("unknown object kind: 0x{0:02x}")]
    UnknownObjectKind(u8),

    /// Unknown status/result code.
    #[error("unknown status code: 0x{0:02x}")]
    UnknownStatusCode(u8),

    /// Union discriminator out of range for the type being read.
    #[error("union discriminator out of range: {0}")]
    BadDiscriminant(u32),

    /// Payload length does not match what the submessage header declared.
    #[error("payload length mismatch")]
    PayloadLengthMismatch,

    /// Root's client table is full (max_clients reached).
    #[error("client table full")]
    SessionFull,

    /// No ProxyClient for the given client key.
    #[error("unknown client key")]
    UnknownClient,

    /// Object not found for the given object id.
    #[error("object not found: {0:?}")]
    ObjectNotFound(crate::wire::ObjectId),

    /// Parent reference does not exist or is of the wrong kind.
    #[error("unknown or incompatible parent reference: {0:?}")]
    UnknownReference(crate::wire::ObjectId),

    /// CREATE collided with an existing object under `{reuse:0, replace:0}`.
    #[error("object already exists: {0:?}")]
    AlreadyExists(crate::wire::ObjectId),

    /// CREATE with `reuse=1` found an existing object that does not match
    /// the submitted representation.
    #[error("existing object does not match submitted representation: {0:?}")]
    Mismatch(crate::wire::ObjectId),

    /// A transport-level I/O error (message only, not the original error).
    #[error("I/O error: {0}")]
    Io(String),

    /// Fragmentation / reassembly error.
    #[error("fragment error: {0}")]
    Fragment(String),

    /// Middleware refused an operation.
    #[error("middleware error: {0}")]
    Middleware(String),

    /// CREATE_CLIENT cookie or version check failed.
    #[error("invalid CREATE_CLIENT payload: {0}")]
    InvalidClientPayload(String),

    /// CREATE_CLIENT major version does not match the agent's.
    #[error("incompatible protocol version")]
    Incompatible,

    /// Session has timed out / been reclaimed.
    #[error("session timeout")]
    SessionTimeout,

    /// Configuration validation error.
    #[error("config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for XrceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<toml::de::Error> for XrceError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
