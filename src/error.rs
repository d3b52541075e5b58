// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the Nimbus client library.
//!
//! This module provides the error hierarchy for failures across the library:
//! transport faults on the streaming and publish paths, frame parsing
//! problems, and precondition violations.
//!
//! All error kinds are `Clone` because a terminal stream error is fanned out
//! to every subscription handler bound to the failed connection.

use thiserror::Error;

/// The main error type for this library.
///
/// Subscription handlers receive `Result<CloudEvent, Error>`; a non-`Ok`
/// invocation carries no usable event.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// Error occurred at the transport level (connection, HTTP status).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error occurred while parsing an event frame.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The cloud rejected the access token.
    ///
    /// On a streaming connection this is terminal: it is surfaced exactly
    /// once to every bound subscription and the connection is closed.
    #[error("authentication rejected by cloud")]
    Authentication,

    /// An operation's precondition was not met; nothing was sent over the
    /// wire.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The operation referenced a device the cloud does not know about.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors related to transport-level communication.
///
/// Transient variants are retried internally with backoff by the streaming
/// connection and only surface once retries give way to a terminal fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Establishing the connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection dropped mid-stream.
    #[error("connection lost: {0}")]
    Disconnected(String),

    /// The cloud answered with an unexpected HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The configured endpoint URL is not usable.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // Flattened to a message so the error stays Clone for handler fan-out.
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ConnectionFailed(err.to_string())
        } else {
            Self::Disconnected(err.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.into())
    }
}

/// Errors related to parsing event frames off the wire.
///
/// A parse error is scoped to a single frame: it is delivered to matching
/// subscribers as a per-event error and the read loop continues with the
/// next frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A required field was missing when the frame ended.
    #[error("frame missing required field: {0}")]
    MissingField(String),

    /// The `ttl` field did not parse as an integer.
    #[error("invalid ttl value: {0}")]
    InvalidTtl(String),

    /// The `published_at` field did not parse as an RFC 3339 timestamp.
    #[error("invalid published_at timestamp: {0}")]
    InvalidTimestamp(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
