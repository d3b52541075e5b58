// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Incremental parser for the frame-oriented event wire protocol.
//!
//! The cloud delivers discrete text frames. Each frame is a run of
//! `field: value` lines terminated by a blank line, carrying the fields
//! `event`, `data`, `ttl`, `published_at`, `coreid` and the optional
//! `private` flag, in any order. Frames may be split across read chunks at
//! any byte, including inside a multi-byte UTF-8 character; the parser
//! buffers partial input and only emits once a frame boundary has been
//! observed with both required fields (`event`, `data`) present.
//!
//! A malformed frame yields a [`ParseError`] instead of an event and the
//! parser moves on to the next frame; the read loop never stops over a
//! single bad frame.

use chrono::{DateTime, Utc};

use crate::error::ParseError;
use crate::event::{CloudEvent, Visibility};

/// Default time-to-live when a frame omits the `ttl` field.
const DEFAULT_TTL: u32 = 60;

/// One parsed frame: either a complete event or a per-frame parse error.
pub type FrameResult = Result<CloudEvent, ParseError>;

/// Accumulates the fields of the frame currently being read.
#[derive(Debug, Default)]
struct PartialFrame {
    name: Option<String>,
    data: Option<String>,
    ttl: Option<String>,
    published_at: Option<String>,
    device_id: Option<String>,
    private: Option<String>,
    saw_line: bool,
}

impl PartialFrame {
    fn set(&mut self, field: &str, value: &str) {
        self.saw_line = true;
        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => self.data = Some(value.to_string()),
            "ttl" => self.ttl = Some(value.to_string()),
            "published_at" => self.published_at = Some(value.to_string()),
            "coreid" => self.device_id = Some(value.to_string()),
            "private" => self.private = Some(value.to_string()),
            other => {
                tracing::trace!(field = %other, "Skipping unknown frame field");
            }
        }
    }

    fn finish(self) -> FrameResult {
        let Some(name) = self.name else {
            return Err(ParseError::MissingField("event".to_string()));
        };
        let Some(data) = self.data else {
            return Err(ParseError::MissingField("data".to_string()));
        };

        let ttl = match self.ttl {
            Some(raw) => raw.trim().parse().map_err(|_| ParseError::InvalidTtl(raw))?,
            None => DEFAULT_TTL,
        };

        // A missing timestamp falls back to receipt time; a present but
        // unparseable one makes the frame malformed.
        let published_at = match self.published_at {
            Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| ParseError::InvalidTimestamp(raw))?,
            None => Utc::now(),
        };

        let visibility = match self.private.as_deref().map(str::trim) {
            Some("true") => Visibility::Private,
            _ => Visibility::Public,
        };

        Ok(CloudEvent::new(
            name,
            data,
            ttl,
            published_at,
            self.device_id.unwrap_or_default(),
            visibility,
        ))
    }
}

/// Incremental, restartable frame parser.
///
/// Feed raw text chunks with [`push`](Self::push) as they arrive off the
/// wire; each call returns the frames completed by that chunk, in order.
/// Call [`reset`](Self::reset) after a transport drop to discard the
/// in-progress partial frame (the reconnect policy: a frame cut by a
/// disconnect is never delivered).
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
    pending: Vec<u8>,
    current: PartialFrame,
}

impl FrameParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk of raw wire bytes and returns completed frames.
    ///
    /// Chunk boundaries fall wherever the transport cuts them, so a
    /// multi-byte UTF-8 character may arrive half in one chunk and half in
    /// the next. An incomplete trailing sequence is held back and decoded
    /// together with the following chunk; payload text round-trips intact.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<FrameResult> {
        self.pending.extend_from_slice(bytes);

        let carry = match std::str::from_utf8(&self.pending) {
            Ok(_) => 0,
            // No error length means the buffer ends mid-character: keep
            // the tail for the next chunk.
            Err(err) if err.error_len().is_none() => self.pending.len() - err.valid_up_to(),
            // Genuinely invalid bytes decode to U+FFFD like any other junk.
            Err(_) => 0,
        };

        let split = self.pending.len() - carry;
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        self.push(&text)
    }

    /// Consumes a chunk of wire text and returns completed frames.
    pub fn push(&mut self, chunk: &str) -> Vec<FrameResult> {
        self.buffer.push_str(chunk);

        let mut completed = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.consume_line(line) {
                completed.push(frame);
            }
        }
        completed
    }

    /// Discards any buffered partial input.
    ///
    /// Called by the connection after a transport drop so a half-received
    /// frame from the old connection never mixes with the new one.
    pub fn reset(&mut self) {
        if self.current.saw_line || !self.buffer.is_empty() || !self.pending.is_empty() {
            tracing::debug!("Discarding partial frame after disconnect");
        }
        self.buffer.clear();
        self.pending.clear();
        self.current = PartialFrame::default();
    }

    /// Processes one complete line; returns a frame if the line closed one.
    fn consume_line(&mut self, line: &str) -> Option<FrameResult> {
        if line.is_empty() {
            // Blank line: frame boundary. Blank lines between frames carry
            // no fields and are skipped.
            if self.current.saw_line {
                let frame = std::mem::take(&mut self.current);
                return Some(frame.finish());
            }
            return None;
        }

        // Comment lines (used by the cloud as keep-alives) start with ':'.
        if let Some(rest) = line.strip_prefix(':') {
            tracing::trace!(comment = %rest, "Skipping comment line");
            return None;
        }

        match line.split_once(':') {
            Some((field, value)) => {
                self.current.set(field.trim(), value.trim_start());
            }
            None => {
                tracing::trace!(line = %line, "Ignoring line without field separator");
            }
        }
        None
    }
}
