// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One persistent streaming connection to an event endpoint.
//!
//! A [`StreamConnection`] owns a spawned read loop that keeps a streaming
//! GET open against its endpoint, feeds raw chunks through the
//! [`FrameParser`](super::FrameParser), and pushes parsed items into the
//! dispatcher's channel. The loop never invokes subscriber handlers itself.
//!
//! Transport drops trigger automatic reconnection with exponential backoff
//! (doubling from the configured floor up to the cap, reset after a
//! successful open); the frame in progress at the drop is discarded. An
//! authentication rejection is terminal: one [`StreamItem::Terminal`] is
//! emitted and the loop ends.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use crate::error::{Error, ParseError, TransportError};
use crate::event::CloudEvent;
use crate::stream::FrameParser;

/// Lifecycle state of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial connection attempt in progress.
    Connecting,
    /// Stream open, events flowing.
    Open,
    /// Transport dropped; waiting out backoff before the next attempt.
    Reconnecting,
    /// Terminal: shut down or fatally rejected.
    Closed,
}

/// One item yielded by a connection's read loop.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// A complete, well-formed event.
    Event(CloudEvent),
    /// A single malformed frame. The stream continues.
    Parse(ParseError),
    /// A terminal connection error. Nothing follows this item.
    Terminal(Error),
}

/// Handle to a spawned streaming connection.
///
/// Dropping the handle does not stop the loop; call
/// [`shutdown`](Self::shutdown) (the router does this for every connection
/// on client shutdown).
#[derive(Debug)]
pub struct StreamConnection {
    shutdown_tx: watch::Sender<bool>,
    state: Arc<RwLock<ConnectionState>>,
}

impl StreamConnection {
    /// Spawns the read loop for `url` and returns its handle.
    ///
    /// `http` must be a client without a total request timeout; a streaming
    /// GET stays open indefinitely. Parsed items are pushed into `items`.
    #[must_use]
    pub fn spawn(
        http: reqwest::Client,
        url: String,
        access_token: Option<String>,
        backoff_floor: Duration,
        backoff_cap: Duration,
        items: mpsc::UnboundedSender<StreamItem>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        let loop_state = Arc::clone(&state);
        tokio::spawn(async move {
            read_loop(
                http,
                url,
                access_token,
                backoff_floor,
                backoff_cap,
                items,
                shutdown_rx,
                loop_state,
            )
            .await;
        });

        Self { shutdown_tx, state }
    }

    /// Returns the connection's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Signals the read loop to stop and close the transport.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Outcome of serving one open stream until it ends.
enum StreamOutcome {
    /// Transport dropped or the server closed the stream; reconnect.
    Reconnect,
    /// Shutdown was requested or the dispatcher went away; stop.
    Stop,
}

#[allow(clippy::too_many_arguments)]
async fn read_loop(
    http: reqwest::Client,
    url: String,
    access_token: Option<String>,
    backoff_floor: Duration,
    backoff_cap: Duration,
    items: mpsc::UnboundedSender<StreamItem>,
    mut shutdown_rx: watch::Receiver<bool>,
    state: Arc<RwLock<ConnectionState>>,
) {
    let mut parser = FrameParser::new();
    let mut backoff = backoff_floor;

    loop {
        tracing::debug!(url = %url, "Opening event stream");

        let mut request = http.get(&url);
        if let Some(token) = &access_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    tracing::warn!(url = %url, status = status.as_u16(), "Stream rejected, closing");
                    let _ = items.send(StreamItem::Terminal(Error::Authentication));
                    *state.write() = ConnectionState::Closed;
                    return;
                }
                if !status.is_success() {
                    tracing::warn!(
                        url = %url,
                        status = status.as_u16(),
                        "Unexpected stream status, will retry"
                    );
                } else {
                    *state.write() = ConnectionState::Open;
                    backoff = backoff_floor;

                    let outcome =
                        serve_stream(response, &mut parser, &items, &mut shutdown_rx).await;
                    // Whatever cut the stream also cut the current frame.
                    parser.reset();

                    if matches!(outcome, StreamOutcome::Stop) {
                        *state.write() = ConnectionState::Closed;
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::debug!(url = %url, error = %err, "Stream connect failed, will retry");
            }
        }

        *state.write() = ConnectionState::Reconnecting;
        tracing::debug!(url = %url, delay = ?backoff, "Reconnect backoff");

        tokio::select! {
            () = tokio::time::sleep(backoff) => {}
            changed = shutdown_rx.changed() => {
                // A dropped sender means the handle is gone; stop either way.
                if changed.is_err() || *shutdown_rx.borrow() {
                    *state.write() = ConnectionState::Closed;
                    return;
                }
            }
        }
        backoff = (backoff * 2).min(backoff_cap);
    }
}

/// Reads one open stream to its end, emitting parsed items.
async fn serve_stream(
    response: reqwest::Response,
    parser: &mut FrameParser,
    items: &mpsc::UnboundedSender<StreamItem>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> StreamOutcome {
    let mut chunks = response.bytes_stream();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return StreamOutcome::Stop;
                }
            }
            chunk = chunks.next() => match chunk {
                Some(Ok(bytes)) => {
                    // Chunk boundaries are arbitrary; the parser reassembles
                    // UTF-8 characters cut between reads.
                    for frame in parser.push_bytes(&bytes) {
                        let item = match frame {
                            Ok(event) => StreamItem::Event(event),
                            Err(err) => StreamItem::Parse(err),
                        };
                        if items.send(item).is_err() {
                            // Dispatcher gone; nobody is listening anymore.
                            return StreamOutcome::Stop;
                        }
                    }
                }
                Some(Err(err)) => {
                    // Retried internally; subscribers only ever see terminal
                    // faults from this path.
                    let err = TransportError::from(err);
                    tracing::debug!(error = %err, "Stream read failed, reconnecting");
                    return StreamOutcome::Reconnect;
                }
                None => {
                    tracing::debug!("Stream ended, reconnecting");
                    return StreamOutcome::Reconnect;
                }
            }
        }
    }
}
