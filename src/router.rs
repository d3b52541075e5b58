// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of stream items to subscription handlers.
//!
//! The router bridges [`StreamConnection`]s to the
//! [`SubscriptionRegistry`]. It keeps at most one physical connection per
//! scope; every subscription with that scope shares it. Each connection
//! gets its own dispatcher task which drains the connection's item channel
//! and invokes matching handlers, so a slow or blocking handler backs up
//! the dispatch queue instead of the socket read.
//!
//! The dispatch queue is unbounded: when handlers saturate, newer
//! dispatches queue rather than drop. Unbounded growth under a permanently
//! slow handler is the accepted trade-off here.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::config::CloudConfig;
use crate::devices::DeviceDirectory;
use crate::error::Error;
use crate::event::EventScope;
use crate::session::SessionStore;
use crate::stream::{StreamConnection, StreamItem};
use crate::subscription::SubscriptionRegistry;

/// Bridges streaming connections to the subscription registry.
pub struct EventRouter {
    http: reqwest::Client,
    config: CloudConfig,
    registry: Arc<SubscriptionRegistry>,
    session: Arc<SessionStore>,
    devices: Arc<DeviceDirectory>,
    connections: Arc<RwLock<HashMap<EventScope, StreamConnection>>>,
}

impl EventRouter {
    /// Creates a router.
    ///
    /// `http` must be a client without a total request timeout (streams stay
    /// open indefinitely).
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        config: CloudConfig,
        registry: Arc<SubscriptionRegistry>,
        session: Arc<SessionStore>,
        devices: Arc<DeviceDirectory>,
    ) -> Self {
        Self {
            http,
            config,
            registry,
            session,
            devices,
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Ensures a streaming connection for `scope` exists, opening one if
    /// needed. The access token active at open time authenticates the
    /// stream.
    pub fn ensure_connection(&self, scope: &EventScope) {
        let mut connections = self.connections.write();
        if connections.contains_key(scope) {
            return;
        }

        tracing::debug!(scope = %scope, "Opening shared connection for scope");

        let (item_tx, item_rx) = mpsc::unbounded_channel();
        let connection = StreamConnection::spawn(
            self.http.clone(),
            self.config.stream_url(scope),
            self.session.access_token(),
            self.config.backoff_floor(),
            self.config.backoff_cap(),
            item_tx,
        );
        connections.insert(scope.clone(), connection);

        tokio::spawn(dispatch_loop(
            scope.clone(),
            item_rx,
            Arc::clone(&self.registry),
            Arc::clone(&self.devices),
            Arc::clone(&self.connections),
        ));
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Closes every connection and clears the registry.
    ///
    /// Dispatchers drain their remaining queued items and exit once their
    /// connection's channel closes.
    pub fn shutdown(&self) {
        let mut connections = self.connections.write();
        tracing::debug!(count = connections.len(), "Shutting down connections");
        for connection in connections.values() {
            connection.shutdown();
        }
        connections.clear();
        self.registry.clear();
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("connection_count", &self.connection_count())
            .finish_non_exhaustive()
    }
}

/// Drains one connection's item channel and invokes matching handlers.
///
/// Runs until the channel closes (connection stopped) or a terminal item
/// arrives. Per-connection ordering is preserved: items are handled one at
/// a time in arrival order.
async fn dispatch_loop(
    scope: EventScope,
    mut items: mpsc::UnboundedReceiver<StreamItem>,
    registry: Arc<SubscriptionRegistry>,
    devices: Arc<DeviceDirectory>,
    connections: Arc<RwLock<HashMap<EventScope, StreamConnection>>>,
) {
    while let Some(item) = items.recv().await {
        match item {
            StreamItem::Event(event) => {
                let snapshot = devices.snapshot();
                let handlers = registry.matching_handlers(&scope, &event, snapshot.ids());
                tracing::trace!(
                    scope = %scope,
                    name = %event.name(),
                    device = %event.device_id(),
                    matches = handlers.len(),
                    "Dispatching event"
                );
                for handler in handlers {
                    handler(Ok(event.clone()));
                }
            }
            StreamItem::Parse(err) => {
                // The frame had no usable name, so every subscription bound
                // to this connection hears about it.
                let handlers = registry.scope_handlers(&scope);
                tracing::debug!(scope = %scope, error = %err, "Dispatching parse error");
                for handler in handlers {
                    handler(Err(Error::Parse(err.clone())));
                }
            }
            StreamItem::Terminal(err) => {
                tracing::warn!(scope = %scope, error = %err, "Connection failed terminally");
                for handler in registry.scope_handlers(&scope) {
                    handler(Err(err.clone()));
                }
                connections.write().remove(&scope);
                return;
            }
        }
    }
    tracing::debug!(scope = %scope, "Dispatcher drained and stopped");
}
