// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Nimbus cloud client.

use std::sync::Arc;

use crate::config::CloudConfig;
use crate::devices::{DeviceDirectory, DeviceSnapshot};
use crate::error::{Error, Result};
use crate::event::{CloudEvent, EventScope};
use crate::publish::Publisher;
use crate::router::EventRouter;
use crate::session::{Session, SessionStore};
use crate::subscription::{Subscription, SubscriptionId, SubscriptionRegistry};

/// Client for the Nimbus cloud event subsystem.
///
/// A `CloudClient` is an explicitly constructed, caller-owned instance; it
/// holds its own session store and carries at most one active session.
/// Share it across tasks behind an `Arc` if needed. There is no process-wide
/// singleton.
///
/// The auth collaborator installs sessions via [`set_session`](Self::set_session)
/// and removes them via [`clear_session`](Self::clear_session); the event
/// subsystem only reads them.
///
/// # Examples
///
/// ```no_run
/// use nimbus_lib::{CloudClient, CloudConfig, Session};
///
/// #[tokio::main]
/// async fn main() -> nimbus_lib::Result<()> {
///     let client = CloudClient::new(CloudConfig::new())?;
///     client.set_session(Session::new("ada@example.com", "access-token"));
///
///     let sub_id = client
///         .subscribe_to_events("temp", |item| match item {
///             Ok(event) => println!("{} from {}", event.name(), event.device_id()),
///             Err(err) => eprintln!("stream error: {err}"),
///         })
///         .await?;
///
///     client.publish_event("temp/kitchen", "23.5", false, 60).await?;
///
///     client.unsubscribe(sub_id);
///     client.shutdown();
///     Ok(())
/// }
/// ```
pub struct CloudClient {
    config: CloudConfig,
    session: Arc<SessionStore>,
    devices: Arc<DeviceDirectory>,
    registry: Arc<SubscriptionRegistry>,
    router: EventRouter,
    publisher: Publisher,
    http: reqwest::Client,
}

impl CloudClient {
    /// Creates a client for the configured cloud.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP clients cannot be built.
    pub fn new(config: CloudConfig) -> Result<Self> {
        // One-shot calls get a total deadline; streams must not, they stay
        // open indefinitely and only bound the connect phase.
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()?;

        let session = Arc::new(SessionStore::new());
        let devices = Arc::new(DeviceDirectory::new());
        let registry = Arc::new(SubscriptionRegistry::new());

        let router = EventRouter::new(
            stream_http,
            config.clone(),
            Arc::clone(&registry),
            Arc::clone(&session),
            Arc::clone(&devices),
        );
        let publisher = Publisher::new(http.clone(), config.publish_url(), Arc::clone(&session));

        Ok(Self {
            config,
            session,
            devices,
            registry,
            router,
            publisher,
            http,
        })
    }

    /// Returns the client's configuration.
    #[must_use]
    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    // =========================================================================
    // Session lifecycle (written by the auth collaborator)
    // =========================================================================

    /// Installs a session, replacing any previous one.
    ///
    /// The owned-device snapshot goes stale and is refreshed before the
    /// next private-capable subscription opens.
    pub fn set_session(&self, session: Session) {
        self.session.set(session);
        self.devices.mark_stale();
    }

    /// Removes the active session and empties the owned-device snapshot.
    ///
    /// Already-open streams keep the token they were opened with; the cloud
    /// ends them when it revokes the token.
    pub fn clear_session(&self) {
        self.session.clear();
        self.devices.clear();
    }

    /// Returns a snapshot of the active session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session.current()
    }

    // =========================================================================
    // Event subscriptions
    // =========================================================================

    /// Subscribes to the firehose of public events, plus private events
    /// published by devices the session user owns.
    ///
    /// `name_prefix` filters events whose name starts with it; an empty
    /// prefix matches everything. The call registers and returns
    /// immediately; it never waits for a first event. Delivery is
    /// asynchronous and ordered per connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the owned-device snapshot needs a refresh and
    /// the fetch fails.
    pub async fn subscribe_to_events<F>(
        &self,
        name_prefix: impl Into<String>,
        handler: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(Result<CloudEvent>) + Send + Sync + 'static,
    {
        self.subscribe(EventScope::AllPublicAndOwned, name_prefix.into(), handler)
            .await
    }

    /// Subscribes to all events, public and private, published by the
    /// session user's claimed devices.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if no session is active; the
    /// owned-devices endpoint is private-capable and gated on the token.
    pub async fn subscribe_to_owned_devices_events<F>(
        &self,
        name_prefix: impl Into<String>,
        handler: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(Result<CloudEvent>) + Send + Sync + 'static,
    {
        self.subscribe(EventScope::OwnedDevicesOnly, name_prefix.into(), handler)
            .await
    }

    /// Subscribes to events from one specific device.
    ///
    /// With the device claimed by the session user, private and public
    /// events are received; otherwise public events only.
    ///
    /// # Errors
    ///
    /// Returns an error if the owned-device snapshot needs a refresh and
    /// the fetch fails.
    pub async fn subscribe_to_device_events<F>(
        &self,
        name_prefix: impl Into<String>,
        device_id: impl Into<String>,
        handler: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(Result<CloudEvent>) + Send + Sync + 'static,
    {
        self.subscribe(
            EventScope::SingleDevice(device_id.into()),
            name_prefix.into(),
            handler,
        )
        .await
    }

    /// Removes a subscription.
    ///
    /// Effective immediately for future dispatches; idempotent, a second
    /// call returns `false`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unregister(id)
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    async fn subscribe<F>(
        &self,
        scope: EventScope,
        name_prefix: String,
        handler: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(Result<CloudEvent>) + Send + Sync + 'static,
    {
        if scope.requires_session() && !self.session.is_active() {
            return Err(Error::Precondition(
                "subscribing to owned-device events requires an active session".to_string(),
            ));
        }

        // Private events are filtered against the owned-device set, so a
        // session without a fresh snapshot refreshes it first.
        if self.session.is_active() && self.devices.is_stale() {
            self.refresh_devices().await?;
        }

        let id = self.registry.register(Subscription::new(
            scope.clone(),
            name_prefix,
            Arc::new(handler),
        ));
        self.router.ensure_connection(&scope);
        Ok(id)
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Publishes an event with the given payload, visibility flag, and TTL
    /// in seconds.
    ///
    /// Independent of the streaming path: a firehose subscriber may observe
    /// the event before this call returns.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`]: precondition failure for a private event
    /// without a session, plus authentication/not-found/transport errors.
    pub async fn publish_event(
        &self,
        name: &str,
        data: &str,
        private: bool,
        ttl: u32,
    ) -> Result<()> {
        self.publisher.publish(name, data, private, ttl).await
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Fetches the claimed-device list and installs it as the new
    /// owned-device snapshot.
    ///
    /// Called automatically when a subscription opens against a stale
    /// snapshot; call it explicitly after claiming devices mid-session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] without a session, otherwise the
    /// fetch errors.
    pub async fn refresh_devices(&self) -> Result<DeviceSnapshot> {
        let Some(token) = self.session.access_token() else {
            return Err(Error::Precondition(
                "listing claimed devices requires an active session".to_string(),
            ));
        };
        self.devices
            .refresh(&self.http, &self.config.devices_url(), &token)
            .await
    }

    /// Returns the current owned-device snapshot without fetching.
    #[must_use]
    pub fn device_snapshot(&self) -> DeviceSnapshot {
        self.devices.snapshot()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Closes all open streaming connections and removes every
    /// subscription.
    ///
    /// In-flight dispatches drain; no new events are delivered afterwards.
    /// The session survives shutdown (clearing it is the auth
    /// collaborator's call).
    pub fn shutdown(&self) {
        tracing::debug!("Shutting down cloud client");
        self.router.shutdown();
    }
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("base_url", &self.config.base_url())
            .field("session_active", &self.session.is_active())
            .field("subscriptions", &self.registry.len())
            .finish_non_exhaustive()
    }
}
