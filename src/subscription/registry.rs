// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription bookkeeping and the event matching rule.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Error;
use crate::event::{CloudEvent, EventScope};

/// Unique identifier for a subscription.
///
/// Returned by the `subscribe_to_*` calls and used to unsubscribe later.
/// IDs are unique within a client's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a new subscription ID with the given value.
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Handler invoked for every event or per-event error a subscription
/// matches. A non-`Ok` argument carries no usable event.
pub type EventHandler = Arc<dyn Fn(Result<CloudEvent, Error>) + Send + Sync>;

/// One registered subscription: a scope, a name-prefix filter, and the
/// handler to invoke on matches.
#[derive(Clone)]
pub struct Subscription {
    scope: EventScope,
    name_prefix: String,
    handler: EventHandler,
}

impl Subscription {
    /// Creates a subscription. An empty prefix matches every event name.
    #[must_use]
    pub fn new(scope: EventScope, name_prefix: impl Into<String>, handler: EventHandler) -> Self {
        Self {
            scope,
            name_prefix: name_prefix.into(),
            handler,
        }
    }

    /// Returns the subscription's scope.
    #[must_use]
    pub fn scope(&self) -> &EventScope {
        &self.scope
    }

    /// Returns the name-prefix filter.
    #[must_use]
    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> EventHandler {
        Arc::clone(&self.handler)
    }

    /// Decides whether `event` is delivered to this subscription, given the
    /// set of device IDs the active session owns.
    ///
    /// The rule: the event name must start with the prefix, and the scope's
    /// ownership constraint must hold. A private event never matches unless
    /// the session owns its device; with no session the owned set is empty,
    /// so only public events get through.
    #[must_use]
    pub fn matches(&self, event: &CloudEvent, owned_devices: &HashSet<String>) -> bool {
        if !event.name().starts_with(&self.name_prefix) {
            return false;
        }

        let owned = owned_devices.contains(event.device_id());
        match &self.scope {
            EventScope::AllPublicAndOwned => event.is_public() || owned,
            EventScope::OwnedDevicesOnly => owned,
            EventScope::SingleDevice(device_id) => {
                event.device_id() == device_id && (event.is_public() || owned)
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("scope", &self.scope)
            .field("name_prefix", &self.name_prefix)
            .finish_non_exhaustive()
    }
}

/// Thread-safe set of active subscriptions.
///
/// Subscribe calls from application tasks and dispatch reads from connection
/// dispatchers run concurrently; the registry serializes mutation against
/// iteration via `parking_lot::RwLock`. A subscription added while a
/// dispatch round is in flight may miss events already being delivered but
/// sees every subsequent arrival.
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a subscription and returns its ID.
    pub fn register(&self, subscription: Subscription) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(
            id = %id,
            scope = %subscription.scope(),
            prefix = %subscription.name_prefix(),
            "Registering subscription"
        );
        self.subscriptions.write().insert(id, subscription);
        id
    }

    /// Removes a subscription.
    ///
    /// Returns `true` if it was present. Idempotent: a second call for the
    /// same ID returns `false` and has no other effect.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id).is_some();
        if removed {
            tracing::debug!(id = %id, "Unregistered subscription");
        }
        removed
    }

    /// Returns the handlers of every subscription with the given scope that
    /// matches `event`, given the owned-device set.
    #[must_use]
    pub fn matching_handlers(
        &self,
        scope: &EventScope,
        event: &CloudEvent,
        owned_devices: &HashSet<String>,
    ) -> Vec<EventHandler> {
        self.subscriptions
            .read()
            .values()
            .filter(|sub| sub.scope() == scope && sub.matches(event, owned_devices))
            .map(Subscription::handler)
            .collect()
    }

    /// Returns the handlers of every subscription bound to the given scope,
    /// regardless of prefix. Used to fan a terminal connection error out to
    /// each bound subscription exactly once.
    #[must_use]
    pub fn scope_handlers(&self, scope: &EventScope) -> Vec<EventHandler> {
        self.subscriptions
            .read()
            .values()
            .filter(|sub| sub.scope() == scope)
            .map(Subscription::handler)
            .collect()
    }

    /// Returns `true` if any subscription is bound to the given scope.
    #[must_use]
    pub fn has_scope(&self, scope: &EventScope) -> bool {
        self.subscriptions
            .read()
            .values()
            .any(|sub| sub.scope() == scope)
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Returns `true` if no subscriptions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Removes all subscriptions.
    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscription_count", &self.len())
            .finish()
    }
}
