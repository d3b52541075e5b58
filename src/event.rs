// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event data model for the Nimbus cloud stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visibility of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible to every firehose subscriber.
    Public,
    /// Visible only to the owner of the publishing device.
    Private,
}

/// One event received from (or published to) the cloud.
///
/// Events are immutable once parsed; a single instance is shared read-only
/// across all matching subscription handlers for a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEvent {
    name: String,
    data: String,
    ttl: u32,
    published_at: DateTime<Utc>,
    device_id: String,
    visibility: Visibility,
}

impl CloudEvent {
    /// Creates an event.
    ///
    /// Library code builds events from parsed frames; applications usually
    /// only construct them in tests.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        data: impl Into<String>,
        ttl: u32,
        published_at: DateTime<Utc>,
        device_id: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            ttl,
            published_at,
            device_id: device_id.into(),
            visibility,
        }
    }

    /// Returns the event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the opaque payload string (caller-defined encoding).
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Returns the time-to-live hint in seconds.
    #[must_use]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the publication timestamp.
    #[must_use]
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Returns the ID of the publishing device.
    ///
    /// Empty if the frame carried no `coreid` field.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the event visibility.
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Returns `true` for public events.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// The visibility/ownership constraint under which a subscription listens.
///
/// Each scope maps to its own streaming endpoint; subscriptions with the
/// same scope share one physical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventScope {
    /// The public firehose plus private events from devices the session
    /// user owns.
    AllPublicAndOwned,
    /// Public and private events from the session user's claimed devices
    /// only. Requires an active session.
    OwnedDevicesOnly,
    /// Events from one specific device. Private events are included only
    /// when the session user owns the device.
    SingleDevice(String),
}

impl EventScope {
    /// Returns `true` if this scope needs an access token to open.
    ///
    /// The firehose and single-device endpoints serve public events without
    /// one; the owned-devices endpoint is private-capable and gated on the
    /// session.
    #[must_use]
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::OwnedDevicesOnly)
    }
}

impl std::fmt::Display for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllPublicAndOwned => write!(f, "all-events"),
            Self::OwnedDevicesOnly => write!(f, "owned-devices"),
            Self::SingleDevice(id) => write!(f, "device:{id}"),
        }
    }
}
