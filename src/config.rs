// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for the Nimbus cloud client.

use std::time::Duration;

use crate::event::EventScope;

/// Configuration for a [`CloudClient`](crate::CloudClient).
///
/// Holds the cloud base URL, the request timeout for one-shot calls, and the
/// reconnect backoff window used by streaming connections.
///
/// # Examples
///
/// ```
/// use nimbus_lib::CloudConfig;
/// use std::time::Duration;
///
/// // Production defaults
/// let config = CloudConfig::new();
///
/// // Custom endpoint and faster reconnects (e.g. a staging cloud)
/// let config = CloudConfig::new()
///     .with_base_url("https://staging.nimbuscloud.io")
///     .with_timeout(Duration::from_secs(5))
///     .with_reconnect_backoff(Duration::from_millis(250), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct CloudConfig {
    base_url: String,
    timeout: Duration,
    backoff_floor: Duration,
    backoff_cap: Duration,
}

impl CloudConfig {
    /// Default cloud API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.nimbuscloud.io";
    /// Default request timeout for one-shot (non-streaming) calls.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default first reconnect delay after a transport drop.
    pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(1);
    /// Default cap on the doubling reconnect delay.
    pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

    /// Creates a configuration with production defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            backoff_floor: Self::DEFAULT_BACKOFF_FLOOR,
            backoff_cap: Self::DEFAULT_BACKOFF_CAP,
        }
    }

    /// Sets a custom base URL. A trailing slash is trimmed.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout for one-shot calls.
    ///
    /// Streaming connections are not subject to this timeout; they stay open
    /// until the transport drops or the client shuts down.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the reconnect backoff window for streaming connections.
    ///
    /// The delay starts at `floor`, doubles after each failed attempt, and
    /// is capped at `cap`.
    #[must_use]
    pub fn with_reconnect_backoff(mut self, floor: Duration, cap: Duration) -> Self {
        self.backoff_floor = floor;
        self.backoff_cap = cap;
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the one-shot request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the first reconnect delay.
    #[must_use]
    pub fn backoff_floor(&self) -> Duration {
        self.backoff_floor
    }

    /// Returns the reconnect delay cap.
    #[must_use]
    pub fn backoff_cap(&self) -> Duration {
        self.backoff_cap
    }

    /// Builds the streaming URL for a subscription scope.
    ///
    /// Prefix filtering is applied client-side so one physical connection
    /// per scope can serve every registered prefix; the URL therefore
    /// carries no prefix component.
    #[must_use]
    pub fn stream_url(&self, scope: &EventScope) -> String {
        match scope {
            EventScope::AllPublicAndOwned => format!("{}/v1/events", self.base_url),
            EventScope::OwnedDevicesOnly => format!("{}/v1/devices/events", self.base_url),
            EventScope::SingleDevice(device_id) => format!(
                "{}/v1/devices/{}/events",
                self.base_url,
                urlencoding::encode(device_id)
            ),
        }
    }

    /// Builds the URL for publishing an event.
    #[must_use]
    pub fn publish_url(&self) -> String {
        format!("{}/v1/devices/events", self.base_url)
    }

    /// Builds the URL for listing the session user's claimed devices.
    #[must_use]
    pub fn devices_url(&self) -> String {
        format!("{}/v1/devices", self.base_url)
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self::new()
    }
}
