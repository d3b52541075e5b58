// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Versioned snapshot of the session user's claimed devices.
//!
//! The `OwnedDevicesOnly` and `AllPublicAndOwned` scopes need to know which
//! devices the active session owns. Rather than an implicit always-fresh
//! global, the directory holds an explicit versioned snapshot fetched from
//! the device-management endpoint. It is marked stale on every session
//! change and refreshed before a private-capable connection opens, or
//! explicitly via `CloudClient::refresh_devices`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{Error, Result, TransportError};

/// One claimed device as returned by the device-list endpoint.
///
/// Only the ID matters for event filtering; the rest is cloud metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    /// The device's cloud ID.
    pub id: String,
    /// Human-readable device name, if assigned.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the cloud currently sees the device online.
    #[serde(default)]
    pub connected: bool,
}

/// An immutable view of the owned-device set at one point in time.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    version: u64,
    ids: HashSet<String>,
}

impl DeviceSnapshot {
    /// Returns the snapshot version; bumped on every refresh.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the owned device IDs.
    #[must_use]
    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }

    /// Returns `true` if the snapshot contains the given device.
    #[must_use]
    pub fn owns(&self, device_id: &str) -> bool {
        self.ids.contains(device_id)
    }
}

/// Holder for the current owned-device snapshot.
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    snapshot: RwLock<DeviceSnapshot>,
    stale: AtomicBool,
}

impl DeviceDirectory {
    /// Creates an empty directory. The initial snapshot is version 0 and
    /// owns nothing; it is considered stale until the first refresh.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(DeviceSnapshot::default()),
            stale: AtomicBool::new(true),
        }
    }

    /// Returns a cheap clone of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.read().clone()
    }

    /// Marks the snapshot stale (session changed, devices claimed).
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Returns `true` if the snapshot should be refreshed before use.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Replaces the snapshot with a new owned-device set, bumping the
    /// version and clearing staleness.
    pub fn replace(&self, ids: HashSet<String>) {
        let mut snapshot = self.snapshot.write();
        snapshot.version += 1;
        tracing::debug!(
            count = ids.len(),
            version = snapshot.version,
            "Owned-device snapshot replaced"
        );
        snapshot.ids = ids;
        self.stale.store(false, Ordering::Release);
    }

    /// Empties the snapshot (logout). The directory stays stale so a future
    /// session triggers a fresh fetch.
    pub fn clear(&self) {
        let mut snapshot = self.snapshot.write();
        snapshot.version += 1;
        snapshot.ids.clear();
        self.stale.store(true, Ordering::Release);
    }

    /// Fetches the claimed-device list and installs it as the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the cloud rejects the token and
    /// a transport error for other failures.
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        url: &str,
        access_token: &str,
    ) -> Result<DeviceSnapshot> {
        tracing::debug!(url = %url, "Fetching claimed-device list");

        let response = http.get(url).bearer_auth(access_token).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication);
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()).into());
        }

        let records: Vec<DeviceRecord> = response.json().await?;
        let ids = records.into_iter().map(|record| record.id).collect();
        self.replace(ids);
        Ok(self.snapshot())
    }
}
