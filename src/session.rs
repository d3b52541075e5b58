// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session handling for authenticated cloud access.
//!
//! The [`SessionStore`] is the source of truth for "is a session active".
//! It is populated by the auth collaborator on login/signup and cleared on
//! logout; the event subsystem only ever reads it. Nothing here touches the
//! network or persists credentials.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// An active cloud session: the logged-in user and their access token.
///
/// Authenticated operations read the session at call time; a stale or absent
/// session makes them fail rather than silently degrade to public-only
/// behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    username: String,
    access_token: String,
    valid_from: DateTime<Utc>,
}

impl Session {
    /// Creates a session valid from now.
    #[must_use]
    pub fn new(username: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_token: access_token.into(),
            valid_from: Utc::now(),
        }
    }

    /// Returns the logged-in user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the access token string.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the instant the session became valid.
    #[must_use]
    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }
}

/// Thread-safe holder for the client's single active session.
///
/// Reads are cheap and may happen concurrently from connection read loops
/// and dispatchers; writes (login/logout) are serialized against reads so no
/// reader ever observes a half-updated session.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    /// Creates an empty store (no active session).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a session, replacing any previous one.
    pub fn set(&self, session: Session) {
        tracing::debug!(user = %session.username(), "Session installed");
        *self.current.write() = Some(session);
    }

    /// Removes the active session, if any.
    pub fn clear(&self) {
        let previous = self.current.write().take();
        if let Some(session) = previous {
            tracing::debug!(user = %session.username(), "Session cleared");
        }
    }

    /// Returns a snapshot of the active session, if one exists.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    /// Returns `true` if a session is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    /// Returns the access token of the active session, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|session| session.access_token.clone())
    }
}
