// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound event publishing.
//!
//! Publishing is a single request/response, independent of the streaming
//! path; a published event may reach a firehose subscriber before the
//! publish call itself returns.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result, TransportError};
use crate::session::SessionStore;

/// Request body for the publish endpoint.
#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    name: &'a str,
    data: &'a str,
    private: bool,
    ttl: u32,
}

/// Publishes named events to the cloud.
pub struct Publisher {
    http: reqwest::Client,
    url: String,
    session: Arc<SessionStore>,
}

impl Publisher {
    /// Creates a publisher posting to `url`.
    #[must_use]
    pub fn new(http: reqwest::Client, url: String, session: Arc<SessionStore>) -> Self {
        Self { http, url, session }
    }

    /// Publishes one event with the given payload, visibility, and TTL.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] if `private` is `true` with no active
    ///   session; rejected synchronously, nothing reaches the wire.
    /// - [`Error::Authentication`] if the cloud rejects the token.
    /// - [`Error::NotFound`] if the cloud reports an unknown device.
    /// - [`Error::Transport`] for connection failures or other statuses.
    pub async fn publish(&self, name: &str, data: &str, private: bool, ttl: u32) -> Result<()> {
        let token = self.session.access_token();
        if private && token.is_none() {
            return Err(Error::Precondition(
                "publishing a private event requires an active session".to_string(),
            ));
        }

        tracing::debug!(name = %name, private, ttl, "Publishing event");

        let mut request = self.http.post(&self.url).json(&PublishRequest {
            name,
            data,
            private,
            ttl,
        });
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("publish target for '{name}'")));
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()).into());
        }

        tracing::debug!(name = %name, "Event published");
        Ok(())
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
