// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription registry for the event subsystem.
//!
//! A subscription binds a name-prefix filter and a scope to a handler.
//! The registry is the only structure mutated by multiple concurrent actors
//! (subscribe/unsubscribe from application tasks, dispatch reads from
//! connection dispatchers) and supports safe concurrent add/remove/iterate.
//!
//! # Overview
//!
//! - [`SubscriptionId`] - Unique handle for a subscription, used to unsubscribe
//! - [`Subscription`] - Scope + prefix + handler, with the matching rule
//! - [`SubscriptionRegistry`] - Thread-safe set of active subscriptions
//!
//! # Usage
//!
//! Subscriptions are created through the `subscribe_to_*` methods on
//! [`CloudClient`](crate::CloudClient):
//!
//! ```no_run
//! use nimbus_lib::{CloudClient, CloudConfig};
//!
//! # async fn example() -> nimbus_lib::Result<()> {
//! let client = CloudClient::new(CloudConfig::new())?;
//!
//! let sub_id = client
//!     .subscribe_to_events("temp", |item| match item {
//!         Ok(event) => println!("{}: {}", event.name(), event.data()),
//!         Err(err) => eprintln!("stream error: {err}"),
//!     })
//!     .await?;
//!
//! // Later, unsubscribe
//! client.unsubscribe(sub_id);
//! # Ok(())
//! # }
//! ```

mod registry;

pub use registry::{EventHandler, Subscription, SubscriptionId, SubscriptionRegistry};
