// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nimbus Lib - A Rust client for the Nimbus device cloud.
//!
//! This library provides async access to the Nimbus cloud's real-time event
//! subsystem: concurrent, independently filtered subscriptions over shared
//! streaming connections, plus outbound event publishing.
//!
//! # Core pieces
//!
//! - **Subscriptions**: firehose, owned-devices, or single-device scopes,
//!   each with a name-prefix filter; many subscriptions share one physical
//!   connection per scope
//! - **Streaming**: frame parsing tolerant of partial delivery, automatic
//!   reconnection with exponential backoff, terminal handling of revoked
//!   tokens
//! - **Publishing**: one-shot event emission with visibility flag and TTL
//! - **Sessions**: a caller-owned token store gating private event access
//!
//! # Quick Start
//!
//! ```no_run
//! use nimbus_lib::{CloudClient, CloudConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> nimbus_lib::Result<()> {
//!     let client = CloudClient::new(CloudConfig::new())?;
//!
//!     // The auth layer installs the session after login
//!     client.set_session(Session::new("ada@example.com", "access-token"));
//!
//!     // Firehose, filtered to names starting with "temp"
//!     client
//!         .subscribe_to_events("temp", |item| match item {
//!             Ok(event) => println!("{} = {}", event.name(), event.data()),
//!             Err(err) => eprintln!("stream error: {err}"),
//!         })
//!         .await?;
//!
//!     // One device, every event name
//!     client
//!         .subscribe_to_device_events("", "abc123", |item| {
//!             if let Ok(event) = item {
//!                 println!("abc123 says {}", event.data());
//!             }
//!         })
//!         .await?;
//!
//!     client.publish_event("temp/porch", "21.0", false, 60).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Delivery semantics
//!
//! Handlers run on a dispatcher task, never on a connection's read loop, so
//! a slow handler cannot stall protocol parsing. Events from one connection
//! arrive in emission order; no order is defined across connections.
//! Handlers receive `Result<CloudEvent, Error>` and must treat an `Err` as
//! carrying no usable event.

mod cloud;
mod config;
mod devices;
pub mod error;
mod event;
mod publish;
mod router;
mod session;
pub mod stream;
pub mod subscription;

pub use cloud::CloudClient;
pub use config::CloudConfig;
pub use devices::{DeviceDirectory, DeviceRecord, DeviceSnapshot};
pub use error::{Error, ParseError, Result, TransportError};
pub use event::{CloudEvent, EventScope, Visibility};
pub use publish::Publisher;
pub use router::EventRouter;
pub use session::{Session, SessionStore};
pub use stream::{ConnectionState, FrameParser, StreamConnection, StreamItem};
pub use subscription::{EventHandler, Subscription, SubscriptionId, SubscriptionRegistry};
