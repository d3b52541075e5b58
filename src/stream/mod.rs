// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming connections and protocol parsing.
//!
//! - [`FrameParser`]: incremental parser for the frame-oriented wire
//!   protocol, tolerant of partial and interleaved delivery
//! - [`StreamConnection`]: one persistent connection per scope with
//!   automatic reconnection
//! - [`StreamItem`]: what a connection yields to its dispatcher

mod connection;
mod frame;

pub use connection::{ConnectionState, StreamConnection, StreamItem};
pub use frame::{FrameParser, FrameResult};
