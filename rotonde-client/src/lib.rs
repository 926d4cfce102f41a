/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

#![forbid(unsafe_code)]

//! # Rotonde Client
//!
//! This crate provides a client for the Rotonde publish/subscribe protocol,
//! carried over a persistent, message-oriented duplex channel and built on
//! top of Tokio. Participants exchange typed *events* and *actions*, each
//! identified by a string whose shape (a *definition*) must be announced
//! before traffic referencing it is meaningful.
//!
//! ## Key Concepts
//!
//! - **Definitions**: The declared shape of an action or event, tracked per
//!   side in four [`DefinitionStore`]s ({local, remote} × {action, event}).
//! - **Handler registries**: Per-identifier callback registration with
//!   call-count limiting; attaching the first event handler for an
//!   identifier propagates a `sub` to the remote side, detaching the last
//!   propagates `unsub`.
//! - **Channel**: One JSON packet per text frame over a pluggable
//!   [`Transport`] collaborator; six outbound packet types, one inbound
//!   dispatch point.
//! - **Bootstrap**: The handshake primitive that sequences definition
//!   discovery, outbound actions, and inbound event waits, enforcing
//!   "definitions before traffic".
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rotonde_client::prelude::*;
//!
//! let client = RotondeClient::new(RotondeConfig::load(), TcpTransport::default());
//! client.connect().await?;
//! client.events().attach(
//!     "imu.sample",
//!     std::sync::Arc::new(|data| println!("sample: {data}")),
//!     CallBudget::Unlimited,
//! );
//! ```
//!
//! [`DefinitionStore`]: rotonde_core::prelude::DefinitionStore
//! [`Transport`]: crate::prelude::Transport

/// Internal utilities and structures used throughout the Rotonde client.
pub(crate) mod common;

/// A prelude module for conveniently importing the most commonly used items.
///
/// Re-exports the client surface together with the protocol building blocks
/// from `rotonde-core` and the `async_trait` attribute used to implement
/// custom transports.
pub mod prelude {
    pub use async_trait::async_trait;
    pub use rotonde_core::prelude::*;

    pub use crate::common::{
        ConnectionChannel, ConnectionConfig, ConnectionState, RotondeClient, RotondeConfig,
        TcpTransport, TimeoutConfig, Transport, TransportPair,
    };
}
