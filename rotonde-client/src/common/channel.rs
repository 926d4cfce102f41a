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

//! Thin protocol codec over an open transport.
//!
//! One outbound operation per packet type, each serializing a [`Packet`]
//! to a single JSON text frame. Inbound decoding lives in the client's
//! read loop; this type only models the outbound half and the
//! `Connecting → Open` transition. No further states exist: channel loss
//! after `Open` is out of scope for the protocol layer.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use rotonde_core::prelude::{
    Definition, Packet, RotondeError, SubscribePayload, TrafficPayload,
};

/// Connection lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The transport is opening; nothing may be sent yet.
    Connecting,
    /// The channel is live.
    Open,
}

/// Protocol codec over the outbound half of one transport session.
///
/// Replaced wholesale on reconnect; never transitions back out of `Open`.
#[derive(Debug)]
pub struct ConnectionChannel {
    outbound: mpsc::UnboundedSender<String>,
    state: ConnectionState,
}

impl ConnectionChannel {
    /// Wraps the outbound half of a freshly opened transport.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            outbound,
            state: ConnectionState::Connecting,
        }
    }

    /// Marks the `Connecting → Open` transition. Idempotent.
    pub fn mark_open(&mut self) {
        if self.state != ConnectionState::Open {
            self.state = ConnectionState::Open;
            trace!("channel open");
        }
    }

    /// Returns true once the channel reached `Open`.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, ConnectionState::Open)
    }

    /// Sends an `event` packet.
    pub fn send_event(&self, identifier: &str, data: &Value) -> Result<(), RotondeError> {
        self.send(&Packet::Event(TrafficPayload::new(identifier, data.clone())))
    }

    /// Sends an `action` packet.
    pub fn send_action(&self, identifier: &str, data: &Value) -> Result<(), RotondeError> {
        self.send(&Packet::Action(TrafficPayload::new(identifier, data.clone())))
    }

    /// Sends a `def` packet announcing a definition.
    pub fn send_definition(&self, definition: &Definition) -> Result<(), RotondeError> {
        self.send(&Packet::Def(definition.clone()))
    }

    /// Sends an `undef` packet retracting a definition.
    pub fn send_undefinition(&self, definition: &Definition) -> Result<(), RotondeError> {
        self.send(&Packet::Undef(definition.clone()))
    }

    /// Sends a `sub` packet declaring interest in an event identifier.
    pub fn send_subscribe(&self, identifier: &str) -> Result<(), RotondeError> {
        self.send(&Packet::Sub(SubscribePayload::new(identifier)))
    }

    /// Sends an `unsub` packet withdrawing interest in an event identifier.
    pub fn send_unsubscribe(&self, identifier: &str) -> Result<(), RotondeError> {
        self.send(&Packet::Unsub(SubscribePayload::new(identifier)))
    }

    fn send(&self, packet: &Packet) -> Result<(), RotondeError> {
        let frame = packet.encode()?;
        trace!(packet_type = packet.type_name(), "sending frame");
        self.outbound
            .send(frame)
            .map_err(|_| RotondeError::ChannelClosed)
    }
}
