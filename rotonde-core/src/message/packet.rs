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

//! The Rotonde wire packet.
//!
//! Every message exchanged over the channel is exactly one JSON-encoded
//! packet per text frame. No batching, no acknowledgements, no sequence
//! numbers.
//!
//! # Wire Format
//!
//! ```json
//! { "type": "event",  "payload": { "identifier": "imu.sample", "data": { "x": 0.1 } } }
//! { "type": "action", "payload": { "identifier": "thruster.set", "data": { "power": 40 } } }
//! { "type": "def",    "payload": { "identifier": "imu.sample", "kind": "event", "fields": [] } }
//! { "type": "undef",  "payload": { "identifier": "imu.sample", "kind": "event", "fields": [] } }
//! { "type": "sub",    "payload": { "identifier": "imu.sample" } }
//! { "type": "unsub",  "payload": { "identifier": "imu.sample" } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Definition, RotondeError};

/// Payload of an `event` or `action` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPayload {
    /// The identifier of the event or action being carried.
    pub identifier: String,
    /// The caller-defined data, opaque to the protocol layer.
    #[serde(default)]
    pub data: Value,
}

impl TrafficPayload {
    /// Creates a traffic payload.
    #[must_use]
    pub fn new(identifier: impl Into<String>, data: Value) -> Self {
        Self {
            identifier: identifier.into(),
            data,
        }
    }
}

/// Payload of a `sub` or `unsub` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribePayload {
    /// The event identifier the interest applies to.
    pub identifier: String,
}

impl SubscribePayload {
    /// Creates a subscribe payload.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

/// The single envelope type exchanged over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Packet {
    /// A published event (remote → local after `sub`, local → remote when producing).
    Event(TrafficPayload),
    /// A command directed at whoever defined the action.
    Action(TrafficPayload),
    /// Announcement of an action or event shape.
    Def(Definition),
    /// Retraction of a previously announced shape.
    Undef(Definition),
    /// Interest in an event identifier.
    Sub(SubscribePayload),
    /// Withdrawal of interest in an event identifier.
    Unsub(SubscribePayload),
}

impl Packet {
    /// Encodes the packet as one JSON text frame.
    pub fn encode(&self) -> Result<String, RotondeError> {
        serde_json::to_string(self).map_err(RotondeError::from)
    }

    /// Decodes a packet from one JSON text frame.
    pub fn decode(frame: &str) -> Result<Self, RotondeError> {
        serde_json::from_str(frame).map_err(RotondeError::from)
    }

    /// The wire name of the packet type, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Action(_) => "action",
            Self::Def(_) => "def",
            Self::Undef(_) => "undef",
            Self::Sub(_) => "sub",
            Self::Unsub(_) => "unsub",
        }
    }
}
