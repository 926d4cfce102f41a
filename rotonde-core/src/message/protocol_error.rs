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

//! Error types for Rotonde protocol operations.

use std::fmt;

/// Error types for protocol and channel operations.
///
/// None of these terminate the client: a timeout rejects the individual
/// wait, an encoding failure is scoped to the offending frame, and send
/// failures surface to the caller of the offending operation.
#[derive(Debug, Clone)]
pub enum RotondeError {
    /// An outbound operation was attempted before the channel reached `Open`.
    NotConnected,

    /// The outbound half of the channel is gone.
    ChannelClosed,

    /// Serialization or deserialization failure.
    ///
    /// Contains the underlying error message from the serialization library.
    Encoding(String),

    /// A wait for the given identifier outlived its timeout.
    ///
    /// The underlying registry entry is detached before this error is
    /// observable, so a late arrival cannot fire into the settled wait.
    Timeout {
        /// The identifier the wait was registered against.
        identifier: String,
    },

    /// A pending wait's registry entry was removed before it fired.
    WaitAbandoned {
        /// The identifier the wait was registered against.
        identifier: String,
    },

    /// The transport collaborator failed to open the channel.
    ConnectFailed(String),

    /// Socket or I/O error.
    Io(String),
}

impl fmt::Display for RotondeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Not connected"),
            Self::ChannelClosed => write!(f, "Channel closed"),
            Self::Encoding(e) => write!(f, "Encoding error: {e}"),
            Self::Timeout { identifier } => write!(f, "Timed out waiting for: {identifier}"),
            Self::WaitAbandoned { identifier } => {
                write!(f, "Wait abandoned for: {identifier}")
            }
            Self::ConnectFailed(e) => write!(f, "Connect failed: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for RotondeError {}

impl From<serde_json::Error> for RotondeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<std::io::Error> for RotondeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
