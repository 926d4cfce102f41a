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

// --- Public Re-exports ---
pub use channel::{ConnectionChannel, ConnectionState};
pub use client::RotondeClient;
pub use config::{ConnectionConfig, RotondeConfig, TimeoutConfig};
pub use transport::{TcpTransport, Transport, TransportPair};

// --- Submodules ---

/// Defines the `ConnectionChannel` protocol codec.
mod channel;
/// Defines the `RotondeClient` orchestrator.
mod client;
/// Defines the configuration system for the Rotonde client.
mod config;
/// Defines the transport collaborator seam and the TCP implementation.
mod transport;
