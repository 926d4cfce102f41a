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
//! Rotonde Core Library
//!
//! This library provides the protocol building blocks for the Rotonde client:
//! the packet and definition data model, the definition store, and the
//! handler registry. It performs no I/O of its own.

/// Common utilities and structures used throughout the Rotonde stack.
pub(crate) mod common;

/// Wire-level message types for the Rotonde protocol.
pub(crate) mod message;

/// Prelude module for convenient imports.
///
/// This module re-exports commonly used items from the `common` and `message`
/// modules.
pub mod prelude {
    pub use crate::common::{
        CallBudget, DefinitionStore, Handler, HandlerRegistry, LifecycleHook,
    };
    pub use crate::message::{
        Definition, DefinitionKind, Field, Packet, RotondeError, SubscribePayload, TrafficPayload,
    };
}
