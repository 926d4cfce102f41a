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

//! The Rotonde client orchestrator.
//!
//! Composes the definition stores, handler registries, and connection
//! channel into the public protocol contract: connect with replay, packet
//! routing, local definition publishing, and the `bootstrap` handshake.
//!
//! One logical client owns its stores and registries for its whole
//! lifetime; the channel alone is replaced wholesale on reconnect.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use rotonde_core::prelude::{
    Definition, DefinitionKind, DefinitionStore, Field, HandlerRegistry, Packet, RotondeError,
};

use super::channel::ConnectionChannel;
use super::config::RotondeConfig;
use super::transport::{Transport, TransportPair};

/// Callback queued until the channel reaches `Open`.
type ReadyCallback = Box<dyn FnOnce() + Send>;

/// The channel slot, shared with the event registry's lifecycle hooks.
type ChannelSlot = Arc<RwLock<Option<ConnectionChannel>>>;

/// A client for the Rotonde publish/subscribe protocol.
///
/// Cheaply clonable handle; clones share the same stores, registries, and
/// channel. Dropping the last handle ends the read loop.
#[derive(Clone)]
pub struct RotondeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RotondeConfig,
    transport: tokio::sync::Mutex<Box<dyn Transport>>,
    channel: ChannelSlot,
    local_actions: RwLock<DefinitionStore>,
    local_events: RwLock<DefinitionStore>,
    remote_actions: RwLock<DefinitionStore>,
    remote_events: RwLock<DefinitionStore>,
    events: HandlerRegistry,
    actions: HandlerRegistry,
    definitions: HandlerRegistry,
    undefinitions: HandlerRegistry,
    ready_callbacks: Mutex<Vec<ReadyCallback>>,
}

impl std::fmt::Debug for RotondeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotondeClient")
            .field("url", &self.inner.config.connection.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RotondeClient {
    /// Creates a client over the given transport. No I/O happens until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: RotondeConfig, transport: impl Transport + 'static) -> Self {
        let channel: ChannelSlot = Arc::default();

        // Subscription intent follows event handler presence: the first
        // handler for an identifier announces `sub`, the last one leaving
        // announces `unsub`. Both are no-ops while disconnected; connect()
        // replays the accumulated intent.
        let subscribe_slot = Arc::clone(&channel);
        let unsubscribe_slot = Arc::clone(&channel);
        let events = HandlerRegistry::with_hooks(
            "events",
            Some(Box::new(move |identifier: &str| {
                if let Some(chan) = subscribe_slot.read().as_ref() {
                    if let Err(error) = chan.send_subscribe(identifier) {
                        warn!(identifier, %error, "subscribe announcement failed");
                    }
                }
            })),
            Some(Box::new(move |identifier: &str| {
                if let Some(chan) = unsubscribe_slot.read().as_ref() {
                    if let Err(error) = chan.send_unsubscribe(identifier) {
                        warn!(identifier, %error, "unsubscribe announcement failed");
                    }
                }
            })),
        );

        Self {
            inner: Arc::new(ClientInner {
                config,
                transport: tokio::sync::Mutex::new(Box::new(transport)),
                channel,
                local_actions: RwLock::new(DefinitionStore::new()),
                local_events: RwLock::new(DefinitionStore::new()),
                remote_actions: RwLock::new(DefinitionStore::new()),
                remote_events: RwLock::new(DefinitionStore::new()),
                events,
                actions: HandlerRegistry::new("actions"),
                definitions: HandlerRegistry::new("definitions"),
                undefinitions: HandlerRegistry::new("undefinitions"),
                ready_callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &RotondeConfig {
        &self.inner.config
    }

    /// Opens the channel against the configured URL.
    ///
    /// On reaching `Open`: fires every queued ready callback once, replays
    /// `sub` for every identifier with registered event handlers, and
    /// announces `def` for every local definition. Calling this again
    /// replaces the channel wholesale (there is no automatic reconnect).
    #[instrument(skip(self), fields(url = %self.inner.config.connection.url))]
    pub async fn connect(&self) -> Result<(), RotondeError> {
        let pair = {
            let mut transport = self.inner.transport.lock().await;
            transport.open(&self.inner.config.connection.url).await?
        };
        let TransportPair {
            outbound,
            mut inbound,
        } = pair;

        let mut chan = ConnectionChannel::new(outbound);
        chan.mark_open();

        // The read loop holds only a weak reference so an abandoned client
        // is not kept alive by its own task.
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                match Packet::decode(&frame) {
                    Ok(packet) => inner.route(packet),
                    Err(error) => {
                        // Scoped to the single frame; the loop keeps going.
                        warn!(%error, frame_len = frame.len(), "dropping undecodable frame");
                    }
                }
            }
            trace!("read loop ended");
        });

        *self.inner.channel.write() = Some(chan);
        debug!("connected");

        let queued: Vec<ReadyCallback> = std::mem::take(&mut *self.inner.ready_callbacks.lock());
        for callback in queued {
            callback();
        }

        {
            let guard = self.inner.channel.read();
            let Some(chan) = guard.as_ref() else {
                return Err(RotondeError::NotConnected);
            };
            for identifier in self.inner.events.registered_identifiers() {
                chan.send_subscribe(&identifier)?;
            }
            let local_actions = self.inner.local_actions.read();
            for definition in local_actions.list() {
                chan.send_definition(definition)?;
            }
            let local_events = self.inner.local_events.read();
            for definition in local_events.list() {
                chan.send_definition(definition)?;
            }
        }
        Ok(())
    }

    /// Returns true while the channel slot holds an open channel.
    ///
    /// Advisory only: loss after `Open` is not observed by this layer.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .channel
            .read()
            .as_ref()
            .is_some_and(ConnectionChannel::is_open)
    }

    /// Runs `callback` once the channel is open.
    ///
    /// Fires immediately when already connected, otherwise queues it for
    /// the next successful [`connect`](Self::connect).
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        if self.is_connected() {
            callback();
        } else {
            self.inner.ready_callbacks.lock().push(Box::new(callback));
        }
    }

    /// Publishes an event toward the remote side.
    pub fn send_event(&self, identifier: &str, data: Value) -> Result<(), RotondeError> {
        self.with_channel(|chan| chan.send_event(identifier, &data))
    }

    /// Sends an action toward whoever defined it.
    pub fn send_action(&self, identifier: &str, data: Value) -> Result<(), RotondeError> {
        self.with_channel(|chan| chan.send_action(identifier, &data))
    }

    /// Upserts a local definition and announces it when connected.
    ///
    /// While disconnected the definition is only stored; the next
    /// [`connect`](Self::connect) announces every local definition.
    pub fn add_local_definition(
        &self,
        kind: DefinitionKind,
        identifier: &str,
        fields: Vec<Field>,
    ) -> Result<(), RotondeError> {
        let stored = {
            let mut store = self.inner.local_store(kind).write();
            store.put(Definition::new(identifier, kind, fields));
            store.get(identifier).cloned()
        };
        let Some(definition) = stored else {
            return Ok(());
        };
        if self.is_connected() {
            self.with_channel(|chan| chan.send_definition(&definition))?;
        }
        Ok(())
    }

    /// Removes a local definition and retracts it when connected.
    ///
    /// No-op when the identifier is unknown locally.
    pub fn remove_local_definition(
        &self,
        kind: DefinitionKind,
        identifier: &str,
    ) -> Result<(), RotondeError> {
        let removed = self.inner.local_store(kind).write().remove(identifier);
        let Some(definition) = removed else {
            return Ok(());
        };
        if self.is_connected() {
            self.with_channel(|chan| chan.send_undefinition(&definition))?;
        }
        Ok(())
    }

    /// Looks up a definition announced by this client.
    #[must_use]
    pub fn get_local_definition(
        &self,
        kind: DefinitionKind,
        identifier: &str,
    ) -> Option<Definition> {
        self.inner.local_store(kind).read().get(identifier).cloned()
    }

    /// Looks up a definition learned from the remote side.
    #[must_use]
    pub fn get_remote_definition(
        &self,
        kind: DefinitionKind,
        identifier: &str,
    ) -> Option<Definition> {
        self.inner.remote_store(kind).read().get(identifier).cloned()
    }

    /// Registry of event handlers. Attaching the first handler for an
    /// identifier announces `sub`; detaching the last announces `unsub`.
    #[must_use]
    pub fn events(&self) -> &HandlerRegistry {
        &self.inner.events
    }

    /// Registry of action handlers.
    #[must_use]
    pub fn actions(&self) -> &HandlerRegistry {
        &self.inner.actions
    }

    /// Registry fired with each arriving `def`, keyed by identifier.
    #[must_use]
    pub fn definitions(&self) -> &HandlerRegistry {
        &self.inner.definitions
    }

    /// Registry fired with each arriving `undef`, keyed by identifier.
    #[must_use]
    pub fn undefinitions(&self) -> &HandlerRegistry {
        &self.inner.undefinitions
    }

    /// Waits until every listed identifier is known in a remote store.
    ///
    /// Identifiers already known resolve immediately; the rest wait for a
    /// matching `def` arrival, each bounded by `timeout`. Any individual
    /// timeout fails the whole wait. Kind is irrelevant: any `def` with a
    /// matching identifier satisfies its wait.
    pub async fn await_definitions(
        &self,
        identifiers: &[String],
        timeout: Duration,
    ) -> Result<(), RotondeError> {
        let mut waits = Vec::new();
        for identifier in identifiers {
            if self.knows_remote(identifier) {
                continue;
            }
            let wait = self.inner.definitions.watch_once(identifier, Some(timeout));
            // The definition may have landed between the store check and
            // the attach; rechecking closes the window (stores are updated
            // before the arrival dispatch fires).
            if self.knows_remote(identifier) {
                drop(wait);
                continue;
            }
            waits.push(wait);
        }
        if waits.is_empty() {
            return Ok(());
        }
        debug!(pending = waits.len(), "awaiting definitions");
        try_join_all(waits).await?;
        Ok(())
    }

    /// The bootstrap handshake: definitions before traffic.
    ///
    /// 1. Waits (bounded by `timeout`) for a `def` for every identifier
    ///    referenced by `actions`, `events`, or `definitions` that is not
    ///    yet known remotely; a timeout on any aborts the handshake.
    /// 2. Arms a single-shot wait for each entry in `events`, then sends
    ///    every action in order.
    /// 3. Resolves once every awaited event has fired once; fails if any
    ///    individual event wait times out.
    #[instrument(skip_all, fields(actions = actions.len(), events = events.len()))]
    pub async fn bootstrap(
        &self,
        actions: &[(String, Value)],
        events: &[String],
        definitions: &[String],
        timeout: Duration,
    ) -> Result<(), RotondeError> {
        let mut required: Vec<String> = Vec::new();
        for identifier in actions
            .iter()
            .map(|(identifier, _)| identifier)
            .chain(events)
            .chain(definitions)
        {
            if !self.knows_remote(identifier) && !required.contains(identifier) {
                required.push(identifier.clone());
            }
        }
        if !required.is_empty() {
            self.await_definitions(&required, timeout).await?;
        }

        // Waits must be armed before the first action goes out; an event
        // raced back by the remote side would otherwise be lost.
        let waits: Vec<_> = events
            .iter()
            .map(|identifier| self.inner.events.watch_once(identifier, Some(timeout)))
            .collect();
        for (identifier, data) in actions {
            self.send_action(identifier, data.clone())?;
        }
        try_join_all(waits).await?;
        debug!("bootstrap complete");
        Ok(())
    }

    fn knows_remote(&self, identifier: &str) -> bool {
        self.inner.remote_actions.read().contains(identifier)
            || self.inner.remote_events.read().contains(identifier)
    }

    fn with_channel<T>(
        &self,
        operation: impl FnOnce(&ConnectionChannel) -> Result<T, RotondeError>,
    ) -> Result<T, RotondeError> {
        match self.inner.channel.read().as_ref() {
            Some(chan) if chan.is_open() => operation(chan),
            _ => Err(RotondeError::NotConnected),
        }
    }
}

impl ClientInner {
    fn local_store(&self, kind: DefinitionKind) -> &RwLock<DefinitionStore> {
        match kind {
            DefinitionKind::Action => &self.local_actions,
            DefinitionKind::Event => &self.local_events,
        }
    }

    fn remote_store(&self, kind: DefinitionKind) -> &RwLock<DefinitionStore> {
        match kind {
            DefinitionKind::Action => &self.remote_actions,
            DefinitionKind::Event => &self.remote_events,
        }
    }

    /// Routes one decoded inbound packet.
    fn route(&self, packet: Packet) {
        trace!(packet_type = packet.type_name(), "routing inbound packet");
        match packet {
            Packet::Event(traffic) => self.events.dispatch(&traffic.identifier, &traffic.data),
            Packet::Action(traffic) => self.actions.dispatch(&traffic.identifier, &traffic.data),
            Packet::Def(definition) => self.route_definition(definition),
            Packet::Undef(definition) => self.route_undefinition(&definition),
            // sub/unsub only travel toward the hub.
            Packet::Sub(_) | Packet::Unsub(_) => {
                trace!("ignoring hub-bound packet");
            }
        }
    }

    fn route_definition(&self, definition: Definition) {
        let identifier = definition.identifier.clone();
        let kind = definition.kind;
        let announcement = match serde_json::to_value(&definition) {
            Ok(value) => value,
            Err(error) => {
                warn!(%identifier, %error, "definition not re-encodable");
                return;
            }
        };
        self.remote_store(kind).write().put(definition);
        self.definitions.dispatch(&identifier, &announcement);

        // A subscriber may have registered before the remote side announced
        // the event's existence; announce the interest now.
        if kind == DefinitionKind::Event && self.events.is_registered(&identifier) {
            if let Some(chan) = self.channel.read().as_ref() {
                if let Err(error) = chan.send_subscribe(&identifier) {
                    warn!(%identifier, %error, "subscribe announcement failed");
                }
            }
        }
    }

    fn route_undefinition(&self, definition: &Definition) {
        let identifier = &definition.identifier;
        let _ = self.remote_store(definition.kind).write().remove(identifier);
        match serde_json::to_value(definition) {
            Ok(announcement) => self.undefinitions.dispatch(identifier, &announcement),
            Err(error) => warn!(%identifier, %error, "undefinition not re-encodable"),
        }
    }
}
