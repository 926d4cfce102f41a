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

//! Per-identifier callback registration with call-count limiting.
//!
//! A [`HandlerRegistry`] maps identifiers to ordered lists of callbacks.
//! The client instantiates four: event handlers, action handlers,
//! definition-arrival handlers, and undefinition-arrival handlers.
//!
//! Two lifecycle hooks, supplied at construction, fire exactly once on each
//! 0→1 and 1→0 transition of an identifier's entry list. The client uses
//! them on its event registry to propagate subscription intent (`sub` /
//! `unsub`) to the remote side.
//!
//! # Re-entrancy
//!
//! [`dispatch`](HandlerRegistry::dispatch) snapshots the entry list before
//! invoking anything, so a callback may freely `attach`, `detach`, or
//! `dispatch` for the same identifier. Entries added during a dispatch are
//! not invoked by that dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::message::RotondeError;

/// A registered callback. Identity for [`detach`](HandlerRegistry::detach)
/// is pointer equality.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Hook invoked with the identifier on a 0→1 or 1→0 entry transition.
pub type LifecycleHook = Box<dyn Fn(&str) + Send + Sync>;

/// Remaining invocation budget of a registered callback.
///
/// An exhausted-but-present entry is unrepresentable: reaching zero removes
/// the entry from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallBudget {
    /// Invoked on every dispatch until detached.
    Unlimited,
    /// Invoked this many more times, then removed.
    Remaining(NonZeroU32),
}

impl CallBudget {
    /// Budget for a single invocation.
    pub const ONCE: Self = Self::Remaining(NonZeroU32::MIN);

    /// A finite budget; `None` when `calls` is zero.
    #[must_use]
    pub fn limited(calls: u32) -> Option<Self> {
        NonZeroU32::new(calls).map(Self::Remaining)
    }
}

/// One registered callback plus its remaining invocation budget.
struct HandlerEntry {
    callback: Handler,
    budget: CallBudget,
}

struct RegistryInner {
    /// Registry name for diagnostics ("events", "actions", ...).
    name: &'static str,
    /// An identifier key exists iff it has at least one entry.
    entries: Mutex<HashMap<String, Vec<HandlerEntry>>>,
    on_first_attach: Option<LifecycleHook>,
    on_last_detach: Option<LifecycleHook>,
}

/// Per-identifier callback registry with lifecycle hooks.
///
/// Cheaply clonable handle; clones share the same entries.
#[derive(Clone)]
pub struct HandlerRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("name", &self.inner.name)
            .field("identifier_count", &self.inner.entries.lock().len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates a registry with no lifecycle hooks.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self::with_hooks(name, None, None)
    }

    /// Creates a registry with the given lifecycle hooks.
    ///
    /// Hooks are invoked outside the registry lock, so they may touch the
    /// registry again without deadlocking.
    #[must_use]
    pub fn with_hooks(
        name: &'static str,
        on_first_attach: Option<LifecycleHook>,
        on_last_detach: Option<LifecycleHook>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                name,
                entries: Mutex::new(HashMap::new()),
                on_first_attach,
                on_last_detach,
            }),
        }
    }

    /// Registers a callback for an identifier.
    ///
    /// Fires the first-attach hook when this is the identifier's 0→1
    /// transition.
    pub fn attach(&self, identifier: &str, callback: Handler, budget: CallBudget) {
        let newly_occupied = {
            let mut entries = self.inner.entries.lock();
            let list = entries.entry(identifier.to_string()).or_default();
            let was_empty = list.is_empty();
            list.push(HandlerEntry { callback, budget });
            was_empty
        };
        trace!(registry = self.inner.name, identifier, "attached handler");
        if newly_occupied {
            if let Some(hook) = &self.inner.on_first_attach {
                hook(identifier);
            }
        }
    }

    /// Registers a callback invoked at most once.
    pub fn attach_once(&self, identifier: &str, callback: Handler) {
        self.attach(identifier, callback, CallBudget::ONCE);
    }

    /// Removes every entry for `identifier` whose callback is pointer-equal
    /// to `callback`.
    ///
    /// Fires the last-detach hook if the identifier's entry list empties.
    /// No-op for unknown identifiers or callbacks.
    pub fn detach(&self, identifier: &str, callback: &Handler) {
        let emptied = {
            let mut entries = self.inner.entries.lock();
            let Some(list) = entries.get_mut(identifier) else {
                return;
            };
            let before = list.len();
            list.retain(|entry| !Arc::ptr_eq(&entry.callback, callback));
            if list.len() == before {
                return;
            }
            let emptied = list.is_empty();
            if emptied {
                entries.remove(identifier);
            }
            emptied
        };
        trace!(registry = self.inner.name, identifier, "detached handler");
        if emptied {
            if let Some(hook) = &self.inner.on_last_detach {
                hook(identifier);
            }
        }
    }

    /// Removes every entry for every identifier.
    ///
    /// Fires the last-detach hook exactly once per identifier as it empties.
    pub fn detach_all(&self) {
        let drained: Vec<String> = {
            let mut entries = self.inner.entries.lock();
            entries.drain().map(|(identifier, _)| identifier).collect()
        };
        trace!(
            registry = self.inner.name,
            identifiers = drained.len(),
            "detached all handlers"
        );
        if let Some(hook) = &self.inner.on_last_detach {
            for identifier in &drained {
                hook(identifier);
            }
        }
    }

    /// Invokes every currently-attached callback for `identifier`, in
    /// attachment order, exactly once.
    ///
    /// Finite budgets are decremented before invocation; entries reaching
    /// zero are removed (and the last-detach hook fired, if the list
    /// empties) before any callback runs. Callbacks run outside the
    /// registry lock, against a snapshot taken at dispatch start.
    pub fn dispatch(&self, identifier: &str, data: &Value) {
        let (snapshot, emptied) = {
            let mut entries = self.inner.entries.lock();
            let Some(list) = entries.get_mut(identifier) else {
                trace!(
                    registry = self.inner.name,
                    identifier,
                    "dispatch with no handlers"
                );
                return;
            };
            let mut snapshot: Vec<Handler> = Vec::with_capacity(list.len());
            list.retain_mut(|entry| {
                snapshot.push(Arc::clone(&entry.callback));
                match entry.budget {
                    CallBudget::Unlimited => true,
                    CallBudget::Remaining(left) => match NonZeroU32::new(left.get() - 1) {
                        Some(rest) => {
                            entry.budget = CallBudget::Remaining(rest);
                            true
                        }
                        None => false,
                    },
                }
            });
            let emptied = list.is_empty();
            if emptied {
                entries.remove(identifier);
            }
            (snapshot, emptied)
        };
        if emptied {
            if let Some(hook) = &self.inner.on_last_detach {
                hook(identifier);
            }
        }
        trace!(
            registry = self.inner.name,
            identifier,
            handlers = snapshot.len(),
            "dispatching"
        );
        for callback in &snapshot {
            callback(data);
        }
    }

    /// Snapshot of identifiers with at least one entry.
    #[must_use]
    pub fn registered_identifiers(&self) -> Vec<String> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    /// Returns true when the identifier has at least one entry.
    #[must_use]
    pub fn is_registered(&self, identifier: &str) -> bool {
        self.inner.entries.lock().contains_key(identifier)
    }

    /// Number of entries currently registered for the identifier.
    #[must_use]
    pub fn handler_count(&self, identifier: &str) -> usize {
        self.inner
            .entries
            .lock()
            .get(identifier)
            .map_or(0, Vec::len)
    }

    /// Synchronously registers a single-shot wait and returns a future
    /// resolving with the next dispatched payload for `identifier`.
    ///
    /// Registration happens before this method returns, so callers can
    /// arm waits ahead of the traffic that triggers them. When `timeout`
    /// elapses first, the future resolves to
    /// [`RotondeError::Timeout`] and the pending entry is detached before
    /// the error is observable, so a late dispatch cannot fire into a
    /// settled wait. Dropping the future likewise detaches the entry.
    pub fn watch_once(
        &self,
        identifier: &str,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Value, RotondeError>> + Send + 'static {
        let (sender, receiver) = oneshot::channel::<Value>();
        let slot = Mutex::new(Some(sender));
        let callback: Handler = Arc::new(move |data: &Value| {
            if let Some(sender) = slot.lock().take() {
                if sender.send(data.clone()).is_err() {
                    warn!("watch settled before payload delivery");
                }
            }
        });
        self.attach_once(identifier, Arc::clone(&callback));
        let guard = WatchGuard {
            registry: self.clone(),
            identifier: identifier.to_string(),
            callback,
        };
        async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, receiver).await {
                    Ok(settled) => settled.map_err(|_| RotondeError::WaitAbandoned {
                        identifier: guard.identifier.clone(),
                    }),
                    Err(_) => Err(RotondeError::Timeout {
                        identifier: guard.identifier.clone(),
                    }),
                },
                None => receiver.await.map_err(|_| RotondeError::WaitAbandoned {
                    identifier: guard.identifier.clone(),
                }),
            };
            // The guard detaches before the caller observes the outcome.
            drop(guard);
            outcome
        }
    }

    /// Awaits the next dispatched payload for `identifier`.
    pub async fn await_once(
        &self,
        identifier: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, RotondeError> {
        self.watch_once(identifier, timeout).await
    }
}

/// Detaches a pending watch entry when its future settles or is dropped.
struct WatchGuard {
    registry: HandlerRegistry,
    identifier: String,
    callback: Handler,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.registry.detach(&self.identifier, &self.callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_once_budget_invokes_exactly_once() {
        let registry = HandlerRegistry::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        registry.attach_once("tick", counting_handler(Arc::clone(&calls)));

        registry.dispatch("tick", &json!(1));
        registry.dispatch("tick", &json!(2));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.is_registered("tick"));
    }

    #[test]
    fn test_limited_budget_counts_down() {
        let registry = HandlerRegistry::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        registry.attach(
            "tick",
            counting_handler(Arc::clone(&calls)),
            CallBudget::limited(3).unwrap(),
        );

        for _ in 0..5 {
            registry.dispatch("tick", &json!(null));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.handler_count("tick"), 0);
    }

    #[test]
    fn test_hooks_fire_once_per_transition() {
        let firsts = Arc::new(AtomicUsize::new(0));
        let lasts = Arc::new(AtomicUsize::new(0));
        let first_counter = Arc::clone(&firsts);
        let last_counter = Arc::clone(&lasts);
        let registry = HandlerRegistry::with_hooks(
            "test",
            Some(Box::new(move |_| {
                first_counter.fetch_add(1, Ordering::SeqCst);
            })),
            Some(Box::new(move |_| {
                last_counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let a: Handler = Arc::new(|_| {});
        let b: Handler = Arc::new(|_| {});
        registry.attach("tick", Arc::clone(&a), CallBudget::Unlimited);
        registry.attach("tick", Arc::clone(&b), CallBudget::Unlimited);
        assert_eq!(firsts.load(Ordering::SeqCst), 1);

        registry.detach("tick", &a);
        assert_eq!(lasts.load(Ordering::SeqCst), 0);
        registry.detach("tick", &b);
        assert_eq!(lasts.load(Ordering::SeqCst), 1);

        // A fresh 0→1 transition fires the first-attach hook again.
        registry.attach("tick", a, CallBudget::Unlimited);
        assert_eq!(firsts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exhaustion_fires_last_detach_hook() {
        let lasts = Arc::new(AtomicUsize::new(0));
        let last_counter = Arc::clone(&lasts);
        let registry = HandlerRegistry::with_hooks(
            "test",
            None,
            Some(Box::new(move |_| {
                last_counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        registry.attach_once("tick", Arc::new(|_| {}));
        registry.dispatch("tick", &json!(null));

        assert_eq!(lasts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detach_all_fires_hook_per_identifier() {
        let lasts = Arc::new(AtomicUsize::new(0));
        let last_counter = Arc::clone(&lasts);
        let registry = HandlerRegistry::with_hooks(
            "test",
            None,
            Some(Box::new(move |_| {
                last_counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        registry.attach("tick", Arc::new(|_| {}), CallBudget::Unlimited);
        registry.attach("tick", Arc::new(|_| {}), CallBudget::Unlimited);
        registry.attach("tock", Arc::new(|_| {}), CallBudget::Unlimited);
        registry.detach_all();

        assert_eq!(lasts.load(Ordering::SeqCst), 2);
        assert!(registry.registered_identifiers().is_empty());
    }

    #[test]
    fn test_reentrant_attach_not_invoked_same_dispatch() {
        let registry = HandlerRegistry::new("test");
        let late_calls = Arc::new(AtomicUsize::new(0));
        let late_counter = Arc::clone(&late_calls);
        let reentrant = registry.clone();
        registry.attach_once(
            "tick",
            Arc::new(move |_| {
                let counter = Arc::clone(&late_counter);
                reentrant.attach_once(
                    "tick",
                    Arc::new(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        registry.dispatch("tick", &json!(null));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        registry.dispatch("tick", &json!(null));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_order_is_attachment_order() {
        let registry = HandlerRegistry::new("test");
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            registry.attach(
                "tick",
                Arc::new(move |_| order.lock().push(label)),
                CallBudget::Unlimited,
            );
        }

        registry.dispatch("tick", &json!(null));
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_watch_once_resolves_with_payload() -> anyhow::Result<()> {
        let registry = HandlerRegistry::new("test");
        let wait = registry.watch_once("tick", Some(Duration::from_secs(1)));

        registry.dispatch("tick", &json!({ "n": 7 }));

        let payload = wait.await?;
        assert_eq!(payload["n"], 7);
        assert!(!registry.is_registered("tick"));
        Ok(())
    }

    #[tokio::test]
    async fn test_watch_once_timeout_detaches_entry() {
        let registry = HandlerRegistry::new("test");
        let wait = registry.watch_once("tick", Some(Duration::from_millis(50)));

        let result = wait.await;
        assert!(matches!(
            result,
            Err(RotondeError::Timeout { identifier }) if identifier == "tick"
        ));
        assert!(!registry.is_registered("tick"));

        // A late dispatch finds nothing to fire into.
        registry.dispatch("tick", &json!(null));
    }

    #[tokio::test]
    async fn test_dropped_watch_detaches_entry() {
        let registry = HandlerRegistry::new("test");
        let wait = registry.watch_once("tick", None);
        assert!(registry.is_registered("tick"));

        drop(wait);
        assert!(!registry.is_registered("tick"));
    }

    #[tokio::test]
    async fn test_detach_all_abandons_pending_watch() {
        let registry = HandlerRegistry::new("test");
        let wait = registry.watch_once("tick", Some(Duration::from_secs(1)));

        registry.detach_all();

        let result = wait.await;
        assert!(matches!(result, Err(RotondeError::WaitAbandoned { .. })));
    }
}
