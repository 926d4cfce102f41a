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

//! Insertion-ordered store of action or event definitions.
//!
//! The client owns four of these: {local, remote} x {action, event}. The
//! store itself is single-threaded; owners that share it across tasks wrap
//! it in a lock.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::message::{dedupe_fields, Definition};

/// Ordered mapping from identifier to [`Definition`].
///
/// Holds at most one definition per identifier. Re-adding an identifier
/// merges field lists: the union of old and new fields, deduplicated by
/// name, with the already-stored fields keeping their position and winning
/// name collisions. The rest of the record (kind, attributes) is replaced
/// by the newly supplied definition.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    /// Definitions in insertion order.
    definitions: Vec<Definition>,
    /// Identifier to position index, rebuilt wholesale on every mutation.
    index: HashMap<String, usize>,
}

impl DefinitionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over definitions in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter()
    }

    /// Looks up a definition by identifier.
    ///
    /// A miss is reported as a diagnostic, never an error: callers routinely
    /// probe for definitions the remote side has not announced yet.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&Definition> {
        match self.index.get(identifier) {
            Some(&position) => self.definitions.get(position),
            None => {
                debug!(identifier, "definition not found");
                None
            }
        }
    }

    /// Returns true when the identifier is present, without the miss diagnostic.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// Inserts a definition, or merges it into an existing one.
    pub fn put(&mut self, definition: Definition) {
        let Definition {
            identifier,
            kind,
            fields: new_fields,
        } = definition;
        if let Some(&position) = self.index.get(&identifier) {
            trace!(%identifier, "merging definition");
            let mut fields = std::mem::take(&mut self.definitions[position].fields);
            for field in new_fields {
                if !fields.iter().any(|existing| existing.name == field.name) {
                    fields.push(field);
                }
            }
            // The position is unchanged; only the record itself is replaced.
            self.definitions[position] = Definition {
                identifier,
                kind,
                fields,
            };
        } else {
            trace!(%identifier, "storing definition");
            self.definitions.push(Definition {
                identifier,
                kind,
                fields: dedupe_fields(new_fields),
            });
        }
        self.rebuild_index();
    }

    /// Removes the definition whose `identifier` field matches.
    ///
    /// Returns the removed definition so callers can announce the retraction.
    /// No-op when absent.
    pub fn remove(&mut self, identifier: &str) -> Option<Definition> {
        let position = self
            .definitions
            .iter()
            .position(|stored| stored.identifier == identifier)?;
        let removed = self.definitions.remove(position);
        self.rebuild_index();
        trace!(identifier, "removed definition");
        Some(removed)
    }

    /// Number of stored definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true when the store holds no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .definitions
            .iter()
            .enumerate()
            .map(|(position, definition)| (definition.identifier.clone(), position))
            .collect();
    }
}
