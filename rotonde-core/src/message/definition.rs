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

//! Definition types for the Rotonde protocol.
//!
//! A definition announces the shape of an action or event before traffic
//! referencing its identifier is meaningful. Definitions are exchanged as
//! `def`/`undef` packet payloads and tracked in [`DefinitionStore`]s on both
//! the local and remote side of a connection.
//!
//! [`DefinitionStore`]: crate::common::DefinitionStore

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One named field of a definition.
///
/// Identity for deduplication is `name` alone; any further attributes
/// (units, types, ranges) ride along untouched through the flattened map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// The field name, unique within a definition.
    pub name: String,
    /// Additional attributes preserved verbatim on the wire.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Field {
    /// Creates a field with a name and no further attributes.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    /// Adds an attribute, consuming and returning the field.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Whether a definition describes an action or an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    /// A command sent toward the remote side.
    Action,
    /// A notification published by the remote side.
    Event,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// The declared shape of an action or event.
///
/// # Wire Format
///
/// When serialized as a `def`/`undef` packet payload:
///
/// ```json
/// {
///   "identifier": "thruster.set",
///   "kind": "action",
///   "fields": [
///     { "name": "pitch", "unit": "deg" },
///     { "name": "power" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// The unique identifier this definition describes.
    pub identifier: String,
    /// Action or event.
    pub kind: DefinitionKind,
    /// Ordered fields, unique by name.
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Definition {
    /// Creates a definition, deduplicating fields by name (first wins).
    #[must_use]
    pub fn new(identifier: impl Into<String>, kind: DefinitionKind, fields: Vec<Field>) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            fields: dedupe_fields(fields),
        }
    }

    /// Returns true when a field with the given name is present.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }
}

/// Drops later fields that repeat an earlier field's name.
pub(crate) fn dedupe_fields(fields: Vec<Field>) -> Vec<Field> {
    let mut unique: Vec<Field> = Vec::with_capacity(fields.len());
    for field in fields {
        if !unique.iter().any(|existing| existing.name == field.name) {
            unique.push(field);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_dedupe_keeps_first() {
        let definition = Definition::new(
            "laser",
            DefinitionKind::Action,
            vec![
                Field::named("power").with_attribute("unit", json!("W")),
                Field::named("power"),
                Field::named("angle"),
            ],
        );

        assert_eq!(definition.fields.len(), 2);
        assert_eq!(definition.fields[0].name, "power");
        assert_eq!(definition.fields[0].attributes["unit"], json!("W"));
        assert_eq!(definition.fields[1].name, "angle");
    }

    #[test]
    fn test_attribute_round_trip() {
        let field = Field::named("pitch").with_attribute("unit", json!("deg"));
        let encoded = serde_json::to_string(&field).unwrap();
        let decoded: Field = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, field);
        assert_eq!(decoded.attributes["unit"], json!("deg"));
    }

    #[test]
    fn test_kind_wire_casing() {
        assert_eq!(
            serde_json::to_string(&DefinitionKind::Action).unwrap(),
            "\"action\""
        );
        assert_eq!(
            serde_json::to_string(&DefinitionKind::Event).unwrap(),
            "\"event\""
        );
    }

    #[test]
    fn test_missing_fields_defaults_empty() {
        let decoded: Definition =
            serde_json::from_str(r#"{"identifier":"ping","kind":"event"}"#).unwrap();
        assert!(decoded.fields.is_empty());
    }
}
