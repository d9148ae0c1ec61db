//! Typed graph nodes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::slug;

/// The closed set of node kinds in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    Unit,
    Program,
    Course,
    Person,
    Topic,
    AccreditingBody,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Organization,
        EntityKind::Unit,
        EntityKind::Program,
        EntityKind::Course,
        EntityKind::Person,
        EntityKind::Topic,
        EntityKind::AccreditingBody,
    ];

    /// Identifier prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::Unit => "unit",
            EntityKind::Program => "program",
            EntityKind::Course => "course",
            EntityKind::Person => "person",
            EntityKind::Topic => "topic",
            EntityKind::AccreditingBody => "accrediting_body",
        }
    }

    /// Node label used by label-based backends.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Organization => "Organization",
            EntityKind::Unit => "Unit",
            EntityKind::Program => "Program",
            EntityKind::Course => "Course",
            EntityKind::Person => "Person",
            EntityKind::Topic => "Topic",
            EntityKind::AccreditingBody => "AccreditingBody",
        }
    }

    /// Position in the building order. Parents always rank before children.
    pub fn rank(&self) -> u8 {
        match self {
            EntityKind::Organization => 0,
            EntityKind::Unit => 1,
            EntityKind::Program => 2,
            EntityKind::Course => 3,
            EntityKind::Person => 4,
            EntityKind::Topic => 5,
            EntityKind::AccreditingBody => 5,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable node identifier of the form `<kind>:<slug>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Derive the identifier for a name of the given kind.
    pub fn new(kind: EntityKind, name: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), slug(name)))
    }

    /// Wrap an identifier read back from a store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind encoded in the prefix, if it is a known one.
    pub fn kind(&self) -> Option<EntityKind> {
        self.0.split_once(':').and_then(|(k, _)| EntityKind::parse(k))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed node ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Display name as first seen.
    pub name: String,
    /// Document the entity was first extracted from.
    pub origin_document: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(kind: EntityKind, name: impl Into<String>, origin_document: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: EntityId::new(kind, &name),
            kind,
            name,
            origin_document: origin_document.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Override the identifier (placeholder units are keyed by organization).
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    /// Set a property. `None` and empty strings are not stored.
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        };
        if !empty {
            self.properties.insert(key.to_string(), value);
        }
        self
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Fill properties this entity does not carry yet from another copy of the
    /// same node. Existing values win.
    pub fn absorb(&mut self, other: &Entity) {
        for (key, value) in &other.properties {
            self.properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}
