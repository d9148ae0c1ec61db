//! Name normalization, identifiers and cross-document entity resolution.
//!
//! Identifiers are a pure function of `(kind, normalize(name))`, so the same
//! name extracted from two documents always lands on the same node. The
//! [`ResolutionTable`] is threaded through the reduce phase to catch records
//! that share an identifier but disagree on a field that defines identity.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::SyncError;
use crate::types::entity::{Entity, EntityId, EntityKind};

/// Default display name of the synthesized unit for unattached programs/people.
pub const PLACEHOLDER_UNIT: &str = "General Academic Unit";

/// Property flag set on synthesized placeholder units.
pub const PLACEHOLDER_PROPERTY: &str = "placeholder";

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '/' | '&' | '_' | '+' | '|' | '\u{2013}' | '\u{2014}')
}

/// Canonical form of a name: case-folded, punctuation stripped, separators
/// turned into spaces, whitespace collapsed.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || is_separator(c) {
            pending_space = !out.is_empty();
        } else if c.is_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

/// URL-safe slug of the normalized name.
pub fn slug(name: &str) -> String {
    normalize(name).replace(' ', "-")
}

/// Collapse runs of whitespace and trim, keeping case and punctuation.
pub fn clean_display(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identifier of the placeholder unit owned by one organization.
pub fn placeholder_unit_id(placeholder_name: &str, organization: &str) -> EntityId {
    EntityId::new(
        EntityKind::Unit,
        &format!("{placeholder_name} {organization}"),
    )
}

/// Fields that must agree for two records to be the same entity.
pub fn identity_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Course => &["code"],
        EntityKind::Organization => &["location"],
        _ => &[],
    }
}

/// First registration of an identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub kind: EntityKind,
    pub name: String,
    pub first_document: String,
    pub identity: BTreeMap<String, String>,
}

/// Outcome of resolving an entity against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// First time this identifier is seen
    New,
    /// Same entity as one registered earlier
    Existing,
}

/// Identifier → first registration, filled during the serial reduce phase.
#[derive(Debug, Default, Clone)]
pub struct ResolutionTable {
    entries: BTreeMap<EntityId, Resolution>,
}

impl ResolutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Resolution> {
        self.entries.get(id)
    }

    /// Register an entity, or confirm it matches the earlier registration.
    ///
    /// Returns [`SyncError::IdentityCollision`] when the identifier is already
    /// registered with a different kind or a conflicting identity field.
    pub fn resolve(&mut self, entity: &Entity) -> Result<Resolved, SyncError> {
        let fields = identity_fields(entity.kind);
        let incoming: BTreeMap<String, String> = fields
            .iter()
            .filter_map(|f| entity.property_str(f).map(|v| (f.to_string(), v.to_string())))
            .collect();

        let Some(existing) = self.entries.get_mut(&entity.id) else {
            self.entries.insert(
                entity.id.clone(),
                Resolution {
                    kind: entity.kind,
                    name: entity.name.clone(),
                    first_document: entity.origin_document.clone(),
                    identity: incoming,
                },
            );
            return Ok(Resolved::New);
        };

        if existing.kind != entity.kind {
            return Err(SyncError::IdentityCollision {
                id: entity.id.to_string(),
                field: "kind".into(),
                existing: existing.kind.to_string(),
                incoming: entity.kind.to_string(),
                first_document: existing.first_document.clone(),
                document: entity.origin_document.clone(),
            });
        }

        for (field, value) in &incoming {
            match existing.identity.get(field) {
                Some(current) if normalize(current) != normalize(value) => {
                    return Err(SyncError::IdentityCollision {
                        id: entity.id.to_string(),
                        field: field.clone(),
                        existing: current.clone(),
                        incoming: value.clone(),
                        first_document: existing.first_document.clone(),
                        document: entity.origin_document.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    existing.identity.insert(field.clone(), value.clone());
                }
            }
        }

        Ok(Resolved::Existing)
    }
}
