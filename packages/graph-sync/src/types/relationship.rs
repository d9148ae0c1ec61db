//! Typed directed edges.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind};

/// The closed set of relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Locates,
    Offers,
    OffersCourse,
    Employs,
    SpecializesIn,
    Covers,
    AccreditedBy,
}

impl RelationKind {
    pub const ALL: [RelationKind; 7] = [
        RelationKind::Locates,
        RelationKind::Offers,
        RelationKind::OffersCourse,
        RelationKind::Employs,
        RelationKind::SpecializesIn,
        RelationKind::Covers,
        RelationKind::AccreditedBy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Locates => "locates",
            RelationKind::Offers => "offers",
            RelationKind::OffersCourse => "offers_course",
            RelationKind::Employs => "employs",
            RelationKind::SpecializesIn => "specializes_in",
            RelationKind::Covers => "covers",
            RelationKind::AccreditedBy => "accredited_by",
        }
    }

    /// Relationship type name for label-based backends (`OFFERS_COURSE`).
    pub fn type_name(&self) -> &'static str {
        match self {
            RelationKind::Locates => "LOCATES",
            RelationKind::Offers => "OFFERS",
            RelationKind::OffersCourse => "OFFERS_COURSE",
            RelationKind::Employs => "EMPLOYS",
            RelationKind::SpecializesIn => "SPECIALIZES_IN",
            RelationKind::Covers => "COVERS",
            RelationKind::AccreditedBy => "ACCREDITED_BY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.type_name() == s)
    }

    /// Whether this relation may connect `source` to `target`.
    pub fn allows(&self, source: EntityKind, target: EntityKind) -> bool {
        use EntityKind::*;
        match self {
            RelationKind::Locates => source == Organization && target == Unit,
            RelationKind::Offers => source == Unit && target == Program,
            RelationKind::OffersCourse => source == Program && target == Course,
            RelationKind::Employs => source == Unit && target == Person,
            RelationKind::SpecializesIn => matches!(source, Program | Unit) && target == Topic,
            RelationKind::Covers => source == Course && target == Topic,
            RelationKind::AccreditedBy => {
                matches!(source, Program | Unit) && target == AccreditingBody
            }
        }
    }

    /// Edges that carry the Organization → Unit → {Program, Person} hierarchy.
    pub fn is_hierarchy(&self) -> bool {
        matches!(
            self,
            RelationKind::Locates | RelationKind::Offers | RelationKind::Employs
        )
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity of an edge: `(source, relation, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub source: EntityId,
    pub kind: RelationKind,
    pub target: EntityId,
}

impl Triple {
    pub fn new(source: EntityId, kind: RelationKind, target: EntityId) -> Self {
        Self {
            source,
            kind,
            target,
        }
    }

    /// Check the relation against the kinds encoded in both endpoint ids.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let source = self
            .source
            .kind()
            .ok_or_else(|| format!("unknown source kind in {}", self.source))?;
        let target = self
            .target
            .kind()
            .ok_or_else(|| format!("unknown target kind in {}", self.target))?;
        if self.kind.allows(source, target) {
            Ok(())
        } else {
            Err(format!("{} cannot connect {source} to {target}", self.kind))
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.kind, self.target)
    }
}

/// An edge ready for upsert. Only provenance is ever written onto it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(flatten)]
    pub triple: Triple,
    pub origin_document: String,
}

impl Relationship {
    pub fn new(
        source: EntityId,
        kind: RelationKind,
        target: EntityId,
        origin_document: impl Into<String>,
    ) -> Self {
        Self {
            triple: Triple::new(source, kind, target),
            origin_document: origin_document.into(),
        }
    }

    pub fn touches(&self, id: &EntityId) -> bool {
        &self.triple.source == id || &self.triple.target == id
    }
}
