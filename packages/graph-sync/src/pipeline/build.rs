//! Entity/relationship builder and the cross-document reduce step.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::classify::{Classifier, Label, ProgramLevel, ProgramType};
use crate::error::SyncError;
use crate::identity::{normalize, placeholder_unit_id, ResolutionTable, PLACEHOLDER_PROPERTY};
use crate::types::{
    Entity, EntityId, EntityKind, ExtractedRecord, GraphBatch, RelationKind, Relationship,
    SkippedRecord, Stage, Triple,
};

/// Course level from the first digit of the course number.
pub fn course_level(code: &str) -> &'static str {
    match code.chars().find(|c| c.is_ascii_digit()) {
        Some('0' | '1' | '2') => "Lower Division",
        Some('3' | '4') => "Upper Division",
        Some(_) => "Graduate",
        None => "Unknown",
    }
}

fn join_text(name: &str, description: Option<&str>) -> String {
    match description {
        Some(d) => format!("{name} {d}"),
        None => name.to_string(),
    }
}

/// Turns one [`ExtractedRecord`] into a [`GraphBatch`].
pub struct Builder<'a> {
    classifier: &'a Classifier,
    placeholder_unit_name: &'a str,
}

impl<'a> Builder<'a> {
    pub fn new(classifier: &'a Classifier, placeholder_unit_name: &'a str) -> Self {
        Self {
            classifier,
            placeholder_unit_name,
        }
    }

    /// Build entities in hierarchy order (Organization, Units, Programs,
    /// Courses, People, then Topics and AccreditingBodies) together with
    /// every relationship the record supports.
    pub fn build(&self, record: &ExtractedRecord) -> GraphBatch {
        let doc = record.source_file.as_str();
        let meta = &record.metadata;
        let mut batch = GraphBatch::new();

        let org = batch.push_entity(
            Entity::new(EntityKind::Organization, &record.organization_name, doc)
                .with_property("location", meta.location.clone())
                .with_property("founded", meta.founded)
                .with_property("total_students", meta.total_students)
                .with_property("accreditation", meta.accreditation.clone())
                .with_property("description", meta.description.clone()),
        );

        let mut topics: BTreeSet<&'static str> = BTreeSet::new();
        let mut links: Vec<(EntityId, &'static str)> = Vec::new();

        // Units
        let mut units: HashMap<String, EntityId> = HashMap::new();
        for unit in &record.units {
            let text = join_text(&unit.name, unit.description.as_deref());
            let id = batch.push_entity(
                Entity::new(EntityKind::Unit, &unit.name, doc)
                    .with_property("focus", self.classifier.unit_focus(Some(&text)).as_str())
                    .with_property("description", unit.description.clone()),
            );
            batch.push_relationship(Relationship::new(
                org.clone(),
                RelationKind::Locates,
                id.clone(),
                doc,
            ));
            for topic in self.classifier.topics(Some(&text)) {
                topics.insert(topic.as_str());
                links.push((id.clone(), topic.as_str()));
            }
            units.insert(normalize(&unit.name), id);
        }

        let resolve_unit = |name: Option<&str>| name.and_then(|n| units.get(&normalize(n))).cloned();
        let needs_placeholder = record
            .programs
            .iter()
            .map(|p| p.unit.as_deref())
            .chain(record.people.iter().map(|p| p.unit.as_deref()))
            .any(|unit| resolve_unit(unit).is_none());
        let placeholder = needs_placeholder.then(|| self.placeholder(&mut batch, &org, record));

        // Programs
        let mut programs: HashMap<String, EntityId> = HashMap::new();
        for program in &record.programs {
            let text = join_text(&program.name, program.description.as_deref());
            let mut level = self.classifier.program_level(Some(&program.name));
            if level == ProgramLevel::Unknown {
                level = self.classifier.program_level(program.description.as_deref());
            }
            let mut kind = self.classifier.program_type(Some(&program.name));
            if kind == ProgramType::Other {
                kind = self.classifier.program_type(program.description.as_deref());
            }

            let id = batch.push_entity(
                Entity::new(EntityKind::Program, &program.name, doc)
                    .with_property("level", level.as_str())
                    .with_property("type", kind.as_str())
                    .with_property(
                        "technology_focus",
                        self.classifier.technology_focus(Some(&text)).as_str(),
                    )
                    .with_property("description", program.description.clone()),
            );

            let unit = resolve_unit(program.unit.as_deref()).or_else(|| {
                debug!(
                    program = %program.name,
                    unit = ?program.unit,
                    "program has no classified unit, using placeholder"
                );
                placeholder.clone()
            });
            if let Some(unit) = unit {
                batch.push_relationship(Relationship::new(
                    unit,
                    RelationKind::Offers,
                    id.clone(),
                    doc,
                ));
            }

            for topic in self.classifier.topics(Some(&text)) {
                topics.insert(topic.as_str());
                links.push((id.clone(), topic.as_str()));
            }
            programs.insert(normalize(&program.name), id);
        }

        // Courses
        for course in &record.courses {
            let id = batch.push_entity(
                Entity::new(EntityKind::Course, &course.title, doc)
                    .with_property("code", course.code.as_str())
                    .with_property("level", course_level(&course.code))
                    .with_property(
                        "technology_focus",
                        self.classifier.technology_focus(Some(&course.title)).as_str(),
                    ),
            );
            if let Some(program) = course
                .program
                .as_deref()
                .and_then(|p| programs.get(&normalize(p)))
            {
                batch.push_relationship(Relationship::new(
                    program.clone(),
                    RelationKind::OffersCourse,
                    id.clone(),
                    doc,
                ));
            }
            for topic in self.classifier.topics(Some(&course.title)) {
                topics.insert(topic.as_str());
                links.push((id.clone(), topic.as_str()));
            }
        }

        // People
        for person in &record.people {
            let id = batch.push_entity(
                Entity::new(EntityKind::Person, &person.name, doc)
                    .with_property("title", person.title.clone())
                    .with_property("expertise", person.expertise.clone()),
            );
            if let Some(unit) = resolve_unit(person.unit.as_deref()).or_else(|| placeholder.clone()) {
                batch.push_relationship(Relationship::new(unit, RelationKind::Employs, id, doc));
            }
        }

        // Topics
        for topic in &topics {
            batch.push_entity(Entity::new(EntityKind::Topic, *topic, doc));
        }
        for (source, topic) in links {
            let relation = if source.kind() == Some(EntityKind::Course) {
                RelationKind::Covers
            } else {
                RelationKind::SpecializesIn
            };
            batch.push_relationship(Relationship::new(
                source,
                relation,
                EntityId::new(EntityKind::Topic, topic),
                doc,
            ));
        }

        // Accrediting bodies
        for accreditation in &record.accreditations {
            let body = batch.push_entity(Entity::new(
                EntityKind::AccreditingBody,
                &accreditation.body,
                doc,
            ));
            let Some(target) = accreditation.target.as_deref() else {
                continue;
            };
            let key = normalize(target);
            match programs.get(&key).or_else(|| units.get(&key)) {
                Some(source) => batch.push_relationship(Relationship::new(
                    source.clone(),
                    RelationKind::AccreditedBy,
                    body,
                    doc,
                )),
                None => debug!(
                    target,
                    body = %accreditation.body,
                    "accreditation target is not a program or unit"
                ),
            }
        }

        batch
    }

    /// The organization's placeholder unit and its `locates` edge.
    fn placeholder(
        &self,
        batch: &mut GraphBatch,
        org: &EntityId,
        record: &ExtractedRecord,
    ) -> EntityId {
        let id = batch.push_entity(
            Entity::new(EntityKind::Unit, self.placeholder_unit_name, &record.source_file)
                .with_id(placeholder_unit_id(
                    self.placeholder_unit_name,
                    &record.organization_name,
                ))
                .with_property(PLACEHOLDER_PROPERTY, true)
                .with_property("organization", record.organization_name.as_str()),
        );
        batch.push_relationship(Relationship::new(
            org.clone(),
            RelationKind::Locates,
            id.clone(),
            &record.source_file,
        ));
        id
    }
}

/// Merge per-document batches in the given order.
///
/// Entities sharing an identifier collapse into one node; the first document
/// keeps provenance and later copies only fill missing properties. An entity
/// rejected by the [`ResolutionTable`] is skipped together with every
/// relationship from the same document that touches it. A rejected
/// Organization takes its whole document down with it, so nothing from that
/// document can land in the graph without a path to an Organization.
pub fn merge_batches(
    batches: impl IntoIterator<Item = GraphBatch>,
    table: &mut ResolutionTable,
) -> (GraphBatch, Vec<SkippedRecord>) {
    let mut merged = GraphBatch::new();
    let mut positions: HashMap<EntityId, usize> = HashMap::new();
    let mut triples: BTreeSet<Triple> = BTreeSet::new();
    let mut skipped = Vec::new();

    for batch in batches {
        if let Some(org) = batch
            .entities
            .iter()
            .find(|e| e.kind == EntityKind::Organization)
        {
            if let Err(e) = table.resolve(org) {
                warn!(
                    organization = %org.id,
                    document = %org.origin_document,
                    error = %e,
                    "identity collision on organization, skipping document"
                );
                skip_document(&batch, &org.id, &e, &mut skipped);
                continue;
            }
        }

        let mut rejected: BTreeSet<EntityId> = BTreeSet::new();

        for entity in batch.entities {
            if let Err(e) = table.resolve(&entity) {
                warn!(
                    entity = %entity.id,
                    document = %entity.origin_document,
                    error = %e,
                    "identity collision, skipping entity"
                );
                skipped.push(SkippedRecord::new(
                    Stage::Resolve,
                    Some(&entity.origin_document),
                    entity.id.to_string(),
                    &e,
                ));
                rejected.insert(entity.id);
                continue;
            }
            match positions.get(&entity.id) {
                Some(&i) => merged.entities[i].absorb(&entity),
                None => {
                    positions.insert(entity.id.clone(), merged.entities.len());
                    merged.entities.push(entity);
                }
            }
        }

        for relationship in batch.relationships {
            if let Some(id) = rejected.iter().find(|id| relationship.touches(id)) {
                skipped.push(SkippedRecord::new(
                    Stage::Resolve,
                    Some(&relationship.origin_document),
                    relationship.triple.to_string(),
                    format!("endpoint {id} was rejected by identity collision"),
                ));
                continue;
            }
            if triples.insert(relationship.triple.clone()) {
                merged.relationships.push(relationship);
            }
        }
    }

    (merged, skipped)
}

fn skip_document(
    batch: &GraphBatch,
    org: &EntityId,
    error: &SyncError,
    skipped: &mut Vec<SkippedRecord>,
) {
    for entity in &batch.entities {
        let reason = if &entity.id == org {
            error.to_string()
        } else {
            format!("organization {org} was rejected by identity collision")
        };
        skipped.push(SkippedRecord::new(
            Stage::Resolve,
            Some(&entity.origin_document),
            entity.id.to_string(),
            reason,
        ));
    }
    for relationship in &batch.relationships {
        skipped.push(SkippedRecord::new(
            Stage::Resolve,
            Some(&relationship.origin_document),
            relationship.triple.to_string(),
            format!("organization {org} was rejected by identity collision"),
        ));
    }
}
