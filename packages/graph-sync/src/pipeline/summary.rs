//! Corpus-wide extraction summary.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Label, TechnologyFocus};
use crate::types::{EntityKind, ExtractedRecord, GraphBatch, RelationKind, SkippedRecord};

/// One row per organization document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRow {
    pub name: String,
    pub source_file: String,
    pub success: bool,
    pub units: usize,
    pub programs: usize,
    pub courses: usize,
    pub people: usize,
    pub technology_mentions: usize,
}

/// How many organizations touch a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAdoption {
    pub topic: String,
    pub organizations: usize,
    /// Share of successfully extracted organizations, 0.0 to 1.0
    pub adoption_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub generated_at: DateTime<Utc>,
    pub documents_processed: usize,
    pub documents_succeeded: usize,
    pub documents_failed: usize,
    pub entity_counts: BTreeMap<String, usize>,
    pub relationship_counts: BTreeMap<String, usize>,
    pub program_levels: BTreeMap<String, usize>,
    pub technology_adoption: Vec<TopicAdoption>,
    pub organizations: Vec<OrganizationRow>,
    pub skipped: Vec<SkippedRecord>,
}

impl CorpusSummary {
    /// Summarize extraction records, their per-document batches and the
    /// merged expected graph.
    pub fn new(
        records: &[ExtractedRecord],
        documents: &[GraphBatch],
        merged: &GraphBatch,
        skipped: &[SkippedRecord],
    ) -> Self {
        let succeeded = records.iter().filter(|r| r.is_success()).count();

        let entity_counts = merged
            .entity_counts()
            .into_iter()
            .map(|(k, n)| (k.as_str().to_string(), n))
            .collect();
        let relationship_counts = merged
            .relationship_counts()
            .into_iter()
            .map(|(k, n)| (k.as_str().to_string(), n))
            .collect();

        let mut program_levels = BTreeMap::new();
        for program in merged.entities.iter().filter(|e| e.kind == EntityKind::Program) {
            let level = program.property_str("level").unwrap_or("Unknown");
            *program_levels.entry(level.to_string()).or_insert(0) += 1;
        }

        // Topics per organization, from each document's own batch so shared
        // entities count for every organization that lists them.
        let mut adopters: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for batch in documents {
            let Some(org) = batch
                .entities
                .iter()
                .find(|e| e.kind == EntityKind::Organization)
            else {
                continue;
            };
            for r in &batch.relationships {
                if !matches!(r.triple.kind, RelationKind::SpecializesIn | RelationKind::Covers) {
                    continue;
                }
                if let Some(topic) = batch.entity(&r.triple.target) {
                    adopters.entry(topic.name.as_str()).or_default().insert(org.name.as_str());
                }
            }
        }
        let technology_adoption = TechnologyFocus::TOPICS
            .iter()
            .map(|topic| {
                let organizations = adopters.get(topic.as_str()).map(BTreeSet::len).unwrap_or(0);
                TopicAdoption {
                    topic: topic.as_str().to_string(),
                    organizations,
                    adoption_rate: if succeeded == 0 {
                        0.0
                    } else {
                        organizations as f64 / succeeded as f64
                    },
                }
            })
            .collect();

        let organizations = records
            .iter()
            .map(|r| OrganizationRow {
                name: r.organization_name.clone(),
                source_file: r.source_file.clone(),
                success: r.is_success(),
                units: r.units.len(),
                programs: r.programs.len(),
                courses: r.courses.len(),
                people: r.people.len(),
                technology_mentions: r.technology_mentions.values().sum(),
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            documents_processed: records.len(),
            documents_succeeded: succeeded,
            documents_failed: records.len() - succeeded,
            entity_counts,
            relationship_counts,
            program_levels,
            technology_adoption,
            organizations,
            skipped: skipped.to_vec(),
        }
    }

    pub fn adoption(&self, topic: TechnologyFocus) -> Option<&TopicAdoption> {
        self.technology_adoption
            .iter()
            .find(|t| t.topic == topic.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, Relationship};

    fn document(org: &str, file: &str, topic: Option<&str>) -> (ExtractedRecord, GraphBatch) {
        let record = ExtractedRecord::new(org, file);
        let mut batch = GraphBatch::new();
        batch.push_entity(Entity::new(EntityKind::Organization, org, file));
        let unit = batch.push_entity(Entity::new(EntityKind::Unit, "Geography Department", file));
        if let Some(topic) = topic {
            let t = batch.push_entity(Entity::new(EntityKind::Topic, topic, file));
            batch.push_relationship(Relationship::new(unit, RelationKind::SpecializesIn, t, file));
        }
        (record, batch)
    }

    #[test]
    fn test_adoption_counts_each_organization_once() {
        let (a, ba) = document("Alpha University", "a.md", Some("GIS"));
        let (b, bb) = document("Beta College", "b.md", None);
        let failed = ExtractedRecord::failed("Gamma", "c.md", "no patterns");
        let records = vec![a, b, failed];

        let summary = CorpusSummary::new(&records, &[ba.clone(), bb], &ba, &[]);
        assert_eq!(summary.documents_processed, 3);
        assert_eq!(summary.documents_succeeded, 2);
        assert_eq!(summary.documents_failed, 1);

        let gis = summary.adoption(TechnologyFocus::Gis).unwrap();
        assert_eq!(gis.organizations, 1);
        assert!((gis.adoption_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.adoption(TechnologyFocus::AiMl).unwrap().organizations, 0);
        assert_eq!(summary.technology_adoption.len(), TechnologyFocus::TOPICS.len());
    }
}
