//! Batch outputs written to an output directory.
//!
//! ```text
//! out/
//!   records/<slug>.json
//!   extraction_summary.json
//!   load_report.json
//!   audit_report.json
//!   repair_report.json
//!   repair_summary.md
//! ```

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::identity::slug;
use crate::pipeline::audit::{AuditReport, Discrepancy};
use crate::pipeline::repair::{ActionStatus, RepairReport};
use crate::pipeline::summary::CorpusSummary;
use crate::pipeline::sync::LoadReport;
use crate::types::ExtractedRecord;

pub const RECORDS_DIR: &str = "records";
pub const EXTRACTION_SUMMARY: &str = "extraction_summary.json";
pub const LOAD_REPORT: &str = "load_report.json";
pub const AUDIT_REPORT: &str = "audit_report.json";
pub const REPAIR_REPORT: &str = "repair_report.json";
pub const REPAIR_SUMMARY: &str = "repair_summary.md";

/// Writes reports under one directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One JSON file per record, named by the organization slug. Records
    /// sharing a slug get the source file name appended so none is
    /// overwritten.
    pub fn write_records(&self, records: &[ExtractedRecord]) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(RECORDS_DIR);
        std::fs::create_dir_all(&dir)?;
        let mut used: HashSet<String> = HashSet::new();
        let mut paths = Vec::with_capacity(records.len());
        for record in records {
            let name = unique_name(record_slug(record), record, &mut used);
            let path = dir.join(format!("{name}.json"));
            write_json(&path, record)?;
            paths.push(path);
        }
        info!(dir = %dir.display(), records = paths.len(), "wrote extraction records");
        Ok(paths)
    }

    pub fn write_summary(&self, summary: &CorpusSummary) -> Result<PathBuf> {
        self.write(EXTRACTION_SUMMARY, summary)
    }

    pub fn write_load_report(&self, report: &LoadReport) -> Result<PathBuf> {
        self.write(LOAD_REPORT, report)
    }

    pub fn write_audit_report(&self, report: &AuditReport) -> Result<PathBuf> {
        self.write(AUDIT_REPORT, report)
    }

    /// Repair report JSON plus the Markdown summary.
    pub fn write_repair_report(&self, report: &RepairReport) -> Result<(PathBuf, PathBuf)> {
        let json = self.write(REPAIR_REPORT, report)?;
        std::fs::create_dir_all(&self.root)?;
        let markdown = self.root.join(REPAIR_SUMMARY);
        std::fs::write(&markdown, render_repair_summary(report))?;
        debug!(path = %markdown.display(), "wrote repair summary");
        Ok((json, markdown))
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        write_json(&path, value)?;
        debug!(path = %path.display(), "wrote report");
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// File slug for a record; falls back to the source file stem when the
/// organization name has no alphanumerics.
fn record_slug(record: &ExtractedRecord) -> String {
    let from_name = slug(&record.organization_name);
    if !from_name.is_empty() {
        return from_name;
    }
    let stem = Path::new(&record.source_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match slug(&stem) {
        s if s.is_empty() => "unnamed".to_string(),
        s => s,
    }
}

fn unique_name(base: String, record: &ExtractedRecord, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let file = Path::new(&record.source_file);
    let stem = file.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let ext = file.extension().map(|s| s.to_string_lossy()).unwrap_or_default();
    let with_file = match slug(&ext) {
        e if e.is_empty() => format!("{base}--{}", slug(&stem)),
        e => format!("{base}--{}-{e}", slug(&stem)),
    };
    if used.insert(with_file.clone()) {
        return with_file;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{with_file}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Human-readable repair summary.
pub fn render_repair_summary(report: &RepairReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Graph Repair Summary\n");
    let _ = writeln!(
        md,
        "Run {} to {}{}\n",
        report.started_at.to_rfc3339(),
        report.finished_at.to_rfc3339(),
        if report.cancelled { " (cancelled)" } else { "" }
    );

    let _ = writeln!(md, "## Issues Found\n");
    let found = &report.found;
    let _ = writeln!(md, "| Discrepancy | Count |");
    let _ = writeln!(md, "|---|---|");
    let _ = writeln!(md, "| missing_entity | {} |", found.missing_entity);
    let _ = writeln!(md, "| missing_relationship | {} |", found.missing_relationship);
    let _ = writeln!(md, "| orphaned_entity | {} |", found.orphaned_entity);
    let _ = writeln!(md, "| duplicate_relationship | {} |", found.duplicate_relationship);
    let _ = writeln!(md, "| multiple_parents | {} |", found.multiple_parents);
    let _ = writeln!(md, "| **total** | {} |\n", found.total());

    let _ = writeln!(md, "## Fixes Applied\n");
    let applied: Vec<_> = report
        .actions
        .iter()
        .filter(|a| a.status == ActionStatus::Applied)
        .collect();
    if applied.is_empty() {
        let _ = writeln!(md, "None.\n");
    } else {
        for record in &applied {
            let _ = writeln!(
                md,
                "- `{}` {}: {} -> {}",
                record.action.name(),
                record.action.target(),
                record.before,
                record.after
            );
        }
        md.push('\n');
    }

    let _ = writeln!(md, "## Remaining Issues\n");
    let unresolved: Vec<_> = report
        .actions
        .iter()
        .filter(|a| a.status != ActionStatus::Applied)
        .collect();
    if unresolved.is_empty() && report.after.is_clean() {
        let _ = writeln!(md, "None. The graph matches the corpus.");
        return md;
    }
    for record in &unresolved {
        let status = match record.status {
            ActionStatus::Flagged => "flagged for review",
            _ => "failed",
        };
        let _ = write!(md, "- `{}` {} ({status})", record.action.name(), record.action.target());
        if let Some(error) = &record.error {
            let _ = write!(md, ": {error}");
        }
        md.push('\n');
    }
    let remaining: Vec<&Discrepancy> = report
        .after
        .discrepancies
        .iter()
        .filter(|d| {
            !matches!(
                d,
                Discrepancy::OrphanedEntity { .. } | Discrepancy::MultipleParents { .. }
            )
        })
        .collect();
    for discrepancy in remaining {
        let _ = writeln!(md, "- `{}` {}", discrepancy.kind(), discrepancy.target());
    }
    let _ = writeln!(
        md,
        "\nAfter repair: {} discrepancies ({} orphaned).",
        report.after.counts.total(),
        report.after.counts.orphaned_entity
    );
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::pipeline::audit::DiscrepancyCounts;
    use crate::pipeline::repair::{RepairAction, RepairRecord};
    use crate::pipeline::OrphanReason;
    use crate::types::{EntityId, EntityKind, RelationKind, Triple};

    fn audit(counts: DiscrepancyCounts) -> AuditReport {
        AuditReport {
            audited_at: Utc::now(),
            expected_entities: 3,
            expected_relationships: 2,
            actual_entities: 3,
            actual_relationships: 2,
            counts,
            discrepancies: Vec::new(),
        }
    }

    fn repair_report() -> RepairReport {
        let unit = EntityId::new(EntityKind::Unit, "Geography");
        let program = EntityId::new(EntityKind::Program, "GIS Certificate");
        RepairReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            found: DiscrepancyCounts {
                missing_relationship: 1,
                orphaned_entity: 1,
                ..Default::default()
            },
            actions: vec![
                RepairRecord {
                    action: RepairAction::CreatedRelationship {
                        triple: Triple::new(unit, RelationKind::Offers, program.clone()),
                    },
                    status: ActionStatus::Applied,
                    before: "absent".into(),
                    after: "created".into(),
                    error: None,
                },
                RepairRecord {
                    action: RepairAction::FlaggedForReview {
                        entity: EntityId::new(EntityKind::Person, "Ann Lee"),
                        reason: OrphanReason::NotInCorpus,
                    },
                    status: ActionStatus::Flagged,
                    before: "orphaned".into(),
                    after: "orphaned".into(),
                    error: None,
                },
            ],
            after: audit(DiscrepancyCounts {
                orphaned_entity: 1,
                ..Default::default()
            }),
            cancelled: false,
        }
    }

    #[test]
    fn test_repair_summary_sections() {
        let md = render_repair_summary(&repair_report());
        let found = md.find("## Issues Found").unwrap();
        let applied = md.find("## Fixes Applied").unwrap();
        let remaining = md.find("## Remaining Issues").unwrap();
        assert!(found < applied && applied < remaining);
        assert!(md.contains("| missing_relationship | 1 |"));
        assert!(md.contains(
            "- `created_relationship` unit:geography -[offers]-> program:gis-certificate: absent -> created"
        ));
        assert!(md.contains("person:ann-lee (flagged for review)"));
    }

    #[test]
    fn test_writes_every_output() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().join("out"));

        let records = vec![
            ExtractedRecord::new("Oregon State University", "Oregon_State_University.md"),
            ExtractedRecord::failed("!!!", "odd-file.txt", "no patterns"),
        ];
        let paths = writer.write_records(&records).unwrap();
        assert!(paths[0].ends_with("records/oregon-state-university.json"));
        assert!(paths[1].ends_with("records/odd-file.json"));

        let (json, markdown) = writer.write_repair_report(&repair_report()).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(written["actions"][0]["action"], "created_relationship");
        assert_eq!(written["actions"][1]["status"], "flagged");
        assert!(std::fs::read_to_string(markdown).unwrap().starts_with("# Graph Repair Summary"));

        writer.write_audit_report(&audit(DiscrepancyCounts::default())).unwrap();
        assert!(dir.path().join("out").join(AUDIT_REPORT).is_file());
    }

    #[test]
    fn test_records_with_same_name_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path());

        let records = vec![
            ExtractedRecord::new("State University", "State_University.md"),
            ExtractedRecord::new("State University", "State University.txt"),
        ];
        let paths = writer.write_records(&records).unwrap();
        assert!(paths[0].ends_with("records/state-university.json"));
        assert!(paths[1].ends_with("records/state-university--state-university-txt.json"));

        let on_disk = std::fs::read_dir(dir.path().join(RECORDS_DIR)).unwrap().count();
        assert_eq!(on_disk, 2);
        let second: ExtractedRecord =
            serde_json::from_str(&std::fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert_eq!(second.source_file, "State University.txt");
    }
}
