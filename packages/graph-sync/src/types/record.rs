//! The intermediate record produced by extraction, one per document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Organization-level facts found anywhere in the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationMetadata {
    pub location: Option<String>,
    pub founded: Option<i32>,
    pub total_students: Option<u64>,
    /// Accrediting bodies mentioned inline, in order of first mention
    #[serde(default)]
    pub accreditation: Vec<String>,
    /// Overview / executive summary text
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub name: String,
    /// Unit named by the surrounding context, if any
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub code: String,
    pub title: String,
    pub program: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub title: Option<String>,
    pub unit: Option<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
}

/// An accrediting body and the program or unit it accredits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccreditationRecord {
    pub body: String,
    /// Program or unit name; `None` when accreditation is organization-wide
    pub target: Option<String>,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub organization_name: String,
    pub source_file: String,
    /// SHA-256 of the raw document text
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: OrganizationMetadata,
    #[serde(default)]
    pub units: Vec<UnitRecord>,
    #[serde(default)]
    pub programs: Vec<ProgramRecord>,
    #[serde(default)]
    pub courses: Vec<CourseRecord>,
    #[serde(default)]
    pub people: Vec<PersonRecord>,
    #[serde(default)]
    pub accreditations: Vec<AccreditationRecord>,
    /// Unmatched text keyed by section title, in document order
    #[serde(default)]
    pub descriptive_sections: IndexMap<String, String>,
    /// Keyword hits per technology topic across the whole document
    #[serde(default)]
    pub technology_mentions: BTreeMap<String, usize>,
    pub error: Option<String>,
}

impl ExtractedRecord {
    pub fn new(organization_name: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            organization_name: organization_name.into(),
            source_file: source_file.into(),
            content_hash: String::new(),
            extracted_at: Utc::now(),
            metadata: OrganizationMetadata::default(),
            units: Vec::new(),
            programs: Vec::new(),
            courses: Vec::new(),
            people: Vec::new(),
            accreditations: Vec::new(),
            descriptive_sections: IndexMap::new(),
            technology_mentions: BTreeMap::new(),
            error: None,
        }
    }

    /// A partial result for a document that could not be extracted.
    pub fn failed(
        organization_name: impl Into<String>,
        source_file: impl Into<String>,
        error: impl ToString,
    ) -> Self {
        let mut record = Self::new(organization_name, source_file);
        record.error = Some(error.to_string());
        record
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether any entity rule matched.
    pub fn has_entities(&self) -> bool {
        !(self.units.is_empty()
            && self.programs.is_empty()
            && self.courses.is_empty()
            && self.people.is_empty())
    }
}
