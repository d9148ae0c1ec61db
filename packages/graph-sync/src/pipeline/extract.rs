//! Pattern extractor: one profile document in, one [`ExtractedRecord`] out.
//!
//! The document is walked line by line. `#` headers open sections whose kind
//! comes from ordered keyword rules; deeper headers inside a
//! Programs/Courses/Faculty/Units section only set the unit or program context
//! for the bullets that follow. Bullet indentation nests items (programs under
//! a unit, courses under a program). Within a category the first pattern rule
//! that matches a line wins; anything unmatched is kept verbatim under
//! `descriptive_sections`.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, ProgramLevel};
use crate::error::DocumentError;
use crate::identity::{clean_display, normalize};
use crate::pipeline::corpus::content_hash;
use crate::types::{
    AccreditationRecord, CourseRecord, ExtractedRecord, PersonRecord, ProgramRecord, UnitRecord,
};

/// Kind of a top-level document section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Faculty,
    Courses,
    Programs,
    Units,
    Accreditation,
    Descriptive,
}

/// Header keywords selecting a section kind. Keywords match at word starts,
/// so `program` also hits "Programs".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRule {
    pub kind: SectionKind,
    pub keywords: Vec<String>,
}

impl SectionRule {
    fn new(kind: SectionKind, keywords: &[&str]) -> Self {
        Self {
            kind,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Tunable extraction rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorRules {
    /// Ordered; the first rule with a keyword hit wins
    pub sections: Vec<SectionRule>,
    /// Section titles whose text becomes the organization description
    pub overview_keywords: Vec<String>,
    /// Shortest accepted program/course/person name
    pub min_name_len: usize,
    /// Shortest accepted unit name
    pub min_unit_name_len: usize,
}

impl Default for ExtractorRules {
    fn default() -> Self {
        use SectionKind::*;
        Self {
            sections: vec![
                SectionRule::new(Faculty, &["faculty", "people", "researchers", "staff", "personnel"]),
                SectionRule::new(Courses, &["course", "curriculum", "curricula", "class"]),
                SectionRule::new(
                    Programs,
                    &["program", "degree", "certificate", "minor", "major"],
                ),
                SectionRule::new(
                    Units,
                    &[
                        "department",
                        "school",
                        "college",
                        "division",
                        "center",
                        "centre",
                        "institute",
                        "lab",
                        "units",
                    ],
                ),
                SectionRule::new(Accreditation, &["accreditation", "accredited"]),
            ],
            overview_keywords: vec![
                "overview".into(),
                "executive summary".into(),
                "about".into(),
                "introduction".into(),
            ],
            min_name_len: 3,
            min_unit_name_len: 6,
        }
    }
}

impl ExtractorRules {
    /// Section kind for a header title; `Descriptive` when nothing matches.
    pub fn section_kind(&self, title: &str) -> SectionKind {
        let padded = format!(" {} ", normalize(title));
        self.sections
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|k| padded.contains(&format!(" {}", normalize(k))))
            })
            .map(|rule| rule.kind)
            .unwrap_or(SectionKind::Descriptive)
    }

    fn is_overview(&self, title: &str) -> bool {
        let padded = format!(" {} ", normalize(title));
        self.overview_keywords
            .iter()
            .any(|k| padded.contains(&format!(" {} ", normalize(k))))
    }
}

// =============================================================================
// Line patterns
// =============================================================================

static RE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());
static RE_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(?:[-*+]|\d{1,3}[.)])\s+(.+)$").unwrap());
static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static RE_FURNITURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:chapter|section|table|figure|page|appendix)\b|^\d+$").unwrap()
});
static RE_TRAILING_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\(([^)]+)\)$").unwrap());
static RE_HONORIFIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:Dr|Prof|Professor)\.?\s+").unwrap());
static RE_COURSE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:courses?|curriculum|requirements)$").unwrap()
});

/// 2-4 capital letters, 3-4 digits, optional letter suffix.
const CODE: &str = r"[A-Z]{2,4}\s*\d{3,4}[A-Z]?";

static RE_COURSE_COLON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<code>{CODE})\s*:\s*(?P<title>.+)$")).unwrap()
});
static RE_COURSE_CODE_PARENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<code>{CODE})\s*\((?P<title>[^)]+)\)$")).unwrap()
});
static RE_COURSE_TITLE_PARENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<title>.+?)\s*\((?P<code>{CODE})\)$")).unwrap()
});
static RE_COURSE_DASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<code>{CODE})\s+[-\x{{2013}}\x{{2014}}]\s+(?P<title>.+)$")).unwrap()
});
static RE_COURSE_SLASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<code>{CODE})\s*/\s*(?P<title>.+)$")).unwrap()
});

/// Ordered course rules.
const COURSE_PATTERNS: &[&LazyLock<Regex>] = &[
    &RE_COURSE_COLON,
    &RE_COURSE_CODE_PARENS,
    &RE_COURSE_TITLE_PARENS,
    &RE_COURSE_DASH,
    &RE_COURSE_SLASH,
];

static RE_PERSON_FULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^Dr\.?\s+(?P<name>[^,(]+?),\s*(?P<title>[^(:]+?)\s*\((?P<unit>[^)]+)\)\s*(?::\s*(?P<expertise>.+))?$",
    )
    .unwrap()
});
static RE_PERSON_TITLE_EXPERTISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^,:]+?),\s*(?P<title>[^:]+?)\s*:\s*(?P<expertise>.+)$").unwrap()
});
static RE_PERSON_DASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^\x{2013}\x{2014}:,]+?)\s+(?:\x{2014}|\x{2013}|--|-)\s+(?P<title>.+)$")
        .unwrap()
});

/// Ordered person rules.
const PERSON_PATTERNS: &[&LazyLock<Regex>] = &[
    &RE_PERSON_FULL,
    &RE_PERSON_TITLE_EXPERTISE,
    &RE_PERSON_DASH,
];

static RE_LOCATION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:location|campus location|headquarters)\s*:\s*(?P<value>.+)$").unwrap()
});
static RE_LOCATED_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blocated in\s+(?P<value>[^.;]+)").unwrap());
static RE_FOUNDED_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:founded|established)\s*:\s*(?P<value>\d{4})\b").unwrap()
});
static RE_FOUNDED_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:founded|established)\s+in\s+(?P<value>\d{4})\b").unwrap()
});
static RE_STUDENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<value>\d{1,3}(?:,\d{3})+|\d+)\s+(?:total\s+|enrolled\s+)?students?\b")
        .unwrap()
});
static RE_ACCREDITED_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\baccredited by\s+(?:the\s+)?(?P<value>[^.;,()]+)").unwrap()
});
static RE_SAF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bSAF\b").unwrap());
static RE_SOCIETY_OF_AMERICAN_FORESTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)society of american foresters").unwrap());

const SOCIETY_OF_AMERICAN_FORESTERS: &str = "Society of American Foresters";

/// Canonical accrediting body name (`SAF` → Society of American Foresters).
pub fn canonical_body(name: &str) -> String {
    let normalized = normalize(name);
    if normalized == "saf" || normalized.contains("society of american foresters") {
        SOCIETY_OF_AMERICAN_FORESTERS.to_string()
    } else {
        clean_display(name)
    }
}

/// Strip inline markdown: bold/italic markers, code ticks, links.
fn clean_inline(text: &str) -> String {
    let text = RE_LINK.replace_all(text, "$1");
    let text = text.replace("**", "").replace("__", "").replace('`', "");
    clean_display(text.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()))
}

fn trim_value(value: &str) -> String {
    clean_display(value.trim().trim_end_matches(['.', ',', ';', ':']))
}

fn indent_width(prefix: &str) -> usize {
    prefix.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum()
}

/// `FOR101l` → `FOR 101L`.
fn normalize_code(code: &str) -> String {
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    let split = compact
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(compact.len());
    let (letters, rest) = compact.split_at(split);
    format!("{} {}", letters.to_uppercase(), rest.to_uppercase())
}

fn is_all_caps(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| !c.is_lowercase())
}

/// Split `Name: description` / `Name — description`.
fn split_name_description(text: &str) -> (String, Option<String>) {
    for sep in [": ", " \u{2014} ", " \u{2013} "] {
        if let Some((name, rest)) = text.split_once(sep) {
            let rest = rest.trim();
            return (
                trim_value(name),
                (!rest.is_empty()).then(|| rest.to_string()),
            );
        }
    }
    (trim_value(text), None)
}

fn split_list(text: &str) -> Vec<String> {
    text.split([',', ';'])
        .map(trim_value)
        .filter(|s| !s.is_empty())
        .collect()
}

fn same_name(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

// =============================================================================
// Extractor
// =============================================================================

/// Converts one document into an [`ExtractedRecord`].
pub struct Extractor<'a> {
    rules: &'a ExtractorRules,
    classifier: &'a Classifier,
}

impl<'a> Extractor<'a> {
    pub fn new(rules: &'a ExtractorRules, classifier: &'a Classifier) -> Self {
        Self { rules, classifier }
    }

    /// Extract a document. Fails with [`DocumentError::NoPatterns`] when no
    /// unit, program, course or person rule matched anywhere.
    pub fn extract(
        &self,
        organization_name: &str,
        source_file: &str,
        text: &str,
    ) -> Result<ExtractedRecord, DocumentError> {
        let mut record = ExtractedRecord::new(organization_name, source_file);
        record.content_hash = content_hash(text);

        let mut state = ParseState {
            extractor: self,
            record,
            section: None,
            unit_context: None,
            program_context: None,
            parents: Vec::new(),
        };
        for line in text.lines() {
            state.line(line);
        }
        let mut record = state.finish();

        record.technology_mentions = self
            .classifier
            .technology_focus
            .count_mentions(text)
            .into_iter()
            .map(|(label, n)| (label.to_string(), n))
            .collect();

        if !record.has_entities() {
            return Err(DocumentError::NoPatterns {
                document: source_file.to_string(),
            });
        }
        Ok(record)
    }

    fn is_false_positive(&self, name: &str, min_len: usize) -> bool {
        let name = name.trim();
        name.chars().count() < min_len || is_all_caps(name) || RE_FURNITURE.is_match(name)
    }

    fn accept_name(&self, name: &str) -> bool {
        !self.is_false_positive(name, self.rules.min_name_len)
    }

    fn accept_unit(&self, name: &str) -> bool {
        !self.is_false_positive(name, self.rules.min_unit_name_len)
    }

    fn looks_like_unit(&self, text: &str) -> bool {
        self.rules.section_kind(text) == SectionKind::Units
            && self.classifier.program_level(Some(text)) == ProgramLevel::Unknown
    }

    /// Course rules in order; the first match decides, filters apply after.
    fn match_course(&self, text: &str) -> Option<(String, String)> {
        let caps = COURSE_PATTERNS.iter().find_map(|re| re.captures(text))?;
        let title = trim_value(&caps["title"]);
        self.accept_name(&title)
            .then(|| (normalize_code(&caps["code"]), title))
    }

    /// Person rules in order.
    fn match_person(&self, text: &str) -> Option<PersonRecord> {
        let (index, caps): (usize, Captures<'_>) = PERSON_PATTERNS
            .iter()
            .enumerate()
            .find_map(|(i, re)| re.captures(text).map(|c| (i, c)))?;

        let name = trim_value(&RE_HONORIFIC.replace(caps["name"].trim(), ""));
        if !self.accept_name(&name) || self.match_course(text).is_some() {
            return None;
        }

        let mut title = caps.name("title").map(|m| trim_value(m.as_str()));
        let mut unit = caps.name("unit").map(|m| trim_value(m.as_str()));
        // "Name, Professor (Forestry): ..." carries the unit inside the title.
        if index > 0 {
            if let Some(t) = title.clone() {
                if let Some(inner) = RE_TRAILING_PARENS.captures(&t) {
                    title = Some(trim_value(&inner[1]));
                    unit = Some(trim_value(&inner[2]));
                }
            }
        }
        let expertise = caps
            .name("expertise")
            .map(|m| split_list(m.as_str()))
            .unwrap_or_default();

        Some(PersonRecord {
            name,
            title: title.filter(|t| !t.is_empty()),
            unit: unit.filter(|u| !u.is_empty()),
            expertise,
        })
    }
}

#[derive(Debug, Clone)]
struct Section {
    kind: SectionKind,
    title: String,
    level: usize,
}

/// What a bullet became, for the bullets nested under it.
#[derive(Debug, Clone)]
enum Parent {
    Unit(String),
    Program(String),
    Other,
}

struct ParseState<'e, 'a> {
    extractor: &'e Extractor<'a>,
    record: ExtractedRecord,
    section: Option<Section>,
    /// (header level, unit name)
    unit_context: Option<(usize, String)>,
    /// (header level, program name)
    program_context: Option<(usize, String)>,
    /// (indent, parent) for the current bullet nesting
    parents: Vec<(usize, Parent)>,
}

impl ParseState<'_, '_> {
    fn line(&mut self, raw: &str) {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            return;
        }

        if let Some(caps) = RE_HEADER.captures(line) {
            let level = caps[1].len();
            let title = clean_inline(&caps[2]);
            let title = title.trim_end_matches(':').trim().to_string();
            if !title.is_empty() {
                self.header(level, title);
            }
            return;
        }

        if let Some(caps) = RE_BULLET.captures(line) {
            let indent = indent_width(&caps[1]);
            let text = clean_inline(&caps[2]);
            if text.is_empty() {
                return;
            }
            self.metadata(&text);
            self.bullet(indent, text);
        } else {
            let text = clean_inline(line);
            if text.is_empty() {
                return;
            }
            self.metadata(&text);
            self.paragraph(text);
        }
    }

    fn header(&mut self, level: usize, title: String) {
        self.parents.clear();
        if let Some(section) = &self.section {
            let nests = matches!(
                section.kind,
                SectionKind::Programs | SectionKind::Courses | SectionKind::Faculty | SectionKind::Units
            );
            if nests && level > section.level {
                let kind = section.kind;
                self.context_header(kind, level, title);
                return;
            }
        }

        let kind = self.extractor.rules.section_kind(&title);
        self.section = Some(Section { kind, title, level });
        self.unit_context = None;
        self.program_context = None;
    }

    fn context_header(&mut self, section: SectionKind, level: usize, title: String) {
        if self.unit_context.as_ref().is_some_and(|(l, _)| *l >= level) {
            self.unit_context = None;
        }
        if self.program_context.as_ref().is_some_and(|(l, _)| *l >= level) {
            self.program_context = None;
        }

        let ex = self.extractor;
        let title_kind = ex.rules.section_kind(&title);
        match section {
            SectionKind::Units => {
                if ex.accept_unit(&title) {
                    self.add_unit(&title, None);
                    self.unit_context = Some((level, title));
                }
            }
            SectionKind::Programs | SectionKind::Faculty => {
                // "### Graduate Programs" groups programs without naming a unit.
                if title_kind == SectionKind::Programs && !ex.looks_like_unit(&title) {
                    return;
                }
                if title_kind == SectionKind::Units && ex.accept_unit(&title) {
                    self.add_unit(&title, None);
                }
                self.unit_context = Some((level, title));
            }
            SectionKind::Courses => {
                let program = RE_COURSE_SUFFIX.replace(&title, "").to_string();
                if self.looks_like_program(&program) {
                    if ex.accept_name(&program) {
                        let unit = self.unit_context.as_ref().map(|(_, u)| u.clone());
                        self.add_program(&program, unit, None);
                        self.program_context = Some((level, program));
                    }
                } else if title_kind == SectionKind::Units && ex.accept_unit(&title) {
                    self.add_unit(&title, None);
                    self.unit_context = Some((level, title));
                }
            }
            _ => {}
        }
    }

    fn bullet(&mut self, indent: usize, text: String) {
        while self.parents.last().is_some_and(|(i, _)| *i >= indent) {
            self.parents.pop();
        }
        let parent = self.parents.last().map(|(_, p)| p.clone());

        let Some(kind) = self.section.as_ref().map(|s| s.kind) else {
            self.descriptive(&text);
            return;
        };
        let matched = match kind {
            SectionKind::Units => self.unit_bullet(&text, parent),
            SectionKind::Programs => self.program_bullet(&text, parent),
            SectionKind::Courses => self.course_bullet(&text, parent),
            SectionKind::Faculty => self.person_line(&text),
            SectionKind::Accreditation => self.accreditation_line(&text),
            SectionKind::Descriptive => None,
        };
        let pushed = match matched {
            Some(p) => p,
            None => {
                self.descriptive(&text);
                Parent::Other
            }
        };
        self.parents.push((indent, pushed));
    }

    fn paragraph(&mut self, text: String) {
        let matched = match self.section.as_ref().map(|s| s.kind) {
            Some(SectionKind::Faculty) => self.person_line(&text).is_some(),
            Some(SectionKind::Courses) => self.course_bullet(&text, None).is_some(),
            _ => false,
        };
        if !matched {
            self.descriptive(&text);
        }
    }

    fn unit_bullet(&mut self, text: &str, parent: Option<Parent>) -> Option<Parent> {
        if let Some((code, title)) = self.extractor.match_course(text) {
            let program = match parent {
                Some(Parent::Program(p)) => Some(p),
                _ => None,
            };
            self.add_course(code, title, program);
            return Some(Parent::Other);
        }

        let (name, description) = split_name_description(text);
        match parent {
            Some(Parent::Unit(unit)) if !self.extractor.looks_like_unit(&name) => {
                if !self.extractor.accept_name(&name) {
                    return None;
                }
                self.add_program(&name, Some(unit), description);
                Some(Parent::Program(name))
            }
            Some(Parent::Program(program)) => {
                self.append_program_description(&program, text);
                Some(Parent::Other)
            }
            _ => {
                if !self.extractor.accept_unit(&name) {
                    return None;
                }
                self.add_unit(&name, description);
                Some(Parent::Unit(name))
            }
        }
    }

    fn program_bullet(&mut self, text: &str, parent: Option<Parent>) -> Option<Parent> {
        if let Some((code, title)) = self.extractor.match_course(text) {
            let program = match parent {
                Some(Parent::Program(p)) => Some(p),
                _ => self.program_context.as_ref().map(|(_, p)| p.clone()),
            };
            self.add_course(code, title, program);
            return Some(Parent::Other);
        }

        let (name, description) = split_name_description(text);
        match parent {
            Some(Parent::Program(program)) => {
                self.append_program_description(&program, text);
                Some(Parent::Other)
            }
            Some(Parent::Unit(unit)) => {
                if !self.extractor.accept_name(&name) {
                    return None;
                }
                self.add_program(&name, Some(unit), description);
                Some(Parent::Program(name))
            }
            _ => {
                if self.extractor.looks_like_unit(&name) && self.extractor.accept_unit(&name) {
                    self.add_unit(&name, description);
                    return Some(Parent::Unit(name));
                }
                if !self.extractor.accept_name(&name) {
                    return None;
                }
                let unit = self.unit_context.as_ref().map(|(_, u)| u.clone());
                self.add_program(&name, unit, description);
                Some(Parent::Program(name))
            }
        }
    }

    fn course_bullet(&mut self, text: &str, parent: Option<Parent>) -> Option<Parent> {
        if let Some((code, title)) = self.extractor.match_course(text) {
            let program = match parent {
                Some(Parent::Program(p)) => Some(p),
                _ => self.program_context.as_ref().map(|(_, p)| p.clone()),
            };
            self.add_course(code, title, program);
            return Some(Parent::Other);
        }

        // A program heading its own course list.
        let name = RE_COURSE_SUFFIX
            .replace(&split_name_description(text).0, "")
            .to_string();
        if parent.is_none() && self.looks_like_program(&name) && self.extractor.accept_name(&name) {
            let unit = self.unit_context.as_ref().map(|(_, u)| u.clone());
            self.add_program(&name, unit, None);
            return Some(Parent::Program(name));
        }
        None
    }

    fn person_line(&mut self, text: &str) -> Option<Parent> {
        let mut person = self.extractor.match_person(text)?;
        if person.unit.is_none() {
            person.unit = self.unit_context.as_ref().map(|(_, u)| u.clone());
        }
        self.add_person(person);
        Some(Parent::Other)
    }

    fn accreditation_line(&mut self, text: &str) -> Option<Parent> {
        let text = text.trim();
        let split = RE_TRAILING_PARENS
            .captures(text)
            .map(|c| (trim_value(&c[1]), trim_value(&c[2])))
            .or_else(|| {
                [": ", " \u{2014} ", " \u{2013} ", " - "]
                    .iter()
                    .find_map(|sep| text.split_once(*sep))
                    .map(|(a, b)| (trim_value(a), trim_value(b)))
            });

        let (body, target) = match split {
            Some((left, right)) => {
                if self.is_known_target(&left) && !self.is_known_target(&right) {
                    (right, Some(left))
                } else {
                    (left, Some(right))
                }
            }
            None => (text.to_string(), None),
        };

        let body = RE_ACCREDITED_BY
            .captures(&body)
            .map(|c| trim_value(&c["value"]))
            .unwrap_or(body);
        let body = canonical_body(&body);
        if !self.extractor.accept_name(&body) && normalize(&body) != "saf" {
            return None;
        }

        self.add_accreditation_mention(&body);
        let record = AccreditationRecord { body, target };
        if !self.record.accreditations.contains(&record) {
            self.record.accreditations.push(record);
        }
        Some(Parent::Other)
    }

    fn metadata(&mut self, text: &str) {
        let meta = &mut self.record.metadata;

        if meta.location.is_none() {
            meta.location = [&RE_LOCATION_LABEL, &RE_LOCATED_IN]
                .iter()
                .find_map(|re| re.captures(text))
                .map(|c| trim_value(&c["value"]))
                .filter(|v| !v.is_empty());
        }

        if meta.founded.is_none() {
            meta.founded = [&RE_FOUNDED_LABEL, &RE_FOUNDED_IN]
                .iter()
                .find_map(|re| re.captures(text))
                .and_then(|c| c["value"].parse::<i32>().ok())
                .filter(|year| (1000..=2100).contains(year));
        }

        if meta.total_students.is_none() {
            meta.total_students = RE_STUDENTS
                .captures(text)
                .and_then(|c| c["value"].replace(',', "").parse::<u64>().ok());
        }

        let mut mentions: Vec<String> = RE_ACCREDITED_BY
            .captures_iter(text)
            .map(|c| canonical_body(&c["value"]))
            .collect();
        if RE_SAF.is_match(text) || RE_SOCIETY_OF_AMERICAN_FORESTERS.is_match(text) {
            mentions.push(SOCIETY_OF_AMERICAN_FORESTERS.to_string());
        }
        for body in mentions {
            self.add_accreditation_mention(&body);
        }
    }

    fn descriptive(&mut self, text: &str) {
        let title = self
            .section
            .as_ref()
            .map(|s| s.title.clone())
            .unwrap_or_else(|| "Preamble".to_string());
        let entry = self
            .record
            .descriptive_sections
            .entry(title)
            .or_default();
        if !entry.is_empty() {
            entry.push('\n');
        }
        entry.push_str(text);
    }

    fn finish(mut self) -> ExtractedRecord {
        let rules = &self.extractor.rules;
        self.record.metadata.description = self
            .record
            .descriptive_sections
            .iter()
            .find(|(title, _)| rules.is_overview(title))
            .map(|(_, text)| text.clone());
        self.record
    }

    fn looks_like_program(&self, text: &str) -> bool {
        self.extractor.rules.section_kind(text) == SectionKind::Programs
            || self.extractor.classifier.program_level(Some(text)) != ProgramLevel::Unknown
            || self.record.programs.iter().any(|p| same_name(&p.name, text))
    }

    fn is_known_target(&self, name: &str) -> bool {
        self.record.programs.iter().any(|p| same_name(&p.name, name))
            || self.record.units.iter().any(|u| same_name(&u.name, name))
    }

    fn add_unit(&mut self, name: &str, description: Option<String>) {
        if let Some(existing) = self.record.units.iter_mut().find(|u| same_name(&u.name, name)) {
            if existing.description.is_none() {
                existing.description = description;
            }
            return;
        }
        self.record.units.push(UnitRecord {
            name: name.to_string(),
            description,
        });
    }

    fn add_program(&mut self, name: &str, unit: Option<String>, description: Option<String>) {
        if let Some(existing) = self
            .record
            .programs
            .iter_mut()
            .find(|p| same_name(&p.name, name))
        {
            if existing.unit.is_none() {
                existing.unit = unit;
            }
            if existing.description.is_none() {
                existing.description = description;
            }
            return;
        }
        self.record.programs.push(ProgramRecord {
            name: name.to_string(),
            unit,
            description,
        });
    }

    fn append_program_description(&mut self, program: &str, text: &str) {
        if let Some(p) = self
            .record
            .programs
            .iter_mut()
            .find(|p| same_name(&p.name, program))
        {
            match &mut p.description {
                Some(d) => {
                    d.push_str("; ");
                    d.push_str(text);
                }
                None => p.description = Some(text.to_string()),
            }
        }
    }

    fn add_course(&mut self, code: String, title: String, program: Option<String>) {
        if let Some(existing) = self
            .record
            .courses
            .iter_mut()
            .find(|c| c.code == code && same_name(&c.title, &title))
        {
            if existing.program.is_none() {
                existing.program = program;
            }
            return;
        }
        self.record.courses.push(CourseRecord {
            code,
            title,
            program,
        });
    }

    fn add_person(&mut self, person: PersonRecord) {
        if let Some(existing) = self
            .record
            .people
            .iter_mut()
            .find(|p| same_name(&p.name, &person.name))
        {
            for tag in person.expertise {
                if !existing.expertise.iter().any(|t| same_name(t, &tag)) {
                    existing.expertise.push(tag);
                }
            }
            if existing.title.is_none() {
                existing.title = person.title;
            }
            if existing.unit.is_none() {
                existing.unit = person.unit;
            }
            return;
        }
        self.record.people.push(person);
    }

    fn add_accreditation_mention(&mut self, body: &str) {
        let mentions = &mut self.record.metadata.accreditation;
        if !body.is_empty() && !mentions.iter().any(|m| same_name(m, body)) {
            mentions.push(body.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn extract(text: &str) -> Result<ExtractedRecord, DocumentError> {
        let rules = ExtractorRules::default();
        let classifier = Classifier::default();
        Extractor::new(&rules, &classifier).extract("Test University", "test.md", text)
    }

    #[test]
    fn test_section_kind_precedence() {
        let rules = ExtractorRules::default();
        assert_eq!(rules.section_kind("Faculty and Departments"), SectionKind::Faculty);
        assert_eq!(rules.section_kind("Course Offerings"), SectionKind::Courses);
        assert_eq!(rules.section_kind("Graduate Programs"), SectionKind::Programs);
        assert_eq!(rules.section_kind("Academic Departments"), SectionKind::Units);
        assert_eq!(rules.section_kind("Research Centers & Labs"), SectionKind::Units);
        assert_eq!(rules.section_kind("Accreditation"), SectionKind::Accreditation);
        assert_eq!(rules.section_kind("University Overview"), SectionKind::Descriptive);
        assert_eq!(rules.section_kind("Available Resources"), SectionKind::Descriptive);
    }

    #[test]
    fn test_course_rules_in_order() {
        let rules = ExtractorRules::default();
        let classifier = Classifier::default();
        let ex = Extractor::new(&rules, &classifier);
        assert_eq!(
            ex.match_course("FOR 101: Introduction to Forestry"),
            Some(("FOR 101".into(), "Introduction to Forestry".into()))
        );
        assert_eq!(
            ex.match_course("GEOG 4050 (Remote Sensing)"),
            Some(("GEOG 4050".into(), "Remote Sensing".into()))
        );
        assert_eq!(
            ex.match_course("Forest Biometrics (FOR 321L)"),
            Some(("FOR 321L".into(), "Forest Biometrics".into()))
        );
        assert_eq!(
            ex.match_course("NR 200 - Drone Mapping"),
            Some(("NR 200".into(), "Drone Mapping".into()))
        );
        assert_eq!(
            ex.match_course("CS 540 / Machine Learning"),
            Some(("CS 540".into(), "Machine Learning".into()))
        );
        assert_eq!(ex.match_course("FOR101: Silviculture").unwrap().0, "FOR 101");
        assert_eq!(ex.match_course("Forestry 101: Intro"), None);
        assert_eq!(ex.match_course("FOR 101: GIS LAB"), None);
        assert_eq!(ex.match_course("FOR 101: Ab"), None);
    }

    #[test]
    fn test_person_rules_in_order() {
        let rules = ExtractorRules::default();
        let classifier = Classifier::default();
        let ex = Extractor::new(&rules, &classifier);

        let p = ex
            .match_person("Dr. Jane Smith, Associate Professor (Department of Forest Resources): LiDAR, remote sensing")
            .unwrap();
        assert_eq!(p.name, "Jane Smith");
        assert_eq!(p.title.as_deref(), Some("Associate Professor"));
        assert_eq!(p.unit.as_deref(), Some("Department of Forest Resources"));
        assert_eq!(p.expertise, vec!["LiDAR", "remote sensing"]);

        let p = ex.match_person("Alan Turing, Professor: machine learning; GIS").unwrap();
        assert_eq!(p.name, "Alan Turing");
        assert_eq!(p.title.as_deref(), Some("Professor"));
        assert_eq!(p.unit, None);
        assert_eq!(p.expertise, vec!["machine learning", "GIS"]);

        let p = ex.match_person("Grace Hopper \u{2014} Lab Director").unwrap();
        assert_eq!(p.name, "Grace Hopper");
        assert_eq!(p.title.as_deref(), Some("Lab Director"));

        assert!(ex.match_person("Just some text").is_none());
    }

    #[test]
    fn test_false_positive_filters() {
        let rules = ExtractorRules::default();
        let classifier = Classifier::default();
        let ex = Extractor::new(&rules, &classifier);
        assert!(!ex.accept_name("BS"));
        assert!(!ex.accept_name("GRADUATE PROGRAMS"));
        assert!(!ex.accept_name("Table 3"));
        assert!(!ex.accept_name("2024"));
        assert!(ex.accept_name("BS Forestry"));
        assert!(!ex.accept_unit("Geog"));
        assert!(ex.accept_unit("Geography Department"));
    }

    #[test]
    fn test_full_profile() {
        let record = extract(fixtures::OREGON_PROFILE).unwrap();

        assert_eq!(record.metadata.location.as_deref(), Some("Corvallis, Oregon"));
        assert_eq!(record.metadata.founded, Some(1868));
        assert_eq!(record.metadata.total_students, Some(35_000));
        assert!(record
            .metadata
            .accreditation
            .contains(&"Society of American Foresters".to_string()));
        assert!(record
            .metadata
            .description
            .as_deref()
            .unwrap()
            .contains("land-grant"));

        let units: Vec<_> = record.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            units,
            vec![
                "Department of Forest Engineering",
                "Computer Science Department",
                "Spatial Ecology Lab"
            ]
        );

        let bs = record.programs.iter().find(|p| p.name == "BS Forestry").unwrap();
        assert_eq!(bs.unit.as_deref(), Some("Department of Forest Engineering"));
        let ds = record.programs.iter().find(|p| p.name == "Data Science (MS)").unwrap();
        assert_eq!(ds.unit, None);
        let gis = record.programs.iter().find(|p| p.name == "GIS Certificate").unwrap();
        assert_eq!(gis.unit.as_deref(), Some("Computer Science Department"));

        let for101 = record.courses.iter().find(|c| c.code == "FOR 101").unwrap();
        assert_eq!(for101.program.as_deref(), Some("BS Forestry"));
        let cs540 = record.courses.iter().find(|c| c.code == "CS 540").unwrap();
        assert_eq!(cs540.title, "Machine Learning");
        assert_eq!(cs540.program.as_deref(), Some("Data Science (MS)"));

        let jane = record.people.iter().find(|p| p.name == "Jane Smith").unwrap();
        assert_eq!(jane.unit.as_deref(), Some("Department of Forest Engineering"));
        let alan = record.people.iter().find(|p| p.name == "Alan Turing").unwrap();
        assert_eq!(alan.unit.as_deref(), Some("Computer Science Department"));

        assert!(record.accreditations.contains(&AccreditationRecord {
            body: "Society of American Foresters".into(),
            target: Some("BS Forestry".into()),
        }));

        assert!(record.technology_mentions["GIS"] >= 2);
        assert!(record.descriptive_sections.contains_key("Research Highlights"));
        assert_eq!(record.content_hash.len(), 64);
    }

    #[test]
    fn test_no_patterns_is_document_error() {
        let err = extract("# About\n\nJust prose, nothing structured.\n").unwrap_err();
        assert!(matches!(err, DocumentError::NoPatterns { .. }));
    }

    #[test]
    fn test_re_extraction_is_deterministic() {
        let a = extract(fixtures::OREGON_PROFILE).unwrap();
        let mut b = extract(fixtures::OREGON_PROFILE).unwrap();
        b.extracted_at = a.extracted_at;
        assert_eq!(a, b);
    }

    #[test]
    fn test_subheader_without_unit_keyword_sets_context_only() {
        let record = extract("## Programs\n### Forestry\n- BS Forest Management\n").unwrap();
        assert!(record.units.is_empty());
        assert_eq!(record.programs[0].unit.as_deref(), Some("Forestry"));
    }

    #[test]
    fn test_nested_bullets_under_units() {
        let record = extract(
            "## Departments\n- School of Environmental Sciences\n  - BS Environmental Science\n    - ENV 110: Ecology Basics\n",
        )
        .unwrap();
        assert_eq!(record.units[0].name, "School of Environmental Sciences");
        assert_eq!(
            record.programs[0].unit.as_deref(),
            Some("School of Environmental Sciences")
        );
        assert_eq!(record.courses[0].program.as_deref(), Some("BS Environmental Science"));
    }
}
