//! Ordered keyword tables.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::labels::Label;
use crate::identity::normalize;

/// One row of a table: a label and the keywords that select it.
///
/// `contains` keywords match anywhere in the normalized text; `words` match
/// whole words only (so `ms` hits "MS Forestry" but not "systems").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordRule<L> {
    pub label: L,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<String>,
    #[serde(skip)]
    padded_words: Vec<String>,
}

impl<L: Label> KeywordRule<L> {
    pub fn new(label: L, contains: &[&str], words: &[&str]) -> Self {
        Self::from_owned(
            label,
            contains.iter().map(|s| s.to_string()).collect(),
            words.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn from_owned(label: L, contains: Vec<String>, words: Vec<String>) -> Self {
        let contains: Vec<String> = contains
            .iter()
            .map(|k| normalize(k))
            .filter(|k| !k.is_empty())
            .collect();
        let words: Vec<String> = words
            .iter()
            .map(|k| normalize(k))
            .filter(|k| !k.is_empty())
            .collect();
        let padded_words = words.iter().map(|w| format!(" {w} ")).collect();
        Self {
            label,
            contains,
            words,
            padded_words,
        }
    }

    fn has_keywords(&self) -> bool {
        !self.contains.is_empty() || !self.words.is_empty()
    }

    /// `padded` is normalized text with one leading and trailing space.
    fn matches(&self, padded: &str) -> bool {
        self.contains.iter().any(|k| padded.contains(k.as_str()))
            || self.padded_words.iter().any(|w| padded.contains(w.as_str()))
    }

    fn count(&self, padded: &str, tokens: &[&str]) -> usize {
        let substring: usize = self
            .contains
            .iter()
            .map(|k| padded.matches(k.as_str()).count())
            .sum();
        let whole: usize = self
            .words
            .iter()
            .map(|w| {
                let needle: Vec<&str> = w.split(' ').collect();
                tokens.windows(needle.len()).filter(|win| *win == needle.as_slice()).count()
            })
            .sum();
        substring + whole
    }
}

#[derive(Deserialize)]
struct KeywordRuleDef<L> {
    label: L,
    #[serde(default)]
    contains: Vec<String>,
    #[serde(default)]
    words: Vec<String>,
}

/// Ordered `(keywords, label)` table. The first matching row wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleTable<L> {
    rules: Vec<KeywordRule<L>>,
}

impl<L: Label> RuleTable<L> {
    pub fn new(rules: Vec<KeywordRule<L>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[KeywordRule<L>] {
        &self.rules
    }

    /// Label of the first matching row, or `L::DEFAULT`.
    pub fn classify(&self, text: Option<&str>) -> L {
        let Some(padded) = padded(text) else {
            return L::DEFAULT;
        };
        self.rules
            .iter()
            .find(|r| r.matches(&padded))
            .map(|r| r.label)
            .unwrap_or(L::DEFAULT)
    }

    /// Every label with at least one matching row, in table order.
    pub fn matching_labels(&self, text: Option<&str>) -> Vec<L> {
        let Some(padded) = padded(text) else {
            return Vec::new();
        };
        let mut labels = Vec::new();
        for rule in &self.rules {
            if rule.matches(&padded) && !labels.contains(&rule.label) {
                labels.push(rule.label);
            }
        }
        labels
    }

    /// Keyword hits per label across the whole text.
    pub fn count_mentions(&self, text: &str) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        let Some(padded) = padded(Some(text)) else {
            return counts;
        };
        let tokens: Vec<&str> = padded.split_whitespace().collect();
        for rule in &self.rules {
            let n = rule.count(&padded, &tokens);
            if n > 0 {
                *counts.entry(rule.label.as_str()).or_insert(0) += n;
            }
        }
        counts
    }
}

fn padded(text: Option<&str>) -> Option<String> {
    let normalized = normalize(text?);
    if normalized.is_empty() {
        None
    } else {
        Some(format!(" {normalized} "))
    }
}

impl<'de, L> Deserialize<'de> for RuleTable<L>
where
    L: Label + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let defs = Vec::<KeywordRuleDef<L>>::deserialize(deserializer)?;
        let mut rules = Vec::with_capacity(defs.len());
        for def in defs {
            let rule = KeywordRule::from_owned(def.label, def.contains, def.words);
            if !rule.has_keywords() {
                return Err(D::Error::custom(format!(
                    "rule for label {:?} has no keywords",
                    rule.label.as_str()
                )));
            }
            rules.push(rule);
        }
        Ok(Self { rules })
    }
}
