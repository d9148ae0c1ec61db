//! Corpus discovery: one `.md`/`.txt` document per organization.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{DocumentError, Result, SyncError};
use crate::identity::clean_display;
use crate::types::OverrideTable;

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// A document found in the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusDocument {
    pub path: PathBuf,
    /// File name including extension; used as provenance
    pub file_name: String,
    pub organization_name: String,
}

impl CorpusDocument {
    /// Read the document as UTF-8 text.
    pub fn read(&self) -> std::result::Result<String, DocumentError> {
        let bytes = std::fs::read(&self.path).map_err(|source| DocumentError::Read {
            path: self.path.clone(),
            source,
        })?;
        String::from_utf8(bytes).map_err(|_| DocumentError::NotUtf8 {
            document: self.file_name.clone(),
        })
    }
}

/// Organization display name from a file stem: `_` becomes a space and
/// whitespace is collapsed.
pub fn display_name_from_filename(stem: &str) -> String {
    clean_display(&stem.replace('_', " "))
}

/// List corpus documents in deterministic (file name) order.
pub fn discover(dir: &Path, overrides: &OverrideTable) -> Result<Vec<CorpusDocument>> {
    if !dir.is_dir() {
        return Err(SyncError::CorpusNotFound(dir.to_path_buf()));
    }

    let mut documents = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let has_document_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| DOCUMENT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !has_document_extension {
            debug!(path = %path.display(), "skipping non-document file");
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let organization_name = overrides
            .organization_name(&file_name, &stem)
            .map(str::to_string)
            .unwrap_or_else(|| display_name_from_filename(&stem));

        documents.push(CorpusDocument {
            path,
            file_name,
            organization_name,
        });
    }

    documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(documents)
}

/// SHA-256 of the raw document text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_from_filename() {
        assert_eq!(display_name_from_filename("Oregon_State_University"), "Oregon State University");
        assert_eq!(display_name_from_filename("  Purdue__University "), "Purdue University");
        assert_eq!(display_name_from_filename("SUNY ESF"), "SUNY ESF");
    }

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_University.md"), "# B").unwrap();
        std::fs::write(dir.path().join("A_College.txt"), "# A").unwrap();
        std::fs::write(dir.path().join("notes.csv"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub.md")).unwrap();

        let overrides = OverrideTable::new().with_organization_name("b_University.md", "University of B");
        let docs = discover(dir.path(), &overrides).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.organization_name.as_str()).collect();
        assert_eq!(names, vec!["A College", "University of B"]);
    }

    #[test]
    fn test_missing_corpus_dir() {
        let err = discover(Path::new("/definitely/not/here"), &OverrideTable::new()).unwrap_err();
        assert!(matches!(err, SyncError::CorpusNotFound(_)));
    }

    #[test]
    fn test_read_rejects_non_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.md");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let doc = CorpusDocument {
            path,
            file_name: "bad.md".into(),
            organization_name: "bad".into(),
        };
        assert!(matches!(doc.read(), Err(DocumentError::NotUtf8 { .. })));
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
