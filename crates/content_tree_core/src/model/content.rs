//! Content, version and section records the location tree points at.
//!
//! # Responsibility
//! - Define the content-side records read and written through the content
//!   repository and the location/content bridge.
//!
//! # Invariants
//! - A content item has at most one published version.
//! - Language codes follow the `xxx-YY` form (e.g. `eng-GB`).

use crate::model::location::{ContentId, SectionId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LANGUAGE_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{3}-[A-Z]{2}$").expect("valid language code regex")
});

/// Whether `code` is a well-formed language code such as `eng-GB`.
pub fn is_valid_language_code(code: &str) -> bool {
    LANGUAGE_CODE_RE.is_match(code)
}

/// Publication state of a content item as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Never published; may only have draft placements.
    Draft,
    /// Has a published version and may have locations.
    Published,
}

/// Lifecycle state of one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Published,
    Archived,
}

/// Content item metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub id: ContentId,
    pub remote_id: String,
    pub name: String,
    pub section_id: SectionId,
    pub main_language_code: String,
    pub always_available: bool,
    pub status: ContentStatus,
    pub current_version_no: u32,
}

/// Version metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub content_id: ContentId,
    pub version_no: u32,
    pub status: VersionStatus,
    pub initial_language_code: String,
}

/// One translated field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldData {
    pub identifier: String,
    pub language_code: String,
    pub value: String,
}

/// A published version with its fields, as copied by `copy_subtree`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    pub content: ContentInfo,
    pub version: VersionInfo,
    pub fields: Vec<FieldData>,
}

/// Input for creating a content item with an initial draft version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub name: String,
    pub section_id: SectionId,
    pub main_language_code: String,
    pub always_available: bool,
    /// Generated when `None`.
    pub remote_id: Option<String>,
    pub fields: Vec<FieldData>,
}

impl NewContent {
    /// Draft in the given section with the given main language and no fields.
    pub fn new(name: impl Into<String>, section_id: SectionId, main_language_code: &str) -> Self {
        Self {
            name: name.into(),
            section_id,
            main_language_code: main_language_code.to_string(),
            always_available: true,
            remote_id: None,
            fields: Vec::new(),
        }
    }

    /// Adds one field value.
    pub fn with_field(mut self, identifier: &str, language_code: &str, value: &str) -> Self {
        self.fields.push(FieldData {
            identifier: identifier.to_string(),
            language_code: language_code.to_string(),
            value: value.to_string(),
        });
        self
    }
}

/// Section record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub identifier: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::is_valid_language_code;

    #[test]
    fn language_code_pattern() {
        assert!(is_valid_language_code("eng-GB"));
        assert!(is_valid_language_code("nor-NO"));
        assert!(!is_valid_language_code("en-GB"));
        assert!(!is_valid_language_code("eng_GB"));
        assert!(!is_valid_language_code("ENG-gb"));
    }
}
