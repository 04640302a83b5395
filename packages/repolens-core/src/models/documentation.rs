//! Documentation aggregate: sections, versioning, generation lifecycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Documentation section categories. Render order is fixed by
/// [`SectionType::canonical_rank`], regardless of persisted `order`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Overview,
    GettingStarted,
    Installation,
    Usage,
    Configuration,
    Architecture,
    ApiReference,
    Examples,
    Testing,
    Deployment,
    Contributing,
    Troubleshooting,
    Changelog,
    License,
    Other(String),
}

impl SectionType {
    /// Canonical render rank; `Other` sections sort after every known type.
    pub fn canonical_rank(&self) -> usize {
        match self {
            SectionType::Overview => 0,
            SectionType::GettingStarted => 1,
            SectionType::Installation => 2,
            SectionType::Usage => 3,
            SectionType::Configuration => 4,
            SectionType::Architecture => 5,
            SectionType::ApiReference => 6,
            SectionType::Examples => 7,
            SectionType::Testing => 8,
            SectionType::Deployment => 9,
            SectionType::Contributing => 10,
            SectionType::Troubleshooting => 11,
            SectionType::Changelog => 12,
            SectionType::License => 13,
            SectionType::Other(_) => 100,
        }
    }

    /// Types that may appear at most once per documentation.
    pub fn is_unique(&self) -> bool {
        matches!(
            self,
            SectionType::Overview
                | SectionType::Architecture
                | SectionType::License
                | SectionType::Changelog
        )
    }

    pub fn display_name(&self) -> String {
        match self {
            SectionType::Overview => "Overview".to_string(),
            SectionType::GettingStarted => "Getting Started".to_string(),
            SectionType::Installation => "Installation".to_string(),
            SectionType::Usage => "Usage".to_string(),
            SectionType::Configuration => "Configuration".to_string(),
            SectionType::Architecture => "Architecture".to_string(),
            SectionType::ApiReference => "API Reference".to_string(),
            SectionType::Examples => "Examples".to_string(),
            SectionType::Testing => "Testing".to_string(),
            SectionType::Deployment => "Deployment".to_string(),
            SectionType::Contributing => "Contributing".to_string(),
            SectionType::Troubleshooting => "Troubleshooting".to_string(),
            SectionType::Changelog => "Changelog".to_string(),
            SectionType::License => "License".to_string(),
            SectionType::Other(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentationStatus {
    NotStarted,
    Analyzing,
    GeneratingContent,
    Enriching,
    Indexing,
    Completed,
    Error,
    UpdateRequired,
}

impl DocumentationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentationStatus::NotStarted => "not_started",
            DocumentationStatus::Analyzing => "analyzing",
            DocumentationStatus::GeneratingContent => "generating_content",
            DocumentationStatus::Enriching => "enriching",
            DocumentationStatus::Indexing => "indexing",
            DocumentationStatus::Completed => "completed",
            DocumentationStatus::Error => "error",
            DocumentationStatus::UpdateRequired => "update_required",
        }
    }

    pub fn can_transition(from: DocumentationStatus, to: DocumentationStatus) -> bool {
        use DocumentationStatus::*;
        matches!(
            (from, to),
            (NotStarted, Analyzing)
                | (Analyzing, GeneratingContent)
                | (GeneratingContent, Enriching)
                | (GeneratingContent, Indexing)
                | (Enriching, Indexing)
                | (Indexing, Completed)
                | (Analyzing, Error)
                | (GeneratingContent, Error)
                | (Enriching, Error)
                | (Indexing, Error)
                | (Error, Analyzing)
                | (Error, NotStarted)
                | (Error, UpdateRequired)
                | (Completed, UpdateRequired)
                | (UpdateRequired, Analyzing)
        )
    }
}

impl std::fmt::Display for DocumentationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic version; the patch component increments on each completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl DocVersion {
    pub fn initial() -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
        }
    }

    pub fn bump_patch(&mut self) {
        self.patch += 1;
    }
}

impl std::fmt::Display for DocVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A pointer from prose to source, deduplicated by location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReference {
    pub file_path: String,
    pub code_snippet: String,
    pub description: String,
    pub reference_type: String,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
}

impl CodeReference {
    /// Location key used for deduplication.
    pub fn location_key(&self) -> (String, Option<usize>, Option<usize>) {
        (self.file_path.clone(), self.start_line, self.end_line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMetadata {
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationSection {
    pub id: String,
    pub title: String,
    pub content: String,
    pub section_type: SectionType,
    pub order: usize,
    pub code_references: Vec<CodeReference>,
    /// Lowercased, unique, insertion-ordered.
    pub tags: Vec<String>,
    pub metadata: SectionMetadata,
}

impl DocumentationSection {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        section_type: SectionType,
        order: usize,
    ) -> Result<Self> {
        let title = title.into();
        let content = content.into();
        if title.trim().is_empty() {
            return Err(Error::validation("section title must not be empty"));
        }
        if content.trim().is_empty() {
            return Err(Error::validation("section content must not be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: format!("sec_{}", uuid::Uuid::new_v4().simple()),
            title,
            content,
            section_type,
            order,
            code_references: Vec::new(),
            tags: Vec::new(),
            metadata: SectionMetadata {
                created_at: now,
                last_modified_at: now,
            },
        })
    }

    /// Append a reference unless one with the same location already exists.
    pub fn add_code_reference(&mut self, reference: CodeReference) {
        let key = reference.location_key();
        if self
            .code_references
            .iter()
            .any(|r| r.location_key() == key)
        {
            return;
        }
        self.code_references.push(reference);
        self.metadata.last_modified_at = Utc::now();
    }

    /// Add a tag, lowercased; duplicates are ignored.
    pub fn add_tag(&mut self, tag: impl AsRef<str>) {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() || self.tags.iter().any(|t| t == &tag) {
            return;
        }
        self.tags.push(tag);
        self.metadata.last_modified_at = Utc::now();
    }

    pub fn update_content(&mut self, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::validation("section content must not be empty"));
        }
        self.content = content;
        self.metadata.last_modified_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentationStatistics {
    pub section_count: usize,
    pub total_content_length: usize,
    pub code_reference_count: usize,
    pub quality_score: f64,
}

/// Documentation aggregate for a single repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Documentation {
    pub repository_id: String,
    pub title: String,
    pub status: DocumentationStatus,
    pub sections: Vec<DocumentationSection>,
    pub metadata: BTreeMap<String, String>,
    pub version: DocVersion,
    pub statistics: DocumentationStatistics,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Documentation {
    pub fn new(repository_id: impl Into<String>, title: impl Into<String>) -> Result<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(Error::validation("documentation title must not be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            repository_id: repository_id.into(),
            title,
            status: DocumentationStatus::NotStarted,
            sections: Vec::new(),
            metadata: BTreeMap::new(),
            version: DocVersion::initial(),
            statistics: DocumentationStatistics::default(),
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn transition(&mut self, to: DocumentationStatus) -> Result<()> {
        if !DocumentationStatus::can_transition(self.status, to) {
            return Err(Error::invalid_transition(self.status.as_str(), to.as_str()));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Add a section, rejecting duplicates of unique types.
    pub fn add_section(&mut self, section: DocumentationSection) -> Result<()> {
        if section.section_type.is_unique()
            && self
                .sections
                .iter()
                .any(|s| s.section_type == section.section_type)
        {
            return Err(Error::conflict(format!(
                "duplicate unique section: {}",
                section.section_type.display_name()
            )));
        }
        self.sections.push(section);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the first section of the given type, or add it.
    pub fn upsert_section(&mut self, section: DocumentationSection) {
        if let Some(existing) = self
            .sections
            .iter_mut()
            .find(|s| s.section_type == section.section_type)
        {
            *existing = section;
        } else {
            self.sections.push(section);
        }
        self.updated_at = Utc::now();
    }

    pub fn section(&self, section_type: &SectionType) -> Option<&DocumentationSection> {
        self.sections.iter().find(|s| &s.section_type == section_type)
    }

    /// Sections in canonical render order (type rank, then persisted order).
    pub fn render_sections(&self) -> Vec<&DocumentationSection> {
        let mut ordered: Vec<&DocumentationSection> = self.sections.iter().collect();
        ordered.sort_by(|a, b| {
            a.section_type
                .canonical_rank()
                .cmp(&b.section_type.canonical_rank())
                .then(a.order.cmp(&b.order))
                .then(a.title.cmp(&b.title))
        });
        ordered
    }

    /// Completion gate: only legal from `Indexing`; bumps the patch version
    /// exactly once and refreshes statistics.
    pub fn complete(&mut self, quality_score: f64) -> Result<()> {
        self.transition(DocumentationStatus::Completed)?;
        self.version.bump_patch();
        self.error_message = None;
        self.refresh_statistics(quality_score);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(DocumentationStatus::Error)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn mark_for_regeneration(&mut self) -> Result<()> {
        self.transition(DocumentationStatus::UpdateRequired)
    }

    fn refresh_statistics(&mut self, quality_score: f64) {
        self.statistics = DocumentationStatistics {
            section_count: self.sections.len(),
            total_content_length: self.sections.iter().map(|s| s.content.len()).sum(),
            code_reference_count: self.sections.iter().map(|s| s.code_references.len()).sum(),
            quality_score,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn section(ty: SectionType, order: usize) -> DocumentationSection {
        DocumentationSection::new(ty.display_name(), "Some body text.", ty, order).unwrap()
    }

    #[test]
    fn test_section_rejects_empty_content() {
        assert!(DocumentationSection::new("T", "  ", SectionType::Usage, 0).is_err());
        assert!(DocumentationSection::new(" ", "body", SectionType::Usage, 0).is_err());
    }

    #[test]
    fn test_tags_lowercased_and_unique() {
        let mut s = section(SectionType::Usage, 0);
        s.add_tag("API");
        s.add_tag("api");
        s.add_tag(" Rust ");
        assert_eq!(s.tags, vec!["api", "rust"]);
    }

    #[test]
    fn test_code_references_deduplicated_by_location() {
        let mut s = section(SectionType::Usage, 0);
        let mk = |snippet: &str| CodeReference {
            file_path: "src/lib.rs".into(),
            code_snippet: snippet.into(),
            description: "d".into(),
            reference_type: "example".into(),
            start_line: Some(1),
            end_line: Some(5),
        };
        s.add_code_reference(mk("a"));
        s.add_code_reference(mk("b")); // same location, different snippet
        assert_eq!(s.code_references.len(), 1);
        assert_eq!(s.code_references[0].code_snippet, "a");
    }

    #[test]
    fn test_unique_section_cannot_repeat() {
        let mut doc = Documentation::new("acme/svc", "acme/svc docs").unwrap();
        doc.add_section(section(SectionType::Overview, 0)).unwrap();
        let err = doc.add_section(section(SectionType::Overview, 1)).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // non-unique types may repeat
        doc.add_section(section(SectionType::Examples, 0)).unwrap();
        doc.add_section(section(SectionType::Examples, 1)).unwrap();
    }

    #[test]
    fn test_render_order_is_canonical() {
        let mut doc = Documentation::new("acme/svc", "docs").unwrap();
        doc.add_section(section(SectionType::License, 0)).unwrap();
        doc.add_section(section(SectionType::Usage, 3)).unwrap();
        doc.add_section(section(SectionType::Overview, 9)).unwrap();
        doc.add_section(section(SectionType::Other("Faq".into()), 0))
            .unwrap();

        let order: Vec<_> = doc
            .render_sections()
            .iter()
            .map(|s| s.section_type.clone())
            .collect();
        assert_eq!(
            order,
            vec![
                SectionType::Overview,
                SectionType::Usage,
                SectionType::License,
                SectionType::Other("Faq".into()),
            ]
        );
    }

    #[test]
    fn test_generation_walk_and_version_bump() {
        let mut doc = Documentation::new("acme/svc", "docs").unwrap();
        doc.transition(DocumentationStatus::Analyzing).unwrap();
        doc.transition(DocumentationStatus::GeneratingContent).unwrap();
        doc.transition(DocumentationStatus::Indexing).unwrap();
        doc.complete(0.92).unwrap();

        assert_eq!(doc.status, DocumentationStatus::Completed);
        assert_eq!(doc.version.to_string(), "1.0.1");
        assert_eq!(doc.statistics.quality_score, 0.92);
    }

    #[test]
    fn test_completion_bumps_patch_exactly_once_per_run() {
        let mut doc = Documentation::new("acme/svc", "docs").unwrap();
        doc.transition(DocumentationStatus::Analyzing).unwrap();
        doc.transition(DocumentationStatus::GeneratingContent).unwrap();
        doc.transition(DocumentationStatus::Indexing).unwrap();
        doc.complete(0.9).unwrap();
        assert_eq!(doc.version.to_string(), "1.0.1");

        doc.mark_for_regeneration().unwrap();
        doc.transition(DocumentationStatus::Analyzing).unwrap();
        doc.transition(DocumentationStatus::GeneratingContent).unwrap();
        doc.transition(DocumentationStatus::Indexing).unwrap();
        doc.complete(0.9).unwrap();
        assert_eq!(doc.version.to_string(), "1.0.2");
    }

    #[test]
    fn test_error_then_regeneration() {
        let mut doc = Documentation::new("acme/svc", "docs").unwrap();
        doc.transition(DocumentationStatus::Analyzing).unwrap();
        doc.transition(DocumentationStatus::GeneratingContent).unwrap();
        doc.fail("quota exceeded for 5 sections").unwrap();
        assert_eq!(doc.status, DocumentationStatus::Error);
        assert!(doc.error_message.as_deref().unwrap().contains("quota"));

        doc.mark_for_regeneration().unwrap();
        assert_eq!(doc.status, DocumentationStatus::UpdateRequired);
        doc.transition(DocumentationStatus::Analyzing).unwrap();
    }

    #[test]
    fn test_cannot_complete_without_indexing() {
        let mut doc = Documentation::new("acme/svc", "docs").unwrap();
        assert!(doc.complete(0.9).is_err());
        doc.transition(DocumentationStatus::Analyzing).unwrap();
        assert!(doc.complete(0.9).is_err());
    }

    #[test]
    fn test_enriching_path_optional() {
        let mut doc = Documentation::new("r", "docs").unwrap();
        doc.transition(DocumentationStatus::Analyzing).unwrap();
        doc.transition(DocumentationStatus::GeneratingContent).unwrap();
        doc.transition(DocumentationStatus::Enriching).unwrap();
        doc.transition(DocumentationStatus::Indexing).unwrap();
        doc.complete(0.8).unwrap();
    }
}
