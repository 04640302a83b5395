//! Domain model: value-type aggregates with pure transition functions.

pub mod analysis;
pub mod conversation;
pub mod documentation;
pub mod entity;
pub mod graph;
pub mod pattern;
pub mod repository;

pub use analysis::{
    DependencyInfo, FileRole, ImportantFile, ProjectKind, RepositoryAnalysisContext,
};
pub use conversation::{
    Conversation, ConversationContext, ConversationMessage, ConversationStatus, MessageKind,
    MessageMetadata,
};
pub use documentation::{
    CodeReference, DocVersion, Documentation, DocumentationSection, DocumentationStatistics,
    DocumentationStatus, SectionMetadata, SectionType,
};
pub use entity::{
    CodeEntity, CodeRelationship, EntityKind, EntityLocation, EntityMetadata, RelationshipKind,
    RelationshipMetadata,
};
pub use graph::{GraphStatistics, GraphStatus, KnowledgeGraph};
pub use pattern::{ArchitecturalPattern, PatternKind};
pub use repository::{
    Branch, Commit, LanguageStat, Repository, RepositoryStatistics, RepositoryStatus,
};
