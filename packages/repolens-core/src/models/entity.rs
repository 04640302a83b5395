//! Code entities and typed relationships extracted from source.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Class,
    Interface,
    Trait,
    Method,
    Function,
    Property,
    Field,
    Enum,
    Struct,
    Module,
    TypeAlias,
    Test,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::Trait => "trait",
            EntityKind::Method => "method",
            EntityKind::Function => "function",
            EntityKind::Property => "property",
            EntityKind::Field => "field",
            EntityKind::Enum => "enum",
            EntityKind::Struct => "struct",
            EntityKind::Module => "module",
            EntityKind::TypeAlias => "type_alias",
            EntityKind::Test => "test",
        }
    }

    /// Kinds that represent a named type (inheritance/implementation targets).
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            EntityKind::Class
                | EntityKind::Interface
                | EntityKind::Trait
                | EntityKind::Enum
                | EntityKind::Struct
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Line span of an entity within its file (1-indexed, inclusive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLocation {
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub complexity_score: f64,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A typed code entity. `entity_id` is the stable hash from
/// [`crate::ids::entity_id`], unique within its repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEntity {
    pub entity_id: String,
    pub repository_id: String,
    pub name: String,
    /// Qualified name, e.g. `auth::Service::login`.
    pub full_name: String,
    pub kind: EntityKind,
    pub file_path: String,
    pub language: String,
    pub location: EntityLocation,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_vector: Option<Vec<f32>>,
    pub metadata: EntityMetadata,
    pub attributes: Vec<String>,
}

impl CodeEntity {
    pub fn new(
        repository_id: impl Into<String>,
        file_path: impl Into<String>,
        language: impl Into<String>,
        name: impl Into<String>,
        full_name: impl Into<String>,
        kind: EntityKind,
        location: EntityLocation,
        content: impl Into<String>,
    ) -> Self {
        let repository_id = repository_id.into();
        let file_path = file_path.into();
        let language = language.into();
        let full_name = full_name.into();
        let entity_id = ids::entity_id(
            &repository_id,
            &file_path,
            &language,
            &full_name,
            kind.as_str(),
        );
        Self {
            entity_id,
            repository_id,
            name: name.into(),
            full_name,
            kind,
            file_path,
            language,
            location,
            content: content.into(),
            content_vector: None,
            metadata: EntityMetadata::default(),
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Inheritance,
    Implementation,
    Composition,
    Aggregation,
    Association,
    Calls,
    Uses,
    Depends,
    Creates,
    Returns,
    Accepts,
    LayerDependency,
    ServiceConsumption,
    EventPublishing,
    EventSubscription,
    SharedInterface,
    SimilarConcept,
    SharedDependency,
    PatternInstance,
    PatternComponent,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Inheritance => "inheritance",
            RelationshipKind::Implementation => "implementation",
            RelationshipKind::Composition => "composition",
            RelationshipKind::Aggregation => "aggregation",
            RelationshipKind::Association => "association",
            RelationshipKind::Calls => "calls",
            RelationshipKind::Uses => "uses",
            RelationshipKind::Depends => "depends",
            RelationshipKind::Creates => "creates",
            RelationshipKind::Returns => "returns",
            RelationshipKind::Accepts => "accepts",
            RelationshipKind::LayerDependency => "layer_dependency",
            RelationshipKind::ServiceConsumption => "service_consumption",
            RelationshipKind::EventPublishing => "event_publishing",
            RelationshipKind::EventSubscription => "event_subscription",
            RelationshipKind::SharedInterface => "shared_interface",
            RelationshipKind::SimilarConcept => "similar_concept",
            RelationshipKind::SharedDependency => "shared_dependency",
            RelationshipKind::PatternInstance => "pattern_instance",
            RelationshipKind::PatternComponent => "pattern_component",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    /// Resolution confidence in `[0, 100]`.
    pub confidence: f64,
    /// `file:line` provenance for every observation of this edge.
    pub source_references: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A directed, weighted edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRelationship {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub kind: RelationshipKind,
    /// Edge strength in `[0, 1]`.
    pub weight: f64,
    pub metadata: RelationshipMetadata,
    pub detected_at: DateTime<Utc>,
}

impl CodeRelationship {
    pub fn new(
        source_entity_id: impl Into<String>,
        target_entity_id: impl Into<String>,
        kind: RelationshipKind,
        weight: f64,
        confidence: f64,
    ) -> Result<Self> {
        let source_entity_id = source_entity_id.into();
        let target_entity_id = target_entity_id.into();

        if source_entity_id == target_entity_id {
            return Err(Error::validation("self-referencing relationship"));
        }
        if !(0.0..=1.0).contains(&weight) {
            return Err(Error::validation(format!("weight out of range: {weight}")));
        }
        if !(0.0..=100.0).contains(&confidence) {
            return Err(Error::validation(format!(
                "confidence out of range: {confidence}"
            )));
        }

        Ok(Self {
            source_entity_id,
            target_entity_id,
            kind,
            weight,
            metadata: RelationshipMetadata {
                confidence,
                source_references: Vec::new(),
                properties: BTreeMap::new(),
            },
            detected_at: Utc::now(),
        })
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.metadata.source_references.push(reference.into());
        self
    }

    /// Dedup key for merging observations of the same logical edge.
    pub fn merge_key(&self) -> (String, String, RelationshipKind) {
        (
            self.source_entity_id.clone(),
            self.target_entity_id.clone(),
            self.kind,
        )
    }
}
