//! Architectural patterns detected over the entity/relationship graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Creational,
    Structural,
    Behavioral,
    Architectural,
    DomainDriven,
    Microservice,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Creational => "creational",
            PatternKind::Structural => "structural",
            PatternKind::Behavioral => "behavioral",
            PatternKind::Architectural => "architectural",
            PatternKind::DomainDriven => "domain_driven",
            PatternKind::Microservice => "microservice",
        }
    }
}

/// A detected pattern instance with per-participant roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitecturalPattern {
    pub name: String,
    pub kind: PatternKind,
    pub repository_id: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// `entity_id -> role` (e.g. `"factory"`, `"product"`, `"handler"`).
    pub participant_roles: BTreeMap<String, String>,
    pub characteristics: Vec<String>,
    pub violations: Vec<String>,
}

impl ArchitecturalPattern {
    pub fn new(
        name: impl Into<String>,
        kind: PatternKind,
        repository_id: impl Into<String>,
        confidence: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::validation(format!(
                "pattern confidence out of range: {confidence}"
            )));
        }
        Ok(Self {
            name: name.into(),
            kind,
            repository_id: repository_id.into(),
            confidence,
            participant_roles: BTreeMap::new(),
            characteristics: Vec::new(),
            violations: Vec::new(),
        })
    }

    pub fn with_participant(
        mut self,
        entity_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        self.participant_roles.insert(entity_id.into(), role.into());
        self
    }

    pub fn with_characteristic(mut self, c: impl Into<String>) -> Self {
        self.characteristics.push(c.into());
        self
    }
}
