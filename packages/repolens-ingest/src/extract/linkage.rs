//! Cross-file linkage: resolve leftover references over the whole entity
//! set by qualified-name matching.

use std::collections::HashMap;

use tracing::debug;

use repolens_core::models::{CodeEntity, CodeRelationship, RelationshipKind};

use super::{ReferenceKind, SymbolReference};

/// Confidence assigned per resolution quality.
const CONF_FULL_NAME: f64 = 90.0;
const CONF_UNIQUE_NAME: f64 = 75.0;
const CONF_AMBIGUOUS: f64 = 60.0;
const CONF_UNRESOLVED: f64 = 35.0;
const WEIGHT_UNRESOLVED: f64 = 0.25;

/// Resolve references across files.
///
/// Resolution order: exact `full_name` match, unique simple-name match,
/// deterministic pick among ambiguous candidates. Unresolved references are
/// kept as low-weight `Depends` edges onto a synthetic `ext_` target so the
/// graph still records the dependency surface.
pub fn link_cross_file(
    entities: &[CodeEntity],
    references: &[SymbolReference],
) -> Vec<CodeRelationship> {
    let by_full: HashMap<&str, &CodeEntity> = entities
        .iter()
        .map(|e| (e.full_name.as_str(), e))
        .collect();

    let mut by_name: HashMap<&str, Vec<&CodeEntity>> = HashMap::new();
    for entity in entities {
        by_name.entry(entity.name.as_str()).or_default().push(entity);
    }
    for candidates in by_name.values_mut() {
        candidates.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    }

    let mut relationships = Vec::new();
    for reference in references {
        let (kind, base_weight) = reference.kind.relationship();

        let resolved: Option<(&CodeEntity, f64, f64)> = match by_full.get(reference.name.as_str())
        {
            Some(entity) => Some((entity, base_weight, CONF_FULL_NAME)),
            None => by_name.get(reference.name.as_str()).map(|candidates| {
                if candidates.len() == 1 {
                    (candidates[0], base_weight * 0.9, CONF_UNIQUE_NAME)
                } else {
                    (candidates[0], base_weight * 0.7, CONF_AMBIGUOUS)
                }
            }),
        };

        let relationship = match resolved {
            Some((target, weight, confidence)) => {
                if target.entity_id == reference.from_entity_id {
                    continue;
                }
                CodeRelationship::new(
                    reference.from_entity_id.clone(),
                    target.entity_id.clone(),
                    kind,
                    weight,
                    confidence,
                )
            }
            None => CodeRelationship::new(
                reference.from_entity_id.clone(),
                format!("ext_{}", reference.name),
                unresolved_kind(reference.kind),
                WEIGHT_UNRESOLVED,
                CONF_UNRESOLVED,
            ),
        };

        if let Ok(rel) = relationship {
            relationships
                .push(rel.with_reference(format!("{}:{}", reference.file_path, reference.line)));
        }
    }

    let deduped = dedupe_relationships(relationships);
    debug!(
        references = references.len(),
        relationships = deduped.len(),
        "cross-file linkage complete"
    );
    deduped
}

fn unresolved_kind(kind: ReferenceKind) -> RelationshipKind {
    match kind {
        ReferenceKind::Inherit => RelationshipKind::Inheritance,
        ReferenceKind::Implement => RelationshipKind::Implementation,
        _ => RelationshipKind::Depends,
    }
}

/// Deduplicate on `(source, target, kind)`, keeping the maximum weight and
/// the union of source references. Output is sorted for stable persistence.
pub fn dedupe_relationships(relationships: Vec<CodeRelationship>) -> Vec<CodeRelationship> {
    let mut merged: HashMap<(String, String, RelationshipKind), CodeRelationship> = HashMap::new();

    for rel in relationships {
        match merged.entry(rel.merge_key()) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.weight = existing.weight.max(rel.weight);
                existing.metadata.confidence = existing.metadata.confidence.max(rel.metadata.confidence);
                for reference in rel.metadata.source_references {
                    if !existing.metadata.source_references.contains(&reference) {
                        existing.metadata.source_references.push(reference);
                    }
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(rel);
            }
        }
    }

    let mut out: Vec<CodeRelationship> = merged.into_values().collect();
    out.sort_by(|a, b| {
        a.source_entity_id
            .cmp(&b.source_entity_id)
            .then_with(|| a.target_entity_id.cmp(&b.target_entity_id))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    out
}
