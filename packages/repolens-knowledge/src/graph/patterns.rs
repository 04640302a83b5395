//! Architectural pattern detectors.
//!
//! Detectors are pure over `(entities, relationships)` and yield candidate
//! patterns with per-participant roles; the builder drops candidates below
//! the configured confidence floor.

use std::collections::{BTreeMap, BTreeSet};

use repolens_core::models::{
    ArchitecturalPattern, CodeEntity, CodeRelationship, EntityKind, PatternKind, RelationshipKind,
};

pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(
        &self,
        repository_id: &str,
        entities: &[CodeEntity],
        relationships: &[CodeRelationship],
    ) -> Vec<ArchitecturalPattern>;
}

/// The default detector set, covering the creational, structural,
/// behavioral, architectural, DDD and microservice families.
pub fn default_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(FactoryDetector),
        Box::new(AdapterDetector),
        Box::new(ObserverDetector),
        Box::new(LayeredArchitectureDetector),
        Box::new(RepositoryDetector),
        Box::new(ServiceLayerDetector),
    ]
}

fn repo_entities<'a>(repository_id: &str, entities: &'a [CodeEntity]) -> Vec<&'a CodeEntity> {
    entities
        .iter()
        .filter(|e| e.repository_id == repository_id)
        .collect()
}

fn outgoing<'a>(
    entity: &CodeEntity,
    relationships: &'a [CodeRelationship],
) -> Vec<&'a CodeRelationship> {
    relationships
        .iter()
        .filter(|r| r.source_entity_id == entity.entity_id)
        .collect()
}

fn incoming<'a>(
    entity: &CodeEntity,
    relationships: &'a [CodeRelationship],
) -> Vec<&'a CodeRelationship> {
    relationships
        .iter()
        .filter(|r| r.target_entity_id == entity.entity_id)
        .collect()
}

/// Creational: types named `*Factory` / `*Builder` that other code calls
/// into to obtain products.
pub struct FactoryDetector;

impl PatternDetector for FactoryDetector {
    fn name(&self) -> &'static str {
        "factory"
    }

    fn detect(
        &self,
        repository_id: &str,
        entities: &[CodeEntity],
        relationships: &[CodeRelationship],
    ) -> Vec<ArchitecturalPattern> {
        let mut patterns = Vec::new();
        for entity in repo_entities(repository_id, entities) {
            if !entity.kind.is_type_like() {
                continue;
            }
            let suffix = if entity.name.ends_with("Factory") {
                "Factory"
            } else if entity.name.ends_with("Builder") {
                "Builder"
            } else {
                continue;
            };

            let consumers = incoming(entity, relationships)
                .into_iter()
                .filter(|r| matches!(r.kind, RelationshipKind::Calls | RelationshipKind::Uses))
                .count();
            let confidence = (0.7 + consumers as f64 * 0.05).min(0.95);

            let mut pattern = ArchitecturalPattern::new(
                format!("{} ({})", suffix, entity.name),
                PatternKind::Creational,
                repository_id,
                confidence,
            )
            .expect("confidence in range")
            .with_participant(&entity.entity_id, "factory")
            .with_characteristic(format!("{consumers} consumer(s)"));

            for rel in outgoing(entity, relationships) {
                if matches!(rel.kind, RelationshipKind::Creates | RelationshipKind::Returns) {
                    pattern = pattern.with_participant(&rel.target_entity_id, "product");
                }
            }
            patterns.push(pattern);
        }
        patterns
    }
}

/// Structural: `*Adapter` / `*Wrapper` types delegating to a wrapped type.
pub struct AdapterDetector;

impl PatternDetector for AdapterDetector {
    fn name(&self) -> &'static str {
        "adapter"
    }

    fn detect(
        &self,
        repository_id: &str,
        entities: &[CodeEntity],
        relationships: &[CodeRelationship],
    ) -> Vec<ArchitecturalPattern> {
        let mut patterns = Vec::new();
        for entity in repo_entities(repository_id, entities) {
            if !entity.kind.is_type_like()
                || !(entity.name.ends_with("Adapter") || entity.name.ends_with("Wrapper"))
            {
                continue;
            }
            let delegates: Vec<_> = outgoing(entity, relationships)
                .into_iter()
                .filter(|r| matches!(r.kind, RelationshipKind::Uses | RelationshipKind::Calls))
                .collect();
            let implements = outgoing(entity, relationships)
                .into_iter()
                .any(|r| r.kind == RelationshipKind::Implementation);

            let confidence: f64 = if implements { 0.85 } else { 0.7 };
            let mut pattern = ArchitecturalPattern::new(
                format!("Adapter ({})", entity.name),
                PatternKind::Structural,
                repository_id,
                confidence.min(0.95),
            )
            .expect("confidence in range")
            .with_participant(&entity.entity_id, "adapter");

            for rel in delegates {
                pattern = pattern.with_participant(&rel.target_entity_id, "adaptee");
            }
            patterns.push(pattern);
        }
        patterns
    }
}

/// Behavioral: publish/subscribe edges, or `*Listener`/`*Handler`/
/// `*Observer` types wired to an event source.
pub struct ObserverDetector;

impl PatternDetector for ObserverDetector {
    fn name(&self) -> &'static str {
        "observer"
    }

    fn detect(
        &self,
        repository_id: &str,
        entities: &[CodeEntity],
        relationships: &[CodeRelationship],
    ) -> Vec<ArchitecturalPattern> {
        let ids: BTreeSet<&str> = repo_entities(repository_id, entities)
            .iter()
            .map(|e| e.entity_id.as_str())
            .collect();

        let mut publishers = BTreeMap::new();
        let mut subscribers = BTreeMap::new();
        for rel in relationships {
            if !ids.contains(rel.source_entity_id.as_str()) {
                continue;
            }
            match rel.kind {
                RelationshipKind::EventPublishing => {
                    publishers.insert(rel.source_entity_id.clone(), rel.target_entity_id.clone());
                }
                RelationshipKind::EventSubscription => {
                    subscribers.insert(rel.source_entity_id.clone(), rel.target_entity_id.clone());
                }
                _ => {}
            }
        }

        // name-based fallback when no explicit event edges exist
        let named_observers: Vec<&CodeEntity> = repo_entities(repository_id, entities)
            .into_iter()
            .filter(|e| {
                e.kind.is_type_like()
                    && (e.name.ends_with("Listener")
                        || e.name.ends_with("Observer")
                        || e.name.ends_with("Subscriber"))
            })
            .collect();

        let mut patterns = Vec::new();
        if !publishers.is_empty() && !subscribers.is_empty() {
            let mut pattern = ArchitecturalPattern::new(
                "Observer (event edges)",
                PatternKind::Behavioral,
                repository_id,
                0.9,
            )
            .expect("confidence in range");
            for publisher in publishers.keys() {
                pattern = pattern.with_participant(publisher, "subject");
            }
            for subscriber in subscribers.keys() {
                pattern = pattern.with_participant(subscriber, "observer");
            }
            patterns.push(pattern);
        } else if !named_observers.is_empty() {
            let mut pattern = ArchitecturalPattern::new(
                "Observer (naming)",
                PatternKind::Behavioral,
                repository_id,
                0.72,
            )
            .expect("confidence in range");
            for observer in &named_observers {
                pattern = pattern.with_participant(&observer.entity_id, "observer");
            }
            patterns.push(pattern);
        }
        patterns
    }
}

const LAYERS: &[(&str, &[&str])] = &[
    ("presentation", &["controllers", "controller", "api", "handlers", "routes", "views"]),
    ("application", &["services", "service", "application", "usecases", "use_cases"]),
    ("domain", &["domain", "models", "model", "entities", "core"]),
    ("infrastructure", &["infrastructure", "repositories", "repository", "storage", "adapters", "db", "dal"]),
];

fn layer_of(path: &str) -> Option<(usize, &'static str)> {
    for segment in path.split('/') {
        let segment = segment.to_ascii_lowercase();
        for (idx, (layer, dirs)) in LAYERS.iter().enumerate() {
            if dirs.contains(&segment.as_str()) {
                return Some((idx, layer));
            }
        }
    }
    None
}

/// Architectural: layered folder structure with downward dependencies;
/// upward edges are recorded as violations.
pub struct LayeredArchitectureDetector;

impl PatternDetector for LayeredArchitectureDetector {
    fn name(&self) -> &'static str {
        "layered"
    }

    fn detect(
        &self,
        repository_id: &str,
        entities: &[CodeEntity],
        relationships: &[CodeRelationship],
    ) -> Vec<ArchitecturalPattern> {
        let scoped = repo_entities(repository_id, entities);
        let mut layer_by_id: BTreeMap<&str, (usize, &'static str)> = BTreeMap::new();
        for entity in &scoped {
            if let Some(layer) = layer_of(&entity.file_path) {
                layer_by_id.insert(entity.entity_id.as_str(), layer);
            }
        }

        let layers_present: BTreeSet<&str> =
            layer_by_id.values().map(|(_, name)| *name).collect();
        if layers_present.len() < 2 {
            return Vec::new();
        }

        let mut downward = 0usize;
        let mut violations = Vec::new();
        for rel in relationships {
            let (Some(&(from_idx, from_layer)), Some(&(to_idx, to_layer))) = (
                layer_by_id.get(rel.source_entity_id.as_str()),
                layer_by_id.get(rel.target_entity_id.as_str()),
            ) else {
                continue;
            };
            if from_idx < to_idx {
                downward += 1;
            } else if from_idx > to_idx {
                violations.push(format!(
                    "{from_layer} depended on by {to_layer}: {} -> {}",
                    rel.source_entity_id, rel.target_entity_id
                ));
            }
        }

        let total = downward + violations.len();
        let confidence = if total == 0 {
            0.6
        } else {
            (0.6 + 0.35 * downward as f64 / total as f64).min(0.95)
        };

        let mut pattern = ArchitecturalPattern::new(
            "Layered architecture",
            PatternKind::Architectural,
            repository_id,
            confidence,
        )
        .expect("confidence in range")
        .with_characteristic(format!("layers: {}", layers_present.len()))
        .with_characteristic(format!("downward dependencies: {downward}"));
        pattern.violations = violations;

        for (id, (_, layer)) in &layer_by_id {
            pattern = pattern.with_participant(*id, *layer);
        }
        vec![pattern]
    }
}

/// Domain-driven: repository abstractions (`*Repository` / `*Store`
/// interfaces with implementations).
pub struct RepositoryDetector;

impl PatternDetector for RepositoryDetector {
    fn name(&self) -> &'static str {
        "repository"
    }

    fn detect(
        &self,
        repository_id: &str,
        entities: &[CodeEntity],
        relationships: &[CodeRelationship],
    ) -> Vec<ArchitecturalPattern> {
        let mut patterns = Vec::new();
        for entity in repo_entities(repository_id, entities) {
            let is_abstraction = matches!(entity.kind, EntityKind::Interface | EntityKind::Trait);
            if !is_abstraction
                || !(entity.name.ends_with("Repository") || entity.name.ends_with("Store"))
            {
                continue;
            }

            let implementations: Vec<_> = incoming(entity, relationships)
                .into_iter()
                .filter(|r| r.kind == RelationshipKind::Implementation)
                .collect();

            let confidence = if implementations.is_empty() { 0.65 } else { 0.88 };
            let mut pattern = ArchitecturalPattern::new(
                format!("Repository ({})", entity.name),
                PatternKind::DomainDriven,
                repository_id,
                confidence,
            )
            .expect("confidence in range")
            .with_participant(&entity.entity_id, "abstraction");

            for rel in implementations {
                pattern = pattern.with_participant(&rel.source_entity_id, "implementation");
            }
            patterns.push(pattern);
        }
        patterns
    }
}

/// Microservice-flavored: `*Service` types consumed by other components.
pub struct ServiceLayerDetector;

impl PatternDetector for ServiceLayerDetector {
    fn name(&self) -> &'static str {
        "service_layer"
    }

    fn detect(
        &self,
        repository_id: &str,
        entities: &[CodeEntity],
        relationships: &[CodeRelationship],
    ) -> Vec<ArchitecturalPattern> {
        let services: Vec<&CodeEntity> = repo_entities(repository_id, entities)
            .into_iter()
            .filter(|e| e.kind.is_type_like() && e.name.ends_with("Service"))
            .collect();
        if services.is_empty() {
            return Vec::new();
        }

        let mut pattern_consumers = 0usize;
        let mut participants: Vec<(String, &'static str)> = Vec::new();
        for service in &services {
            participants.push((service.entity_id.clone(), "service"));
            for rel in incoming(service, relationships) {
                if matches!(
                    rel.kind,
                    RelationshipKind::Calls | RelationshipKind::ServiceConsumption
                ) {
                    participants.push((rel.source_entity_id.clone(), "consumer"));
                    pattern_consumers += 1;
                }
            }
        }

        let confidence = (0.7 + pattern_consumers as f64 * 0.04).min(0.92);
        let mut pattern = ArchitecturalPattern::new(
            "Service layer",
            PatternKind::Microservice,
            repository_id,
            confidence,
        )
        .expect("confidence in range");
        for (id, role) in participants {
            pattern = pattern.with_participant(id, role);
        }
        pattern = pattern.with_characteristic(format!("{} service(s)", services.len()));
        vec![pattern]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::models::EntityLocation;

    fn entity(name: &str, kind: EntityKind, path: &str) -> CodeEntity {
        CodeEntity::new(
            "r",
            path,
            "rust",
            name,
            name,
            kind,
            EntityLocation::default(),
            "",
        )
    }

    fn rel(from: &CodeEntity, to: &CodeEntity, kind: RelationshipKind) -> CodeRelationship {
        CodeRelationship::new(
            from.entity_id.clone(),
            to.entity_id.clone(),
            kind,
            0.8,
            80.0,
        )
        .unwrap()
    }

    #[test]
    fn test_factory_detection() {
        let factory = entity("SessionFactory", EntityKind::Class, "src/session.rs");
        let product = entity("Session", EntityKind::Struct, "src/session.rs");
        let caller = entity("login", EntityKind::Function, "src/auth.rs");
        let rels = vec![
            rel(&factory, &product, RelationshipKind::Creates),
            rel(&caller, &factory, RelationshipKind::Calls),
        ];

        let patterns =
            FactoryDetector.detect("r", &[factory.clone(), product.clone(), caller], &rels);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Creational);
        assert_eq!(patterns[0].participant_roles[&factory.entity_id], "factory");
        assert_eq!(patterns[0].participant_roles[&product.entity_id], "product");
        assert!(patterns[0].confidence > 0.7);
    }

    #[test]
    fn test_repository_detection_with_implementation() {
        let iface = entity("UserRepository", EntityKind::Trait, "src/domain/user.rs");
        let implementation = entity("PgUserRepository", EntityKind::Struct, "src/infrastructure/pg.rs");
        let rels = vec![rel(&implementation, &iface, RelationshipKind::Implementation)];

        let patterns = RepositoryDetector.detect("r", &[iface.clone(), implementation.clone()], &rels);
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].confidence >= 0.88);
        assert_eq!(
            patterns[0].participant_roles[&implementation.entity_id],
            "implementation"
        );
    }

    #[test]
    fn test_layered_detects_violations() {
        let controller = entity("AuthController", EntityKind::Class, "src/controllers/auth.rs");
        let service = entity("AuthService", EntityKind::Class, "src/services/auth.rs");
        let repo = entity("AuthRepo", EntityKind::Class, "src/repositories/auth.rs");
        let entities = vec![controller.clone(), service.clone(), repo.clone()];

        let clean = vec![
            rel(&controller, &service, RelationshipKind::Calls),
            rel(&service, &repo, RelationshipKind::Calls),
        ];
        let patterns = LayeredArchitectureDetector.detect("r", &entities, &clean);
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].violations.is_empty());
        assert!(patterns[0].confidence >= 0.9);

        let dirty = vec![rel(&repo, &controller, RelationshipKind::Calls)];
        let patterns = LayeredArchitectureDetector.detect("r", &entities, &dirty);
        assert_eq!(patterns[0].violations.len(), 1);
    }

    #[test]
    fn test_observer_via_event_edges() {
        let bus = entity("EventBus", EntityKind::Struct, "src/bus.rs");
        let publisher = entity("OrderService", EntityKind::Class, "src/orders.rs");
        let listener = entity("EmailListener", EntityKind::Class, "src/email.rs");
        let rels = vec![
            rel(&publisher, &bus, RelationshipKind::EventPublishing),
            rel(&listener, &bus, RelationshipKind::EventSubscription),
        ];

        let patterns = ObserverDetector.detect(
            "r",
            &[bus, publisher.clone(), listener.clone()],
            &rels,
        );
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].participant_roles[&publisher.entity_id], "subject");
        assert_eq!(patterns[0].participant_roles[&listener.entity_id], "observer");
    }

    #[test]
    fn test_service_layer_detection() {
        let service = entity("BillingService", EntityKind::Class, "src/billing.rs");
        let caller = entity("checkout", EntityKind::Function, "src/checkout.rs");
        let rels = vec![rel(&caller, &service, RelationshipKind::Calls)];

        let patterns = ServiceLayerDetector.detect("r", &[service.clone(), caller.clone()], &rels);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Microservice);
        assert_eq!(patterns[0].participant_roles[&caller.entity_id], "consumer");
    }

    #[test]
    fn test_detectors_are_pure() {
        let factory = entity("XFactory", EntityKind::Class, "src/x.rs");
        let entities = vec![factory];
        let first = FactoryDetector.detect("r", &entities, &[]);
        let second = FactoryDetector.detect("r", &entities, &[]);
        assert_eq!(first, second);
    }
}
