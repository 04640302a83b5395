//! Property tests over the domain model invariants.

use proptest::prelude::*;

use repolens_core::ids;
use repolens_core::models::{
    ArchitecturalPattern, CodeRelationship, Conversation, ConversationContext, DocumentationSection,
    LanguageStat, MessageKind, PatternKind, RelationshipKind, Repository, RepositoryStatistics,
    SectionType,
};

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}"
}

proptest! {
    #[test]
    fn repository_identity_holds(owner in ident(), name in ident()) {
        let url = format!("https://host.example/{owner}/{name}");
        let repo = Repository::connect(owner.clone(), name.clone(), &url).unwrap();
        prop_assert_eq!(&repo.full_name, &format!("{owner}/{name}"));
        prop_assert!(repo.clone_url.ends_with(".git"));
        prop_assert_eq!(&repo.id, &repo.full_name);
    }

    #[test]
    fn relationship_invariants(
        source in ident(),
        target in ident(),
        weight in 0.0f64..=1.0,
        confidence in 0.0f64..=100.0,
    ) {
        prop_assume!(source != target);
        let rel = CodeRelationship::new(source, target, RelationshipKind::Calls, weight, confidence).unwrap();
        prop_assert!(rel.source_entity_id != rel.target_entity_id);
        prop_assert!((0.0..=1.0).contains(&rel.weight));
        prop_assert!((0.0..=100.0).contains(&rel.metadata.confidence));
    }

    #[test]
    fn out_of_range_weight_rejected(weight in prop_oneof![-10.0f64..-0.0001, 1.0001f64..10.0]) {
        prop_assert!(CodeRelationship::new("a", "b", RelationshipKind::Uses, weight, 50.0).is_err());
    }

    #[test]
    fn pattern_confidence_bounds(confidence in 0.0f64..=1.0) {
        let pattern = ArchitecturalPattern::new("Factory", PatternKind::Creational, "r", confidence).unwrap();
        prop_assert!((0.0..=1.0).contains(&pattern.confidence));
    }

    #[test]
    fn entity_id_deterministic_and_bounded(
        repo in ident(),
        file in ident(),
        lang in ident(),
        qname in ident(),
    ) {
        let a = ids::entity_id(&repo, &file, &lang, &qname, "function");
        let b = ids::entity_id(&repo, &file, &lang, &qname, "function");
        prop_assert_eq!(&a, &b);
        prop_assert!(a.len() <= ids::MAX_ID_LEN);
    }

    #[test]
    fn section_tags_lowercase_unique(tags in proptest::collection::vec("[A-Za-z]{1,8}", 0..10)) {
        let mut section =
            DocumentationSection::new("T", "body", SectionType::Usage, 0).unwrap();
        for tag in &tags {
            section.add_tag(tag);
        }
        for tag in &section.tags {
            prop_assert_eq!(tag, &tag.to_lowercase());
        }
        let mut seen = std::collections::HashSet::new();
        for tag in &section.tags {
            prop_assert!(seen.insert(tag.clone()));
        }
    }

    #[test]
    fn conversation_message_order(contents in proptest::collection::vec("[a-z]{1,12}", 1..20)) {
        let mut conv =
            Conversation::new("user", "title", ConversationContext::default()).unwrap();
        for content in &contents {
            conv.add_message(MessageKind::UserQuery, content.clone()).unwrap();
        }
        for pair in conv.messages.windows(2) {
            prop_assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        let max_ts = conv.messages.iter().map(|m| m.timestamp).max().unwrap();
        prop_assert!(conv.last_activity_at >= max_ts);
    }

    #[test]
    fn language_percentages_constructed_consistently(
        counts in proptest::collection::vec(1usize..5000, 1..6)
    ) {
        let total: usize = counts.iter().sum();
        let mut stats = RepositoryStatistics {
            file_count: counts.len(),
            line_count: total,
            language_breakdown: Default::default(),
        };
        for (i, lines) in counts.iter().enumerate() {
            stats.language_breakdown.insert(
                format!("lang{i}"),
                LanguageStat {
                    file_count: 1,
                    line_count: *lines,
                    percentage: *lines as f64 * 100.0 / total as f64,
                },
            );
        }
        prop_assert!(stats.percentages_consistent());
    }
}
