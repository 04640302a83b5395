//! Query intent classification support.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    ExplainConcept,
    FindImplementation,
    CompareApproaches,
    Troubleshoot,
    ProvideExample,
    ArchitecturalQuery,
    CodeReview,
    Documentation,
    Testing,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 9] = [
        QueryIntent::ExplainConcept,
        QueryIntent::FindImplementation,
        QueryIntent::CompareApproaches,
        QueryIntent::Troubleshoot,
        QueryIntent::ProvideExample,
        QueryIntent::ArchitecturalQuery,
        QueryIntent::CodeReview,
        QueryIntent::Documentation,
        QueryIntent::Testing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::ExplainConcept => "explain_concept",
            QueryIntent::FindImplementation => "find_implementation",
            QueryIntent::CompareApproaches => "compare_approaches",
            QueryIntent::Troubleshoot => "troubleshoot",
            QueryIntent::ProvideExample => "provide_example",
            QueryIntent::ArchitecturalQuery => "architectural_query",
            QueryIntent::CodeReview => "code_review",
            QueryIntent::Documentation => "documentation",
            QueryIntent::Testing => "testing",
        }
    }

    /// Parse a model reply into the fixed enum, tolerating surrounding
    /// prose and either snake_case or PascalCase spellings.
    pub fn parse(reply: &str) -> Option<QueryIntent> {
        let lower = reply.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| lower.contains(intent.as_str()) || lower.contains(&intent.as_str().replace('_', " ")))
    }

    /// Section-type boost for reranking, in `[0, 1]`.
    pub fn section_boost(&self, section_type: Option<&str>) -> f64 {
        let Some(section_type) = section_type else {
            return 0.0;
        };
        let favored: &[&str] = match self {
            QueryIntent::ExplainConcept => &["Overview", "Architecture"],
            QueryIntent::FindImplementation => &["API Reference", "Usage"],
            QueryIntent::CompareApproaches => &["Architecture", "Overview"],
            QueryIntent::Troubleshoot => &["Troubleshooting", "Configuration"],
            QueryIntent::ProvideExample => &["Examples", "Usage"],
            QueryIntent::ArchitecturalQuery => &["Architecture", "Overview"],
            QueryIntent::CodeReview => &["API Reference"],
            QueryIntent::Documentation => &["Overview", "Usage"],
            QueryIntent::Testing => &["Testing", "Examples"],
        };
        if favored.contains(&section_type) {
            1.0
        } else {
            0.0
        }
    }

    /// Intents that additionally consult the knowledge graph.
    pub fn wants_graph(&self) -> bool {
        matches!(
            self,
            QueryIntent::ArchitecturalQuery | QueryIntent::FindImplementation
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentClassification {
    pub intent: QueryIntent,
    pub confidence: f64,
    pub entities: Vec<String>,
}

/// Keyword fallback used when the model is unavailable or its answer does
/// not parse. Confidence is deliberately modest.
pub fn classify_heuristically(query: &str) -> IntentClassification {
    let lower = query.to_lowercase();
    let rules: [(&[&str], QueryIntent); 8] = [
        (&["architecture", "structure", "layers", "design"], QueryIntent::ArchitecturalQuery),
        (&["where is", "implementation", "implemented", "which file"], QueryIntent::FindImplementation),
        (&["compare", "versus", " vs ", "difference between"], QueryIntent::CompareApproaches),
        (&["error", "fail", "broken", "not working", "fix"], QueryIntent::Troubleshoot),
        (&["example", "sample", "show me how"], QueryIntent::ProvideExample),
        (&["review", "code smell", "refactor"], QueryIntent::CodeReview),
        (&["document", "readme", "docs"], QueryIntent::Documentation),
        (&["test", "coverage", "assert"], QueryIntent::Testing),
    ];

    for (needles, intent) in rules {
        if needles.iter().any(|n| lower.contains(n)) {
            return IntentClassification {
                intent,
                confidence: 0.55,
                entities: extract_entity_terms(query),
            };
        }
    }
    IntentClassification {
        intent: QueryIntent::ExplainConcept,
        confidence: 0.4,
        entities: extract_entity_terms(query),
    }
}

/// Heuristic term extraction: identifiers, CamelCase and quoted tokens.
pub fn extract_entity_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for token in query.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.')) {
        let token = token.trim_matches('.');
        if token.len() < 3 {
            continue;
        }
        let looks_like_identifier = token.contains('_')
            || token.contains('.')
            || token.chars().next().is_some_and(|c| c.is_uppercase())
            || token
                .chars()
                .skip(1)
                .any(|c| c.is_uppercase());
        if looks_like_identifier && !terms.contains(&token.to_string()) {
            terms.push(token.to_string());
        }
    }
    terms
}
