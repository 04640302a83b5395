//! Documentation quality gate.
//!
//! The score composes coverage, length bounds, code-reference density and
//! an LLM self-consistency check. Weights are fixed; the pass threshold is
//! `min_quality_score` from config.

use std::sync::Arc;

use tracing::warn;

use repolens_core::config::DocumentationConfig;
use repolens_core::llm::{ChatMessage, CompletionRequest, LlmClient};
use repolens_core::models::{Documentation, SectionType};

use crate::prompts;

const W_COVERAGE: f64 = 0.4;
const W_LENGTH: f64 = 0.3;
const W_REFERENCES: f64 = 0.1;
const W_SELF_CHECK: f64 = 0.2;

/// Self-check fallback when the LLM answer is unusable.
const DEFAULT_SELF_CHECK: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct QualityBreakdown {
    pub coverage: f64,
    pub length: f64,
    pub references: f64,
    pub self_check: f64,
    pub score: f64,
}

/// Deterministic components, no LLM involved.
pub fn structural_components(
    doc: &Documentation,
    requested: &[SectionType],
    config: &DocumentationConfig,
) -> (f64, f64, f64) {
    let coverage = if requested.is_empty() {
        1.0
    } else {
        let present = requested
            .iter()
            .filter(|t| doc.section(t).is_some())
            .count();
        present as f64 / requested.len() as f64
    };

    let (length, references) = if doc.sections.is_empty() {
        (0.0, 0.0)
    } else {
        let within = doc
            .sections
            .iter()
            .filter(|s| {
                s.content.len() >= config.min_content_length
                    && s.content.len() <= config.max_content_length
            })
            .count();
        let with_refs = doc
            .sections
            .iter()
            .filter(|s| !s.code_references.is_empty())
            .count();
        (
            within as f64 / doc.sections.len() as f64,
            with_refs as f64 / doc.sections.len() as f64,
        )
    };

    (coverage, length, references)
}

/// Full quality score including the LLM self-consistency check.
pub async fn score(
    doc: &Documentation,
    requested: &[SectionType],
    llm: &Arc<dyn LlmClient>,
    config: &DocumentationConfig,
) -> QualityBreakdown {
    let (coverage, length, references) = structural_components(doc, requested, config);

    let rendered: String = doc
        .render_sections()
        .iter()
        .map(|s| format!("## {}\n{}\n", s.title, s.content))
        .collect();
    let self_check = match self_consistency(&doc.repository_id, &rendered, llm, config).await {
        Some(value) => value,
        None => {
            warn!(repository = %doc.repository_id, "self-check unusable, using default");
            DEFAULT_SELF_CHECK
        }
    };

    let score = W_COVERAGE * coverage
        + W_LENGTH * length
        + W_REFERENCES * references
        + W_SELF_CHECK * self_check;

    QualityBreakdown {
        coverage,
        length,
        references,
        self_check,
        score,
    }
}

async fn self_consistency(
    repository_id: &str,
    rendered: &str,
    llm: &Arc<dyn LlmClient>,
    config: &DocumentationConfig,
) -> Option<f64> {
    let request = CompletionRequest::new(
        &config.deployment,
        vec![
            ChatMessage::system(prompts::SYSTEM_GUIDANCE),
            ChatMessage::user(prompts::self_check_prompt(repository_id, rendered)),
        ],
    )
    .with_max_tokens(8)
    .with_temperature(0.0);

    let response = llm.complete(request).await.ok()?;
    parse_rating(&response.content)
}

/// Parse a `0..=10` rating out of a model reply.
fn parse_rating(reply: &str) -> Option<f64> {
    let token = reply
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find(|t| !t.is_empty())?;
    let value: f64 = token.parse().ok()?;
    if (0.0..=10.0).contains(&value) {
        Some(value / 10.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::models::DocumentationSection;

    fn doc_with_sections(lengths: &[usize]) -> (Documentation, Vec<SectionType>) {
        let mut doc = Documentation::new("r", "r docs").unwrap();
        let types = [
            SectionType::Overview,
            SectionType::Usage,
            SectionType::ApiReference,
        ];
        let mut requested = Vec::new();
        for (i, len) in lengths.iter().enumerate() {
            let ty = types[i % types.len()].clone();
            requested.push(ty.clone());
            let section =
                DocumentationSection::new(ty.display_name(), "x".repeat(*len), ty, i).unwrap();
            doc.upsert_section(section);
        }
        (doc, requested)
    }

    #[test]
    fn test_full_coverage_good_lengths() {
        let (doc, requested) = doc_with_sections(&[500, 800, 1200]);
        let (coverage, length, _) =
            structural_components(&doc, &requested, &DocumentationConfig::default());
        assert_eq!(coverage, 1.0);
        assert_eq!(length, 1.0);
    }

    #[test]
    fn test_short_sections_penalized() {
        let (doc, requested) = doc_with_sections(&[500, 10]);
        let (_, length, _) =
            structural_components(&doc, &requested, &DocumentationConfig::default());
        assert!(length < 1.0);
    }

    #[test]
    fn test_missing_sections_reduce_coverage() {
        let (doc, mut requested) = doc_with_sections(&[500]);
        requested.push(SectionType::Testing);
        let (coverage, _, _) =
            structural_components(&doc, &requested, &DocumentationConfig::default());
        assert!(coverage < 1.0);
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("8"), Some(0.8));
        assert_eq!(parse_rating("Score: 9.5/10"), Some(0.95));
        assert_eq!(parse_rating("n/a"), None);
        assert_eq!(parse_rating("42"), None);
    }
}
