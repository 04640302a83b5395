//! Section prompt assembly.

use repolens_core::models::{ProjectKind, RepositoryAnalysisContext, SectionType};

pub const SYSTEM_GUIDANCE: &str = "You are a senior engineer writing documentation for a code \
repository. Write concise, accurate markdown grounded ONLY in the provided analysis. Reference \
concrete file paths where relevant. Do not invent APIs.";

/// Default section set for a repository, by language and project kind.
pub fn default_sections(analysis: &RepositoryAnalysisContext) -> Vec<SectionType> {
    let mut sections = vec![
        SectionType::Overview,
        SectionType::GettingStarted,
        SectionType::Installation,
        SectionType::Usage,
        SectionType::Configuration,
        SectionType::ApiReference,
    ];
    if !analysis.pattern_hints.is_empty()
        || matches!(analysis.project_kind, ProjectKind::Service | ProjectKind::Workspace)
    {
        sections.push(SectionType::Architecture);
    }
    if analysis.project_kind == ProjectKind::Library {
        sections.push(SectionType::Examples);
    }
    if analysis.pattern_hints.iter().any(|h| h == "tests_present") {
        sections.push(SectionType::Testing);
    }
    sections
}

/// Language-specific guidance appended to every section prompt.
pub fn language_guidance(language: &str) -> &'static str {
    match language {
        "rust" => "Use cargo commands in examples. Mention crate features where relevant.",
        "go" => "Use go-module conventions (go build, go test). Document exported identifiers.",
        "python" => "Assume pip/venv workflows. Follow PEP 257 terminology for docstrings.",
        "typescript" | "javascript" => {
            "Use npm/yarn commands. Distinguish ESM and CommonJS where it matters."
        }
        "java" => "Use Maven/Gradle conventions. Reference packages by fully qualified name.",
        "csharp" => "Use dotnet CLI conventions. Reference namespaces and projects.",
        _ => "Use the ecosystem's standard build tooling in examples.",
    }
}

/// Build the user prompt for one section.
pub fn section_prompt(section: &SectionType, analysis: &RepositoryAnalysisContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Write the \"{}\" section of the documentation for repository `{}`.\n\n",
        section.display_name(),
        analysis.repository_id
    ));
    prompt.push_str(&format!(
        "Primary language: {}. Project kind: {:?}. Languages present: {}.\n",
        analysis.primary_language,
        analysis.project_kind,
        analysis.languages.join(", ")
    ));

    if !analysis.important_files.is_empty() {
        prompt.push_str("\nKey files:\n");
        for file in analysis.important_files.iter().take(12) {
            prompt.push_str(&format!("- {} ({:?})\n", file.path, file.role));
        }
    }
    if !analysis.dependencies.is_empty() {
        prompt.push_str("\nDependencies:\n");
        for dep in analysis.dependencies.iter().take(15) {
            prompt.push_str(&format!(
                "- {} {} [{}]\n",
                dep.name,
                dep.version.as_deref().unwrap_or("*"),
                dep.ecosystem
            ));
        }
    }
    if !analysis.pattern_hints.is_empty() {
        prompt.push_str(&format!(
            "\nStructural hints: {}\n",
            analysis.pattern_hints.join(", ")
        ));
    }

    prompt.push_str(&format!(
        "\nSection focus: {}\n{}\n",
        section_focus(section),
        language_guidance(&analysis.primary_language)
    ));
    prompt.push_str("Return only the section body as markdown, no heading.");
    prompt
}

fn section_focus(section: &SectionType) -> &'static str {
    match section {
        SectionType::Overview => "What the repository does, for whom, and its main components.",
        SectionType::GettingStarted => "Shortest path from clone to a running example.",
        SectionType::Installation => "Prerequisites and installation steps.",
        SectionType::Usage => "Core workflows with short code samples.",
        SectionType::Configuration => "Configuration surface: files, variables, defaults.",
        SectionType::Architecture => "Component boundaries, data flow, notable patterns.",
        SectionType::ApiReference => "Public entry points grouped by module.",
        SectionType::Examples => "Self-contained, runnable examples.",
        SectionType::Testing => "How to run and extend the test suite.",
        SectionType::Deployment => "Build artifacts and deployment paths.",
        SectionType::Contributing => "How to contribute: setup, style, review flow.",
        SectionType::Troubleshooting => "Common failure modes and fixes.",
        SectionType::Changelog => "Notable changes by version.",
        SectionType::License => "License terms summary.",
        SectionType::Other(_) => "Cover the named topic using the analysis context.",
    }
}

/// Enrichment pass: ask for an added example on an existing section body.
pub fn enrich_prompt(section: &SectionType, body: &str) -> String {
    format!(
        "The following \"{}\" documentation section lacks a concrete example. Append one short, \
realistic example to it and return the full amended section body:\n\n{body}",
        section.display_name()
    )
}

/// Self-consistency check used by the quality gate.
pub fn self_check_prompt(repository_id: &str, rendered: &str) -> String {
    format!(
        "Rate the internal consistency of this documentation for `{repository_id}` on a scale \
of 0 to 10 (contradictions, references to missing sections, or fabricated files lower the \
score). Respond with just the number.\n\n{rendered}"
    )
}
