//! Path classification: language detection, structural roles, statistics.

use std::collections::BTreeMap;

use repolens_core::models::{FileRole, LanguageStat, RepositoryStatistics};

/// Language for a path, by extension and a few well-known file names.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name {
        "Dockerfile" => return Some("docker"),
        "Makefile" => return Some("make"),
        "go.mod" | "go.sum" => return Some("go"),
        _ => {}
    }

    let ext = file_name.rsplit('.').next()?;
    let lang = match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" | "cxx" => "cpp",
        "swift" => "swift",
        "scala" => "scala",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" | "scss" | "less" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" | "csproj" | "fsproj" => "xml",
        "md" | "markdown" | "rst" | "adoc" => "markdown",
        _ => return None,
    };
    Some(lang)
}

/// Languages the extractor has a first-class parser for.
pub fn has_structured_parser(language: &str) -> bool {
    matches!(language, "python" | "rust" | "typescript" | "go" | "java")
}

/// Data/markup languages counted in statistics but never parsed for
/// entities.
pub fn is_markup(language: &str) -> bool {
    matches!(
        language,
        "json" | "yaml" | "toml" | "xml" | "html" | "css" | "markdown"
    )
}

/// Structural role of a path within the repository.
pub fn role_for_path(path: &str) -> FileRole {
    let lower = path.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);

    if is_manifest_name(file_name) {
        return FileRole::Build;
    }
    if file_name.starts_with("readme")
        || file_name.starts_with("changelog")
        || file_name.starts_with("contributing")
        || file_name.starts_with("license")
        || lower.starts_with("docs/")
        || file_name.ends_with(".md")
        || file_name.ends_with(".rst")
    {
        return FileRole::Documentation;
    }
    if lower.contains("test") || lower.contains("spec.") || file_name.ends_with("_test.go") {
        return FileRole::Test;
    }
    if matches!(
        file_name,
        "main.rs" | "main.go" | "main.py" | "index.ts" | "index.js" | "app.py" | "program.cs"
            | "main.java"
    ) {
        return FileRole::EntryPoint;
    }
    if file_name.ends_with(".json")
        || file_name.ends_with(".yaml")
        || file_name.ends_with(".yml")
        || file_name.ends_with(".toml")
        || file_name.ends_with(".ini")
        || file_name.ends_with(".env")
    {
        return FileRole::Config;
    }
    FileRole::Source
}

/// Dependency manifests recognized by the analyzer.
pub fn is_manifest_name(file_name: &str) -> bool {
    matches!(
        file_name,
        "cargo.toml"
            | "package.json"
            | "go.mod"
            | "requirements.txt"
            | "pyproject.toml"
            | "pom.xml"
            | "build.gradle"
            | "gemfile"
    ) || file_name.ends_with(".csproj")
}

/// Known-name bonus used by important-file ranking.
pub fn known_name_bonus(path: &str) -> f64 {
    let lower = path.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    if file_name.starts_with("readme") {
        2.0
    } else if is_manifest_name(file_name) {
        1.5
    } else {
        0.0
    }
}

/// Compute language statistics from `(path, line_count)` pairs.
///
/// Shares are line-count based; percentages sum to 100 within rounding
/// noise. Unclassifiable paths are counted as files but contribute no
/// language lines.
pub fn breakdown(files: &[(String, usize)]) -> RepositoryStatistics {
    let mut per_language: BTreeMap<String, LanguageStat> = BTreeMap::new();
    let mut total_lines = 0usize;

    for (path, lines) in files {
        if let Some(lang) = language_for_path(path) {
            let stat = per_language.entry(lang.to_string()).or_default();
            stat.file_count += 1;
            stat.line_count += lines;
            total_lines += lines;
        }
    }

    if total_lines > 0 {
        for stat in per_language.values_mut() {
            stat.percentage = stat.line_count as f64 * 100.0 / total_lines as f64;
        }
    }

    RepositoryStatistics {
        file_count: files.len(),
        line_count: total_lines,
        language_breakdown: per_language,
    }
}

/// Primary language: largest line share, ties broken alphabetically,
/// markup languages only when nothing else exists.
pub fn primary_language(stats: &RepositoryStatistics) -> String {
    let pick = |markup: bool| {
        stats
            .language_breakdown
            .iter()
            .filter(|(lang, _)| is_markup(lang) == markup)
            .max_by(|a, b| {
                a.1.line_count
                    .cmp(&b.1.line_count)
                    .then(b.0.cmp(a.0))
            })
            .map(|(lang, _)| lang.clone())
    };
    pick(false)
        .or_else(|| pick(true))
        .unwrap_or_else(|| "unknown".to_string())
}
