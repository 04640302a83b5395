//! Dependency manifest parsing, one parser per ecosystem.
//!
//! These are deliberately shallow: the analyzer needs names, versions and a
//! dev/runtime split, not a full build-system model.

use once_cell::sync::Lazy;
use regex::Regex;

use repolens_core::models::DependencyInfo;

/// Parse a manifest by file name; unknown manifests yield nothing.
pub fn parse_manifest(path: &str, content: &str) -> Vec<DependencyInfo> {
    let file_name = path
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_ascii_lowercase();
    match file_name.as_str() {
        "cargo.toml" => parse_cargo_toml(content),
        "package.json" => parse_package_json(content),
        "go.mod" => parse_go_mod(content),
        "requirements.txt" => parse_requirements(content),
        _ => Vec::new(),
    }
}

static CARGO_DEP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*([A-Za-z0-9_-]+)\s*=\s*(?:"([^"]+)"|\{[^}]*version\s*=\s*"([^"]+)")"#)
        .expect("cargo dep regex")
});

fn parse_cargo_toml(content: &str) -> Vec<DependencyInfo> {
    let mut deps = Vec::new();
    let mut section = "";
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            section = trimmed;
            continue;
        }
        let dev = matches!(section, "[dev-dependencies]");
        if !(section == "[dependencies]" || dev || section == "[workspace.dependencies]") {
            continue;
        }
        if let Some(caps) = CARGO_DEP_RE.captures(line) {
            let version = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string());
            deps.push(DependencyInfo {
                name: caps[1].to_string(),
                version,
                ecosystem: "cargo".to_string(),
                dev_only: dev,
            });
        }
    }
    deps
}

fn parse_package_json(content: &str) -> Vec<DependencyInfo> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        return Vec::new();
    };
    let mut deps = Vec::new();
    for (key, dev) in [("dependencies", false), ("devDependencies", true)] {
        if let Some(map) = value.get(key).and_then(|v| v.as_object()) {
            for (name, version) in map {
                deps.push(DependencyInfo {
                    name: name.clone(),
                    version: version.as_str().map(String::from),
                    ecosystem: "npm".to_string(),
                    dev_only: dev,
                });
            }
        }
    }
    deps
}

static GO_REQUIRE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([\w./-]+)\s+(v[\w.+-]+)").expect("go require regex"));

fn parse_go_mod(content: &str) -> Vec<DependencyInfo> {
    let mut deps = Vec::new();
    let mut in_require = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("require (") {
            in_require = true;
            continue;
        }
        if in_require && trimmed == ")" {
            in_require = false;
            continue;
        }
        let candidate = if in_require {
            Some(trimmed)
        } else {
            trimmed.strip_prefix("require ")
        };
        if let Some(candidate) = candidate {
            if let Some(caps) = GO_REQUIRE_RE.captures(candidate) {
                deps.push(DependencyInfo {
                    name: caps[1].to_string(),
                    version: Some(caps[2].to_string()),
                    ecosystem: "go".to_string(),
                    dev_only: false,
                });
            }
        }
    }
    deps
}

static PIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9._-]+)\s*(?:[=<>~!]=+\s*([\w.*+-]+))?").expect("pip regex")
});

fn parse_requirements(content: &str) -> Vec<DependencyInfo> {
    content
        .lines()
        .filter(|line| {
            let t = line.trim();
            !t.is_empty() && !t.starts_with('#') && !t.starts_with('-')
        })
        .filter_map(|line| {
            PIP_RE.captures(line).map(|caps| DependencyInfo {
                name: caps[1].to_string(),
                version: caps.get(2).map(|m| m.as_str().to_string()),
                ecosystem: "pip".to_string(),
                dev_only: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cargo_toml() {
        let content = r#"
[package]
name = "demo"

[dependencies]
serde = { version = "1.0", features = ["derive"] }
tokio = "1.40"

[dev-dependencies]
proptest = "1.4"
"#;
        let deps = parse_manifest("Cargo.toml", content);
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "serde");
        assert_eq!(deps[0].version.as_deref(), Some("1.0"));
        assert!(!deps[0].dev_only);
        assert!(deps.iter().any(|d| d.name == "proptest" && d.dev_only));
    }

    #[test]
    fn test_package_json() {
        let content = r#"{
            "name": "web",
            "dependencies": {"react": "^18.0.0"},
            "devDependencies": {"vitest": "^1.2.0"}
        }"#;
        let deps = parse_manifest("web/package.json", content);
        assert_eq!(deps.len(), 2);
        assert!(deps
            .iter()
            .any(|d| d.name == "react" && d.ecosystem == "npm" && !d.dev_only));
        assert!(deps.iter().any(|d| d.name == "vitest" && d.dev_only));
    }

    #[test]
    fn test_go_mod() {
        let content = "module example.com/svc\n\ngo 1.22\n\nrequire (\n\tgithub.com/gin-gonic/gin v1.9.1\n\tgolang.org/x/sync v0.6.0\n)\nrequire github.com/stretchr/testify v1.8.4\n";
        let deps = parse_manifest("go.mod", content);
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "github.com/gin-gonic/gin");
        assert_eq!(deps[0].version.as_deref(), Some("v1.9.1"));
    }

    #[test]
    fn test_requirements_txt() {
        let content = "# deps\nflask==3.0.0\nrequests>=2.31\npydantic\n";
        let deps = parse_manifest("requirements.txt", content);
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].version.as_deref(), Some("3.0.0"));
        assert_eq!(deps[2].version, None);
    }

    #[test]
    fn test_unknown_manifest_is_empty() {
        assert!(parse_manifest("build.sbt", "whatever").is_empty());
    }

    #[test]
    fn test_malformed_package_json_is_empty() {
        assert!(parse_manifest("package.json", "{not json").is_empty());
    }
}
