//! Regex fallback parser for languages without a tree-sitter grammar here.
//!
//! Finds top-level type and function declarations plus import-like lines.
//! Spans run from a declaration to the line before the next one.

use once_cell::sync::Lazy;
use regex::Regex;

use repolens_core::error::Result;
use repolens_core::models::EntityKind;

use super::treesitter::last_segment;
use super::{FileContext, LanguageParser, RawParse, RawReference, ReferenceKind};

static TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:export\s+|public\s+|private\s+|internal\s+|abstract\s+|sealed\s+|partial\s+|static\s+)*(class|interface|struct|enum|trait|module)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("type regex")
});

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:export\s+|public\s+|private\s+|static\s+|async\s+)*(?:def|fn|func|function|sub)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("function regex")
});

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:import|using|require|include)\s+["'<]?([\w./:-]+)"#).expect("import regex")
});

pub struct HeuristicParser;

impl LanguageParser for HeuristicParser {
    fn language(&self) -> &'static str {
        "any"
    }

    fn parse(&self, ctx: &FileContext<'_>) -> Result<RawParse> {
        let mut out = RawParse::default();
        let lines: Vec<&str> = ctx.content.lines().collect();
        let total = lines.len().max(1);

        // declaration sites, then spans to the next declaration
        let mut declarations: Vec<(usize, String, EntityKind)> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if let Some(caps) = TYPE_RE.captures(line) {
                let kind = match &caps[1] {
                    "interface" => EntityKind::Interface,
                    "struct" => EntityKind::Struct,
                    "enum" => EntityKind::Enum,
                    "trait" => EntityKind::Trait,
                    "module" => EntityKind::Module,
                    _ => EntityKind::Class,
                };
                declarations.push((i + 1, caps[2].to_string(), kind));
            } else if let Some(caps) = FUNCTION_RE.captures(line) {
                declarations.push((i + 1, caps[1].to_string(), EntityKind::Function));
            } else if let Some(caps) = IMPORT_RE.captures(line) {
                out.raw_refs.push(RawReference {
                    from: None,
                    name: last_segment(&caps[1]).to_string(),
                    kind: ReferenceKind::Import,
                    line: i + 1,
                });
            }
        }

        for (idx, (start, name, kind)) in declarations.iter().enumerate() {
            let end = declarations
                .get(idx + 1)
                .map(|(next, _, _)| next.saturating_sub(1))
                .unwrap_or(total);
            out.entities.push(ctx.entity(name, name, *kind, *start, end.max(*start)));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::EntityExtractor;
    use repolens_core::models::EntityKind;

    #[test]
    fn test_csharp_fallback() {
        let source = "using System;\n\npublic class OrderService\n{\n    public void Place() { }\n}\n\npublic interface IOrderRepo\n{\n}\n";
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/OrderService.cs", source)
            .unwrap();

        let find = |name: &str| parsed.entities.iter().find(|e| e.name == name).unwrap();
        assert_eq!(find("OrderService").kind, EntityKind::Class);
        assert_eq!(find("IOrderRepo").kind, EntityKind::Interface);
        assert!(parsed.references.iter().any(|r| r.name == "System"));
    }

    #[test]
    fn test_ruby_fallback_functions() {
        let source = "require 'json'\n\nclass Parser\nend\n\ndef parse(input)\nend\n";
        let parsed = EntityExtractor::new()
            .parse_file("r", "lib/parser.rb", source)
            .unwrap();
        assert!(parsed.entities.iter().any(|e| e.name == "Parser"));
        assert!(parsed
            .entities
            .iter()
            .any(|e| e.name == "parse" && e.kind == EntityKind::Function));
    }
}
