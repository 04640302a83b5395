//! Code entity extraction (per-file parsing + cross-file linkage).
//!
//! Each supported language has a tree-sitter backed parser; everything else
//! falls through to a regex heuristic. Parsers emit entities plus *raw
//! references* (by name); resolution against the file's own entities happens
//! here, and whatever stays unresolved is handed to [`linkage`] once every
//! file of the repository has been parsed.

pub mod complexity;
pub mod go_lang;
pub mod heuristic;
pub mod java;
pub mod linkage;
pub mod python;
pub mod rust_lang;
pub mod treesitter;
pub mod typescript;

use std::collections::HashMap;

use tracing::debug;

use repolens_core::error::Result;
use repolens_core::models::{
    CodeEntity, CodeRelationship, EntityKind, EntityLocation, RelationshipKind,
};

use crate::languages;

/// Verbatim entity content is capped at the indexing chunk bound.
pub const MAX_ENTITY_CONTENT: usize = 32_768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Call,
    Inherit,
    Implement,
    Import,
    TypeUse,
}

impl ReferenceKind {
    /// Relationship kind and base weight for a resolved reference.
    pub fn relationship(&self) -> (RelationshipKind, f64) {
        match self {
            ReferenceKind::Call => (RelationshipKind::Calls, 0.8),
            ReferenceKind::Inherit => (RelationshipKind::Inheritance, 0.95),
            ReferenceKind::Implement => (RelationshipKind::Implementation, 0.95),
            ReferenceKind::Import => (RelationshipKind::Depends, 0.6),
            ReferenceKind::TypeUse => (RelationshipKind::Uses, 0.5),
        }
    }
}

/// A by-name reference emitted by a language parser.
///
/// `from`: `Some(entity_name)` pins the source entity explicitly; `None`
/// means "the enclosing callable" for calls and "the file module" for
/// everything else.
#[derive(Debug, Clone)]
pub struct RawReference {
    pub from: Option<String>,
    pub name: String,
    pub kind: ReferenceKind,
    pub line: usize,
}

/// Parser output before resolution.
#[derive(Debug, Default)]
pub struct RawParse {
    pub entities: Vec<CodeEntity>,
    pub raw_refs: Vec<RawReference>,
}

/// A reference that could not be resolved within its own file.
#[derive(Debug, Clone)]
pub struct SymbolReference {
    pub from_entity_id: String,
    pub file_path: String,
    pub name: String,
    pub kind: ReferenceKind,
    pub line: usize,
}

/// Result of parsing one file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub entities: Vec<CodeEntity>,
    /// Intra-file relationships, sorted by `(source, target, kind)`.
    pub relationships: Vec<CodeRelationship>,
    /// Unresolved references for cross-file linkage.
    pub references: Vec<SymbolReference>,
}

#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    pub repository_id: &'a str,
    pub file_path: &'a str,
    pub language: &'a str,
    pub content: &'a str,
}

impl<'a> FileContext<'a> {
    /// Build an entity for this file, content sliced from the line span.
    pub fn entity(
        &self,
        name: &str,
        full_name: &str,
        kind: EntityKind,
        start_line: usize,
        end_line: usize,
    ) -> CodeEntity {
        let content = slice_lines(self.content, start_line, end_line);
        CodeEntity::new(
            self.repository_id,
            self.file_path,
            self.language,
            name,
            full_name,
            kind,
            EntityLocation {
                start_line,
                end_line,
            },
            content,
        )
    }

    /// Module entity representing the file itself.
    pub fn module_entity(&self) -> CodeEntity {
        let stem = self
            .file_path
            .rsplit('/')
            .next()
            .unwrap_or(self.file_path)
            .split('.')
            .next()
            .unwrap_or(self.file_path)
            .to_string();
        let dotted = self
            .file_path
            .trim_end_matches(|c| c != '.')
            .trim_end_matches('.')
            .replace('/', ".");
        let full_name = if dotted.is_empty() {
            stem.clone()
        } else {
            dotted
        };
        let end_line = self.content.lines().count().max(1);
        CodeEntity::new(
            self.repository_id,
            self.file_path,
            self.language,
            &stem,
            full_name,
            EntityKind::Module,
            EntityLocation {
                start_line: 1,
                end_line,
            },
            String::new(),
        )
    }
}

/// 1-indexed inclusive line slice, capped at [`MAX_ENTITY_CONTENT`].
pub fn slice_lines(content: &str, start_line: usize, end_line: usize) -> String {
    let mut out = String::new();
    for (i, line) in content.lines().enumerate() {
        let n = i + 1;
        if n < start_line {
            continue;
        }
        if n > end_line {
            break;
        }
        if out.len() + line.len() + 1 > MAX_ENTITY_CONTENT {
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Per-language parser behind the registry.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> &'static str;
    fn parse(&self, ctx: &FileContext<'_>) -> Result<RawParse>;
}

/// Registry of language parsers with a heuristic fallback.
pub struct EntityExtractor {
    parsers: HashMap<&'static str, Box<dyn LanguageParser>>,
    fallback: heuristic::HeuristicParser,
}

impl EntityExtractor {
    pub fn new() -> Self {
        let mut parsers: HashMap<&'static str, Box<dyn LanguageParser>> = HashMap::new();
        for parser in [
            Box::new(python::PythonParser) as Box<dyn LanguageParser>,
            Box::new(rust_lang::RustParser),
            Box::new(typescript::TypeScriptParser),
            Box::new(go_lang::GoParser),
            Box::new(java::JavaParser),
        ] {
            parsers.insert(parser.language(), parser);
        }
        Self {
            parsers,
            fallback: heuristic::HeuristicParser,
        }
    }

    /// Parse one file into entities + relationships. Idempotent: the same
    /// input yields the same ids in the same order.
    pub fn parse_file(
        &self,
        repository_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<ParsedFile> {
        let Some(language) = languages::language_for_path(file_path) else {
            return Ok(ParsedFile::default());
        };
        if languages::is_markup(language) {
            return Ok(ParsedFile::default());
        }

        let ctx = FileContext {
            repository_id,
            file_path,
            language,
            content,
        };

        let module = ctx.module_entity();
        let raw = match self.parsers.get(language) {
            Some(parser) => parser.parse(&ctx)?,
            None => self.fallback.parse(&ctx)?,
        };

        debug!(
            file = file_path,
            language,
            entities = raw.entities.len(),
            refs = raw.raw_refs.len(),
            "parsed file"
        );

        Ok(resolve(ctx, module, raw))
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve raw references against the file's own entities; score
/// complexity; order output deterministically.
fn resolve(ctx: FileContext<'_>, module: CodeEntity, raw: RawParse) -> ParsedFile {
    let mut entities = Vec::with_capacity(raw.entities.len() + 1);
    entities.push(module);
    entities.extend(raw.entities);

    for entity in entities.iter_mut() {
        if matches!(
            entity.kind,
            EntityKind::Function | EntityKind::Method | EntityKind::Test
        ) {
            entity.metadata.complexity_score =
                complexity::score(&entity.content, entity.language.as_str());
        }
    }

    let module_id = entities[0].entity_id.clone();
    let by_name: HashMap<&str, &CodeEntity> = entities
        .iter()
        .map(|e| (e.name.as_str(), e))
        .collect();

    let mut relationships: Vec<CodeRelationship> = Vec::new();
    let mut unresolved: Vec<SymbolReference> = Vec::new();

    for reference in &raw.raw_refs {
        let from_id = source_entity_id(&entities, &module_id, reference);

        match by_name.get(reference.name.as_str()) {
            Some(target) if target.entity_id != from_id => {
                let (kind, weight) = reference.kind.relationship();
                if let Ok(rel) = CodeRelationship::new(
                    from_id.clone(),
                    target.entity_id.clone(),
                    kind,
                    weight,
                    85.0,
                ) {
                    relationships.push(rel.with_reference(format!(
                        "{}:{}",
                        ctx.file_path, reference.line
                    )));
                }
            }
            Some(_) => {} // self-reference, skip
            None => unresolved.push(SymbolReference {
                from_entity_id: from_id,
                file_path: ctx.file_path.to_string(),
                name: reference.name.clone(),
                kind: reference.kind,
                line: reference.line,
            }),
        }
    }

    relationships = linkage::dedupe_relationships(relationships);

    ParsedFile {
        entities,
        relationships,
        references: unresolved,
    }
}

fn source_entity_id(
    entities: &[CodeEntity],
    module_id: &str,
    reference: &RawReference,
) -> String {
    if let Some(from_name) = &reference.from {
        return entities
            .iter()
            .find(|e| &e.name == from_name)
            .map(|e| e.entity_id.clone())
            .unwrap_or_else(|| module_id.to_string());
    }

    if reference.kind == ReferenceKind::Call {
        // smallest enclosing callable wins
        return entities
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EntityKind::Function | EntityKind::Method | EntityKind::Test
                ) && e.location.start_line <= reference.line
                    && reference.line <= e.location.end_line
            })
            .min_by_key(|e| e.location.end_line - e.location.start_line)
            .map(|e| e.entity_id.clone())
            .unwrap_or_else(|| module_id.to_string());
    }

    module_id.to_string()
}
