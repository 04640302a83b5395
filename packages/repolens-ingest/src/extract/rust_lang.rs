//! Rust entity extraction (tree-sitter).

use tree_sitter::Node;

use repolens_core::error::Result;
use repolens_core::models::EntityKind;

use super::treesitter::{
    descendants_of, end_line, field_text, last_segment, name_of, parse_source, start_line, text,
};
use super::{FileContext, LanguageParser, RawParse, RawReference, ReferenceKind};

pub struct RustParser;

impl LanguageParser for RustParser {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn parse(&self, ctx: &FileContext<'_>) -> Result<RawParse> {
        let tree = parse_source(&tree_sitter_rust::language(), ctx.content)?;
        let root = tree.root_node();
        let mut out = RawParse::default();

        collect_items(root, ctx, None, &mut out);
        collect_uses(root, ctx, &mut out);
        collect_calls(root, ctx, &mut out);

        Ok(out)
    }
}

fn collect_items(
    node: Node<'_>,
    ctx: &FileContext<'_>,
    impl_type: Option<&str>,
    out: &mut RawParse,
) {
    for i in 0..node.named_child_count() {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        match child.kind() {
            "struct_item" | "enum_item" | "trait_item" | "type_item" | "union_item" => {
                if let Some(name) = name_of(child, ctx.content) {
                    let kind = match child.kind() {
                        "struct_item" | "union_item" => EntityKind::Struct,
                        "enum_item" => EntityKind::Enum,
                        "trait_item" => EntityKind::Trait,
                        _ => EntityKind::TypeAlias,
                    };
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        kind,
                        start_line(child),
                        end_line(child),
                    ));
                    // trait default methods
                    if child.kind() == "trait_item" {
                        if let Some(body) = child.child_by_field_name("body") {
                            collect_items(body, ctx, Some(name), out);
                        }
                    }
                }
            }
            "function_item" => {
                if let Some(name) = name_of(child, ctx.content) {
                    let kind = if is_test_function(child, ctx.content) {
                        EntityKind::Test
                    } else if impl_type.is_some() {
                        EntityKind::Method
                    } else {
                        EntityKind::Function
                    };
                    let full_name = match impl_type {
                        Some(owner) => format!("{owner}::{name}"),
                        None => name.to_string(),
                    };
                    out.entities.push(ctx.entity(
                        name,
                        &full_name,
                        kind,
                        start_line(child),
                        end_line(child),
                    ));
                }
            }
            "impl_item" => {
                let type_name = field_text(child, "type", ctx.content)
                    .map(|t| last_segment(strip_generics(t)).to_string());
                // `impl Trait for Type` edge
                if let (Some(type_name), Some(trait_node)) =
                    (&type_name, child.child_by_field_name("trait"))
                {
                    out.raw_refs.push(RawReference {
                        from: Some(type_name.clone()),
                        name: last_segment(strip_generics(text(trait_node, ctx.content)))
                            .to_string(),
                        kind: ReferenceKind::Implement,
                        line: start_line(child),
                    });
                }
                if let Some(body) = child.child_by_field_name("body") {
                    collect_items(body, ctx, type_name.as_deref(), out);
                }
            }
            "mod_item" => {
                if let Some(name) = name_of(child, ctx.content) {
                    // skip test modules as entities but keep walking them
                    if name != "tests" {
                        out.entities.push(ctx.entity(
                            name,
                            name,
                            EntityKind::Module,
                            start_line(child),
                            end_line(child),
                        ));
                    }
                    if let Some(body) = child.child_by_field_name("body") {
                        collect_items(body, ctx, None, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn is_test_function(node: Node<'_>, content: &str) -> bool {
    let mut sibling = node.prev_named_sibling();
    while let Some(attr) = sibling {
        if attr.kind() != "attribute_item" {
            break;
        }
        let attr_text = text(attr, content);
        if attr_text.contains("test") {
            return true;
        }
        sibling = attr.prev_named_sibling();
    }
    false
}

fn strip_generics(name: &str) -> &str {
    name.split('<').next().unwrap_or(name).trim()
}

fn collect_uses(root: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for node in descendants_of(root, &["use_declaration"]) {
        let path = text(node, ctx.content)
            .trim_start_matches("use ")
            .trim_end_matches(';')
            .trim();
        // ignore glob/grouped tails; the head segment is what linkage needs
        let head = path.split(&['{', ' '][..]).next().unwrap_or(path);
        let name = last_segment(head.trim_end_matches("::"));
        if name.is_empty() || name == "*" {
            continue;
        }
        out.raw_refs.push(RawReference {
            from: None,
            name: name.to_string(),
            kind: ReferenceKind::Import,
            line: start_line(node),
        });
    }
}

fn collect_calls(root: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for call in descendants_of(root, &["call_expression"]) {
        let Some(callee) = call.child_by_field_name("function") else {
            continue;
        };
        let raw = match callee.kind() {
            "identifier" => text(callee, ctx.content).to_string(),
            "scoped_identifier" => field_text(callee, "name", ctx.content)
                .unwrap_or_default()
                .to_string(),
            "field_expression" => field_text(callee, "field", ctx.content)
                .unwrap_or_default()
                .to_string(),
            _ => continue,
        };
        if raw.is_empty() {
            continue;
        }
        out.raw_refs.push(RawReference {
            from: None,
            name: raw,
            kind: ReferenceKind::Call,
            line: start_line(call),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::EntityExtractor;
    use repolens_core::models::{EntityKind, RelationshipKind};

    const SOURCE: &str = r#"use std::collections::HashMap;

pub trait Store {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct MemoryStore {
    items: HashMap<String, String>,
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }
}

pub fn lookup(store: &MemoryStore, key: &str) -> Option<String> {
    store.get(key)
}

#[test]
fn test_lookup() {
    let store = MemoryStore { items: Default::default() };
    lookup(&store, "k");
}
"#;

    #[test]
    fn test_rust_entities() {
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/store.rs", SOURCE)
            .unwrap();

        let find = |name: &str| parsed.entities.iter().find(|e| e.name == name).unwrap();
        assert_eq!(find("Store").kind, EntityKind::Trait);
        assert_eq!(find("MemoryStore").kind, EntityKind::Struct);
        assert_eq!(find("lookup").kind, EntityKind::Function);
        assert_eq!(find("test_lookup").kind, EntityKind::Test);

        let get = parsed
            .entities
            .iter()
            .find(|e| e.full_name == "MemoryStore::get")
            .unwrap();
        assert_eq!(get.kind, EntityKind::Method);
    }

    #[test]
    fn test_rust_impl_trait_edge() {
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/store.rs", SOURCE)
            .unwrap();

        let store = parsed.entities.iter().find(|e| e.name == "Store").unwrap();
        let memory = parsed.entities.iter().find(|e| e.name == "MemoryStore").unwrap();
        assert!(parsed.relationships.iter().any(|rel| {
            rel.kind == RelationshipKind::Implementation
                && rel.source_entity_id == memory.entity_id
                && rel.target_entity_id == store.entity_id
        }));
    }

    #[test]
    fn test_rust_call_edge() {
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/store.rs", SOURCE)
            .unwrap();

        let test_fn = parsed.entities.iter().find(|e| e.name == "test_lookup").unwrap();
        let lookup = parsed.entities.iter().find(|e| e.name == "lookup").unwrap();
        assert!(parsed.relationships.iter().any(|rel| {
            rel.kind == RelationshipKind::Calls
                && rel.source_entity_id == test_fn.entity_id
                && rel.target_entity_id == lookup.entity_id
        }));
    }

    #[test]
    fn test_rust_use_reference() {
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/store.rs", SOURCE)
            .unwrap();
        assert!(parsed.references.iter().any(|r| r.name == "HashMap"));
    }
}
