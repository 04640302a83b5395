//! Python entity extraction (tree-sitter).

use tree_sitter::Node;

use repolens_core::error::Result;
use repolens_core::models::EntityKind;

use super::treesitter::{
    descendants_of, end_line, field_text, last_segment, name_of, parse_source, start_line, text,
};
use super::{FileContext, LanguageParser, RawParse, RawReference, ReferenceKind};

pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn parse(&self, ctx: &FileContext<'_>) -> Result<RawParse> {
        let tree = parse_source(&tree_sitter_python::language(), ctx.content)?;
        let root = tree.root_node();
        let mut out = RawParse::default();

        collect_definitions(root, ctx, None, &mut out);
        collect_imports(root, ctx, &mut out);
        collect_calls(root, ctx, &mut out);

        Ok(out)
    }
}

fn collect_definitions(
    node: Node<'_>,
    ctx: &FileContext<'_>,
    enclosing_class: Option<&str>,
    out: &mut RawParse,
) {
    for i in 0..node.named_child_count() {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        match child.kind() {
            "class_definition" => {
                if let Some(name) = name_of(child, ctx.content) {
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        EntityKind::Class,
                        start_line(child),
                        end_line(child),
                    ));
                    // base classes
                    if let Some(bases) = child.child_by_field_name("superclasses") {
                        for j in 0..bases.named_child_count() {
                            let Some(base) = bases.named_child(j) else {
                                continue;
                            };
                            let base_name = match base.kind() {
                                "identifier" => text(base, ctx.content).to_string(),
                                "attribute" => field_text(base, "attribute", ctx.content)
                                    .unwrap_or_default()
                                    .to_string(),
                                _ => continue,
                            };
                            if base_name.is_empty() {
                                continue;
                            }
                            out.raw_refs.push(RawReference {
                                from: Some(name.to_string()),
                                name: base_name,
                                kind: ReferenceKind::Inherit,
                                line: start_line(base),
                            });
                        }
                    }
                    if let Some(body) = child.child_by_field_name("body") {
                        collect_definitions(body, ctx, Some(name), out);
                    }
                }
            }
            "function_definition" => {
                if let Some(name) = name_of(child, ctx.content) {
                    let (kind, full_name) = match enclosing_class {
                        Some(class) => (EntityKind::Method, format!("{class}.{name}")),
                        None if name.starts_with("test_") => (EntityKind::Test, name.to_string()),
                        None => (EntityKind::Function, name.to_string()),
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
            "decorated_definition" => {
                collect_definitions(child, ctx, enclosing_class, out);
            }
            _ => {}
        }
    }
}

fn collect_imports(root: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for node in descendants_of(root, &["import_statement", "import_from_statement"]) {
        let targets = match node.kind() {
            // `from a.b import c, d` depends on a.b
            "import_from_statement" => field_text(node, "module_name", ctx.content)
                .map(|m| vec![m.to_string()])
                .unwrap_or_default(),
            // `import a.b, c`
            _ => descendants_of(node, &["dotted_name"])
                .into_iter()
                .map(|n| text(n, ctx.content).to_string())
                .collect(),
        };
        for target in targets {
            out.raw_refs.push(RawReference {
                from: None,
                name: last_segment(&target).to_string(),
                kind: ReferenceKind::Import,
                line: start_line(node),
            });
        }
    }
}

fn collect_calls(root: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for call in descendants_of(root, &["call"]) {
        let Some(callee) = call.child_by_field_name("function") else {
            continue;
        };
        let name = match callee.kind() {
            "identifier" => text(callee, ctx.content).to_string(),
            "attribute" => field_text(callee, "attribute", ctx.content)
                .unwrap_or_default()
                .to_string(),
            _ => continue,
        };
        if name.is_empty() {
            continue;
        }
        out.raw_refs.push(RawReference {
            from: None,
            name,
            kind: ReferenceKind::Call,
            line: start_line(call),
        });
    }
}
