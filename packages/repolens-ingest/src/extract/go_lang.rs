//! Go entity extraction (tree-sitter).

use tree_sitter::Node;

use repolens_core::error::Result;
use repolens_core::models::EntityKind;

use super::treesitter::{
    descendants_of, end_line, field_text, last_segment, name_of, parse_source, start_line, text,
};
use super::{FileContext, LanguageParser, RawParse, RawReference, ReferenceKind};

pub struct GoParser;

impl LanguageParser for GoParser {
    fn language(&self) -> &'static str {
        "go"
    }

    fn parse(&self, ctx: &FileContext<'_>) -> Result<RawParse> {
        let tree = parse_source(&tree_sitter_go::language(), ctx.content)?;
        let root = tree.root_node();
        let mut out = RawParse::default();
        let is_test_file = ctx.file_path.ends_with("_test.go");

        for child in super::treesitter::top_level(root) {
            match child.kind() {
                "type_declaration" => {
                    for spec in descendants_of(child, &["type_spec"]) {
                        let Some(name) = name_of(spec, ctx.content) else {
                            continue;
                        };
                        let kind = match spec.child_by_field_name("type").map(|t| t.kind()) {
                            Some("struct_type") => EntityKind::Struct,
                            Some("interface_type") => EntityKind::Interface,
                            _ => EntityKind::TypeAlias,
                        };
                        out.entities.push(ctx.entity(
                            name,
                            name,
                            kind,
                            start_line(child),
                            end_line(child),
                        ));
                    }
                }
                "function_declaration" => {
                    if let Some(name) = name_of(child, ctx.content) {
                        let kind = if is_test_file && name.starts_with("Test") {
                            EntityKind::Test
                        } else {
                            EntityKind::Function
                        };
                        out.entities.push(ctx.entity(
                            name,
                            name,
                            kind,
                            start_line(child),
                            end_line(child),
                        ));
                    }
                }
                "method_declaration" => {
                    if let Some(name) = name_of(child, ctx.content) {
                        let receiver = receiver_type(child, ctx.content).unwrap_or_default();
                        let full_name = if receiver.is_empty() {
                            name.to_string()
                        } else {
                            format!("{receiver}.{name}")
                        };
                        out.entities.push(ctx.entity(
                            name,
                            &full_name,
                            EntityKind::Method,
                            start_line(child),
                            end_line(child),
                        ));
                        if !receiver.is_empty() {
                            // method belongs to its receiver type
                            out.raw_refs.push(RawReference {
                                from: Some(name.to_string()),
                                name: receiver,
                                kind: ReferenceKind::TypeUse,
                                line: start_line(child),
                            });
                        }
                    }
                }
                "import_declaration" => {
                    for spec in descendants_of(child, &["import_spec"]) {
                        if let Some(path) = field_text(spec, "path", ctx.content) {
                            out.raw_refs.push(RawReference {
                                from: None,
                                name: last_segment(path).to_string(),
                                kind: ReferenceKind::Import,
                                line: start_line(spec),
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        for call in descendants_of(root, &["call_expression"]) {
            let Some(callee) = call.child_by_field_name("function") else {
                continue;
            };
            let name = match callee.kind() {
                "identifier" => text(callee, ctx.content).to_string(),
                "selector_expression" => field_text(callee, "field", ctx.content)
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

        Ok(out)
    }
}

fn receiver_type(method: Node<'_>, content: &str) -> Option<String> {
    let receiver = method.child_by_field_name("receiver")?;
    let declaration = descendants_of(receiver, &["parameter_declaration"])
        .into_iter()
        .next()?;
    let ty = declaration.child_by_field_name("type")?;
    Some(text(ty, content).trim_start_matches(['*', '&']).to_string())
}
