//! Java entity extraction (tree-sitter).

use tree_sitter::Node;

use repolens_core::error::Result;
use repolens_core::models::EntityKind;

use super::treesitter::{
    descendants_of, end_line, field_text, last_segment, name_of, parse_source, start_line, text,
};
use super::{FileContext, LanguageParser, RawParse, RawReference, ReferenceKind};

pub struct JavaParser;

impl LanguageParser for JavaParser {
    fn language(&self) -> &'static str {
        "java"
    }

    fn parse(&self, ctx: &FileContext<'_>) -> Result<RawParse> {
        let tree = parse_source(&tree_sitter_java::language(), ctx.content)?;
        let root = tree.root_node();
        let mut out = RawParse::default();

        collect_types(root, ctx, &mut out);

        for node in descendants_of(root, &["import_declaration"]) {
            let path = text(node, ctx.content)
                .trim_start_matches("import ")
                .trim_start_matches("static ")
                .trim_end_matches(';')
                .trim();
            let name = last_segment(path);
            if !name.is_empty() && name != "*" {
                out.raw_refs.push(RawReference {
                    from: None,
                    name: name.to_string(),
                    kind: ReferenceKind::Import,
                    line: start_line(node),
                });
            }
        }

        for call in descendants_of(root, &["method_invocation"]) {
            if let Some(name) = name_of(call, ctx.content) {
                out.raw_refs.push(RawReference {
                    from: None,
                    name: name.to_string(),
                    kind: ReferenceKind::Call,
                    line: start_line(call),
                });
            }
        }

        Ok(out)
    }
}

fn collect_types(node: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for i in 0..node.named_child_count() {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        match child.kind() {
            "class_declaration" | "interface_declaration" | "enum_declaration" => {
                if let Some(name) = name_of(child, ctx.content) {
                    let kind = match child.kind() {
                        "class_declaration" => EntityKind::Class,
                        "interface_declaration" => EntityKind::Interface,
                        _ => EntityKind::Enum,
                    };
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        kind,
                        start_line(child),
                        end_line(child),
                    ));

                    if let Some(superclass) = child.child_by_field_name("superclass") {
                        let super_name =
                            last_segment(text(superclass, ctx.content).trim_start_matches("extends").trim());
                        if !super_name.is_empty() {
                            out.raw_refs.push(RawReference {
                                from: Some(name.to_string()),
                                name: super_name.to_string(),
                                kind: ReferenceKind::Inherit,
                                line: start_line(superclass),
                            });
                        }
                    }
                    if let Some(interfaces) = child.child_by_field_name("interfaces") {
                        for ident in descendants_of(interfaces, &["type_identifier"]) {
                            out.raw_refs.push(RawReference {
                                from: Some(name.to_string()),
                                name: text(ident, ctx.content).to_string(),
                                kind: ReferenceKind::Implement,
                                line: start_line(ident),
                            });
                        }
                    }

                    if let Some(body) = child.child_by_field_name("body") {
                        collect_members(body, ctx, name, out);
                        // nested types
                        collect_types(body, ctx, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn collect_members(body: Node<'_>, ctx: &FileContext<'_>, owner: &str, out: &mut RawParse) {
    for i in 0..body.named_child_count() {
        let Some(member) = body.named_child(i) else {
            continue;
        };
        match member.kind() {
            "method_declaration" | "constructor_declaration" => {
                if let Some(name) = name_of(member, ctx.content) {
                    let is_test = has_test_annotation(member, ctx.content);
                    out.entities.push(ctx.entity(
                        name,
                        &format!("{owner}.{name}"),
                        if is_test {
                            EntityKind::Test
                        } else {
                            EntityKind::Method
                        },
                        start_line(member),
                        end_line(member),
                    ));
                }
            }
            "field_declaration" => {
                for declarator in descendants_of(member, &["variable_declarator"]) {
                    if let Some(name) = name_of(declarator, ctx.content) {
                        out.entities.push(ctx.entity(
                            name,
                            &format!("{owner}.{name}"),
                            EntityKind::Field,
                            start_line(member),
                            end_line(member),
                        ));
                        // field type couples the owner to it
                        if let Some(ty) = field_text(member, "type", ctx.content) {
                            let ty = last_segment(ty.split('<').next().unwrap_or(ty));
                            if ty.chars().next().is_some_and(|c| c.is_uppercase()) {
                                out.raw_refs.push(RawReference {
                                    from: Some(owner.to_string()),
                                    name: ty.to_string(),
                                    kind: ReferenceKind::TypeUse,
                                    line: start_line(member),
                                });
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn has_test_annotation(member: Node<'_>, content: &str) -> bool {
    descendants_of(member, &["marker_annotation", "annotation"])
        .iter()
        .any(|a| text(*a, content).contains("Test"))
}
