//! TypeScript / TSX entity extraction (tree-sitter).

use tree_sitter::Node;

use repolens_core::error::Result;
use repolens_core::models::EntityKind;

use super::treesitter::{
    descendants_of, end_line, field_text, last_segment, name_of, parse_source, start_line, text,
};
use super::{FileContext, LanguageParser, RawParse, RawReference, ReferenceKind};

pub struct TypeScriptParser;

impl LanguageParser for TypeScriptParser {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn parse(&self, ctx: &FileContext<'_>) -> Result<RawParse> {
        let grammar = if ctx.file_path.ends_with(".tsx") {
            tree_sitter_typescript::language_tsx()
        } else {
            tree_sitter_typescript::language_typescript()
        };
        let tree = parse_source(&grammar, ctx.content)?;
        let root = tree.root_node();
        let mut out = RawParse::default();

        collect_declarations(root, ctx, &mut out);
        collect_imports(root, ctx, &mut out);
        collect_calls(root, ctx, &mut out);

        Ok(out)
    }
}

fn collect_declarations(node: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for i in 0..node.named_child_count() {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        match child.kind() {
            "class_declaration" | "abstract_class_declaration" => {
                if let Some(name) = name_of(child, ctx.content) {
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        EntityKind::Class,
                        start_line(child),
                        end_line(child),
                    ));
                    collect_heritage(child, ctx, name, out);
                    if let Some(body) = child.child_by_field_name("body") {
                        collect_methods(body, ctx, name, out);
                    }
                }
            }
            "interface_declaration" => {
                if let Some(name) = name_of(child, ctx.content) {
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        EntityKind::Interface,
                        start_line(child),
                        end_line(child),
                    ));
                }
            }
            "enum_declaration" => {
                if let Some(name) = name_of(child, ctx.content) {
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        EntityKind::Enum,
                        start_line(child),
                        end_line(child),
                    ));
                }
            }
            "type_alias_declaration" => {
                if let Some(name) = name_of(child, ctx.content) {
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        EntityKind::TypeAlias,
                        start_line(child),
                        end_line(child),
                    ));
                }
            }
            "function_declaration" => {
                if let Some(name) = name_of(child, ctx.content) {
                    out.entities.push(ctx.entity(
                        name,
                        name,
                        EntityKind::Function,
                        start_line(child),
                        end_line(child),
                    ));
                }
            }
            // `const f = (...) => ...` / `export const f = ...`
            "lexical_declaration" => {
                for decl in descendants_of(child, &["variable_declarator"]) {
                    let is_fn = decl
                        .child_by_field_name("value")
                        .map(|v| matches!(v.kind(), "arrow_function" | "function_expression"))
                        .unwrap_or(false);
                    if is_fn {
                        if let Some(name) = name_of(decl, ctx.content) {
                            out.entities.push(ctx.entity(
                                name,
                                name,
                                EntityKind::Function,
                                start_line(decl),
                                end_line(decl),
                            ));
                        }
                    }
                }
            }
            "export_statement" => {
                collect_declarations(child, ctx, out);
            }
            _ => {}
        }
    }
}

fn collect_heritage(class: Node<'_>, ctx: &FileContext<'_>, class_name: &str, out: &mut RawParse) {
    for clause in descendants_of(class, &["extends_clause", "implements_clause"]) {
        let kind = if clause.kind() == "extends_clause" {
            ReferenceKind::Inherit
        } else {
            ReferenceKind::Implement
        };
        for ident in descendants_of(clause, &["identifier", "type_identifier"]) {
            out.raw_refs.push(RawReference {
                from: Some(class_name.to_string()),
                name: text(ident, ctx.content).to_string(),
                kind,
                line: start_line(ident),
            });
        }
    }
}

fn collect_methods(body: Node<'_>, ctx: &FileContext<'_>, class_name: &str, out: &mut RawParse) {
    for method in descendants_of(body, &["method_definition"]) {
        if let Some(name) = name_of(method, ctx.content) {
            if name == "constructor" {
                continue;
            }
            out.entities.push(ctx.entity(
                name,
                &format!("{class_name}.{name}"),
                EntityKind::Method,
                start_line(method),
                end_line(method),
            ));
        }
    }
}

fn collect_imports(root: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for node in descendants_of(root, &["import_statement"]) {
        if let Some(source) = field_text(node, "source", ctx.content) {
            out.raw_refs.push(RawReference {
                from: None,
                name: last_segment(source).to_string(),
                kind: ReferenceKind::Import,
                line: start_line(node),
            });
        }
    }
}

fn collect_calls(root: Node<'_>, ctx: &FileContext<'_>, out: &mut RawParse) {
    for call in descendants_of(root, &["call_expression"]) {
        let Some(callee) = call.child_by_field_name("function") else {
            continue;
        };
        let name = match callee.kind() {
            "identifier" => text(callee, ctx.content).to_string(),
            "member_expression" => field_text(callee, "property", ctx.content)
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

#[cfg(test)]
mod tests {
    use super::super::EntityExtractor;
    use repolens_core::models::{EntityKind, RelationshipKind};

    const SOURCE: &str = r#"import { api } from "./api";

export interface Session {
    token: string;
}

export class AuthService {
    login(user: string): Session {
        return issueToken(user);
    }
}

export class AdminAuthService extends AuthService {
}

export function issueToken(user: string): Session {
    return { token: user };
}

export const revoke = (token: string) => {
    api.post(token);
};
"#;

    #[test]
    fn test_typescript_entities() {
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/auth.ts", SOURCE)
            .unwrap();

        let find = |name: &str| parsed.entities.iter().find(|e| e.name == name).unwrap();
        assert_eq!(find("Session").kind, EntityKind::Interface);
        assert_eq!(find("AuthService").kind, EntityKind::Class);
        assert_eq!(find("login").full_name, "AuthService.login");
        assert_eq!(find("issueToken").kind, EntityKind::Function);
        assert_eq!(find("revoke").kind, EntityKind::Function);
    }

    #[test]
    fn test_typescript_extends_edge() {
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/auth.ts", SOURCE)
            .unwrap();

        let admin = parsed
            .entities
            .iter()
            .find(|e| e.name == "AdminAuthService")
            .unwrap();
        let base = parsed.entities.iter().find(|e| e.name == "AuthService").unwrap();
        assert!(parsed.relationships.iter().any(|rel| {
            rel.kind == RelationshipKind::Inheritance
                && rel.source_entity_id == admin.entity_id
                && rel.target_entity_id == base.entity_id
        }));
    }

    #[test]
    fn test_typescript_call_edge() {
        let parsed = EntityExtractor::new()
            .parse_file("r", "src/auth.ts", SOURCE)
            .unwrap();

        let login = parsed.entities.iter().find(|e| e.name == "login").unwrap();
        let issue = parsed.entities.iter().find(|e| e.name == "issueToken").unwrap();
        assert!(parsed.relationships.iter().any(|rel| {
            rel.kind == RelationshipKind::Calls
                && rel.source_entity_id == login.entity_id
                && rel.target_entity_id == issue.entity_id
        }));
    }
}
