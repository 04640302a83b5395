//! Shared tree-sitter plumbing for the language parsers.

use tree_sitter::{Language, Node, Parser, Tree};

use repolens_core::error::{Error, Result};

pub fn parse_source(language: &Language, content: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| Error::permanent(format!("failed to load grammar: {e}")))?;
    parser
        .parse(content, None)
        .ok_or_else(|| Error::permanent("tree-sitter returned no tree"))
}

pub fn text<'a>(node: Node<'_>, content: &'a str) -> &'a str {
    node.utf8_text(content.as_bytes()).unwrap_or("")
}

/// Text of the `name` field, when present.
pub fn name_of<'a>(node: Node<'_>, content: &'a str) -> Option<&'a str> {
    node.child_by_field_name("name").map(|n| text(n, content))
}

pub fn field_text<'a>(node: Node<'_>, field: &str, content: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| text(n, content))
}

pub fn start_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

pub fn end_line(node: Node<'_>) -> usize {
    node.end_position().row + 1
}

/// Depth-first visit of every named node.
pub fn visit<'t>(node: Node<'t>, f: &mut impl FnMut(Node<'t>)) {
    f(node);
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            visit(child, f);
        }
    }
}

/// Collect all named descendants of the given kinds.
pub fn descendants_of<'t>(node: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    visit(node, &mut |n| {
        if kinds.contains(&n.kind()) {
            found.push(n);
        }
    });
    found
}

/// Named top-level children of the root.
pub fn top_level<'t>(root: Node<'t>) -> Vec<Node<'t>> {
    (0..root.named_child_count())
        .filter_map(|i| root.named_child(i))
        .collect()
}

/// Last segment of a dotted / path-like name (`a.b.C` -> `C`).
pub fn last_segment(name: &str) -> &str {
    name.trim_end_matches(['"', '\''])
        .trim_start_matches(['"', '\''])
        .rsplit(['.', ':', '/'])
        .next()
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_walk_python() {
        let tree = parse_source(&tree_sitter_python::language(), "def f():\n    pass\n").unwrap();
        let root = tree.root_node();
        assert_eq!(root.kind(), "module");

        let functions = descendants_of(root, &["function_definition"]);
        assert_eq!(functions.len(), 1);
        assert_eq!(name_of(functions[0], "def f():\n    pass\n"), Some("f"));
        assert_eq!(start_line(functions[0]), 1);
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("a.b.C"), "C");
        assert_eq!(last_segment("\"react-dom/client\""), "client");
        assert_eq!(last_segment("std::collections::HashMap"), "HashMap");
        assert_eq!(last_segment("plain"), "plain");
    }
}
