//! Cyclomatic complexity estimate from branch-indicator counts.

/// Branch/loop/guard indicators per language family. The score is
/// `1 + indicator count`, the classic cyclomatic lower bound.
fn indicators(language: &str) -> &'static [&'static str] {
    match language {
        "python" => &[
            "if ", "elif ", "for ", "while ", "except", " and ", " or ", "case ",
        ],
        "rust" => &[
            "if ", "else if", "for ", "while ", "match ", "=> ", "&&", "||", "?",
        ],
        "go" => &["if ", "for ", "switch ", "case ", "select ", "&&", "||"],
        "java" | "csharp" => &[
            "if ", "else if", "for ", "while ", "switch ", "case ", "catch", "&&", "||", "?",
        ],
        _ => &[
            "if ", "else if", "for ", "while ", "switch ", "case ", "catch", "&&", "||",
        ],
    }
}

pub fn score(content: &str, language: &str) -> f64 {
    let mut count = 0usize;
    for indicator in indicators(language) {
        count += content.matches(indicator).count();
    }
    1.0 + count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_line_code_is_one() {
        assert_eq!(score("x = 1\ny = 2\n", "python"), 1.0);
    }

    #[test]
    fn test_branches_increase_score() {
        let body = "if a:\n    pass\nelif b:\n    pass\nfor i in xs:\n    pass\n";
        assert!(score(body, "python") >= 4.0);
    }

    #[test]
    fn test_language_specific_indicators() {
        let rust_body = "match x {\n    A => 1,\n    B => 2,\n}\n";
        assert!(score(rust_body, "rust") > score(rust_body, "go"));
    }
}
