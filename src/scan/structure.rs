//! Structure outlines: function/class names with line ranges.
//!
//! Rust files get a real syntax tree via tree-sitter, which yields exact
//! end lines for items. Every other language falls back to line-anchored
//! regex patterns, which find names and start lines but cannot see block
//! extents.

use std::fs;
use std::path::Path;

use regex::Regex;
use tree_sitter::{Node, Parser};

use crate::scan::detect_language;

/// One item in a structure outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureItem {
    /// Item name.
    pub name: String,
    /// Item kind: `function`, `method`, `class`, or `type`.
    pub kind: &'static str,
    /// 1-indexed start line.
    pub start_line: usize,
    /// 1-indexed end line (equals `start_line` for regex-derived items).
    pub end_line: usize,
}

/// Extracts the structure outline for a file.
///
/// Unreadable files and parse failures yield an empty outline; the scanner
/// treats that the same as a structureless file.
#[must_use]
pub fn extract_structure(path: &Path) -> Vec<StructureItem> {
    let Ok(source) = fs::read_to_string(path) else {
        return Vec::new();
    };
    extract_structure_from_source(&source, detect_language(path))
}

/// Extracts the outline from in-memory source, keyed by language name.
#[must_use]
pub fn extract_structure_from_source(source: &str, language: &str) -> Vec<StructureItem> {
    let mut items = match language {
        "rust" => extract_rust(source).unwrap_or_else(|| extract_generic(source)),
        "python" => extract_python(source),
        "javascript" | "typescript" => extract_js_ts(source),
        "go" => extract_go(source),
        "java" | "kotlin" | "csharp" | "scala" => extract_java_like(source),
        "ruby" => extract_ruby(source),
        _ => extract_generic(source),
    };
    items.sort_by_key(|i| i.start_line);
    items
}

/// Syntax-tree extraction for Rust. Returns `None` when the parser cannot
/// be constructed or the tree is unusable.
fn extract_rust(source: &str) -> Option<Vec<StructureItem>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_rust::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;

    let mut items = Vec::new();
    collect_rust_items(tree.root_node(), source.as_bytes(), &mut items);
    Some(items)
}

fn collect_rust_items(node: Node<'_>, source: &[u8], items: &mut Vec<StructureItem>) {
    let kind = match node.kind() {
        "function_item" => Some("function"),
        "struct_item" | "enum_item" | "trait_item" => Some("type"),
        _ => None,
    };

    if let Some(kind) = kind {
        if let Some(name_node) = node.child_by_field_name("name") {
            if let Ok(name) = name_node.utf8_text(source) {
                items.push(StructureItem {
                    name: name.to_string(),
                    kind,
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                });
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_rust_items(child, source, items);
    }
}

fn match_lines(source: &str, patterns: &[(Regex, &'static str)]) -> Vec<StructureItem> {
    let mut items = Vec::new();
    for (i, line) in source.lines().enumerate() {
        for (pattern, kind) in patterns {
            if let Some(caps) = pattern.captures(line) {
                if let Some(name) = caps.get(1) {
                    items.push(StructureItem {
                        name: name.as_str().to_string(),
                        kind,
                        start_line: i + 1,
                        end_line: i + 1,
                    });
                    break;
                }
            }
        }
    }
    items
}

fn extract_python(source: &str) -> Vec<StructureItem> {
    let patterns = [
        (
            Regex::new(r"^\s*class\s+(\w+)").expect("static pattern"),
            "class",
        ),
        (
            Regex::new(r"^\s*(?:async\s+)?def\s+(\w+)").expect("static pattern"),
            "function",
        ),
    ];
    match_lines(source, &patterns)
}

fn extract_js_ts(source: &str) -> Vec<StructureItem> {
    let patterns = [
        (
            Regex::new(r"^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)")
                .expect("static pattern"),
            "function",
        ),
        (
            Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?(?:\(|[a-zA-Z])")
                .expect("static pattern"),
            "function",
        ),
        (
            Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?class\s+(\w+)").expect("static pattern"),
            "class",
        ),
        (
            Regex::new(r"^\s+(?:async\s+)?(\w+)\s*\(").expect("static pattern"),
            "method",
        ),
    ];
    match_lines(source, &patterns)
}

fn extract_go(source: &str) -> Vec<StructureItem> {
    let patterns = [
        (
            Regex::new(r"^func\s+(?:\([^)]+\)\s+)?(\w+)\s*\(").expect("static pattern"),
            "function",
        ),
        (
            Regex::new(r"^type\s+(\w+)\s+(?:struct|interface)").expect("static pattern"),
            "type",
        ),
    ];
    match_lines(source, &patterns)
}

/// Shared extraction for Java, Kotlin, C#, and Scala. Keyword-led control
/// flow is filtered out of the method matches.
fn extract_java_like(source: &str) -> Vec<StructureItem> {
    let class_re = Regex::new(
        r"^\s*(?:public|private|protected|internal|abstract|final|open|data|sealed)?\s*(?:static\s+)?(?:class|interface|enum|object|record)\s+(\w+)",
    )
    .expect("static pattern");
    let method_re = Regex::new(
        r"^\s+(?:public|private|protected|internal|override|abstract|final|open|static|suspend|fun)?\s*(?:static\s+)?(?:\w+(?:<[^>]+>)?\s+)?(\w+)\s*\(",
    )
    .expect("static pattern");
    const NOT_METHODS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "new"];

    let mut items = Vec::new();
    for (i, line) in source.lines().enumerate() {
        if let Some(caps) = class_re.captures(line) {
            items.push(StructureItem {
                name: caps[1].to_string(),
                kind: "class",
                start_line: i + 1,
                end_line: i + 1,
            });
            continue;
        }
        if let Some(caps) = method_re.captures(line) {
            let name = caps[1].to_string();
            if !NOT_METHODS.contains(&name.as_str()) {
                items.push(StructureItem {
                    name,
                    kind: "method",
                    start_line: i + 1,
                    end_line: i + 1,
                });
            }
        }
    }
    items
}

fn extract_ruby(source: &str) -> Vec<StructureItem> {
    let patterns = [
        (
            Regex::new(r"^\s*(?:class|module)\s+(\w+)").expect("static pattern"),
            "class",
        ),
        (
            Regex::new(r"^\s*def\s+(\w+[?!]?)").expect("static pattern"),
            "method",
        ),
    ];
    match_lines(source, &patterns)
}

fn extract_generic(source: &str) -> Vec<StructureItem> {
    let patterns = [
        (
            Regex::new(r"^\s*(?:def|func|function|fn|sub|proc)\s+(\w+)").expect("static pattern"),
            "function",
        ),
        (
            Regex::new(r"^\s*(?:class|struct|enum|type|interface|trait|module)\s+(\w+)")
                .expect("static pattern"),
            "type",
        ),
    ];
    match_lines(source, &patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_outline_has_exact_ranges() {
        let source = "\
fn top() {
    let x = 1;
    let _ = x;
}

struct Widget {
    size: u32,
}

impl Widget {
    fn area(&self) -> u32 {
        self.size * self.size
    }
}
";
        let items = extract_structure_from_source(source, "rust");
        let top = items.iter().find(|i| i.name == "top").unwrap();
        assert_eq!(top.kind, "function");
        assert_eq!((top.start_line, top.end_line), (1, 4));

        let widget = items.iter().find(|i| i.name == "Widget").unwrap();
        assert_eq!(widget.kind, "type");
        assert_eq!((widget.start_line, widget.end_line), (6, 8));

        let area = items.iter().find(|i| i.name == "area").unwrap();
        assert_eq!((area.start_line, area.end_line), (11, 13));
    }

    #[test]
    fn test_python_outline() {
        let source = "class Runner:\n    def go(self):\n        pass\n\nasync def main():\n    pass\n";
        let items = extract_structure_from_source(source, "python");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].name, "Runner");
        assert_eq!(items[0].kind, "class");
        assert_eq!(items[2].name, "main");
        assert_eq!(items[2].start_line, 5);
    }

    #[test]
    fn test_go_outline() {
        let source = "func (s *Server) Handle(w http.ResponseWriter) {\n}\ntype Server struct {\n}\n";
        let items = extract_structure_from_source(source, "go");
        assert_eq!(items[0].name, "Handle");
        assert_eq!(items[1].name, "Server");
    }

    #[test]
    fn test_java_like_filters_keywords() {
        let source = "public class App {\n    if (ready) {\n    public void run() {\n}\n";
        let items = extract_structure_from_source(source, "java");
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"App"));
        assert!(names.contains(&"run"));
        assert!(!names.contains(&"if"));
    }

    #[test]
    fn test_generic_fallback() {
        let source = "sub greet\nend\n";
        let items = extract_structure_from_source(source, "perl-ish");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "greet");
    }

    #[test]
    fn test_items_sorted_by_line() {
        let source = "def b():\n    pass\n\nclass A:\n    pass\n";
        let items = extract_structure_from_source(source, "python");
        assert!(items.windows(2).all(|w| w[0].start_line <= w[1].start_line));
    }
}
