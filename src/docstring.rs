//! Failure signals documented in docstrings.
//!
//! Recognizes reStructuredText field lists of the form
//!
//! ```text
//! :raises HTTPException: 401 Invalid token
//!     (continued on deeper indented lines)
//! :raise HTTPException: 404 User not found
//! ```

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::reader::CallableSource;
use crate::signal::{FailureSignal, OriginKind, SignalOrigin};
use crate::type_resolver::FailureTypeResolver;
use log::debug;
use regex::Regex;
use tree_sitter::Node;

/// Extracts `:raises <Type>: <code> <description>` annotations.
pub struct DocstringExtractor {
    tag_line: Regex,
    type_names: Vec<String>,
}

/// A docstring line with its 0-based offset from the first line of the literal.
#[derive(Debug, PartialEq)]
struct DocLine {
    offset: usize,
    text: String,
}

impl DocstringExtractor {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let tags = config
            .docstring_tags
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"^:(?:{})\s+([\w.]+)\s*:\s*(\S+)(?:\s+(.*))?$", tags);
        let tag_line = Regex::new(&pattern)
            .map_err(|e| Error::InvalidArgument(format!("docstring tags: {}", e)))?;

        Ok(Self {
            tag_line,
            type_names: config
                .failure_type_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    /// Signals documented in the docstring of `source`, in docstring order.
    pub fn extract(
        &self,
        source: &CallableSource,
        resolver: &FailureTypeResolver,
    ) -> Vec<FailureSignal> {
        let Some((docstring, first_line)) = docstring(source) else {
            return Vec::new();
        };

        let lines = cleandoc(&docstring);
        let mut signals = Vec::new();
        let mut index = 0;
        while index < lines.len() {
            let line = &lines[index];
            index += 1;

            let Some(caps) = self.tag_line.captures(line.text.trim_start()) else {
                continue;
            };
            let type_name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let code = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

            if !self.is_failure_type(type_name, source, resolver) {
                debug!("Ignoring docstring tag for {} in {}", type_name, source.callable);
                continue;
            }
            let Some(status_code) = parse_code(code) else {
                debug!(
                    "Malformed docstring tag in {}: {:?} is not a status code",
                    source.callable, code
                );
                continue;
            };

            let mut parts: Vec<String> = caps
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect();

            let tag_indent = indent_of(&line.text);
            while let Some(next) = lines.get(index) {
                if next.text.trim().is_empty() || indent_of(&next.text) <= tag_indent {
                    break;
                }
                parts.push(next.text.trim().to_string());
                index += 1;
            }

            let description = parts.join(" ");
            signals.push(FailureSignal {
                status_code,
                description: Some(description).filter(|d| !d.is_empty()),
                headers: None,
                origin: SignalOrigin {
                    kind: OriginKind::Docstring,
                    callable: source.callable.clone(),
                    line: first_line + line.offset,
                },
            });
        }
        signals
    }

    fn is_failure_type(
        &self,
        type_name: &str,
        source: &CallableSource,
        resolver: &FailureTypeResolver,
    ) -> bool {
        self.type_names.iter().any(|n| n == type_name)
            || resolver.is_failure_type(type_name, source)
    }
}

/// The cleaned docstring of a callable, as FastAPI shows it in an operation description.
pub fn docstring_text(source: &CallableSource) -> Option<String> {
    let (raw, _) = docstring(source)?;
    let text = cleandoc(&raw)
        .into_iter()
        .map(|line| line.text)
        .collect::<Vec<_>>()
        .join("\n");
    Some(text).filter(|t| !t.is_empty())
}

/// A 3 to 5 digit status code.
fn parse_code(token: &str) -> Option<u32> {
    if (3..=5).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Raw docstring text of a callable and the 1-based line it starts on.
fn docstring(source: &CallableSource) -> Option<(String, usize)> {
    let body = source.body()?;
    let mut cursor = body.walk();
    let first: Node = body
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if !matches!(literal.kind(), "string" | "concatenated_string") {
        return None;
    }
    let text = source.module.string_value(literal)?;
    Some((text, literal.start_position().row + 1))
}

/// Cleans a docstring the way `inspect.cleandoc` does, remembering each line's offset.
///
/// Tabs are expanded, the first line loses its leading whitespace, the common indentation of
/// the remaining lines is removed, and leading and trailing blank lines are dropped.
fn cleandoc(doc: &str) -> Vec<DocLine> {
    let raw: Vec<String> = doc.lines().map(expand_tabs).collect();

    let margin = raw
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);

    let mut lines: Vec<DocLine> = raw
        .iter()
        .enumerate()
        .map(|(offset, line)| {
            let text = if offset == 0 {
                line.trim_start().to_string()
            } else if line.len() >= margin {
                line[margin..].trim_end().to_string()
            } else {
                line.trim().to_string()
            };
            DocLine { offset, text }
        })
        .collect();

    while lines.last().is_some_and(|l| l.text.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines
        .iter()
        .take_while(|l| l.text.trim().is_empty())
        .count();
    lines.drain(..leading);
    lines
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if c == '\t' {
            let pad = 8 - out.chars().count() % 8;
            out.extend(std::iter::repeat(' ').take(pad));
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedModule;
    use crate::reader::{CallableRef, SourceReader};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn extract(modules: &[(&str, &str)], module: &str, qualname: &str) -> Vec<FailureSignal> {
        let reader = Arc::new(SourceReader::new(
            modules
                .iter()
                .map(|(name, code)| ParsedModule::from_source(name, code).unwrap())
                .collect(),
        ));
        let config = AnalysisConfig::default();
        let resolver = FailureTypeResolver::new(Arc::clone(&reader), &config.failure_types);
        let extractor = DocstringExtractor::new(&config).unwrap();
        let source = reader.read(&CallableRef::new(module, qualname)).unwrap();
        extractor.extract(&source, &resolver)
    }

    fn summary(signals: &[FailureSignal]) -> Vec<(u32, Option<String>)> {
        signals
            .iter()
            .map(|s| (s.status_code, s.description.clone()))
            .collect()
    }

    #[test]
    fn test_raise_and_raises_tags_with_continuation() {
        let code = r#"
def dep() -> None:
    """
    Some description

    :raise HTTPException: 601 First
    :raises HTTPException: 602 Second
    :raises HTTPException: 603
     Third
    """
    pass
"#;
        let signals = extract(&[("app.deps", code)], "app.deps", "dep");

        assert_eq!(
            summary(&signals),
            vec![
                (601, Some("First".to_string())),
                (602, Some("Second".to_string())),
                (603, Some("Third".to_string())),
            ]
        );
        assert_eq!(signals[0].origin.line, 6);
        assert_eq!(signals[0].origin.kind, OriginKind::Docstring);
    }

    #[test]
    fn test_multi_line_description_ends_at_blank_line() {
        let code = r#"
def auth_user(token: int) -> int:
    """
    Authenticate user

    :raises HTTPException: 401 Invalid token
     (less than 100)
    :raises HTTPException: 403 You are banned

        Not part of the description.
    :param token: User token
    """
"#;
        let signals = extract(&[("app.deps", code)], "app.deps", "auth_user");

        assert_eq!(
            summary(&signals),
            vec![
                (401, Some("Invalid token (less than 100)".to_string())),
                (403, Some("You are banned".to_string())),
            ]
        );
    }

    #[test]
    fn test_tags_indented_under_a_section_header() {
        let code = r#"
def dep():
    """Summary.

    Raises:
        :raises HTTPException: 404 Not found
            when the item is gone
        :raises HTTPException: 409 Conflict
    Returns:
        Nothing.
    """
"#;
        let signals = extract(&[("app.deps", code)], "app.deps", "dep");

        assert_eq!(
            summary(&signals),
            vec![
                (404, Some("Not found when the item is gone".to_string())),
                (409, Some("Conflict".to_string())),
            ]
        );
        assert_eq!(signals[0].origin.line, 6);
    }

    #[test]
    fn test_malformed_and_foreign_tags_are_skipped() {
        let code = r#"
def dep():
    """Check things.

    :raises HTTPException: NOT_FOUND Missing
    :raises HTTPException: 42 Too short
    :raises ValueError: 400 Not an HTTP failure
    :raises HTTPException: 410
    :return: nothing
    """
"#;
        let signals = extract(&[("app.deps", code)], "app.deps", "dep");

        assert_eq!(summary(&signals), vec![(410, None)]);
    }

    #[test]
    fn test_custom_type_in_tag() {
        let errors = "from fastapi import HTTPException\nclass Denied(HTTPException):\n    pass\n";
        let code = r#"
from app.errors import Denied

def dep():
    """:raises Denied: 403 Access denied"""
"#;
        let signals = extract(&[("app.errors", errors), ("app.deps", code)], "app.deps", "dep");

        assert_eq!(summary(&signals), vec![(403, Some("Access denied".to_string()))]);
        assert_eq!(signals[0].origin.line, 5);
    }

    #[test]
    fn test_no_docstring() {
        let code = "def dep():\n    x = \":raises HTTPException: 400 Nope\"\n";
        assert!(extract(&[("app.deps", code)], "app.deps", "dep").is_empty());
    }

    #[test]
    fn test_cleandoc() {
        let lines = cleandoc("  Title\n\n      indented\n    body\n\n");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();

        assert_eq!(texts, vec!["Title", "", "  indented", "body"]);
        assert_eq!(lines[2].offset, 2);
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("404"), Some(404));
        assert_eq!(parse_code("60001"), Some(60001));
        assert_eq!(parse_code("40"), None);
        assert_eq!(parse_code("4x4"), None);
        assert_eq!(parse_code("600000"), None);
    }
}
