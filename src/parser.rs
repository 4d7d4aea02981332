use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde_json::Value;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

/// AST parser for Python source files.
///
/// The `AstParser` uses tree-sitter with the Python grammar to turn module source into a
/// concrete syntax tree. Tree-sitter recovers from syntax errors, so a module with a broken
/// statement still yields a tree whose intact parts can be analyzed.
///
/// # Example
///
/// ```no_run
/// use fastapi_derive_responses::parser::AstParser;
/// use std::path::Path;
///
/// let parsed = AstParser::parse_file(Path::new("."), Path::new("app/main.py")).unwrap();
/// println!("Parsed module {}", parsed.name);
/// ```
pub struct AstParser;

/// A parsed Python module with its syntax tree.
///
/// Owns the source text so nodes can be turned back into text at any time.
#[derive(Debug)]
pub struct ParsedModule {
    /// Path to the source file
    pub path: PathBuf,
    /// Dotted module name relative to the project root (e.g. `app.routers.users`)
    pub name: String,
    /// Whether the module is a package `__init__.py`
    pub is_package: bool,
    /// Module source text
    pub source: String,
    /// The parsed syntax tree
    pub tree: Tree,
}

impl AstParser {
    /// Parses a single Python source file into a syntax tree.
    ///
    /// The module name is derived from the path of the file relative to `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or tree-sitter refuses to parse it.
    pub fn parse_file(root: &Path, path: &Path) -> Result<ParsedModule> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let (name, is_package) = Self::module_name(root, path);
        let parsed = Self::parse_source(path.to_path_buf(), &name, is_package, content)
            .with_context(|| format!("Failed to parse Python syntax in file: {}", path.display()))?;

        debug!("Successfully parsed module {} from {}", parsed.name, path.display());
        Ok(parsed)
    }

    /// Parses Python source text that is already in memory.
    pub fn parse_source(
        path: PathBuf,
        name: &str,
        is_package: bool,
        source: String,
    ) -> Result<ParsedModule> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| anyhow!("tree-sitter returned no tree for module {}", name))?;

        if tree.root_node().has_error() {
            warn!(
                "Module {} contains syntax errors; analyzing the recoverable parts",
                name
            );
        }

        Ok(ParsedModule {
            path,
            name: name.to_string(),
            is_package,
            source,
            tree,
        })
    }

    /// Parses multiple Python source files, continuing even if some fail.
    ///
    /// Files that fail to parse are logged as warnings, but parsing continues for remaining files.
    pub fn parse_files(root: &Path, paths: &[PathBuf]) -> Vec<Result<ParsedModule>> {
        debug!("Parsing {} files", paths.len());

        let results: Vec<Result<ParsedModule>> = paths
            .iter()
            .map(|path| match Self::parse_file(root, path) {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    Err(e)
                }
            })
            .collect();

        let success_count = results.iter().filter(|r| r.is_ok()).count();
        debug!(
            "Parsing complete: {} succeeded, {} failed",
            success_count,
            results.len() - success_count
        );

        results
    }

    /// Derives the dotted module name of `path` relative to `root`.
    ///
    /// `app/routers/users.py` becomes `app.routers.users`; `app/__init__.py` becomes the
    /// package `app`.
    pub fn module_name(root: &Path, path: &Path) -> (String, bool) {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut parts: Vec<String> = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .filter(|c| !c.is_empty() && c != ".")
            .collect();

        let is_package = parts.last().map(|p| p == "__init__").unwrap_or(false);
        if is_package {
            parts.pop();
        }

        (parts.join("."), is_package)
    }
}

impl ParsedModule {
    /// Builds a module straight from source text, deriving its path from the dotted name.
    pub fn from_source(name: &str, source: &str) -> Result<Self> {
        let path = PathBuf::from(format!("{}.py", name.replace('.', "/")));
        AstParser::parse_source(path, name, false, source.to_string())
    }

    /// The root `module` node.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`.
    pub fn node_text(&self, node: Node) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Finds the node of `kind` spanning exactly `range`.
    pub fn find_node(&self, range: &Range<usize>, kind: &str) -> Option<Node<'_>> {
        let mut node = self
            .root()
            .descendant_for_byte_range(range.start, range.end)?;
        loop {
            if node.kind() == kind && node.byte_range() == *range {
                return Some(node);
            }
            node = node.parent()?;
        }
    }

    /// The package that relative imports in this module are anchored at.
    pub fn package(&self) -> &str {
        if self.is_package {
            &self.name
        } else {
            self.name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
        }
    }

    /// Resolves a relative import (`level` leading dots plus an optional module suffix) to an
    /// absolute dotted module name.
    pub fn resolve_relative(&self, level: usize, suffix: Option<&str>) -> Option<String> {
        let mut base: Vec<&str> = self
            .package()
            .split('.')
            .filter(|p| !p.is_empty())
            .collect();
        for _ in 1..level {
            base.pop()?;
        }
        if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
            base.push(suffix);
        }
        if base.is_empty() {
            None
        } else {
            Some(base.join("."))
        }
    }

    /// Value of a string literal node as written.
    ///
    /// Placeholders of f-strings are kept verbatim; implicitly concatenated literals are joined.
    pub fn string_value(&self, node: Node) -> Option<String> {
        match node.kind() {
            "string" => Some(string_contents(self.node_text(node))),
            "concatenated_string" => {
                let mut cursor = node.walk();
                let parts: Vec<String> = node
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() == "string")
                    .map(|n| string_contents(self.node_text(n)))
                    .collect();
                Some(parts.concat())
            }
            "parenthesized_expression" => node.named_child(0).and_then(|n| self.string_value(n)),
            _ => None,
        }
    }

    /// Value of an integer literal node.
    pub fn int_value(&self, node: Node) -> Option<i64> {
        match node.kind() {
            "integer" => parse_int(self.node_text(node)),
            "unary_operator" => {
                let operand = node.child_by_field_name("argument")?;
                let value = self.int_value(operand)?;
                match self.node_text(node).trim_start().chars().next() {
                    Some('-') => Some(-value),
                    Some('+') => Some(value),
                    _ => None,
                }
            }
            "parenthesized_expression" => node.named_child(0).and_then(|n| self.int_value(n)),
            _ => None,
        }
    }

    /// Converts a literal expression (strings, numbers, booleans, `None`, lists, tuples and
    /// dicts with literal keys) into a JSON value.
    pub fn literal_value(&self, node: Node) -> Option<Value> {
        match node.kind() {
            "string" | "concatenated_string" => self.string_value(node).map(Value::String),
            "integer" | "unary_operator" => self.int_value(node).map(Value::from),
            "float" => self.node_text(node).replace('_', "").parse::<f64>().ok().map(Value::from),
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "none" => Some(Value::Null),
            "list" | "tuple" => {
                let mut cursor = node.walk();
                let items: Option<Vec<Value>> = node
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() != "comment")
                    .map(|n| self.literal_value(n))
                    .collect();
                items.map(Value::Array)
            }
            "dictionary" => {
                let mut map = serde_json::Map::new();
                for (key, value) in self.dict_pairs(node) {
                    let key = match self.literal_value(key)? {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        _ => return None,
                    };
                    map.insert(key, self.literal_value(value)?);
                }
                Some(Value::Object(map))
            }
            "parenthesized_expression" => node.named_child(0).and_then(|n| self.literal_value(n)),
            _ => None,
        }
    }

    /// Key/value node pairs of a dict display, in source order. Splats are skipped.
    pub fn dict_pairs<'a>(&'a self, node: Node<'a>) -> Vec<(Node<'a>, Node<'a>)> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|n| n.kind() == "pair")
            .filter_map(|pair| {
                Some((
                    pair.child_by_field_name("key")?,
                    pair.child_by_field_name("value")?,
                ))
            })
            .collect()
    }

    /// Splits a call's argument list into positional arguments and keyword arguments.
    ///
    /// Positional collection stops at the first `*args` splat since later positions are
    /// no longer known statically.
    pub fn call_arguments<'a>(&'a self, call: Node<'a>) -> CallArguments<'a> {
        let mut arguments = CallArguments::default();
        let Some(list) = call.child_by_field_name("arguments") else {
            return arguments;
        };

        let mut splatted = false;
        let mut cursor = list.walk();
        for arg in list.named_children(&mut cursor) {
            match arg.kind() {
                "keyword_argument" => {
                    if let (Some(name), Some(value)) = (
                        arg.child_by_field_name("name"),
                        arg.child_by_field_name("value"),
                    ) {
                        arguments
                            .keywords
                            .push((self.node_text(name).to_string(), value));
                    }
                }
                "list_splat" => splatted = true,
                "dictionary_splat" | "comment" => {}
                _ if !splatted => arguments.positional.push(arg),
                _ => {}
            }
        }
        arguments
    }
}

/// Arguments of a call expression.
#[derive(Debug, Default)]
pub struct CallArguments<'a> {
    pub positional: Vec<Node<'a>>,
    pub keywords: Vec<(String, Node<'a>)>,
}

impl<'a> CallArguments<'a> {
    /// The argument bound to a constructor parameter given either by position or by keyword.
    pub fn get(&self, position: usize, keyword: &str) -> Option<Node<'a>> {
        self.keyword(keyword)
            .or_else(|| self.positional.get(position).copied())
    }

    pub fn keyword(&self, keyword: &str) -> Option<Node<'a>> {
        self.keywords
            .iter()
            .find(|(name, _)| name == keyword)
            .map(|(_, node)| *node)
    }
}

/// Strips the prefix and quotes off a string literal's text, decoding simple escapes unless
/// the literal is raw.
fn string_contents(text: &str) -> String {
    let prefix_len = text
        .find(|c: char| c == '"' || c == '\'')
        .unwrap_or(0);
    let prefix = &text[..prefix_len];
    let body = &text[prefix_len..];

    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    if body.len() < quote_len * 2 {
        return String::new();
    }
    let inner = &body[quote_len..body.len() - quote_len];

    if prefix.contains(|c: char| c == 'r' || c == 'R') {
        inner.to_string()
    } else {
        unescape(inner)
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            // line continuation inside the literal
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parses a Python integer literal, including `_` separators and radix prefixes.
pub fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.trim().replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<i64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper function to create a temporary file with content
    fn create_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let file_path = dir.path().join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path
    }

    /// First expression of the first statement in `source`.
    fn first_expression(module: &ParsedModule) -> Node<'_> {
        let statement = module.root().named_child(0).unwrap();
        statement.named_child(0).unwrap()
    }

    #[test]
    fn test_parse_valid_python_file() {
        let temp_dir = TempDir::new().unwrap();
        let code = r#"
from fastapi import FastAPI

app = FastAPI()

@app.get("/")
def index():
    return {"ok": True}
"#;

        let file_path = create_temp_file(&temp_dir, "app/main.py", code);
        let parsed = AstParser::parse_file(temp_dir.path(), &file_path).unwrap();

        assert_eq!(parsed.path, file_path);
        assert_eq!(parsed.name, "app.main");
        assert!(!parsed.is_package);
        assert!(!parsed.root().has_error());
    }

    #[test]
    fn test_parse_package_init() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = create_temp_file(&temp_dir, "app/routers/__init__.py", "");
        let parsed = AstParser::parse_file(temp_dir.path(), &file_path).unwrap();

        assert_eq!(parsed.name, "app.routers");
        assert!(parsed.is_package);
        assert_eq!(parsed.package(), "app.routers");
    }

    #[test]
    fn test_parse_broken_file_still_yields_tree() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = create_temp_file(&temp_dir, "broken.py", "def broken(:\n    pass\n");
        let parsed = AstParser::parse_file(temp_dir.path(), &file_path).unwrap();

        assert!(parsed.root().has_error());
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let result = AstParser::parse_file(Path::new("/"), Path::new("/nonexistent/file.py"));

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to read file"));
    }

    #[test]
    fn test_parse_files_batch() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = create_temp_file(&temp_dir, "a.py", "X = 1");
        let file2 = create_temp_file(&temp_dir, "b.py", "Y = 2");
        let missing = temp_dir.path().join("missing.py");

        let results = AstParser::parse_files(temp_dir.path(), &[file1, file2, missing]);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
    }

    #[test]
    fn test_resolve_relative_imports() {
        let module = ParsedModule::from_source("app.routers.users", "").unwrap();

        assert_eq!(module.package(), "app.routers");
        assert_eq!(
            module.resolve_relative(1, Some("deps")),
            Some("app.routers.deps".to_string())
        );
        assert_eq!(module.resolve_relative(2, None), Some("app".to_string()));
        assert_eq!(
            module.resolve_relative(2, Some("core.errors")),
            Some("app.core.errors".to_string())
        );
        assert_eq!(module.resolve_relative(4, None), None);
    }

    #[test]
    fn test_string_value_keeps_fstring_placeholders() {
        let module =
            ParsedModule::from_source("m", r#"f"Item with id {item_id} not found""#).unwrap();
        let value = module.string_value(first_expression(&module));

        assert_eq!(value, Some("Item with id {item_id} not found".to_string()));
    }

    #[test]
    fn test_string_value_concatenated_and_escaped() {
        let module = ParsedModule::from_source("m", r#"("Not " 'found\n' r"\d")"#).unwrap();
        let value = module.string_value(first_expression(&module));

        assert_eq!(value, Some("Not found\n\\d".to_string()));
    }

    #[test]
    fn test_string_value_triple_quoted() {
        let module = ParsedModule::from_source("m", "\"\"\"line one\nline two\"\"\"").unwrap();
        let value = module.string_value(first_expression(&module));

        assert_eq!(value, Some("line one\nline two".to_string()));
    }

    #[test]
    fn test_parse_int_variants() {
        assert_eq!(parse_int("404"), Some(404));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("0x194"), Some(404));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("abc"), None);
    }

    #[test]
    fn test_literal_value_dict() {
        let module = ParsedModule::from_source(
            "m",
            r#"{404: {"description": "Missing", "deprecated": False}, "418": [1, None]}"#,
        )
        .unwrap();
        let value = module.literal_value(first_expression(&module)).unwrap();

        assert_eq!(value["404"]["description"], "Missing");
        assert_eq!(value["404"]["deprecated"], false);
        assert_eq!(value["418"][0], 1);
        assert!(value["418"][1].is_null());
    }

    #[test]
    fn test_call_arguments_positional_and_keyword() {
        let module =
            ParsedModule::from_source("m", r#"HTTPException(404, detail="Missing")"#).unwrap();
        let call = first_expression(&module);
        let args = module.call_arguments(call);

        assert_eq!(args.positional.len(), 1);
        assert_eq!(module.node_text(args.get(0, "status_code").unwrap()), "404");
        assert_eq!(
            module.node_text(args.get(1, "detail").unwrap()),
            "\"Missing\""
        );
        assert!(args.get(2, "headers").is_none());
    }
}
