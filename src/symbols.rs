//! Per-module symbol tables.
//!
//! A [`SymbolTable`] records what every module-level name is bound to: imports, classes,
//! functions, literal constants and simple aliases. Bindings are applied in source order, so
//! a later binding shadows an earlier one exactly as it would when Python executes the module.

use crate::parser::ParsedModule;
use log::debug;
use std::collections::HashMap;
use std::ops::Range;
use tree_sitter::Node;

/// Upper bound on alias hops followed inside one module.
const MAX_ALIAS_HOPS: usize = 16;

/// Statements whose blocks share the scope they appear in.
const COMPOUND_STATEMENTS: &[&str] = &[
    "if_statement",
    "for_statement",
    "while_statement",
    "try_statement",
    "with_statement",
    "elif_clause",
    "else_clause",
    "except_clause",
    "finally_clause",
];

/// What a module-level name is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Import(ImportBinding),
    Class,
    Function,
    Constant(ConstValue),
    /// `NAME = other.name`
    Alias(String),
    /// Bound to an expression that is not statically evaluated
    Opaque,
}

/// Origin of an imported name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Module the name is imported from (or the imported module itself)
    pub module: String,
    /// Original name inside `module`; `None` for `import a.b` style imports
    pub name: Option<String>,
}

impl ImportBinding {
    /// Fully qualified dotted name the binding refers to.
    pub fn qualified(&self) -> String {
        match &self.name {
            Some(name) => format!("{}.{}", self.module, name),
            None => self.module.clone(),
        }
    }
}

/// Literal value of a module constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    Int(i64),
    Str(String),
}

/// A class statement.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    /// Base class expressions as written (keyword arguments such as `metaclass=` excluded)
    pub bases: Vec<String>,
    pub line: usize,
}

/// A function or method definition.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    /// `name` for module functions, `Class.name` for methods
    pub qualname: String,
    /// Byte range of the `function_definition` node
    pub byte_range: Range<usize>,
    pub line: usize,
}

/// Module-level symbol table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    module: String,
    bindings: HashMap<String, Binding>,
    classes: HashMap<String, ClassDef>,
    functions: HashMap<String, FunctionDef>,
    star_imports: Vec<String>,
}

impl SymbolTable {
    /// Builds the symbol table of a parsed module.
    pub fn build(module: &ParsedModule) -> Self {
        let mut table = SymbolTable {
            module: module.name.clone(),
            ..Default::default()
        };
        table.collect_block(module, module.root());
        debug!(
            "Symbol table for {}: {} bindings, {} classes, {} functions",
            table.module,
            table.bindings.len(),
            table.classes.len(),
            table.functions.len()
        );
        table
    }

    /// Builds the table of names a function body binds itself.
    ///
    /// Local imports, classes and literal constants are recorded; nested functions and
    /// classes bind their name but their bodies are not entered.
    pub fn build_scope(module: &ParsedModule, body: Node) -> Self {
        let mut table = Self::empty(&module.name);
        table.collect_scope(module, body);
        table
    }

    /// A table binding nothing.
    pub fn empty(module: &str) -> Self {
        SymbolTable {
            module: module.to_string(),
            ..Default::default()
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Literal value of a module constant, following same-module alias chains.
    pub fn constant(&self, name: &str) -> Option<ConstValue> {
        let mut current = name;
        for _ in 0..MAX_ALIAS_HOPS {
            match self.bindings.get(current)? {
                Binding::Constant(value) => return Some(value.clone()),
                Binding::Alias(target) if !target.contains('.') => current = target,
                _ => return None,
            }
        }
        None
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// Function by qualified name (`func` or `Class.method`).
    pub fn function(&self, qualname: &str) -> Option<&FunctionDef> {
        self.functions.get(qualname)
    }

    /// Modules imported with `from module import *`, in source order.
    pub fn star_imports(&self) -> &[String] {
        &self.star_imports
    }

    fn bind(&mut self, name: &str, binding: Binding) {
        self.bindings.insert(name.to_string(), binding);
    }

    fn collect_block(&mut self, module: &ParsedModule, block: Node) {
        let mut cursor = block.walk();
        let statements: Vec<Node> = block.named_children(&mut cursor).collect();
        for statement in statements {
            self.collect_statement(module, statement);
        }
    }

    fn collect_statement(&mut self, module: &ParsedModule, statement: Node) {
        match statement.kind() {
            "import_statement" => self.collect_import(module, statement),
            "import_from_statement" | "future_import_statement" => {
                self.collect_from_import(module, statement)
            }
            "class_definition" => self.collect_class(module, statement),
            "function_definition" => {
                let def = function_def(module, statement, None);
                self.bind(&def.name, Binding::Function);
                self.functions.insert(def.qualname.clone(), def);
            }
            "decorated_definition" => {
                if let Some(definition) = statement.child_by_field_name("definition") {
                    self.collect_statement(module, definition);
                }
            }
            "expression_statement" => {
                let mut cursor = statement.walk();
                let expressions: Vec<Node> = statement.named_children(&mut cursor).collect();
                for expression in expressions {
                    if expression.kind() == "assignment" {
                        self.collect_assignment(module, expression);
                    }
                }
            }
            // names bound conditionally at module level are still module bindings
            "if_statement" | "try_statement" | "with_statement" | "elif_clause"
            | "else_clause" | "except_clause" | "finally_clause" => {
                let mut cursor = statement.walk();
                let children: Vec<Node> = statement.named_children(&mut cursor).collect();
                for child in children {
                    match child.kind() {
                        "block" => self.collect_block(module, child),
                        "elif_clause" | "else_clause" | "except_clause" | "finally_clause" => {
                            self.collect_statement(module, child)
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_scope(&mut self, module: &ParsedModule, block: Node) {
        let mut cursor = block.walk();
        let statements: Vec<Node> = block.named_children(&mut cursor).collect();
        for statement in statements {
            if COMPOUND_STATEMENTS.contains(&statement.kind()) {
                self.collect_compound(module, statement);
            } else {
                self.collect_statement(module, statement);
            }
        }
    }

    fn collect_compound(&mut self, module: &ParsedModule, statement: Node) {
        let mut cursor = statement.walk();
        let children: Vec<Node> = statement.named_children(&mut cursor).collect();
        for child in children {
            if child.kind() == "block" {
                self.collect_scope(module, child);
            } else if COMPOUND_STATEMENTS.contains(&child.kind()) {
                self.collect_compound(module, child);
            }
        }
    }

    fn collect_import(&mut self, module: &ParsedModule, statement: Node) {
        let mut cursor = statement.walk();
        let names: Vec<Node> = statement
            .children_by_field_name("name", &mut cursor)
            .collect();
        for name in names {
            match name.kind() {
                // `import a.b` binds `a`
                "dotted_name" => {
                    let dotted = compact(module.node_text(name));
                    let head = dotted.split('.').next().unwrap_or_default().to_string();
                    self.bind(
                        &head,
                        Binding::Import(ImportBinding {
                            module: head.clone(),
                            name: None,
                        }),
                    );
                }
                // `import a.b as c` binds `c` to `a.b`
                "aliased_import" => {
                    if let (Some(target), Some(alias)) = (
                        name.child_by_field_name("name"),
                        name.child_by_field_name("alias"),
                    ) {
                        self.bind(
                            module.node_text(alias),
                            Binding::Import(ImportBinding {
                                module: compact(module.node_text(target)),
                                name: None,
                            }),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_from_import(&mut self, module: &ParsedModule, statement: Node) {
        let source_module = match statement.child_by_field_name("module_name") {
            Some(node) if node.kind() == "relative_import" => relative_module(module, node),
            Some(node) => Some(compact(module.node_text(node))),
            // `from __future__ import x`
            None => Some("__future__".to_string()),
        };
        let Some(source_module) = source_module else {
            debug!(
                "Skipping relative import beyond top-level package in {}",
                module.name
            );
            return;
        };

        let mut cursor = statement.walk();
        let children: Vec<Node> = statement.named_children(&mut cursor).collect();
        if children.iter().any(|c| c.kind() == "wildcard_import") {
            self.star_imports.push(source_module);
            return;
        }

        let mut cursor = statement.walk();
        let names: Vec<Node> = statement
            .children_by_field_name("name", &mut cursor)
            .collect();
        for name in names {
            let (original, local) = match name.kind() {
                "dotted_name" => {
                    let text = compact(module.node_text(name));
                    (text.clone(), text)
                }
                "aliased_import" => match (
                    name.child_by_field_name("name"),
                    name.child_by_field_name("alias"),
                ) {
                    (Some(target), Some(alias)) => (
                        compact(module.node_text(target)),
                        module.node_text(alias).to_string(),
                    ),
                    _ => continue,
                },
                _ => continue,
            };
            self.bind(
                &local,
                Binding::Import(ImportBinding {
                    module: source_module.clone(),
                    name: Some(original),
                }),
            );
        }
    }

    fn collect_class(&mut self, module: &ParsedModule, class: Node) {
        let Some(name_node) = class.child_by_field_name("name") else {
            return;
        };
        let name = module.node_text(name_node).to_string();

        let mut bases = Vec::new();
        if let Some(superclasses) = class.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                if !matches!(base.kind(), "keyword_argument" | "comment" | "dictionary_splat" | "list_splat") {
                    bases.push(compact(module.node_text(base)));
                }
            }
        }

        if let Some(body) = class.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                let definition = match member.kind() {
                    "function_definition" => Some(member),
                    "decorated_definition" => member
                        .child_by_field_name("definition")
                        .filter(|d| d.kind() == "function_definition"),
                    _ => None,
                };
                if let Some(definition) = definition {
                    let def = function_def(module, definition, Some(&name));
                    self.functions.insert(def.qualname.clone(), def);
                }
            }
        }

        self.bind(&name, Binding::Class);
        self.classes.insert(
            name.clone(),
            ClassDef {
                name,
                bases,
                line: class.start_position().row + 1,
            },
        );
    }

    fn collect_assignment(&mut self, module: &ParsedModule, assignment: Node) {
        // `X = Y = 404` nests the second assignment on the right-hand side
        let mut targets = Vec::new();
        let mut current = assignment;
        let value = loop {
            if let Some(left) = current.child_by_field_name("left") {
                targets.push(left);
            }
            match current.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => current = right,
                other => break other,
            }
        };

        let binding = match value {
            Some(value) => value_binding(module, value),
            // bare annotation `X: int` binds nothing
            None => return,
        };

        for target in targets {
            if target.kind() == "identifier" {
                self.bind(module.node_text(target), binding.clone());
            } else {
                // tuple unpacking and attribute targets are not tracked
                let mut cursor = target.walk();
                let names: Vec<Node> = target
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() == "identifier")
                    .collect();
                for name in names {
                    self.bind(module.node_text(name), Binding::Opaque);
                }
            }
        }
    }
}

fn value_binding(module: &ParsedModule, value: Node) -> Binding {
    match value.kind() {
        "integer" | "unary_operator" => module
            .int_value(value)
            .map(|v| Binding::Constant(ConstValue::Int(v)))
            .unwrap_or(Binding::Opaque),
        "string" | "concatenated_string" => module
            .string_value(value)
            .map(|s| Binding::Constant(ConstValue::Str(s)))
            .unwrap_or(Binding::Opaque),
        "identifier" | "attribute" => Binding::Alias(compact(module.node_text(value))),
        "parenthesized_expression" => value
            .named_child(0)
            .map(|inner| value_binding(module, inner))
            .unwrap_or(Binding::Opaque),
        _ => Binding::Opaque,
    }
}

fn function_def(module: &ParsedModule, node: Node, class: Option<&str>) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| module.node_text(n).to_string())
        .unwrap_or_default();
    let qualname = match class {
        Some(class) => format!("{}.{}", class, name),
        None => name.clone(),
    };
    FunctionDef {
        name,
        qualname,
        byte_range: node.byte_range(),
        line: node.start_position().row + 1,
    }
}

fn relative_module(module: &ParsedModule, node: Node) -> Option<String> {
    let mut level = 0;
    let mut suffix = None;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_prefix" => level = module.node_text(child).matches('.').count(),
            "dotted_name" => suffix = Some(compact(module.node_text(child))),
            _ => {}
        }
    }
    module.resolve_relative(level.max(1), suffix.as_deref())
}

/// Removes whitespace from a dotted expression (`a . b` is legal Python).
pub fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, code: &str) -> SymbolTable {
        let module = ParsedModule::from_source(name, code).unwrap();
        SymbolTable::build(&module)
    }

    fn import<'a>(table: &'a SymbolTable, name: &str) -> Option<&'a ImportBinding> {
        match table.binding(name)? {
            Binding::Import(import) => Some(import),
            _ => None,
        }
    }

    #[test]
    fn test_constants_and_alias_chains() {
        let t = table(
            "app.consts",
            r#"
NOT_FOUND = MISSING = 404
TEAPOT: int = 418
GONE = NOT_FOUND
MESSAGE = "Item not found"
computed = compute()
"#,
        );

        assert_eq!(t.constant("NOT_FOUND"), Some(ConstValue::Int(404)));
        assert_eq!(t.constant("MISSING"), Some(ConstValue::Int(404)));
        assert_eq!(t.constant("TEAPOT"), Some(ConstValue::Int(418)));
        assert_eq!(t.constant("GONE"), Some(ConstValue::Int(404)));
        assert_eq!(
            t.constant("MESSAGE"),
            Some(ConstValue::Str("Item not found".to_string()))
        );
        assert_eq!(t.constant("computed"), None);
        assert_eq!(t.binding("computed"), Some(&Binding::Opaque));
    }

    #[test]
    fn test_alias_cycle_terminates() {
        let t = table("m", "A = B\nB = A\n");
        assert_eq!(t.constant("A"), None);
    }

    #[test]
    fn test_import_bindings() {
        let t = table(
            "app.routers.users",
            r#"
import starlette.status
import fastapi.exceptions as fe
from fastapi import HTTPException, Depends as D
from ..deps import auth_user
from . import schemas
from .errors import *
"#,
        );

        assert_eq!(
            import(&t, "starlette"),
            Some(&ImportBinding {
                module: "starlette".to_string(),
                name: None
            })
        );
        assert_eq!(import(&t, "fe").unwrap().qualified(), "fastapi.exceptions");
        assert_eq!(
            import(&t, "HTTPException").unwrap().qualified(),
            "fastapi.HTTPException"
        );
        assert_eq!(import(&t, "D").unwrap().qualified(), "fastapi.Depends");
        assert_eq!(import(&t, "auth_user").unwrap().qualified(), "app.deps.auth_user");
        assert_eq!(import(&t, "schemas").unwrap().qualified(), "app.routers.schemas");
        assert_eq!(t.star_imports(), &["app.routers.errors".to_string()]);
    }

    #[test]
    fn test_classes_and_methods() {
        let t = table(
            "app.errors",
            r#"
from fastapi import HTTPException

class NotFound(HTTPException, metaclass=Meta):
    def __init__(self, item: str):
        super().__init__(404, f"{item} not found")

    @property
    def item(self):
        return self._item
"#,
        );

        let class = t.class("NotFound").unwrap();
        assert_eq!(class.bases, vec!["HTTPException".to_string()]);
        assert_eq!(class.line, 4);
        assert!(t.function("NotFound.__init__").is_some());
        assert!(t.function("NotFound.item").is_some());
        assert_eq!(t.binding("NotFound"), Some(&Binding::Class));
    }

    #[test]
    fn test_later_binding_shadows_import() {
        let t = table(
            "m",
            r#"
from fastapi import HTTPException

class HTTPException(Exception):
    pass
"#,
        );

        assert_eq!(t.binding("HTTPException"), Some(&Binding::Class));
        assert!(import(&t, "HTTPException").is_none());
    }

    #[test]
    fn test_conditional_module_bindings() {
        let t = table(
            "m",
            r#"
try:
    from fastapi import HTTPException
except ImportError:
    HTTPException = None

if DEBUG:
    LIMIT = 429
else:
    LIMIT = 503
"#,
        );

        // the except branch executes last in source order
        assert_eq!(t.binding("HTTPException"), Some(&Binding::Opaque));
        assert_eq!(t.constant("LIMIT"), Some(ConstValue::Int(503)));
    }

    #[test]
    fn test_decorated_functions_are_recorded() {
        let t = table(
            "app.main",
            r#"
@app.get("/")
async def index():
    return {}

def helper():
    pass
"#,
        );

        let index = t.function("index").unwrap();
        assert_eq!(index.line, 3);
        assert!(t.function("helper").is_some());
        assert_eq!(t.binding("index"), Some(&Binding::Function));
    }

    #[test]
    fn test_function_scope_bindings() {
        let module = ParsedModule::from_source(
            "app.main",
            r#"
LIMIT = 429

def handler(flag: bool):
    from fastapi import HTTPException
    import starlette.status as st
    if flag:
        from app.consts import FORBIDDEN as F
    code = 404

    class Denied(HTTPException):
        pass

    def inner():
        from app.consts import GONE
"#,
        )
        .unwrap();
        let module_table = SymbolTable::build(&module);
        let function = module_table.function("handler").unwrap();
        let body = module
            .find_node(&function.byte_range, "function_definition")
            .and_then(|node| node.child_by_field_name("body"))
            .unwrap();
        let t = SymbolTable::build_scope(&module, body);

        assert_eq!(t.module(), "app.main");
        assert_eq!(
            import(&t, "HTTPException").unwrap().qualified(),
            "fastapi.HTTPException"
        );
        assert_eq!(import(&t, "st").unwrap().qualified(), "starlette.status");
        assert_eq!(import(&t, "F").unwrap().qualified(), "app.consts.FORBIDDEN");
        assert_eq!(t.constant("code"), Some(ConstValue::Int(404)));
        assert_eq!(t.class("Denied").unwrap().bases, vec!["HTTPException".to_string()]);
        assert_eq!(t.binding("inner"), Some(&Binding::Function));
        assert!(t.binding("GONE").is_none());
        assert!(t.binding("LIMIT").is_none());
    }
}
