//! Source reader: maps callable references to parsed syntax and resolves dotted names
//! across the modules of the analyzed project.

use crate::error::{Error, Result};
use crate::parser::ParsedModule;
use crate::symbols::{Binding, ConstValue, FunctionDef, SymbolTable};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tree_sitter::Node;

/// Upper bound on import/alias hops during name resolution.
const MAX_RESOLVE_DEPTH: usize = 32;

/// Identifies a function or method by defining module and qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallableRef {
    pub module: String,
    /// `func` or `Class.method`
    pub qualname: String,
}

impl CallableRef {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
        }
    }
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.qualname)
    }
}

/// What a dotted name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Module(String),
    Class { module: String, name: String },
    Function(CallableRef),
    Constant(ConstValue),
    /// A name defined outside the project, fully qualified (`fastapi.HTTPException`)
    External(String),
}

impl Symbol {
    /// Qualified name of a class or external symbol.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Symbol::Class { module, name } => Some(format!("{}.{}", module, name)),
            Symbol::External(name) => Some(name.clone()),
            Symbol::Module(name) => Some(name.clone()),
            Symbol::Function(callable) => {
                Some(format!("{}.{}", callable.module, callable.qualname))
            }
            Symbol::Constant(_) => None,
        }
    }
}

/// Syntax and symbols of one callable.
#[derive(Debug, Clone)]
pub struct CallableSource {
    pub callable: CallableRef,
    pub module: Arc<ParsedModule>,
    pub symbols: Arc<SymbolTable>,
    /// Names bound inside the callable's own body, shadowing `symbols`
    pub locals: Arc<SymbolTable>,
    pub function: FunctionDef,
}

impl CallableSource {
    /// The `function_definition` node of the callable.
    pub fn node(&self) -> Option<Node<'_>> {
        self.module
            .find_node(&self.function.byte_range, "function_definition")
    }

    /// The body block of the callable.
    pub fn body(&self) -> Option<Node<'_>> {
        self.node()?.child_by_field_name("body")
    }
}

/// Read-only view over every parsed module of a project.
///
/// Symbol tables are built lazily and memoized, so a module that no route touches is never
/// indexed.
pub struct SourceReader {
    modules: HashMap<String, Arc<ParsedModule>>,
    symbols: RwLock<HashMap<String, Arc<SymbolTable>>>,
}

impl SourceReader {
    pub fn new(modules: Vec<ParsedModule>) -> Self {
        let modules = modules
            .into_iter()
            .map(|m| (m.name.clone(), Arc::new(m)))
            .collect();
        Self {
            modules,
            symbols: RwLock::new(HashMap::new()),
        }
    }

    /// All modules, sorted by dotted name.
    pub fn modules(&self) -> Vec<&Arc<ParsedModule>> {
        let mut modules: Vec<&Arc<ParsedModule>> = self.modules.values().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    /// Looks a module up by exact dotted name, or by a unique dotted suffix
    /// (`app.main` finds `src.app.main`).
    pub fn module(&self, name: &str) -> Option<&Arc<ParsedModule>> {
        if let Some(module) = self.modules.get(name) {
            return Some(module);
        }
        let suffix = format!(".{}", name);
        let mut matches = self.modules.iter().filter(|(n, _)| n.ends_with(&suffix));
        match (matches.next(), matches.next()) {
            (Some((_, module)), None) => Some(module),
            _ => None,
        }
    }

    /// Symbol table of a module, built on first use.
    pub fn symbols(&self, name: &str) -> Result<Option<Arc<SymbolTable>>> {
        let Some(module) = self.module(name) else {
            return Ok(None);
        };
        let key = module.name.clone();

        {
            let cache = self
                .symbols
                .read()
                .map_err(|_| Error::CachePoisoned("symbol tables"))?;
            if let Some(table) = cache.get(&key) {
                return Ok(Some(Arc::clone(table)));
            }
        }

        let table = Arc::new(SymbolTable::build(module));
        let mut cache = self
            .symbols
            .write()
            .map_err(|_| Error::CachePoisoned("symbol tables"))?;
        Ok(Some(Arc::clone(cache.entry(key).or_insert(table))))
    }

    /// Locates the source of a callable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] when the module is not part of the project or
    /// defines no such function.
    pub fn read(&self, callable: &CallableRef) -> Result<CallableSource> {
        let unavailable = || Error::SourceUnavailable {
            callable: callable.to_string(),
        };
        let module = self.module(&callable.module).ok_or_else(unavailable)?;
        let symbols = self.symbols(&module.name)?.ok_or_else(unavailable)?;
        let function = symbols
            .function(&callable.qualname)
            .cloned()
            .ok_or_else(unavailable)?;

        let locals = module
            .find_node(&function.byte_range, "function_definition")
            .and_then(|node| node.child_by_field_name("body"))
            .map(|body| SymbolTable::build_scope(module, body))
            .unwrap_or_else(|| SymbolTable::empty(&module.name));

        Ok(CallableSource {
            callable: callable.clone(),
            module: Arc::clone(module),
            symbols,
            locals: Arc::new(locals),
            function,
        })
    }

    /// Resolves a dotted name as seen from inside `module`.
    ///
    /// Returns `None` only when the name traverses a project module that does not define the
    /// requested attribute, or when resolution exceeds the depth limit.
    pub fn resolve(&self, module: &str, dotted: &str) -> Option<Symbol> {
        self.resolve_in(module, dotted, 0)
    }

    /// Resolves a dotted name as seen from inside the body of `source`.
    ///
    /// Imports and constants bound in the body shadow module bindings. Local classes,
    /// functions and other local values resolve to `None`.
    pub fn resolve_from(&self, source: &CallableSource, dotted: &str) -> Option<Symbol> {
        self.resolve_from_at(source, dotted, 0)
    }

    /// Whether `name` is a package directory without `__init__.py` holding project modules.
    fn is_namespace(&self, name: &str) -> bool {
        let prefix = format!("{}.", name);
        let inner = format!(".{}.", name);
        self.modules
            .keys()
            .any(|m| m.starts_with(&prefix) || m.contains(&inner))
    }

    fn resolve_from_at(&self, source: &CallableSource, dotted: &str, depth: usize) -> Option<Symbol> {
        if depth > MAX_RESOLVE_DEPTH {
            debug!("Resolution depth exceeded for {} in {}", dotted, source.callable);
            return None;
        }
        let (head, rest) = match dotted.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (dotted, None),
        };

        let base = match source.locals.binding(head) {
            None => return self.resolve_in(source.symbols.module(), dotted, depth),
            Some(Binding::Import(import)) => {
                self.resolve_qualified_at(&import.qualified(), depth + 1)?
            }
            Some(Binding::Constant(value)) => Symbol::Constant(value.clone()),
            Some(Binding::Alias(target)) => self.resolve_from_at(source, target, depth + 1)?,
            Some(Binding::Class | Binding::Function | Binding::Opaque) => return None,
        };
        match rest {
            Some(rest) => self.resolve_attribute(base, rest, depth),
            None => Some(base),
        }
    }

    fn resolve_in(&self, module: &str, dotted: &str, depth: usize) -> Option<Symbol> {
        if depth > MAX_RESOLVE_DEPTH {
            debug!("Resolution depth exceeded for {} in {}", dotted, module);
            return None;
        }
        let (head, rest) = match dotted.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (dotted, None),
        };

        let base = self.resolve_name(module, head, depth)?;
        match rest {
            Some(rest) => self.resolve_attribute(base, rest, depth),
            None => Some(base),
        }
    }

    fn resolve_name(&self, module: &str, name: &str, depth: usize) -> Option<Symbol> {
        let table = match self.symbols(module).ok().flatten() {
            Some(table) => table,
            // names looked up inside modules outside the project stay external
            None => return Some(Symbol::External(format!("{}.{}", module, name))),
        };
        let module = table.module().to_string();

        if let Some(value) = table.constant(name) {
            return Some(Symbol::Constant(value));
        }
        match table.binding(name) {
            Some(Binding::Import(import)) => {
                self.resolve_qualified_at(&import.qualified(), depth + 1)
            }
            Some(Binding::Class) => Some(Symbol::Class {
                module,
                name: name.to_string(),
            }),
            Some(Binding::Function) => Some(Symbol::Function(CallableRef::new(module, name))),
            Some(Binding::Constant(value)) => Some(Symbol::Constant(value.clone())),
            Some(Binding::Alias(target)) => {
                let target = target.clone();
                self.resolve_in(&module, &target, depth + 1)
            }
            Some(Binding::Opaque) => Some(Symbol::External(format!("{}.{}", module, name))),
            None => {
                // later star imports shadow earlier ones
                for star in table.star_imports().iter().rev() {
                    if let Some(symbols) = self.symbols(star).ok().flatten() {
                        if symbols.binding(name).is_some() {
                            return self.resolve_in(symbols.module(), name, depth + 1);
                        }
                    }
                }
                Some(Symbol::External(format!("builtins.{}", name)))
            }
        }
    }

    fn resolve_attribute(&self, base: Symbol, rest: &str, depth: usize) -> Option<Symbol> {
        match base {
            Symbol::Module(module) => match self.module(&module) {
                Some(parsed) => {
                    let name = parsed.name.clone();
                    self.resolve_in(&name, rest, depth + 1)
                }
                None => self.resolve_qualified_at(&format!("{}.{}", module, rest), depth + 1),
            },
            Symbol::External(qualified) => Some(Symbol::External(format!("{}.{}", qualified, rest))),
            Symbol::Class { module, name } => {
                // `Class.method` is the only attribute of a class we can follow
                if rest.contains('.') {
                    return None;
                }
                let table = self.symbols(&module).ok().flatten()?;
                let qualname = format!("{}.{}", name, rest);
                table
                    .function(&qualname)
                    .map(|_| Symbol::Function(CallableRef::new(module, qualname)))
            }
            Symbol::Function(_) | Symbol::Constant(_) => None,
        }
    }

    fn resolve_qualified_at(&self, qualified: &str, depth: usize) -> Option<Symbol> {
        if depth > MAX_RESOLVE_DEPTH {
            debug!("Resolution depth exceeded for {}", qualified);
            return None;
        }
        if self.module(qualified).is_some() || self.is_namespace(qualified) {
            return Some(Symbol::Module(qualified.to_string()));
        }

        // longest prefix that names a project module
        let parts: Vec<&str> = qualified.split('.').collect();
        for split in (1..parts.len()).rev() {
            let module = parts[..split].join(".");
            if let Some(parsed) = self.module(&module) {
                let name = parsed.name.clone();
                let rest = parts[split..].join(".");
                return self.resolve_in(&name, &rest, depth + 1);
            }
        }

        Some(Symbol::External(qualified.to_string()))
    }
}
