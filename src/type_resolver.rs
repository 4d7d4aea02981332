use crate::reader::{CallableSource, SourceReader, Symbol};
use crate::symbols::{Binding, SymbolTable};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Failure type resolver - decides whether a name used at a call site is an HTTP failure type
///
/// A name qualifies when it resolves to one of the configured canonical base types, or to a
/// project class whose base classes reach one of them. A class that merely shares the
/// canonical type's name does not qualify.
pub struct FailureTypeResolver {
    reader: Arc<SourceReader>,
    /// Qualified names of the canonical base types
    failure_types: HashSet<String>,
    /// Base chains of project classes, keyed by qualified class name
    chain_cache: RwLock<HashMap<String, Vec<String>>>,
}

impl FailureTypeResolver {
    /// Create a new resolver over the project behind `reader`
    pub fn new(reader: Arc<SourceReader>, failure_types: &[String]) -> Self {
        debug!(
            "Initializing FailureTypeResolver with canonical bases: {:?}",
            failure_types
        );
        Self {
            reader,
            failure_types: failure_types.iter().cloned().collect(),
            chain_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn reader(&self) -> &Arc<SourceReader> {
        &self.reader
    }

    /// Whether `name`, as seen from inside the body of `source`, is a failure type
    pub fn is_failure_type(&self, name: &str, source: &CallableSource) -> bool {
        !self.resolve_base_chain_in(name, source).is_empty()
    }

    /// Base chain of `name` as seen from inside the body of `source`.
    ///
    /// Classes and imports bound in the body shadow module bindings.
    pub fn resolve_base_chain_in(&self, name: &str, source: &CallableSource) -> Vec<String> {
        let mut resolving_stack = HashSet::new();
        self.scoped_chain(name, source, &mut resolving_stack)
    }

    /// Qualified names from the named type up to the canonical base it derives from, with
    /// `name` resolved at module level.
    ///
    /// Empty when the name is not a failure type.
    pub fn resolve_base_chain(&self, name: &str, symbols: &SymbolTable) -> Vec<String> {
        match self.reader.resolve(symbols.module(), name) {
            Some(symbol) => self.chain_for_symbol(&symbol),
            None => Vec::new(),
        }
    }

    /// Base chain of a symbol that is already resolved
    pub fn chain_for_symbol(&self, symbol: &Symbol) -> Vec<String> {
        match symbol {
            Symbol::External(qualified) if self.failure_types.contains(qualified) => {
                vec![qualified.clone()]
            }
            Symbol::Class { module, name } => self.class_chain(module, name),
            _ => Vec::new(),
        }
    }

    fn scoped_chain(
        &self,
        name: &str,
        source: &CallableSource,
        resolving_stack: &mut HashSet<String>,
    ) -> Vec<String> {
        let head = name.split('.').next().unwrap_or(name);
        match source.locals.binding(head) {
            None => self.resolve_base_chain(name, &source.symbols),
            Some(Binding::Class) if head == name => {
                self.local_class_chain(name, source, resolving_stack)
            }
            Some(_) => match self.reader.resolve_from(source, name) {
                Some(symbol) => self.chain_for_symbol(&symbol),
                None => Vec::new(),
            },
        }
    }

    /// Base chain of a class defined inside the body of `source`; never cached.
    fn local_class_chain(
        &self,
        name: &str,
        source: &CallableSource,
        resolving_stack: &mut HashSet<String>,
    ) -> Vec<String> {
        let qualified = format!(
            "{}.{}.<locals>.{}",
            source.callable.module, source.callable.qualname, name
        );
        if !resolving_stack.insert(qualified.clone()) {
            warn!("Circular class hierarchy detected at {}", qualified);
            return Vec::new();
        }

        let bases = source
            .locals
            .class(name)
            .map(|class| class.bases.clone())
            .unwrap_or_default();

        let mut chain = Vec::new();
        for base in &bases {
            let base_chain = self.scoped_chain(base, source, resolving_stack);
            if !base_chain.is_empty() {
                chain.push(qualified.clone());
                chain.extend(base_chain);
                break;
            }
        }

        resolving_stack.remove(&qualified);
        chain
    }

    fn class_chain(&self, module: &str, name: &str) -> Vec<String> {
        let qualified = format!("{}.{}", module, name);

        // Check cache first
        match self.chain_cache.read() {
            Ok(cache) => {
                if let Some(chain) = cache.get(&qualified) {
                    debug!("Base chain of {} found in cache", qualified);
                    return chain.clone();
                }
            }
            Err(_) => warn!("Base chain cache poisoned; resolving {} uncached", qualified),
        }

        let mut resolving_stack = HashSet::new();
        let chain = self.walk_class(module, name, &mut resolving_stack);

        if let Ok(mut cache) = self.chain_cache.write() {
            cache.entry(qualified).or_insert_with(|| chain.clone());
        }
        chain
    }

    fn walk_class(
        &self,
        module: &str,
        name: &str,
        resolving_stack: &mut HashSet<String>,
    ) -> Vec<String> {
        let qualified = format!("{}.{}", module, name);

        // a configured base may itself be a project class
        if self.failure_types.contains(&qualified) {
            return vec![qualified];
        }

        if !resolving_stack.insert(qualified.clone()) {
            warn!("Circular class hierarchy detected at {}", qualified);
            return Vec::new();
        }

        let bases = self
            .reader
            .symbols(module)
            .ok()
            .flatten()
            .and_then(|table| table.class(name).map(|class| class.bases.clone()))
            .unwrap_or_default();

        let mut chain = Vec::new();
        for base in &bases {
            let base_chain = match self.reader.resolve(module, base) {
                Some(Symbol::Class {
                    module: base_module,
                    name: base_name,
                }) => self.walk_class(&base_module, &base_name, resolving_stack),
                Some(symbol) => self.chain_for_symbol(&symbol),
                None => {
                    debug!("Base {} of {} is unresolvable", base, qualified);
                    Vec::new()
                }
            };
            if !base_chain.is_empty() {
                chain.push(qualified.clone());
                chain.extend(base_chain);
                break;
            }
        }

        resolving_stack.remove(&qualified);
        chain
    }
}
