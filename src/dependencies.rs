//! Dependency discovery and the breadth-first walk over the dependency graph.

use crate::error::Result;
use crate::parser::ParsedModule;
use crate::reader::{CallableRef, CallableSource, SourceReader, Symbol};
use crate::signal::FailureSignal;
use crate::symbols::compact;
use log::debug;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tree_sitter::Node;

/// What the analysis of one callable produced.
#[derive(Debug, Clone, Default)]
pub struct CallableAnalysis {
    /// Raise-site signals followed by docstring signals
    pub signals: Vec<FailureSignal>,
    /// Parameter dependencies in declaration order
    pub dependencies: Vec<CallableRef>,
}

/// Produces (and typically memoizes) the analysis of a single callable.
pub trait CallableAnalyzer {
    fn analyze(&self, callable: &CallableRef) -> Result<Arc<CallableAnalysis>>;
}

/// Collects the signals of a handler and everything it transitively depends on.
///
/// The walk is breadth-first from the handler. The handler's edges are the route-level
/// dependencies followed by its own parameter dependencies. Every callable is analyzed at most
/// once, which also cuts cycles.
pub fn collect<A>(
    analyzer: &A,
    handler: &CallableRef,
    route_dependencies: &[CallableRef],
) -> Result<Vec<FailureSignal>>
where
    A: CallableAnalyzer + ?Sized,
{
    let mut visited: HashSet<CallableRef> = HashSet::new();
    let mut queue: VecDeque<CallableRef> = VecDeque::new();
    let mut signals = Vec::new();

    visited.insert(handler.clone());
    let handler_analysis = analyzer.analyze(handler)?;
    signals.extend(handler_analysis.signals.iter().cloned());
    for dependency in route_dependencies
        .iter()
        .chain(handler_analysis.dependencies.iter())
    {
        if visited.insert(dependency.clone()) {
            queue.push_back(dependency.clone());
        }
    }

    while let Some(callable) = queue.pop_front() {
        let analysis = analyzer.analyze(&callable)?;
        debug!(
            "Dependency {} contributes {} signals",
            callable,
            analysis.signals.len()
        );
        signals.extend(analysis.signals.iter().cloned());
        for dependency in &analysis.dependencies {
            if visited.insert(dependency.clone()) {
                queue.push_back(dependency.clone());
            }
        }
    }

    Ok(signals)
}

/// Finds `Depends(...)` / `Security(...)` declarations.
pub struct DependencyScanner<'a> {
    reader: &'a SourceReader,
    markers: &'a [String],
}

impl<'a> DependencyScanner<'a> {
    pub fn new(reader: &'a SourceReader, markers: &'a [String]) -> Self {
        Self { reader, markers }
    }

    /// Dependencies declared by the parameters of a callable, in declaration order.
    pub fn parameter_dependencies(&self, source: &CallableSource) -> Vec<CallableRef> {
        let Some(parameters) = source
            .node()
            .and_then(|function| function.child_by_field_name("parameters"))
        else {
            return Vec::new();
        };
        let module = source.module.as_ref();

        let mut dependencies = Vec::new();
        let mut cursor = parameters.walk();
        for parameter in parameters.named_children(&mut cursor) {
            let annotation = parameter.child_by_field_name("type");
            let default = match parameter.kind() {
                "default_parameter" | "typed_default_parameter" => {
                    parameter.child_by_field_name("value")
                }
                _ => None,
            };

            let from_annotation = annotation.and_then(|a| self.annotated_dependency(module, a));
            let from_default = default
                .filter(|value| self.is_marker_call(module, *value))
                .and_then(|call| {
                    let fallback = annotation.map(|a| compact(module.node_text(a)));
                    self.marker_target(module, call, fallback)
                });

            if let Some(dependency) = from_annotation.or(from_default) {
                debug!("{} depends on {}", source.callable, dependency);
                dependencies.push(dependency);
            }
        }
        dependencies
    }

    /// Dependencies of a `dependencies=[Depends(a), Security(b)]` sequence.
    pub fn sequence_dependencies(&self, module: &ParsedModule, sequence: Node) -> Vec<CallableRef> {
        if !matches!(sequence.kind(), "list" | "tuple") {
            return Vec::new();
        }
        let mut cursor = sequence.walk();
        let items: Vec<Node> = sequence.named_children(&mut cursor).collect();
        items
            .into_iter()
            .filter(|item| self.is_marker_call(module, *item))
            .filter_map(|call| self.marker_target(module, call, None))
            .collect()
    }

    /// The callable a dependency expression names: a function, or the `__init__` of a class.
    pub fn callable_for(&self, module: &str, expression: &str) -> Option<CallableRef> {
        match self.reader.resolve(module, expression)? {
            Symbol::Function(callable) => Some(callable),
            Symbol::Class { module, name } => {
                let init = format!("{}.__init__", name);
                let table = self.reader.symbols(&module).ok().flatten()?;
                if table.function(&init).is_some() {
                    Some(CallableRef::new(module, init))
                } else {
                    debug!("Class dependency {}.{} has no __init__", module, name);
                    None
                }
            }
            other => {
                debug!("Dependency {} resolves outside the project: {:?}", expression, other);
                None
            }
        }
    }

    /// Whether a parameter declares a dependency rather than a request value.
    pub fn declares_dependency(&self, module: &ParsedModule, parameter: Node) -> bool {
        let in_annotation = parameter
            .child_by_field_name("type")
            .and_then(|annotation| self.find_marker_call(module, annotation))
            .is_some();
        let in_default = parameter
            .child_by_field_name("value")
            .is_some_and(|value| self.is_marker_call(module, value));
        in_annotation || in_default
    }

    fn is_marker_call(&self, module: &ParsedModule, node: Node) -> bool {
        if node.kind() != "call" {
            return false;
        }
        let Some(function) = node.child_by_field_name("function") else {
            return false;
        };
        if !matches!(function.kind(), "identifier" | "attribute") {
            return false;
        }
        let name = compact(module.node_text(function));
        self.reader
            .resolve(&module.name, &name)
            .and_then(|symbol| symbol.qualified_name())
            .map(|qualified| self.markers.iter().any(|m| *m == qualified))
            .unwrap_or(false)
    }

    /// Target of a marker call; `Depends()` without a dependency falls back to `annotated`.
    fn marker_target(
        &self,
        module: &ParsedModule,
        call: Node,
        annotated: Option<String>,
    ) -> Option<CallableRef> {
        let arguments = module.call_arguments(call);
        let target = match arguments.get(0, "dependency") {
            Some(node) if matches!(node.kind(), "identifier" | "attribute") => {
                compact(module.node_text(node))
            }
            Some(node) if node.kind() == "none" => annotated?,
            Some(_) => return None,
            None => annotated?,
        };
        self.callable_for(&module.name, &target)
    }

    /// Dependency carried in `Annotated[T, Depends(x)]` metadata.
    fn annotated_dependency(&self, module: &ParsedModule, annotation: Node) -> Option<CallableRef> {
        let call = self.find_marker_call(module, annotation)?;
        let annotated = annotated_type(module, call, annotation);
        self.marker_target(module, call, annotated)
    }

    fn find_marker_call<'t>(&self, module: &ParsedModule, node: Node<'t>) -> Option<Node<'t>> {
        if self.is_marker_call(module, node) {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
        children
            .into_iter()
            .find_map(|child| self.find_marker_call(module, child))
    }
}

/// The `T` of the `Annotated[T, ...]` subscript that holds `call`.
fn annotated_type(module: &ParsedModule, call: Node, annotation: Node) -> Option<String> {
    let mut current = call.parent();
    while let Some(node) = current {
        match node.kind() {
            "type_parameter" => {
                return node
                    .named_child(0)
                    .map(|first| compact(module.node_text(first)));
            }
            "subscript" => {
                return node
                    .child_by_field_name("subscript")
                    .map(|first| compact(module.node_text(first)));
            }
            _ => {}
        }
        if node.id() == annotation.id() {
            return None;
        }
        current = node.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::signal::{OriginKind, SignalOrigin};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn reader(modules: &[(&str, &str)]) -> SourceReader {
        SourceReader::new(
            modules
                .iter()
                .map(|(name, code)| ParsedModule::from_source(name, code).unwrap())
                .collect(),
        )
    }

    fn parameter_dependencies(reader: &SourceReader, module: &str, qualname: &str) -> Vec<String> {
        let markers = AnalysisConfig::default().dependency_markers;
        let scanner = DependencyScanner::new(reader, &markers);
        let source = reader.read(&CallableRef::new(module, qualname)).unwrap();
        scanner
            .parameter_dependencies(&source)
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    #[test]
    fn test_parameter_dependency_forms() {
        let reader = reader(&[
            (
                "app.deps",
                r#"
def get_db():
    pass

def get_user():
    pass

class Pager:
    def __init__(self, page: int = 0):
        pass

class NoInit:
    pass
"#,
            ),
            (
                "app.main",
                r#"
from typing import Annotated
import fastapi
from fastapi import Depends, Security
from app import deps
from app.deps import Pager, NoInit, get_user

def handler(
    item_id: int,
    user: Annotated[dict, Security(get_user, scopes=["me"])],
    other: Annotated[Pager, Depends()],
    db=Depends(deps.get_db),
    pager: Pager = fastapi.Depends(),
    broken: NoInit = Depends(),
    q: str = "x",
):
    pass
"#,
            ),
        ]);

        assert_eq!(
            parameter_dependencies(&reader, "app.main", "handler"),
            vec![
                "app.deps:get_user",
                "app.deps:Pager.__init__",
                "app.deps:get_db",
                "app.deps:Pager.__init__",
            ]
        );
    }

    #[test]
    fn test_external_and_unmarked_defaults_are_ignored() {
        let reader = reader(&[(
            "app.main",
            r#"
from fastapi import Depends
from fastapi.security import OAuth2PasswordBearer

oauth2_scheme = OAuth2PasswordBearer(tokenUrl="token")

def helper():
    pass

def handler(token: str = Depends(oauth2_scheme), value=helper()):
    pass
"#,
        )]);

        assert!(parameter_dependencies(&reader, "app.main", "handler").is_empty());
    }

    #[test]
    fn test_sequence_dependencies() {
        let reader = reader(&[(
            "app.main",
            r#"
from fastapi import Depends

def verify_key():
    pass

def verify_token():
    pass

deps = [Depends(verify_token), Depends(verify_key), "junk"]
"#,
        )]);
        let markers = AnalysisConfig::default().dependency_markers;
        let scanner = DependencyScanner::new(&reader, &markers);
        let module = reader.module("app.main").unwrap();
        let assignment = module
            .root()
            .named_child(3)
            .and_then(|statement| statement.named_child(0))
            .unwrap();
        let list = assignment.child_by_field_name("right").unwrap();

        let found: Vec<String> = scanner
            .sequence_dependencies(module, list)
            .iter()
            .map(|c| c.qualname.clone())
            .collect();
        assert_eq!(found, vec!["verify_token", "verify_key"]);
    }

    /// Analyzer over a fixed graph that counts how often each callable is analyzed.
    struct FakeAnalyzer {
        graph: HashMap<CallableRef, (Vec<u32>, Vec<CallableRef>)>,
        calls: Mutex<Vec<CallableRef>>,
    }

    impl FakeAnalyzer {
        fn new(edges: Vec<(&str, Vec<u32>, Vec<&str>)>) -> Self {
            let graph = edges
                .into_iter()
                .map(|(name, codes, deps)| {
                    (
                        CallableRef::new("m", name),
                        (
                            codes,
                            deps.into_iter().map(|d| CallableRef::new("m", d)).collect(),
                        ),
                    )
                })
                .collect();
            Self {
                graph,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CallableAnalyzer for FakeAnalyzer {
        fn analyze(&self, callable: &CallableRef) -> Result<Arc<CallableAnalysis>> {
            self.calls.lock().unwrap().push(callable.clone());
            let Some((codes, dependencies)) = self.graph.get(callable) else {
                return Ok(Arc::new(CallableAnalysis::default()));
            };
            let signals = codes
                .iter()
                .map(|code| FailureSignal {
                    status_code: *code,
                    description: None,
                    headers: None,
                    origin: SignalOrigin {
                        kind: OriginKind::RaiseSite,
                        callable: callable.clone(),
                        line: 1,
                    },
                })
                .collect();
            Ok(Arc::new(CallableAnalysis {
                signals,
                dependencies: dependencies.clone(),
            }))
        }
    }

    fn codes(signals: &[FailureSignal]) -> Vec<u32> {
        signals.iter().map(|s| s.status_code).collect()
    }

    #[test]
    fn test_breadth_first_order_with_route_dependencies_first() {
        let analyzer = FakeAnalyzer::new(vec![
            ("handler", vec![400], vec!["param_dep"]),
            ("route_dep", vec![401], vec!["deep"]),
            ("param_dep", vec![403], vec![]),
            ("deep", vec![404], vec![]),
        ]);

        let signals = collect(
            &analyzer,
            &CallableRef::new("m", "handler"),
            &[CallableRef::new("m", "route_dep")],
        )
        .unwrap();

        assert_eq!(codes(&signals), vec![400, 401, 403, 404]);
    }

    #[test]
    fn test_diamond_and_cycle_analyzed_once() {
        let analyzer = FakeAnalyzer::new(vec![
            ("handler", vec![], vec!["left", "right"]),
            ("left", vec![401], vec!["shared"]),
            ("right", vec![403], vec!["shared"]),
            ("shared", vec![404], vec!["handler", "left"]),
        ]);

        let signals = collect(&analyzer, &CallableRef::new("m", "handler"), &[]).unwrap();

        assert_eq!(codes(&signals), vec![401, 403, 404]);
        let calls = analyzer.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
    }

    #[test]
    fn test_deep_chain() {
        let names: Vec<String> = (0..50).map(|i| format!("dep{}", i)).collect();
        let edges = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let next: Vec<&str> = names.get(i + 1).map(|n| n.as_str()).into_iter().collect();
                let codes = if i == 49 { vec![418] } else { vec![] };
                (name.as_str(), codes, next)
            })
            .collect();
        let analyzer = FakeAnalyzer::new(edges);

        let signals = collect(&analyzer, &CallableRef::new("m", "dep0"), &[]).unwrap();

        assert_eq!(codes(&signals), vec![418]);
    }
}
