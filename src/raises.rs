//! Raise-site extraction: every construction of an HTTP failure type inside a callable body.

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::parser::ParsedModule;
use crate::reader::{CallableSource, Symbol};
use crate::signal::{FailureSignal, Headers, OriginKind, SignalOrigin};
use crate::symbols::{compact, ConstValue};
use crate::type_resolver::FailureTypeResolver;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor};

/// Call expressions whose callee is a plain or dotted name.
const CALL_QUERY: &str = r#"
(call
  function: [(identifier) (attribute)] @callee
  arguments: (argument_list)) @call
"#;

/// Status constant names such as `HTTP_404_NOT_FOUND`.
static STATUS_CONSTANT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^HTTP_(\d{3})(?:_|$)").expect("status constant pattern is valid")
});

/// Node kinds that open a scope belonging to another callable.
const NESTED_SCOPES: &[&str] = &["function_definition", "class_definition", "lambda"];

/// Lowest and highest status codes accepted from source.
const STATUS_RANGE: std::ops::RangeInclusive<i64> = 100..=99_999;

/// Finds the failure signals raised directly in a callable's body.
pub struct RaiseSiteExtractor {
    query: Query,
    call_index: u32,
    callee_index: u32,
    status_modules: Vec<String>,
}

impl RaiseSiteExtractor {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let query = Query::new(&tree_sitter_python::LANGUAGE.into(), CALL_QUERY)?;
        let call_index = query.capture_index_for_name("call").unwrap_or(0);
        let callee_index = query.capture_index_for_name("callee").unwrap_or(0);
        Ok(Self {
            query,
            call_index,
            callee_index,
            status_modules: config.status_modules.clone(),
        })
    }

    /// Signals of every failure-type construction in the body of `source`, in source order.
    ///
    /// Constructions whose status code cannot be resolved statically are skipped.
    pub fn extract(
        &self,
        source: &CallableSource,
        resolver: &FailureTypeResolver,
    ) -> Vec<FailureSignal> {
        let (Some(function), Some(body)) = (source.node(), source.body()) else {
            return Vec::new();
        };
        let module = source.module.as_ref();

        let mut sites: Vec<(Node, Node)> = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, body, module.source.as_bytes());
        while let Some(m) = matches.next() {
            let mut call = None;
            let mut callee = None;
            for capture in m.captures {
                if capture.index == self.call_index {
                    call = Some(capture.node);
                } else if capture.index == self.callee_index {
                    callee = Some(capture.node);
                }
            }
            if let (Some(call), Some(callee)) = (call, callee) {
                if belongs_to(call, function) {
                    sites.push((call, callee));
                }
            }
        }
        sites.sort_by_key(|(call, _)| call.start_byte());

        let mut signals = Vec::new();
        for (call, callee) in sites {
            let callee_name = compact(module.node_text(callee));
            if !resolver.is_failure_type(&callee_name, source) {
                continue;
            }
            match self.signal_at(source, resolver, call) {
                Some(signal) => {
                    debug!("Raise site {} -> {}", callee_name, signal);
                    signals.push(signal);
                }
                None => debug!(
                    "Skipping {} at {} line {}: status code is not static",
                    callee_name,
                    source.callable,
                    call.start_position().row + 1
                ),
            }
        }
        signals
    }

    fn signal_at(
        &self,
        source: &CallableSource,
        resolver: &FailureTypeResolver,
        call: Node,
    ) -> Option<FailureSignal> {
        let module = source.module.as_ref();
        let arguments = module.call_arguments(call);

        let status_code = self.status_code(source, resolver, arguments.get(0, "status_code")?)?;
        let description = arguments
            .get(1, "detail")
            .and_then(|node| description(source, resolver, node));
        let headers = arguments
            .get(2, "headers")
            .and_then(|node| headers(module, node));

        Some(FailureSignal {
            status_code,
            description,
            headers,
            origin: SignalOrigin {
                kind: OriginKind::RaiseSite,
                callable: source.callable.clone(),
                line: call.start_position().row + 1,
            },
        })
    }

    fn status_code(
        &self,
        source: &CallableSource,
        resolver: &FailureTypeResolver,
        node: Node,
    ) -> Option<u32> {
        let module = source.module.as_ref();
        let value = match node.kind() {
            "integer" | "unary_operator" | "parenthesized_expression" => module.int_value(node),
            "identifier" | "attribute" => {
                let name = compact(module.node_text(node));
                match resolver.reader().resolve_from(source, &name)? {
                    Symbol::Constant(ConstValue::Int(value)) => Some(value),
                    Symbol::External(qualified) => {
                        status_constant(&qualified, &self.status_modules)
                    }
                    _ => None,
                }
            }
            _ => None,
        }?;

        if STATUS_RANGE.contains(&value) {
            u32::try_from(value).ok()
        } else {
            debug!("Status code {} out of range in {}", value, source.callable);
            None
        }
    }
}

/// Code named by a constant of a well-known status module (`starlette.status.HTTP_404_NOT_FOUND`).
pub fn status_constant(qualified: &str, status_modules: &[String]) -> Option<i64> {
    let (module, name) = qualified.rsplit_once('.')?;
    if !status_modules.iter().any(|m| m == module) {
        return None;
    }
    STATUS_CONSTANT
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|code| code.as_str().parse().ok())
}

/// Whether `node` lies in the body of `function` itself rather than a nested scope.
fn belongs_to(node: Node, function: Node) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.id() == function.id() {
            return true;
        }
        if NESTED_SCOPES.contains(&parent.kind()) {
            return false;
        }
        current = parent.parent();
    }
    false
}

fn description(
    source: &CallableSource,
    resolver: &FailureTypeResolver,
    node: Node,
) -> Option<String> {
    let module = source.module.as_ref();
    match node.kind() {
        "string" | "concatenated_string" | "parenthesized_expression" => module.string_value(node),
        "identifier" | "attribute" => {
            let name = compact(module.node_text(node));
            match resolver.reader().resolve_from(source, &name)? {
                Symbol::Constant(ConstValue::Str(value)) => Some(value),
                _ => None,
            }
        }
        _ => None,
    }
}

fn headers(module: &ParsedModule, node: Node) -> Option<Headers> {
    if node.kind() != "dictionary" {
        return None;
    }
    let mut headers = Headers::new();
    for (key, value) in module.dict_pairs(node) {
        let name = match key.kind() {
            "string" | "concatenated_string" => module.string_value(key)?,
            _ => return None,
        };
        let value = match value.kind() {
            "string" | "concatenated_string" => Value::String(module.string_value(value)?),
            "integer" | "unary_operator" => Value::from(module.int_value(value)?),
            _ => return None,
        };
        headers.insert(name, value);
    }
    Some(headers)
}
