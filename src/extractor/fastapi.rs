use crate::config::AnalysisConfig;
use crate::dependencies::DependencyScanner;
use crate::docstring::docstring_text;
use crate::extractor::{HttpMethod, Parameter, ParameterLocation, RouteExtractor, RouteInfo};
use crate::parser::ParsedModule;
use crate::raises::status_constant;
use crate::reader::{CallableRef, SourceReader, Symbol};
use crate::responses::{ResponseEntry, ResponseTable};
use crate::signal::Headers;
use crate::symbols::{compact, ConstValue};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// Qualified names of FastAPI application classes.
const APP_TYPES: &[&str] = &["fastapi.FastAPI", "fastapi.applications.FastAPI"];

/// Qualified names of FastAPI router classes.
const ROUTER_TYPES: &[&str] = &["fastapi.APIRouter", "fastapi.routing.APIRouter"];

/// Parameter types FastAPI injects itself; they never become request parameters.
const INJECTED_TYPES: &[&str] = &[
    "Request",
    "Response",
    "WebSocket",
    "HTTPConnection",
    "BackgroundTasks",
    "SecurityScopes",
];

/// Upper bound on nested `include_router` levels.
const MAX_MOUNT_DEPTH: usize = 16;

/// `{name}` and `{name:path}` placeholders of a route path.
static PATH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}:]+)(?::[^}]*)?\}").expect("path parameter pattern is valid"));

/// FastAPI route extractor
///
/// Finds `FastAPI()` applications and `APIRouter()` instances bound at module level, follows
/// `include_router` calls to compute prefixes, tags and dependencies, and turns every
/// `@app.get(...)`-style decorated function into a route.
pub struct FastApiExtractor {
    markers: Vec<String>,
    status_modules: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterKind {
    App,
    Router,
}

/// A module-level `FastAPI()` / `APIRouter()` binding.
#[derive(Debug, Clone)]
struct RouterDecl {
    kind: RouterKind,
    prefix: String,
    dependencies: Vec<CallableRef>,
    tags: Vec<String>,
}

/// One `parent.include_router(child, ...)` call.
#[derive(Debug, Clone)]
struct Include {
    parent: String,
    prefix: String,
    dependencies: Vec<CallableRef>,
    tags: Vec<String>,
}

/// Everything that applies to a router's routes from the routers above it.
#[derive(Debug, Clone, Default)]
struct Mount {
    prefix: String,
    dependencies: Vec<CallableRef>,
    tags: Vec<String>,
}

/// Routers and includes of the whole project.
struct RouterIndex {
    routers: HashMap<String, RouterDecl>,
    includes: HashMap<String, Vec<Include>>,
}

/// Decorator arguments of one route.
struct RouteDecorator<'a> {
    router: String,
    methods: Vec<HttpMethod>,
    call: Node<'a>,
}

impl FastApiExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            markers: config.dependency_markers.clone(),
            status_modules: config.status_modules.clone(),
        }
    }

    fn index(&self, reader: &SourceReader, scanner: &DependencyScanner) -> RouterIndex {
        let mut routers = HashMap::new();
        for module in reader.modules() {
            self.collect_routers(reader, scanner, module, &mut routers);
        }
        debug!("Found {} FastAPI applications and routers", routers.len());

        let mut includes: HashMap<String, Vec<Include>> = HashMap::new();
        for module in reader.modules() {
            let mut calls = Vec::new();
            collect_calls(module.root(), &mut calls);
            for call in calls {
                if let Some((child, include)) =
                    self.parse_include(reader, scanner, module, call, &routers)
                {
                    includes.entry(child).or_default().push(include);
                }
            }
        }

        RouterIndex { routers, includes }
    }

    fn collect_routers(
        &self,
        reader: &SourceReader,
        scanner: &DependencyScanner,
        module: &ParsedModule,
        routers: &mut HashMap<String, RouterDecl>,
    ) {
        let mut cursor = module.root().walk();
        let statements: Vec<Node> = module.root().named_children(&mut cursor).collect();
        for statement in statements {
            if statement.kind() != "expression_statement" {
                continue;
            }
            let Some(assignment) = statement.named_child(0).filter(|n| n.kind() == "assignment")
            else {
                continue;
            };
            let (Some(left), Some(right)) = (
                assignment.child_by_field_name("left"),
                assignment.child_by_field_name("right"),
            ) else {
                continue;
            };
            if left.kind() != "identifier" || right.kind() != "call" {
                continue;
            }

            let Some(kind) = self.router_kind(reader, module, right) else {
                continue;
            };
            let arguments = module.call_arguments(right);
            let key = format!("{}.{}", module.name, module.node_text(left));
            debug!("Found {:?} {}", kind, key);
            routers.insert(
                key,
                RouterDecl {
                    kind,
                    prefix: arguments
                        .keyword("prefix")
                        .and_then(|n| module.string_value(n))
                        .unwrap_or_default(),
                    dependencies: arguments
                        .keyword("dependencies")
                        .map(|n| scanner.sequence_dependencies(module, n))
                        .unwrap_or_default(),
                    tags: arguments
                        .keyword("tags")
                        .map(|n| string_list(module, n))
                        .unwrap_or_default(),
                },
            );
        }
    }

    fn router_kind(
        &self,
        reader: &SourceReader,
        module: &ParsedModule,
        call: Node,
    ) -> Option<RouterKind> {
        let callee = call.child_by_field_name("function")?;
        let qualified = reader
            .resolve(&module.name, &compact(module.node_text(callee)))?
            .qualified_name()?;
        if APP_TYPES.contains(&qualified.as_str()) {
            Some(RouterKind::App)
        } else if ROUTER_TYPES.contains(&qualified.as_str()) {
            Some(RouterKind::Router)
        } else {
            None
        }
    }

    /// Key of the router an expression refers to.
    fn router_key(
        &self,
        reader: &SourceReader,
        module: &ParsedModule,
        expression: Node,
        routers: &HashMap<String, RouterDecl>,
    ) -> Option<String> {
        if !matches!(expression.kind(), "identifier" | "attribute") {
            return None;
        }
        match reader.resolve(&module.name, &compact(module.node_text(expression)))? {
            Symbol::External(qualified) if routers.contains_key(&qualified) => Some(qualified),
            _ => None,
        }
    }

    fn parse_include(
        &self,
        reader: &SourceReader,
        scanner: &DependencyScanner,
        module: &ParsedModule,
        call: Node,
        routers: &HashMap<String, RouterDecl>,
    ) -> Option<(String, Include)> {
        let function = call.child_by_field_name("function")?;
        if function.kind() != "attribute" {
            return None;
        }
        let attribute = function.child_by_field_name("attribute")?;
        if module.node_text(attribute) != "include_router" {
            return None;
        }
        let parent = self.router_key(reader, module, function.child_by_field_name("object")?, routers)?;
        let arguments = module.call_arguments(call);
        let child = self.router_key(reader, module, arguments.get(0, "router")?, routers)?;

        debug!("{} includes {}", parent, child);
        Some((
            child,
            Include {
                parent,
                prefix: arguments
                    .keyword("prefix")
                    .and_then(|n| module.string_value(n))
                    .unwrap_or_default(),
                dependencies: arguments
                    .keyword("dependencies")
                    .map(|n| scanner.sequence_dependencies(module, n))
                    .unwrap_or_default(),
                tags: arguments
                    .keyword("tags")
                    .map(|n| string_list(module, n))
                    .unwrap_or_default(),
            },
        ))
    }

    /// Every place the router's routes end up in, outermost application first.
    fn mounts(&self, index: &RouterIndex, key: &str, depth: usize) -> Vec<Mount> {
        let includes = index.includes.get(key).map(Vec::as_slice).unwrap_or_default();
        let is_app = index
            .routers
            .get(key)
            .is_some_and(|r| r.kind == RouterKind::App);
        if is_app || includes.is_empty() {
            return vec![Mount::default()];
        }
        if depth > MAX_MOUNT_DEPTH {
            warn!("Router {} is included too deeply; ignoring its mounts", key);
            return vec![Mount::default()];
        }

        let mut mounts = Vec::new();
        for include in includes {
            let Some(parent) = index.routers.get(&include.parent) else {
                continue;
            };
            for outer in self.mounts(index, &include.parent, depth + 1) {
                mounts.push(Mount {
                    prefix: format!("{}{}{}", outer.prefix, parent.prefix, include.prefix),
                    dependencies: [
                        outer.dependencies,
                        parent.dependencies.clone(),
                        include.dependencies.clone(),
                    ]
                    .concat(),
                    tags: [outer.tags, parent.tags.clone(), include.tags.clone()].concat(),
                });
            }
        }
        mounts
    }

    fn route_decorator<'a>(
        &self,
        reader: &SourceReader,
        module: &'a ParsedModule,
        decorator: Node<'a>,
        routers: &HashMap<String, RouterDecl>,
    ) -> Option<RouteDecorator<'a>> {
        let call = decorator.named_child(0).filter(|n| n.kind() == "call")?;
        let function = call.child_by_field_name("function")?;
        if function.kind() != "attribute" {
            return None;
        }
        let method_name = module.node_text(function.child_by_field_name("attribute")?);
        let router = self.router_key(reader, module, function.child_by_field_name("object")?, routers)?;

        let methods = if method_name == "api_route" {
            let arguments = module.call_arguments(call);
            match arguments.keyword("methods") {
                Some(node) => string_list(module, node)
                    .iter()
                    .filter_map(|m| HttpMethod::parse(m))
                    .collect(),
                None => vec![HttpMethod::Get],
            }
        } else {
            vec![HttpMethod::parse(method_name)?]
        };

        Some(RouteDecorator {
            router,
            methods,
            call,
        })
    }

    fn collect_routes(
        &self,
        reader: &SourceReader,
        scanner: &DependencyScanner,
        module: &ParsedModule,
        index: &RouterIndex,
        routes: &mut Vec<RouteInfo>,
    ) {
        let mut cursor = module.root().walk();
        let statements: Vec<Node> = module.root().named_children(&mut cursor).collect();
        for statement in statements {
            if statement.kind() != "decorated_definition" {
                continue;
            }
            let Some(function) = statement
                .child_by_field_name("definition")
                .filter(|d| d.kind() == "function_definition")
            else {
                continue;
            };
            let Some(name) = function.child_by_field_name("name") else {
                continue;
            };
            let handler = CallableRef::new(module.name.clone(), module.node_text(name));

            let mut cursor = statement.walk();
            let decorators: Vec<Node> = statement
                .named_children(&mut cursor)
                .filter(|n| n.kind() == "decorator")
                .collect();
            // decorators apply bottom-up
            for decorator in decorators.into_iter().rev() {
                let Some(route) = self.route_decorator(reader, module, decorator, &index.routers)
                else {
                    continue;
                };
                routes.extend(self.build_routes(reader, scanner, module, index, &route, &handler));
            }
        }
    }

    fn build_routes(
        &self,
        reader: &SourceReader,
        scanner: &DependencyScanner,
        module: &ParsedModule,
        index: &RouterIndex,
        decorator: &RouteDecorator,
        handler: &CallableRef,
    ) -> Vec<RouteInfo> {
        let arguments = module.call_arguments(decorator.call);
        let Some(path) = arguments
            .get(0, "path")
            .and_then(|n| module.string_value(n))
        else {
            warn!("Route of {} has no literal path; skipping", handler);
            return Vec::new();
        };
        if arguments
            .keyword("include_in_schema")
            .is_some_and(|n| n.kind() == "false")
        {
            debug!("Route {} is excluded from the schema", path);
            return Vec::new();
        }
        let Some(router) = index.routers.get(&decorator.router) else {
            return Vec::new();
        };

        let text = |keyword: &str| {
            arguments
                .keyword(keyword)
                .and_then(|n| module.string_value(n))
        };
        let route_tags = arguments
            .keyword("tags")
            .map(|n| string_list(module, n))
            .unwrap_or_default();
        let route_dependencies = arguments
            .keyword("dependencies")
            .map(|n| scanner.sequence_dependencies(module, n))
            .unwrap_or_default();
        let explicit_responses = arguments
            .keyword("responses")
            .map(|n| self.explicit_responses(reader, module, n))
            .unwrap_or_default();
        let status_code = arguments
            .keyword("status_code")
            .and_then(|n| self.status_code(reader, module, n));
        let description = text("description").or_else(|| {
            reader
                .read(handler)
                .ok()
                .and_then(|source| docstring_text(&source))
                .map(|doc| doc.split('\u{c}').next().unwrap_or_default().to_string())
        });

        let mut routes = Vec::new();
        for mount in self.mounts(index, &decorator.router, 0) {
            let full_path = format!("{}{}{}", mount.prefix, router.prefix, path);
            let dependencies = [
                mount.dependencies.clone(),
                router.dependencies.clone(),
                route_dependencies.clone(),
            ]
            .concat();

            let mut parameters = Vec::new();
            let mut has_body = false;
            let path_params = path_parameters(&full_path);
            let mut visited = HashSet::new();
            for callable in std::iter::once(handler).chain(dependencies.iter()) {
                self.collect_parameters(
                    reader,
                    scanner,
                    callable,
                    &path_params,
                    &mut visited,
                    &mut parameters,
                    &mut has_body,
                );
            }

            for method in &decorator.methods {
                let mut route = RouteInfo::new(full_path.clone(), *method, handler.clone());
                route.summary = text("summary");
                route.description = description.clone();
                route.operation_id = text("operation_id");
                route.tags = [mount.tags.clone(), router.tags.clone(), route_tags.clone()].concat();
                route.deprecated = arguments
                    .keyword("deprecated")
                    .is_some_and(|n| n.kind() == "true");
                route.parameters = parameters.clone();
                route.has_body = has_body;
                route.status_code = status_code.clone();
                route.response_description = text("response_description");
                route.explicit_responses = explicit_responses.clone();
                route.dependencies = dependencies.clone();
                debug!("Found route {} {} -> {}", method.as_str(), full_path, handler);
                routes.push(route);
            }
        }
        routes
    }

    fn status_code(&self, reader: &SourceReader, module: &ParsedModule, node: Node) -> Option<String> {
        let value = match node.kind() {
            "integer" | "unary_operator" => module.int_value(node),
            "identifier" | "attribute" => {
                match reader.resolve(&module.name, &compact(module.node_text(node)))? {
                    Symbol::Constant(ConstValue::Int(value)) => Some(value),
                    Symbol::External(qualified) => status_constant(&qualified, &self.status_modules),
                    _ => None,
                }
            }
            "string" => return module.string_value(node),
            _ => None,
        }?;
        Some(value.to_string())
    }

    /// Responses declared with `responses={404: {"description": ...}, ...}`.
    fn explicit_responses(
        &self,
        reader: &SourceReader,
        module: &ParsedModule,
        node: Node,
    ) -> ResponseTable {
        let mut table = ResponseTable::new();
        if node.kind() != "dictionary" {
            debug!("Non-literal responses= in {}; ignoring", module.name);
            return table;
        }

        for (key, value) in module.dict_pairs(node) {
            let Some(status) = self.status_code(reader, module, key) else {
                continue;
            };
            if value.kind() != "dictionary" {
                continue;
            }

            let mut entry = ResponseEntry::new("");
            for (field, field_value) in module.dict_pairs(value) {
                let Some(field) = module.string_value(field) else {
                    continue;
                };
                match field.as_str() {
                    "description" => {
                        entry.description = module.string_value(field_value).unwrap_or_default();
                    }
                    "headers" if field_value.kind() == "dictionary" => {
                        let headers: Headers = module
                            .dict_pairs(field_value)
                            .into_iter()
                            .filter_map(|(name, header)| {
                                Some((module.string_value(name)?, module.literal_value(header)?))
                            })
                            .collect();
                        entry.headers = Some(headers);
                    }
                    // response models need schema generation
                    "model" => {}
                    _ => {
                        if let Some(literal) = module.literal_value(field_value) {
                            entry.extra.insert(field.clone(), literal);
                        }
                    }
                }
            }
            table.insert_if_absent(status, entry);
        }
        table
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_parameters(
        &self,
        reader: &SourceReader,
        scanner: &DependencyScanner,
        callable: &CallableRef,
        path_params: &[String],
        visited: &mut HashSet<CallableRef>,
        parameters: &mut Vec<Parameter>,
        has_body: &mut bool,
    ) {
        if !visited.insert(callable.clone()) {
            return;
        }
        let Ok(source) = reader.read(callable) else {
            return;
        };
        let Some(parameter_list) = source
            .node()
            .and_then(|function| function.child_by_field_name("parameters"))
        else {
            return;
        };
        let module = source.module.as_ref();
        let is_method = callable.qualname.contains('.');

        let mut cursor = parameter_list.walk();
        let nodes: Vec<Node> = parameter_list.named_children(&mut cursor).collect();
        for (position, node) in nodes.into_iter().enumerate() {
            let name_node = match node.kind() {
                "identifier" => Some(node),
                "typed_parameter" => node.named_child(0).filter(|n| n.kind() == "identifier"),
                "default_parameter" | "typed_default_parameter" => node.child_by_field_name("name"),
                _ => None,
            };
            let Some(name_node) = name_node else {
                continue;
            };
            if is_method && position == 0 {
                continue;
            }
            if scanner.declares_dependency(module, node) {
                continue;
            }

            let name = module.node_text(name_node).to_string();
            let annotation = node
                .child_by_field_name("type")
                .map(|t| compact(module.node_text(t)));
            if annotation
                .as_deref()
                .is_some_and(|a| self.is_injected(reader, module, a))
            {
                continue;
            }
            let default = node.child_by_field_name("value");

            if let Some(parameter) = self.request_parameter(
                reader,
                module,
                node,
                &name,
                annotation.as_deref(),
                default,
                path_params,
                has_body,
            ) {
                if !parameters
                    .iter()
                    .any(|p| p.name == parameter.name && p.location == parameter.location)
                {
                    parameters.push(parameter);
                }
            }
        }

        for dependency in scanner.parameter_dependencies(&source) {
            self.collect_parameters(
                reader,
                scanner,
                &dependency,
                path_params,
                visited,
                parameters,
                has_body,
            );
        }
    }

    /// The request parameter a handler argument becomes; `None` when it is part of the body.
    #[allow(clippy::too_many_arguments)]
    fn request_parameter(
        &self,
        reader: &SourceReader,
        module: &ParsedModule,
        node: Node,
        name: &str,
        annotation: Option<&str>,
        default: Option<Node>,
        path_params: &[String],
        has_body: &mut bool,
    ) -> Option<Parameter> {
        let schema_type = annotation.and_then(schema_type);
        let param_call = node
            .child_by_field_name("type")
            .and_then(|a| find_call(a, &|call: Node| param_function(reader, module, call).is_some()))
            .or_else(|| default.filter(|d| param_function(reader, module, *d).is_some()));

        if let Some(call) = param_call {
            let function = param_function(reader, module, call)?;
            let arguments = module.call_arguments(call);
            let location = match function {
                "Path" => ParameterLocation::Path,
                "Query" => ParameterLocation::Query,
                "Header" => ParameterLocation::Header,
                "Cookie" => ParameterLocation::Cookie,
                // Body, Form, File
                _ => {
                    *has_body = true;
                    return None;
                }
            };
            let call_default = if default.is_some_and(|d| d.id() == call.id()) {
                arguments.get(0, "default")
            } else {
                default
            };
            let required = location == ParameterLocation::Path
                || call_default.map_or(true, |d| d.kind() == "ellipsis");
            let alias = arguments.keyword("alias").and_then(|n| module.string_value(n));
            let converts = !arguments
                .keyword("convert_underscores")
                .is_some_and(|n| n.kind() == "false");
            let wire_name = match (alias, location) {
                (Some(alias), _) => alias,
                (None, ParameterLocation::Header) if converts => name.replace('_', "-"),
                (None, _) => name.to_string(),
            };
            return Some(Parameter::new(wire_name, location, schema_type, required));
        }

        if path_params.iter().any(|p| p == name) {
            return Some(Parameter::new(name, ParameterLocation::Path, schema_type, true));
        }
        if annotation.is_some() && schema_type.is_none() {
            // a model or other complex type is read from the body
            *has_body = true;
            return None;
        }
        let required = default.map_or(true, |d| d.kind() == "ellipsis");
        Some(Parameter::new(name, ParameterLocation::Query, schema_type, required))
    }

    fn is_injected(&self, reader: &SourceReader, module: &ParsedModule, annotation: &str) -> bool {
        let Some(qualified) = reader
            .resolve(&module.name, annotation)
            .and_then(|symbol| symbol.qualified_name())
        else {
            return false;
        };
        let framework = qualified.starts_with("fastapi.") || qualified.starts_with("starlette.");
        let name = qualified.rsplit('.').next().unwrap_or_default();
        framework && INJECTED_TYPES.contains(&name)
    }
}

impl RouteExtractor for FastApiExtractor {
    fn extract_routes(&self, reader: &SourceReader) -> Vec<RouteInfo> {
        let scanner = DependencyScanner::new(reader, &self.markers);
        let index = self.index(reader, &scanner);

        let mut routes = Vec::new();
        for module in reader.modules() {
            self.collect_routes(reader, &scanner, module, &index, &mut routes);
        }
        debug!("Extracted {} FastAPI routes", routes.len());
        routes
    }
}

/// Name of the FastAPI parameter function (`Query`, `Header`, ...) a call invokes.
fn param_function(reader: &SourceReader, module: &ParsedModule, call: Node) -> Option<&'static str> {
    if call.kind() != "call" {
        return None;
    }
    let callee = call.child_by_field_name("function")?;
    let qualified = reader
        .resolve(&module.name, &compact(module.node_text(callee)))?
        .qualified_name()?;
    if !qualified.starts_with("fastapi.") {
        return None;
    }
    ["Path", "Query", "Header", "Cookie", "Body", "Form", "File"]
        .into_iter()
        .find(|name| qualified.rsplit('.').next() == Some(*name))
}

fn find_call<'t>(node: Node<'t>, predicate: &dyn Fn(Node) -> bool) -> Option<Node<'t>> {
    if node.kind() == "call" && predicate(node) {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| find_call(child, predicate))
}

fn collect_calls<'t>(node: Node<'t>, calls: &mut Vec<Node<'t>>) {
    if node.kind() == "call" {
        calls.push(node);
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_calls(child, calls);
    }
}

fn string_list(module: &ParsedModule, node: Node) -> Vec<String> {
    if !matches!(node.kind(), "list" | "tuple") {
        return Vec::new();
    }
    let mut cursor = node.walk();
    let items: Vec<Node> = node.named_children(&mut cursor).collect();
    items
        .into_iter()
        .filter_map(|item| module.string_value(item))
        .collect()
}

/// Names of the `{placeholders}` of a path.
fn path_parameters(path: &str) -> Vec<String> {
    PATH_PARAM
        .captures_iter(path)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// JSON schema type of a simple annotation; `None` for models and other complex types.
fn schema_type(annotation: &str) -> Option<String> {
    let annotation = annotation.strip_prefix("typing.").unwrap_or(annotation);

    if let Some(inner) = subscript(annotation, &["Annotated"]) {
        return schema_type(split_top_level(inner).first()?);
    }
    if let Some(inner) = subscript(annotation, &["Optional"]) {
        return schema_type(inner);
    }
    let union: Vec<&str> = if let Some(inner) = subscript(annotation, &["Union"]) {
        split_top_level(inner)
    } else {
        split_top_level_on(annotation, '|')
    };
    if union.len() > 1 {
        let members: Vec<&str> = union.into_iter().filter(|m| *m != "None").collect();
        return match members.as_slice() {
            [single] => schema_type(single),
            _ => None,
        };
    }
    if let Some(inner) = subscript(
        annotation,
        &["List", "list", "Set", "set", "FrozenSet", "frozenset", "Sequence", "Tuple", "tuple"],
    ) {
        let item = split_top_level(inner).first().copied()?;
        return schema_type(item).map(|_| "array".to_string());
    }
    if subscript(annotation, &["Literal"]).is_some() {
        return Some("string".to_string());
    }

    let name = annotation.rsplit('.').next().unwrap_or(annotation);
    let json_type = match name {
        "int" => "integer",
        "float" | "Decimal" => "number",
        "bool" => "boolean",
        "str" | "bytes" | "UUID" | "date" | "datetime" | "time" | "timedelta" | "EmailStr"
        | "HttpUrl" => "string",
        _ => return None,
    };
    Some(json_type.to_string())
}

/// Inner text of `Name[...]` for any of `names`.
fn subscript<'a>(annotation: &'a str, names: &[&str]) -> Option<&'a str> {
    let (head, rest) = annotation.split_once('[')?;
    let head = head.rsplit('.').next().unwrap_or(head);
    if !names.contains(&head) {
        return None;
    }
    rest.strip_suffix(']')
}

fn split_top_level(text: &str) -> Vec<&str> {
    split_top_level_on(text, ',')
}

/// Splits on `separator` outside of brackets.
fn split_top_level_on(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}
