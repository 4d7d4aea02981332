//! Route extraction module for finding endpoint definitions in Python web projects.
//!
//! Each framework has its own extractor implementation that knows how to read the
//! framework's route declarations out of parsed modules.
//!
//! # Supported Frameworks
//!
//! - **FastAPI**: See [`fastapi::FastApiExtractor`]
//!
//! # Example
//!
//! ```no_run
//! use fastapi_derive_responses::config::AnalysisConfig;
//! use fastapi_derive_responses::extractor::{fastapi::FastApiExtractor, RouteExtractor};
//! use fastapi_derive_responses::parser::ParsedModule;
//! use fastapi_derive_responses::reader::SourceReader;
//!
//! let module = ParsedModule::from_source("app.main", "app = FastAPI()").unwrap();
//! let reader = SourceReader::new(vec![module]);
//! let extractor = FastApiExtractor::new(&AnalysisConfig::default());
//! let routes = extractor.extract_routes(&reader);
//! println!("Found {} routes", routes.len());
//! ```

pub mod fastapi;

use crate::reader::{CallableRef, SourceReader};
use crate::responses::ResponseTable;

/// Trait for extracting route information from the modules of a project.
pub trait RouteExtractor {
    /// Extracts all route information from the project behind `reader`.
    ///
    /// Routes are returned in module order, then in declaration order within a module.
    fn extract_routes(&self, reader: &SourceReader) -> Vec<RouteInfo>;
}

/// Complete information about a single API endpoint.
///
/// Carries what the document builder needs for the operation plus the handler and route-level
/// dependencies the response derivation starts from.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    /// The URL path pattern including router prefixes (e.g., "/users/{user_id}")
    pub path: String,
    /// The HTTP method for this route
    pub method: HttpMethod,
    /// The handler function
    pub handler: CallableRef,
    /// The name of the handler function
    pub handler_name: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub operation_id: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
    /// List of parameters extracted from the handler signature
    pub parameters: Vec<Parameter>,
    /// Whether the handler takes a request body
    pub has_body: bool,
    /// Success status code declared with `status_code=`
    pub status_code: Option<String>,
    /// Description of the success response declared with `response_description=`
    pub response_description: Option<String>,
    /// Responses declared with `responses=`
    pub explicit_responses: ResponseTable,
    /// Router-level then route-level `dependencies=`
    pub dependencies: Vec<CallableRef>,
}

/// HTTP methods supported by route extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    Trace,
}

impl HttpMethod {
    /// Parses a decorator or `methods=` name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "options" => Some(HttpMethod::Options),
            "head" => Some(HttpMethod::Head),
            "trace" => Some(HttpMethod::Trace),
            _ => None,
        }
    }

    /// Lowercase name, as used for OpenAPI path item keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
            HttpMethod::Trace => "trace",
        }
    }
}

/// Information about a single parameter in a route handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// The parameter name (alias applied)
    pub name: String,
    /// Where the parameter is extracted from
    pub location: ParameterLocation,
    /// JSON schema type of simple annotations (`int` -> `integer`)
    pub schema_type: Option<String>,
    /// Whether the parameter is required
    pub required: bool,
}

/// The location where a parameter value is extracted from in an HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLocation {
    /// Path parameter embedded in the URL (e.g., `/users/{id}`)
    Path,
    /// Query string parameter (e.g., `?page=1&limit=10`)
    Query,
    /// HTTP header parameter
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

impl RouteInfo {
    /// Create a new RouteInfo with minimal required fields
    pub fn new(path: impl Into<String>, method: HttpMethod, handler: CallableRef) -> Self {
        let handler_name = handler
            .qualname
            .rsplit('.')
            .next()
            .unwrap_or(&handler.qualname)
            .to_string();
        Self {
            path: path.into(),
            method,
            handler,
            handler_name,
            summary: None,
            description: None,
            operation_id: None,
            tags: Vec::new(),
            deprecated: false,
            parameters: Vec::new(),
            has_body: false,
            status_code: None,
            response_description: None,
            explicit_responses: ResponseTable::new(),
            dependencies: Vec::new(),
        }
    }
}

impl Parameter {
    /// Create a new Parameter
    pub fn new(
        name: impl Into<String>,
        location: ParameterLocation,
        schema_type: Option<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            schema_type,
            required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("trace"), Some(HttpMethod::Trace));
        assert_eq!(HttpMethod::parse("websocket"), None);
        assert_eq!(HttpMethod::Patch.as_str(), "patch");
    }

    #[test]
    fn test_route_info_handler_name() {
        let route = RouteInfo::new(
            "/users",
            HttpMethod::Post,
            CallableRef::new("app.routers.users", "create_user"),
        );
        assert_eq!(route.handler_name, "create_user");
        assert!(route.explicit_responses.is_empty());
    }
}
