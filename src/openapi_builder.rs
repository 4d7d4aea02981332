use crate::extractor::{HttpMethod, ParameterLocation, RouteInfo};
use crate::responses::{reason_phrase, ResponseEntry, ResponseTable};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Version of the OpenAPI specification the document follows
const OPENAPI_VERSION: &str = "3.1.0";

/// Status code keys that already cover request validation failures
const VALIDATION_KEYS: &[&str] = &["422", "4XX", "default"];

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W").expect("non-word pattern is valid"));

/// OpenAPI document builder
///
/// Lays out operations the way FastAPI's own schema generation does: the success response
/// first, then every entry of the response table, then `422 Validation Error` for operations
/// that read parameters or a body.
pub struct OpenApiBuilder {
    /// OpenAPI info section
    info: Info,
    /// Paths collection (URL path -> PathItem)
    paths: BTreeMap<String, PathItem>,
    /// Whether any operation references the validation error schemas
    uses_validation_error: bool,
}

/// OpenAPI Info object
#[derive(Debug, Clone, Serialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Operation>,
}

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "operationId")]
    pub operation_id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    /// Parameters (path, query, header, cookie)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    /// Status code to response
    pub responses: BTreeMap<String, ResponseEntry>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    /// Parameter location (path, query, header, cookie)
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: ParameterSchema,
}

/// Schema of a simple parameter
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    pub title: String,
}

/// OpenAPI Components object
#[derive(Debug, Clone, Serialize)]
pub struct Components {
    pub schemas: BTreeMap<String, Value>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, Serialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    pub paths: BTreeMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

impl OpenApiBuilder {
    /// Create a new OpenApiBuilder with FastAPI's default info
    pub fn new() -> Self {
        debug!("Initializing OpenApiBuilder");
        Self {
            info: Info {
                title: "FastAPI".to_string(),
                version: "0.1.0".to_string(),
                description: None,
            },
            paths: BTreeMap::new(),
            uses_validation_error: false,
        }
    }

    /// Set custom info for the API
    pub fn with_info(mut self, title: String, version: String, description: Option<String>) -> Self {
        self.info = Info {
            title,
            version,
            description,
        };
        self
    }

    /// Add a route to the OpenAPI document, documenting `responses` as its additional responses
    pub fn add_route(&mut self, route: &RouteInfo, responses: &ResponseTable) {
        debug!("Adding route: {} {}", route.method.as_str(), route.path);

        let mut parameters: Vec<&crate::extractor::Parameter> = route.parameters.iter().collect();
        parameters.sort_by_key(|p| location_order(p.location));
        let parameters: Vec<Parameter> = parameters
            .into_iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                location: p.location.as_str().to_string(),
                required: p.required,
                schema: ParameterSchema {
                    schema_type: p.schema_type.clone(),
                    title: python_title(&p.name.replace('_', " ")),
                },
            })
            .collect();

        let request_body = route.has_body.then(|| {
            json!({
                "content": {"application/json": {"schema": {}}},
                "required": true,
            })
        });

        let operation_responses = self.operation_responses(route, responses);

        let operation = Operation {
            tags: route.tags.clone(),
            summary: route
                .summary
                .clone()
                .unwrap_or_else(|| python_title(&route.handler_name.replace('_', " "))),
            description: route.description.clone().filter(|d| !d.is_empty()),
            operation_id: route
                .operation_id
                .clone()
                .unwrap_or_else(|| generate_operation_id(route)),
            deprecated: route.deprecated,
            parameters: (!parameters.is_empty()).then_some(parameters),
            request_body,
            responses: operation_responses,
        };

        let path_item = self.paths.entry(route.path.clone()).or_default();
        let slot = match route.method {
            HttpMethod::Get => &mut path_item.get,
            HttpMethod::Post => &mut path_item.post,
            HttpMethod::Put => &mut path_item.put,
            HttpMethod::Delete => &mut path_item.delete,
            HttpMethod::Patch => &mut path_item.patch,
            HttpMethod::Options => &mut path_item.options,
            HttpMethod::Head => &mut path_item.head,
            HttpMethod::Trace => &mut path_item.trace,
        };
        if slot.is_some() {
            debug!(
                "Route {} {} declared twice; keeping the later declaration",
                route.method.as_str(),
                route.path
            );
        }
        *slot = Some(operation);
    }

    fn operation_responses(
        &mut self,
        route: &RouteInfo,
        responses: &ResponseTable,
    ) -> BTreeMap<String, ResponseEntry> {
        let mut operation_responses = BTreeMap::new();

        let success_code = route.status_code.clone().unwrap_or_else(|| "200".to_string());
        let mut success = ResponseEntry::new(
            route
                .response_description
                .clone()
                .unwrap_or_else(|| "Successful Response".to_string()),
        );
        if body_allowed(&success_code) {
            success
                .extra
                .insert("content".to_string(), json!({"application/json": {"schema": {}}}));
        }
        operation_responses.insert(success_code, success);

        for (status, entry) in responses.iter() {
            let mut key = status.to_uppercase();
            if key == "DEFAULT" {
                key = "default".to_string();
            }
            let target = operation_responses
                .entry(key.clone())
                .or_insert_with(|| ResponseEntry::new(""));

            let description = if !entry.description.is_empty() {
                entry.description.clone()
            } else if !target.description.is_empty() {
                target.description.clone()
            } else {
                reason_phrase(&key).to_string()
            };

            if let Some(headers) = &entry.headers {
                let merged = target.headers.get_or_insert_with(Default::default);
                for (name, value) in headers.iter() {
                    merged.insert(name.clone(), value.clone());
                }
            }
            deep_update(&mut target.extra, &entry.extra);
            target.description = description;
        }

        let reads_request = !route.parameters.is_empty() || route.has_body;
        if reads_request
            && !VALIDATION_KEYS
                .iter()
                .any(|key| operation_responses.contains_key(*key))
        {
            let mut validation = ResponseEntry::new("Validation Error");
            validation.extra.insert(
                "content".to_string(),
                json!({
                    "application/json": {
                        "schema": {"$ref": "#/components/schemas/HTTPValidationError"}
                    }
                }),
            );
            operation_responses.insert("422".to_string(), validation);
            self.uses_validation_error = true;
        }

        operation_responses
    }

    /// Build the final OpenAPI document
    pub fn build(self) -> OpenApiDocument {
        debug!("Building final OpenAPI document with {} paths", self.paths.len());

        let components = self.uses_validation_error.then(|| Components {
            schemas: validation_schemas(),
        });

        OpenApiDocument {
            openapi: OPENAPI_VERSION.to_string(),
            info: self.info,
            paths: self.paths,
            components,
        }
    }
}

impl Default for OpenApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn location_order(location: ParameterLocation) -> u8 {
    match location {
        ParameterLocation::Path => 0,
        ParameterLocation::Query => 1,
        ParameterLocation::Header => 2,
        ParameterLocation::Cookie => 3,
    }
}

/// `read_item` at `/items/{item_id}` with GET becomes `read_item_items__item_id__get`
fn generate_operation_id(route: &RouteInfo) -> String {
    let raw = format!("{}{}", route.handler_name, route.path);
    format!("{}_{}", NON_WORD.replace_all(&raw, "_"), route.method.as_str())
}

/// Title-cases words the way Python's `str.title` does: every letter following a non-letter
/// is uppercased, every other letter lowercased.
fn python_title(text: &str) -> String {
    let mut titled = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                titled.extend(c.to_lowercase());
            } else {
                titled.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            titled.push(c);
            previous_is_letter = false;
        }
    }
    titled
}

/// Informational, 204 and 304 responses carry no body.
fn body_allowed(status: &str) -> bool {
    match status.parse::<u32>() {
        Ok(code) => !(100..200).contains(&code) && code != 204 && code != 304,
        Err(_) => true,
    }
}

fn deep_update(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        if let (Some(Value::Object(existing)), Value::Object(update)) = (target.get_mut(key), value)
        {
            deep_update(existing, update);
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

fn validation_schemas() -> BTreeMap<String, Value> {
    let mut schemas = BTreeMap::new();
    schemas.insert(
        "HTTPValidationError".to_string(),
        json!({
            "properties": {
                "detail": {
                    "items": {"$ref": "#/components/schemas/ValidationError"},
                    "type": "array",
                    "title": "Detail"
                }
            },
            "type": "object",
            "title": "HTTPValidationError"
        }),
    );
    schemas.insert(
        "ValidationError".to_string(),
        json!({
            "properties": {
                "loc": {
                    "items": {"anyOf": [{"type": "string"}, {"type": "integer"}]},
                    "type": "array",
                    "title": "Location"
                },
                "msg": {"type": "string", "title": "Message"},
                "type": {"type": "string", "title": "Error Type"}
            },
            "type": "object",
            "required": ["loc", "msg", "type"],
            "title": "ValidationError"
        }),
    );
    schemas
}
