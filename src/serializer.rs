//! Serialization of OpenAPI documents and analysis reports to YAML or JSON.
//!
//! Maps in the document model are ordered, so the same project always serializes to the
//! same bytes.

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Serializes a document or report to YAML.
///
/// # Example
///
/// ```
/// use fastapi_derive_responses::openapi_builder::OpenApiBuilder;
/// use fastapi_derive_responses::serializer::serialize_yaml;
///
/// let doc = OpenApiBuilder::new().build();
/// let yaml = serialize_yaml(&doc).unwrap();
/// assert!(yaml.contains("openapi: 3.1.0"));
/// ```
pub fn serialize_yaml<T: Serialize>(value: &T) -> Result<String> {
    debug!("Serializing to YAML");
    serde_yaml::to_string(value).context("Failed to serialize to YAML")
}

/// Serializes a document or report to pretty-printed JSON, terminated by a newline.
pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    debug!("Serializing to JSON");
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    json.push('\n');
    Ok(json)
}

/// Writes string content to a file, creating parent directories as needed.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
