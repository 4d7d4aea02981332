use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Analysis configuration
///
/// Every field has a FastAPI default, so an empty YAML document is a valid configuration.
///
/// ```yaml
/// failure_types:
///   - fastapi.HTTPException
///   - app.errors.BaseAPIError
/// docstring_tags: [raise, raises]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Qualified names of the canonical HTTP failure base types
    pub failure_types: Vec<String>,
    /// Modules whose `HTTP_<code>_...` constants name status codes
    pub status_modules: Vec<String>,
    /// Qualified names of the dependency declaration helpers
    pub dependency_markers: Vec<String>,
    /// Docstring field names introducing a raised failure (`:raises ...:`)
    pub docstring_tags: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            failure_types: vec![
                "fastapi.HTTPException".to_string(),
                "fastapi.exceptions.HTTPException".to_string(),
                "starlette.exceptions.HTTPException".to_string(),
            ],
            status_modules: vec!["starlette.status".to_string(), "fastapi.status".to_string()],
            dependency_markers: vec![
                "fastapi.Depends".to_string(),
                "fastapi.Security".to_string(),
                "fastapi.params.Depends".to_string(),
                "fastapi.params.Security".to_string(),
            ],
            docstring_tags: vec!["raise".to_string(), "raises".to_string()],
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading analysis config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse a configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Adds extra canonical failure types, skipping ones already configured
    pub fn with_failure_types(mut self, extra: &[String]) -> Self {
        for failure_type in extra {
            if !self.failure_types.contains(failure_type) {
                self.failure_types.push(failure_type.clone());
            }
        }
        self
    }

    /// Simple names of the canonical failure types (`HTTPException`)
    pub fn failure_type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .failure_types
            .iter()
            .map(|t| t.rsplit('.').next().unwrap_or(t))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
