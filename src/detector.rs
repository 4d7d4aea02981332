use crate::parser::ParsedModule;
use crate::reader::SourceReader;
use log::debug;
use tree_sitter::Node;

/// Top-level package whose import marks a module as FastAPI code
const FASTAPI_PACKAGE: &str = "fastapi";

/// FastAPI usage detector.
///
/// Examines `import` statements of the parsed modules to find the ones that use FastAPI, so
/// a project without any can be reported before route extraction runs.
pub struct FastApiDetector;

/// Result of FastAPI detection.
pub struct DetectionResult {
    /// Dotted names of the modules importing `fastapi`, sorted
    pub modules: Vec<String>,
}

impl DetectionResult {
    pub fn uses_fastapi(&self) -> bool {
        !self.modules.is_empty()
    }
}

impl FastApiDetector {
    /// Detects the modules of the project that import FastAPI.
    ///
    /// # Example
    ///
    /// ```
    /// use fastapi_derive_responses::detector::FastApiDetector;
    /// use fastapi_derive_responses::parser::ParsedModule;
    /// use fastapi_derive_responses::reader::SourceReader;
    ///
    /// let module = ParsedModule::from_source("app.main", "from fastapi import FastAPI\n").unwrap();
    /// let result = FastApiDetector::detect(&SourceReader::new(vec![module]));
    /// assert_eq!(result.modules, vec!["app.main"]);
    /// ```
    pub fn detect(reader: &SourceReader) -> DetectionResult {
        let modules: Vec<String> = reader
            .modules()
            .into_iter()
            .filter(|module| imports_fastapi(module, module.root()))
            .map(|module| module.name.clone())
            .collect();
        debug!("Modules importing FastAPI: {:?}", modules);

        DetectionResult { modules }
    }
}

/// Recursively checks import statements, including ones nested in `try` or `if` blocks.
fn imports_fastapi(module: &ParsedModule, node: Node) -> bool {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
            names.into_iter().any(|name| {
                let dotted = match name.kind() {
                    "aliased_import" => name.child_by_field_name("name"),
                    _ => Some(name),
                };
                dotted.is_some_and(|d| is_fastapi(module.node_text(d)))
            })
        }
        "import_from_statement" => node
            .child_by_field_name("module_name")
            .is_some_and(|m| is_fastapi(module.node_text(m))),
        "function_definition" | "class_definition" => false,
        _ => {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            children
                .into_iter()
                .any(|child| imports_fastapi(module, child))
        }
    }
}

fn is_fastapi(dotted: &str) -> bool {
    dotted.split('.').next().map(str::trim) == Some(FASTAPI_PACKAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(modules: &[(&str, &str)]) -> DetectionResult {
        FastApiDetector::detect(&SourceReader::new(
            modules
                .iter()
                .map(|(name, code)| ParsedModule::from_source(name, code).unwrap())
                .collect(),
        ))
    }

    #[test]
    fn test_detect_from_import() {
        let result = detect(&[("app.main", "from fastapi import FastAPI\napp = FastAPI()\n")]);
        assert!(result.uses_fastapi());
        assert_eq!(result.modules, vec!["app.main"]);
    }

    #[test]
    fn test_detect_plain_and_aliased_imports() {
        let result = detect(&[
            ("a", "import fastapi\n"),
            ("b", "import fastapi.routing as routing\n"),
            ("c", "from fastapi.responses import JSONResponse\n"),
        ]);
        assert_eq!(result.modules, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_detect_nested_import() {
        let code = "try:\n    from fastapi import APIRouter\nexcept ImportError:\n    APIRouter = None\n";
        assert!(detect(&[("app.compat", code)]).uses_fastapi());
    }

    #[test]
    fn test_detect_no_fastapi() {
        let result = detect(&[
            ("app.flask_app", "from flask import Flask\n"),
            ("app.util", "import fastapi_utils\nimport os\n"),
        ]);
        assert!(!result.uses_fastapi());
    }

    #[test]
    fn test_detect_empty_project() {
        assert!(detect(&[]).modules.is_empty());
    }
}
