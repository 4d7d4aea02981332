use clap::Parser;
use fastapi_derive_responses::{
    analyzer::Analyzer,
    cli::{self, CliArgs},
    config::AnalysisConfig,
    detector::FastApiDetector,
    extractor::{fastapi::FastApiExtractor, RouteExtractor},
    parser::AstParser,
    reader::SourceReader,
    scanner::FileScanner,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const USAGE: &[(&str, &str)] = &[("main.py", include_str!("fixtures/usage/main.py"))];

const SHOP: &[(&str, &str)] = &[
    ("app/__init__.py", include_str!("fixtures/shop/app/__init__.py")),
    ("app/main.py", include_str!("fixtures/shop/app/main.py")),
    ("app/consts.py", include_str!("fixtures/shop/app/consts.py")),
    ("app/errors.py", include_str!("fixtures/shop/app/errors.py")),
    ("app/legacy.py", include_str!("fixtures/shop/app/legacy.py")),
    ("app/deps.py", include_str!("fixtures/shop/app/deps.py")),
    ("app/routers/__init__.py", include_str!("fixtures/shop/app/routers/__init__.py")),
    ("app/routers/items.py", include_str!("fixtures/shop/app/routers/items.py")),
];

const CATALOG: &[(&str, &str)] = &[("main.py", include_str!("fixtures/catalog/main.py"))];

/// Helper function to create a temporary test project
fn create_test_project(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

fn args(project: &Path, extra: &[&str]) -> CliArgs {
    let mut argv = vec![
        "fastapi-derive-responses".to_string(),
        project.display().to_string(),
        "-f".to_string(),
        "json".to_string(),
    ];
    argv.extend(extra.iter().map(|a| a.to_string()));
    CliArgs::parse_from(argv)
}

fn generate_json(project: &Path, extra: &[&str]) -> Value {
    let content = cli::generate(&args(project, extra)).expect("Generation failed");
    serde_json::from_str(&content).expect("Output is not valid JSON")
}

fn response_keys(document: &Value, path: &str, method: &str) -> Vec<String> {
    document["paths"][path][method]["responses"]
        .as_object()
        .unwrap_or_else(|| panic!("No responses for {} {}", method, path))
        .keys()
        .cloned()
        .collect()
}

#[test]
fn test_usage_scenario_end_to_end() {
    let project = create_test_project(USAGE);
    let document = generate_json(project.path(), &[]);

    assert_eq!(response_keys(&document, "/", "get"), vec!["200", "400", "401", "403", "404", "422"]);

    let responses = &document["paths"]["/"]["get"]["responses"];
    assert_eq!(responses["400"], json!({"description": "User already exists"}));
    assert_eq!(responses["401"], json!({"description": "Invalid token"}));
    assert_eq!(
        responses["403"],
        json!({"description": "Only admins and moderators are allowed"})
    );
    assert_eq!(responses["404"], json!({"description": "Your user not found"}));
    assert_eq!(responses["422"]["description"], "Validation Error");

    let operation = &document["paths"]["/"]["get"];
    assert_eq!(operation["summary"], "Add User");
    assert_eq!(operation["operationId"], "add_user__get");
    let parameters: Vec<&str> = operation["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(parameters, vec!["new_user_id", "user_role", "token"]);
}

#[test]
fn test_no_side_effects_without_signals() {
    let project = create_test_project(CATALOG);

    let derived = cli::generate(&args(project.path(), &[])).unwrap();
    let base = cli::generate(&args(project.path(), &["--no-derive"])).unwrap();

    assert_eq!(derived, base);

    let document: Value = serde_json::from_str(&derived).unwrap();
    assert_eq!(document["info"]["title"], "FastAPI");
    assert_eq!(
        response_keys(&document, "/items/{item_id}", "get"),
        vec!["200", "418", "422"]
    );
    assert_eq!(response_keys(&document, "/version", "get"), vec!["200"]);
    assert_eq!(
        document["paths"]["/version"]["get"]["description"],
        "Current API version."
    );
}

#[test]
fn test_multi_module_project() {
    let project = create_test_project(SHOP);
    let document = generate_json(project.path(), &["--title", "Shop", "--api-version", "2.0.0"]);

    assert_eq!(document["openapi"], "3.1.0");
    assert_eq!(document["info"], json!({"title": "Shop", "version": "2.0.0"}));

    let paths: Vec<&String> = document["paths"].as_object().unwrap().keys().collect();
    assert_eq!(
        paths,
        vec!["/health", "/v1/items/", "/v1/items/{item_id}", "/v1/items/{item_id}/buy"]
    );

    // explicit 404 wins over the raise site; the look-alike exception is ignored
    assert_eq!(
        response_keys(&document, "/v1/items/{item_id}", "get"),
        vec!["200", "401", "403", "404", "422"]
    );
    let read = &document["paths"]["/v1/items/{item_id}"]["get"];
    assert_eq!(read["responses"]["404"], json!({"description": "Item does not exist"}));
    assert_eq!(read["responses"]["403"], json!({"description": "Inactive user"}));
    assert_eq!(read["tags"], json!(["items"]));

    // class dependency declared with a bare Depends()
    assert_eq!(
        response_keys(&document, "/v1/items/", "get"),
        vec!["200", "401", "403", "416", "422"]
    );
    assert_eq!(
        document["paths"]["/v1/items/"]["get"]["responses"]["416"],
        json!({"description": "Page out of range"})
    );

    // subclass raise, constant status code and constant description; nested def ignored
    assert_eq!(
        response_keys(&document, "/v1/items/{item_id}/buy", "post"),
        vec!["201", "401", "402", "403", "409", "422"]
    );
    let buy = &document["paths"]["/v1/items/{item_id}/buy"]["post"]["responses"];
    assert_eq!(buy["402"], json!({"description": "Item is locked"}));
    assert_eq!(buy["409"], json!({"description": "Item {item_id} is out of stock"}));

    assert_eq!(response_keys(&document, "/health", "get"), vec!["200"]);
}

#[test]
fn test_headers_are_captured_in_source_order() {
    let project = create_test_project(SHOP);
    let content = cli::generate(&args(project.path(), &[])).unwrap();
    let document: Value = serde_json::from_str(&content).unwrap();

    assert_eq!(
        document["paths"]["/health"]["get"]["responses"]["401"],
        Value::Null
    );
    let unauthorized = &document["paths"]["/v1/items/"]["get"]["responses"]["401"];
    assert_eq!(unauthorized["description"], "Missing token");
    assert_eq!(unauthorized["headers"]["X-Retry"], 3);

    let www = content.find("\"WWW-Authenticate\"").unwrap();
    let retry = content.find("\"X-Retry\"").unwrap();
    assert!(www < retry);
}

#[test]
fn test_extra_failure_type_from_cli() {
    let project = create_test_project(SHOP);
    let document = generate_json(
        project.path(),
        &["--failure-type", "app.legacy.HTTPException"],
    );

    let read = &document["paths"]["/v1/items/{item_id}"]["get"]["responses"];
    assert_eq!(read["599"], json!({"description": "Not an HTTP failure"}));
}

#[test]
fn test_extra_failure_type_from_config() {
    let project = create_test_project(SHOP);
    let config = project.path().join("derive.yaml");
    std::fs::write(
        &config,
        "failure_types:\n  - fastapi.HTTPException\n  - app.legacy.HTTPException\n",
    )
    .unwrap();

    let document = generate_json(project.path(), &["--config", config.to_str().unwrap()]);

    let read = &document["paths"]["/v1/items/{item_id}"]["get"]["responses"];
    assert_eq!(read["599"]["description"], "Not an HTTP failure");
}

#[test]
fn test_invalid_config_is_an_error() {
    let project = create_test_project(SHOP);
    let config = project.path().join("derive.yaml");
    std::fs::write(&config, "exception_types: [app.legacy.HTTPException]\n").unwrap();

    let result = cli::generate(&args(project.path(), &["--config", config.to_str().unwrap()]));

    assert!(result.is_err());
}

#[test]
fn test_report_lists_signals_with_provenance() {
    let project = create_test_project(USAGE);
    let report = generate_json(project.path(), &["--report"]);

    let routes = report.as_array().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["method"], "get");
    assert_eq!(routes[0]["path"], "/");
    assert_eq!(routes[0]["handler"]["qualname"], "add_user");

    let signals: Vec<(u64, &str, &str)> = routes[0]["signals"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["status_code"].as_u64().unwrap(),
                s["origin"]["kind"].as_str().unwrap(),
                s["origin"]["callable"]["qualname"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        signals,
        vec![
            (403, "raise_site", "add_user"),
            (400, "raise_site", "add_user"),
            (400, "raise_site", "add_user"),
            (401, "raise_site", "auth_user"),
            (404, "raise_site", "auth_user"),
            (403, "raise_site", "auth_user"),
            (401, "docstring", "auth_user"),
            (403, "docstring", "auth_user"),
            (404, "docstring", "auth_user"),
        ]
    );
    assert_eq!(
        routes[0]["signals"][6]["description"],
        "Invalid token (less than 100)"
    );
}

#[test]
fn test_yaml_output_file() {
    let project = create_test_project(USAGE);
    let output = project.path().join("out").join("openapi.yaml");
    let args = CliArgs::parse_from([
        "fastapi-derive-responses",
        project.path().to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);

    cli::run(cli::parse_args_from_parsed(args).unwrap()).unwrap();

    let yaml = std::fs::read_to_string(&output).unwrap();
    assert!(yaml.starts_with("openapi: 3.1.0"));
    assert!(yaml.contains("description: Only admins and moderators are allowed"));
}

#[test]
fn test_project_without_fastapi_is_rejected() {
    let project = create_test_project(&[("tool.py", "import os\n\nprint(os.getcwd())\n")]);

    let error = cli::generate(&args(project.path(), &[])).unwrap_err();

    assert!(error.to_string().contains("FastAPI"));
}

#[test]
fn test_missing_project_path_is_rejected() {
    let project = create_test_project(USAGE);
    let missing = project.path().join("missing");

    assert!(cli::parse_args_from_parsed(args(&missing, &[])).is_err());
}

#[test]
fn test_library_pipeline() {
    let project = create_test_project(SHOP);

    let scanner = FileScanner::new(project.path().to_path_buf());
    let scan_result = scanner.scan().expect("Failed to scan directory");
    assert_eq!(scan_result.python_files.len(), SHOP.len());

    let modules: Vec<_> = AstParser::parse_files(scanner.root(), &scan_result.python_files)
        .into_iter()
        .filter_map(Result::ok)
        .collect();
    let reader = Arc::new(SourceReader::new(modules));

    let detection = FastApiDetector::detect(&reader);
    assert_eq!(
        detection.modules,
        vec!["app.deps", "app.errors", "app.main", "app.routers.items"]
    );

    let config = AnalysisConfig::default();
    let routes = FastApiExtractor::new(&config).extract_routes(&reader);
    assert_eq!(routes.len(), 4);

    let analyzer = Analyzer::with_reader(reader, config).unwrap();
    let buy = routes
        .iter()
        .find(|r| r.handler_name == "buy_item")
        .unwrap();
    let table = analyzer.derive_responses(buy);
    let keys: Vec<&String> = table.keys().collect();
    assert_eq!(keys, vec!["401", "402", "403", "409"]);

    // shared dependencies are analyzed once and served from the cache afterwards
    let again = analyzer.derive_responses(buy);
    assert_eq!(again, table);
}
