use crate::analyzer::{Analyzer, RouteReport};
use crate::config::AnalysisConfig;
use crate::detector::FastApiDetector;
use crate::extractor::fastapi::FastApiExtractor;
use crate::extractor::{RouteExtractor, RouteInfo};
use crate::openapi_builder::OpenApiBuilder;
use crate::parser::{AstParser, ParsedModule};
use crate::reader::SourceReader;
use crate::scanner::FileScanner;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// FastAPI Derive Responses - Document the error responses of FastAPI routes from their source
#[derive(Parser, Debug)]
#[command(name = "fastapi-derive-responses")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Python project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// API title
    #[arg(long = "title", default_value = "FastAPI")]
    pub title: String,

    /// API version
    #[arg(long = "api-version", default_value = "0.1.0")]
    pub api_version: String,

    /// YAML analysis configuration file
    #[arg(long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Additional canonical HTTP failure type, fully qualified (repeatable)
    #[arg(long = "failure-type", value_name = "QUALNAME")]
    pub failure_types: Vec<String>,

    /// Only document explicitly declared responses
    #[arg(long = "no-derive")]
    pub no_derive: bool,

    /// Emit the discovered failure signals of every route instead of the document
    #[arg(long = "report", conflicts_with = "no_derive")]
    pub report: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    let args = CliArgs::parse();
    parse_args_from_parsed(args)
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.project_path.exists() {
        anyhow::bail!(
            "Project path does not exist: {}",
            args.project_path.display()
        );
    }

    if !args.project_path.is_dir() {
        anyhow::bail!(
            "Project path is not a directory: {}",
            args.project_path.display()
        );
    }

    if let Some(ref config) = args.config_path {
        if !config.is_file() {
            anyhow::bail!("Config file does not exist: {}", config.display());
        }
    }

    if let Some(invalid) = args
        .failure_types
        .iter()
        .find(|t| t.is_empty() || t.split('.').any(str::is_empty))
    {
        anyhow::bail!("Invalid failure type {:?}: expected a dotted name", invalid);
    }

    info!("Project path: {}", args.project_path.display());
    info!("Output format: {:?}", args.output_format);
    if let Some(ref output) = args.output_path {
        info!("Output file: {}", output.display());
    } else {
        info!("Output: stdout");
    }
    if args.no_derive {
        info!("Response derivation disabled");
    }

    Ok(args)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    info!("Starting response derivation...");

    let content = generate(&args)?;

    if let Some(output_path) = &args.output_path {
        info!("Writing output to: {}", output_path.display());
        write_to_file(&content, output_path)?;
        info!("Successfully wrote output to {}", output_path.display());
    } else {
        print!("{}", content);
    }

    info!("Generation complete!");
    Ok(())
}

/// Runs the pipeline and returns the serialized document (or report).
pub fn generate(args: &CliArgs) -> Result<String> {
    let config = load_config(args)?;

    // Step 1: Scan directory for Python files
    info!("Scanning project directory...");
    let scanner = FileScanner::new(args.project_path.clone());
    let scan_result = scanner.scan()?;

    info!("Found {} Python files", scan_result.python_files.len());
    for warning in &scan_result.warnings {
        warn!("{}", warning);
    }

    if scan_result.python_files.is_empty() {
        anyhow::bail!("No Python files found in the project directory");
    }

    // Step 2: Parse files
    info!("Parsing Python files...");
    let modules: Vec<ParsedModule> =
        AstParser::parse_files(scanner.root(), &scan_result.python_files)
            .into_iter()
            .filter_map(|r| match r {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Skipping file due to parse error: {:#}", e);
                    None
                }
            })
            .collect();

    info!("Successfully parsed {} files", modules.len());

    if modules.is_empty() {
        anyhow::bail!("No files could be parsed successfully");
    }

    let reader = Arc::new(SourceReader::new(modules));

    // Step 3: Detect FastAPI
    let detection = FastApiDetector::detect(&reader);
    if !detection.uses_fastapi() {
        anyhow::bail!("No module of the project imports FastAPI");
    }
    info!("{} modules import FastAPI", detection.modules.len());

    // Step 4: Extract routes
    info!("Extracting routes...");
    let routes = FastApiExtractor::new(&config).extract_routes(&reader);
    info!("Extracted {} routes", routes.len());
    if routes.is_empty() {
        warn!("No routes found in the project");
    }

    let analyzer = Analyzer::with_reader(reader, config)
        .context("Failed to initialize the response analyzer")?;

    // Step 5: Derive responses and serialize
    if args.report {
        let reports = routes
            .iter()
            .map(|route| {
                analyzer.report(route).with_context(|| {
                    format!("Failed to analyze {} {}", route.method.as_str(), route.path)
                })
            })
            .collect::<Result<Vec<RouteReport>>>()?;
        return serialize(&reports, args.output_format);
    }

    let document = build_document(args, &analyzer, &routes);
    info!("OpenAPI document built successfully");
    serialize(&document, args.output_format)
}

fn load_config(args: &CliArgs) -> Result<AnalysisConfig> {
    let config = match &args.config_path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    Ok(config.with_failure_types(&args.failure_types))
}

fn build_document(
    args: &CliArgs,
    analyzer: &Analyzer,
    routes: &[RouteInfo],
) -> crate::openapi_builder::OpenApiDocument {
    let mut builder =
        OpenApiBuilder::new().with_info(args.title.clone(), args.api_version.clone(), None);
    let mut derived = 0;

    for route in routes {
        let responses = if args.no_derive {
            route.explicit_responses.clone()
        } else {
            analyzer.derive_responses(route)
        };
        derived += responses.len() - route.explicit_responses.len();
        builder.add_route(route, &responses);
    }

    info!("Derived {} responses for {} routes", derived, routes.len());
    builder.build()
}

fn serialize<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    info!("Serializing to {:?} format...", format);
    match format {
        OutputFormat::Yaml => serialize_yaml(value),
        OutputFormat::Json => serialize_json(value),
    }
}
