//! FastAPI Derive Responses - OpenAPI error responses derived from FastAPI source code.
//!
//! FastAPI documents only the responses a route declares. This library reads a FastAPI project
//! statically and adds every failure a route can produce: `HTTPException`s (and subclasses)
//! raised by the handler, raised by any dependency reachable from it, or documented in their
//! docstrings with `:raises HTTPException: <code> <description>`.
//!
//! # Architecture
//!
//! 1. [`scanner`] - Recursively scans project directories for Python files
//! 2. [`parser`] - Parses Python modules into tree-sitter syntax trees
//! 3. [`symbols`] / [`reader`] - Module symbol tables and name resolution across the project
//! 4. [`detector`] - Finds the modules using FastAPI
//! 5. [`extractor`] - Extracts routes, their dependencies and declared responses
//! 6. [`type_resolver`] - Decides which exception types are HTTP failures
//! 7. [`raises`] / [`docstring`] - Discover failure signals in a callable
//! 8. [`dependencies`] / [`analyzer`] - Walk the dependency graph and merge the signals
//! 9. [`openapi_builder`] - Constructs the OpenAPI document
//! 10. [`serializer`] - Serializes the document to YAML or JSON
//!
//! # Example Usage
//!
//! ```no_run
//! use fastapi_derive_responses::{
//!     analyzer::Analyzer,
//!     config::AnalysisConfig,
//!     extractor::{fastapi::FastApiExtractor, RouteExtractor},
//!     openapi_builder::OpenApiBuilder,
//!     parser::AstParser,
//!     reader::SourceReader,
//!     scanner::FileScanner,
//!     serializer::serialize_yaml,
//! };
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let scanner = FileScanner::new(PathBuf::from("./my-project"));
//! let scan_result = scanner.scan().unwrap();
//! let modules: Vec<_> = AstParser::parse_files(scanner.root(), &scan_result.python_files)
//!     .into_iter()
//!     .filter_map(Result::ok)
//!     .collect();
//!
//! let config = AnalysisConfig::default();
//! let reader = Arc::new(SourceReader::new(modules));
//! let routes = FastApiExtractor::new(&config).extract_routes(&reader);
//! let analyzer = Analyzer::with_reader(reader, config).unwrap();
//!
//! let mut builder = OpenApiBuilder::new();
//! for route in &routes {
//!     builder.add_route(route, &analyzer.derive_responses(route));
//! }
//! println!("{}", serialize_yaml(&builder.build()).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod dependencies;
pub mod detector;
pub mod docstring;
pub mod error;
pub mod extractor;
pub mod openapi_builder;
pub mod parser;
pub mod raises;
pub mod reader;
pub mod responses;
pub mod scanner;
pub mod serializer;
pub mod signal;
pub mod symbols;
pub mod type_resolver;
