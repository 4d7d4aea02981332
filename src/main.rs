//! FastAPI Derive Responses - command-line tool documenting the error responses of FastAPI routes.
//!
//! Scans a FastAPI project, finds every `HTTPException` (or subclass) a route can raise, in the
//! handler itself or in any dependency it pulls in, and writes the OpenAPI document with those
//! responses added.
//!
//! # Usage
//!
//! ```bash
//! fastapi-derive-responses [OPTIONS] <PROJECT_PATH>
//! ```
//!
//! # Examples
//!
//! Generate a YAML document:
//! ```bash
//! fastapi-derive-responses ./my-api -o openapi.yaml
//! ```
//!
//! Show which failures were found where:
//! ```bash
//! fastapi-derive-responses ./my-api --report -f json
//! ```

use anyhow::Result;
use clap::Parser;
use fastapi_derive_responses::cli;
use log::info;

fn main() -> Result<()> {
    // Parse once to read the verbose flag before the logger exists
    let args_for_verbose = cli::CliArgs::parse();

    let log_level = if args_for_verbose.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("FastAPI Derive Responses starting...");

    let args = cli::parse_args_from_parsed(args_for_verbose)?;

    cli::run(args)?;

    Ok(())
}
