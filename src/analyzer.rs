use crate::config::AnalysisConfig;
use crate::dependencies::{self, CallableAnalysis, CallableAnalyzer, DependencyScanner};
use crate::docstring::DocstringExtractor;
use crate::error::{Error, Result};
use crate::extractor::RouteInfo;
use crate::parser::ParsedModule;
use crate::raises::RaiseSiteExtractor;
use crate::reader::{CallableRef, SourceReader};
use crate::responses::ResponseTable;
use crate::signal::FailureSignal;
use crate::type_resolver::FailureTypeResolver;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Derives the failure responses of routes.
///
/// One `Analyzer` is created per run. It owns the memo state of the analysis: symbol tables,
/// failure-type resolutions and per-callable results. A dependency shared by many routes is
/// analyzed once.
pub struct Analyzer {
    config: AnalysisConfig,
    reader: Arc<SourceReader>,
    resolver: FailureTypeResolver,
    raises: RaiseSiteExtractor,
    docstrings: DocstringExtractor,
    cache: RwLock<HashMap<CallableRef, Arc<CallableAnalysis>>>,
}

/// Signals discovered for one route, with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RouteReport {
    pub method: String,
    pub path: String,
    pub handler: CallableRef,
    pub signals: Vec<FailureSignal>,
}

impl Analyzer {
    pub fn new(modules: Vec<ParsedModule>, config: AnalysisConfig) -> Result<Self> {
        Self::with_reader(Arc::new(SourceReader::new(modules)), config)
    }

    /// Builds an analyzer over an existing reader.
    pub fn with_reader(reader: Arc<SourceReader>, config: AnalysisConfig) -> Result<Self> {
        let resolver = FailureTypeResolver::new(Arc::clone(&reader), &config.failure_types);
        let raises = RaiseSiteExtractor::new(&config)?;
        let docstrings = DocstringExtractor::new(&config)?;
        Ok(Self {
            config,
            reader,
            resolver,
            raises,
            docstrings,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn reader(&self) -> &Arc<SourceReader> {
        &self.reader
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// All signals of a route: handler first, then its dependencies breadth-first.
    pub fn collect_signals(&self, route: &RouteInfo) -> Result<Vec<FailureSignal>> {
        dependencies::collect(self, &route.handler, &route.dependencies)
    }

    /// The route's explicit responses augmented with every discovered failure signal.
    ///
    /// Never fails: if the analysis breaks, the explicit table is returned unchanged.
    pub fn derive_responses(&self, route: &RouteInfo) -> ResponseTable {
        match self.collect_signals(route) {
            Ok(signals) => {
                debug!(
                    "{} {}: {} failure signals",
                    route.method.as_str(),
                    route.path,
                    signals.len()
                );
                ResponseTable::merge(&route.explicit_responses, &signals)
            }
            Err(e) => {
                warn!(
                    "Failed to derive responses for {} {}: {}",
                    route.method.as_str(),
                    route.path,
                    e
                );
                route.explicit_responses.clone()
            }
        }
    }

    /// Per-route signal report.
    pub fn report(&self, route: &RouteInfo) -> Result<RouteReport> {
        Ok(RouteReport {
            method: route.method.as_str().to_string(),
            path: route.path.clone(),
            handler: route.handler.clone(),
            signals: self.collect_signals(route)?,
        })
    }

    fn compute(&self, callable: &CallableRef) -> Result<CallableAnalysis> {
        let source = match self.reader.read(callable) {
            Ok(source) => source,
            Err(Error::SourceUnavailable { callable }) => {
                debug!("Source unavailable for {}; no signals", callable);
                return Ok(CallableAnalysis::default());
            }
            Err(e) => return Err(e),
        };

        let mut signals = self.raises.extract(&source, &self.resolver);
        signals.extend(self.docstrings.extract(&source, &self.resolver));

        let scanner = DependencyScanner::new(&self.reader, &self.config.dependency_markers);
        let dependencies = scanner.parameter_dependencies(&source);

        Ok(CallableAnalysis {
            signals,
            dependencies,
        })
    }
}

impl CallableAnalyzer for Analyzer {
    fn analyze(&self, callable: &CallableRef) -> Result<Arc<CallableAnalysis>> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| Error::CachePoisoned("callable analyses"))?;
            if let Some(analysis) = cache.get(callable) {
                return Ok(Arc::clone(analysis));
            }
        }

        let analysis = Arc::new(self.compute(callable)?);
        let mut cache = self
            .cache
            .write()
            .map_err(|_| Error::CachePoisoned("callable analyses"))?;
        Ok(Arc::clone(
            cache.entry(callable.clone()).or_insert(analysis),
        ))
    }
}
