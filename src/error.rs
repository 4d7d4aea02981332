/// Result type alias for the analysis engine
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the analysis engine
#[derive(Debug)]
pub enum Error {
    InvalidArgument(String),
    /// The source of a callable could not be located in the analyzed project
    SourceUnavailable { callable: String },
    /// A tree-sitter query failed to compile
    Query(String),
    /// A memo cache lock was poisoned by a panicking writer
    CachePoisoned(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::SourceUnavailable { callable } => {
                write!(f, "Source unavailable for callable: {}", callable)
            }
            Error::Query(msg) => write!(f, "Invalid tree-sitter query: {}", msg),
            Error::CachePoisoned(cache) => write!(f, "Analysis cache poisoned: {}", cache),
        }
    }
}

impl std::error::Error for Error {}

impl From<tree_sitter::QueryError> for Error {
    fn from(err: tree_sitter::QueryError) -> Self {
        Error::Query(err.to_string())
    }
}
