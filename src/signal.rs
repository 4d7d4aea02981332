//! Failure signals discovered by the analysis, and the ordered header map they carry.

use crate::reader::CallableRef;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// One discovered error condition of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSignal {
    /// HTTP status code, 3 to 5 digits
    pub status_code: u32,
    /// Description exactly as written in source; `None` when the raise site gave none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Header name to value, in source order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    /// Where the signal was found
    pub origin: SignalOrigin,
}

/// Provenance of a failure signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalOrigin {
    pub kind: OriginKind,
    pub callable: CallableRef,
    /// 1-based source line
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    RaiseSite,
    Docstring,
}

impl FailureSignal {
    /// Status code in the string form used as a response table key.
    pub fn status_key(&self) -> String {
        self.status_code.to_string()
    }
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} ({} line {})",
            self.status_code,
            self.description.as_deref().unwrap_or(""),
            self.origin.callable,
            self.origin.line
        )
    }
}

/// Header name to value.
///
/// `serde_json` is built with `preserve_order`, so headers keep source order and a repeated
/// name keeps its first position, like a Python dict display.
pub type Headers = Map<String, Value>;
