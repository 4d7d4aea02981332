use crate::signal::{FailureSignal, Headers};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// One entry of an operation's `responses` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEntry {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    /// Anything else the developer declared for this status (`content`, `model`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ResponseEntry {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            headers: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Status code string (`"404"`, `"4XX"`, `"default"`) to response entry.
///
/// Keys serialize in sorted order, like the maps of the rest of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResponseTable(BTreeMap<String, ResponseEntry>);

impl ResponseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a table with the explicit responses and adds every signal whose status code is
    /// not present yet. The first writer for a code wins, so explicit entries are never
    /// touched and the first discovered signal for a code beats later ones.
    pub fn merge(explicit: &ResponseTable, signals: &[FailureSignal]) -> ResponseTable {
        let mut table = explicit.clone();
        for signal in signals {
            let key = signal.status_key();
            if table.contains(&key) {
                debug!("Response {} already documented; skipping {}", key, signal);
                continue;
            }
            table.0.insert(
                key,
                ResponseEntry {
                    description: signal.description.clone().unwrap_or_default(),
                    headers: signal.headers.clone(),
                    extra: serde_json::Map::new(),
                },
            );
        }
        table
    }

    pub fn contains(&self, status: &str) -> bool {
        self.0.contains_key(status)
    }

    pub fn get(&self, status: &str) -> Option<&ResponseEntry> {
        self.0.get(status)
    }

    /// Inserts an entry unless the status is already documented. Returns whether it was added.
    pub fn insert_if_absent(&mut self, status: impl Into<String>, entry: ResponseEntry) -> bool {
        let status = status.into();
        if self.0.contains_key(&status) {
            return false;
        }
        self.0.insert(status, entry);
        true
    }

    /// Status codes in key order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResponseEntry)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Standard reason phrase of a status code, used for explicit responses declared without a
/// description.
pub fn reason_phrase(status: &str) -> &'static str {
    match status {
        "100" => "Continue",
        "101" => "Switching Protocols",
        "200" => "OK",
        "201" => "Created",
        "202" => "Accepted",
        "204" => "No Content",
        "206" => "Partial Content",
        "301" => "Moved Permanently",
        "302" => "Found",
        "303" => "See Other",
        "304" => "Not Modified",
        "307" => "Temporary Redirect",
        "308" => "Permanent Redirect",
        "400" => "Bad Request",
        "401" => "Unauthorized",
        "402" => "Payment Required",
        "403" => "Forbidden",
        "404" => "Not Found",
        "405" => "Method Not Allowed",
        "406" => "Not Acceptable",
        "408" => "Request Timeout",
        "409" => "Conflict",
        "410" => "Gone",
        "411" => "Length Required",
        "412" => "Precondition Failed",
        "413" => "Content Too Large",
        "415" => "Unsupported Media Type",
        "418" => "I'm a teapot",
        "422" => "Unprocessable Content",
        "423" => "Locked",
        "425" => "Too Early",
        "428" => "Precondition Required",
        "429" => "Too Many Requests",
        "431" => "Request Header Fields Too Large",
        "451" => "Unavailable For Legal Reasons",
        "500" => "Internal Server Error",
        "501" => "Not Implemented",
        "502" => "Bad Gateway",
        "503" => "Service Unavailable",
        "504" => "Gateway Timeout",
        "1XX" => "Information",
        "2XX" => "Success",
        "3XX" => "Redirection",
        "4XX" => "Client Error",
        "5XX" => "Server Error",
        "default" => "Default Response",
        _ => "Additional Response",
    }
}
