//! Turning free-form model responses into typed artifacts.

use crate::errors::GeneratorError;
use crate::util::{extract_json_array, extract_json_object};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("fence pattern is valid")
});

/// Result of interpreting a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    /// A deterministic stand-in used because the response could not be parsed.
    Fallback(T),
    Failed(String),
}

impl<T> ParseOutcome<T> {
    /// Replace a failure with `fallback()`, logging why.
    pub fn or_fallback(self, what: &str, fallback: impl FnOnce() -> T) -> Self {
        match self {
            ParseOutcome::Failed(reason) => {
                tracing::warn!(artifact = what, %reason, "Using fallback artifact");
                ParseOutcome::Fallback(fallback())
            }
            other => other,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParseOutcome::Fallback(_))
    }

    pub fn into_result(self) -> Result<T, GeneratorError> {
        match self {
            ParseOutcome::Parsed(value) | ParseOutcome::Fallback(value) => Ok(value),
            ParseOutcome::Failed(reason) => Err(GeneratorError::Parse(reason)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseOutcome<U> {
        match self {
            ParseOutcome::Parsed(v) => ParseOutcome::Parsed(f(v)),
            ParseOutcome::Fallback(v) => ParseOutcome::Fallback(f(v)),
            ParseOutcome::Failed(reason) => ParseOutcome::Failed(reason),
        }
    }
}

/// Contents of the first fenced code block, or the trimmed text if there is none.
pub fn strip_code_fence(text: &str) -> String {
    FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.trim().to_string())
}

/// Candidate JSON payloads in the order they are tried.
fn json_candidates(text: &str) -> Vec<String> {
    let mut candidates = vec![text.trim().to_string()];
    for m in FENCE_RE.captures_iter(text).filter_map(|c| c.get(1)) {
        candidates.push(m.as_str().trim().to_string());
    }
    candidates.extend(extract_json_object(text));
    candidates.extend(extract_json_array(text));
    candidates
}

/// Parse a JSON artifact out of a response that may wrap it in prose or fences.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> ParseOutcome<T> {
    let mut last_error = String::from("response contained no JSON");
    for candidate in json_candidates(text) {
        if candidate.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&candidate) {
            Ok(value) => return ParseOutcome::Parsed(value),
            Err(e) => last_error = e.to_string(),
        }
    }
    ParseOutcome::Failed(last_error)
}
