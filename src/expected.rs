//! Expected backend errors.
//!
//! A backend registers the error signatures it legitimately produces for
//! random SQL (overflow, constraint violations, parser limits). Errors that
//! match are absorbed as inconclusive checks; everything else is surfaced.

use regex::Regex;

use crate::backend::BackendError;

/// Additive set of substring signatures and regex patterns.
///
/// Filled once when a backend is constructed. There is no way to remove an
/// entry.
#[derive(Debug, Clone, Default)]
pub struct ExpectedErrors {
    substrings: Vec<String>,
    patterns: Vec<Regex>,
}

impl ExpectedErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a substring signature.
    pub fn add(&mut self, signature: impl Into<String>) {
        self.substrings.push(signature.into());
    }

    /// Register several substring signatures.
    pub fn add_all<I, S>(&mut self, signatures: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.substrings
            .extend(signatures.into_iter().map(Into::into));
    }

    /// Register a regex pattern.
    pub fn add_regex(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    pub fn with(mut self, signature: impl Into<String>) -> Self {
        self.add(signature);
        self
    }

    /// Whether a backend error message matches any registered entry.
    pub fn matches(&self, message: &str) -> bool {
        self.substrings.iter().any(|s| message.contains(s.as_str()))
            || self.patterns.iter().any(|p| p.is_match(message))
    }

    pub fn len(&self) -> usize {
        self.substrings.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether an error is a known limitation of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Expected,
    Unexpected,
}

/// Classify a backend error. Connection failures are never expected.
pub fn classify(err: &BackendError, expected: &ExpectedErrors) -> ErrorClass {
    match err {
        BackendError::Query(message) if expected.matches(message) => ErrorClass::Expected,
        BackendError::Query(_) | BackendError::Connection(_) => ErrorClass::Unexpected,
    }
}
