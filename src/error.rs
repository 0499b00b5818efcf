//! Application error with code, metadata and a source chain.
//!
//! Module-level failures use their own `thiserror` enums; this type is for
//! application code that wants to attach a stable code and structured
//! context to whatever went wrong.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error message with optional code, metadata and wrapped cause.
pub struct Error {
    message: String,
    code: Option<String>,
    metadata: BTreeMap<String, Value>,
    source: Option<BoxError>,
    backtrace: Backtrace,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            metadata: BTreeMap::new(),
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Wrap `source` with additional context.
    pub fn wrap<E>(source: E, message: impl Into<String>) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            source: Some(source.into()),
            ..Self::new(message)
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Captured when `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE` enable it.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("message", &self.message)
            .field("code", &self.code)
            .field("metadata", &self.metadata)
            .field("source", &self.source)
            .finish()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Attach context to a `Result`'s error.
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn context(self, message: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| Error::wrap(e, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = Error::wrap(io, "load config");
        assert_eq!(err.to_string(), "load config: missing file");
        assert!(err.source().is_some());
    }

    #[test]
    fn plain_message_has_no_source() {
        let err = Error::new("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(err.source().is_none());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn code_and_metadata() {
        let err = Error::new("rejected")
            .with_code("E_LIMIT")
            .with_metadata("limit", 10)
            .with_metadata("user", "alice");

        assert_eq!(err.code(), Some("E_LIMIT"));
        assert_eq!(err.metadata()["limit"], Value::from(10));
        assert_eq!(err.metadata()["user"], Value::from("alice"));
    }

    #[test]
    fn context_wraps_result_errors() {
        let parsed: Result<u16, _> = "x".parse::<u16>();
        let err = parsed.context("parse port").unwrap_err();
        assert!(err.to_string().starts_with("parse port: "));
    }
}
