//! Error types and result definitions for the indexing pipeline.
//!
//! Every fallible operation in the crate returns [`IndexerResult`]. Errors carry an
//! [`ErrorKind`] used to decide whether a failure is fatal for a worker, a static
//! description, optional dynamic detail and the callsite where they were raised. Failures of
//! several workers are aggregated into a single [`IndexerError`].

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Result type used across the indexer.
pub type IndexerResult<T> = Result<T, IndexerError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the indexer.
///
/// An [`IndexerError`] is either a single classified failure or an aggregate of the
/// failures reported by several tailers and reader workers when the pipeline is awaited.
#[derive(Debug, Clone)]
pub struct IndexerError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Failures collected from multiple tasks.
    Many {
        errors: Vec<IndexerError>,
        location: &'static Location<'static>,
    },
}

/// Classification of the failures raised by the indexer.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection errors
    SourceConnectionFailed,
    SearchConnectionFailed,

    // Query and request errors
    SourceQueryFailed,
    SubscriptionFailed,
    BulkRequestFailed,

    // Data errors
    ConversionError,
    InvalidData,
    StaleReference,

    // Configuration errors
    ConfigError,

    // IO and serialization errors
    IoError,
    SerializationError,
    DeserializationError,

    // State and workflow errors
    InvalidState,
    BatchNotAcknowledged,
    TailerPanic,
    ReaderWorkerPanic,

    Unknown,
}

impl IndexerError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregates report the kind of their first error, or [`ErrorKind::Unknown`] when empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the dynamic detail, if any.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the static description of a single error.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error. Has no effect on aggregates.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        IndexerError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for IndexerError {
    fn eq(&self, other: &IndexerError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for IndexerError {
    /// Hashes only the kind and static description so that repeated occurrences of the same
    /// failure group together.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f)?;
                write_backtrace(payload.backtrace.as_ref(), f)
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    return write!(f, "\n  (no inner errors provided)");
                }

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    match lines.next() {
                        Some(first_line) => write!(f, "\n  {}. {}", index + 1, first_line)?,
                        None => write!(f, "\n  {}.", index + 1)?,
                    }

                    for line in lines {
                        if line.is_empty() {
                            write!(f, "\n     ")?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for IndexerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered = backtrace.to_string();
    if rendered.trim().is_empty() {
        return Ok(());
    }

    write!(f, "\n  Backtrace:")?;
    for line in rendered.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    if detail.trim().is_empty() {
        return write!(f, "\n  Detail: <empty>");
    }

    write!(f, "\n  Detail:")?;
    for line in detail.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for IndexerError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> IndexerError {
        IndexerError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for IndexerError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> IndexerError {
        IndexerError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned unwrapped.
impl<E> From<Vec<E>> for IndexerError
where
    E: Into<IndexerError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> IndexerError {
        let location = Location::caller();

        let mut errors: Vec<IndexerError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        IndexerError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for IndexerError {
    #[track_caller]
    fn from(err: std::io::Error) -> IndexerError {
        let detail = err.to_string();
        IndexerError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for IndexerError {
    #[track_caller]
    fn from(err: serde_json::Error) -> IndexerError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        IndexerError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseIntError> for IndexerError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> IndexerError {
        let detail = err.to_string();
        IndexerError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseFloatError> for IndexerError {
    #[track_caller]
    fn from(err: std::num::ParseFloatError) -> IndexerError {
        let detail = err.to_string();
        IndexerError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Float parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps driver failures to source kinds. Pool and I/O failures mean the connection is gone.
impl From<sqlx::Error> for IndexerError {
    #[track_caller]
    fn from(err: sqlx::Error) -> IndexerError {
        let kind = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => ErrorKind::SourceConnectionFailed,
            sqlx::Error::Configuration(_) => ErrorKind::ConfigError,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                ErrorKind::DeserializationError
            }
            _ => ErrorKind::SourceQueryFailed,
        };

        let detail = err.to_string();
        IndexerError::from_components(
            kind,
            Cow::Borrowed("Database operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps transport failures of the search backend.
impl From<reqwest::Error> for IndexerError {
    #[track_caller]
    fn from(err: reqwest::Error) -> IndexerError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::SearchConnectionFailed,
                "Search backend is unreachable",
            )
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "Search request could not be built")
        } else {
            (ErrorKind::BulkRequestFailed, "Bulk request failed")
        };

        let detail = err.to_string();
        IndexerError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer_error;

    #[test]
    fn aggregate_of_one_error_is_unwrapped() {
        let err = IndexerError::from(vec![indexer_error!(
            ErrorKind::StaleReference,
            "Stale row"
        )]);

        assert_eq!(err.kind(), ErrorKind::StaleReference);
        assert!(err.description().is_some());
    }

    #[test]
    fn aggregate_flattens_kinds() {
        let err = IndexerError::from(vec![
            indexer_error!(ErrorKind::SourceConnectionFailed, "Connection lost"),
            indexer_error!(ErrorKind::BulkRequestFailed, "Bulk failed", "status 500"),
        ]);

        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SourceConnectionFailed, ErrorKind::BulkRequestFailed]
        );
        assert_eq!(err.detail(), Some("status 500"));
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn display_contains_kind_and_detail() {
        let err = indexer_error!(ErrorKind::InvalidData, "Bad row", "tuple 7");
        let rendered = err.to_string();

        assert!(rendered.starts_with("[InvalidData] Bad row @ "));
        assert!(rendered.contains("Detail:\n    tuple 7"));
    }

    #[test]
    fn parse_errors_are_conversion_errors() {
        let err: IndexerError = "x1".parse::<i64>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::ConversionError);

        let err: IndexerError = "nope".parse::<f64>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }
}
