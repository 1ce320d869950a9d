use indexer::error::IndexerError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt::{self, Write};

pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Backtrace taken where a startup error was raised.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Failure of the indexer binary.
///
/// Errors of the pipeline, the database or the search backend arrive as [`IndexerError`].
/// Argument validation and process setup fail with the other variants.
#[derive(Debug)]
pub enum ReplicatorError {
    Indexer(IndexerError),
    /// Arguments that parsed but do not form a valid configuration, or a tracing setup that
    /// could not be installed.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// Runtime or signal handler setup failed.
    Io(std::io::Error, CapturedBacktrace),
}

impl ReplicatorError {
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Label printed on the `category:` line of the report.
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Indexer(_) => "indexer error",
            ReplicatorError::Config(_, _) => "configuration error",
            ReplicatorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ReplicatorError::Indexer(err) => err.backtrace(),
            ReplicatorError::Config(_, captured) | ReplicatorError::Io(_, captured) => {
                Some(&captured.0)
            }
        }
    }

    /// Renders the report printed on stderr before exiting with a failure status.
    ///
    /// Lists the cause chain unless the error aggregates several failures, which its own
    /// message already enumerates. The backtrace is appended when `RUST_BACKTRACE` is `1` or
    /// `full`.
    pub fn render_report(&self) -> String {
        let mut report = String::new();
        // Writing into a `String` cannot fail.
        let _ = writeln!(report, "replicator failed");
        let _ = writeln!(report, "category: {}", self.category());
        let _ = writeln!(report, "error: {self}");

        let aggregated = matches!(self, ReplicatorError::Indexer(err) if err.kinds().len() > 1);
        if !aggregated {
            let causes = std::iter::successors(self.source(), |err| (*err).source());
            for (number, cause) in (1..).zip(causes) {
                let _ = writeln!(report, "cause {number}: {cause}");
            }
        }

        if backtrace_requested()
            && let Some(backtrace) = self.backtrace()
        {
            let _ = writeln!(report, "backtrace:");
            let _ = write!(report, "{backtrace}");
            if !report.ends_with('\n') {
                report.push('\n');
            }
        }

        report
    }
}

fn backtrace_requested() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1" | "full")
    )
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Indexer(err) => write!(f, "{err}"),
            ReplicatorError::Config(source, _) => write!(f, "invalid configuration: {source}"),
            ReplicatorError::Io(source, _) => write!(f, "process setup failed: {source}"),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Indexer(err) => err.source(),
            ReplicatorError::Config(source, _) => Some(source.as_ref()),
            ReplicatorError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(err: std::io::Error) -> Self {
        ReplicatorError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<IndexerError> for ReplicatorError {
    fn from(err: IndexerError) -> Self {
        ReplicatorError::Indexer(err)
    }
}
