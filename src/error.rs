use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by processors, feeders, exporters and the executor.
///
/// Two variants are control signals rather than failures: [`PipelineError::DropItem`] and
/// [`PipelineError::Unparseable`]. The executor recovers from both by counting the item as
/// dropped and moving on (see [`PipelineError::is_drop`]). Everything else is fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid setup: unknown operator, missing bound method, bad dispatch declaration, etc.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A processor removed the current item from further processing.
    #[error("item dropped: {reason}")]
    DropItem { reason: String },

    /// A loader or feeder could not parse a single record.
    #[error("unparseable input: {message}")]
    Unparseable { message: String },

    /// A strict-mode path write could not reach its parent container.
    #[error("path '{path}' is not reachable")]
    UnreachablePath { path: String },

    /// A sink rejected an item.
    #[error("export error: {message}")]
    Export { message: String },

    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader/writer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding error outside of per-record parsing.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid file glob pattern.
    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

/// Severity classification used when reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected filtering: the item was dropped on purpose.
    Info,
    /// Data-quality problem: a record could not be parsed.
    Warning,
    /// The run cannot continue.
    Error,
    /// Infrastructure failure (typically I/O).
    Critical,
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn drop_item(reason: impl Into<String>) -> Self {
        Self::DropItem {
            reason: reason.into(),
        }
    }

    pub fn unparseable(message: impl Into<String>) -> Self {
        Self::Unparseable {
            message: message.into(),
        }
    }

    /// Returns `true` for signals the executor recovers from locally.
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::DropItem { .. } | Self::Unparseable { .. })
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DropItem { .. } => Severity::Info,
            Self::Unparseable { .. } => Severity::Warning,
            Self::Io(_) => Severity::Critical,
            Self::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Severity::Critical,
                _ => Severity::Error,
            },
            Self::Config { .. }
            | Self::UnreachablePath { .. }
            | Self::Export { .. }
            | Self::Json(_)
            | Self::Glob(_) => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineError, Severity};

    #[test]
    fn drop_signals_are_recoverable() {
        assert!(PipelineError::drop_item("filtered").is_drop());
        assert!(PipelineError::unparseable("bad json").is_drop());
        assert!(!PipelineError::config("unknown operator").is_drop());
        assert!(!PipelineError::UnreachablePath { path: "a.b".into() }.is_drop());
    }

    #[test]
    fn severity_separates_filtering_from_data_quality() {
        assert_eq!(PipelineError::drop_item("x").severity(), Severity::Info);
        assert_eq!(PipelineError::unparseable("x").severity(), Severity::Warning);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(PipelineError::from(io).severity(), Severity::Critical);
        assert!(Severity::Critical > Severity::Error);
    }

    #[test]
    fn messages_carry_the_reason() {
        let err = PipelineError::drop_item("industry is excluded");
        assert_eq!(err.to_string(), "item dropped: industry is excluded");
    }
}
