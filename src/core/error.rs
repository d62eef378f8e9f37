use thiserror::Error;

/// Errors surfaced by the engine's public API.
///
/// Each variant carries the structured fields a caller needs to act on the failure
/// instead of re-parsing a message string.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse statement: {message}")]
    ParseError { message: String },

    #[error("failed to plan statement: {message}")]
    PlanError { message: String },

    #[error(
        "schema conflict on {metric}.{field}: expected {expected}, found {found}"
    )]
    SchemaConflict {
        metric: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("index I/O error: {0}")]
    IndexIOError(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IndexIOError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::IndexIOError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Maps this error to the process exit code a standalone driver would return.
    /// No such driver ships from this crate, but callers embedding the engine in
    /// their own binary can use this instead of inventing their own mapping.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ParseError { .. } | Error::PlanError { .. } => 1,
            Error::IndexIOError(_) => 2,
            Error::SchemaConflict { .. }
            | Error::UnknownMetric(_)
            | Error::UnknownNamespace(_)
            | Error::Timeout(_) => 1,
            Error::InternalError(_) => 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_conflict_renders_all_fields() {
        let err = Error::SchemaConflict {
            metric: "temperature".into(),
            field: "room".into(),
            expected: "String".into(),
            found: "Int".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("temperature"));
        assert!(rendered.contains("room"));
        assert!(rendered.contains("String"));
        assert!(rendered.contains("Int"));
    }

    #[test]
    fn io_error_converts_to_index_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IndexIOError(_)));
    }

    #[test]
    fn exit_codes_distinguish_config_io_and_internal_failures() {
        assert_eq!(Error::ParseError { message: "x".into() }.exit_code(), 1);
        assert_eq!(Error::IndexIOError("x".into()).exit_code(), 2);
        assert_eq!(Error::InternalError("x".into()).exit_code(), 64);
    }
}
