//! Error types for the knowledge core.
//!
//! Every failure surfaced to a driver carries one of the stable error codes
//! (`QS000`..`QS004`) so hooks, dashboards, and the CLI can react without
//! parsing message text.

/// Result type alias for knowledge-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable machine-readable error codes shared by every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    /// Generic query-system error
    QS000,
    /// Input validation failure
    QS001,
    /// Database failure
    QS002,
    /// Cooperative timeout
    QS003,
    /// Configuration failure
    QS004,
}

impl ErrorCode {
    /// The code as it appears in audit rows and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::QS000 => "QS000",
            ErrorCode::QS001 => "QS001",
            ErrorCode::QS002 => "QS002",
            ErrorCode::QS003 => "QS003",
            ErrorCode::QS004 => "QS004",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for the knowledge core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0} [QS001]")]
    Validation(String),

    #[error("Database error: {0} [QS002]")]
    Database(String),

    #[error("Query timed out after {0} seconds [QS003]")]
    Timeout(u64),

    #[error("Configuration error: {0} [QS004]")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The stable code attached to this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::QS001,
            Error::Database(_) => ErrorCode::QS002,
            Error::Timeout(_) => ErrorCode::QS003,
            Error::Configuration(_) | Error::Io(_) => ErrorCode::QS004,
            Error::NotFound(_) | Error::Serialization(_) | Error::Internal(_) => ErrorCode::QS000,
        }
    }

    /// Check if this error is recoverable (can retry with backoff)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Database(msg) => {
                let m = msg.to_ascii_lowercase();
                m.contains("busy") || m.contains("locked")
            }
            Error::Timeout(_) => true,
            Error::Validation(_)
            | Error::Configuration(_)
            | Error::NotFound(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(Error::Validation("bad domain".into()).code().as_str(), "QS001");
        assert_eq!(Error::Database("disk I/O error".into()).code().as_str(), "QS002");
        assert_eq!(Error::Timeout(30).code().as_str(), "QS003");
        assert_eq!(Error::Configuration("no data root".into()).code().as_str(), "QS004");
        assert_eq!(Error::Internal("oops".into()).code().as_str(), "QS000");
    }

    #[test]
    fn only_contention_and_timeouts_are_recoverable() {
        assert!(Error::Database("database is locked".into()).is_recoverable());
        assert!(Error::Database("SQLITE_BUSY".into()).is_recoverable());
        assert!(Error::Timeout(30).is_recoverable());
        assert!(!Error::Database("constraint violation".into()).is_recoverable());
        assert!(!Error::Validation("empty domain".into()).is_recoverable());
    }
}
