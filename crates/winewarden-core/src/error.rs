use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy shared by the engine crates.
///
/// Per-attempt errors (`MalformedAttempt`, `ClassificationAmbiguous`) are
/// recovered inside the engine. Ruleset and audit-guarantee errors are fatal
/// and go to the operator.
#[derive(Debug, Error)]
pub enum WineWardenError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("malformed access attempt on line {line}: {reason}")]
    MalformedAttempt { line: usize, reason: String },
    #[error("unloadable ruleset: {0}")]
    UnloadableRuleset(String),
    #[error("ambiguous classification for {target}: {reason}")]
    ClassificationAmbiguous { target: String, reason: String },
    #[error("audit sink unavailable: {0}")]
    AuditSinkUnavailable(String),
    #[error("audit buffer exhausted ({capacity} records pending); refusing to drop audit records")]
    AuditBufferExhausted { capacity: usize },
    #[error("io error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

impl WineWardenError {
    /// Fatal errors stop the session; the rest are handled per attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WineWardenError::UnloadableRuleset(_)
                | WineWardenError::AuditBufferExhausted { .. }
                | WineWardenError::InvalidConfig(_)
        )
    }
}
