//! Domain error types.
//!
//! Instrument-level failures (`UpstreamUnavailable`, `CheckpointRead`) are
//! collected into the run summary; `StoreWrite` aborts the run.

/// Top-level error type for quotesync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("upstream unavailable for {code}: {reason}")]
    UpstreamUnavailable { code: String, reason: String },

    #[error("checkpoint read failed for {code}: {reason}")]
    CheckpointRead { code: String, reason: String },

    #[error("store write failed: {reason}")]
    StoreWrite { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SyncError> for std::process::ExitCode {
    fn from(err: &SyncError) -> Self {
        let code: u8 = match err {
            SyncError::Io(_) => 1,
            SyncError::ConfigParse { .. }
            | SyncError::ConfigMissing { .. }
            | SyncError::ConfigInvalid { .. } => 2,
            SyncError::Database { .. }
            | SyncError::DatabaseQuery { .. }
            | SyncError::CheckpointRead { .. }
            | SyncError::StoreWrite { .. } => 3,
            SyncError::UpstreamUnavailable { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
