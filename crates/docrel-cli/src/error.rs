//! CLI error types.

use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Engine error.
    #[error("engine error: {0}")]
    Engine(#[from] docrel_core::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] docrel_proto::Error),

    /// JSON argument or output error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Argument with an unusable value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The audit found inconsistencies.
    #[error("audit found {0} violations")]
    AuditFailed(usize),
}
