//! Error taxonomy for the semantic gate.

/// Errors produced by semgate domain operations.
///
/// Invocation and parse failures are not represented here: they are recovered
/// locally as `Unknown` votes and never abort a gate run.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("task not found: {0}")]
    TaskNotFound(u32),

    #[error("task store error: {0}")]
    TaskStore(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for semgate domain operations.
pub type Result<T> = std::result::Result<T, GateError>;
