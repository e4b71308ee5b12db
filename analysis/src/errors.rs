use std::time::Duration;

use thiserror::Error;

/// Failures of the engine collaborator itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is not running")]
    NotRunning,
    #[error("engine failed to start: {0}")]
    Startup(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("engine process exited unexpectedly")]
    ProcessExited,
    #[error("analysis was cancelled")]
    Cancelled,
}

/// The caller-facing failure taxonomy of `analyze`.
///
/// Lookup-layer problems never appear here on their own; they are recovered
/// locally and only surface, folded into the `EngineUnavailable` message,
/// when no layer at all could answer.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Board size or move format outside the supported set. Raised before
    /// any lookup work happens.
    #[error("unsupported position: {0}")]
    UnsupportedPosition(String),

    /// Every layer was tried and none could answer. The message names each
    /// layer and why it failed.
    #[error("{0}")]
    EngineUnavailable(String),

    #[error("engine analysis timed out after {0:?}")]
    EngineTimeout(Duration),

    #[error("engine analysis was cancelled")]
    EngineCancelled,

    #[error("engine analysis failed: {0}")]
    EngineFailed(#[source] EngineError),
}
